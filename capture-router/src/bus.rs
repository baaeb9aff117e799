//! Message transport between contexts.
//!
//! [`MessagePort`] is the platform messaging primitive as the pipeline sees
//! it: async, at-most-once, best-effort. [`InProcessBus`] is the channel
//! implementation used by the daemon and tests; [`ChaosBus`] wraps any port
//! to inject dropped, duplicated or failed deliveries so tests can exercise
//! the failure contract explicitly.

use crate::message::{ContextId, DeliveryError, Message};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

const CONTEXT_CHANNEL_CAPACITY: usize = 64;

/// Send half of the platform messaging primitive.
#[async_trait]
pub trait MessagePort: Send + Sync {
    async fn send(&self, target: ContextId, message: Message) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<T: MessagePort + ?Sized> MessagePort for std::sync::Arc<T> {
    async fn send(&self, target: ContextId, message: Message) -> Result<(), DeliveryError> {
        (**self).send(target, message).await
    }
}

/// Channel-backed bus connecting the three contexts inside one process.
/// A context that never attached (or has detached) simply has no
/// receiving end, which senders observe as [`DeliveryError::NoReceiver`].
#[derive(Default)]
pub struct InProcessBus {
    senders: Mutex<HashMap<ContextId, mpsc::Sender<Message>>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a context, returning its inbound message stream. Re-attaching
    /// replaces the previous receiver.
    pub fn attach(&self, context: ContextId) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(CONTEXT_CHANNEL_CAPACITY);
        self.senders.lock().unwrap().insert(context, tx);
        debug!("context {} attached to bus", context);
        rx
    }

    /// Detach a context; subsequent sends to it fail with NoReceiver.
    pub fn detach(&self, context: ContextId) {
        self.senders.lock().unwrap().remove(&context);
        debug!("context {} detached from bus", context);
    }
}

#[async_trait]
impl MessagePort for InProcessBus {
    async fn send(&self, target: ContextId, message: Message) -> Result<(), DeliveryError> {
        let sender = {
            let senders = self.senders.lock().unwrap();
            senders.get(&target).cloned()
        };

        let Some(sender) = sender else {
            return Err(DeliveryError::NoReceiver(target));
        };

        trace!(
            "{} -> {}: {}",
            message.origin,
            target,
            message.kind.as_str()
        );

        if sender.send(message).await.is_err() {
            // Receiver dropped without detaching; treat it as gone.
            self.senders.lock().unwrap().remove(&target);
            return Err(DeliveryError::NoReceiver(target));
        }
        Ok(())
    }
}

/// Scripted delivery fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Report success without delivering.
    Drop,
    /// Deliver the message twice.
    Duplicate,
    /// Fail with NoReceiver without delivering.
    NoReceiver,
}

/// Decorator injecting a queue of scripted faults ahead of real delivery.
/// Each send consumes one queued fault; an empty queue delivers normally.
pub struct ChaosBus<P: MessagePort> {
    inner: P,
    faults: Mutex<VecDeque<Fault>>,
}

impl<P: MessagePort> ChaosBus<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            faults: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_fault(&self, fault: Fault) {
        self.faults.lock().unwrap().push_back(fault);
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: MessagePort> MessagePort for ChaosBus<P> {
    async fn send(&self, target: ContextId, message: Message) -> Result<(), DeliveryError> {
        let fault = self.faults.lock().unwrap().pop_front();
        match fault {
            Some(Fault::Drop) => {
                debug!("chaos: dropping {} to {}", message.kind.as_str(), target);
                Ok(())
            }
            Some(Fault::Duplicate) => {
                debug!(
                    "chaos: duplicating {} to {}",
                    message.kind.as_str(),
                    target
                );
                self.inner.send(target, message.clone()).await?;
                self.inner.send(target, message).await
            }
            Some(Fault::NoReceiver) => {
                debug!(
                    "chaos: failing {} to {} with NoReceiver",
                    message.kind.as_str(),
                    target
                );
                Err(DeliveryError::NoReceiver(target))
            }
            None => self.inner.send(target, message).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    #[tokio::test]
    async fn test_send_to_attached_context() {
        let bus = InProcessBus::new();
        let mut rx = bus.attach(ContextId::Background);

        bus.send(ContextId::Background, Message::test_ping(ContextId::Page))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, MessageKind::TestPing);
        assert_eq!(received.origin, ContextId::Page);
    }

    #[tokio::test]
    async fn test_send_to_missing_context_is_no_receiver() {
        let bus = InProcessBus::new();
        let err = bus
            .send(ContextId::Panel, Message::test_ping(ContextId::Background))
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::NoReceiver(ContextId::Panel));
    }

    #[tokio::test]
    async fn test_detach_makes_context_unreachable() {
        let bus = InProcessBus::new();
        let _rx = bus.attach(ContextId::Panel);
        bus.detach(ContextId::Panel);

        let err = bus
            .send(ContextId::Panel, Message::test_ping(ContextId::Background))
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::NoReceiver(ContextId::Panel));
    }

    #[tokio::test]
    async fn test_dropped_receiver_behaves_like_detach() {
        let bus = InProcessBus::new();
        let rx = bus.attach(ContextId::Page);
        drop(rx);

        let err = bus
            .send(ContextId::Page, Message::test_ping(ContextId::Background))
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::NoReceiver(ContextId::Page));
    }

    #[tokio::test]
    async fn test_chaos_drop_reports_success_without_delivery() {
        let bus = ChaosBus::new(InProcessBus::new());
        let mut rx = bus.inner().attach(ContextId::Background);
        bus.push_fault(Fault::Drop);

        bus.send(ContextId::Background, Message::test_ping(ContextId::Page))
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chaos_duplicate_delivers_twice() {
        let bus = ChaosBus::new(InProcessBus::new());
        let mut rx = bus.inner().attach(ContextId::Background);
        bus.push_fault(Fault::Duplicate);

        bus.send(ContextId::Background, Message::test_ping(ContextId::Page))
            .await
            .unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
