//! Outbound delivery policy and inbound idempotency gate.
//!
//! One router instance per context. Outbound sends are fire-and-forget with
//! linear-backoff retries for idempotent kinds only; inbound messages pass
//! through a hash gate that no-ops the same logical message arriving twice
//! through different trigger paths.

use crate::bus::MessagePort;
use crate::config::RouterConfig;
use crate::message::{message_hash, ContextId, DeliveryError, Message};
use capture_store::DedupFilter;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

pub struct MessageRouter {
    origin: ContextId,
    port: Arc<dyn MessagePort>,
    /// Identity hashes of recently processed inbound messages.
    seen: Mutex<DedupFilter>,
    retry_base_delay: Duration,
    max_retries: u32,
}

impl MessageRouter {
    pub fn new(
        origin: ContextId,
        port: Arc<dyn MessagePort>,
        message_expiry: Duration,
        retry: &RouterConfig,
    ) -> Self {
        Self {
            origin,
            port,
            seen: Mutex::new(DedupFilter::new(message_expiry)),
            retry_base_delay: retry.retry_base_delay(),
            max_retries: retry.max_retries,
        }
    }

    pub fn origin(&self) -> ContextId {
        self.origin
    }

    /// Send a message, retrying "no receiving end" with linear backoff,
    /// but only for kinds whose duplicate delivery is harmless.
    pub async fn send(&self, target: ContextId, message: Message) -> Result<(), DeliveryError> {
        let retries = if message.kind.retryable() {
            self.max_retries
        } else {
            0
        };

        let mut attempt = 0u32;
        loop {
            match self.port.send(target, message.clone()).await {
                Ok(()) => return Ok(()),
                Err(DeliveryError::NoReceiver(_)) if attempt < retries => {
                    attempt += 1;
                    let delay = self.retry_base_delay * attempt;
                    debug!(
                        "no receiver in {} for {}, retry {}/{} in {:?}",
                        target,
                        message.kind.as_str(),
                        attempt,
                        retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fire-and-forget: delivery failure is logged and absorbed. Used where
    /// the receiver's absence is a normal condition (a closed panel) and
    /// persistence is the fallback of record.
    pub async fn send_absorbing(&self, target: ContextId, message: Message) {
        let kind = message.kind;
        if let Err(e) = self.send(target, message).await {
            debug!(
                "delivery of {} to {} failed ({}), absorbed",
                kind.as_str(),
                target,
                e
            );
        }
    }

    /// Inbound gate: `true` means process the message, `false` means it was
    /// already handled within the expiry window and must be a no-op.
    pub fn accept(&self, message: &Message) -> bool {
        let hash = message_hash(message);
        let duplicate = self.seen.lock().unwrap().check_and_record(&hash);
        if duplicate {
            warn!(
                "duplicate {} message from {} rejected",
                message.kind.as_str(),
                message.origin
            );
        }
        !duplicate
    }
}
