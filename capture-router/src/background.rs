//! Background context service.
//!
//! Sole writer of record for the capture store. Receives captures from the
//! page context, suppresses duplicates, persists, and forwards to the panel
//! when one is open. An absent panel is a normal condition, not an error,
//! because the store is the fallback of record.

use crate::bus::MessagePort;
use crate::config::Config;
use crate::message::{ContextId, Message, MessageKind};
use crate::router::MessageRouter;
use capture_store::{
    capture_hash, AppendOutcome, CaptureOutcome, CaptureRecord, CaptureStore, DedupFilter,
    OutcomeAction, OutcomeStatus,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct BackgroundService {
    store: Arc<CaptureStore>,
    /// Store-level content dedup, widest of the three windows.
    dedup: Mutex<DedupFilter>,
    router: MessageRouter,
}

impl BackgroundService {
    pub fn new(config: &Config, store: Arc<CaptureStore>, port: Arc<dyn MessagePort>) -> Self {
        Self {
            store,
            dedup: Mutex::new(DedupFilter::new(config.dedup.store_window())),
            router: MessageRouter::new(
                ContextId::Background,
                port,
                config.dedup.message_expiry(),
                &config.router,
            ),
        }
    }

    pub fn store(&self) -> &Arc<CaptureStore> {
        &self.store
    }

    /// Process one inbound message and report what happened to it.
    pub async fn handle_message(&self, message: Message) -> CaptureOutcome {
        if !self.router.accept(&message) {
            return CaptureOutcome::skipped("duplicate message delivery");
        }

        match message.kind {
            MessageKind::CaptureReported => match message.record() {
                Some(record) => self.ingest(record).await,
                None => {
                    warn!("capture-reported message carried no parseable record");
                    CaptureOutcome::failed("malformed capture payload")
                }
            },

            // Trigger relay: a capture asked for elsewhere (panel toolbar,
            // context menu) is re-dispatched to the page context, which owns
            // the DOM. Idempotent, so the router may retry it.
            MessageKind::CaptureRequested => {
                self.router
                    .send_absorbing(ContextId::Page, message.reoriginated(ContextId::Background))
                    .await;
                CaptureOutcome::skipped("capture request relayed to page")
            }

            MessageKind::PermissionRequested => {
                info!("permission request from {}", message.origin);
                self.router
                    .send_absorbing(ContextId::Panel, message.reoriginated(ContextId::Background))
                    .await;
                CaptureOutcome::skipped("permission request forwarded")
            }

            MessageKind::LifecycleLoaded
            | MessageKind::LocaleChanged
            | MessageKind::ThemeChanged => {
                self.router
                    .send_absorbing(ContextId::Panel, message.reoriginated(ContextId::Background))
                    .await;
                CaptureOutcome::skipped("forwarded to panel")
            }

            MessageKind::TestPing => CaptureOutcome::skipped("pong"),
        }
    }

    /// Dedup, persist, forward. Captures arriving through redundant channels
    /// within the store window collapse to one stored record.
    pub async fn ingest(&self, record: CaptureRecord) -> CaptureOutcome {
        let hash = capture_hash(record.kind, Some(&record.url), &record.content);
        if self.dedup.lock().unwrap().check_and_record(&hash) {
            info!("duplicate capture suppressed at store level: {}", record.id);
            return CaptureOutcome::skipped("duplicate capture");
        }

        match self.store.append(record.clone()).await {
            Ok(AppendOutcome::Stored) => {
                info!("capture stored: {} ({})", record.id, record.kind.as_str());
                self.forward_to_panel(&record).await;
                CaptureOutcome::stored(record.id)
            }
            Ok(AppendOutcome::SuppressedByClear) => {
                CaptureOutcome::skipped("store clear in progress")
            }
            Err(e) => {
                // The store mirrored the record in memory; the session keeps
                // going and the panel still hears about it.
                warn!("storage degraded, capture held in session memory: {}", e);
                self.forward_to_panel(&record).await;
                CaptureOutcome {
                    status: OutcomeStatus::Ok,
                    action: OutcomeAction::Stored,
                    id: Some(record.id),
                    message: Some("storage degraded; capture held in session memory".to_string()),
                }
            }
        }
    }

    async fn forward_to_panel(&self, record: &CaptureRecord) {
        // A closed panel reads the store on its next attach.
        self.router
            .send_absorbing(
                ContextId::Panel,
                Message::capture_reported(ContextId::Background, record),
            )
            .await;
    }

    /// Message loop; runs until the inbound channel closes. Nothing in
    /// here may tear the loop down; every failure becomes an outcome.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Message>) {
        info!("background service listening");
        while let Some(message) = rx.recv().await {
            let kind = message.kind;
            let outcome = self.handle_message(message).await;
            debug!(
                "handled {}: {:?} {:?}",
                kind.as_str(),
                outcome.status,
                outcome.action
            );
        }
        info!("background message loop ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use capture_store::{CaptureKind, MemoryKeyValue, StoreConfig};

    fn service() -> (Arc<InProcessBus>, BackgroundService) {
        let bus = Arc::new(InProcessBus::new());
        let kv = Arc::new(MemoryKeyValue::new());
        let store = Arc::new(CaptureStore::new(kv, StoreConfig::default()));
        let service = BackgroundService::new(&Config::default(), store, bus.clone());
        (bus, service)
    }

    fn record(content: &str) -> CaptureRecord {
        CaptureRecord::new(
            CaptureKind::Text,
            content.to_string(),
            "Test Page".to_string(),
            "https://example.com".to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_capture_reported_is_stored() {
        let (_bus, service) = service();
        let record = record("fresh capture");
        let message = Message::capture_reported(ContextId::Page, &record);

        let outcome = service.handle_message(message).await;
        assert_eq!(outcome.action, OutcomeAction::Stored);
        assert_eq!(service.store().list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_message_stores_once() {
        let (_bus, service) = service();
        let record = record("delivered twice");
        let message = Message::capture_reported(ContextId::Page, &record);

        let first = service.handle_message(message.clone()).await;
        let second = service.handle_message(message).await;

        assert_eq!(first.action, OutcomeAction::Stored);
        assert_eq!(second.action, OutcomeAction::Skipped);
        assert_eq!(service.store().list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_same_content_different_message_stores_once() {
        let (_bus, service) = service();
        // Two distinct records (fresh ids) of the same selection; the
        // content-level filter catches what the message gate cannot.
        let a = record("identical selection");
        let b = record("identical selection");

        service
            .handle_message(Message::capture_reported(ContextId::Page, &a))
            .await;
        let second = service
            .handle_message(Message::capture_reported(ContextId::Page, &b))
            .await;

        assert_eq!(second.action, OutcomeAction::Skipped);
        assert_eq!(service.store().list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stored_capture_is_forwarded_to_panel() {
        let (bus, service) = service();
        let mut panel_rx = bus.attach(ContextId::Panel);

        service.ingest(record("forward me")).await;

        let forwarded = panel_rx.recv().await.unwrap();
        assert_eq!(forwarded.kind, MessageKind::CaptureReported);
        assert_eq!(forwarded.origin, ContextId::Background);
    }

    #[tokio::test]
    async fn test_absent_panel_is_not_an_error() {
        let (_bus, service) = service();
        let outcome = service.ingest(record("panel is closed")).await;
        assert_eq!(outcome.status, OutcomeStatus::Ok);
        assert_eq!(outcome.action, OutcomeAction::Stored);
    }

    #[tokio::test]
    async fn test_capture_request_is_relayed_to_page() {
        let (bus, service) = service();
        let mut page_rx = bus.attach(ContextId::Page);

        let request = Message::capture_requested(ContextId::Panel, Some(CaptureKind::Fullpage));
        let outcome = service.handle_message(request).await;
        assert_eq!(outcome.action, OutcomeAction::Skipped);

        let relayed = page_rx.recv().await.unwrap();
        assert_eq!(relayed.kind, MessageKind::CaptureRequested);
        assert_eq!(relayed.origin, ContextId::Background);
        assert_eq!(relayed.requested_kind(), Some(CaptureKind::Fullpage));
    }

    #[tokio::test]
    async fn test_malformed_capture_payload_fails_softly() {
        let (_bus, service) = service();
        let mut message = Message::new(MessageKind::CaptureReported, ContextId::Page);
        message.payload = serde_json::Value::from("not a record");

        let outcome = service.handle_message(message).await;
        assert_eq!(outcome.action, OutcomeAction::Failed);
        assert!(service.store().list().await.is_empty());
    }
}
