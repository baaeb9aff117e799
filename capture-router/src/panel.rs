//! Panel context service.
//!
//! Reader-facing half of the pipeline: keeps the render list, suppresses
//! duplicate renders, replays the store on attach with paced sends, and
//! writes edits/deletes back through the same store interface the
//! background uses.

use crate::bus::MessagePort;
use crate::config::Config;
use crate::message::{ContextId, DeliveryError, Message, MessageKind};
use crate::router::MessageRouter;
use crate::types::CaptureError;
use capture_store::{capture_hash, CaptureKind, CaptureRecord, CaptureStore, DedupFilter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct PanelService {
    store: Arc<CaptureStore>,
    /// Display-side dedup against duplicate renders.
    dedup: Mutex<DedupFilter>,
    router: MessageRouter,
    /// Records currently rendered, newest first.
    displayed: Mutex<Vec<CaptureRecord>>,
    replay_spacing: Duration,
}

impl PanelService {
    pub fn new(config: &Config, store: Arc<CaptureStore>, port: Arc<dyn MessagePort>) -> Self {
        Self {
            store,
            dedup: Mutex::new(DedupFilter::new(config.dedup.panel_window())),
            router: MessageRouter::new(
                ContextId::Panel,
                port,
                config.dedup.message_expiry(),
                &config.router,
            ),
            displayed: Mutex::new(Vec::new()),
            replay_spacing: config.router.replay_spacing(),
        }
    }

    pub fn displayed(&self) -> Vec<CaptureRecord> {
        self.displayed.lock().unwrap().clone()
    }

    /// Replay persisted captures into the render list. Sends are spaced out
    /// rather than flooded, trading latency for a UI that keeps up.
    pub async fn attach(&self) -> usize {
        let records = self.store.list().await;
        let total = records.len();
        let mut shown = 0;

        // Oldest first, so the render list ends up newest-first.
        for record in records.into_iter().rev() {
            if self.display(record) {
                shown += 1;
            }
            if self.replay_spacing > Duration::ZERO {
                tokio::time::sleep(self.replay_spacing).await;
            }
        }

        info!("panel attached: {} of {} records rendered", shown, total);
        shown
    }

    pub async fn handle_message(&self, message: Message) {
        if !self.router.accept(&message) {
            return;
        }

        match message.kind {
            MessageKind::CaptureReported => {
                if let Some(record) = message.record() {
                    if self.display(record) {
                        debug!("rendered incoming capture");
                    }
                }
            }
            MessageKind::ThemeChanged | MessageKind::LocaleChanged => {
                debug!("ui settings changed: {}", message.kind.as_str());
            }
            MessageKind::LifecycleLoaded => {
                debug!("page lifecycle event from {}", message.origin);
            }
            _ => {}
        }
    }

    /// Ask for a capture of the given kind (or a classified one); routed via
    /// the background, which relays to the page.
    pub async fn request_capture(&self, kind: Option<CaptureKind>) -> Result<(), DeliveryError> {
        self.router
            .send(
                ContextId::Background,
                Message::capture_requested(ContextId::Panel, kind),
            )
            .await
    }

    /// Apply a user edit: build the merged replacement record and swap it in
    /// the store and the render list. The original record is never mutated.
    pub async fn edit(
        &self,
        id: &str,
        content: String,
        extra_metadata: HashMap<String, serde_json::Value>,
    ) -> Result<bool, CaptureError> {
        let records = self.store.list().await;
        let Some(original) = records.iter().find(|r| r.id == id) else {
            return Ok(false);
        };

        let merged = original.merged(content, extra_metadata);
        if !self.store.update(merged.clone()).await? {
            return Ok(false);
        }

        let mut displayed = self.displayed.lock().unwrap();
        if let Some(slot) = displayed.iter_mut().find(|r| r.id == id) {
            *slot = merged;
        }
        Ok(true)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, CaptureError> {
        let removed = self.store.remove(id).await?;
        if removed {
            self.displayed.lock().unwrap().retain(|r| r.id != id);
        }
        Ok(removed)
    }

    pub async fn clear_all(&self) -> Result<(), CaptureError> {
        self.store.clear().await?;
        self.displayed.lock().unwrap().clear();
        Ok(())
    }

    /// Render unless the same capture was already shown within the window.
    fn display(&self, record: CaptureRecord) -> bool {
        let hash = capture_hash(record.kind, Some(&record.url), &record.content);
        if self.dedup.lock().unwrap().check_and_record(&hash) {
            debug!("suppressed duplicate render of {}", record.id);
            return false;
        }

        let mut displayed = self.displayed.lock().unwrap();
        displayed.retain(|r| r.id != record.id);
        displayed.insert(0, record);
        true
    }

    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Message>) {
        info!("panel service listening");
        while let Some(message) = rx.recv().await {
            self.handle_message(message).await;
        }
        info!("panel message loop ended");
    }
}
