//! Page context capture controller.
//!
//! Orchestrates the page-side flow: trigger → classification → extraction →
//! immediate-repeat suppression → report to the background. Also answers
//! capture-requested messages, which is the redundant trigger path the
//! router's idempotency gate exists for.

use crate::bus::MessagePort;
use crate::classify::{classify, Classification};
use crate::config::Config;
use crate::dom::PageDom;
use crate::extract::CaptureExtractor;
use crate::message::{ContextId, Message, MessageKind};
use crate::router::MessageRouter;
use crate::screenshot::{ScreenCapturePort, ScreenshotService};
use crate::types::{CaptureError, CaptureRequest, TriggerSource};
use capture_store::{capture_hash, CaptureKind, CaptureRecord, DedupFilter};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub struct PageCaptureController<S: ScreenCapturePort> {
    extractor: CaptureExtractor,
    screenshots: ScreenshotService<S>,
    /// Page-side dedup against double DOM events, tightest window.
    dedup: Mutex<DedupFilter>,
    router: MessageRouter,
}

impl<S: ScreenCapturePort> PageCaptureController<S> {
    pub fn new(config: &Config, port: Arc<dyn MessagePort>, screen_port: S) -> Self {
        Self {
            extractor: CaptureExtractor::new(config.extraction.clone()),
            screenshots: ScreenshotService::new(screen_port, config.screenshot.clone()),
            dedup: Mutex::new(DedupFilter::new(config.dedup.page_window())),
            router: MessageRouter::new(
                ContextId::Page,
                port,
                config.dedup.message_expiry(),
                &config.router,
            ),
        }
    }

    /// Handle one trigger from the input layer (shortcut, context menu,
    /// toolbar). Returns the produced record, or None when the capture was
    /// suppressed as an immediate repeat.
    pub async fn handle_trigger(
        &self,
        request: CaptureRequest,
        dom: &dyn PageDom,
    ) -> Result<Option<CaptureRecord>, CaptureError> {
        let kind = match request.kind {
            Some(kind) => kind,
            None => self.classify_selection(dom)?,
        };

        debug!(
            "capture triggered: {} via {}",
            kind.as_str(),
            request.trigger.as_str()
        );

        let record = match kind {
            CaptureKind::Screenshot => self.screenshots.capture(dom).await?,
            _ => self.extractor.extract(kind, dom)?,
        };

        let hash = capture_hash(record.kind, Some(&record.url), &record.content);
        if self.dedup.lock().unwrap().check_and_record(&hash) {
            info!("suppressed immediate repeat of {} capture", kind.as_str());
            return Ok(None);
        }

        // Fire-and-forget: capture-reported is not retryable, and a dead
        // background cannot be repaired from here.
        self.router
            .send_absorbing(
                ContextId::Background,
                Message::capture_reported(ContextId::Page, &record),
            )
            .await;

        Ok(Some(record))
    }

    /// Handle an inbound message. Capture requests re-dispatched through
    /// the bus funnel into the same trigger path.
    pub async fn handle_message(
        &self,
        message: Message,
        dom: &dyn PageDom,
    ) -> Result<Option<CaptureRecord>, CaptureError> {
        if !self.router.accept(&message) {
            return Ok(None);
        }

        match message.kind {
            MessageKind::CaptureRequested => {
                let request = CaptureRequest {
                    kind: message.requested_kind(),
                    trigger: TriggerSource::ContextMenu,
                };
                self.handle_trigger(request, dom).await
            }
            MessageKind::TestPing => {
                debug!("ping from {}", message.origin);
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn classify_selection(&self, dom: &dyn PageDom) -> Result<CaptureKind, CaptureError> {
        let fragment = dom.selection().unwrap_or_default();
        match classify(&fragment) {
            Classification::None => Err(CaptureError::EmptySelection),
            Classification::Text => Ok(CaptureKind::Text),
            Classification::Html => Ok(CaptureKind::Html),
            Classification::Markdown => Ok(CaptureKind::Markdown),
        }
    }
}
