//! Screenshot capture service.
//!
//! The only genuinely asynchronous extraction path, and the only one with
//! cancellation semantics: an in-flight capture is abandoned by timeout and
//! a cooldown blocks immediate re-entry. There is no cancel token; late
//! results are simply ignored.

use crate::config::ScreenshotConfig;
use crate::dom::PageDom;
use crate::metadata;
use crate::types::CaptureError;
use async_trait::async_trait;
use capture_store::{CaptureKind, CaptureRecord};
use std::sync::Mutex;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScreenCaptureError {
    #[error("screen capture permission denied")]
    PermissionDenied,
    #[error("screen capture API unavailable")]
    Unavailable,
    #[error("screen capture failed: {0}")]
    Failed(String),
}

/// Platform screenshot acquisition, as the pipeline sees it. Both calls
/// resolve to a base64 image data URI.
#[async_trait]
pub trait ScreenCapturePort: Send + Sync {
    /// Direct "capture the visible viewport" platform call.
    async fn capture_visible_viewport(&self) -> Result<String, ScreenCaptureError>;

    /// User-consented screen-stream fallback: one video frame drawn to an
    /// off-screen canvas and read back as PNG.
    async fn capture_from_stream(&self) -> Result<String, ScreenCaptureError>;
}

#[derive(Default)]
struct FlightState {
    in_flight: bool,
    last_attempt: Option<Instant>,
}

/// Throttled single-flight screenshot pipeline.
pub struct ScreenshotService<P: ScreenCapturePort> {
    port: P,
    config: ScreenshotConfig,
    state: Mutex<FlightState>,
}

impl<P: ScreenCapturePort> ScreenshotService<P> {
    pub fn new(port: P, config: ScreenshotConfig) -> Self {
        Self {
            port,
            config,
            state: Mutex::new(FlightState::default()),
        }
    }

    /// Capture the viewport into a screenshot record.
    ///
    /// Rejects (rather than queues) a request while another is in flight,
    /// rejects requests inside the cooldown window, and abandons the
    /// attempt entirely once the configured deadline passes.
    pub async fn capture(&self, dom: &dyn PageDom) -> Result<CaptureRecord, CaptureError> {
        let started = Instant::now();

        {
            let mut state = self.state.lock().unwrap();
            if state.in_flight {
                debug!("screenshot rejected: capture already in progress");
                return Err(CaptureError::CaptureInProgress);
            }
            if let Some(last) = state.last_attempt {
                if started.duration_since(last) < self.config.cooldown() {
                    debug!("screenshot rejected: within cooldown window");
                    return Err(CaptureError::Cooldown);
                }
            }
            state.in_flight = true;
            state.last_attempt = Some(started);
        }
        let _flight = FlightGuard { state: &self.state };

        let acquired = tokio::time::timeout(self.config.timeout(), self.acquire()).await;

        let data_uri = match acquired {
            Err(_) => {
                warn!(
                    "screenshot abandoned after {:?}; late result will be ignored",
                    self.config.timeout()
                );
                return Err(CaptureError::Timeout(self.config.timeout()));
            }
            Ok(Err(ScreenCaptureError::PermissionDenied)) => {
                return Err(CaptureError::PermissionDenied(
                    "screen capture was refused; re-grant capture permission to retry"
                        .to_string(),
                ));
            }
            Ok(Err(e)) => {
                return Err(CaptureError::ExtractionFailed(e.to_string()));
            }
            Ok(Ok(uri)) => uri,
        };

        let content_size = data_uri.len();
        let mut record = CaptureRecord::new(
            CaptureKind::Screenshot,
            data_uri,
            dom.page_title(),
            dom.page_url(),
        )?;
        record.metadata = metadata::collect(dom, "", 0);
        record.set_meta("content_size", content_size);
        record.set_meta("capture_ms", started.elapsed().as_millis() as u64);

        info!("screenshot captured ({} bytes encoded)", content_size);
        Ok(record)
    }

    /// Direct viewport call first; permission refusal or an unavailable API
    /// falls through to the consented stream path.
    async fn acquire(&self) -> Result<String, ScreenCaptureError> {
        match self.port.capture_visible_viewport().await {
            Ok(uri) => Ok(uri),
            Err(ScreenCaptureError::PermissionDenied) | Err(ScreenCaptureError::Unavailable) => {
                debug!("viewport capture unavailable, trying stream fallback");
                self.port.capture_from_stream().await
            }
            Err(e) => Err(e),
        }
    }
}

/// Clears the in-flight flag however the capture ends, timeout included.
struct FlightGuard<'a> {
    state: &'a Mutex<FlightState>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight = false;
        }
    }
}
