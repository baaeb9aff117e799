//! Core types for the capture router.

use capture_store::record::RecordError;
use capture_store::store::StoreError;
use capture_store::CaptureKind;
use std::time::Duration;

/// Which input surface asked for the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Shortcut,
    ContextMenu,
    Toolbar,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Shortcut => "shortcut",
            TriggerSource::ContextMenu => "context-menu",
            TriggerSource::Toolbar => "toolbar",
        }
    }
}

/// A capture request as produced by the trigger layer: an explicit
/// representation, or none to let the classifier decide.
#[derive(Debug, Clone, Copy)]
pub struct CaptureRequest {
    pub kind: Option<CaptureKind>,
    pub trigger: TriggerSource,
}

impl CaptureRequest {
    pub fn of(kind: CaptureKind, trigger: TriggerSource) -> Self {
        Self {
            kind: Some(kind),
            trigger,
        }
    }

    /// Let [`classify`](crate::classify::classify) pick the representation.
    pub fn classified(trigger: TriggerSource) -> Self {
        Self {
            kind: None,
            trigger,
        }
    }
}

/// Errors that can occur while producing a capture.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("nothing selected")]
    EmptySelection,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("capture already in progress")]
    CaptureInProgress,

    #[error("capture attempted too soon after the previous one")]
    Cooldown,

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl CaptureError {
    /// Failures that are expected no-ops rather than faults to surface.
    pub fn is_silent(&self) -> bool {
        matches!(self, CaptureError::EmptySelection)
    }
}
