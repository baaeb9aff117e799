//! Cross-context message types.
//!
//! Messages are the only coordination channel between the page, background
//! and panel contexts. Delivery is asynchronous, at-most-once and
//! best-effort; no context may assume another is alive.

use capture_store::{CaptureKind, CaptureRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// How many payload characters participate in the message identity hash.
const MESSAGE_HASH_PREFIX: usize = 128;

/// The three execution contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextId {
    Page,
    Background,
    Panel,
}

impl ContextId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextId::Page => "page",
            ContextId::Background => "background",
            ContextId::Panel => "panel",
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of message kinds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    CaptureReported,
    CaptureRequested,
    PermissionRequested,
    LifecycleLoaded,
    LocaleChanged,
    ThemeChanged,
    TestPing,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::CaptureReported => "capture-reported",
            MessageKind::CaptureRequested => "capture-requested",
            MessageKind::PermissionRequested => "permission-requested",
            MessageKind::LifecycleLoaded => "lifecycle-loaded",
            MessageKind::LocaleChanged => "locale-changed",
            MessageKind::ThemeChanged => "theme-changed",
            MessageKind::TestPing => "test-ping",
        }
    }

    /// Only idempotent kinds may be retried on delivery failure. Anything
    /// whose duplicate delivery would be user-visible relies on the dedup
    /// filters instead and is sent exactly once.
    pub fn retryable(&self) -> bool {
        matches!(self, MessageKind::CaptureRequested)
    }
}

/// A typed cross-context message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub origin: ContextId,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn new(kind: MessageKind, origin: ContextId) -> Self {
        Self {
            kind,
            origin,
            payload: serde_json::Value::Null,
            metadata: HashMap::new(),
        }
    }

    /// A capture record on its way to the background or panel.
    pub fn capture_reported(origin: ContextId, record: &CaptureRecord) -> Self {
        let mut message = Self::new(MessageKind::CaptureReported, origin);
        message.payload = serde_json::to_value(record).unwrap_or(serde_json::Value::Null);
        message.metadata.insert(
            "type".to_string(),
            serde_json::Value::from(record.kind.as_str()),
        );
        message
    }

    /// Ask the page context to perform a capture.
    pub fn capture_requested(origin: ContextId, kind: Option<CaptureKind>) -> Self {
        let mut message = Self::new(MessageKind::CaptureRequested, origin);
        message.metadata.insert(
            "type".to_string(),
            serde_json::Value::from(kind.map(|k| k.as_str()).unwrap_or("auto")),
        );
        message
    }

    pub fn test_ping(origin: ContextId) -> Self {
        Self::new(MessageKind::TestPing, origin)
    }

    /// The same logical message re-dispatched from another context. Keeps
    /// the identity hash stable so the receiver's idempotency gate can
    /// recognize it.
    pub fn reoriginated(&self, origin: ContextId) -> Self {
        Self {
            kind: self.kind,
            origin,
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Parse the payload back into a capture record, if it is one.
    pub fn record(&self) -> Option<CaptureRecord> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    /// The capture kind requested by a capture-requested message, if an
    /// explicit one was named.
    pub fn requested_kind(&self) -> Option<CaptureKind> {
        let name = self.metadata.get("type")?.as_str()?;
        serde_json::from_value(serde_json::Value::from(name)).ok()
    }
}

/// Identity hash for inbound idempotency: kind, type metadata and a payload
/// prefix. Deliberately independent of the content-level dedup hash: this
/// one recognizes the *same message* arriving twice, not the same capture.
pub fn message_hash(message: &Message) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.kind.as_str().as_bytes());
    hasher.update(b"|");
    if let Some(kind) = message.metadata.get("type").and_then(|v| v.as_str()) {
        hasher.update(kind.as_bytes());
    }
    hasher.update(b"|");
    let payload = serde_json::to_string(&message.payload).unwrap_or_default();
    let prefix: String = payload.chars().take(MESSAGE_HASH_PREFIX).collect();
    hasher.update(prefix.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Delivery failure as seen by a sender.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("no receiving end in context {0}")]
    NoReceiver(ContextId),
    #[error("message channel closed for context {0}")]
    ChannelClosed(ContextId),
}
