//! Capture record types

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Representation a capture was taken in.
/// Immutable once set on a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Text,
    Html,
    Markdown,
    Screenshot,
    Fullpage,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::Text => "text",
            CaptureKind::Html => "html",
            CaptureKind::Markdown => "markdown",
            CaptureKind::Screenshot => "screenshot",
            CaptureKind::Fullpage => "fullpage",
        }
    }

    /// Whether this kind requires a live selection to extract.
    pub fn needs_selection(&self) -> bool {
        matches!(
            self,
            CaptureKind::Text | CaptureKind::Html | CaptureKind::Markdown
        )
    }
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("screenshot content is not an image data URI")]
    NotADataUri,
    #[error("screenshot data URI payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("screenshot data URI payload is empty")]
    EmptyImage,
}

/// One persisted/transmitted capture.
///
/// Records are immutable after creation: panel edits go through
/// [`CaptureRecord::merged`], which produces a replacement record carrying
/// the same id, so concurrent readers never observe partial field mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureRecord {
    /// Time-based id with a random tiebreak suffix.
    pub id: String,

    #[serde(rename = "type")]
    pub kind: CaptureKind,

    /// Payload: plain string for text/markdown/html, a data-URI image for
    /// screenshot, an HTML subtree serialization for fullpage.
    pub content: String,

    /// Source page title.
    pub title: String,

    /// Source page URL.
    pub url: String,

    /// Capture instant, unix milliseconds.
    pub timestamp: i64,

    /// Open mapping: page meta tags, selection styling, per-kind diagnostics.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CaptureRecord {
    /// Build a new record, validating kind-specific content invariants.
    pub fn new(
        kind: CaptureKind,
        content: String,
        title: String,
        url: String,
    ) -> Result<Self, RecordError> {
        if kind == CaptureKind::Screenshot {
            validate_image_data_uri(&content)?;
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        Ok(Self {
            id: generate_record_id(timestamp),
            kind,
            content,
            title,
            url,
            timestamp,
            metadata: HashMap::new(),
        })
    }

    /// Insert a metadata entry, accepting anything JSON-serializable.
    pub fn set_meta(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Produce the replacement record for an edit: same id, kind and
    /// provenance, new content and merged metadata, fresh edit timestamp
    /// recorded under `edited_at`.
    pub fn merged(
        &self,
        content: String,
        extra_metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.extend(extra_metadata);
        metadata.insert(
            "edited_at".to_string(),
            serde_json::Value::from(chrono::Utc::now().timestamp_millis()),
        );

        Self {
            id: self.id.clone(),
            kind: self.kind,
            content,
            title: self.title.clone(),
            url: self.url.clone(),
            timestamp: self.timestamp,
            metadata,
        }
    }
}

/// Generate a record id from a millisecond timestamp plus a random hex
/// tiebreak, so near-simultaneous captures never collide.
pub fn generate_record_id(timestamp_millis: i64) -> String {
    use rand::Rng;
    let tiebreak: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("{}-{:06x}", timestamp_millis, tiebreak)
}

/// Check that screenshot content is a base64 image data URI.
fn validate_image_data_uri(content: &str) -> Result<(), RecordError> {
    let rest = content
        .strip_prefix("data:image/")
        .ok_or(RecordError::NotADataUri)?;
    let payload = rest
        .split_once(";base64,")
        .map(|(_, p)| p)
        .ok_or(RecordError::NotADataUri)?;
    if payload.is_empty() {
        return Err(RecordError::EmptyImage);
    }
    base64::engine::general_purpose::STANDARD.decode(payload)?;
    Ok(())
}

/// Outcome reported back to the sender of a capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOutcome {
    pub status: OutcomeStatus,
    pub action: OutcomeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeAction {
    Stored,
    Updated,
    Skipped,
    Failed,
}

impl CaptureOutcome {
    pub fn stored(id: String) -> Self {
        Self {
            status: OutcomeStatus::Ok,
            action: OutcomeAction::Stored,
            id: Some(id),
            message: None,
        }
    }

    pub fn updated(id: String) -> Self {
        Self {
            status: OutcomeStatus::Ok,
            action: OutcomeAction::Updated,
            id: Some(id),
            message: None,
        }
    }

    pub fn skipped(reason: &str) -> Self {
        Self {
            status: OutcomeStatus::Ok,
            action: OutcomeAction::Skipped,
            id: None,
            message: Some(reason.to_string()),
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            status: OutcomeStatus::Error,
            action: OutcomeAction::Failed,
            id: None,
            message: Some(message.to_string()),
        }
    }
}
