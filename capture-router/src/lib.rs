//! Capture Router - Web capture pipeline core
//!
//! This crate provides the capture half of the pipeline: deciding which
//! representation fits a DOM selection, materializing the payload, and
//! moving the resulting record between the three execution contexts:
//!
//! - **Page**: classifies and extracts against the live DOM
//! - **Background**: deduplicates, persists, forwards
//! - **Panel**: renders, edits, deletes through the same store
//!
//! # Architecture
//!
//! Contexts never share memory. They coordinate through typed messages over
//! a best-effort, at-most-once [`bus::MessagePort`] and through the bounded
//! capture store. Duplicate suppression runs independently at each context,
//! because each one guards a different redundancy source.

pub mod background;
pub mod bus;
pub mod capture;
pub mod classify;
pub mod config;
pub mod convert;
pub mod dom;
pub mod extract;
pub mod message;
pub mod metadata;
pub mod panel;
pub mod router;
pub mod screenshot;
pub mod types;

// Re-export commonly used types
pub use background::BackgroundService;
pub use bus::{ChaosBus, Fault, InProcessBus, MessagePort};
pub use capture::PageCaptureController;
pub use classify::{classify, should_use_html_capture, Classification, FragmentElement, SelectionFragment};
pub use config::Config;
pub use convert::{extract_plain_text, html_to_markdown, markdown_to_html};
pub use dom::{PageDom, SelectionStyle, StaticPageDom};
pub use extract::CaptureExtractor;
pub use message::{message_hash, ContextId, DeliveryError, Message, MessageKind};
pub use panel::PanelService;
pub use router::MessageRouter;
pub use screenshot::{ScreenCaptureError, ScreenCapturePort, ScreenshotService};
pub use types::{CaptureError, CaptureRequest, TriggerSource};
