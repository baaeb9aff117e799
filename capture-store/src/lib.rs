//! Capture Store Library
//!
//! Persistence half of the capture pipeline: the capture record model, the
//! time-windowed dedup filter, and a bounded newest-first record store over
//! a local key-value backend. Designed to be embedded by the routing crate.

pub mod dedup;
pub mod kv;
pub mod record;
pub mod store;

pub use dedup::{capture_hash, DedupFilter};
pub use kv::{KeyValuePort, KvError, MemoryKeyValue, SqliteKeyValue};
pub use record::{CaptureKind, CaptureOutcome, CaptureRecord, OutcomeAction, OutcomeStatus};
pub use store::{AppendOutcome, CaptureStore, StoreConfig, StoreError};
