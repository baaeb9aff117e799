//! Time-windowed capture deduplication

use crate::record::CaptureKind;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How many content characters participate in the dedup hash.
const HASH_PREFIX_CHARS: usize = 256;

/// Windowed duplicate suppressor.
///
/// Each deployment point (page script, background service, panel) owns its
/// own instance guarding its own redundancy source: double DOM events,
/// duplicate message deliveries, duplicate renders. There is deliberately no
/// shared state between instances.
pub struct DedupFilter {
    /// hash → first time it was seen inside the current window
    seen: HashMap<String, Instant>,
    window: Duration,
}

impl DedupFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            window,
        }
    }

    /// Check-and-set: returns `true` if `hash` was already seen within the
    /// window, otherwise records it as seen now and returns `false`.
    pub fn check_and_record(&mut self, hash: &str) -> bool {
        self.check_and_record_at(hash, Instant::now())
    }

    /// Same as [`check_and_record`](Self::check_and_record) with an explicit
    /// clock, so tests don't have to sleep through real windows.
    pub fn check_and_record_at(&mut self, hash: &str, now: Instant) -> bool {
        // Lazy eviction on every check bounds memory without a sweep task.
        let window = self.window;
        self.seen
            .retain(|_, first_seen| now.duration_since(*first_seen) < window);

        if self.seen.contains_key(hash) {
            return true;
        }
        self.seen.insert(hash.to_string(), now);
        false
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Hash a capture's identity: kind, normalized source URL (when present) and
/// a normalized content prefix. Two captures of the same selection on the
/// same page hash equal even when the transport delivered them twice.
pub fn capture_hash(kind: CaptureKind, url: Option<&str>, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    if let Some(url) = url {
        hasher.update(normalize_url(url).as_bytes());
    }
    hasher.update(b"|");
    hasher.update(normalize_content_prefix(content).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Strip query parameters and fragments so tracking params don't defeat
/// dedup. Unparseable input is used as-is.
fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// First [`HASH_PREFIX_CHARS`] characters with whitespace runs collapsed.
fn normalize_content_prefix(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(HASH_PREFIX_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sight_is_not_duplicate() {
        let mut filter = DedupFilter::new(Duration::from_secs(5));
        assert!(!filter.check_and_record("hash123"));
    }

    #[test]
    fn test_repeat_within_window_is_duplicate() {
        let mut filter = DedupFilter::new(Duration::from_secs(5));
        assert!(!filter.check_and_record("hash123"));
        assert!(filter.check_and_record("hash123"));
    }

    #[test]
    fn test_repeat_after_window_is_fresh() {
        let mut filter = DedupFilter::new(Duration::from_millis(100));
        let start = Instant::now();
        assert!(!filter.check_and_record_at("hash123", start));
        assert!(filter.check_and_record_at("hash123", start + Duration::from_millis(50)));
        assert!(!filter.check_and_record_at("hash123", start + Duration::from_millis(150)));
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let mut filter = DedupFilter::new(Duration::from_millis(100));
        let start = Instant::now();
        filter.check_and_record_at("a", start);
        filter.check_and_record_at("b", start);
        assert_eq!(filter.len(), 2);

        filter.check_and_record_at("c", start + Duration::from_millis(200));
        // a and b aged out on access
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_capture_hash_stability() {
        let h1 = capture_hash(CaptureKind::Text, Some("https://example.com/a"), "hello");
        let h2 = capture_hash(CaptureKind::Text, Some("https://example.com/a"), "hello");
        let h3 = capture_hash(CaptureKind::Text, Some("https://example.com/a"), "hello!");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_capture_hash_ignores_query_and_whitespace() {
        let h1 = capture_hash(
            CaptureKind::Html,
            Some("https://example.com/post?utm_source=x#frag"),
            "some  content\n here",
        );
        let h2 = capture_hash(
            CaptureKind::Html,
            Some("https://example.com/post"),
            "some content here",
        );
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_capture_hash_distinguishes_kind() {
        let h1 = capture_hash(CaptureKind::Text, None, "same content");
        let h2 = capture_hash(CaptureKind::Markdown, None, "same content");
        assert_ne!(h1, h2);
    }
}
