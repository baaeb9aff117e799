//! Page metadata gathering.
//!
//! Every extraction path attaches the same curated provenance block:
//! domain, a subset of `<meta>` tags worth keeping, derived word/character
//! counts and a short excerpt.

use crate::dom::PageDom;
use std::collections::HashMap;

/// Meta tag names/properties worth carrying on a record. Everything else a
/// page declares is noise for this purpose.
pub const CURATED_META_KEYS: &[&str] = &[
    "description",
    "author",
    "keywords",
    "og:title",
    "og:description",
    "og:image",
    "og:site_name",
    "og:type",
    "twitter:card",
    "twitter:title",
    "twitter:description",
    "canonical",
];

/// Assemble the metadata block for a capture whose readable text is `text`.
pub fn collect(dom: &dyn PageDom, text: &str, excerpt_len: usize) -> HashMap<String, serde_json::Value> {
    let mut meta = HashMap::new();

    if let Some(domain) = domain_of(&dom.page_url()) {
        meta.insert("domain".to_string(), serde_json::Value::from(domain));
    }

    for (name, content) in dom.meta_tags() {
        let key = name.to_ascii_lowercase();
        if CURATED_META_KEYS.contains(&key.as_str()) && !content.trim().is_empty() {
            meta.insert(key, serde_json::Value::from(content));
        }
    }

    meta.insert(
        "word_count".to_string(),
        serde_json::Value::from(word_count(text)),
    );
    meta.insert(
        "char_count".to_string(),
        serde_json::Value::from(text.chars().count()),
    );

    let excerpt = excerpt(text, excerpt_len);
    if !excerpt.is_empty() {
        meta.insert("excerpt".to_string(), serde_json::Value::from(excerpt));
    }

    meta
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First `max_chars` characters with whitespace collapsed, ellipsized when
/// truncated.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn domain_of(page_url: &str) -> Option<String> {
    url::Url::parse(page_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::StaticPageDom;

    #[test]
    fn test_collect_curates_meta_tags() {
        let dom = StaticPageDom::new("Post", "https://blog.example.com/post")
            .with_meta("description", "A post")
            .with_meta("og:title", "Open Graph Title")
            .with_meta("viewport", "width=device-width")
            .with_meta("generator", "some-cms");

        let meta = collect(&dom, "one two three", 300);
        assert_eq!(meta.get("domain").and_then(|v| v.as_str()), Some("blog.example.com"));
        assert_eq!(meta.get("description").and_then(|v| v.as_str()), Some("A post"));
        assert_eq!(
            meta.get("og:title").and_then(|v| v.as_str()),
            Some("Open Graph Title")
        );
        assert!(!meta.contains_key("viewport"));
        assert!(!meta.contains_key("generator"));
        assert_eq!(meta.get("word_count").and_then(|v| v.as_u64()), Some(3));
    }

    #[test]
    fn test_excerpt_collapses_and_truncates() {
        assert_eq!(excerpt("a\n b\t\tc", 300), "a b c");

        let long = "word ".repeat(100);
        let cut = excerpt(&long, 20);
        assert_eq!(cut.chars().count(), 21);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("The quick brown fox"), 4);
        assert_eq!(word_count("  "), 0);
    }
}
