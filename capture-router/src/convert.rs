//! Representation conversion: HTML → Markdown, Markdown → HTML (preview),
//! HTML → plain text.
//!
//! Best-effort rule-based rewriting, not a conforming parser. Every function
//! is total: malformed input degrades to text extraction, nothing panics.
//! Rule order matters: headings and anchors must run before the
//! generic tag strip, or their text survives but the markup is lost.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref SCRIPT_BLOCK: Regex =
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)\s*>").unwrap();
    static ref STRONG: Regex =
        Regex::new(r"(?is)<(?:strong|b)(?:\s[^>]*)?>(.*?)</(?:strong|b)\s*>").unwrap();
    static ref EMPHASIS: Regex =
        Regex::new(r"(?is)<(?:em|i)(?:\s[^>]*)?>(.*?)</(?:em|i)\s*>").unwrap();
    static ref INLINE_CODE: Regex =
        Regex::new(r"(?is)<code(?:\s[^>]*)?>(.*?)</code\s*>").unwrap();
    static ref HEADING: Regex =
        Regex::new(r"(?is)<h([1-6])(?:\s[^>]*)?>(.*?)</h[1-6]\s*>").unwrap();
    static ref ANCHOR: Regex = Regex::new(
        r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#
    )
    .unwrap();
    static ref LIST_ITEM_OPEN: Regex = Regex::new(r"(?i)<li(?:\s[^>]*)?>").unwrap();
    static ref LIST_ITEM_CLOSE: Regex = Regex::new(r"(?i)</li\s*>").unwrap();
    static ref BLOCKQUOTE_OPEN: Regex = Regex::new(r"(?i)<blockquote(?:\s[^>]*)?>").unwrap();
    static ref BLOCKQUOTE_CLOSE: Regex = Regex::new(r"(?i)</blockquote\s*>").unwrap();
    static ref LINE_BREAK: Regex = Regex::new(r"(?i)<br\s*/?>").unwrap();
    static ref PARAGRAPH_CLOSE: Regex = Regex::new(r"(?i)</(?:p|div)\s*>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"(?s)</?[a-zA-Z][^>]*>").unwrap();
    static ref NUMERIC_ENTITY: Regex = Regex::new(r"&#(x[0-9a-fA-F]{1,6}|[0-9]{1,7});").unwrap();
    static ref EXCESS_NEWLINES: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref MD_HEADING: Regex = Regex::new(r"^(#{1,6})\s+(.*)$").unwrap();
    static ref MD_BOLD: Regex = Regex::new(r"\*\*([^*]+)\*\*").unwrap();
    static ref MD_EMPHASIS: Regex = Regex::new(r"\*([^*]+)\*").unwrap();
    static ref MD_CODE: Regex = Regex::new(r"`([^`]+)`").unwrap();
    static ref MD_LINK: Regex = Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap();
}

/// Convert an HTML fragment to Markdown.
pub fn html_to_markdown(html: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(html, "");

    let text = STRONG.replace_all(&text, "**$1**");
    let text = EMPHASIS.replace_all(&text, "*$1*");
    let text = INLINE_CODE.replace_all(&text, "`$1`");

    let text = HEADING.replace_all(&text, |caps: &Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("{} {}\n\n", "#".repeat(level), caps[2].trim())
    });

    let text = ANCHOR.replace_all(&text, |caps: &Captures| {
        format!("[{}]({})", caps[2].trim(), &caps[1])
    });

    let text = LIST_ITEM_OPEN.replace_all(&text, "- ");
    let text = LIST_ITEM_CLOSE.replace_all(&text, "\n");
    let text = BLOCKQUOTE_OPEN.replace_all(&text, "> ");
    let text = BLOCKQUOTE_CLOSE.replace_all(&text, "\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = PARAGRAPH_CLOSE.replace_all(&text, "\n\n");

    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");

    text.trim().to_string()
}

/// Approximate inverse of [`html_to_markdown`], for preview rendering only.
/// Not expected to round-trip.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() + markdown.len() / 4);

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(caps) = MD_HEADING.captures(trimmed) {
            let level = caps[1].len();
            out.push_str(&format!(
                "<h{level}>{}</h{level}>\n",
                inline_markdown_to_html(&caps[2])
            ));
        } else if let Some(item) = trimmed.strip_prefix("- ") {
            out.push_str(&format!("<li>{}</li>\n", inline_markdown_to_html(item)));
        } else if let Some(quoted) = trimmed.strip_prefix("> ") {
            out.push_str(&format!(
                "<blockquote>{}</blockquote>\n",
                inline_markdown_to_html(quoted)
            ));
        } else {
            out.push_str(&format!("<p>{}</p>\n", inline_markdown_to_html(trimmed)));
        }
    }

    out.trim_end().to_string()
}

fn inline_markdown_to_html(line: &str) -> String {
    let text = MD_CODE.replace_all(line, "<code>$1</code>");
    let text = MD_BOLD.replace_all(&text, "<strong>$1</strong>");
    let text = MD_EMPHASIS.replace_all(&text, "<em>$1</em>");
    let text = MD_LINK.replace_all(&text, r#"<a href="$2">$1</a>"#);
    text.into_owned()
}

/// Strip all markup and return text content only, whitespace collapsed.
pub fn extract_plain_text(html: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(html, "");
    let text = LINE_BREAK.replace_all(&text, " ");
    let text = ANY_TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode numeric entities plus the common named set. `&amp;` is decoded
/// last so `&amp;lt;` doesn't double-decode.
fn decode_entities(text: &str) -> String {
    let text = NUMERIC_ENTITY.replace_all(text, |caps: &Captures| {
        let body = &caps[1];
        let code = if let Some(hex) = body.strip_prefix('x') {
            u32::from_str_radix(hex, 16).ok()
        } else {
            body.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    });

    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bold_paragraph() {
        let markdown = html_to_markdown("<p>Hello <strong>world</strong></p>");
        assert_eq!(markdown, "Hello **world**");
    }

    #[test]
    fn test_headings() {
        let markdown = html_to_markdown("<h1>Title</h1><h3 class=\"sub\">Sub</h3>");
        assert_eq!(markdown, "# Title\n\n### Sub");
    }

    #[test]
    fn test_anchor_keeps_href() {
        let markdown =
            html_to_markdown(r#"<p>See <a href="https://example.com/docs">the docs</a>.</p>"#);
        assert_eq!(markdown, "See [the docs](https://example.com/docs).");
    }

    #[test]
    fn test_list_items() {
        let markdown = html_to_markdown("<ul><li>one</li><li>two</li></ul>");
        assert_eq!(markdown, "- one\n- two");
    }

    #[test]
    fn test_emphasis_and_code() {
        let markdown = html_to_markdown("<p><em>soft</em> and <code>hard()</code></p>");
        assert_eq!(markdown, "*soft* and `hard()`");
    }

    #[test]
    fn test_entities_decoded() {
        let markdown = html_to_markdown("<p>a &amp; b &lt; c&nbsp;&#8212;&#x27;d&#x27;</p>");
        assert_eq!(markdown, "a & b < c \u{2014}'d'");
    }

    #[test]
    fn test_unknown_tags_stripped_text_survives() {
        let markdown = html_to_markdown("<article><section>kept text</section></article>");
        assert_eq!(markdown, "kept text");
    }

    #[test]
    fn test_scripts_dropped_entirely() {
        let markdown = html_to_markdown("<p>before</p><script>alert(1)</script><p>after</p>");
        assert_eq!(markdown, "before\n\nafter");
    }

    #[test]
    fn test_malformed_input_degrades_to_text() {
        let markdown = html_to_markdown("<p>unclosed <strong>bold");
        assert_eq!(markdown, "unclosed bold");
    }

    #[test]
    fn test_markdown_to_html_preview() {
        let html = markdown_to_html("# Title\n\nHello **world** with [a link](https://example.com)");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>world</strong>"));
        assert!(html.contains(r#"<a href="https://example.com">a link</a>"#));
    }

    #[test]
    fn test_markdown_list_and_quote_preview() {
        let html = markdown_to_html("- item\n> wise words");
        assert!(html.contains("<li>item</li>"));
        assert!(html.contains("<blockquote>wise words</blockquote>"));
    }

    #[test]
    fn test_plain_text_extraction() {
        let text = extract_plain_text("<h1>Title</h1><p>Some <em>body</em>\ntext.</p>");
        assert_eq!(text, "Title Some body text.");
    }

    #[test]
    fn test_plain_text_of_empty_input() {
        assert_eq!(extract_plain_text(""), "");
        assert_eq!(extract_plain_text("<div></div>"), "");
    }
}
