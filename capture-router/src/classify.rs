//! Selection classification.
//!
//! Decides which capture representation best fits a DOM selection, based on
//! the element tags contained in its cloned fragment. Pure and synchronous;
//! never touches the DOM itself.

/// One element observed inside the selection's cloned fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentElement {
    /// Lowercase tag name.
    pub tag: String,
    /// Whether the element carries any attribute.
    pub has_attributes: bool,
}

impl FragmentElement {
    pub fn new(tag: &str, has_attributes: bool) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            has_attributes,
        }
    }

    /// Shorthand for an attribute-less element.
    pub fn plain(tag: &str) -> Self {
        Self::new(tag, false)
    }
}

/// The selection as the classifier sees it: its text and the elements of its
/// cloned fragment. Produced by the DOM port; trivially fake-able in tests.
#[derive(Debug, Clone, Default)]
pub struct SelectionFragment {
    pub text: String,
    pub elements: Vec<FragmentElement>,
}

impl SelectionFragment {
    pub fn new(text: &str, elements: Vec<FragmentElement>) -> Self {
        Self {
            text: text.to_string(),
            elements,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Capture representation chosen for a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Empty or whitespace-only selection; nothing to capture.
    None,
    Text,
    Html,
    Markdown,
}

/// Structureless wrappers that don't force HTML capture on their own.
const PLAIN_WRAPPERS: &[&str] = &["br", "p", "div", "span"];

/// Tags whose presence means the selection carries formatting worth keeping.
const RICH_TAGS: &[&str] = &[
    "a", "ul", "ol", "li", "table", "img", "strong", "em", "code",
];

/// Tags Markdown can represent without losing much.
const MARKDOWN_FRIENDLY_TAGS: &[&str] = &["p", "ul", "ol", "li", "a", "code", "blockquote"];

/// Embedded media and layout Markdown would silently discard.
const SPECIAL_TAGS: &[&str] = &["img", "video", "canvas", "svg", "table", "iframe"];

/// Markdown is only chosen while specials stay below this share of the
/// fragment's elements.
const SPECIAL_RATIO_THRESHOLD: f64 = 0.2;

fn is_heading(tag: &str) -> bool {
    matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Whether the selection needs an HTML-preserving capture: any attributed
/// element, any rich tag, or anything outside the plain-wrapper allowlist.
pub fn should_use_html_capture(fragment: &SelectionFragment) -> bool {
    fragment.elements.iter().any(|el| {
        el.has_attributes
            || is_heading(&el.tag)
            || RICH_TAGS.contains(&el.tag.as_str())
            || !PLAIN_WRAPPERS.contains(&el.tag.as_str())
    })
}

/// Whether a formatted selection is better kept as Markdown: at least one
/// Markdown-friendly element, and few enough specials that conversion won't
/// silently drop embedded media.
fn prefers_markdown(fragment: &SelectionFragment) -> bool {
    let total = fragment.elements.len();
    if total == 0 {
        return false;
    }

    let has_friendly = fragment
        .elements
        .iter()
        .any(|el| is_heading(&el.tag) || MARKDOWN_FRIENDLY_TAGS.contains(&el.tag.as_str()));
    if !has_friendly {
        return false;
    }

    let specials = fragment
        .elements
        .iter()
        .filter(|el| SPECIAL_TAGS.contains(&el.tag.as_str()))
        .count();

    (specials as f64 / total as f64) < SPECIAL_RATIO_THRESHOLD
}

/// Choose the capture representation for a selection.
pub fn classify(fragment: &SelectionFragment) -> Classification {
    if fragment.is_blank() {
        return Classification::None;
    }

    if !should_use_html_capture(fragment) {
        return Classification::Text;
    }

    if prefers_markdown(fragment) {
        Classification::Markdown
    } else {
        Classification::Html
    }
}
