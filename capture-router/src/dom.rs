//! Narrow page/DOM capability port.
//!
//! The classifier and extractor never talk to a rendering engine directly;
//! they see a page through this interface, so the logic runs against
//! in-memory fakes in tests and against a real DOM bridge in production.

use crate::classify::SelectionFragment;
use std::sync::atomic::{AtomicBool, Ordering};

/// Styling sampled from the selection's anchor node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionStyle {
    pub font_family: Option<String>,
    pub color: Option<String>,
}

/// What the extractor is allowed to ask of a live page.
pub trait PageDom: Send + Sync {
    /// The current selection, or None when nothing is selected.
    fn selection(&self) -> Option<SelectionFragment>;

    /// Serialized HTML of the cloned selection range.
    fn selection_html(&self) -> Option<String>;

    /// Computed styling of the selection, when one exists.
    fn selection_style(&self) -> Option<SelectionStyle>;

    fn page_title(&self) -> String;

    fn page_url(&self) -> String;

    /// `<meta>` name/property → content pairs, plus the canonical link.
    fn meta_tags(&self) -> Vec<(String, String)>;

    /// Serialized HTML of the first element matching `selector`, or None.
    fn region_html(&self, selector: &str) -> Option<String>;

    /// Serialized HTML of the whole document.
    fn document_html(&self) -> String;

    /// Toggle suppression of default link-navigation behavior. Full-page
    /// serialization holds this on and must restore it immediately after.
    fn suppress_link_navigation(&self, suppressed: bool);
}

/// In-memory page fake used by tests and the demo wiring.
#[derive(Default)]
pub struct StaticPageDom {
    pub title: String,
    pub url: String,
    pub selection_fragment: Option<SelectionFragment>,
    pub selection_markup: Option<String>,
    pub style: Option<SelectionStyle>,
    pub metas: Vec<(String, String)>,
    pub regions: Vec<(String, String)>,
    pub document: String,
    navigation_suppressed: AtomicBool,
}

impl StaticPageDom {
    pub fn new(title: &str, url: &str) -> Self {
        Self {
            title: title.to_string(),
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_selection(mut self, fragment: SelectionFragment, markup: &str) -> Self {
        self.selection_fragment = Some(fragment);
        self.selection_markup = Some(markup.to_string());
        self
    }

    pub fn with_style(mut self, style: SelectionStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_meta(mut self, name: &str, content: &str) -> Self {
        self.metas.push((name.to_string(), content.to_string()));
        self
    }

    pub fn with_region(mut self, selector: &str, html: &str) -> Self {
        self.regions.push((selector.to_string(), html.to_string()));
        self
    }

    pub fn with_document(mut self, html: &str) -> Self {
        self.document = html.to_string();
        self
    }

    pub fn link_navigation_suppressed(&self) -> bool {
        self.navigation_suppressed.load(Ordering::SeqCst)
    }
}

impl PageDom for StaticPageDom {
    fn selection(&self) -> Option<SelectionFragment> {
        self.selection_fragment.clone()
    }

    fn selection_html(&self) -> Option<String> {
        self.selection_markup.clone()
    }

    fn selection_style(&self) -> Option<SelectionStyle> {
        self.style.clone()
    }

    fn page_title(&self) -> String {
        self.title.clone()
    }

    fn page_url(&self) -> String {
        self.url.clone()
    }

    fn meta_tags(&self) -> Vec<(String, String)> {
        self.metas.clone()
    }

    fn region_html(&self, selector: &str) -> Option<String> {
        self.regions
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, html)| html.clone())
    }

    fn document_html(&self) -> String {
        self.document.clone()
    }

    fn suppress_link_navigation(&self, suppressed: bool) {
        self.navigation_suppressed.store(suppressed, Ordering::SeqCst);
    }
}
