//! Capture extraction.
//!
//! Materializes the payload for a chosen representation plus the shared
//! page-metadata block. Selection-based paths fail soft on an empty
//! selection; nothing here propagates a panic to the caller.

use crate::config::ExtractionConfig;
use crate::convert::{extract_plain_text, html_to_markdown};
use crate::dom::PageDom;
use crate::metadata;
use crate::types::CaptureError;
use capture_store::{CaptureKind, CaptureRecord};
use std::time::Instant;
use tracing::{debug, warn};

/// Extractor for the synchronous representations. Screenshots go through
/// [`ScreenshotService`](crate::screenshot::ScreenshotService) instead;
/// they are asynchronous and carry their own throttling.
pub struct CaptureExtractor {
    config: ExtractionConfig,
}

impl CaptureExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ExtractionConfig::default())
    }

    /// Produce a capture record of the requested kind from the live page.
    pub fn extract(
        &self,
        kind: CaptureKind,
        dom: &dyn PageDom,
    ) -> Result<CaptureRecord, CaptureError> {
        match kind {
            CaptureKind::Text => self.extract_text(dom),
            CaptureKind::Html => self.extract_html(dom),
            CaptureKind::Markdown => self.extract_markdown(dom),
            CaptureKind::Fullpage => self.extract_fullpage(dom),
            CaptureKind::Screenshot => Err(CaptureError::ExtractionFailed(
                "screenshot capture is asynchronous; use the screenshot service".to_string(),
            )),
        }
    }

    fn extract_text(&self, dom: &dyn PageDom) -> Result<CaptureRecord, CaptureError> {
        let fragment = dom.selection().ok_or(CaptureError::EmptySelection)?;
        if fragment.is_blank() {
            return Err(CaptureError::EmptySelection);
        }

        let content = fragment.text.clone();
        self.finish(CaptureKind::Text, content.clone(), &content, dom, true)
    }

    fn extract_html(&self, dom: &dyn PageDom) -> Result<CaptureRecord, CaptureError> {
        let markup = self.selection_markup(dom)?;
        let text = extract_plain_text(&markup);
        self.finish(CaptureKind::Html, markup, &text, dom, true)
    }

    /// Runs the HTML extraction path internally and converts; no side
    /// effects of its own beyond the shared metadata gathering.
    fn extract_markdown(&self, dom: &dyn PageDom) -> Result<CaptureRecord, CaptureError> {
        let markup = self.selection_markup(dom)?;
        let markdown = html_to_markdown(&markup);
        if markdown.trim().is_empty() {
            return Err(CaptureError::EmptySelection);
        }
        let text = markdown.clone();
        self.finish(CaptureKind::Markdown, markdown, &text, dom, true)
    }

    fn extract_fullpage(&self, dom: &dyn PageDom) -> Result<CaptureRecord, CaptureError> {
        let start = Instant::now();

        // Default link behavior stays off while we serialize, whatever path
        // exits this function.
        let _guard = NavigationGuard::hold(dom);

        let content = self.locate_main_content(dom);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if content.trim().is_empty() {
            warn!("fullpage extraction produced no content for {}", dom.page_url());
            return Err(CaptureError::ExtractionFailed(
                "document serialized to empty content".to_string(),
            ));
        }

        let text = extract_plain_text(&content);
        let mut record = self.finish(CaptureKind::Fullpage, content, &text, dom, false)?;
        record.set_meta("capture_ms", elapsed_ms);
        Ok(record)
    }

    /// Probe the configured selector priority list, accepting the first
    /// region whose serialization clears the size threshold; fall back to
    /// the whole document.
    fn locate_main_content(&self, dom: &dyn PageDom) -> String {
        for selector in &self.config.main_content_selectors {
            if let Some(html) = dom.region_html(selector) {
                if html.len() >= self.config.min_main_content_len {
                    debug!("main content matched selector {:?}", selector);
                    return html;
                }
                debug!(
                    "selector {:?} matched but only {} chars, continuing",
                    selector,
                    html.len()
                );
            }
        }
        dom.document_html()
    }

    fn selection_markup(&self, dom: &dyn PageDom) -> Result<String, CaptureError> {
        let markup = dom.selection_html().ok_or(CaptureError::EmptySelection)?;
        if extract_plain_text(&markup).is_empty() {
            return Err(CaptureError::EmptySelection);
        }
        Ok(markup)
    }

    /// Assemble the record plus the metadata block shared by every path.
    fn finish(
        &self,
        kind: CaptureKind,
        content: String,
        readable_text: &str,
        dom: &dyn PageDom,
        from_selection: bool,
    ) -> Result<CaptureRecord, CaptureError> {
        let content_size = content.len();
        let mut record =
            CaptureRecord::new(kind, content, dom.page_title(), dom.page_url())?;

        record.metadata = metadata::collect(dom, readable_text, self.config.excerpt_len);
        record.set_meta("content_size", content_size);

        if from_selection {
            if let Some(style) = dom.selection_style() {
                if let Some(font) = style.font_family {
                    record.set_meta("font_family", font);
                }
                if let Some(color) = style.color {
                    record.set_meta("color", color);
                }
            }
        }

        Ok(record)
    }
}

/// RAII hold on link-navigation suppression: released on drop, so an error
/// return can't leave the page with default navigation disabled.
struct NavigationGuard<'a> {
    dom: &'a dyn PageDom,
}

impl<'a> NavigationGuard<'a> {
    fn hold(dom: &'a dyn PageDom) -> Self {
        dom.suppress_link_navigation(true);
        Self { dom }
    }
}

impl Drop for NavigationGuard<'_> {
    fn drop(&mut self) {
        self.dom.suppress_link_navigation(false);
    }
}
