//! Rule-driven chapter extraction: prioritized content selectors, removal of
//! unwanted sub-elements (ads, author notes), optional title selector, and
//! text normalization to minimal `<p>...</p>` HTML.

use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;

/// Selector strategy for locating content. Only CSS selectors are supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorRule {
    CssSelector(String),
}

impl SelectorRule {
    fn as_str(&self) -> &str {
        match self {
            SelectorRule::CssSelector(s) => s,
        }
    }
}

/// Extractor construction errors. All selectors come from user configuration,
/// so a bad one is reported with its text rather than panicking later.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("content_selectors cannot be empty")]
    NoContentSelectors,

    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

fn parse_selector(sel: &str) -> Result<Selector, ExtractorError> {
    Selector::parse(sel).map_err(|e| ExtractorError::InvalidSelector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// Result of a successful extraction. `title` is `None` when no title
/// selector was configured or it matched nothing; the caller falls back to
/// the default chapter title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: Option<String>,
    /// Minimal HTML: one `<p>` per paragraph, inner text escaped.
    pub body: String,
}

/// Extracts chapter text from raw page HTML using configured selectors.
pub struct ContentExtractor {
    content_selectors: Vec<Selector>,
    remove_selectors: Vec<Selector>,
    title_selector: Option<Selector>,
}

impl ContentExtractor {
    pub fn new(
        content_selectors: &[SelectorRule],
        remove_selectors: &[String],
        title_selector: Option<&str>,
    ) -> Result<Self, ExtractorError> {
        if content_selectors.is_empty() {
            return Err(ExtractorError::NoContentSelectors);
        }
        let content = content_selectors
            .iter()
            .map(|r| parse_selector(r.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let remove = remove_selectors
            .iter()
            .map(|s| parse_selector(s))
            .collect::<Result<Vec<_>, _>>()?;
        let title = title_selector.map(parse_selector).transpose()?;
        Ok(Self {
            content_selectors: content,
            remove_selectors: remove,
            title_selector: title,
        })
    }

    /// Extract title and body from a chapter page.
    ///
    /// Content selectors are tried in priority order; the first whose subtree
    /// still holds non-whitespace text (after removal and the unconditional
    /// script/style discard) wins. `None` means no content was found, which
    /// is a stop signal for the engine, not an error.
    pub fn extract(&self, html: &str) -> Option<Extracted> {
        let mut doc = Html::parse_document(html);

        // Title first: a title selector may match inside an element that the
        // removal pass strips. Failure here is non-fatal by design.
        let title = self
            .title_selector
            .as_ref()
            .and_then(|sel| doc.select(sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());

        // Strip removable elements document-wide so ads and notes disappear
        // no matter which content selector ends up matching.
        let remove_ids: Vec<_> = self
            .remove_selectors
            .iter()
            .flat_map(|sel| doc.select(sel).map(|el| el.id()))
            .collect();
        for id in remove_ids {
            if let Some(mut node) = doc.tree.get_mut(id) {
                node.detach();
            }
        }

        // A selector can match several elements; the first one with actual
        // text wins before falling through to the next selector.
        for sel in &self.content_selectors {
            for el in doc.select(sel) {
                let paragraphs = element_paragraphs(el);
                if !paragraphs.is_empty() {
                    let body = paragraphs
                        .iter()
                        .map(|p| format!("<p>{}</p>", html_escape_inner(p)))
                        .collect::<Vec<_>>()
                        .join("");
                    return Some(Extracted { title, body });
                }
            }
        }
        None
    }
}

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "blockquote", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Collect the element's text as normalized paragraphs: block boundaries and
/// `<br>` split paragraphs, whitespace collapses, script/style are skipped.
fn element_paragraphs(el: ElementRef<'_>) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    collect_text(el, &mut paragraphs, &mut current);
    flush(&mut paragraphs, &mut current);
    paragraphs
}

fn collect_text(el: ElementRef<'_>, paragraphs: &mut Vec<String>, current: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => current.push_str(&text.text),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = child_el.value().name();
                if name == "script" || name == "style" {
                    continue;
                }
                if name == "br" {
                    flush(paragraphs, current);
                } else if BLOCK_ELEMENTS.contains(&name) {
                    flush(paragraphs, current);
                    collect_text(child_el, paragraphs, current);
                    flush(paragraphs, current);
                } else {
                    collect_text(child_el, paragraphs, current);
                }
            }
            _ => {}
        }
    }
}

/// Collapse redundant whitespace in the pending paragraph; drop it if blank.
fn flush(paragraphs: &mut Vec<String>, current: &mut String) {
    let normalized = current.split_whitespace().collect::<Vec<_>>().join(" ");
    current.clear();
    if !normalized.is_empty() {
        paragraphs.push(normalized);
    }
}

fn html_escape_inner(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
