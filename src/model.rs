//! Canonical data model for a converted novel.
//!
//! The traversal engine produces [Chapter]s, the CLI wraps them in a [Novel]
//! together with the configured metadata, and the EPUB assembler consumes
//! that shape. Chapters are immutable once produced.

use serde::{Deserialize, Serialize};

/// One novel: configured metadata plus the chapters gathered by traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Novel {
    pub title: String,
    pub author: String,
    /// BCP 47 language code for the EPUB (e.g. "en", "fr").
    pub language: String,
    pub description: Option<String>,
    #[serde(rename = "coverUrl")]
    pub cover_url: Option<String>,
    /// Start URL of the traversal. Kept for logging and as the EPUB identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub chapters: Vec<Chapter>,
}

/// One chapter in traversal order.
///
/// `body` is minimal HTML (`<p>...</p>` only) as produced by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// 1-based position in the traversal sequence.
    pub index: u32,
    /// Page the chapter was extracted from.
    pub url: String,
    /// Extracted title, or the "Chapter N" default.
    pub title: String,
    pub body: String,
}

impl Chapter {
    /// Default title used when no title selector is configured or it matched nothing.
    pub fn default_title(index: u32) -> String {
        format!("Chapter {}", index)
    }
}
