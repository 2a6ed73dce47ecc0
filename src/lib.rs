//! pageturner: config-driven web novel to EPUB converter.
//!
//! Chapters are discovered by rewriting a numeric component of the current
//! URL (no table of contents required), extracted with prioritized CSS
//! selectors, and assembled into an EPUB 3 file.

pub mod cli;
pub mod config;
pub mod engine;
pub mod epub;
pub mod extractor;
pub mod loader;
pub mod model;
pub mod navigator;

// Re-exports for library consumers.
pub use engine::{StopReason, TraversalEngine, TraversalOptions, TraversalOutcome};
pub use epub::{write_epub, CoverImage, EpubError};
pub use extractor::{ContentExtractor, Extracted, ExtractorError, SelectorRule};
pub use loader::{FetchError, HttpLoader, HttpLoaderBuilder, PageLoader};
pub use model::{Chapter, Novel};
pub use navigator::{NavigationRule, NavigationRuleError, Navigator};
