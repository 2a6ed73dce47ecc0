//! The traversal engine: drives loader -> extractor -> navigator across
//! iterations until one of the enumerated stop conditions fires.
//!
//! Termination is structural, not timeout-based: every iteration either adds
//! a never-seen URL to the visited set or stops, and consecutive pages with
//! no extractable content are bounded by the empty-chapter threshold.

use crate::extractor::ContentExtractor;
use crate::loader::{FetchError, PageLoader};
use crate::model::Chapter;
use crate::navigator::Navigator;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Why traversal stopped. Every run ends in exactly one of these; none of
/// them discards the chapters gathered so far.
#[derive(Debug)]
pub enum StopReason {
    /// The navigator found no next chapter (pattern mismatch or
    /// non-advancing rewrite). Normal end of a novel.
    NoMoreChapters,
    /// Too many consecutive pages without extractable content.
    EmptyThresholdReached,
    /// The next URL was already visited (redirect loop or bad rule).
    LoopDetected { url: String },
    /// A fetch failed before any chapter had been extracted.
    FetchFailedFatally(FetchError),
    /// The caller's cancellation token was set.
    Cancelled,
}

impl StopReason {
    /// True for the reasons that are ordinary termination rather than failure.
    pub fn is_normal_end(&self) -> bool {
        matches!(
            self,
            StopReason::NoMoreChapters
                | StopReason::EmptyThresholdReached
                | StopReason::LoopDetected { .. }
        )
    }
}

/// Result of a traversal run: the ordered chapters (possibly empty) and the
/// reason the run stopped.
#[derive(Debug)]
pub struct TraversalOutcome {
    pub chapters: Vec<Chapter>,
    pub stop: StopReason,
}

/// Per-run options.
pub struct TraversalOptions<'a> {
    /// Stop after this many consecutive content-less pages. Minimum 1.
    pub empty_chapter_threshold: u32,
    /// Called with the 1-based index after each extracted chapter.
    pub progress: Option<&'a dyn Fn(u32)>,
    /// Checked at the top of every iteration; set true to abort between
    /// chapters while keeping partial results.
    pub cancel: Option<&'a AtomicBool>,
}

impl Default for TraversalOptions<'_> {
    fn default() -> Self {
        Self {
            empty_chapter_threshold: 3,
            progress: None,
            cancel: None,
        }
    }
}

/// Sequential chapter traversal. Owns all mutable traversal state for the
/// duration of [run](TraversalEngine::run); collaborators are borrowed.
pub struct TraversalEngine<'a, L: PageLoader + ?Sized, N: Navigator + ?Sized> {
    loader: &'a mut L,
    navigator: &'a N,
    extractor: &'a ContentExtractor,
}

impl<'a, L: PageLoader + ?Sized, N: Navigator + ?Sized> TraversalEngine<'a, L, N> {
    pub fn new(loader: &'a mut L, navigator: &'a N, extractor: &'a ContentExtractor) -> Self {
        Self {
            loader,
            navigator,
            extractor,
        }
    }

    /// Traverse chapters starting at `start_url` until a stop condition fires.
    pub fn run(&mut self, start_url: &str, options: &TraversalOptions<'_>) -> TraversalOutcome {
        let threshold = options.empty_chapter_threshold.max(1);
        let mut visited: HashSet<String> = HashSet::new();
        let mut chapters: Vec<Chapter> = Vec::new();
        let mut consecutive_empty = 0u32;
        let mut current_url = start_url.to_string();

        loop {
            if let Some(cancel) = options.cancel {
                if cancel.load(Ordering::Relaxed) {
                    return TraversalOutcome {
                        chapters,
                        stop: StopReason::Cancelled,
                    };
                }
            }

            if !visited.insert(current_url.clone()) {
                eprintln!("URL loop: {} was already processed. Stopping.", current_url);
                return TraversalOutcome {
                    chapters,
                    stop: StopReason::LoopDetected { url: current_url },
                };
            }

            let html = match self.loader.fetch_page(&current_url) {
                Ok(html) => Some(html),
                Err(e) => {
                    // With no chapters gathered there is nothing to salvage;
                    // afterwards a bad page counts like an empty one so a
                    // single flaky URL never aborts the whole run.
                    if chapters.is_empty() {
                        return TraversalOutcome {
                            chapters,
                            stop: StopReason::FetchFailedFatally(e),
                        };
                    }
                    eprintln!("Fetch failed for {}: {}. Counting as empty.", current_url, e);
                    None
                }
            };

            match html.and_then(|h| self.extractor.extract(&h)) {
                Some(extracted) => {
                    consecutive_empty = 0;
                    let index = chapters.len() as u32 + 1;
                    let title = extracted
                        .title
                        .unwrap_or_else(|| Chapter::default_title(index));
                    chapters.push(Chapter {
                        index,
                        url: current_url.clone(),
                        title,
                        body: extracted.body,
                    });
                    if let Some(progress) = options.progress {
                        progress(index);
                    }
                }
                None => {
                    consecutive_empty += 1;
                    if consecutive_empty >= threshold {
                        eprintln!(
                            "{} consecutive chapters with no content. Assuming end of novel.",
                            consecutive_empty
                        );
                        return TraversalOutcome {
                            chapters,
                            stop: StopReason::EmptyThresholdReached,
                        };
                    }
                    eprintln!(
                        "No content at {} ({}/{} consecutive empty).",
                        current_url, consecutive_empty, threshold
                    );
                }
            }

            match self.navigator.next_url(&current_url) {
                Some(next) => current_url = next,
                None => {
                    return TraversalOutcome {
                        chapters,
                        stop: StopReason::NoMoreChapters,
                    };
                }
            }
        }
    }
}
