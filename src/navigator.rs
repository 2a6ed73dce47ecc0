//! Next-chapter navigation. Tagged rule variants with exhaustive dispatch.
//!
//! `UrlPattern` rewrites a numeric capture in the current URL. The common
//! configuration is a two-group pattern like `(chapter-(\d+)\.html)`: the
//! outer group delimits the rewritten span and the inner group is the
//! chapter number. With a single group the group itself must be the number.

use regex::Regex;
use thiserror::Error;

/// Rule validation errors, surfaced at configuration time.
#[derive(Debug, Error)]
pub enum NavigationRuleError {
    #[error("invalid url_pattern regex {pattern:?}: {reason}")]
    BadPattern { pattern: String, reason: String },

    #[error("url_pattern regex {pattern:?} has no capturing group for the chapter number")]
    NoCaptureGroup { pattern: String },

    #[error("capture_group {group} is out of range for url_pattern regex {pattern:?}")]
    CaptureGroupOutOfRange { pattern: String, group: usize },

    #[error("increment_by must be a nonzero integer")]
    ZeroIncrement,
}

/// Computes the next chapter URL, or `None` when traversal is exhausted.
///
/// A pattern mismatch is "no next chapter", never an error: on most sites the
/// last chapter simply has no successor and the engine stops cleanly.
pub trait Navigator {
    fn next_url(&self, current: &str) -> Option<String>;
}

/// Strategy for locating the next chapter. `UrlPattern` is the only strategy
/// implemented; dispatch is an exhaustive match so new variants cannot be
/// silently ignored.
#[derive(Debug, Clone)]
pub enum NavigationRule {
    UrlPattern {
        pattern: Regex,
        /// Index of the capture group holding the chapter number.
        capture_group: usize,
        increment_by: i64,
    },
}

impl NavigationRule {
    /// Build a validated `UrlPattern` rule.
    ///
    /// When `capture_group` is not given, group 2 is used if the regex has at
    /// least two groups (outer-span/inner-number convention), else group 1.
    pub fn url_pattern(
        pattern: &str,
        capture_group: Option<usize>,
        increment_by: i64,
    ) -> Result<Self, NavigationRuleError> {
        let regex = Regex::new(pattern).map_err(|e| NavigationRuleError::BadPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        // captures_len counts group 0 (the whole match).
        let groups = regex.captures_len() - 1;
        if groups == 0 {
            return Err(NavigationRuleError::NoCaptureGroup {
                pattern: pattern.to_string(),
            });
        }
        if increment_by == 0 {
            return Err(NavigationRuleError::ZeroIncrement);
        }
        let capture_group = match capture_group {
            Some(g) => {
                if g == 0 || g > groups {
                    return Err(NavigationRuleError::CaptureGroupOutOfRange {
                        pattern: pattern.to_string(),
                        group: g,
                    });
                }
                g
            }
            None => {
                if groups >= 2 {
                    2
                } else {
                    1
                }
            }
        };
        Ok(NavigationRule::UrlPattern {
            pattern: regex,
            capture_group,
            increment_by,
        })
    }
}

impl Navigator for NavigationRule {
    fn next_url(&self, current: &str) -> Option<String> {
        match self {
            NavigationRule::UrlPattern {
                pattern,
                capture_group,
                increment_by,
            } => {
                let caps = pattern.captures(current)?;
                let group = caps.get(*capture_group)?;
                let number: u64 = group.as_str().parse().ok()?;
                // Clamp at zero; chapter numbers never go negative.
                let next = if *increment_by < 0 {
                    number.saturating_sub(increment_by.unsigned_abs())
                } else {
                    number.saturating_add(*increment_by as u64)
                };
                let mut rewritten = String::with_capacity(current.len());
                rewritten.push_str(&current[..group.start()]);
                rewritten.push_str(&next.to_string());
                rewritten.push_str(&current[group.end()..]);
                // A non-advancing rewrite would loop forever; treat it as the end.
                if rewritten == current {
                    return None;
                }
                Some(rewritten)
            }
        }
    }
}
