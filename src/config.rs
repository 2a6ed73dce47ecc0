//! Configuration: the per-novel TOML file driving a conversion, and the
//! optional app settings file for HTTP client defaults.
//!
//! Settings search order: ./pageturner.toml, then
//! $XDG_CONFIG_HOME/pageturner/config.toml (or ~/.config/pageturner/config.toml).

use crate::extractor::{ContentExtractor, ExtractorError, SelectorRule};
use crate::navigator::{NavigationRule, NavigationRuleError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

fn default_author() -> String {
    "Unknown".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_threshold() -> u32 {
    3
}

fn default_increment() -> i64 {
    1
}

/// Errors loading or validating a novel config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Navigation(#[from] NavigationRuleError),

    #[error(transparent)]
    Extractor(#[from] ExtractorError),
}

/// Next-chapter strategy as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavigationConfig {
    UrlPattern {
        pattern: String,
        /// Capture group holding the chapter number. Defaults to the inner
        /// group of a two-group pattern.
        capture_group: Option<usize>,
        #[serde(default = "default_increment")]
        increment_by: i64,
    },
}

/// Content selector as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectorConfig {
    CssSelector { selector: String },
}

/// One novel's conversion config (metadata, start URL, selectors, navigation).
#[derive(Debug, Deserialize)]
pub struct NovelConfig {
    pub title: String,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub start_url: String,
    #[serde(default = "default_threshold")]
    pub consecutive_empty_chapters_threshold: u32,
    pub navigation: NavigationConfig,
    pub content_selectors: Vec<SelectorConfig>,
    #[serde(default)]
    pub remove_elements: Vec<String>,
    pub chapter_title_selector: Option<String>,
}

impl NovelConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: NovelConfig = toml::from_str(&s).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.title.trim().is_empty() {
            return Err(ConfigError::Invalid("title must not be empty".to_string()));
        }
        if self.start_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "start_url must not be empty".to_string(),
            ));
        }
        if self.content_selectors.is_empty() {
            return Err(ConfigError::Invalid(
                "content_selectors must list at least one selector".to_string(),
            ));
        }
        if self.consecutive_empty_chapters_threshold == 0 {
            return Err(ConfigError::Invalid(
                "consecutive_empty_chapters_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Compile the configured navigation rule.
    pub fn navigation_rule(&self) -> Result<NavigationRule, ConfigError> {
        match &self.navigation {
            NavigationConfig::UrlPattern {
                pattern,
                capture_group,
                increment_by,
            } => Ok(NavigationRule::url_pattern(
                pattern,
                *capture_group,
                *increment_by,
            )?),
        }
    }

    /// Compile the configured content extractor.
    pub fn content_extractor(&self) -> Result<ContentExtractor, ConfigError> {
        let rules: Vec<SelectorRule> = self
            .content_selectors
            .iter()
            .map(|s| match s {
                SelectorConfig::CssSelector { selector } => {
                    SelectorRule::CssSelector(selector.clone())
                }
            })
            .collect();
        Ok(ContentExtractor::new(
            &rules,
            &self.remove_elements,
            self.chapter_title_selector.as_deref(),
        )?)
    }
}

/// App settings file contents. All fields optional; only present keys
/// override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Settings {
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts per page for transient failures.
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]).
    pub retry_backoff_secs: Option<Vec<u64>>,
}

/// Missing file returns Ok(None). Invalid TOML or an unreadable present file
/// returns Err.
pub fn load_settings() -> Result<Option<Settings>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("pageturner.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("pageturner").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read settings {}: {}", path.display(), e))?;
            let settings: Settings = toml::from_str(&s)
                .map_err(|e| format!("Invalid settings {}: {}", path.display(), e))?;
            return Ok(Some(settings));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::Navigator;

    const FULL_CONFIG: &str = r#"
        title = "The Wandering Inn"
        author = "pirateaba"
        language = "en"
        description = "An inn at the edge of the wilds."
        cover_image_url = "https://example.com/cover.jpg"
        start_url = "https://example.com/chapter-1.html"
        consecutive_empty_chapters_threshold = 2
        remove_elements = ["div.ads", ".author-note"]
        chapter_title_selector = "h1.entry-title"

        [navigation]
        type = "url_pattern"
        pattern = '(chapter-(\d+)\.html)'
        increment_by = 1

        [[content_selectors]]
        type = "css_selector"
        selector = "div.entry-content"

        [[content_selectors]]
        type = "css_selector"
        selector = "article"
    "#;

    const MINIMAL_CONFIG: &str = r#"
        title = "Some Novel"
        start_url = "https://example.com/1"

        [navigation]
        type = "url_pattern"
        pattern = '/(\d+)'

        [[content_selectors]]
        type = "css_selector"
        selector = "div.content"
    "#;

    #[test]
    fn parse_full_config() {
        let c: NovelConfig = toml::from_str(FULL_CONFIG).unwrap();
        assert_eq!(c.title, "The Wandering Inn");
        assert_eq!(c.author, "pirateaba");
        assert_eq!(c.consecutive_empty_chapters_threshold, 2);
        assert_eq!(c.remove_elements.len(), 2);
        assert_eq!(c.chapter_title_selector.as_deref(), Some("h1.entry-title"));
        assert_eq!(c.content_selectors.len(), 2);
        assert!(matches!(
            c.navigation,
            NavigationConfig::UrlPattern { increment_by: 1, .. }
        ));
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let c: NovelConfig = toml::from_str(MINIMAL_CONFIG).unwrap();
        assert_eq!(c.author, "Unknown");
        assert_eq!(c.language, "en");
        assert_eq!(c.consecutive_empty_chapters_threshold, 3);
        assert!(c.remove_elements.is_empty());
        assert!(c.chapter_title_selector.is_none());
        let NavigationConfig::UrlPattern { increment_by, .. } = &c.navigation;
        assert_eq!(*increment_by, 1);
    }

    #[test]
    fn compiled_rule_and_extractor_work() {
        let c: NovelConfig = toml::from_str(FULL_CONFIG).unwrap();
        let rule = c.navigation_rule().unwrap();
        assert_eq!(
            rule.next_url("https://example.com/chapter-1.html").as_deref(),
            Some("https://example.com/chapter-2.html")
        );
        let extractor = c.content_extractor().unwrap();
        let out = extractor
            .extract("<div class=\"entry-content\"><p>Hi.</p></div>")
            .unwrap();
        assert_eq!(out.body, "<p>Hi.</p>");
    }

    #[test]
    fn empty_title_is_invalid() {
        let s = MINIMAL_CONFIG.replace("\"Some Novel\"", "\"  \"");
        let c: NovelConfig = toml::from_str(&s).unwrap();
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_threshold_is_invalid() {
        // Must stay in the root table, so it goes right after start_url.
        let s = MINIMAL_CONFIG.replace(
            "start_url = \"https://example.com/1\"",
            "start_url = \"https://example.com/1\"\n        consecutive_empty_chapters_threshold = 0",
        );
        let c: NovelConfig = toml::from_str(&s).unwrap();
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_navigation_is_a_parse_error() {
        let s = "title = \"X\"\nstart_url = \"https://x/1\"\n";
        assert!(toml::from_str::<NovelConfig>(s).is_err());
    }

    #[test]
    fn bad_regex_surfaces_as_navigation_error() {
        let s = MINIMAL_CONFIG.replace(r"'/(\d+)'", r"'/(\d+'");
        let c: NovelConfig = toml::from_str(&s).unwrap();
        assert!(matches!(
            c.navigation_rule(),
            Err(ConfigError::Navigation(_))
        ));
    }

    #[test]
    fn bad_selector_surfaces_as_extractor_error() {
        let s = MINIMAL_CONFIG.replace("div.content", "div..bad..");
        let c: NovelConfig = toml::from_str(&s).unwrap();
        assert!(matches!(
            c.content_extractor(),
            Err(ConfigError::Extractor(_))
        ));
    }

    #[test]
    fn parse_empty_settings() {
        let s: Settings = toml::from_str("").unwrap();
        assert!(s.user_agent.is_none());
        assert!(s.request_delay_secs.is_none());
        assert!(s.timeout_secs.is_none());
        assert!(s.retry_count.is_none());
        assert!(s.retry_backoff_secs.is_none());
    }

    #[test]
    fn parse_full_settings() {
        let s: Settings = toml::from_str(
            r#"
            user_agent = "Custom/1.0"
            request_delay_secs = 3
            timeout_secs = 60
            retry_count = 5
            retry_backoff_secs = [1, 2, 4, 8]
        "#,
        )
        .unwrap();
        assert_eq!(s.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(s.request_delay_secs, Some(3));
        assert_eq!(s.timeout_secs, Some(60));
        assert_eq!(s.retry_count, Some(5));
        assert_eq!(s.retry_backoff_secs.as_deref(), Some([1, 2, 4, 8].as_slice()));
    }

    #[test]
    fn invalid_settings_toml_errors() {
        assert!(toml::from_str::<Settings>("user_agent = [").is_err());
    }
}
