//! CLI parsing and orchestration. Loads the novel config, runs the traversal
//! engine, and writes EPUB or JSON. Maps errors to exit codes.

use crate::config::{self, ConfigError, NovelConfig};
use crate::engine::{StopReason, TraversalEngine, TraversalOptions};
use crate::epub::{write_epub, CoverImage, EpubError};
use crate::loader::{FetchError, HttpLoader, PageLoader};
use crate::model::Novel;
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message. Exit codes: 1 for bad input or
/// config, 2 for a fatally failed traversal, 3 for output failures.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Epub(#[from] EpubError),

    #[error("{0}")]
    Output(String),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Config(_) => 1,
            CliRunError::Fetch(_) => 2,
            CliRunError::Epub(_) | CliRunError::Output(_) => 3,
        }
    }
}

/// Output format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Epub,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "pageturner")]
#[command(about = "Convert a web novel to EPUB by following chapter URLs")]
#[command(
    after_help = "Settings file keys (user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs) are read from ./pageturner.toml or the user config directory. CLI flags override settings."
)]
pub struct Args {
    /// Path to the novel's TOML config file.
    #[arg(short, long, default_value = "novel.toml")]
    pub config: PathBuf,

    /// Output path. Default: ./{sanitized-title}.{ext} where ext depends on --format.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format: epub or json.
    #[arg(long, default_value = "epub", value_parser = parse_format)]
    pub format: OutputFormat,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Print verbose error chain.
    #[arg(long)]
    pub verbose: bool,

    /// HTTP User-Agent (overrides settings).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides settings; default 2).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides settings; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "epub" => Ok(OutputFormat::Epub),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!("Invalid --format value: '{}'. Use epub or json.", s)),
    }
}

fn extension_for_format(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Epub => "epub",
        OutputFormat::Json => "json",
    }
}

/// Sanitize the novel title to a safe filename: lowercase, spaces and
/// special characters become `-`.
fn sanitize_title(title: &str) -> String {
    let mut s = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>();
    while s.contains("--") {
        s = s.replace("--", "-");
    }
    s = s.trim_matches('-').to_string();
    if s.is_empty() {
        s = "novel".to_string();
    }
    s
}

fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

fn describe_stop(stop: &StopReason) -> String {
    match stop {
        StopReason::NoMoreChapters => "no next chapter".to_string(),
        StopReason::EmptyThresholdReached => "empty chapter threshold reached".to_string(),
        StopReason::LoopDetected { url } => format!("URL loop at {}", url),
        StopReason::FetchFailedFatally(e) => format!("fetch failed: {}", e),
        StopReason::Cancelled => "cancelled".to_string(),
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code
/// and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let novel_config = NovelConfig::load(&args.config)?;
    let settings = config::load_settings().map_err(CliRunError::InvalidInput)?;

    let delay_secs = args
        .delay
        .or_else(|| settings.as_ref().and_then(|s| s.request_delay_secs))
        .unwrap_or(crate::loader::DEFAULT_DELAY_SECS);
    let timeout_secs = args
        .timeout
        .or_else(|| settings.as_ref().and_then(|s| s.timeout_secs))
        .unwrap_or(crate::loader::DEFAULT_TIMEOUT_SECS);
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| settings.as_ref().and_then(|s| s.user_agent.clone()));

    let mut builder = HttpLoader::builder()
        .delay_secs(delay_secs)
        .timeout_secs(timeout_secs);
    if let Some(n) = settings.as_ref().and_then(|s| s.retry_count) {
        builder = builder.retry_count(n);
    }
    if let Some(backoff) = settings.as_ref().and_then(|s| s.retry_backoff_secs.clone()) {
        builder = builder.retry_backoff_secs(backoff);
    }
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    let mut loader = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    let rule = novel_config.navigation_rule()?;
    let extractor = novel_config.content_extractor()?;

    // Chapter total is unknown up front (there is no TOC), so progress is a
    // spinner with a running count rather than a bar.
    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32| {
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new_spinner();
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_message(format!("Fetched chapter {}", n));
    };
    let progress: Option<&dyn Fn(u32)> = if args.quiet { None } else { Some(&progress_cb) };

    let outcome = {
        let mut engine = TraversalEngine::new(&mut loader, &rule, &extractor);
        engine.run(
            &novel_config.start_url,
            &TraversalOptions {
                empty_chapter_threshold: novel_config.consecutive_empty_chapters_threshold,
                progress,
                cancel: None,
            },
        )
    };

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    // Normal ends are chatty only; abnormal stops print even under --quiet.
    if !args.quiet || !outcome.stop.is_normal_end() {
        eprintln!(
            "Traversal stopped ({}); {} chapter(s) extracted.",
            describe_stop(&outcome.stop),
            outcome.chapters.len()
        );
    }

    if let StopReason::FetchFailedFatally(e) = outcome.stop {
        return Err(CliRunError::Fetch(e));
    }

    if outcome.chapters.is_empty() {
        eprintln!("No chapters were extracted; nothing to write.");
        return Ok(());
    }

    let novel = Novel {
        title: novel_config.title.clone(),
        author: novel_config.author.clone(),
        language: novel_config.language.clone(),
        description: novel_config.description.clone(),
        cover_url: novel_config.cover_image_url.clone(),
        source_url: Some(novel_config.start_url.clone()),
        chapters: outcome.chapters,
    };

    let output_path = match &args.output {
        Some(p) => p.clone(),
        None => {
            let base = sanitize_title(&novel.title);
            PathBuf::from(format!("{}.{}", base, extension_for_format(args.format)))
        }
    };
    validate_output_path(&output_path)?;

    match args.format {
        OutputFormat::Json => {
            let f = std::fs::File::create(&output_path).map_err(|e| {
                CliRunError::Output(format!("Cannot create {}: {}", output_path.display(), e))
            })?;
            serde_json::to_writer_pretty(f, &novel)
                .map_err(|e| CliRunError::Output(format!("Failed to write JSON: {}", e)))?;
        }
        OutputFormat::Epub => {
            let cover = fetch_cover(&novel, &mut loader);
            if let Err(e) = write_epub(&novel, cover.as_ref(), &output_path) {
                // Assembly is fatal, but the scrape is not wasted: dump the
                // gathered chapters next to the intended output.
                match save_partial_chapters(&novel, &output_path) {
                    Ok(dump) => eprintln!("Saved gathered chapters to {}", dump.display()),
                    Err(dump_err) => {
                        eprintln!("Could not save gathered chapters: {}", dump_err)
                    }
                }
                return Err(CliRunError::Epub(e));
            }
        }
    }

    if !args.quiet {
        eprintln!("Wrote {}", output_path.display());
    }
    Ok(())
}

/// Preserve the gathered chapters as JSON next to the intended output when
/// EPUB assembly fails. Returns the dump path.
fn save_partial_chapters(novel: &Novel, output_path: &Path) -> Result<PathBuf, std::io::Error> {
    let dump = output_path.with_extension("partial.json");
    let f = std::fs::File::create(&dump)?;
    serde_json::to_writer_pretty(f, novel)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(dump)
}

/// Fetch the configured cover image. Failure degrades to no cover with a
/// warning; it never fails the conversion.
fn fetch_cover(novel: &Novel, loader: &mut dyn PageLoader) -> Option<CoverImage> {
    let url = novel.cover_url.as_deref().filter(|u| !u.is_empty())?;
    match loader.fetch_bytes(url) {
        Ok(data) => Some(CoverImage {
            data,
            ext: CoverImage::ext_for(None, url),
        }),
        Err(e) => {
            eprintln!("Cover image could not be fetched ({}): {}. Skipping cover.", url, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_title_empty() {
        assert_eq!(sanitize_title(""), "novel");
    }

    #[test]
    fn sanitize_title_spaces_and_special_to_dashes() {
        assert_eq!(sanitize_title("My  Story!"), "my-story");
    }

    #[test]
    fn sanitize_title_collapse_dashes_and_trim() {
        assert_eq!(sanitize_title("  --  a  --  b  --  "), "a-b");
    }

    #[test]
    fn sanitize_title_lowercases() {
        assert_eq!(sanitize_title("The Wandering Inn"), "the-wandering-inn");
    }

    #[test]
    fn parse_format_values() {
        assert_eq!(parse_format("epub").unwrap(), OutputFormat::Epub);
        assert_eq!(parse_format("EPUB").unwrap(), OutputFormat::Epub);
        assert_eq!(parse_format("json").unwrap(), OutputFormat::Json);
        assert!(parse_format("pdf").is_err());
    }

    #[test]
    fn extension_for_format_each() {
        assert_eq!(extension_for_format(OutputFormat::Epub), "epub");
        assert_eq!(extension_for_format(OutputFormat::Json), "json");
    }

    #[test]
    fn validate_output_path_parent_exists() {
        let path = std::env::temp_dir().join("pageturner_cli_test_output.epub");
        assert!(validate_output_path(&path).is_ok());
    }

    #[test]
    fn validate_output_path_parent_missing() {
        let path = PathBuf::from("/nonexistent_dir_pageturner_xyz/output.epub");
        let result = validate_output_path(&path);
        assert!(result.is_err());
        if let Err(CliRunError::InvalidInput(msg)) = result {
            assert!(msg.contains("parent directory does not exist"));
        }
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Config(ConfigError::Invalid("x".into())).exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Fetch(FetchError::Permanent {
                url: "http://x/".into(),
                status: 404
            })
            .exit_code(),
            2
        );
        assert_eq!(CliRunError::Epub(EpubError::EmptyTitle).exit_code(), 3);
        assert_eq!(CliRunError::Output("x".into()).exit_code(), 3);
    }

    #[test]
    fn assembly_failure_preserves_partial_chapters() {
        use crate::model::Chapter;

        let novel = Novel {
            title: "Partial".to_string(),
            author: "Unknown".to_string(),
            language: "en".to_string(),
            description: None,
            cover_url: None,
            source_url: Some("https://site.example/chapter-1.html".to_string()),
            chapters: vec![Chapter {
                index: 1,
                url: "https://site.example/chapter-1.html".to_string(),
                title: "Chapter 1".to_string(),
                body: "<p>Text.</p>".to_string(),
            }],
        };

        // A directory at the output path makes EPUB creation fail, the same
        // failure mode the dump exists for.
        let out = std::env::temp_dir().join("pageturner_cli_partial.epub");
        std::fs::create_dir_all(&out).unwrap();
        let result = write_epub(&novel, None, &out);
        assert!(matches!(result, Err(EpubError::CreateFile { .. })));

        let dump = save_partial_chapters(&novel, &out).unwrap();
        assert_eq!(
            dump,
            std::env::temp_dir().join("pageturner_cli_partial.partial.json")
        );
        let parsed: Novel =
            serde_json::from_str(&std::fs::read_to_string(&dump).unwrap()).unwrap();
        assert_eq!(parsed.chapters.len(), 1);
        assert_eq!(parsed.chapters[0].title, "Chapter 1");
        assert_eq!(parsed.chapters[0].body, "<p>Text.</p>");

        std::fs::remove_file(&dump).ok();
        std::fs::remove_dir(&out).ok();
    }

    #[test]
    fn describe_stop_mentions_loop_url() {
        let s = describe_stop(&StopReason::LoopDetected {
            url: "https://x/chapter-3.html".to_string(),
        });
        assert!(s.contains("chapter-3"));
    }
}
