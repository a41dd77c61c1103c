//! CLI parsing and orchestration. Parses args, resolves config, runs the export, maps errors to exit codes.

use crate::config;
use crate::export::{dry_run, export_blog, validate_page_size, ExportOptions, ExportResult};
use crate::formats::OutputFormat;
use crate::tumblr::{BlogId, ExportError, PoliteClient, PostType, TumblrApi, MAX_PAGE_SIZE};
use crate::VERSION;
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl CliRunError {
    /// 1 = bad arguments or config, 2 = page fetch failed, 3 = local write failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Export(e) if e.is_invalid_argument() => 1,
            CliRunError::Export(ExportError::Fetch { .. }) => 2,
            CliRunError::Export(_) => 3,
        }
    }
}

/// Exit code for a failed `Args::try_parse`: 0 for help and version, 1 for any bad argument.
pub fn arg_error_exit_code(e: &clap::Error) -> i32 {
    match e.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

#[derive(Parser, Debug)]
#[command(name = "tumblr-scraper", version = VERSION)]
#[command(about = "Scrape a Tumblr blog's posts and media into a local directory")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, request_delay_secs, timeout_secs, page_size, include_media, format) are read from ./tumblr-scraper.toml or ~/.config/tumblr-scraper/config.toml. CLI flags override config."
)]
pub struct Args {
    /// Blog to export: a name (example), a hostname (example.tumblr.com) or a blog URL.
    pub blog: String,

    /// Destination directory. Default: ./{blog-name}, or {output_dir}/{blog-name} from config.
    pub destination: Option<PathBuf>,

    /// Offset of the first post to fetch (0 = newest). Use to resume a failed run.
    #[arg(long, default_value_t = 0)]
    pub start_offset: u64,

    /// Posts per page request (1-50; default 50).
    #[arg(long, value_parser = parse_page_size)]
    pub page_size: Option<u32>,

    /// Write post content only; do not download photos, videos or audio.
    #[arg(long)]
    pub no_media: bool,

    /// Content file format: html (default), markdown, text, or json.
    #[arg(long, value_parser = parse_format)]
    pub format: Option<OutputFormat>,

    /// Only export posts of this type: text, photo, quote, link, chat, video, or audio.
    #[arg(long = "type", value_parser = parse_post_type)]
    pub post_type: Option<PostType>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and the full error chain on failure.
    #[arg(long)]
    pub verbose: bool,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 0).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Fetch the first page only, print the post count and destination without writing.
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_page_size(s: &str) -> Result<u32, String> {
    let n: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid --page-size: '{}' is not a number", s))?;
    if n == 0 || n > MAX_PAGE_SIZE {
        return Err(format!(
            "Invalid --page-size: {} (must be between 1 and {})",
            n, MAX_PAGE_SIZE
        ));
    }
    Ok(n)
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "html" => Ok(OutputFormat::Html),
        "markdown" | "md" => Ok(OutputFormat::Markdown),
        "text" | "txt" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!(
            "Invalid --format value: '{}'. Use html, markdown, text, or json.",
            s
        )),
    }
}

fn parse_post_type(s: &str) -> Result<PostType, String> {
    match s.to_lowercase().as_str() {
        "text" | "regular" => Ok(PostType::Text),
        "photo" => Ok(PostType::Photo),
        "quote" => Ok(PostType::Quote),
        "link" => Ok(PostType::Link),
        "chat" | "conversation" => Ok(PostType::Chat),
        "video" => Ok(PostType::Video),
        "audio" => Ok(PostType::Audio),
        _ => Err(format!(
            "Invalid --type value: '{}'. Use text, photo, quote, link, chat, video, or audio.",
            s
        )),
    }
}

/// Destination precedence: explicit argument, then config output_dir/{slug}, then ./{slug}.
fn resolve_destination(
    explicit: Option<&Path>,
    output_dir: Option<&Path>,
    blog: &BlogId,
) -> PathBuf {
    match (explicit, output_dir) {
        (Some(p), _) => p.to_path_buf(),
        (None, Some(dir)) => dir.join(blog.slug()),
        (None, None) => PathBuf::from(blog.slug()),
    }
}

/// The destination may exist, but only as a directory.
fn validate_destination(path: &Path) -> Result<(), CliRunError> {
    if path.exists() && !path.is_dir() {
        return Err(CliRunError::InvalidInput(format!(
            "Cannot export to {}: it exists and is not a directory.",
            path.display()
        )));
    }
    Ok(())
}

fn print_summary(result: &ExportResult, dest: &Path) {
    eprintln!(
        "Exported {} post(s) and {} asset(s) to {}",
        result.posts_written,
        result.assets_written,
        dest.display()
    );
    if !result.assets_failed.is_empty() {
        eprintln!(
            "{} asset(s) could not be downloaded:",
            result.assets_failed.len()
        );
        for failure in &result.assets_failed {
            eprintln!("  post {}: {}", failure.post_id, failure.error);
        }
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let blog = BlogId::parse(&args.blog).map_err(|e| {
        CliRunError::InvalidInput(format!(
            "{}. Expected a blog name such as 'example', a hostname such as 'example.tumblr.com', or a blog URL.",
            e
        ))
    })?;

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let config = config.unwrap_or_default();

    let page_size = args.page_size.or(config.page_size).unwrap_or(MAX_PAGE_SIZE);
    validate_page_size(page_size).map_err(|e| CliRunError::InvalidInput(e.to_string()))?;

    let format = match (args.format, config.format.as_deref()) {
        (Some(f), _) => f,
        (None, Some(s)) => parse_format(s)
            .map_err(|e| CliRunError::InvalidInput(format!("Invalid config: {}", e)))?,
        (None, None) => OutputFormat::default(),
    };
    let include_media = !args.no_media && config.include_media.unwrap_or(true);

    let dest = resolve_destination(
        args.destination.as_deref(),
        config.output_dir.as_deref(),
        &blog,
    );
    validate_destination(&dest)?;

    const DEFAULT_DELAY_SECS: u64 = 0;
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    let delay_secs = args
        .delay
        .or(config.request_delay_secs)
        .unwrap_or(DEFAULT_DELAY_SECS);
    let timeout_secs = args
        .timeout
        .or(config.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let user_agent = args.user_agent.clone().or(config.user_agent);

    let mut builder = PoliteClient::builder()
        .delay_secs(delay_secs)
        .timeout_secs(timeout_secs);
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    let mut client = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    if args.dry_run {
        let mut feed = TumblrApi::new(&mut client, blog.clone()).with_post_type(args.post_type);
        let page = dry_run(&mut feed, args.start_offset, page_size)?;
        match page.total {
            Some(total) => eprintln!("Posts: {}", total),
            None => eprintln!("Posts: unknown ({} on first page)", page.posts.len()),
        }
        eprintln!("Output: {}", dest.display());
        return Ok(());
    }

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u64, total: Option<u64>| {
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let (bar, template) = match total {
                Some(t) => (
                    indicatif::ProgressBar::new(t.saturating_sub(args.start_offset)),
                    "{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})",
                ),
                None => (
                    indicatif::ProgressBar::new_spinner(),
                    "{spinner} {msg} ({elapsed})",
                ),
            };
            bar.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template(template)
                    .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(n);
        pb.set_message(format!("Exporting post {}", args.start_offset + n));
    };
    let progress: Option<&dyn Fn(u64, Option<u64>)> = if args.quiet {
        None
    } else {
        Some(&progress_cb)
    };

    let options = ExportOptions {
        start_offset: args.start_offset,
        page_size,
        include_media,
        format,
        progress,
    };
    let outcome = export_blog(&args.blog, &dest, &mut client, args.post_type, &options);

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    match outcome {
        Ok(result) => {
            if !args.quiet {
                print_summary(&result, &dest);
            }
            Ok(())
        }
        Err(e) => {
            if let ExportError::Fetch { ref partial, .. } = e {
                if !args.quiet && partial.posts_written > 0 {
                    print_summary(partial, &dest);
                }
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tumblr::FetchError;

    #[test]
    fn parse_page_size_bounds() {
        assert_eq!(parse_page_size("1").unwrap(), 1);
        assert_eq!(parse_page_size("50").unwrap(), 50);
        assert_eq!(parse_page_size(" 20 ").unwrap(), 20);
        assert!(parse_page_size("0").is_err());
        assert!(parse_page_size("51").is_err());
        assert!(parse_page_size("ten").is_err());
    }

    #[test]
    fn parse_format_all() {
        assert_eq!(parse_format("html").unwrap(), OutputFormat::Html);
        assert_eq!(parse_format("markdown").unwrap(), OutputFormat::Markdown);
        assert_eq!(parse_format("md").unwrap(), OutputFormat::Markdown);
        assert_eq!(parse_format("text").unwrap(), OutputFormat::Text);
        assert_eq!(parse_format("txt").unwrap(), OutputFormat::Text);
        assert_eq!(parse_format("JSON").unwrap(), OutputFormat::Json);
        assert!(parse_format("epub").is_err());
    }

    #[test]
    fn parse_post_type_aliases() {
        assert_eq!(parse_post_type("photo").unwrap(), PostType::Photo);
        assert_eq!(parse_post_type("regular").unwrap(), PostType::Text);
        assert_eq!(parse_post_type("Conversation").unwrap(), PostType::Chat);
        assert!(parse_post_type("answer").is_err());
    }

    #[test]
    fn args_accept_spec_flags() {
        let args = Args::try_parse_from([
            "tumblr-scraper",
            "example",
            "out",
            "--start-offset=40",
            "--page-size=20",
            "--no-media",
        ])
        .unwrap();
        assert_eq!(args.blog, "example");
        assert_eq!(args.destination, Some(PathBuf::from("out")));
        assert_eq!(args.start_offset, 40);
        assert_eq!(args.page_size, Some(20));
        assert!(args.no_media);
        assert!(args.format.is_none());
    }

    #[test]
    fn args_reject_bad_values() {
        assert!(Args::try_parse_from(["tumblr-scraper", "example", "--page-size=0"]).is_err());
        assert!(Args::try_parse_from(["tumblr-scraper", "example", "--start-offset=-1"]).is_err());
        assert!(Args::try_parse_from(["tumblr-scraper"]).is_err());
    }

    #[test]
    fn bad_flag_values_exit_with_invalid_input_code() {
        for bad in [
            "--page-size=0",
            "--page-size=51",
            "--format=epub",
            "--type=answer",
            "--start-offset=-1",
        ] {
            let err = Args::try_parse_from(["tumblr-scraper", "example", bad]).unwrap_err();
            assert_eq!(arg_error_exit_code(&err), 1, "{}", bad);
        }
        let missing = Args::try_parse_from(["tumblr-scraper"]).unwrap_err();
        assert_eq!(arg_error_exit_code(&missing), 1);
        let help = Args::try_parse_from(["tumblr-scraper", "--help"]).unwrap_err();
        assert_eq!(arg_error_exit_code(&help), 0);
        let version = Args::try_parse_from(["tumblr-scraper", "--version"]).unwrap_err();
        assert_eq!(arg_error_exit_code(&version), 0);
    }

    #[test]
    fn destination_precedence() {
        let blog = BlogId::parse("example").unwrap();
        assert_eq!(
            resolve_destination(Some(Path::new("here")), Some(Path::new("cfg")), &blog),
            PathBuf::from("here")
        );
        assert_eq!(
            resolve_destination(None, Some(Path::new("cfg")), &blog),
            PathBuf::from("cfg/example")
        );
        assert_eq!(resolve_destination(None, None, &blog), PathBuf::from("example"));
    }

    #[test]
    fn validate_destination_rejects_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            validate_destination(file.path()),
            Err(CliRunError::InvalidInput(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_destination(dir.path()).is_ok());
        assert!(validate_destination(&dir.path().join("new")).is_ok());
    }

    #[test]
    fn run_rejects_invalid_blog_before_network() {
        let args = Args::try_parse_from(["tumblr-scraper", "not/a/blog"]).unwrap();
        let err = run(&args).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("not/a/blog"));
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Export(ExportError::InvalidPageSize { value: 0, max: 50 }).exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Export(ExportError::Fetch {
                offset: 0,
                source: FetchError::HttpStatus {
                    status: 404,
                    url: "u".into()
                },
                partial: ExportResult::default(),
            })
            .exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Export(ExportError::CreateDir {
                path: PathBuf::from("x"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
            .exit_code(),
            3
        );
    }
}
