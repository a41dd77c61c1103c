//! tumblr-scraper: export a Tumblr blog's posts and media to a local directory.

pub mod cli;
pub mod config;
pub mod export;
pub mod formats;
pub mod model;
pub mod tumblr;

/// Package version, reported by `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports for CLI and consumers.
pub use export::{dry_run, export, export_blog, AssetFailure, ExportOptions, ExportResult};
pub use formats::{write_post, FormatError, OutputFormat};
pub use model::{Asset, Post, PostKind};
pub use tumblr::{
    AssetDownloadError, BlogId, ExportError, FetchError, Page, PoliteClient, PoliteClientBuilder,
    PostFeed, PostType, TumblrApi,
};
