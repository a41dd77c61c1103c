//! Tumblr access: blog resolution, the post feed trait, the shared client, and the v1 read API.

mod api;
mod client;
mod error;

pub use api::{TumblrApi, MAX_PAGE_SIZE};
pub use client::{PoliteClient, PoliteClientBuilder};
pub use error::{AssetDownloadError, ExportError, FetchError};

use crate::model::Post;
use reqwest::Url;
use std::io::Write;

const TUMBLR_SUFFIX: &str = ".tumblr.com";

/// A resolved blog host, e.g. `example.tumblr.com` or a custom domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogId {
    host: String,
}

impl BlogId {
    /// Accepts a slug (`example`), a hostname (`example.tumblr.com`, `blog.example.org`)
    /// or a blog URL. Slugs without a dot are hosted under tumblr.com.
    pub fn parse(input: &str) -> Result<Self, ExportError> {
        let invalid = |reason: &str| ExportError::InvalidBlog {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("blog identifier is empty"));
        }
        let host = if trimmed.contains("://") {
            let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid("only http and https URLs are supported"));
            }
            url.host_str()
                .ok_or_else(|| invalid("URL has no host"))?
                .to_string()
        } else {
            let bare = trimmed.trim_end_matches('/');
            if bare.contains('/') {
                return Err(invalid("expected a blog name or hostname, not a path"));
            }
            bare.to_string()
        };
        let host = host.to_ascii_lowercase();
        if host.is_empty()
            || host.starts_with('.')
            || host.ends_with('.')
            || host.contains("..")
            || !host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(invalid(
                "hostnames may only contain letters, digits, '-' and '.'",
            ));
        }
        let host = if host.contains('.') {
            host
        } else {
            format!("{}{}", host, TUMBLR_SUFFIX)
        };
        Ok(BlogId { host })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Short name for the default export directory: the blog name for tumblr.com hosts,
    /// otherwise the full host.
    pub fn slug(&self) -> &str {
        self.host
            .strip_suffix(TUMBLR_SUFFIX)
            .filter(|s| !s.is_empty() && !s.contains('.'))
            .unwrap_or(&self.host)
    }
}

impl std::fmt::Display for BlogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.host)
    }
}

/// Server-side post type filter (`type=` on the read endpoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostType {
    Text,
    Photo,
    Quote,
    Link,
    Chat,
    Video,
    Audio,
}

impl PostType {
    pub fn as_query(self) -> &'static str {
        match self {
            PostType::Text => "text",
            PostType::Photo => "photo",
            PostType::Quote => "quote",
            PostType::Link => "link",
            PostType::Chat => "chat",
            PostType::Video => "video",
            PostType::Audio => "audio",
        }
    }
}

/// One page of the listing. `total` is the blog's post count when the server reports it.
#[derive(Debug, Default)]
pub struct Page {
    pub posts: Vec<Post>,
    pub total: Option<u64>,
}

/// Source of posts and asset bytes for one blog.
///
/// An empty page marks the end of the listing.
pub trait PostFeed {
    fn fetch_page(&mut self, start: u64, num: u32) -> Result<Page, FetchError>;

    /// Stream the asset at `url` into `out`, returning the byte count. A failed write to
    /// `out` is [AssetDownloadError::Write].
    fn download(&mut self, url: &str, out: &mut dyn Write) -> Result<u64, AssetDownloadError>;
}
