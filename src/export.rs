//! The export loop: page through a feed, write each post's content file, download its assets.
//!
//! Layout: `<dest>/<post id>/post.<ext>` plus one file per asset in the same directory.
//! Asset bytes stream to `<name>.part` and are renamed once complete.

use crate::formats::{write_post, OutputFormat};
use crate::model::{Asset, Post};
use crate::tumblr::{
    AssetDownloadError, BlogId, ExportError, Page, PoliteClient, PostFeed, PostType, TumblrApi,
    MAX_PAGE_SIZE,
};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Options for an export run.
pub struct ExportOptions<'a> {
    /// Offset of the first post to request.
    pub start_offset: u64,
    /// Posts per page request, 1..=MAX_PAGE_SIZE.
    pub page_size: u32,
    pub include_media: bool,
    pub format: OutputFormat,
    /// Called after each post is written with (posts written so far, reported total).
    pub progress: Option<&'a dyn Fn(u64, Option<u64>)>,
}

impl Default for ExportOptions<'_> {
    fn default() -> Self {
        Self {
            start_offset: 0,
            page_size: MAX_PAGE_SIZE,
            include_media: true,
            format: OutputFormat::default(),
            progress: None,
        }
    }
}

/// An asset that could not be downloaded.
#[derive(Debug)]
pub struct AssetFailure {
    pub post_id: String,
    pub url: String,
    pub error: AssetDownloadError,
}

/// Outcome of a run. Posts count as written once their content file is on disk,
/// regardless of how many of their assets failed.
#[derive(Debug, Default)]
pub struct ExportResult {
    pub posts_written: u64,
    pub assets_written: u64,
    /// In the order the failures happened.
    pub assets_failed: Vec<AssetFailure>,
    /// Offset the next run should start from to continue where this one stopped.
    pub next_offset: u64,
}

/// Resolve `blog`, then export it into `dest` through the shared client.
pub fn export_blog(
    blog: &str,
    dest: &Path,
    client: &mut PoliteClient,
    post_type: Option<PostType>,
    options: &ExportOptions<'_>,
) -> Result<ExportResult, ExportError> {
    let blog = BlogId::parse(blog)?;
    validate_page_size(options.page_size)?;
    tracing::info!(blog = %blog, dest = %dest.display(), start = options.start_offset, "starting export");
    let mut feed = TumblrApi::new(client, blog).with_post_type(post_type);
    export(&mut feed, dest, options)
}

pub fn validate_page_size(page_size: u32) -> Result<(), ExportError> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ExportError::InvalidPageSize {
            value: page_size,
            max: MAX_PAGE_SIZE,
        });
    }
    Ok(())
}

/// Fetch the first page from `start` and nothing else. Nothing is written.
pub fn dry_run(feed: &mut dyn PostFeed, start: u64, page_size: u32) -> Result<Page, ExportError> {
    validate_page_size(page_size)?;
    feed.fetch_page(start, page_size).map_err(|source| ExportError::Fetch {
        offset: start,
        source,
        partial: ExportResult::default(),
    })
}

/// Run the fetch loop against `feed` until it returns an empty page.
///
/// A failed page request ends the run with [ExportError::Fetch], which carries the
/// offset reached and everything written so far. Asset failures are recorded and skipped.
pub fn export(
    feed: &mut dyn PostFeed,
    dest: &Path,
    options: &ExportOptions<'_>,
) -> Result<ExportResult, ExportError> {
    validate_page_size(options.page_size)?;
    create_dir(dest)?;

    let mut result = ExportResult {
        next_offset: options.start_offset,
        ..ExportResult::default()
    };
    let mut offset = options.start_offset;
    let mut written: HashSet<String> = HashSet::new();
    loop {
        let page = match feed.fetch_page(offset, options.page_size) {
            Ok(page) => page,
            Err(source) => {
                return Err(ExportError::Fetch {
                    offset,
                    source,
                    partial: result,
                })
            }
        };
        tracing::debug!(offset, posts = page.posts.len(), total = ?page.total, "page received");
        if page.posts.is_empty() {
            break;
        }
        let received = page.posts.len() as u64;
        for post in &page.posts {
            // Each post at most once per run, even if the listing shifts between pages.
            if !written.insert(post.dir_name()) {
                tracing::debug!(post = %post.id, offset, "post already written in this run");
                continue;
            }
            export_post(feed, dest, post, options, &mut result)?;
            result.posts_written += 1;
            if let Some(p) = options.progress {
                p(result.posts_written, page.total);
            }
        }
        offset += received;
        result.next_offset = offset;
    }

    tracing::info!(
        posts = result.posts_written,
        assets = result.assets_written,
        failed = result.assets_failed.len(),
        "export finished"
    );
    Ok(result)
}

fn create_dir(path: &Path) -> Result<(), ExportError> {
    std::fs::create_dir_all(path).map_err(|e| ExportError::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

fn export_post(
    feed: &mut dyn PostFeed,
    dest: &Path,
    post: &Post,
    options: &ExportOptions<'_>,
    result: &mut ExportResult,
) -> Result<(), ExportError> {
    let dir = dest.join(post.dir_name());
    create_dir(&dir)?;

    let content_file = options.format.content_filename();
    let assets: Vec<Asset> = if options.include_media {
        post.assets(&content_file)
    } else {
        Vec::new()
    };

    // Content goes last and links only the assets now on disk.
    let mut local = Vec::with_capacity(assets.len());
    for asset in assets {
        match download_asset(feed, &dir, &asset) {
            Ok(bytes) => {
                tracing::debug!(post = %post.id, file = %asset.filename, bytes, "asset written");
                result.assets_written += 1;
                local.push(asset);
            }
            Err(error) => {
                tracing::warn!(post = %post.id, url = %asset.url, error = %error, "asset skipped");
                result.assets_failed.push(AssetFailure {
                    post_id: post.id.clone(),
                    url: asset.url,
                    error,
                });
            }
        }
    }
    write_post(post, &local, &dir.join(&content_file), options.format)?;
    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Download into `<dir>/<filename>.part`, then rename. The partial file is removed on failure.
/// Write failures are reported against the `.part` path.
fn download_asset(
    feed: &mut dyn PostFeed,
    dir: &Path,
    asset: &Asset,
) -> Result<u64, AssetDownloadError> {
    let path = dir.join(&asset.filename);
    let part = part_path(&path);
    let io_err = |p: &Path, e: std::io::Error| AssetDownloadError::Io {
        path: p.to_path_buf(),
        source: e,
    };

    let file = File::create(&part).map_err(|e| io_err(&part, e))?;
    let mut out = BufWriter::new(file);
    let written = feed
        .download(&asset.url, &mut out)
        .map_err(|e| match e {
            AssetDownloadError::Write { source, .. } => io_err(&part, source),
            other => other,
        })
        .and_then(|n| out.flush().map(|_| n).map_err(|e| io_err(&part, e)));
    drop(out);

    match written {
        Ok(n) => {
            std::fs::rename(&part, &path).map_err(|e| io_err(&path, e))?;
            Ok(n)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&part);
            Err(e)
        }
    }
}
