//! Error types for blog resolution, page fetches, asset downloads, and the export run.

use crate::export::ExportResult;
use crate::formats::FormatError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while requesting one page of posts. Fatal to the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    #[error("Could not decode post listing from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl FetchError {
    /// HTTP status if the server answered with a non-success code.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure while downloading one asset. Recorded in the result; never aborts the run.
#[derive(Debug, Error)]
pub enum AssetDownloadError {
    #[error("Network error: could not download {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when downloading: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Network error: download of {url} was cut off: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// The sink rejected the bytes (disk full, permissions). Not a network failure.
    #[error("Failed to save {url}: {source}")]
    Write {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that end an export run.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid blog identifier '{input}': {reason}")]
    InvalidBlog { input: String, reason: String },

    #[error("Invalid page size {value}: must be between 1 and {max}")]
    InvalidPageSize { value: u32, max: u32 },

    /// Page request failed. `partial` holds what was written before the failure.
    #[error("Failed to fetch posts at offset {offset}: {source}. Re-run with --start-offset {offset} to resume.")]
    Fetch {
        offset: u64,
        #[source]
        source: FetchError,
        partial: ExportResult,
    },

    #[error("Cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Write(#[from] FormatError),
}

impl ExportError {
    /// True for errors raised before any network activity.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            ExportError::InvalidBlog { .. } | ExportError::InvalidPageSize { .. }
        )
    }
}
