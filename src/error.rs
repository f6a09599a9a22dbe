use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatsearchError {
    #[error("invalid catalog line: {0}")]
    LineParse(String),

    #[error("malformed catalog data: {0}")]
    CatalogParse(String),

    #[error("do not know what to save into {0}")]
    #[diagnostic(help("use one of .json, .json.gz, .json.bz2, .json.xz, .json.lzma"))]
    UnknownCodec(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}")]
    HttpStatus { status: u16, url: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("the downloader has already been started")]
    AlreadyStarted,
}

impl CatsearchError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CatsearchError::Connection { .. } => true,
            CatsearchError::HttpStatus { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}
