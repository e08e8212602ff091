//! Error types for portscan-rs

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Caller input ===
    #[error("Bad IP address: \"{0}\".")]
    InvalidIp(String),

    #[error("Bad port: \"{0}\".")]
    InvalidPort(String),

    #[error("Bad MAC address: \"{0}\".")]
    InvalidMac(String),

    #[error("Bad range: {0}")]
    InvalidRange(String),

    // === Cache store ===
    #[error("cache I/O error at {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache entry {path} is corrupt: {source}")]
    CacheCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode scan record: {0}")]
    Encode(#[from] serde_json::Error),

    // === Discovery feed ===
    #[error("discovery feed request failed: {0}")]
    Discovery(#[from] reqwest::Error),

    #[error("discovery feed payload is malformed: {0}")]
    FeedPayload(String),

    // === Server ===
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

impl Error {
    /// True when the error was caused by malformed caller input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidIp(_) | Error::InvalidPort(_) | Error::InvalidMac(_) | Error::InvalidRange(_)
        )
    }
}
