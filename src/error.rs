//! Error types for dns-fuzz.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while expanding, resolving or recording names.
#[derive(Debug, Error)]
pub enum FuzzError {
    /// IO error (wordlist, pattern file, work directory, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A pattern uses the bulk wordlist but none is configured.
    #[error("pattern requires the main wordlist but none is configured: {pattern}")]
    MissingBinding {
        /// Pattern that could not be expanded.
        pattern: String,
    },

    /// In-memory expansion of a pattern exceeds the configured ceiling.
    #[error("expansion size {size} exceeds limit {limit}")]
    ExpansionTooLarge {
        /// Number of candidates the pattern would produce.
        size: u128,
        /// Configured ceiling.
        limit: u64,
    },

    /// Resolver binary could not be found.
    #[error("resolver binary not found: {binary}")]
    ResolverNotFound {
        /// Configured binary path or name.
        binary: String,
    },

    /// Appending to the durable ledger failed.
    #[error("ledger write to {path} failed: {source}")]
    Ledger {
        /// Ledger file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Resolver list download failed.
    #[error("resolver list download failed: {0}")]
    Download(#[from] reqwest::Error),

    /// Unknown DNS record type in configuration.
    #[error("invalid record type: {0}")]
    InvalidRecordType(#[from] hickory_proto::error::ProtoError),
}

impl FuzzError {
    /// Process exit status for a run that stopped on this error.
    ///
    /// Configuration problems (missing inputs, unbound placeholders) exit with
    /// 2; failures during the run exit with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            FuzzError::Config(_)
            | FuzzError::MissingBinding { .. }
            | FuzzError::InvalidRecordType(_) => 2,
            _ => 1,
        }
    }
}
