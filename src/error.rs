//! Error types for modpack-dl
//!
//! The error taxonomy mirrors the failure policy of the sync engine:
//! per-mod failures (resolution, download, stale-file deletion) are caught
//! and reported by the task that hit them, while manifest corruption and
//! configuration errors abort the whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for modpack-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for modpack-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "game_version")
        key: Option<String>,
    },

    /// Manifest persistence error
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Repository resolution error
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Artifact download error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A scheduler task died (panicked or was dropped) before delivering
    /// its result
    #[error("scheduler task failed to deliver a result")]
    TaskFailed,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Manifest-related errors
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file exists but cannot be parsed.
    ///
    /// Fatal to the run: reconciliation without a trustworthy baseline
    /// could delete or overwrite files it should not touch.
    #[error("manifest {path} is corrupt: {reason}")]
    Corrupt {
        /// Path of the unparseable manifest file
        path: PathBuf,
        /// Parser diagnostic
        reason: String,
    },
}

/// Repository resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No repository is registered under the requested namespace
    #[error("unknown repository namespace {namespace:?}")]
    UnknownNamespace {
        /// The namespace that had no registered repository
        namespace: String,
    },

    /// A slug could not be resolved to a repository project id
    #[error("could not resolve a project id for {id:?}")]
    ProjectNotFound {
        /// The slug or id that failed to resolve
        id: String,
    },

    /// A repository endpoint returned a response the client could not use
    #[error("unusable response from {url}: {reason}")]
    InvalidResponse {
        /// The endpoint that misbehaved
        url: String,
        /// What was wrong with the response
        reason: String,
    },
}

/// Artifact download errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The artifact no longer exists at its source (HTTP 404/410)
    #[error("resource no longer exists at {url}")]
    Gone {
        /// The URL that no longer serves the artifact
        url: String,
    },

    /// The server answered with a non-success status code
    #[error("{url} returned status {status}")]
    HttpStatus {
        /// The URL that was requested
        url: String,
        /// The HTTP status code received
        status: u16,
    },
}

impl Error {
    /// Machine-readable failure class for report entries
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Manifest(_) => "manifest_error",
            Error::Resolve(ResolveError::UnknownNamespace { .. }) => "unknown_namespace",
            Error::Resolve(ResolveError::ProjectNotFound { .. }) => "project_not_found",
            Error::Resolve(ResolveError::InvalidResponse { .. }) => "invalid_response",
            Error::Download(DownloadError::Gone { .. }) => "gone_at_source",
            Error::Download(DownloadError::HttpStatus { .. }) => "http_status",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::TaskFailed => "task_failed",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<crate::scheduler::TaskFailed> for Error {
    fn from(_: crate::scheduler::TaskFailed) -> Self {
        Error::TaskFailed
    }
}
