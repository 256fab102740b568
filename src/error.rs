//! Error types for the PVC disk labeler
//!
//! Provides structured error types for the reconciliation engine, the GCE
//! client binding, and the watch loop.

use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Volume Handle Errors
    // =========================================================================
    #[error("invalid volume handle format: {0:?}")]
    MalformedVolumeHandle(String),

    // =========================================================================
    // Disk Reconciliation Errors
    // =========================================================================
    #[error("failed to fetch disk {disk}: {reason}")]
    DiskFetch { disk: String, reason: String },

    #[error("failed to set labels on disk {disk}: {reason}")]
    LabelSubmit { disk: String, reason: String },

    #[error("label operation {operation} did not complete within {timeout_secs}s")]
    OperationTimeout {
        operation: String,
        timeout_secs: u64,
    },

    #[error("failed to check operation {operation}: {reason}")]
    OperationPoll { operation: String, reason: String },

    // =========================================================================
    // GCE API Errors
    // =========================================================================
    #[error("GCE API error: {status} - {message}")]
    GceApi { status: u16, message: String },

    #[error("metadata server token error: {0}")]
    TokenFetch(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("PVC watch stream error: {0}")]
    Watch(#[from] kube::runtime::watcher::Error),

    // =========================================================================
    // Bootstrap Errors
    // =========================================================================
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("metrics registration error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error came from the asynchronous operation poll step
    /// rather than the submit step. The two are metriced differently.
    pub fn is_poll_failure(&self) -> bool {
        matches!(
            self,
            Error::OperationTimeout { .. } | Error::OperationPoll { .. }
        )
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
