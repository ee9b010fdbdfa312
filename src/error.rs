//! Error types for exchange-set-fulfilment
//!
//! This module provides the error taxonomy for the fulfilment pipeline:
//! - [`Error`] - the crate-wide error, with conversions from I/O, JSON and HTTP errors
//! - [`FulfilmentError`] - recognized pipeline failures raised while assembling a bundle
//! - [`FileShareError`] - failures reported by the file-sharing collaborator
//! - [`EventId`] - machine-readable event identifiers used for classification
//!
//! Only the job boundary catches errors. Everything below it either returns a
//! status or propagates one of these types with `?`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AncillaryFile, BatchId};

/// Result type alias for exchange-set-fulfilment operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for exchange-set-fulfilment
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fulfilment.search_parallelism")
        key: Option<String>,
    },

    /// Recognized pipeline failure
    #[error("fulfilment error: {0}")]
    Fulfilment(#[from] FulfilmentError),

    /// File-sharing collaborator failure outside the fetch stage
    #[error("file share error: {0}")]
    FileShare(#[from] FileShareError),

    /// Queue message could not be parsed or failed validation
    #[error("invalid queue message: {0}")]
    InvalidMessage(String),

    /// Callback delivery failed
    #[error("callback failed: {0}")]
    Callback(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Recognized failures of the fulfilment pipeline
///
/// Each variant classifies to a dedicated [`EventId`]. Anything that is not a
/// `FulfilmentError` classifies as [`EventId::SystemError`].
#[derive(Debug, Error)]
pub enum FulfilmentError {
    /// Large-media pre-check rejected the product list
    #[error("product validation failed for batch {batch_id}: {first_error}")]
    Validation {
        /// Batch whose products failed validation
        batch_id: BatchId,
        /// First validation error, kept for diagnostics
        first_error: String,
    },

    /// A partition signalled an unrecoverable condition and the fetch was aborted
    #[error("file share search cancelled for batch {batch_id}: {reason}")]
    Cancelled {
        /// Batch whose fetch was cancelled
        batch_id: BatchId,
        /// First error observed before cancellation
        reason: String,
    },

    /// A required ancillary file could not be produced
    #[error("failed to create {file} for batch {batch_id}")]
    AncillaryFile {
        /// Batch being assembled
        batch_id: BatchId,
        /// The ancillary file that failed
        file: AncillaryFile,
    },

    /// The stored catalogue response for the request could not be loaded
    #[error("catalogue response not found for batch {batch_id}: {reason}")]
    CatalogueResponseNotFound {
        /// Batch whose catalogue response is missing
        batch_id: BatchId,
        /// Why the response could not be loaded
        reason: String,
    },

    /// The overlay (AIO) build reported failure
    #[error("AIO exchange set creation failed for batch {batch_id}")]
    Aio {
        /// Batch being assembled
        batch_id: BatchId,
    },

    /// A large-media build step failed
    #[error("large media exchange set creation failed for batch {batch_id}: {reason}")]
    LargeMedia {
        /// Batch being assembled
        batch_id: BatchId,
        /// The reason the build failed
        reason: String,
    },

    /// A per-volume large-media task failed
    #[error("volume {volume} of batch {batch_id} failed: {reason}")]
    VolumeTask {
        /// Batch being assembled
        batch_id: BatchId,
        /// Volume directory name (e.g. "M01X02")
        volume: String,
        /// The reason the volume task failed
        reason: String,
    },
}

/// Errors reported by the file-sharing collaborator
#[derive(Debug, Error)]
pub enum FileShareError {
    /// The request could not be completed
    #[error("file share request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status
    #[error("file share returned status {status}: {message}")]
    Rejected {
        /// HTTP status code returned by the service
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The operation observed cancellation and stopped
    #[error("file share operation cancelled")]
    Cancelled,

    /// Local file system failure while storing downloaded files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Machine-readable event identifiers
///
/// Used in logs, in the error artifact written to the bundle root and in the
/// callback payload so requesters can quote a stable code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventId {
    /// Unclassified failure
    SystemError,
    /// Large-media product validation failed
    ProductValidationFailed,
    /// Partition fetch was cancelled
    FileShareSearchCancelled,
    /// An ancillary file could not be created
    AncillaryFileCreationFailed,
    /// The stored catalogue response was not found
    CatalogueResponseNotFound,
    /// The AIO build reported failure
    AioCreationFailed,
    /// The large-media build reported failure
    LargeMediaCreationFailed,
    /// Uploading the error artifact failed
    ErrorArtifactUploadFailed,
    /// Committing the error artifact batch failed
    ErrorArtifactCommitFailed,
    /// Delivering the callback failed
    CallbackFailed,
}

impl EventId {
    /// Numeric identifier quoted to requesters
    pub fn code(&self) -> u32 {
        match self {
            EventId::SystemError => 805_000,
            EventId::ProductValidationFailed => 805_001,
            EventId::FileShareSearchCancelled => 805_002,
            EventId::AncillaryFileCreationFailed => 805_003,
            EventId::CatalogueResponseNotFound => 805_004,
            EventId::AioCreationFailed => 805_005,
            EventId::LargeMediaCreationFailed => 805_006,
            EventId::ErrorArtifactUploadFailed => 805_007,
            EventId::ErrorArtifactCommitFailed => 805_008,
            EventId::CallbackFailed => 805_009,
        }
    }

    /// Snake-case name of the identifier
    pub fn name(&self) -> &'static str {
        match self {
            EventId::SystemError => "system_error",
            EventId::ProductValidationFailed => "product_validation_failed",
            EventId::FileShareSearchCancelled => "file_share_search_cancelled",
            EventId::AncillaryFileCreationFailed => "ancillary_file_creation_failed",
            EventId::CatalogueResponseNotFound => "catalogue_response_not_found",
            EventId::AioCreationFailed => "aio_creation_failed",
            EventId::LargeMediaCreationFailed => "large_media_creation_failed",
            EventId::ErrorArtifactUploadFailed => "error_artifact_upload_failed",
            EventId::ErrorArtifactCommitFailed => "error_artifact_commit_failed",
            EventId::CallbackFailed => "callback_failed",
        }
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code(), self.name())
    }
}

impl FulfilmentError {
    /// Event identifier for this pipeline failure
    pub fn event_id(&self) -> EventId {
        match self {
            FulfilmentError::Validation { .. } => EventId::ProductValidationFailed,
            FulfilmentError::Cancelled { .. } => EventId::FileShareSearchCancelled,
            FulfilmentError::AncillaryFile { .. } => EventId::AncillaryFileCreationFailed,
            FulfilmentError::CatalogueResponseNotFound { .. } => {
                EventId::CatalogueResponseNotFound
            }
            FulfilmentError::Aio { .. } => EventId::AioCreationFailed,
            FulfilmentError::LargeMedia { .. } | FulfilmentError::VolumeTask { .. } => {
                EventId::LargeMediaCreationFailed
            }
        }
    }

    /// Whether the failure must never be retried by redelivery
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FulfilmentError::Validation { .. } | FulfilmentError::Cancelled { .. }
        )
    }
}

impl Error {
    /// Classify this error for the compensation path
    ///
    /// Recognized pipeline failures keep their own identifier; everything else
    /// falls back to [`EventId::SystemError`].
    pub fn event_id(&self) -> EventId {
        match self {
            Error::Fulfilment(e) => e.event_id(),
            _ => EventId::SystemError,
        }
    }
}

impl FileShareError {
    /// Whether the error came from cooperative cancellation rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FileShareError::Cancelled)
    }
}
