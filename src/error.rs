//! Error types for dataset loading and file uploads.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating, reading or validating a dataset.
///
/// The filter itself never fails; every variant here comes from the single
/// read-and-parse step that precedes it.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The request did not name a dataset file.
    #[error("no dataset file path was provided")]
    PathMissing,

    /// The file could not be read (missing, permission denied, I/O failure).
    #[error("could not read dataset file {}: {source}", .path.display())]
    DataUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file content is not valid JSON.
    #[error("dataset file is not valid JSON: {0}")]
    MalformedData(#[source] serde_json::Error),

    /// Valid JSON that does not have the shape of a dataset.
    #[error("invalid dataset: {0}")]
    InvalidSchema(String),
}

impl DatasetError {
    /// Whether the error was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, DatasetError::PathMissing | DatasetError::InvalidSchema(_))
    }
}

/// Errors raised while accepting and storing uploaded files.
#[derive(Error, Debug)]
pub enum UploadError {
    /// A required multipart field was not sent.
    #[error("missing upload field: {0}")]
    MissingPart(&'static str),

    /// The multipart body could not be decoded.
    #[error("invalid multipart body: {0}")]
    Multipart(String),

    /// Writing to the upload directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
