/// Error types shared by every repository service
///
/// Each variant that touches the filesystem carries the operation name and
/// the offending path so that a failure can be shown to the user as-is.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The path does not exist (or is not the kind of node the operation needs).
    #[error("{operation}: not found: {}", path.display())]
    NotFound {
        operation: &'static str,
        path: PathBuf,
    },

    /// The destination already exists.
    #[error("{operation}: destination already exists: {}", path.display())]
    Conflict {
        operation: &'static str,
        path: PathBuf,
    },

    /// A new name is empty, `.`/`..`, or contains a path separator.
    #[error("{operation}: invalid name '{name}'")]
    InvalidName {
        operation: &'static str,
        name: String,
    },

    /// Crop or rotate parameters are empty or outside the image.
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// A read, write or copy failed.
    #[error("{operation} failed for {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The text-extraction backend is unavailable or returned an error.
    #[error("text extraction failed: {0}")]
    RecognitionFailure(String),

    /// The request is understood but cannot be honored (e.g. cancelling a job).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Image decoding or encoding failed.
    #[error("{operation} failed for {}: {source}", path.display())]
    Image {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A sidecar, config or document could not be (de)serialized.
    #[error("{operation} failed for {}: {source}", path.display())]
    Json {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A background job died before reporting its own result.
    #[error("background {operation} aborted: {message}")]
    Background {
        operation: &'static str,
        message: String,
    },
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(operation: &'static str, path: impl Into<PathBuf>) -> Self {
        Error::NotFound {
            operation,
            path: path.into(),
        }
    }

    pub fn conflict(operation: &'static str, path: impl Into<PathBuf>) -> Self {
        Error::Conflict {
            operation,
            path: path.into(),
        }
    }

    /// Wrap an I/O error, turning `ErrorKind::NotFound` into [`Error::NotFound`].
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Error::NotFound { operation, path };
        }
        Error::Io {
            operation,
            path,
            source,
        }
    }

    pub fn json(operation: &'static str, path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn image(operation: &'static str, path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Error::Image {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn invalid_name(operation: &'static str, name: impl Into<String>) -> Self {
        Error::InvalidName {
            operation,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}
