use std::fmt;

use thiserror::Error;

/// Result type for object store and document database calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for [`DocumentStore`](crate::DocumentStore) operations
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

/// Errors raised by the storage collaborators (object store, document database)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {path}")]
    NotFound { path: String },

    #[error("Object {path} is {size} bytes, exceeding the {max} byte limit")]
    TooLarge { path: String, size: u64, max: u64 },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Backend responded with HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(path: S) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a size limit error
    pub fn too_large<S: Into<String>>(path: S, size: u64, max: u64) -> Self {
        Self::TooLarge {
            path: path.into(),
            size,
            max,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Which half of a document a failed delete was aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    Blob,
    Record,
}

impl fmt::Display for DeleteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteTarget::Blob => f.write_str("Document image"),
            DeleteTarget::Record => f.write_str("Document record"),
        }
    }
}

/// Errors returned by [`DocumentStore`](crate::DocumentStore) operations.
///
/// Display texts for upload, URL and decode failures are fixed strings; the
/// underlying cause stays reachable through [`std::error::Error::source`].
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    #[error("Image encoding failed")]
    EncodingFailed {
        #[source]
        source: image::ImageError,
    },

    #[error("Image upload failed")]
    UploadFailed {
        #[source]
        source: StoreError,
    },

    #[error("Image url is missing")]
    UrlFetchFailed {
        #[source]
        source: StoreError,
    },

    #[error("{source}")]
    DownloadFailed {
        #[source]
        source: StoreError,
    },

    #[error("Error converting image data after download")]
    DecodeFailed {
        #[source]
        source: image::ImageError,
    },

    #[error("Document record could not be saved")]
    SaveFailed {
        #[source]
        source: StoreError,
    },

    #[error("{target} deleted with error")]
    DeleteFailed {
        target: DeleteTarget,
        #[source]
        source: StoreError,
    },

    #[error("Document record could not be read: {source}")]
    ReadFailed {
        #[source]
        source: StoreError,
    },

    #[error("Documents could not be listed: {source}")]
    ListFailed {
        #[source]
        source: StoreError,
    },
}

impl DocumentStoreError {
    /// The collaborator error behind this failure, if the failure came from a backend call
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::UploadFailed { source }
            | Self::UrlFetchFailed { source }
            | Self::DownloadFailed { source }
            | Self::SaveFailed { source }
            | Self::DeleteFailed { source, .. }
            | Self::ReadFailed { source }
            | Self::ListFailed { source } => Some(source),
            Self::EncodingFailed { .. } | Self::DecodeFailed { .. } => None,
        }
    }
}
