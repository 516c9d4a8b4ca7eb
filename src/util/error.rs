//! Error types for the CDX library.
//!
//! Two layers: [`StoreError`] for the typed-array container underneath, and
//! [`Error`] for the channel model, append protocol and resampling engine.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the structured container (layout, type or I/O problems).
#[derive(Error, Debug)]
pub enum StoreError {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid magic bytes at start of file
    #[error("Invalid container file: expected CDX magic bytes")]
    InvalidMagic,

    /// Unsupported file format version
    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u16),

    /// The writer never finalized the file
    #[error("Container was not finalized (writer did not close): {0}")]
    NotFinalized(PathBuf),

    /// File is truncated or corrupted
    #[error("Unexpected end of data at position {0}")]
    Truncated(u64),

    /// Structurally invalid block
    #[error("Corrupt container: {0}")]
    Corrupt(String),

    /// Group, array or scalar not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A child with this name already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Element or scalar type differs from the stored one
    #[error("Type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Shape, rank or extension request is not valid for the array
    #[error("Shape mismatch at {path}: {reason}")]
    ShapeMismatch { path: String, reason: String },

    /// Slice lies outside the current extent
    #[error("Slice out of bounds at {path}: offset {offset:?} + count {count:?} exceeds shape {shape:?}")]
    OutOfBounds {
        path: String,
        offset: Vec<u64>,
        count: Vec<u64>,
        shape: Vec<u64>,
    },

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl StoreError {
    /// Create a corrupt-structure error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a shape error.
    pub fn shape(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Main error type for channel container operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Container does not match the expected variant or shape
    #[error("Schema error: {0}")]
    Schema(String),

    /// Caller-supplied arguments violate a precondition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation invoked out of the required order
    #[error("Precondition error: {0}")]
    Precondition(String),

    /// Cross-link invariant violated
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Underlying container failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Container failure while writing one link's part of a snapshot
    #[error("Append error: snapshot {index} of link '{link}': {source}")]
    Append {
        link: String,
        index: usize,
        #[source]
        source: StoreError,
    },

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a consistency error.
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// Attach the link and snapshot index to a failed append.
    pub fn append(link: &str, index: usize, source: StoreError) -> Self {
        Self::Append {
            link: link.to_string(),
            index,
            source,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Store(StoreError::Io(e))
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for CDX operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = StoreError::InvalidMagic;
        assert!(e.to_string().contains("magic"));

        let e = Error::validation("link 'a' missing");
        assert!(e.to_string().contains("link 'a' missing"));

        let e = StoreError::OutOfBounds {
            path: "/x".into(),
            offset: vec![5],
            count: vec![1],
            shape: vec![3],
        };
        assert!(e.to_string().contains("5"));
        assert!(e.to_string().contains("3"));
    }

    #[test]
    fn test_append_error_names_link_and_snapshot() {
        use std::error::Error as _;

        let e = Error::append("tx-rx2", 17, StoreError::not_found("/links/tx-rx2/cirs"));
        let msg = e.to_string();
        assert!(msg.contains("tx-rx2"));
        assert!(msg.contains("17"));
        assert!(msg.contains("/links/tx-rx2/cirs"));
        assert!(e.source().is_some_and(|s| s.to_string().starts_with("Not found")));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Store(StoreError::Io(_))));
    }
}
