//! Error types for image editing.
//!
//! Every fallible library operation returns [`IsoEditorError`]. The variants
//! follow how a failure should be handled by a caller:
//!
//! - [`NotFound`](IsoEditorError::NotFound) - a path does not exist in the image
//! - [`FormatIncompatible`](IsoEditorError::FormatIncompatible) - a marker,
//!   manifest or preamble is missing or malformed; never defaulted
//! - [`CapacityExceeded`](IsoEditorError::CapacityExceeded) - new content does
//!   not fit its fixed-size embed area
//! - [`Io`](IsoEditorError::Io) - the underlying stream failed

use std::io;
use thiserror::Error;

/// Image editing error types
#[derive(Error, Debug)]
pub enum IsoEditorError {
    /// A path does not exist inside the image
    #[error("{path} not found in {image}")]
    NotFound { path: String, image: String },

    /// The image lacks a structure this editor relies on
    #[error("incompatible image format: {0}")]
    FormatIncompatible(String),

    /// Content is larger than its fixed-size embed area
    #[error("{what} is too large for its embed area: {size} bytes exceeds {capacity} bytes")]
    CapacityExceeded {
        what: String,
        size: u64,
        capacity: u64,
    },

    /// A byte range does not fit inside the stream it applies to
    #[error("range at offset {offset} with length {length} exceeds stream length {total}")]
    OutOfBounds { offset: u64, length: u64, total: u64 },

    /// Caller-supplied data was rejected
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Underlying read/write/seek failure
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// External command failed
    #[error("failed to run {command}: {message}")]
    Process { command: String, message: String },
}

/// Result type for image editing operations
pub type Result<T> = std::result::Result<T, IsoEditorError>;

impl IsoEditorError {
    pub(crate) fn not_found(path: impl Into<String>, image: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            image: image.into(),
        }
    }

    /// Whether this error reports a missing path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Attach operation context to `std::io` results.
pub trait IoResultExt<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| IsoEditorError::Io {
            context: f(),
            source,
        })
    }
}

impl From<IsoEditorError> for io::Error {
    fn from(err: IsoEditorError) -> Self {
        let kind = match &err {
            IsoEditorError::NotFound { .. } => io::ErrorKind::NotFound,
            IsoEditorError::Io { source, .. } => source.kind(),
            IsoEditorError::OutOfBounds { .. } | IsoEditorError::InvalidInput(_) => {
                io::ErrorKind::InvalidInput
            }
            IsoEditorError::FormatIncompatible(_) => io::ErrorKind::InvalidData,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
