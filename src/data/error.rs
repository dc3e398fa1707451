//! Error types for cube loading.

use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a hyperspectral cube.
///
/// Every loader returns these at the point of detection; nothing is retried.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The requested file does not exist
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),

    /// No loader handles this file extension
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Header or body is structurally invalid
    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// Extents are non-positive or do not match the buffer
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// The array rank is not 2 or 3
    #[error("Not a 3D cube: array has rank {0}")]
    NotA3DCube(usize),

    /// A buffer of the given byte size could not be allocated
    #[error("Memory allocation failed ({0} bytes)")]
    MemoryAllocationFailed(usize),

    /// I/O failure or companion-file resolution failure
    #[error("Read error: {0}")]
    ReadError(String),

    /// Element type code outside the supported set
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),
}

impl LoadError {
    /// Create a corrupted data error with a message.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::CorruptedData(message.into())
    }

    /// Create an invalid dimensions error with a message.
    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions(message.into())
    }

    /// Create a read error with a message.
    pub fn read(message: impl Into<String>) -> Self {
        Self::ReadError(message.into())
    }

    /// Create an unsupported data type error.
    pub fn unsupported_type(code: impl Into<String>) -> Self {
        Self::UnsupportedDataType(code.into())
    }

    /// Map an allocation failure for `bytes` bytes.
    pub(crate) fn allocation(bytes: usize) -> impl FnOnce(TryReserveError) -> Self {
        move |_| Self::MemoryAllocationFailed(bytes)
    }

    /// Wrap an I/O error that happened while reading `path`.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path)
        } else {
            Self::ReadError(format!("{}: {}", path.display(), err))
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::ReadError(err.to_string())
    }
}
