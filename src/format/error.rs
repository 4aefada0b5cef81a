//! Error types for format dispatch and codec operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving or driving a format handler.
#[derive(Error, Debug)]
pub enum FormatError {
    /// No registered handler claims the file
    #[error("No format handler recognises {path:?}")]
    FormatNotFound {
        /// File that was probed
        path: PathBuf,
    },

    /// A magic-number probe could not read enough bytes
    #[error("Truncated file {path:?}: needed {requested} bytes, found {available}")]
    TruncatedFile {
        /// File that was probed
        path: PathBuf,
        /// Bytes the probe asked for
        requested: usize,
        /// Bytes actually present
        available: usize,
    },

    /// Writer dispatch found no registered suffix
    #[error("Unknown file extension for {path:?}")]
    UnknownExtension {
        /// Requested output filename
        path: PathBuf,
    },

    /// Codec failed while decoding
    #[error("Failed to decode {path:?} as {format}: {message}")]
    Decode {
        /// Input file
        path: PathBuf,
        /// Handler id
        format: String,
        /// Underlying codec message
        message: String,
    },

    /// Codec failed while encoding
    #[error("Failed to encode {path:?} as {format}: {message}")]
    Encode {
        /// Output file
        path: PathBuf,
        /// Handler id
        format: String,
        /// Underlying codec message
        message: String,
    },

    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed text header inside a codec
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the problem
        message: String,
    },

    /// Feature the codec does not handle
    #[error("Unsupported: {message}")]
    Unsupported {
        /// Description of the unsupported feature
        message: String,
    },
}

impl FormatError {
    /// Create a "no handler" error for `path`.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::FormatNotFound { path: path.into() }
    }

    /// Create an unknown-extension error for `path`.
    pub fn unknown_extension(path: impl Into<PathBuf>) -> Self {
        Self::UnknownExtension { path: path.into() }
    }

    /// Create a decode error.
    pub fn decode(
        path: impl Into<PathBuf>,
        format: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::Decode {
            path: path.into(),
            format: format.into(),
            message: message.to_string(),
        }
    }

    /// Create an encode error.
    pub fn encode(
        path: impl Into<PathBuf>,
        format: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::Encode {
            path: path.into(),
            format: format.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an unsupported-feature error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Whether the caller can reasonably retry with another filename.
    ///
    /// Dispatch failures are recoverable; codec and I/O failures are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FormatNotFound { .. } | Self::TruncatedFile { .. } | Self::UnknownExtension { .. }
        )
    }

    /// Whether the error points at a damaged file rather than a wrong format.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::TruncatedFile { .. })
    }
}
