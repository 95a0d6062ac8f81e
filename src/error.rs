// src/error.rs
//
// Unified error handling for imagelab
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input, recoverable
// - CodecError: Format/encoding issues
// - ResourceLimit: Size limits and file system failures
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Coarse error taxonomy, used for logging and for mapping to transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Size limits and file system failures
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }

    /// Get the IMAGELAB_* error code string for this category
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "IMAGELAB_USER_ERROR",
            ErrorCategory::CodecError => "IMAGELAB_CODEC_ERROR",
            ErrorCategory::ResourceLimit => "IMAGELAB_RESOURCE_LIMIT",
            ErrorCategory::InternalBug => "IMAGELAB_INTERNAL_BUG",
        }
    }
}

/// The request-level error kinds a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    UnsupportedOperation,
    DecodeFailure,
    EncodeFailure,
    NotFound,
    Io,
    Internal,
}

/// imagelab error types
#[derive(Debug, Error)]
pub enum ImageLabError {
    // Request Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidParameter {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Unsupported operation: '{name}'. Expected reduce, webp, mirror, gray or analyse")]
    UnsupportedOperation { name: Cow<'static, str> },

    #[error("Not found: {name}")]
    NotFound { name: Cow<'static, str> },

    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Upload of {size} bytes exceeds maximum {max} bytes")]
    UploadTooLarge { size: u64, max: u64 },

    // File I/O Errors
    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl Clone for ImageLabError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidParameter {
                name,
                value,
                reason,
            } => Self::InvalidParameter {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::UnsupportedOperation { name } => Self::UnsupportedOperation { name: name.clone() },
            Self::NotFound { name } => Self::NotFound { name: name.clone() },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::UploadTooLarge { size, max } => Self::UploadTooLarge {
                size: *size,
                max: *max,
            },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::FileWriteFailed { path, source } => Self::FileWriteFailed {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl ImageLabError {
    pub fn invalid_parameter(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_operation(name: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedOperation { name: name.into() }
    }

    pub fn not_found(name: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn upload_too_large(size: u64, max: u64) -> Self {
        Self::UploadTooLarge { size, max }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are recoverable,
    /// CodecError and InternalBug are not.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidParameter { .. }
            | Self::UnsupportedOperation { .. }
            | Self::NotFound { .. }
            | Self::UnsupportedFormat { .. } => ErrorCategory::UserError,

            Self::DecodeFailed { .. } | Self::EncodeFailed { .. } => ErrorCategory::CodecError,

            // File I/O failures usually mean a full disk or bad permissions on the
            // artifact directories; the operator can fix those, so they sit here.
            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::UploadTooLarge { .. }
            | Self::FileReadFailed { .. }
            | Self::FileWriteFailed { .. } => ErrorCategory::ResourceLimit,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }

    /// Get the request-level kind of this error.
    ///
    /// Size limits count as invalid parameters and an unknown container counts
    /// as a decode failure; both are properties of the submitted image.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::UploadTooLarge { .. } => ErrorKind::InvalidParameter,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::UnsupportedFormat { .. } | Self::DecodeFailed { .. } => ErrorKind::DecodeFailure,
            Self::EncodeFailed { .. } => ErrorKind::EncodeFailure,
            Self::FileReadFailed { .. } | Self::FileWriteFailed { .. } => ErrorKind::Io,
            Self::InternalPanic { .. } => ErrorKind::Internal,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ImageLabError>;
