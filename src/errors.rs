// SPDX-License-Identifier: MPL-2.0

//! Error types for codeshelf
//!
//! Every failure in the scan/store/generate flow is recoverable. Errors are
//! reported upward so the shell can show them to the user; nothing here is
//! meant to abort the process.

use crate::code::CodeFormat;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Code store errors
    Storage(StorageError),
    /// Scan pipeline errors
    Scan(ScanError),
    /// Code generation errors
    Generation(GenerationError),
    /// A code failed validation before reaching the store
    InvalidCode(String),
    /// Configuration errors
    Config(String),
    /// Filesystem or image I/O errors
    Io(String),
    /// Generic error with message
    Other(String),
}

/// Code store errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store cannot be reached right now
    Unavailable(String),
    /// Opening or migrating the database failed
    Open(String),
    /// A statement failed
    Query(String),
    /// A persisted row could not be mapped back to a code
    Corrupt(String),
}

/// Scan pipeline errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Camera (frame source) permission was denied
    PermissionDenied,
    /// The frame source failed to produce a frame
    Source(String),
    /// The detector failed on a frame
    Detector(DetectorError),
}

/// Per-frame detector failure; the pipeline moves on to the next frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    /// Frame buffer does not match its declared geometry
    InvalidFrame(String),
    /// Detection worker died
    WorkerFailed(String),
}

/// Code generation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Nothing to encode
    EmptyInput,
    /// Text does not fit the chosen format
    CapacityExceeded { format: CodeFormat, limit: usize },
    /// Character the chosen format cannot represent
    UnsupportedCharacter {
        format: CodeFormat,
        character: char,
        position: usize,
    },
    /// EAN-13 input with a wrong trailing check digit
    InvalidCheckDigit { expected: u8, found: u8 },
    /// Too few characters for a fixed-length format
    TooShort { format: CodeFormat, minimum: usize, found: usize },
    /// No encoder for this format
    UnsupportedFormat(CodeFormat),
    /// Encoder reported an error other than capacity
    Render(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Storage(e) => write!(f, "Storage error: {}", e),
            AppError::Scan(e) => write!(f, "Scan error: {}", e),
            AppError::Generation(e) => write!(f, "Generation error: {}", e),
            AppError::InvalidCode(msg) => write!(f, "Invalid code: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Io(msg) => write!(f, "I/O error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            StorageError::Open(msg) => write!(f, "Failed to open store: {}", msg),
            StorageError::Query(msg) => write!(f, "Query failed: {}", msg),
            StorageError::Corrupt(msg) => write!(f, "Corrupt row: {}", msg),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::PermissionDenied => write!(f, "Permission denied by the frame source"),
            ScanError::Source(msg) => write!(f, "Frame source failed: {}", msg),
            ScanError::Detector(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            DetectorError::WorkerFailed(msg) => write!(f, "Detection worker failed: {}", msg),
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::EmptyInput => write!(f, "Nothing to encode"),
            GenerationError::CapacityExceeded { format, limit } => {
                write!(f, "Text exceeds {} capacity of {}", format, limit)
            }
            GenerationError::UnsupportedCharacter {
                format,
                character,
                position,
            } => write!(
                f,
                "Character {:?} at position {} is not supported by {}",
                character, position, format
            ),
            GenerationError::InvalidCheckDigit { expected, found } => {
                write!(f, "Check digit should be {}, found {}", expected, found)
            }
            GenerationError::TooShort {
                format,
                minimum,
                found,
            } => write!(
                f,
                "{} needs at least {} digits, got {}",
                format,
                minimum,
                found
            ),
            GenerationError::UnsupportedFormat(format) => {
                write!(f, "Cannot generate {} codes", format)
            }
            GenerationError::Render(msg) => write!(f, "Render failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for StorageError {}
impl std::error::Error for ScanError {}
impl std::error::Error for DetectorError {}
impl std::error::Error for GenerationError {}

// Conversions from sub-errors to AppError
impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        AppError::Scan(err)
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        AppError::Generation(err)
    }
}

impl From<DetectorError> for ScanError {
    fn from(err: DetectorError) -> Self {
        ScanError::Detector(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, msg)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::ReadOnly
                        | rusqlite::ErrorCode::DiskFull
                ) =>
            {
                StorageError::Unavailable(msg.unwrap_or_else(|| code.to_string()))
            }
            other => StorageError::Query(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_message_names_format() {
        let err = GenerationError::CapacityExceeded {
            format: CodeFormat::Qr,
            limit: 2331,
        };
        assert_eq!(err.to_string(), "Text exceeds QR capacity of 2331");
    }

    #[test]
    fn test_storage_error_wraps_into_app_error() {
        let err: AppError = StorageError::Query("boom".into()).into();
        assert!(matches!(err, AppError::Storage(StorageError::Query(_))));
        assert_eq!(err.to_string(), "Storage error: Query failed: boom");
    }

    #[test]
    fn test_busy_database_maps_to_unavailable() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        assert_eq!(
            StorageError::from(err),
            StorageError::Unavailable("database is locked".into())
        );
    }
}
