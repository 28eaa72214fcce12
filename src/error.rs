//! Central error types for the replay engine.
//!
//! Buffer contract violations (capacity, position) are local and recoverable;
//! source and export failures carry the reason upward for user-visible
//! reporting. All errors implement `Serialize` so a UI layer can forward them
//! as plain messages.

use serde::Serialize;
use thiserror::Error;

/// Main error type for replay engine operations.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Ring buffer capacity must be at least one frame.
    #[error("Invalid buffer capacity {capacity} (must be a positive frame count)")]
    InvalidCapacity { capacity: usize },

    /// Peek/set-tail argument outside the written range `[0, upper)`.
    #[error("Invalid buffer position {position} (valid range is 0..{upper})")]
    InvalidPosition { position: usize, upper: usize },

    /// Frame source could not be opened.
    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),

    /// A read from an open frame source failed. Fatal to the owning session.
    #[error("Frame acquisition failed: {0}")]
    AcquisitionFailure(String),

    /// Export sink open/write/finalize failed.
    #[error("Export failed: {0}")]
    ExportFailure(String),

    /// Frame byte length does not match its declared shape.
    #[error("Frame shape mismatch: expected {expected} bytes, got {actual}")]
    FrameShape { expected: usize, actual: usize },

    /// I/O error outside the export sink path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

/// Serialize as the error message string so consumer layers can forward
/// errors without knowing the variant structure.
impl Serialize for ReplayError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<String> for ReplayError {
    fn from(msg: String) -> Self {
        ReplayError::Other(msg)
    }
}

impl From<&str> for ReplayError {
    fn from(msg: &str) -> Self {
        ReplayError::Other(msg.to_string())
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error, converting it to `ReplayError::Other`.
    fn context(self, msg: &str) -> ReplayResult<T>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F: FnOnce() -> String>(self, f: F) -> ReplayResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context(self, msg: &str) -> ReplayResult<T> {
        self.map_err(|e| ReplayError::Other(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> ReplayResult<T> {
        self.map_err(|e| ReplayError::Other(format!("{}: {}", f(), e)))
    }
}

/// Extension trait for adding context to Option types.
pub trait OptionExt<T> {
    /// Convert `None` to `ReplayError::Other` with the given message.
    fn context(self, msg: &str) -> ReplayResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn context(self, msg: &str) -> ReplayResult<T> {
        self.ok_or_else(|| ReplayError::Other(msg.to_string()))
    }
}

/// Type alias for Results using ReplayError.
pub type ReplayResult<T> = Result<T, ReplayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReplayError::InvalidCapacity { capacity: 0 };
        assert_eq!(
            err.to_string(),
            "Invalid buffer capacity 0 (must be a positive frame count)"
        );

        let err = ReplayError::InvalidPosition {
            position: 7,
            upper: 5,
        };
        assert_eq!(
            err.to_string(),
            "Invalid buffer position 7 (valid range is 0..5)"
        );
    }

    #[test]
    fn test_error_serialization() {
        let err = ReplayError::AcquisitionFailure("camera disconnected".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("camera disconnected"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ReplayError = io_err.into();
        assert!(matches!(err, ReplayError::Io(_)));
    }

    #[test]
    fn test_from_string() {
        let err: ReplayError = "boom".into();
        assert!(matches!(err, ReplayError::Other(_)));
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<(), &str> = Err("original error");
        let with_context = result.context("operation failed");

        assert!(matches!(with_context, Err(ReplayError::Other(_))));
        let msg = with_context.unwrap_err().to_string();
        assert!(msg.contains("operation failed"));
        assert!(msg.contains("original error"));
    }

    #[test]
    fn test_result_ext_with_context() {
        let result: Result<(), &str> = Err("inner");
        let with_context = result.with_context(|| format!("camera {}", 3));

        let msg = with_context.unwrap_err().to_string();
        assert!(msg.contains("camera 3"));
        assert!(msg.contains("inner"));
    }

    #[test]
    fn test_option_ext_context() {
        let opt: Option<i32> = None;
        let result = opt.context("value was missing");
        assert!(result.unwrap_err().to_string().contains("value was missing"));

        let opt: Option<i32> = Some(42);
        assert_eq!(opt.context("should not appear").unwrap(), 42);
    }
}
