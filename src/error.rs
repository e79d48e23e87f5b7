//! Error types for the OptiPack CLI application.
//!
//! This module defines the `OptiPackError` enum covering all error conditions
//! that can occur during scanning, container extraction and rebuild, leaf
//! recompression, and general command execution.
//!
//! It also provides helper methods to construct errors and generate
//! user-friendly messages.
use thiserror::Error;

/// Represents all possible errors in the OptiPack application.
///
/// Each variant provides specific context to facilitate debugging and
/// user-friendly reporting.
///
/// # Examples
///
/// ```rust
/// use optipack_cli::error::{OptiPackError, OptiPackResult};
///
/// fn example() -> OptiPackResult<()> {
///     Err(OptiPackError::Container {
///         format: "zip".to_string(),
///         message: "central directory not found".to_string(),
///     })
/// }
/// ```
///
/// # Exit Codes
///
/// Each error variant maps to an exit code via `OptiPackError::exit_code`.
#[derive(Error, Debug)]
pub enum OptiPackError {
    /// I/O operation failed during file system access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error due to invalid or missing settings.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Container operation failed during extraction or rebuild.
    ///
    /// Provides the container format and a detailed message.
    #[error("Container error [{format}]: {message}")]
    Container {
        /// The container format being handled (e.g. "zip", "docx")
        format: String,
        /// Detailed error message describing the issue
        message: String,
    },

    /// A recompression codec failed on a leaf file.
    #[error("Codec error [{codec}]: {message}")]
    Codec {
        /// Name of the codec that failed (e.g. "zopfli", "oxipng")
        codec: String,
        /// Detailed error message from the codec
        message: String,
    },

    /// PDF parsing or rewriting failed.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// Generic file operation failure with message.
    #[error("File operation failed: {0}")]
    FileOperationFailed(String),

    /// A task was submitted to a worker pool that has begun shutdown.
    #[error("Worker pool stopped")]
    PoolStopped,

    /// The given container format name is not recognized.
    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    /// The specified path does not exist on the filesystem.
    #[error("Path not found: {0}")]
    PathNotFound(std::path::PathBuf),

    /// Generic command execution error.
    #[error("{0}")]
    CommandExecution(String),

    /// Catch-all error variant wrapping any other failure.
    #[error("Unknown error: {0}")]
    Other(#[from] anyhow::Error),
}

// Convert file exploration errors to I/O errors
impl From<walkdir::Error> for OptiPackError {
    fn from(err: walkdir::Error) -> Self {
        OptiPackError::FileOperationFailed(err.to_string())
    }
}

// Convert zip reader/writer errors to container errors
impl From<zip::result::ZipError> for OptiPackError {
    fn from(err: zip::result::ZipError) -> Self {
        OptiPackError::Container {
            format: "zip".to_string(),
            message: err.to_string(),
        }
    }
}

// Convert lopdf errors to PDF errors
impl From<lopdf::Error> for OptiPackError {
    fn from(err: lopdf::Error) -> Self {
        OptiPackError::Pdf(err.to_string())
    }
}

// Convert CSV writer errors to file operation failures
impl From<csv::Error> for OptiPackError {
    fn from(err: csv::Error) -> Self {
        OptiPackError::FileOperationFailed(err.to_string())
    }
}

// Convert config crate error to configuration error
impl From<config::ConfigError> for OptiPackError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => OptiPackError::Config {
                message: format!("Configuration file not found: {}", path),
            },
            config::ConfigError::Message(msg) => OptiPackError::Config { message: msg },
            _ => OptiPackError::Config {
                message: format!("Configuration error: {}", err),
            },
        }
    }
}

impl From<serde_json::Error> for OptiPackError {
    fn from(err: serde_json::Error) -> Self {
        OptiPackError::Config {
            message: format!("JSON serialization/deserialization error: {}", err),
        }
    }
}

/// Specialized `Result` type for OptiPack operations.
pub type OptiPackResult<T> = Result<T, OptiPackError>;

impl OptiPackError {
    /// Create a configuration error with the given message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use optipack_cli::error::OptiPackError;
    /// let err = OptiPackError::config("invalid setting");
    /// assert_eq!(err.to_string(), "Configuration error: invalid setting");
    /// ```
    pub fn config<S: Into<String>>(message: S) -> Self {
        OptiPackError::Config {
            message: message.into(),
        }
    }

    /// Create a container error for the given format and message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use optipack_cli::error::OptiPackError;
    /// let err = OptiPackError::container("zip", "truncated archive");
    /// assert!(err.to_string().contains("zip"));
    /// ```
    pub fn container<S1, S2>(format: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        OptiPackError::Container {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Create a codec error with the given codec name and message.
    pub fn codec<S1, S2>(codec: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        OptiPackError::Codec {
            codec: codec.into(),
            message: message.into(),
        }
    }

    /// Create a PDF error with the given message.
    pub fn pdf<S: Into<String>>(message: S) -> Self {
        OptiPackError::Pdf(message.into())
    }

    /// Create a file operation failure with the given message.
    pub fn file_operation<S: Into<String>>(message: S) -> Self {
        OptiPackError::FileOperationFailed(message.into())
    }

    /// Return the corresponding exit code for this error variant.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use optipack_cli::error::OptiPackError;
    /// assert_eq!(OptiPackError::config("x").exit_code(), 2);
    /// ```
    pub fn exit_code(&self) -> i32 {
        match self {
            OptiPackError::Io(_) => 1,
            OptiPackError::Config { .. } => 2,
            OptiPackError::InvalidFormat(_) => 2,
            OptiPackError::Container { .. } => 3,
            OptiPackError::Codec { .. } => 4,
            OptiPackError::Pdf(_) => 5,
            OptiPackError::PathNotFound(_) => 6,
            _ => 1,
        }
    }

    /// Return a user-friendly error message with suggested remedies.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use optipack_cli::error::OptiPackError;
    /// let msg = OptiPackError::config("missing key").user_friendly_message();
    /// assert!(msg.contains("Configuration error:"));
    /// ```
    pub fn user_friendly_message(&self) -> String {
        match self {
            OptiPackError::Io(e) => format!("File operation error: {}", e),
            OptiPackError::Config { message } => format!(
                "Configuration error: {}\nHint: run 'optipack-cli --help' for option details",
                message
            ),
            OptiPackError::Container { format, message } => format!(
                "Container error ({}): {}\nHint: check the archive is intact and readable",
                format, message
            ),
            OptiPackError::Codec { codec, message } => format!(
                "Codec error ({}): {}\nHint: the original file is left untouched",
                codec, message
            ),
            OptiPackError::Pdf(msg) => format!(
                "PDF error: {}\nHint: the original document is left untouched",
                msg
            ),
            OptiPackError::InvalidFormat(fmt) => format!(
                "Invalid container format: {}\nHint: expected one of zip, tar, gz, bz2, xz",
                fmt
            ),
            OptiPackError::PathNotFound(path) => format!("Path not found: {}", path.display()),
            OptiPackError::FileOperationFailed(msg) => format!("File operation failed: {}", msg),
            OptiPackError::PoolStopped => "Worker pool stopped".to_string(),
            OptiPackError::CommandExecution(msg) => msg.clone(),
            OptiPackError::Other(err) => {
                format!("Unknown error: {}\nHint: please report this issue", err)
            }
        }
    }
}

// Unit test: OptiPackError error types and helper methods
#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_error_creation() {
        let error = OptiPackError::config("test config error");
        assert!(matches!(error, OptiPackError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: test config error");
    }

    #[test]
    fn test_container_error_creation() {
        let error = OptiPackError::container("docx", "bad central directory");
        assert!(matches!(error, OptiPackError::Container { .. }));
        let msg = error.to_string();
        assert!(msg.contains("docx"));
        assert!(msg.contains("bad central directory"));
    }

    #[test]
    fn test_codec_error_creation() {
        let error = OptiPackError::codec("oxipng", "decode failed");
        assert!(matches!(error, OptiPackError::Codec { .. }));
        assert_eq!(
            error.to_string(),
            "Codec error [oxipng]: decode failed"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let optipack_error: OptiPackError = io_error.into();
        assert!(matches!(optipack_error, OptiPackError::Io(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(OptiPackError::config("test").exit_code(), 2);
        assert_eq!(OptiPackError::container("zip", "test").exit_code(), 3);
        assert_eq!(OptiPackError::codec("zopfli", "test").exit_code(), 4);
        assert_eq!(OptiPackError::pdf("test").exit_code(), 5);
    }

    #[test]
    fn test_user_friendly_messages() {
        let config_error = OptiPackError::config("missing key");
        let message = config_error.user_friendly_message();
        assert!(message.contains("Configuration error:"));
        assert!(message.contains("--help"));

        let codec_error = OptiPackError::codec("zopfli", "stream too short");
        let message = codec_error.user_friendly_message();
        assert!(message.contains("Codec error"));
        assert!(message.contains("left untouched"));
    }
}
