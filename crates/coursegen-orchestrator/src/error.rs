//! Error types for the course generation orchestrator.
//!
//! Every variant maps to one stable code returned in API error envelopes
//! (see [`CourseGenError::code`]).

use std::path::PathBuf;

use coursegen_content::ContentError;
use coursegen_gateway::GatewayError;

/// A specialized `Result` type for orchestrator operations.
pub type Result<T> = std::result::Result<T, CourseGenError>;

/// Errors that can occur while generating, storing or serving courses.
#[derive(Debug, thiserror::Error)]
pub enum CourseGenError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your coursegen.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Generation Errors
    // ========================================================================
    /// An external service failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The model response did not contain usable JSON.
    #[error("invalid JSON in model response: {message}")]
    InvalidJson {
        /// Why extraction or parsing failed.
        message: String,
        /// The untouched model output.
        raw: String,
    },

    /// Generation failed for a reason other than the model call itself.
    #[error("generation failed: {message}")]
    Generation {
        /// What went wrong.
        message: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The requested document does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of document ("course", "lesson", ...).
        resource: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// The document exists but belongs to someone else.
    #[error("access denied to {resource} {id}")]
    AccessDenied {
        /// Kind of document.
        resource: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// The request itself is malformed.
    #[error("{message}")]
    Validation {
        /// What is wrong with the request.
        message: String,
    },

    /// No caller identity was supplied.
    #[error("missing caller identity")]
    Unauthorized,

    // ========================================================================
    // Store Errors
    // ========================================================================
    /// The store snapshot could not be read or written.
    #[error("Store snapshot error at '{path}': {message}\n\nSuggestion: Check the store.snapshotPath setting and file permissions")]
    Snapshot {
        /// Snapshot file path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ContentError> for CourseGenError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::InvalidJson { message, raw } => Self::InvalidJson { message, raw },
            ContentError::InvalidOutline { .. } => Self::Generation {
                message: err.to_string(),
            },
        }
    }
}

impl CourseGenError {
    /// Creates a new `ConfigParseError`.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError`.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Generation` error.
    #[must_use]
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(resource: &'static str, id: impl std::fmt::Display) -> Self {
        Self::AccessDenied {
            resource,
            id: id.to_string(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `Snapshot` error.
    #[must_use]
    pub fn snapshot(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Snapshot {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for API responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Gateway(GatewayError::InvalidRequest(_)) | Self::Validation { .. } => {
                "VALIDATION_ERROR"
            }
            Self::Gateway(_) => "API_ERROR",
            Self::InvalidJson { .. } => "INVALID_JSON",
            Self::Generation { .. } => "GENERATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::Snapshot { .. }
            | Self::Io(_)
            | Self::Json(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns `true` if repeating the operation might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Gateway(err) => err.is_transient(),
            Self::InvalidJson { .. } => true,
            _ => false,
        }
    }
}
