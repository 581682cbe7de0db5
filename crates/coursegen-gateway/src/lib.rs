//! Coursegen Gateway
//!
//! Clients for the external services behind course generation:
//!
//! - [`gemini`] - the generative model, behind the [`TextGenerator`] trait,
//!   with bounded retry and linear backoff
//! - [`video`] - video search, behind the [`VideoSearch`] trait, with a
//!   YouTube client and a TTL cache
//! - [`mock`] - scripted implementations of both traits for tests
//!
//! Services are constructed once and injected where they are needed; there
//! is no process-wide client.

pub mod gemini;
pub mod mock;
pub mod video;

pub use gemini::{GeminiClient, GeminiConfig, TextGenerator};
pub use mock::{ScriptedGenerator, StaticVideoSearch};
pub use video::{
    normalize_query, CachedVideoSearch, VideoResult, VideoSearch, VideoSearchCache,
    YouTubeConfig, YouTubeSearch,
};

use thiserror::Error;

/// Errors that can occur when talking to external services.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The remote API failed, after any retries.
    #[error("API error: {message}")]
    Api {
        /// Last failure message.
        message: String,
        /// HTTP status of the last response, if one was received.
        status: Option<u16>,
    },

    /// The service has no credentials configured.
    #[error("{service} is not configured: {hint}")]
    NotConfigured {
        /// Which service.
        service: &'static str,
        /// How to enable it.
        hint: &'static str,
    },

    /// The request was rejected before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl GatewayError {
    /// Creates a new `Api` error.
    #[must_use]
    pub fn api(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Api {
            message: message.into(),
            status,
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status carried by an `Api` error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns `true` if a later attempt might succeed.
    ///
    /// Transport failures, rate limiting and server errors are transient;
    /// other client errors and configuration problems are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Api { status: None, .. } => true,
            Self::Api {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            Self::NotConfigured { .. } | Self::InvalidRequest(_) | Self::Client(_) => false,
        }
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
