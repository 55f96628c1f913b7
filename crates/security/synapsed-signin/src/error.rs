//! Error types for synapsed-signin
//!
//! A pending sign-in is not an error: it is reported as
//! [`SignInStatus::Pending`](crate::handler::SignInStatus::Pending). Handler
//! failures travel as [`SignInStatus::Error`](crate::handler::SignInStatus::Error)
//! responses and only become an [`Error`] when the explicit API has nobody
//! to hand them to.

use crate::handler::ErrorCause;
use std::fmt;
use thiserror::Error;

/// Result type alias for synapsed-signin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for synapsed-signin
#[derive(Error, Debug)]
pub enum Error {
    /// A second flow was requested while one is still in progress for the user
    #[error("Sign-in flow for '{active}' is already active (requested '{requested}')")]
    AlreadyActiveFlow {
        /// Handler that owns the in-progress flow
        active: String,
        /// Handler the caller asked for
        requested: String,
    },

    /// No handler is registered under the given name
    #[error("Authentication handler not found: {0}")]
    HandlerNotFound(String),

    /// A required collaborator was not supplied at construction
    #[error("Missing dependency: {0}")]
    MissingDependency(&'static str),

    /// A handler registry was built without any handlers
    #[error("No authentication handlers registered")]
    NoHandlers,

    /// Explicit sign-in failed and no failure callback was registered
    #[error("Sign in for '{handler}' failed ({cause}): {message}")]
    SignInFailed {
        /// Handler that reported the failure
        handler: String,
        /// Reported failure cause
        cause: ErrorCause,
        /// Handler supplied detail
        message: String,
    },

    /// The activity cannot be used to partition turn state
    #[error("Invalid activity: {0}")]
    InvalidActivity(String),

    /// The completion route received a payload it could not decode
    #[error("Invalid sign-in completion event: {0}")]
    InvalidCompletionEvent(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Continuation could not be queued for redelivery
    #[error("Continuation delivery error: {0}")]
    Delivery(String),

    /// Handler-internal failure outside of a sign-in response
    #[error("Handler error: {0}")]
    Handler(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The turn was cancelled before the operation could run
    #[error("Turn cancelled")]
    Cancelled,
}

impl Error {
    /// Create a new storage error
    pub fn storage<T: fmt::Display>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Create a new delivery error
    pub fn delivery<T: fmt::Display>(msg: T) -> Self {
        Self::Delivery(msg.to_string())
    }

    /// Create a new handler error
    pub fn handler<T: fmt::Display>(msg: T) -> Self {
        Self::Handler(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Errors raised while wiring the orchestrator; these are fatal at startup
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::HandlerNotFound(_)
                | Self::MissingDependency(_)
                | Self::NoHandlers
                | Self::Configuration(_)
        )
    }

    /// Errors that describe the outcome of a sign-in flow rather than infrastructure
    #[must_use]
    pub fn is_flow_error(&self) -> bool {
        matches!(self, Self::AlreadyActiveFlow { .. } | Self::SignInFailed { .. })
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
