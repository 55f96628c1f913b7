//! Pluggable authentication handlers and the dispatcher contract
//!
//! A handler may be invoked many times, across many turns, for one logical
//! flow. It owns its own durable progress (pending code exchanges and the
//! like) keyed by user and conversation; the orchestrator only relies on each
//! call returning an accurate [`SignInResponse`].

use crate::turn::TurnContext;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

mod registry;

pub use registry::{resolve_default_handler, HandlerRegistry};

/// Outcome of a single handler invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignInStatus {
    /// More user interaction is needed; the turn should stop here
    Pending,
    /// A token was acquired
    Complete,
    /// The flow ended without a token
    Error,
}

/// Why a handler reported [`SignInStatus::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCause {
    /// The current activity cannot be evaluated for this flow
    InvalidActivity,
    /// Any other handler failure
    Other,
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidActivity => f.write_str("InvalidActivity"),
            Self::Other => f.write_str("Other"),
        }
    }
}

/// Response produced by the dispatcher on every sign-in call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInResponse {
    /// Flow status
    pub status: SignInStatus,
    /// Acquired token, present on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Failure cause, present on error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<ErrorCause>,
    /// Failure detail, present on error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SignInResponse {
    /// Flow needs more user interaction
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: SignInStatus::Pending,
            token: None,
            cause: None,
            error: None,
        }
    }

    /// Flow finished with a token
    pub fn complete(token: impl Into<String>) -> Self {
        Self {
            status: SignInStatus::Complete,
            token: Some(token.into()),
            cause: None,
            error: None,
        }
    }

    /// Flow failed
    pub fn error(cause: ErrorCause, message: impl Into<String>) -> Self {
        Self {
            status: SignInStatus::Error,
            token: None,
            cause: Some(cause),
            error: Some(message.into()),
        }
    }

    /// Cause to report, defaulting to [`ErrorCause::Other`]
    #[must_use]
    pub fn cause_or_other(&self) -> ErrorCause {
        self.cause.unwrap_or(ErrorCause::Other)
    }
}

/// Parameters for exchanging an existing token for one on another connection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenExchange {
    /// Connection to exchange against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    /// Requested scopes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

impl TokenExchange {
    /// Exchange against a named connection
    pub fn new(connection_name: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            connection_name: Some(connection_name.into()),
            scopes,
        }
    }

    /// Nothing to forward
    pub fn is_empty(&self) -> bool {
        self.connection_name.is_none() && self.scopes.is_empty()
    }
}

/// One invocation of a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRequest {
    /// Handler to invoke
    pub handler: String,
    /// Start over instead of continuing existing progress
    pub force_sign_in: bool,
    /// Optional token exchange parameters
    pub exchange: Option<TokenExchange>,
}

/// A component implementing one named authentication flow
#[async_trait]
pub trait AuthHandler: Send + Sync {
    /// Registered name
    fn name(&self) -> &str;

    /// Start or continue the flow for the turn's user
    async fn sign_in(&self, ctx: &TurnContext, request: &SignInRequest) -> Result<SignInResponse>;

    /// Revoke the user's token and forget progress
    async fn sign_out(&self, ctx: &TurnContext) -> Result<()>;

    /// Forget in-flight progress without revoking anything
    async fn reset_state(&self, ctx: &TurnContext) -> Result<()>;
}

/// What the orchestrator needs from a handler registry
#[async_trait]
pub trait SignInDispatcher: Send + Sync {
    /// Name used when no handler is requested
    fn default_handler_name(&self) -> String;

    /// Registered handler names, in registration order
    fn handler_names(&self) -> Vec<String>;

    /// Whether a handler with this name exists
    fn contains(&self, handler: &str) -> bool;

    /// Invoke the named handler
    async fn sign_in(&self, ctx: &TurnContext, request: SignInRequest) -> Result<SignInResponse>;

    /// Sign the user out of the named handler
    async fn sign_out(&self, ctx: &TurnContext, handler: &str) -> Result<()>;

    /// Reset the named handler's in-flight progress
    async fn reset_state(&self, ctx: &TurnContext, handler: &str) -> Result<()>;
}
