//! Name-keyed handler registry with a single default-resolution rule

use super::{AuthHandler, ErrorCause, SignInDispatcher, SignInRequest, SignInResponse};
use crate::turn::TurnContext;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pick the default handler.
///
/// An explicitly configured name wins and must be registered. Without one,
/// the first registered handler is the default.
pub fn resolve_default_handler(registered: &[String], configured: Option<&str>) -> Result<String> {
    match configured {
        Some(name) if registered.iter().any(|r| r == name) => Ok(name.to_string()),
        Some(name) => Err(Error::HandlerNotFound(name.to_string())),
        None => registered.first().cloned().ok_or(Error::NoHandlers),
    }
}

/// Insertion-ordered set of authentication handlers
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn AuthHandler>>,
    default_handler: String,
}

impl HandlerRegistry {
    /// Build a registry; fails on duplicate names or an unknown configured default
    pub fn new(handlers: Vec<Arc<dyn AuthHandler>>, default_handler: Option<&str>) -> Result<Self> {
        let mut names: Vec<String> = Vec::with_capacity(handlers.len());
        for handler in &handlers {
            let name = handler.name();
            if names.iter().any(|n| n == name) {
                return Err(Error::config(format!(
                    "authentication handler '{name}' registered twice"
                )));
            }
            names.push(name.to_string());
        }
        let default_handler = resolve_default_handler(&names, default_handler)?;
        debug!(handlers = ?names, default = %default_handler, "Handler registry built");

        Ok(Self {
            handlers,
            default_handler,
        })
    }

    /// Look up a handler by name
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn AuthHandler>> {
        self.handlers
            .iter()
            .find(|h| h.name() == name)
            .ok_or_else(|| Error::HandlerNotFound(name.to_string()))
    }

    /// The default handler
    pub fn default_handler(&self) -> &Arc<dyn AuthHandler> {
        // Membership was checked when the registry was built.
        self.handlers
            .iter()
            .find(|h| h.name() == self.default_handler)
            .unwrap_or(&self.handlers[0])
    }
}

#[async_trait]
impl SignInDispatcher for HandlerRegistry {
    fn default_handler_name(&self) -> String {
        self.default_handler.clone()
    }

    fn handler_names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    fn contains(&self, handler: &str) -> bool {
        self.handlers.iter().any(|h| h.name() == handler)
    }

    async fn sign_in(&self, ctx: &TurnContext, request: SignInRequest) -> Result<SignInResponse> {
        let handler = self.resolve(&request.handler)?;
        match handler.sign_in(ctx, &request).await {
            Ok(response) => Ok(response),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(err) => {
                warn!(handler = %request.handler, error = %err, "Handler failed during sign-in");
                Ok(SignInResponse::error(ErrorCause::Other, err.to_string()))
            }
        }
    }

    async fn sign_out(&self, ctx: &TurnContext, handler: &str) -> Result<()> {
        self.resolve(handler)?.sign_out(ctx).await
    }

    async fn reset_state(&self, ctx: &TurnContext, handler: &str) -> Result<()> {
        self.resolve(handler)?.reset_state(ctx).await
    }
}
