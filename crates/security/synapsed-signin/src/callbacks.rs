//! Success and failure strategies for flows that conclude outside the
//! originating turn
//!
//! Strategies are injected once through
//! [`AuthorizationBuilder`](crate::orchestrator::AuthorizationBuilder); there
//! is no way to swap them on a running orchestrator.

use crate::activity::Activity;
use crate::handler::SignInResponse;
use crate::turn::TurnContext;
use crate::Result;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

/// A flow produced a token
#[derive(Debug, Clone, PartialEq)]
pub struct SignInSuccess {
    /// Handler that produced the token
    pub handler_name: String,
    /// The token
    pub token: String,
    /// Activity that started the flow
    pub initiating_activity: Activity,
}

/// A flow ended without a token
#[derive(Debug, Clone, PartialEq)]
pub struct SignInFailure {
    /// Handler that reported the failure
    pub handler_name: String,
    /// The terminal dispatcher response
    pub response: SignInResponse,
    /// Activity that started the flow
    pub initiating_activity: Activity,
}

/// Invoked when a flow completes with a token
#[async_trait]
pub trait SignInSuccessHandler: Send + Sync {
    /// Handle the successful outcome
    async fn on_sign_in_success(&self, ctx: &TurnContext, success: SignInSuccess) -> Result<()>;
}

/// Invoked when a flow ends without a token
#[async_trait]
pub trait SignInFailureHandler: Send + Sync {
    /// Handle the failed outcome
    async fn on_sign_in_failure(&self, ctx: &TurnContext, failure: SignInFailure) -> Result<()>;
}

type BoxedFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Closure adapter for [`SignInSuccessHandler`]
pub struct SuccessFn<F>(F);

/// Closure adapter for [`SignInFailureHandler`]
pub struct FailureFn<F>(F);

/// Adapt a closure returning a boxed future into a success handler
pub fn success_fn<F>(f: F) -> SuccessFn<F>
where
    F: for<'a> Fn(&'a TurnContext, SignInSuccess) -> BoxedFuture<'a> + Send + Sync,
{
    SuccessFn(f)
}

/// Adapt a closure returning a boxed future into a failure handler
pub fn failure_fn<F>(f: F) -> FailureFn<F>
where
    F: for<'a> Fn(&'a TurnContext, SignInFailure) -> BoxedFuture<'a> + Send + Sync,
{
    FailureFn(f)
}

#[async_trait]
impl<F> SignInSuccessHandler for SuccessFn<F>
where
    F: for<'a> Fn(&'a TurnContext, SignInSuccess) -> BoxedFuture<'a> + Send + Sync,
{
    async fn on_sign_in_success(&self, ctx: &TurnContext, success: SignInSuccess) -> Result<()> {
        (self.0)(ctx, success).await
    }
}

#[async_trait]
impl<F> SignInFailureHandler for FailureFn<F>
where
    F: for<'a> Fn(&'a TurnContext, SignInFailure) -> BoxedFuture<'a> + Send + Sync,
{
    async fn on_sign_in_failure(&self, ctx: &TurnContext, failure: SignInFailure) -> Result<()> {
        (self.0)(ctx, failure).await
    }
}
