//! # Synapsed Sign-In
//!
//! Multi-turn OAuth-style sign-in orchestration for conversational turn
//! pipelines.
//!
//! ## Features
//!
//! - **Gating**: every turn passes through
//!   [`AuthorizationOrchestrator::start_or_continue`], which starts, continues
//!   or concludes a per-user sign-in flow
//! - **Bank and redeliver**: the activity that triggered a flow is persisted
//!   and replayed as a fresh turn once the flow completes
//! - **Explicit API**: [`AuthorizationOrchestrator::sign_in`] with outcomes
//!   reported through injected success and failure strategies
//! - **Per-user token cache** keyed by user and handler
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use synapsed_signin::{
//!     handler::{AuthHandler, HandlerRegistry, SignInRequest, SignInResponse},
//!     AuthorizationOrchestrator, ChannelContinuationQueue, SignInConfig, TurnContext,
//! };
//!
//! struct Graph;
//!
//! #[async_trait]
//! impl AuthHandler for Graph {
//!     fn name(&self) -> &str {
//!         "graph"
//!     }
//!
//!     async fn sign_in(
//!         &self,
//!         _ctx: &TurnContext,
//!         _request: &SignInRequest,
//!     ) -> synapsed_signin::Result<SignInResponse> {
//!         Ok(SignInResponse::pending())
//!     }
//!
//!     async fn sign_out(&self, _ctx: &TurnContext) -> synapsed_signin::Result<()> {
//!         Ok(())
//!     }
//!
//!     async fn reset_state(&self, _ctx: &TurnContext) -> synapsed_signin::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> synapsed_signin::Result<()> {
//! let handlers: Vec<Arc<dyn AuthHandler>> = vec![Arc::new(Graph)];
//! let registry = HandlerRegistry::new(handlers, None)?;
//! let (queue, _receiver) = ChannelContinuationQueue::new();
//!
//! let orchestrator = AuthorizationOrchestrator::builder(SignInConfig::default())
//!     .dispatcher(Arc::new(registry))
//!     .continuations(Arc::new(queue))
//!     .build()?;
//! assert_eq!(orchestrator.default_handler_name(), "graph");
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

/// Minimal activity model
pub mod activity;

/// Per-user token cache
pub mod cache;

/// Success and failure strategies
pub mod callbacks;

/// Configuration loading
pub mod config;

/// Continuation delivery
pub mod continuation;

/// Error types for the library
pub mod error;

/// Persisted flow state and the completion event
pub mod flow;

/// Authentication handlers and the dispatcher
pub mod handler;

/// Tracing setup and metrics
pub mod observability;

/// The sign-in orchestrator
pub mod orchestrator;

/// Turn pipeline glue
pub mod pipeline;

/// Turn-scoped state storage
pub mod storage;

/// Turn context and cancellation
pub mod turn;

// Re-export commonly used types
pub use activity::{Activity, ActivityType};
pub use callbacks::{SignInFailure, SignInFailureHandler, SignInSuccess, SignInSuccessHandler};
pub use config::SignInConfig;
pub use continuation::{ChannelContinuationQueue, ContinuationQueue, ContinuationWorker};
pub use error::{Error, Result};
pub use handler::{SignInDispatcher, SignInResponse, SignInStatus};
pub use orchestrator::{AuthorizationBuilder, AuthorizationOrchestrator, AutoSignIn};
pub use pipeline::{ActivityHandler, SignInPipeline};
pub use storage::{MemoryStorage, Storage, TurnState};
pub use turn::{CancellationToken, TurnContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
