//! Turn pipeline gating an application behind sign-in

use crate::continuation::TurnProcessor;
use crate::orchestrator::AuthorizationOrchestrator;
use crate::storage::{Storage, TurnState};
use crate::turn::TurnContext;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Application logic run once sign-in lets a turn through
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    /// Handle the turn's activity
    async fn on_activity(&self, ctx: &TurnContext, state: &mut TurnState) -> Result<()>;
}

/// Loads user state, routes redelivered completion events, gates everything
/// else through [`AuthorizationOrchestrator::start_or_continue`] and saves
/// state at the end of the turn.
pub struct SignInPipeline {
    orchestrator: Arc<AuthorizationOrchestrator>,
    storage: Arc<dyn Storage>,
    app: Arc<dyn ActivityHandler>,
    handler: Option<String>,
}

impl SignInPipeline {
    /// Create a pipeline that signs in with the default handler
    pub fn new(
        orchestrator: Arc<AuthorizationOrchestrator>,
        storage: Arc<dyn Storage>,
        app: Arc<dyn ActivityHandler>,
    ) -> Self {
        Self {
            orchestrator,
            storage,
            app,
            handler: None,
        }
    }

    /// Request a specific handler for flows this pipeline starts
    #[must_use]
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// The orchestrator behind this pipeline
    pub fn orchestrator(&self) -> &Arc<AuthorizationOrchestrator> {
        &self.orchestrator
    }
}

#[async_trait]
impl TurnProcessor for SignInPipeline {
    #[instrument(skip_all, fields(turn_id = %ctx.turn_id(), user_id = %ctx.user_id()))]
    async fn process_turn(&self, ctx: TurnContext) -> Result<()> {
        let mut state = TurnState::load(Arc::clone(&self.storage), ctx.activity()).await?;

        if self.orchestrator.is_completion_event(ctx.activity()) {
            if !ctx.is_redelivery() {
                // Only continuation delivery may produce completion events.
                warn!("Dropping inbound sign-in completion event");
                return Ok(());
            }
            self.orchestrator.handle_completion(&ctx).await?;
        } else if self
            .orchestrator
            .start_or_continue(&ctx, &mut state, self.handler.as_deref())
            .await?
        {
            self.app.on_activity(&ctx, &mut state).await?;
        } else {
            debug!("Turn handled by sign-in");
        }

        state.save().await
    }
}
