//! Authorization orchestrator
//!
//! Two entry modes share one per-user flow:
//!
//! - [`AuthorizationOrchestrator::start_or_continue`] gates every turn. It
//!   continues an active flow or, when the auto sign-in policy agrees, starts
//!   one, banking the triggering activity so it can be replayed in a clean turn
//!   once the flow concludes.
//! - [`AuthorizationOrchestrator::sign_in`] is the explicit API. It banks a
//!   [`SignInCompletionEvent`] instead of the user's message, and the outcome
//!   comes back through the completion route as a redelivered event.
//!
//! At most one flow is active per user. A continuing flow always wins over a
//! fresh auto-start, and terminal dispatcher outcomes always clear the flow.

use crate::cache::TokenCache;
use crate::callbacks::{SignInFailure, SignInFailureHandler, SignInSuccess, SignInSuccessHandler};
use crate::config::SignInConfig;
use crate::continuation::{ContinuationQueue, ResumeTask};
use crate::flow::{BankedActivity, FlowState, SignInCompletionEvent};
use crate::handler::{SignInDispatcher, SignInRequest, SignInResponse, SignInStatus, TokenExchange};
use crate::observability;
use crate::storage::TurnState;
use crate::turn::TurnContext;
use crate::{Activity, Error, Result};
use std::sync::Arc;
use tracing::{debug, info, instrument, trace, warn};

/// Policy deciding whether a turn without an active flow should start one
#[derive(Clone)]
pub enum AutoSignIn {
    /// Always start
    Enabled,
    /// Never start; only explicit sign-ins and continuations run
    Disabled,
    /// Ask a predicate
    When(Arc<dyn Fn(&TurnContext) -> bool + Send + Sync>),
}

impl AutoSignIn {
    /// Policy backed by a predicate
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&TurnContext) -> bool + Send + Sync + 'static,
    {
        Self::When(Arc::new(predicate))
    }

    /// Evaluate the policy for a turn
    pub fn should_start(&self, ctx: &TurnContext) -> bool {
        match self {
            Self::Enabled => true,
            Self::Disabled => false,
            Self::When(predicate) => predicate(ctx),
        }
    }
}

impl From<bool> for AutoSignIn {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

impl std::fmt::Debug for AutoSignIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled => f.write_str("Enabled"),
            Self::Disabled => f.write_str("Disabled"),
            Self::When(_) => f.write_str("When(..)"),
        }
    }
}

/// Builder for [`AuthorizationOrchestrator`]
pub struct AuthorizationBuilder {
    config: SignInConfig,
    dispatcher: Option<Arc<dyn SignInDispatcher>>,
    continuations: Option<Arc<dyn ContinuationQueue>>,
    auto_sign_in: Option<AutoSignIn>,
    on_success: Option<Arc<dyn SignInSuccessHandler>>,
    on_failure: Option<Arc<dyn SignInFailureHandler>>,
    duplicates: Vec<&'static str>,
}

impl AuthorizationBuilder {
    /// Start from a configuration
    pub fn new(config: SignInConfig) -> Self {
        Self {
            config,
            dispatcher: None,
            continuations: None,
            auto_sign_in: None,
            on_success: None,
            on_failure: None,
            duplicates: Vec::new(),
        }
    }

    /// Handler dispatcher (required)
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<dyn SignInDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Continuation delivery (required)
    #[must_use]
    pub fn continuations(mut self, queue: Arc<dyn ContinuationQueue>) -> Self {
        self.continuations = Some(queue);
        self
    }

    /// Override the auto sign-in policy from the configuration
    #[must_use]
    pub fn auto_sign_in(mut self, policy: AutoSignIn) -> Self {
        self.auto_sign_in = Some(policy);
        self
    }

    /// Success strategy; may be set once
    #[must_use]
    pub fn on_success(mut self, handler: Arc<dyn SignInSuccessHandler>) -> Self {
        if self.on_success.replace(handler).is_some() {
            self.duplicates.push("success handler");
        }
        self
    }

    /// Failure strategy; may be set once
    #[must_use]
    pub fn on_failure(mut self, handler: Arc<dyn SignInFailureHandler>) -> Self {
        if self.on_failure.replace(handler).is_some() {
            self.duplicates.push("failure handler");
        }
        self
    }

    /// Validate the wiring and build the orchestrator
    pub fn build(self) -> Result<AuthorizationOrchestrator> {
        self.config.validate()?;
        if let Some(what) = self.duplicates.first() {
            return Err(Error::config(format!("{what} registered more than once")));
        }
        let dispatcher = self
            .dispatcher
            .ok_or(Error::MissingDependency("handler dispatcher"))?;
        let continuations = self
            .continuations
            .ok_or(Error::MissingDependency("continuation queue"))?;

        let default_handler = self
            .config
            .default_handler
            .clone()
            .unwrap_or_else(|| dispatcher.default_handler_name());
        if !dispatcher.contains(&default_handler) {
            return Err(Error::HandlerNotFound(default_handler));
        }

        let auto_sign_in = self
            .auto_sign_in
            .unwrap_or_else(|| AutoSignIn::from(self.config.auto_sign_in));
        debug!(default = %default_handler, auto_sign_in = ?auto_sign_in, "Authorization orchestrator built");

        Ok(AuthorizationOrchestrator {
            config: self.config,
            default_handler,
            dispatcher,
            continuations,
            auto_sign_in,
            on_success: self.on_success,
            on_failure: self.on_failure,
            tokens: TokenCache::new(),
        })
    }
}

/// Multi-turn sign-in orchestrator
pub struct AuthorizationOrchestrator {
    config: SignInConfig,
    default_handler: String,
    dispatcher: Arc<dyn SignInDispatcher>,
    continuations: Arc<dyn ContinuationQueue>,
    auto_sign_in: AutoSignIn,
    on_success: Option<Arc<dyn SignInSuccessHandler>>,
    on_failure: Option<Arc<dyn SignInFailureHandler>>,
    tokens: TokenCache,
}

impl AuthorizationOrchestrator {
    /// Builder entry point
    pub fn builder(config: SignInConfig) -> AuthorizationBuilder {
        AuthorizationBuilder::new(config)
    }

    /// Effective configuration
    pub fn config(&self) -> &SignInConfig {
        &self.config
    }

    /// Handler used when none is requested
    pub fn default_handler_name(&self) -> &str {
        &self.default_handler
    }

    /// Gate a turn.
    ///
    /// Returns `true` when routing should proceed and `false` when this call
    /// fully handled the turn, either by suspending it pending user action or
    /// by handing its outcome elsewhere.
    #[instrument(skip_all, fields(user_id = %ctx.user_id(), conversation_id = %ctx.conversation_id()))]
    pub async fn start_or_continue(
        &self,
        ctx: &TurnContext,
        state: &mut TurnState,
        handler: Option<&str>,
    ) -> Result<bool> {
        ctx.ensure_not_cancelled()?;
        let mut flow = FlowState::load(state)?;
        let continuing = flow.is_active();

        if !continuing && !self.auto_sign_in.should_start(ctx) {
            trace!("No active flow and auto sign-in declined");
            return Ok(true);
        }

        let handler = match flow.active_handler() {
            Some(active) => active.to_string(),
            None => self.requested_handler(handler)?,
        };
        let exchange = match flow.continuation() {
            Some(BankedActivity::Completion(event)) => event.exchange(),
            _ => None,
        };

        let response = self
            .invoke(ctx, SignInRequest {
                handler: handler.clone(),
                force_sign_in: !continuing,
                exchange,
            })
            .await?;
        debug!(handler = %handler, continuing, status = ?response.status, "Dispatcher responded");

        match response.status {
            SignInStatus::Pending => {
                if continuing {
                    debug!(handler = %handler, "Sign-in still pending");
                } else {
                    flow.begin(&handler, BankedActivity::Activity(ctx.activity().clone()));
                    self.persist(&flow, state).await?;
                    observability::record_started(&handler);
                    info!(handler = %handler, "Sign-in pending; triggering activity banked");
                }
                Ok(false)
            }
            SignInStatus::Error => {
                observability::record_failed(&handler, response.cause_or_other());
                warn!(
                    handler = %handler,
                    cause = %response.cause_or_other(),
                    error = response.error.as_deref().unwrap_or_default(),
                    "Sign-in failed; clearing flow"
                );

                if let Some(BankedActivity::Completion(event)) = flow.continuation() {
                    let event = event.clone().with_result(&handler, response);
                    self.redeliver_completion(event).await?;
                    flow.finish();
                    self.persist(&flow, state).await?;
                    return Ok(false);
                }

                let initiating = flow
                    .finish()
                    .map(BankedActivity::into_initiating_activity)
                    .unwrap_or_else(|| ctx.activity().clone());
                self.persist(&flow, state).await?;
                self.report_failure(
                    ctx,
                    SignInFailure {
                        handler_name: handler,
                        response,
                        initiating_activity: initiating,
                    },
                )
                .await?;
                Ok(false)
            }
            SignInStatus::Complete => {
                // This turn owns the cache write; the completion route only reports.
                self.cache_token(ctx.user_id(), &handler, &response);
                observability::record_completed(&handler);
                info!(handler = %handler, "Sign-in complete");

                // Hand the continuation off before clearing the flow, so a failed
                // submit leaves it banked for the next turn.
                let proceed = match flow.continuation() {
                    Some(BankedActivity::Completion(event)) => {
                        let event = event.clone().with_result(&handler, response);
                        self.redeliver_completion(event).await?;
                        false
                    }
                    Some(BankedActivity::Activity(original)) if original != ctx.activity() => {
                        self.submit(original.clone(), &handler).await?;
                        false
                    }
                    _ => true,
                };
                flow.finish();
                self.persist(&flow, state).await?;
                Ok(proceed)
            }
        }
    }

    /// Explicitly sign in with a named handler.
    ///
    /// A pending flow is banked as a completion event and the caller should end
    /// the turn; the outcome arrives later through the completion route.
    #[instrument(skip_all, fields(user_id = %ctx.user_id(), handler = %handler))]
    pub async fn sign_in(
        &self,
        ctx: &TurnContext,
        state: &mut TurnState,
        handler: &str,
        exchange: Option<TokenExchange>,
    ) -> Result<()> {
        ctx.ensure_not_cancelled()?;
        let mut flow = FlowState::load(state)?;
        if let Some(active) = flow.active_handler() {
            return Err(Error::AlreadyActiveFlow {
                active: active.to_string(),
                requested: handler.to_string(),
            });
        }
        if !self.dispatcher.contains(handler) {
            return Err(Error::HandlerNotFound(handler.to_string()));
        }

        if let Some(token) = self.tokens.get(ctx.user_id(), handler) {
            observability::record_cache_hit(handler);
            debug!("Answered from token cache");
            return self
                .report_success(
                    ctx,
                    SignInSuccess {
                        handler_name: handler.to_string(),
                        token,
                        initiating_activity: ctx.activity().clone(),
                    },
                )
                .await;
        }

        let response = self
            .invoke(ctx, SignInRequest {
                handler: handler.to_string(),
                force_sign_in: true,
                exchange: exchange.clone(),
            })
            .await?;

        match response.status {
            SignInStatus::Pending => {
                let event =
                    SignInCompletionEvent::new(handler, exchange.as_ref(), ctx.activity().clone());
                flow.begin(handler, BankedActivity::Completion(event));
                self.persist(&flow, state).await?;
                observability::record_started(handler);
                info!("Explicit sign-in pending; completion event banked");
                Ok(())
            }
            SignInStatus::Error => {
                let cause = response.cause_or_other();
                observability::record_failed(handler, cause);
                warn!(cause = %cause, "Explicit sign-in failed");
                match &self.on_failure {
                    Some(on_failure) => {
                        on_failure
                            .on_sign_in_failure(
                                ctx,
                                SignInFailure {
                                    handler_name: handler.to_string(),
                                    response,
                                    initiating_activity: ctx.activity().clone(),
                                },
                            )
                            .await
                    }
                    None => Err(Error::SignInFailed {
                        handler: handler.to_string(),
                        cause,
                        message: response.error.unwrap_or_default(),
                    }),
                }
            }
            SignInStatus::Complete => {
                let token = self.cache_token(ctx.user_id(), handler, &response);
                observability::record_completed(handler);
                info!("Explicit sign-in complete");
                self.report_success(
                    ctx,
                    SignInSuccess {
                        handler_name: handler.to_string(),
                        token,
                        initiating_activity: ctx.activity().clone(),
                    },
                )
                .await
            }
        }
    }

    /// Sign out of one handler, or of every handler when `handler` is `None`.
    ///
    /// Cached tokens and a flow owned by the handler are cleared together.
    #[instrument(skip_all, fields(user_id = %ctx.user_id()))]
    pub async fn sign_out(
        &self,
        ctx: &TurnContext,
        state: &mut TurnState,
        handler: Option<&str>,
    ) -> Result<()> {
        for name in self.target_handlers(handler)? {
            self.dispatcher.sign_out(ctx, &name).await?;
            self.forget(ctx, state, &name).await?;
            info!(handler = %name, "Signed out");
        }
        Ok(())
    }

    /// Reset in-flight progress of one handler, or of every handler when
    /// `handler` is `None`
    #[instrument(skip_all, fields(user_id = %ctx.user_id()))]
    pub async fn reset_state(
        &self,
        ctx: &TurnContext,
        state: &mut TurnState,
        handler: Option<&str>,
    ) -> Result<()> {
        for name in self.target_handlers(handler)? {
            self.dispatcher.reset_state(ctx, &name).await?;
            self.forget(ctx, state, &name).await?;
            debug!(handler = %name, "Sign-in state reset");
        }
        Ok(())
    }

    /// Token cached for the turn's user and a handler
    pub fn get_cached_token(&self, ctx: &TurnContext, handler: &str) -> Option<String> {
        self.tokens.get(ctx.user_id(), handler)
    }

    /// Handler owning the user's in-progress flow
    pub fn active_flow(&self, state: &TurnState) -> Result<Option<String>> {
        Ok(FlowState::load(state)?.active_handler().map(str::to_string))
    }

    /// Whether an activity is the synthetic completion event
    pub fn is_completion_event(&self, activity: &Activity) -> bool {
        activity.is_event_named(&self.config.completion_event_name)
    }

    /// Completion route: surface a redelivered explicit sign-in outcome.
    ///
    /// Only turns started by continuation delivery are accepted; an inbound
    /// event carrying the completion name is rejected. The token was cached by
    /// the turn that received the dispatcher response, so this route never
    /// writes the cache and a sign-out in between stays in effect.
    #[instrument(skip_all, fields(user_id = %ctx.user_id()))]
    pub async fn handle_completion(&self, ctx: &TurnContext) -> Result<()> {
        if !ctx.is_redelivery() {
            return Err(Error::InvalidCompletionEvent(
                "completion event did not arrive through continuation delivery".into(),
            ));
        }
        let event = SignInCompletionEvent::from_activity(ctx.activity())?;
        let response = event
            .response
            .ok_or_else(|| Error::InvalidCompletionEvent("event carries no response".into()))?;
        let initiating_activity = event.initiating_activity;

        match response.status {
            SignInStatus::Complete => {
                let token = response.token.unwrap_or_default();
                debug!(handler = %event.handler_name, "Completion event: success");
                self.report_success(
                    ctx,
                    SignInSuccess {
                        handler_name: event.handler_name,
                        token,
                        initiating_activity,
                    },
                )
                .await
            }
            SignInStatus::Error => {
                debug!(handler = %event.handler_name, "Completion event: failure");
                self.report_failure(
                    ctx,
                    SignInFailure {
                        handler_name: event.handler_name,
                        response,
                        initiating_activity,
                    },
                )
                .await
            }
            SignInStatus::Pending => Err(Error::InvalidCompletionEvent(format!(
                "flow for '{}' has not concluded",
                event.handler_name
            ))),
        }
    }

    fn requested_handler(&self, handler: Option<&str>) -> Result<String> {
        let name = handler.unwrap_or(&self.default_handler);
        if !self.dispatcher.contains(name) {
            return Err(Error::HandlerNotFound(name.to_string()));
        }
        Ok(name.to_string())
    }

    fn target_handlers(&self, handler: Option<&str>) -> Result<Vec<String>> {
        match handler {
            Some(name) if self.dispatcher.contains(name) => Ok(vec![name.to_string()]),
            Some(name) => Err(Error::HandlerNotFound(name.to_string())),
            None => Ok(self.dispatcher.handler_names()),
        }
    }

    /// Call the dispatcher; a completion without a token counts as a failure
    async fn invoke(&self, ctx: &TurnContext, request: SignInRequest) -> Result<SignInResponse> {
        let handler = request.handler.clone();
        let response = self.dispatcher.sign_in(ctx, request).await?;
        if response.status == SignInStatus::Complete && response.token.is_none() {
            warn!(handler = %handler, "Handler completed without a token");
            return Ok(SignInResponse::error(
                crate::handler::ErrorCause::Other,
                "handler completed without a token",
            ));
        }
        Ok(response)
    }

    async fn persist(&self, flow: &FlowState, state: &mut TurnState) -> Result<()> {
        flow.store(state)?;
        state.save().await
    }

    async fn forget(&self, ctx: &TurnContext, state: &mut TurnState, handler: &str) -> Result<()> {
        self.tokens.remove(ctx.user_id(), handler);
        let mut flow = FlowState::load(state)?;
        if flow.active_handler() == Some(handler) {
            flow.finish();
            self.persist(&flow, state).await?;
        }
        Ok(())
    }

    fn cache_token(&self, user_id: &str, handler: &str, response: &SignInResponse) -> String {
        let token = response.token.clone().unwrap_or_default();
        self.tokens.insert(user_id, handler, token.clone());
        token
    }

    async fn submit(&self, activity: Activity, handler: &str) -> Result<()> {
        let task = ResumeTask::new(activity);
        let task_id = task.id;
        self.continuations.submit(task).await?;
        observability::record_continuation(handler);
        debug!(handler = %handler, task_id = %task_id, "Continuation submitted for redelivery");
        Ok(())
    }

    async fn redeliver_completion(&self, event: SignInCompletionEvent) -> Result<()> {
        let handler = event.handler_name.clone();
        let activity = event.into_activity(&self.config.completion_event_name)?;
        self.submit(activity, &handler).await
    }

    async fn report_success(&self, ctx: &TurnContext, success: SignInSuccess) -> Result<()> {
        match &self.on_success {
            Some(on_success) => on_success.on_sign_in_success(ctx, success).await,
            None => {
                debug!(handler = %success.handler_name, "No success handler registered");
                Ok(())
            }
        }
    }

    async fn report_failure(&self, ctx: &TurnContext, failure: SignInFailure) -> Result<()> {
        match &self.on_failure {
            Some(on_failure) => on_failure.on_sign_in_failure(ctx, failure).await,
            None => {
                let message = self
                    .config
                    .failure_message(&failure.handler_name, failure.response.cause_or_other());
                ctx.send_text(message).await
            }
        }
    }
}

impl std::fmt::Debug for AuthorizationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationOrchestrator")
            .field("default_handler", &self.default_handler)
            .field("auto_sign_in", &self.auto_sign_in)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("cached_tokens", &self.tokens.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::success_fn;
    use crate::storage::{MemoryStorage, Storage};
    use crate::turn::TurnSender;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FixedDispatcher {
        response: SignInResponse,
        calls: Mutex<Vec<SignInRequest>>,
    }

    impl FixedDispatcher {
        fn new(response: SignInResponse) -> Arc<Self> {
            Arc::new(Self {
                response,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SignInDispatcher for FixedDispatcher {
        fn default_handler_name(&self) -> String {
            "graph".to_string()
        }

        fn handler_names(&self) -> Vec<String> {
            vec!["graph".to_string(), "github".to_string()]
        }

        fn contains(&self, handler: &str) -> bool {
            handler == "graph" || handler == "github"
        }

        async fn sign_in(&self, _ctx: &TurnContext, request: SignInRequest) -> Result<SignInResponse> {
            self.calls.lock().push(request);
            Ok(self.response.clone())
        }

        async fn sign_out(&self, _ctx: &TurnContext, _handler: &str) -> Result<()> {
            Ok(())
        }

        async fn reset_state(&self, _ctx: &TurnContext, _handler: &str) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct VecQueue(Mutex<Vec<ResumeTask>>);

    #[async_trait]
    impl ContinuationQueue for VecQueue {
        async fn submit(&self, task: ResumeTask) -> Result<()> {
            self.0.lock().push(task);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Outbox(Mutex<Vec<Activity>>);

    #[async_trait]
    impl TurnSender for Outbox {
        async fn send_activity(&self, activity: Activity) -> Result<()> {
            self.0.lock().push(activity);
            Ok(())
        }
    }

    fn build(dispatcher: Arc<FixedDispatcher>, auto: AutoSignIn) -> AuthorizationOrchestrator {
        AuthorizationOrchestrator::builder(SignInConfig::default())
            .dispatcher(dispatcher)
            .continuations(Arc::new(VecQueue::default()))
            .auto_sign_in(auto)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let missing_dispatcher = AuthorizationBuilder::new(SignInConfig::default())
            .continuations(Arc::new(VecQueue::default()))
            .build();
        assert!(matches!(
            missing_dispatcher,
            Err(Error::MissingDependency("handler dispatcher"))
        ));

        let missing_queue = AuthorizationBuilder::new(SignInConfig::default())
            .dispatcher(FixedDispatcher::new(SignInResponse::pending()))
            .build();
        assert!(matches!(
            missing_queue,
            Err(Error::MissingDependency("continuation queue"))
        ));
    }

    #[test]
    fn test_builder_rejects_unknown_default_handler() {
        let config = SignInConfig {
            default_handler: Some("okta".to_string()),
            ..SignInConfig::default()
        };
        let result = AuthorizationBuilder::new(config)
            .dispatcher(FixedDispatcher::new(SignInResponse::pending()))
            .continuations(Arc::new(VecQueue::default()))
            .build();
        match result {
            Err(err @ Error::HandlerNotFound(_)) => assert!(err.is_configuration_error()),
            other => panic!("expected HandlerNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_builder_rejects_second_success_handler() {
        let noop = || {
            Arc::new(success_fn(|_ctx, _success| Box::pin(async { Ok(()) })))
        };
        let result = AuthorizationBuilder::new(SignInConfig::default())
            .dispatcher(FixedDispatcher::new(SignInResponse::pending()))
            .continuations(Arc::new(VecQueue::default()))
            .on_success(noop())
            .on_success(noop())
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_auto_sign_in_policy() {
        let ctx = TurnContext::new(
            Activity::message("web", "u1", "c1", "hello"),
            Arc::new(Outbox::default()),
        );
        assert!(AutoSignIn::Enabled.should_start(&ctx));
        assert!(!AutoSignIn::Disabled.should_start(&ctx));
        assert!(AutoSignIn::from(true).should_start(&ctx));

        let only_commands = AutoSignIn::when(|ctx| {
            ctx.activity()
                .text
                .as_deref()
                .is_some_and(|text| text.starts_with('/'))
        });
        assert!(!only_commands.should_start(&ctx));
        assert_eq!(format!("{only_commands:?}"), "When(..)");
    }

    #[tokio::test]
    async fn test_disabled_policy_passes_through_without_dispatch() {
        let dispatcher = FixedDispatcher::new(SignInResponse::pending());
        let orchestrator = build(dispatcher.clone(), AutoSignIn::Disabled);
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let activity = Activity::message("web", "u1", "c1", "hello");
        let ctx = TurnContext::new(activity.clone(), Arc::new(Outbox::default()));
        let mut state = TurnState::load(storage, &activity).await.unwrap();

        assert!(orchestrator.start_or_continue(&ctx, &mut state, None).await.unwrap());
        assert!(dispatcher.calls.lock().is_empty());
        assert!(!state.is_dirty());
    }

    #[tokio::test]
    async fn test_complete_without_token_counts_as_failure() {
        let mut tokenless = SignInResponse::complete("unused");
        tokenless.token = None;
        let orchestrator = build(FixedDispatcher::new(tokenless), AutoSignIn::Enabled);

        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let activity = Activity::message("web", "u1", "c1", "hello");
        let outbox = Arc::new(Outbox::default());
        let ctx = TurnContext::new(activity.clone(), outbox.clone());
        let mut state = TurnState::load(storage, &activity).await.unwrap();

        assert!(!orchestrator.start_or_continue(&ctx, &mut state, None).await.unwrap());
        assert_eq!(orchestrator.get_cached_token(&ctx, "graph"), None);

        let sent = outbox.0.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].text.as_deref(),
            Some("Sign in for 'graph' completed without a token. Status=Other")
        );
    }

    #[tokio::test]
    async fn test_cancelled_turn_is_rejected() {
        let dispatcher = FixedDispatcher::new(SignInResponse::pending());
        let orchestrator = build(dispatcher.clone(), AutoSignIn::Enabled);
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let activity = Activity::message("web", "u1", "c1", "hello");
        let ctx = TurnContext::new(activity.clone(), Arc::new(Outbox::default()));
        let mut state = TurnState::load(storage, &activity).await.unwrap();

        ctx.cancellation().cancel();
        let result = orchestrator.start_or_continue(&ctx, &mut state, None).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(dispatcher.calls.lock().is_empty());
    }
}
