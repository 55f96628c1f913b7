//! Shared fakes for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synapsed_signin::{
    callbacks::{SignInFailure, SignInFailureHandler, SignInSuccess, SignInSuccessHandler},
    continuation::{ContinuationQueue, ResumeTask},
    flow::{BankedActivity, FlowState},
    handler::{SignInDispatcher, SignInRequest, SignInResponse},
    storage::{MemoryStorage, Storage, TurnState},
    turn::{TurnContext, TurnSender},
    Activity, AuthorizationOrchestrator, AutoSignIn, Error, Result, SignInConfig,
};

pub const GRAPH: &str = "graph";
pub const GITHUB: &str = "github";

/// Initialize test logging
pub fn init_test_logging() {
    synapsed_signin::observability::init_test_tracing();
}

pub fn message(user: &str, text: &str) -> Activity {
    Activity::message("web", user, "conv-1", text)
}

/// The platform event that finishes an OAuth round trip
pub fn verify_state(user: &str, code: &str) -> Activity {
    Activity::event(
        "web",
        user,
        "conv-1",
        "signin/verifyState",
        serde_json::json!({ "state": code }),
    )
}

/// Captures everything sent back to the channel
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Activity>>,
}

impl RecordingSender {
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|a| a.text.clone())
            .collect()
    }
}

#[async_trait]
impl TurnSender for RecordingSender {
    async fn send_activity(&self, activity: Activity) -> Result<()> {
        self.sent.lock().push(activity);
        Ok(())
    }
}

/// Continuation queue that records submissions and can be switched off
#[derive(Default)]
pub struct FakeQueue {
    tasks: Mutex<Vec<ResumeTask>>,
    down: AtomicBool,
}

impl FakeQueue {
    pub fn activities(&self) -> Vec<Activity> {
        self.tasks.lock().iter().map(|t| t.activity.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Make every submit fail until switched back
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContinuationQueue for FakeQueue {
    async fn submit(&self, task: ResumeTask) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::delivery("queue unavailable"));
        }
        self.tasks.lock().push(task);
        Ok(())
    }
}

/// Dispatcher answering from a script of responses
pub struct ScriptedDispatcher {
    names: Vec<String>,
    script: Mutex<VecDeque<SignInResponse>>,
    calls: Mutex<Vec<SignInRequest>>,
    sign_outs: Mutex<Vec<String>>,
    resets: Mutex<Vec<String>>,
}

impl ScriptedDispatcher {
    pub fn new(responses: impl IntoIterator<Item = SignInResponse>) -> Arc<Self> {
        Arc::new(Self {
            names: vec![GRAPH.to_string(), GITHUB.to_string()],
            script: Mutex::new(responses.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            sign_outs: Mutex::new(Vec::new()),
            resets: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, response: SignInResponse) {
        self.script.lock().push_back(response);
    }

    pub fn calls(&self) -> Vec<SignInRequest> {
        self.calls.lock().clone()
    }

    pub fn sign_outs(&self) -> Vec<String> {
        self.sign_outs.lock().clone()
    }

    pub fn resets(&self) -> Vec<String> {
        self.resets.lock().clone()
    }
}

#[async_trait]
impl SignInDispatcher for ScriptedDispatcher {
    fn default_handler_name(&self) -> String {
        self.names[0].clone()
    }

    fn handler_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn contains(&self, handler: &str) -> bool {
        self.names.iter().any(|n| n == handler)
    }

    async fn sign_in(&self, _ctx: &TurnContext, request: SignInRequest) -> Result<SignInResponse> {
        self.calls.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .ok_or_else(|| Error::handler("dispatcher script exhausted"))
    }

    async fn sign_out(&self, _ctx: &TurnContext, handler: &str) -> Result<()> {
        self.sign_outs.lock().push(handler.to_string());
        Ok(())
    }

    async fn reset_state(&self, _ctx: &TurnContext, handler: &str) -> Result<()> {
        self.resets.lock().push(handler.to_string());
        Ok(())
    }
}

mock! {
    pub Dispatcher {}

    #[async_trait]
    impl SignInDispatcher for Dispatcher {
        fn default_handler_name(&self) -> String;
        fn handler_names(&self) -> Vec<String>;
        fn contains(&self, handler: &str) -> bool;
        async fn sign_in(&self, ctx: &TurnContext, request: SignInRequest) -> Result<SignInResponse>;
        async fn sign_out(&self, ctx: &TurnContext, handler: &str) -> Result<()>;
        async fn reset_state(&self, ctx: &TurnContext, handler: &str) -> Result<()>;
    }
}

/// Mock dispatcher that knows `graph` and must never be asked to sign in
pub fn untouchable_dispatcher() -> MockDispatcher {
    let mut dispatcher = MockDispatcher::new();
    dispatcher
        .expect_default_handler_name()
        .returning(|| GRAPH.to_string());
    dispatcher
        .expect_handler_names()
        .returning(|| vec![GRAPH.to_string()]);
    dispatcher.expect_contains().returning(|name| name == GRAPH);
    dispatcher.expect_sign_in().never();
    dispatcher
}

#[derive(Default)]
pub struct RecordingSuccess {
    pub calls: Mutex<Vec<SignInSuccess>>,
}

#[async_trait]
impl SignInSuccessHandler for RecordingSuccess {
    async fn on_sign_in_success(&self, _ctx: &TurnContext, success: SignInSuccess) -> Result<()> {
        self.calls.lock().push(success);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingFailure {
    pub calls: Mutex<Vec<SignInFailure>>,
}

#[async_trait]
impl SignInFailureHandler for RecordingFailure {
    async fn on_sign_in_failure(&self, _ctx: &TurnContext, failure: SignInFailure) -> Result<()> {
        self.calls.lock().push(failure);
        Ok(())
    }
}

/// Orchestrator wired to fakes, plus per-turn helpers
pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub queue: Arc<FakeQueue>,
    pub dispatcher: Arc<ScriptedDispatcher>,
    pub success: Arc<RecordingSuccess>,
    pub failure: Arc<RecordingFailure>,
    pub orchestrator: AuthorizationOrchestrator,
}

/// One turn's context, state and outbox
pub struct Turn {
    pub ctx: TurnContext,
    pub state: TurnState,
    pub sender: Arc<RecordingSender>,
}

impl Harness {
    /// Auto sign-in on, both callbacks registered
    pub fn new(responses: impl IntoIterator<Item = SignInResponse>) -> Self {
        Self::build(responses, AutoSignIn::Enabled, true)
    }

    /// Auto sign-in on, no callbacks registered
    pub fn without_callbacks(responses: impl IntoIterator<Item = SignInResponse>) -> Self {
        Self::build(responses, AutoSignIn::Enabled, false)
    }

    pub fn build(
        responses: impl IntoIterator<Item = SignInResponse>,
        auto_sign_in: AutoSignIn,
        callbacks: bool,
    ) -> Self {
        init_test_logging();
        let storage = Arc::new(MemoryStorage::new());
        let queue = Arc::new(FakeQueue::default());
        let dispatcher = ScriptedDispatcher::new(responses);
        let success = Arc::new(RecordingSuccess::default());
        let failure = Arc::new(RecordingFailure::default());

        let mut builder = AuthorizationOrchestrator::builder(SignInConfig::default())
            .dispatcher(dispatcher.clone())
            .continuations(queue.clone())
            .auto_sign_in(auto_sign_in);
        if callbacks {
            builder = builder
                .on_success(success.clone())
                .on_failure(failure.clone());
        }
        let orchestrator = builder.build().expect("harness orchestrator");

        Self {
            storage,
            queue,
            dispatcher,
            success,
            failure,
            orchestrator,
        }
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    /// Start a fresh turn for an activity
    pub async fn turn(&self, activity: Activity) -> Turn {
        let sender = Arc::new(RecordingSender::default());
        let state = TurnState::load(self.storage(), &activity)
            .await
            .expect("load turn state");
        Turn {
            ctx: TurnContext::new(activity, sender.clone()),
            state,
            sender,
        }
    }

    /// Start a turn as continuation delivery would
    pub async fn redelivered_turn(&self, activity: Activity) -> Turn {
        let mut turn = self.turn(activity).await;
        turn.ctx = turn.ctx.with_redelivery();
        turn
    }

    /// Persisted flow state for a user, read back from storage
    pub async fn flow_of(&self, user: &str) -> FlowState {
        let state = TurnState::load(self.storage(), &message(user, ""))
            .await
            .expect("load turn state");
        FlowState::load(&state).expect("decode flow state")
    }

    /// Persist an active flow as if a previous turn had started it
    pub async fn seed_flow(&self, user: &str, handler: &str, banked: BankedActivity) {
        let mut state = TurnState::load(self.storage(), &message(user, ""))
            .await
            .expect("load turn state");
        let mut flow = FlowState::default();
        flow.begin(handler, banked);
        flow.store(&mut state).expect("store flow");
        state.save().await.expect("save flow");
    }
}
