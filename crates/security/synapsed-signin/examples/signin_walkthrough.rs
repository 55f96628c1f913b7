//! Walk one user through an automatic sign-in that spans three turns.
//!
//! Run with `RUST_LOG=synapsed_signin=debug` to watch the flow transitions.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use synapsed_signin::{
    continuation::{TurnProcessor, TurnSenderFactory},
    handler::{AuthHandler, HandlerRegistry, SignInRequest, SignInResponse},
    observability,
    turn::TurnSender,
    Activity, ActivityHandler, AuthorizationOrchestrator, CancellationToken,
    ChannelContinuationQueue, ContinuationWorker, MemoryStorage, Result, SignInConfig,
    SignInPipeline, TurnContext, TurnState,
};

struct Console;

#[async_trait]
impl TurnSender for Console {
    async fn send_activity(&self, activity: Activity) -> Result<()> {
        println!("bot> {}", activity.text.unwrap_or_default());
        Ok(())
    }
}

#[derive(Default)]
struct DemoHandler {
    signed_in: Mutex<HashSet<String>>,
}

#[async_trait]
impl AuthHandler for DemoHandler {
    fn name(&self) -> &str {
        "demo"
    }

    async fn sign_in(&self, ctx: &TurnContext, request: &SignInRequest) -> Result<SignInResponse> {
        let user = ctx.user_id().to_string();
        if self.signed_in.lock().contains(&user) {
            return Ok(SignInResponse::complete(format!("demo-token-{user}")));
        }
        if !request.force_sign_in && ctx.activity().text.as_deref() == Some("424242") {
            self.signed_in.lock().insert(user.clone());
            return Ok(SignInResponse::complete(format!("demo-token-{user}")));
        }
        ctx.send_text("Open the sign-in link and type the code you receive")
            .await?;
        Ok(SignInResponse::pending())
    }

    async fn sign_out(&self, ctx: &TurnContext) -> Result<()> {
        self.signed_in.lock().remove(ctx.user_id());
        Ok(())
    }

    async fn reset_state(&self, _ctx: &TurnContext) -> Result<()> {
        Ok(())
    }
}

struct EchoApp {
    orchestrator: Arc<AuthorizationOrchestrator>,
}

#[async_trait]
impl ActivityHandler for EchoApp {
    async fn on_activity(&self, ctx: &TurnContext, _state: &mut TurnState) -> Result<()> {
        let token = self
            .orchestrator
            .get_cached_token(ctx, "demo")
            .unwrap_or_default();
        let text = ctx.activity().text.clone().unwrap_or_default();
        ctx.send_text(format!("You said '{text}' (token {token})")).await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = SignInConfig::load(None, Some(synapsed_signin::config::DEFAULT_ENV_PREFIX))?;
    config.auto_sign_in = true;
    observability::init_tracing(&config.logging);

    let handlers: Vec<Arc<dyn AuthHandler>> = vec![Arc::new(DemoHandler::default())];
    let (queue, receiver) = ChannelContinuationQueue::new();
    let orchestrator = Arc::new(
        AuthorizationOrchestrator::builder(config)
            .dispatcher(Arc::new(HandlerRegistry::new(handlers, None)?))
            .continuations(Arc::new(queue.clone()))
            .build()?,
    );
    let app = Arc::new(EchoApp {
        orchestrator: orchestrator.clone(),
    });
    let pipeline = Arc::new(SignInPipeline::new(
        orchestrator,
        Arc::new(MemoryStorage::new()),
        app,
    ));

    let senders: Arc<dyn TurnSenderFactory> =
        Arc::new(|_: &Activity| -> Arc<dyn TurnSender> { Arc::new(Console) });
    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(
        ContinuationWorker::new(receiver, pipeline.clone(), senders)
            .run_until_cancelled(shutdown.clone()),
    );

    for text in ["what's on my calendar?", "424242"] {
        println!("user> {text}");
        let activity = Activity::message("console", "demo-user", "demo-conversation", text);
        pipeline
            .process_turn(TurnContext::new(activity, Arc::new(Console)))
            .await?;
    }

    // Give the worker a moment to replay the banked question.
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    let _ = worker.await;

    println!("continuations: {:?}", queue.stats());
    Ok(())
}
