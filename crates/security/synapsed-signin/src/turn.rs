//! Turn context and cancellation
//!
//! A [`TurnContext`] lives for exactly one request/response cycle. Redelivered
//! continuations always get a brand new context with their own token.

use crate::activity::Activity;
use crate::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Outbound side of a turn
#[async_trait]
pub trait TurnSender: Send + Sync {
    /// Send an activity back to the channel
    async fn send_activity(&self, activity: Activity) -> Result<()>;
}

struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    parent: Option<CancellationToken>,
}

/// Cooperative cancellation token threaded through every call of a turn
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create a new cancellation token
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                parent: None,
            }),
        }
    }

    /// Create a child token that cancels when this token cancels
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Cancel the token
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if the token or any ancestor is cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
    }

    /// Wait for cancellation
    pub fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            loop {
                // Registered before the flag check so a concurrent cancel is not missed.
                let notified = self.inner.notify.notified();
                if self.is_cancelled() {
                    return;
                }
                match &self.inner.parent {
                    Some(parent) => {
                        tokio::select! {
                            () = notified => {}
                            () = parent.cancelled() => return,
                        }
                    }
                    None => notified.await,
                }
            }
        })
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Everything the orchestrator knows about the turn being processed
#[derive(Clone)]
pub struct TurnContext {
    turn_id: Uuid,
    activity: Activity,
    cancellation: CancellationToken,
    sender: Arc<dyn TurnSender>,
    redelivered: bool,
}

impl TurnContext {
    /// Create a context for a fresh turn with its own cancellation token
    pub fn new(activity: Activity, sender: Arc<dyn TurnSender>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            activity,
            cancellation: CancellationToken::new(),
            sender,
            redelivered: false,
        }
    }

    /// Mark this turn as started by continuation delivery rather than by the channel
    #[must_use]
    pub fn with_redelivery(mut self) -> Self {
        self.redelivered = true;
        self
    }

    /// Use a caller supplied cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Whether continuation delivery started this turn
    pub fn is_redelivery(&self) -> bool {
        self.redelivered
    }

    /// Unique id of this turn
    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    /// The triggering activity
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Cancellation token for this turn
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Id of the user who sent the triggering activity
    pub fn user_id(&self) -> &str {
        &self.activity.from.id
    }

    /// Conversation of the triggering activity
    pub fn conversation_id(&self) -> &str {
        &self.activity.conversation.id
    }

    /// Fail with [`Error::Cancelled`] once the turn has been cancelled
    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Send an activity to the channel
    pub async fn send_activity(&self, activity: Activity) -> Result<()> {
        self.sender.send_activity(activity).await
    }

    /// Reply to the triggering activity with plain text
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.sender.send_activity(self.activity.reply_text(text)).await
    }
}

impl std::fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnContext")
            .field("turn_id", &self.turn_id)
            .field("activity", &self.activity)
            .field("cancellation", &self.cancellation)
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}
