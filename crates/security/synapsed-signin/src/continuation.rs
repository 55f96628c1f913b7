//! Continuation delivery
//!
//! The orchestrator hands an activity to a [`ContinuationQueue`] and returns.
//! Whoever drains the queue must process each task as an independent turn
//! with its own [`TurnContext`]; [`ContinuationWorker`] does exactly that.

use crate::activity::Activity;
use crate::turn::{CancellationToken, TurnContext, TurnSender};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// An activity waiting to be processed as a fresh turn
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeTask {
    /// Task id
    pub id: Uuid,
    /// Activity to redeliver
    pub activity: Activity,
    /// When the task was queued
    pub submitted_at: DateTime<Utc>,
}

impl ResumeTask {
    /// Wrap an activity for redelivery
    pub fn new(activity: Activity) -> Self {
        Self {
            id: Uuid::new_v4(),
            activity,
            submitted_at: Utc::now(),
        }
    }
}

/// Schedules activities for processing outside the current call stack
#[async_trait]
pub trait ContinuationQueue: Send + Sync {
    /// Queue a task; must not wait for the task to be processed
    async fn submit(&self, task: ResumeTask) -> Result<()>;
}

/// Processes one turn end to end
#[async_trait]
pub trait TurnProcessor: Send + Sync {
    /// Run the turn
    async fn process_turn(&self, ctx: TurnContext) -> Result<()>;
}

/// Supplies the outbound sender for a redelivered turn
pub trait TurnSenderFactory: Send + Sync {
    /// Sender to use for a turn triggered by `activity`
    fn sender_for(&self, activity: &Activity) -> Arc<dyn TurnSender>;
}

impl<F> TurnSenderFactory for F
where
    F: Fn(&Activity) -> Arc<dyn TurnSender> + Send + Sync,
{
    fn sender_for(&self, activity: &Activity) -> Arc<dyn TurnSender> {
        self(activity)
    }
}

/// Queue statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks accepted
    pub submitted: u64,
    /// Tasks processed successfully
    pub processed: u64,
    /// Tasks whose turn failed
    pub failed: u64,
}

/// In-process queue backed by an unbounded channel
#[derive(Clone)]
pub struct ChannelContinuationQueue {
    sender: mpsc::UnboundedSender<ResumeTask>,
    stats: Arc<RwLock<QueueStats>>,
}

/// Receiving half of a [`ChannelContinuationQueue`]
pub struct ContinuationReceiver {
    receiver: mpsc::UnboundedReceiver<ResumeTask>,
    stats: Arc<RwLock<QueueStats>>,
}

impl ChannelContinuationQueue {
    /// Create a queue and its receiver
    #[must_use]
    pub fn new() -> (Self, ContinuationReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(RwLock::new(QueueStats::default()));
        (
            Self {
                sender,
                stats: Arc::clone(&stats),
            },
            ContinuationReceiver { receiver, stats },
        )
    }

    /// Snapshot of queue statistics
    pub fn stats(&self) -> QueueStats {
        self.stats.read().clone()
    }
}

#[async_trait]
impl ContinuationQueue for ChannelContinuationQueue {
    async fn submit(&self, task: ResumeTask) -> Result<()> {
        let id = task.id;
        self.sender
            .send(task)
            .map_err(|_| Error::delivery("continuation receiver dropped"))?;
        self.stats.write().submitted += 1;
        debug!(task_id = %id, "Continuation queued");
        Ok(())
    }
}

impl ContinuationReceiver {
    /// Next queued task; `None` once every queue handle is gone
    pub async fn recv(&mut self) -> Option<ResumeTask> {
        self.receiver.recv().await
    }

    /// Next task if one is ready right now
    pub fn try_recv(&mut self) -> Option<ResumeTask> {
        self.receiver.try_recv().ok()
    }
}

/// Drains a receiver, running each task as a fresh turn
pub struct ContinuationWorker {
    receiver: ContinuationReceiver,
    processor: Arc<dyn TurnProcessor>,
    senders: Arc<dyn TurnSenderFactory>,
}

impl ContinuationWorker {
    /// Create a worker
    pub fn new(
        receiver: ContinuationReceiver,
        processor: Arc<dyn TurnProcessor>,
        senders: Arc<dyn TurnSenderFactory>,
    ) -> Self {
        Self {
            receiver,
            processor,
            senders,
        }
    }

    /// Run until all queue handles are dropped
    pub async fn run(mut self) {
        while let Some(task) = self.receiver.recv().await {
            dispatch(&*self.processor, &*self.senders, &self.receiver.stats, task).await;
        }
        info!("Continuation worker stopped: queue closed");
    }

    /// Run until the queue closes or `shutdown` is cancelled
    pub async fn run_until_cancelled(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Continuation worker stopped: shutdown requested");
                    return;
                }
                next = self.receiver.recv() => match next {
                    Some(task) => dispatch(&*self.processor, &*self.senders, &self.receiver.stats, task).await,
                    None => {
                        info!("Continuation worker stopped: queue closed");
                        return;
                    }
                },
            }
        }
    }

    /// Process every task that is already queued, then return how many ran
    pub async fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Some(task) = self.receiver.try_recv() {
            dispatch(&*self.processor, &*self.senders, &self.receiver.stats, task).await;
            count += 1;
        }
        count
    }
}

#[instrument(skip_all, fields(task_id = %task.id))]
async fn dispatch(
    processor: &dyn TurnProcessor,
    senders: &dyn TurnSenderFactory,
    stats: &RwLock<QueueStats>,
    task: ResumeTask,
) {
    let sender = senders.sender_for(&task.activity);
    let ctx = TurnContext::new(task.activity, sender).with_redelivery();
    let waited = Utc::now() - task.submitted_at;
    debug!(turn_id = %ctx.turn_id(), waited_ms = waited.num_milliseconds(), "Resuming turn");

    match processor.process_turn(ctx).await {
        Ok(()) => stats.write().processed += 1,
        Err(err) => {
            stats.write().failed += 1;
            error!(error = %err, "Continuation turn failed");
        }
    }
}
