//! Periodic sync trigger with explicit start/stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::engine::{SyncEngine, SyncResult};
use super::store::LocalStore;
use crate::remote::RemoteStore;

enum SchedulerCommand {
    Trigger(oneshot::Sender<SyncResult>),
    Stop,
}

pub struct SyncScheduler;

impl SyncScheduler {
    /// Spawn a task that syncs `user_id` every `every`, starting one interval
    /// from now. Cycles run one at a time inside the task.
    pub fn start<L, R>(
        engine: Arc<SyncEngine<L, R>>,
        user_id: impl Into<String>,
        every: Duration,
    ) -> SchedulerHandle
    where
        L: LocalStore + 'static,
        R: RemoteStore + 'static,
    {
        let user_id = user_id.into();
        let (commands, mut inbox) = mpsc::channel(8);

        let task = tokio::spawn(async move {
            info!(user_id, interval_secs = every.as_secs(), "Sync scheduler started");
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let result = engine.sync(&user_id).await;
                        if !result.success && !result.skipped {
                            warn!(user_id, errors = ?result.errors, "Scheduled sync failed");
                        }
                    }
                    command = inbox.recv() => match command {
                        Some(SchedulerCommand::Trigger(reply)) => {
                            debug!(user_id, "Manual sync requested");
                            let result = engine.sync(&user_id).await;
                            ticker.reset();
                            let _ = reply.send(result);
                        }
                        Some(SchedulerCommand::Stop) | None => break,
                    },
                }
            }
            info!(user_id, "Sync scheduler stopped");
        });

        SchedulerHandle {
            commands,
            task: Some(task),
        }
    }
}

/// Owns the scheduler task. Dropping the handle aborts the task.
#[derive(Debug)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SchedulerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trigger(_) => f.write_str("Trigger"),
            Self::Stop => f.write_str("Stop"),
        }
    }
}

impl SchedulerHandle {
    /// Run a cycle now and wait for its result. `None` once the scheduler
    /// has stopped.
    pub async fn trigger(&self) -> Option<SyncResult> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SchedulerCommand::Trigger(reply))
            .await
            .ok()?;
        response.await.ok()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the timer and wait for an in-progress cycle to finish.
    pub async fn stop(mut self) {
        let _ = self.commands.send(SchedulerCommand::Stop).await;
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!("Sync scheduler task ended abnormally: {error}");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
