//! Run loop - タスク実行ループ
//!
//! # フロー
//! 1. TaskQueue から 1 件取り出す（shutdown / poll timeout と競合させる）
//! 2. AgentRegistry で agent を解決
//! 3. RetryPolicy に従って execute（最大 max_attempts 回）
//! 4. ResultTable に終端ステータスを書き、task_done
//!
//! タスクは 1 件ずつ順番に処理する。リトライ中は後続のタスクを追い越さない。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{LifecycleState, Orchestrator};
use crate::agents::Agent;
use crate::domain::{Task, TaskId, TaskStatus};
use crate::error::{AgentError, OrchestratorError, Result};

/// Reason recorded for a task whose execution was cut short by dropping
/// the run loop.
pub const CANCELLED_REASON: &str = "run loop cancelled while task was in flight";

impl Orchestrator {
    /// Process tasks until `shutdown()` has been called and the queue is
    /// empty.
    ///
    /// Only one run loop per orchestrator: a second call gets
    /// `AlreadyStarted` (or `ShuttingDown` after a shutdown).
    pub async fn run(&self) -> Result<()> {
        let exit = self.claim_run_loop()?;
        self.drive(exit).await;
        Ok(())
    }

    /// Idle -> Running. The returned guard marks the loop as gone when
    /// dropped, even if the loop body never got polled.
    pub(super) fn claim_run_loop(&self) -> Result<LoopExit> {
        let mut state = self.lifecycle();
        match *state {
            LifecycleState::Idle => *state = LifecycleState::Running,
            LifecycleState::Running | LifecycleState::Draining => {
                return Err(OrchestratorError::AlreadyStarted);
            }
            LifecycleState::Stopped => return Err(OrchestratorError::ShuttingDown),
        }
        Ok(LoopExit {
            lifecycle: Arc::clone(&self.lifecycle),
            loop_exited: self.loop_exited.clone(),
            clean: false,
        })
    }

    pub(super) async fn drive(&self, mut exit: LoopExit) {
        info!(queued = self.queue.len(), "run loop started");

        loop {
            if self.shutdown.is_cancelled() && self.queue.is_empty() {
                break;
            }

            // dequeue は cancel-safe なので shutdown / timeout と select してよい
            let next = tokio::select! {
                biased;
                task = self.queue.dequeue() => Some(task),
                _ = self.shutdown.cancelled() => self.queue.try_dequeue(),
                _ = tokio::time::sleep(self.config.poll_interval) => None,
            };

            let Some(task) = next else {
                continue;
            };

            let span = info_span!("task", task_id = %task.id(), agent_type = %task.agent_type());
            self.process(task).instrument(span).await;
        }

        exit.clean = true;
    }

    async fn process(&self, task: Task) {
        let in_flight = InFlight {
            orchestrator: self,
            task_id: task.id(),
            settled: false,
        };
        debug!("executing task");

        let status = match self.registry.resolve(task.agent_type().as_str()) {
            Some(agent) => self.execute_with_retry(agent.as_ref(), &task).await,
            None => {
                let err = OrchestratorError::UnknownAgent(task.agent_type().clone());
                warn!(error = %err, "cannot dispatch task");
                TaskStatus::failed(err.to_string())
            }
        };

        match &status {
            TaskStatus::Completed => info!("task completed"),
            TaskStatus::Failed { reason } => error!(reason = %reason, "task failed"),
            TaskStatus::Pending => {}
        }
        in_flight.settle(status);
    }

    /// Execute with the configured retry policy.
    ///
    /// The payload is handed over unchanged on every attempt. Stops early on
    /// success or on a permanent error.
    async fn execute_with_retry(&self, agent: &dyn Agent, task: &Task) -> TaskStatus {
        let policy = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.results().record_attempt(task.id(), self.clock.now());

            let result = AssertUnwindSafe(agent.execute(task.payload()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(AgentError::transient(format!(
                        "agent panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });

            let err = match result {
                Ok(()) => {
                    if attempt > 1 {
                        info!(attempt, "succeeded after retry");
                    }
                    return TaskStatus::Completed;
                }
                Err(err) => err,
            };

            if err.is_permanent() || !policy.allows_another(attempt) {
                warn!(attempt, error = %err, permanent = err.is_permanent(), "giving up");
                return TaskStatus::failed(err.to_string());
            }

            let delay = policy.next_delay(attempt);
            warn!(
                attempt,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "attempt failed; retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// A dequeued task that still owes a terminal status and a `task_done`.
///
/// If the run loop future is dropped mid-execution, `Drop` settles the
/// task as failed so the queue accounting stays balanced.
struct InFlight<'a> {
    orchestrator: &'a Orchestrator,
    task_id: TaskId,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, status: TaskStatus) {
        self.record(status);
        self.settled = true;
    }

    fn record(&self, status: TaskStatus) {
        let now = self.orchestrator.clock.now();
        if !self.orchestrator.results().finish(self.task_id, status, now) {
            warn!(task_id = %self.task_id, "terminal status already recorded");
        }
        if let Err(err) = self.orchestrator.queue.task_done() {
            error!(task_id = %self.task_id, error = %err, "queue accounting failed");
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(task_id = %self.task_id, "task dropped while in flight");
            self.record(TaskStatus::failed(CANCELLED_REASON));
        }
    }
}

/// Marks the lifecycle `Stopped` however the run loop ends.
pub(super) struct LoopExit {
    lifecycle: Arc<Mutex<LifecycleState>>,
    loop_exited: CancellationToken,
    clean: bool,
}

impl Drop for LoopExit {
    fn drop(&mut self) {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = LifecycleState::Stopped;
        if self.clean {
            info!("run loop stopped");
        } else {
            warn!("run loop cancelled before shutdown completed");
        }
        self.loop_exited.cancel();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
