//! Orchestrator - public contract used by the transport layer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BuildError, LifecycleState, OrchestratorBuilder};
use crate::agents::AgentRegistry;
use crate::config::{AgentValidation, OrchestratorConfig};
use crate::domain::{AgentType, Task, TaskId, TaskStatus};
use crate::error::{OrchestratorError, QueueError, Result};
use crate::observability::StatusCounts;
use crate::ports::Clock;
use crate::queue::{ResultEntry, ResultTable, TaskQueue};

/// Owns the queue, the agent registry and the result table.
///
/// Construct it once at startup (see `OrchestratorBuilder`), wrap it in an
/// `Arc` and hand clones to whatever submits tasks and polls status.
pub struct Orchestrator {
    pub(super) config: OrchestratorConfig,
    pub(super) registry: AgentRegistry,
    pub(super) queue: TaskQueue,
    pub(super) results: Mutex<ResultTable>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) lifecycle: Arc<Mutex<LifecycleState>>,
    /// Cancelled by `shutdown()`.
    pub(super) shutdown: CancellationToken,
    /// Cancelled when the run loop is gone (or will never run).
    pub(super) loop_exited: CancellationToken,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Orchestrator with the built-in agents and the given config.
    pub fn new(config: OrchestratorConfig) -> std::result::Result<Self, BuildError> {
        OrchestratorBuilder::new()
            .config(config)
            .with_builtin_agents()?
            .expect_agents(&["data", "proposal"])
            .build()
    }

    pub(super) fn from_parts(
        config: OrchestratorConfig,
        registry: AgentRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queue = match config.queue_capacity {
            Some(capacity) => TaskQueue::bounded(capacity),
            None => TaskQueue::unbounded(),
        };
        Self {
            config,
            registry,
            queue,
            results: Mutex::new(ResultTable::new()),
            clock,
            lifecycle: Arc::new(Mutex::new(LifecycleState::Idle)),
            shutdown: CancellationToken::new(),
            loop_exited: CancellationToken::new(),
        }
    }

    pub(super) fn results(&self) -> MutexGuard<'_, ResultTable> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn lifecycle(&self) -> MutexGuard<'_, LifecycleState> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn state(&self) -> LifecycleState {
        *self.lifecycle()
    }

    /// Tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Submit a task.
    ///
    /// - `agent_type` must not be blank and `payload` must be a JSON object,
    ///   otherwise `Validation`.
    /// - Unknown agent types fail here with `UnknownAgent` under
    ///   `AgentValidation::OnSubmit`, or later at dispatch under `OnDispatch`.
    /// - After `shutdown()` the answer is `ShuttingDown`.
    ///
    /// Waits only when the queue is bounded and full. Dropping the future
    /// while it waits leaves nothing behind: the entry is created together
    /// with the push.
    pub async fn add_task(&self, agent_type: &str, payload: Value) -> Result<TaskId> {
        if agent_type.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "agent_type must be a non-empty string".to_string(),
            ));
        }
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                return Err(OrchestratorError::Validation(format!(
                    "payload must be a JSON object, got {}",
                    json_kind(&other)
                )));
            }
        };

        let agent_type = AgentType::new(agent_type);
        if self.config.agent_validation == AgentValidation::OnSubmit
            && !self.registry.contains(agent_type.as_str())
        {
            return Err(OrchestratorError::UnknownAgent(agent_type));
        }

        if !self.state().accepts_tasks() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let slot = self.queue.reserve().await.map_err(rejected)?;

        // id 採番・pending 登録・push を results の同じロックの中で行う。
        // ここから先に await はないので、id 順 = キュー順になる
        let mut results = self.results();
        let task_id = results.insert_pending(self.clock.now());
        if let Err(err) = slot.push(Task::new(task_id, agent_type.clone(), payload)) {
            // the id never reached the caller
            results.discard(task_id);
            debug!(task_id = %task_id, error = %err, "enqueue rejected");
            return Err(rejected(err));
        }
        drop(results);

        info!(task_id = %task_id, agent_type = %agent_type, "task added");
        Ok(task_id)
    }

    pub fn get_status(&self, task_id: TaskId) -> Result<TaskStatus> {
        self.results()
            .get(task_id)
            .map(|entry| entry.status.clone())
            .ok_or(OrchestratorError::NotFound(task_id))
    }

    /// Status plus attempt count and timestamps.
    pub fn get_entry(&self, task_id: TaskId) -> Result<ResultEntry> {
        self.results()
            .get(task_id)
            .cloned()
            .ok_or(OrchestratorError::NotFound(task_id))
    }

    /// Every task submitted so far, ordered by id.
    pub fn snapshot(&self) -> Vec<(TaskId, ResultEntry)> {
        self.results()
            .iter()
            .map(|(id, entry)| (id, entry.clone()))
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        self.results().counts()
    }

    /// Run the loop on the tokio runtime.
    ///
    /// The lifecycle moves to `Running` before this returns, so a
    /// `shutdown()` issued right after still waits for the queue to drain.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let claimed = self.claim_run_loop();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let exit = claimed?;
            this.drive(exit).await;
            Ok(())
        })
    }

    /// Stop intake and wait for the queue to drain.
    ///
    /// In-flight work (retries included) is not interrupted. Tasks that were
    /// already queued are still processed. Safe to call more than once.
    pub async fn shutdown(&self) {
        let previous = {
            let mut state = self.lifecycle();
            let previous = *state;
            *state = previous.on_shutdown();
            previous
        };

        self.queue.close();
        self.shutdown.cancel();

        if previous == LifecycleState::Idle {
            // run() was never called, nobody will drain the queue
            self.loop_exited.cancel();
            let left = self.queue.outstanding();
            if left > 0 {
                warn!(pending = left, "shutdown before run; queued tasks stay pending");
            }
            info!("orchestrator stopped");
            return;
        }

        if previous == LifecycleState::Running {
            info!(
                outstanding = self.queue.outstanding(),
                "shutdown requested; draining queue"
            );
        }

        tokio::select! {
            _ = self.queue.join() => {}
            _ = self.loop_exited.cancelled() => {}
        }
        self.loop_exited.cancelled().await;

        let left = self.queue.outstanding();
        if left > 0 {
            warn!(pending = left, "run loop exited before the queue drained");
        }
    }
}

fn rejected(err: QueueError) -> OrchestratorError {
    match err {
        QueueError::Closed => OrchestratorError::ShuttingDown,
        other => OrchestratorError::Queue(other),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::agents::Agent;
    use crate::agents::testing::{RecordingAgent, ScriptedAgent};
    use crate::ports::FixedClock;
    use crate::queue::RetryPolicy;

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            retry: RetryPolicy::immediate(3),
            poll_interval: Duration::from_millis(10),
            ..OrchestratorConfig::default()
        }
    }

    fn orchestrator_with(agents: Vec<Arc<dyn Agent>>, config: OrchestratorConfig) -> Arc<Orchestrator> {
        let mut builder = Orchestrator::builder().config(config);
        for agent in agents {
            builder = builder.register(agent).unwrap();
        }
        Arc::new(builder.build().unwrap())
    }

    #[tokio::test]
    async fn add_task_returns_increasing_ids_and_pending() {
        let orchestrator = Orchestrator::new(test_config()).unwrap();

        let mut last = None;
        for _ in 0..5 {
            let id = orchestrator
                .add_task("data", json!({ "symbol": "BTC" }))
                .await
                .unwrap();
            if let Some(prev) = last {
                assert!(id > prev);
            }
            assert_eq!(orchestrator.get_status(id).unwrap(), TaskStatus::Pending);
            last = Some(id);
        }
        assert_eq!(orchestrator.queued(), 5);
    }

    #[tokio::test]
    async fn first_task_gets_id_one() {
        let orchestrator = Orchestrator::new(test_config()).unwrap();
        let id = orchestrator
            .add_task("data", json!({ "symbol": "BTC" }))
            .await
            .unwrap();
        assert_eq!(id, TaskId::new(1));
        assert_eq!(
            serde_json::to_value(orchestrator.get_status(id).unwrap()).unwrap(),
            json!({ "status": "pending" })
        );
    }

    #[rstest]
    #[case::empty_agent("", json!({}))]
    #[case::blank_agent("   ", json!({}))]
    #[case::null_payload("data", json!(null))]
    #[case::string_payload("data", json!("BTC"))]
    #[case::array_payload("data", json!([1, 2]))]
    #[case::number_payload("data", json!(3))]
    #[tokio::test]
    async fn invalid_submissions_are_rejected(#[case] agent_type: &str, #[case] payload: Value) {
        let orchestrator = Orchestrator::new(test_config()).unwrap();
        let result = orchestrator.add_task(agent_type, payload).await;
        assert!(matches!(result, Err(OrchestratorError::Validation(_))));
        assert!(orchestrator.snapshot().is_empty());
        assert_eq!(orchestrator.queued(), 0);
    }

    #[tokio::test]
    async fn unknown_agent_fails_at_submission_by_default() {
        let orchestrator = Orchestrator::new(test_config()).unwrap();
        let err = orchestrator
            .add_task("bogus", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown agent type: bogus");
        assert_eq!(orchestrator.queued(), 0);
        assert!(orchestrator.snapshot().is_empty());
    }

    #[tokio::test]
    async fn unknown_agent_is_queued_under_on_dispatch() {
        let config = OrchestratorConfig {
            agent_validation: AgentValidation::OnDispatch,
            ..test_config()
        };
        let orchestrator = Orchestrator::new(config).unwrap();
        let id = orchestrator.add_task("bogus", json!({})).await.unwrap();
        assert_eq!(orchestrator.get_status(id).unwrap(), TaskStatus::Pending);
        assert_eq!(orchestrator.queued(), 1);
    }

    #[tokio::test]
    async fn get_status_unknown_id_is_not_found() {
        let orchestrator = Orchestrator::new(test_config()).unwrap();
        let result = orchestrator.get_status(TaskId::new(99));
        assert!(matches!(result, Err(OrchestratorError::NotFound(id)) if id == TaskId::new(99)));
    }

    #[tokio::test]
    async fn entries_carry_clock_timestamps() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(t0));
        let orchestrator = Orchestrator::builder()
            .config(test_config())
            .clock(clock.clone())
            .with_builtin_agents()
            .unwrap()
            .build()
            .unwrap();

        let id = orchestrator.add_task("proposal", json!({})).await.unwrap();
        let entry = orchestrator.get_entry(id).unwrap();
        assert_eq!(entry.created_at, t0);
        assert_eq!(entry.updated_at, t0);
        assert_eq!(entry.attempts, 0);
    }

    #[tokio::test]
    async fn shutdown_before_run_stops_and_rejects_new_tasks() {
        let orchestrator = Orchestrator::new(test_config()).unwrap();
        let id = orchestrator
            .add_task("data", json!({ "symbol": "BTC" }))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), orchestrator.shutdown())
            .await
            .unwrap();
        assert_eq!(orchestrator.state(), LifecycleState::Stopped);
        assert_eq!(orchestrator.get_status(id).unwrap(), TaskStatus::Pending);

        let err = orchestrator
            .add_task("data", json!({ "symbol": "ETH" }))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ShuttingDown));

        // second call is a no-op
        tokio::time::timeout(Duration::from_secs(1), orchestrator.shutdown())
            .await
            .unwrap();

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ShuttingDown));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submitters_get_unique_ids() {
        let recorder = Arc::new(RecordingAgent::new("data"));
        let orchestrator = orchestrator_with(vec![recorder as Arc<dyn Agent>], test_config());

        let mut joins = Vec::new();
        for n in 0..8 {
            let orchestrator = Arc::clone(&orchestrator);
            joins.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for i in 0..10 {
                    let id = orchestrator
                        .add_task("data", json!({ "n": n, "i": i }))
                        .await
                        .unwrap();
                    ids.push(id);
                }
                ids
            }));
        }

        let mut all = Vec::new();
        for join in joins {
            let ids = join.await.unwrap();
            // each submitter sees its own ids strictly increasing
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            all.extend(ids);
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 80);
        assert_eq!(orchestrator.counts().pending, 80);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_are_queued_in_id_order() {
        for _ in 0..50 {
            let orchestrator = Arc::new(Orchestrator::new(test_config()).unwrap());

            let mut joins = Vec::new();
            for _ in 0..8 {
                let orchestrator = Arc::clone(&orchestrator);
                joins.push(tokio::spawn(async move {
                    for _ in 0..20 {
                        orchestrator
                            .add_task("data", json!({ "symbol": "BTC" }))
                            .await
                            .unwrap();
                    }
                }));
            }
            for join in joins {
                join.await.unwrap();
            }

            let mut order = Vec::new();
            while let Some(task) = orchestrator.queue.try_dequeue() {
                order.push(task.id());
            }
            assert_eq!(order.len(), 160);
            assert!(order.windows(2).all(|w| w[0] < w[1]), "out of order: {order:?}");
        }
    }

    #[tokio::test]
    async fn cancelled_submission_on_full_queue_leaves_no_entry() {
        let config = OrchestratorConfig {
            queue_capacity: Some(1),
            ..test_config()
        };
        let orchestrator = Arc::new(Orchestrator::new(config).unwrap());
        let first = orchestrator
            .add_task("data", json!({ "symbol": "BTC" }))
            .await
            .unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(30),
            orchestrator.add_task("data", json!({ "symbol": "ETH" })),
        )
        .await;
        assert!(blocked.is_err());
        assert_eq!(orchestrator.snapshot().len(), 1);
        assert_eq!(orchestrator.counts().pending, 1);

        // the run loop frees the slot; the next id follows the first one
        let handle = orchestrator.spawn();
        let second = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.add_task("data", json!({ "symbol": "ETH" })),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(second, TaskId::new(2));

        tokio::time::timeout(Duration::from_secs(5), orchestrator.shutdown())
            .await
            .unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(orchestrator.get_status(first).unwrap(), TaskStatus::Completed);
        assert_eq!(orchestrator.get_status(second).unwrap(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn shutdown_wakes_submitter_blocked_on_full_queue() {
        let config = OrchestratorConfig {
            queue_capacity: Some(1),
            ..test_config()
        };
        let orchestrator = Arc::new(Orchestrator::new(config).unwrap());
        orchestrator
            .add_task("data", json!({ "symbol": "BTC" }))
            .await
            .unwrap();

        let submitter = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.add_task("data", json!({ "symbol": "ETH" })).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!submitter.is_finished());

        tokio::time::timeout(Duration::from_secs(1), orchestrator.shutdown())
            .await
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), submitter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(OrchestratorError::ShuttingDown)));
        assert_eq!(orchestrator.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn custom_registry_has_only_registered_agents() {
        let agent: Arc<dyn Agent> = Arc::new(ScriptedAgent::succeeding("data"));
        let orchestrator = orchestrator_with(vec![agent], test_config());
        assert!(orchestrator.registry().contains("data"));
        assert!(!orchestrator.registry().contains("proposal"));
    }
}
