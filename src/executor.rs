//! DAG Executor (C7): runs a plan in dependency order with bounded
//! parallelism, sync-to-async bridging, failure cascade, and a run-wide
//! timeout.
//!
//! Semantically grounded on `original_source/libs/waivern-orchestration/
//! src/waivern_orchestration/executor.py`'s `DAGExecutor`. The ready-set
//! draining loop, the BFS cascade-skip, and the "build an error Message, log,
//! never re-raise" per-artifact algorithm all follow that file. The
//! concurrency primitives (`tokio::sync::Semaphore`,
//! `tokio::task::spawn_blocking`, `tokio::time::timeout` +
//! `tokio_util::sync::CancellationToken`) stand in for `asyncio.Semaphore` /
//! `loop.run_in_executor` / `asyncio.timeout`'s cooperative cancellation.

use crate::component::ComponentRegistry;
use crate::message::{origin_from_artifact_id, ExecutionContext, ExecutionStatus, Message};
use crate::planner::ExecutionPlan;
use crate::runbook::ArtifactKind;
use crate::service::ServiceContainer;
use crate::store::ArtifactStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

pub type ArtifactStoreHandle = Arc<dyn ArtifactStore>;

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: String,
    pub start_timestamp: DateTime<Utc>,
    pub artifacts: HashMap<String, Message>,
    pub skipped: HashSet<String>,
    pub total_duration_seconds: f64,
    /// Insertion order matching completion order; useful only for debugging
    /// (§4.3 "Ordering guarantees": not a semantic guarantee consumers may
    /// rely on).
    pub completion_order: Vec<String>,
}

struct RunState {
    store: ArtifactStoreHandle,
    registry: Arc<ComponentRegistry>,
    semaphore: Arc<Semaphore>,
    /// artifact -> its direct dependents, copied once from the plan's DAG so
    /// the cascade walk doesn't need to thread the whole plan through every
    /// spawned task.
    dag_dependents: HashMap<String, Vec<String>>,
    results: Mutex<HashMap<String, Message>>,
    skipped: Mutex<HashSet<String>>,
    completion_order: Mutex<Vec<String>>,
    /// Cancelled once the run-wide timeout fires, so in-flight artifact
    /// tasks still holding a semaphore permit stop short of doing work
    /// whose result would only be discarded (§4.3 "Run-wide timeout").
    cancellation: CancellationToken,
}

pub struct DagExecutor {
    registry: Arc<ComponentRegistry>,
    container: Arc<ServiceContainer>,
}

impl DagExecutor {
    pub fn new(registry: Arc<ComponentRegistry>, container: Arc<ServiceContainer>) -> Self {
        Self { registry, container }
    }

    pub async fn execute(&self, plan: &ExecutionPlan) -> crate::error::Result<ExecutionResult> {
        let run_id = Uuid::new_v4().to_string();
        let start_timestamp = Utc::now();
        let start = Instant::now();

        let store = self
            .container
            .get_service::<ArtifactStoreHandle>()?
            .as_ref()
            .clone();

        let dag_dependents = plan
            .runbook
            .artifacts
            .keys()
            .map(|id| (id.clone(), plan.dag.dependents(id).to_vec()))
            .collect();

        let state = Arc::new(RunState {
            store,
            registry: Arc::clone(&self.registry),
            semaphore: Arc::new(Semaphore::new(plan.runbook.config.max_concurrency)),
            dag_dependents,
            results: Mutex::new(HashMap::new()),
            skipped: Mutex::new(HashSet::new()),
            completion_order: Mutex::new(Vec::new()),
            cancellation: CancellationToken::new(),
        });

        let timeout = Duration::from_secs(plan.runbook.config.timeout_seconds);
        let run_future = run_dag(Arc::clone(&state), plan, run_id.clone());

        if tokio::time::timeout(timeout, run_future).await.is_err() {
            // Run-wide deadline. Signal every task still holding a permit to
            // stop rather than finish work no one will see, then move every
            // artifact neither completed nor already skipped to skipped.
            // Not an error (§4.3 "Run-wide timeout"): observable only
            // through `skipped`.
            state.cancellation.cancel();
            let results = state.results.lock();
            let mut skipped = state.skipped.lock();
            for artifact_id in plan.runbook.artifacts.keys() {
                if !results.contains_key(artifact_id) && !skipped.contains(artifact_id) {
                    skipped.insert(artifact_id.clone());
                }
            }
        }

        Ok(ExecutionResult {
            run_id,
            start_timestamp,
            artifacts: state.results.lock().clone(),
            skipped: state.skipped.lock().clone(),
            total_duration_seconds: start.elapsed().as_secs_f64(),
            completion_order: state.completion_order.lock().clone(),
        })
    }
}

async fn run_dag(state: Arc<RunState>, plan: &ExecutionPlan, run_id: String) {
    for batch in plan.dag.execution_order() {
        let mut to_run = Vec::new();
        for artifact_id in batch {
            if state.skipped.lock().contains(artifact_id) {
                // Already cascade-skipped by an earlier batch's failure;
                // drain it from the iterator without producing anything.
                continue;
            }
            to_run.push(artifact_id.clone());
        }

        let tasks = to_run.into_iter().map(|artifact_id| {
            let state = Arc::clone(&state);
            let plan_artifacts = plan.runbook.artifacts.clone();
            let artifact_schemas = plan.artifact_schemas.clone();
            let reversed_aliases = plan.reversed_aliases.clone();
            let run_id = run_id.clone();
            tokio::spawn(async move {
                produce_artifact(
                    state,
                    run_id,
                    artifact_id,
                    plan_artifacts,
                    artifact_schemas,
                    reversed_aliases,
                )
                .await
            })
        });

        futures::future::join_all(tasks).await;
    }
}

async fn produce_artifact(
    state: Arc<RunState>,
    run_id: String,
    artifact_id: String,
    artifacts: HashMap<String, crate::runbook::ArtifactDefinition>,
    artifact_schemas: HashMap<String, crate::planner::ArtifactSchemas>,
    reversed_aliases: HashMap<String, String>,
) {
    let start = Instant::now();
    let origin = origin_from_artifact_id(&artifact_id);
    let alias = reversed_aliases.get(&artifact_id).cloned();

    let def = artifacts.get(&artifact_id).expect("artifact in plan");
    let schemas = artifact_schemas
        .get(&artifact_id)
        .expect("schema resolved at plan time");

    if state.cancellation.is_cancelled() {
        return;
    }

    let permit = state
        .semaphore
        .clone()
        .acquire_owned()
        .await
        .expect("semaphore not closed during a run");

    let work = async {
        match &def.kind {
            ArtifactKind::Leaf { source } => {
                extract_leaf(Arc::clone(&state), source.clone(), schemas.output_schema.clone())
                    .await
            }
            ArtifactKind::Derived { inputs, process } => {
                produce_derived(
                    Arc::clone(&state),
                    &run_id,
                    inputs,
                    process.clone(),
                    schemas.output_schema.clone(),
                )
                .await
            }
        }
    };

    let outcome = tokio::select! {
        biased;
        _ = state.cancellation.cancelled() => {
            drop(permit);
            return;
        }
        outcome = work => outcome,
    };

    drop(permit);
    let duration_seconds = start.elapsed().as_secs_f64();

    let message = match outcome {
        Ok(message) => {
            let annotated = message.with_execution(ExecutionContext {
                status: ExecutionStatus::Success,
                duration_seconds,
                origin,
                alias,
                error: None,
            });
            if let Err(e) = state.store.save(&run_id, &artifact_id, annotated.clone()) {
                warn!(artifact = %artifact_id, error = %e, "failed to persist produced artifact");
            }
            annotated
        }
        Err(e) => {
            if def.optional {
                warn!(artifact = %artifact_id, error = %e, "optional artifact failed");
            } else {
                debug!(artifact = %artifact_id, error = %e, "artifact failed");
            }
            Message::error(
                artifact_id.clone(),
                schemas.output_schema.clone(),
                origin,
                alias,
                duration_seconds,
                e.to_string(),
            )
        }
    };

    let is_error = message.is_error();

    {
        let mut results = state.results.lock();
        results.insert(artifact_id.clone(), message);
    }
    state.completion_order.lock().push(artifact_id.clone());

    if is_error {
        cascade_skip(&state, &artifact_id);
    }
}

/// Iterative BFS over the reverse graph (§4.3 "Failure cascade"): an
/// explicit stack rather than recursion, to handle deep dependency chains.
fn cascade_skip(state: &Arc<RunState>, failed_artifact: &str) {
    let mut queue: Vec<String> = state
        .dag_dependents
        .get(failed_artifact)
        .cloned()
        .unwrap_or_default();

    let mut skipped = state.skipped.lock();
    while let Some(dependent) = queue.pop() {
        if skipped.insert(dependent.clone()) {
            if let Some(next) = state.dag_dependents.get(&dependent) {
                queue.extend(next.iter().cloned());
            }
        }
    }
}

async fn extract_leaf(
    state: Arc<RunState>,
    source: crate::runbook::ComponentSpec,
    output_schema: crate::message::Schema,
) -> crate::error::Result<Message> {
    let factory = state.registry.connector_factory(&source.component_type)?;
    let connector = factory.create(&source.properties)?;
    tokio::task::spawn_blocking(move || connector.extract(&output_schema))
        .await
        .map_err(|e| crate::error::PipelineError::Other(anyhow::anyhow!(e)))?
}

async fn produce_derived(
    state: Arc<RunState>,
    run_id: &str,
    inputs: &[String],
    process: Option<crate::runbook::ComponentSpec>,
    output_schema: crate::message::Schema,
) -> crate::error::Result<Message> {
    let mut input_messages = Vec::with_capacity(inputs.len());
    for input_id in inputs {
        input_messages.push(state.store.get(run_id, input_id)?);
    }

    match process {
        None => {
            // Passthrough: a single input is forwarded verbatim; more than
            // one is reserved for a fan-in merge policy the source never
            // pins down (§9 Open Questions) and is treated as a hard error.
            if input_messages.len() == 1 {
                Ok(input_messages.into_iter().next().unwrap())
            } else {
                Err(crate::error::PipelineError::Other(anyhow::anyhow!(
                    "fan-in passthrough merge is not implemented"
                )))
            }
        }
        Some(process) => {
            let factory = state.registry.processor_factory(&process.component_type)?;
            let processor = factory.create(&process.properties)?;
            tokio::task::spawn_blocking(move || processor.process(&input_messages, &output_schema))
                .await
                .map_err(|e| crate::error::PipelineError::Other(anyhow::anyhow!(e)))?
        }
    }
}
