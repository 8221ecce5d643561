//! Execution engine: runs a stage registry as a DAG
//!
//! Ready stages are spawned onto a per-run `JoinSet`, bounded by a
//! semaphore. The engine is the only writer of the accumulator; a stage
//! is spawned only after every dependency has been written, so its
//! upstream snapshot is complete when it starts.

use crate::audit::{RunTrace, StageEventKind};
use crate::config::SimulationConfig;
use crate::error::OrchestrationError;
use crate::models::{StageErrorKind, StageFailure, StageId, StageResult};
use crate::registry::{ConcurrencyClass, StageRegistry};
use crate::stages::UpstreamResults;
use crate::state::{Accumulator, SharedContext};
use crate::Result;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Executes registered stages concurrently in dependency order
pub struct ExecutionEngine {
    max_concurrency: usize,
    stage_timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(max_concurrency: usize, stage_timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.clamp(1, u32::MAX as usize),
            stage_timeout,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.max_concurrency, config.stage_timeout)
    }

    /// Run every stage to settlement.
    ///
    /// Returns the settled accumulator, or `Cancelled` when the token fires
    /// or the deadline passes first; in-flight stages are aborted and
    /// partial results are dropped.
    pub async fn execute(
        &self,
        registry: &StageRegistry,
        ctx: Arc<SharedContext>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        trace: &RunTrace,
    ) -> Result<Accumulator> {
        let mut accumulator = Accumulator::new();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks: JoinSet<StageResult> = JoinSet::new();

        let mut unmet: BTreeMap<StageId, usize> = registry
            .order()
            .iter()
            .filter_map(|id| registry.spec(*id).map(|s| (*id, s.dependencies.len())))
            .collect();

        for id in registry.order() {
            if unmet.get(id) == Some(&0) {
                self.spawn_stage(&mut tasks, registry, *id, &ctx, &accumulator, &semaphore, trace);
            }
        }

        let deadline_reached = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline_reached);

        while accumulator.settled_count() < registry.len() {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    warn!(settled = accumulator.settled_count(), "Run cancelled; discarding partial results");
                    return Err(OrchestrationError::Cancelled("cancellation requested".to_string()));
                }
                _ = &mut deadline_reached => {
                    tasks.abort_all();
                    warn!(settled = accumulator.settled_count(), "Run deadline exceeded; discarding partial results");
                    return Err(OrchestrationError::Cancelled("run deadline exceeded".to_string()));
                }
                joined = tasks.join_next() => joined,
            };

            let result = match joined {
                Some(Ok(result)) => result,
                Some(Err(e)) => {
                    return Err(OrchestrationError::AggregationInternal(format!(
                        "stage task ended without a result: {}",
                        e
                    )))
                }
                None => {
                    return Err(OrchestrationError::AggregationInternal(format!(
                        "{} stage(s) can never become ready",
                        registry.len() - accumulator.settled_count()
                    )))
                }
            };

            self.settle(
                result,
                registry,
                &ctx,
                &mut accumulator,
                &mut unmet,
                &mut tasks,
                &semaphore,
                trace,
            )
            .await?;
        }

        debug!(settled = accumulator.settled_count(), "All stages settled");
        Ok(accumulator)
    }

    /// Write a result, then release or skip its dependents
    #[allow(clippy::too_many_arguments)]
    async fn settle(
        &self,
        result: StageResult,
        registry: &StageRegistry,
        ctx: &Arc<SharedContext>,
        accumulator: &mut Accumulator,
        unmet: &mut BTreeMap<StageId, usize>,
        tasks: &mut JoinSet<StageResult>,
        semaphore: &Arc<Semaphore>,
        trace: &RunTrace,
    ) -> Result<()> {
        let stage = result.stage;

        match result.failure() {
            None => info!(stage = %stage, duration_ms = result.duration_ms, "Stage settled"),
            Some(failure) => warn!(
                stage = %stage,
                kind = %failure.kind,
                error = %failure.message,
                "Stage failed"
            ),
        }

        trace.record(stage, StageEventKind::Settled).await;
        let succeeded = result.is_success();
        accumulator.record(result)?;

        if succeeded {
            for dependent in registry.dependents(stage) {
                if accumulator.is_settled(*dependent) {
                    continue;
                }
                if let Some(count) = unmet.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        self.spawn_stage(tasks, registry, *dependent, ctx, accumulator, semaphore, trace);
                    }
                }
            }
            return Ok(());
        }

        // Everything downstream of a failure settles without running.
        let mut blocked: VecDeque<(StageId, StageId)> = registry
            .dependents(stage)
            .iter()
            .map(|d| (*d, stage))
            .collect();

        while let Some((dependent, failed_dep)) = blocked.pop_front() {
            if accumulator.is_settled(dependent) {
                continue;
            }

            warn!(stage = %dependent, dependency = %failed_dep, "Skipping stage after dependency failure");

            let settled_at = trace.record(dependent, StageEventKind::Settled).await;
            accumulator.record(StageResult {
                stage: dependent,
                outcome: Err(StageFailure::new(
                    StageErrorKind::DependencyFailed,
                    format!("dependency '{}' failed", failed_dep),
                )),
                started_at: None,
                settled_at,
                duration_ms: 0,
            })?;

            blocked.extend(registry.dependents(dependent).iter().map(|d| (*d, dependent)));
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_stage(
        &self,
        tasks: &mut JoinSet<StageResult>,
        registry: &StageRegistry,
        id: StageId,
        ctx: &Arc<SharedContext>,
        accumulator: &Accumulator,
        semaphore: &Arc<Semaphore>,
        trace: &RunTrace,
    ) {
        let Some(spec) = registry.spec(id) else {
            return;
        };

        let mut upstream = UpstreamResults::new();
        for dep in &spec.dependencies {
            if let Some(Ok(payload)) = accumulator.get(*dep).map(|r| &r.outcome) {
                upstream.insert(*dep, payload.clone());
            }
        }

        let permits = match spec.concurrency {
            ConcurrencyClass::Parallel => 1,
            ConcurrencyClass::Exclusive => self.max_concurrency as u32,
        };

        debug!(stage = %id, permits, upstream = upstream.stages().count(), "Spawning stage");

        let stage = spec.stage.clone();
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        let trace = trace.clone();
        let stage_timeout = self.stage_timeout;

        tasks.spawn(async move {
            let _permit = match semaphore.acquire_many_owned(permits).await {
                Ok(permit) => permit,
                Err(_) => {
                    return StageResult {
                        stage: id,
                        outcome: Err(StageFailure::stage("stage pool closed")),
                        started_at: None,
                        settled_at: Utc::now(),
                        duration_ms: 0,
                    }
                }
            };

            let started_at = trace.record(id, StageEventKind::Started).await;
            let start = Instant::now();

            let analysis = AssertUnwindSafe(stage.analyze(ctx.as_ref(), &upstream)).catch_unwind();
            let outcome = match tokio::time::timeout(stage_timeout, analysis).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(panic)) => Err(StageFailure::new(
                    StageErrorKind::Panicked,
                    panic_message(panic.as_ref()),
                )),
                Err(_) => Err(StageFailure::new(
                    StageErrorKind::Timeout,
                    format!("stage exceeded {} ms", stage_timeout.as_millis()),
                )),
            };

            StageResult {
                stage: id,
                outcome: outcome.map(Arc::new),
                started_at: Some(started_at),
                settled_at: Utc::now(),
                duration_ms: start.elapsed().as_millis() as u64,
            }
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("stage panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("stage panicked: {}", s)
    } else {
        "stage panicked".to_string()
    }
}
