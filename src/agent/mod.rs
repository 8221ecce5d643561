//! Main orchestrator - owns one simulation run from request to report
//!
//! VALIDATE → CONTEXT → EXECUTE (DAG) → POLICY → AGGREGATE → AUDIT

use crate::aggregation::Aggregator;
use crate::audit::{fingerprint, AuditLog, RunRecord, RunStatus, RunTrace, StageEvent};
use crate::config::SimulationConfig;
use crate::error::OrchestrationError;
use crate::execution::ExecutionEngine;
use crate::models::{FinalReport, RelocationRequest, StageId};
use crate::policy;
use crate::providers::create_default_providers;
use crate::registry::{create_default_registry, FailurePolicy, StageRegistry};
use crate::state::SharedContext;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything a caller can observe about one run
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub result: Result<FinalReport>,
    /// Stage timeline in the order it was recorded
    pub events: Vec<StageEvent>,
}

/// Coordinates validation, stage execution, the failure policy and aggregation
pub struct Orchestrator {
    config: SimulationConfig,
    registry: StageRegistry,
    execution_engine: ExecutionEngine,
    aggregator: Aggregator,
    audit_log: AuditLog,
}

impl Orchestrator {
    pub fn new(config: SimulationConfig, registry: StageRegistry) -> Result<Self> {
        config.validate()?;
        check_registry(&registry)?;

        Ok(Self {
            execution_engine: ExecutionEngine::from_config(&config),
            aggregator: Aggregator::from_config(&config),
            audit_log: AuditLog::with_capacity(config.max_audit_records),
            registry,
            config,
        })
    }

    /// Default stages over the providers the config selects
    pub fn from_config(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let providers = create_default_providers(&config.providers)?;
        let registry = create_default_registry(&providers, &config)?;

        info!(
            providers = ?providers.names(),
            stages = ?registry.order(),
            "Orchestrator: configured"
        );

        Self::new(config, registry)
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    pub async fn run(&self, request: &RelocationRequest) -> Result<FinalReport> {
        self.run_with_cancellation(request, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancellation(
        &self,
        request: &RelocationRequest,
        cancel: CancellationToken,
    ) -> Result<FinalReport> {
        self.execute(request, cancel).await.result
    }

    /// Run once and keep the stage timeline alongside the result
    pub async fn execute(&self, request: &RelocationRequest, cancel: CancellationToken) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let start_time = Instant::now();
        let trace = RunTrace::new();

        info!(
            run_id = %run_id,
            origin = %request.origin,
            targets = ?request.targets,
            "Orchestrator: starting run"
        );

        let result = self.drive(run_id, request, &cancel, &trace).await;
        let events = trace.snapshot().await;
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        match &result {
            Ok(report) => info!(
                run_id = %run_id,
                primary_target = %report.primary_target,
                net_annual_savings = report.net_annual_savings,
                execution_time_ms,
                "Orchestrator: run complete"
            ),
            Err(e) => warn!(
                run_id = %run_id,
                kind = e.kind(),
                error = %e,
                execution_time_ms,
                "Orchestrator: run did not produce a report"
            ),
        }

        let record = RunRecord {
            run_id,
            request_hash: fingerprint(request),
            status: run_status(&result),
            error: result.as_ref().err().map(|e| e.to_string()),
            failed_stages: match &result {
                Err(OrchestrationError::RunFailed(err)) => {
                    err.failed_stages.iter().map(|f| f.stage).collect()
                }
                _ => Vec::new(),
            },
            report_hash: result.as_ref().ok().map(fingerprint),
            events: events.clone(),
            created_at: Utc::now(),
            execution_time_ms,
        };

        if let Err(e) = self.audit_log.record(record).await {
            warn!(run_id = %run_id, error = %e, "Orchestrator: failed to write audit record");
        }

        RunOutcome {
            run_id,
            result,
            events,
        }
    }

    async fn drive(
        &self,
        run_id: Uuid,
        request: &RelocationRequest,
        cancel: &CancellationToken,
        trace: &RunTrace,
    ) -> Result<FinalReport> {
        let ctx = Arc::new(SharedContext::from_request(request)?);

        if cancel.is_cancelled() {
            return Err(OrchestrationError::Cancelled(
                "cancelled before any stage ran".to_string(),
            ));
        }

        let deadline = self
            .config
            .run_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);

        debug!(
            run_id = %run_id,
            targets = ctx.targets.len(),
            currency = %ctx.currency,
            "Context built; executing stages"
        );

        let mut accumulator = self
            .execution_engine
            .execute(&self.registry, ctx.clone(), cancel, deadline, trace)
            .await?;

        policy::evaluate(&self.registry, &mut accumulator)?;

        for note in accumulator.notes() {
            info!(run_id = %run_id, note = %note, "Orchestrator: non-fatal stage error");
        }

        self.aggregator.aggregate(&accumulator, &ctx)
    }
}

/// The aggregator needs all three stages, and cannot project without
/// expense and compliance payloads.
fn check_registry(registry: &StageRegistry) -> Result<()> {
    for stage in [StageId::RISK, StageId::EXPENSE, StageId::COMPLIANCE] {
        if registry.spec(stage).is_none() {
            return Err(OrchestrationError::Configuration(format!(
                "registry is missing the {} stage",
                stage
            )));
        }
    }

    for stage in [StageId::EXPENSE, StageId::COMPLIANCE] {
        if registry
            .spec(stage)
            .is_some_and(|spec| spec.policy == FailurePolicy::BestEffort)
        {
            return Err(OrchestrationError::Configuration(format!(
                "the {} stage feeds the projection and must be required",
                stage
            )));
        }
    }

    Ok(())
}

fn run_status(result: &Result<FinalReport>) -> RunStatus {
    match result {
        Ok(_) => RunStatus::Completed,
        Err(OrchestrationError::Validation(_)) => RunStatus::Rejected,
        Err(OrchestrationError::Cancelled(_)) => RunStatus::Cancelled,
        Err(_) => RunStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::StageEventKind;
    use crate::models::{RiskRating, UserProfile};
    use crate::providers::{LifeQualityData, ProviderSet, StaticProvider};
    use crate::registry::StageSpec;
    use crate::stages::{ComplianceStage, ExpenseStage, RiskStage};
    use std::time::Duration;

    fn request(targets: &[&str]) -> RelocationRequest {
        RelocationRequest {
            origin: "San Francisco".to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            currency: Some("usd".to_string()),
            profile: UserProfile {
                annual_income: Some(120_000.0),
                monthly_expenses: Some(4_000.0),
                current_net_worth: Some(50_000.0),
                ..Default::default()
            },
        }
    }

    fn low_risk_providers() -> ProviderSet {
        ProviderSet {
            life_quality: Arc::new(StaticProvider::new(
                "calm",
                LifeQualityData {
                    air_quality_index: 45.0,
                    safety_score: 0.85,
                    healthcare_wait_time_hours: 2.0,
                },
            )),
            ..ProviderSet::mock(Duration::ZERO)
        }
    }

    fn orchestrator(config: SimulationConfig, providers: &ProviderSet) -> Orchestrator {
        let registry = create_default_registry(providers, &config).unwrap();
        Orchestrator::new(config, registry).unwrap()
    }

    #[tokio::test]
    async fn test_orchestrator_run() {
        let orchestrator = orchestrator(SimulationConfig::default(), &low_risk_providers());

        let report = orchestrator.run(&request(&["Lisbon"])).await.unwrap();

        assert_eq!(report.currency, "USD");
        assert_eq!(report.quality_of_life_score, RiskRating::Low);
        assert!((report.net_annual_savings - 62_400.0).abs() < 1e-6);
        assert!((report.wealth_projection[0].wealth - 115_520.0).abs() < 1e-6);
        assert_eq!(orchestrator.audit_log().len().await, 1);
    }

    #[tokio::test]
    async fn test_validation_error_runs_no_stage() {
        let orchestrator = orchestrator(SimulationConfig::default(), &low_risk_providers());
        let mut bad = request(&["Lisbon"]);
        bad.profile.annual_income = None;

        let outcome = orchestrator.execute(&bad, CancellationToken::new()).await;

        assert!(matches!(outcome.result, Err(OrchestrationError::Validation(_))));
        assert!(outcome.events.is_empty());

        let record = orchestrator.audit_log().get(outcome.run_id).await.unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Rejected);
        assert!(record.report_hash.is_none());
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_starts_nothing() {
        let orchestrator = orchestrator(SimulationConfig::default(), &low_risk_providers());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = orchestrator.execute(&request(&["Lisbon"]), cancel).await;

        assert!(matches!(outcome.result, Err(OrchestrationError::Cancelled(_))));
        assert!(outcome.events.is_empty());
    }

    #[tokio::test]
    async fn test_expense_settles_before_compliance_starts() {
        let config = SimulationConfig {
            compliance_uses_expense: true,
            ..SimulationConfig::default()
        };
        let orchestrator = orchestrator(config, &low_risk_providers());

        let outcome = orchestrator
            .execute(&request(&["Lisbon"]), CancellationToken::new())
            .await;
        let report = outcome.result.unwrap();
        assert!((report.net_annual_savings - 62_400.0).abs() < 1e-6);

        let seq = |stage, kind| {
            outcome
                .events
                .iter()
                .find(|e| e.stage == stage && e.kind == kind)
                .map(|e| e.sequence)
                .unwrap()
        };
        assert!(
            seq(StageId::EXPENSE, StageEventKind::Settled)
                < seq(StageId::COMPLIANCE, StageEventKind::Started)
        );
    }

    #[tokio::test]
    async fn test_run_timeout_cancels() {
        let config = SimulationConfig {
            run_timeout: Some(Duration::from_millis(20)),
            ..SimulationConfig::default()
        };
        let orchestrator = orchestrator(config, &ProviderSet::mock(Duration::from_millis(500)));

        let err = orchestrator.run(&request(&["Lisbon"])).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Cancelled(_)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SimulationConfig {
            max_concurrency: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            Orchestrator::from_config(config),
            Err(OrchestrationError::Configuration(_))
        ));
    }

    fn risk(p: &ProviderSet) -> StageSpec {
        StageSpec::new(Arc::new(RiskStage::new(p.life_quality.clone())))
    }

    fn expense(p: &ProviderSet) -> StageSpec {
        StageSpec::new(Arc::new(ExpenseStage::new(p.pricing.clone(), p.exchange.clone())))
    }

    fn compliance(p: &ProviderSet) -> StageSpec {
        StageSpec::new(Arc::new(ComplianceStage::new(p.tax.clone())))
    }

    fn rejects(specs: Vec<StageSpec>) -> bool {
        let registry = StageRegistry::new(specs).unwrap();
        matches!(
            Orchestrator::new(SimulationConfig::default(), registry),
            Err(OrchestrationError::Configuration(_))
        )
    }

    #[test]
    fn test_registry_missing_a_stage_is_rejected() {
        let p = ProviderSet::mock(Duration::ZERO);

        assert!(rejects(vec![expense(&p), compliance(&p)]));
        assert!(rejects(vec![risk(&p), compliance(&p)]));
        assert!(rejects(vec![risk(&p), expense(&p)]));
    }

    #[test]
    fn test_best_effort_projection_stage_is_rejected() {
        let p = ProviderSet::mock(Duration::ZERO);

        assert!(rejects(vec![risk(&p), expense(&p).best_effort(), compliance(&p)]));
        assert!(rejects(vec![risk(&p), expense(&p), compliance(&p).best_effort()]));
        assert!(!rejects(vec![risk(&p).best_effort(), expense(&p), compliance(&p)]));
    }

    #[tokio::test]
    async fn test_audit_log_uses_configured_capacity() {
        let config = SimulationConfig {
            max_audit_records: 2,
            ..SimulationConfig::default()
        };
        let orchestrator = orchestrator(config, &low_risk_providers());

        for _ in 0..3 {
            orchestrator.run(&request(&["Lisbon"])).await.unwrap();
        }

        assert_eq!(orchestrator.audit_log().capacity(), 2);
        assert_eq!(orchestrator.audit_log().len().await, 2);
    }
}
