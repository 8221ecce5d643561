use relocation_agent_orchestrator::audit::{fingerprint, RunStatus, StageEventKind};
use relocation_agent_orchestrator::config::SimulationConfig;
use relocation_agent_orchestrator::error::ProviderError;
use relocation_agent_orchestrator::models::{
    RelocationRequest, RiskRating, StageErrorKind, StageId, UserProfile,
};
use relocation_agent_orchestrator::providers::{
    FailingProvider, LifeQualityData, PricingData, ProviderSet, StaticProvider, TaxRegimeData,
};
use relocation_agent_orchestrator::registry::{create_default_registry, StageRegistry, StageSpec};
use relocation_agent_orchestrator::stages::{ComplianceStage, ExpenseStage, RiskStage};
use relocation_agent_orchestrator::{OrchestrationError, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn lisbon_request() -> RelocationRequest {
    RelocationRequest {
        origin: "San Francisco".to_string(),
        targets: vec!["Lisbon".to_string()],
        currency: Some("USD".to_string()),
        profile: UserProfile {
            annual_income: Some(120_000.0),
            monthly_expenses: Some(4_000.0),
            current_net_worth: Some(50_000.0),
            ..Default::default()
        },
    }
}

/// Mock providers with fixed, low-risk life-quality data
fn fixed_providers(latency: Duration) -> ProviderSet {
    ProviderSet {
        life_quality: Arc::new(
            StaticProvider::new(
                "fixed_life_quality",
                LifeQualityData {
                    air_quality_index: 45.0,
                    safety_score: 0.85,
                    healthcare_wait_time_hours: 2.0,
                },
            )
            .with_latency(latency),
        ),
        ..ProviderSet::mock(latency)
    }
}

fn orchestrator_with(config: SimulationConfig, providers: &ProviderSet) -> Orchestrator {
    let registry = create_default_registry(providers, &config).unwrap();
    Orchestrator::new(config, registry).unwrap()
}

#[tokio::test]
async fn lisbon_scenario_matches_expected_projection() {
    let orchestrator = orchestrator_with(SimulationConfig::default(), &fixed_providers(Duration::ZERO));

    let report = assert_ok!(orchestrator.run(&lisbon_request()).await);

    assert_eq!(report.primary_target, "Lisbon");
    assert_eq!(report.quality_of_life_score, RiskRating::Low);
    assert!((report.net_annual_savings - 62_400.0).abs() < 1e-6);
    assert!((report.wealth_projection[0].wealth - 115_520.0).abs() < 1e-6);
    assert_eq!(report.wealth_projection.len(), 5);
    assert_eq!(report.assumptions.horizon_years, 5);
}

#[tokio::test]
async fn every_run_yields_exactly_one_result() {
    let orchestrator = orchestrator_with(SimulationConfig::default(), &fixed_providers(Duration::ZERO));

    let mut bad = lisbon_request();
    bad.targets.clear();

    let requests = [lisbon_request(), bad];
    for request in &requests {
        let outcome = orchestrator.execute(request, CancellationToken::new()).await;
        // a report or an error, never both, never neither
        match outcome.result {
            Ok(report) => assert!(!report.wealth_projection.is_empty()),
            Err(e) => assert!(matches!(e, OrchestrationError::Validation(_))),
        }
    }

    assert_eq!(orchestrator.audit_log().len().await, 2);
}

#[tokio::test]
async fn dependent_stage_starts_after_dependency_settles() {
    let config = SimulationConfig {
        compliance_uses_expense: true,
        ..SimulationConfig::default()
    };
    let orchestrator = orchestrator_with(config, &fixed_providers(Duration::from_millis(10)));

    for _ in 0..5 {
        let outcome = orchestrator
            .execute(&lisbon_request(), CancellationToken::new())
            .await;
        assert_ok!(&outcome.result);

        for desc in orchestrator.registry().describe() {
            for dep in desc.dependencies {
                let settled = outcome
                    .events
                    .iter()
                    .find(|e| e.stage == dep && e.kind == StageEventKind::Settled)
                    .unwrap();
                let started = outcome
                    .events
                    .iter()
                    .find(|e| e.stage == desc.stage && e.kind == StageEventKind::Started)
                    .unwrap();
                assert!(settled.sequence < started.sequence);
            }
        }
    }
}

#[tokio::test]
async fn identical_requests_produce_identical_reports() {
    let orchestrator = orchestrator_with(SimulationConfig::default(), &fixed_providers(Duration::ZERO));

    let first = orchestrator.run(&lisbon_request()).await.unwrap();
    let second = orchestrator.run(&lisbon_request()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fingerprint(&first), fingerprint(&second));

    let ids = orchestrator.audit_log().list().await.unwrap();
    let a = orchestrator.audit_log().get(ids[0]).await.unwrap().unwrap();
    let b = orchestrator.audit_log().get(ids[1]).await.unwrap().unwrap();
    assert_eq!(a.request_hash, b.request_hash);
    assert_eq!(a.report_hash, b.report_hash);
}

#[tokio::test]
async fn cancellation_before_settlement_returns_cancelled() {
    let orchestrator = orchestrator_with(
        SimulationConfig::default(),
        &fixed_providers(Duration::from_millis(500)),
    );
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = orchestrator.execute(&lisbon_request(), cancel).await;

    let err = assert_err!(outcome.result);
    assert!(matches!(err, OrchestrationError::Cancelled(_)));
    assert!(!outcome
        .events
        .iter()
        .any(|e| e.kind == StageEventKind::Settled));

    let record = orchestrator
        .audit_log()
        .get(outcome.run_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, RunStatus::Cancelled);
    assert!(record.report_hash.is_none());
}

#[tokio::test]
async fn compliance_provider_timeout_fails_run() {
    let providers = ProviderSet {
        tax: Arc::new(FailingProvider::<TaxRegimeData>::new(ProviderError::Timeout {
            provider: "tax_treaty_api",
            timeout_ms: 5_000,
        })),
        ..fixed_providers(Duration::ZERO)
    };
    let orchestrator = orchestrator_with(SimulationConfig::default(), &providers);

    let err = assert_err!(orchestrator.run(&lisbon_request()).await);

    match err {
        OrchestrationError::RunFailed(run) => {
            assert_eq!(run.stage_names(), vec!["compliance"]);
            assert_eq!(run.failed_stages[0].kind, StageErrorKind::Provider);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failed_expense_skips_dependent_compliance() {
    let config = SimulationConfig {
        compliance_uses_expense: true,
        ..SimulationConfig::default()
    };
    let providers = ProviderSet {
        pricing: Arc::new(FailingProvider::<PricingData>::new(ProviderError::Unavailable {
            provider: "pricing_api",
            message: "503".to_string(),
        })),
        ..fixed_providers(Duration::ZERO)
    };
    let orchestrator = orchestrator_with(config, &providers);

    let outcome = orchestrator
        .execute(&lisbon_request(), CancellationToken::new())
        .await;

    match outcome.result {
        Err(OrchestrationError::RunFailed(run)) => {
            assert_eq!(run.stage_names(), vec!["expense", "compliance"]);
            assert_eq!(run.failed_stages[1].kind, StageErrorKind::DependencyFailed);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(!outcome
        .events
        .iter()
        .any(|e| e.stage == StageId::COMPLIANCE && e.kind == StageEventKind::Started));
}

#[tokio::test]
async fn best_effort_risk_failure_rates_unknown() {
    let providers = ProviderSet {
        life_quality: Arc::new(FailingProvider::<LifeQualityData>::new(
            ProviderError::UnknownLocation {
                provider: "life_quality_api",
                location: "Lisbon".to_string(),
            },
        )),
        ..fixed_providers(Duration::ZERO)
    };
    let registry = StageRegistry::new(vec![
        StageSpec::new(Arc::new(RiskStage::new(providers.life_quality.clone()))).best_effort(),
        StageSpec::new(Arc::new(ExpenseStage::new(
            providers.pricing.clone(),
            providers.exchange.clone(),
        ))),
        StageSpec::new(Arc::new(ComplianceStage::new(providers.tax.clone()))),
    ])
    .unwrap();
    let orchestrator = Orchestrator::new(SimulationConfig::default(), registry).unwrap();

    let report = assert_ok!(orchestrator.run(&lisbon_request()).await);

    assert_eq!(report.quality_of_life_score, RiskRating::Unknown);
    assert!((report.net_annual_savings - 62_400.0).abs() < 1e-6);
}

#[tokio::test]
async fn invalid_request_runs_no_stage() {
    let orchestrator = orchestrator_with(SimulationConfig::default(), &fixed_providers(Duration::ZERO));
    let mut request = lisbon_request();
    request.profile.monthly_expenses = Some(-1.0);

    let outcome = orchestrator.execute(&request, CancellationToken::new()).await;

    assert!(matches!(outcome.result, Err(OrchestrationError::Validation(_))));
    assert!(outcome.events.is_empty());
}

#[test]
fn cyclic_registry_is_rejected() {
    let providers = ProviderSet::mock(Duration::ZERO);
    let result = StageRegistry::new(vec![
        StageSpec::new(Arc::new(RiskStage::new(providers.life_quality.clone())))
            .depends_on(StageId::COMPLIANCE),
        StageSpec::new(Arc::new(ExpenseStage::new(
            providers.pricing.clone(),
            providers.exchange.clone(),
        ))),
        StageSpec::new(Arc::new(ComplianceStage::new(providers.tax.clone())))
            .depends_on(StageId::RISK),
    ]);

    assert!(matches!(result, Err(OrchestrationError::Configuration(_))));
}

#[tokio::test]
async fn multiple_targets_are_projected_in_order() {
    let orchestrator = orchestrator_with(SimulationConfig::default(), &fixed_providers(Duration::ZERO));
    let mut request = lisbon_request();
    request.targets = vec!["Lisbon".to_string(), "Dubai".to_string(), "lisbon".to_string()];

    let report = orchestrator.run(&request).await.unwrap();

    assert_eq!(report.scenarios.len(), 2);
    assert_eq!(report.scenarios[1].location, "Dubai");
    assert_eq!(report.wealth_projection.len(), 10);
    assert!(report.recommendations[0].contains("Dubai"));
}
