//! Analysis stage trait and the built-in stages
//!
//! A stage is a strategy: it reads the shared context plus the results of
//! the stages it declared as dependencies, and returns a payload or a
//! failure. Stages never see each other's output any other way.

use crate::models::{ExpenseAnalysis, StageId, StageOutcome, StagePayload};
use crate::state::SharedContext;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod compliance;
pub mod expense;
pub mod risk;

pub use compliance::ComplianceStage;
pub use expense::ExpenseStage;
pub use risk::RiskStage;

#[async_trait::async_trait]
pub trait AnalysisStage: Send + Sync {
    fn id(&self) -> StageId;
    fn description(&self) -> &'static str;
    async fn analyze(&self, ctx: &SharedContext, upstream: &UpstreamResults) -> StageOutcome;
}

/// Successful results of a stage's declared dependencies
#[derive(Debug, Clone, Default)]
pub struct UpstreamResults {
    results: BTreeMap<StageId, Arc<StagePayload>>,
}

impl UpstreamResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stage: StageId, payload: Arc<StagePayload>) {
        self.results.insert(stage, payload);
    }

    pub fn get(&self, stage: StageId) -> Option<&StagePayload> {
        self.results.get(&stage).map(|p| p.as_ref())
    }

    pub fn expense(&self) -> Option<&ExpenseAnalysis> {
        self.get(StageId::EXPENSE).and_then(StagePayload::as_expense)
    }

    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ {
        self.results.keys().copied()
    }
}
