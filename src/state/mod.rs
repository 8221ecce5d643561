//! Per-run state
//!
//! The shared context is read-only and built once per run. The accumulator
//! holds one settled result per stage and is owned by the run controller.

pub mod context;

pub use context::{validate_request, FinancialProfile, SharedContext};

use crate::error::OrchestrationError;
use crate::models::{StageId, StageResult};
use crate::Result;
use std::collections::BTreeMap;

/// Per-run store of settled stage results
#[derive(Debug, Default)]
pub struct Accumulator {
    results: BTreeMap<StageId, StageResult>,
    notes: Vec<String>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a stage's result into its own slot. A slot is written once.
    pub fn record(&mut self, result: StageResult) -> Result<()> {
        if self.results.contains_key(&result.stage) {
            return Err(OrchestrationError::AggregationInternal(format!(
                "stage '{}' settled more than once",
                result.stage
            )));
        }

        self.results.insert(result.stage, result);
        Ok(())
    }

    /// Record a non-fatal error encountered during the run
    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    pub fn get(&self, stage: StageId) -> Option<&StageResult> {
        self.results.get(&stage)
    }

    pub fn is_settled(&self, stage: StageId) -> bool {
        self.results.contains_key(&stage)
    }

    pub fn succeeded(&self, stage: StageId) -> bool {
        self.results
            .get(&stage)
            .map(StageResult::is_success)
            .unwrap_or(false)
    }

    pub fn settled_count(&self) -> usize {
        self.results.len()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskAnalysis, StageFailure, StagePayload};
    use chrono::Utc;
    use std::sync::Arc;

    fn settled(stage: StageId, ok: bool) -> StageResult {
        StageResult {
            stage,
            outcome: if ok {
                Ok(Arc::new(StagePayload::Risk(RiskAnalysis::default())))
            } else {
                Err(StageFailure::stage("boom"))
            },
            started_at: Some(Utc::now()),
            settled_at: Utc::now(),
            duration_ms: 1,
        }
    }

    #[test]
    fn test_single_writer_per_key() {
        let mut acc = Accumulator::new();
        acc.record(settled(StageId::RISK, true)).unwrap();

        let err = acc.record(settled(StageId::RISK, false)).unwrap_err();
        assert!(matches!(err, OrchestrationError::AggregationInternal(_)));

        // first write survives
        assert!(acc.succeeded(StageId::RISK));
        assert_eq!(acc.settled_count(), 1);
    }

    #[test]
    fn test_payload_only_for_success() {
        let mut acc = Accumulator::new();
        acc.record(settled(StageId::RISK, true)).unwrap();
        acc.record(settled(StageId::EXPENSE, false)).unwrap();

        assert!(acc.get(StageId::RISK).and_then(StageResult::payload).is_some());
        assert!(acc.get(StageId::EXPENSE).and_then(StageResult::payload).is_none());
        assert!(acc.is_settled(StageId::EXPENSE));
        assert!(!acc.succeeded(StageId::EXPENSE));
        assert!(!acc.is_settled(StageId::COMPLIANCE));
    }
}
