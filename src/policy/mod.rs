//! Failure policy
//!
//! Decides whether a settled run is viable. A failed required stage makes
//! the run fail; best-effort failures become notes on the accumulator.

use crate::error::{FailedStage, RunError};
use crate::registry::{FailurePolicy, StageRegistry};
use crate::state::Accumulator;
use crate::Result;
use tracing::{info, warn};

/// Evaluate a fully settled run
///
/// On failure the error lists every failed stage, required or not, in
/// registry order.
pub fn evaluate(registry: &StageRegistry, accumulator: &mut Accumulator) -> Result<()> {
    let mut failed_stages = Vec::new();
    let mut required_failed = false;

    for id in registry.order() {
        let Some(spec) = registry.spec(*id) else {
            continue;
        };
        let Some(failure) = accumulator.get(*id).and_then(|r| r.failure()).cloned() else {
            continue;
        };

        if spec.policy == FailurePolicy::Required {
            required_failed = true;
        }

        failed_stages.push(FailedStage {
            stage: *id,
            kind: failure.kind,
            message: failure.message,
        });
    }

    if required_failed {
        warn!(
            failed = ?failed_stages.iter().map(|f| f.stage.as_str()).collect::<Vec<_>>(),
            "Policy: required stage failed, run is not viable"
        );
        return Err(RunError { failed_stages }.into());
    }

    for failed in failed_stages {
        info!(stage = %failed.stage, kind = %failed.kind, "Policy: best-effort stage failed, continuing");
        accumulator.note(format!(
            "{} stage failed ({}): {}",
            failed.stage, failed.kind, failed.message
        ));
    }

    Ok(())
}
