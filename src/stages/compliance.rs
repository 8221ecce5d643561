//! Compliance stage: tax regime and treaty position per target location
//!
//! When the registry declares an edge to the expense stage, the net wealth
//! figure is tax-adjusted and expense-adjusted.

use super::{AnalysisStage, UpstreamResults};
use crate::models::{
    ComplianceAnalysis, LocationCompliance, StageFailure, StageId, StageOutcome, StagePayload,
};
use crate::providers::TaxProvider;
use crate::state::SharedContext;
use tracing::debug;

const FAVORABLE_TREATY_BELOW: f64 = 0.25;

pub struct ComplianceStage {
    provider: TaxProvider,
}

impl ComplianceStage {
    pub fn new(provider: TaxProvider) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl AnalysisStage for ComplianceStage {
    fn id(&self) -> StageId {
        StageId::COMPLIANCE
    }

    fn description(&self) -> &'static str {
        "Tax burden, treaty status and visa requirements"
    }

    async fn analyze(&self, ctx: &SharedContext, upstream: &UpstreamResults) -> StageOutcome {
        let income = ctx.profile.annual_income;
        let expenses = upstream.expense();
        let mut analysis = ComplianceAnalysis::default();

        for location in &ctx.targets {
            debug!(location = %location, "Compliance: analyzing tax regime");

            let regime = self.provider.fetch(location, &ctx.currency).await?;

            if !(0.0..=1.0).contains(&regime.tax_rate) {
                return Err(StageFailure::stage(format!(
                    "tax rate {} for {} outside 0..1",
                    regime.tax_rate, location
                )));
            }

            let estimated_tax = income * regime.tax_rate;
            let mut net_wealth = income - estimated_tax;

            let expense_adjusted = match expenses {
                Some(expense) => {
                    let projected = expense.locations.get(&location.key).ok_or_else(|| {
                        StageFailure::stage(format!("no expense projection for {}", location))
                    })?;
                    net_wealth -= projected.projected_monthly_expenses * 12.0;
                    true
                }
                None => false,
            };

            let treaty_status = if regime.tax_rate < FAVORABLE_TREATY_BELOW {
                "favorable_treaty_found"
            } else {
                "standard_dta"
            };

            analysis.locations.insert(
                location.key.clone(),
                LocationCompliance {
                    location: location.name.clone(),
                    tax_rate: regime.tax_rate,
                    estimated_tax,
                    net_wealth_projection: net_wealth,
                    expense_adjusted,
                    treaty_status: treaty_status.to_string(),
                    treaty_relief: regime.treaty_relief,
                    visa_requirements: regime.visa_requirements,
                },
            );
        }

        Ok(StagePayload::Compliance(analysis))
    }
}
