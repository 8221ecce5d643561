//! Aggregator: folds settled stage results into the final report
//!
//! Pure over the accumulator and context. Runs once per viable run.

use crate::config::SimulationConfig;
use crate::error::OrchestrationError;
use crate::models::{
    ComplianceAnalysis, ExpenseAnalysis, FinalReport, LocationScenario, ProjectionAssumptions,
    RiskAnalysis, RiskRating, StageId, WealthProjectionEntry,
};
use crate::state::{Accumulator, SharedContext};
use crate::Result;
use tracing::{debug, warn};

pub const PROJECTION_MODEL: &str = "deterministic fixed-rate compounding; not a forecast";

pub struct Aggregator {
    annual_return_rate: f64,
    horizon_years: u32,
}

impl Aggregator {
    pub fn new(annual_return_rate: f64, horizon_years: u32) -> Self {
        Self {
            annual_return_rate,
            horizon_years,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.annual_return_rate, config.projection_years)
    }

    pub fn aggregate(&self, accumulator: &Accumulator, ctx: &SharedContext) -> Result<FinalReport> {
        let expense = required_payload(accumulator, StageId::EXPENSE, |p| p.as_expense())?;
        let compliance = required_payload(accumulator, StageId::COMPLIANCE, |p| p.as_compliance())?;
        let risk = risk_payload(accumulator)?;

        let primary = ctx
            .primary_target()
            .ok_or_else(|| internal("context has no target location"))?;

        let mut scenarios = Vec::with_capacity(ctx.targets.len());
        let mut wealth_projection =
            Vec::with_capacity(ctx.targets.len() * self.horizon_years as usize);

        for location in &ctx.targets {
            let (scenario, projection) =
                self.project_location(&location.key, &location.name, ctx, risk, expense, compliance)?;
            wealth_projection.extend(projection);
            scenarios.push(scenario);
        }

        let headline = scenarios
            .first()
            .ok_or_else(|| internal("no scenario for primary target"))?;
        let net_annual_savings = headline.net_annual_savings;
        let quality_of_life_score = headline.quality_of_life_score;

        let recommendations = self.recommendations(&primary.key, ctx, &scenarios, expense)?;

        debug!(
            targets = scenarios.len(),
            savings = net_annual_savings,
            "Aggregation complete"
        );

        Ok(FinalReport {
            origin: ctx.origin.name.clone(),
            primary_target: primary.name.clone(),
            currency: ctx.currency.clone(),
            net_annual_savings,
            quality_of_life_score,
            wealth_projection,
            scenarios,
            recommendations,
            assumptions: ProjectionAssumptions {
                annual_return_rate: self.annual_return_rate,
                horizon_years: self.horizon_years,
                model: PROJECTION_MODEL.to_string(),
            },
        })
    }

    fn project_location(
        &self,
        key: &str,
        name: &str,
        ctx: &SharedContext,
        risk: Option<&RiskAnalysis>,
        expense: &ExpenseAnalysis,
        compliance: &ComplianceAnalysis,
    ) -> Result<(LocationScenario, Vec<WealthProjectionEntry>)> {
        let tax = compliance
            .locations
            .get(key)
            .ok_or_else(|| internal(format!("compliance result has no entry for {}", name)))?;
        let spend = expense
            .locations
            .get(key)
            .ok_or_else(|| internal(format!("expense result has no entry for {}", name)))?;

        let rating = match risk {
            Some(analysis) => {
                analysis
                    .locations
                    .get(key)
                    .ok_or_else(|| internal(format!("risk result has no entry for {}", name)))?
                    .overall_risk_rating
            }
            None => RiskRating::Unknown,
        };

        let net_annual_income = ctx.profile.annual_income - tax.estimated_tax;
        let annual_expenses = spend.projected_monthly_expenses * 12.0;
        let net_annual_savings = net_annual_income - annual_expenses;

        let projection = self.project(ctx.profile.current_net_worth, net_annual_savings, name);
        let year_1_wealth = projection
            .first()
            .map(|e| e.wealth)
            .unwrap_or(ctx.profile.current_net_worth);
        let final_wealth = projection
            .last()
            .map(|e| e.wealth)
            .unwrap_or(ctx.profile.current_net_worth);

        let scenario = LocationScenario {
            location: name.to_string(),
            tax_rate: tax.tax_rate,
            net_annual_income,
            annual_expenses,
            net_annual_savings,
            quality_of_life_score: rating,
            year_1_wealth,
            final_wealth,
        };

        Ok((scenario, projection))
    }

    /// wealth[y] = wealth[y-1] + savings * (1 + r), for y in 1..=horizon
    pub fn project(&self, start: f64, annual_savings: f64, location: &str) -> Vec<WealthProjectionEntry> {
        let yearly_gain = annual_savings * (1.0 + self.annual_return_rate);
        let mut wealth = start;

        (1..=self.horizon_years)
            .map(|year| {
                wealth += yearly_gain;
                WealthProjectionEntry {
                    year,
                    wealth,
                    location: location.to_string(),
                }
            })
            .collect()
    }

    fn recommendations(
        &self,
        primary_key: &str,
        ctx: &SharedContext,
        scenarios: &[LocationScenario],
        expense: &ExpenseAnalysis,
    ) -> Result<Vec<String>> {
        let mut recommendations = Vec::new();

        let mut best: Option<&LocationScenario> = None;
        for scenario in scenarios {
            if best.map_or(true, |b| scenario.final_wealth > b.final_wealth) {
                best = Some(scenario);
            }
        }
        if let Some(best) = best {
            recommendations.push(format!(
                "Strongest {}-year outcome: {} at {:.2} {}",
                self.horizon_years, best.location, best.final_wealth, ctx.currency
            ));
        }

        for scenario in scenarios {
            match scenario.quality_of_life_score {
                RiskRating::High => recommendations.push(format!(
                    "{} carries high health and safety risk; review healthcare access before committing",
                    scenario.location
                )),
                RiskRating::Unknown => recommendations.push(format!(
                    "Risk data unavailable for {}; quality of life is unrated",
                    scenario.location
                )),
                _ => {}
            }
        }

        let one_off = expense
            .locations
            .get(primary_key)
            .ok_or_else(|| internal("expense result has no entry for primary target"))?;
        recommendations.push(format!(
            "Budget {:.2} {} for one-off relocation costs to {}",
            one_off.one_off_total(),
            ctx.currency,
            one_off.location
        ));

        Ok(recommendations)
    }
}

fn internal(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::AggregationInternal(message.into())
}

fn required_payload<'a, T>(
    accumulator: &'a Accumulator,
    stage: StageId,
    select: impl Fn(&'a crate::models::StagePayload) -> Option<&'a T>,
) -> Result<&'a T> {
    let result = accumulator
        .get(stage)
        .ok_or_else(|| internal(format!("{} stage never settled", stage)))?;

    match result.payload() {
        Some(payload) => {
            select(payload).ok_or_else(|| internal(format!("{} stage returned a foreign payload", stage)))
        }
        None => Err(internal(format!("{} stage failed but reached aggregation", stage))),
    }
}

/// Risk payload, or `None` when a best-effort risk stage failed
fn risk_payload(accumulator: &Accumulator) -> Result<Option<&RiskAnalysis>> {
    let result = accumulator
        .get(StageId::RISK)
        .ok_or_else(|| internal("risk stage never settled"))?;

    match result.payload() {
        Some(payload) => payload
            .as_risk()
            .map(Some)
            .ok_or_else(|| internal("risk stage returned a foreign payload")),
        None => {
            warn!("Aggregation: risk unavailable, rating targets Unknown");
            Ok(None)
        }
    }
}
