//! Expense stage: replays the user's spending at target-location prices

use super::{AnalysisStage, UpstreamResults};
use crate::models::{
    ExpenseAnalysis, ExpenseBreakdown, LocationExpense, StageFailure, StageId, StageOutcome,
    StagePayload,
};
use crate::providers::{ExchangeProvider, PricingProvider};
use crate::state::SharedContext;
use std::collections::BTreeMap;
use tracing::debug;

const ONE_OFF_COSTS: &[(&str, f64)] = &[
    ("visa_fees", 500.0),
    ("apostille_costs", 200.0),
    ("translation_fees", 300.0),
    ("banking_setup", 150.0),
    ("legal_consultation", 800.0),
];

pub struct ExpenseStage {
    pricing: PricingProvider,
    exchange: ExchangeProvider,
}

impl ExpenseStage {
    pub fn new(pricing: PricingProvider, exchange: ExchangeProvider) -> Self {
        Self { pricing, exchange }
    }
}

#[async_trait::async_trait]
impl AnalysisStage for ExpenseStage {
    fn id(&self) -> StageId {
        StageId::EXPENSE
    }

    fn description(&self) -> &'static str {
        "Projected monthly expenses at target-location prices"
    }

    async fn analyze(&self, ctx: &SharedContext, _upstream: &UpstreamResults) -> StageOutcome {
        let mut analysis = ExpenseAnalysis::default();
        let current = ctx.profile.monthly_expenses;

        for location in &ctx.targets {
            debug!(location = %location, "Expense: projecting spending");

            let prices = self.pricing.fetch(location, &ctx.currency).await?;
            let exchange = self.exchange.fetch(location, &ctx.currency).await?;

            positive("cost-of-living multiplier", prices.col_multiplier)?;
            positive("exchange rate", exchange.rate)?;

            let projected = current * prices.col_multiplier * exchange.rate;

            let category_replay: BTreeMap<String, f64> = ctx
                .profile
                .spending_categories
                .iter()
                .map(|(category, amount)| {
                    let index = prices
                        .category_indices
                        .get(category)
                        .copied()
                        .unwrap_or(prices.col_multiplier);
                    (category.clone(), amount * index * exchange.rate)
                })
                .collect();

            analysis.locations.insert(
                location.key.clone(),
                LocationExpense {
                    location: location.name.clone(),
                    original_monthly_expenses: current,
                    projected_monthly_expenses: projected,
                    col_multiplier: prices.col_multiplier,
                    exchange_rate: exchange.rate,
                    currency: ctx.currency.clone(),
                    breakdown: ExpenseBreakdown {
                        rent: projected * 0.4,
                        food: projected * 0.2,
                        transport: projected * 0.1,
                        misc: projected * 0.3,
                    },
                    category_replay,
                    one_off_costs: ONE_OFF_COSTS
                        .iter()
                        .map(|(name, cost)| (name.to_string(), cost * exchange.rate))
                        .collect(),
                },
            );
        }

        Ok(StagePayload::Expense(analysis))
    }
}

fn positive(what: &str, value: f64) -> Result<(), StageFailure> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(StageFailure::stage(format!("{} must be positive, got {}", what, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::{RelocationRequest, StageErrorKind, UserProfile};
    use crate::providers::{
        ExchangeRateData, FailingProvider, MockExchangeProvider, MockPricingProvider, PricingData,
        StaticProvider,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn context(spending: BTreeMap<String, f64>) -> SharedContext {
        SharedContext::from_request(&RelocationRequest {
            origin: "San Francisco".to_string(),
            targets: vec!["Lisbon".to_string(), "London".to_string()],
            currency: None,
            profile: UserProfile {
                annual_income: Some(120_000.0),
                monthly_expenses: Some(4_000.0),
                current_net_worth: Some(50_000.0),
                spending_categories: spending,
                ..Default::default()
            },
        })
        .unwrap()
    }

    fn mock_stage() -> ExpenseStage {
        ExpenseStage::new(
            Arc::new(MockPricingProvider::new(Duration::ZERO)),
            Arc::new(MockExchangeProvider::new(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn test_projection_uses_cost_of_living_multiplier() {
        let payload = mock_stage()
            .analyze(&context(BTreeMap::new()), &UpstreamResults::new())
            .await
            .unwrap();
        let expense = payload.as_expense().unwrap();

        let lisbon = &expense.locations["lisbon"];
        assert!((lisbon.projected_monthly_expenses - 2_800.0).abs() < 1e-9);
        assert!((lisbon.breakdown.rent - 1_120.0).abs() < 1e-9);
        assert!((lisbon.one_off_total() - 1_950.0).abs() < 1e-9);

        let london = &expense.locations["london"];
        assert!((london.projected_monthly_expenses - 4_800.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_category_replay_falls_back_to_multiplier() {
        let spending = BTreeMap::from([
            ("housing".to_string(), 1_000.0),
            ("coffee".to_string(), 100.0),
        ]);
        let stage = ExpenseStage::new(
            Arc::new(StaticProvider::new(
                "pricing",
                PricingData {
                    col_multiplier: 0.5,
                    category_indices: BTreeMap::from([("housing".to_string(), 2.0)]),
                },
            )),
            Arc::new(StaticProvider::new("fx", ExchangeRateData { rate: 1.0 })),
        );

        let payload = stage
            .analyze(&context(spending), &UpstreamResults::new())
            .await
            .unwrap();
        let replay = &payload.as_expense().unwrap().locations["lisbon"].category_replay;

        assert!((replay["housing"] - 2_000.0).abs() < 1e-9);
        assert!((replay["coffee"] - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_exchange_failure_is_a_provider_error() {
        let stage = ExpenseStage::new(
            Arc::new(MockPricingProvider::new(Duration::ZERO)),
            Arc::new(FailingProvider::<ExchangeRateData>::new(ProviderError::Unavailable {
                provider: "fx",
                message: "503".to_string(),
            })),
        );

        let failure = stage
            .analyze(&context(BTreeMap::new()), &UpstreamResults::new())
            .await
            .unwrap_err();
        assert_eq!(failure.kind, StageErrorKind::Provider);
    }
}
