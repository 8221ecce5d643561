//! Risk stage: life-quality risk per target location

use super::{AnalysisStage, UpstreamResults};
use crate::models::{
    LocationRisk, RiskAnalysis, RiskRating, StageFailure, StageId, StageOutcome, StagePayload,
};
use crate::providers::{LifeQualityData, LifeQualityProvider};
use crate::state::SharedContext;
use tracing::debug;

const AQI_WEIGHT: f64 = 0.3;
const HEALTHCARE_WEIGHT: f64 = 0.3;
const SAFETY_WEIGHT: f64 = 0.4;

const LOW_RISK_BELOW: f64 = 0.30;
const MEDIUM_RISK_BELOW: f64 = 0.45;

pub struct RiskStage {
    provider: LifeQualityProvider,
}

impl RiskStage {
    pub fn new(provider: LifeQualityProvider) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl AnalysisStage for RiskStage {
    fn id(&self) -> StageId {
        StageId::RISK
    }

    fn description(&self) -> &'static str {
        "Life-quality risk from air quality, healthcare access and safety"
    }

    async fn analyze(&self, ctx: &SharedContext, _upstream: &UpstreamResults) -> StageOutcome {
        let mut analysis = RiskAnalysis::default();

        for location in &ctx.targets {
            debug!(location = %location, "Risk: analyzing life quality");

            let data = self.provider.fetch(location, &ctx.currency).await?;
            check_data(&data)?;

            let score = composite_risk_score(&data);
            analysis.locations.insert(
                location.key.clone(),
                LocationRisk {
                    location: location.name.clone(),
                    air_quality_index: data.air_quality_index,
                    safety_score: data.safety_score,
                    healthcare_wait_time_hours: data.healthcare_wait_time_hours,
                    composite_risk_score: score,
                    overall_risk_rating: rating_for(score),
                    health_impact: health_impact(data.air_quality_index).to_string(),
                    lifestyle_impact: lifestyle_impact(data.safety_score).to_string(),
                },
            );
        }

        Ok(StagePayload::Risk(analysis))
    }
}

fn check_data(data: &LifeQualityData) -> Result<(), StageFailure> {
    if !data.air_quality_index.is_finite() || data.air_quality_index < 0.0 {
        return Err(StageFailure::stage(format!(
            "invalid air quality index {}",
            data.air_quality_index
        )));
    }
    if !(0.0..=1.0).contains(&data.safety_score) {
        return Err(StageFailure::stage(format!(
            "safety score {} outside 0..1",
            data.safety_score
        )));
    }
    if !data.healthcare_wait_time_hours.is_finite() || data.healthcare_wait_time_hours < 0.0 {
        return Err(StageFailure::stage(format!(
            "invalid healthcare wait time {}",
            data.healthcare_wait_time_hours
        )));
    }
    Ok(())
}

/// 0..1, lower is better
pub fn composite_risk_score(data: &LifeQualityData) -> f64 {
    let aqi_risk = (data.air_quality_index / 100.0).min(1.0);
    let wait_days = data.healthcare_wait_time_hours / 24.0;
    let healthcare_risk = (wait_days / 30.0).min(1.0);
    let safety_risk = 1.0 - data.safety_score;

    aqi_risk * AQI_WEIGHT + healthcare_risk * HEALTHCARE_WEIGHT + safety_risk * SAFETY_WEIGHT
}

pub fn rating_for(score: f64) -> RiskRating {
    if score < LOW_RISK_BELOW {
        RiskRating::Low
    } else if score < MEDIUM_RISK_BELOW {
        RiskRating::Medium
    } else {
        RiskRating::High
    }
}

fn health_impact(aqi: f64) -> &'static str {
    if aqi > 100.0 {
        "High respiratory health risk due to poor air quality"
    } else if aqi > 50.0 {
        "Moderate health impact from air pollution"
    } else {
        "Minimal health risk from environmental factors"
    }
}

fn lifestyle_impact(safety_score: f64) -> &'static str {
    if safety_score < 0.6 {
        "Significant lifestyle restrictions due to safety concerns"
    } else if safety_score < 0.8 {
        "Some lifestyle adjustments needed for safety"
    } else {
        "Minimal impact on current lifestyle"
    }
}
