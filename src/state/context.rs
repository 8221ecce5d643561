//! Request validation and the read-only run context

use crate::error::OrchestrationError;
use crate::models::{Location, RelocationRequest};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;

const DEFAULT_CURRENCY: &str = "USD";

/// Validated financial profile; every numeric field is present and finite
#[derive(Debug, Clone, Serialize)]
pub struct FinancialProfile {
    pub annual_income: f64,
    pub monthly_expenses: f64,
    pub current_net_worth: f64,
    pub preferences: BTreeMap<String, serde_json::Value>,
    pub spending_categories: BTreeMap<String, f64>,
}

/// Read-only view of a request, built once per run and shared by all stages
#[derive(Debug, Clone, Serialize)]
pub struct SharedContext {
    pub origin: Location,
    pub targets: Vec<Location>,
    pub currency: String,
    pub profile: FinancialProfile,
}

impl SharedContext {
    /// Validate the request and derive the context from it
    pub fn from_request(request: &RelocationRequest) -> Result<Self> {
        validate_request(request)?;

        let mut targets: Vec<Location> = Vec::with_capacity(request.targets.len());
        for raw in &request.targets {
            let location = Location::new(raw);
            if !targets.iter().any(|t| t.key == location.key) {
                targets.push(location);
            }
        }

        let currency = request
            .currency
            .as_deref()
            .map(|c| c.trim().to_uppercase())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let profile = &request.profile;

        Ok(Self {
            origin: Location::new(&request.origin),
            targets,
            currency,
            profile: FinancialProfile {
                annual_income: required_number(profile.annual_income, "annual_income")?,
                monthly_expenses: required_number(profile.monthly_expenses, "monthly_expenses")?,
                current_net_worth: required_number(
                    profile.current_net_worth,
                    "current_net_worth",
                )?,
                preferences: profile.preferences.clone(),
                spending_categories: profile.spending_categories.clone(),
            },
        })
    }

    /// First target in request order
    pub fn primary_target(&self) -> Option<&Location> {
        self.targets.first()
    }
}

/// Check request shape before any stage runs
pub fn validate_request(request: &RelocationRequest) -> Result<()> {
    if request.origin.trim().is_empty() {
        return Err(OrchestrationError::Validation(
            "origin must not be empty".to_string(),
        ));
    }

    if request.targets.is_empty() {
        return Err(OrchestrationError::Validation(
            "at least one target location is required".to_string(),
        ));
    }

    if request.targets.iter().any(|t| t.trim().is_empty()) {
        return Err(OrchestrationError::Validation(
            "target locations must not be blank".to_string(),
        ));
    }

    if let Some(currency) = request.currency.as_deref() {
        let currency = currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(OrchestrationError::Validation(format!(
                "currency '{}' is not a three-letter code",
                currency
            )));
        }
    }

    let profile = &request.profile;
    let income = required_number(profile.annual_income, "annual_income")?;
    let expenses = required_number(profile.monthly_expenses, "monthly_expenses")?;
    required_number(profile.current_net_worth, "current_net_worth")?;

    if income < 0.0 {
        return Err(OrchestrationError::Validation(
            "annual_income must not be negative".to_string(),
        ));
    }
    if expenses < 0.0 {
        return Err(OrchestrationError::Validation(
            "monthly_expenses must not be negative".to_string(),
        ));
    }

    if let Some((name, _)) = profile
        .spending_categories
        .iter()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(OrchestrationError::Validation(format!(
            "spending category '{}' must be a non-negative number",
            name
        )));
    }

    Ok(())
}

fn required_number(value: Option<f64>, field: &str) -> Result<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(_) => Err(OrchestrationError::Validation(format!(
            "profile.{} must be a finite number",
            field
        ))),
        None => Err(OrchestrationError::Validation(format!(
            "profile.{} is required",
            field
        ))),
    }
}
