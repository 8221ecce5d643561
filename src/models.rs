//! Core data models for the relocation simulation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

//
// ================= Identifiers =================
//

/// Identifier of an analysis stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StageId(&'static str);

impl StageId {
    pub const RISK: StageId = StageId("risk");
    pub const EXPENSE: StageId = StageId("expense");
    pub const COMPLIANCE: StageId = StageId("compliance");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Normalized location: display name plus case-insensitive lookup key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub key: String,
}

impl Location {
    pub fn new(raw: &str) -> Self {
        let name = raw.trim().to_string();
        let key = name.to_lowercase();
        Self { name, key }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

//
// ================= Request =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelocationRequest {
    #[serde(alias = "current_city", alias = "current_location")]
    pub origin: String,
    #[serde(alias = "target_locations", alias = "target_cities")]
    pub targets: Vec<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(alias = "user_profile")]
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, alias = "current_salary", alias = "salary")]
    pub annual_income: Option<f64>,
    #[serde(default)]
    pub monthly_expenses: Option<f64>,
    #[serde(default, alias = "current_wealth")]
    pub current_net_worth: Option<f64>,
    #[serde(default, alias = "lifestyle_preferences")]
    pub preferences: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub spending_categories: BTreeMap<String, f64>,
}

//
// ================= Stage Results =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskRating {
    Low,
    Medium,
    High,
    Unknown,
}

impl fmt::Display for RiskRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskRating::Low => "Low",
            RiskRating::Medium => "Medium",
            RiskRating::High => "High",
            RiskRating::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationRisk {
    pub location: String,
    pub air_quality_index: f64,
    pub safety_score: f64,
    pub healthcare_wait_time_hours: f64,
    pub composite_risk_score: f64,
    pub overall_risk_rating: RiskRating,
    pub health_impact: String,
    pub lifestyle_impact: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RiskAnalysis {
    /// Keyed by location key
    pub locations: BTreeMap<String, LocationRisk>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExpenseBreakdown {
    pub rent: f64,
    pub food: f64,
    pub transport: f64,
    pub misc: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationExpense {
    pub location: String,
    pub original_monthly_expenses: f64,
    pub projected_monthly_expenses: f64,
    pub col_multiplier: f64,
    pub exchange_rate: f64,
    pub currency: String,
    pub breakdown: ExpenseBreakdown,
    pub category_replay: BTreeMap<String, f64>,
    pub one_off_costs: BTreeMap<String, f64>,
}

impl LocationExpense {
    pub fn one_off_total(&self) -> f64 {
        self.one_off_costs.values().sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExpenseAnalysis {
    pub locations: BTreeMap<String, LocationExpense>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationCompliance {
    pub location: String,
    pub tax_rate: f64,
    pub estimated_tax: f64,
    pub net_wealth_projection: f64,
    /// True when the net wealth figure already subtracts projected expenses
    pub expense_adjusted: bool,
    pub treaty_status: String,
    pub treaty_relief: f64,
    pub visa_requirements: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComplianceAnalysis {
    pub locations: BTreeMap<String, LocationCompliance>,
}

/// Stage-specific success payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "stage", content = "data", rename_all = "lowercase")]
pub enum StagePayload {
    Risk(RiskAnalysis),
    Expense(ExpenseAnalysis),
    Compliance(ComplianceAnalysis),
}

impl StagePayload {
    pub fn as_risk(&self) -> Option<&RiskAnalysis> {
        match self {
            StagePayload::Risk(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_expense(&self) -> Option<&ExpenseAnalysis> {
        match self {
            StagePayload::Expense(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_compliance(&self) -> Option<&ComplianceAnalysis> {
        match self {
            StagePayload::Compliance(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// An upstream provider lookup failed
    Provider,
    /// The stage could not produce a result from valid input
    Stage,
    Timeout,
    /// Never invoked because a dependency failed
    DependencyFailed,
    Panicked,
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageErrorKind::Provider => "provider_error",
            StageErrorKind::Stage => "stage_error",
            StageErrorKind::Timeout => "timeout",
            StageErrorKind::DependencyFailed => "dependency_failed",
            StageErrorKind::Panicked => "panicked",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageFailure {
    pub kind: StageErrorKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn stage(message: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Stage, message)
    }
}

/// What a stage function returns
pub type StageOutcome = std::result::Result<StagePayload, StageFailure>;

/// One settled stage, as written into the accumulator
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: StageId,
    pub outcome: std::result::Result<Arc<StagePayload>, StageFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub settled_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StageResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn payload(&self) -> Option<&StagePayload> {
        self.outcome.as_ref().ok().map(|p| p.as_ref())
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.outcome.as_ref().err()
    }
}

//
// ================= Final Report =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WealthProjectionEntry {
    pub year: u32,
    pub wealth: f64,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationScenario {
    pub location: String,
    pub tax_rate: f64,
    pub net_annual_income: f64,
    pub annual_expenses: f64,
    pub net_annual_savings: f64,
    pub quality_of_life_score: RiskRating,
    pub year_1_wealth: f64,
    pub final_wealth: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionAssumptions {
    pub annual_return_rate: f64,
    pub horizon_years: u32,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalReport {
    pub origin: String,
    pub primary_target: String,
    pub currency: String,
    pub net_annual_savings: f64,
    pub quality_of_life_score: RiskRating,
    pub wealth_projection: Vec<WealthProjectionEntry>,
    pub scenarios: Vec<LocationScenario>,
    pub recommendations: Vec<String>,
    pub assumptions: ProjectionAssumptions,
}
