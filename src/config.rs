//! Simulation configuration
//!
//! Immutable once the orchestrator is built. Loaded from environment
//! variables; the binaries read a `.env` file first.

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Endpoint and credential for one HTTP data provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub life_quality: Option<ProviderEndpoint>,
    pub pricing: Option<ProviderEndpoint>,
    pub exchange: Option<ProviderEndpoint>,
    pub tax: Option<ProviderEndpoint>,
    pub request_timeout: Duration,
    /// Artificial latency of the mock providers
    pub mock_latency: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            life_quality: None,
            pricing: None,
            exchange: None,
            tax: None,
            request_timeout: Duration::from_secs(5),
            mock_latency: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub annual_return_rate: f64,
    pub projection_years: u32,
    pub max_concurrency: usize,
    pub stage_timeout: Duration,
    pub run_timeout: Option<Duration>,
    /// Declare the compliance → expense edge in the default registry
    pub compliance_uses_expense: bool,
    /// Run records kept in the audit log; the oldest is evicted past this
    pub max_audit_records: usize,
    pub providers: ProviderConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            annual_return_rate: 0.05,
            projection_years: 5,
            max_concurrency: 4,
            stage_timeout: Duration::from_secs(10),
            run_timeout: None,
            compliance_uses_expense: false,
            max_audit_records: crate::audit::DEFAULT_MAX_RECORDS,
            providers: ProviderConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            annual_return_rate: parse_var("SIM_ANNUAL_RETURN_RATE")?
                .unwrap_or(defaults.annual_return_rate),
            projection_years: parse_var("SIM_PROJECTION_YEARS")?
                .unwrap_or(defaults.projection_years),
            max_concurrency: parse_var("SIM_MAX_CONCURRENCY")?
                .unwrap_or(defaults.max_concurrency),
            stage_timeout: parse_var("SIM_STAGE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.stage_timeout),
            run_timeout: parse_var("SIM_RUN_TIMEOUT_MS")?.map(Duration::from_millis),
            compliance_uses_expense: parse_var("SIM_COMPLIANCE_USES_EXPENSE")?
                .unwrap_or(defaults.compliance_uses_expense),
            max_audit_records: parse_var("SIM_MAX_AUDIT_RECORDS")?
                .unwrap_or(defaults.max_audit_records),
            providers: ProviderConfig {
                life_quality: endpoint("LIFE_QUALITY_API_URL", "LIFE_QUALITY_API_KEY"),
                pricing: endpoint("PRICING_API_URL", "PRICING_API_KEY"),
                exchange: endpoint("EXCHANGE_API_URL", "EXCHANGE_API_KEY"),
                tax: endpoint("TAX_API_URL", "TAX_API_KEY"),
                request_timeout: parse_var("SIM_PROVIDER_TIMEOUT_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.providers.request_timeout),
                mock_latency: parse_var("SIM_MOCK_LATENCY_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.providers.mock_latency),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.annual_return_rate.is_finite() || self.annual_return_rate <= -1.0 {
            return Err(OrchestrationError::Configuration(format!(
                "annual_return_rate must be finite and greater than -1, got {}",
                self.annual_return_rate
            )));
        }

        if !(1..=50).contains(&self.projection_years) {
            return Err(OrchestrationError::Configuration(format!(
                "projection_years must be between 1 and 50, got {}",
                self.projection_years
            )));
        }

        if self.max_concurrency == 0 {
            return Err(OrchestrationError::Configuration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        if self.max_audit_records == 0 {
            return Err(OrchestrationError::Configuration(
                "max_audit_records must be at least 1".to_string(),
            ));
        }

        if self.stage_timeout.is_zero() {
            return Err(OrchestrationError::Configuration(
                "stage_timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| OrchestrationError::Configuration(format!("{}: {}", name, e))),
        _ => Ok(None),
    }
}

fn endpoint(url_var: &str, key_var: &str) -> Option<ProviderEndpoint> {
    let base_url = env::var(url_var).ok().filter(|v| !v.trim().is_empty())?;
    Some(ProviderEndpoint {
        base_url: base_url.trim_end_matches('/').to_string(),
        api_key: env::var(key_var).ok().filter(|v| !v.is_empty()),
    })
}
