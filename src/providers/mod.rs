//! Data provider trait and provider set
//!
//! Stages depend only on `DataProvider<T>`; the wire format of a concrete
//! provider never leaks into the analysis code.

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::models::Location;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod http;
pub mod mock;

pub use http::HttpProvider;
pub use mock::{
    FailingProvider, MockExchangeProvider, MockLifeQualityProvider, MockPricingProvider,
    MockTaxProvider, StaticProvider,
};

/// Capability to look up one kind of data for a location
#[async_trait::async_trait]
pub trait DataProvider<T>: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, location: &Location, currency: &str) -> std::result::Result<T, ProviderError>;
}

/// Air quality, safety and healthcare figures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifeQualityData {
    pub air_quality_index: f64,
    /// 0..1, higher is safer
    pub safety_score: f64,
    pub healthcare_wait_time_hours: f64,
}

/// Cost-of-living relative to the user's current spending
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingData {
    pub col_multiplier: f64,
    /// Optional per-category multipliers keyed like the profile's spending categories
    #[serde(default)]
    pub category_indices: std::collections::BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeRateData {
    /// Multiplier from the request currency into prices at the location
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxRegimeData {
    pub tax_rate: f64,
    /// Share of double taxation relieved by treaty
    pub treaty_relief: f64,
    pub visa_requirements: String,
}

pub type LifeQualityProvider = Arc<dyn DataProvider<LifeQualityData>>;
pub type PricingProvider = Arc<dyn DataProvider<PricingData>>;
pub type ExchangeProvider = Arc<dyn DataProvider<ExchangeRateData>>;
pub type TaxProvider = Arc<dyn DataProvider<TaxRegimeData>>;

/// One provider per concern, shared by the stages
#[derive(Clone)]
pub struct ProviderSet {
    pub life_quality: LifeQualityProvider,
    pub pricing: PricingProvider,
    pub exchange: ExchangeProvider,
    pub tax: TaxProvider,
}

impl ProviderSet {
    /// All mock providers with the given artificial latency
    pub fn mock(latency: std::time::Duration) -> Self {
        Self {
            life_quality: Arc::new(MockLifeQualityProvider::new(latency)),
            pricing: Arc::new(MockPricingProvider::new(latency)),
            exchange: Arc::new(MockExchangeProvider::new(latency)),
            tax: Arc::new(MockTaxProvider::new(latency)),
        }
    }

    pub fn names(&self) -> [&'static str; 4] {
        [
            self.life_quality.name(),
            self.pricing.name(),
            self.exchange.name(),
            self.tax.name(),
        ]
    }
}

/// HTTP providers where an endpoint is configured, mocks elsewhere
pub fn create_default_providers(config: &ProviderConfig) -> Result<ProviderSet> {
    let mut set = ProviderSet::mock(config.mock_latency);

    if let Some(endpoint) = &config.life_quality {
        set.life_quality = Arc::new(HttpProvider::new(
            "life_quality_api",
            endpoint,
            "/life-quality",
            config.request_timeout,
        )?);
    }
    if let Some(endpoint) = &config.pricing {
        set.pricing = Arc::new(HttpProvider::new(
            "pricing_api",
            endpoint,
            "/cost-of-living",
            config.request_timeout,
        )?);
    }
    if let Some(endpoint) = &config.exchange {
        set.exchange = Arc::new(HttpProvider::new(
            "exchange_api",
            endpoint,
            "/exchange-rate",
            config.request_timeout,
        )?);
    }
    if let Some(endpoint) = &config.tax {
        set.tax = Arc::new(HttpProvider::new(
            "tax_treaty_api",
            endpoint,
            "/tax-regime",
            config.request_timeout,
        )?);
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderEndpoint;
    use std::time::Duration;

    #[test]
    fn test_default_providers_are_mocks_without_endpoints() {
        let set = create_default_providers(&ProviderConfig::default()).unwrap();
        assert_eq!(
            set.names(),
            ["mock_life_quality", "mock_pricing", "mock_exchange", "mock_tax"]
        );
    }

    #[test]
    fn test_configured_endpoint_selects_http_provider() {
        let config = ProviderConfig {
            tax: Some(ProviderEndpoint {
                base_url: "http://127.0.0.1:9".to_string(),
                api_key: None,
            }),
            mock_latency: Duration::ZERO,
            ..Default::default()
        };

        let set = create_default_providers(&config).unwrap();
        assert_eq!(set.tax.name(), "tax_treaty_api");
        assert_eq!(set.pricing.name(), "mock_pricing");
    }
}
