//! Mock and fixed providers
//!
//! The mock figures stand in for AQI, cost-of-living, exchange-rate and
//! tax-treaty services. A sleep simulates the network round trip.

use super::{DataProvider, ExchangeRateData, LifeQualityData, PricingData, TaxRegimeData};
use crate::error::ProviderError;
use crate::models::Location;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::time::Duration;

const EXPENSIVE_CITIES: &[&str] = &["london", "new york", "singapore"];
const TAX_FREE_CITIES: &[&str] = &["dubai", "monaco"];

async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

pub struct MockLifeQualityProvider {
    latency: Duration,
}

impl MockLifeQualityProvider {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait::async_trait]
impl DataProvider<LifeQualityData> for MockLifeQualityProvider {
    fn name(&self) -> &'static str {
        "mock_life_quality"
    }

    async fn fetch(
        &self,
        location: &Location,
        _currency: &str,
    ) -> Result<LifeQualityData, ProviderError> {
        simulate_latency(self.latency).await;

        // even-length names stand in for polluted, less safe cities
        let risky = location.name.chars().count() % 2 == 0;

        Ok(if risky {
            LifeQualityData {
                air_quality_index: 120.0,
                safety_score: 0.60,
                healthcare_wait_time_hours: 14.0,
            }
        } else {
            LifeQualityData {
                air_quality_index: 45.0,
                safety_score: 0.85,
                healthcare_wait_time_hours: 2.0,
            }
        })
    }
}

pub struct MockPricingProvider {
    latency: Duration,
}

impl MockPricingProvider {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait::async_trait]
impl DataProvider<PricingData> for MockPricingProvider {
    fn name(&self) -> &'static str {
        "mock_pricing"
    }

    async fn fetch(&self, location: &Location, _currency: &str) -> Result<PricingData, ProviderError> {
        simulate_latency(self.latency).await;

        let col_multiplier = if EXPENSIVE_CITIES.contains(&location.key.as_str()) {
            1.2
        } else {
            0.7
        };

        let category_indices = BTreeMap::from([
            ("housing".to_string(), col_multiplier * 1.2),
            ("food_dining".to_string(), col_multiplier * 0.9),
            ("transportation".to_string(), col_multiplier * 1.1),
            ("healthcare".to_string(), col_multiplier * 0.8),
            ("utilities".to_string(), col_multiplier * 1.3),
        ]);

        Ok(PricingData {
            col_multiplier,
            category_indices,
        })
    }
}

pub struct MockExchangeProvider {
    latency: Duration,
}

impl MockExchangeProvider {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait::async_trait]
impl DataProvider<ExchangeRateData> for MockExchangeProvider {
    fn name(&self) -> &'static str {
        "mock_exchange"
    }

    async fn fetch(
        &self,
        _location: &Location,
        _currency: &str,
    ) -> Result<ExchangeRateData, ProviderError> {
        simulate_latency(self.latency).await;
        // prices are normalized to the request currency
        Ok(ExchangeRateData { rate: 1.0 })
    }
}

pub struct MockTaxProvider {
    latency: Duration,
}

impl MockTaxProvider {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait::async_trait]
impl DataProvider<TaxRegimeData> for MockTaxProvider {
    fn name(&self) -> &'static str {
        "mock_tax"
    }

    async fn fetch(&self, location: &Location, _currency: &str) -> Result<TaxRegimeData, ProviderError> {
        simulate_latency(self.latency).await;

        let tax_rate = if TAX_FREE_CITIES.contains(&location.key.as_str()) {
            0.0
        } else if location.key == "lisbon" {
            0.20
        } else {
            0.30
        };

        Ok(TaxRegimeData {
            tax_rate,
            treaty_relief: 0.15,
            visa_requirements: "Standard Tourist/Digital Nomad".to_string(),
        })
    }
}

/// Returns the same data for every location
pub struct StaticProvider<T> {
    name: &'static str,
    data: T,
    latency: Duration,
}

impl<T> StaticProvider<T> {
    pub fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            data,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait::async_trait]
impl<T: Clone + Send + Sync> DataProvider<T> for StaticProvider<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _location: &Location, _currency: &str) -> Result<T, ProviderError> {
        simulate_latency(self.latency).await;
        Ok(self.data.clone())
    }
}

/// Always fails with the configured error
pub struct FailingProvider<T> {
    error: ProviderError,
    _data: PhantomData<fn() -> T>,
}

impl<T> FailingProvider<T> {
    pub fn new(error: ProviderError) -> Self {
        Self {
            error,
            _data: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<T> DataProvider<T> for FailingProvider<T> {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn fetch(&self, _location: &Location, _currency: &str) -> Result<T, ProviderError> {
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_tax_rates() {
        let provider = MockTaxProvider::new(Duration::ZERO);

        let lisbon = provider.fetch(&Location::new("Lisbon"), "USD").await.unwrap();
        let dubai = provider.fetch(&Location::new("DUBAI"), "USD").await.unwrap();
        let berlin = provider.fetch(&Location::new("Berlin"), "USD").await.unwrap();

        assert_eq!(lisbon.tax_rate, 0.20);
        assert_eq!(dubai.tax_rate, 0.0);
        assert_eq!(berlin.tax_rate, 0.30);
    }

    #[tokio::test]
    async fn test_mock_cost_of_living() {
        let provider = MockPricingProvider::new(Duration::ZERO);

        let london = provider.fetch(&Location::new("London"), "USD").await.unwrap();
        let lisbon = provider.fetch(&Location::new("Lisbon"), "USD").await.unwrap();

        assert_eq!(london.col_multiplier, 1.2);
        assert_eq!(lisbon.col_multiplier, 0.7);
    }

    #[tokio::test]
    async fn test_failing_provider_returns_error() {
        let provider: FailingProvider<TaxRegimeData> = FailingProvider::new(ProviderError::Timeout {
            provider: "tax",
            timeout_ms: 50,
        });

        let err = provider.fetch(&Location::new("Lisbon"), "USD").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }
}
