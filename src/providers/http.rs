//! JSON-over-HTTP data provider
//!
//! Calls `GET {base_url}{path}?location=..&currency=..` and decodes the body
//! into the provider's data type.

use super::DataProvider;
use crate::config::ProviderEndpoint;
use crate::error::ProviderError;
use crate::models::Location;
use crate::Result;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::debug;

pub struct HttpProvider<T> {
    name: &'static str,
    client: Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
    _data: PhantomData<fn() -> T>,
}

impl<T> HttpProvider<T> {
    pub fn new(
        name: &'static str,
        endpoint: &ProviderEndpoint,
        path: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            name,
            client,
            url: format!("{}{}", endpoint.base_url.trim_end_matches('/'), path),
            api_key: endpoint.api_key.clone(),
            timeout,
            _data: PhantomData,
        })
    }
}

#[async_trait::async_trait]
impl<T> DataProvider<T> for HttpProvider<T>
where
    T: DeserializeOwned + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, location: &Location, currency: &str) -> std::result::Result<T, ProviderError> {
        debug!(provider = self.name, location = %location, "Fetching provider data");

        let mut request = self
            .client
            .get(&self.url)
            .query(&[("location", location.name.as_str()), ("currency", currency)]);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: self.name,
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                ProviderError::Unavailable {
                    provider: self.name,
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::UnknownLocation {
                provider: self.name,
                location: location.name.clone(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable {
                provider: self.name,
                message: format!("returned {}", status),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider: self.name,
                message: e.to_string(),
            })
    }
}
