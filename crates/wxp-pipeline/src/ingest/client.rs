//! HTTP client for the current-weather endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::WeatherConfig;
use crate::error::{FetchError, PipelineError, PipelineResult};

/// Anything that can produce one current-weather payload
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, FetchError>;
}

/// Weather API client
pub struct WeatherClient {
    client: Client,
    url: String,
    latitude: f64,
    longitude: f64,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("wxp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.api_url.clone(),
            latitude: config.latitude,
            longitude: config.longitude,
        })
    }
}

#[async_trait]
impl WeatherSource for WeatherClient {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        debug!(bytes = body.len(), "Received weather payload");

        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}
