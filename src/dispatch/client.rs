use super::DispatchError;
use crate::cab::NearbyCab;
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info};

/// Proximity endpoint for the single best available cab
pub const BEST_AVAILABLE_PATH: &str = "/api/v1/cab/available";

/// Proximity endpoint for nearby busy cabs
pub const NEARBY_BUSY_PATH: &str = "/api/v1/cab/busy";

/// HTTP client for the proximity endpoints.
///
/// One request per call, bounded by the configured timeout, no retries.
#[derive(Clone)]
pub struct ProximityClient {
    http_client: Client,
    base_url: String,
}

impl ProximityClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("cabtrack/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask for the closest available cab
    pub async fn best_available(
        &self,
        latitude: &str,
        longitude: &str,
        bearer: Option<&str>,
    ) -> Result<Vec<NearbyCab>, DispatchError> {
        self.fetch(BEST_AVAILABLE_PATH, latitude, longitude, bearer, "available cabs")
            .await
    }

    /// Ask for busy cabs near the rider
    pub async fn nearby_busy(
        &self,
        latitude: &str,
        longitude: &str,
        bearer: Option<&str>,
    ) -> Result<Vec<NearbyCab>, DispatchError> {
        self.fetch(NEARBY_BUSY_PATH, latitude, longitude, bearer, "nearby busy cabs")
            .await
    }

    async fn fetch(
        &self,
        path: &str,
        latitude: &str,
        longitude: &str,
        bearer: Option<&str>,
        what: &str,
    ) -> Result<Vec<NearbyCab>, DispatchError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .http_client
            .get(&url)
            .query(&[("latitude", latitude), ("longitude", longitude)]);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            error!(url = %url, error = %e, "Proximity request failed");
            DispatchError::Transport(format!("Proximity request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = status.as_u16(), "Proximity service returned an error");
            return Err(DispatchError::Upstream {
                status: status.as_u16(),
                message: format!("Failed to fetch {}", what),
            });
        }

        let cabs: Vec<NearbyCab> = response.json().await.map_err(|e| {
            error!(url = %url, error = %e, "Failed to decode proximity response");
            DispatchError::Decode("Failed to decode response body".to_string())
        })?;

        info!(results = cabs.len(), "Fetched {}", what);
        Ok(cabs)
    }
}
