//! Reverse geocoding: coordinate to a display address.
//!
//! Lookups never fail from the caller's point of view. Missing credentials,
//! empty answers and transport errors all collapse into a [`GeocodeOutcome`]
//! that carries the text shown in the info panel.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::geo::Coordinate;

pub const DEFAULT_ENDPOINT: &str = "https://maps.google.com/maps/api/geocode/json";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

pub const LOADING_TEXT: &str = "Loading address...";
pub const NOT_CONFIGURED_TEXT: &str = "Add your Google API key to see address.";
pub const NOT_FOUND_TEXT: &str = "Address not found.";
pub const FAILED_TEXT: &str = "Error looking up address.";

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("failed to send geocoding request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("geocoding API returned status: {0}")]
    Status(u16),
    #[error("failed to parse geocoding response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("geocoding request timed out after {0:?}")]
    Timeout(Duration),
}

/// Result of one address lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeocodeOutcome {
    Found(String),
    NotFound,
    NotConfigured,
    Failed,
}

impl GeocodeOutcome {
    pub fn display_text(&self) -> &str {
        match self {
            GeocodeOutcome::Found(address) => address,
            GeocodeOutcome::NotFound => NOT_FOUND_TEXT,
            GeocodeOutcome::NotConfigured => NOT_CONFIGURED_TEXT,
            GeocodeOutcome::Failed => FAILED_TEXT,
        }
    }
}

/// Fetches a URL and hands back the response body.
pub trait GeocodeTransport: Send + Sync + 'static {
    fn get(&self, url: &str) -> impl Future<Output = Result<String, GeocodeError>> + Send;
}

/// [`GeocodeTransport`] backed by a shared `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, GeocodeError> {
        let user_agent = format!("whereami/{}", env!("CARGO_PKG_VERSION"));
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

impl GeocodeTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String, GeocodeError> {
        // The URL carries the API key; keep it out of error messages.
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status().as_u16()));
        }

        Ok(response.text().await.map_err(reqwest::Error::without_url)?)
    }
}

#[derive(Clone)]
pub struct GeocodeSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for GeocodeSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// Keeps the key out of logs.
impl fmt::Debug for GeocodeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocodeSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Option<Vec<GeocodeResult>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
}

pub struct ReverseGeocoder<T> {
    transport: T,
    settings: GeocodeSettings,
}

impl<T: GeocodeTransport> ReverseGeocoder<T> {
    pub fn new(transport: T, settings: GeocodeSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    fn api_key(&self) -> Option<&str> {
        self.settings.api_key.as_deref().filter(|key| !key.is_empty())
    }

    fn request_url(&self, key: &str, coordinate: Coordinate) -> String {
        format!(
            "{}?key={}&latlng={},{}",
            self.settings.endpoint,
            key,
            coordinate.latitude(),
            coordinate.longitude()
        )
    }

    /// Resolve `coordinate` to an address. Never returns an error.
    pub async fn resolve(&self, coordinate: Coordinate) -> GeocodeOutcome {
        let Some(key) = self.api_key() else {
            return GeocodeOutcome::NotConfigured;
        };
        let url = self.request_url(key, coordinate);

        debug!(
            "Geocoding {:.6},{:.6}",
            coordinate.latitude(),
            coordinate.longitude()
        );

        let result = match tokio::time::timeout(self.settings.timeout, self.lookup(&url)).await {
            Ok(result) => result,
            Err(_) => Err(GeocodeError::Timeout(self.settings.timeout)),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Geocoding failed: {e}");
                GeocodeOutcome::Failed
            }
        }
    }

    async fn lookup(&self, url: &str) -> Result<GeocodeOutcome, GeocodeError> {
        let body = self.transport.get(url).await?;
        let data: GeocodeResponse = serde_json::from_str(&body)?;

        if let Some(status) = data.status.as_deref() {
            if status != "OK" && status != "ZERO_RESULTS" {
                warn!(
                    "Geocoding API status {status}: {}",
                    data.error_message.as_deref().unwrap_or("no message")
                );
            }
        }

        Ok(match data.results.unwrap_or_default().into_iter().next() {
            Some(first) => GeocodeOutcome::Found(first.formatted_address),
            None => GeocodeOutcome::NotFound,
        })
    }
}
