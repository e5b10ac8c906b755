use crate::{
    locator::DEFAULT_DEPTH_SLOT,
    provider::{direct, stream},
};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Inline data-uri submission polled by prediction id
    Direct,
    /// File upload polled through an event stream
    Stream,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),

    #[error("provider url must be http or https, got {0}")]
    UnsupportedScheme(String),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Parser, Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// Which provider wire format to use
    #[arg(long, env = "PROVIDER", value_enum, default_value_t = ProviderKind::Stream)]
    pub provider: ProviderKind,

    /// Provider base url; defaults to the public endpoint of the selected provider
    #[arg(long, env = "PROVIDER_URL")]
    pub provider_url: Option<String>,

    /// Bearer token for the direct provider
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    #[serde(skip_serializing)]
    pub api_token: Option<String>,

    #[arg(long, env = "MODEL_VERSION", default_value = direct::DEFAULT_MODEL_VERSION)]
    pub model_version: String,

    /// Output field holding the depth map url (direct provider)
    #[arg(long, env = "RESULT_FIELD", default_value = direct::DEFAULT_RESULT_FIELD)]
    pub result_field: String,

    /// Output slot holding the depth map (stream provider)
    #[arg(long, env = "RESULT_SLOT", default_value_t = DEFAULT_DEPTH_SLOT)]
    pub result_slot: usize,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 2000)]
    pub poll_interval_ms: u64,

    #[arg(long, env = "POLL_TIMEOUT_SECS", default_value_t = 30)]
    pub poll_timeout_secs: u64,

    /// Upper bound on any single outbound request
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,
}

impl PipelineConfig {
    /// Get the provider base url
    pub fn provider_url(&self) -> Result<Url, ConfigError> {
        let raw = match (&self.provider_url, self.provider) {
            (Some(url), _) => url.as_str(),
            (None, ProviderKind::Direct) => direct::DEFAULT_BASE_URL,
            (None, ProviderKind::Stream) => stream::DEFAULT_BASE_URL,
        };
        let url = Url::parse(raw)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        Ok(reqwest::Client::builder()
            .timeout(self.request_timeout())
            .build()?)
    }
}
