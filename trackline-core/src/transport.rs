//! HTTP transport for the delivery endpoint
//!
//! The pipeline only talks to the network through the [`Transport`] trait so
//! hosts and tests can substitute their own delivery mechanism.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};

/// Single-envelope endpoint
pub const TRACK_ENDPOINT: &str = "/track";
/// Batch endpoint
pub const BATCH_ENDPOINT: &str = "/batch";
/// Reachability endpoint
pub const HEALTH_ENDPOINT: &str = "/health";

/// Delivery of JSON payloads to the endpoint.
///
/// Implementations report failure through the returned error; the caller logs
/// it and never retries.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `<base-url><endpoint>`. Ok only for a 2xx response.
    async fn send(&self, endpoint: &str, body: serde_json::Value) -> Result<()>;

    /// Bounded-time reachability check. Returns whether the endpoint answered 2xx.
    async fn health_check(&self, timeout: Duration) -> Result<bool>;
}

/// reqwest-backed transport sharing one connection pool.
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a new transport from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .trimmed_base_url()
            .ok_or_else(|| Error::Config("pipeline.base_url is required".to_string()))?
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        if let Some(tenant) = &config.tenant {
            headers.insert(
                "x-tenant-id",
                HeaderValue::from_str(tenant)
                    .map_err(|e| Error::Config(format!("invalid tenant: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, body: serde_json::Value) -> Result<()> {
        let response = self
            .http_client
            .post(self.url(endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Transport(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    async fn health_check(&self, timeout: Duration) -> Result<bool> {
        match self
            .http_client
            .get(self.url(HEALTH_ENDPOINT))
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::debug!(error = %e, "Health check request failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_requires_valid_config() {
        let config = PipelineConfig::default();
        assert!(HttpTransport::new(&config).is_err());
    }

    #[test]
    fn test_transport_with_valid_config() {
        let config = PipelineConfig {
            api_key: Some("tk_live_test".to_string()),
            ..PipelineConfig::new("acme", "https://t.example.com/")
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.base_url(), "https://t.example.com");
        assert_eq!(transport.url(BATCH_ENDPOINT), "https://t.example.com/batch");
    }

    #[test]
    fn test_transport_rejects_bad_header_values() {
        let config = PipelineConfig {
            api_key: Some("bad\nkey".to_string()),
            ..PipelineConfig::new("acme", "https://t.example.com")
        };
        assert!(matches!(HttpTransport::new(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_health_check_unreachable_is_false() {
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let config = PipelineConfig::new("acme", "http://127.0.0.1:9");
        let transport = HttpTransport::new(&config).unwrap();
        let alive = transport
            .health_check(Duration::from_millis(500))
            .await
            .unwrap();
        assert!(!alive);
    }

    #[tokio::test]
    async fn test_send_unreachable_is_transport_error() {
        let config = PipelineConfig {
            request_timeout_secs: 1,
            ..PipelineConfig::new("acme", "http://127.0.0.1:9")
        };
        let transport = HttpTransport::new(&config).unwrap();
        let result = transport.send(TRACK_ENDPOINT, serde_json::json!({})).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
