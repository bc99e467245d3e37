//! HTTP client for the detection service API

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::types::StagedImage;

use super::wire::{ConnectRequest, HistoryEntry, MessageResponse, ServiceStatus, UploadResponse};

/// HTTP client for the detection service
pub struct ServiceClient {
    config: ServiceConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl ServiceClient {
    /// Create a new client from configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /api/status
    pub async fn status(&self) -> Result<ServiceStatus> {
        let response = self
            .http_client
            .get(self.url("/api/status"))
            .send()
            .await
            .map_err(request_failed)?;

        read_json(response).await
    }

    /// POST /api/connect
    ///
    /// Returns the service's confirmation message.
    pub async fn connect(&self, password: &str) -> Result<String> {
        let response = self
            .http_client
            .post(self.url("/api/connect"))
            .json(&ConnectRequest { password })
            .send()
            .await
            .map_err(request_failed)?;

        let body: MessageResponse = read_json(response).await?;
        match body.success {
            Some(true) => Ok(body.message),
            _ => Err(Error::Rejected(non_empty_or(
                body.message,
                "Connection rejected by server",
            ))),
        }
    }

    /// POST /api/disconnect
    pub async fn disconnect(&self) -> Result<String> {
        let response = self
            .http_client
            .post(self.url("/api/disconnect"))
            .send()
            .await
            .map_err(request_failed)?;

        let body: MessageResponse = read_json(response).await?;
        Ok(non_empty_or(body.message, "Disconnected from server"))
    }

    /// POST /api/upload
    ///
    /// A response with `success: false` is returned as [`Error::Rejected`].
    pub async fn upload(&self, image: &StagedImage) -> Result<UploadResponse> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.filename.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| Error::Decode(format!("invalid mime type {}: {}", image.mime_type, e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .http_client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(request_failed)?;

        let body: UploadResponse = read_json(response).await?;
        if body.success {
            Ok(body)
        } else {
            Err(Error::Rejected(non_empty_or(
                body.message,
                "Failed to analyze image",
            )))
        }
    }

    /// GET /api/history, retrying transient failures
    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(500);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying history fetch (attempt {}/{}), waiting {:?}",
                    attempt + 1,
                    self.config.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(10));
            }

            match self.fetch_history().await {
                Ok(entries) => return Ok(entries),
                Err(e) if is_retryable_error(&e) => {
                    tracing::warn!("Transient error fetching history: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Transport("max retries exceeded".to_string())))
    }

    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>> {
        let response = self
            .http_client
            .get(self.url("/api/history"))
            .send()
            .await
            .map_err(request_failed)?;

        read_json(response).await
    }

    /// POST /api/clear-history
    pub async fn clear_history(&self) -> Result<String> {
        let response = self
            .http_client
            .post(self.url("/api/clear-history"))
            .send()
            .await
            .map_err(request_failed)?;

        let body: MessageResponse = read_json(response).await?;
        match body.success {
            Some(false) => Err(Error::Rejected(non_empty_or(
                body.message,
                "Failed to clear history",
            ))),
            _ => Ok(non_empty_or(body.message, "History cleared")),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn request_failed(e: reqwest::Error) -> Error {
    Error::Transport(format!("HTTP request failed: {}", e))
}

/// Decode a JSON body, turning non-2xx statuses into errors.
///
/// A non-2xx response that still carries a `message` surfaces that message as
/// [`Error::Rejected`].
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("failed to parse response: {}", e)));
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());

    if status.is_client_error() {
        if let Ok(body) = serde_json::from_str::<MessageResponse>(&error_text) {
            if !body.message.is_empty() {
                return Err(Error::Rejected(body.message));
            }
        }
    }

    Err(Error::Transport(format!(
        "API error ({}): {}",
        status, error_text
    )))
}

fn non_empty_or(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

/// Check if an error is retryable (transient)
fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Transport(msg) => {
            msg.starts_with("HTTP request failed") || msg.starts_with("API error (5")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_valid_config() {
        let config = ServiceConfig::with_base_url("not a url");
        assert!(ServiceClient::new(config).is_err());
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = ServiceClient::new(ServiceConfig::with_base_url("http://localhost:5000/")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.url("/api/status"), "http://localhost:5000/api/status");
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error(&Error::Transport(
            "API error (503 Service Unavailable): busy".to_string()
        )));
        assert!(is_retryable_error(&Error::Transport(
            "HTTP request failed: operation timed out".to_string()
        )));
        assert!(!is_retryable_error(&Error::Transport(
            "API error (404 Not Found): missing".to_string()
        )));
        assert!(!is_retryable_error(&Error::Transport(
            "failed to parse response: expected value".to_string()
        )));
        assert!(!is_retryable_error(&Error::Rejected("nope".to_string())));
    }

    #[test]
    fn test_non_empty_or() {
        assert_eq!(non_empty_or("  ".to_string(), "fallback"), "fallback");
        assert_eq!(non_empty_or("ok".to_string(), "fallback"), "ok");
    }
}
