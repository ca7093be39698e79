//! HTTP utilities for document service calls

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Header carrying a per-request id for correlating logs across services
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control() && c != ' ', "")
}

/// HTTP client wrapper for the document service
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    token: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("opreg/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, token })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(REQUEST_ID_HEADER, uuid::Uuid::new_v4().to_string());
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET a JSON document; 404 is `None`
    pub async fn get(&self, url: &str) -> Result<Option<Value>> {
        tracing::debug!("GET {}", url);

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(anyhow::anyhow!("API request failed: {}", status));
        }

        serde_json::from_str(&body)
            .map(Some)
            .context("Failed to parse response JSON")
    }

    /// PUT a JSON document, returning the stored representation
    pub async fn put(&self, url: &str, body: &Value) -> Result<Value> {
        tracing::debug!("PUT {}", url);

        let response = self
            .authorize(self.client.put(url))
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(anyhow::anyhow!("API request failed: {}", status));
        }

        // Some services answer 204 with no body
        if response_body.trim().is_empty() {
            return Ok(body.clone());
        }

        serde_json::from_str(&response_body).context("Failed to parse response JSON")
    }
}

/// Format a document service error for display
pub fn format_http_error(error: &anyhow::Error) -> String {
    let error_str = format!("{:#}", error);

    if error_str.contains("401") {
        return "Authentication failed. Check the configured store token.".to_string();
    }
    if error_str.contains("403") {
        return "Permission denied by the document service.".to_string();
    }
    if error_str.contains("429") {
        return "Rate limit exceeded. Please try again later.".to_string();
    }
    if error_str.contains("500") || error_str.contains("503") {
        return "Document service temporarily unavailable. Please try again.".to_string();
    }
    if error_str.contains("Failed to send request") {
        return "Could not reach the document service. Check the store URL.".to_string();
    }

    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(80)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
