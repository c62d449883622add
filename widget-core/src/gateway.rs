//! Authenticated REST calls against the telephony platform.
//!
//! The gateway never retries and never reauthenticates. A 401 comes back as
//! `GatewayError::Status { status: 401, .. }` and the caller decides what to do.

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::GatewayError;

#[derive(Clone)]
pub struct ApiGateway {
    client: reqwest::Client,
    base_url: String,
}

impl ApiGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn call(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        access_token: &str,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mutating = !matches!(method, Method::GET | Method::HEAD);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if mutating {
            if let Some(body) = body {
                request = request.json(body);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(%method, endpoint, status = status.as_u16(), "platform call failed");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(%method, endpoint, status = status.as_u16(), "platform call ok");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// `call` followed by decoding into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        access_token: &str,
    ) -> Result<T, GatewayError> {
        let value = self.call(endpoint, method, body, access_token).await?;
        Ok(serde_json::from_value(value)?)
    }
}
