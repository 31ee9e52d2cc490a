//! HTTP client for a Convex-style function API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{is_query, RemoteClient};
use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url, normalize_text_option};

#[derive(Clone)]
pub struct HttpRemoteClient {
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().timeout(request_timeout).build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, function: &str) -> String {
        let route = if is_query(function) {
            "query"
        } else {
            "mutation"
        };
        format!("{}/api/{route}", self.base_url)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn call(&self, function: &str, args: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.endpoint(function))
            .header("Accept", "application/json")
            .json(&json!({
                "path": function,
                "args": args,
                "format": "json",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(format!(
                "{function}: {}",
                parse_api_error(status, &body)
            )));
        }

        let payload = response.json::<FunctionResponse>().await?;
        payload.into_value(function)
    }

    /// Any HTTP answer from the deployment counts as reachable.
    async fn probe(&self) -> Result<()> {
        self.client.get(&self.base_url).send().await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionResponse {
    status: String,
    #[serde(default)]
    value: Value,
    error_message: Option<String>,
}

impl FunctionResponse {
    fn into_value(self, function: &str) -> Result<Value> {
        if self.status == "success" {
            return Ok(self.value);
        }

        let message = self
            .error_message
            .as_deref()
            .map(compact_text)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| format!("status {}", self.status));
        Err(Error::Remote(format!("{function}: {message}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    error_message: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error_message.or(payload.message) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("remote url must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "remote url must include http:// or https://".to_string(),
        ))
    }
}
