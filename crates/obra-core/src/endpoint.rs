use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ExchangeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

/// Decoded 2xx body. Every field is optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub chart: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Health {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// The remote assistant: one request, one reply.
#[async_trait]
pub trait AssistantEndpoint: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, ExchangeError>;
}

#[derive(Clone)]
pub struct HttpEndpoint {
    client: Client,
    url: String,
}

impl HttpEndpoint {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }

    pub fn with_timeout(url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `{scheme://host:port}/api/healthcheck` next to the chat endpoint.
    pub fn healthcheck_url(&self) -> Result<String> {
        let url = Url::parse(&self.url)?;
        Ok(url.join("/api/healthcheck")?.to_string())
    }

    pub async fn healthcheck(&self) -> Result<Health> {
        let url = self.healthcheck_url()?;
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        // The service reports its own failures as {"status":"error",...} with a 500
        let text = response.text().await?;
        match serde_json::from_str::<Health>(&text) {
            Ok(health) => Ok(health),
            Err(_) if !status.is_success() => {
                Err(anyhow!("Health check failed with status: {}", status))
            }
            Err(e) => Err(anyhow!("Could not read health check response: {}", e)),
        }
    }
}

#[async_trait]
impl AssistantEndpoint for HttpEndpoint {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, ExchangeError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|body| match (body.error, body.message) {
                    (Some(error), Some(message)) => Some(format!("{error}: {message}")),
                    (error, message) => error.or(message),
                });
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        response
            .json::<ChatReply>()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))
    }
}
