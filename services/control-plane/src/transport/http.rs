//! HTTP transport: POST the envelope to the gateway's internal endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use keyprop_broadcast::{DeliveryError, DeploymentTarget, Transport};
use keyprop_events::DeliveryEnvelope;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, warn};

use super::RetryPolicy;
use crate::config::GatewayToken;

/// Path appended to every gateway endpoint.
pub const EVENTS_PATH: &str = "/internal/v1/api-key-events";

/// Longest gateway response body kept in a `Rejected` error.
const MAX_ERROR_BODY: usize = 512;

/// Delivers envelopes over HTTP with bounded internal retries.
pub struct HttpTransport {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(token: Option<&GatewayToken>, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let raw = token.expose().trim();
            let bearer = if raw.starts_with("Bearer ") || raw.starts_with("bearer ") {
                raw.to_string()
            } else {
                format!("Bearer {raw}")
            };

            let mut value =
                HeaderValue::from_str(&bearer).context("Invalid gateway token format")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("keyprop-control-plane/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build gateway HTTP client")?;

        Ok(Self {
            client,
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
        })
    }

    async fn attempt(&self, url: &str, body: &[u8]) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| DeliveryError::Unreachable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut message = response.text().await.unwrap_or_default();
        if message.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }

        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn deliver(
        &self,
        target: &DeploymentTarget,
        envelope: &DeliveryEnvelope,
    ) -> Result<(), DeliveryError> {
        let Some(endpoint) = target.routing_str("endpoint") else {
            return Err(DeliveryError::Protocol {
                message: format!("gateway {} has no endpoint", target.gateway_id),
            });
        };
        let url = format!("{}{EVENTS_PATH}", endpoint.trim_end_matches('/'));

        let body = envelope
            .to_json_bytes()
            .map_err(|e| DeliveryError::Protocol {
                message: e.to_string(),
            })?;

        let mut attempt = 1;
        loop {
            let error = match self.attempt(&url, &body).await {
                Ok(()) => {
                    debug!(gateway_id = %target.gateway_id, attempt, "Gateway accepted event");
                    return Ok(());
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= self.retry.max_attempts {
                return Err(error);
            }

            let delay = self.retry.delay(attempt - 1);
            warn!(
                gateway_id = %target.gateway_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Gateway delivery failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
