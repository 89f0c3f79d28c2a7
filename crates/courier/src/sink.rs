// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference dispatch sinks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::model::{SinkConfig, SinkKind};
use courier_core::{CourierError, DeliveryError, DispatchSink, Envelope};
use reqwest::StatusCode;
use tracing::{debug, info};

/// Header carrying the record id so receivers can deduplicate redeliveries.
pub const MESSAGE_ID_HEADER: &str = "x-courier-message-id";

/// Build the sink selected by `[sink]`.
pub fn build_sink(
    config: &SinkConfig,
    timeout: Duration,
) -> Result<Arc<dyn DispatchSink>, CourierError> {
    match config.kind {
        SinkKind::Log => Ok(Arc::new(LogSink)),
        SinkKind::Webhook => {
            let base_url = config.webhook_url.clone().ok_or_else(|| {
                CourierError::Config("sink.webhook_url is required for the webhook sink".into())
            })?;
            let sink = WebhookSink::new(base_url, config.auth_token.clone(), timeout)?;
            Ok(Arc::new(sink))
        }
    }
}

/// Logs every envelope and reports success.
pub struct LogSink;

#[async_trait]
impl DispatchSink for LogSink {
    async fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        info!(
            record_id = %envelope.id,
            destination = %envelope.destination,
            message_type = %envelope.message_type,
            correlation_id = envelope.correlation_id.as_deref().unwrap_or(""),
            payload = %envelope.payload,
            "dispatch"
        );
        Ok(())
    }
}

/// POSTs every envelope as JSON to `{base_url}/{destination}`.
pub struct WebhookSink {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl WebhookSink {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CourierError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    fn url_for(&self, destination: &str) -> String {
        format!("{}/{}", self.base_url, destination.trim_start_matches('/'))
    }
}

#[async_trait]
impl DispatchSink for WebhookSink {
    async fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let mut request = self
            .client
            .post(self.url_for(&envelope.destination))
            .header(MESSAGE_ID_HEADER, envelope.id.to_string())
            .json(envelope);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::transient_from("webhook request failed", e))?;
        let status = response.status();
        debug!(record_id = %envelope.id, status = %status, "webhook response received");
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, &body))
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, CourierError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CourierError::Config(format!("failed to build HTTP client: {e}")))
}

/// Map a non-2xx response to a delivery error.
///
/// Client errors other than 408 and 429 will not succeed on retry.
pub(crate) fn classify(status: StatusCode, body: &str) -> DeliveryError {
    let message = if body.is_empty() {
        format!("endpoint returned {status}")
    } else {
        format!("endpoint returned {status}: {body}")
    };
    let retryable = matches!(
        status,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
    );
    if status.is_client_error() && !retryable {
        DeliveryError::permanent(message)
    } else {
        DeliveryError::transient(message)
    }
}
