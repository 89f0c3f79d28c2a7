// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbox action that forwards messages to an HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use courier_core::{CourierError, DeliveryError, InboundMessage, InboxAction};
use tracing::debug;

use crate::sink::{MESSAGE_ID_HEADER, classify, http_client};

/// POSTs each inbound message as JSON to a fixed URL.
///
/// Registered as the fallback action by `courier serve` when
/// `inbox.forward_url` is set.
pub struct WebhookAction {
    client: reqwest::Client,
    url: String,
}

impl WebhookAction {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CourierError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl InboxAction for WebhookAction {
    async fn invoke(&self, message: &InboundMessage) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .header(MESSAGE_ID_HEADER, message.id.as_str())
            .json(message)
            .send()
            .await
            .map_err(|e| DeliveryError::transient_from("forward request failed", e))?;

        let status = response.status();
        debug!(message_id = %message.id, status = %status, "forward response received");
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn forwards_message_with_id_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inbound"))
            .and(header(MESSAGE_ID_HEADER, "msg-1"))
            .and(body_partial_json(serde_json::json!({
                "message_type": "PaymentReceived",
                "payload": "{}",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let action =
            WebhookAction::new(format!("{}/inbound", server.uri()), Duration::from_secs(5))
                .unwrap();
        action
            .invoke(&InboundMessage::new("msg-1", "PaymentReceived", "{}"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejection_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("schema mismatch"))
            .mount(&server)
            .await;

        let action = WebhookAction::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = action
            .invoke(&InboundMessage::new("msg-1", "T", "{}"))
            .await
            .unwrap_err();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("schema mismatch"));
    }
}
