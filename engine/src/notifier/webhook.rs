//! Push-gateway notifier: POSTs each dispatch as JSON to a configured
//! endpoint (the service that owns device tokens and the actual push
//! channels).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{DeliveryStatus, Dispatch, NotifyError, Notifier};

/// Gateway acknowledgment body. `delivered` is optional: gateways that
/// only queue report acceptance.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    delivered: bool,
}

/// HTTP notifier for a push gateway.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    /// Build a notifier for `endpoint`. `request_timeout` bounds each
    /// attempt; the engine layers its own retry policy on top.
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<DeliveryStatus, NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(dispatch)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("{}: {}", status, body)));
        }

        let ack: GatewayResponse = response.json().await.unwrap_or(GatewayResponse {
            delivered: false,
        });
        debug!(
            member_id = %dispatch.member_id,
            delivered = ack.delivered,
            "gateway accepted dispatch"
        );
        Ok(if ack.delivered {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Accepted
        })
    }
}
