//! Webhook callback delivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::traits::{CallbackDelivery, CallbackSink};
use crate::error::{Error, Result};
use crate::types::{BatchId, CatalogueResponse, FulfilmentRequest, JobOutcome};

/// JSON body POSTed to the requester's callback URI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    /// Batch id
    pub batch_id: BatchId,
    /// Correlation id
    pub correlation_id: String,
    /// Whether a bundle was produced
    pub success: bool,
    /// Bundle root, on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_root: Option<PathBuf>,
    /// Numeric event identifier, on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u32>,
    /// Snake-case event name, on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_code: Option<String>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The original request
    pub request: FulfilmentRequest,
    /// Catalogue response, when it could be retrieved
    pub catalogue_response: Option<CatalogueResponse>,
    /// Unix timestamp of the notification
    pub timestamp: i64,
}

impl CallbackPayload {
    /// Build the payload for `outcome`
    pub fn new(
        request: &FulfilmentRequest,
        catalogue: Option<&CatalogueResponse>,
        outcome: &JobOutcome,
    ) -> Self {
        let (success, bundle_root, event_id, event_code, message) = match outcome {
            JobOutcome::Succeeded { bundle_root } => {
                (true, Some(bundle_root.clone()), None, None, None)
            }
            JobOutcome::Failed { event_id, message } => (
                false,
                None,
                Some(event_id.code()),
                Some(event_id.name().to_string()),
                Some(message.clone()),
            ),
        };

        Self {
            batch_id: request.batch_id.clone(),
            correlation_id: request.correlation_id.clone(),
            success,
            bundle_root,
            event_id,
            event_code,
            message,
            request: request.clone(),
            catalogue_response: catalogue.cloned(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// POSTs a [`CallbackPayload`] to the request's callback URI
#[derive(Debug, Clone)]
pub struct WebhookCallbackSink {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookCallbackSink {
    /// Create a sink with the given request timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl CallbackSink for WebhookCallbackSink {
    async fn send(
        &self,
        request: &FulfilmentRequest,
        catalogue: Option<&CatalogueResponse>,
        outcome: &JobOutcome,
    ) -> Result<CallbackDelivery> {
        let Some(uri) = request.callback_uri.as_deref() else {
            tracing::debug!(batch_id = %request.batch_id, "No callback URI, skipping callback");
            return Ok(CallbackDelivery::Skipped);
        };
        let url = url::Url::parse(uri)
            .map_err(|e| Error::Callback(format!("invalid callback URI {}: {}", uri, e)))?;

        let payload = CallbackPayload::new(request, catalogue, outcome);
        let send = self
            .client
            .post(url.clone())
            .json(&payload)
            .timeout(self.timeout)
            .send();

        match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(response)) => {
                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!(url = %url, status = %status, "callback rejected");
                    return Err(Error::Callback(format!(
                        "callback returned status {}: {}",
                        status, body
                    )));
                }
                tracing::debug!(url = %url, batch_id = %request.batch_id, "callback sent successfully");
                Ok(CallbackDelivery::Delivered)
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %url, error = %e, "callback failed");
                Err(Error::Network(e))
            }
            Err(_) => {
                tracing::warn!(url = %url, timeout = ?self.timeout, "callback timed out");
                Err(Error::Callback(format!(
                    "callback timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}
