//! # Webhook Client
//!
//! Posts ratings and metric definitions to the two webhook receivers.
//!
//! Receivers answer with an optional JSON body. A 2xx response whose body
//! carries `"success": false` is still a failure; a body without a `success`
//! field (or one that is not JSON at all) counts as success.

use crate::errors::EvalError;
use crate::types::{iso_timestamp, AddMetricPayload, MetricSubmission, RatePayload, RatingEntry};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client as ReqwestClient;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

const DEFAULT_FAILURE: &str = "Operation failed";

/// Where the two webhooks live and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub add_metric_url: String,
    pub rate_url: String,
    /// Sent verbatim as the `Authorization` header.
    pub auth_token: String,
}

/// A successful receiver response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookResponse {
    pub description: Option<String>,
    /// The parsed body, when it was JSON.
    pub body: Option<Value>,
}

impl WebhookResponse {
    /// The receiver's description, or `fallback`.
    pub fn message_or(&self, fallback: &str) -> String {
        self.description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct WebhookClient {
    client: ReqwestClient,
    config: WebhookConfig,
}

impl WebhookClient {
    pub fn new(config: WebhookConfig) -> Result<Self, EvalError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(EvalError::ReqwestClientBuild)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Posts a rating batch for a conversation.
    pub async fn submit_ratings(
        &self,
        conversation_id: &str,
        skill: &str,
        ratings: Vec<RatingEntry>,
    ) -> Result<WebhookResponse, EvalError> {
        let payload = RatePayload {
            conversation_id: conversation_id.to_string(),
            timestamp: iso_timestamp(),
            skill: skill.to_string(),
            ratings,
        };
        info!(
            "Submitting {} rating(s) for conversation '{conversation_id}'",
            payload.ratings.len()
        );
        self.send(&self.config.rate_url, &payload).await
    }

    /// Posts new or updated metric definitions.
    pub async fn submit_metrics(
        &self,
        metrics: Vec<MetricSubmission>,
    ) -> Result<WebhookResponse, EvalError> {
        let payload = AddMetricPayload {
            timestamp: iso_timestamp(),
            metrics,
        };
        info!("Submitting {} metric row(s)", payload.metrics.len());
        self.send(&self.config.add_metric_url, &payload).await
    }

    /// Posts `payload` as JSON and interprets the receiver's answer.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<WebhookResponse, EvalError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, &self.config.auth_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| EvalError::Submission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Webhook {url} answered with status {}", status.as_u16());
            return Err(EvalError::Submission(format!(
                "Webhook failed with status {}",
                status.as_u16()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| EvalError::Submission(format!("Failed to read webhook response: {e}")))?;
        interpret_body(&text)
    }
}

/// Applies the receiver's `success`/`description` convention to a 2xx body.
pub fn interpret_body(text: &str) -> Result<WebhookResponse, EvalError> {
    let Ok(body) = serde_json::from_str::<Value>(text) else {
        debug!("Webhook body is not JSON; treating as success");
        return Ok(WebhookResponse::default());
    };

    let description = body
        .get("description")
        .and_then(Value::as_str)
        .map(String::from);

    match body.get("success") {
        None | Some(Value::Bool(true)) => Ok(WebhookResponse {
            description,
            body: Some(body),
        }),
        Some(_) => Err(EvalError::Submission(
            description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE.to_string()),
        )),
    }
}
