use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use stepcore::{
    payload_to_json, Failure, Payload, StepContext, StepExecutor, Value, WorkflowError, ERROR_KEY,
};
use stepruntime::{StepFactory, StepMetadata};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Kind raised when the incident could not be published
pub const NOTIFICATION_ERROR: &str = "NotificationFailed";

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint rejected notification with status {0}")]
    Rejected(u16),

    #[error("Notification channel closed")]
    Closed,
}

/// External channel incident records are published to
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, subject: &str, message: &serde_json::Value) -> Result<(), PublishError>;
}

/// Message as delivered to a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub topic: String,
    pub subject: String,
    pub message: serde_json::Value,
}

/// POSTs each notification as JSON to a webhook endpoint
pub struct WebhookPublisher {
    client: reqwest::Client,
    endpoint: String,
    topic: String,
}

impl WebhookPublisher {
    pub fn new(endpoint: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(
        &self,
        subject: &str,
        message: &serde_json::Value,
    ) -> Result<(), PublishError> {
        let body = Notification {
            topic: self.topic.clone(),
            subject: subject.to_string(),
            message: message.clone(),
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected(status.as_u16()));
        }

        tracing::info!("Published '{}' to {} ({})", subject, self.topic, status);
        Ok(())
    }
}

/// Delivers notifications to an in-process receiver
pub struct ChannelPublisher {
    topic: String,
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelPublisher {
    pub fn new(topic: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let publisher = Self {
            topic: topic.into(),
            sender,
        };
        (publisher, receiver)
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn publish(
        &self,
        subject: &str,
        message: &serde_json::Value,
    ) -> Result<(), PublishError> {
        self.sender
            .send(Notification {
                topic: self.topic.clone(),
                subject: subject.to_string(),
                message: message.clone(),
            })
            .map_err(|_| PublishError::Closed)
    }
}

/// Writes notifications to the log; the fallback when no endpoint is set
pub struct TracingPublisher {
    topic: String,
}

#[async_trait]
impl Publisher for TracingPublisher {
    async fn publish(
        &self,
        subject: &str,
        message: &serde_json::Value,
    ) -> Result<(), PublishError> {
        tracing::warn!(topic = %self.topic, "{}: {}", subject, message);
        Ok(())
    }
}

/// Where incident records go
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub topic: String,
    pub subject: String,
    /// Webhook URL; incidents are only logged when unset
    pub endpoint: Option<String>,
}

impl NotificationConfig {
    pub fn publisher(&self) -> Arc<dyn Publisher> {
        match &self.endpoint {
            Some(endpoint) => Arc::new(WebhookPublisher::new(endpoint, &self.topic)),
            None => Arc::new(TracingPublisher {
                topic: self.topic.clone(),
            }),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            topic: "order-errors".to_string(),
            subject: "Error en Step Function - Proceso de Compra".to_string(),
            endpoint: None,
        }
    }
}

/// Publishes the caught error of a run as an incident record.
///
/// The returned payload is the input plus a confirmation, so the `error`
/// field is still there when the run ends.
pub struct IncidentNotifier {
    publisher: Arc<dyn Publisher>,
    subject: String,
}

impl IncidentNotifier {
    pub fn new(publisher: Arc<dyn Publisher>, subject: impl Into<String>) -> Self {
        Self {
            publisher,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl StepExecutor for IncidentNotifier {
    fn step_type(&self) -> &str {
        "notify.incident"
    }

    async fn execute(&self, ctx: StepContext) -> Result<Payload, Failure> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let error_details = ctx
            .payload
            .get(ERROR_KEY)
            .cloned()
            .map(serde_json::Value::from)
            .unwrap_or_else(|| serde_json::Value::from("Error no especificado"));

        let record = serde_json::json!({
            "timestamp": timestamp,
            "originalInput": payload_to_json(&ctx.payload),
            "errorDetails": error_details,
            "stateMachine": ctx.workflow,
        });

        self.publisher
            .publish(&self.subject, &record)
            .await
            .map_err(|e| Failure::new(NOTIFICATION_ERROR).with_message(e.to_string()))?;

        ctx.events.info(format!("Incident published: {}", self.subject));

        let mut output = ctx.payload;
        output.insert("status".to_string(), "Error Notificado".into());
        output.insert("errorHandled".to_string(), true.into());
        output.insert("timestamp".to_string(), timestamp.into());
        Ok(output)
    }
}

pub struct IncidentNotifierFactory {
    publisher: Arc<dyn Publisher>,
    config: NotificationConfig,
}

impl IncidentNotifierFactory {
    pub fn new(publisher: Arc<dyn Publisher>, config: NotificationConfig) -> Self {
        Self { publisher, config }
    }
}

impl StepFactory for IncidentNotifierFactory {
    fn create(
        &self,
        config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn StepExecutor>, WorkflowError> {
        let subject = match config.get("subject") {
            None => self.config.subject.clone(),
            Some(Value::String(subject)) => subject.clone(),
            Some(_) => {
                return Err(WorkflowError::StepCreation(
                    "notify.incident: 'subject' must be a string".to_string(),
                ))
            }
        };
        Ok(Arc::new(IncidentNotifier::new(self.publisher.clone(), subject)))
    }

    fn step_type(&self) -> &str {
        "notify.incident"
    }

    fn metadata(&self) -> StepMetadata {
        StepMetadata {
            description: "Publish the caught error as an incident".to_string(),
            category: "notify".to_string(),
        }
    }
}
