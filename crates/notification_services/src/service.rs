use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ses::Client as SesClient;
use aws_sdk_sns::Client as SnsClient;
use reqwest::Client;
use uuid::Uuid;

use crate::types::*;

/// A channel that can deliver a [`Notification`].
///
/// Implementations return an external message id on success.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification.
    async fn notify(&self, notification: &Notification) -> Result<String, NotificationError>;

    /// Channel name used in logs.
    fn channel(&self) -> &'static str;
}

/// AWS SNS channel: publishes to a topic or sends a direct SMS.
#[derive(Debug, Clone)]
pub struct SnsNotifier {
    sns_client: SnsClient,
    target: SnsTarget,
}

impl SnsNotifier {
    /// Creates an SNS notifier with AWS clients initialized from the environment.
    pub async fn new(target: &str) -> Result<Self, NotificationError> {
        let target = SnsTarget::parse(target)?;
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        Ok(Self {
            sns_client: SnsClient::new(&config),
            target,
        })
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn notify(&self, notification: &Notification) -> Result<String, NotificationError> {
        let request = match &self.target {
            SnsTarget::Topic(arn) => self
                .sns_client
                .publish()
                .topic_arn(arn)
                .subject(&notification.title)
                .message(&notification.body),
            SnsTarget::Phone(phone) => self
                .sns_client
                .publish()
                .phone_number(phone)
                .message(notification.sms_text()),
        };

        let output = request
            .send()
            .await
            .map_err(|e| NotificationError::SnsError(e.to_string()))?;

        let message_id = output.message_id().unwrap_or_default().to_string();
        log::info!("📱 SNS message published, id {}", message_id);
        Ok(message_id)
    }

    fn channel(&self) -> &'static str {
        "sns"
    }
}

/// AWS SES channel: sends a plain-text email.
#[derive(Debug, Clone)]
pub struct SesNotifier {
    ses_client: SesClient,
    from_email: String,
    to_email: String,
}

impl SesNotifier {
    /// Creates an SES notifier with AWS clients initialized from the environment.
    pub async fn new(from_email: &str, to_email: &str) -> Result<Self, NotificationError> {
        if !from_email.contains('@') || !to_email.contains('@') {
            return Err(NotificationError::Config(
                "SES sender and recipient must be email addresses".to_string(),
            ));
        }

        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        Ok(Self {
            ses_client: SesClient::new(&config),
            from_email: from_email.to_string(),
            to_email: to_email.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for SesNotifier {
    async fn notify(&self, notification: &Notification) -> Result<String, NotificationError> {
        let subject_content = aws_sdk_ses::types::Content::builder()
            .data(&notification.title)
            .build()
            .map_err(|e| NotificationError::SesError(format!("Failed to build subject: {}", e)))?;

        let text_content = aws_sdk_ses::types::Content::builder()
            .data(&notification.body)
            .build()
            .map_err(|e| {
                NotificationError::SesError(format!("Failed to build text body: {}", e))
            })?;

        let body = aws_sdk_ses::types::Body::builder().text(text_content).build();

        let message = aws_sdk_ses::types::Message::builder()
            .subject(subject_content)
            .body(body)
            .build();

        let destination = aws_sdk_ses::types::Destination::builder()
            .to_addresses(&self.to_email)
            .build();

        let result = self
            .ses_client
            .send_email()
            .source(&self.from_email)
            .destination(destination)
            .message(message)
            .send()
            .await;

        match result {
            Ok(output) => {
                let message_id = output.message_id().to_string();
                log::info!("📧 SES email sent to {}, id {}", self.to_email, message_id);
                Ok(message_id)
            }
            Err(e) => {
                let error_msg = if let Some(service_error) = e.as_service_error() {
                    format!("AWS SES service error: {:?}", service_error)
                } else {
                    format!("AWS SES error: {}", e)
                };
                Err(NotificationError::SesError(error_msg))
            }
        }
    }

    fn channel(&self) -> &'static str {
        "ses"
    }
}

/// HTTP push channel compatible with ntfy servers.
#[derive(Debug, Clone)]
pub struct PushNotifier {
    client: Client,
    endpoint: String,
}

impl PushNotifier {
    /// Creates a push notifier posting to `{server}/{topic}`.
    pub fn new(server: &str, topic: &str) -> Result<Self, NotificationError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(NotificationError::Config("push topic is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::PushError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}",
                server.trim_end_matches('/'),
                urlencoding::encode(topic)
            ),
        })
    }

    /// URL notifications are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Notifier for PushNotifier {
    async fn notify(&self, notification: &Notification) -> Result<String, NotificationError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Title", notification.title.as_str())
            .header("Priority", notification.urgency.priority().to_string())
            .body(notification.body.clone());

        if !notification.tags.is_empty() {
            request = request.header("Tags", notification.tags.join(","));
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::PushError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotificationError::PushError(format!(
                "push endpoint returned {}: {}",
                status, error_text
            )));
        }

        let message_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("id").and_then(|id| id.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("push-{}", Uuid::new_v4()));

        Ok(message_id)
    }

    fn channel(&self) -> &'static str {
        "push"
    }
}

/// Log-only channel for development and unattended runs without credentials.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<String, NotificationError> {
        log::info!(
            "🔔 [{}] {}",
            notification.urgency.as_str(),
            notification.title
        );
        log::info!("🔔 {}", notification.body);

        Ok(format!("log-{}", Uuid::new_v4()))
    }

    fn channel(&self) -> &'static str {
        "log"
    }
}

/// Delivers to every configured channel.
///
/// A failing channel does not stop the remaining ones; the first error is returned
/// after all channels were attempted.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    /// Creates a fan-out over the given channels.
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// Whether no channel is configured.
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, notification: &Notification) -> Result<String, NotificationError> {
        let mut ids = Vec::with_capacity(self.notifiers.len());
        let mut first_error = None;

        for notifier in &self.notifiers {
            match notifier.notify(notification).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    log::error!("❌ {} notification failed: {}", notifier.channel(), e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(ids.join(",")),
        }
    }

    fn channel(&self) -> &'static str {
        "fanout"
    }
}
