//! Webhook notification sink.
//!
//! Three receiver formats are supported:
//! - `generic`: the notification as JSON, signed with HMAC-SHA256 in the
//!   `X-Periscope-Signature` header when a secret is configured
//! - `slack`: an incoming-webhook message with one field per fact
//! - `msteams`: a legacy `MessageCard` with one fact per fact

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use periscope_core::{WebhookConfig, WebhookProvider};
use serde_json::{json, Value};
use sha2::Sha256;

use super::{NotificationSink, NotifyError, QueryNotification};
use crate::constants::{
    SIGNATURE_HEADER, USER_AGENT, WEBHOOK_INITIAL_BACKOFF_MS, WEBHOOK_MAX_ATTEMPTS,
};

const MSTEAMS_THEME_COLOR: &str = "118ab2";

/// Generate HMAC-SHA256 signature for a webhook payload.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, NotifyError> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| NotifyError::Signing(e.to_string()))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Render a notification in the provider's format.
pub fn render_payload(provider: WebhookProvider, notification: &QueryNotification) -> Result<Value, NotifyError> {
    match provider {
        WebhookProvider::Generic => Ok(serde_json::to_value(notification)?),
        WebhookProvider::Slack => Ok(slack_payload(notification)),
        WebhookProvider::MsTeams => Ok(msteams_payload(notification)),
    }
}

fn title(notification: &QueryNotification) -> String {
    format!(
        "{} query for {} on {}",
        notification.query.query_type.display_name(),
        notification.query.query_target,
        notification.query.query_location
    )
}

fn slack_payload(notification: &QueryNotification) -> Value {
    let fields: Vec<Value> = notification
        .facts()
        .into_iter()
        .map(|(name, value)| json!({"type": "mrkdwn", "text": format!("*{}*\n{}", name, value)}))
        .collect();

    // Slack caps a section at ten fields.
    let sections: Vec<Value> = fields
        .chunks(10)
        .map(|chunk| json!({"type": "section", "fields": chunk}))
        .collect();

    let mut blocks = vec![json!({
        "type": "header",
        "text": {"type": "plain_text", "text": "Periscope Query"},
    })];
    blocks.extend(sections);

    json!({
        "text": title(notification),
        "blocks": blocks,
    })
}

fn msteams_payload(notification: &QueryNotification) -> Value {
    let facts: Vec<Value> = notification
        .facts()
        .into_iter()
        .map(|(name, value)| json!({"name": name, "value": value}))
        .collect();

    json!({
        "@type": "MessageCard",
        "@context": "https://schema.org/extensions",
        "themeColor": MSTEAMS_THEME_COLOR,
        "summary": title(notification),
        "sections": [{
            "activityTitle": "Periscope Query",
            "activitySubtitle": title(notification),
            "facts": facts,
        }],
    })
}

/// Delivers notifications to a configured webhook.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    async fn post_once(&self, body: &[u8], signature: Option<&str>) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json");
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, format!("sha256={}", signature));
        }

        let response = request.body(body.to_vec()).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, notification: &QueryNotification) -> Result<(), NotifyError> {
        let payload = render_payload(self.config.provider, notification)?;
        let body = serde_json::to_vec(&payload)?;

        let signature = match (&self.config.secret, self.config.provider) {
            (Some(secret), WebhookProvider::Generic) => Some(sign_payload(&body, secret)?),
            _ => None,
        };

        // Retry with exponential backoff.
        let mut delay = Duration::from_millis(WEBHOOK_INITIAL_BACKOFF_MS);
        let mut last_error = None;
        for attempt in 1..=WEBHOOK_MAX_ATTEMPTS {
            match self.post_once(&body, signature.as_deref()).await {
                Ok(()) => {
                    tracing::debug!(
                        provider = self.config.provider.as_str(),
                        attempt,
                        "Webhook delivered"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        provider = self.config.provider.as_str(),
                        attempt,
                        error = %e,
                        "Webhook delivery attempt failed"
                    );
                    last_error = Some(e);
                }
            }
            if attempt < WEBHOOK_MAX_ATTEMPTS {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| NotifyError::Http("no delivery attempted".to_string())))
    }

    fn name(&self) -> &'static str {
        self.config.provider.as_str()
    }
}
