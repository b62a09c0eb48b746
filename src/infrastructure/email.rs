use super::outbound::{build_client, error_body, send_with_retry, SendError};
use crate::domain::{BuildStatus, Plan};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const RESEND_API_BASE: &str = "https://api.resend.com";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Email request failed: {0}")]
    RequestFailed(String),
    #[error("Email provider rate limited")]
    RateLimited,
    #[error("Email provider rejected the message: {0}")]
    Rejected(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<SendError> for NotifyError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::RateLimited => NotifyError::RateLimited,
            SendError::Transport(msg) => NotifyError::RequestFailed(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    IdeaGenerated {
        title: String,
        description: String,
        score: f64,
    },
    BuildComplete {
        idea_title: String,
        status: BuildStatus,
        url: Option<String>,
    },
    SubscriptionUpdate {
        plan: Plan,
        status: String,
    },
}

impl Notification {
    pub fn subject(&self) -> String {
        match self {
            Notification::IdeaGenerated { title, .. } => format!("Your new idea: {}", title),
            Notification::BuildComplete {
                idea_title, status, ..
            } => match status {
                BuildStatus::Success => format!("{} is live", idea_title),
                _ => format!("Build {} for {}", status, idea_title),
            },
            Notification::SubscriptionUpdate { plan, status } => {
                format!("Your {} subscription is {}", plan.display_name(), status)
            }
        }
    }

    pub fn html(&self) -> String {
        match self {
            Notification::IdeaGenerated {
                title,
                description,
                score,
            } => format!(
                "<h1>{}</h1><p>{}</p><p>Score: <strong>{:.0}</strong>/100</p>",
                escape(title),
                escape(description),
                score
            ),
            Notification::BuildComplete {
                idea_title,
                status,
                url,
            } => {
                let link = url
                    .as_deref()
                    .map(|u| format!("<p><a href=\"{0}\">{0}</a></p>", escape(u)))
                    .unwrap_or_default();
                format!(
                    "<h1>{}</h1><p>Build finished with status <strong>{}</strong>.</p>{}",
                    escape(idea_title),
                    status,
                    link
                )
            }
            Notification::SubscriptionUpdate { plan, status } => format!(
                "<p>Your plan is now <strong>{}</strong> ({}).</p>",
                plan.display_name(),
                escape(status)
            ),
        }
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: String, notification: Notification) -> Result<(), NotifyError>;
}

pub struct ResendClient {
    client: Client,
    base_url: String,
    from: String,
}

impl ResendClient {
    pub fn new(api_key: &str, from: String, timeout: Duration) -> Result<Self, NotifyError> {
        let mut headers = header::HeaderMap::new();
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| NotifyError::InvalidConfig(format!("Invalid API key format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);

        let client = build_client(headers, timeout)
            .map_err(|e| NotifyError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: RESEND_API_BASE.to_string(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for ResendClient {
    async fn send(&self, to: String, notification: Notification) -> Result<(), NotifyError> {
        let body = json!({
            "from": self.from,
            "to": [to],
            "subject": notification.subject(),
            "html": notification.html(),
        });
        let url = format!("{}/emails", self.base_url);

        let resp = send_with_retry(|| self.client.post(&url).json(&body)).await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Rejected(error_body(resp).await));
        }

        Ok(())
    }
}
