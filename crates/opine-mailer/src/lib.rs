//! Email delivery for Opine.
//!
//! The sweep hands over a plain `EmailMessage` and gets back the provider's
//! message id, which the notification ledger stores. Deployments without a
//! provider configured run the null mailer, which accepts everything and
//! sends nothing.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// What the delivery provider receives.
#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub tags: Vec<String>,
}

/// What a successful delivery hands back.
#[derive(Debug, Clone)]
pub struct EmailReceipt {
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    id: String,
}

pub enum Mailer {
    Http(HttpMailer),
    /// Accepts everything, sends nothing. Dev mode and tests.
    Null,
}

impl Mailer {
    pub fn http(api_url: String, api_key: String, from: String) -> Self {
        Mailer::Http(HttpMailer {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            from,
        })
    }

    pub async fn send(&self, msg: &EmailMessage) -> Result<EmailReceipt> {
        match self {
            Mailer::Http(mailer) => mailer.send(msg).await,
            Mailer::Null => {
                debug!("Null mailer: dropping {:?} to {}", msg.subject, msg.to);
                Ok(EmailReceipt {
                    message_id: format!("null-{}", Uuid::new_v4()),
                })
            }
        }
    }
}

/// JSON-over-HTTP provider client (Resend-style API).
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    async fn send(&self, msg: &EmailMessage) -> Result<EmailReceipt> {
        #[derive(Serialize)]
        struct Payload<'a> {
            from: &'a str,
            to: &'a str,
            subject: &'a str,
            html: &'a str,
            text: &'a str,
            tags: &'a [String],
        }

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&Payload {
                from: &self.from,
                to: &msg.to,
                subject: &msg.subject,
                html: &msg.html,
                text: &msg.text,
                tags: &msg.tags,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("mail provider returned {}: {}", status, body));
        }

        let parsed: ProviderResponse = response.json().await?;
        Ok(EmailReceipt {
            message_id: parsed.id,
        })
    }
}
