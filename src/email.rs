use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProviderError;

#[derive(Clone, Debug, Serialize)]
pub struct Attachment {
    pub filename: String,
    /// Base64 encoded file body.
    pub content: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait EmailGateway: Send + Sync {
    async fn send(&self, api_key: &str, email: &OutgoingEmail) -> Result<(), ProviderError>;
}

/// Resend transactional email API.
pub struct ResendClient {
    http: reqwest::Client,
    url: String,
}

impl ResendClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl EmailGateway for ResendClient {
    async fn send(&self, api_key: &str, email: &OutgoingEmail) -> Result<(), ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("resend api key missing"));
        }

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(email)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        log::info!("Email '{}' accepted by provider", email.subject);
        Ok(())
    }
}

/// `Name <address>`, or the bare address when no display name is set.
pub fn sender(name: &str, address: &str) -> String {
    if name.trim().is_empty() {
        address.trim().to_string()
    } else {
        format!("{} <{}>", name.trim(), address.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_formats_display_name() {
        assert_eq!(sender("Klinik", "info@example.com"), "Klinik <info@example.com>");
        assert_eq!(sender(" ", "info@example.com"), "info@example.com");
    }

    #[test]
    fn attachments_are_omitted_when_empty() {
        let email = OutgoingEmail {
            from: "a@example.com".into(),
            to: "b@example.com".into(),
            subject: "Hi".into(),
            html: "<p>Hi</p>".into(),
            attachments: Vec::new(),
        };
        let json = serde_json::to_value(&email).unwrap();
        assert!(json.get("attachments").is_none());
        assert_eq!(json["to"], "b@example.com");
    }
}
