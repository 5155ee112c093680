use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tickler_core::config::MailConfig;
use tracing::{debug, warn};

use crate::error::{MailError, Result};
use crate::transport::{MailTransport, SendReport};

/// Sends mail through an HTTP relay.
///
/// Request: `POST {endpoint}` with `{"from","to","subject","text"}`.
/// Response: `{"accepted": [..], "rejected": [..], "messageId": ".."}`.
pub struct HttpMailTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailTransport {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        from: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            from,
        })
    }

    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| MailError::Config("mail.endpoint is required for the http transport".into()))?;
        Self::new(
            endpoint,
            config.api_key.clone(),
            config.from.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SendReport> {
        let request = RelayRequest {
            from: &self.from,
            to,
            subject,
            text: body,
        };

        debug!(endpoint = %self.endpoint, %to, "posting mail to relay");

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        let resp = builder.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "mail relay error");
            return Err(MailError::Api {
                status,
                message: text,
            });
        }

        resp.json::<SendReport>()
            .await
            .map_err(|e| MailError::Parse(e.to_string()))
    }
}
