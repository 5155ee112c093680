use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The relay's verdict for one mail.
///
/// An address in `rejected` means the relay refused it; an address in
/// `accepted` means it was handed off. A report with both lists empty is
/// malformed and callers treat it as a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReport {
    #[serde(default)]
    pub accepted: Vec<String>,
    #[serde(default)]
    pub rejected: Vec<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

impl SendReport {
    pub fn accepted(to: &str, message_id: impl Into<String>) -> Self {
        Self {
            accepted: vec![to.to_string()],
            rejected: Vec::new(),
            message_id: Some(message_id.into()),
        }
    }

    pub fn rejected(to: &str) -> Self {
        Self {
            accepted: Vec::new(),
            rejected: vec![to.to_string()],
            message_id: None,
        }
    }
}

/// Common interface for outbound mail.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &str;

    /// Send one plain-text mail. `Err` means a transport fault; a refused
    /// address comes back as `Ok` with the address in `rejected`.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SendReport>;
}
