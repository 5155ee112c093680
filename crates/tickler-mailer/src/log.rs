use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::transport::{MailTransport, SendReport};

/// Development transport: writes each mail to the log and accepts it.
pub struct LogTransport {
    from: String,
}

impl LogTransport {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl MailTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SendReport> {
        let message_id = format!("<{}@tickler.log>", Uuid::new_v4());
        info!(from = %self.from, %to, %subject, %message_id, body_len = body.len(), "mail logged (not sent)");
        Ok(SendReport::accepted(to, message_id))
    }
}
