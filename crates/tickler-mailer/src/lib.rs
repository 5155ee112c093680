//! `tickler-mailer`: outbound mail transports.
//!
//! The scheduler talks to mail only through [`MailTransport`]. Two
//! implementations ship here:
//!
//! | Transport            | Behaviour                                           |
//! |----------------------|-----------------------------------------------------|
//! | [`LogTransport`]     | Logs the mail and reports the address accepted      |
//! | [`HttpMailTransport`]| POSTs JSON to a mail relay and relays its verdict   |

pub mod error;
pub mod http;
pub mod log;
pub mod transport;

use std::sync::Arc;

use tickler_core::config::{MailConfig, MailTransportKind};

pub use error::{MailError, Result};
pub use http::HttpMailTransport;
pub use log::LogTransport;
pub use transport::{MailTransport, SendReport};

/// Build the transport selected in `[mail]`.
pub fn build_transport(config: &MailConfig) -> Result<Arc<dyn MailTransport>> {
    match config.transport {
        MailTransportKind::Log => Ok(Arc::new(LogTransport::new(config.from.clone()))),
        MailTransportKind::Http => Ok(Arc::new(HttpMailTransport::from_config(config)?)),
    }
}
