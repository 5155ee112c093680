use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Longest delay an in-process timer is trusted with (2^31 - 1 ms, ~24.8 days).
pub const DEFAULT_MAX_TIMEOUT_MS: u64 = 2_147_483_647;
pub const DEFAULT_QUEUE_POLL_MS: u64 = 1_000;
pub const DEFAULT_QUEUE_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_QUEUE_RETRY_DELAY_MS: u64 = 5_000;
pub const DEFAULT_QUEUE_LEASE_MS: u64 = 60_000;

/// Top-level config (tickler.toml + TICKLER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicklerConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Mechanism used for one-off reminders that fit under `max_timeout_ms`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OneOffMechanism {
    /// Durable delayed-queue entry. Survives restarts.
    #[default]
    Queue,
    /// In-process tokio timer. Lost on restart until recovery re-arms it.
    Timer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub one_off: OneOffMechanism,
    /// Delays above this always go through the durable queue.
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            one_off: OneOffMechanism::default(),
            max_timeout_ms: DEFAULT_MAX_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Attempts per job before it is dropped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// How long a claimed job stays invisible to other workers.
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_QUEUE_POLL_MS,
            max_attempts: DEFAULT_QUEUE_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_QUEUE_RETRY_DELAY_MS,
            lease_ms: DEFAULT_QUEUE_LEASE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailTransportKind {
    /// Log every mail instead of sending it.
    #[default]
    Log,
    /// POST to an HTTP mail relay.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub transport: MailTransportKind,
    #[serde(default = "default_from")]
    pub from: String,
    /// Relay URL, required for the `http` transport.
    pub endpoint: Option<String>,
    /// Sent as `Authorization: Bearer <api_key>` when set.
    pub api_key: Option<String>,
    #[serde(default = "default_mail_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: MailTransportKind::default(),
            from: default_from(),
            endpoint: None,
            api_key: None,
            timeout_ms: default_mail_timeout_ms(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_timeout_ms() -> u64 {
    DEFAULT_MAX_TIMEOUT_MS
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_QUEUE_POLL_MS
}
fn default_max_attempts() -> u32 {
    DEFAULT_QUEUE_MAX_ATTEMPTS
}
fn default_retry_delay_ms() -> u64 {
    DEFAULT_QUEUE_RETRY_DELAY_MS
}
fn default_lease_ms() -> u64 {
    DEFAULT_QUEUE_LEASE_MS
}
fn default_from() -> String {
    "reminders@localhost".to_string()
}
fn default_mail_timeout_ms() -> u64 {
    10_000
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tickler/tickler.db", home)
}

impl TicklerConfig {
    /// Load config from a TOML file with TICKLER_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `TICKLER_QUEUE__MAX_ATTEMPTS=5`.
    /// A missing file is not an error; every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config = Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::TicklerError::Config(e.to_string()))?;

        tracing::debug!(%path, "configuration loaded");
        Ok(config)
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TICKLER_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tickler/tickler.toml", home)
}
