//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::{ChannelRetention, SessionPolicy};

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Connection registry and fan-out engine tuning
    pub hub: HubSettings,

    /// WebSocket transport configuration
    pub websocket: WebSocketSettings,

    /// JWT authentication settings
    pub jwt: JwtSettings,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// Hub configuration consumed by the registry, index, fan-out engine and
/// presence monitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Maximum publish payload in bytes
    pub max_payload_bytes: usize,

    /// Expected client heartbeat interval; a session silent for this long
    /// becomes pending eviction
    pub heartbeat_interval_ms: u64,

    /// Grace period between pending eviction and eviction
    pub eviction_grace_ms: u64,

    /// How often the presence monitor sweeps the registry
    pub presence_sweep_ms: u64,

    /// Per-target delivery bound
    pub delivery_timeout_ms: u64,

    /// Maximum concurrent deliveries per publish
    pub fanout_concurrency: usize,

    /// Bound on acquiring a session lock before the operation is retried
    pub lock_timeout_ms: u64,

    /// Empty-channel retention policy
    pub channel_retention: ChannelRetention,

    /// Multiple-sessions-per-user policy
    pub session_policy: SessionPolicy,

    /// Deliver a publisher's own messages back to its session
    pub echo_to_sender: bool,

    /// Capacity of the hub event broadcast channel
    pub event_buffer: usize,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum inbound message size in bytes
    pub max_message_size: usize,

    /// Time allowed between connect and Identify, in seconds
    pub identify_timeout_secs: u64,

    /// Bounded outbound queue per connection
    pub outbound_queue_size: usize,
}

/// JWT authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key used to verify tokens
    pub secret: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_payload_bytes: 65536,
            heartbeat_interval_ms: 45000,
            eviction_grace_ms: 10000,
            presence_sweep_ms: 5000,
            delivery_timeout_ms: 5000,
            fanout_concurrency: 64,
            lock_timeout_ms: 50,
            channel_retention: ChannelRetention::Destroy,
            session_policy: SessionPolicy::Multiple,
            echo_to_sender: false,
            event_buffer: 1024,
        }
    }
}

impl HubSettings {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat interval sent to clients: three quarters of the timeout.
    pub fn advertised_heartbeat(&self) -> Duration {
        self.heartbeat_timeout() * 3 / 4
    }

    pub fn eviction_grace(&self) -> Duration {
        Duration::from_millis(self.eviction_grace_ms)
    }

    pub fn presence_sweep(&self) -> Duration {
        Duration::from_millis(self.presence_sweep_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Reject values the hub cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::Message(
                "hub.max_payload_bytes must be at least 1".into(),
            ));
        }
        if self.fanout_concurrency == 0 {
            return Err(ConfigError::Message(
                "hub.fanout_concurrency must be at least 1".into(),
            ));
        }
        if self.presence_sweep_ms == 0 {
            return Err(ConfigError::Message(
                "hub.presence_sweep_ms must be at least 1".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Message(
                "hub.event_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if a value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("log_format", "pretty")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("hub.max_payload_bytes", 65536_i64)? // 64KB
            .set_default("hub.heartbeat_interval_ms", 45000_i64)?
            .set_default("hub.eviction_grace_ms", 10000_i64)?
            .set_default("hub.presence_sweep_ms", 5000_i64)?
            .set_default("hub.delivery_timeout_ms", 5000_i64)?
            .set_default("hub.fanout_concurrency", 64_i64)?
            .set_default("hub.lock_timeout_ms", 50_i64)?
            .set_default("hub.channel_retention", "destroy")?
            .set_default("hub.session_policy", "multiple")?
            .set_default("hub.echo_to_sender", false)?
            .set_default("hub.event_buffer", 1024_i64)?
            .set_default("websocket.max_message_size", 65536_i64 + 4096)?
            .set_default("websocket.identify_timeout_secs", 30_i64)?
            .set_default("websocket.outbound_queue_size", 256_i64)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__HUB__FANOUT_CONCURRENCY=16 -> hub.fanout_concurrency = 16
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                settings.validate()?;
                Ok(settings)
            })
    }

    /// Validate cross-field constraints after deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate JWT secret length for security
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} characters for security. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                self.jwt.secret.len()
            )));
        }
        if self.websocket.outbound_queue_size == 0 {
            return Err(ConfigError::Message(
                "websocket.outbound_queue_size must be at least 1".into(),
            ));
        }
        self.hub.validate()
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
