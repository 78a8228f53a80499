//! Configuration management for platform-events
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::auth::{Credentials, LoginMechanism};
use crate::consumer::ConsumerSettings;
use crate::error::Error;
use crate::subscription::ReplayStart;

/// Largest batch the broker accepts per fetch.
pub const MAX_BATCH_SIZE: i32 = 100;

/// Main configuration structure for platform-events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Topic to consume or publish to (e.g. `/event/Order_Event__e`)
    #[serde(default)]
    pub topic: String,

    /// Pub/Sub API endpoint (`host:port`, or a URI with scheme)
    #[serde(default = "default_grpc_endpoint")]
    pub grpc_endpoint: String,

    /// Events requested per fetch (1..=100)
    #[serde(default = "default_batch_size")]
    pub batch_size: i32,

    /// Bound on every network call (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Start position when no cursor is stored
    #[serde(default)]
    pub replay_preset: ReplayStart,

    /// Base64 cursor used when the store holds none
    #[serde(default)]
    pub replay_id: Option<String>,

    /// Credential exchange settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Replay cursor persistence
    #[serde(default)]
    pub cursor: CursorConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reconnect policy of the consume command
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_grpc_endpoint() -> String {
    "api.pubsub.salesforce.com:7443".to_string()
}

fn default_batch_size() -> i32 {
    50
}

fn default_timeout_seconds() -> u64 {
    5
}

/// OAuth settings
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Grant used for the exchange
    #[serde(default)]
    pub mechanism: LoginMechanism,

    /// OAuth server base URL
    #[serde(default = "default_auth_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Required by the password grant
    #[serde(default)]
    pub username: String,

    /// Required by the password grant
    #[serde(default)]
    pub password: String,
}

fn default_auth_endpoint() -> String {
    "https://login.salesforce.com".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mechanism: LoginMechanism::default(),
            endpoint: default_auth_endpoint(),
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("mechanism", &self.mechanism)
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Cursor store backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CursorBackend {
    /// In-process only; lost on restart
    #[default]
    Memory,
    /// sled database on local disk
    Sled,
}

impl std::str::FromStr for CursorBackend {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sled" => Ok(Self::Sled),
            other => Err(Error::Config(format!("unsupported cursor backend: {other}"))),
        }
    }
}

/// Replay cursor persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorConfig {
    #[serde(default)]
    pub backend: CursorBackend,

    /// sled database directory; defaults to the user data directory
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Name of the key/value store holding cursors
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Key of this consumer's cursor; defaults to the topic name
    #[serde(default)]
    pub key: Option<String>,
}

fn default_store_name() -> String {
    "replay".to_string()
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            backend: CursorBackend::default(),
            path: None,
            store_name: default_store_name(),
            key: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text
    #[serde(default)]
    pub json_format: bool,

    /// Also append logs to this file
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

/// Backoff between reconnect attempts of the consume command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// 0 = retry forever
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: 0,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            topic: String::new(),
            grpc_endpoint: default_grpc_endpoint(),
            batch_size: default_batch_size(),
            timeout_seconds: default_timeout_seconds(),
            replay_preset: ReplayStart::default(),
            replay_id: None,
            auth: AuthConfig::default(),
            cursor: CursorConfig::default(),
            logging: LoggingConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(topic) = std::env::var("PLATFORM_EVENTS_TOPIC") {
            self.topic = topic;
        }

        if let Ok(endpoint) = std::env::var("PLATFORM_EVENTS_GRPC_ENDPOINT") {
            self.grpc_endpoint = endpoint;
        }

        if let Ok(batch_size) = std::env::var("PLATFORM_EVENTS_BATCH_SIZE") {
            if let Ok(value) = batch_size.parse() {
                self.batch_size = value;
            } else {
                tracing::warn!("Invalid PLATFORM_EVENTS_BATCH_SIZE: {}", batch_size);
            }
        }

        if let Ok(timeout) = std::env::var("PLATFORM_EVENTS_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid PLATFORM_EVENTS_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(preset) = std::env::var("PLATFORM_EVENTS_REPLAY_PRESET") {
            match preset.parse() {
                Ok(value) => self.replay_preset = value,
                Err(_) => tracing::warn!("Invalid replay preset: {}, using configured", preset),
            }
        }

        if let Ok(mechanism) = std::env::var("PLATFORM_EVENTS_AUTH_MECHANISM") {
            match mechanism.parse() {
                Ok(value) => self.auth.mechanism = value,
                Err(_) => tracing::warn!("Invalid login mechanism: {}, using configured", mechanism),
            }
        }

        if let Ok(endpoint) = std::env::var("PLATFORM_EVENTS_AUTH_ENDPOINT") {
            self.auth.endpoint = endpoint;
        }

        if let Ok(client_id) = std::env::var("PLATFORM_EVENTS_CLIENT_ID") {
            self.auth.client_id = client_id;
        }

        if let Ok(client_secret) = std::env::var("PLATFORM_EVENTS_CLIENT_SECRET") {
            self.auth.client_secret = client_secret;
        }

        if let Ok(username) = std::env::var("PLATFORM_EVENTS_USERNAME") {
            self.auth.username = username;
        }

        if let Ok(password) = std::env::var("PLATFORM_EVENTS_PASSWORD") {
            self.auth.password = password;
        }

        if let Ok(backend) = std::env::var("PLATFORM_EVENTS_CURSOR_BACKEND") {
            match backend.parse() {
                Ok(value) => self.cursor.backend = value,
                Err(_) => tracing::warn!("Invalid cursor backend: {}, using configured", backend),
            }
        }

        if let Ok(path) = std::env::var("PLATFORM_EVENTS_CURSOR_PATH") {
            self.cursor.path = Some(PathBuf::from(path));
        }

        if let Ok(level) = std::env::var("PLATFORM_EVENTS_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("PLATFORM_EVENTS_JSON_LOGS") {
            match json_logs.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.logging.json_format = true,
                "false" | "0" | "no" => self.logging.json_format = false,
                _ => {
                    tracing::warn!(
                        "Invalid value for PLATFORM_EVENTS_JSON_LOGS: {}",
                        json_logs
                    )
                }
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }

        if let Some(topic) = cli.command.topic_override() {
            self.topic = topic.to_string();
        }

        if let crate::cli::Commands::Consume {
            batch_size: Some(batch_size),
            ..
        } = &cli.command
        {
            self.batch_size = *batch_size;
        }
    }

    /// Validate the configuration
    ///
    /// The topic is not checked here; commands that need one call
    /// [`Config::require_topic`].
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.grpc_endpoint.trim().is_empty() {
            return Err(Error::Config("grpc_endpoint cannot be empty".to_string()).into());
        }

        if self.auth.endpoint.trim().is_empty() {
            return Err(Error::Config("auth.endpoint cannot be empty".to_string()).into());
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(Error::Config(format!(
                "batch_size must be between 1 and {}",
                MAX_BATCH_SIZE
            ))
            .into());
        }

        if self.timeout_seconds == 0 {
            return Err(
                Error::Config("timeout_seconds must be greater than 0".to_string()).into(),
            );
        }

        if self.auth.mechanism.requires_user_credentials()
            && (self.auth.username.is_empty() || self.auth.password.is_empty())
        {
            return Err(Error::Config(format!(
                "auth.username and auth.password are required by the {} mechanism",
                self.auth.mechanism.as_str()
            ))
            .into());
        }

        let replay_id = self.initial_replay_id()?;
        if self.replay_preset == ReplayStart::Custom
            && replay_id.is_none()
            && self.cursor.backend == CursorBackend::Memory
        {
            return Err(Error::Config(
                "replay_preset custom requires replay_id or a persistent cursor backend"
                    .to_string(),
            )
            .into());
        }

        if self.cursor.store_name.trim().is_empty() {
            return Err(Error::Config("cursor.store_name cannot be empty".to_string()).into());
        }

        if self.reconnect.initial_backoff_ms == 0
            || self.reconnect.max_backoff_ms < self.reconnect.initial_backoff_ms
        {
            return Err(Error::Config(
                "reconnect backoff must satisfy 0 < initial_backoff_ms <= max_backoff_ms"
                    .to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Returns the topic, failing when none is configured.
    pub fn require_topic(&self) -> Result<&str> {
        if self.topic.trim().is_empty() {
            return Err(Error::Config(
                "topic is required (config `topic`, PLATFORM_EVENTS_TOPIC, or --topic)"
                    .to_string(),
            )
            .into());
        }
        Ok(&self.topic)
    }

    /// Bound on every network call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Credentials for the OAuth exchange.
    pub fn credentials(&self) -> Result<Credentials> {
        if self.auth.client_id.trim().is_empty() {
            return Err(Error::Config("auth.client_id cannot be empty".to_string()).into());
        }
        Ok(Credentials {
            mechanism: self.auth.mechanism,
            endpoint: self.auth.endpoint.clone(),
            client_id: self.auth.client_id.clone(),
            client_secret: self.auth.client_secret.clone(),
            username: self.auth.username.clone(),
            password: self.auth.password.clone(),
        })
    }

    /// Decodes the configured `replay_id`.
    pub fn initial_replay_id(&self) -> Result<Option<Vec<u8>>> {
        match self.replay_id.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(encoded) => BASE64
                .decode(encoded)
                .map(Some)
                .map_err(|e| Error::Config(format!("replay_id is not valid base64: {}", e)).into()),
        }
    }

    /// Key of this consumer's cursor in the store.
    pub fn cursor_key(&self) -> String {
        self.cursor
            .key
            .clone()
            .unwrap_or_else(|| self.topic.clone())
    }

    /// Settings for [`crate::consumer::Consumer::connect`].
    pub fn consumer_settings(&self) -> Result<ConsumerSettings> {
        Ok(ConsumerSettings {
            credentials: self.credentials()?,
            topic: self.require_topic()?.to_string(),
            batch_size: self.batch_size,
            timeout: self.timeout(),
            start: self.replay_preset,
            initial_replay_id: self.initial_replay_id()?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
