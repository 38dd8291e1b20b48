//! Configuration system for eventlink
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (EVENTLINK_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{ClientConfig, Cookies};
use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventlinkConfig {
    /// Client behaviour
    pub client: ClientSettings,

    /// Connection target
    pub session: SessionSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Client behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Receive-loop interval in milliseconds (0 = no background loop)
    pub auto_receive_interval_ms: u64,

    /// Reconnect automatically after the connection is lost
    pub auto_reconnect: bool,

    /// Delay before a reconnect attempt in milliseconds
    pub auto_reconnect_delay_ms: u64,

    /// Handshake timeout in milliseconds (0 = unbounded)
    pub connect_timeout_ms: u64,

    /// Read chunk size in bytes
    pub buffer_size_bytes: usize,
}

/// Connection target settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Server WebSocket URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Heartbeat sent on every receive-loop iteration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<String>,

    /// Cookies presented during the handshake
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub cookies: BTreeMap<String, String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            auto_receive_interval_ms: 5000,
            auto_reconnect: true,
            auto_reconnect_delay_ms: 5000,
            connect_timeout_ms: 0,
            buffer_size_bytes: 8192,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl ClientSettings {
    /// Client configuration for these settings
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            auto_receive_interval: Duration::from_millis(self.auto_receive_interval_ms),
            auto_reconnect: self.auto_reconnect,
            auto_reconnect_delay: Duration::from_millis(self.auto_reconnect_delay_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            buffer_size: self.buffer_size_bytes,
        }
        .normalized()
    }
}

impl SessionSettings {
    pub fn cookies(&self) -> Cookies {
        self.cookies
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl EventlinkConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            // Current directory
            PathBuf::from("eventlink.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("eventlink").join("config.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".eventlink").join("config.toml"))
                .unwrap_or_default(),
            // System config (Linux)
            PathBuf::from("/etc/eventlink/config.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Client settings
        if let Some(n) = env_parse("EVENTLINK_AUTO_RECEIVE_INTERVAL_MS") {
            self.client.auto_receive_interval_ms = n;
        }
        if let Some(flag) = env_flag("EVENTLINK_AUTO_RECONNECT") {
            self.client.auto_reconnect = flag;
        }
        if let Some(n) = env_parse("EVENTLINK_AUTO_RECONNECT_DELAY_MS") {
            self.client.auto_reconnect_delay_ms = n;
        }
        if let Some(n) = env_parse("EVENTLINK_CONNECT_TIMEOUT_MS") {
            self.client.connect_timeout_ms = n;
        }
        if let Some(n) = env_parse("EVENTLINK_BUFFER_SIZE_BYTES") {
            self.client.buffer_size_bytes = n;
        }

        // Session settings
        if let Ok(val) = std::env::var("EVENTLINK_URI") {
            self.session.uri = Some(val);
        }
        if let Ok(val) = std::env::var("EVENTLINK_HEARTBEAT") {
            self.session.heartbeat = Some(val);
        }

        // Logging settings
        if let Ok(val) = std::env::var("EVENTLINK_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("EVENTLINK_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Some(flag) = env_flag("EVENTLINK_LOG_JSON") {
            self.logging.json_format = flag;
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(uri) = &self.session.uri {
            if !uri.starts_with("ws://") && !uri.starts_with("wss://") {
                return Err(Error::config_field_invalid(
                    "session.uri",
                    "Session URI must start with ws:// or wss://",
                ));
            }
            if url::Url::parse(uri).is_err() {
                return Err(Error::config_field_invalid(
                    "session.uri",
                    format!("Session URI '{}' is not a valid URL", uri),
                ));
            }
        }

        if self.client.buffer_size_bytes == 0 {
            return Err(Error::config_field_invalid(
                "client.buffer_size_bytes",
                "buffer_size_bytes must be greater than 0",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|val| val.parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|val| val.to_lowercase() == "true" || val == "1")
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location written by `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".eventlink")
        .join("config.toml")
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| Error::IoWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    fs::write(&config_path, generate_default_config()).map_err(|source| Error::IoWrite {
        path: config_path.clone(),
        source,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# eventlink configuration

[client]
# Receive-loop interval in milliseconds. Bounds every idle read and paces
# the heartbeat. 0 disables the background loop.
auto_receive_interval_ms = 5000

# Reconnect automatically after the connection is lost
auto_reconnect = true

# Delay before a reconnect attempt in milliseconds
auto_reconnect_delay_ms = 5000

# Handshake timeout in milliseconds (0 = unbounded)
connect_timeout_ms = 0

# Read chunk size in bytes
buffer_size_bytes = 8192

[session]
# Server WebSocket URI
# uri = "wss://example.com/events"

# Heartbeat sent on every receive-loop iteration
# heartbeat = "PING"

# Cookies presented during the handshake
[session.cookies]
# session = "token"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.eventlink/logs/eventlink.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = EventlinkConfig::default();
        assert_eq!(config.client.auto_receive_interval_ms, 5000);
        assert!(config.client.auto_reconnect);
        assert_eq!(config.client.buffer_size_bytes, 8192);
        assert!(config.session.uri.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_override() {
        env::set_var("EVENTLINK_URI", "wss://test.example.com/feed");
        env::set_var("EVENTLINK_AUTO_RECEIVE_INTERVAL_MS", "250");
        env::set_var("EVENTLINK_AUTO_RECONNECT", "false");

        let mut config = EventlinkConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.session.uri.as_deref(), Some("wss://test.example.com/feed"));
        assert_eq!(config.client.auto_receive_interval_ms, 250);
        assert!(!config.client.auto_reconnect);

        env::remove_var("EVENTLINK_URI");
        env::remove_var("EVENTLINK_AUTO_RECEIVE_INTERVAL_MS");
        env::remove_var("EVENTLINK_AUTO_RECONNECT");
    }

    #[test]
    fn test_unparseable_env_is_ignored() {
        env::set_var("EVENTLINK_CONNECT_TIMEOUT_MS", "soon");
        let mut config = EventlinkConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.client.connect_timeout_ms, 0);
        env::remove_var("EVENTLINK_CONNECT_TIMEOUT_MS");
    }

    #[test]
    fn test_validation_invalid_uri() {
        let mut config = EventlinkConfig::default();
        config.session.uri = Some("http://invalid.com".to_string());
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigValidation { field: Some(ref f), .. } if f == "session.uri"
        ));
    }

    #[test]
    fn test_validation_zero_buffer() {
        let mut config = EventlinkConfig::default();
        config.client.buffer_size_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = EventlinkConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_valid_config() {
        let mut config = EventlinkConfig::default();
        config.session.uri = Some("ws://localhost:9000/events".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_conversion() {
        let settings = ClientSettings {
            auto_receive_interval_ms: 0,
            auto_reconnect_delay_ms: 0,
            ..ClientSettings::default()
        };
        let client = settings.to_client_config();
        assert!(!client.receive_loop_enabled());
        assert_eq!(client.auto_reconnect_delay, Duration::from_millis(5000));
        assert!(client.auto_reconnect);
    }

    #[test]
    fn test_default_file_parses() {
        let config: EventlinkConfig = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.client.auto_receive_interval_ms, 5000);
        assert!(config.session.cookies.is_empty());
    }

    #[test]
    fn test_parse_config_file() {
        let config_str = r#"
[client]
auto_receive_interval_ms = 1000
auto_reconnect = false

[session]
uri = "wss://custom.example.com/events"
heartbeat = "PING"

[session.cookies]
session = "abc"
lang = "en"

[logging]
level = "debug"
"#;

        let config: EventlinkConfig = toml::from_str(config_str).unwrap();

        assert_eq!(config.client.auto_receive_interval_ms, 1000);
        assert!(!config.client.auto_reconnect);
        assert_eq!(config.client.buffer_size_bytes, 8192);
        assert_eq!(config.session.uri.as_deref(), Some("wss://custom.example.com/events"));
        assert_eq!(config.session.heartbeat.as_deref(), Some("PING"));
        assert_eq!(
            config.session.cookies().header_value().as_deref(),
            Some("lang=en; session=abc")
        );
        assert_eq!(config.logging.level, "debug");
    }
}
