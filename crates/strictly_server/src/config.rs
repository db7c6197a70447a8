//! Server configuration.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Runtime settings for the game server.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    host: String,

    /// Port to listen on.
    port: u16,

    /// Outbound messages buffered per connection before senders wait.
    outbound_capacity: usize,

    /// Commands buffered per game session before senders wait.
    session_capacity: usize,

    /// Longest accepted line, in bytes.
    max_line_length: usize,

    /// Longest accepted display name, in characters.
    max_name_length: usize,

    /// Drop connections silent for this many seconds. Unset disables the reaper.
    idle_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5555,
            outbound_capacity: 64,
            session_capacity: 32,
            max_line_length: 64 * 1024,
            max_name_length: 32,
            idle_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        info!(host = %config.host, port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Overrides the bind host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Overrides the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the idle timeout.
    pub fn with_idle_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Overrides the per-connection outbound capacity.
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Checks values that would make the server unusable.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_capacity == 0 || self.session_capacity == 0 {
            return Err(ConfigError::new(
                "Queue capacities must be at least 1".to_string(),
            ));
        }
        if self.max_name_length == 0 {
            return Err(ConfigError::new(
                "max_name_length must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout_secs == Some(0) {
            return Err(ConfigError::new(
                "idle_timeout_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves host and port to a socket address.
    #[instrument(skip(self))]
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::new(format!("Invalid bind address: {}", e)))
    }

    /// Idle timeout as a duration.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
