//! Configuration module for sockbridge
//!
//! Supports a JSON configuration file; the CLI can fill in or override the
//! two addresses.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::BridgeConfig;
use crate::common::Address;
use crate::error::{Error, Result};
use crate::transport::DialerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Address to accept connections on (`host:port` or `unix:<path>`)
    #[serde(default)]
    pub listen: String,

    /// Address every connection is bridged to
    #[serde(default)]
    pub forward: String,

    /// Timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Socket file handling for a Unix listen address
    #[serde(default)]
    pub unix: UnixSocketConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Configuration with default timeouts for a pair of addresses
    pub fn from_args(listen: impl Into<String>, forward: impl Into<String>) -> Self {
        Self {
            log: LogConfig::default(),
            listen: listen.into(),
            forward: forward.into(),
            timeouts: TimeoutConfig::default(),
            unix: UnixSocketConfig::default(),
        }
    }

    /// Example configuration exposing a Unix socket service over TCP
    pub fn example() -> Self {
        Self::from_args("127.0.0.1:9222", "unix:/tmp/chrome-run/.devtools.sock")
    }

    pub fn listen_address(&self) -> Result<Address> {
        parse_address("listen", &self.listen)
    }

    pub fn forward_address(&self) -> Result<Address> {
        parse_address("forward", &self.forward)
    }

    /// Check addresses and timeouts
    pub fn validate(&self) -> Result<()> {
        self.listen_address()?;
        self.forward_address()?;

        if self.timeouts.idle_secs == 0 {
            return Err(Error::Config("timeouts.idle_secs must be positive".into()));
        }
        if self.timeouts.connect_secs == 0 {
            return Err(Error::Config("timeouts.connect_secs must be positive".into()));
        }
        if self.unix.mode > 0o7777 {
            return Err(Error::Config(format!(
                "unix.mode {:o} is not a permission mode",
                self.unix.mode
            )));
        }
        Ok(())
    }

    /// Bridge settings derived from the timeouts
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            idle_timeout: Duration::from_secs(self.timeouts.idle_secs),
            grace_period: Duration::from_millis(self.timeouts.grace_millis),
        }
    }

    /// Dialer settings derived from the timeouts
    pub fn dialer_config(&self) -> DialerConfig {
        DialerConfig {
            connect_timeout: Duration::from_secs(self.timeouts.connect_secs),
            keep_alive: match self.timeouts.keep_alive_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    if value.is_empty() {
        return Err(Error::Config(format!("{} address is not set", field)));
    }
    value.parse()
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Idle timeout for each read and write, in seconds
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,

    /// Outbound connect timeout, in seconds
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    /// TCP keep-alive interval, in seconds (0 disables)
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Delay between a direction finishing and closing both legs, in milliseconds
    #[serde(default = "default_grace_millis")]
    pub grace_millis: u64,
}

fn default_idle_secs() -> u64 {
    300
}

fn default_connect_secs() -> u64 {
    5
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_grace_millis() -> u64 {
    1000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            idle_secs: default_idle_secs(),
            connect_secs: default_connect_secs(),
            keep_alive_secs: default_keep_alive_secs(),
            grace_millis: default_grace_millis(),
        }
    }
}

/// Unix listen socket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnixSocketConfig {
    /// Permission bits for the socket file
    #[serde(default = "default_socket_mode")]
    pub mode: u32,

    /// Remove a leftover socket file before binding
    #[serde(default = "default_remove_stale")]
    pub remove_stale: bool,
}

fn default_socket_mode() -> u32 {
    0o777
}

fn default_remove_stale() -> bool {
    true
}

impl Default for UnixSocketConfig {
    fn default() -> Self {
        Self {
            mode: default_socket_mode(),
            remove_stale: default_remove_stale(),
        }
    }
}
