//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `RENDEZVOUS_BIND_ADDR`: Listen address. Default: `0.0.0.0:3000`
//! - `RENDEZVOUS_OUTBOUND_BUFFER`: Per-connection outbound queue depth. Default: `64`
//! - `RENDEZVOUS_CORS_ORIGINS`: Comma-separated allowed origins for the HTTP
//!   endpoints. Default: permissive
//! - `RENDEZVOUS_LOG_FORMAT`: `pretty` or `json`. Default: `pretty`
//!
//! # Examples
//!
//! ```bash
//! RENDEZVOUS_BIND_ADDR=127.0.0.1:8080 cargo run -p rendezvous-server
//! ```

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Default per-connection outbound queue depth.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set to a value that cannot be used
    #[error("Invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        /// Environment variable name
        var: &'static str,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl LogFormat {
    /// Parse a log format from a string.
    ///
    /// Valid values (case-insensitive): "json"; anything else is Pretty.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }

    /// Read the log format from `RENDEZVOUS_LOG_FORMAT`.
    pub fn from_env() -> Self {
        std::env::var("RENDEZVOUS_LOG_FORMAT")
            .map(|s| Self::parse(&s))
            .unwrap_or_default()
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_addr: SocketAddr,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// Allowed CORS origins; empty means permissive
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load server configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr_str =
            lookup("RENDEZVOUS_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                var: "RENDEZVOUS_BIND_ADDR",
                value: bind_addr_str.clone(),
                reason: e.to_string(),
            })?;

        let outbound_buffer = match lookup("RENDEZVOUS_OUTBOUND_BUFFER") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) => {
                    return Err(ConfigError::InvalidValue {
                        var: "RENDEZVOUS_OUTBOUND_BUFFER",
                        value: raw,
                        reason: "must be greater than zero".to_string(),
                    })
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        var: "RENDEZVOUS_OUTBOUND_BUFFER",
                        value: raw,
                        reason: e.to_string(),
                    })
                }
            },
            None => DEFAULT_OUTBOUND_BUFFER,
        };

        let cors_origins = lookup("RENDEZVOUS_CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            outbound_buffer,
            cors_origins,
        })
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("Bind address: {}", self.bind_addr);
        info!("Outbound buffer per connection: {}", self.outbound_buffer);
        if self.cors_origins.is_empty() {
            info!("CORS: permissive");
        } else {
            info!("CORS origins: {}", self.cors_origins.join(", "));
        }
    }
}
