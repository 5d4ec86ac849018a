//! Root configuration types.

use super::defaults::default_port;
use super::logging::LoggingConfig;
use super::relay::RelayConfig;
use super::security::SecurityConfig;
use serde::{Deserialize, Serialize};

/// Root configuration struct for the relay.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            relay: RelayConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
