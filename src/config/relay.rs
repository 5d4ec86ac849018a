//! Relay behavior configuration.

use super::defaults::{
    default_max_message_size, default_outbound_queue_capacity, default_shutdown_grace_period_ms,
};
use serde::{Deserialize, Serialize};

/// Limits applied to every relayed connection.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayConfig {
    /// Largest inbound WebSocket message accepted, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue. Messages to a peer whose
    /// queue is full are dropped for that peer only.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// How long a connection may spend flushing its close frame on shutdown (milliseconds)
    #[serde(default = "default_shutdown_grace_period_ms")]
    pub shutdown_grace_period_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            shutdown_grace_period_ms: default_shutdown_grace_period_ms(),
        }
    }
}

impl RelayConfig {
    /// Validate relay limits
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_message_size == 0 {
            anyhow::bail!("relay.max_message_size must be greater than zero");
        }
        if self.max_message_size > 16 * 1024 * 1024 {
            anyhow::bail!(
                "relay.max_message_size must not exceed 16MB (configured: {})",
                self.max_message_size
            );
        }
        if self.outbound_queue_capacity == 0 {
            anyhow::bail!("relay.outbound_queue_capacity must be at least 1");
        }
        Ok(())
    }
}
