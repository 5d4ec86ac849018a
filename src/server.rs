use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::metrics::{MetricsSnapshot, RelayMetrics};
use crate::registry::RoomRegistry;

/// Runtime settings for a [`RelayServer`], derived from the loaded [`Config`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_message_size: usize,
    pub outbound_queue_capacity: usize,
    pub shutdown_grace_period: Duration,
    pub metrics_auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_message_size: 65536, // 64KB
            outbound_queue_capacity: 64,
            shutdown_grace_period: Duration::from_millis(500),
            metrics_auth_token: None,
        }
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_message_size: config.relay.max_message_size,
            outbound_queue_capacity: config.relay.outbound_queue_capacity.max(1),
            shutdown_grace_period: Duration::from_millis(config.relay.shutdown_grace_period_ms),
            metrics_auth_token: config.security.metrics_auth_token.clone(),
        }
    }
}

/// Owns everything the connection handlers share: the room registry, counters, and
/// the shutdown signal. One instance per listener; tests build a fresh one each.
pub struct RelayServer {
    config: ServerConfig,
    registry: RoomRegistry,
    metrics: Arc<RelayMetrics>,
    shutdown: CancellationToken,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let metrics = Arc::new(RelayMetrics::new());
        Arc::new(Self {
            config,
            registry: RoomRegistry::new(metrics.clone()),
            metrics,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.registry.room_count())
    }

    /// Token every connection task watches; cancelled once on shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask every live connection to close with a going-away frame.
    pub fn begin_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!(
                rooms = self.registry.room_count(),
                connections = self.registry.connection_count(),
                "Shutting down relay; closing live connections"
            );
            self.shutdown.cancel();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn health_check(&self) -> bool {
        !self.is_shutting_down()
    }
}
