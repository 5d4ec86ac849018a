use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the relay, shared by every connection task.
#[derive(Debug)]
pub struct RelayMetrics {
    started_at: DateTime<Utc>,

    // Connection metrics
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub admission_refusals: AtomicU64,
    pub transport_errors: AtomicU64,

    // Room metrics
    pub rooms_created: AtomicU64,
    pub rooms_deleted: AtomicU64,
    pub peer_ready_sent: AtomicU64,

    // Message metrics
    pub messages_received: AtomicU64,
    pub messages_relayed: AtomicU64,
    /// Deliveries skipped because the peer's queue was full or already closed
    pub messages_dropped: AtomicU64,
    pub parse_errors: AtomicU64,
}

/// Point-in-time view of [`RelayMetrics`], served by the metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub connections_total: u64,
    pub connections_active: u64,
    pub admission_refusals: u64,
    pub transport_errors: u64,
    pub rooms_created: u64,
    pub rooms_deleted: u64,
    pub rooms_active: u64,
    pub peer_ready_sent: u64,
    pub messages_received: u64,
    pub messages_relayed: u64,
    pub messages_dropped: u64,
    pub parse_errors: u64,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            admission_refusals: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            rooms_created: AtomicU64::new(0),
            rooms_deleted: AtomicU64::new(0),
            peer_ready_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_relayed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
        }
    }

    pub fn increment_connections(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_active_connections(&self) {
        // Saturate at zero rather than wrapping if teardown ever double counts.
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(1)
            });
    }

    pub fn increment_admission_refusals(&self) {
        self.admission_refusals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transport_errors(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_created(&self) {
        self.rooms_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_deleted(&self) {
        self.rooms_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_peer_ready_sent(&self) {
        self.peer_ready_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_messages_relayed(&self, count: u64) {
        self.messages_relayed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_messages_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Capture all counters. `rooms_active` comes from the registry, which owns that truth.
    pub fn snapshot(&self, rooms_active: usize) -> MetricsSnapshot {
        let now = Utc::now();
        MetricsSnapshot {
            timestamp: now,
            started_at: self.started_at,
            uptime_seconds: now
                .signed_duration_since(self.started_at)
                .num_seconds()
                .max(0) as u64,
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            admission_refusals: self.admission_refusals.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            rooms_created: self.rooms_created.load(Ordering::Relaxed),
            rooms_deleted: self.rooms_deleted.load(Ordering::Relaxed),
            rooms_active: rooms_active as u64,
            peer_ready_sent: self.peer_ready_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_connections_never_underflow() {
        let metrics = RelayMetrics::new();
        metrics.decrement_active_connections();
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 0);

        metrics.increment_connections();
        metrics.increment_connections();
        metrics.decrement_active_connections();
        let snapshot = metrics.snapshot(0);
        assert_eq!(snapshot.connections_total, 2);
        assert_eq!(snapshot.connections_active, 1);
    }

    #[test]
    fn snapshot_reports_registry_room_count() {
        let metrics = RelayMetrics::new();
        metrics.increment_rooms_created();
        metrics.add_messages_relayed(3);
        let snapshot = metrics.snapshot(1);
        assert_eq!(snapshot.rooms_created, 1);
        assert_eq!(snapshot.rooms_active, 1);
        assert_eq!(snapshot.messages_relayed, 3);
        assert!(snapshot.timestamp >= snapshot.started_at);
    }
}
