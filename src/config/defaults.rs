//! Default value functions for configuration fields.
//!
//! These back the `#[serde(default = ...)]` attributes across the configuration types so a
//! partial JSON document always deserializes into a complete [`Config`](super::Config).

use super::logging::LogFormat;

// =============================================================================
// Port & Root Config
// =============================================================================

pub const fn default_port() -> u16 {
    8080
}

// =============================================================================
// Relay Defaults
// =============================================================================

pub const fn default_max_message_size() -> usize {
    65536 // 64KB, comfortably above any SDP blob
}

pub const fn default_outbound_queue_capacity() -> usize {
    64
}

pub const fn default_shutdown_grace_period_ms() -> u64 {
    500
}

// =============================================================================
// Security Defaults
// =============================================================================

pub fn default_cors_origins() -> String {
    "*".to_string()
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "room-relay.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Text
}
