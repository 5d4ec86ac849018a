#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! # Room Relay
//!
//! A lightweight, in-memory WebSocket relay for two-party WebRTC signaling.
//!
//! Peers that open a socket on the same path share a room; whatever one peer sends is
//! forwarded verbatim to the other. No database, no accounts, no persistence.

/// Server configuration and environment variables
pub mod config;

/// Structured logging configuration
pub mod logging;

/// Relay counters
pub mod metrics;

/// Wire envelope, identifiers, and close codes
pub mod protocol;

/// Room membership and fan-out
pub mod registry;

/// Shared relay state handed to every connection
pub mod server;

/// WebSocket connection handling
pub mod websocket;
