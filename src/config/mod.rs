//! Configuration module for the relay.
//!
//! Supports JSON configuration files, inline JSON, stdin, environment variable
//! overrides, and compiled-in defaults.
//!
//! # Module Structure
//!
//! - [`crate::config::types`]: Root `Config` struct
//! - [`relay`]: Per-connection limits (message size, queue capacity, shutdown grace)
//! - [`security`]: CORS and metrics endpoint protection
//! - [`logging`]: Logging configuration
//! - [`crate::config::loader`]: Configuration loading functions
//! - [`crate::config::validation`]: Configuration validation functions
//! - [`crate::config::defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod relay;
pub mod security;
pub mod types;
pub mod validation;

pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use relay::RelayConfig;

pub use security::SecurityConfig;

pub use types::Config;

pub use validation::validate_config;
