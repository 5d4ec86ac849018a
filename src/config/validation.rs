//! Configuration validation functions.

use super::Config;

/// Validate a loaded configuration.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.port == 0 {
        anyhow::bail!("port must be a fixed, non-zero TCP port");
    }

    config.relay.validate()?;

    if let Some(token) = &config.security.metrics_auth_token {
        if token.trim().is_empty() {
            anyhow::bail!(
                "security.metrics_auth_token is set but empty; remove it to leave /_relay/metrics open"
            );
        }
        if token.len() < 16 {
            eprintln!(
                "\nWARNING: Metrics auth token is very short ({} chars).\n\
                 Recommended: At least 32 characters.\n\
                 Generate a strong token: openssl rand -hex 32\n",
                token.len()
            );
        }
    }

    if config.security.cors_origins.trim().is_empty() {
        anyhow::bail!("security.cors_origins must not be empty (use \"*\" to allow any origin)");
    }

    Ok(())
}
