#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use room_relay::config;
use room_relay::logging;
use room_relay::server::{RelayServer, ServerConfig};
use room_relay::websocket;
use std::net::SocketAddr;

/// Room Relay -- in-memory WebSocket relay for two-party WebRTC signaling
#[derive(Parser, Debug)]
#[command(name = "room-relay")]
#[command(about = "An in-memory WebSocket relay for two-party WebRTC signaling")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,

    /// Listen on this port instead of the configured one.
    #[arg(long, short = 'p')]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load();
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Max message size: {} bytes", cfg.relay.max_message_size);
                println!(
                    "  Outbound queue capacity: {}",
                    cfg.relay.outbound_queue_capacity
                );
                println!(
                    "  Metrics auth required: {}",
                    cfg.security.metrics_auth_token.is_some()
                );
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    let _log_guard = logging::init_with_config(&cfg.logging);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let server = RelayServer::new(ServerConfig::from(&cfg));

    // Binding is the only failure that takes the process down.
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        cors_origins = %cfg.security.cors_origins,
        "Relay listening - connect via ws://<host>:{}/<room-id>",
        cfg.port
    );

    websocket::run_server(
        listener,
        server.clone(),
        &cfg.security.cors_origins,
        shutdown_signal(),
    )
    .await?;

    // Give connection tasks their grace period to flush close frames.
    tokio::time::sleep(server.config().shutdown_grace_period).await;
    tracing::info!("Relay stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod cli_tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn test_cli_default_no_flags() {
        let cli = Cli::try_parse_from(["room-relay"]).unwrap();
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
        assert!(cli.port.is_none());
    }

    #[test]
    fn test_cli_validate_config_short() {
        let cli = Cli::try_parse_from(["room-relay", "-c"]).unwrap();
        assert!(cli.validate_config);
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::try_parse_from(["room-relay", "--port", "9000"]).unwrap();
        assert_eq!(cli.port, Some(9000));
        assert!(Cli::try_parse_from(["room-relay", "--port", "99999"]).is_err());
    }

    #[test]
    fn test_cli_validate_and_print_config_conflict() {
        let result = Cli::try_parse_from(["room-relay", "--validate-config", "--print-config"]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot be used with"));
    }
}
