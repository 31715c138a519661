//! Multi-Client TCP Chat Server - Entry Point
//!
//! Parses the command line, binds the listener and serves until Ctrl-C.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chat_server::cli::Cli;
use chat_server::ChatServer;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_server=info")),
        )
        .init();

    let config = Cli::parse().into_config();

    let server = match ChatServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match server.local_addr() {
        Ok(addr) => info!("Chat server listening on {}", addr),
        Err(e) => warn!("Listening on unknown address: {}", e),
    }

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install Ctrl-C handler: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Chat server stopped");
    ExitCode::SUCCESS
}
