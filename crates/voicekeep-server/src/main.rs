use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use voicekeep_gateway::WsConnector;

mod cli;
mod config;
mod registry;
mod status;
mod supervisor;

use supervisor::{Supervisor, SupervisorOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voicekeep=info")),
        )
        .init();

    // wss:// handshakes go through rustls; pin the ring provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    // CLI --tokens overrides config file
    let tokens_path = PathBuf::from(args.tokens.unwrap_or(config.supervisor.tokens_path.clone()));
    let entries = registry::load_registry(&tokens_path)
        .with_context(|| format!("loading sessions from {}", tokens_path.display()))?;
    let session_count = entries.len();

    let supervisor = Arc::new(Supervisor::new(
        entries,
        Arc::new(WsConnector),
        SupervisorOptions {
            gateway_url: config.gateway.url.clone(),
            stagger: config.supervisor.stagger(),
            sweep_interval: config.supervisor.sweep_interval(),
        },
    ));
    let app = status::build_router(supervisor.sessions());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;

    print_startup_banner(
        &config.server.bind_address,
        &tokens_path,
        session_count,
        &config.gateway.url,
    );

    supervisor.start();

    let shutdown_supervisor = supervisor.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
        }
        println!();
        tracing::info!("Shutting down (ctrl-c)...");
        shutdown_supervisor.shutdown().await;
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

fn print_startup_banner(bind_address: &str, tokens_path: &std::path::Path, sessions: usize, gateway_url: &str) {
    println!();
    println!("  voicekeep");
    println!();
    println!("  Listening:   http://{}", bind_address);
    println!("  Tokens:      {} ({} sessions)", tokens_path.display(), sessions);
    println!("  Gateway:     {}", gateway_url);
    println!();
}
