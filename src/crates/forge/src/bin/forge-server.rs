//! Forge server binary
//!
//! `serve` runs the HTTP API; `issue-token` mints a bearer token for local
//! use.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use forge::api::create_router;
use forge::auth::JwtManager;
use forge::config::ServerConfig;

#[derive(Parser)]
#[command(name = "forge-server", version, about = "Template-driven LLM generation service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Configuration file (overrides CONFIG_PATH and the default search)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Print a bearer token for a user id
    IssueToken {
        #[arg(long)]
        user: String,
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    match Cli::parse().command {
        Command::Serve { config } => serve(config).await,
        Command::IssueToken { user, config } => {
            let config = load_config(config)?;
            let jwt = JwtManager::new(&config.auth.jwt_secret, config.auth.token_ttl_minutes);
            let token = jwt.issue(&user).context("failed to sign token")?;
            println!("{}", token);
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ServerConfig> {
    let config = ServerConfig::load_from(path.as_deref()).context("failed to load configuration")?;
    if config.auth.jwt_secret.is_empty() {
        bail!("auth.jwt_secret is not set; configure it or export JWT_SECRET");
    }
    Ok(config)
}

async fn serve(path: Option<PathBuf>) -> anyhow::Result<()> {
    tracing::info!("Loading server configuration...");
    let config = load_config(path)?;
    tracing::info!("Server name: {}", config.server.name);
    tracing::info!("Database: {}", config.database.url);
    if config.providers.openrouter.api_key.is_empty() {
        tracing::warn!("OpenRouter API key not configured; only local models will answer");
    }

    let state = forge::app::build(&config).await.context("failed to open database")?;

    tracing::info!("Building API router");
    let app = create_router(state, &config.server.cors_origins);

    let addr = config.bind_address();
    tracing::info!("Starting forge server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Forge server shut down gracefully");
    Ok(())
}

/// Signal for graceful shutdown (Ctrl-C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received CTRL-C signal, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down");
        }
    }
}
