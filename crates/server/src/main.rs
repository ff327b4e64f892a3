use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use remedy_engine::Policy;
use remedy_server::api::AppState;
use remedy_server::config::RemedyConfig;

/// Remediation workflow engine HTTP server.
#[derive(Parser, Debug)]
#[command(name = "remedy-server", about = "Standalone HTTP server for remedy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "remedy.toml")]
    config: PathBuf,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a policy file and print a summary, then exit.
    CheckPolicy {
        /// Path to the policy TOML file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Some(Commands::CheckPolicy { path }) = cli.command {
        return check_policy(&path);
    }

    if !cli.config.exists() {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }
    let config = RemedyConfig::load(&cli.config)?;
    let engine = remedy_server::factory::build_engine(&config)?;
    let app = remedy_server::api::router(AppState {
        engine: Arc::new(engine),
    });

    // CLI overrides take precedence.
    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "remedy-server listening");

    // Serve with graceful shutdown on SIGINT / SIGTERM. In-flight requests
    // get `shutdown_timeout_seconds` to finish once the signal arrives.
    let signalled = Arc::new(Notify::new());
    let shutdown = {
        let signalled = Arc::clone(&signalled);
        async move {
            shutdown_signal().await;
            signalled.notify_one();
        }
    };
    let mut server =
        tokio::spawn(async move { axum::serve(listener, app).with_graceful_shutdown(shutdown).await });

    tokio::select! {
        joined = &mut server => joined??,
        () = signalled.notified() => {
            let timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
            match tokio::time::timeout(timeout, &mut server).await {
                Ok(joined) => joined??,
                Err(_) => {
                    warn!(
                        timeout_secs = timeout.as_secs(),
                        "shutdown timeout exceeded, dropping in-flight requests"
                    );
                    server.abort();
                }
            }
        }
    }

    info!("remedy-server shut down");
    Ok(())
}

/// Run the `check-policy` subcommand.
fn check_policy(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let policy = Policy::load(path)?;
    info!(
        path = %path.display(),
        version = policy.version,
        guardrails = policy.guardrails.iter().filter(|g| g.enabled).count(),
        risk_rules = policy.risk.len(),
        "policy is valid"
    );
    println!(
        "{}: policy version {} is valid ({} guardrails, {} risk rules)",
        path.display(),
        policy.version,
        policy.guardrails.len(),
        policy.risk.len()
    );
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
