//! Sointu server
//!
//! Loads configuration, checks the container engine, removes leftover
//! sandboxes, pulls sandbox images, then serves the WebSocket gateway until
//! interrupted. In-flight runs are drained before the process exits.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use sointu::bootstrap::{check_engine, ensure_images, reap_sandboxes};
use sointu::config::{load_config, validate_config, Environment};
use sointu::gateway::{serve, Gateway};
use sointu::runtime::{ContainerRuntime, DockerRuntime};

#[derive(Parser, Debug)]
#[command(name = "sointu", about = "Code exercise submission service", version)]
struct Args {
    /// Config file (TOML or JSON5)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Port
    #[arg(long, short)]
    port: Option<u16>,

    /// Run with production logging and quiet startup
    #[arg(long)]
    production: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.production {
        config.environment = Environment::Production;
    }

    sointu::logging::init(config.environment);
    info!(version = sointu::VERSION, environment = ?config.environment, "Starting {}", sointu::NAME);

    let validation = validate_config(&config);
    for issue in &validation.warnings {
        warn!("Config: {}", issue);
    }
    if !validation.valid {
        for issue in &validation.errors {
            error!("Config: {}", issue);
        }
        anyhow::bail!("Invalid configuration ({} errors)", validation.errors.len());
    }

    let docker = match config.sandbox.docker_socket.as_deref() {
        Some(socket) => DockerRuntime::connect_socket(socket, config.sandbox.stop_timeout_secs)?,
        None => DockerRuntime::connect(config.sandbox.stop_timeout_secs)?,
    };
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(docker);

    check_engine(runtime.as_ref(), config.environment).await?;
    let orphans = reap_sandboxes(runtime.as_ref(), &config.sandbox.name_prefix).await?;
    if orphans > 0 {
        warn!(removed = orphans, "Removed sandboxes left by a previous run");
    }
    ensure_images(
        runtime.as_ref(),
        &config.sandbox.required_images(),
        config.bootstrap.pull_timeout,
    )
    .await?;

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.server.bind, config.server.port))?;

    let gateway = Arc::new(Gateway::new(runtime, &config));
    let served = serve(gateway.clone(), addr, shutdown_signal()).await;
    gateway.shutdown(config.server.shutdown_grace).await;
    served?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
