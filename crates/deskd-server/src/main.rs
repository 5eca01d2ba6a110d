//! deskd server binary
//!
//! ## Usage
//!
//! ```bash
//! # Built-in defaults (demo login, home + tmp mounts)
//! deskd
//!
//! # From a RON config, overriding the listen address
//! deskd --config deskd.ron --bind 0.0.0.0:8000
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use deskd_kernel::{load, DeskConfig};
use deskd_server::{modules, router, Dispatcher};

/// Web desktop server.
#[derive(Parser, Debug)]
#[command(name = "deskd")]
#[command(about = "Web desktop server: VFS, API and package dispatch")]
struct Args {
    /// RON config file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config's `bind`
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!("Server error: {:#}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => DeskConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DeskConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    let bind = config.bind;

    let instance = load(config, &modules()).await.context("loading modules")?;
    let dispatcher = Arc::new(Dispatcher::new(instance.clone()));

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    tracing::info!("deskd listening on http://{}", bind);

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    tracing::info!("shutting down");
    instance.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("ctrl-c handler failed: {}", e);
    }
}
