use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use names_server::{router, spawn_rescan, AppState, DEFAULT_CATEGORIES};

/// Serve the newest complete set of name extracts over HTTP
#[derive(Parser, Debug)]
#[command(name = "names-server", version)]
struct Args {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Directory holding <category>-<YYYYMMDD>.csv.gz files
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Category that must be present for a date to be served (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Seconds between directory rescans
    #[arg(long, default_value_t = 900)]
    rescan_secs: u64,

    #[arg(long, short = 'v')]
    verbose: bool,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default = if args.verbose {
        "names_server=debug,tower_http=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let categories = if args.categories.is_empty() {
        DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
    } else {
        args.categories
    };

    let state = AppState::load(args.workdir.clone(), categories)
        .await
        .with_context(|| format!("scanning {}", args.workdir.display()))?;
    let rescan = spawn_rescan(state.clone(), Duration::from_secs(args.rescan_secs.max(1)));

    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("binding port {}", args.port))?;
    info!(port = args.port, "names-server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    rescan.abort();
    Ok(())
}
