use anyhow::{Context, Result};
use clap::Parser;
use ebrelayer::{RelayerApp, RelayerConfig};
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Witnesses lock and burn events on Sifchain and attests to them.
#[derive(Debug, Parser)]
#[command(name = "ebrelayer", version)]
struct Args {
    /// Path to the JSON relayer config
    #[arg(long, env = "EBRELAYER_CONFIG")]
    config: PathBuf,

    /// Hex-encoded key used to sign prophecy ids
    #[arg(long, env = "ETHEREUM_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to set up logging: {e}"))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to set up logging: {e}"))
    }
}

async fn wait_for_quit_signal() -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json)?;

    let config = RelayerConfig::from_file(&args.config)?;
    let app = RelayerApp::new(config, &args.private_key)?;

    let shutdown = CancellationToken::new();
    let quit = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_quit_signal().await {
            tracing::error!(error = %e, "Signal handling failed, shutting down");
        }
        info!("Received the quit signal, shutting down");
        quit.cancel();
    });

    app.run(shutdown).await
}
