use std::path::PathBuf;

use clap::Parser;

use fsqueue::config::load_config_or_default;
use fsqueue::http::HttpServer;
use fsqueue::lifecycle::{signals::StopSignals, startup};
use fsqueue::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "fsqueue")]
#[command(about = "Filesystem-backed HTTP message broker", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "broker.toml")]
    config: PathBuf,

    /// Override `daemon.port`.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override `storage.data_dir`.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install handlers first so a signal during startup is not lost.
    let mut signals = StopSignals::install()?;
    let cli = Cli::parse();

    let mut config = load_config_or_default(&cli.config)?;
    if let Some(port) = cli.port {
        config.daemon.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    logging::init(&config.observability.log_level);
    tracing::info!("fsqueue v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        port = config.daemon.port,
        data_dir = ?config.storage.data_dir,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_socket_addr() {
            Some(addr) => metrics::init_metrics(addr),
            None => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (store, listener) = startup::start(&config).await?;
    let stop = listener.stop_handle();
    let server = HttpServer::new(&config, store);
    let mut serving = tokio::spawn(server.run(listener));

    tokio::select! {
        signal = signals.recv() => {
            tracing::info!(signal, "Shutdown signal received");
        }
        result = &mut serving => {
            // The server only returns on its own after a fatal listener error.
            result??;
        }
    }

    tracing::info!(in_flight = stop.in_flight(), "Waiting for connections to drain");
    stop.stop().await;
    if !serving.is_finished() {
        serving.await??;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
