//! CLI Entry Point for eeg-relay
//!
//! Client commands:
//! - `monitor`: capture and upload a snapshot every poll interval until Ctrl+C
//! - `cleanup`: clear a user's remote queue
//! - `transfer`: send a raw recording over the transfer channel
//! - `send`: upload one snapshot of a recording, then transfer the file
//!
//! Server command:
//! - `serve`: run the ingestion service and the transfer receiver
//!
//! # Usage
//!
//! ```bash
//! eeg_relay monitor --user-id 42
//! eeg_relay serve --config config/eeg_relay.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eeg_relay::config::{RelayConfig, DEFAULT_CONFIG_PATH};
use eeg_relay::delivery::send_recording;
use eeg_relay::network::client::WaveformClient;
use eeg_relay::network::transfer::{transfer_file, TransferReceiver};
use eeg_relay::{logging, server, Monitor, MonitorState, TracingSink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "eeg_relay")]
#[command(about = "EEG snapshot relay: acquisition client and ingestion service", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the newest recording and upload snapshots until interrupted
    Monitor {
        #[arg(long)]
        user_id: String,
    },

    /// Run the HTTP ingestion service and the raw transfer receiver
    Serve,

    /// Delete every queued snapshot of a user
    Cleanup {
        #[arg(long)]
        user_id: String,
    },

    /// Send a recording over the raw transfer channel
    Transfer {
        file: PathBuf,

        #[arg(long)]
        user_id: String,
    },

    /// Upload a snapshot of a recording, then transfer the whole file
    Send {
        file: PathBuf,

        #[arg(long)]
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RelayConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init_from_config(&config)?;

    match cli.command {
        Commands::Monitor { user_id } => run_monitor(config, user_id).await,
        Commands::Serve => run_server(config).await,
        Commands::Cleanup { user_id } => {
            config.client.validate()?;
            let deleted = WaveformClient::new(&config.client)?.cleanup(&user_id).await?;
            info!(user_id, deleted, "remote queue cleared");
            Ok(())
        }
        Commands::Transfer { file, user_id } => {
            let bytes = transfer_file(&file, &user_id, &config.client.transfer).await?;
            info!(user_id, bytes, "transfer complete");
            Ok(())
        }
        Commands::Send { file, user_id } => {
            config.client.validate()?;
            let report = send_recording(&config.client, &user_id, &file).await?;
            info!(
                user_id,
                uploaded = report.uploaded_at.is_some(),
                bytes = report.transferred_bytes,
                "recording delivered"
            );
            Ok(())
        }
    }
}

async fn run_monitor(config: RelayConfig, user_id: String) -> Result<()> {
    config.client.validate()?;

    let sink = Arc::new(TracingSink::new(user_id.clone()));
    let mut monitor = Monitor::new(user_id, config.client, sink)?;
    monitor.start().await;

    // Ends on Ctrl+C, or on its own if the worker gave up.
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            signal = &mut interrupt => {
                signal.context("waiting for Ctrl+C")?;
                info!("interrupt received, stopping monitor");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {
                if monitor.state() == MonitorState::Stopped {
                    warn!("monitor stopped on its own");
                    break;
                }
            }
        }
    }

    monitor.stop().await;
    Ok(())
}

async fn run_server(config: RelayConfig) -> Result<()> {
    config.server.validate()?;

    let server_config = config.server;
    let receiver = TransferReceiver::bind(
        &server_config.transfer_bind_addr,
        server_config.transfer_inbox.clone(),
        server_config.max_transfer_bytes,
        server_config.transfer_read_timeout(),
    )
    .await?;

    tokio::select! {
        result = server::serve(&server_config) => result?,
        result = receiver.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl+C")?;
            info!("interrupt received, shutting down");
        }
    }
    Ok(())
}
