//! blueterm - access a BLE GATT shell service from the terminal.

mod shell;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use blueterm_core::Session;
use blueterm_core::btle::BtleTransport;

use crate::shell::{Shell, ShellConfig};

#[derive(Parser)]
#[command(name = "blueterm")]
#[command(about = "Access a BLE GATT shell service from the terminal")]
struct Cli {
    /// Bluetooth adapter index (0 is the first system adapter)
    #[arg(short = 'a', long, default_value = "0")]
    adapter: usize,

    /// Default scan duration in seconds
    #[arg(short = 's', long, default_value = "3.0")]
    scan_timeout: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if !(cli.scan_timeout.is_finite() && cli.scan_timeout > 0.0) {
        return Err("scan timeout must be a positive number of seconds".into());
    }

    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let transport = BtleTransport::new(cli.adapter, notify_tx).await?;
    tracing::debug!("bluetooth adapter {} ready", cli.adapter);
    let session = Session::new(Arc::new(transport));

    let config = ShellConfig {
        intro: "Welcome to blueterm - type 'help' to list commands.".to_string(),
        prompt: "(blueterm) ".to_string(),
        scan_timeout: cli.scan_timeout,
    };

    Shell::new(config, session, notify_rx).run().await?;
    Ok(())
}
