/*!
 * btctl
 * Discover, pair and connect Bluetooth devices through BlueZ
 * Onyx Digital Intelligence Development LLC
 */

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use tracing::{debug, warn};

mod output;

use bluetui_core::{AdapterSession, BusConfig, CancellationToken, DbusConnection, ErrorKind};

#[derive(Parser)]
#[command(name = "btctl")]
#[command(about = "Discover, pair and connect Bluetooth devices through BlueZ")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/bluetui/config.toml")]
    config: String,

    /// Bus name of the Bluetooth service
    #[arg(long)]
    destination: Option<String>,

    /// Object path of the adapter
    #[arg(long)]
    adapter: Option<String>,

    /// How long to scan before listing devices, in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan and list nearby devices
    Discover {
        /// Print devices as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the local adapter
    Info,
    /// Pair with a device
    Pair { address: String },
    /// Mark a device as trusted
    Trust { address: String },
    /// Connect to a device
    Connect { address: String },
    /// Disconnect from a device
    Disconnect { address: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("bluetui_ctl={0},bluetui_core={0}", log_level))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let mut session =
        AdapterSession::with_config(config, DbusConnection::connect).context("failed to get bluetooth adapter")?;

    // One listener for the whole run: tokio keeps the SIGINT handler once installed
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = run(&session_command(cli.command), &mut session, &cancel).await;
    watcher.abort();

    if let Err(e) = session.close() {
        warn!("{}", e);
    }

    result
}

fn session_command(command: Option<Commands>) -> Commands {
    command.unwrap_or(Commands::Discover { json: false })
}

fn load_config(cli: &Cli) -> Result<BusConfig> {
    let mut config = BusConfig::load(&cli.config)?;

    if let Some(destination) = &cli.destination {
        config.destination = destination.clone();
    }
    if let Some(adapter) = &cli.adapter {
        config.adapter_path = adapter.clone();
    }
    if let Some(settle_ms) = cli.settle_ms {
        config.settle_ms = settle_ms;
    }

    debug!("Using {:?}", config);
    Ok(config)
}

async fn run(command: &Commands, session: &mut AdapterSession, cancel: &CancellationToken) -> Result<()> {
    if let Commands::Info = command {
        let info = interruptible(cancel, session.adapter_info())
            .await
            .context("failed to read adapter")?;
        println!("{}", output::adapter_line(&info));
        return Ok(());
    }

    eprintln!("Starting discovery. This may take a few seconds ...");
    session
        .discover(cancel)
        .await
        .context("failed to discover devices")?;

    match command {
        Commands::Discover { json } => list_devices(session, *json),
        Commands::Pair { address } => interruptible(cancel, session.pair(address))
            .await
            .with_context(|| format!("failed to pair with device {}", address)),
        Commands::Trust { address } => interruptible(cancel, session.trust(address))
            .await
            .with_context(|| format!("failed to trust device {}", address)),
        Commands::Connect { address } => interruptible(cancel, session.connect(address))
            .await
            .with_context(|| format!("failed to connect with device {}", address)),
        Commands::Disconnect { address } => interruptible(cancel, session.disconnect(address))
            .await
            .with_context(|| format!("failed to disconnect from device {}", address)),
        Commands::Info => Ok(()),
    }
}

/// Gives up on `operation` once Ctrl-C has been pressed.
async fn interruptible<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = bluetui_core::Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(anyhow!("interrupted")),
        result = operation => Ok(result?),
    }
}

fn list_devices(session: &AdapterSession, json: bool) -> Result<()> {
    let devices = match session.devices() {
        Ok(devices) => devices,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            println!("No devices found.");
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to get devices"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output::sorted(devices))?);
    } else {
        println!("\nDiscovered Devices:");
        for line in output::device_lines(devices) {
            println!("{}", line);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluetui_core::Error;

    #[tokio::test]
    async fn test_interrupt_abandons_pending_operation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = interruptible(&cancel, std::future::pending::<bluetui_core::Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "interrupted");
    }

    #[tokio::test]
    async fn test_uninterrupted_operation_passes_result_through() {
        let cancel = CancellationToken::new();

        assert_eq!(interruptible(&cancel, async { Ok(7) }).await.unwrap(), 7);

        let err = interruptible(&cancel, async { Err::<(), _>(Error::Closed) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "adapter session is closed");
    }

    #[test]
    fn test_default_command_is_discover() {
        assert!(matches!(session_command(None), Commands::Discover { json: false }));
    }
}
