//! # Desk controller
//!
//! Command-line front end for TMotion standing desks.
//!
//! ```bash
//! # Find the desk address
//! desk-controller scan
//!
//! # Alternate between sitting (72 cm, 45 min) and standing (110 cm, 15 min)
//! desk-controller cycle --desk-address D4:36:39:8A:1F:02 \
//!     --position 72:45 --position 110:15 --repeat 4
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tmotion_desk::{run_cycle, scan_devices, BleTransport, CycleOptions, DeskSession, Position};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "desk-controller")]
#[command(about = "Control a TMotion standing desk over Bluetooth", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List nearby Bluetooth devices
    Scan {
        /// How long to scan, in seconds
        #[arg(short, long, default_value_t = 10)]
        duration: u64,
    },

    /// Print the current height and speed
    Status {
        /// Desk address as listed by `scan` (a UUID on macOS)
        #[arg(long)]
        desk_address: String,
    },

    /// Move the desk to a height
    Move {
        /// Desk address as listed by `scan` (a UUID on macOS)
        #[arg(long)]
        desk_address: String,

        /// Target height in centimeters
        height: u8,
    },

    /// Cycle through sit/stand positions
    Cycle {
        /// Desk address as listed by `scan` (a UUID on macOS)
        #[arg(long)]
        desk_address: String,

        /// Position as <centimeters>:<minutes>, repeat for more
        #[arg(long = "position", required = true)]
        positions: Vec<Position>,

        /// How many times to go through the positions
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Seconds between the prompt and the move
        #[arg(long, default_value_t = 3)]
        delay: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Scan { duration } => {
            let mut transport = BleTransport::new();
            let devices = scan_devices(&mut transport, Duration::from_secs(duration)).await?;
            for device in devices {
                println!(
                    "{}  {:<24}  {}",
                    device.address,
                    device.local_name.as_deref().unwrap_or("(unknown)"),
                    device.rssi.map_or_else(|| "-".to_string(), |rssi| format!("{rssi} dBm")),
                );
            }
            Ok(())
        }

        Commands::Status { desk_address } => {
            let mut desk = connect(&desk_address).await?;
            let reading = desk.reading().await;
            println!("height: {} cm, speed: {}", reading.height, reading.speed);
            desk.disconnect().await?;
            Ok(())
        }

        Commands::Move {
            desk_address,
            height,
        } => {
            let mut desk = connect(&desk_address).await?;
            let report = desk
                .move_to(height)
                .await
                .with_context(|| format!("Failed to move desk to {height} cm"))?;
            println!("Stopped at {} cm", report.final_height);
            desk.disconnect().await?;
            Ok(())
        }

        Commands::Cycle {
            desk_address,
            positions,
            repeat,
            delay,
        } => {
            let mut desk = connect(&desk_address).await?;
            let options = CycleOptions {
                repeat,
                delay: Duration::from_secs(delay),
            };

            run_cycle(&desk, &positions, &options, |prompt, position| {
                println!("{prompt} ({} cm)", position.height);
            })
            .await
            .context("Cycle aborted")?;

            info!("Cycle finished");
            desk.disconnect().await?;
            Ok(())
        }
    }
}

async fn connect(address: &str) -> Result<DeskSession> {
    let mut desk = DeskSession::new(address);
    desk.connect()
        .await
        .with_context(|| format!("Failed to connect to desk {address}"))?;
    Ok(desk)
}
