//! fxchain - command-line control for the filter-chain audio unit
//!
//! Usage:
//!   fxchain ping
//!   fxchain --port /dev/ttyUSB0 apply -f reverb:2:1:40,10
//!   fxchain set-frequency 8000
//!   fxchain download
//!   fxchain --simulate apply -f delay:2:3:30 -f mix:3:1:50
//!   fxchain kinds

mod commands;
mod config;
mod filter_arg;
mod serial;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fxchain_core::{DeviceController, SimulatedDevice};
use fxchain_hal::TransportLink;
use log::{info, warn, LevelFilter};

use crate::commands::DeviceAction;
use crate::config::AppConfig;
use crate::serial::SerialLink;

/// Control a serial filter-chain audio unit
#[derive(Parser)]
#[command(name = "fxchain", version, about)]
struct Cli {
    /// Config file (default: ./fxchain.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate, overrides the config file
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Talk to an in-process simulated device instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    /// More logging (-v info, -vv debug, -vvv trace); RUST_LOG also applies
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the filter kinds the device implements
    Kinds,
    /// List serial ports on this host
    Ports,
    #[command(flatten)]
    Device(DeviceAction),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut stdout = io::stdout().lock();
    match &cli.command {
        Command::Kinds => commands::list_kinds(&mut stdout),
        Command::Ports => {
            for port in serial::available_ports().context("listing serial ports")? {
                writeln!(stdout, "{}", port)?;
            }
            Ok(())
        }
        Command::Device(action) => {
            let config = config::load_config(cli.config.as_deref())?
                .with_overrides(cli.port.as_deref(), cli.baud);
            if cli.simulate {
                info!("using simulated device");
                let link = SimulatedDevice::with_config(config.link.settings);
                run_device(link, action, &mut stdout)
            } else {
                let link = SerialLink::new(&config.link.port, config.link.settings);
                run_device(link, action, &mut stdout)
            }
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

/// Connect, run one action, then close the link
fn run_device<L: TransportLink>(
    link: L,
    action: &DeviceAction,
    out: &mut impl Write,
) -> Result<()> {
    let mut controller = DeviceController::new(link);
    controller.connect().context("connecting to device")?;

    let result = commands::execute(&mut controller, action, out);

    if let Err(e) = controller.disconnect() {
        warn!("disconnect failed: {}", e);
    }
    result
}
