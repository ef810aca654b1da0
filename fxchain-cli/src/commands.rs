//! Device subcommands
//!
//! Each action runs against an already connected controller and prints its
//! result to `out`.

use std::io::Write;

use anyhow::{anyhow, Context, Result};
use clap::Subcommand;
use fxchain_core::DeviceController;
use fxchain_hal::TransportLink;
use fxchain_protocol::FilterKind;
use log::info;

use crate::filter_arg::{build_chain, FilterArg};

/// Commands that talk to the device
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum DeviceAction {
    /// Check that the device answers
    Ping,
    /// Stop the running chain (device reverts to passthrough)
    Halt,
    /// Upload a filter chain and start it
    Apply {
        /// Filter as KIND:ID[:OUTPUTS[:PARAMS]], e.g. reverb:2:1:40,10.
        /// Input and Output are added when not given.
        #[arg(short, long = "filter", value_name = "FILTER")]
        filters: Vec<FilterArg>,
    },
    /// Print the sample frequency
    GetFrequency,
    /// Set the sample frequency
    SetFrequency {
        /// Frequency in Hz (1-44000)
        hz: u32,
    },
    /// Print the chain the device is running
    Download,
    /// Save the device's chain to a storage block
    Save {
        /// Block index
        block: u32,
    },
    /// Load and run the chain stored in a block
    Load {
        /// Block index
        block: u32,
    },
}

/// Run one action
pub fn execute<L: TransportLink>(
    controller: &mut DeviceController<L>,
    action: &DeviceAction,
    out: &mut impl Write,
) -> Result<()> {
    match action {
        DeviceAction::Ping => {
            // connect() already did the no-op exchange
            writeln!(out, "device answered")?;
        }
        DeviceAction::Halt => {
            controller.halt().context("halt failed")?;
            writeln!(out, "halted")?;
        }
        DeviceAction::Apply { filters } => {
            let chain = build_chain(filters).map_err(|e| anyhow!("invalid chain: {:?}", e))?;
            controller
                .set_filters(chain.as_slice())
                .context("upload failed")?;
            info!("chain of {} filters running", chain.len());
            writeln!(out, "applied {} filters", chain.len())?;
        }
        DeviceAction::GetFrequency => {
            let hz = controller.get_frequency().context("reading frequency")?;
            writeln!(out, "{} Hz", hz)?;
        }
        DeviceAction::SetFrequency { hz } => {
            controller
                .set_frequency(*hz)
                .context("setting frequency")?;
            writeln!(out, "frequency set to {} Hz", hz)?;
        }
        DeviceAction::Download => {
            let filters = controller.download().context("download failed")?;
            writeln!(
                out,
                "{:>3}  {:<20} {:<9} PARAMS",
                "ID", "KIND", "OUTPUTS"
            )?;
            for filter in &filters {
                writeln!(
                    out,
                    "{:>3}  {:<20} {:<9} {}",
                    filter.id(),
                    filter.kind().name(),
                    join(filter.outputs()),
                    join(filter.params())
                )?;
            }
        }
        DeviceAction::Save { block } => {
            controller
                .save(*block)
                .with_context(|| format!("saving to block {}", block))?;
            writeln!(out, "saved to block {}", block)?;
        }
        DeviceAction::Load { block } => {
            controller
                .load(*block)
                .with_context(|| format!("loading block {}", block))?;
            writeln!(out, "loaded block {}", block)?;
        }
    }
    Ok(())
}

/// Print the filter catalog
pub fn list_kinds(out: &mut impl Write) -> Result<()> {
    for kind in FilterKind::selectable() {
        writeln!(out, "{:>3}  {}", kind.as_u8(), kind.name())?;
    }
    Ok(())
}

fn join(values: &[u8]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
