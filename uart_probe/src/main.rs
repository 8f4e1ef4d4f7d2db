//! # UART Probe
//!
//! Thin client that exercises the driver's command interface: activate the
//! module, open its node, issue the reset opcode, show the diagnostic
//! attribute, and tear down.
//!
//! # Usage
//!
//! ```bash
//! # Against the loopback simulation (no privileges needed)
//! uart_probe --simulate
//!
//! # Against real hardware
//! uart_probe --base 0xFE201000
//!
//! # With a config file and verbose logging
//! uart_probe --config uart.toml -v
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;
use uart_driver::{CMD_RESET, CharDevice, FsHost, UartConfig, UartModule};

/// UART driver probe - issues Reset through the command interface
#[derive(Parser, Debug)]
#[command(name = "uart_probe")]
#[command(version)]
#[command(about = "Exercise the UART driver's command interface")]
struct Args {
    /// Host root directory for nodes and attributes
    #[arg(long, default_value = "/tmp/uart_host")]
    root: PathBuf,

    /// Use the loopback register simulation instead of real hardware
    #[arg(short, long)]
    simulate: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Physical base address of the register block (overrides config)
    #[arg(long, value_parser = parse_addr)]
    base: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("probe failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    let mut config = match &args.config {
        Some(path) => UartConfig::load(path)?,
        None => UartConfig::default(),
    };
    if let Some(base) = args.base {
        config.base_addr = base;
    }

    let host = if args.simulate {
        info!("simulation mode: loopback register block");
        let (host, _bus) = FsHost::with_simulated_bus(&args.root);
        Arc::new(host)
    } else {
        Arc::new(FsHost::new(&args.root))
    };

    let mut module = UartModule::activate(host.clone(), config.clone())?;

    let dev = host.open(&config.device_name)?;
    dev.command(CMD_RESET)?;
    info!("UART reset issued");

    let log = host.read_attribute(&config.device_name, &config.status_attr)?;
    println!("{}", log.trim_end());

    module.shutdown();
    Ok(())
}

/// Parse a hex (`0x...`) or decimal address.
fn parse_addr(text: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|e| format!("invalid address {text:?}: {e}"))
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addr_hex_and_decimal() {
        assert_eq!(parse_addr("0xFE201000").unwrap(), 0xFE20_1000);
        assert_eq!(parse_addr("4096").unwrap(), 4096);
        assert!(parse_addr("zz").is_err());
    }
}
