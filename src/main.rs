//! Bench CLI for the DUT harness
//!
//! Drives the power supply and the reachability checks from the shell, e.g.
//! to power cycle a DUT by hand between test runs.
//!
//! ```bash
//! dut-harness list-ports
//! dut-harness power-cycle --settle 8
//! dut-harness --config bench.toml cycle-and-verify --host 192.168.1.10
//! dut-harness restart-window --within 3.0
//! ```

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use dut_harness_lib::config::HarnessConfig;
use dut_harness_lib::reachability::{ReachabilityMonitor, ReachabilityPolicy, RestartWindow};
use dut_harness_lib::serial::{OutputState, PowerSupplyDriver, SerialInterface};
use dut_harness_lib::PowerCycleOrchestrator;

/// Power-cycle and liveness control for the DUT bench
#[derive(Parser, Debug)]
#[command(name = "dut-harness")]
#[command(version)]
#[command(about = "Power-cycle and liveness control for the DUT bench", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./harness.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List USB serial ports and mark the ones matching the supply signature
    ListPorts {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Switch the supply output
    Output {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Set the output voltage (1.0 - 36.0 V)
    SetVoltage { volts: f64 },
    /// Read the voltage shown on the supply display
    GetVoltage,
    /// Switch the output off and on again
    PowerCycle {
        /// Seconds to stay powered off (overrides the config file)
        #[arg(long)]
        settle: Option<f64>,
    },
    /// Wait until the DUT answers pings
    WaitReachable {
        #[arg(long)]
        host: Option<String>,
    },
    /// Check the DUT drops off the network within the restart window
    RestartWindow {
        #[arg(long)]
        host: Option<String>,
        /// Window in seconds (overrides the config file)
        #[arg(long)]
        within: Option<f64>,
    },
    /// Power cycle, then wait for the DUT to come back
    CycleAndVerify {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        settle: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(&args) {
        log::error!("{:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn run(args: &Args) -> Result<()> {
    let config =
        HarnessConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match &args.command {
        Command::ListPorts { json } => list_ports(&config, *json),
        Command::Output { state } => {
            let state = match state {
                Switch::On => OutputState::On,
                Switch::Off => OutputState::Off,
            };
            open_supply(&config)?
                .set_output(state)
                .context("Failed to switch output")?;
            log::info!("Output switched {:?}", state);
            Ok(())
        }
        Command::SetVoltage { volts } => {
            open_supply(&config)?
                .set_voltage(*volts)
                .context("Failed to set voltage")?;
            log::info!("Voltage set to {:.1} V", volts);
            Ok(())
        }
        Command::GetVoltage => {
            let volts = open_supply(&config)?
                .get_voltage()
                .context("Failed to read voltage")?;
            println!("{:.2}", volts);
            Ok(())
        }
        Command::PowerCycle { settle } => {
            let settle = settle_time(&config, *settle)?;
            open_supply(&config)?
                .power_cycle(settle)
                .context("Power cycle failed")?;
            Ok(())
        }
        Command::WaitReachable { host } => {
            let mut monitor = open_monitor(&config, host.as_deref())?;
            let attempt = monitor
                .wait_until_reachable(&config.boot_policy()?)
                .context("DUT did not come online")?;
            log::info!("{} reachable on attempt {}", monitor.host(), attempt);
            Ok(())
        }
        Command::RestartWindow { host, within } => {
            let window = match within {
                Some(seconds) => RestartWindow::from_secs_f64(*seconds)?,
                None => config.restart_window()?,
            };
            let policy: ReachabilityPolicy = config.restart_policy()?;
            let elapsed = open_monitor(&config, host.as_deref())?
                .wait_for_restart_within(window, &policy)
                .context("Restart window check failed")?;
            log::info!("DUT went down after {:.2?}", elapsed);
            Ok(())
        }
        Command::CycleAndVerify { host, settle } => {
            let settle = settle_time(&config, *settle)?;
            let policy = config.boot_policy()?;
            let mut supply = open_supply(&config)?;
            let mut monitor = open_monitor(&config, host.as_deref())?;

            PowerCycleOrchestrator::new(&mut supply, &mut monitor)
                .with_settle(settle)
                .power_cycle_and_verify(&policy)
                .context("Verified power cycle failed")?;
            Ok(())
        }
    }
}

fn list_ports(config: &HarnessConfig, json: bool) -> Result<()> {
    let signature = config.signature();
    let ports = SerialInterface::list_usb_ports().context("Failed to enumerate serial ports")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No USB serial ports found");
    }
    for port in &ports {
        let marker = if signature.matches(port) { "*" } else { " " };
        println!(
            "{} {} {:04x}:{:04x} {} {}",
            marker,
            port.port_name,
            port.vid,
            port.pid,
            port.manufacturer.as_deref().unwrap_or("-"),
            port.product.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn open_supply(config: &HarnessConfig) -> Result<PowerSupplyDriver> {
    let settings = config.port_settings()?;
    PowerSupplyDriver::discover(&config.signature(), settings).context("Power supply not available")
}

fn open_monitor(config: &HarnessConfig, host: Option<&str>) -> Result<ReachabilityMonitor> {
    let monitor = match host {
        Some(address) => ReachabilityMonitor::for_address(address)?,
        None => {
            let host = config.target_host().context("No DUT address given")?;
            ReachabilityMonitor::for_address(&host.to_string())?
        }
    };
    Ok(monitor)
}

fn settle_time(config: &HarnessConfig, override_secs: Option<f64>) -> Result<Duration> {
    match override_secs {
        Some(seconds) if !seconds.is_finite() || seconds < 0.0 => {
            bail!("Settle time must be a non-negative number of seconds, got {}", seconds)
        }
        Some(seconds) => Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("Settle time of {} seconds is out of range", seconds)),
        None => Ok(config.settle()?),
    }
}
