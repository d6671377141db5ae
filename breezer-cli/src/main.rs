//! breezer CLI - Command-line tool for Tion breezers.
//!
//! ## Features
//!
//! - Read the current state (human-readable or JSON)
//! - Change power, heater, sound, air mode, fan speed and target temperature
//! - Pair with a new device
//! - Layered configuration (flags, environment, local and global files)
//! - A built-in simulated breezer for trying things out without hardware

use anyhow::{Context, Result, bail};
use breezer::{AirMode, Breezer, DeviceModel, DeviceWorker, SimulatedBreezer, StateChanges};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod output;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Address used with --simulate when none is configured.
const SIMULATED_ADDRESS: &str = "00:00:00:00:00:00";

/// breezer - Read and control Tion breezers.
///
/// Environment variables:
///   BREEZER_ADDRESS   - Device address
///   BREEZER_MODEL     - Device model (s3, s4, lite)
///   BREEZER_TRIES     - Attempts per link operation (default: 3)
#[derive(Parser)]
#[command(name = "breezer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Device address.
    #[arg(short, long, global = true, env = "BREEZER_ADDRESS")]
    address: Option<String>,

    /// Device model (default: s3).
    #[arg(short, long, global = true, env = "BREEZER_MODEL")]
    model: Option<Model>,

    /// Attempts per link operation.
    #[arg(long, global = true, env = "BREEZER_TRIES")]
    tries: Option<u32>,

    /// Give up waiting for the device after this many seconds.
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Talk to a simulated breezer instead of a real device.
    #[arg(long, global = true)]
    simulate: bool,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Supported models.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Model {
    /// Breezer 3S (default).
    S3,
    /// Breezer 4S.
    S4,
    /// Lite.
    Lite,
}

impl From<Model> for DeviceModel {
    fn from(model: Model) -> Self {
        match model {
            Model::S3 => DeviceModel::S3,
            Model::S4 => DeviceModel::S4,
            Model::Lite => DeviceModel::Lite,
        }
    }
}

/// On/off switch value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Switch {
    /// Switch on.
    On,
    /// Switch off.
    Off,
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> Self {
        switch == Switch::On
    }
}

/// Air source.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Room air only.
    Recirculation,
    /// Room and street air (S3 only).
    Mixed,
    /// Street air only.
    Outside,
}

impl From<Mode> for AirMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Recirculation => AirMode::Recirculation,
            Mode::Mixed => AirMode::Mixed,
            Mode::Outside => AirMode::Outside,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Read the current state.
    Get {
        /// Output the state as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Change settings. Anything not given keeps its current value.
    Set {
        /// Power the unit on or off.
        #[arg(long)]
        power: Option<Switch>,

        /// Switch the heater.
        #[arg(long)]
        heater: Option<Switch>,

        /// Switch sound indication.
        #[arg(long)]
        sound: Option<Switch>,

        /// Air source.
        #[arg(long)]
        mode: Option<Mode>,

        /// Fan speed 0-6 (anything else becomes 1).
        #[arg(long, allow_negative_numbers = true)]
        fan: Option<i32>,

        /// Heater target temperature in °C.
        #[arg(long)]
        target_temp: Option<u8>,

        /// Output the resulting state as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Pair with the device (hold its pairing button first).
    Pair,
}

impl Commands {
    /// Collect the requested changes of a `set` command.
    fn changes(&self) -> StateChanges {
        let mut changes = StateChanges::new();
        if let Self::Set {
            power,
            heater,
            sound,
            mode,
            fan,
            target_temp,
            ..
        } = self
        {
            changes.power = power.map(bool::from);
            changes.heater_on = heater.map(bool::from);
            changes.sound_on = sound.map(bool::from);
            changes.air_mode = mode.map(AirMode::from);
            changes.fan_speed = *fan;
            changes.target_temp = *target_temp;
        }
        changes
    }
}

/// Resolved device and client settings.
struct Target {
    address: String,
    model: DeviceModel,
    client: breezer::ClientConfig,
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        // Disable all color output
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "breezer v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        report_error(&err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };
    let target = resolve_target(cli, &config)?;
    debug!(
        "Using {} at {} ({} tries)",
        target.model, target.address, target.client.max_tries
    );

    match &cli.command {
        Commands::Get { json } => cmd_get(cli, &target, *json),
        Commands::Set { json, .. } => cmd_set(cli, &target, &cli.command.changes(), *json),
        Commands::Pair => cmd_pair(cli, &target),
    }
}

/// Print an error and, for an exhausted retry budget, a hint to back off.
fn report_error(err: &anyhow::Error) {
    eprintln!("{} {err:#}", style("Error:").red().bold());

    let unreachable = err.chain().any(|cause| {
        cause
            .downcast_ref::<breezer::Error>()
            .is_some_and(breezer::Error::is_max_tries_exceeded)
    });
    if unreachable {
        eprintln!(
            "  {} the breezer is unreachable right now; wait a while before trying again.",
            style("Hint:").yellow()
        );
    }
}

/// Combine flags, environment and configuration files.
fn resolve_target(cli: &Cli, config: &Config) -> Result<Target> {
    let model = match (cli.model, config.device.model.as_deref()) {
        (Some(model), _) => model.into(),
        (None, Some(name)) => name
            .parse::<DeviceModel>()
            .with_context(|| format!("Invalid model '{name}' in configuration"))?,
        (None, None) => DeviceModel::default(),
    };

    let address = match cli.address.clone().or_else(|| config.device.address.clone()) {
        Some(address) => address,
        None if cli.simulate => SIMULATED_ADDRESS.to_string(),
        None => bail!(
            "No device address given. Use --address, BREEZER_ADDRESS or [device] address in breezer.toml"
        ),
    };

    let mut client = config.client_config();
    if let Some(tries) = cli.tries {
        client = client.with_max_tries(tries);
    }

    Ok(Target {
        address,
        model,
        client,
    })
}

/// Create the client and move it onto its worker.
fn open(cli: &Cli, target: &Target) -> Result<DeviceWorker> {
    let client = if cli.simulate {
        let link = SimulatedBreezer::new(target.model);
        target
            .model
            .create_client_with_link(link, &target.address, target.client.clone())
    } else {
        open_device(target)?
    };

    let worker = DeviceWorker::spawn(client)?;
    Ok(match cli.timeout {
        Some(secs) => worker.with_reply_timeout(Duration::from_secs(secs)),
        None => worker,
    })
}

#[cfg(feature = "ble")]
fn open_device(target: &Target) -> Result<Box<dyn Breezer>> {
    target
        .model
        .create_client(&target.address, target.client.clone())
        .context("Failed to open the Bluetooth adapter")
}

#[cfg(not(feature = "ble"))]
fn open_device(_target: &Target) -> Result<Box<dyn Breezer>> {
    bail!("This build has no Bluetooth support. Rebuild with `--features ble` or use --simulate")
}

/// Spinner shown while waiting for the device.
fn spinner(cli: &Cli, message: String) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap(),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Get command implementation.
fn cmd_get(cli: &Cli, target: &Target, json: bool) -> Result<()> {
    let worker = open(cli, target)?;

    let pb = spinner(
        cli,
        format!("Reading {} at {}", target.model, target.address),
    );
    let state = worker.get(false);
    pb.finish_and_clear();
    let state = state.with_context(|| format!("Failed to read {}", target.address))?;

    if json {
        output::print_json(&state)
    } else {
        output::print_state(&state);
        Ok(())
    }
}

/// Set command implementation.
fn cmd_set(cli: &Cli, target: &Target, changes: &StateChanges, json: bool) -> Result<()> {
    if changes.is_empty() && !cli.quiet {
        eprintln!(
            "{} No changes given, writing the current state back",
            style("ℹ").blue()
        );
    }

    let worker = open(cli, target)?;

    let pb = spinner(
        cli,
        format!("Updating {} at {}", target.model, target.address),
    );
    let state = worker.set(changes.clone());
    pb.finish_and_clear();
    let state = state.with_context(|| format!("Failed to update {}", target.address))?;

    if !cli.quiet && !json {
        eprintln!("{} Settings applied", style("✓").green());
    }
    if json {
        output::print_json(&state)
    } else {
        output::print_state(&state);
        Ok(())
    }
}

/// Pair command implementation.
fn cmd_pair(cli: &Cli, target: &Target) -> Result<()> {
    let worker = open(cli, target)?;

    let pb = spinner(
        cli,
        format!("Pairing with {} at {}", target.model, target.address),
    );
    let result = worker.pair();
    pb.finish_and_clear();
    result.with_context(|| format!("Failed to pair with {}", target.address))?;

    if !cli.quiet {
        eprintln!(
            "{} Paired with {}",
            style("✓").green(),
            style(&target.address).cyan()
        );
    }
    Ok(())
}
