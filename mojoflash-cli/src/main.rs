//! mojoflash CLI - Command-line tool for programming the Mojo FPGA board.
//!
//! ## Features
//!
//! - Write a configuration image to flash, with optional readback verify
//! - Load an image into RAM without touching flash
//! - Erase flash memory
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use mojoflash::port::DEFAULT_READ_TIMEOUT;
use mojoflash::{EngineConfig, MojoFlasher, NativePort, SerialConfig, WaitStrategy};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;

use config::Config;

/// Errors raised by the CLI itself rather than the device.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Missing or contradictory user input.
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
        }
    }
}

/// mojoflash - Program the Mojo FPGA board through its serial bootloader.
///
/// Environment variables:
///   MOJOFLASH_PORT         - Default serial port
///   MOJOFLASH_TIMEOUT      - Seconds to wait for each device reply
///   MOJOFLASH_CHUNK_SIZE   - Payload chunk size in bytes
#[derive(Parser)]
#[command(name = "mojoflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port the board is attached to.
    #[arg(short, long, global = true, env = "MOJOFLASH_PORT")]
    pub(crate) port: Option<String>,

    /// Seconds to wait for each device reply.
    #[arg(long, global = true, value_name = "SECS", env = "MOJOFLASH_TIMEOUT")]
    pub(crate) timeout: Option<u64>,

    /// Payload chunk size in bytes.
    #[arg(long, global = true, value_name = "N", env = "MOJOFLASH_CHUNK_SIZE")]
    pub(crate) chunk_size: Option<usize>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Write an image to flash and boot it.
    Flash {
        /// Path to the binary image.
        image: PathBuf,

        /// Read the flash back and compare before booting.
        #[arg(long, conflicts_with = "ram")]
        verify: bool,

        /// Load into RAM only; flash is left untouched.
        #[arg(long)]
        ram: bool,
    },

    /// Erase the flash.
    Erase,

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "mojoflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

/// Setup logging based on verbosity.
fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
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
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>()
        .map_or(1, CliError::exit_code)
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash { image, verify, ram } => {
            commands::flash::cmd_flash(cli, &config, image, *verify, *ram)
        },
        Commands::Erase => commands::flash::cmd_erase(cli, &config),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Serial port from the command line, environment, or config file.
pub(crate) fn resolve_port(cli: &Cli, config: &Config) -> Result<String> {
    cli.port
        .clone()
        .or_else(|| {
            config
                .connection
                .port
                .clone()
        })
        .ok_or_else(|| {
            CliError::Usage(
                "no serial port given; use --port, set MOJOFLASH_PORT, or add \
                 `port` under [connection] in mojoflash.toml"
                    .to_string(),
            )
            .into()
        })
}

/// Engine parameters from the command line, environment, or config file.
pub(crate) fn engine_config(cli: &Cli, config: &Config) -> EngineConfig {
    let mut engine = EngineConfig::default();
    if let Some(chunk_size) = cli.chunk_size.or(config.flash.chunk_size) {
        engine = engine.with_chunk_size(chunk_size);
    }
    if let Some(secs) = cli.timeout.or(config.flash.ack_timeout_secs) {
        engine = engine.with_wait(WaitStrategy::Deadline(Duration::from_secs(secs)));
    }
    engine
}

/// Open a bootloader session on the configured port.
pub(crate) fn open_flasher(cli: &Cli, config: &Config) -> Result<MojoFlasher<NativePort>> {
    let port = resolve_port(cli, config)?;
    let read_timeout = config
        .connection
        .read_timeout_ms
        .map_or(DEFAULT_READ_TIMEOUT, Duration::from_millis);

    if !cli.quiet {
        eprintln!("{} Using port {}", style("🔌").cyan(), style(&port).green());
    }

    let serial = SerialConfig::new(&port).with_timeout(read_timeout);
    let flasher = MojoFlasher::open_with(&serial, engine_config(cli, config))?;
    Ok(flasher)
}

/// Close the session, logging rather than failing if the port is already gone.
pub(crate) fn close_flasher(flasher: &mut MojoFlasher<NativePort>) {
    if let Err(e) = flasher
        .close()
        .context("Failed to close serial port")
    {
        debug!("{e:#}");
    }
}
