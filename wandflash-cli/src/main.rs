//! wandflash CLI - Command-line tool for flashing Wandstem boards.
//!
//! ## Features
//!
//! - Flash a raw binary image through the board's XMODEM bootloader
//! - Print the board's console output
//! - USB and serial adapter links, with auto-detection
//! - Environment variable and config file support

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use wandflash::{FlashSession, LinkMode, NativePort, SessionConfig, resolve_device};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;

use config::Config;

/// CLI errors that map to a failing exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Nothing to do, or conflicting arguments.
    #[error("{0}")]
    Usage(String),
    /// Configuration file named on the command line is unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// wandflash - Flash firmware onto Wandstem boards.
///
/// Environment variables:
///   WANDFLASH_DEVICE   - Device node (e.g. /dev/ttyUSB0)
///   WANDFLASH_BAUD     - Baud rate
///   WANDFLASH_MODE     - Link mode (auto, usb, serial)
#[derive(Parser)]
#[command(name = "wandflash")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Examples:\n  wandflash -f firmware.bin\n  wandflash -m serial -f firmware.bin -p")]
pub(crate) struct Cli {
    /// Binary image to flash.
    #[arg(short, long, value_name = "PATH")]
    flash: Option<PathBuf>,

    /// Print the device output until Ctrl-C (serial links only).
    #[arg(short, long)]
    print: bool,

    /// Link mode: a|auto, u|usb, s|serial. Ignored when --device is given.
    #[arg(short, long, value_parser = parse_mode, env = "WANDFLASH_MODE")]
    mode: Option<LinkMode>,

    /// Device node (link kind is derived from the path).
    #[arg(short, long, env = "WANDFLASH_DEVICE")]
    device: Option<String>,

    /// Baud rate (default depends on the link kind).
    #[arg(
        short,
        long,
        env = "WANDFLASH_BAUD",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
}

fn parse_mode(s: &str) -> Result<LinkMode, String> {
    s.parse::<LinkMode>().map_err(|e| e.to_string())
}

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

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Help and usage errors both exit with 1; only --version succeeds.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        },
    };

    init_logging(&cli);
    debug!(
        "wandflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            if let Some(CliError::Usage(_)) = err.downcast_ref::<CliError>() {
                let _ = Cli::command().print_help();
                eprintln!();
            }
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::FAILURE
        },
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    if cli.flash.is_none() && !cli.print {
        return Err(CliError::Usage("Nothing to do: pass --flash and/or --print".to_string()).into());
    }

    // Load configuration
    let config = match &cli.config_path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    let mode = cli.mode.or(config.connection.mode).unwrap_or_default();
    let device = cli
        .device
        .as_deref()
        .or(config.connection.device.as_deref());
    let baud = cli.baud.or(config.connection.baud);

    let detected = match resolve_device(mode, device, baud) {
        Ok(detected) => detected,
        Err(e) => {
            eprintln!(
                "{} Error while establishing communication with device: {e}",
                style("Error:").red().bold()
            );
            return Ok(ExitCode::FAILURE);
        },
    };
    debug!(
        "Selected {} at {} baud ({} link)",
        detected.path, detected.baud, detected.link
    );

    let port = NativePort::new(detected.serial_config(config.read_timeout()));
    let session_config = SessionConfig::default().with_handshake(config.handshake_config());
    let mut session = FlashSession::with_config(port, detected.link, session_config);

    let mut code = ExitCode::SUCCESS;

    if let Some(image) = &cli.flash {
        if let Err(e) = commands::flash::cmd_flash(cli, &mut session, image) {
            if e.is_device_not_found() {
                code = ExitCode::FAILURE;
            }
        }
    }

    if cli.print {
        let cancel = commands::monitor::cancel_on_ctrlc()?;
        if let Err(e) = commands::monitor::cmd_print(cli.quiet, &mut session, &cancel) {
            if e.is_device_not_found() {
                code = ExitCode::FAILURE;
            }
        }
    }

    session.close()?;
    Ok(code)
}
