//! Print command: stream the board's console to stdout until Ctrl-C.

use anyhow::{Context, Result};
use console::style;
use std::io;
use wandflash::{CancelToken, Error, FlashSession, Port};

/// Install a Ctrl-C handler that trips the returned token.
pub(crate) fn cancel_on_ctrlc() -> Result<CancelToken> {
    let token = CancelToken::new();
    let handler = token.clone();
    ctrlc::set_handler(move || handler.cancel()).context("Failed to install Ctrl-C handler")?;
    Ok(token)
}

/// Print device output until `cancel` is tripped.
///
/// An unsupported link is reported and is not an error for the caller.
pub(crate) fn cmd_print<P: Port>(
    quiet: bool,
    session: &mut FlashSession<P>,
    cancel: &CancelToken,
) -> Result<(), Error> {
    if !quiet {
        eprintln!(
            "{} Printing output of {} {}",
            style("📡").cyan(),
            style(session.port().name()).green(),
            style("(Ctrl-C to exit)").dim()
        );
    }

    let mut stdout = io::stdout().lock();
    match session.print_output(&mut stdout, cancel) {
        Ok(_) => Ok(()),
        Err(e @ Error::Unsupported(_)) => {
            eprintln!("{} {e}", style("Error:").red().bold());
            Ok(())
        },
        Err(e) if e.is_device_not_found() => {
            eprintln!(
                "{} Error while establishing communication with device: {e}",
                style("Error:").red().bold()
            );
            Err(e)
        },
        Err(e) => {
            eprintln!(
                "{} Physical communication with the device error: {e}",
                style("Error:").red().bold()
            );
            Err(e)
        },
    }
}
