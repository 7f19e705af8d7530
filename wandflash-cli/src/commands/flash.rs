//! Flash command implementation.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use wandflash::{Error, FlashSession, Port};

use crate::{Cli, use_fancy_output};

fn progress_bar(cli: &Cli) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} packets",
    )
    .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("#>-"));
    pb.set_style(style);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// User-facing message for a failed flash.
pub(crate) fn flash_error_message(err: &Error) -> String {
    let what = match err {
        Error::ProtocolRejected | Error::CancelledByTarget | Error::TooManyRetries { .. } => {
            "Xmodem transmission error"
        },
        Error::DeviceNotFound(_) => "Error while establishing communication with device",
        Error::BinaryNotFound { .. } => "Error opening the binary image file",
        Error::FileRead(_) => "Binary file reading error",
        Error::Channel(_) | Error::Serial(_) => "Physical communication with the device error",
        _ => "Flash error",
    };
    format!("{what}: {err}. Flash operation aborted.")
}

/// Flash `image` through `session`.
///
/// Failures are reported here; the error is returned so the caller can
/// pick the exit code.
pub(crate) fn cmd_flash<P: Port>(
    cli: &Cli,
    session: &mut FlashSession<P>,
    image: &Path,
) -> Result<(), Error> {
    if !cli.quiet {
        eprintln!(
            "{} Flashing {} over {} link {}",
            style("📦").cyan(),
            image.display(),
            session.link(),
            style(session.port().name()).green()
        );
    }

    let pb = progress_bar(cli);
    let result = session.flash(image, |sent, total| {
        pb.set_length(u64::from(total));
        pb.set_position(u64::from(sent));
    });

    match result {
        Ok(report) => {
            pb.finish();
            if !cli.quiet {
                if let Some(banner) = &report.banner {
                    eprintln!("{} Target: {banner}", style("ℹ").blue());
                }
                eprintln!(
                    "{} Flash completed, {} packets sent. Rebooting.",
                    style("✓").green().bold(),
                    report.packets_sent
                );
            }
            Ok(())
        },
        Err(e) if e.is_soft() => {
            pb.abandon();
            eprintln!(
                "{} {e}. The image was transferred and was likely flashed.",
                style("Warning:").yellow().bold()
            );
            Err(e)
        },
        Err(e) => {
            pb.abandon();
            eprintln!("{} {}", style("Error:").red().bold(), flash_error_message(&e));
            Err(e)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_message_transmission_errors() {
        for err in [
            Error::ProtocolRejected,
            Error::CancelledByTarget,
            Error::TooManyRetries {
                block: 2,
                attempts: 5,
            },
        ] {
            let msg = flash_error_message(&err);
            assert!(msg.starts_with("Xmodem transmission error: "), "{msg}");
            assert!(msg.ends_with(". Flash operation aborted."));
        }
    }

    #[test]
    fn test_message_device_not_found() {
        let msg = flash_error_message(&Error::DeviceNotFound("bootloader did not answer".into()));
        assert!(msg.starts_with("Error while establishing communication with device"));
        assert!(msg.contains("bootloader did not answer"));
    }

    #[test]
    fn test_message_binary_errors() {
        let missing = Error::BinaryNotFound {
            path: "fw.bin".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(flash_error_message(&missing).starts_with("Error opening the binary image file"));

        let read = Error::FileRead(io::Error::other("bad sector"));
        assert!(flash_error_message(&read).starts_with("Binary file reading error"));
    }

    #[test]
    fn test_message_link_error() {
        let err = Error::Channel(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(flash_error_message(&err).starts_with("Physical communication with the device error"));
    }
}
