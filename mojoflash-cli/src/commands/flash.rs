//! Flash and erase command implementations.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use mojoflash::{Command, MojoFlasher, NativePort, Phase, SourceImage};
use std::fs::File;
use std::path::Path;

use crate::config::Config;
use crate::{Cli, close_flasher, open_flasher, use_fancy_output};

/// Pick the bootloader command for the flash flags.
pub(crate) fn select_command(verify: bool, ram: bool) -> Command {
    if ram {
        Command::FlashToRamOnly
    } else if verify {
        Command::FlashAndVerify
    } else {
        Command::FlashAndBoot
    }
}

fn progress_bar(cli: &Cli, len: u64) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

fn phase_message(phase: Phase) -> &'static str {
    match phase {
        Phase::Verify => "Verifying",
        _ => "Writing",
    }
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &Config,
    image_path: &Path,
    verify: bool,
    ram: bool,
) -> Result<()> {
    let command = select_command(verify || config.flash.verify.unwrap_or(false), ram);

    let mut image = SourceImage::open(image_path)
        .with_context(|| format!("Failed to open image {}", image_path.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} Loaded {} ({} bytes)",
            style("📦").cyan(),
            image_path.display(),
            image.len()
        );
    }

    let mut flasher = open_flasher(cli, config)?;
    let result = run_flash(cli, &mut flasher, command, &mut image);
    close_flasher(&mut flasher);
    result?;

    if !cli.quiet {
        let done = match command {
            Command::FlashToRamOnly => "Image loaded to RAM",
            Command::FlashAndVerify => "Flashed and verified",
            _ => "Flashing complete",
        };
        eprintln!("\n{} {done}", style("🎉").green().bold());
    }

    Ok(())
}

fn run_flash(
    cli: &Cli,
    flasher: &mut MojoFlasher<NativePort>,
    command: Command,
    image: &mut SourceImage<File>,
) -> Result<()> {
    connect(cli, flasher)?;

    let pb = progress_bar(cli, u64::from(image.len()));
    let mut current = None;

    let result = flasher.flash(command, image, |phase, done, total| {
        if current != Some(phase) {
            current = Some(phase);
            pb.set_length(total);
            pb.set_position(0);
            pb.set_message(phase_message(phase));
        }
        pb.set_position(done);
    });

    match result {
        Ok(()) => {
            pb.finish_with_message("Done");
            Ok(())
        },
        Err(err) => {
            pb.abandon();
            debug!("Session ended in {:?}", flasher.state());
            Err(err.into())
        },
    }
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, config: &Config) -> Result<()> {
    let mut flasher = open_flasher(cli, config)?;

    let result = connect(cli, &mut flasher).and_then(|()| {
        if !cli.quiet {
            eprintln!("{} Erasing flash...", style("🗑").red());
        }
        flasher
            .erase()
            .map_err(Into::into)
    });
    close_flasher(&mut flasher);
    result?;

    if !cli.quiet {
        eprintln!("\n{} Flash erased", style("✓").green().bold());
    }

    Ok(())
}

fn connect(cli: &Cli, flasher: &mut MojoFlasher<NativePort>) -> Result<()> {
    if !cli.quiet {
        eprintln!("{} Resetting board into bootloader...", style("⏳").yellow());
    }
    flasher.connect()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_command() {
        assert_eq!(select_command(false, false), Command::FlashAndBoot);
        assert_eq!(select_command(true, false), Command::FlashAndVerify);
        assert_eq!(select_command(false, true), Command::FlashToRamOnly);
        // Config-level verify does not override an explicit RAM load.
        assert_eq!(select_command(true, true), Command::FlashToRamOnly);
    }

    #[test]
    fn test_phase_message() {
        assert_eq!(phase_message(Phase::Transfer), "Writing");
        assert_eq!(phase_message(Phase::Verify), "Verifying");
    }
}
