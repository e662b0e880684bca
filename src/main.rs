//! veil launcher
//!
//! Loads the stored overlay settings, applies command-line overrides and
//! runs a demo panel on the overlay.

mod cli;
mod config;
mod demo;
mod logging;

use clap::Parser;
use veil_overlay::OverlayBuilder;

use crate::cli::Cli;
use crate::demo::DemoPanel;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _log_guard = logging::init();

    let mut settings = config::load_or_default();
    cli.apply(&mut settings);
    if cli.save {
        config::store(&settings)?;
    }

    let panel = DemoPanel::new(settings.toggle_key.clone());
    if let Err(e) = OverlayBuilder::from_settings(settings).run(panel) {
        tracing::error!(error = %e, "overlay exited with an error");
        return Err(e.into());
    }

    tracing::info!("overlay closed");
    Ok(())
}
