//! Command-line flags
//!
//! Every flag overrides one field of the stored settings for this run;
//! `--save` writes the result back.

use clap::Parser;
use veil_types::OverlaySettings;

#[derive(Debug, Parser)]
#[command(version, about = "Transparent, click-through desktop overlay")]
pub struct Cli {
    /// Client width in pixels (defaults to the primary screen width)
    #[arg(long)]
    pub width: Option<u32>,

    /// Client height in pixels (defaults to the primary screen height)
    #[arg(long)]
    pub height: Option<u32>,

    /// Start with click-through disabled
    #[arg(long)]
    pub interactive: bool,

    /// Key that flips click-through, e.g. "Insert" or "F9"
    #[arg(long, value_name = "KEY")]
    pub toggle_key: Option<String>,

    /// Key that closes the overlay
    #[arg(long, value_name = "KEY", conflicts_with = "no_exit_key")]
    pub exit_key: Option<String>,

    /// Disable the exit hotkey
    #[arg(long)]
    pub no_exit_key: bool,

    #[arg(long)]
    pub title: Option<String>,

    /// Show the overlay in Alt-Tab and the taskbar
    #[arg(long)]
    pub show_in_switcher: bool,

    /// Hide the pass-through mode label
    #[arg(long)]
    pub no_indicator: bool,

    /// Store the resulting settings as the new defaults
    #[arg(long)]
    pub save: bool,
}

impl Cli {
    pub fn apply(&self, settings: &mut OverlaySettings) {
        if let Some(width) = self.width {
            settings.width = Some(width);
        }
        if let Some(height) = self.height {
            settings.height = Some(height);
        }
        if self.interactive {
            settings.click_through = false;
        }
        if let Some(key) = &self.toggle_key {
            settings.toggle_key = key.clone();
        }
        if let Some(key) = &self.exit_key {
            settings.exit_key = Some(key.clone());
        }
        if self.no_exit_key {
            settings.exit_key = None;
        }
        if let Some(title) = &self.title {
            settings.title = title.clone();
        }
        if self.show_in_switcher {
            settings.hide_from_alt_tab = false;
        }
        if self.no_indicator {
            settings.show_indicator = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("veil").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn test_no_flags_keep_stored_settings() {
        let stored = OverlaySettings {
            width: Some(1024),
            toggle_key: "F9".to_string(),
            ..Default::default()
        };
        let mut settings = stored.clone();
        parse(&[]).apply(&mut settings);
        assert_eq!(settings, stored);
    }

    #[test]
    fn test_flags_override_fields() {
        let mut settings = OverlaySettings::default();
        parse(&[
            "--width",
            "800",
            "--height",
            "600",
            "--interactive",
            "--toggle-key",
            "F8",
            "--title",
            "hud",
            "--no-indicator",
        ])
        .apply(&mut settings);

        assert_eq!(settings.resolved_size((1920, 1080)), (800, 600));
        assert!(!settings.click_through);
        assert_eq!(settings.toggle_key, "F8");
        assert_eq!(settings.title, "hud");
        assert!(!settings.show_indicator);
        assert!(settings.hide_from_alt_tab);
    }

    #[test]
    fn test_exit_key_flags() {
        let mut settings = OverlaySettings::default();
        parse(&["--no-exit-key"]).apply(&mut settings);
        assert_eq!(settings.exit_key, None);

        parse(&["--exit-key", "Escape"]).apply(&mut settings);
        assert_eq!(settings.exit_key.as_deref(), Some("Escape"));

        assert!(
            Cli::try_parse_from(["veil", "--exit-key", "End", "--no-exit-key"]).is_err(),
            "conflicting exit key flags"
        );
    }
}
