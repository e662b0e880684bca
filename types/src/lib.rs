//! Shared configuration types for veil
//!
//! This crate contains the serializable startup settings shared between the
//! overlay engine (veil-overlay) and the launcher binary.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Overlay Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Startup settings for the overlay window.
///
/// Every field only affects how the window is created; nothing here is
/// persisted back while the overlay runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlaySettings {
    /// Window title. Only visible to debugging tools since the overlay is
    /// hidden from window switchers.
    #[serde(default = "default_title")]
    pub title: String,

    /// Client width in pixels. `None` uses the primary screen width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Client height in pixels. `None` uses the primary screen height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Whether pointer input passes through the overlay on startup.
    #[serde(default = "default_true")]
    pub click_through: bool,

    /// Key name that flips click-through (e.g. "Insert", "F9").
    #[serde(default = "default_toggle_key")]
    pub toggle_key: String,

    /// Key name that closes the overlay. `None` disables the exit hotkey and
    /// is stored as `exit_key = ""` (TOML has no null).
    #[serde(default = "default_exit_key", with = "optional_key")]
    pub exit_key: Option<String>,

    /// Keep the overlay out of Alt-Tab and the taskbar.
    #[serde(default = "default_true")]
    pub hide_from_alt_tab: bool,

    /// Draw the pass-through mode label in the top-left corner.
    #[serde(default = "default_true")]
    pub show_indicator: bool,
}

fn default_true() -> bool {
    true
}

fn default_title() -> String {
    "Overlay".to_string()
}

fn default_toggle_key() -> String {
    "Insert".to_string()
}

fn default_exit_key() -> Option<String> {
    Some("F10".to_string())
}

/// Optional key names stored as plain strings. Empty or `"none"` means unset.
mod optional_key {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(key: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(key.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: None,
            height: None,
            click_through: true,
            toggle_key: default_toggle_key(),
            exit_key: default_exit_key(),
            hide_from_alt_tab: true,
            show_indicator: true,
        }
    }
}

impl OverlaySettings {
    /// Resolve the client size, falling back to the given screen size for
    /// unset dimensions. Never returns a zero dimension.
    pub fn resolved_size(&self, screen: (u32, u32)) -> (u32, u32) {
        let width = self.width.unwrap_or(screen.0).max(1);
        let height = self.height.unwrap_or(screen.1).max(1);
        (width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = OverlaySettings::default();
        assert_eq!(settings.toggle_key, "Insert");
        assert_eq!(settings.exit_key.as_deref(), Some("F10"));
        assert!(settings.click_through);
        assert!(settings.hide_from_alt_tab);
        assert!(settings.width.is_none());
    }

    #[test]
    fn test_resolved_size_uses_screen_for_missing_dimensions() {
        let settings = OverlaySettings {
            width: Some(800),
            ..Default::default()
        };
        assert_eq!(settings.resolved_size((1920, 1080)), (800, 1080));
        assert_eq!(OverlaySettings::default().resolved_size((0, 0)), (1, 1));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: OverlaySettings = toml::from_str("width = 640\nclick_through = false\n")
            .expect("partial settings should parse");
        assert_eq!(settings.width, Some(640));
        assert!(!settings.click_through);
        assert_eq!(settings.toggle_key, "Insert");
        assert!(settings.show_indicator);
        assert_eq!(settings.exit_key.as_deref(), Some("F10"));
    }

    #[test]
    fn test_disabled_exit_key_survives_toml_round_trip() {
        let settings = OverlaySettings {
            exit_key: None,
            ..Default::default()
        };
        let text = toml::to_string(&settings).expect("settings should serialize");
        assert!(text.contains("exit_key = \"\""), "unexpected toml: {text}");

        let reloaded: OverlaySettings = toml::from_str(&text).expect("saved settings should parse");
        assert_eq!(reloaded.exit_key, None);
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_exit_key_none_spelling_disables_hotkey() {
        let settings: OverlaySettings =
            toml::from_str("exit_key = \"None\"\n").expect("settings should parse");
        assert_eq!(settings.exit_key, None);

        let settings: OverlaySettings =
            toml::from_str("exit_key = \" F12 \"\n").expect("settings should parse");
        assert_eq!(settings.exit_key.as_deref(), Some("F12"));
    }
}
