//! Hotkey names and edge-triggered polling
//!
//! The overlay is usually click-through and never focused, so hotkeys are
//! sampled with an asynchronous key-state query once per frame rather than
//! received as key messages.

use crate::error::OverlayError;

/// Virtual-key code as used by the Win32 key-state APIs.
pub type VirtualKey = u16;

pub const VK_BACK: VirtualKey = 0x08;
pub const VK_TAB: VirtualKey = 0x09;
pub const VK_RETURN: VirtualKey = 0x0D;
pub const VK_SHIFT: VirtualKey = 0x10;
pub const VK_CONTROL: VirtualKey = 0x11;
pub const VK_MENU: VirtualKey = 0x12;
pub const VK_PAUSE: VirtualKey = 0x13;
pub const VK_ESCAPE: VirtualKey = 0x1B;
pub const VK_SPACE: VirtualKey = 0x20;
pub const VK_PRIOR: VirtualKey = 0x21;
pub const VK_NEXT: VirtualKey = 0x22;
pub const VK_END: VirtualKey = 0x23;
pub const VK_HOME: VirtualKey = 0x24;
pub const VK_LEFT: VirtualKey = 0x25;
pub const VK_UP: VirtualKey = 0x26;
pub const VK_RIGHT: VirtualKey = 0x27;
pub const VK_DOWN: VirtualKey = 0x28;
pub const VK_INSERT: VirtualKey = 0x2D;
pub const VK_DELETE: VirtualKey = 0x2E;
pub const VK_F1: VirtualKey = 0x70;
pub const VK_F10: VirtualKey = 0x79;
pub const VK_SCROLL: VirtualKey = 0x91;

/// Parse a key name from the settings file into a virtual-key code.
///
/// Names are case-insensitive. Letters and digits map to their ASCII codes.
pub fn parse_key_name(name: &str) -> Result<VirtualKey, OverlayError> {
    let trimmed = name.trim();
    let upper = trimmed.to_ascii_uppercase();

    let named = match upper.as_str() {
        "INSERT" | "INS" => Some(VK_INSERT),
        "DELETE" | "DEL" => Some(VK_DELETE),
        "HOME" => Some(VK_HOME),
        "END" => Some(VK_END),
        "PAGEUP" | "PGUP" => Some(VK_PRIOR),
        "PAGEDOWN" | "PGDN" => Some(VK_NEXT),
        "PAUSE" => Some(VK_PAUSE),
        "SCROLLLOCK" => Some(VK_SCROLL),
        "ESCAPE" | "ESC" => Some(VK_ESCAPE),
        "TAB" => Some(VK_TAB),
        "SPACE" => Some(VK_SPACE),
        "ENTER" | "RETURN" => Some(VK_RETURN),
        "BACKSPACE" => Some(VK_BACK),
        _ => None,
    };
    if let Some(vk) = named {
        return Ok(vk);
    }

    // Function keys F1..F24 are contiguous
    if let Some(n) = upper
        .strip_prefix('F')
        .and_then(|number| number.parse::<u16>().ok())
    {
        if (1..=24).contains(&n) {
            return Ok(VK_F1 + n - 1);
        }
    }

    let mut chars = upper.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_uppercase() || c.is_ascii_digit() {
            return Ok(c as VirtualKey);
        }
    }

    Err(OverlayError::InvalidHotkey(trimmed.to_string()))
}

/// Short display name for a virtual-key code, used by the mode indicator.
pub fn key_label(vk: VirtualKey) -> String {
    match vk {
        VK_INSERT => "Ins".to_string(),
        VK_DELETE => "Del".to_string(),
        VK_HOME => "Home".to_string(),
        VK_END => "End".to_string(),
        VK_PRIOR => "PgUp".to_string(),
        VK_NEXT => "PgDn".to_string(),
        VK_PAUSE => "Pause".to_string(),
        VK_SCROLL => "ScrLk".to_string(),
        VK_ESCAPE => "Esc".to_string(),
        VK_TAB => "Tab".to_string(),
        VK_SPACE => "Space".to_string(),
        VK_RETURN => "Enter".to_string(),
        VK_BACK => "Backspace".to_string(),
        vk if (VK_F1..VK_F1 + 24).contains(&vk) => format!("F{}", vk - VK_F1 + 1),
        vk if (0x30..=0x39).contains(&vk) || (0x41..=0x5A).contains(&vk) => {
            char::from(vk as u8).to_string()
        }
        vk => format!("VK {:#04x}", vk),
    }
}

/// Edge detector for a polled hotkey.
///
/// Fires once per press, no matter how many frames the key stays down.
#[derive(Debug, Clone, Copy)]
pub struct HotkeyLatch {
    key: VirtualKey,
    was_down: bool,
}

impl HotkeyLatch {
    pub fn new(key: VirtualKey) -> Self {
        Self {
            key,
            was_down: false,
        }
    }

    pub fn key(&self) -> VirtualKey {
        self.key
    }

    /// Feed the current key state; returns true on the rising edge.
    pub fn poll(&mut self, down: bool) -> bool {
        let fired = down && !self.was_down;
        self.was_down = down;
        fired
    }
}
