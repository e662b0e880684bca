//! Native message decoding and egui input translation
//!
//! The window backend hands over raw `(message, wparam, lparam)` triples.
//! [`MessageDecoder`] turns the input-relevant ones into [`RawInputEvent`]s,
//! and [`InputTranslator`] packs a frame's worth of them into egui's
//! `RawInput`.

use std::time::Instant;

use crate::hotkey::{VK_CONTROL, VK_MENU, VK_SHIFT, VirtualKey};

/// Largest texture side the painter accepts, reported to egui.
pub const MAX_TEXTURE_SIDE: usize = 8192;

/// One wheel notch in native units.
const WHEEL_DELTA: f32 = 120.0;

/// Message identifiers the overlay understands.
///
/// Values match the Win32 headers so decoding stays testable on any host.
pub mod msg {
    pub const WM_DESTROY: u32 = 0x0002;
    pub const WM_SIZE: u32 = 0x0005;
    pub const WM_ACTIVATE: u32 = 0x0006;
    pub const WM_CLOSE: u32 = 0x0010;
    pub const WM_QUIT: u32 = 0x0012;
    pub const WM_ENDSESSION: u32 = 0x0016;
    pub const WM_KEYDOWN: u32 = 0x0100;
    pub const WM_KEYUP: u32 = 0x0101;
    pub const WM_CHAR: u32 = 0x0102;
    pub const WM_SYSKEYDOWN: u32 = 0x0104;
    pub const WM_SYSKEYUP: u32 = 0x0105;
    pub const WM_MOUSEMOVE: u32 = 0x0200;
    pub const WM_LBUTTONDOWN: u32 = 0x0201;
    pub const WM_LBUTTONUP: u32 = 0x0202;
    pub const WM_RBUTTONDOWN: u32 = 0x0204;
    pub const WM_RBUTTONUP: u32 = 0x0205;
    pub const WM_MBUTTONDOWN: u32 = 0x0207;
    pub const WM_MBUTTONUP: u32 = 0x0208;
    pub const WM_MOUSEWHEEL: u32 = 0x020A;
    pub const WM_MOUSEHWHEEL: u32 = 0x020E;
    pub const WM_APP: u32 = 0x8000;

    /// Re-posted by the window procedure when the client area changes size.
    /// `lparam` carries the new size packed like `WM_SIZE`.
    pub const WM_APP_RESIZED: u32 = WM_APP + 1;

    /// Re-posted by the window procedure on activation changes.
    pub const WM_APP_ACTIVATED: u32 = WM_APP + 2;
}

/// A message retrieved from the native queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeMessage {
    pub id: u32,
    pub wparam: usize,
    pub lparam: isize,
}

impl NativeMessage {
    pub fn new(id: u32, wparam: usize, lparam: isize) -> Self {
        Self { id, wparam, lparam }
    }

    /// Signed low word of `lparam` (client x for mouse messages).
    pub fn lparam_x(&self) -> i32 {
        (self.lparam & 0xFFFF) as u16 as i16 as i32
    }

    /// Signed high word of `lparam` (client y for mouse messages).
    pub fn lparam_y(&self) -> i32 {
        ((self.lparam >> 16) & 0xFFFF) as u16 as i16 as i32
    }

    /// Unsigned `(low, high)` words of `lparam`, as packed by `WM_SIZE`.
    pub fn lparam_size(&self) -> (u32, u32) {
        let low = (self.lparam & 0xFFFF) as u32;
        let high = ((self.lparam >> 16) & 0xFFFF) as u32;
        (low, high)
    }

    /// Signed high word of `wparam` (wheel delta).
    fn wparam_high_signed(&self) -> i16 {
        ((self.wparam >> 16) & 0xFFFF) as u16 as i16
    }
}

/// Pack a width/height pair the way `WM_SIZE` does.
pub fn pack_size(width: u32, height: u32) -> isize {
    ((width & 0xFFFF) | ((height & 0xFFFF) << 16)) as isize
}

/// Keyboard modifier state sampled when a message is decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    /// Sample Ctrl, Alt and Shift through a key-state query.
    pub fn sample(is_down: impl Fn(VirtualKey) -> bool) -> Self {
        Self {
            ctrl: is_down(VK_CONTROL),
            alt: is_down(VK_MENU),
            shift: is_down(VK_SHIFT),
        }
    }

    fn to_egui(self) -> egui::Modifiers {
        egui::Modifiers {
            alt: self.alt,
            ctrl: self.ctrl,
            shift: self.shift,
            mac_cmd: false,
            command: self.ctrl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Input event decoded from a native message, in client pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInputEvent {
    PointerMoved {
        x: f32,
        y: f32,
    },
    PointerButton {
        x: f32,
        y: f32,
        button: MouseButton,
        pressed: bool,
        modifiers: Modifiers,
    },
    /// Wheel movement in notches; positive `dy` scrolls up, positive `dx`
    /// scrolls right.
    Wheel {
        dx: f32,
        dy: f32,
        modifiers: Modifiers,
    },
    Key {
        vk: VirtualKey,
        pressed: bool,
        repeat: bool,
        modifiers: Modifiers,
    },
    Text(char),
}

/// Stateful decoder; holds a pending UTF-16 high surrogate between
/// `WM_CHAR` messages.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    pending_surrogate: Option<u16>,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an input message. Returns `None` for non-input messages and
    /// for the first half of a surrogate pair.
    pub fn decode(&mut self, m: &NativeMessage, modifiers: Modifiers) -> Option<RawInputEvent> {
        let pointer = || (m.lparam_x() as f32, m.lparam_y() as f32);
        let button = |button, pressed| {
            let (x, y) = pointer();
            Some(RawInputEvent::PointerButton {
                x,
                y,
                button,
                pressed,
                modifiers,
            })
        };

        match m.id {
            msg::WM_MOUSEMOVE => {
                let (x, y) = pointer();
                Some(RawInputEvent::PointerMoved { x, y })
            }
            msg::WM_LBUTTONDOWN => button(MouseButton::Left, true),
            msg::WM_LBUTTONUP => button(MouseButton::Left, false),
            msg::WM_RBUTTONDOWN => button(MouseButton::Right, true),
            msg::WM_RBUTTONUP => button(MouseButton::Right, false),
            msg::WM_MBUTTONDOWN => button(MouseButton::Middle, true),
            msg::WM_MBUTTONUP => button(MouseButton::Middle, false),
            msg::WM_MOUSEWHEEL => Some(RawInputEvent::Wheel {
                dx: 0.0,
                dy: m.wparam_high_signed() as f32 / WHEEL_DELTA,
                modifiers,
            }),
            msg::WM_MOUSEHWHEEL => Some(RawInputEvent::Wheel {
                dx: m.wparam_high_signed() as f32 / WHEEL_DELTA,
                dy: 0.0,
                modifiers,
            }),
            msg::WM_KEYDOWN | msg::WM_SYSKEYDOWN => Some(RawInputEvent::Key {
                vk: m.wparam as VirtualKey,
                pressed: true,
                // Bit 30: key was already down before this message
                repeat: (m.lparam >> 30) & 1 == 1,
                modifiers,
            }),
            msg::WM_KEYUP | msg::WM_SYSKEYUP => Some(RawInputEvent::Key {
                vk: m.wparam as VirtualKey,
                pressed: false,
                repeat: false,
                modifiers,
            }),
            msg::WM_CHAR => self.decode_char(m.wparam as u16),
            _ => None,
        }
    }

    fn decode_char(&mut self, unit: u16) -> Option<RawInputEvent> {
        match unit {
            0xD800..=0xDBFF => {
                self.pending_surrogate = Some(unit);
                None
            }
            0xDC00..=0xDFFF => {
                let high = self.pending_surrogate.take()?;
                char::decode_utf16([high, unit])
                    .next()
                    .and_then(Result::ok)
                    .map(RawInputEvent::Text)
            }
            _ => {
                self.pending_surrogate = None;
                char::from_u32(unit as u32).map(RawInputEvent::Text)
            }
        }
    }
}

/// Map a virtual-key code to an egui key.
pub fn key_from_vk(vk: VirtualKey) -> Option<egui::Key> {
    use egui::Key;
    use crate::hotkey::*;

    let key = match vk {
        VK_LEFT => Key::ArrowLeft,
        VK_UP => Key::ArrowUp,
        VK_RIGHT => Key::ArrowRight,
        VK_DOWN => Key::ArrowDown,
        VK_BACK => Key::Backspace,
        VK_DELETE => Key::Delete,
        VK_INSERT => Key::Insert,
        VK_RETURN => Key::Enter,
        VK_ESCAPE => Key::Escape,
        VK_TAB => Key::Tab,
        VK_SPACE => Key::Space,
        VK_HOME => Key::Home,
        VK_END => Key::End,
        VK_PRIOR => Key::PageUp,
        VK_NEXT => Key::PageDown,
        0x30..=0x39 => Key::from_name(&char::from(vk as u8).to_string())?,
        0x41..=0x5A => Key::from_name(&char::from(vk as u8).to_string())?,
        vk if (VK_F1..VK_F1 + 20).contains(&vk) => {
            Key::from_name(&format!("F{}", vk - VK_F1 + 1))?
        }
        _ => return None,
    };
    Some(key)
}

/// Builds egui `RawInput` from one frame of decoded events.
pub struct InputTranslator {
    started: Instant,
}

impl Default for InputTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl InputTranslator {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Translate a frame's events for a client area of `screen` pixels.
    pub fn raw_input(
        &self,
        events: impl IntoIterator<Item = RawInputEvent>,
        screen: [u32; 2],
        modifiers: Modifiers,
        focused: bool,
    ) -> egui::RawInput {
        let screen_rect = egui::Rect::from_min_size(
            egui::Pos2::ZERO,
            egui::vec2(screen[0] as f32, screen[1] as f32),
        );

        egui::RawInput {
            screen_rect: Some(screen_rect),
            time: Some(self.started.elapsed().as_secs_f64()),
            max_texture_side: Some(MAX_TEXTURE_SIDE),
            modifiers: modifiers.to_egui(),
            events: translate_events(events),
            focused,
            ..Default::default()
        }
    }
}

/// Translate decoded events into egui events, preserving order.
pub fn translate_events(events: impl IntoIterator<Item = RawInputEvent>) -> Vec<egui::Event> {
    let mut out = Vec::new();
    for event in events {
        match event {
            RawInputEvent::PointerMoved { x, y } => {
                out.push(egui::Event::PointerMoved(egui::pos2(x, y)));
            }
            RawInputEvent::PointerButton {
                x,
                y,
                button,
                pressed,
                modifiers,
            } => out.push(egui::Event::PointerButton {
                pos: egui::pos2(x, y),
                button: match button {
                    MouseButton::Left => egui::PointerButton::Primary,
                    MouseButton::Right => egui::PointerButton::Secondary,
                    MouseButton::Middle => egui::PointerButton::Middle,
                },
                pressed,
                modifiers: modifiers.to_egui(),
            }),
            RawInputEvent::Wheel { dx, dy, modifiers } => out.push(egui::Event::MouseWheel {
                unit: egui::MouseWheelUnit::Line,
                delta: egui::vec2(-dx, dy),
                modifiers: modifiers.to_egui(),
            }),
            RawInputEvent::Key {
                vk,
                pressed,
                repeat,
                modifiers,
            } => {
                let Some(key) = key_from_vk(vk) else {
                    continue;
                };
                if pressed && modifiers.ctrl && !modifiers.alt {
                    match key {
                        egui::Key::C => out.push(egui::Event::Copy),
                        egui::Key::X => out.push(egui::Event::Cut),
                        _ => {}
                    }
                }
                out.push(egui::Event::Key {
                    key,
                    physical_key: None,
                    pressed,
                    repeat,
                    modifiers: modifiers.to_egui(),
                });
            }
            RawInputEvent::Text(ch) => {
                if !ch.is_control() {
                    out.push(egui::Event::Text(ch.to_string()));
                }
            }
        }
    }
    out
}
