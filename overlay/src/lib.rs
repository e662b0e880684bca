//! Veil Overlay Library
//!
//! Transparent, topmost, optionally click-through desktop overlay hosting an
//! egui interface, composited by the desktop compositor.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    overlay                          │
//! │         OverlayBuilder, OverlayApp                  │
//! │     (settings → native backends → frame loop)       │
//! ├─────────────────────────────────────────────────────┤
//! │                    frame                            │
//! │                  FrameLoop                          │
//! │   (pump → resize → egui pass → paint → present)     │
//! ├──────────────────────────┬──────────────────────────┤
//! │        painter/          │      composition         │
//! │  D3D11 pipeline, texture │  swap chain + visual     │
//! │  cache, draw preparation │  tree bound to the hwnd  │
//! ├──────────────────────────┴──────────────────────────┤
//! │             platform/, input, hotkey                │
//! │   owner + overlay windows, style state machine,     │
//! │       message decoding, edge-triggered hotkeys      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Only Windows has native backends. The state machine, input translation,
//! draw preparation and frame loop are portable and tested with in-memory
//! backends.

pub mod composition;
pub mod error;
pub mod frame;
pub mod hotkey;
pub mod input;
pub mod overlay;
pub mod painter;
pub mod platform;

#[cfg(test)]
mod frame_tests;

// Re-export commonly used types
pub use error::OverlayError;
pub use frame::{FrameLoop, FrameStatus, ModeIndicator};
pub use overlay::{Hotkeys, OverlayApp, OverlayBuilder};
pub use platform::{Lifecycle, WindowManager, WindowSpec, WindowState};

pub use egui;
pub use veil_types::OverlaySettings;
