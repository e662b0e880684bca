//! In-memory window backend for tests

use std::collections::VecDeque;

use super::{RawHandle, WindowBackend, WindowSpec};
use crate::error::OverlayError;
use crate::hotkey::VirtualKey;
use crate::input::{Modifiers, NativeMessage, msg};

/// Records every call and replays scripted message batches, one per pump.
#[derive(Debug, Default)]
pub(crate) struct FakeWindow {
    pub spec: WindowSpec,
    pub ex_style: u32,
    pub style_writes: usize,
    pub size: (u32, u32),
    pub batches: VecDeque<Vec<NativeMessage>>,
    /// Post WM_QUIT once the scripted batches run out
    pub quit_when_idle: bool,
    pub keys_down: Vec<VirtualKey>,
    pub modifiers: Modifiers,
    pub transparency_applied: bool,
    pub shown: bool,
    pub topmost_calls: usize,
    pub activations: usize,
    pub destroy_calls: usize,
}

impl FakeWindow {
    pub fn push_batch(&mut self, batch: Vec<NativeMessage>) {
        self.batches.push_back(batch);
    }
}

impl WindowBackend for FakeWindow {
    fn create(spec: &WindowSpec, ex_style: u32) -> Result<Self, OverlayError> {
        if spec.title == "fail" {
            return Err(OverlayError::Platform {
                call: "CreateWindowExW",
                reason: "scripted failure".to_string(),
            });
        }
        Ok(Self {
            spec: spec.clone(),
            ex_style,
            size: (spec.width, spec.height),
            ..Default::default()
        })
    }

    fn owner_handle(&self) -> RawHandle {
        0x100
    }

    fn overlay_handle(&self) -> RawHandle {
        0x200
    }

    fn ex_style(&self) -> u32 {
        self.ex_style
    }

    fn set_ex_style(&mut self, style: u32) {
        self.ex_style = style;
        self.style_writes += 1;
    }

    fn apply_transparency(&mut self) -> Result<(), OverlayError> {
        self.transparency_applied = true;
        Ok(())
    }

    fn show_no_activate(&mut self) {
        self.shown = true;
    }

    fn set_topmost(&mut self) {
        self.topmost_calls += 1;
    }

    fn activate(&mut self) {
        self.activations += 1;
    }

    fn client_size(&self) -> (u32, u32) {
        self.size
    }

    fn drain_messages(&mut self, out: &mut Vec<NativeMessage>) {
        match self.batches.pop_front() {
            Some(batch) => out.extend(batch),
            None if self.quit_when_idle => out.push(NativeMessage::new(msg::WM_QUIT, 0, 0)),
            None => {}
        }
    }

    fn is_key_down(&self, vk: VirtualKey) -> bool {
        self.keys_down.contains(&vk)
    }

    fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    fn destroy(&mut self) {
        self.destroy_calls += 1;
    }
}
