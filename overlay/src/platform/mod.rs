//! Platform abstraction for the overlay window pair
//!
//! The overlay is two native windows: a hidden owner that keeps the overlay
//! out of window switchers, and the visible, borderless, topmost overlay
//! itself. [`WindowBackend`] is the seam to the OS; [`WindowManager`] owns
//! the state machine on top of it:
//!
//! ```text
//! Created ──show()──▶ Shown ⇄ (click-through on | off) ──close──▶ Closing ──▶ Destroyed
//! ```
//!
//! Click-through flags are the only extended styles toggled at runtime.

use crate::error::OverlayError;
use crate::hotkey::{HotkeyLatch, VirtualKey};
use crate::input::{MessageDecoder, Modifiers, NativeMessage, RawInputEvent, msg};

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(test)]
pub(crate) mod fake;


/// Extended window style bits used by the overlay.
///
/// Values match the Win32 headers.
pub mod ex_style {
    pub const TOPMOST: u32 = 0x0000_0008;
    pub const TRANSPARENT: u32 = 0x0000_0020;
    pub const TOOLWINDOW: u32 = 0x0000_0080;
    pub const APPWINDOW: u32 = 0x0004_0000;
    pub const LAYERED: u32 = 0x0008_0000;
    pub const NOREDIRECTIONBITMAP: u32 = 0x0020_0000;
    pub const NOACTIVATE: u32 = 0x0800_0000;

    /// Flags that must hold while the overlay is alive: no redirection
    /// bitmap (the compositor owns the content), layered, topmost.
    pub const CORE: u32 = NOREDIRECTIONBITMAP | LAYERED | TOPMOST;

    /// Flags toggled together by click-through.
    pub const CLICK_THROUGH: u32 = TRANSPARENT | NOACTIVATE;
}

/// Extended style for a freshly created overlay.
pub fn initial_ex_style(hide_from_alt_tab: bool, click_through: bool) -> u32 {
    let switcher = if hide_from_alt_tab {
        ex_style::TOOLWINDOW
    } else {
        ex_style::APPWINDOW
    };
    with_click_through(ex_style::CORE | switcher, click_through)
}

/// Add or remove the click-through flags, leaving every other bit alone.
pub fn with_click_through(style: u32, enabled: bool) -> u32 {
    if enabled {
        style | ex_style::CLICK_THROUGH
    } else {
        style & !ex_style::CLICK_THROUGH
    }
}

/// Whether a window-procedure message ends the message loop.
///
/// `WM_ENDSESSION` only does when `wparam` is non-zero; zero means the
/// session end was cancelled.
pub fn ends_message_loop(message: u32, wparam: usize) -> bool {
    match message {
        msg::WM_CLOSE => true,
        msg::WM_ENDSESSION => wparam != 0,
        _ => false,
    }
}

/// Native window handle as an integer, so state stays platform-neutral.
pub type RawHandle = isize;

/// Parameters the window pair is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub click_through: bool,
    pub hide_from_alt_tab: bool,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            title: "Overlay".to_string(),
            width: 800,
            height: 600,
            click_through: true,
            hide_from_alt_tab: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Shown,
    Closing,
    Destroyed,
}

impl Lifecycle {
    /// Closing and Destroyed windows no longer honor style invariants.
    pub fn is_alive(self) -> bool {
        matches!(self, Lifecycle::Created | Lifecycle::Shown)
    }
}

/// Observable state of the window pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowState {
    pub owner: RawHandle,
    pub overlay: RawHandle,
    pub ex_style: u32,
    pub click_through: bool,
    pub visible: bool,
    pub width: u32,
    pub height: u32,
    pub lifecycle: Lifecycle,
}

/// Trait that native window backends implement.
///
/// Everything here runs on the thread that created the windows; native
/// handles are tied to that thread's message queue.
pub trait WindowBackend: Sized {
    /// Register classes and create the hidden owner plus the overlay with
    /// the given extended style. Nothing is shown yet.
    fn create(spec: &WindowSpec, ex_style: u32) -> Result<Self, OverlayError>;

    fn owner_handle(&self) -> RawHandle;

    fn overlay_handle(&self) -> RawHandle;

    /// Current extended style as reported by the OS.
    fn ex_style(&self) -> u32;

    /// Replace the extended style and refresh the frame.
    fn set_ex_style(&mut self, style: u32);

    /// Opaque window-level alpha and a frame extended over the whole client
    /// area, so only per-pixel composition alpha applies.
    fn apply_transparency(&mut self) -> Result<(), OverlayError>;

    /// Show without taking activation or focus.
    fn show_no_activate(&mut self);

    fn set_topmost(&mut self);

    /// Bring the overlay to the foreground so it can receive keyboard input.
    fn activate(&mut self);

    fn client_size(&self) -> (u32, u32);

    /// Move every pending message for this thread into `out`, dispatching
    /// them to the window procedures along the way.
    fn drain_messages(&mut self, out: &mut Vec<NativeMessage>);

    /// Asynchronous key state; works without focus.
    fn is_key_down(&self, vk: VirtualKey) -> bool;

    fn modifiers(&self) -> Modifiers;

    /// Destroy both windows. Must be safe to call more than once.
    fn destroy(&mut self);
}

#[cfg(target_os = "windows")]
pub use self::windows::Win32Window as NativeWindow;

/// One pump's worth of translated input, consumed by a single frame.
#[derive(Debug)]
pub struct FrameMessages {
    events: std::vec::IntoIter<RawInputEvent>,
    /// New client size if a resize was observed during this pump.
    pub resized: Option<(u32, u32)>,
}

impl FrameMessages {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.len() == 0
    }
}

impl Iterator for FrameMessages {
    type Item = RawInputEvent;

    fn next(&mut self) -> Option<RawInputEvent> {
        self.events.next()
    }
}

/// Result of polling the runtime hotkeys for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HotkeyActions {
    pub toggled_click_through: bool,
    pub requested_exit: bool,
}

/// Owns the window pair and its state machine.
pub struct WindowManager<B: WindowBackend> {
    backend: B,
    state: WindowState,
    decoder: MessageDecoder,
    queue: Vec<NativeMessage>,
    toggle: HotkeyLatch,
    exit: Option<HotkeyLatch>,
}

impl<B: WindowBackend> WindowManager<B> {
    /// Create the owner and overlay windows. The overlay starts hidden.
    pub fn create(
        spec: &WindowSpec,
        toggle_key: VirtualKey,
        exit_key: Option<VirtualKey>,
    ) -> Result<Self, OverlayError> {
        let style = initial_ex_style(spec.hide_from_alt_tab, spec.click_through);
        let backend = B::create(spec, style)?;
        let (width, height) = backend.client_size();

        let state = WindowState {
            owner: backend.owner_handle(),
            overlay: backend.overlay_handle(),
            ex_style: backend.ex_style(),
            click_through: spec.click_through,
            visible: false,
            width: width.max(1),
            height: height.max(1),
            lifecycle: Lifecycle::Created,
        };
        tracing::debug!(
            owner = state.owner,
            overlay = state.overlay,
            width = state.width,
            height = state.height,
            ex_style = format_args!("{:#x}", state.ex_style),
            "overlay windows created"
        );

        Ok(Self {
            backend,
            state,
            decoder: MessageDecoder::new(),
            queue: Vec::with_capacity(64),
            toggle: HotkeyLatch::new(toggle_key),
            exit: exit_key.map(HotkeyLatch::new),
        })
    }

    pub fn state(&self) -> &WindowState {
        &self.state
    }

    pub fn size(&self) -> (u32, u32) {
        (self.state.width, self.state.height)
    }

    pub fn toggle_key(&self) -> VirtualKey {
        self.toggle.key()
    }

    pub fn is_closing(&self) -> bool {
        !self.state.lifecycle.is_alive()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn apply_transparency(&mut self) -> Result<(), OverlayError> {
        self.backend.apply_transparency()
    }

    /// Add or remove the click-through styles. Idempotent.
    pub fn set_click_through(&mut self, enabled: bool) {
        if !self.state.lifecycle.is_alive() {
            return;
        }

        let current = self.backend.ex_style();
        let wanted = with_click_through(current, enabled);
        if wanted != current {
            self.backend.set_ex_style(wanted);
        }
        let changed = self.state.click_through != enabled;
        self.state.click_through = enabled;
        self.state.ex_style = self.backend.ex_style();
        debug_assert_eq!(self.state.ex_style & ex_style::CORE, ex_style::CORE);

        if changed {
            if !enabled && self.state.visible {
                self.backend.activate();
            }
            tracing::info!(
                click_through = enabled,
                ex_style = format_args!("{:#x}", self.state.ex_style),
                "click-through {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }

    /// Flip click-through and return the new value.
    pub fn toggle_click_through(&mut self) -> bool {
        let enabled = !self.state.click_through;
        self.set_click_through(enabled);
        self.state.click_through
    }

    /// Show the overlay without stealing focus, then re-assert topmost.
    pub fn show(&mut self) {
        if !self.state.lifecycle.is_alive() {
            return;
        }
        self.backend.show_no_activate();
        self.backend.set_topmost();
        self.state.visible = true;
        self.state.lifecycle = Lifecycle::Shown;
        tracing::debug!(overlay = self.state.overlay, "overlay shown");
    }

    /// Enter `Closing`; observed by the frame loop at its next iteration.
    pub fn request_close(&mut self) {
        if self.state.lifecycle.is_alive() {
            tracing::info!("overlay closing");
            self.state.lifecycle = Lifecycle::Closing;
        }
    }

    /// Drain pending native messages. Window-management messages mutate
    /// state; input messages come back as this frame's event sequence.
    pub fn pump_messages(&mut self) -> FrameMessages {
        self.queue.clear();
        self.backend.drain_messages(&mut self.queue);

        let modifiers = self.backend.modifiers();
        let mut events = Vec::with_capacity(self.queue.len());
        let mut resized = None;

        for m in &self.queue {
            match m.id {
                msg::WM_QUIT | msg::WM_CLOSE | msg::WM_DESTROY => {
                    if self.state.lifecycle.is_alive() {
                        tracing::info!(message = m.id, "close requested");
                        self.state.lifecycle = Lifecycle::Closing;
                    }
                }
                msg::WM_APP_RESIZED => {
                    let (width, height) = m.lparam_size();
                    // Minimized windows report 0x0; keep the last real size
                    if width == 0 || height == 0 {
                        continue;
                    }
                    if (width, height) != (self.state.width, self.state.height) {
                        self.state.width = width;
                        self.state.height = height;
                        resized = Some((width, height));
                    }
                }
                msg::WM_APP_ACTIVATED => {
                    if self.state.lifecycle.is_alive() {
                        self.backend.set_topmost();
                    }
                }
                _ => {
                    if let Some(event) = self.decoder.decode(m, modifiers) {
                        events.push(event);
                    }
                }
            }
        }

        if let Some((width, height)) = resized {
            tracing::debug!(width, height, "overlay resized");
        }

        FrameMessages {
            events: events.into_iter(),
            resized,
        }
    }

    /// Sample the runtime hotkeys and apply them.
    pub fn poll_hotkeys(&mut self) -> HotkeyActions {
        let mut actions = HotkeyActions::default();
        if !self.state.lifecycle.is_alive() {
            return actions;
        }

        let toggle_down = self.backend.is_key_down(self.toggle.key());
        if self.toggle.poll(toggle_down) {
            self.toggle_click_through();
            actions.toggled_click_through = true;
        }

        if let Some(exit) = self.exit.as_mut() {
            let exit_down = self.backend.is_key_down(exit.key());
            if exit.poll(exit_down) {
                actions.requested_exit = true;
                self.request_close();
            }
        }
        actions
    }

    pub fn modifiers(&self) -> Modifiers {
        self.backend.modifiers()
    }

    /// Tear down both windows.
    pub fn destroy(&mut self) {
        if self.state.lifecycle == Lifecycle::Destroyed {
            return;
        }
        self.backend.destroy();
        self.state.visible = false;
        self.state.lifecycle = Lifecycle::Destroyed;
        tracing::debug!("overlay windows destroyed");
    }
}

impl<B: WindowBackend> Drop for WindowManager<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
