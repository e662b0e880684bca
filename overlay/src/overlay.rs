//! Overlay entry point
//!
//! [`OverlayBuilder`] turns [`OverlaySettings`] into a running overlay: it
//! parses the hotkeys, creates the window pair, binds the composition
//! surface, initializes the painter and hands all three to a
//! [`FrameLoop`](crate::frame::FrameLoop). Every piece of native state lives
//! in that one loop value, so nothing is process-global.

use veil_types::OverlaySettings;

use crate::error::OverlayError;
use crate::hotkey::{VirtualKey, key_label, parse_key_name};
use crate::platform::WindowSpec;

/// Per-frame UI callback.
///
/// Implemented for any `FnMut(&egui::Context)`, so a closure is enough for
/// simple overlays.
pub trait OverlayApp {
    fn ui(&mut self, ctx: &egui::Context);
}

impl<F: FnMut(&egui::Context)> OverlayApp for F {
    fn ui(&mut self, ctx: &egui::Context) {
        self(ctx)
    }
}

/// Parsed runtime hotkeys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkeys {
    pub toggle: VirtualKey,
    pub exit: Option<VirtualKey>,
}

impl Hotkeys {
    pub fn from_settings(settings: &OverlaySettings) -> Result<Self, OverlayError> {
        let toggle = parse_key_name(&settings.toggle_key)?;
        let exit = settings
            .exit_key
            .as_deref()
            .map(parse_key_name)
            .transpose()?;
        if exit == Some(toggle) {
            return Err(OverlayError::InvalidHotkey(format!(
                "{} is bound to both toggle and exit",
                settings.toggle_key
            )));
        }
        Ok(Self { toggle, exit })
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlayBuilder {
    settings: OverlaySettings,
}

impl OverlayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: OverlaySettings) -> Self {
        Self { settings }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.settings.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.settings.width = Some(width);
        self.settings.height = Some(height);
        self
    }

    pub fn click_through(mut self, enabled: bool) -> Self {
        self.settings.click_through = enabled;
        self
    }

    pub fn toggle_key(mut self, name: impl Into<String>) -> Self {
        self.settings.toggle_key = name.into();
        self
    }

    pub fn exit_key(mut self, name: Option<String>) -> Self {
        self.settings.exit_key = name;
        self
    }

    pub fn hide_from_alt_tab(mut self, hide: bool) -> Self {
        self.settings.hide_from_alt_tab = hide;
        self
    }

    pub fn show_indicator(mut self, show: bool) -> Self {
        self.settings.show_indicator = show;
        self
    }

    pub fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    /// Window creation parameters, with unset dimensions taken from `screen`.
    pub fn window_spec(&self, screen: (u32, u32)) -> WindowSpec {
        let (width, height) = self.settings.resolved_size(screen);
        WindowSpec {
            title: self.settings.title.clone(),
            width,
            height,
            click_through: self.settings.click_through,
            hide_from_alt_tab: self.settings.hide_from_alt_tab,
        }
    }

    /// Label for the mode indicator, or `None` when it is disabled.
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    fn indicator(&self, hotkeys: Hotkeys) -> Option<crate::frame::ModeIndicator> {
        self.settings
            .show_indicator
            .then(|| crate::frame::ModeIndicator::new(key_label(hotkeys.toggle)))
    }

    /// Create the overlay and run it until it closes.
    ///
    /// Construction failures are returned before anything is shown. Any
    /// partially built state is torn down on the way out.
    #[cfg(target_os = "windows")]
    pub fn run(self, mut app: impl OverlayApp) -> Result<(), OverlayError> {
        use crate::composition::D3dComposition;
        use crate::frame::FrameLoop;
        use crate::painter::D3dPainter;
        use crate::platform::windows::primary_screen_size;
        use crate::platform::{NativeWindow, WindowManager};

        let hotkeys = Hotkeys::from_settings(&self.settings)?;
        let spec = self.window_spec(primary_screen_size());
        tracing::info!(
            title = %spec.title,
            width = spec.width,
            height = spec.height,
            click_through = spec.click_through,
            toggle = %key_label(hotkeys.toggle),
            "starting overlay"
        );

        let mut window: WindowManager<NativeWindow> =
            WindowManager::create(&spec, hotkeys.toggle, hotkeys.exit)?;
        window.apply_transparency()?;

        let (width, height) = window.size();
        let surface = D3dComposition::create(window.backend().hwnd(), width, height)?;
        let painter = D3dPainter::initialize(&surface)?;
        window.show();

        let mut frame_loop = FrameLoop::new(window, surface, painter, self.indicator(hotkeys));
        frame_loop.run(|ctx| app.ui(ctx))
    }

    #[cfg(not(target_os = "windows"))]
    pub fn run(self, _app: impl OverlayApp) -> Result<(), OverlayError> {
        Hotkeys::from_settings(&self.settings)?;
        Err(OverlayError::Unsupported(std::env::consts::OS.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{VK_F1, VK_F10, VK_INSERT};

    #[test]
    fn test_default_hotkeys() {
        let hotkeys = Hotkeys::from_settings(&OverlaySettings::default()).unwrap();
        assert_eq!(hotkeys.toggle, VK_INSERT);
        assert_eq!(hotkeys.exit, Some(VK_F10));
    }

    #[test]
    fn test_exit_hotkey_can_be_disabled() {
        let builder = OverlayBuilder::new().toggle_key("f9").exit_key(None);
        let hotkeys = Hotkeys::from_settings(builder.settings()).unwrap();
        assert_eq!(hotkeys.toggle, VK_F1 + 8);
        assert_eq!(hotkeys.exit, None);
    }

    #[test]
    fn test_unknown_hotkey_is_rejected() {
        let builder = OverlayBuilder::new().toggle_key("Hyper");
        assert!(matches!(
            Hotkeys::from_settings(builder.settings()),
            Err(OverlayError::InvalidHotkey(_))
        ));
    }

    #[test]
    fn test_same_key_for_toggle_and_exit_is_rejected() {
        let builder = OverlayBuilder::new()
            .toggle_key("F10")
            .exit_key(Some("f10".to_string()));
        assert!(Hotkeys::from_settings(builder.settings()).is_err());
    }

    #[test]
    fn test_window_spec_from_builder() {
        let spec = OverlayBuilder::new()
            .title("hud")
            .size(800, 600)
            .click_through(false)
            .hide_from_alt_tab(false)
            .window_spec((1920, 1080));
        assert_eq!(
            spec,
            WindowSpec {
                title: "hud".to_string(),
                width: 800,
                height: 600,
                click_through: false,
                hide_from_alt_tab: false,
            }
        );
    }

    #[test]
    fn test_window_spec_defaults_to_screen_size() {
        let spec = OverlayBuilder::new().window_spec((2560, 1440));
        assert_eq!((spec.width, spec.height), (2560, 1440));
        assert!(spec.click_through);
    }

    #[test]
    fn test_indicator_follows_setting() {
        let hotkeys = Hotkeys {
            toggle: VK_INSERT,
            exit: None,
        };
        let shown = OverlayBuilder::new().indicator(hotkeys).unwrap();
        assert_eq!(shown.text(true), "Pass-through: ON (Ins)");
        assert!(OverlayBuilder::new().show_indicator(false).indicator(hotkeys).is_none());
    }

    #[test]
    fn test_closure_is_an_app() {
        let mut calls = 0;
        let mut app = |_: &egui::Context| calls += 1;
        let ctx = egui::Context::default();
        OverlayApp::ui(&mut app, &ctx);
        OverlayApp::ui(&mut app, &ctx);
        drop(app);
        assert_eq!(calls, 2);
    }
}
