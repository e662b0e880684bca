//! Frame loop
//!
//! One synchronous iteration per frame:
//!
//! ```text
//! pump messages → resize surface → poll hotkeys → egui pass
//!     → apply texture delta → begin frame → paint → present
//! ```
//!
//! The loop ends when the window manager reaches `Closing`, or on the first
//! fatal error. A lost device is rebuilt once; losing it again on the very
//! next frame ends the loop.

use egui::{Color32, RichText, ViewportCommand, ViewportId};

use crate::composition::CompositionBackend;
use crate::error::OverlayError;
use crate::input::InputTranslator;
use crate::painter::PainterBackend;
use crate::platform::{WindowBackend, WindowManager};

/// What the caller should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Continue,
    Stop,
}

/// Small corner label showing the click-through state and its hotkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeIndicator {
    key: String,
}

impl ModeIndicator {
    pub fn new(key_label: impl Into<String>) -> Self {
        Self {
            key: key_label.into(),
        }
    }

    pub fn text(&self, click_through: bool) -> String {
        let state = if click_through { "ON" } else { "OFF" };
        format!("Pass-through: {} ({})", state, self.key)
    }

    pub fn color(click_through: bool) -> Color32 {
        if click_through {
            Color32::LIGHT_GREEN
        } else {
            Color32::YELLOW
        }
    }

    fn show(&self, ctx: &egui::Context, click_through: bool) {
        egui::Area::new(egui::Id::new("veil_mode_indicator"))
            .fixed_pos(egui::pos2(8.0, 8.0))
            .order(egui::Order::Foreground)
            .interactable(false)
            .show(ctx, |ui| {
                ui.label(
                    RichText::new(self.text(click_through))
                        .monospace()
                        .color(Self::color(click_through)),
                );
            });
    }
}

/// Drives the window, surface and painter together.
///
/// Field order is drop order: GPU objects go before the windows they
/// are bound to.
pub struct FrameLoop<W, S, P>
where
    W: WindowBackend,
    S: CompositionBackend,
    P: PainterBackend<S>,
{
    painter: P,
    surface: S,
    window: WindowManager<W>,
    ctx: egui::Context,
    input: InputTranslator,
    indicator: Option<ModeIndicator>,
    recovering: bool,
    frames: u64,
}

impl<W, S, P> FrameLoop<W, S, P>
where
    W: WindowBackend,
    S: CompositionBackend,
    P: PainterBackend<S>,
{
    pub fn new(
        window: WindowManager<W>,
        surface: S,
        painter: P,
        indicator: Option<ModeIndicator>,
    ) -> Self {
        Self {
            painter,
            surface,
            window,
            ctx: egui::Context::default(),
            input: InputTranslator::new(),
            indicator,
            recovering: false,
            frames: 0,
        }
    }

    pub fn context(&self) -> &egui::Context {
        &self.ctx
    }

    pub fn window(&self) -> &WindowManager<W> {
        &self.window
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[cfg(test)]
    pub(crate) fn window_mut_for_tests(&mut self) -> &mut WindowManager<W> {
        &mut self.window
    }

    #[cfg(test)]
    pub(crate) fn painter_mut_for_tests(&mut self) -> &mut P {
        &mut self.painter
    }

    /// Run frames until the window closes or a fatal error occurs.
    pub fn run(&mut self, mut ui: impl FnMut(&egui::Context)) -> Result<(), OverlayError> {
        tracing::info!("frame loop started");
        loop {
            match self.step(&mut ui) {
                Ok(FrameStatus::Continue) => {}
                Ok(FrameStatus::Stop) => break,
                Err(e) => {
                    tracing::error!(error = %e, frames = self.frames, "frame loop aborted");
                    self.window.request_close();
                    return Err(e);
                }
            }
        }
        tracing::info!(frames = self.frames, "frame loop finished");
        Ok(())
    }

    /// Run a single frame.
    pub fn step(&mut self, ui: &mut impl FnMut(&egui::Context)) -> Result<FrameStatus, OverlayError> {
        let messages = self.window.pump_messages();
        if self.window.is_closing() {
            return Ok(FrameStatus::Stop);
        }

        if let Some((width, height)) = messages.resized {
            if let Err(e) = self.surface.resize(width, height) {
                self.handle_frame_error(e)?;
            }
        }

        let hotkeys = self.window.poll_hotkeys();
        if hotkeys.requested_exit {
            return Ok(FrameStatus::Stop);
        }

        let screen = self.surface.size();
        let click_through = self.window.state().click_through;
        let raw_input = self.input.raw_input(
            messages,
            screen,
            self.window.modifiers(),
            !click_through,
        );

        let indicator = self.indicator.as_ref();
        let output = self.ctx.run(raw_input, |ctx| {
            ui(ctx);
            if let Some(indicator) = indicator {
                indicator.show(ctx, click_through);
            }
        });

        let close_requested = output
            .viewport_output
            .get(&ViewportId::ROOT)
            .is_some_and(|v| v.commands.iter().any(|c| matches!(c, ViewportCommand::Close)));
        if close_requested {
            tracing::info!("close requested by the ui");
            self.window.request_close();
        }

        let primitives = self.ctx.tessellate(output.shapes, output.pixels_per_point);
        self.painter.apply_texture_delta(&output.textures_delta);

        match self.render(screen, &primitives) {
            Ok(()) => self.recovering = false,
            Err(e) => self.handle_frame_error(e)?,
        }
        self.frames += 1;

        if self.window.is_closing() {
            Ok(FrameStatus::Stop)
        } else {
            Ok(FrameStatus::Continue)
        }
    }

    fn render(
        &mut self,
        screen: [u32; 2],
        primitives: &[egui::ClippedPrimitive],
    ) -> Result<(), OverlayError> {
        let target = self.surface.begin_frame()?;
        self.painter.paint(&target, screen, primitives)?;
        self.surface.present()
    }

    /// Recover from what can be recovered, escalate the rest.
    fn handle_frame_error(&mut self, error: OverlayError) -> Result<(), OverlayError> {
        match error {
            OverlayError::DeviceLost(reason) => {
                if self.recovering {
                    return Err(OverlayError::DeviceLost(format!(
                        "lost again right after recovery: {reason}"
                    )));
                }
                tracing::warn!(%reason, "GPU device lost, recreating");
                self.recovering = true;
                self.surface.recreate()?;
                self.painter.recreate(&self.surface)?;
                Ok(())
            }
            e if !e.is_fatal() => {
                tracing::warn!(error = %e, "frame degraded");
                Ok(())
            }
            e => Err(e),
        }
    }
}
