//! Demo panel shown by the launcher

use veil_overlay::OverlayApp;
use veil_overlay::egui::{self, Color32, RichText, ViewportCommand};

/// A small floating window with a few interactive widgets.
///
/// Only the window itself is painted; everything around it stays fully
/// transparent.
#[derive(Debug)]
pub struct DemoPanel {
    toggle_key: String,
    frames: u64,
    opacity: f32,
    show_grid: bool,
    notes: String,
}

impl DemoPanel {
    pub fn new(toggle_key: impl Into<String>) -> Self {
        Self {
            toggle_key: toggle_key.into(),
            frames: 0,
            opacity: 0.85,
            show_grid: false,
            notes: String::new(),
        }
    }

    fn fill(&self) -> Color32 {
        let alpha = (self.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        Color32::from_black_alpha(alpha)
    }
}

impl OverlayApp for DemoPanel {
    fn ui(&mut self, ctx: &egui::Context) {
        self.frames += 1;

        if self.show_grid {
            paint_grid(ctx);
        }

        let frame = egui::Frame::window(&ctx.style()).fill(self.fill());
        egui::Window::new("veil")
            .frame(frame)
            .default_pos(egui::pos2(32.0, 48.0))
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(format!(
                    "Press {} to interact with this panel.",
                    self.toggle_key
                ));
                ui.label(RichText::new(format!("frame {}", self.frames)).monospace());
                ui.separator();
                ui.add(egui::Slider::new(&mut self.opacity, 0.0..=1.0).text("panel opacity"));
                ui.checkbox(&mut self.show_grid, "alignment grid");
                ui.text_edit_singleline(&mut self.notes);
                ui.separator();
                if ui.button("Close overlay").clicked() {
                    ctx.send_viewport_cmd(ViewportCommand::Close);
                }
            });
    }
}

/// Faint full-screen grid on the background layer.
fn paint_grid(ctx: &egui::Context) {
    const SPACING: f32 = 64.0;
    let painter = ctx.layer_painter(egui::LayerId::background());
    let rect = ctx.screen_rect();
    let stroke = egui::Stroke::new(1.0, Color32::from_white_alpha(24));

    let mut x = rect.left();
    while x <= rect.right() {
        painter.vline(x, rect.y_range(), stroke);
        x += SPACING;
    }
    let mut y = rect.top();
    while y <= rect.bottom() {
        painter.hline(rect.x_range(), y, stroke);
        y += SPACING;
    }
}
