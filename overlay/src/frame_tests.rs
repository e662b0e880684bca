//! Frame loop tests
//!
//! The window, surface and painter are in-memory fakes that append to one
//! shared call log, so the tests assert on the exact per-frame sequence.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use egui::ClippedPrimitive;

use crate::composition::CompositionBackend;
use crate::error::OverlayError;
use crate::frame::{FrameLoop, FrameStatus, ModeIndicator};
use crate::hotkey::{VK_F10, VK_INSERT};
use crate::input::{NativeMessage, msg, pack_size};
use crate::painter::PainterBackend;
use crate::platform::fake::FakeWindow;
use crate::platform::{Lifecycle, WindowManager, WindowSpec};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Resize(u32, u32),
    Textures { set: usize, free: usize },
    Begin,
    Paint([u32; 2]),
    Present,
    RecreateSurface,
    RecreatePainter,
}

type Log = Rc<RefCell<Vec<Call>>>;

struct FakeSurface {
    log: Log,
    size: [u32; 2],
    present_failures: VecDeque<OverlayError>,
}

impl CompositionBackend for FakeSurface {
    type Target = [u32; 2];

    fn size(&self) -> [u32; 2] {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), OverlayError> {
        self.log.borrow_mut().push(Call::Resize(width, height));
        self.size = [width, height];
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<[u32; 2], OverlayError> {
        self.log.borrow_mut().push(Call::Begin);
        Ok(self.size)
    }

    fn present(&mut self) -> Result<(), OverlayError> {
        if let Some(e) = self.present_failures.pop_front() {
            return Err(e);
        }
        self.log.borrow_mut().push(Call::Present);
        Ok(())
    }

    fn recreate(&mut self) -> Result<(), OverlayError> {
        self.log.borrow_mut().push(Call::RecreateSurface);
        Ok(())
    }
}

struct FakePainter {
    log: Log,
    paint_failures: VecDeque<OverlayError>,
    meshes_painted: usize,
}

impl PainterBackend<FakeSurface> for FakePainter {
    fn apply_texture_delta(&mut self, delta: &egui::TexturesDelta) {
        self.log.borrow_mut().push(Call::Textures {
            set: delta.set.len(),
            free: delta.free.len(),
        });
    }

    fn paint(
        &mut self,
        target: &[u32; 2],
        screen: [u32; 2],
        primitives: &[ClippedPrimitive],
    ) -> Result<(), OverlayError> {
        assert_eq!(*target, screen, "target must match the screen size");
        self.log.borrow_mut().push(Call::Paint(screen));
        if let Some(e) = self.paint_failures.pop_front() {
            return Err(e);
        }
        self.meshes_painted += primitives.len();
        Ok(())
    }

    fn recreate(&mut self, _surface: &FakeSurface) -> Result<(), OverlayError> {
        self.log.borrow_mut().push(Call::RecreatePainter);
        Ok(())
    }
}

struct Harness {
    log: Log,
    frame_loop: FrameLoop<FakeWindow, FakeSurface, FakePainter>,
}

fn harness(
    click_through: bool,
    batches: Vec<Vec<NativeMessage>>,
    present_failures: Vec<OverlayError>,
) -> Harness {
    let spec = WindowSpec {
        title: "frame".to_string(),
        width: 800,
        height: 600,
        click_through,
        hide_from_alt_tab: true,
    };
    let mut window: WindowManager<FakeWindow> =
        WindowManager::create(&spec, VK_INSERT, Some(VK_F10)).expect("fake window");
    window.show();
    for batch in batches {
        window.backend_mut().push_batch(batch);
    }
    window.backend_mut().quit_when_idle = true;

    let log: Log = Rc::default();
    let surface = FakeSurface {
        log: log.clone(),
        size: [800, 600],
        present_failures: present_failures.into(),
    };
    let painter = FakePainter {
        log: log.clone(),
        paint_failures: VecDeque::new(),
        meshes_painted: 0,
    };
    Harness {
        log,
        frame_loop: FrameLoop::new(window, surface, painter, Some(ModeIndicator::new("Ins"))),
    }
}

/// Drop the texture bookkeeping so assertions focus on ordering.
fn without_textures(log: &Log) -> Vec<Call> {
    log.borrow()
        .iter()
        .filter(|c| !matches!(c, Call::Textures { .. }))
        .cloned()
        .collect()
}

#[test]
fn test_single_frame_runs_in_order() {
    let mut h = harness(
        true,
        vec![vec![NativeMessage::new(msg::WM_MOUSEMOVE, 0, (5 << 16) | 5)]],
        vec![],
    );
    let mut ui_calls = 0;
    h.frame_loop
        .run(|ctx| {
            ui_calls += 1;
            egui::CentralPanel::default()
                .frame(egui::Frame::none())
                .show(ctx, |ui| ui.label("hello"));
        })
        .expect("loop ends cleanly");

    // egui may run a discarded sizing pass inside one frame
    assert!(ui_calls >= 1);
    assert_eq!(h.frame_loop.frames(), 1);
    assert!(h.frame_loop.painter_mut_for_tests().meshes_painted > 0);
    let log = h.log.borrow();
    assert!(matches!(log[0], Call::Textures { set, .. } if set > 0), "font atlas first: {log:?}");
    assert_eq!(log[1..], [Call::Begin, Call::Paint([800, 600]), Call::Present]);
}

#[test]
fn test_close_message_stops_before_any_frame() {
    let mut h = harness(true, vec![vec![NativeMessage::new(msg::WM_CLOSE, 0, 0)]], vec![]);
    let mut ui_calls = 0;
    h.frame_loop.run(|_| ui_calls += 1).expect("clean stop");

    assert_eq!(ui_calls, 0);
    assert!(h.log.borrow().is_empty());
    assert_eq!(h.frame_loop.window().state().lifecycle, Lifecycle::Closing);
}

#[test]
fn test_resize_happens_before_paint() {
    let mut h = harness(
        true,
        vec![vec![NativeMessage::new(
            msg::WM_APP_RESIZED,
            0,
            pack_size(1024, 768),
        )]],
        vec![],
    );
    h.frame_loop.run(|_| {}).expect("loop ends cleanly");

    assert_eq!(
        without_textures(&h.log),
        vec![
            Call::Resize(1024, 768),
            Call::Begin,
            Call::Paint([1024, 768]),
            Call::Present
        ]
    );
}

#[test]
fn test_ui_close_command_closes_window() {
    let mut h = harness(true, vec![vec![], vec![], vec![]], vec![]);
    h.frame_loop
        .run(|ctx| ctx.send_viewport_cmd(egui::ViewportCommand::Close))
        .expect("loop ends cleanly");

    // The frame that asked to close is still presented
    assert_eq!(h.frame_loop.frames(), 1);
    assert_eq!(
        without_textures(&h.log),
        vec![Call::Begin, Call::Paint([800, 600]), Call::Present]
    );
    assert_eq!(h.frame_loop.window().state().lifecycle, Lifecycle::Closing);
}

#[test]
fn test_device_loss_is_recovered_once() {
    let mut h = harness(
        true,
        vec![vec![], vec![]],
        vec![OverlayError::DeviceLost("removed".into())],
    );
    h.frame_loop.run(|_| {}).expect("recovered");

    assert_eq!(h.frame_loop.frames(), 2);
    assert_eq!(
        without_textures(&h.log),
        vec![
            Call::Begin,
            Call::Paint([800, 600]),
            Call::RecreateSurface,
            Call::RecreatePainter,
            Call::Begin,
            Call::Paint([800, 600]),
            Call::Present,
        ]
    );
}

#[test]
fn test_consecutive_device_loss_is_fatal() {
    let mut h = harness(
        true,
        vec![vec![], vec![], vec![]],
        vec![
            OverlayError::DeviceLost("removed".into()),
            OverlayError::DeviceLost("removed again".into()),
        ],
    );
    let result = h.frame_loop.run(|_| {});

    assert!(matches!(result, Err(OverlayError::DeviceLost(_))));
    let recreations = h
        .log
        .borrow()
        .iter()
        .filter(|c| **c == Call::RecreateSurface)
        .count();
    assert_eq!(recreations, 1);
    assert!(h.frame_loop.window().is_closing());
}

#[test]
fn test_present_failure_ends_loop() {
    let mut h = harness(
        true,
        vec![vec![], vec![]],
        vec![OverlayError::Present("DXGI_ERROR_INVALID_CALL".into())],
    );
    let result = h.frame_loop.run(|_| {});
    assert!(matches!(result, Err(OverlayError::Present(_))));
    assert_eq!(h.frame_loop.frames(), 0);
}

#[test]
fn test_texture_failure_does_not_end_loop() {
    let mut h = harness(true, vec![vec![], vec![]], vec![]);
    let mut ui = |_: &egui::Context| {};
    h.frame_loop
        .painter_mut_for_tests()
        .paint_failures
        .push_back(OverlayError::TextureUpload {
            id: "Managed(0)".into(),
            reason: "out of memory".into(),
        });

    assert_eq!(h.frame_loop.step(&mut ui).unwrap(), FrameStatus::Continue);
    assert_eq!(h.frame_loop.step(&mut ui).unwrap(), FrameStatus::Continue);
    assert_eq!(h.frame_loop.step(&mut ui).unwrap(), FrameStatus::Stop);
    assert_eq!(h.frame_loop.frames(), 2);
}

#[test]
fn test_toggle_hotkey_flips_click_through_between_frames() {
    let mut h = harness(true, vec![vec![], vec![], vec![]], vec![]);
    let mut ui = |_: &egui::Context| {};

    h.frame_loop.window_mut_for_tests().backend_mut().keys_down = vec![VK_INSERT];
    h.frame_loop.step(&mut ui).unwrap();
    assert!(!h.frame_loop.window().state().click_through);

    // Held key does not toggle again
    h.frame_loop.step(&mut ui).unwrap();
    assert!(!h.frame_loop.window().state().click_through);

    h.frame_loop.window_mut_for_tests().backend_mut().keys_down = vec![];
    h.frame_loop.step(&mut ui).unwrap();
    assert!(!h.frame_loop.window().state().click_through);
    assert_eq!(h.frame_loop.window().backend().style_writes, 1);

    // Batches are exhausted, so this pump sees the quit message first
    assert_eq!(h.frame_loop.step(&mut ui).unwrap(), FrameStatus::Stop);
}

#[test]
fn test_exit_hotkey_stops_loop() {
    let mut h = harness(true, vec![vec![], vec![]], vec![]);
    let mut ui = |_: &egui::Context| {};
    h.frame_loop.window_mut_for_tests().backend_mut().keys_down = vec![VK_F10];
    assert_eq!(h.frame_loop.step(&mut ui).unwrap(), FrameStatus::Stop);
    assert!(h.frame_loop.window().is_closing());
    assert!(h.log.borrow().is_empty());
}

#[test]
fn test_mode_indicator_text() {
    let indicator = ModeIndicator::new("Ins");
    assert_eq!(indicator.text(true), "Pass-through: ON (Ins)");
    assert_eq!(indicator.text(false), "Pass-through: OFF (Ins)");
    assert_eq!(ModeIndicator::color(true), egui::Color32::LIGHT_GREEN);
    assert_eq!(ModeIndicator::color(false), egui::Color32::YELLOW);
}
