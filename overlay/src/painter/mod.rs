//! Mesh painter
//!
//! Turns egui's tessellated output into draw calls. Everything up to the
//! GPU boundary lives here and in [`textures`] so it runs in tests; the
//! Direct3D 11 side is in `d3d11`.
//!
//! Colors stay premultiplied end to end: egui's `Color32` is already
//! premultiplied, textures are uploaded premultiplied, and the blend state
//! is `ONE, INV_SRC_ALPHA`.

use std::ffi::CStr;

use egui::epaint::{ClippedPrimitive, Primitive};

use crate::composition::CompositionBackend;
use crate::error::OverlayError;

pub mod textures;

#[cfg(target_os = "windows")]
mod d3d11;

#[cfg(target_os = "windows")]
pub use d3d11::D3dPainter;

pub use textures::{CpuImage, TextureCache};

/// Renderer driven by the frame loop, paired with a composition backend.
pub trait PainterBackend<S: CompositionBackend> {
    /// Apply a frame's texture sets and frees. Upload failures are logged
    /// and leave a placeholder; they never abort the frame.
    fn apply_texture_delta(&mut self, delta: &egui::TexturesDelta);

    /// Clear `target` and draw `primitives` in order.
    fn paint(
        &mut self,
        target: &S::Target,
        screen: [u32; 2],
        primitives: &[ClippedPrimitive],
    ) -> Result<(), OverlayError>;

    /// Rebuild GPU state on the surface's new device and re-upload every
    /// cached texture.
    fn recreate(&mut self, surface: &S) -> Result<(), OverlayError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Shader contract
// ─────────────────────────────────────────────────────────────────────────────

/// HLSL source plus the entry point and target profile it is compiled with.
#[derive(Debug, Clone, Copy)]
pub struct ShaderProgram {
    pub stage: &'static str,
    pub source: &'static str,
    pub entry: &'static CStr,
    pub profile: &'static CStr,
}

pub const VERTEX_SHADER: ShaderProgram = ShaderProgram {
    stage: "vertex",
    source: include_str!("shaders/overlay_vs.hlsl"),
    entry: c"main",
    profile: c"vs_5_0",
};

pub const PIXEL_SHADER: ShaderProgram = ShaderProgram {
    stage: "pixel",
    source: include_str!("shaders/overlay_ps.hlsl"),
    entry: c"main",
    profile: c"ps_5_0",
};

/// Vertex as laid out in the GPU buffer: POSITION, TEXCOORD, COLOR at byte
/// offsets 0, 8 and 16.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    /// Premultiplied RGBA
    pub color: [f32; 4],
}

impl Vertex {
    pub fn from_egui(v: &egui::epaint::Vertex) -> Self {
        // Color32 is stored premultiplied; only normalize
        let [r, g, b, a] = v.color.to_array();
        Self {
            pos: [v.pos.x, v.pos.y],
            uv: [v.uv.x, v.uv.y],
            color: [
                r as f32 / 255.0,
                g as f32 / 255.0,
                b as f32 / 255.0,
                a as f32 / 255.0,
            ],
        }
    }
}

/// Constant buffer contents; 16 bytes to satisfy cbuffer alignment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Globals {
    pub screen_size: [f32; 2],
    pub _pad: [f32; 2],
}

impl Globals {
    pub fn new(screen: [u32; 2]) -> Self {
        Self {
            screen_size: [screen[0] as f32, screen[1] as f32],
            _pad: [0.0; 2],
        }
    }
}

/// Pixel position to clip space, exactly as the vertex shader computes it.
pub fn clip_space(pos: [f32; 2], screen_size: [f32; 2]) -> [f32; 2] {
    [
        (pos[0] / screen_size[0]) * 2.0 - 1.0,
        1.0 - (pos[1] / screen_size[1]) * 2.0,
    ]
}

/// Scissor rectangle in whole pixels, clipped to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    pub fn from_clip_rect(rect: egui::Rect, screen: [u32; 2]) -> Self {
        let (w, h) = (screen[0] as f32, screen[1] as f32);
        let mut left = rect.min.x.clamp(0.0, w).floor() as i32;
        let mut top = rect.min.y.clamp(0.0, h).floor() as i32;
        let mut right = rect.max.x.clamp(0.0, w).ceil() as i32;
        let mut bottom = rect.max.y.clamp(0.0, h).ceil() as i32;
        if left > right {
            std::mem::swap(&mut left, &mut right);
        }
        if top > bottom {
            std::mem::swap(&mut top, &mut bottom);
        }
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }
}

/// Which shader resource a draw call samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    Cached(egui::TextureId),
    /// 1x1 opaque white; used when a mesh names no live texture
    White,
    /// 1x1 fully transparent; used when the texture failed to upload
    Transparent,
}

/// One indexed draw, ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub scissor: ScissorRect,
    pub slot: TextureSlot,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Convert tessellated primitives into draw calls, preserving order.
///
/// Paint callbacks, empty meshes and fully clipped meshes are dropped.
pub fn prepare_draw_calls<G>(
    screen: [u32; 2],
    primitives: &[ClippedPrimitive],
    textures: &TextureCache<G>,
) -> Vec<DrawCall> {
    let mut calls = Vec::with_capacity(primitives.len());
    for clipped in primitives {
        let Primitive::Mesh(mesh) = &clipped.primitive else {
            tracing::trace!("skipping paint callback");
            continue;
        };
        if mesh.indices.is_empty() || mesh.vertices.is_empty() {
            continue;
        }
        let scissor = ScissorRect::from_clip_rect(clipped.clip_rect, screen);
        if scissor.is_empty() {
            continue;
        }
        calls.push(DrawCall {
            scissor,
            slot: textures.slot(mesh.texture_id),
            vertices: mesh.vertices.iter().map(Vertex::from_egui).collect(),
            indices: mesh.indices.clone(),
        });
    }
    calls
}

/// Byte capacity for a dynamic buffer that must hold `needed` bytes.
pub fn grow_capacity(current: usize, needed: usize) -> usize {
    if needed <= current {
        current
    } else {
        needed.next_power_of_two()
    }
}
