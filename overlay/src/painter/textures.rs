//! Texture cache with CPU-side copies
//!
//! GPU textures are immutable: every set, partial or not, ends in a full
//! re-upload. The cache keeps the BGRA pixels of each texture so partial
//! deltas can be patched in and a lost device can be repopulated.

use std::collections::HashMap;

use egui::{Color32, ImageData, TextureId, TexturesDelta};

use super::TextureSlot;
use crate::error::OverlayError;

/// Premultiplied BGRA8 pixels of one texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuImage {
    pub size: [usize; 2],
    pub pixels: Vec<u8>,
}

impl CpuImage {
    pub fn from_image_data(image: &ImageData) -> Self {
        match image {
            ImageData::Color(color) => Self {
                size: color.size,
                pixels: color_to_bgra(color.pixels.iter().copied()),
            },
            ImageData::Font(font) => Self {
                size: font.size,
                // egui's default coverage gamma; texels are premultiplied white
                pixels: color_to_bgra(font.srgba_pixels(None)),
            },
        }
    }

    pub fn width(&self) -> usize {
        self.size[0]
    }

    pub fn height(&self) -> usize {
        self.size[1]
    }

    /// Bytes per row.
    pub fn pitch(&self) -> usize {
        self.size[0] * 4
    }

    /// Copy `patch` into this image with its top-left corner at `pos`.
    pub fn patch(&mut self, pos: [usize; 2], patch: &CpuImage) -> Result<(), String> {
        let [x, y] = pos;
        if x + patch.width() > self.width() || y + patch.height() > self.height() {
            return Err(format!(
                "region {}x{} at ({}, {}) exceeds {}x{} texture",
                patch.width(),
                patch.height(),
                x,
                y,
                self.width(),
                self.height()
            ));
        }
        let row_bytes = patch.pitch();
        for row in 0..patch.height() {
            let src = row * row_bytes;
            let dst = (y + row) * self.pitch() + x * 4;
            self.pixels[dst..dst + row_bytes].copy_from_slice(&patch.pixels[src..src + row_bytes]);
        }
        Ok(())
    }
}

/// Swizzle premultiplied RGBA colors to BGRA bytes, values untouched.
pub fn color_to_bgra(pixels: impl IntoIterator<Item = Color32>) -> Vec<u8> {
    let pixels = pixels.into_iter();
    let mut out = Vec::with_capacity(pixels.size_hint().0 * 4);
    for c in pixels {
        out.extend_from_slice(&[c.b(), c.g(), c.r(), c.a()]);
    }
    out
}

#[derive(Debug)]
enum GpuState<G> {
    Uploaded(G),
    /// Upload failed; drawn with the transparent placeholder
    Failed,
}

#[derive(Debug)]
struct TextureEntry<G> {
    image: CpuImage,
    gpu: GpuState<G>,
}

/// Cache keyed by egui texture id; one entry per id.
#[derive(Debug)]
pub struct TextureCache<G> {
    entries: HashMap<TextureId, TextureEntry<G>>,
}

impl<G> Default for TextureCache<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> TextureCache<G> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: TextureId) -> bool {
        self.entries.contains_key(&id)
    }

    /// GPU handle for `id`, if it uploaded successfully.
    pub fn gpu(&self, id: TextureId) -> Option<&G> {
        match self.entries.get(&id).map(|e| &e.gpu) {
            Some(GpuState::Uploaded(handle)) => Some(handle),
            _ => None,
        }
    }

    pub fn image(&self, id: TextureId) -> Option<&CpuImage> {
        self.entries.get(&id).map(|e| &e.image)
    }

    /// Resource a mesh referencing `id` should sample.
    pub fn slot(&self, id: TextureId) -> TextureSlot {
        match self.entries.get(&id).map(|e| &e.gpu) {
            Some(GpuState::Uploaded(_)) => TextureSlot::Cached(id),
            Some(GpuState::Failed) => TextureSlot::Transparent,
            None => TextureSlot::White,
        }
    }

    /// Apply all sets, then all frees.
    ///
    /// Returns the upload errors, already logged; none of them is fatal.
    pub fn apply_delta<F>(&mut self, delta: &TexturesDelta, mut upload: F) -> Vec<OverlayError>
    where
        F: FnMut(TextureId, &CpuImage) -> Result<G, OverlayError>,
    {
        let mut errors = Vec::new();

        for (id, image_delta) in &delta.set {
            let incoming = CpuImage::from_image_data(&image_delta.image);
            let image = match image_delta.pos {
                None => incoming,
                Some(pos) => {
                    let Some(entry) = self.entries.get(id) else {
                        errors.push(upload_error(
                            *id,
                            "partial update for a texture that was never set".into(),
                        ));
                        continue;
                    };
                    let mut full = entry.image.clone();
                    if let Err(reason) = full.patch(pos, &incoming) {
                        errors.push(upload_error(*id, reason));
                        continue;
                    }
                    full
                }
            };

            let gpu = match upload(*id, &image) {
                Ok(handle) => GpuState::Uploaded(handle),
                Err(e) => {
                    errors.push(e);
                    GpuState::Failed
                }
            };
            tracing::trace!(
                texture = ?id,
                width = image.width(),
                height = image.height(),
                partial = image_delta.pos.is_some(),
                "texture set"
            );
            self.entries.insert(*id, TextureEntry { image, gpu });
        }

        for id in &delta.free {
            if self.entries.remove(id).is_some() {
                tracing::trace!(texture = ?id, "texture freed");
            }
        }

        for e in &errors {
            tracing::warn!(error = %e, "texture skipped, drawing placeholder");
        }
        errors
    }

    /// Upload every cached image again, e.g. onto a new device.
    pub fn reupload_all<F>(&mut self, mut upload: F) -> Vec<OverlayError>
    where
        F: FnMut(TextureId, &CpuImage) -> Result<G, OverlayError>,
    {
        let mut errors = Vec::new();
        for (id, entry) in self.entries.iter_mut() {
            entry.gpu = match upload(*id, &entry.image) {
                Ok(handle) => GpuState::Uploaded(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "texture re-upload failed");
                    errors.push(e);
                    GpuState::Failed
                }
            };
        }
        tracing::debug!(count = self.entries.len(), "textures re-uploaded");
        errors
    }
}

pub(crate) fn upload_error(id: TextureId, reason: String) -> OverlayError {
    OverlayError::TextureUpload {
        id: format!("{:?}", id),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::epaint::{ColorImage, FontImage, ImageDelta};
    use egui::TextureOptions;
    use std::sync::Arc;

    /// Fake GPU handle: the uploaded pixels.
    type Uploaded = Vec<u8>;

    fn ok_upload(_: TextureId, image: &CpuImage) -> Result<Uploaded, OverlayError> {
        Ok(image.pixels.clone())
    }

    fn color_delta(size: [usize; 2], color: Color32, pos: Option<[usize; 2]>) -> ImageDelta {
        let image = ImageData::Color(Arc::new(ColorImage::new(size, color)));
        match pos {
            None => ImageDelta::full(image, TextureOptions::LINEAR),
            Some(pos) => ImageDelta::partial(pos, image, TextureOptions::LINEAR),
        }
    }

    #[test]
    fn test_font_texel_is_premultiplied_white() {
        let mut font = FontImage::new([3, 1]);
        font.pixels = vec![0.0, 1.0, 0.5];
        let image = CpuImage::from_image_data(&ImageData::Font(font));
        for texel in image.pixels.chunks_exact(4) {
            assert!(texel.iter().all(|&b| b == texel[3]), "not white: {texel:?}");
        }
        assert_eq!(&image.pixels[..8], &[0, 0, 0, 0, 255, 255, 255, 255]);
    }

    #[test]
    fn test_font_image_uses_egui_coverage_gamma() {
        let mut font = FontImage::new([2, 1]);
        font.pixels = vec![0.25, 1.0];
        let expected: Vec<u8> = font
            .srgba_pixels(None)
            .flat_map(|c| [c.b(), c.g(), c.r(), c.a()])
            .collect();

        let image = CpuImage::from_image_data(&ImageData::Font(font));
        assert_eq!(image.size, [2, 1]);
        assert_eq!(image.pixels, expected);
        // Thin strokes stay well above linear coverage (64)
        assert_eq!(image.pixels, vec![119, 119, 119, 119, 255, 255, 255, 255]);
    }

    #[test]
    fn test_color_image_is_swizzled_not_premultiplied() {
        let c = Color32::from_rgba_premultiplied(10, 20, 30, 40);
        assert_eq!(color_to_bgra([c]), vec![30, 20, 10, 40]);
    }

    #[test]
    fn test_set_then_free_same_id_leaves_no_entry() {
        let mut cache: TextureCache<Uploaded> = TextureCache::new();
        let id = TextureId::Managed(7);
        let delta = TexturesDelta {
            set: vec![(id, color_delta([2, 2], Color32::WHITE, None))],
            free: vec![id],
        };
        let errors = cache.apply_delta(&delta, ok_upload);
        assert!(errors.is_empty());
        assert!(!cache.contains(id));
        assert!(cache.gpu(id).is_none());
        // A mesh still naming 7 falls back to white
        assert_eq!(cache.slot(id), TextureSlot::White);
    }

    #[test]
    fn test_partial_delta_patches_and_reuploads_whole_texture() {
        let mut cache: TextureCache<Uploaded> = TextureCache::new();
        let id = TextureId::Managed(0);
        let first = TexturesDelta {
            set: vec![(id, color_delta([4, 2], Color32::TRANSPARENT, None))],
            free: vec![],
        };
        cache.apply_delta(&first, ok_upload);

        let patch = TexturesDelta {
            set: vec![(id, color_delta([1, 1], Color32::RED, Some([3, 1])))],
            free: vec![],
        };
        let mut uploaded_sizes = Vec::new();
        let errors = cache.apply_delta(&patch, |_, image| {
            uploaded_sizes.push(image.size);
            Ok(image.pixels.clone())
        });
        assert!(errors.is_empty());
        assert_eq!(uploaded_sizes, vec![[4, 2]]);

        let pixels = cache.gpu(id).expect("uploaded");
        // Pixel (3, 1) in BGRA
        let offset = (4 + 3) * 4;
        assert_eq!(&pixels[offset..offset + 4], &[0, 0, 255, 255]);
        assert_eq!(&pixels[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_partial_delta_for_unknown_id_is_reported() {
        let mut cache: TextureCache<Uploaded> = TextureCache::new();
        let delta = TexturesDelta {
            set: vec![(
                TextureId::Managed(3),
                color_delta([1, 1], Color32::RED, Some([0, 0])),
            )],
            free: vec![],
        };
        let errors = cache.apply_delta(&delta, ok_upload);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], OverlayError::TextureUpload { .. }));
        assert!(!errors[0].is_fatal());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_out_of_bounds_patch_is_rejected() {
        let mut image = CpuImage {
            size: [2, 2],
            pixels: vec![0; 16],
        };
        let patch = CpuImage {
            size: [2, 1],
            pixels: vec![1; 8],
        };
        assert!(image.patch([1, 0], &patch).is_err());
        assert!(image.patch([0, 1], &patch).is_ok());
        assert_eq!(&image.pixels[8..16], &[1; 8]);
    }

    #[test]
    fn test_failed_upload_uses_transparent_placeholder() {
        let mut cache: TextureCache<Uploaded> = TextureCache::new();
        let id = TextureId::User(1);
        let delta = TexturesDelta {
            set: vec![(id, color_delta([1, 1], Color32::RED, None))],
            free: vec![],
        };
        let errors = cache.apply_delta(&delta, |id, _| {
            Err(upload_error(id, "out of video memory".into()))
        });
        assert_eq!(errors.len(), 1);
        assert!(cache.contains(id));
        assert_eq!(cache.slot(id), TextureSlot::Transparent);
    }

    #[test]
    fn test_reupload_all_restores_handles() {
        let mut cache: TextureCache<Uploaded> = TextureCache::new();
        let a = TextureId::Managed(0);
        let b = TextureId::Managed(1);
        let delta = TexturesDelta {
            set: vec![
                (a, color_delta([1, 1], Color32::RED, None)),
                (b, color_delta([1, 1], Color32::BLUE, None)),
            ],
            free: vec![],
        };
        cache.apply_delta(&delta, |_, _| Err(upload_error(a, "device removed".into())));
        assert_eq!(cache.slot(a), TextureSlot::Transparent);

        let errors = cache.reupload_all(ok_upload);
        assert!(errors.is_empty());
        assert_eq!(cache.slot(a), TextureSlot::Cached(a));
        assert_eq!(cache.gpu(b).map(Vec::as_slice), Some(&[255, 0, 0, 255][..]));
    }
}
