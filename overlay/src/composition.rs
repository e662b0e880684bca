//! GPU surface handed to the desktop compositor
//!
//! The swap chain is created for composition rather than for a window, and
//! a DirectComposition visual bound to the overlay window shows it. Alpha
//! is declared premultiplied at the swap-chain level, so whatever the
//! painter writes is blended by the compositor as-is.

#![cfg_attr(not(target_os = "windows"), allow(dead_code))]

use crate::error::OverlayError;

/// Render surface driven by the frame loop.
pub trait CompositionBackend {
    /// Handle to the render target for the current frame.
    type Target;

    /// Dimensions of the current back buffer and its render target.
    fn size(&self) -> [u32; 2];

    /// Release the render target, resize the buffers, rebuild the target.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), OverlayError>;

    /// Bind the render target and return it for painting.
    fn begin_frame(&mut self) -> Result<Self::Target, OverlayError>;

    /// Hand the frame to the compositor.
    fn present(&mut self) -> Result<(), OverlayError>;

    /// Drop every GPU object and build them again at the current size.
    fn recreate(&mut self) -> Result<(), OverlayError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Surface size bookkeeping
// ─────────────────────────────────────────────────────────────────────────────

/// Requested surface size and the size of the render target built for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SurfaceSize {
    requested: [u32; 2],
    target: Option<[u32; 2]>,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            requested: [width.max(1), height.max(1)],
            target: None,
        }
    }

    /// Size the next set of buffers is created at.
    pub fn requested(&self) -> [u32; 2] {
        self.requested
    }

    /// Size of the live render target, or the request while none exists.
    pub fn current(&self) -> [u32; 2] {
        self.target.unwrap_or(self.requested)
    }

    /// Record a resize before any buffer is touched.
    ///
    /// Returns `false` for zero or unchanged sizes, which need no work.
    pub fn request(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || [width, height] == self.current() {
            return false;
        }
        self.requested = [width, height];
        self.target = None;
        true
    }

    /// The render target was released along with its buffers.
    pub fn target_released(&mut self) {
        self.target = None;
    }

    /// Record the size of a freshly built render target, which must match
    /// the request.
    pub fn target_built(&mut self, size: [u32; 2]) -> Result<(), OverlayError> {
        self.target = Some(size);
        if size == self.requested {
            return Ok(());
        }
        Err(OverlayError::Resize {
            width: self.requested[0],
            height: self.requested[1],
            reason: format!("render target built at {}x{}", size[0], size[1]),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HRESULT classification
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) const DXGI_ERROR_DEVICE_REMOVED: i32 = 0x887A_0005_u32 as i32;
pub(crate) const DXGI_ERROR_DEVICE_HUNG: i32 = 0x887A_0006_u32 as i32;
pub(crate) const DXGI_ERROR_DEVICE_RESET: i32 = 0x887A_0007_u32 as i32;
pub(crate) const DXGI_ERROR_DRIVER_INTERNAL_ERROR: i32 = 0x887A_0020_u32 as i32;

/// Whether a failed GPU call means the device has to be rebuilt.
pub(crate) fn is_device_lost(code: i32) -> bool {
    matches!(
        code,
        DXGI_ERROR_DEVICE_REMOVED
            | DXGI_ERROR_DEVICE_HUNG
            | DXGI_ERROR_DEVICE_RESET
            | DXGI_ERROR_DRIVER_INTERNAL_ERROR
    )
}

/// Map a failed present to the error the frame loop acts on.
pub(crate) fn present_error(code: i32, message: String) -> OverlayError {
    if is_device_lost(code) {
        OverlayError::DeviceLost(message)
    } else {
        OverlayError::Present(message)
    }
}

/// Map a failed buffer resize to the error the frame loop acts on.
pub(crate) fn resize_error(code: i32, width: u32, height: u32, message: String) -> OverlayError {
    if is_device_lost(code) {
        OverlayError::DeviceLost(message)
    } else {
        OverlayError::Resize {
            width,
            height,
            reason: message,
        }
    }
}

#[cfg(target_os = "windows")]
pub use self::d3d::{D3dComposition, GpuContext};

#[cfg(target_os = "windows")]
mod d3d {
    use windows::Win32::Foundation::{HMODULE, HWND};
    use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL_11_0};
    use windows::Win32::Graphics::Direct3D11::{
        D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC,
        D3D11_VIEWPORT, D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext,
        ID3D11RenderTargetView, ID3D11Texture2D,
    };
    use windows::Win32::Graphics::DirectComposition::{
        DCompositionCreateDevice, IDCompositionDevice, IDCompositionTarget, IDCompositionVisual,
    };
    use windows::Win32::Graphics::Dxgi::Common::{
        DXGI_ALPHA_MODE_PREMULTIPLIED, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_UNKNOWN,
        DXGI_SAMPLE_DESC,
    };
    use windows::Win32::Graphics::Dxgi::{
        CreateDXGIFactory2, DXGI_CREATE_FACTORY_FLAGS, DXGI_PRESENT, DXGI_SCALING_STRETCH,
        DXGI_SWAP_CHAIN_DESC1, DXGI_SWAP_CHAIN_FLAG, DXGI_SWAP_EFFECT_FLIP_DISCARD,
        DXGI_USAGE_RENDER_TARGET_OUTPUT, IDXGIDevice, IDXGIFactory2, IDXGISwapChain1,
    };
    use windows::core::Interface;

    use super::{CompositionBackend, SurfaceSize, present_error, resize_error};
    use crate::error::OverlayError;

    /// Device and immediate context shared with the painter.
    #[derive(Clone)]
    pub struct GpuContext {
        pub device: ID3D11Device,
        pub context: ID3D11DeviceContext,
    }

    /// Everything created from one GPU device; rebuilt as a unit.
    struct GpuResources {
        // Field order is release order: views and visual tree before the device
        rtv: Option<ID3D11RenderTargetView>,
        _visual: IDCompositionVisual,
        _target: IDCompositionTarget,
        _dcomp: IDCompositionDevice,
        swap_chain: IDXGISwapChain1,
        gpu: GpuContext,
    }

    /// Swap chain plus visual tree bound to the overlay window.
    pub struct D3dComposition {
        hwnd: HWND,
        size: SurfaceSize,
        resources: Option<GpuResources>,
    }

    impl D3dComposition {
        pub fn create(hwnd: HWND, width: u32, height: u32) -> Result<Self, OverlayError> {
            let mut size = SurfaceSize::new(width, height);
            let (resources, built) = GpuResources::create(hwnd, size.requested())?;
            size.target_built(built)?;
            let [width, height] = size.current();
            tracing::info!(width, height, "composition surface created");
            Ok(Self {
                hwnd,
                size,
                resources: Some(resources),
            })
        }

        /// Device and context for painter setup.
        pub fn gpu(&self) -> Result<GpuContext, OverlayError> {
            Ok(self.resources()?.gpu.clone())
        }

        fn resources(&self) -> Result<&GpuResources, OverlayError> {
            self.resources
                .as_ref()
                .ok_or_else(|| OverlayError::DeviceLost("composition resources released".into()))
        }

        fn resources_mut(&mut self) -> Result<&mut GpuResources, OverlayError> {
            self.resources
                .as_mut()
                .ok_or_else(|| OverlayError::DeviceLost("composition resources released".into()))
        }
    }

    impl CompositionBackend for D3dComposition {
        type Target = ID3D11RenderTargetView;

        fn size(&self) -> [u32; 2] {
            self.size.current()
        }

        fn resize(&mut self, width: u32, height: u32) -> Result<(), OverlayError> {
            // Recorded first so a recreate after a failed resize uses it
            if !self.size.request(width, height) {
                return Ok(());
            }
            let res = self.resources_mut()?;

            // The swap chain refuses to resize while views of it exist
            res.rtv = None;
            unsafe {
                res.gpu.context.OMSetRenderTargets(None, None);
                res.gpu.context.Flush();
                res.swap_chain
                    .ResizeBuffers(0, width, height, DXGI_FORMAT_UNKNOWN, DXGI_SWAP_CHAIN_FLAG(0))
                    .map_err(|e| resize_error(e.code().0, width, height, e.to_string()))?;
            }
            let built = res.rebuild_rtv().map_err(|e| match e {
                OverlayError::Platform { reason, .. } => OverlayError::Resize {
                    width,
                    height,
                    reason,
                },
                other => other,
            })?;
            self.size.target_built(built)?;
            tracing::debug!(width, height, "swap chain resized");
            Ok(())
        }

        fn begin_frame(&mut self) -> Result<ID3D11RenderTargetView, OverlayError> {
            let [width, height] = self.size.current();
            let res = self.resources()?;
            let rtv = res
                .rtv
                .clone()
                .ok_or_else(|| OverlayError::DeviceLost("no render target view".into()))?;
            let viewport = D3D11_VIEWPORT {
                TopLeftX: 0.0,
                TopLeftY: 0.0,
                Width: width as f32,
                Height: height as f32,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            };
            unsafe {
                res.gpu
                    .context
                    .OMSetRenderTargets(Some(&[Some(rtv.clone())]), None);
                res.gpu.context.RSSetViewports(Some(&[viewport]));
            }
            Ok(rtv)
        }

        fn present(&mut self) -> Result<(), OverlayError> {
            let res = self.resources()?;
            let hr = unsafe { res.swap_chain.Present(0, DXGI_PRESENT(0)) };
            if hr.is_err() {
                return Err(present_error(hr.0, hr.message()));
            }
            tracing::trace!("frame presented");
            Ok(())
        }

        fn recreate(&mut self) -> Result<(), OverlayError> {
            // A window accepts only one composition target at a time
            self.resources = None;
            self.size.target_released();
            let (resources, built) = GpuResources::create(self.hwnd, self.size.requested())?;
            self.resources = Some(resources);
            self.size.target_built(built)?;
            let [width, height] = built;
            tracing::info!(width, height, "composition surface recreated");
            Ok(())
        }
    }

    impl GpuResources {
        /// Build the device chain and return it with its render target size.
        fn create(hwnd: HWND, size: [u32; 2]) -> Result<(Self, [u32; 2]), OverlayError> {
            let mut device = None;
            let mut context = None;
            unsafe {
                D3D11CreateDevice(
                    None,
                    D3D_DRIVER_TYPE_HARDWARE,
                    HMODULE::default(),
                    D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                    Some(&[D3D_FEATURE_LEVEL_11_0]),
                    D3D11_SDK_VERSION,
                    Some(&mut device),
                    None,
                    Some(&mut context),
                )
                .map_err(OverlayError::win32("D3D11CreateDevice"))?;
            }
            let (Some(device), Some(context)) = (device, context) else {
                return Err(OverlayError::Platform {
                    call: "D3D11CreateDevice",
                    reason: "no device returned".into(),
                });
            };

            let dxgi_device: IDXGIDevice = device
                .cast()
                .map_err(OverlayError::win32("ID3D11Device::cast<IDXGIDevice>"))?;
            let factory: IDXGIFactory2 = unsafe {
                CreateDXGIFactory2(DXGI_CREATE_FACTORY_FLAGS(0))
                    .map_err(OverlayError::win32("CreateDXGIFactory2"))?
            };

            let desc = DXGI_SWAP_CHAIN_DESC1 {
                Width: size[0],
                Height: size[1],
                Format: DXGI_FORMAT_B8G8R8A8_UNORM,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    Quality: 0,
                },
                BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                BufferCount: 2,
                Scaling: DXGI_SCALING_STRETCH,
                SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
                AlphaMode: DXGI_ALPHA_MODE_PREMULTIPLIED,
                ..Default::default()
            };
            let swap_chain = unsafe {
                factory
                    .CreateSwapChainForComposition(&device, &desc, None)
                    .map_err(OverlayError::win32("CreateSwapChainForComposition"))?
            };

            let dcomp: IDCompositionDevice = unsafe {
                DCompositionCreateDevice(&dxgi_device)
                    .map_err(OverlayError::win32("DCompositionCreateDevice"))?
            };
            let target = unsafe {
                dcomp
                    .CreateTargetForHwnd(hwnd, true)
                    .map_err(OverlayError::win32("CreateTargetForHwnd"))?
            };
            let visual = unsafe {
                dcomp
                    .CreateVisual()
                    .map_err(OverlayError::win32("CreateVisual"))?
            };
            unsafe {
                visual
                    .SetContent(&swap_chain)
                    .map_err(OverlayError::win32("IDCompositionVisual::SetContent"))?;
                target
                    .SetRoot(&visual)
                    .map_err(OverlayError::win32("IDCompositionTarget::SetRoot"))?;
                dcomp
                    .Commit()
                    .map_err(OverlayError::win32("IDCompositionDevice::Commit"))?;
            }
            tracing::debug!("visual tree committed");

            let mut resources = Self {
                rtv: None,
                _visual: visual,
                _target: target,
                _dcomp: dcomp,
                swap_chain,
                gpu: GpuContext { device, context },
            };
            let built = resources.rebuild_rtv()?;
            Ok((resources, built))
        }

        /// Create the single render target view for the current back buffer
        /// and return the buffer's size.
        fn rebuild_rtv(&mut self) -> Result<[u32; 2], OverlayError> {
            self.rtv = None;
            unsafe {
                let back_buffer: ID3D11Texture2D = self
                    .swap_chain
                    .GetBuffer(0)
                    .map_err(OverlayError::win32("IDXGISwapChain1::GetBuffer"))?;
                let mut desc = D3D11_TEXTURE2D_DESC::default();
                back_buffer.GetDesc(&mut desc);

                let mut rtv = None;
                self.gpu
                    .device
                    .CreateRenderTargetView(&back_buffer, None, Some(&mut rtv))
                    .map_err(OverlayError::win32("CreateRenderTargetView"))?;
                self.rtv = rtv;
                Ok([desc.Width, desc.Height])
            }
        }
    }

    impl Drop for D3dComposition {
        fn drop(&mut self) {
            if let Some(res) = self.resources.take() {
                unsafe {
                    res.gpu.context.ClearState();
                    res.gpu.context.Flush();
                }
                drop(res);
                tracing::debug!("composition surface released");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_or_unchanged_resize_is_ignored() {
        let mut size = SurfaceSize::new(800, 600);
        size.target_built([800, 600]).expect("matching target");
        assert!(!size.request(0, 600));
        assert!(!size.request(800, 0));
        assert!(!size.request(800, 600));
        assert_eq!(size.current(), [800, 600]);
        assert_eq!(SurfaceSize::new(0, 0).requested(), [1, 1]);
    }

    #[test]
    fn test_resize_request_is_kept_for_recreate() {
        let mut size = SurfaceSize::new(800, 600);
        size.target_built([800, 600]).expect("matching target");
        assert!(size.request(1024, 768));

        // Buffers failed to resize: no target, but the new size sticks
        assert_eq!(size.requested(), [1024, 768]);
        assert_eq!(size.current(), [1024, 768]);
        assert!(!size.request(1024, 768));

        size.target_built([1024, 768]).expect("recreated at the request");
        assert_eq!(size.current(), [1024, 768]);
    }

    #[test]
    fn test_render_target_must_match_request() {
        let mut size = SurfaceSize::new(800, 600);
        size.target_built([800, 600]).expect("matching target");
        assert!(size.request(640, 480));
        let err = size.target_built([800, 600]).unwrap_err();
        assert!(matches!(
            err,
            OverlayError::Resize {
                width: 640,
                height: 480,
                ..
            }
        ));
        assert_eq!(size.current(), [800, 600]);

        size.target_released();
        assert_eq!(size.current(), [640, 480]);
    }

    #[test]
    fn test_device_loss_codes() {
        assert!(is_device_lost(DXGI_ERROR_DEVICE_REMOVED));
        assert!(is_device_lost(DXGI_ERROR_DEVICE_RESET));
        assert!(is_device_lost(DXGI_ERROR_DEVICE_HUNG));
        // E_INVALIDARG
        assert!(!is_device_lost(0x8007_0057_u32 as i32));
    }

    #[test]
    fn test_present_error_classification() {
        assert!(matches!(
            present_error(DXGI_ERROR_DEVICE_REMOVED, "removed".into()),
            OverlayError::DeviceLost(_)
        ));
        let other = present_error(0x8000_4005_u32 as i32, "unspecified".into());
        assert!(matches!(other, OverlayError::Present(_)));
        assert!(other.is_fatal());
    }

    #[test]
    fn test_resize_error_classification() {
        assert!(matches!(
            resize_error(DXGI_ERROR_DEVICE_RESET, 10, 10, "reset".into()),
            OverlayError::DeviceLost(_)
        ));
        assert!(matches!(
            resize_error(0x8007_000E_u32 as i32, 640, 480, "oom".into()),
            OverlayError::Resize {
                width: 640,
                height: 480,
                ..
            }
        ));
    }
}
