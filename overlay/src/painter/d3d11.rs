//! Direct3D 11 painter

use std::mem;

use egui::epaint::ClippedPrimitive;
use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D::Fxc::D3DCompile;
use windows::Win32::Graphics::Direct3D::{
    D3D_SRV_DIMENSION_TEXTURE2D, D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST, ID3DBlob,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11_BIND_CONSTANT_BUFFER, D3D11_BIND_FLAG, D3D11_BIND_INDEX_BUFFER,
    D3D11_BIND_SHADER_RESOURCE, D3D11_BIND_VERTEX_BUFFER, D3D11_BLEND_DESC, D3D11_BLEND_INV_SRC_ALPHA,
    D3D11_BLEND_ONE, D3D11_BLEND_OP_ADD, D3D11_BUFFER_DESC, D3D11_COLOR_WRITE_ENABLE_ALL,
    D3D11_CPU_ACCESS_WRITE, D3D11_CULL_NONE, D3D11_FILL_SOLID, D3D11_FILTER_MIN_MAG_MIP_LINEAR,
    D3D11_INPUT_ELEMENT_DESC, D3D11_INPUT_PER_VERTEX_DATA, D3D11_MAP_WRITE_DISCARD,
    D3D11_MAPPED_SUBRESOURCE, D3D11_RASTERIZER_DESC, D3D11_RENDER_TARGET_BLEND_DESC,
    D3D11_SAMPLER_DESC, D3D11_SHADER_RESOURCE_VIEW_DESC, D3D11_SHADER_RESOURCE_VIEW_DESC_0,
    D3D11_SUBRESOURCE_DATA, D3D11_TEX2D_SRV, D3D11_TEXTURE_ADDRESS_CLAMP, D3D11_TEXTURE2D_DESC,
    D3D11_USAGE_DYNAMIC, D3D11_USAGE_IMMUTABLE, ID3D11BlendState, ID3D11Buffer, ID3D11Device,
    ID3D11InputLayout, ID3D11PixelShader, ID3D11RasterizerState, ID3D11RenderTargetView,
    ID3D11Resource, ID3D11SamplerState, ID3D11ShaderResourceView, ID3D11VertexShader,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_R32_UINT, DXGI_FORMAT_R32G32_FLOAT,
    DXGI_FORMAT_R32G32B32A32_FLOAT, DXGI_SAMPLE_DESC,
};
use windows::core::{Interface, PCSTR};

use super::textures::upload_error;
use super::{
    CpuImage, DrawCall, Globals, PIXEL_SHADER, PainterBackend, ShaderProgram, TextureCache,
    TextureSlot, VERTEX_SHADER, Vertex, grow_capacity, prepare_draw_calls,
};
use crate::composition::{D3dComposition, GpuContext, is_device_lost};
use crate::error::OverlayError;

const INITIAL_VERTEX_BYTES: usize = 64 * 1024;
const INITIAL_INDEX_BYTES: usize = 32 * 1024;

/// Map a failed per-frame GPU call, separating device loss.
fn gpu_error(call: &'static str) -> impl FnOnce(windows::core::Error) -> OverlayError {
    move |e| {
        if is_device_lost(e.code().0) {
            OverlayError::DeviceLost(format!("{call}: {e}"))
        } else {
            OverlayError::Platform {
                call,
                reason: e.to_string(),
            }
        }
    }
}

/// Unwrap a D3D out-parameter that must be set on success.
fn created<T>(value: Option<T>, call: &'static str) -> Result<T, OverlayError> {
    value.ok_or_else(|| OverlayError::Platform {
        call,
        reason: "no object returned".into(),
    })
}

/// Egui painter on the composition surface's device.
pub struct D3dPainter {
    pipeline: Pipeline,
    textures: TextureCache<ID3D11ShaderResourceView>,
}

impl D3dPainter {
    /// Compile shaders and build the pipeline. Shader errors are fatal.
    pub fn initialize(surface: &D3dComposition) -> Result<Self, OverlayError> {
        let pipeline = Pipeline::create(surface.gpu()?)?;
        tracing::info!("painter initialized");
        Ok(Self {
            pipeline,
            textures: TextureCache::new(),
        })
    }
}

impl PainterBackend<D3dComposition> for D3dPainter {
    fn apply_texture_delta(&mut self, delta: &egui::TexturesDelta) {
        let device = &self.pipeline.gpu.device;
        self.textures
            .apply_delta(delta, |id, image| upload_texture(device, id, image));
    }

    fn paint(
        &mut self,
        target: &ID3D11RenderTargetView,
        screen: [u32; 2],
        primitives: &[ClippedPrimitive],
    ) -> Result<(), OverlayError> {
        let calls = prepare_draw_calls(screen, primitives, &self.textures);
        self.pipeline.begin(target, screen)?;
        for call in &calls {
            let srv = match call.slot {
                TextureSlot::Cached(id) => self
                    .textures
                    .gpu(id)
                    .unwrap_or(&self.pipeline.white)
                    .clone(),
                TextureSlot::White => self.pipeline.white.clone(),
                TextureSlot::Transparent => self.pipeline.transparent.clone(),
            };
            self.pipeline.draw(call, srv)?;
        }
        tracing::trace!(draw_calls = calls.len(), "frame painted");
        Ok(())
    }

    fn recreate(&mut self, surface: &D3dComposition) -> Result<(), OverlayError> {
        self.pipeline = Pipeline::create(surface.gpu()?)?;
        let device = &self.pipeline.gpu.device;
        let failed = self
            .textures
            .reupload_all(|id, image| upload_texture(device, id, image));
        tracing::info!(
            textures = self.textures.len(),
            failed = failed.len(),
            "painter recreated"
        );
        Ok(())
    }
}

/// Growable dynamic buffer written with `WRITE_DISCARD`.
struct DynamicBuffer {
    buffer: ID3D11Buffer,
    capacity: usize,
    bind: D3D11_BIND_FLAG,
}

impl DynamicBuffer {
    fn create(
        device: &ID3D11Device,
        bind: D3D11_BIND_FLAG,
        capacity: usize,
    ) -> Result<Self, OverlayError> {
        let desc = D3D11_BUFFER_DESC {
            ByteWidth: capacity as u32,
            Usage: D3D11_USAGE_DYNAMIC,
            BindFlags: bind.0 as u32,
            CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
            ..Default::default()
        };
        let mut buffer = None;
        unsafe {
            device
                .CreateBuffer(&desc, None, Some(&mut buffer))
                .map_err(gpu_error("CreateBuffer"))?;
        }
        Ok(Self {
            buffer: created(buffer, "CreateBuffer")?,
            capacity,
            bind,
        })
    }

    fn write<T: Copy>(&mut self, gpu: &GpuContext, data: &[T]) -> Result<(), OverlayError> {
        let bytes = mem::size_of_val(data);
        let needed = grow_capacity(self.capacity, bytes);
        if needed != self.capacity {
            *self = Self::create(&gpu.device, self.bind, needed)?;
            tracing::debug!(bytes = needed, "dynamic buffer grown");
        }
        unsafe {
            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            gpu.context
                .Map(&self.buffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped))
                .map_err(gpu_error("ID3D11DeviceContext::Map"))?;
            std::ptr::copy_nonoverlapping(data.as_ptr() as *const u8, mapped.pData as *mut u8, bytes);
            gpu.context.Unmap(&self.buffer, 0);
        }
        Ok(())
    }
}

/// Every device-bound object the painter draws with.
struct Pipeline {
    gpu: GpuContext,
    vertex_shader: ID3D11VertexShader,
    pixel_shader: ID3D11PixelShader,
    layout: ID3D11InputLayout,
    sampler: ID3D11SamplerState,
    blend: ID3D11BlendState,
    raster: ID3D11RasterizerState,
    globals: ID3D11Buffer,
    vertices: DynamicBuffer,
    indices: DynamicBuffer,
    white: ID3D11ShaderResourceView,
    transparent: ID3D11ShaderResourceView,
}

impl Pipeline {
    fn create(gpu: GpuContext) -> Result<Self, OverlayError> {
        let device = &gpu.device;
        let vs_bytecode = compile_shader(&VERTEX_SHADER)?;
        let ps_bytecode = compile_shader(&PIXEL_SHADER)?;

        let (vertex_shader, pixel_shader, layout) = unsafe {
            let mut vs = None;
            device
                .CreateVertexShader(&vs_bytecode, None, Some(&mut vs))
                .map_err(OverlayError::win32("CreateVertexShader"))?;
            let mut ps = None;
            device
                .CreatePixelShader(&ps_bytecode, None, Some(&mut ps))
                .map_err(OverlayError::win32("CreatePixelShader"))?;

            let elements = [
                input_element(c"POSITION", DXGI_FORMAT_R32G32_FLOAT, 0),
                input_element(c"TEXCOORD", DXGI_FORMAT_R32G32_FLOAT, 8),
                input_element(c"COLOR", DXGI_FORMAT_R32G32B32A32_FLOAT, 16),
            ];
            let mut layout = None;
            device
                .CreateInputLayout(&elements, &vs_bytecode, Some(&mut layout))
                .map_err(OverlayError::win32("CreateInputLayout"))?;

            (
                created(vs, "CreateVertexShader")?,
                created(ps, "CreatePixelShader")?,
                created(layout, "CreateInputLayout")?,
            )
        };

        let sampler_desc = D3D11_SAMPLER_DESC {
            Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
            AddressU: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressV: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressW: D3D11_TEXTURE_ADDRESS_CLAMP,
            MaxLOD: f32::MAX,
            ..Default::default()
        };

        // Premultiplied over: src * 1 + dst * (1 - src.a), alpha included
        let mut blend_desc = D3D11_BLEND_DESC::default();
        blend_desc.RenderTarget[0] = D3D11_RENDER_TARGET_BLEND_DESC {
            BlendEnable: true.into(),
            SrcBlend: D3D11_BLEND_ONE,
            DestBlend: D3D11_BLEND_INV_SRC_ALPHA,
            BlendOp: D3D11_BLEND_OP_ADD,
            SrcBlendAlpha: D3D11_BLEND_ONE,
            DestBlendAlpha: D3D11_BLEND_INV_SRC_ALPHA,
            BlendOpAlpha: D3D11_BLEND_OP_ADD,
            RenderTargetWriteMask: D3D11_COLOR_WRITE_ENABLE_ALL.0 as u8,
        };

        let raster_desc = D3D11_RASTERIZER_DESC {
            FillMode: D3D11_FILL_SOLID,
            CullMode: D3D11_CULL_NONE,
            ScissorEnable: true.into(),
            DepthClipEnable: true.into(),
            ..Default::default()
        };

        let globals_desc = D3D11_BUFFER_DESC {
            ByteWidth: mem::size_of::<Globals>() as u32,
            Usage: D3D11_USAGE_DYNAMIC,
            BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as u32,
            CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
            ..Default::default()
        };

        let (sampler, blend, raster, globals) = unsafe {
            let mut sampler = None;
            device
                .CreateSamplerState(&sampler_desc, Some(&mut sampler))
                .map_err(OverlayError::win32("CreateSamplerState"))?;
            let mut blend = None;
            device
                .CreateBlendState(&blend_desc, Some(&mut blend))
                .map_err(OverlayError::win32("CreateBlendState"))?;
            let mut raster = None;
            device
                .CreateRasterizerState(&raster_desc, Some(&mut raster))
                .map_err(OverlayError::win32("CreateRasterizerState"))?;
            let mut globals = None;
            device
                .CreateBuffer(&globals_desc, None, Some(&mut globals))
                .map_err(OverlayError::win32("CreateBuffer(globals)"))?;
            (
                created(sampler, "CreateSamplerState")?,
                created(blend, "CreateBlendState")?,
                created(raster, "CreateRasterizerState")?,
                created(globals, "CreateBuffer(globals)")?,
            )
        };

        let vertices = DynamicBuffer::create(device, D3D11_BIND_VERTEX_BUFFER, INITIAL_VERTEX_BYTES)?;
        let indices = DynamicBuffer::create(device, D3D11_BIND_INDEX_BUFFER, INITIAL_INDEX_BYTES)?;

        let solid = |bgra: [u8; 4]| CpuImage {
            size: [1, 1],
            pixels: bgra.to_vec(),
        };
        let white = upload_texture(device, egui::TextureId::User(u64::MAX), &solid([255; 4]))?;
        let transparent =
            upload_texture(device, egui::TextureId::User(u64::MAX - 1), &solid([0; 4]))?;

        Ok(Self {
            gpu,
            vertex_shader,
            pixel_shader,
            layout,
            sampler,
            blend,
            raster,
            globals,
            vertices,
            indices,
            white,
            transparent,
        })
    }

    /// Clear the target, write globals and bind the fixed pipeline state.
    fn begin(&mut self, target: &ID3D11RenderTargetView, screen: [u32; 2]) -> Result<(), OverlayError> {
        let ctx = &self.gpu.context;
        let globals = Globals::new(screen);
        unsafe {
            ctx.ClearRenderTargetView(target, &[0.0; 4]);

            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            ctx.Map(&self.globals, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped))
                .map_err(gpu_error("ID3D11DeviceContext::Map(globals)"))?;
            std::ptr::write(mapped.pData as *mut Globals, globals);
            ctx.Unmap(&self.globals, 0);

            ctx.OMSetBlendState(&self.blend, Some(&[0.0; 4]), 0xffff_ffff);
            ctx.RSSetState(&self.raster);
            ctx.IASetPrimitiveTopology(D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            ctx.IASetInputLayout(&self.layout);
            ctx.VSSetShader(&self.vertex_shader, None);
            ctx.VSSetConstantBuffers(0, Some(&[Some(self.globals.clone())]));
            ctx.PSSetShader(&self.pixel_shader, None);
            ctx.PSSetSamplers(0, Some(&[Some(self.sampler.clone())]));
        }
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall, srv: ID3D11ShaderResourceView) -> Result<(), OverlayError> {
        self.vertices.write(&self.gpu, &call.vertices)?;
        self.indices.write(&self.gpu, &call.indices)?;

        let ctx = &self.gpu.context;
        let scissor = RECT {
            left: call.scissor.left,
            top: call.scissor.top,
            right: call.scissor.right,
            bottom: call.scissor.bottom,
        };
        let strides = [mem::size_of::<Vertex>() as u32];
        let offsets = [0u32];
        let buffers = [Some(self.vertices.buffer.clone())];
        unsafe {
            ctx.RSSetScissorRects(Some(&[scissor]));
            ctx.IASetVertexBuffers(
                0,
                1,
                Some(buffers.as_ptr()),
                Some(strides.as_ptr()),
                Some(offsets.as_ptr()),
            );
            ctx.IASetIndexBuffer(&self.indices.buffer, DXGI_FORMAT_R32_UINT, 0);
            ctx.PSSetShaderResources(0, Some(&[Some(srv)]));
            ctx.DrawIndexed(call.indices.len() as u32, 0, 0);
        }
        Ok(())
    }
}

fn input_element(
    semantic: &'static std::ffi::CStr,
    format: windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT,
    offset: u32,
) -> D3D11_INPUT_ELEMENT_DESC {
    D3D11_INPUT_ELEMENT_DESC {
        SemanticName: PCSTR(semantic.as_ptr() as *const u8),
        SemanticIndex: 0,
        Format: format,
        InputSlot: 0,
        AlignedByteOffset: offset,
        InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
        InstanceDataStepRate: 0,
    }
}

/// Compile one HLSL program; the compiler log becomes the error.
fn compile_shader(program: &ShaderProgram) -> Result<Vec<u8>, OverlayError> {
    let mut code: Option<ID3DBlob> = None;
    let mut errors: Option<ID3DBlob> = None;
    let result = unsafe {
        D3DCompile(
            program.source.as_ptr() as *const _,
            program.source.len(),
            None,
            None,
            None,
            PCSTR(program.entry.as_ptr() as *const u8),
            PCSTR(program.profile.as_ptr() as *const u8),
            0,
            0,
            &mut code,
            Some(&mut errors as *mut _),
        )
    };

    if let Err(e) = result {
        let log = errors
            .as_ref()
            .map(blob_bytes)
            .map(|bytes| String::from_utf8_lossy(&bytes).trim_end().to_string())
            .unwrap_or_else(|| e.to_string());
        tracing::error!(stage = program.stage, %log, "shader compilation failed");
        return Err(OverlayError::ShaderCompile {
            stage: program.stage,
            log,
        });
    }

    let code = code.ok_or_else(|| OverlayError::ShaderCompile {
        stage: program.stage,
        log: "compiler returned no bytecode".into(),
    })?;
    Ok(blob_bytes(&code))
}

fn blob_bytes(blob: &ID3DBlob) -> Vec<u8> {
    unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
            .to_vec()
    }
}

/// Create an immutable BGRA8 texture and its view from a cached image.
fn upload_texture(
    device: &ID3D11Device,
    id: egui::TextureId,
    image: &CpuImage,
) -> Result<ID3D11ShaderResourceView, OverlayError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(upload_error(id, "empty image".into()));
    }
    let desc = D3D11_TEXTURE2D_DESC {
        Width: image.width() as u32,
        Height: image.height() as u32,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: D3D11_USAGE_IMMUTABLE,
        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
        ..Default::default()
    };
    let init = D3D11_SUBRESOURCE_DATA {
        pSysMem: image.pixels.as_ptr() as *const _,
        SysMemPitch: image.pitch() as u32,
        ..Default::default()
    };
    let srv_desc = D3D11_SHADER_RESOURCE_VIEW_DESC {
        Format: desc.Format,
        ViewDimension: D3D_SRV_DIMENSION_TEXTURE2D,
        Anonymous: D3D11_SHADER_RESOURCE_VIEW_DESC_0 {
            Texture2D: D3D11_TEX2D_SRV {
                MostDetailedMip: 0,
                MipLevels: 1,
            },
        },
    };

    let to_upload_error = |e: windows::core::Error| upload_error(id, e.to_string());
    unsafe {
        let mut texture = None;
        device
            .CreateTexture2D(&desc, Some(&init), Some(&mut texture))
            .map_err(to_upload_error)?;
        let texture = texture.ok_or_else(|| upload_error(id, "no texture returned".into()))?;
        let resource: ID3D11Resource = texture.cast().map_err(to_upload_error)?;

        let mut srv = None;
        device
            .CreateShaderResourceView(&resource, Some(&srv_desc), Some(&mut srv))
            .map_err(to_upload_error)?;
        srv.ok_or_else(|| upload_error(id, "no view returned".into()))
    }
}
