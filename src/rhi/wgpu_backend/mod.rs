//! wgpu RHI Backend
//!
//! Maps the D3D-style RHI contract onto wgpu:
//!
//! - Slot-based binding (`b#`/`t#`/`s#`) is realized by building bind
//!   groups at draw time from the root-signature schema, cached by a
//!   resource-id fingerprint.
//! - Explicit barriers are validated and tracked for contract parity;
//!   wgpu's internal hazard tracking performs the actual transitions.
//! - Fences are submission markers resolved with `Device::poll`;
//!   semaphores are inert tokens (one queue ⇒ submission order already
//!   serializes GPU work).
//! - CPU-visible buffers shadow their contents and upload on flush.

mod command;
mod convert;
mod mipmap;
mod resources;

pub use command::WgpuCommandContext;
pub use resources::{
    WgpuBuffer, WgpuFence, WgpuGraphicsPipeline, WgpuRootSignature, WgpuSampler, WgpuSemaphore,
    WgpuShader, WgpuTexture, WgpuTextureView,
};

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::errors::{EmberError, Result};

use super::types::{
    Extent2d, Extent3d, MemoryUsage, RhiBufferInfo, RhiFormat, RhiGraphicsPipelineInfo,
    RhiRenderPassInfo, RhiRootSignatureInfo, RhiSamplerInfo, RhiShaderInfo, RhiSwapchainInfo,
    RhiTextureInfo, RhiTextureViewInfo, ShaderFrequency, TextureDimension, TextureUsage,
};
use super::{
    RhiBackend, RhiBufferRef, RhiCommandContextRef, RhiCommandPoolRef, RhiFenceRef,
    RhiGraphicsPipelineRef, RhiRenderPassRef, RhiRootSignatureRef, RhiSamplerRef, RhiSemaphoreRef,
    RhiShaderRef, RhiSwapchain, RhiSwapchainRef, RhiTextureRef, RhiTextureViewRef,
};

// ─── Shared device state ──────────────────────────────────────────────────────

/// Device, queue, and the small set of always-available helper resources
/// shared by every handle of this backend.
pub(crate) struct DeviceShared {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub supports_wireframe: bool,
    pub mip_generator: Mutex<mipmap::MipmapGenerator>,
    /// Fallbacks bound when a declared slot has nothing bound.
    pub dummy_view_2d: wgpu::TextureView,
    pub dummy_view_cube: wgpu::TextureView,
    pub dummy_sampler: wgpu::Sampler,
    pub dummy_uniform: wgpu::Buffer,
}

impl DeviceShared {
    fn new(device: wgpu::Device, queue: wgpu::Queue, supports_wireframe: bool) -> Self {
        let make_dummy = |layers: u32, label: &str| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: layers,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        };
        let dummy_2d = make_dummy(1, "Dummy 2D");
        let dummy_cube = make_dummy(6, "Dummy Cube");
        let dummy_view_2d = dummy_2d.create_view(&wgpu::TextureViewDescriptor::default());
        let dummy_view_cube = dummy_cube.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        let dummy_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Dummy Sampler"),
            ..Default::default()
        });
        let dummy_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Dummy Uniform"),
            size: 256,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        });
        let mip_generator = Mutex::new(mipmap::MipmapGenerator::new(&device));
        Self {
            device,
            queue,
            supports_wireframe,
            mip_generator,
            dummy_view_2d,
            dummy_view_cube,
            dummy_sampler,
            dummy_uniform,
        }
    }
}

// ─── Backend ──────────────────────────────────────────────────────────────────

pub struct WgpuBackend {
    shared: Arc<DeviceShared>,
    adapter: wgpu::Adapter,
    surface: Mutex<Option<wgpu::Surface<'static>>>,
    immediate: RhiCommandContextRef,
}

impl WgpuBackend {
    /// Create a device without a presentable surface (offscreen use).
    pub fn new_headless() -> Result<Arc<Self>> {
        Self::create(None)
    }

    /// Create a device and surface for the given opaque window handles.
    ///
    /// # Safety
    ///
    /// The handles must outlive the returned backend; this is the window
    /// layer's contract (it owns the window for the renderer's lifetime).
    pub unsafe fn from_raw_handles(
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Arc<Self>> {
        Self::create(Some((display, window)))
    }

    fn create(window: Option<(RawDisplayHandle, RawWindowHandle)>) -> Result<Arc<Self>> {
        let instance = wgpu::Instance::default();

        let surface = match window {
            Some((display, window)) => {
                let target = wgpu::SurfaceTargetUnsafe::RawHandle {
                    raw_display_handle: Some(display),
                    raw_window_handle: window,
                };
                // SAFETY: the caller guarantees handle lifetime (see
                // `from_raw_handles`).
                let surface = unsafe { instance.create_surface_unsafe(target) }
                    .map_err(|e| EmberError::AdapterRequestFailed(e.to_string()))?;
                Some(surface)
            }
            None => None,
        };

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface.as_ref(),
            force_fallback_adapter: false,
        }))
        .map_err(|e| EmberError::AdapterRequestFailed(e.to_string()))?;

        let adapter_features = adapter.features();
        let mut features = wgpu::Features::empty();
        if adapter_features.contains(wgpu::Features::POLYGON_MODE_LINE) {
            features |= wgpu::Features::POLYGON_MODE_LINE;
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: features,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))?;

        let supports_wireframe = features.contains(wgpu::Features::POLYGON_MODE_LINE);
        let shared = Arc::new(DeviceShared::new(device, queue, supports_wireframe));
        let immediate: RhiCommandContextRef =
            Arc::new(WgpuCommandContext::new(shared.clone(), true));

        Ok(Arc::new(Self {
            shared,
            adapter,
            surface: Mutex::new(surface),
            immediate,
        }))
    }
}

impl RhiBackend for WgpuBackend {
    fn create_buffer(&self, info: &RhiBufferInfo) -> Result<RhiBufferRef> {
        crate::rhi::validate::validate_buffer_info(info)?;
        Ok(Arc::new(WgpuBuffer::new(self.shared.clone(), info.clone())))
    }

    fn create_texture(&self, info: &RhiTextureInfo) -> Result<RhiTextureRef> {
        crate::rhi::validate::validate_texture_info(info)?;
        Ok(Arc::new(WgpuTexture::new(&self.shared, info.clone())))
    }

    fn create_texture_view(&self, info: &RhiTextureViewInfo) -> Result<RhiTextureViewRef> {
        WgpuTextureView::new(info.clone())
            .map(|v| Arc::new(v) as RhiTextureViewRef)
            .ok_or_else(|| EmberError::ResourceCreationFailed {
                what: "texture view",
                detail: "view over a foreign-backend texture".to_string(),
            })
    }

    fn create_sampler(&self, info: &RhiSamplerInfo) -> Result<RhiSamplerRef> {
        Ok(Arc::new(WgpuSampler::new(&self.shared, info.clone())))
    }

    fn create_shader(&self, info: &RhiShaderInfo) -> Result<RhiShaderRef> {
        let source = std::str::from_utf8(&info.code).map_err(|e| {
            EmberError::ShaderCompileFailed {
                path: info.name.clone(),
                detail: format!("shader bytecode is not valid WGSL text: {e}"),
            }
        })?;
        let error_scope = self
            .shared
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .shared
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&info.name),
                source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(source)),
            });
        if let Some(error) = pollster::block_on(error_scope.pop()) {
            return Err(EmberError::ShaderCompileFailed {
                path: info.name.clone(),
                detail: error.to_string(),
            });
        }
        Ok(Arc::new(WgpuShader::new(module, info.clone())))
    }

    fn create_root_signature(&self, info: &RhiRootSignatureInfo) -> Result<RhiRootSignatureRef> {
        Ok(Arc::new(WgpuRootSignature::new(&self.shared, info.clone())))
    }

    fn create_graphics_pipeline(
        &self,
        info: &RhiGraphicsPipelineInfo,
    ) -> Result<RhiGraphicsPipelineRef> {
        WgpuGraphicsPipeline::new(&self.shared, info)
            .map(|p| Arc::new(p) as RhiGraphicsPipelineRef)
            .ok_or_else(|| EmberError::ResourceCreationFailed {
                what: "graphics pipeline",
                detail: format!("pipeline '{}' is missing required modules", info.name),
            })
    }

    fn create_render_pass(&self, info: &RhiRenderPassInfo) -> Result<RhiRenderPassRef> {
        if info.color_attachments.is_empty() && info.depth_stencil.is_none() {
            return Err(EmberError::ResourceCreationFailed {
                what: "render pass",
                detail: format!("render pass '{}' declares no attachments", info.name),
            });
        }
        Ok(Arc::new(resources::WgpuRenderPass::new(info.clone())))
    }

    fn create_command_pool(&self) -> Result<RhiCommandPoolRef> {
        Ok(Arc::new(resources::WgpuCommandPool::new()))
    }

    fn create_command_context(&self, _pool: &RhiCommandPoolRef) -> Result<RhiCommandContextRef> {
        Ok(Arc::new(WgpuCommandContext::new(self.shared.clone(), false)))
    }

    fn create_fence(&self, signaled: bool) -> Result<RhiFenceRef> {
        Ok(Arc::new(WgpuFence::new(self.shared.clone(), signaled)))
    }

    fn create_semaphore(&self) -> Result<RhiSemaphoreRef> {
        Ok(Arc::new(WgpuSemaphore::new()))
    }

    fn create_swapchain(&self, info: &RhiSwapchainInfo) -> Result<RhiSwapchainRef> {
        let surface = self.surface.lock().take().ok_or_else(|| {
            EmberError::ResourceCreationFailed {
                what: "swapchain",
                detail: "backend has no surface (created headless, or swapchain already exists)"
                    .to_string(),
            }
        })?;
        let swapchain = WgpuSwapchain::new(self.shared.clone(), &self.adapter, surface, info)?;
        Ok(Arc::new(swapchain))
    }

    fn immediate_command(&self) -> RhiCommandContextRef {
        self.immediate.clone()
    }

    fn compile_shader(
        &self,
        source: &str,
        entry: &str,
        frequency: ShaderFrequency,
    ) -> Result<Vec<u8>> {
        // WGSL is both source and accepted bytecode; creating a throwaway
        // module validates it.
        let info = RhiShaderInfo {
            frequency,
            entry: entry.to_string(),
            code: source.as_bytes().to_vec(),
            name: entry.to_string(),
        };
        self.create_shader(&info)?;
        Ok(source.as_bytes().to_vec())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ─── Swapchain ────────────────────────────────────────────────────────────────

pub struct WgpuSwapchain {
    shared: Arc<DeviceShared>,
    surface: wgpu::Surface<'static>,
    config: Mutex<wgpu::SurfaceConfiguration>,
    info: RhiSwapchainInfo,
    current: Mutex<Option<AcquiredFrame>>,
    frame_counter: AtomicU64,
}

struct AcquiredFrame {
    surface_texture: wgpu::SurfaceTexture,
    texture: RhiTextureRef,
}

impl WgpuSwapchain {
    fn new(
        shared: Arc<DeviceShared>,
        adapter: &wgpu::Adapter,
        surface: wgpu::Surface<'static>,
        info: &RhiSwapchainInfo,
    ) -> Result<Self> {
        let mut config = surface
            .get_default_config(adapter, info.extent.width, info.extent.height)
            .ok_or_else(|| EmberError::ResourceCreationFailed {
                what: "swapchain",
                detail: "surface is not supported by the adapter".to_string(),
            })?;
        config.present_mode = if info.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        config.desired_maximum_frame_latency = info.image_count.max(1);
        surface.configure(&shared.device, &config);
        // The surface dictates the actual back-buffer format; report it
        // so pass pipelines agree with the attachment.
        let mut info = *info;
        info.format = convert::rhi_format_from_wgpu(config.format);
        Ok(Self {
            shared,
            surface,
            config: Mutex::new(config),
            info,
            current: Mutex::new(None),
            frame_counter: AtomicU64::new(0),
        })
    }

    fn back_buffer_info(&self) -> RhiTextureInfo {
        RhiTextureInfo {
            dimension: TextureDimension::D2,
            format: self.info.format,
            extent: Extent3d::new(self.info.extent.width, self.info.extent.height, 1),
            mip_levels: 1,
            array_layers: 1,
            usage: TextureUsage::COLOR_TARGET,
            memory: MemoryUsage::GpuOnly,
            name: "Swapchain Back Buffer",
        }
    }
}

impl RhiSwapchain for WgpuSwapchain {
    fn acquire(&self, _signal: Option<&RhiSemaphoreRef>) -> Option<u32> {
        let output = match self.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output)
            | wgpu::CurrentSurfaceTexture::Suboptimal(output) => output,
            wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated => {
                let config = self.config.lock();
                self.surface.configure(&self.shared.device, &config);
                drop(config);
                match self.surface.get_current_texture() {
                    wgpu::CurrentSurfaceTexture::Success(output)
                    | wgpu::CurrentSurfaceTexture::Suboptimal(output) => output,
                    _ => return None,
                }
            }
            other => {
                log::error!("swapchain acquire failed: {other:?}");
                return None;
            }
        };
        let frame = self.frame_counter.fetch_add(1, Ordering::AcqRel);
        let index = (frame % u64::from(self.info.image_count)) as u32;
        let texture: RhiTextureRef = Arc::new(WgpuTexture::from_raw(
            output.texture.clone(),
            self.back_buffer_info(),
        ));
        *self.current.lock() = Some(AcquiredFrame {
            surface_texture: output,
            texture,
        });
        Some(index)
    }

    fn texture(&self, _index: u32) -> RhiTextureRef {
        self.current
            .lock()
            .as_ref()
            .map(|frame| frame.texture.clone())
            .expect("texture() called without a successful acquire")
    }

    fn present(&self, _wait: Option<&RhiSemaphoreRef>) -> bool {
        if let Some(frame) = self.current.lock().take() {
            drop(frame.texture);
            frame.surface_texture.present();
            true
        } else {
            log::warn!("present() without an acquired back buffer");
            true
        }
    }

    fn extent(&self) -> Extent2d {
        self.info.extent
    }

    fn format(&self) -> RhiFormat {
        self.info.format
    }

    fn image_count(&self) -> u32 {
        self.info.image_count
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
