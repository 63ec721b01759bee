//! Render Hardware Interface
//!
//! A backend-agnostic, handle-based abstraction over a graphics API with
//! explicit resource lifetimes, transition semantics, and command
//! recording.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 RhiBackend (factory)                  │
//! │  buffers · textures · views · samplers · shaders      │
//! │  root signatures · pipelines · render passes          │
//! │  command pools/contexts · fences · semaphores         │
//! ├──────────────────────────────────────────────────────┤
//! │  CommandRecorder (shared recording + validation)      │
//! ├──────────────────────┬───────────────────────────────┤
//! │  wgpu backend        │  headless backend              │
//! │  (hardware path)     │  (CPU reference, tests)        │
//! └──────────────────────┴───────────────────────────────┘
//! ```
//!
//! Every GPU object is a reference-counted handle (`Arc<dyn Trait>`); the
//! backend owns the underlying allocation. Creation failures return
//! `Err(ResourceCreationFailed)` and are logged; the RHI never panics
//! across the API boundary.

pub mod command;
pub mod headless;
pub mod state;
pub mod types;
pub mod validate;
pub mod wgpu_backend;

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::errors::Result;
use types::{
    Extent2d, Offset2d, RhiBufferBarrier, RhiBufferInfo, RhiBufferTextureCopy,
    RhiGraphicsPipelineInfo, RhiRenderPassInfo, RhiRootSignatureInfo, RhiSamplerInfo,
    RhiShaderInfo, RhiSwapchainInfo, RhiTextureBarrier, RhiTextureInfo, RhiTextureViewInfo,
    ShaderFrequency, ShaderStages,
};

// ─── Handle Aliases ───────────────────────────────────────────────────────────

pub type RhiBackendRef = Arc<dyn RhiBackend>;
pub type RhiBufferRef = Arc<dyn RhiBuffer>;
pub type RhiTextureRef = Arc<dyn RhiTexture>;
pub type RhiTextureViewRef = Arc<dyn RhiTextureView>;
pub type RhiSamplerRef = Arc<dyn RhiSampler>;
pub type RhiShaderRef = Arc<dyn RhiShader>;
pub type RhiRootSignatureRef = Arc<dyn RhiRootSignature>;
pub type RhiGraphicsPipelineRef = Arc<dyn RhiGraphicsPipeline>;
pub type RhiRenderPassRef = Arc<dyn RhiRenderPass>;
pub type RhiCommandPoolRef = Arc<dyn RhiCommandPool>;
pub type RhiCommandContextRef = Arc<dyn RhiCommandContext>;
pub type RhiFenceRef = Arc<dyn RhiFence>;
pub type RhiSemaphoreRef = Arc<dyn RhiSemaphore>;
pub type RhiSwapchainRef = Arc<dyn RhiSwapchain>;

// ─── Resource Ids ─────────────────────────────────────────────────────────────

/// Monotonic physical id assigned to every backend resource.
///
/// Ids are process-unique and never reused; caches key bind state on them.
pub type ResourceId = u64;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh [`ResourceId`].
#[must_use]
pub fn next_resource_id() -> ResourceId {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Mapped Memory ────────────────────────────────────────────────────────────

/// A CPU-visible window into a buffer's memory.
///
/// Obtained from [`RhiBuffer::map`]; for persistently-mapped buffers the
/// region stays valid for the buffer's whole lifetime and writing is an
/// in-place store (no per-frame map/unmap). Backends that shadow CPU
/// memory use the region's version counter to schedule uploads.
#[derive(Clone)]
pub struct MappedRegion {
    bytes: Arc<Mutex<Vec<u8>>>,
    version: Arc<AtomicU64>,
}

impl MappedRegion {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(vec![0; size])),
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write raw bytes at `offset`. Out-of-range writes are clamped and
    /// logged rather than panicking.
    pub fn write_bytes(&self, offset: u64, data: &[u8]) {
        let mut bytes = self.bytes.lock();
        let offset = offset as usize;
        if offset >= bytes.len() {
            log::error!(
                "MappedRegion write at {} past end of {}-byte region",
                offset,
                bytes.len()
            );
            return;
        }
        let end = (offset + data.len()).min(bytes.len());
        let count = end - offset;
        bytes[offset..end].copy_from_slice(&data[..count]);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Write one plain-old-data value at `offset`.
    pub fn write<T: bytemuck::Pod>(&self, offset: u64, value: &T) {
        self.write_bytes(offset, bytemuck::bytes_of(value));
    }

    /// Read `len` bytes starting at `offset` (clamped to the region).
    #[must_use]
    pub fn read_bytes(&self, offset: u64, len: usize) -> Vec<u8> {
        let bytes = self.bytes.lock();
        let offset = (offset as usize).min(bytes.len());
        let end = (offset + len).min(bytes.len());
        bytes[offset..end].to_vec()
    }

    /// Read one plain-old-data value at `offset`.
    #[must_use]
    pub fn read<T: bytemuck::Pod>(&self, offset: u64) -> T {
        let raw = self.read_bytes(offset, std::mem::size_of::<T>());
        bytemuck::pod_read_unaligned(&raw)
    }

    /// Snapshot the whole region.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    /// Monotonic write counter, used by backends to schedule uploads.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

// ─── Handle Traits ────────────────────────────────────────────────────────────

/// Common surface of every RHI handle.
pub trait RhiResource: Send + Sync {
    /// Process-unique physical id.
    fn resource_id(&self) -> ResourceId;

    /// Release the backend allocation early. Idempotent; dropping the last
    /// handle reference releases it regardless.
    fn destroy(&self) {}

    /// Backend downcast hook.
    fn as_any(&self) -> &dyn Any;
}

pub trait RhiBuffer: RhiResource {
    fn info(&self) -> &RhiBufferInfo;

    /// Map the buffer for CPU access. Returns `None` for GPU-only memory.
    fn map(&self) -> Option<MappedRegion>;

    /// Release a prior map. For persistently-mapped buffers this is a
    /// hint that a batch of writes is complete.
    fn unmap(&self) {}
}

pub trait RhiTexture: RhiResource {
    fn info(&self) -> &RhiTextureInfo;
}

pub trait RhiTextureView: RhiResource {
    fn texture(&self) -> &RhiTextureRef;
    fn view_info(&self) -> &RhiTextureViewInfo;
}

pub trait RhiSampler: RhiResource {
    fn info(&self) -> &RhiSamplerInfo;
}

pub trait RhiShader: RhiResource {
    fn info(&self) -> &RhiShaderInfo;
}

pub trait RhiRootSignature: RhiResource {
    fn info(&self) -> &RhiRootSignatureInfo;
}

pub trait RhiGraphicsPipeline: RhiResource {
    fn root_signature(&self) -> Option<&RhiRootSignatureRef>;
}

pub trait RhiRenderPass: RhiResource {
    fn info(&self) -> &RhiRenderPassInfo;
}

pub trait RhiCommandPool: RhiResource {}

/// CPU-GPU synchronization primitive.
pub trait RhiFence: RhiResource {
    /// Block until the fence signals.
    fn wait(&self);
    fn is_signaled(&self) -> bool;
    fn reset(&self);
}

/// GPU-GPU synchronization token coordinating submissions.
pub trait RhiSemaphore: RhiResource {}

/// A command recording context.
///
/// # Contract
///
/// - `begin_command` resets state; `end_command` seals it for submission.
/// - At most one render pass may be open at a time.
/// - State binding is legal inside and outside a render pass; draws only
///   inside one; barriers only outside one.
/// - Viewport and scissor must be set on every render-pass entry; state
///   does not persist across pass boundaries.
pub trait RhiCommandContext: Send + Sync {
    fn begin_command(&self);
    fn end_command(&self);

    fn begin_render_pass(&self, pass: &RhiRenderPassRef);
    fn end_render_pass(&self);

    fn set_viewport(&self, offset: Offset2d, extent: Extent2d);
    fn set_scissor(&self, offset: Offset2d, extent: Extent2d);

    fn set_graphics_pipeline(&self, pipeline: &RhiGraphicsPipelineRef);
    fn bind_vertex_buffer(&self, buffer: &RhiBufferRef, slot: u32, offset: u64);
    fn bind_index_buffer(&self, buffer: &RhiBufferRef, offset: u64);
    fn bind_constant_buffer(&self, buffer: &RhiBufferRef, slot: u32, stages: ShaderStages);

    /// Bind a sub-range of a buffer as a constant buffer. `size == 0`
    /// binds the whole remaining buffer. Offsets must respect the
    /// backend's uniform-offset alignment (256 bytes).
    fn bind_constant_buffer_range(
        &self,
        buffer: &RhiBufferRef,
        slot: u32,
        stages: ShaderStages,
        offset: u64,
        size: u64,
    );
    fn bind_texture(&self, texture: &RhiTextureRef, slot: u32, stages: ShaderStages);
    fn bind_texture_view(&self, view: &RhiTextureViewRef, slot: u32, stages: ShaderStages);
    fn bind_sampler(&self, sampler: &RhiSamplerRef, slot: u32, stages: ShaderStages);

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Draw with arguments sourced from an indirect-argument buffer.
    fn draw_indirect(&self, buffer: &RhiBufferRef, offset: u64);

    /// Transition a texture between resource states. `old == new` is a
    /// no-op; issuing a barrier inside a render pass is an error.
    fn texture_barrier(&self, barrier: &RhiTextureBarrier);
    fn buffer_barrier(&self, barrier: &RhiBufferBarrier);

    fn copy_buffer_to_buffer(
        &self,
        src: &RhiBufferRef,
        src_offset: u64,
        dst: &RhiBufferRef,
        dst_offset: u64,
        size: u64,
    );
    fn copy_buffer_to_texture(
        &self,
        src: &RhiBufferRef,
        dst: &RhiTextureRef,
        region: &RhiBufferTextureCopy,
    );
    fn copy_texture_to_buffer(
        &self,
        src: &RhiTextureRef,
        dst: &RhiBufferRef,
        region: &RhiBufferTextureCopy,
    );

    /// Generate the full mip chain from level 0.
    fn generate_mips(&self, texture: &RhiTextureRef);

    /// Submit recorded commands to the queue. The fence signals on GPU
    /// completion; the semaphores coordinate with other submissions
    /// (e.g. swapchain acquire / present).
    fn execute(
        &self,
        fence: Option<&RhiFenceRef>,
        wait: Option<&RhiSemaphoreRef>,
        signal: Option<&RhiSemaphoreRef>,
    ) -> Result<()>;

    /// Submit and block until the GPU finishes. Upload convenience for
    /// the immediate context.
    fn flush(&self) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// The swapchain: owns the back-buffer textures of a presentable surface.
pub trait RhiSwapchain: Send + Sync {
    /// Acquire the next back buffer, signaling `signal` when the image is
    /// available. May block while every image is in flight. Returns
    /// `None` when the surface is lost or closed.
    fn acquire(&self, signal: Option<&RhiSemaphoreRef>) -> Option<u32>;

    /// The texture behind back-buffer `index`.
    fn texture(&self, index: u32) -> RhiTextureRef;

    /// Present the most recently acquired image after `wait` signals.
    /// Returns `false` once the surface reports closure.
    fn present(&self, wait: Option<&RhiSemaphoreRef>) -> bool;

    fn extent(&self) -> Extent2d;
    fn format(&self) -> types::RhiFormat;
    fn image_count(&self) -> u32;

    fn as_any(&self) -> &dyn Any;
}

// ─── Backend Factory ──────────────────────────────────────────────────────────

/// The device: factory for every other RHI object plus immediate command
/// submission for synchronous uploads.
pub trait RhiBackend: Send + Sync {
    fn create_buffer(&self, info: &RhiBufferInfo) -> Result<RhiBufferRef>;
    fn create_texture(&self, info: &RhiTextureInfo) -> Result<RhiTextureRef>;
    fn create_texture_view(&self, info: &RhiTextureViewInfo) -> Result<RhiTextureViewRef>;
    fn create_sampler(&self, info: &RhiSamplerInfo) -> Result<RhiSamplerRef>;
    fn create_shader(&self, info: &RhiShaderInfo) -> Result<RhiShaderRef>;
    fn create_root_signature(&self, info: &RhiRootSignatureInfo) -> Result<RhiRootSignatureRef>;
    fn create_graphics_pipeline(
        &self,
        info: &RhiGraphicsPipelineInfo,
    ) -> Result<RhiGraphicsPipelineRef>;
    fn create_render_pass(&self, info: &RhiRenderPassInfo) -> Result<RhiRenderPassRef>;
    fn create_command_pool(&self) -> Result<RhiCommandPoolRef>;
    fn create_command_context(&self, pool: &RhiCommandPoolRef) -> Result<RhiCommandContextRef>;
    fn create_fence(&self, signaled: bool) -> Result<RhiFenceRef>;
    fn create_semaphore(&self) -> Result<RhiSemaphoreRef>;
    fn create_swapchain(&self, info: &RhiSwapchainInfo) -> Result<RhiSwapchainRef>;

    /// Privileged context for synchronous uploads during asset loading.
    fn immediate_command(&self) -> RhiCommandContextRef;

    /// Optional convenience: validate/compile shader source into the
    /// bytecode `create_shader` accepts. Precompiled bytecode loaded from
    /// disk is always accepted without this.
    fn compile_shader(
        &self,
        source: &str,
        entry: &str,
        frequency: ShaderFrequency,
    ) -> Result<Vec<u8>>;

    fn as_any(&self) -> &dyn Any;
}
