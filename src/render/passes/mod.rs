//! Render Passes
//!
//! The concrete passes of the frame pipeline. All of them share a
//! lifecycle:
//!
//! 1. `init` compiles/loads shaders, creates persistently-mapped uniform
//!    buffers, the root signature, and the pipeline(s) (solid plus
//!    wireframe where applicable).
//! 2. `is_ready` reports whether init fully succeeded; a pass that
//!    failed init contributes nothing to the frame.
//! 3. `build` declares the pass and its body into the frame's
//!    [`RdgBuilder`](crate::rdg::RdgBuilder).
//!
//! Pipeline creation reads color and depth formats from the render
//! system so every pass agrees on attachment formats.

pub mod composite;
pub mod deferred_lighting;
pub mod depth_pre;
pub mod depth_visualize;
pub mod gbuffer;
pub mod npr_forward;
pub mod pbr_forward;
pub mod skybox;

use crate::errors::{EmberError, Result};
use crate::render::resource::manager::RenderResourceManager;
use crate::rhi::types::{BufferCreation, BufferUsage, Extent2d, MemoryUsage, RhiBufferInfo, RhiFormat};
use crate::rhi::{MappedRegion, RhiBackend, RhiBackendRef, RhiBuffer, RhiBufferRef};

use super::UNIFORM_ALIGNMENT;

// ─── Pass lifecycle ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PassType {
    Depth,
    GBuffer,
    DeferredLighting,
    Forward,
    Skybox,
    Composite,
    DepthVisualize,
}

pub trait RenderPass {
    fn name(&self) -> &'static str;
    fn pass_type(&self) -> PassType;
    fn is_ready(&self) -> bool;
}

/// Everything a pass needs at init time.
pub struct PassInitContext<'a> {
    pub backend: &'a RhiBackendRef,
    pub resources: &'a RenderResourceManager,
    /// Format of the final color target (the swapchain's actual format).
    pub color_format: RhiFormat,
    pub hdr_format: RhiFormat,
    pub depth_format: RhiFormat,
    pub extent: Extent2d,
}

// ─── Shared buffer helpers ────────────────────────────────────────────────────

#[must_use]
pub(crate) fn align_uniform(size: u64) -> u64 {
    size.div_ceil(UNIFORM_ALIGNMENT) * UNIFORM_ALIGNMENT
}

/// A persistently-mapped uniform buffer sliced into fixed 256-byte
/// aligned elements, used for per-draw constant data.
#[derive(Clone)]
pub(crate) struct UniformRing {
    buffer: RhiBufferRef,
    region: MappedRegion,
    stride: u64,
    capacity: u32,
}

impl UniformRing {
    pub fn new(
        backend: &RhiBackendRef,
        element_size: u64,
        capacity: u32,
        name: &'static str,
    ) -> Result<Self> {
        let stride = align_uniform(element_size);
        let buffer = backend.create_buffer(&RhiBufferInfo {
            size: stride * u64::from(capacity),
            stride: 0,
            usage: BufferUsage::UNIFORM,
            memory: MemoryUsage::CpuToGpu,
            creation: BufferCreation::PERSISTENT_MAP,
            name,
        })?;
        let region = buffer.map().ok_or(EmberError::ResourceCreationFailed {
            what: "buffer",
            detail: format!("uniform ring '{name}' is not mappable"),
        })?;
        Ok(Self {
            buffer,
            region,
            stride,
            capacity,
        })
    }

    /// Store `value` at `index`, returning the byte offset for a range
    /// bind. Indices past capacity wrap and log; rings are sized to the
    /// per-frame object limit so this only fires on overflow.
    pub fn write<T: bytemuck::Pod>(&self, index: u32, value: &T) -> u64 {
        let slot = index % self.capacity;
        if index >= self.capacity {
            log::warn!("uniform ring overflow: index {index} >= {}", self.capacity);
        }
        let offset = u64::from(slot) * self.stride;
        self.region.write(offset, value);
        offset
    }

    #[must_use]
    pub fn buffer(&self) -> &RhiBufferRef {
        &self.buffer
    }

    #[must_use]
    pub fn stride(&self) -> u64 {
        self.stride
    }
}

/// One small persistently-mapped uniform buffer per in-flight pass
/// frame (triple buffered so a frame never overwrites data the GPU is
/// still consuming).
pub(crate) struct FrameUniforms {
    buffers: Vec<(RhiBufferRef, MappedRegion)>,
}

impl FrameUniforms {
    pub fn new(
        backend: &RhiBackendRef,
        size: u64,
        count: usize,
        name: &'static str,
    ) -> Result<Self> {
        let mut buffers = Vec::with_capacity(count);
        for _ in 0..count {
            let buffer = backend.create_buffer(&RhiBufferInfo {
                size,
                stride: 0,
                usage: BufferUsage::UNIFORM,
                memory: MemoryUsage::CpuToGpu,
                creation: BufferCreation::PERSISTENT_MAP,
                name,
            })?;
            let region = buffer.map().ok_or(EmberError::ResourceCreationFailed {
                what: "buffer",
                detail: format!("frame uniforms '{name}' are not mappable"),
            })?;
            buffers.push((buffer, region));
        }
        Ok(Self { buffers })
    }

    /// Write `value` into the slot for `frame_index` and return its
    /// buffer.
    pub fn write<T: bytemuck::Pod>(&self, frame_index: u64, value: &T) -> RhiBufferRef {
        let slot = (frame_index % self.buffers.len() as u64) as usize;
        let (buffer, region) = &self.buffers[slot];
        region.write(0, value);
        buffer.clone()
    }
}
