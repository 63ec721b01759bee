//! Headless RHI Backend
//!
//! A CPU reference implementation of the full RHI contract. Buffers are
//! backed by byte vectors, textures track per-subresource states, and
//! command contexts replay their recorded stream into a journal that
//! tests (and debugging sessions) can inspect.
//!
//! # What it is for
//!
//! - The automated test suite: every RHI/RDG/pass property runs here.
//! - Running the engine on machines without a GPU (CI, servers).
//!
//! Copies execute for real on CPU memory, so buffer round-trips and
//! texture readbacks behave like a (very slow, never-shaded) GPU. Draws
//! and mip generation are journaled but produce no pixels.

mod command;
mod resources;

pub use command::HeadlessCommandContext;
pub use resources::{
    HeadlessBuffer, HeadlessFence, HeadlessSemaphore, HeadlessSwapchain, HeadlessTexture,
};

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{EmberError, Result};

use super::types::{
    ResourceState, RhiBufferInfo, RhiBufferTextureCopy, RhiGraphicsPipelineInfo,
    RhiRenderPassInfo, RhiRootSignatureInfo, RhiSamplerInfo, RhiShaderInfo, RhiSwapchainInfo,
    RhiTextureInfo, RhiTextureViewInfo, ShaderFrequency, TextureUsage,
};
use super::{
    ResourceId, RhiBackend, RhiBufferRef, RhiCommandContextRef, RhiCommandPoolRef, RhiFenceRef,
    RhiGraphicsPipelineRef, RhiRenderPassRef, RhiRootSignatureRef, RhiSamplerRef, RhiSemaphoreRef,
    RhiShaderRef, RhiSwapchainRef, RhiTextureRef, RhiTextureViewRef,
};

// ─── Journal ──────────────────────────────────────────────────────────────────

/// One observable backend event.
#[derive(Clone, Debug, PartialEq)]
pub enum JournalEvent {
    BeginRenderPass { name: String },
    EndRenderPass,
    TextureBarrier {
        texture: ResourceId,
        old_state: ResourceState,
        new_state: ResourceState,
    },
    Draw { vertex_count: u32 },
    DrawIndexed { index_count: u32 },
    DrawIndirect,
    CopyBufferToBuffer { size: u64 },
    CopyBufferToTexture { texture: ResourceId },
    CopyTextureToBuffer { texture: ResourceId },
    GenerateMips { texture: ResourceId },
    Submit,
    Present { image_index: u32 },
}

/// Append-only record of everything the backend executed.
#[derive(Default)]
pub struct Journal {
    events: Mutex<Vec<JournalEvent>>,
}

impl Journal {
    pub(crate) fn push(&self, event: JournalEvent) {
        self.events.lock().push(event);
    }

    /// Snapshot of all events since the last [`clear`](Self::clear).
    #[must_use]
    pub fn events(&self) -> Vec<JournalEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Count events matching a predicate.
    pub fn count(&self, predicate: impl Fn(&JournalEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Names of render passes in execution order.
    #[must_use]
    pub fn pass_order(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                JournalEvent::BeginRenderPass { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

// ─── Backend ──────────────────────────────────────────────────────────────────

/// The headless device.
pub struct HeadlessBackend {
    journal: Arc<Journal>,
    immediate: RhiCommandContextRef,
}

impl HeadlessBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let journal = Arc::new(Journal::default());
        let immediate: RhiCommandContextRef =
            Arc::new(HeadlessCommandContext::new(journal.clone(), true));
        Arc::new(Self { journal, immediate })
    }

    /// The execution journal, for inspection in tests.
    #[must_use]
    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }
}

impl RhiBackend for HeadlessBackend {
    fn create_buffer(&self, info: &RhiBufferInfo) -> Result<RhiBufferRef> {
        crate::rhi::validate::validate_buffer_info(info)?;
        Ok(Arc::new(HeadlessBuffer::new(info.clone())))
    }

    fn create_texture(&self, info: &RhiTextureInfo) -> Result<RhiTextureRef> {
        crate::rhi::validate::validate_texture_info(info)?;
        Ok(Arc::new(HeadlessTexture::new(info.clone())))
    }

    fn create_texture_view(&self, info: &RhiTextureViewInfo) -> Result<RhiTextureViewRef> {
        Ok(Arc::new(resources::HeadlessTextureView::new(info.clone())))
    }

    fn create_sampler(&self, info: &RhiSamplerInfo) -> Result<RhiSamplerRef> {
        Ok(Arc::new(resources::HeadlessSampler::new(info.clone())))
    }

    fn create_shader(&self, info: &RhiShaderInfo) -> Result<RhiShaderRef> {
        if info.code.is_empty() {
            return Err(EmberError::ResourceCreationFailed {
                what: "shader",
                detail: format!("empty bytecode for shader '{}'", info.name),
            });
        }
        Ok(Arc::new(resources::HeadlessShader::new(info.clone())))
    }

    fn create_root_signature(&self, info: &RhiRootSignatureInfo) -> Result<RhiRootSignatureRef> {
        Ok(Arc::new(resources::HeadlessRootSignature::new(info.clone())))
    }

    fn create_graphics_pipeline(
        &self,
        info: &RhiGraphicsPipelineInfo,
    ) -> Result<RhiGraphicsPipelineRef> {
        if info.vertex_shader.is_none() {
            return Err(EmberError::ResourceCreationFailed {
                what: "graphics pipeline",
                detail: format!("pipeline '{}' has no vertex shader", info.name),
            });
        }
        Ok(Arc::new(resources::HeadlessGraphicsPipeline::new(
            info.clone(),
        )))
    }

    fn create_render_pass(&self, info: &RhiRenderPassInfo) -> Result<RhiRenderPassRef> {
        if info.color_attachments.is_empty() && info.depth_stencil.is_none() {
            return Err(EmberError::ResourceCreationFailed {
                what: "render pass",
                detail: format!("render pass '{}' declares no attachments", info.name),
            });
        }
        Ok(Arc::new(resources::HeadlessRenderPass::new(info.clone())))
    }

    fn create_command_pool(&self) -> Result<RhiCommandPoolRef> {
        Ok(Arc::new(resources::HeadlessCommandPool::new()))
    }

    fn create_command_context(&self, _pool: &RhiCommandPoolRef) -> Result<RhiCommandContextRef> {
        Ok(Arc::new(HeadlessCommandContext::new(
            self.journal.clone(),
            false,
        )))
    }

    fn create_fence(&self, signaled: bool) -> Result<RhiFenceRef> {
        Ok(Arc::new(HeadlessFence::new(signaled)))
    }

    fn create_semaphore(&self) -> Result<RhiSemaphoreRef> {
        Ok(Arc::new(HeadlessSemaphore::new()))
    }

    fn create_swapchain(&self, info: &RhiSwapchainInfo) -> Result<RhiSwapchainRef> {
        HeadlessSwapchain::new(info, self.journal.clone())
            .map(|sc| Arc::new(sc) as RhiSwapchainRef)
    }

    fn immediate_command(&self) -> RhiCommandContextRef {
        self.immediate.clone()
    }

    fn compile_shader(
        &self,
        source: &str,
        entry: &str,
        _frequency: ShaderFrequency,
    ) -> Result<Vec<u8>> {
        if source.trim().is_empty() {
            return Err(EmberError::ShaderCompileFailed {
                path: entry.to_string(),
                detail: "empty shader source".to_string(),
            });
        }
        if !source.contains(entry) {
            log::warn!("shader source does not mention entry point '{entry}'");
        }
        Ok(source.as_bytes().to_vec())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ─── Internal helpers shared by the headless module ───────────────────────────

pub(crate) fn texel_offset(
    info: &RhiTextureInfo,
    region: &RhiBufferTextureCopy,
) -> Option<(usize, usize, usize)> {
    // Only mip level 0 is materialized on CPU; other levels are journaled
    // without storage.
    if region.mip_level != 0 {
        return None;
    }
    let bpt = info.format.bytes_per_texel() as usize;
    let row = info.extent.width as usize * bpt;
    let layer_size = row * info.extent.height as usize;
    let base = region.array_layer as usize * layer_size;
    Some((base, row, bpt))
}

pub(crate) fn default_texture_state(_info: &RhiTextureInfo) -> ResourceState {
    // Textures start undefined; the first barrier defines them.
    ResourceState::Undefined
}

pub(crate) fn cpu_size_of(info: &RhiTextureInfo) -> usize {
    let bpt = info.format.bytes_per_texel() as usize;
    info.extent.width as usize
        * info.extent.height as usize
        * info.extent.depth as usize
        * info.array_layers.max(1) as usize
        * bpt
}

pub(crate) fn implied_usage(info: &RhiTextureInfo) -> TextureUsage {
    // Depth formats imply depth-target usage.
    let mut usage = info.usage;
    if info.format.is_depth() {
        usage |= TextureUsage::DEPTH_TARGET;
    }
    usage
}
