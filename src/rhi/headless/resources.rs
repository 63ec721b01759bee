//! Headless Resource Handles
//!
//! CPU-backed implementations of every RHI handle kind. All of them carry
//! a process-unique [`ResourceId`] and an idempotent `destroy()`.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::errors::{EmberError, Result};
use crate::rhi::state::SubresourceStates;
use crate::rhi::types::{
    Extent2d, Extent3d, MemoryUsage, ResourceState, RhiBufferInfo, RhiFormat,
    RhiGraphicsPipelineInfo, RhiRenderPassInfo, RhiRootSignatureInfo, RhiSamplerInfo,
    RhiShaderInfo, RhiSwapchainInfo, RhiTextureInfo, RhiTextureViewInfo, TextureAspect,
    TextureDimension, TextureUsage,
};
use crate::rhi::{
    MappedRegion, ResourceId, RhiBuffer, RhiCommandPool, RhiFence, RhiGraphicsPipeline,
    RhiRenderPass, RhiResource, RhiRootSignature, RhiRootSignatureRef, RhiSampler, RhiSemaphore,
    RhiSemaphoreRef, RhiShader, RhiSwapchain, RhiTexture, RhiTextureRef, RhiTextureView,
    next_resource_id,
};

use super::{Journal, JournalEvent};

// ─── Buffer ───────────────────────────────────────────────────────────────────

pub struct HeadlessBuffer {
    id: ResourceId,
    info: RhiBufferInfo,
    region: MappedRegion,
    state: Mutex<ResourceState>,
    destroyed: AtomicBool,
}

impl HeadlessBuffer {
    #[must_use]
    pub fn new(info: RhiBufferInfo) -> Self {
        let region = MappedRegion::new(info.size as usize);
        Self {
            id: next_resource_id(),
            info,
            region,
            state: Mutex::new(ResourceState::Common),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Backend-internal storage access (copies run on this).
    pub(crate) fn storage(&self) -> &MappedRegion {
        &self.region
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        *self.state.lock() = state;
    }

    #[must_use]
    pub fn current_state(&self) -> ResourceState {
        *self.state.lock()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl RhiResource for HeadlessBuffer {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiBuffer for HeadlessBuffer {
    fn info(&self) -> &RhiBufferInfo {
        &self.info
    }

    fn map(&self) -> Option<MappedRegion> {
        if self.info.memory.cpu_visible() {
            Some(self.region.clone())
        } else {
            log::error!("map() on GPU-only buffer '{}'", self.info.name);
            None
        }
    }
}

// ─── Texture ──────────────────────────────────────────────────────────────────

pub struct HeadlessTexture {
    id: ResourceId,
    info: RhiTextureInfo,
    states: SubresourceStates,
    /// Mip level 0 texel storage for CPU copy round-trips.
    data: Mutex<Vec<u8>>,
    destroyed: AtomicBool,
}

impl HeadlessTexture {
    #[must_use]
    pub fn new(mut info: RhiTextureInfo) -> Self {
        info.usage = super::implied_usage(&info);
        let size = super::cpu_size_of(&info);
        let states = SubresourceStates::new(
            info.mip_levels,
            info.array_layers,
            super::default_texture_state(&info),
        );
        Self {
            id: next_resource_id(),
            info,
            states,
            data: Mutex::new(vec![0; size]),
            destroyed: AtomicBool::new(false),
        }
    }

    pub(crate) fn states(&self) -> &SubresourceStates {
        &self.states
    }

    pub(crate) fn data(&self) -> &Mutex<Vec<u8>> {
        &self.data
    }

    /// The whole-texture state when uniform (test inspection).
    #[must_use]
    pub fn current_state(&self) -> Option<ResourceState> {
        self.states.whole_state()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl RhiResource for HeadlessTexture {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiTexture for HeadlessTexture {
    fn info(&self) -> &RhiTextureInfo {
        &self.info
    }
}

// ─── Texture view ─────────────────────────────────────────────────────────────

pub struct HeadlessTextureView {
    id: ResourceId,
    info: RhiTextureViewInfo,
}

impl HeadlessTextureView {
    #[must_use]
    pub fn new(mut info: RhiTextureViewInfo) -> Self {
        if info.format == RhiFormat::Undefined {
            info.format = info.texture.info().format;
        }
        // Aspect follows the format unless the caller picked a legal subset.
        let format_aspect = info.format.default_aspect();
        if info.subresource.aspect == TextureAspect::Color && format_aspect != TextureAspect::Color
        {
            info.subresource.aspect = format_aspect;
        }
        Self {
            id: next_resource_id(),
            info,
        }
    }
}

impl RhiResource for HeadlessTextureView {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiTextureView for HeadlessTextureView {
    fn texture(&self) -> &RhiTextureRef {
        &self.info.texture
    }

    fn view_info(&self) -> &RhiTextureViewInfo {
        &self.info
    }
}

// ─── Trivial handle kinds ─────────────────────────────────────────────────────

macro_rules! plain_handle {
    ($name:ident, $info:ty) => {
        pub struct $name {
            id: ResourceId,
            info: $info,
        }

        impl $name {
            #[must_use]
            pub fn new(info: $info) -> Self {
                Self {
                    id: next_resource_id(),
                    info,
                }
            }
        }

        impl RhiResource for $name {
            fn resource_id(&self) -> ResourceId {
                self.id
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

plain_handle!(HeadlessSampler, RhiSamplerInfo);
plain_handle!(HeadlessShader, RhiShaderInfo);
plain_handle!(HeadlessRootSignature, RhiRootSignatureInfo);
plain_handle!(HeadlessRenderPass, RhiRenderPassInfo);

impl RhiSampler for HeadlessSampler {
    fn info(&self) -> &RhiSamplerInfo {
        &self.info
    }
}

impl RhiShader for HeadlessShader {
    fn info(&self) -> &RhiShaderInfo {
        &self.info
    }
}

impl RhiRootSignature for HeadlessRootSignature {
    fn info(&self) -> &RhiRootSignatureInfo {
        &self.info
    }
}

impl RhiRenderPass for HeadlessRenderPass {
    fn info(&self) -> &RhiRenderPassInfo {
        &self.info
    }
}

pub struct HeadlessGraphicsPipeline {
    id: ResourceId,
    info: RhiGraphicsPipelineInfo,
}

impl HeadlessGraphicsPipeline {
    #[must_use]
    pub fn new(info: RhiGraphicsPipelineInfo) -> Self {
        Self {
            id: next_resource_id(),
            info,
        }
    }

    #[must_use]
    pub fn info(&self) -> &RhiGraphicsPipelineInfo {
        &self.info
    }
}

impl RhiResource for HeadlessGraphicsPipeline {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiGraphicsPipeline for HeadlessGraphicsPipeline {
    fn root_signature(&self) -> Option<&RhiRootSignatureRef> {
        self.info.root_signature.as_ref()
    }
}

pub struct HeadlessCommandPool {
    id: ResourceId,
}

impl HeadlessCommandPool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: next_resource_id(),
        }
    }
}

impl Default for HeadlessCommandPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RhiResource for HeadlessCommandPool {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiCommandPool for HeadlessCommandPool {}

// ─── Fence & Semaphore ────────────────────────────────────────────────────────

/// Headless fence. Execution is synchronous, so a submitted fence is
/// signaled by the time `execute` returns; `wait` never blocks.
pub struct HeadlessFence {
    id: ResourceId,
    signaled: AtomicBool,
}

impl HeadlessFence {
    #[must_use]
    pub fn new(signaled: bool) -> Self {
        Self {
            id: next_resource_id(),
            signaled: AtomicBool::new(signaled),
        }
    }

    pub(crate) fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }
}

impl RhiResource for HeadlessFence {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiFence for HeadlessFence {
    fn wait(&self) {
        if !self.signaled.load(Ordering::Acquire) {
            log::warn!("wait() on an unsubmitted headless fence");
        }
    }

    fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }
}

pub struct HeadlessSemaphore {
    id: ResourceId,
    signaled: AtomicBool,
}

impl HeadlessSemaphore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: next_resource_id(),
            signaled: AtomicBool::new(false),
        }
    }

    pub(crate) fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    pub(crate) fn consume(&self) -> bool {
        self.signaled.swap(false, Ordering::AcqRel)
    }
}

impl Default for HeadlessSemaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl RhiResource for HeadlessSemaphore {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiSemaphore for HeadlessSemaphore {}

// ─── Swapchain ────────────────────────────────────────────────────────────────

/// Headless swapchain: N color textures cycled round-robin.
pub struct HeadlessSwapchain {
    info: RhiSwapchainInfo,
    textures: Vec<RhiTextureRef>,
    current: Mutex<Option<u32>>,
    frame_counter: AtomicU64,
    present_count: AtomicU64,
    closed: AtomicBool,
    journal: Arc<Journal>,
}

impl HeadlessSwapchain {
    pub fn new(info: &RhiSwapchainInfo, journal: Arc<Journal>) -> Result<Self> {
        if info.image_count == 0 || info.extent.width == 0 || info.extent.height == 0 {
            return Err(EmberError::ResourceCreationFailed {
                what: "swapchain",
                detail: "swapchain needs a non-zero extent and image count".to_string(),
            });
        }
        let textures = (0..info.image_count)
            .map(|_| {
                Arc::new(HeadlessTexture::new(RhiTextureInfo {
                    dimension: TextureDimension::D2,
                    format: info.format,
                    extent: Extent3d::new(info.extent.width, info.extent.height, 1),
                    mip_levels: 1,
                    array_layers: 1,
                    usage: TextureUsage::COLOR_TARGET | TextureUsage::COPY_SRC,
                    memory: MemoryUsage::GpuOnly,
                    name: "Swapchain Back Buffer",
                })) as RhiTextureRef
            })
            .collect();
        Ok(Self {
            info: *info,
            textures,
            current: Mutex::new(None),
            frame_counter: AtomicU64::new(0),
            present_count: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            journal,
        })
    }

    /// Simulate the window being closed; the next `present` returns false.
    pub fn request_close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn present_count(&self) -> u64 {
        self.present_count.load(Ordering::Acquire)
    }
}

impl RhiSwapchain for HeadlessSwapchain {
    fn acquire(&self, signal: Option<&RhiSemaphoreRef>) -> Option<u32> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let frame = self.frame_counter.fetch_add(1, Ordering::AcqRel);
        let index = (frame % u64::from(self.info.image_count)) as u32;
        *self.current.lock() = Some(index);
        if let Some(sem) = signal {
            if let Some(sem) = sem.as_any().downcast_ref::<HeadlessSemaphore>() {
                sem.signal();
            }
        }
        Some(index)
    }

    fn texture(&self, index: u32) -> RhiTextureRef {
        self.textures[index as usize % self.textures.len()].clone()
    }

    fn present(&self, wait: Option<&RhiSemaphoreRef>) -> bool {
        if let Some(sem) = wait {
            if let Some(sem) = sem.as_any().downcast_ref::<HeadlessSemaphore>() {
                if !sem.consume() {
                    log::warn!("present() waiting on an unsignaled semaphore");
                }
            }
        }
        let index = self.current.lock().take().unwrap_or(0);
        self.journal.push(JournalEvent::Present { image_index: index });
        self.present_count.fetch_add(1, Ordering::AcqRel);
        !self.closed.load(Ordering::Acquire)
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
