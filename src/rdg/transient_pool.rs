//! Transient Texture Pool
//!
//! Pools short-lived render-graph textures across frames. The executor
//! allocates during scheduling and returns everything at frame end; a
//! texture is only created when no compatible free one exists.
//!
//! # Memory Strategy
//!
//! - Textures are never destroyed during normal rendering; they stay in
//!   the free pool for reuse.
//! - Call [`TransientTexturePool::trim`] after a resolution change to
//!   release textures that have sat idle for several frames.

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::rhi::types::{
    Extent2d, Extent3d, MemoryUsage, ResourceState, RhiFormat, RhiTextureInfo, TextureDimension,
    TextureUsage,
};
use crate::rhi::{RhiBackend, RhiBackendRef, RhiTextureRef};

/// Descriptor for requesting a transient texture.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TransientTextureDesc {
    pub extent: Extent2d,
    pub format: RhiFormat,
    pub usage: TextureUsage,
    pub mip_levels: u32,
}

/// A pooled texture together with the state the previous frame left it in.
pub struct PooledTexture {
    pub texture: RhiTextureRef,
    pub initial_state: ResourceState,
}

struct FreeEntry {
    texture: RhiTextureRef,
    last_state: ResourceState,
    idle_frames: u32,
}

/// GPU texture pool for transient per-frame allocations.
pub struct TransientTexturePool {
    /// Textures handed out this frame, with the state the executor must
    /// report back on [`reset`](Self::reset).
    active: Vec<(TransientTextureDesc, RhiTextureRef)>,
    free: FxHashMap<TransientTextureDesc, Vec<FreeEntry>>,
}

impl TransientTexturePool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Vec::new(),
            free: FxHashMap::default(),
        }
    }

    /// Allocate a texture matching `desc`, reusing a pooled one when
    /// possible.
    pub fn allocate(
        &mut self,
        backend: &RhiBackendRef,
        desc: &TransientTextureDesc,
        name: &'static str,
    ) -> Result<PooledTexture> {
        if let Some(bucket) = self.free.get_mut(desc) {
            if let Some(entry) = bucket.pop() {
                self.active.push((desc.clone(), entry.texture.clone()));
                return Ok(PooledTexture {
                    texture: entry.texture,
                    initial_state: entry.last_state,
                });
            }
        }

        let texture = backend.create_texture(&RhiTextureInfo {
            dimension: TextureDimension::D2,
            format: desc.format,
            extent: Extent3d::new(desc.extent.width, desc.extent.height, 1),
            mip_levels: desc.mip_levels.max(1),
            array_layers: 1,
            usage: desc.usage,
            memory: MemoryUsage::GpuOnly,
            name,
        })?;
        self.active.push((desc.clone(), texture.clone()));
        Ok(PooledTexture {
            texture,
            initial_state: ResourceState::Undefined,
        })
    }

    /// Return every active texture to the free pool.
    ///
    /// `final_states` maps a texture's position in allocation order to the
    /// state the executor left it in; unlisted textures default to
    /// `Common`.
    pub fn reset(&mut self, final_states: &FxHashMap<usize, ResourceState>) {
        for (index, (desc, texture)) in self.active.drain(..).enumerate() {
            let last_state = final_states
                .get(&index)
                .copied()
                .unwrap_or(ResourceState::Common);
            self.free.entry(desc).or_default().push(FreeEntry {
                texture,
                last_state,
                idle_frames: 0,
            });
        }
    }

    /// Release textures idle for more than `max_idle_frames`.
    pub fn trim(&mut self, max_idle_frames: u32) {
        for bucket in self.free.values_mut() {
            for entry in bucket.iter_mut() {
                entry.idle_frames += 1;
            }
            bucket.retain(|entry| entry.idle_frames <= max_idle_frames);
        }
        self.free.retain(|_, bucket| !bucket.is_empty());
    }

    /// Total textures managed (active and free).
    #[must_use]
    pub fn total_texture_count(&self) -> usize {
        self.active.len() + self.free.values().map(Vec::len).sum::<usize>()
    }
}

impl Default for TransientTexturePool {
    fn default() -> Self {
        Self::new()
    }
}
