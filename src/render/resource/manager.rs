//! Render Resource Manager
//!
//! Owns process-wide GPU resources not tied to any single pass:
//!
//! - per-frame uniform buffers (camera, lights, object table),
//! - the shared material buffer and global-setting buffer,
//! - fallback textures (white, black, flat normal),
//! - the shader cache, and
//! - the id allocators backing bindless-style material / object /
//!   texture ids.
//!
//! All uniform buffers are persistently mapped; `set_*_info` calls are
//! write-through stores into the mapped region at the computed offset
//! and never submit GPU work themselves.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::assets::AssetRoots;
use crate::errors::{EmberError, Result};
use crate::rhi::types::{
    BufferCreation, BufferUsage, MemoryUsage, RhiBufferInfo, RhiShaderInfo, ShaderFrequency,
};
use crate::rhi::{
    MappedRegion, RhiBackend, RhiBackendRef, RhiBuffer, RhiBufferRef, RhiShaderRef,
};

use super::super::{
    DIRECTIONAL_SHADOW_CASCADE_LEVEL, FRAMES_IN_FLIGHT, MAX_PER_FRAME_OBJECT_SIZE,
    MAX_PER_FRAME_RESOURCE_SIZE, MAX_POINT_LIGHT_COUNT, POINT_LIGHT_OFFSET,
};
use super::allocator::IndexAllocator;
use super::texture::Texture;
use super::uniforms::{
    CameraGpu, DirectionalLightGpu, GlobalSettingGpu, MaterialGpu, ObjectGpu, PointLightGpu,
};

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// A uniform buffer together with its persistent mapping.
pub struct MappedBuffer {
    pub buffer: RhiBufferRef,
    pub region: MappedRegion,
}

fn create_mapped_buffer(
    backend: &RhiBackendRef,
    size: u64,
    usage: BufferUsage,
    name: &'static str,
) -> Result<MappedBuffer> {
    let buffer = backend.create_buffer(&RhiBufferInfo {
        size,
        stride: 0,
        usage,
        memory: MemoryUsage::CpuToGpu,
        creation: BufferCreation::PERSISTENT_MAP,
        name,
    })?;
    let region = buffer.map().ok_or(EmberError::ResourceCreationFailed {
        what: "buffer",
        detail: format!("persistent map unavailable for '{name}'"),
    })?;
    Ok(MappedBuffer { buffer, region })
}

struct PerFrameResource {
    camera: MappedBuffer,
    object: MappedBuffer,
    light: MappedBuffer,
}

type ShaderCacheKey = (String, ShaderFrequency, String);

// ─── The manager ──────────────────────────────────────────────────────────────

pub struct RenderResourceManager {
    backend: RhiBackendRef,
    assets: AssetRoots,

    per_frame: Vec<PerFrameResource>,
    material_buffer: MappedBuffer,
    global_setting: MappedBuffer,

    material_ids: Arc<IndexAllocator>,
    object_ids: Arc<IndexAllocator>,
    texture_ids: Arc<IndexAllocator>,

    shader_cache: Mutex<FxHashMap<ShaderCacheKey, RhiShaderRef>>,

    fallback_white: RwLock<Option<Arc<Texture>>>,
    fallback_black: RwLock<Option<Arc<Texture>>>,
    fallback_normal: RwLock<Option<Arc<Texture>>>,

    /// Frame slot the driver is currently recording; selects the
    /// per-frame buffer set written by `set_*_info`.
    frame_slot: AtomicUsize,
}

impl RenderResourceManager {
    pub fn new(backend: RhiBackendRef, assets: AssetRoots) -> Result<Self> {
        log::info!("initializing render resource manager");

        let light_region = POINT_LIGHT_OFFSET
            + u64::from(MAX_POINT_LIGHT_COUNT)
                * std::mem::size_of::<PointLightGpu>() as u64;

        let mut per_frame = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            per_frame.push(PerFrameResource {
                camera: create_mapped_buffer(
                    &backend,
                    std::mem::size_of::<CameraGpu>() as u64,
                    BufferUsage::UNIFORM,
                    "PerFrame Camera",
                )?,
                object: create_mapped_buffer(
                    &backend,
                    u64::from(MAX_PER_FRAME_OBJECT_SIZE)
                        * std::mem::size_of::<ObjectGpu>() as u64,
                    BufferUsage::UNIFORM | BufferUsage::STORAGE,
                    "PerFrame Objects",
                )?,
                light: create_mapped_buffer(
                    &backend,
                    light_region,
                    BufferUsage::UNIFORM,
                    "PerFrame Lights",
                )?,
            });
        }

        let material_buffer = create_mapped_buffer(
            &backend,
            u64::from(MAX_PER_FRAME_RESOURCE_SIZE) * std::mem::size_of::<MaterialGpu>() as u64,
            BufferUsage::UNIFORM | BufferUsage::STORAGE,
            "Material Table",
        )?;
        let global_setting = create_mapped_buffer(
            &backend,
            std::mem::size_of::<GlobalSettingGpu>() as u64,
            BufferUsage::UNIFORM,
            "Global Setting",
        )?;

        Ok(Self {
            backend,
            assets,
            per_frame,
            material_buffer,
            global_setting,
            material_ids: IndexAllocator::new("material", MAX_PER_FRAME_RESOURCE_SIZE),
            object_ids: IndexAllocator::new("object", MAX_PER_FRAME_OBJECT_SIZE),
            texture_ids: IndexAllocator::new("texture", MAX_PER_FRAME_RESOURCE_SIZE),
            shader_cache: Mutex::new(FxHashMap::default()),
            fallback_white: RwLock::new(None),
            fallback_black: RwLock::new(None),
            fallback_normal: RwLock::new(None),
            frame_slot: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn backend(&self) -> &RhiBackendRef {
        &self.backend
    }

    #[must_use]
    pub fn assets(&self) -> &AssetRoots {
        &self.assets
    }

    // ── Frame slots ────────────────────────────────────────────────────────

    /// Select the per-frame slot subsequent writes target. The driver
    /// calls this once per tick after its fence wait.
    pub fn set_frame_slot(&self, slot: usize) {
        self.frame_slot
            .store(slot % FRAMES_IN_FLIGHT, Ordering::Release);
    }

    #[must_use]
    pub fn frame_slot(&self) -> usize {
        self.frame_slot.load(Ordering::Acquire)
    }

    fn current_frame(&self) -> &PerFrameResource {
        &self.per_frame[self.frame_slot()]
    }

    // ── Id allocation ──────────────────────────────────────────────────────

    #[must_use]
    pub fn allocate_material_id(&self) -> u32 {
        self.material_ids.allocate()
    }

    pub fn release_material_id(&self, id: u32) {
        self.material_ids.release(id);
    }

    #[must_use]
    pub fn allocate_object_id(&self) -> u32 {
        self.object_ids.allocate()
    }

    pub fn release_object_id(&self, id: u32) {
        self.object_ids.release(id);
    }

    #[must_use]
    pub fn material_id_allocator(&self) -> &Arc<IndexAllocator> {
        &self.material_ids
    }

    #[must_use]
    pub fn object_id_allocator(&self) -> &Arc<IndexAllocator> {
        &self.object_ids
    }

    #[must_use]
    pub fn texture_id_allocator(&self) -> &Arc<IndexAllocator> {
        &self.texture_ids
    }

    // ── Write-through uniform updates ──────────────────────────────────────

    pub fn set_camera_info(&self, info: &CameraGpu) {
        self.current_frame().camera.region.write(0, info);
    }

    pub fn set_object_info(&self, info: &ObjectGpu, object_id: u32) {
        if object_id >= MAX_PER_FRAME_OBJECT_SIZE {
            log::error!("object id {object_id} out of range");
            return;
        }
        let offset = u64::from(object_id) * std::mem::size_of::<ObjectGpu>() as u64;
        self.current_frame().object.region.write(offset, info);
    }

    pub fn set_material_info(&self, info: &MaterialGpu, material_id: u32) {
        if material_id >= MAX_PER_FRAME_RESOURCE_SIZE {
            log::error!("material id {material_id} out of range");
            return;
        }
        let offset = u64::from(material_id) * std::mem::size_of::<MaterialGpu>() as u64;
        self.material_buffer.region.write(offset, info);
    }

    pub fn set_directional_light_info(&self, info: &DirectionalLightGpu, cascade: u32) {
        if cascade >= DIRECTIONAL_SHADOW_CASCADE_LEVEL {
            log::error!("cascade {cascade} out of range");
            return;
        }
        let offset = u64::from(cascade) * std::mem::size_of::<DirectionalLightGpu>() as u64;
        self.current_frame().light.region.write(offset, info);
    }

    pub fn set_point_light_info(&self, info: &PointLightGpu, light_id: u32) {
        if light_id >= MAX_POINT_LIGHT_COUNT {
            log::error!("point light id {light_id} out of range");
            return;
        }
        let offset =
            POINT_LIGHT_OFFSET + u64::from(light_id) * std::mem::size_of::<PointLightGpu>() as u64;
        self.current_frame().light.region.write(offset, info);
    }

    pub fn set_global_setting(&self, setting: &GlobalSettingGpu) {
        self.global_setting.region.write(0, setting);
    }

    // ── Buffer access for passes ───────────────────────────────────────────

    #[must_use]
    pub fn per_frame_camera_buffer(&self) -> RhiBufferRef {
        self.current_frame().camera.buffer.clone()
    }

    #[must_use]
    pub fn per_frame_object_buffer(&self) -> RhiBufferRef {
        self.current_frame().object.buffer.clone()
    }

    #[must_use]
    pub fn per_frame_light_buffer(&self) -> RhiBufferRef {
        self.current_frame().light.buffer.clone()
    }

    #[must_use]
    pub fn material_buffer(&self) -> RhiBufferRef {
        self.material_buffer.buffer.clone()
    }

    #[must_use]
    pub fn global_setting_buffer(&self) -> RhiBufferRef {
        self.global_setting.buffer.clone()
    }

    /// Test/debug access to a specific frame slot's object bytes.
    #[must_use]
    pub fn object_region_for_slot(&self, slot: usize) -> &MappedRegion {
        &self.per_frame[slot % FRAMES_IN_FLIGHT].object.region
    }

    // ── Shader cache ───────────────────────────────────────────────────────

    /// Content-addressed shader lookup keyed by `(path, frequency,
    /// entry)`; loads WGSL through the asset roots on a miss.
    pub fn get_or_create_shader(
        &self,
        path: &str,
        frequency: ShaderFrequency,
        entry: &str,
    ) -> Result<RhiShaderRef> {
        let key = (path.to_string(), frequency, entry.to_string());
        if let Some(shader) = self.shader_cache.lock().get(&key) {
            return Ok(shader.clone());
        }

        let code = self.assets.load_bytes(path)?;
        let shader = self.backend.create_shader(&RhiShaderInfo {
            frequency,
            entry: entry.to_string(),
            code,
            name: path.to_string(),
        })?;
        log::info!("shader loaded and cached: {path} ({entry})");
        self.shader_cache.lock().insert(key, shader.clone());
        Ok(shader)
    }

    // ── Fallback textures ──────────────────────────────────────────────────

    fn fallback(
        &self,
        cell: &RwLock<Option<Arc<Texture>>>,
        pixel: u32,
        name: &'static str,
    ) -> Arc<Texture> {
        if let Some(texture) = cell.read().as_ref() {
            return texture.clone();
        }
        let mut slot = cell.write();
        if let Some(texture) = slot.as_ref() {
            return texture.clone();
        }
        let texture = Arc::new(Texture::from_pixel(self, pixel, name));
        *slot = Some(texture.clone());
        texture
    }

    /// 1×1 opaque white (`0xFFFF_FFFF`).
    #[must_use]
    pub fn fallback_white_texture(&self) -> Arc<Texture> {
        self.fallback(&self.fallback_white, 0xFFFF_FFFF, "Default_White")
    }

    /// 1×1 opaque black (`0xFF00_0000`).
    #[must_use]
    pub fn fallback_black_texture(&self) -> Arc<Texture> {
        self.fallback(&self.fallback_black, 0xFF00_0000, "Default_Black")
    }

    /// 1×1 +Z tangent-space normal (`0xFFFF_8080`).
    #[must_use]
    pub fn fallback_normal_texture(&self) -> Arc<Texture> {
        self.fallback(&self.fallback_normal, 0xFFFF_8080, "Default_Normal")
    }
}
