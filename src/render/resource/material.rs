//! Material System
//!
//! A material is a shader + parameter + texture bundle driving one draw
//! call's fragment behavior, polymorphic over {PBR, NPR, Skybox,
//! generic}. Construction allocates a material id from the resource
//! manager; dropping the material releases it. `update` packs the
//! current parameters and texture ids into a [`MaterialGpu`] and writes
//! it through the material table.
//!
//! Parameter and texture arrays have fixed sizes (8 ints, 8 floats,
//! 8 colors; 8 2D / 4 cube / 4 3D texture slots; 3 shader slots) so the
//! renderer can reference them by index from GPU-side material structs.

use std::sync::Arc;

use glam::{Vec3, Vec4};
use parking_lot::RwLock;

use crate::rhi::RhiShaderRef;
use crate::rhi::types::{CompareFunction, CullMode, FillMode};

use super::manager::RenderResourceManager;
use super::allocator::AllocatedId;
use super::texture::TextureRef;
use super::uniforms::MaterialGpu;

// ─── Pipeline-state hints ─────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Which pass families consume a material.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct RenderPassMask: u32 {
        const FORWARD     = 1 << 0;
        const DEFERRED    = 1 << 1;
        const TRANSPARENT = 1 << 2;
    }
}

/// Fixed array sizes shared with the GPU-side material struct.
pub const MATERIAL_TEXTURE_2D_SLOTS: usize = 8;
pub const MATERIAL_TEXTURE_CUBE_SLOTS: usize = 4;
pub const MATERIAL_TEXTURE_3D_SLOTS: usize = 4;
/// Vertex, geometry, fragment.
pub const MATERIAL_SHADER_SLOTS: usize = 3;

/// Attributes common to every material variant.
pub struct MaterialCommon {
    pub name: String,
    id: AllocatedId,

    /// Lower renders first.
    pub render_queue: u32,
    pub pass_mask: RenderPassMask,
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub cast_shadow: bool,
    pub use_for_depth_pass: bool,

    pub ints: [i32; 8],
    pub floats: [f32; 8],
    pub colors: [Vec4; 8],

    pub texture_2d: [Option<TextureRef>; MATERIAL_TEXTURE_2D_SLOTS],
    pub texture_cube: [Option<TextureRef>; MATERIAL_TEXTURE_CUBE_SLOTS],
    pub texture_3d: [Option<TextureRef>; MATERIAL_TEXTURE_3D_SLOTS],
    pub shaders: [Option<RhiShaderRef>; MATERIAL_SHADER_SLOTS],
}

impl MaterialCommon {
    fn new(manager: &RenderResourceManager, name: String) -> Self {
        let id = AllocatedId::acquire(manager.material_id_allocator());
        if !id.is_valid() {
            log::error!("material '{name}': id space exhausted");
        }
        Self {
            name,
            id,
            render_queue: 1000,
            pass_mask: RenderPassMask::DEFERRED,
            cull_mode: CullMode::Back,
            fill_mode: FillMode::Solid,
            depth_test: true,
            depth_write: true,
            depth_compare: CompareFunction::LessEqual,
            cast_shadow: true,
            use_for_depth_pass: true,
            ints: [0; 8],
            floats: [0.0; 8],
            colors: [Vec4::ZERO; 8],
            texture_2d: Default::default(),
            texture_cube: Default::default(),
            texture_3d: Default::default(),
            shaders: Default::default(),
        }
    }
}

// ─── Variants ─────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct PbrMaterial {
    pub albedo: Vec4,
    pub emission: Vec4,
    pub roughness: f32,
    pub metallic: f32,
    pub alpha_clip: f32,
    pub specular: f32,

    pub albedo_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
    /// AO / roughness / metallic packed; preferred over the split maps.
    pub arm_texture: Option<TextureRef>,
    pub roughness_texture: Option<TextureRef>,
    pub metallic_texture: Option<TextureRef>,
    pub ao_texture: Option<TextureRef>,
    pub emission_texture: Option<TextureRef>,
}

#[derive(Clone)]
pub struct NprMaterial {
    pub albedo: Vec4,
    pub emission: Vec4,
    pub lambert_clamp: f32,
    pub ramp_offset: f32,
    pub rim_threshold: f32,
    pub rim_strength: f32,
    pub rim_width: f32,
    pub rim_color: Vec3,
    pub face_mode: bool,

    pub albedo_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
    pub light_map_texture: Option<TextureRef>,
    pub ramp_texture: Option<TextureRef>,
}

impl Default for NprMaterial {
    fn default() -> Self {
        Self {
            albedo: Vec4::ONE,
            emission: Vec4::ZERO,
            lambert_clamp: 0.5,
            ramp_offset: 0.0,
            rim_threshold: 0.1,
            rim_strength: 1.0,
            rim_width: 0.5,
            rim_color: Vec3::ONE,
            face_mode: false,
            albedo_texture: None,
            normal_texture: None,
            light_map_texture: None,
            ramp_texture: None,
        }
    }
}

pub struct SkyboxMaterial {
    /// Equirectangular 2D input.
    panorama: Option<TextureRef>,
    /// Derived at runtime; never serialized.
    cube: Option<TextureRef>,
    cube_dirty: bool,
    pub cube_resolution: u32,
    pub intensity: f32,
}

impl Default for SkyboxMaterial {
    fn default() -> Self {
        Self {
            panorama: None,
            cube: None,
            cube_dirty: true,
            cube_resolution: 512,
            intensity: 1.0,
        }
    }
}

impl SkyboxMaterial {
    #[must_use]
    pub fn panorama_texture(&self) -> Option<&TextureRef> {
        self.panorama.as_ref()
    }

    #[must_use]
    pub fn cube_texture(&self) -> Option<&TextureRef> {
        self.cube.as_ref()
    }

    #[must_use]
    pub fn is_cube_texture_dirty(&self) -> bool {
        self.cube_dirty
    }

    pub fn mark_cube_texture_dirty(&mut self) {
        self.cube_dirty = true;
    }

    pub(crate) fn store_cube(&mut self, cube: TextureRef) {
        self.cube = Some(cube);
        self.cube_dirty = false;
    }
}

pub enum MaterialKind {
    Generic,
    Pbr(PbrMaterial),
    Npr(NprMaterial),
    Skybox(SkyboxMaterial),
}

// ─── Material ─────────────────────────────────────────────────────────────────

pub struct Material {
    pub common: MaterialCommon,
    pub kind: MaterialKind,
    dirty: bool,
}

pub type MaterialRef = Arc<RwLock<Material>>;

impl Material {
    #[must_use]
    pub fn new(
        manager: &RenderResourceManager,
        name: impl Into<String>,
        kind: MaterialKind,
    ) -> Self {
        let mut common = MaterialCommon::new(manager, name.into());
        if let MaterialKind::Skybox(_) = &kind {
            // Skybox pipeline state is fixed: drawn last, inside faces
            // visible, depth tested at the far plane but never written.
            common.render_queue = 10_000;
            common.pass_mask = RenderPassMask::FORWARD;
            common.cull_mode = CullMode::None;
            common.depth_test = true;
            common.depth_write = false;
            common.depth_compare = CompareFunction::LessEqual;
            common.use_for_depth_pass = false;
            common.cast_shadow = false;
        }
        if let MaterialKind::Npr(_) | MaterialKind::Pbr(_) = &kind {
            common.pass_mask = RenderPassMask::DEFERRED;
        }
        Self {
            common,
            kind,
            dirty: true,
        }
    }

    #[must_use]
    pub fn new_pbr(manager: &RenderResourceManager, name: impl Into<String>) -> MaterialRef {
        Arc::new(RwLock::new(Self::new(
            manager,
            name,
            MaterialKind::Pbr(PbrMaterial::default()),
        )))
    }

    #[must_use]
    pub fn new_npr(manager: &RenderResourceManager, name: impl Into<String>) -> MaterialRef {
        let mut material = Self::new(manager, name, MaterialKind::Npr(NprMaterial::default()));
        // Toon shading runs in the forward path.
        material.common.pass_mask = RenderPassMask::FORWARD;
        Arc::new(RwLock::new(material))
    }

    #[must_use]
    pub fn new_skybox(manager: &RenderResourceManager, name: impl Into<String>) -> MaterialRef {
        Arc::new(RwLock::new(Self::new(
            manager,
            name,
            MaterialKind::Skybox(SkyboxMaterial::default()),
        )))
    }

    /// Stable id into the material table; 0 when allocation failed.
    #[must_use]
    pub fn material_id(&self) -> u32 {
        self.common.id.id()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    // ── Variant accessors ──────────────────────────────────────────────────

    #[must_use]
    pub fn as_pbr(&self) -> Option<&PbrMaterial> {
        match &self.kind {
            MaterialKind::Pbr(pbr) => Some(pbr),
            _ => None,
        }
    }

    pub fn as_pbr_mut(&mut self) -> Option<&mut PbrMaterial> {
        self.dirty = true;
        match &mut self.kind {
            MaterialKind::Pbr(pbr) => Some(pbr),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_npr(&self) -> Option<&NprMaterial> {
        match &self.kind {
            MaterialKind::Npr(npr) => Some(npr),
            _ => None,
        }
    }

    pub fn as_npr_mut(&mut self) -> Option<&mut NprMaterial> {
        self.dirty = true;
        match &mut self.kind {
            MaterialKind::Npr(npr) => Some(npr),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_skybox(&self) -> Option<&SkyboxMaterial> {
        match &self.kind {
            MaterialKind::Skybox(skybox) => Some(skybox),
            _ => None,
        }
    }

    pub fn as_skybox_mut(&mut self) -> Option<&mut SkyboxMaterial> {
        self.dirty = true;
        match &mut self.kind {
            MaterialKind::Skybox(skybox) => Some(skybox),
            _ => None,
        }
    }

    /// Set the skybox panorama; a change marks the derived cube texture
    /// dirty.
    pub fn set_panorama_texture(&mut self, texture: TextureRef) {
        if let MaterialKind::Skybox(skybox) = &mut self.kind {
            let changed = skybox
                .panorama
                .as_ref()
                .is_none_or(|current| !Arc::ptr_eq(current, &texture));
            if changed {
                skybox.panorama = Some(texture);
                skybox.cube_dirty = true;
                self.dirty = true;
            }
        } else {
            log::error!(
                "material '{}': panorama set on a non-skybox material",
                self.common.name
            );
        }
    }

    // ── Generic parameter slots ────────────────────────────────────────────

    pub fn set_int(&mut self, value: i32, index: usize) {
        if let Some(slot) = self.common.ints.get_mut(index) {
            *slot = value;
            self.dirty = true;
        }
    }

    pub fn set_float(&mut self, value: f32, index: usize) {
        if let Some(slot) = self.common.floats.get_mut(index) {
            *slot = value;
            self.dirty = true;
        }
    }

    pub fn set_color(&mut self, value: Vec4, index: usize) {
        if let Some(slot) = self.common.colors.get_mut(index) {
            *slot = value;
            self.dirty = true;
        }
    }

    pub fn set_texture_2d(&mut self, texture: TextureRef, index: usize) {
        if let Some(slot) = self.common.texture_2d.get_mut(index) {
            *slot = Some(texture);
            self.dirty = true;
        }
    }

    pub fn set_texture_cube(&mut self, texture: TextureRef, index: usize) {
        if let Some(slot) = self.common.texture_cube.get_mut(index) {
            *slot = Some(texture);
            self.dirty = true;
        }
    }

    // Shader slots: 0 = vertex, 1 = geometry, 2 = fragment.

    pub fn set_vertex_shader(&mut self, shader: RhiShaderRef) {
        self.common.shaders[0] = Some(shader);
    }

    pub fn set_geometry_shader(&mut self, shader: RhiShaderRef) {
        self.common.shaders[1] = Some(shader);
    }

    pub fn set_fragment_shader(&mut self, shader: RhiShaderRef) {
        self.common.shaders[2] = Some(shader);
    }

    #[must_use]
    pub fn vertex_shader(&self) -> Option<&RhiShaderRef> {
        self.common.shaders[0].as_ref()
    }

    #[must_use]
    pub fn fragment_shader(&self) -> Option<&RhiShaderRef> {
        self.common.shaders[2].as_ref()
    }

    // ── GPU sync ───────────────────────────────────────────────────────────

    /// Pack the current state into a [`MaterialGpu`] and write it into
    /// the material table. Clears the dirty flag.
    pub fn update(&mut self, manager: &RenderResourceManager) {
        let id = self.material_id();
        if id == 0 {
            return;
        }
        let info = self.pack();
        manager.set_material_info(&info, id);
        self.dirty = false;
    }

    fn pack(&self) -> MaterialGpu {
        let mut info = MaterialGpu {
            ints: self.common.ints,
            floats: self.common.floats,
            colors: self.common.colors,
            ..MaterialGpu::default()
        };
        for (slot, texture) in self.common.texture_2d.iter().enumerate() {
            if let Some(texture) = texture {
                info.texture_2d[slot] = texture.texture_id();
            }
        }
        for (slot, texture) in self.common.texture_cube.iter().enumerate() {
            if let Some(texture) = texture {
                info.texture_cube[slot] = texture.texture_id();
            }
        }
        for (slot, texture) in self.common.texture_3d.iter().enumerate() {
            if let Some(texture) = texture {
                info.texture_3d[slot] = texture.texture_id();
            }
        }
        match &self.kind {
            MaterialKind::Pbr(pbr) => {
                info.diffuse = pbr.albedo;
                info.emission = pbr.emission;
                info.surface = Vec4::new(pbr.roughness, pbr.metallic, pbr.alpha_clip, pbr.specular);
                info.texture_diffuse = texture_id(&pbr.albedo_texture);
                info.texture_normal = texture_id(&pbr.normal_texture);
                info.texture_arm = texture_id(&pbr.arm_texture);
            }
            MaterialKind::Npr(npr) => {
                info.diffuse = npr.albedo;
                info.emission = npr.emission;
                info.surface = Vec4::new(
                    npr.lambert_clamp,
                    npr.ramp_offset,
                    npr.rim_strength,
                    npr.rim_width,
                );
                info.texture_diffuse = texture_id(&npr.albedo_texture);
                info.texture_normal = texture_id(&npr.normal_texture);
            }
            MaterialKind::Skybox(skybox) => {
                info.surface.x = skybox.intensity;
                if let Some(cube) = &skybox.cube {
                    info.texture_cube[0] = cube.texture_id();
                }
            }
            MaterialKind::Generic => {}
        }
        info
    }

    /// Referenced textures, for transitive asset loading.
    pub fn collect_texture_deps(&self, out: &mut Vec<TextureRef>) {
        let mut push = |texture: &Option<TextureRef>| {
            if let Some(texture) = texture {
                out.push(texture.clone());
            }
        };
        for texture in &self.common.texture_2d {
            push(texture);
        }
        for texture in &self.common.texture_cube {
            push(texture);
        }
        for texture in &self.common.texture_3d {
            push(texture);
        }
        match &self.kind {
            MaterialKind::Pbr(pbr) => {
                push(&pbr.albedo_texture);
                push(&pbr.normal_texture);
                push(&pbr.arm_texture);
                push(&pbr.roughness_texture);
                push(&pbr.metallic_texture);
                push(&pbr.ao_texture);
                push(&pbr.emission_texture);
            }
            MaterialKind::Npr(npr) => {
                push(&npr.albedo_texture);
                push(&npr.normal_texture);
                push(&npr.light_map_texture);
                push(&npr.ramp_texture);
            }
            MaterialKind::Skybox(skybox) => {
                push(&skybox.panorama);
            }
            MaterialKind::Generic => {}
        }
    }
}

fn texture_id(texture: &Option<TextureRef>) -> u32 {
    texture.as_ref().map_or(0, |t| t.texture_id())
}
