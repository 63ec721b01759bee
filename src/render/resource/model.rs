//! Model Resource & Importer
//!
//! A model is an ordered collection of (mesh, material) slots. Import
//! currently covers OBJ + MTL via `tobj`; MTL files may carry the NPR
//! extension keys the engine's toon materials consume:
//!
//! ```text
//! MaterialType NPR
//! LambertClamp 0.5
//! RampOffset 0.0
//! RimThreshold 0.1
//! RimStrength 1.0
//! RimWidth 0.5
//! RimColor 1 1 1
//! ```

use std::path::Path;
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::errors::{EmberError, Result};
use crate::render::scene::DrawBatch;
use crate::rhi::types::RhiFormat;

use super::manager::RenderResourceManager;
use super::material::{Material, MaterialKind, MaterialRef, NprMaterial, PbrMaterial};
use super::mesh::Mesh;
use super::texture::Texture;

// ─── Import settings ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum MaterialImportType {
    #[default]
    Pbr,
    Npr,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ModelProcessSetting {
    /// Compute area-weighted normals when the source has none.
    pub smooth_normals: bool,
    pub flip_uv: bool,
    pub generate_tangents: bool,
    pub load_materials: bool,
    pub material_type: MaterialImportType,
}

impl Default for ModelProcessSetting {
    fn default() -> Self {
        Self {
            smooth_normals: true,
            flip_uv: false,
            generate_tangents: true,
            load_materials: true,
            material_type: MaterialImportType::Pbr,
        }
    }
}

// ─── Model ────────────────────────────────────────────────────────────────────

pub struct ModelSlot {
    pub mesh: Arc<Mesh>,
    pub material: Option<MaterialRef>,
}

pub struct Model {
    pub name: String,
    slots: Vec<ModelSlot>,
}

impl Model {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
        }
    }

    pub fn push_slot(&mut self, mesh: Arc<Mesh>, material: Option<MaterialRef>) {
        self.slots.push(ModelSlot { mesh, material });
    }

    #[must_use]
    pub fn submesh_count(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&ModelSlot> {
        self.slots.get(index)
    }

    #[must_use]
    pub fn slots(&self) -> &[ModelSlot] {
        &self.slots
    }

    /// Build one draw batch per slot for an instance at `model_matrix`.
    #[must_use]
    pub fn make_batches(&self, object_id: u32, model_matrix: Mat4) -> Vec<DrawBatch> {
        let inv_model_matrix = model_matrix.inverse();
        self.slots
            .iter()
            .filter_map(|slot| {
                let gpu = slot.mesh.gpu()?;
                Some(DrawBatch {
                    object_id,
                    vertex_buffer: Some(gpu.position_buffer.clone()),
                    normal_buffer: gpu.normal_buffer.clone(),
                    tangent_buffer: gpu.tangent_buffer.clone(),
                    texcoord_buffer: gpu.texcoord_buffer.clone(),
                    index_buffer: Some(gpu.index_buffer.clone()),
                    index_count: slot.mesh.index_count() as u32,
                    index_offset: 0,
                    model_matrix,
                    inv_model_matrix,
                    material: slot.material.clone(),
                    cast_shadow: slot
                        .material
                        .as_ref()
                        .is_none_or(|m| m.read().common.cast_shadow),
                })
            })
            .collect()
    }

    // ── Import ─────────────────────────────────────────────────────────────

    /// Import an OBJ (and companion MTL) from disk, upload the geometry,
    /// and build materials when requested.
    pub fn load_obj(
        manager: &RenderResourceManager,
        path: impl AsRef<Path>,
        setting: &ModelProcessSetting,
    ) -> Result<Self> {
        let path = path.as_ref();
        let (models, materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )
        .map_err(|e| EmberError::ModelImportError {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;

        let obj_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let materials = materials.unwrap_or_default();
        let imported_materials: Vec<Option<MaterialRef>> = if setting.load_materials {
            materials
                .iter()
                .map(|mtl| Some(import_mtl(manager, obj_dir, mtl, setting)))
                .collect()
        } else {
            vec![None; materials.len()]
        };

        let name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let mut model = Model::new(name);

        for obj_mesh in models {
            let mut mesh = Mesh::new(obj_mesh.name.clone());
            mesh.positions = obj_mesh
                .mesh
                .positions
                .chunks_exact(3)
                .map(|p| Vec3::new(p[0], p[1], p[2]))
                .collect();
            mesh.normals = obj_mesh
                .mesh
                .normals
                .chunks_exact(3)
                .map(|n| Vec3::new(n[0], n[1], n[2]))
                .collect();
            mesh.texcoords = obj_mesh
                .mesh
                .texcoords
                .chunks_exact(2)
                .map(|uv| {
                    if setting.flip_uv {
                        Vec2::new(uv[0], 1.0 - uv[1])
                    } else {
                        Vec2::new(uv[0], uv[1])
                    }
                })
                .collect();
            mesh.indices = obj_mesh.mesh.indices.clone();

            if mesh.normals.is_empty() && setting.smooth_normals {
                mesh.compute_smooth_normals();
            }
            if setting.generate_tangents && !mesh.texcoords.is_empty() {
                mesh.compute_tangents();
            }
            mesh.compute_bounds();
            mesh.upload(manager.backend())?;

            let material = obj_mesh
                .mesh
                .material_id
                .and_then(|id| imported_materials.get(id).cloned())
                .flatten();
            model.push_slot(Arc::new(mesh), material);
        }

        log::info!(
            "model '{}' imported: {} submeshes",
            model.name,
            model.submesh_count()
        );
        Ok(model)
    }
}

// ─── MTL translation ──────────────────────────────────────────────────────────

fn parse_float(value: Option<&String>) -> Option<f32> {
    value.and_then(|v| v.trim().parse().ok())
}

fn parse_vec3(value: Option<&String>) -> Option<Vec3> {
    let value = value?;
    let mut parts = value.split_whitespace().filter_map(|p| p.parse::<f32>().ok());
    Some(Vec3::new(parts.next()?, parts.next()?, parts.next()?))
}

fn load_texture(
    manager: &RenderResourceManager,
    obj_dir: &Path,
    file: Option<&String>,
    srgb: bool,
) -> Option<Arc<Texture>> {
    let file = file?;
    if file.is_empty() {
        return None;
    }
    let format = if srgb {
        RhiFormat::Rgba8Srgb
    } else {
        RhiFormat::Rgba8Unorm
    };
    match Texture::from_file(manager, obj_dir.join(file), format) {
        Ok(texture) => Some(Arc::new(texture)),
        Err(e) => {
            log::warn!("texture '{file}' failed to load: {e}");
            None
        }
    }
}

/// Build an engine material from a tobj MTL entry. `MaterialType NPR` in
/// the MTL overrides the import setting.
fn import_mtl(
    manager: &RenderResourceManager,
    obj_dir: &Path,
    mtl: &tobj::Material,
    setting: &ModelProcessSetting,
) -> MaterialRef {
    let is_npr = mtl
        .unknown_param
        .get("MaterialType")
        .is_some_and(|v| v.eq_ignore_ascii_case("NPR"))
        || setting.material_type == MaterialImportType::Npr;

    let albedo = mtl
        .diffuse
        .map_or(Vec4::ONE, |kd| Vec4::new(kd[0], kd[1], kd[2], 1.0));
    let albedo_texture = load_texture(manager, obj_dir, mtl.diffuse_texture.as_ref(), true);
    let normal_texture = load_texture(manager, obj_dir, mtl.normal_texture.as_ref(), false);

    let material = if is_npr {
        let params = &mtl.unknown_param;
        let npr = NprMaterial {
            albedo,
            lambert_clamp: parse_float(params.get("LambertClamp")).unwrap_or(0.5),
            ramp_offset: parse_float(params.get("RampOffset")).unwrap_or(0.0),
            rim_threshold: parse_float(params.get("RimThreshold")).unwrap_or(0.1),
            rim_strength: parse_float(params.get("RimStrength")).unwrap_or(1.0),
            rim_width: parse_float(params.get("RimWidth")).unwrap_or(0.5),
            rim_color: parse_vec3(params.get("RimColor")).unwrap_or(Vec3::ONE),
            face_mode: params
                .get("FaceMode")
                .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
            albedo_texture,
            normal_texture,
            light_map_texture: load_texture(manager, obj_dir, params.get("LightMap"), false),
            ramp_texture: load_texture(manager, obj_dir, params.get("RampMap"), false),
            ..NprMaterial::default()
        };
        let material = Material::new_npr(manager, mtl.name.clone());
        {
            let mut guard = material.write();
            guard.kind = MaterialKind::Npr(npr);
            guard.update(manager);
        }
        material
    } else {
        // Map Phong-ish MTL fields onto the metallic-roughness model:
        // shininess drives roughness, dissolve drives alpha.
        let roughness = mtl
            .shininess
            .map_or(0.5, |s| (1.0 - (s / 1000.0).clamp(0.0, 1.0)).max(0.04));
        let pbr = PbrMaterial {
            albedo,
            roughness,
            metallic: 0.0,
            specular: 0.5,
            albedo_texture,
            normal_texture,
            ..PbrMaterial::default()
        };
        let material = Material::new_pbr(manager, mtl.name.clone());
        {
            let mut guard = material.write();
            guard.kind = MaterialKind::Pbr(pbr);
            guard.update(manager);
        }
        material
    };
    material
}
