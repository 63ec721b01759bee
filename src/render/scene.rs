//! Scene-Side Contracts
//!
//! What the renderer consumes from the external scene/ECS layer: draw
//! batches, camera and light descriptions, and the [`RenderScene`] trait
//! the driver queries each frame. No scene storage lives here.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::DIRECTIONAL_SHADOW_CASCADE_LEVEL;
use crate::render::resource::material::MaterialRef;
use crate::rhi::RhiBufferRef;

// ─── Draw batches ─────────────────────────────────────────────────────────────

/// One drawable chunk of geometry with its transform and material.
#[derive(Clone)]
pub struct DrawBatch {
    pub object_id: u32,
    /// Position stream (stream 0). Required.
    pub vertex_buffer: Option<RhiBufferRef>,
    /// Normal stream (stream 1).
    pub normal_buffer: Option<RhiBufferRef>,
    /// Tangent stream (stream 3).
    pub tangent_buffer: Option<RhiBufferRef>,
    /// Texcoord stream (stream 2).
    pub texcoord_buffer: Option<RhiBufferRef>,
    pub index_buffer: Option<RhiBufferRef>,
    pub index_count: u32,
    pub index_offset: u32,
    pub model_matrix: Mat4,
    pub inv_model_matrix: Mat4,
    pub material: Option<MaterialRef>,
    pub cast_shadow: bool,
}

impl Default for DrawBatch {
    fn default() -> Self {
        Self {
            object_id: 0,
            vertex_buffer: None,
            normal_buffer: None,
            tangent_buffer: None,
            texcoord_buffer: None,
            index_buffer: None,
            index_count: 0,
            index_offset: 0,
            model_matrix: Mat4::IDENTITY,
            inv_model_matrix: Mat4::IDENTITY,
            material: None,
            cast_shadow: true,
        }
    }
}

// ─── Camera ───────────────────────────────────────────────────────────────────

/// Active camera state for one frame.
///
/// Left-handed: the view maps world to camera space with the camera
/// facing +Z, and the projection places clip-space z in `[0, 1]`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CameraInfo {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub near_plane: f32,
    pub far_plane: f32,
    pub fov_y_degrees: f32,
    pub aspect: f32,
}

impl CameraInfo {
    /// Build a camera at `position` looking at `target`.
    #[must_use]
    pub fn look_at(
        position: Vec3,
        target: Vec3,
        fov_y_degrees: f32,
        aspect: f32,
        near_plane: f32,
        far_plane: f32,
    ) -> Self {
        let view = Mat4::look_at_lh(position, target, Vec3::Y);
        let projection = Mat4::perspective_lh(
            fov_y_degrees.to_radians(),
            aspect,
            near_plane,
            far_plane,
        );
        Self {
            position,
            view,
            projection,
            near_plane,
            far_plane,
            fov_y_degrees,
            aspect,
        }
    }

    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self::look_at(
            Vec3::new(0.0, 0.0, -3.0),
            Vec3::ZERO,
            60.0,
            16.0 / 9.0,
            0.1,
            1000.0,
        )
    }
}

// ─── Lights ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DirectionalLightInfo {
    pub color: Vec3,
    pub intensity: f32,
    /// World-space travel direction of the light.
    pub direction: Vec3,
    pub cascades: [Mat4; DIRECTIONAL_SHADOW_CASCADE_LEVEL as usize],
    pub shadow_bias: f32,
    pub normal_bias: f32,
    /// Consumed by the shader's split-distance computation; stored and
    /// forwarded untouched on the CPU side.
    pub cascade_split_lambda: f32,
    pub enabled: bool,
    pub cast_shadow: bool,
}

impl Default for DirectionalLightInfo {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            direction: Vec3::new(0.0, -1.0, 0.0),
            cascades: [Mat4::IDENTITY; DIRECTIONAL_SHADOW_CASCADE_LEVEL as usize],
            shadow_bias: 0.005,
            normal_bias: 0.4,
            cascade_split_lambda: 0.95,
            enabled: true,
            cast_shadow: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PointLightInfo {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    /// Shadow map slot assigned by the light manager, when this light
    /// casts shadows.
    pub shadow_index: Option<u32>,
    pub sphere_center: Vec3,
    pub sphere_radius: f32,
    pub enabled: bool,
    pub cast_shadow: bool,
}

impl Default for PointLightInfo {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            shadow_index: None,
            sphere_center: Vec3::ZERO,
            sphere_radius: 10.0,
            enabled: true,
            cast_shadow: false,
        }
    }
}

// ─── The scene contract ───────────────────────────────────────────────────────

/// What the driver reads from the active scene each frame.
pub trait RenderScene {
    fn camera(&self) -> Option<CameraInfo>;

    fn directional_light(&self) -> Option<DirectionalLightInfo> {
        None
    }

    fn point_lights(&self) -> Vec<PointLightInfo> {
        Vec::new()
    }

    /// The active skybox material, if any. Must be a
    /// [`MaterialKind::Skybox`](crate::render::resource::material::MaterialKind)
    /// material.
    fn skybox(&self) -> Option<MaterialRef> {
        None
    }

    fn collect_draw_batches(&self, batches: &mut Vec<DrawBatch>);
}

/// Per-frame input to [`RenderSystem::tick`](crate::render::system::RenderSystem::tick).
#[derive(Default)]
pub struct RenderPacket<'a> {
    pub scene: Option<&'a dyn RenderScene>,
}
