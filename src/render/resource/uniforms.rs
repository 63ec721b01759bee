//! GPU Uniform Layouts
//!
//! `#[repr(C)]` plain-old-data mirrors of the shader-side constant
//! blocks. Field order and the fixed array sizes (8 ints, 8 floats,
//! 8 colors; 8/4/4 texture slots) match the GPU structs exactly and must
//! not change without updating the WGSL side.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use super::super::DIRECTIONAL_SHADOW_CASCADE_LEVEL;

/// Per-frame camera block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraGpu {
    pub view: Mat4,
    pub projection: Mat4,
    /// xyz = world position, w unused.
    pub position: Vec4,
}

/// Per-object entry in the object buffer, indexed by object id.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectGpu {
    pub model: Mat4,
    pub inv_model: Mat4,
}

impl Default for ObjectGpu {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            inv_model: Mat4::IDENTITY,
        }
    }
}

/// One directional-light cascade slot in the light buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DirectionalLightGpu {
    /// rgb = color, w = intensity.
    pub color: Vec4,
    /// xyz = travel direction, w = enabled (0/1).
    pub direction: Vec4,
    pub cascade: Mat4,
    /// x = shadow bias, y = normal bias, z = cascade split lambda,
    /// w = cast shadow (0/1).
    pub params: Vec4,
}

/// One point light in the light buffer, after the cascade slots.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightGpu {
    /// xyz = world position, w = range.
    pub position: Vec4,
    /// rgb = color, w = intensity.
    pub color: Vec4,
    /// x = shadow slot (or -1), y = bounding sphere radius.
    pub params: Vec4,
}

/// Per-material entry in the material buffer, indexed by material id.
///
/// Layout mirrors the fixed-size parameter arrays of the material
/// system; texture fields hold bindless texture ids (0 = unset).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialGpu {
    pub diffuse: Vec4,
    pub emission: Vec4,
    /// x = roughness, y = metallic, z = alpha clip, w = specular.
    pub surface: Vec4,
    pub ints: [i32; 8],
    pub floats: [f32; 8],
    pub colors: [Vec4; 8],
    pub texture_2d: [u32; 8],
    pub texture_cube: [u32; 4],
    pub texture_3d: [u32; 4],
    pub texture_diffuse: u32,
    pub texture_normal: u32,
    pub texture_arm: u32,
    pub texture_specular: u32,
}

impl Default for MaterialGpu {
    fn default() -> Self {
        Self {
            diffuse: Vec4::ONE,
            emission: Vec4::ZERO,
            surface: Vec4::new(0.5, 0.0, 0.0, 0.5),
            ints: [0; 8],
            floats: [0.0; 8],
            colors: [Vec4::ZERO; 8],
            texture_2d: [0; 8],
            texture_cube: [0; 4],
            texture_3d: [0; 4],
            texture_diffuse: 0,
            texture_normal: 0,
            texture_arm: 0,
            texture_specular: 0,
        }
    }
}

/// Global render settings block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GlobalSettingGpu {
    /// x = width, y = height, z = 1/width, w = 1/height.
    pub viewport: Vec4,
    /// x = elapsed seconds, y = frame index.
    pub time: Vec4,
}

/// Size in bytes of the directional-light region of the light buffer.
pub const DIRECTIONAL_LIGHT_REGION: u64 =
    DIRECTIONAL_SHADOW_CASCADE_LEVEL as u64 * std::mem::size_of::<DirectionalLightGpu>() as u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_blocks_are_16_byte_aligned_sizes() {
        assert_eq!(std::mem::size_of::<CameraGpu>() % 16, 0);
        assert_eq!(std::mem::size_of::<ObjectGpu>() % 16, 0);
        assert_eq!(std::mem::size_of::<DirectionalLightGpu>() % 16, 0);
        assert_eq!(std::mem::size_of::<PointLightGpu>() % 16, 0);
        assert_eq!(std::mem::size_of::<MaterialGpu>() % 16, 0);
    }
}
