//! Mesh Resource
//!
//! CPU-side geometry arrays with derived bounds, plus the GPU vertex and
//! index buffers created on upload. Streams are split per attribute so
//! passes bind only what they consume (depth pre-pass binds positions
//! only).

use glam::{Vec2, Vec3, Vec4};

use crate::errors::{EmberError, Result};
use crate::rhi::types::{BufferCreation, BufferUsage, MemoryUsage, RhiBufferInfo};
use crate::rhi::{RhiBackend, RhiBackendRef, RhiBuffer, RhiBufferRef};

/// Maximum bone influences per vertex.
pub const MAX_BONE_INFLUENCE: usize = 4;

#[derive(Clone, Debug, Default)]
pub struct BoneInfo {
    pub name: String,
    pub offset_matrix: glam::Mat4,
}

/// GPU buffers created by [`Mesh::upload`].
pub struct MeshGpu {
    pub position_buffer: RhiBufferRef,
    pub normal_buffer: Option<RhiBufferRef>,
    pub tangent_buffer: Option<RhiBufferRef>,
    pub texcoord_buffer: Option<RhiBufferRef>,
    pub index_buffer: RhiBufferRef,
}

#[derive(Default)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub texcoords: Vec<Vec2>,
    pub colors: Vec<Vec4>,
    pub bone_indices: Vec<[u32; MAX_BONE_INFLUENCE]>,
    pub bone_weights: Vec<[f32; MAX_BONE_INFLUENCE]>,
    pub indices: Vec<u32>,
    pub bones: Vec<BoneInfo>,

    bounds_min: Vec3,
    bounds_max: Vec3,
    sphere_center: Vec3,
    sphere_radius: f32,

    gpu: Option<MeshGpu>,
}

impl Mesh {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn bounds(&self) -> (Vec3, Vec3) {
        (self.bounds_min, self.bounds_max)
    }

    #[must_use]
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        (self.sphere_center, self.sphere_radius)
    }

    #[must_use]
    pub fn gpu(&self) -> Option<&MeshGpu> {
        self.gpu.as_ref()
    }

    // ── Geometry processing ────────────────────────────────────────────────

    /// Recompute the AABB and bounding sphere from positions.
    pub fn compute_bounds(&mut self) {
        if self.positions.is_empty() {
            self.bounds_min = Vec3::ZERO;
            self.bounds_max = Vec3::ZERO;
            self.sphere_center = Vec3::ZERO;
            self.sphere_radius = 0.0;
            return;
        }
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for p in &self.positions {
            min = min.min(*p);
            max = max.max(*p);
        }
        self.bounds_min = min;
        self.bounds_max = max;
        self.sphere_center = (min + max) * 0.5;
        self.sphere_radius = self
            .positions
            .iter()
            .map(|p| p.distance(self.sphere_center))
            .fold(0.0f32, f32::max);
    }

    /// Area-weighted smooth normals from triangle indices.
    pub fn compute_smooth_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let edge1 = self.positions[b] - self.positions[a];
            let edge2 = self.positions[c] - self.positions[a];
            let face_normal = edge1.cross(edge2);
            normals[a] += face_normal;
            normals[b] += face_normal;
            normals[c] += face_normal;
        }
        self.normals = normals
            .into_iter()
            .map(|n| n.normalize_or_zero())
            .collect();
    }

    /// Per-vertex tangents from texcoords; requires normals and UVs.
    pub fn compute_tangents(&mut self) {
        if self.texcoords.len() != self.positions.len()
            || self.normals.len() != self.positions.len()
        {
            return;
        }
        let mut tangents = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let edge1 = self.positions[b] - self.positions[a];
            let edge2 = self.positions[c] - self.positions[a];
            let duv1 = self.texcoords[b] - self.texcoords[a];
            let duv2 = self.texcoords[c] - self.texcoords[a];
            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() < 1e-8 {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
            tangents[a] += tangent;
            tangents[b] += tangent;
            tangents[c] += tangent;
        }
        self.tangents = tangents
            .iter()
            .zip(&self.normals)
            .map(|(t, n)| {
                // Gram-Schmidt orthogonalize against the normal.
                let t = (*t - *n * n.dot(*t)).normalize_or_zero();
                t.extend(1.0)
            })
            .collect();
    }

    /// Record one bone influence, keeping the four largest weights when
    /// more than four bones touch the vertex.
    pub fn add_bone_weight(&mut self, vertex: usize, bone_index: u32, weight: f32) {
        if self.bone_indices.len() != self.positions.len() {
            self.bone_indices = vec![[0; MAX_BONE_INFLUENCE]; self.positions.len()];
            self.bone_weights = vec![[0.0; MAX_BONE_INFLUENCE]; self.positions.len()];
        }
        let Some(weights) = self.bone_weights.get_mut(vertex) else {
            return;
        };
        let indices = &mut self.bone_indices[vertex];
        // Replace the smallest existing weight if this one is larger.
        let (slot, &smallest) = weights
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .unwrap_or((0, &0.0));
        if weight > smallest {
            weights[slot] = weight;
            indices[slot] = bone_index;
        }
    }

    /// Concatenate `other`'s geometry, rebasing indices, and recompute
    /// bounds.
    pub fn merge(&mut self, other: &Mesh) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.tangents.extend_from_slice(&other.tangents);
        self.texcoords.extend_from_slice(&other.texcoords);
        self.colors.extend_from_slice(&other.colors);
        self.bone_indices.extend_from_slice(&other.bone_indices);
        self.bone_weights.extend_from_slice(&other.bone_weights);
        self.indices
            .extend(other.indices.iter().map(|index| index + base));
        self.compute_bounds();
        // GPU buffers are stale after a merge.
        self.gpu = None;
    }

    // ── GPU upload ─────────────────────────────────────────────────────────

    /// Create the GPU vertex and index buffers.
    pub fn upload(&mut self, backend: &RhiBackendRef) -> Result<()> {
        if self.positions.is_empty() || self.indices.is_empty() {
            return Err(EmberError::ResourceCreationFailed {
                what: "mesh",
                detail: format!("mesh '{}' has no geometry to upload", self.name),
            });
        }
        let position_buffer =
            create_vertex_buffer(backend, bytemuck::cast_slice(&self.positions), "Mesh Positions")?;
        let normal_buffer = if self.normals.is_empty() {
            None
        } else {
            Some(create_vertex_buffer(
                backend,
                bytemuck::cast_slice(&self.normals),
                "Mesh Normals",
            )?)
        };
        let tangent_buffer = if self.tangents.is_empty() {
            None
        } else {
            Some(create_vertex_buffer(
                backend,
                bytemuck::cast_slice(&self.tangents),
                "Mesh Tangents",
            )?)
        };
        let texcoord_buffer = if self.texcoords.is_empty() {
            None
        } else {
            Some(create_vertex_buffer(
                backend,
                bytemuck::cast_slice(&self.texcoords),
                "Mesh Texcoords",
            )?)
        };
        let index_buffer = create_buffer(
            backend,
            bytemuck::cast_slice(&self.indices),
            BufferUsage::INDEX,
            "Mesh Indices",
        )?;

        self.gpu = Some(MeshGpu {
            position_buffer,
            normal_buffer,
            tangent_buffer,
            texcoord_buffer,
            index_buffer,
        });
        Ok(())
    }
}

fn create_vertex_buffer(
    backend: &RhiBackendRef,
    data: &[u8],
    name: &'static str,
) -> Result<RhiBufferRef> {
    create_buffer(backend, data, BufferUsage::VERTEX, name)
}

fn create_buffer(
    backend: &RhiBackendRef,
    data: &[u8],
    usage: BufferUsage,
    name: &'static str,
) -> Result<RhiBufferRef> {
    let buffer = backend.create_buffer(&RhiBufferInfo {
        size: data.len() as u64,
        stride: 0,
        usage,
        memory: MemoryUsage::CpuToGpu,
        creation: BufferCreation::PERSISTENT_MAP,
        name,
    })?;
    if let Some(region) = buffer.map() {
        region.write_bytes(0, data);
        buffer.unmap();
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh {
        let mut mesh = Mesh::new("tri");
        mesh.positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        mesh.indices = vec![0, 1, 2];
        mesh.compute_bounds();
        mesh
    }

    #[test]
    fn merge_rebases_indices_and_bounds() {
        let mut a = triangle();
        let mut b = triangle();
        for p in &mut b.positions {
            p.x += 10.0;
        }
        b.compute_bounds();

        a.merge(&b);
        assert_eq!(a.vertex_count(), 6);
        assert_eq!(a.indices[3..], [3, 4, 5]);
        let (min, max) = a.bounds();
        assert_eq!(min, Vec3::ZERO);
        assert!((max.x - 11.0).abs() < 1e-6);
    }

    #[test]
    fn bone_weights_keep_four_largest() {
        let mut mesh = triangle();
        for (bone, weight) in [(0, 0.1), (1, 0.4), (2, 0.2), (3, 0.3)] {
            mesh.add_bone_weight(0, bone, weight);
        }
        // A fifth, heavier influence evicts the smallest (0.1).
        mesh.add_bone_weight(0, 7, 0.5);

        let weights = mesh.bone_weights[0];
        let indices = mesh.bone_indices[0];
        assert!(weights.contains(&0.5));
        assert!(!weights.contains(&0.1));
        assert!(indices.contains(&7));
        assert!(!indices.contains(&0));
    }

    #[test]
    fn smooth_normals_point_up_for_flat_quad() {
        let mut mesh = Mesh::new("quad");
        mesh.positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        mesh.indices = vec![0, 1, 2, 0, 2, 3];
        mesh.compute_smooth_normals();
        for n in &mesh.normals {
            assert!((n.y.abs() - 1.0).abs() < 1e-5);
        }
    }
}
