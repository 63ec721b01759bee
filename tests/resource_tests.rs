//! Render Resource Tests
//!
//! Covers the resource manager and its satellites on the headless
//! backend:
//! - id allocators (distinctness, exhaustion, recycling)
//! - material id lifetime across construction and drop
//! - per-frame buffer isolation between frame slots
//! - fallback textures
//! - the shader cache
//! - mesh processing (bounds, merge, bone weights handled in unit tests)

use std::sync::Arc;

use glam::{Mat4, Vec3};

use ember::assets::AssetRoots;
use ember::render::resource::manager::RenderResourceManager;
use ember::render::resource::material::Material;
use ember::render::resource::mesh::Mesh;
use ember::render::resource::uniforms::ObjectGpu;
use ember::render::MAX_PER_FRAME_RESOURCE_SIZE;
use ember::rhi::headless::HeadlessBackend;
use ember::rhi::types::ShaderFrequency;
use ember::rhi::{RhiBackendRef, RhiResource};

fn manager() -> RenderResourceManager {
    let backend: RhiBackendRef = HeadlessBackend::new();
    RenderResourceManager::new(backend, AssetRoots::discover()).unwrap()
}

// ============================================================================
// Id allocators
// ============================================================================

#[test]
fn allocated_ids_are_non_zero_and_distinct() {
    let manager = manager();
    let ids: Vec<u32> = (0..256).map(|_| manager.allocate_material_id()).collect();
    assert!(ids.iter().all(|&id| id != 0));
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len());
    for id in ids {
        manager.release_material_id(id);
    }
}

#[test]
fn releasing_everything_allows_reuse() {
    let manager = manager();
    let first: Vec<u32> = (0..16).map(|_| manager.allocate_object_id()).collect();
    for &id in &first {
        manager.release_object_id(id);
    }
    let reused = manager.allocate_object_id();
    assert!(first.contains(&reused));
    manager.release_object_id(reused);
}

#[test]
fn exhausted_allocator_returns_zero_until_release() {
    let manager = manager();
    let ids: Vec<u32> = (0..MAX_PER_FRAME_RESOURCE_SIZE)
        .map(|_| manager.allocate_material_id())
        .collect();
    assert!(ids.iter().all(|&id| id != 0));

    // The id space is exhausted.
    assert_eq!(manager.allocate_material_id(), 0);

    // Releasing one makes the next allocation succeed.
    manager.release_material_id(ids[17]);
    let recovered = manager.allocate_material_id();
    assert_eq!(recovered, ids[17]);
}

#[test]
fn release_of_zero_is_idempotent() {
    let manager = manager();
    manager.release_material_id(0);
    manager.release_material_id(0);
    let id = manager.allocate_material_id();
    assert_ne!(id, 0);
}

// ============================================================================
// Material id lifetime
// ============================================================================

#[test]
fn dropping_a_material_releases_its_id() {
    let manager = manager();
    let before = manager.material_id_allocator().live_count();

    let material = Material::new_pbr(&manager, "lifetime test");
    let id = material.read().material_id();
    assert_ne!(id, 0);
    assert_eq!(manager.material_id_allocator().live_count(), before + 1);

    drop(material);
    assert_eq!(manager.material_id_allocator().live_count(), before);
}

#[test]
fn material_creation_past_capacity_yields_id_zero() {
    let manager = manager();
    let hoard: Vec<u32> = (0..MAX_PER_FRAME_RESOURCE_SIZE)
        .map(|_| manager.allocate_material_id())
        .collect();

    let material = Material::new_pbr(&manager, "one too many");
    assert_eq!(material.read().material_id(), 0);
    drop(material);

    manager.release_material_id(hoard[0]);
    let material = Material::new_pbr(&manager, "after release");
    assert_ne!(material.read().material_id(), 0);
}

#[test]
fn material_update_writes_the_material_table() {
    let manager = manager();
    let material = Material::new_pbr(&manager, "table write");
    {
        let mut guard = material.write();
        if let Some(pbr) = guard.as_pbr_mut() {
            pbr.roughness = 0.25;
            pbr.metallic = 1.0;
        }
        assert!(guard.is_dirty());
        guard.update(&manager);
        assert!(!guard.is_dirty());
    }
}

// ============================================================================
// Per-frame isolation
// ============================================================================

#[test]
fn object_writes_stay_in_their_frame_slot() {
    let manager = manager();
    let object_id = 5u32;
    let offset = u64::from(object_id) * std::mem::size_of::<ObjectGpu>() as u64;

    let slot_a_value = ObjectGpu {
        model: Mat4::from_scale(Vec3::splat(2.0)),
        inv_model: Mat4::from_scale(Vec3::splat(0.5)),
    };
    let slot_b_value = ObjectGpu {
        model: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
        inv_model: Mat4::from_translation(Vec3::new(-1.0, -2.0, -3.0)),
    };

    manager.set_frame_slot(0);
    manager.set_object_info(&slot_a_value, object_id);
    manager.set_frame_slot(1);
    manager.set_object_info(&slot_b_value, object_id);

    let read_a: ObjectGpu = manager.object_region_for_slot(0).read(offset);
    let read_b: ObjectGpu = manager.object_region_for_slot(1).read(offset);
    assert_eq!(read_a, slot_a_value);
    assert_eq!(read_b, slot_b_value);
    assert_ne!(read_a, read_b);
}

#[test]
fn out_of_range_object_writes_are_dropped() {
    let manager = manager();
    manager.set_frame_slot(0);
    // Must not panic or corrupt anything.
    manager.set_object_info(&ObjectGpu::default(), u32::MAX);
}

// ============================================================================
// Fallback textures & shader cache
// ============================================================================

#[test]
fn fallback_textures_are_created_once() {
    let manager = manager();
    let white = manager.fallback_white_texture();
    let white_again = manager.fallback_white_texture();
    assert!(Arc::ptr_eq(&white, &white_again));
    assert_ne!(white.texture_id(), 0);

    let black = manager.fallback_black_texture();
    let normal = manager.fallback_normal_texture();
    assert_ne!(black.texture_id(), white.texture_id());
    assert_ne!(normal.texture_id(), black.texture_id());
}

#[test]
fn shader_cache_returns_the_same_module() {
    let manager = manager();
    let first = manager
        .get_or_create_shader(
            "/Engine/shaders/depth_pre.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )
        .unwrap();
    let second = manager
        .get_or_create_shader(
            "/Engine/shaders/depth_pre.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )
        .unwrap();
    assert_eq!(first.resource_id(), second.resource_id());

    // A different frequency is a different cache entry.
    let fragment = manager
        .get_or_create_shader(
            "/Engine/shaders/depth_pre.wgsl",
            ShaderFrequency::Fragment,
            "fs_main",
        )
        .unwrap();
    assert_ne!(fragment.resource_id(), first.resource_id());
}

#[test]
fn missing_shader_path_is_an_error() {
    let manager = manager();
    let result = manager.get_or_create_shader(
        "/Engine/shaders/does_not_exist.wgsl",
        ShaderFrequency::Vertex,
        "vs_main",
    );
    assert!(result.is_err());
}

// ============================================================================
// Mesh upload
// ============================================================================

#[test]
fn mesh_upload_creates_gpu_buffers() {
    let manager = manager();
    let mut mesh = Mesh::new("triangle");
    mesh.positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ];
    mesh.indices = vec![0, 1, 2];
    mesh.compute_smooth_normals();
    mesh.compute_bounds();
    mesh.upload(manager.backend()).unwrap();

    let gpu = mesh.gpu().expect("gpu buffers created");
    assert!(gpu.normal_buffer.is_some());
    assert!(gpu.texcoord_buffer.is_none());

    let (_, radius) = mesh.bounding_sphere();
    assert!(radius > 0.0);
}

#[test]
fn empty_mesh_upload_fails() {
    let manager = manager();
    let mut mesh = Mesh::new("empty");
    assert!(mesh.upload(manager.backend()).is_err());
}
