//! Render System Tests
//!
//! Drives full frames through `RenderSystem` on the headless backend
//! with a small in-test scene:
//! - frames complete and present every tick
//! - passes execute in dependency order
//! - draws are recorded for collected batches
//! - the loop stops when the swapchain closes
//! - panorama -> cube conversion runs exactly once per panorama change

use std::sync::Arc;

use glam::{Mat4, Vec3};

use ember::assets::AssetRoots;
use ember::render::resource::material::{Material, MaterialRef};
use ember::render::resource::mesh::Mesh;
use ember::render::resource::texture::Texture;
use ember::render::scene::{
    CameraInfo, DirectionalLightInfo, DrawBatch, PointLightInfo, RenderPacket, RenderScene,
};
use ember::render::system::RenderSystem;
use ember::rhi::headless::{HeadlessBackend, HeadlessSwapchain, JournalEvent};
use ember::rhi::types::Extent2d;
use ember::rhi::{RhiBackendRef, RhiSwapchain};

const EXTENT: Extent2d = Extent2d {
    width: 320,
    height: 180,
};

// ─── Test scene ───────────────────────────────────────────────────────────────

struct TestScene {
    mesh: Mesh,
    material: Option<MaterialRef>,
    skybox: Option<MaterialRef>,
    lights: Vec<PointLightInfo>,
}

impl TestScene {
    fn with_bunny_stand_in(system: &RenderSystem) -> Self {
        let mut mesh = Mesh::new("bunny stand-in");
        mesh.positions = vec![
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.5, 0.0),
        ];
        mesh.indices = vec![0, 1, 2];
        mesh.compute_smooth_normals();
        mesh.compute_bounds();
        mesh.upload(system.backend()).unwrap();

        Self {
            mesh,
            material: None,
            skybox: None,
            lights: Vec::new(),
        }
    }
}

impl RenderScene for TestScene {
    fn camera(&self) -> Option<CameraInfo> {
        Some(CameraInfo::look_at(
            Vec3::new(-3.0, 0.0, 0.0),
            Vec3::ZERO,
            60.0,
            EXTENT.width as f32 / EXTENT.height as f32,
            0.1,
            1000.0,
        ))
    }

    fn directional_light(&self) -> Option<DirectionalLightInfo> {
        Some(DirectionalLightInfo {
            color: Vec3::ONE,
            intensity: 1.5,
            direction: Vec3::new(0.5, -1.0, 0.3).normalize(),
            ..DirectionalLightInfo::default()
        })
    }

    fn point_lights(&self) -> Vec<PointLightInfo> {
        self.lights.clone()
    }

    fn skybox(&self) -> Option<MaterialRef> {
        self.skybox.clone()
    }

    fn collect_draw_batches(&self, batches: &mut Vec<DrawBatch>) {
        let Some(gpu) = self.mesh.gpu() else { return };
        batches.push(DrawBatch {
            object_id: 1,
            vertex_buffer: Some(gpu.position_buffer.clone()),
            normal_buffer: gpu.normal_buffer.clone(),
            index_buffer: Some(gpu.index_buffer.clone()),
            index_count: self.mesh.index_count() as u32,
            model_matrix: Mat4::from_scale(Vec3::splat(10.0)),
            inv_model_matrix: Mat4::from_scale(Vec3::splat(0.1)),
            material: self.material.clone(),
            ..DrawBatch::default()
        });
    }
}

fn make_system() -> (Arc<HeadlessBackend>, RenderSystem) {
    let backend = HeadlessBackend::new();
    let rhi: RhiBackendRef = backend.clone();
    let system = RenderSystem::new(rhi, EXTENT, AssetRoots::discover()).unwrap();
    (backend, system)
}

// ============================================================================
// Frame loop
// ============================================================================

#[test]
fn frames_render_and_present() {
    let (backend, mut system) = make_system();
    let scene = TestScene::with_bunny_stand_in(&system);

    for _ in 0..60 {
        let packet = RenderPacket {
            scene: Some(&scene),
        };
        assert!(system.tick(&packet));
    }

    let swapchain = system
        .swapchain()
        .as_any()
        .downcast_ref::<HeadlessSwapchain>()
        .unwrap();
    assert_eq!(swapchain.present_count(), 60);
    assert_eq!(system.current_frame_index(), 60);

    // Geometry was drawn every frame.
    let draws = backend
        .journal()
        .count(|e| matches!(e, JournalEvent::DrawIndexed { .. }));
    assert!(draws >= 60, "expected at least one draw per frame, got {draws}");
}

#[test]
fn passes_execute_in_dependency_order() {
    let (backend, mut system) = make_system();
    let scene = TestScene::with_bunny_stand_in(&system);

    backend.journal().clear();
    let packet = RenderPacket {
        scene: Some(&scene),
    };
    assert!(system.tick(&packet));

    let order = backend.journal().pass_order();
    let position = |name: &str| {
        order
            .iter()
            .position(|p| p == name)
            .unwrap_or_else(|| panic!("pass {name} missing from {order:?}"))
    };
    assert!(position("DepthPrePass") < position("GBufferPass"));
    assert!(position("GBufferPass") < position("DeferredLightingPass"));
    assert!(position("DeferredLightingPass") < position("CompositePass"));
}

#[test]
fn empty_scene_still_presents() {
    let (_, mut system) = make_system();
    let packet = RenderPacket { scene: None };
    assert!(system.tick(&packet));
    assert!(system.tick(&packet));

    let swapchain = system
        .swapchain()
        .as_any()
        .downcast_ref::<HeadlessSwapchain>()
        .unwrap();
    assert_eq!(swapchain.present_count(), 2);
}

#[test]
fn closed_swapchain_stops_the_loop() {
    let (_, mut system) = make_system();
    let scene_packet = RenderPacket { scene: None };
    assert!(system.tick(&scene_packet));

    system
        .swapchain()
        .as_any()
        .downcast_ref::<HeadlessSwapchain>()
        .unwrap()
        .request_close();
    assert!(!system.tick(&scene_packet));
}

#[test]
fn wireframe_toggle_keeps_rendering() {
    let (backend, mut system) = make_system();
    let scene = TestScene::with_bunny_stand_in(&system);

    system.mesh_manager().set_wireframe(true);
    for _ in 0..5 {
        assert!(system.tick(&RenderPacket {
            scene: Some(&scene)
        }));
    }
    system.mesh_manager().set_wireframe(false);
    for _ in 0..5 {
        assert!(system.tick(&RenderPacket {
            scene: Some(&scene)
        }));
    }

    let draws = backend
        .journal()
        .count(|e| matches!(e, JournalEvent::DrawIndexed { .. }));
    assert!(draws >= 10);
}

#[test]
fn npr_materials_take_the_forward_path() {
    let (backend, mut system) = make_system();
    let mut scene = TestScene::with_bunny_stand_in(&system);
    scene.material = Some(Material::new_npr(system.resources(), "toon"));

    backend.journal().clear();
    assert!(system.tick(&RenderPacket {
        scene: Some(&scene)
    }));

    let order = backend.journal().pass_order();
    assert!(order.iter().any(|p| p == "NprForwardPass"), "order: {order:?}");
    assert!(!order.iter().any(|p| p == "GBufferPass"));
}

// ============================================================================
// Skybox / panorama conversion
// ============================================================================

fn skybox_material(system: &RenderSystem, pixel: u32) -> (MaterialRef, Arc<Texture>) {
    let panorama = Arc::new(Texture::from_pixel(system.resources(), pixel, "panorama"));
    let material: MaterialRef = Material::new_skybox(system.resources(), "cosmic");
    material.write().set_panorama_texture(panorama.clone());
    (material, panorama)
}

#[test]
fn panorama_conversion_runs_once_until_the_panorama_changes() {
    let (_, mut system) = make_system();
    let mut scene = TestScene::with_bunny_stand_in(&system);
    let (material, _panorama) = skybox_material(&system, 0xFF20_4080);
    scene.skybox = Some(material.clone());

    for _ in 0..10 {
        assert!(system.tick(&RenderPacket {
            scene: Some(&scene)
        }));
    }
    let converter = system.panorama_converter().unwrap();
    assert_eq!(converter.conversion_count(), 1);
    assert!(material.read().as_skybox().unwrap().cube_texture().is_some());

    // Swapping the panorama triggers exactly one more conversion.
    let replacement = Arc::new(Texture::from_pixel(
        system.resources(),
        0xFFFF_FFFF,
        "panorama 2",
    ));
    material.write().set_panorama_texture(replacement);
    for _ in 0..5 {
        assert!(system.tick(&RenderPacket {
            scene: Some(&scene)
        }));
    }
    assert_eq!(system.panorama_converter().unwrap().conversion_count(), 2);
}

#[test]
fn skybox_pass_runs_when_a_skybox_is_present() {
    let (backend, mut system) = make_system();
    let mut scene = TestScene::with_bunny_stand_in(&system);
    let (material, _panorama) = skybox_material(&system, 0xFF10_2030);
    scene.skybox = Some(material);

    backend.journal().clear();
    assert!(system.tick(&RenderPacket {
        scene: Some(&scene)
    }));
    let order = backend.journal().pass_order();
    assert!(order.iter().any(|p| p == "SkyboxPass"), "order: {order:?}");
}
