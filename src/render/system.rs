//! Render System Driver
//!
//! Owns the backend, swapchain, per-frame common resources, the two
//! managers, and every pass; orchestrates one frame per `tick`:
//!
//! 1. Advance the frame index and pick the per-frame slot.
//! 2. Wait on the slot's fence (its previous GPU work must be done).
//! 3. Acquire the next back buffer, signaling the start semaphore.
//! 4. Tick the mesh and light managers against the active scene.
//! 5. Write the per-frame CBVs (camera, global setting, lights,
//!    objects).
//! 6. Build the render graph: transient depth + HDR targets, the
//!    imported back buffer, and the pass chain
//!    DepthPre → GBuffer → DeferredLighting → PBR/NPR forward →
//!    Skybox → Composite.
//! 7. Execute the graph on the slot's command context, waiting on the
//!    start semaphore and signaling the finish semaphore and fence.
//! 8. Present, waiting on the finish semaphore.
//!
//! `tick` returns `false` once the swapchain reports closure.

use std::time::Instant;

use glam::Vec4;

use crate::assets::AssetRoots;
use crate::errors::Result;
use crate::rdg::{RdgBuilder, RdgExecutor, TransientTexturePool};
use crate::rhi::types::{
    AttachmentLoadOp, Extent2d, ResourceState, RhiSwapchainInfo,
};
use crate::rhi::{
    RhiBackend, RhiBackendRef, RhiCommandContext, RhiCommandContextRef, RhiCommandPoolRef,
    RhiFence, RhiFenceRef, RhiSemaphoreRef, RhiSwapchain, RhiSwapchainRef,
};

use super::light_manager::RenderLightManager;
use super::mesh_manager::RenderMeshManager;
use super::passes::composite::CompositePass;
use super::passes::deferred_lighting::{
    DeferredLightingPass, LightingPerFrameData, MAX_LIGHTS, ShaderLightData,
};
use super::passes::depth_pre::DepthPrePass;
use super::passes::depth_visualize::DepthVisualizePass;
use super::passes::gbuffer::{GBufferFallbacks, GBufferPass};
use super::passes::npr_forward::NprForwardPass;
use super::passes::pbr_forward::{ForwardPerFrameData, PbrForwardPass};
use super::passes::skybox::SkyboxPass;
use super::passes::{PassInitContext, RenderPass};
use super::resource::manager::RenderResourceManager;
use super::resource::material::{MaterialKind, RenderPassMask};
use super::resource::panorama::{PanoramaConverter, ensure_cube_texture_ready};
use super::resource::uniforms::{
    CameraGpu, DirectionalLightGpu, GlobalSettingGpu, ObjectGpu, PointLightGpu,
};
use super::scene::{CameraInfo, DrawBatch, RenderPacket, RenderScene};
use super::{
    DEPTH_FORMAT, DIRECTIONAL_SHADOW_CASCADE_LEVEL, FRAMES_IN_FLIGHT, HDR_COLOR_FORMAT,
};

struct PerFrameCommon {
    command: RhiCommandContextRef,
    fence: RhiFenceRef,
    start_semaphore: RhiSemaphoreRef,
    finish_semaphore: RhiSemaphoreRef,
}

pub struct RenderSystem {
    backend: RhiBackendRef,
    swapchain: RhiSwapchainRef,
    resources: RenderResourceManager,
    mesh_manager: RenderMeshManager,
    light_manager: RenderLightManager,
    transient_pool: TransientTexturePool,
    panorama_converter: Option<PanoramaConverter>,

    _command_pool: RhiCommandPoolRef,
    per_frame: Vec<PerFrameCommon>,

    depth_pre: DepthPrePass,
    gbuffer: GBufferPass,
    deferred_lighting: DeferredLightingPass,
    pbr_forward: PbrForwardPass,
    npr_forward: NprForwardPass,
    skybox: SkyboxPass,
    composite: CompositePass,
    depth_visualize: DepthVisualizePass,

    current_frame_index: u64,
    extent: Extent2d,
    start_time: Instant,
}

impl RenderSystem {
    /// Bring up the swapchain, per-frame resources, and every pass.
    ///
    /// A pass that fails init is logged and skipped each frame; the
    /// system itself only fails when core resources cannot be created.
    pub fn new(backend: RhiBackendRef, extent: Extent2d, assets: AssetRoots) -> Result<Self> {
        log::info!("initializing render system ({}x{})", extent.width, extent.height);

        let swapchain = backend.create_swapchain(&RhiSwapchainInfo {
            extent,
            image_count: FRAMES_IN_FLIGHT as u32,
            ..RhiSwapchainInfo::default()
        })?;

        let resources = RenderResourceManager::new(backend.clone(), assets)?;

        let command_pool = backend.create_command_pool()?;
        let mut per_frame = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            per_frame.push(PerFrameCommon {
                command: backend.create_command_context(&command_pool)?,
                // Signaled so the first use of each slot does not wait.
                fence: backend.create_fence(true)?,
                start_semaphore: backend.create_semaphore()?,
                finish_semaphore: backend.create_semaphore()?,
            });
        }

        let mut system = Self {
            swapchain,
            resources,
            mesh_manager: RenderMeshManager::new(),
            light_manager: RenderLightManager::new(),
            transient_pool: TransientTexturePool::new(),
            panorama_converter: None,
            _command_pool: command_pool,
            per_frame,
            depth_pre: DepthPrePass::new(),
            gbuffer: GBufferPass::new(),
            deferred_lighting: DeferredLightingPass::new(),
            pbr_forward: PbrForwardPass::new(),
            npr_forward: NprForwardPass::new(),
            skybox: SkyboxPass::new(),
            composite: CompositePass::new(),
            depth_visualize: DepthVisualizePass::new(),
            current_frame_index: 0,
            extent,
            start_time: Instant::now(),
            backend,
        };
        system.init_passes();
        system.panorama_converter = match PanoramaConverter::new(&system.resources) {
            Ok(converter) => Some(converter),
            Err(e) => {
                log::error!("panorama converter unavailable: {e}");
                None
            }
        };
        Ok(system)
    }

    fn init_passes(&mut self) {
        let ctx = PassInitContext {
            backend: &self.backend,
            resources: &self.resources,
            color_format: self.swapchain.format(),
            hdr_format: HDR_COLOR_FORMAT,
            depth_format: DEPTH_FORMAT,
            extent: self.extent,
        };
        let results = [
            ("DepthPrePass", self.depth_pre.init(&ctx)),
            ("GBufferPass", self.gbuffer.init(&ctx)),
            ("DeferredLightingPass", self.deferred_lighting.init(&ctx)),
            ("PbrForwardPass", self.pbr_forward.init(&ctx)),
            ("NprForwardPass", self.npr_forward.init(&ctx)),
            ("SkyboxPass", self.skybox.init(&ctx)),
            ("CompositePass", self.composite.init(&ctx)),
            ("DepthVisualizePass", self.depth_visualize.init(&ctx)),
        ];
        for (name, result) in results {
            if let Err(e) = result {
                log::error!("{name} init failed (pass disabled): {e}");
            }
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn backend(&self) -> &RhiBackendRef {
        &self.backend
    }

    #[must_use]
    pub fn swapchain(&self) -> &RhiSwapchainRef {
        &self.swapchain
    }

    #[must_use]
    pub fn resources(&self) -> &RenderResourceManager {
        &self.resources
    }

    #[must_use]
    pub fn mesh_manager(&mut self) -> &mut RenderMeshManager {
        &mut self.mesh_manager
    }

    #[must_use]
    pub fn light_manager(&self) -> &RenderLightManager {
        &self.light_manager
    }

    #[must_use]
    pub fn panorama_converter(&self) -> Option<&PanoramaConverter> {
        self.panorama_converter.as_ref()
    }

    #[must_use]
    pub fn current_frame_index(&self) -> u64 {
        self.current_frame_index
    }

    // ── Frame tick ─────────────────────────────────────────────────────────

    /// Render and present one frame. Returns `false` when the window /
    /// surface is gone and the loop should stop.
    pub fn tick(&mut self, packet: &RenderPacket<'_>) -> bool {
        self.current_frame_index += 1;
        let slot = (self.current_frame_index % FRAMES_IN_FLIGHT as u64) as usize;

        // Make sure the previous use of this slot finished on the GPU
        // before its command context and CBVs are reused.
        {
            let frame = &self.per_frame[slot];
            frame.fence.wait();
            frame.fence.reset();
        }

        let Some(image_index) = self
            .swapchain
            .acquire(Some(&self.per_frame[slot].start_semaphore))
        else {
            log::info!("swapchain closed; stopping render loop");
            return false;
        };
        let back_buffer = self.swapchain.texture(image_index);

        // Scene-side collection.
        self.mesh_manager.tick(packet.scene);
        self.light_manager.tick(packet.scene);
        let camera = self.mesh_manager.camera().copied().unwrap_or_default();

        // Per-frame CBV writes.
        self.resources.set_frame_slot(slot);
        self.write_frame_uniforms(&camera);

        // Skybox cube generation happens before graph building so the
        // pass sees a ready texture.
        let skybox_material = packet.scene.and_then(|scene| scene.skybox());
        if let (Some(material), Some(converter)) =
            (&skybox_material, &self.panorama_converter)
        {
            ensure_cube_texture_ready(&mut material.write(), &self.resources, converter);
        }

        self.pbr_forward.set_wireframe(self.mesh_manager.wireframe());
        self.npr_forward.set_wireframe(self.mesh_manager.wireframe());

        // ── Build the graph ────────────────────────────────────────────
        let mut builder = RdgBuilder::new();
        let depth = builder
            .create_texture("SceneDepth")
            .extent(self.extent)
            .format(DEPTH_FORMAT)
            .allow_depth_stencil()
            .allow_sampled()
            .finish();
        let hdr = builder
            .create_texture("SceneColorHDR")
            .extent(self.extent)
            .format(HDR_COLOR_FORMAT)
            .allow_render_target()
            .allow_sampled()
            .finish();
        let back = builder
            .create_texture("BackBuffer")
            .import(back_buffer, ResourceState::Common)
            .finish();

        let frame_index = self.current_frame_index;
        let extent = self.extent;
        let view = camera.view;
        let proj = camera.projection;
        let camera_pos = camera.position.extend(1.0);

        // Flush dirty material table entries once per frame.
        for batch in self.mesh_manager.batches() {
            if let Some(material) = &batch.material {
                let mut guard = material.write();
                if guard.is_dirty() {
                    guard.update(&self.resources);
                }
            }
        }

        let (deferred_batches, pbr_forward_batches, npr_batches) = self.partition_batches();

        self.depth_pre.build(
            &mut builder,
            depth,
            self.mesh_manager.batches(),
            view,
            proj,
            camera_pos,
            frame_index,
            extent,
        );

        let fallbacks = GBufferFallbacks {
            white: self.resources.fallback_white_texture(),
            black: self.resources.fallback_black_texture(),
            normal: self.resources.fallback_normal_texture(),
        };

        let mut hdr_written = false;
        if !deferred_batches.is_empty() && self.mesh_manager.deferred_enabled() {
            let handles = self.gbuffer.build(
                &mut builder,
                depth,
                &deferred_batches,
                view,
                proj,
                camera_pos,
                frame_index,
                extent,
                &fallbacks,
            );
            if let Some(handles) = handles {
                self.deferred_lighting.build(
                    &mut builder,
                    hdr,
                    &handles,
                    &self.lighting_frame_data(&camera),
                    frame_index,
                    extent,
                );
                hdr_written = true;
            }
        }

        let forward_frame = self.forward_frame_data(&camera);
        if !pbr_forward_batches.is_empty() {
            self.pbr_forward.build(
                &mut builder,
                hdr,
                depth,
                &pbr_forward_batches,
                &forward_frame,
                frame_index,
                extent,
                if hdr_written {
                    AttachmentLoadOp::Load
                } else {
                    AttachmentLoadOp::Clear
                },
                &fallbacks,
            );
            hdr_written = true;
        }
        if !npr_batches.is_empty() {
            self.npr_forward.build(
                &mut builder,
                hdr,
                depth,
                &npr_batches,
                &forward_frame,
                frame_index,
                extent,
                &fallbacks,
            );
            hdr_written = true;
        }

        if let Some(material) = &skybox_material {
            self.skybox.build(
                &mut builder,
                hdr,
                depth,
                view,
                proj,
                material,
                frame_index,
                extent,
            );
            hdr_written = true;
        }

        if hdr_written {
            self.composite.build(&mut builder, back, hdr, extent);
        }

        // ── Execute & present ──────────────────────────────────────────
        let frame = &self.per_frame[slot];
        frame.command.begin_command();
        if let Err(e) = RdgExecutor::execute(
            builder,
            &self.backend,
            &mut self.transient_pool,
            &frame.command,
        ) {
            log::error!("render graph execution failed: {e}");
        }
        frame.command.end_command();
        if let Err(e) = frame.command.execute(
            Some(&frame.fence),
            Some(&frame.start_semaphore),
            Some(&frame.finish_semaphore),
        ) {
            log::error!("command submission failed: {e}");
        }

        self.swapchain.present(Some(&frame.finish_semaphore))
    }

    // ── Frame data helpers ─────────────────────────────────────────────────

    fn write_frame_uniforms(&self, camera: &CameraInfo) {
        self.resources.set_camera_info(&CameraGpu {
            view: camera.view,
            projection: camera.projection,
            position: camera.position.extend(1.0),
        });

        let elapsed = self.start_time.elapsed().as_secs_f32();
        self.resources.set_global_setting(&GlobalSettingGpu {
            viewport: Vec4::new(
                self.extent.width as f32,
                self.extent.height as f32,
                1.0 / self.extent.width.max(1) as f32,
                1.0 / self.extent.height.max(1) as f32,
            ),
            time: Vec4::new(elapsed, self.current_frame_index as f32, 0.0, 0.0),
        });

        if let Some(light) = self.light_manager.directional_light() {
            for cascade in 0..DIRECTIONAL_SHADOW_CASCADE_LEVEL {
                self.resources.set_directional_light_info(
                    &DirectionalLightGpu {
                        color: light.color.extend(light.intensity),
                        direction: light.direction.extend(f32::from(light.enabled)),
                        cascade: light.cascades[cascade as usize],
                        params: Vec4::new(
                            light.shadow_bias,
                            light.normal_bias,
                            light.cascade_split_lambda,
                            f32::from(light.cast_shadow),
                        ),
                    },
                    cascade,
                );
            }
        }

        for (index, light) in self.light_manager.point_lights().iter().enumerate() {
            self.resources.set_point_light_info(
                &PointLightGpu {
                    position: light.position.extend(light.range),
                    color: light.color.extend(light.intensity),
                    params: Vec4::new(
                        light.shadow_index.map_or(-1.0, |slot| slot as f32),
                        light.sphere_radius,
                        0.0,
                        0.0,
                    ),
                },
                index as u32,
            );
        }

        for batch in self.mesh_manager.batches() {
            self.resources.set_object_info(
                &ObjectGpu {
                    model: batch.model_matrix,
                    inv_model: batch.inv_model_matrix,
                },
                batch.object_id,
            );
        }
    }

    fn forward_frame_data(&self, camera: &CameraInfo) -> ForwardPerFrameData {
        let light = self.light_manager.directional_light();
        ForwardPerFrameData {
            view: camera.view,
            proj: camera.projection,
            camera_pos: camera.position.extend(1.0),
            light_dir: light.map_or(Vec4::new(0.0, -1.0, 0.0, 0.0), |l| {
                l.direction.normalize_or_zero().extend(0.0)
            }),
            light_color: light.map_or(Vec4::new(1.0, 1.0, 1.0, 1.0), |l| {
                l.color.extend(l.intensity)
            }),
        }
    }

    fn lighting_frame_data(&self, camera: &CameraInfo) -> LightingPerFrameData {
        let light = self.light_manager.directional_light();
        let mut data = LightingPerFrameData {
            camera_pos: camera
                .position
                .extend(self.light_manager.point_lights().len() as f32),
            main_light_dir: light.map_or(Vec4::new(0.0, -1.0, 0.0, 0.0), |l| {
                l.direction.normalize_or_zero().extend(0.0)
            }),
            main_light_color: light.map_or(Vec4::new(1.0, 1.0, 1.0, 1.0), |l| {
                l.color.extend(l.intensity)
            }),
            inv_view_proj: camera.view_projection().inverse(),
            lights: [ShaderLightData::default(); MAX_LIGHTS],
        };
        for (index, light) in self
            .light_manager
            .point_lights()
            .iter()
            .take(MAX_LIGHTS)
            .enumerate()
        {
            data.lights[index] = ShaderLightData {
                position: light.position.extend(light.range),
                color: light.color.extend(light.intensity),
                direction: Vec4::new(0.0, 0.0, 0.0, 1.0),
                cone: Vec4::ZERO,
            };
        }
        data
    }

    /// Split the frame's batches by material pass mask and variant:
    /// deferred (G-buffer path), PBR forward, NPR forward.
    fn partition_batches(&self) -> (Vec<DrawBatch>, Vec<DrawBatch>, Vec<DrawBatch>) {
        let mut deferred = Vec::new();
        let mut pbr_forward = Vec::new();
        let mut npr = Vec::new();
        let deferred_enabled = self.mesh_manager.deferred_enabled();

        for batch in self.mesh_manager.batches() {
            match &batch.material {
                None => {
                    if deferred_enabled {
                        deferred.push(batch.clone());
                    } else {
                        pbr_forward.push(batch.clone());
                    }
                }
                Some(material) => {
                    let guard = material.read();
                    if matches!(guard.kind, MaterialKind::Skybox(_)) {
                        // Drawn by the dedicated skybox pass.
                        continue;
                    }
                    if matches!(guard.kind, MaterialKind::Npr(_)) {
                        npr.push(batch.clone());
                    } else if guard.common.pass_mask.contains(RenderPassMask::DEFERRED)
                        && deferred_enabled
                    {
                        deferred.push(batch.clone());
                    } else {
                        pbr_forward.push(batch.clone());
                    }
                }
            }
        }

        // Lower render queues draw first within each bucket.
        let queue_of = |batch: &DrawBatch| {
            batch
                .material
                .as_ref()
                .map_or(1000, |m| m.read().common.render_queue)
        };
        deferred.sort_by_key(queue_of);
        pbr_forward.sort_by_key(queue_of);
        npr.sort_by_key(queue_of);
        (deferred, pbr_forward, npr)
    }
}
