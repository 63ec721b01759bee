//! Panorama → Cubemap Conversion
//!
//! GPU converter that renders an equirectangular 2D environment texture
//! into the six faces of a cube texture. Skybox materials call it lazily
//! the first time their cube texture is needed and again whenever the
//! panorama changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use smallvec::smallvec;

use crate::errors::{EmberError, Result};
use crate::rhi::types::{
    AddressMode, AttachmentLoadOp, AttachmentStoreOp, BindingSlot, BlendTargetState,
    BufferCreation, BufferUsage, CompareFunction, CullMode, DepthStencilState, Extent2d, Extent3d,
    FillMode, MemoryUsage, Offset2d, RasterizerState, ResourceState, RhiBufferInfo,
    RhiColorAttachment, RhiGraphicsPipelineInfo, RhiRenderPassInfo, RhiRootSignatureInfo,
    RhiSamplerInfo, RhiTextureBarrier, RhiTextureInfo, RhiTextureViewInfo, RhiFormat,
    ShaderFrequency, ShaderStages, SubresourceRange, TextureAspect, TextureBindingSlot,
    TextureDimension, TextureUsage, TextureViewType,
};
use crate::rhi::{
    MappedRegion, RhiBackend, RhiBuffer, RhiBufferRef, RhiCommandContext,
    RhiGraphicsPipelineRef, RhiResource, RhiRootSignatureRef, RhiSamplerRef,
};

use super::manager::RenderResourceManager;
use super::material::Material;
use super::texture::Texture;

const FACE_UNIFORM_STRIDE: u64 = 256;

/// Panorama-to-cube GPU converter. One per render system; stateless
/// between conversions apart from its pipeline objects.
pub struct PanoramaConverter {
    pipeline: RhiGraphicsPipelineRef,
    root_signature: RhiRootSignatureRef,
    sampler: RhiSamplerRef,
    face_uniforms: RhiBufferRef,
    face_region: MappedRegion,
    conversion_count: AtomicU32,
}

impl PanoramaConverter {
    pub fn new(manager: &RenderResourceManager) -> Result<Self> {
        let backend = manager.backend();

        let vertex_shader = manager.get_or_create_shader(
            "/Engine/shaders/panorama_to_cube.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )?;
        let fragment_shader = manager.get_or_create_shader(
            "/Engine/shaders/panorama_to_cube.wgsl",
            ShaderFrequency::Fragment,
            "fs_main",
        )?;

        let root_signature = backend.create_root_signature(&RhiRootSignatureInfo {
            constant_buffers: vec![BindingSlot {
                slot: 0,
                stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
            }],
            textures: vec![TextureBindingSlot {
                slot: 0,
                stages: ShaderStages::FRAGMENT,
                dimension: TextureViewType::D2,
                depth: false,
            }],
            samplers: vec![BindingSlot {
                slot: 0,
                stages: ShaderStages::FRAGMENT,
            }],
            name: "PanoramaConverter",
        })?;

        let pipeline = backend.create_graphics_pipeline(&RhiGraphicsPipelineInfo {
            vertex_shader: Some(vertex_shader),
            fragment_shader: Some(fragment_shader),
            root_signature: Some(root_signature.clone()),
            rasterizer: RasterizerState {
                cull_mode: CullMode::None,
                fill_mode: FillMode::Solid,
                depth_clip: true,
            },
            depth_stencil: DepthStencilState {
                depth_test: false,
                depth_write: false,
                compare: CompareFunction::Always,
            },
            blend_targets: smallvec![BlendTargetState::default()],
            color_formats: smallvec![RhiFormat::Rgba16Float],
            depth_stencil_format: None,
            name: "Panorama To Cube",
            ..RhiGraphicsPipelineInfo::default()
        })?;

        let sampler = backend.create_sampler(&RhiSamplerInfo {
            address_u: AddressMode::Repeat,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
            name: "Panorama Sampler",
            ..RhiSamplerInfo::default()
        })?;

        let face_uniforms = backend.create_buffer(&RhiBufferInfo {
            size: FACE_UNIFORM_STRIDE * 6,
            stride: 0,
            usage: BufferUsage::UNIFORM,
            memory: MemoryUsage::CpuToGpu,
            creation: BufferCreation::PERSISTENT_MAP,
            name: "Panorama Face Params",
        })?;
        let face_region = face_uniforms
            .map()
            .ok_or(EmberError::ResourceCreationFailed {
                what: "buffer",
                detail: "panorama face uniforms are not mappable".to_string(),
            })?;

        Ok(Self {
            pipeline,
            root_signature,
            sampler,
            face_uniforms,
            face_region,
            conversion_count: AtomicU32::new(0),
        })
    }

    /// Conversions performed since creation.
    #[must_use]
    pub fn conversion_count(&self) -> u32 {
        self.conversion_count.load(Ordering::Acquire)
    }

    /// Render `panorama` into a freshly created cube texture.
    pub fn convert(
        &self,
        manager: &RenderResourceManager,
        panorama: &Texture,
        resolution: u32,
    ) -> Result<Arc<Texture>> {
        let backend = manager.backend();
        let Some(panorama_rhi) = panorama.rhi_texture() else {
            return Err(EmberError::ResourceCreationFailed {
                what: "texture",
                detail: "panorama has no GPU texture".to_string(),
            });
        };

        let cube = backend.create_texture(&RhiTextureInfo {
            dimension: TextureDimension::Cube,
            format: RhiFormat::Rgba16Float,
            extent: Extent3d::new(resolution, resolution, 1),
            mip_levels: 1,
            array_layers: 6,
            usage: TextureUsage::SAMPLED | TextureUsage::COLOR_TARGET | TextureUsage::CUBE,
            memory: MemoryUsage::GpuOnly,
            name: "Skybox Cube",
        })?;

        for face in 0..6u32 {
            self.face_region
                .write(u64::from(face) * FACE_UNIFORM_STRIDE, &[face, 0u32, 0, 0]);
        }

        let command = backend.immediate_command();
        command.texture_barrier(&RhiTextureBarrier {
            texture: cube.clone(),
            old_state: ResourceState::Undefined,
            new_state: ResourceState::RenderTarget,
            subresource: SubresourceRange::all(TextureAspect::Color),
        });

        for face in 0..6u32 {
            let face_view = backend.create_texture_view(&RhiTextureViewInfo {
                texture: cube.clone(),
                format: RhiFormat::Undefined,
                view_type: TextureViewType::D2,
                subresource: SubresourceRange {
                    aspect: TextureAspect::Color,
                    base_mip: 0,
                    mip_count: 1,
                    base_layer: face,
                    layer_count: 1,
                },
            })?;
            let render_pass = backend.create_render_pass(&RhiRenderPassInfo {
                color_attachments: smallvec![RhiColorAttachment {
                    view: face_view,
                    load_op: AttachmentLoadOp::Clear,
                    store_op: AttachmentStoreOp::Store,
                    clear_color: [0.0, 0.0, 0.0, 1.0],
                }],
                depth_stencil: None,
                extent: Extent2d::new(resolution, resolution),
                name: format!("Panorama Face {face}"),
            })?;

            command.begin_render_pass(&render_pass);
            command.set_viewport(
                Offset2d::default(),
                Extent2d::new(resolution, resolution),
            );
            command.set_scissor(Offset2d::default(), Extent2d::new(resolution, resolution));
            command.set_graphics_pipeline(&self.pipeline);
            command.bind_constant_buffer_range(
                &self.face_uniforms,
                0,
                ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                u64::from(face) * FACE_UNIFORM_STRIDE,
                FACE_UNIFORM_STRIDE,
            );
            command.bind_texture(panorama_rhi, 0, ShaderStages::FRAGMENT);
            command.bind_sampler(&self.sampler, 0, ShaderStages::FRAGMENT);
            command.draw(3, 1, 0, 0);
            command.end_render_pass();
            render_pass.destroy();
        }

        command.texture_barrier(&RhiTextureBarrier {
            texture: cube.clone(),
            old_state: ResourceState::RenderTarget,
            new_state: ResourceState::ShaderResource,
            subresource: SubresourceRange::all(TextureAspect::Color),
        });
        command.flush()?;

        self.conversion_count.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(Texture::from_rhi(manager, "Skybox Cube", cube, None)))
    }

}

/// Run the conversion for a skybox material when its cube texture is
/// missing or stale. Returns true when a cube texture is ready.
pub fn ensure_cube_texture_ready(
    material: &mut Material,
    manager: &RenderResourceManager,
    converter: &PanoramaConverter,
) -> bool {
    let Some(skybox) = material.as_skybox() else {
        return false;
    };
    if skybox.panorama_texture().is_none() {
        return false;
    }
    if skybox.cube_texture().is_some() && !skybox.is_cube_texture_dirty() {
        return true;
    }

    let resolution = skybox.cube_resolution;
    let panorama = skybox
        .panorama_texture()
        .cloned()
        .expect("panorama checked above");
    match converter.convert(manager, &panorama, resolution) {
        Ok(cube) => {
            if let Some(skybox) = material.as_skybox_mut() {
                skybox.store_cube(cube);
            }
            material.update(manager);
            true
        }
        Err(e) => {
            log::error!("panorama conversion failed: {e}");
            false
        }
    }
}
