//! G-Buffer Pass
//!
//! Renders opaque deferred-path geometry into four render targets:
//!
//! - RT0: albedo (RGB) + AO (A)
//! - RT1: normal (RGB) + roughness (A)
//! - RT2: metallic (R) + emission (G) + specular (B)
//! - RT3: world position (RGB) + view depth (A), RGBA32F
//!
//! Depth is loaded from the pre-pass with `LessEqual` and stored back.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::errors::Result;
use crate::rdg::{RdgBuilder, RdgTextureHandle};
use crate::render::resource::material::MaterialKind;
use crate::render::resource::texture::TextureRef;
use crate::render::scene::DrawBatch;
use crate::render::{
    COLOR_FORMAT, MAX_PER_FRAME_OBJECT_SIZE, PASS_FRAMES_IN_FLIGHT, POSITION_DEPTH_FORMAT,
};
use crate::rhi::types::{
    AttachmentLoadOp, AttachmentStoreOp, BindingSlot, BlendTargetState, CompareFunction,
    DepthStencilState, Extent2d, Offset2d, RasterizerState, RhiFormat, RhiGraphicsPipelineInfo,
    RhiRootSignatureInfo, RhiSamplerInfo, ShaderFrequency, ShaderStages, TextureBindingSlot,
    TextureViewType, VertexElement,
};
use crate::rhi::{
    RhiBackend, RhiCommandContext, RhiCommandContextRef, RhiGraphicsPipelineRef,
    RhiRootSignatureRef, RhiSamplerRef, RhiShaderRef,
};

use super::{FrameUniforms, PassInitContext, PassType, RenderPass, UniformRing};

/// Output handles consumed by the deferred lighting pass.
#[derive(Clone, Copy)]
pub struct GBufferOutputHandles {
    pub albedo_ao: RdgTextureHandle,
    pub normal_roughness: RdgTextureHandle,
    pub material_emission: RdgTextureHandle,
    pub position_depth: RdgTextureHandle,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct PerFrameData {
    view: Mat4,
    proj: Mat4,
    camera_pos: Vec4,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PerObjectData {
    model: Mat4,
    inv_model: Mat4,
}

/// Material block matching the fragment shader's 64-byte cbuffer:
/// albedo, then scalar surface parameters, then texture-presence flags.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct MaterialData {
    albedo: Vec4,
    roughness: f32,
    metallic: f32,
    emission: f32,
    alpha_clip: f32,
    specular: f32,
    use_albedo_map: f32,
    use_normal_map: f32,
    use_arm_map: f32,
    use_roughness_map: f32,
    use_metallic_map: f32,
    use_ao_map: f32,
    use_emission_map: f32,
    _padding: [f32; 3],
}

pub struct GBufferPass {
    vertex_shader: Option<RhiShaderRef>,
    fragment_shader: Option<RhiShaderRef>,
    root_signature: Option<RhiRootSignatureRef>,
    pipeline: Option<RhiGraphicsPipelineRef>,
    sampler: Option<RhiSamplerRef>,
    per_frame: Option<FrameUniforms>,
    per_object: Option<UniformRing>,
    per_material: Option<UniformRing>,
    initialized: bool,
}

impl GBufferPass {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            root_signature: None,
            pipeline: None,
            sampler: None,
            per_frame: None,
            per_object: None,
            per_material: None,
            initialized: false,
        }
    }

    #[must_use]
    pub fn albedo_ao_format() -> RhiFormat {
        COLOR_FORMAT
    }

    #[must_use]
    pub fn normal_roughness_format() -> RhiFormat {
        COLOR_FORMAT
    }

    #[must_use]
    pub fn material_emission_format() -> RhiFormat {
        COLOR_FORMAT
    }

    #[must_use]
    pub fn position_depth_format() -> RhiFormat {
        POSITION_DEPTH_FORMAT
    }

    pub fn init(&mut self, ctx: &PassInitContext<'_>) -> Result<()> {
        log::info!("initializing GBufferPass");
        self.vertex_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/gbuffer.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )?);
        self.fragment_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/gbuffer.wgsl",
            ShaderFrequency::Fragment,
            "fs_main",
        )?);

        // b0 frame, b1 object, b2 material; t0..t6 material maps; s0.
        let root_signature = ctx.backend.create_root_signature(&RhiRootSignatureInfo {
            constant_buffers: vec![
                BindingSlot {
                    slot: 0,
                    stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                },
                BindingSlot {
                    slot: 1,
                    stages: ShaderStages::VERTEX,
                },
                BindingSlot {
                    slot: 2,
                    stages: ShaderStages::FRAGMENT,
                },
            ],
            textures: (0..7)
                .map(|slot| TextureBindingSlot {
                    slot,
                    stages: ShaderStages::FRAGMENT,
                    dimension: TextureViewType::D2,
                    depth: false,
                })
                .collect(),
            samplers: vec![BindingSlot {
                slot: 0,
                stages: ShaderStages::FRAGMENT,
            }],
            name: "GBufferPass",
        })?;

        self.sampler = Some(ctx.backend.create_sampler(&RhiSamplerInfo {
            max_anisotropy: 16.0,
            name: "GBuffer Sampler",
            ..RhiSamplerInfo::default()
        })?);

        self.per_frame = Some(FrameUniforms::new(
            ctx.backend,
            std::mem::size_of::<PerFrameData>() as u64,
            PASS_FRAMES_IN_FLIGHT,
            "GBuffer PerFrame",
        )?);
        self.per_object = Some(UniformRing::new(
            ctx.backend,
            std::mem::size_of::<PerObjectData>() as u64,
            MAX_PER_FRAME_OBJECT_SIZE,
            "GBuffer PerObject",
        )?);
        self.per_material = Some(UniformRing::new(
            ctx.backend,
            std::mem::size_of::<MaterialData>() as u64,
            MAX_PER_FRAME_OBJECT_SIZE,
            "GBuffer PerMaterial",
        )?);

        let pipeline = ctx.backend.create_graphics_pipeline(&RhiGraphicsPipelineInfo {
            vertex_shader: self.vertex_shader.clone(),
            fragment_shader: self.fragment_shader.clone(),
            root_signature: Some(root_signature.clone()),
            vertex_elements: vec![
                VertexElement {
                    stream_index: 0,
                    location: 0,
                    format: RhiFormat::Rgb32Float,
                    offset: 0,
                    stride: 0,
                },
                VertexElement {
                    stream_index: 1,
                    location: 1,
                    format: RhiFormat::Rgb32Float,
                    offset: 0,
                    stride: 0,
                },
                VertexElement {
                    stream_index: 2,
                    location: 2,
                    format: RhiFormat::Rg32Float,
                    offset: 0,
                    stride: 0,
                },
            ],
            rasterizer: RasterizerState::default(),
            depth_stencil: DepthStencilState {
                depth_test: true,
                depth_write: true,
                compare: CompareFunction::LessEqual,
            },
            blend_targets: smallvec::smallvec![BlendTargetState::default(); 4],
            color_formats: smallvec::smallvec![
                Self::albedo_ao_format(),
                Self::normal_roughness_format(),
                Self::material_emission_format(),
                Self::position_depth_format(),
            ],
            depth_stencil_format: Some(ctx.depth_format),
            name: "GBufferPass",
            ..RhiGraphicsPipelineInfo::default()
        })?;

        self.root_signature = Some(root_signature);
        self.pipeline = Some(pipeline);
        self.initialized = true;
        Ok(())
    }

    /// Declare the G-buffer targets and the pass; returns the output
    /// handles for downstream lighting, or `None` when the pass cannot
    /// run.
    pub fn build(
        &self,
        builder: &mut RdgBuilder<'_>,
        depth_target: RdgTextureHandle,
        batches: &[DrawBatch],
        view: Mat4,
        proj: Mat4,
        camera_pos: Vec4,
        frame_index: u64,
        extent: Extent2d,
        fallbacks: &GBufferFallbacks,
    ) -> Option<GBufferOutputHandles> {
        if !self.is_ready() {
            return None;
        }
        let (Some(pipeline), Some(sampler), Some(per_frame), Some(per_object), Some(per_material)) = (
            &self.pipeline,
            &self.sampler,
            &self.per_frame,
            &self.per_object,
            &self.per_material,
        ) else {
            return None;
        };

        let draws: Vec<DrawBatch> = batches.to_vec();
        if draws.is_empty() {
            return None;
        }

        let make_target = |builder: &mut RdgBuilder<'_>, name: &str, format: RhiFormat| {
            builder
                .create_texture(name)
                .extent(extent)
                .format(format)
                .allow_render_target()
                .allow_sampled()
                .finish()
        };
        let handles = GBufferOutputHandles {
            albedo_ao: make_target(builder, "GBuffer AlbedoAO", Self::albedo_ao_format()),
            normal_roughness: make_target(
                builder,
                "GBuffer NormalRoughness",
                Self::normal_roughness_format(),
            ),
            material_emission: make_target(
                builder,
                "GBuffer MaterialEmission",
                Self::material_emission_format(),
            ),
            position_depth: make_target(
                builder,
                "GBuffer PositionDepth",
                Self::position_depth_format(),
            ),
        };

        let frame_buffer = per_frame.write(
            frame_index,
            &PerFrameData {
                view,
                proj,
                camera_pos,
            },
        );

        let pipeline = pipeline.clone();
        let sampler = sampler.clone();
        let per_object = per_object.clone();
        let per_material = per_material.clone();
        let fallbacks = fallbacks.clone();

        const CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
        builder
            .create_render_pass("GBufferPass")
            .color(0, handles.albedo_ao, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, CLEAR)
            .color(
                1,
                handles.normal_roughness,
                AttachmentLoadOp::Clear,
                AttachmentStoreOp::Store,
                CLEAR,
            )
            .color(
                2,
                handles.material_emission,
                AttachmentLoadOp::Clear,
                AttachmentStoreOp::Store,
                CLEAR,
            )
            .color(
                3,
                handles.position_depth,
                AttachmentLoadOp::Clear,
                AttachmentStoreOp::Store,
                CLEAR,
            )
            .depth_stencil(
                depth_target,
                AttachmentLoadOp::Load,
                AttachmentStoreOp::Store,
                1.0,
                0,
                false,
            )
            .execute(move |ctx| {
                let cmd = ctx.command;
                cmd.set_viewport(Offset2d::default(), extent);
                cmd.set_scissor(Offset2d::default(), extent);
                cmd.set_graphics_pipeline(&pipeline);
                cmd.bind_constant_buffer(
                    &frame_buffer,
                    0,
                    ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                );
                cmd.bind_sampler(&sampler, 0, ShaderStages::FRAGMENT);

                for (draw_index, batch) in draws.iter().enumerate() {
                    let object_offset = per_object.write(
                        draw_index as u32,
                        &PerObjectData {
                            model: batch.model_matrix,
                            inv_model: batch.inv_model_matrix,
                        },
                    );
                    cmd.bind_constant_buffer_range(
                        per_object.buffer(),
                        1,
                        ShaderStages::VERTEX,
                        object_offset,
                        per_object.stride(),
                    );

                    let material_data = batch
                        .material
                        .as_ref()
                        .map_or_else(MaterialData::default, |material| {
                            pack_material(&material.read().kind)
                        });
                    let material_offset =
                        per_material.write(draw_index as u32, &material_data);
                    cmd.bind_constant_buffer_range(
                        per_material.buffer(),
                        2,
                        ShaderStages::FRAGMENT,
                        material_offset,
                        per_material.stride(),
                    );

                    bind_material_textures(cmd, batch, &fallbacks);

                    let (Some(vertex_buffer), Some(index_buffer)) =
                        (&batch.vertex_buffer, &batch.index_buffer)
                    else {
                        continue;
                    };
                    cmd.bind_vertex_buffer(vertex_buffer, 0, 0);
                    if let Some(normal_buffer) = &batch.normal_buffer {
                        cmd.bind_vertex_buffer(normal_buffer, 1, 0);
                    }
                    if let Some(texcoord_buffer) = &batch.texcoord_buffer {
                        cmd.bind_vertex_buffer(texcoord_buffer, 2, 0);
                    }
                    cmd.bind_index_buffer(index_buffer, 0);
                    cmd.draw_indexed(batch.index_count, 1, batch.index_offset, 0, 0);
                }
            })
            .finish();

        Some(handles)
    }
}

/// Fallback textures bound to unset material slots.
#[derive(Clone)]
pub struct GBufferFallbacks {
    pub white: TextureRef,
    pub black: TextureRef,
    pub normal: TextureRef,
}

fn pack_material(kind: &MaterialKind) -> MaterialData {
    match kind {
        MaterialKind::Pbr(pbr) => MaterialData {
            albedo: pbr.albedo,
            roughness: pbr.roughness,
            metallic: pbr.metallic,
            emission: pbr.emission.w,
            alpha_clip: pbr.alpha_clip,
            specular: pbr.specular,
            use_albedo_map: f32::from(pbr.albedo_texture.is_some()),
            use_normal_map: f32::from(pbr.normal_texture.is_some()),
            use_arm_map: f32::from(pbr.arm_texture.is_some()),
            use_roughness_map: f32::from(pbr.roughness_texture.is_some()),
            use_metallic_map: f32::from(pbr.metallic_texture.is_some()),
            use_ao_map: f32::from(pbr.ao_texture.is_some()),
            use_emission_map: f32::from(pbr.emission_texture.is_some()),
            _padding: [0.0; 3],
        },
        _ => MaterialData {
            albedo: Vec4::ONE,
            roughness: 0.5,
            specular: 0.5,
            ..MaterialData::default()
        },
    }
}

/// Bind the seven material texture slots, falling back per slot.
fn bind_material_textures(
    cmd: &RhiCommandContextRef,
    batch: &DrawBatch,
    fallbacks: &GBufferFallbacks,
) {
    let material = batch.material.as_ref().map(|m| m.read());
    let pbr = material.as_ref().and_then(|m| m.as_pbr());

    let bind = |slot: u32, texture: Option<&TextureRef>, fallback: &TextureRef| {
        let rhi = texture
            .and_then(|t| t.rhi_texture())
            .or_else(|| fallback.rhi_texture());
        if let Some(rhi) = rhi {
            cmd.bind_texture(rhi, slot, ShaderStages::FRAGMENT);
        }
    };

    bind(
        0,
        pbr.and_then(|p| p.albedo_texture.as_ref()),
        &fallbacks.white,
    );
    bind(
        1,
        pbr.and_then(|p| p.normal_texture.as_ref()),
        &fallbacks.normal,
    );
    bind(2, pbr.and_then(|p| p.arm_texture.as_ref()), &fallbacks.black);
    bind(
        3,
        pbr.and_then(|p| p.roughness_texture.as_ref()),
        &fallbacks.white,
    );
    bind(
        4,
        pbr.and_then(|p| p.metallic_texture.as_ref()),
        &fallbacks.black,
    );
    bind(5, pbr.and_then(|p| p.ao_texture.as_ref()), &fallbacks.white);
    bind(
        6,
        pbr.and_then(|p| p.emission_texture.as_ref()),
        &fallbacks.black,
    );
}

impl Default for GBufferPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for GBufferPass {
    fn name(&self) -> &'static str {
        "GBufferPass"
    }

    fn pass_type(&self) -> PassType {
        PassType::GBuffer
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.pipeline.is_some()
    }
}
