//! PBR Forward Pass
//!
//! Shades forward-path batches directly into the color target with the
//! same metallic-roughness model and material slot layout as the
//! G-buffer path. Supports runtime toggling between solid and wireframe
//! pipelines.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use parking_lot::Mutex;

use crate::errors::Result;
use crate::rdg::{RdgBuilder, RdgTextureHandle};
use crate::render::scene::DrawBatch;
use crate::render::{MAX_PER_FRAME_OBJECT_SIZE, PASS_FRAMES_IN_FLIGHT};
use crate::rhi::types::{
    AttachmentLoadOp, AttachmentStoreOp, BindingSlot, BlendTargetState, CompareFunction,
    CullMode, DepthStencilState, Extent2d, FillMode, Offset2d, RasterizerState, RhiFormat,
    RhiGraphicsPipelineInfo, RhiRootSignatureInfo, RhiSamplerInfo, ShaderFrequency, ShaderStages,
    TextureBindingSlot, TextureViewType, VertexElement,
};
use crate::rhi::{
    RhiBackend, RhiCommandContext, RhiGraphicsPipelineRef, RhiRootSignatureRef, RhiSamplerRef,
    RhiShaderRef,
};

use super::gbuffer::GBufferFallbacks;
use super::{FrameUniforms, PassInitContext, PassType, RenderPass, UniformRing};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ForwardPerFrameData {
    pub view: Mat4,
    pub proj: Mat4,
    /// xyz = camera position.
    pub camera_pos: Vec4,
    /// xyz = main light travel direction.
    pub light_dir: Vec4,
    /// rgb = light color, w = intensity.
    pub light_color: Vec4,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PerObjectData {
    model: Mat4,
    inv_model: Mat4,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct MaterialData {
    albedo: Vec4,
    emission: Vec4,
    /// x = roughness, y = metallic, z = alpha clip, w = specular.
    surface: Vec4,
    /// x = use albedo map, y = use normal map, z = use arm map.
    maps: Vec4,
}

pub struct PbrForwardPass {
    vertex_shader: Option<RhiShaderRef>,
    fragment_shader: Option<RhiShaderRef>,
    root_signature: Option<RhiRootSignatureRef>,
    solid_pipeline: Option<RhiGraphicsPipelineRef>,
    wireframe_pipeline: Option<RhiGraphicsPipelineRef>,
    sampler: Option<RhiSamplerRef>,
    per_frame: Option<FrameUniforms>,
    per_object: Option<UniformRing>,
    per_material: Option<UniformRing>,
    wireframe: Mutex<bool>,
    initialized: bool,
}

impl PbrForwardPass {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            root_signature: None,
            solid_pipeline: None,
            wireframe_pipeline: None,
            sampler: None,
            per_frame: None,
            per_object: None,
            per_material: None,
            wireframe: Mutex::new(false),
            initialized: false,
        }
    }

    /// Toggle between the solid and wireframe pipelines.
    pub fn set_wireframe(&self, enable: bool) {
        *self.wireframe.lock() = enable;
    }

    fn create_pipeline(
        &self,
        ctx: &PassInitContext<'_>,
        root_signature: &RhiRootSignatureRef,
        fill_mode: FillMode,
        color_format: RhiFormat,
        name: &'static str,
    ) -> Result<RhiGraphicsPipelineRef> {
        ctx.backend.create_graphics_pipeline(&RhiGraphicsPipelineInfo {
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
            rasterizer: RasterizerState {
                cull_mode: CullMode::Back,
                fill_mode,
                depth_clip: true,
            },
            depth_stencil: DepthStencilState {
                depth_test: true,
                depth_write: true,
                compare: CompareFunction::LessEqual,
            },
            blend_targets: smallvec::smallvec![BlendTargetState::default()],
            color_formats: smallvec::smallvec![color_format],
            depth_stencil_format: Some(ctx.depth_format),
            name,
            ..RhiGraphicsPipelineInfo::default()
        })
    }

    pub fn init(&mut self, ctx: &PassInitContext<'_>) -> Result<()> {
        log::info!("initializing PbrForwardPass");
        self.vertex_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/pbr_forward.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )?);
        self.fragment_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/pbr_forward.wgsl",
            ShaderFrequency::Fragment,
            "fs_main",
        )?);

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
            textures: (0..3)
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
            name: "PbrForwardPass",
        })?;

        self.sampler = Some(ctx.backend.create_sampler(&RhiSamplerInfo {
            max_anisotropy: 16.0,
            name: "PbrForward Sampler",
            ..RhiSamplerInfo::default()
        })?);
        self.per_frame = Some(FrameUniforms::new(
            ctx.backend,
            std::mem::size_of::<ForwardPerFrameData>() as u64,
            PASS_FRAMES_IN_FLIGHT,
            "PbrForward PerFrame",
        )?);
        self.per_object = Some(UniformRing::new(
            ctx.backend,
            std::mem::size_of::<PerObjectData>() as u64,
            MAX_PER_FRAME_OBJECT_SIZE,
            "PbrForward PerObject",
        )?);
        self.per_material = Some(UniformRing::new(
            ctx.backend,
            std::mem::size_of::<MaterialData>() as u64,
            MAX_PER_FRAME_OBJECT_SIZE,
            "PbrForward PerMaterial",
        )?);

        self.solid_pipeline = Some(self.create_pipeline(
            ctx,
            &root_signature,
            FillMode::Solid,
            ctx.hdr_format,
            "PbrForward Solid",
        )?);
        self.wireframe_pipeline = Some(self.create_pipeline(
            ctx,
            &root_signature,
            FillMode::Wireframe,
            ctx.hdr_format,
            "PbrForward Wireframe",
        )?);
        self.root_signature = Some(root_signature);
        self.initialized = true;
        Ok(())
    }

    /// Declare the pass over `color_target` (LOAD when compositing over
    /// earlier passes, CLEAR when standalone).
    pub fn build(
        &self,
        builder: &mut RdgBuilder<'_>,
        color_target: RdgTextureHandle,
        depth_target: RdgTextureHandle,
        batches: &[DrawBatch],
        frame_data: &ForwardPerFrameData,
        frame_index: u64,
        extent: Extent2d,
        color_load: AttachmentLoadOp,
        fallbacks: &GBufferFallbacks,
    ) {
        if !self.is_ready() || batches.is_empty() {
            return;
        }
        let (Some(sampler), Some(per_frame), Some(per_object), Some(per_material)) = (
            &self.sampler,
            &self.per_frame,
            &self.per_object,
            &self.per_material,
        ) else {
            return;
        };
        let pipeline = if *self.wireframe.lock() {
            self.wireframe_pipeline.clone()
        } else {
            self.solid_pipeline.clone()
        };
        let Some(pipeline) = pipeline else { return };

        let frame_buffer = per_frame.write(frame_index, frame_data);
        let draws: Vec<DrawBatch> = batches.to_vec();
        let sampler = sampler.clone();
        let per_object = per_object.clone();
        let per_material = per_material.clone();
        let fallbacks = fallbacks.clone();

        builder
            .create_render_pass("PbrForwardPass")
            .color(
                0,
                color_target,
                color_load,
                AttachmentStoreOp::Store,
                [0.0, 0.0, 0.0, 1.0],
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

                    let material = batch.material.as_ref().map(|m| m.read());
                    let pbr = material.as_ref().and_then(|m| m.as_pbr());
                    let material_data = pbr.map_or_else(MaterialData::default, |pbr| MaterialData {
                        albedo: pbr.albedo,
                        emission: pbr.emission,
                        surface: Vec4::new(
                            pbr.roughness,
                            pbr.metallic,
                            pbr.alpha_clip,
                            pbr.specular,
                        ),
                        maps: Vec4::new(
                            f32::from(pbr.albedo_texture.is_some()),
                            f32::from(pbr.normal_texture.is_some()),
                            f32::from(pbr.arm_texture.is_some()),
                            0.0,
                        ),
                    });
                    let material_offset = per_material.write(draw_index as u32, &material_data);
                    cmd.bind_constant_buffer_range(
                        per_material.buffer(),
                        2,
                        ShaderStages::FRAGMENT,
                        material_offset,
                        per_material.stride(),
                    );

                    let bind = |slot: u32, texture: Option<&crate::render::resource::texture::TextureRef>, fallback: &crate::render::resource::texture::TextureRef| {
                        let rhi = texture
                            .and_then(|t| t.rhi_texture())
                            .or_else(|| fallback.rhi_texture());
                        if let Some(rhi) = rhi {
                            cmd.bind_texture(rhi, slot, ShaderStages::FRAGMENT);
                        }
                    };
                    bind(0, pbr.and_then(|p| p.albedo_texture.as_ref()), &fallbacks.white);
                    bind(1, pbr.and_then(|p| p.normal_texture.as_ref()), &fallbacks.normal);
                    bind(2, pbr.and_then(|p| p.arm_texture.as_ref()), &fallbacks.black);

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
    }
}

impl Default for PbrForwardPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for PbrForwardPass {
    fn name(&self) -> &'static str {
        "PbrForwardPass"
    }

    fn pass_type(&self) -> PassType {
        PassType::Forward
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.solid_pipeline.is_some()
    }
}
