//! NPR (Toon) Forward Pass
//!
//! Cel shading for NPR materials: clamped Lambert with a ramp lookup,
//! plus screen-space rim light sampled from the scene depth texture.
//! Materials carry {Lambert clamp, ramp offset, rim threshold / strength
//! / width / color, face mode}. The pass binds the scene depth at
//! texture slot 4 and a clamp sampler for ramp lookups at sampler
//! slot 1, alongside the usual albedo / normal / light-map / ramp slots.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use parking_lot::Mutex;

use crate::errors::Result;
use crate::rdg::{RdgBuilder, RdgTextureHandle};
use crate::render::scene::DrawBatch;
use crate::render::{MAX_PER_FRAME_OBJECT_SIZE, PASS_FRAMES_IN_FLIGHT};
use crate::rhi::types::{
    AddressMode, AttachmentLoadOp, AttachmentStoreOp, BindingSlot, BlendTargetState,
    CompareFunction, CullMode, DepthStencilState, Extent2d, FillMode, Offset2d, RasterizerState,
    RhiFormat, RhiGraphicsPipelineInfo, RhiRootSignatureInfo, RhiSamplerInfo, ShaderFrequency,
    ShaderStages, SubresourceRange, TextureAspect, TextureBindingSlot, TextureViewType,
    VertexElement,
};
use crate::rhi::{
    RhiBackend, RhiCommandContext, RhiGraphicsPipelineRef, RhiRootSignatureRef, RhiSamplerRef,
    RhiShaderRef,
};

use super::gbuffer::GBufferFallbacks;
use super::pbr_forward::ForwardPerFrameData;
use super::{FrameUniforms, PassInitContext, PassType, RenderPass, UniformRing};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PerObjectData {
    model: glam::Mat4,
    inv_model: glam::Mat4,
}

/// Toon material block consumed by the fragment shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct NprMaterialData {
    albedo: Vec4,
    emission: Vec4,
    /// x = lambert clamp, y = ramp offset, z = rim threshold,
    /// w = rim strength.
    toon: Vec4,
    /// rgb = rim color, w = rim width.
    rim: Vec4,
    /// x = use albedo map, y = use normal map, z = use light map,
    /// w = use ramp map.
    maps: Vec4,
    /// x = face mode.
    flags: Vec4,
}

pub struct NprForwardPass {
    vertex_shader: Option<RhiShaderRef>,
    fragment_shader: Option<RhiShaderRef>,
    root_signature: Option<RhiRootSignatureRef>,
    solid_pipeline: Option<RhiGraphicsPipelineRef>,
    wireframe_pipeline: Option<RhiGraphicsPipelineRef>,
    sampler: Option<RhiSamplerRef>,
    /// Clamp-to-edge sampler for ramp lookups.
    clamp_sampler: Option<RhiSamplerRef>,
    per_frame: Option<FrameUniforms>,
    per_object: Option<UniformRing>,
    per_material: Option<UniformRing>,
    wireframe: Mutex<bool>,
    initialized: bool,
}

impl NprForwardPass {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            root_signature: None,
            solid_pipeline: None,
            wireframe_pipeline: None,
            sampler: None,
            clamp_sampler: None,
            per_frame: None,
            per_object: None,
            per_material: None,
            wireframe: Mutex::new(false),
            initialized: false,
        }
    }

    pub fn set_wireframe(&self, enable: bool) {
        *self.wireframe.lock() = enable;
    }

    fn create_pipeline(
        &self,
        ctx: &PassInitContext<'_>,
        root_signature: &RhiRootSignatureRef,
        fill_mode: FillMode,
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
                depth_write: false,
                compare: CompareFunction::LessEqual,
            },
            blend_targets: smallvec::smallvec![BlendTargetState::default()],
            color_formats: smallvec::smallvec![ctx.hdr_format],
            depth_stencil_format: Some(ctx.depth_format),
            name,
            ..RhiGraphicsPipelineInfo::default()
        })
    }

    pub fn init(&mut self, ctx: &PassInitContext<'_>) -> Result<()> {
        log::info!("initializing NprForwardPass");
        self.vertex_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/npr_forward.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )?);
        self.fragment_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/npr_forward.wgsl",
            ShaderFrequency::Fragment,
            "fs_main",
        )?);

        // t0 albedo, t1 normal, t2 light map, t3 ramp, t4 scene depth.
        let mut textures: Vec<TextureBindingSlot> = (0..4)
            .map(|slot| TextureBindingSlot {
                slot,
                stages: ShaderStages::FRAGMENT,
                dimension: TextureViewType::D2,
                depth: false,
            })
            .collect();
        textures.push(TextureBindingSlot {
            slot: 4,
            stages: ShaderStages::FRAGMENT,
            dimension: TextureViewType::D2,
            depth: true,
        });

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
            textures,
            samplers: vec![
                BindingSlot {
                    slot: 0,
                    stages: ShaderStages::FRAGMENT,
                },
                BindingSlot {
                    slot: 1,
                    stages: ShaderStages::FRAGMENT,
                },
            ],
            name: "NprForwardPass",
        })?;

        self.sampler = Some(ctx.backend.create_sampler(&RhiSamplerInfo {
            name: "NprForward Sampler",
            ..RhiSamplerInfo::default()
        })?);
        self.clamp_sampler = Some(ctx.backend.create_sampler(&RhiSamplerInfo {
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
            name: "NprForward Clamp Sampler",
            ..RhiSamplerInfo::default()
        })?);

        self.per_frame = Some(FrameUniforms::new(
            ctx.backend,
            std::mem::size_of::<ForwardPerFrameData>() as u64,
            PASS_FRAMES_IN_FLIGHT,
            "NprForward PerFrame",
        )?);
        self.per_object = Some(UniformRing::new(
            ctx.backend,
            std::mem::size_of::<PerObjectData>() as u64,
            MAX_PER_FRAME_OBJECT_SIZE,
            "NprForward PerObject",
        )?);
        self.per_material = Some(UniformRing::new(
            ctx.backend,
            std::mem::size_of::<NprMaterialData>() as u64,
            MAX_PER_FRAME_OBJECT_SIZE,
            "NprForward PerMaterial",
        )?);

        self.solid_pipeline =
            Some(self.create_pipeline(ctx, &root_signature, FillMode::Solid, "NprForward Solid")?);
        self.wireframe_pipeline = Some(self.create_pipeline(
            ctx,
            &root_signature,
            FillMode::Wireframe,
            "NprForward Wireframe",
        )?);
        self.root_signature = Some(root_signature);
        self.initialized = true;
        Ok(())
    }

    /// Declare the pass. `depth_target` is both the read-only depth
    /// attachment and the screen-space rim source.
    pub fn build(
        &self,
        builder: &mut RdgBuilder<'_>,
        color_target: RdgTextureHandle,
        depth_target: RdgTextureHandle,
        batches: &[DrawBatch],
        frame_data: &ForwardPerFrameData,
        frame_index: u64,
        extent: Extent2d,
        fallbacks: &GBufferFallbacks,
    ) {
        if !self.is_ready() || batches.is_empty() {
            return;
        }
        let (
            Some(sampler),
            Some(clamp_sampler),
            Some(per_frame),
            Some(per_object),
            Some(per_material),
        ) = (
            &self.sampler,
            &self.clamp_sampler,
            &self.per_frame,
            &self.per_object,
            &self.per_material,
        )
        else {
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
        let clamp_sampler = clamp_sampler.clone();
        let per_object = per_object.clone();
        let per_material = per_material.clone();
        let fallbacks = fallbacks.clone();

        builder
            .create_render_pass("NprForwardPass")
            .color(
                0,
                color_target,
                AttachmentLoadOp::Load,
                AttachmentStoreOp::Store,
                [0.0, 0.0, 0.0, 1.0],
            )
            .depth_stencil(
                depth_target,
                AttachmentLoadOp::Load,
                AttachmentStoreOp::Store,
                1.0,
                0,
                true,
            )
            .read(depth_target, SubresourceRange::all(TextureAspect::Depth))
            .execute(move |ctx| {
                let depth_view = ctx.view(depth_target).cloned();
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
                cmd.bind_sampler(&clamp_sampler, 1, ShaderStages::FRAGMENT);

                // Scene depth for the screen-space rim term.
                if let Some(depth_view) = &depth_view {
                    cmd.bind_texture_view(depth_view, 4, ShaderStages::FRAGMENT);
                } else if let Some(black) = fallbacks.black.rhi_texture() {
                    cmd.bind_texture(black, 4, ShaderStages::FRAGMENT);
                }

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
                    let npr = material.as_ref().and_then(|m| m.as_npr());
                    let material_data = npr.map_or_else(NprMaterialData::default, |npr| {
                        NprMaterialData {
                            albedo: npr.albedo,
                            emission: npr.emission,
                            toon: Vec4::new(
                                npr.lambert_clamp,
                                npr.ramp_offset,
                                npr.rim_threshold,
                                npr.rim_strength,
                            ),
                            rim: npr.rim_color.extend(npr.rim_width),
                            maps: Vec4::new(
                                f32::from(npr.albedo_texture.is_some()),
                                f32::from(npr.normal_texture.is_some()),
                                f32::from(npr.light_map_texture.is_some()),
                                f32::from(npr.ramp_texture.is_some()),
                            ),
                            flags: Vec4::new(f32::from(npr.face_mode), 0.0, 0.0, 0.0),
                        }
                    });
                    let material_offset = per_material.write(draw_index as u32, &material_data);
                    cmd.bind_constant_buffer_range(
                        per_material.buffer(),
                        2,
                        ShaderStages::FRAGMENT,
                        material_offset,
                        per_material.stride(),
                    );

                    let bind = |slot: u32,
                                texture: Option<&crate::render::resource::texture::TextureRef>,
                                fallback: &crate::render::resource::texture::TextureRef| {
                        let rhi = texture
                            .and_then(|t| t.rhi_texture())
                            .or_else(|| fallback.rhi_texture());
                        if let Some(rhi) = rhi {
                            cmd.bind_texture(rhi, slot, ShaderStages::FRAGMENT);
                        }
                    };
                    bind(0, npr.and_then(|n| n.albedo_texture.as_ref()), &fallbacks.white);
                    bind(1, npr.and_then(|n| n.normal_texture.as_ref()), &fallbacks.normal);
                    bind(2, npr.and_then(|n| n.light_map_texture.as_ref()), &fallbacks.white);
                    bind(3, npr.and_then(|n| n.ramp_texture.as_ref()), &fallbacks.white);

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

impl Default for NprForwardPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for NprForwardPass {
    fn name(&self) -> &'static str {
        "NprForwardPass"
    }

    fn pass_type(&self) -> PassType {
        PassType::Forward
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.solid_pipeline.is_some()
    }
}
