//! Deferred Lighting Pass
//!
//! Full-screen pass with no vertex input: the vertex shader synthesizes
//! a clip-space triangle from the vertex index. Reads the four G-buffer
//! targets, reconstructs world position from depth via the inverse
//! view-projection, and shades with the metallic-roughness BRDF
//! (Lambert diffuse + GGX/Smith specular). Additional point lights are
//! accumulated additively after the main directional light.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::errors::Result;
use crate::rdg::{RdgBuilder, RdgTextureHandle};
use crate::render::PASS_FRAMES_IN_FLIGHT;
use crate::rhi::types::{
    AttachmentLoadOp, AttachmentStoreOp, BindingSlot, BlendTargetState, CompareFunction,
    DepthStencilState, Extent2d, Offset2d, RhiGraphicsPipelineInfo, RhiRootSignatureInfo,
    RhiSamplerInfo, AddressMode, FilterMode, ShaderFrequency, ShaderStages, SubresourceRange,
    TextureAspect, TextureBindingSlot, TextureViewType,
};
use crate::rhi::{
    RhiBackend, RhiCommandContext, RhiGraphicsPipelineRef, RhiRootSignatureRef, RhiSamplerRef,
    RhiShaderRef,
};

use super::gbuffer::GBufferOutputHandles;
use super::{FrameUniforms, PassInitContext, PassType, RenderPass};

/// Bounded list of additional lights shaded per frame.
pub const MAX_LIGHTS: usize = 32;

/// One additional light (point or spot) in the lighting CBV.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ShaderLightData {
    /// xyz = world position, w = range.
    pub position: Vec4,
    /// rgb = color, w = intensity.
    pub color: Vec4,
    /// xyz = direction (spot), w = light type (0 directional, 1 point,
    /// 2 spot).
    pub direction: Vec4,
    /// x = inner cone cosine, y = outer cone cosine.
    pub cone: Vec4,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct LightingPerFrameData {
    /// xyz = camera position, w = light count.
    pub camera_pos: Vec4,
    /// xyz = main light travel direction.
    pub main_light_dir: Vec4,
    /// rgb = main light color, w = intensity.
    pub main_light_color: Vec4,
    /// Reconstructs world position from depth.
    pub inv_view_proj: Mat4,
    pub lights: [ShaderLightData; MAX_LIGHTS],
}

pub struct DeferredLightingPass {
    vertex_shader: Option<RhiShaderRef>,
    fragment_shader: Option<RhiShaderRef>,
    root_signature: Option<RhiRootSignatureRef>,
    pipeline: Option<RhiGraphicsPipelineRef>,
    sampler: Option<RhiSamplerRef>,
    per_frame: Option<FrameUniforms>,
    initialized: bool,
}

impl DeferredLightingPass {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            root_signature: None,
            pipeline: None,
            sampler: None,
            per_frame: None,
            initialized: false,
        }
    }

    pub fn init(&mut self, ctx: &PassInitContext<'_>) -> Result<()> {
        log::info!("initializing DeferredLightingPass");
        self.vertex_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/deferred_lighting.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )?);
        self.fragment_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/deferred_lighting.wgsl",
            ShaderFrequency::Fragment,
            "fs_main",
        )?);

        let root_signature = ctx.backend.create_root_signature(&RhiRootSignatureInfo {
            constant_buffers: vec![BindingSlot {
                slot: 0,
                stages: ShaderStages::FRAGMENT,
            }],
            textures: (0..4)
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
            name: "DeferredLightingPass",
        })?;

        self.sampler = Some(ctx.backend.create_sampler(&RhiSamplerInfo {
            min_filter: FilterMode::Nearest,
            mag_filter: FilterMode::Nearest,
            mip_mode: FilterMode::Nearest,
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
            name: "GBuffer Read Sampler",
            ..RhiSamplerInfo::default()
        })?);

        self.per_frame = Some(FrameUniforms::new(
            ctx.backend,
            std::mem::size_of::<LightingPerFrameData>() as u64,
            PASS_FRAMES_IN_FLIGHT,
            "DeferredLighting PerFrame",
        )?);

        let pipeline = ctx.backend.create_graphics_pipeline(&RhiGraphicsPipelineInfo {
            vertex_shader: self.vertex_shader.clone(),
            fragment_shader: self.fragment_shader.clone(),
            root_signature: Some(root_signature.clone()),
            // No vertex input: triangle synthesized from the vertex id.
            vertex_elements: Vec::new(),
            depth_stencil: DepthStencilState {
                depth_test: false,
                depth_write: false,
                compare: CompareFunction::Always,
            },
            blend_targets: smallvec::smallvec![BlendTargetState::default()],
            color_formats: smallvec::smallvec![ctx.hdr_format],
            depth_stencil_format: None,
            name: "DeferredLightingPass",
            ..RhiGraphicsPipelineInfo::default()
        })?;

        self.root_signature = Some(root_signature);
        self.pipeline = Some(pipeline);
        self.initialized = true;
        Ok(())
    }

    /// Declare the pass: clears `hdr_target` and shades it from the
    /// G-buffer.
    pub fn build(
        &self,
        builder: &mut RdgBuilder<'_>,
        hdr_target: RdgTextureHandle,
        gbuffer: &GBufferOutputHandles,
        frame_data: &LightingPerFrameData,
        frame_index: u64,
        extent: Extent2d,
    ) {
        if !self.is_ready() {
            return;
        }
        let (Some(pipeline), Some(sampler), Some(per_frame)) =
            (&self.pipeline, &self.sampler, &self.per_frame)
        else {
            return;
        };

        let frame_buffer = per_frame.write(frame_index, frame_data);
        let pipeline = pipeline.clone();
        let sampler = sampler.clone();
        let gbuffer = *gbuffer;
        let color_range = SubresourceRange::all(TextureAspect::Color);

        builder
            .create_render_pass("DeferredLightingPass")
            .color(
                0,
                hdr_target,
                AttachmentLoadOp::Clear,
                AttachmentStoreOp::Store,
                [0.0, 0.0, 0.0, 1.0],
            )
            .read(gbuffer.albedo_ao, color_range)
            .read(gbuffer.normal_roughness, color_range)
            .read(gbuffer.material_emission, color_range)
            .read(gbuffer.position_depth, color_range)
            .execute(move |ctx| {
                let views = [
                    ctx.view(gbuffer.albedo_ao).cloned(),
                    ctx.view(gbuffer.normal_roughness).cloned(),
                    ctx.view(gbuffer.material_emission).cloned(),
                    ctx.view(gbuffer.position_depth).cloned(),
                ];
                let cmd = ctx.command;
                cmd.set_viewport(Offset2d::default(), extent);
                cmd.set_scissor(Offset2d::default(), extent);
                cmd.set_graphics_pipeline(&pipeline);
                cmd.bind_constant_buffer(&frame_buffer, 0, ShaderStages::FRAGMENT);
                cmd.bind_sampler(&sampler, 0, ShaderStages::FRAGMENT);
                for (slot, view) in views.iter().enumerate() {
                    if let Some(view) = view {
                        cmd.bind_texture_view(view, slot as u32, ShaderStages::FRAGMENT);
                    }
                }
                cmd.draw(3, 1, 0, 0);
            })
            .finish();
    }
}

impl Default for DeferredLightingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for DeferredLightingPass {
    fn name(&self) -> &'static str {
        "DeferredLightingPass"
    }

    fn pass_type(&self) -> PassType {
        PassType::DeferredLighting
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.pipeline.is_some()
    }
}
