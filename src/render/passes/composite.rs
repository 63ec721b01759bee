//! Composite Pass
//!
//! Final resolve of the HDR lighting target into the back buffer: a
//! full-screen triangle sampling the HDR texture with a Reinhard-style
//! range compression so LDR surfaces stay faithful while highlights
//! roll off instead of clipping.

use crate::errors::Result;
use crate::rdg::{RdgBuilder, RdgTextureHandle};
use crate::rhi::types::{
    AddressMode, AttachmentLoadOp, AttachmentStoreOp, BindingSlot, BlendTargetState,
    CompareFunction, DepthStencilState, Extent2d, FilterMode, Offset2d, RhiGraphicsPipelineInfo,
    RhiRootSignatureInfo, RhiSamplerInfo, ShaderFrequency, ShaderStages, SubresourceRange,
    TextureAspect, TextureBindingSlot, TextureViewType,
};
use crate::rhi::{
    RhiBackend, RhiCommandContext, RhiGraphicsPipelineRef, RhiRootSignatureRef, RhiSamplerRef,
    RhiShaderRef,
};

use super::{PassInitContext, PassType, RenderPass};

pub struct CompositePass {
    vertex_shader: Option<RhiShaderRef>,
    fragment_shader: Option<RhiShaderRef>,
    root_signature: Option<RhiRootSignatureRef>,
    pipeline: Option<RhiGraphicsPipelineRef>,
    sampler: Option<RhiSamplerRef>,
    initialized: bool,
}

impl CompositePass {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            root_signature: None,
            pipeline: None,
            sampler: None,
            initialized: false,
        }
    }

    pub fn init(&mut self, ctx: &PassInitContext<'_>) -> Result<()> {
        log::info!("initializing CompositePass");
        self.vertex_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/composite.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )?);
        self.fragment_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/composite.wgsl",
            ShaderFrequency::Fragment,
            "fs_main",
        )?);

        let root_signature = ctx.backend.create_root_signature(&RhiRootSignatureInfo {
            constant_buffers: Vec::new(),
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
            name: "CompositePass",
        })?;

        self.sampler = Some(ctx.backend.create_sampler(&RhiSamplerInfo {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
            name: "Composite Sampler",
            ..RhiSamplerInfo::default()
        })?);

        let pipeline = ctx.backend.create_graphics_pipeline(&RhiGraphicsPipelineInfo {
            vertex_shader: self.vertex_shader.clone(),
            fragment_shader: self.fragment_shader.clone(),
            root_signature: Some(root_signature.clone()),
            vertex_elements: Vec::new(),
            depth_stencil: DepthStencilState {
                depth_test: false,
                depth_write: false,
                compare: CompareFunction::Always,
            },
            blend_targets: smallvec::smallvec![BlendTargetState::default()],
            color_formats: smallvec::smallvec![ctx.color_format],
            depth_stencil_format: None,
            name: "CompositePass",
            ..RhiGraphicsPipelineInfo::default()
        })?;

        self.root_signature = Some(root_signature);
        self.pipeline = Some(pipeline);
        self.initialized = true;
        Ok(())
    }

    /// Resolve `hdr_source` into `back_buffer`.
    pub fn build(
        &self,
        builder: &mut RdgBuilder<'_>,
        back_buffer: RdgTextureHandle,
        hdr_source: RdgTextureHandle,
        extent: Extent2d,
    ) {
        if !self.is_ready() {
            return;
        }
        let (Some(pipeline), Some(sampler)) = (&self.pipeline, &self.sampler) else {
            return;
        };
        let pipeline = pipeline.clone();
        let sampler = sampler.clone();

        builder
            .create_render_pass("CompositePass")
            .color(
                0,
                back_buffer,
                AttachmentLoadOp::Clear,
                AttachmentStoreOp::Store,
                [0.0, 0.0, 0.0, 1.0],
            )
            .read(hdr_source, SubresourceRange::all(TextureAspect::Color))
            .execute(move |ctx| {
                let hdr_view = ctx.view(hdr_source).cloned();
                let cmd = ctx.command;
                cmd.set_viewport(Offset2d::default(), extent);
                cmd.set_scissor(Offset2d::default(), extent);
                cmd.set_graphics_pipeline(&pipeline);
                if let Some(hdr_view) = &hdr_view {
                    cmd.bind_texture_view(hdr_view, 0, ShaderStages::FRAGMENT);
                }
                cmd.bind_sampler(&sampler, 0, ShaderStages::FRAGMENT);
                cmd.draw(3, 1, 0, 0);
            })
            .finish();
    }
}

impl Default for CompositePass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for CompositePass {
    fn name(&self) -> &'static str {
        "CompositePass"
    }

    fn pass_type(&self) -> PassType {
        PassType::Composite
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.pipeline.is_some()
    }
}
