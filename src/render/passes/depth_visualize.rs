//! Depth Visualize Pass
//!
//! Debug overlay: samples a depth texture, linearizes it with the
//! camera's near and far planes, and writes a grayscale color target.
//! Not part of the main frame path; wired on demand by tools and tests.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::errors::Result;
use crate::rdg::{RdgBuilder, RdgTextureHandle};
use crate::render::PASS_FRAMES_IN_FLIGHT;
use crate::rhi::types::{
    AttachmentLoadOp, AttachmentStoreOp, BindingSlot, BlendTargetState, CompareFunction,
    DepthStencilState, Extent2d, Offset2d, RhiGraphicsPipelineInfo, RhiRootSignatureInfo,
    ShaderFrequency, ShaderStages, SubresourceRange, TextureAspect, TextureBindingSlot,
    TextureViewType,
};
use crate::rhi::{
    RhiBackend, RhiCommandContext, RhiGraphicsPipelineRef, RhiRootSignatureRef, RhiShaderRef,
};

use super::{FrameUniforms, PassInitContext, PassType, RenderPass};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct VisualizeParams {
    /// x = near plane, y = far plane.
    planes: Vec4,
}

pub struct DepthVisualizePass {
    vertex_shader: Option<RhiShaderRef>,
    fragment_shader: Option<RhiShaderRef>,
    root_signature: Option<RhiRootSignatureRef>,
    pipeline: Option<RhiGraphicsPipelineRef>,
    params: Option<FrameUniforms>,
    initialized: bool,
}

impl DepthVisualizePass {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            root_signature: None,
            pipeline: None,
            params: None,
            initialized: false,
        }
    }

    pub fn init(&mut self, ctx: &PassInitContext<'_>) -> Result<()> {
        log::info!("initializing DepthVisualizePass");
        self.vertex_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/depth_visualize.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )?);
        self.fragment_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/depth_visualize.wgsl",
            ShaderFrequency::Fragment,
            "fs_main",
        )?);

        let root_signature = ctx.backend.create_root_signature(&RhiRootSignatureInfo {
            constant_buffers: vec![BindingSlot {
                slot: 0,
                stages: ShaderStages::FRAGMENT,
            }],
            textures: vec![TextureBindingSlot {
                slot: 0,
                stages: ShaderStages::FRAGMENT,
                dimension: TextureViewType::D2,
                depth: true,
            }],
            samplers: Vec::new(),
            name: "DepthVisualizePass",
        })?;

        self.params = Some(FrameUniforms::new(
            ctx.backend,
            std::mem::size_of::<VisualizeParams>() as u64,
            PASS_FRAMES_IN_FLIGHT,
            "DepthVisualize Params",
        )?);

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
            name: "DepthVisualizePass",
            ..RhiGraphicsPipelineInfo::default()
        })?;

        self.root_signature = Some(root_signature);
        self.pipeline = Some(pipeline);
        self.initialized = true;
        Ok(())
    }

    /// Visualize `depth_source` into `color_target`, linearized with
    /// `(near_plane, far_plane)`.
    pub fn build(
        &self,
        builder: &mut RdgBuilder<'_>,
        color_target: RdgTextureHandle,
        depth_source: RdgTextureHandle,
        near_plane: f32,
        far_plane: f32,
        frame_index: u64,
        extent: Extent2d,
    ) {
        if !self.is_ready() {
            return;
        }
        let (Some(pipeline), Some(params)) = (&self.pipeline, &self.params) else {
            return;
        };
        let params_buffer = params.write(
            frame_index,
            &VisualizeParams {
                planes: Vec4::new(near_plane, far_plane, 0.0, 0.0),
            },
        );
        let pipeline = pipeline.clone();

        builder
            .create_render_pass("DepthVisualizePass")
            .color(
                0,
                color_target,
                AttachmentLoadOp::Clear,
                AttachmentStoreOp::Store,
                [0.0, 0.0, 0.0, 1.0],
            )
            .read(depth_source, SubresourceRange::all(TextureAspect::Depth))
            .execute(move |ctx| {
                let depth_view = ctx.view(depth_source).cloned();
                let cmd = ctx.command;
                cmd.set_viewport(Offset2d::default(), extent);
                cmd.set_scissor(Offset2d::default(), extent);
                cmd.set_graphics_pipeline(&pipeline);
                cmd.bind_constant_buffer(&params_buffer, 0, ShaderStages::FRAGMENT);
                if let Some(depth_view) = &depth_view {
                    cmd.bind_texture_view(depth_view, 0, ShaderStages::FRAGMENT);
                }
                cmd.draw(3, 1, 0, 0);
            })
            .finish();
    }
}

impl Default for DepthVisualizePass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for DepthVisualizePass {
    fn name(&self) -> &'static str {
        "DepthVisualizePass"
    }

    fn pass_type(&self) -> PassType {
        PassType::DepthVisualize
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.pipeline.is_some()
    }
}
