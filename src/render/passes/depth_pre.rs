//! Depth Pre-Pass
//!
//! Writes scene depth before any shading pass so the G-buffer and
//! forward passes can run with `Load` + `LessEqual` and zero overdraw on
//! expensive fragments. Color writes are fully masked; only batches
//! whose material opts into the depth pass are drawn.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::errors::Result;
use crate::rdg::{RdgBuilder, RdgTextureHandle};
use crate::render::scene::DrawBatch;
use crate::render::{MAX_PER_FRAME_OBJECT_SIZE, PASS_FRAMES_IN_FLIGHT};
use crate::rhi::types::{
    AttachmentLoadOp, AttachmentStoreOp, BindingSlot, CompareFunction, DepthStencilState,
    Extent2d, Offset2d, RasterizerState, RhiFormat, RhiGraphicsPipelineInfo, RhiRootSignatureInfo,
    ShaderFrequency, ShaderStages, VertexElement,
};
use crate::rhi::{
    RhiBackend, RhiCommandContext, RhiGraphicsPipelineRef, RhiRootSignatureRef, RhiShaderRef,
};

use super::{FrameUniforms, PassInitContext, PassType, RenderPass, UniformRing};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct PerFrameData {
    view: Mat4,
    proj: Mat4,
    /// xyz = camera position.
    camera_pos: Vec4,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PerObjectData {
    model: Mat4,
    inv_model: Mat4,
}

pub struct DepthPrePass {
    vertex_shader: Option<RhiShaderRef>,
    fragment_shader: Option<RhiShaderRef>,
    root_signature: Option<RhiRootSignatureRef>,
    pipeline: Option<RhiGraphicsPipelineRef>,
    per_frame: Option<FrameUniforms>,
    per_object: Option<UniformRing>,
    initialized: bool,
}

impl DepthPrePass {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            root_signature: None,
            pipeline: None,
            per_frame: None,
            per_object: None,
            initialized: false,
        }
    }

    pub fn init(&mut self, ctx: &PassInitContext<'_>) -> Result<()> {
        log::info!("initializing DepthPrePass");
        self.vertex_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/depth_pre.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )?);
        self.fragment_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/depth_pre.wgsl",
            ShaderFrequency::Fragment,
            "fs_main",
        )?);

        let root_signature = ctx.backend.create_root_signature(&RhiRootSignatureInfo {
            constant_buffers: vec![
                BindingSlot {
                    slot: 0,
                    stages: ShaderStages::VERTEX,
                },
                BindingSlot {
                    slot: 1,
                    stages: ShaderStages::VERTEX,
                },
            ],
            textures: Vec::new(),
            samplers: Vec::new(),
            name: "DepthPrePass",
        })?;

        self.per_frame = Some(FrameUniforms::new(
            ctx.backend,
            std::mem::size_of::<PerFrameData>() as u64,
            PASS_FRAMES_IN_FLIGHT,
            "DepthPre PerFrame",
        )?);
        self.per_object = Some(UniformRing::new(
            ctx.backend,
            std::mem::size_of::<PerObjectData>() as u64,
            MAX_PER_FRAME_OBJECT_SIZE,
            "DepthPre PerObject",
        )?);

        let pipeline = ctx.backend.create_graphics_pipeline(&RhiGraphicsPipelineInfo {
            vertex_shader: self.vertex_shader.clone(),
            fragment_shader: self.fragment_shader.clone(),
            root_signature: Some(root_signature.clone()),
            vertex_elements: vec![VertexElement {
                stream_index: 0,
                location: 0,
                format: RhiFormat::Rgb32Float,
                offset: 0,
                stride: 0,
            }],
            rasterizer: RasterizerState::default(),
            depth_stencil: DepthStencilState {
                depth_test: true,
                depth_write: true,
                compare: CompareFunction::Less,
            },
            // Depth only; no color attachment, no blending.
            depth_stencil_format: Some(ctx.depth_format),
            name: "DepthPrePass",
            ..RhiGraphicsPipelineInfo::default()
        })?;

        self.root_signature = Some(root_signature);
        self.pipeline = Some(pipeline);
        self.initialized = true;
        Ok(())
    }

    /// Declare the pass: clears and fills `depth_target`.
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
    ) {
        if !self.is_ready() {
            return;
        }
        let (Some(pipeline), Some(per_frame), Some(per_object)) =
            (&self.pipeline, &self.per_frame, &self.per_object)
        else {
            return;
        };

        let frame_buffer = per_frame.write(
            frame_index,
            &PerFrameData {
                view,
                proj,
                camera_pos,
            },
        );

        let draws: Vec<DrawBatch> = batches
            .iter()
            .filter(|batch| {
                batch
                    .material
                    .as_ref()
                    .is_none_or(|m| m.read().common.use_for_depth_pass)
            })
            .cloned()
            .collect();
        if draws.is_empty() {
            return;
        }

        let pipeline = pipeline.clone();
        let per_object = per_object.clone();
        let object_stride = per_object.stride();

        builder
            .create_render_pass("DepthPrePass")
            .depth_stencil(
                depth_target,
                AttachmentLoadOp::Clear,
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
                cmd.bind_constant_buffer(&frame_buffer, 0, ShaderStages::VERTEX);

                for (draw_index, batch) in draws.iter().enumerate() {
                    let offset = per_object.write(
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
                        offset,
                        object_stride,
                    );

                    let (Some(vertex_buffer), Some(index_buffer)) =
                        (&batch.vertex_buffer, &batch.index_buffer)
                    else {
                        continue;
                    };
                    cmd.bind_vertex_buffer(vertex_buffer, 0, 0);
                    cmd.bind_index_buffer(index_buffer, 0);
                    cmd.draw_indexed(batch.index_count, 1, batch.index_offset, 0, 0);
                }
            })
            .finish();
    }
}

impl Default for DepthPrePass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for DepthPrePass {
    fn name(&self) -> &'static str {
        "DepthPrePass"
    }

    fn pass_type(&self) -> PassType {
        PassType::Depth
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.pipeline.is_some()
    }
}
