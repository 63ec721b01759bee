//! Skybox Pass
//!
//! Draws a unit cube centered on the camera; the vertex shader zeroes
//! the view translation so the cube never parallaxes, and the pipeline
//! tests depth with `LessEqual` without writing, so sky appears only at
//! the far plane. The fragment shader samples the skybox material's
//! cube texture scaled by its intensity.
//!
//! Precondition: the material's cube texture has been generated
//! (`ensure_cube_texture_ready`).

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::errors::Result;
use crate::rdg::{RdgBuilder, RdgTextureHandle};
use crate::render::PASS_FRAMES_IN_FLIGHT;
use crate::render::resource::material::MaterialRef;
use crate::rhi::types::{
    AddressMode, AttachmentLoadOp, AttachmentStoreOp, BindingSlot, BlendTargetState,
    BufferCreation, BufferUsage, CompareFunction, CullMode, DepthStencilState, Extent2d, FillMode,
    MemoryUsage, Offset2d, RasterizerState, RhiBufferInfo, RhiFormat, RhiGraphicsPipelineInfo,
    RhiRootSignatureInfo, RhiSamplerInfo, ShaderFrequency, ShaderStages, TextureBindingSlot,
    TextureViewType, VertexElement,
};
use crate::rhi::{
    RhiBackend, RhiBuffer, RhiBufferRef, RhiCommandContext, RhiGraphicsPipelineRef,
    RhiRootSignatureRef, RhiSamplerRef, RhiShaderRef,
};

use super::{FrameUniforms, PassInitContext, PassType, RenderPass};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct PerFrameData {
    /// View matrix with its translation removed.
    view_no_translation: Mat4,
    proj: Mat4,
    /// x = intensity.
    params: Vec4,
}

const CUBE_VERTEX_COUNT: u32 = 36;

/// Positions of a unit cube as a triangle list, faces wound to be
/// visible from the inside.
fn cube_positions() -> [Vec3; CUBE_VERTEX_COUNT as usize] {
    let p = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
    [
        // -Z
        p(-1.0, -1.0, -1.0), p(1.0, -1.0, -1.0), p(1.0, 1.0, -1.0),
        p(1.0, 1.0, -1.0), p(-1.0, 1.0, -1.0), p(-1.0, -1.0, -1.0),
        // +Z
        p(-1.0, -1.0, 1.0), p(1.0, 1.0, 1.0), p(1.0, -1.0, 1.0),
        p(1.0, 1.0, 1.0), p(-1.0, -1.0, 1.0), p(-1.0, 1.0, 1.0),
        // -X
        p(-1.0, 1.0, 1.0), p(-1.0, -1.0, -1.0), p(-1.0, 1.0, -1.0),
        p(-1.0, 1.0, 1.0), p(-1.0, -1.0, 1.0), p(-1.0, -1.0, -1.0),
        // +X
        p(1.0, 1.0, 1.0), p(1.0, 1.0, -1.0), p(1.0, -1.0, -1.0),
        p(1.0, -1.0, -1.0), p(1.0, -1.0, 1.0), p(1.0, 1.0, 1.0),
        // -Y
        p(-1.0, -1.0, -1.0), p(1.0, -1.0, 1.0), p(1.0, -1.0, -1.0),
        p(1.0, -1.0, 1.0), p(-1.0, -1.0, -1.0), p(-1.0, -1.0, 1.0),
        // +Y
        p(-1.0, 1.0, -1.0), p(1.0, 1.0, -1.0), p(1.0, 1.0, 1.0),
        p(1.0, 1.0, 1.0), p(-1.0, 1.0, 1.0), p(-1.0, 1.0, -1.0),
    ]
}

pub struct SkyboxPass {
    vertex_shader: Option<RhiShaderRef>,
    fragment_shader: Option<RhiShaderRef>,
    root_signature: Option<RhiRootSignatureRef>,
    pipeline: Option<RhiGraphicsPipelineRef>,
    cube_sampler: Option<RhiSamplerRef>,
    cube_vertices: Option<RhiBufferRef>,
    per_frame: Option<FrameUniforms>,
    initialized: bool,
}

impl SkyboxPass {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            root_signature: None,
            pipeline: None,
            cube_sampler: None,
            cube_vertices: None,
            per_frame: None,
            initialized: false,
        }
    }

    pub fn init(&mut self, ctx: &PassInitContext<'_>) -> Result<()> {
        log::info!("initializing SkyboxPass");
        self.vertex_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/skybox.wgsl",
            ShaderFrequency::Vertex,
            "vs_main",
        )?);
        self.fragment_shader = Some(ctx.resources.get_or_create_shader(
            "/Engine/shaders/skybox.wgsl",
            ShaderFrequency::Fragment,
            "fs_main",
        )?);

        let root_signature = ctx.backend.create_root_signature(&RhiRootSignatureInfo {
            constant_buffers: vec![BindingSlot {
                slot: 0,
                stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
            }],
            textures: vec![TextureBindingSlot {
                slot: 0,
                stages: ShaderStages::FRAGMENT,
                dimension: TextureViewType::Cube,
                depth: false,
            }],
            samplers: vec![BindingSlot {
                slot: 0,
                stages: ShaderStages::FRAGMENT,
            }],
            name: "SkyboxPass",
        })?;

        self.cube_sampler = Some(ctx.backend.create_sampler(&RhiSamplerInfo {
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
            name: "Skybox Sampler",
            ..RhiSamplerInfo::default()
        })?);

        // Unit cube vertex buffer.
        let positions = cube_positions();
        let cube_vertices = ctx.backend.create_buffer(&RhiBufferInfo {
            size: std::mem::size_of_val(&positions) as u64,
            stride: 0,
            usage: BufferUsage::VERTEX,
            memory: MemoryUsage::CpuToGpu,
            creation: BufferCreation::PERSISTENT_MAP,
            name: "Skybox Cube Vertices",
        })?;
        if let Some(region) = cube_vertices.map() {
            region.write_bytes(0, bytemuck::cast_slice(&positions));
            cube_vertices.unmap();
        }
        self.cube_vertices = Some(cube_vertices);

        self.per_frame = Some(FrameUniforms::new(
            ctx.backend,
            std::mem::size_of::<PerFrameData>() as u64,
            PASS_FRAMES_IN_FLIGHT,
            "Skybox PerFrame",
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
            rasterizer: RasterizerState {
                // Inside faces are visible.
                cull_mode: CullMode::None,
                fill_mode: FillMode::Solid,
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
            name: "SkyboxPass",
            ..RhiGraphicsPipelineInfo::default()
        })?;

        self.root_signature = Some(root_signature);
        self.pipeline = Some(pipeline);
        self.initialized = true;
        Ok(())
    }

    /// Declare the skybox draw over `color_target`, depth-tested against
    /// `depth_target` without writing it.
    pub fn build(
        &self,
        builder: &mut RdgBuilder<'_>,
        color_target: RdgTextureHandle,
        depth_target: RdgTextureHandle,
        view: Mat4,
        proj: Mat4,
        material: &MaterialRef,
        frame_index: u64,
        extent: Extent2d,
    ) {
        if !self.is_ready() {
            return;
        }
        let (Some(pipeline), Some(sampler), Some(cube_vertices), Some(per_frame)) = (
            &self.pipeline,
            &self.cube_sampler,
            &self.cube_vertices,
            &self.per_frame,
        ) else {
            return;
        };

        let (cube_texture, intensity) = {
            let guard = material.read();
            let Some(skybox) = guard.as_skybox() else {
                log::error!("skybox pass given a non-skybox material");
                return;
            };
            let Some(cube) = skybox.cube_texture().and_then(|c| c.rhi_texture()).cloned()
            else {
                log::warn!("skybox cube texture not ready; skipping pass");
                return;
            };
            (cube, skybox.intensity)
        };

        // Zero the translation row so the cube follows the camera.
        let mut view_no_translation = view;
        view_no_translation.w_axis = Vec4::new(0.0, 0.0, 0.0, 1.0);

        let frame_buffer = per_frame.write(
            frame_index,
            &PerFrameData {
                view_no_translation,
                proj,
                params: Vec4::new(intensity, 0.0, 0.0, 0.0),
            },
        );

        let pipeline = pipeline.clone();
        let sampler = sampler.clone();
        let cube_vertices = cube_vertices.clone();

        builder
            .create_render_pass("SkyboxPass")
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
                cmd.bind_texture(&cube_texture, 0, ShaderStages::FRAGMENT);
                cmd.bind_sampler(&sampler, 0, ShaderStages::FRAGMENT);
                cmd.bind_vertex_buffer(&cube_vertices, 0, 0);
                cmd.draw(CUBE_VERTEX_COUNT, 1, 0, 0);
            })
            .finish();
    }
}

impl Default for SkyboxPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for SkyboxPass {
    fn name(&self) -> &'static str {
        "SkyboxPass"
    }

    fn pass_type(&self) -> PassType {
        PassType::Skybox
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.pipeline.is_some()
    }
}
