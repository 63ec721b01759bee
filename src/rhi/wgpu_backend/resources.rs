//! wgpu Resource Handles
//!
//! RHI handles wrapping wgpu objects. CPU-visible buffers shadow their
//! contents in a [`MappedRegion`]; the shadow is flushed to the GPU via
//! `queue.write_buffer` right before any submission that references the
//! buffer (tracked by the region's version counter).

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::rhi::state::SubresourceStates;
use crate::rhi::types::{
    ResourceState, RhiBufferInfo, RhiFormat, RhiGraphicsPipelineInfo, RhiRenderPassInfo,
    RhiRootSignatureInfo, RhiSamplerInfo, RhiShaderInfo, RhiTextureInfo, RhiTextureViewInfo,
    TextureAspect, TextureDimension,
};
use crate::rhi::{
    MappedRegion, ResourceId, RhiBuffer, RhiCommandPool, RhiFence, RhiGraphicsPipeline,
    RhiRenderPass, RhiResource, RhiRootSignature, RhiRootSignatureRef, RhiSampler, RhiSemaphore,
    RhiShader, RhiTexture, RhiTextureRef, RhiTextureView, next_resource_id,
};

use super::DeviceShared;

// ─── Buffer ───────────────────────────────────────────────────────────────────

pub struct WgpuBuffer {
    id: ResourceId,
    info: RhiBufferInfo,
    pub(crate) buffer: wgpu::Buffer,
    shared: Arc<DeviceShared>,
    /// CPU shadow for CPU-visible memory.
    shadow: Option<MappedRegion>,
    uploaded_version: AtomicU64,
}

impl WgpuBuffer {
    pub(crate) fn new(shared: Arc<DeviceShared>, info: RhiBufferInfo) -> Self {
        let usage = super::convert::buffer_usages(info.usage, info.memory);
        // wgpu requires copy sizes aligned to 4 bytes.
        let size = info.size.div_ceil(4) * 4;
        let buffer = shared.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(info.name),
            size,
            usage,
            mapped_at_creation: false,
        });
        let shadow = info
            .memory
            .cpu_visible()
            .then(|| MappedRegion::new(info.size as usize));
        Self {
            id: next_resource_id(),
            info,
            buffer,
            shared,
            shadow,
            uploaded_version: AtomicU64::new(0),
        }
    }

    /// Upload the CPU shadow if it changed since the last flush.
    pub(crate) fn flush_shadow(&self) {
        let Some(shadow) = &self.shadow else { return };
        let version = shadow.version();
        if self.uploaded_version.swap(version, Ordering::AcqRel) != version {
            let bytes = shadow.snapshot();
            self.shared.queue.write_buffer(&self.buffer, 0, &bytes);
        }
    }

    /// Synchronous GPU -> shadow readback for CPU-only (readback) memory.
    fn read_back(&self) {
        let Some(shadow) = &self.shadow else { return };
        let slice = self.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.shared.device.poll(wgpu::PollType::wait_indefinitely());
        match rx.recv() {
            Ok(Ok(())) => {
                let view = slice.get_mapped_range();
                shadow.write_bytes(0, &view[..shadow.len().min(view.len())]);
                drop(view);
                self.buffer.unmap();
            }
            other => {
                log::error!("buffer '{}' readback failed: {other:?}", self.info.name);
            }
        }
    }
}

impl RhiResource for WgpuBuffer {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiBuffer for WgpuBuffer {
    fn info(&self) -> &RhiBufferInfo {
        &self.info
    }

    fn map(&self) -> Option<MappedRegion> {
        match &self.shadow {
            Some(shadow) => {
                if self.info.memory == crate::rhi::types::MemoryUsage::CpuOnly {
                    self.read_back();
                }
                Some(shadow.clone())
            }
            None => {
                log::error!("map() on GPU-only buffer '{}'", self.info.name);
                None
            }
        }
    }

    fn unmap(&self) {
        self.flush_shadow();
    }
}

// ─── Texture ──────────────────────────────────────────────────────────────────

pub struct WgpuTexture {
    id: ResourceId,
    info: RhiTextureInfo,
    pub(crate) texture: wgpu::Texture,
    pub(crate) default_view: wgpu::TextureView,
    states: SubresourceStates,
}

impl WgpuTexture {
    pub(crate) fn new(shared: &DeviceShared, info: RhiTextureInfo) -> Self {
        let format = super::convert::texture_format(info.format);
        let texture = shared.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(info.name),
            size: wgpu::Extent3d {
                width: info.extent.width,
                height: info.extent.height,
                depth_or_array_layers: if info.dimension == TextureDimension::D3 {
                    info.extent.depth
                } else {
                    info.array_layers.max(1)
                },
            },
            mip_level_count: info.mip_levels.max(1),
            sample_count: 1,
            dimension: super::convert::texture_dimension(info.dimension),
            format,
            usage: super::convert::texture_usages(info.usage, info.format),
            view_formats: &[],
        });
        let default_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(info.name),
            dimension: Some(match info.dimension {
                TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureDimension::D2Array => wgpu::TextureViewDimension::D2Array,
                TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
                TextureDimension::D3 => wgpu::TextureViewDimension::D3,
            }),
            ..Default::default()
        });
        let states = SubresourceStates::new(
            info.mip_levels.max(1),
            info.array_layers.max(1),
            ResourceState::Undefined,
        );
        Self {
            id: next_resource_id(),
            info,
            texture,
            default_view,
            states,
        }
    }

    /// Wrap an externally acquired texture (swapchain back buffer).
    pub(crate) fn from_raw(texture: wgpu::Texture, info: RhiTextureInfo) -> Self {
        let default_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let states = SubresourceStates::new(1, 1, ResourceState::Common);
        Self {
            id: next_resource_id(),
            info,
            texture,
            default_view,
            states,
        }
    }

    pub(crate) fn states(&self) -> &SubresourceStates {
        &self.states
    }
}

impl RhiResource for WgpuTexture {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiTexture for WgpuTexture {
    fn info(&self) -> &RhiTextureInfo {
        &self.info
    }
}

// ─── Texture view ─────────────────────────────────────────────────────────────

pub struct WgpuTextureView {
    id: ResourceId,
    info: RhiTextureViewInfo,
    pub(crate) view: wgpu::TextureView,
}

impl WgpuTextureView {
    pub(crate) fn new(mut info: RhiTextureViewInfo) -> Option<Self> {
        if info.format == RhiFormat::Undefined {
            info.format = info.texture.info().format;
        }
        let format_aspect = info.format.default_aspect();
        if info.subresource.aspect == TextureAspect::Color && format_aspect != TextureAspect::Color
        {
            info.subresource.aspect = format_aspect;
        }
        let texture = info.texture.as_any().downcast_ref::<WgpuTexture>()?;
        let tex_info = texture.info();
        let range = info
            .subresource
            .resolve(tex_info.mip_levels.max(1), tex_info.array_layers.max(1));
        let view = texture.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(tex_info.name),
            format: None,
            dimension: Some(super::convert::view_dimension(info.view_type)),
            aspect: match info.subresource.aspect {
                TextureAspect::Depth => wgpu::TextureAspect::DepthOnly,
                TextureAspect::Stencil => wgpu::TextureAspect::StencilOnly,
                TextureAspect::Color | TextureAspect::DepthStencil => wgpu::TextureAspect::All,
            },
            base_mip_level: range.base_mip,
            mip_level_count: Some(range.mip_count.max(1)),
            base_array_layer: range.base_layer,
            array_layer_count: Some(range.layer_count.max(1)),
            ..Default::default()
        });
        Some(Self {
            id: next_resource_id(),
            info,
            view,
        })
    }
}

impl RhiResource for WgpuTextureView {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiTextureView for WgpuTextureView {
    fn texture(&self) -> &RhiTextureRef {
        &self.info.texture
    }

    fn view_info(&self) -> &RhiTextureViewInfo {
        &self.info
    }
}

// ─── Sampler ──────────────────────────────────────────────────────────────────

pub struct WgpuSampler {
    id: ResourceId,
    info: RhiSamplerInfo,
    pub(crate) sampler: wgpu::Sampler,
}

impl WgpuSampler {
    pub(crate) fn new(shared: &DeviceShared, info: RhiSamplerInfo) -> Self {
        let anisotropy = info.max_anisotropy.max(1.0) as u16;
        // Anisotropic filtering requires all-linear filters.
        let (min, mag, mip) = if anisotropy > 1 {
            (
                wgpu::FilterMode::Linear,
                wgpu::FilterMode::Linear,
                wgpu::MipmapFilterMode::Linear,
            )
        } else {
            (
                super::convert::filter_mode(info.min_filter),
                super::convert::filter_mode(info.mag_filter),
                super::convert::mipmap_filter_mode(info.mip_mode),
            )
        };
        let sampler = shared.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(info.name),
            address_mode_u: super::convert::address_mode(info.address_u),
            address_mode_v: super::convert::address_mode(info.address_v),
            address_mode_w: super::convert::address_mode(info.address_w),
            mag_filter: mag,
            min_filter: min,
            mipmap_filter: mip,
            anisotropy_clamp: anisotropy,
            ..Default::default()
        });
        Self {
            id: next_resource_id(),
            info,
            sampler,
        }
    }
}

impl RhiResource for WgpuSampler {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiSampler for WgpuSampler {
    fn info(&self) -> &RhiSamplerInfo {
        &self.info
    }
}

// ─── Shader ───────────────────────────────────────────────────────────────────

pub struct WgpuShader {
    id: ResourceId,
    info: RhiShaderInfo,
    pub(crate) module: wgpu::ShaderModule,
}

impl WgpuShader {
    pub(crate) fn new(module: wgpu::ShaderModule, info: RhiShaderInfo) -> Self {
        Self {
            id: next_resource_id(),
            info,
            module,
        }
    }
}

impl RhiResource for WgpuShader {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiShader for WgpuShader {
    fn info(&self) -> &RhiShaderInfo {
        &self.info
    }
}

// ─── Root signature ───────────────────────────────────────────────────────────

/// The slot schema realized as three bind group layouts:
/// group 0 = constant buffers, group 1 = textures, group 2 = samplers.
/// Bindings within a group use the declared slot index directly.
pub struct WgpuRootSignature {
    id: ResourceId,
    info: RhiRootSignatureInfo,
    pub(crate) group_layouts: [wgpu::BindGroupLayout; 3],
    pub(crate) pipeline_layout: wgpu::PipelineLayout,
}

impl WgpuRootSignature {
    pub(crate) fn new(shared: &DeviceShared, info: RhiRootSignatureInfo) -> Self {
        let cbv_entries: Vec<wgpu::BindGroupLayoutEntry> = info
            .constant_buffers
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.slot,
                visibility: super::convert::shader_stages(slot.stages),
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        let srv_entries: Vec<wgpu::BindGroupLayoutEntry> = info
            .textures
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.slot,
                visibility: super::convert::shader_stages(slot.stages),
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float {
                        filterable: !slot.depth,
                    },
                    view_dimension: super::convert::view_dimension(slot.dimension),
                    multisampled: false,
                },
                count: None,
            })
            .collect();

        let sampler_entries: Vec<wgpu::BindGroupLayoutEntry> = info
            .samplers
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.slot,
                visibility: super::convert::shader_stages(slot.stages),
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            })
            .collect();

        let make_layout = |entries: &[wgpu::BindGroupLayoutEntry], label: &str| {
            shared
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(label),
                    entries,
                })
        };
        let group_layouts = [
            make_layout(&cbv_entries, "RootSignature CBVs"),
            make_layout(&srv_entries, "RootSignature SRVs"),
            make_layout(&sampler_entries, "RootSignature Samplers"),
        ];

        let pipeline_layout = shared
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(info.name),
                bind_group_layouts: &[
                    Some(&group_layouts[0]),
                    Some(&group_layouts[1]),
                    Some(&group_layouts[2]),
                ],
                immediate_size: 0,
            });

        Self {
            id: next_resource_id(),
            info,
            group_layouts,
            pipeline_layout,
        }
    }
}

impl RhiResource for WgpuRootSignature {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiRootSignature for WgpuRootSignature {
    fn info(&self) -> &RhiRootSignatureInfo {
        &self.info
    }
}

// ─── Graphics pipeline ────────────────────────────────────────────────────────

pub struct WgpuGraphicsPipeline {
    id: ResourceId,
    pub(crate) pipeline: wgpu::RenderPipeline,
    root_signature: Option<RhiRootSignatureRef>,
}

impl WgpuGraphicsPipeline {
    pub(crate) fn new(shared: &DeviceShared, info: &RhiGraphicsPipelineInfo) -> Option<Self> {
        let vertex_shader = info.vertex_shader.as_ref()?;
        let vs = vertex_shader.as_any().downcast_ref::<WgpuShader>()?;
        let root_signature = info.root_signature.clone();
        let signature = root_signature
            .as_ref()
            .and_then(|rs| rs.as_any().downcast_ref::<WgpuRootSignature>());

        // Group attributes per vertex-buffer stream.
        let mut streams: Vec<(u32, u64, Vec<wgpu::VertexAttribute>)> = Vec::new();
        for element in &info.vertex_elements {
            let stride = if element.stride == 0 {
                u64::from(element.format.bytes_per_texel())
            } else {
                u64::from(element.stride)
            };
            let attribute = wgpu::VertexAttribute {
                format: super::convert::vertex_format(element.format),
                offset: u64::from(element.offset),
                shader_location: element.location,
            };
            if let Some(stream) = streams.iter_mut().find(|s| s.0 == element.stream_index) {
                stream.1 = stream.1.max(stride);
                stream.2.push(attribute);
            } else {
                streams.push((element.stream_index, stride, vec![attribute]));
            }
        }
        streams.sort_by_key(|s| s.0);
        let buffer_layouts: Vec<wgpu::VertexBufferLayout> = streams
            .iter()
            .map(|(_, stride, attributes)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = info
            .color_formats
            .iter()
            .enumerate()
            .map(|(i, format)| {
                let blend = info.blend_targets.get(i).copied().unwrap_or_default();
                Some(wgpu::ColorTargetState {
                    format: super::convert::texture_format(*format),
                    blend: super::convert::blend_state(&blend),
                    write_mask: super::convert::write_mask(blend.write_mask),
                })
            })
            .collect();

        let depth_stencil = info.depth_stencil_format.map(|format| wgpu::DepthStencilState {
            format: super::convert::texture_format(format),
            depth_write_enabled: Some(info.depth_stencil.depth_write),
            depth_compare: Some(if info.depth_stencil.depth_test {
                super::convert::compare_function(info.depth_stencil.compare)
            } else {
                wgpu::CompareFunction::Always
            }),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let polygon_mode = match info.rasterizer.fill_mode {
            crate::rhi::types::FillMode::Solid => wgpu::PolygonMode::Fill,
            crate::rhi::types::FillMode::Wireframe => {
                if shared.supports_wireframe {
                    wgpu::PolygonMode::Line
                } else {
                    log::warn!("wireframe fill unsupported by this adapter, using solid");
                    wgpu::PolygonMode::Fill
                }
            }
        };

        let fragment_module = info
            .fragment_shader
            .as_ref()
            .and_then(|s| s.as_any().downcast_ref::<WgpuShader>());

        let pipeline = shared
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(info.name),
                layout: signature.map(|s| &s.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vs.module,
                    entry_point: Some(&vs.info.entry),
                    buffers: &buffer_layouts,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: fragment_module.map(|fs| wgpu::FragmentState {
                    module: &fs.module,
                    entry_point: Some(&fs.info.entry),
                    targets: &color_targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: super::convert::topology(info.primitive_topology),
                    // Left-handed clip space; D3D-style clockwise front faces.
                    front_face: wgpu::FrontFace::Cw,
                    cull_mode: super::convert::cull_mode(info.rasterizer.cull_mode),
                    polygon_mode,
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        Some(Self {
            id: next_resource_id(),
            pipeline,
            root_signature,
        })
    }
}

impl RhiResource for WgpuGraphicsPipeline {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiGraphicsPipeline for WgpuGraphicsPipeline {
    fn root_signature(&self) -> Option<&RhiRootSignatureRef> {
        self.root_signature.as_ref()
    }
}

// ─── Render pass / command pool (plain data) ──────────────────────────────────

pub struct WgpuRenderPass {
    id: ResourceId,
    info: RhiRenderPassInfo,
}

impl WgpuRenderPass {
    pub(crate) fn new(info: RhiRenderPassInfo) -> Self {
        Self {
            id: next_resource_id(),
            info,
        }
    }
}

impl RhiResource for WgpuRenderPass {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiRenderPass for WgpuRenderPass {
    fn info(&self) -> &RhiRenderPassInfo {
        &self.info
    }
}

pub struct WgpuCommandPool {
    id: ResourceId,
}

impl WgpuCommandPool {
    pub(crate) fn new() -> Self {
        Self {
            id: next_resource_id(),
        }
    }
}

impl RhiResource for WgpuCommandPool {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiCommandPool for WgpuCommandPool {}

// ─── Fence & semaphore ────────────────────────────────────────────────────────

/// Fence over wgpu submissions: waiting polls the device until the
/// recorded submission completes.
pub struct WgpuFence {
    id: ResourceId,
    shared: Arc<DeviceShared>,
    submission: Mutex<Option<wgpu::SubmissionIndex>>,
    initially_signaled: Mutex<bool>,
}

impl WgpuFence {
    pub(crate) fn new(shared: Arc<DeviceShared>, signaled: bool) -> Self {
        Self {
            id: next_resource_id(),
            shared,
            submission: Mutex::new(None),
            initially_signaled: Mutex::new(signaled),
        }
    }

    pub(crate) fn attach(&self, submission: wgpu::SubmissionIndex) {
        *self.submission.lock() = Some(submission);
    }
}

impl RhiResource for WgpuFence {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiFence for WgpuFence {
    fn wait(&self) {
        let submission = self.submission.lock().clone();
        if let Some(_submission) = submission {
            let _ = self.shared.device.poll(wgpu::PollType::wait_indefinitely());
            *self.initially_signaled.lock() = true;
        } else if !*self.initially_signaled.lock() {
            log::warn!("wait() on an unsubmitted fence");
        }
    }

    fn is_signaled(&self) -> bool {
        *self.initially_signaled.lock()
    }

    fn reset(&self) {
        *self.submission.lock() = None;
        *self.initially_signaled.lock() = false;
    }
}

/// Inert ordering token: a single wgpu queue already executes
/// submissions in order, which subsumes GPU-GPU semaphores.
pub struct WgpuSemaphore {
    id: ResourceId,
}

impl WgpuSemaphore {
    pub(crate) fn new() -> Self {
        Self {
            id: next_resource_id(),
        }
    }
}

impl RhiResource for WgpuSemaphore {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RhiSemaphore for WgpuSemaphore {}
