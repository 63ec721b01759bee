//! wgpu Command Context
//!
//! Records through the shared [`CommandRecorder`] and replays the stream
//! into a `wgpu::CommandEncoder` at `execute()` time.
//!
//! Slot binds are gathered into a bind table; right before each draw the
//! table is resolved against the bound pipeline's root signature into
//! bind groups (group 0 = CBVs, 1 = SRVs, 2 = samplers), cached by a
//! fingerprint over the participating resource ids so steady-state
//! frames reuse groups instead of recreating them.

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};

use crate::errors::Result;
use crate::rhi::command::{CommandRecorder, RecordedCommand};
use crate::rhi::types::{
    Extent2d, Offset2d, RhiBufferBarrier, RhiBufferTextureCopy, RhiTextureBarrier, ShaderStages,
    TextureViewType,
};
use crate::rhi::{
    ResourceId, RhiBufferRef, RhiCommandContext, RhiFenceRef, RhiGraphicsPipeline,
    RhiGraphicsPipelineRef, RhiRenderPass, RhiRenderPassRef, RhiResource, RhiRootSignature,
    RhiSamplerRef, RhiSemaphoreRef, RhiTexture, RhiTextureRef, RhiTextureViewRef,
};

use super::resources::{
    WgpuBuffer, WgpuFence, WgpuGraphicsPipeline, WgpuRootSignature, WgpuSampler, WgpuTexture,
    WgpuTextureView,
};
use super::DeviceShared;

// ─── Bind table ───────────────────────────────────────────────────────────────

#[derive(Clone)]
enum BoundSrv {
    Texture(RhiTextureRef),
    View(RhiTextureViewRef),
}

/// Current slot-binding state during replay.
#[derive(Default)]
struct BindTable {
    pipeline: Option<RhiGraphicsPipelineRef>,
    pipeline_applied: Option<ResourceId>,
    cbvs: FxHashMap<u32, (RhiBufferRef, u64, u64)>,
    srvs: FxHashMap<u32, BoundSrv>,
    samplers: FxHashMap<u32, RhiSamplerRef>,
    vertex_buffers: FxHashMap<u32, (RhiBufferRef, u64)>,
    index_buffer: Option<(RhiBufferRef, u64)>,
    applied_groups: [Option<u64>; 3],
    applied_vertex: FxHashMap<u32, (ResourceId, u64)>,
    applied_index: Option<(ResourceId, u64)>,
}

impl BindTable {
    /// State does not persist across render-pass boundaries on the GPU
    /// side; force re-application on the next draw.
    fn invalidate_applied(&mut self) {
        self.pipeline_applied = None;
        self.applied_groups = [None; 3];
        self.applied_vertex.clear();
        self.applied_index = None;
    }
}

// ─── Context ──────────────────────────────────────────────────────────────────

pub struct WgpuCommandContext {
    shared: Arc<DeviceShared>,
    recorder: Mutex<CommandRecorder>,
    immediate: bool,
    bind_group_cache: Mutex<FxHashMap<u64, wgpu::BindGroup>>,
}

impl WgpuCommandContext {
    #[must_use]
    pub(crate) fn new(shared: Arc<DeviceShared>, immediate: bool) -> Self {
        let mut recorder = CommandRecorder::new();
        if immediate {
            recorder.begin();
        }
        Self {
            shared,
            recorder: Mutex::new(recorder),
            immediate,
            bind_group_cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Upload every dirty CPU shadow the stream references before the
    /// GPU consumes it.
    fn flush_referenced_shadows(&self, commands: &[RecordedCommand]) {
        let flush = |buffer: &RhiBufferRef| {
            if let Some(buffer) = buffer.as_any().downcast_ref::<WgpuBuffer>() {
                buffer.flush_shadow();
            }
        };
        for command in commands {
            match command {
                RecordedCommand::BindVertexBuffer { buffer, .. }
                | RecordedCommand::BindIndexBuffer { buffer, .. }
                | RecordedCommand::BindConstantBuffer { buffer, .. }
                | RecordedCommand::DrawIndirect { buffer, .. } => flush(buffer),
                RecordedCommand::CopyBufferToBuffer { src, .. }
                | RecordedCommand::CopyBufferToTexture { src, .. } => flush(src),
                _ => {}
            }
        }
    }

    fn replay(&self, commands: &[RecordedCommand]) -> wgpu::CommandBuffer {
        let mut encoder =
            self.shared
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("RHI Command Context"),
                });
        let mut table = BindTable::default();
        let mut i = 0;

        while i < commands.len() {
            match &commands[i] {
                RecordedCommand::BeginRenderPass(pass) => {
                    i = self.replay_render_pass(&mut encoder, &mut table, commands, i, pass);
                    continue;
                }
                RecordedCommand::TextureBarrier(barrier) => self.track_texture_barrier(barrier),
                RecordedCommand::BufferBarrier(_) => {}
                RecordedCommand::SetGraphicsPipeline(pipeline) => {
                    table.pipeline = Some(pipeline.clone());
                }
                RecordedCommand::BindVertexBuffer {
                    buffer,
                    slot,
                    offset,
                } => {
                    table.vertex_buffers.insert(*slot, (buffer.clone(), *offset));
                }
                RecordedCommand::BindIndexBuffer { buffer, offset } => {
                    table.index_buffer = Some((buffer.clone(), *offset));
                }
                RecordedCommand::BindConstantBuffer {
                    buffer,
                    slot,
                    offset,
                    size,
                    ..
                } => {
                    table.cbvs.insert(*slot, (buffer.clone(), *offset, *size));
                }
                RecordedCommand::BindTexture { texture, slot, .. } => {
                    table.srvs.insert(*slot, BoundSrv::Texture(texture.clone()));
                }
                RecordedCommand::BindTextureView { view, slot, .. } => {
                    table.srvs.insert(*slot, BoundSrv::View(view.clone()));
                }
                RecordedCommand::BindSampler { sampler, slot, .. } => {
                    table.samplers.insert(*slot, sampler.clone());
                }
                RecordedCommand::CopyBufferToBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    if let (Some(src), Some(dst)) = (
                        src.as_any().downcast_ref::<WgpuBuffer>(),
                        dst.as_any().downcast_ref::<WgpuBuffer>(),
                    ) {
                        encoder.copy_buffer_to_buffer(
                            &src.buffer,
                            *src_offset,
                            &dst.buffer,
                            *dst_offset,
                            *size,
                        );
                    }
                }
                RecordedCommand::CopyBufferToTexture { src, dst, region } => {
                    self.encode_buffer_texture_copy(&mut encoder, src, dst, region, true);
                }
                RecordedCommand::CopyTextureToBuffer { src, dst, region } => {
                    self.encode_buffer_texture_copy(&mut encoder, dst, src, region, false);
                }
                RecordedCommand::GenerateMips(texture) => {
                    if let Some(texture) = texture.as_any().downcast_ref::<WgpuTexture>() {
                        self.shared.mip_generator.lock().generate(
                            &self.shared.device,
                            &mut encoder,
                            &texture.texture,
                        );
                    }
                }
                // Viewport/scissor outside a pass: re-issued per pass entry
                // by contract, nothing to do here.
                RecordedCommand::SetViewport { .. }
                | RecordedCommand::SetScissor { .. }
                | RecordedCommand::EndRenderPass
                | RecordedCommand::Draw { .. }
                | RecordedCommand::DrawIndexed { .. }
                | RecordedCommand::DrawIndirect { .. } => {}
            }
            i += 1;
        }

        encoder.finish()
    }

    /// Replay one render pass span; returns the index just past its
    /// `EndRenderPass`.
    fn replay_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        table: &mut BindTable,
        commands: &[RecordedCommand],
        begin_index: usize,
        pass: &RhiRenderPassRef,
    ) -> usize {
        let info = pass.info();
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = info
            .color_attachments
            .iter()
            .map(|attachment| {
                let view = attachment
                    .view
                    .as_any()
                    .downcast_ref::<WgpuTextureView>()?;
                Some(wgpu::RenderPassColorAttachment {
                    view: &view.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: super::convert::load_op_color(
                            attachment.load_op,
                            attachment.clear_color,
                        ),
                        store: super::convert::store_op(attachment.store_op),
                    },
                    depth_slice: None,
                })
            })
            .collect();

        let depth_stencil_attachment = info.depth_stencil.as_ref().and_then(|attachment| {
            let view = attachment.view.as_any().downcast_ref::<WgpuTextureView>()?;
            // wgpu expresses read-only depth as an absent depth_ops.
            let depth_ops = if attachment.read_only {
                None
            } else {
                Some(wgpu::Operations {
                    load: super::convert::load_op_depth(attachment.load_op, attachment.depth_clear),
                    store: super::convert::store_op(attachment.store_op),
                })
            };
            Some(wgpu::RenderPassDepthStencilAttachment {
                view: &view.view,
                depth_ops,
                stencil_ops: None,
            })
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&info.name),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        table.invalidate_applied();

        let mut i = begin_index + 1;
        while i < commands.len() {
            match &commands[i] {
                RecordedCommand::EndRenderPass => {
                    return i + 1;
                }
                RecordedCommand::SetViewport { offset, extent } => {
                    rpass.set_viewport(
                        offset.x as f32,
                        offset.y as f32,
                        extent.width as f32,
                        extent.height as f32,
                        0.0,
                        1.0,
                    );
                }
                RecordedCommand::SetScissor { offset, extent } => {
                    rpass.set_scissor_rect(
                        offset.x.max(0) as u32,
                        offset.y.max(0) as u32,
                        extent.width,
                        extent.height,
                    );
                }
                RecordedCommand::SetGraphicsPipeline(pipeline) => {
                    table.pipeline = Some(pipeline.clone());
                }
                RecordedCommand::BindVertexBuffer {
                    buffer,
                    slot,
                    offset,
                } => {
                    table.vertex_buffers.insert(*slot, (buffer.clone(), *offset));
                }
                RecordedCommand::BindIndexBuffer { buffer, offset } => {
                    table.index_buffer = Some((buffer.clone(), *offset));
                }
                RecordedCommand::BindConstantBuffer {
                    buffer,
                    slot,
                    offset,
                    size,
                    ..
                } => {
                    table.cbvs.insert(*slot, (buffer.clone(), *offset, *size));
                }
                RecordedCommand::BindTexture { texture, slot, .. } => {
                    table.srvs.insert(*slot, BoundSrv::Texture(texture.clone()));
                }
                RecordedCommand::BindTextureView { view, slot, .. } => {
                    table.srvs.insert(*slot, BoundSrv::View(view.clone()));
                }
                RecordedCommand::BindSampler { sampler, slot, .. } => {
                    table.samplers.insert(*slot, sampler.clone());
                }
                RecordedCommand::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => {
                    if self.apply_state(&mut rpass, table, false) {
                        rpass.draw(
                            *first_vertex..*first_vertex + *vertex_count,
                            *first_instance..*first_instance + *instance_count,
                        );
                    }
                }
                RecordedCommand::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                } => {
                    if self.apply_state(&mut rpass, table, true) {
                        rpass.draw_indexed(
                            *first_index..*first_index + *index_count,
                            *vertex_offset,
                            *first_instance..*first_instance + *instance_count,
                        );
                    }
                }
                RecordedCommand::DrawIndirect { buffer, offset } => {
                    if self.apply_state(&mut rpass, table, false) {
                        if let Some(buffer) = buffer.as_any().downcast_ref::<WgpuBuffer>() {
                            rpass.draw_indirect(&buffer.buffer, *offset);
                        }
                    }
                }
                other => {
                    // The recorder rejects barriers/copies inside a pass;
                    // anything else here is a recorder bug.
                    let _ = other;
                    log::error!("unexpected command inside render pass replay");
                }
            }
            i += 1;
        }
        log::error!("render pass '{}' not closed before stream end", info.name);
        i
    }

    /// Resolve the bind table against the current pipeline; returns
    /// false when the draw cannot proceed.
    fn apply_state(
        &self,
        rpass: &mut wgpu::RenderPass<'_>,
        table: &mut BindTable,
        indexed: bool,
    ) -> bool {
        let Some(pipeline_ref) = table.pipeline.clone() else {
            log::error!("draw without a bound pipeline");
            return false;
        };
        let Some(pipeline) = pipeline_ref.as_any().downcast_ref::<WgpuGraphicsPipeline>() else {
            return false;
        };
        if table.pipeline_applied != Some(pipeline_ref.resource_id()) {
            rpass.set_pipeline(&pipeline.pipeline);
            table.pipeline_applied = Some(pipeline_ref.resource_id());
        }

        if let Some(signature) = pipeline_ref
            .root_signature()
            .and_then(|rs| rs.as_any().downcast_ref::<WgpuRootSignature>())
        {
            for group in 0..3 {
                let (fingerprint, bind_group) = self.resolve_group(signature, table, group);
                if table.applied_groups[group as usize] != Some(fingerprint) {
                    rpass.set_bind_group(group, &bind_group, &[]);
                    table.applied_groups[group as usize] = Some(fingerprint);
                }
            }
        }

        for (slot, (buffer, offset)) in &table.vertex_buffers {
            let Some(wgpu_buffer) = buffer.as_any().downcast_ref::<WgpuBuffer>() else {
                continue;
            };
            let key = (buffer.resource_id(), *offset);
            if table.applied_vertex.get(slot) != Some(&key) {
                rpass.set_vertex_buffer(*slot, wgpu_buffer.buffer.slice(*offset..));
                table.applied_vertex.insert(*slot, key);
            }
        }

        if indexed {
            let Some((buffer, offset)) = &table.index_buffer else {
                log::error!("indexed draw without an index buffer");
                return false;
            };
            let Some(wgpu_buffer) = buffer.as_any().downcast_ref::<WgpuBuffer>() else {
                return false;
            };
            let key = (buffer.resource_id(), *offset);
            if table.applied_index != Some(key) {
                rpass.set_index_buffer(
                    wgpu_buffer.buffer.slice(*offset..),
                    wgpu::IndexFormat::Uint32,
                );
                table.applied_index = Some(key);
            }
        }
        true
    }

    /// Build (or fetch) the bind group for `group` from the table.
    fn resolve_group(
        &self,
        signature: &WgpuRootSignature,
        table: &BindTable,
        group: u32,
    ) -> (u64, wgpu::BindGroup) {
        let mut hasher = FxHasher::default();
        signature.resource_id().hash(&mut hasher);
        group.hash(&mut hasher);

        enum Entry<'a> {
            Buffer(&'a wgpu::Buffer, u64, u64),
            DummyBuffer,
            View(&'a wgpu::TextureView),
            DummyView(TextureViewType),
            Sampler(&'a wgpu::Sampler),
            DummySampler,
        }
        let mut entries: Vec<(u32, Entry)> = Vec::new();

        match group {
            0 => {
                for slot in &signature.info().constant_buffers {
                    let bound = table.cbvs.get(&slot.slot).and_then(|(b, offset, size)| {
                        b.as_any()
                            .downcast_ref::<WgpuBuffer>()
                            .map(|buffer| (buffer, b.resource_id(), *offset, *size))
                    });
                    match bound {
                        Some((buffer, id, offset, size)) => {
                            (id, offset, size).hash(&mut hasher);
                            entries.push((slot.slot, Entry::Buffer(&buffer.buffer, offset, size)));
                        }
                        None => {
                            0u64.hash(&mut hasher);
                            entries.push((slot.slot, Entry::DummyBuffer));
                        }
                    }
                }
            }
            1 => {
                for slot in &signature.info().textures {
                    let bound = table.srvs.get(&slot.slot);
                    match bound {
                        Some(BoundSrv::Texture(texture)) => {
                            if let Some(tex) = texture.as_any().downcast_ref::<WgpuTexture>() {
                                texture.resource_id().hash(&mut hasher);
                                entries.push((slot.slot, Entry::View(&tex.default_view)));
                            } else {
                                0u64.hash(&mut hasher);
                                entries.push((slot.slot, Entry::DummyView(slot.dimension)));
                            }
                        }
                        Some(BoundSrv::View(view)) => {
                            if let Some(view) = view.as_any().downcast_ref::<WgpuTextureView>() {
                                view.resource_id().hash(&mut hasher);
                                entries.push((slot.slot, Entry::View(&view.view)));
                            } else {
                                0u64.hash(&mut hasher);
                                entries.push((slot.slot, Entry::DummyView(slot.dimension)));
                            }
                        }
                        None => {
                            0u64.hash(&mut hasher);
                            entries.push((slot.slot, Entry::DummyView(slot.dimension)));
                        }
                    }
                }
            }
            _ => {
                for slot in &signature.info().samplers {
                    match table
                        .samplers
                        .get(&slot.slot)
                        .and_then(|s| s.as_any().downcast_ref::<WgpuSampler>())
                    {
                        Some(sampler) => {
                            sampler.resource_id().hash(&mut hasher);
                            entries.push((slot.slot, Entry::Sampler(&sampler.sampler)));
                        }
                        None => {
                            0u64.hash(&mut hasher);
                            entries.push((slot.slot, Entry::DummySampler));
                        }
                    }
                }
            }
        }

        let fingerprint = hasher.finish();
        let mut cache = self.bind_group_cache.lock();
        if let Some(bind_group) = cache.get(&fingerprint) {
            return (fingerprint, bind_group.clone());
        }

        let wgpu_entries: Vec<wgpu::BindGroupEntry> = entries
            .iter()
            .map(|(binding, entry)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match entry {
                    Entry::Buffer(buffer, offset, size) => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer,
                            offset: *offset,
                            size: (*size > 0).then(|| wgpu::BufferSize::new(*size)).flatten(),
                        })
                    }
                    Entry::DummyBuffer => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.shared.dummy_uniform,
                        offset: 0,
                        size: None,
                    }),
                    Entry::View(view) => wgpu::BindingResource::TextureView(view),
                    Entry::DummyView(TextureViewType::Cube) => {
                        wgpu::BindingResource::TextureView(&self.shared.dummy_view_cube)
                    }
                    Entry::DummyView(_) => {
                        wgpu::BindingResource::TextureView(&self.shared.dummy_view_2d)
                    }
                    Entry::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                    Entry::DummySampler => {
                        wgpu::BindingResource::Sampler(&self.shared.dummy_sampler)
                    }
                },
            })
            .collect();

        let bind_group = self
            .shared
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("RHI Slot BindGroup"),
                layout: &signature.group_layouts[group as usize],
                entries: &wgpu_entries,
            });
        cache.insert(fingerprint, bind_group.clone());
        (fingerprint, bind_group)
    }

    fn encode_buffer_texture_copy(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        buffer: &RhiBufferRef,
        texture: &RhiTextureRef,
        region: &RhiBufferTextureCopy,
        buffer_to_texture: bool,
    ) {
        let (Some(buffer), Some(texture)) = (
            buffer.as_any().downcast_ref::<WgpuBuffer>(),
            texture.as_any().downcast_ref::<WgpuTexture>(),
        ) else {
            log::error!("copy with foreign-backend handles");
            return;
        };
        let bytes_per_row = if region.bytes_per_row == 0 {
            region.extent.width * texture.info().format.bytes_per_texel()
        } else {
            region.bytes_per_row
        };
        // Single-row copies may leave the pitch unspecified, which avoids
        // the 256-byte row alignment requirement for 1xN uploads.
        let bytes_per_row = (region.extent.height > 1).then_some(bytes_per_row);
        let buffer_info = wgpu::TexelCopyBufferInfo {
            buffer: &buffer.buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: region.buffer_offset,
                bytes_per_row,
                rows_per_image: Some(region.extent.height),
            },
        };
        let texture_info = wgpu::TexelCopyTextureInfo {
            texture: &texture.texture,
            mip_level: region.mip_level,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: region.array_layer,
            },
            aspect: wgpu::TextureAspect::All,
        };
        let extent = wgpu::Extent3d {
            width: region.extent.width,
            height: region.extent.height,
            depth_or_array_layers: region.extent.depth.max(1),
        };
        if buffer_to_texture {
            encoder.copy_buffer_to_texture(buffer_info, texture_info, extent);
        } else {
            encoder.copy_texture_to_buffer(texture_info, buffer_info, extent);
        }
    }

    fn track_texture_barrier(&self, barrier: &RhiTextureBarrier) {
        if let Some(texture) = barrier.texture.as_any().downcast_ref::<WgpuTexture>() {
            texture.states().set(&barrier.subresource, barrier.new_state);
        }
    }
}

impl RhiCommandContext for WgpuCommandContext {
    fn begin_command(&self) {
        self.recorder.lock().begin();
    }

    fn end_command(&self) {
        self.recorder.lock().end();
    }

    fn begin_render_pass(&self, pass: &RhiRenderPassRef) {
        self.recorder.lock().begin_render_pass(pass.clone());
    }

    fn end_render_pass(&self) {
        self.recorder.lock().end_render_pass();
    }

    fn set_viewport(&self, offset: Offset2d, extent: Extent2d) {
        self.recorder
            .lock()
            .push(RecordedCommand::SetViewport { offset, extent });
    }

    fn set_scissor(&self, offset: Offset2d, extent: Extent2d) {
        self.recorder
            .lock()
            .push(RecordedCommand::SetScissor { offset, extent });
    }

    fn set_graphics_pipeline(&self, pipeline: &RhiGraphicsPipelineRef) {
        self.recorder
            .lock()
            .push(RecordedCommand::SetGraphicsPipeline(pipeline.clone()));
    }

    fn bind_vertex_buffer(&self, buffer: &RhiBufferRef, slot: u32, offset: u64) {
        self.recorder.lock().push(RecordedCommand::BindVertexBuffer {
            buffer: buffer.clone(),
            slot,
            offset,
        });
    }

    fn bind_index_buffer(&self, buffer: &RhiBufferRef, offset: u64) {
        self.recorder.lock().push(RecordedCommand::BindIndexBuffer {
            buffer: buffer.clone(),
            offset,
        });
    }

    fn bind_constant_buffer(&self, buffer: &RhiBufferRef, slot: u32, stages: ShaderStages) {
        self.bind_constant_buffer_range(buffer, slot, stages, 0, 0);
    }

    fn bind_constant_buffer_range(
        &self,
        buffer: &RhiBufferRef,
        slot: u32,
        stages: ShaderStages,
        offset: u64,
        size: u64,
    ) {
        self.recorder
            .lock()
            .push(RecordedCommand::BindConstantBuffer {
                buffer: buffer.clone(),
                slot,
                stages,
                offset,
                size,
            });
    }

    fn bind_texture(&self, texture: &RhiTextureRef, slot: u32, stages: ShaderStages) {
        self.recorder.lock().push(RecordedCommand::BindTexture {
            texture: texture.clone(),
            slot,
            stages,
        });
    }

    fn bind_texture_view(&self, view: &RhiTextureViewRef, slot: u32, stages: ShaderStages) {
        self.recorder.lock().push(RecordedCommand::BindTextureView {
            view: view.clone(),
            slot,
            stages,
        });
    }

    fn bind_sampler(&self, sampler: &RhiSamplerRef, slot: u32, stages: ShaderStages) {
        self.recorder.lock().push(RecordedCommand::BindSampler {
            sampler: sampler.clone(),
            slot,
            stages,
        });
    }

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.recorder.lock().push_draw(RecordedCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.recorder
            .lock()
            .push_draw(RecordedCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            });
    }

    fn draw_indirect(&self, buffer: &RhiBufferRef, offset: u64) {
        self.recorder.lock().push_draw(RecordedCommand::DrawIndirect {
            buffer: buffer.clone(),
            offset,
        });
    }

    fn texture_barrier(&self, barrier: &RhiTextureBarrier) {
        self.recorder.lock().push_texture_barrier(barrier.clone());
    }

    fn buffer_barrier(&self, barrier: &RhiBufferBarrier) {
        self.recorder.lock().push_buffer_barrier(barrier.clone());
    }

    fn copy_buffer_to_buffer(
        &self,
        src: &RhiBufferRef,
        src_offset: u64,
        dst: &RhiBufferRef,
        dst_offset: u64,
        size: u64,
    ) {
        self.recorder
            .lock()
            .push_transfer(RecordedCommand::CopyBufferToBuffer {
                src: src.clone(),
                src_offset,
                dst: dst.clone(),
                dst_offset,
                size,
            });
    }

    fn copy_buffer_to_texture(
        &self,
        src: &RhiBufferRef,
        dst: &RhiTextureRef,
        region: &RhiBufferTextureCopy,
    ) {
        self.recorder
            .lock()
            .push_transfer(RecordedCommand::CopyBufferToTexture {
                src: src.clone(),
                dst: dst.clone(),
                region: *region,
            });
    }

    fn copy_texture_to_buffer(
        &self,
        src: &RhiTextureRef,
        dst: &RhiBufferRef,
        region: &RhiBufferTextureCopy,
    ) {
        self.recorder
            .lock()
            .push_transfer(RecordedCommand::CopyTextureToBuffer {
                src: src.clone(),
                dst: dst.clone(),
                region: *region,
            });
    }

    fn generate_mips(&self, texture: &RhiTextureRef) {
        self.recorder
            .lock()
            .push_transfer(RecordedCommand::GenerateMips(texture.clone()));
    }

    fn execute(
        &self,
        fence: Option<&RhiFenceRef>,
        _wait: Option<&RhiSemaphoreRef>,
        _signal: Option<&RhiSemaphoreRef>,
    ) -> Result<()> {
        let commands = {
            let mut recorder = self.recorder.lock();
            if !recorder.is_sealed() && !self.immediate {
                log::error!("execute() on an unsealed command context");
            }
            let commands = recorder.take_commands();
            if self.immediate {
                recorder.begin();
            }
            commands
        };

        self.flush_referenced_shadows(&commands);
        let command_buffer = self.replay(&commands);
        let submission = self.shared.queue.submit(Some(command_buffer));

        if let Some(fence) = fence {
            if let Some(fence) = fence.as_any().downcast_ref::<WgpuFence>() {
                fence.attach(submission);
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.execute(None, None, None)?;
        let _ = self.shared.device.poll(wgpu::PollType::wait_indefinitely());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
