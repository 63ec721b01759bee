//! Headless Command Context
//!
//! Records through the shared [`CommandRecorder`] and replays the stream
//! on `execute()`: barriers update tracked states, copies move real
//! bytes, draws and mip generations land in the journal.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{EmberError, Result};
use crate::rhi::command::{CommandRecorder, RecordedCommand};
use crate::rhi::types::{
    Extent2d, Offset2d, ResourceState, RhiBufferBarrier, RhiBufferTextureCopy, RhiTextureBarrier,
    ShaderStages, SubresourceRange, TextureAspect,
};
use crate::rhi::{
    RhiBufferRef, RhiCommandContext, RhiFenceRef, RhiGraphicsPipelineRef, RhiRenderPass,
    RhiRenderPassRef, RhiResource, RhiSamplerRef, RhiSemaphoreRef, RhiTexture, RhiTextureRef,
    RhiTextureViewRef,
};

use super::resources::{HeadlessBuffer, HeadlessFence, HeadlessSemaphore, HeadlessTexture};
use super::{Journal, JournalEvent};

pub struct HeadlessCommandContext {
    journal: Arc<Journal>,
    recorder: Mutex<CommandRecorder>,
    /// The immediate context auto-begins so upload helpers can record
    /// without explicit begin/end bracketing.
    immediate: bool,
}

impl HeadlessCommandContext {
    #[must_use]
    pub fn new(journal: Arc<Journal>, immediate: bool) -> Self {
        let mut recorder = CommandRecorder::new();
        if immediate {
            recorder.begin();
        }
        Self {
            journal,
            recorder: Mutex::new(recorder),
            immediate,
        }
    }

    /// Validation errors recorded since the last `begin_command`.
    #[must_use]
    pub fn validation_errors(&self) -> u32 {
        self.recorder.lock().validation_errors()
    }

    fn replay(&self, commands: Vec<RecordedCommand>) {
        for command in commands {
            match command {
                RecordedCommand::BeginRenderPass(pass) => {
                    self.journal.push(JournalEvent::BeginRenderPass {
                        name: pass.info().name.clone(),
                    });
                }
                RecordedCommand::EndRenderPass => {
                    self.journal.push(JournalEvent::EndRenderPass);
                }
                RecordedCommand::Draw { vertex_count, .. } => {
                    self.journal.push(JournalEvent::Draw { vertex_count });
                }
                RecordedCommand::DrawIndexed { index_count, .. } => {
                    self.journal.push(JournalEvent::DrawIndexed { index_count });
                }
                RecordedCommand::DrawIndirect { .. } => {
                    self.journal.push(JournalEvent::DrawIndirect);
                }
                RecordedCommand::TextureBarrier(barrier) => self.replay_texture_barrier(&barrier),
                RecordedCommand::BufferBarrier(barrier) => {
                    if let Some(buffer) =
                        barrier.buffer.as_any().downcast_ref::<HeadlessBuffer>()
                    {
                        buffer.set_state(barrier.new_state);
                    }
                }
                RecordedCommand::CopyBufferToBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    self.replay_buffer_copy(&src, src_offset, &dst, dst_offset, size);
                }
                RecordedCommand::CopyBufferToTexture { src, dst, region } => {
                    self.replay_buffer_to_texture(&src, &dst, &region);
                }
                RecordedCommand::CopyTextureToBuffer { src, dst, region } => {
                    self.replay_texture_to_buffer(&src, &dst, &region);
                }
                RecordedCommand::GenerateMips(texture) => {
                    self.journal.push(JournalEvent::GenerateMips {
                        texture: texture.resource_id(),
                    });
                }
                // Pure state binds have no CPU-observable effect.
                RecordedCommand::SetViewport { .. }
                | RecordedCommand::SetScissor { .. }
                | RecordedCommand::SetGraphicsPipeline(_)
                | RecordedCommand::BindVertexBuffer { .. }
                | RecordedCommand::BindIndexBuffer { .. }
                | RecordedCommand::BindConstantBuffer { .. }
                | RecordedCommand::BindTexture { .. }
                | RecordedCommand::BindTextureView { .. }
                | RecordedCommand::BindSampler { .. } => {}
            }
        }
    }

    fn replay_texture_barrier(&self, barrier: &RhiTextureBarrier) {
        let Some(texture) = barrier.texture.as_any().downcast_ref::<HeadlessTexture>() else {
            log::error!("texture barrier on a foreign-backend texture");
            return;
        };
        let current = texture.states().uniform_state(&barrier.subresource);
        match current {
            Some(state) if state == barrier.old_state || state == ResourceState::Undefined => {}
            // Present and Common are the same underlying layout; a back
            // buffer re-imported as Common after a present is fine.
            Some(ResourceState::Present) if barrier.old_state == ResourceState::Common => {}
            Some(state) => {
                log::warn!(
                    "texture '{}' barrier declares old state {:?} but tracked state is {:?}",
                    texture.info().name,
                    barrier.old_state,
                    state
                );
            }
            None => {
                log::warn!(
                    "texture '{}' barrier over a mixed-state range",
                    texture.info().name
                );
            }
        }
        texture.states().set(&barrier.subresource, barrier.new_state);
        self.journal.push(JournalEvent::TextureBarrier {
            texture: texture.resource_id(),
            old_state: barrier.old_state,
            new_state: barrier.new_state,
        });
    }

    fn replay_buffer_copy(
        &self,
        src: &RhiBufferRef,
        src_offset: u64,
        dst: &RhiBufferRef,
        dst_offset: u64,
        size: u64,
    ) {
        let (Some(src), Some(dst)) = (
            src.as_any().downcast_ref::<HeadlessBuffer>(),
            dst.as_any().downcast_ref::<HeadlessBuffer>(),
        ) else {
            log::error!("buffer copy with foreign-backend handles");
            return;
        };
        let bytes = src.storage().read_bytes(src_offset, size as usize);
        dst.storage().write_bytes(dst_offset, &bytes);
        self.journal.push(JournalEvent::CopyBufferToBuffer { size });
    }

    fn replay_buffer_to_texture(
        &self,
        src: &RhiBufferRef,
        dst: &RhiTextureRef,
        region: &RhiBufferTextureCopy,
    ) {
        let (Some(src), Some(dst)) = (
            src.as_any().downcast_ref::<HeadlessBuffer>(),
            dst.as_any().downcast_ref::<HeadlessTexture>(),
        ) else {
            log::error!("buffer-to-texture copy with foreign-backend handles");
            return;
        };
        if let Some((base, dst_row, bpt)) = super::texel_offset(dst.info(), region) {
            let copy_w = region.extent.width as usize * bpt;
            let src_row = if region.bytes_per_row == 0 {
                copy_w
            } else {
                region.bytes_per_row as usize
            };
            let mut data = dst.data().lock();
            for y in 0..region.extent.height as usize {
                let src_off = region.buffer_offset as usize + y * src_row;
                let row = src.storage().read_bytes(src_off as u64, copy_w);
                let dst_off = base + y * dst_row;
                if dst_off + copy_w <= data.len() {
                    data[dst_off..dst_off + copy_w].copy_from_slice(&row);
                }
            }
        }
        self.journal.push(JournalEvent::CopyBufferToTexture {
            texture: dst.resource_id(),
        });
    }

    fn replay_texture_to_buffer(
        &self,
        src: &RhiTextureRef,
        dst: &RhiBufferRef,
        region: &RhiBufferTextureCopy,
    ) {
        let (Some(src), Some(dst)) = (
            src.as_any().downcast_ref::<HeadlessTexture>(),
            dst.as_any().downcast_ref::<HeadlessBuffer>(),
        ) else {
            log::error!("texture-to-buffer copy with foreign-backend handles");
            return;
        };
        if let Some((base, src_row, bpt)) = super::texel_offset(src.info(), region) {
            let copy_w = region.extent.width as usize * bpt;
            let dst_row = if region.bytes_per_row == 0 {
                copy_w
            } else {
                region.bytes_per_row as usize
            };
            let data = src.data().lock();
            for y in 0..region.extent.height as usize {
                let src_off = base + y * src_row;
                if src_off + copy_w <= data.len() {
                    let dst_off = region.buffer_offset as usize + y * dst_row;
                    dst.storage()
                        .write_bytes(dst_off as u64, &data[src_off..src_off + copy_w]);
                }
            }
        }
        self.journal.push(JournalEvent::CopyTextureToBuffer {
            texture: src.resource_id(),
        });
    }
}

impl RhiCommandContext for HeadlessCommandContext {
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
        wait: Option<&RhiSemaphoreRef>,
        signal: Option<&RhiSemaphoreRef>,
    ) -> Result<()> {
        let commands = {
            let mut recorder = self.recorder.lock();
            if !recorder.is_sealed() && !self.immediate {
                log::error!("execute() on an unsealed command context");
            }
            let commands = recorder.take_commands();
            if self.immediate {
                // The immediate context stays open for the next upload batch.
                recorder.begin();
            }
            commands
        };

        if let Some(sem) = wait {
            if let Some(sem) = sem.as_any().downcast_ref::<HeadlessSemaphore>() {
                sem.consume();
            }
        }

        self.replay(commands);
        self.journal.push(JournalEvent::Submit);

        if let Some(sem) = signal {
            if let Some(sem) = sem.as_any().downcast_ref::<HeadlessSemaphore>() {
                sem.signal();
            }
        }
        if let Some(fence) = fence {
            if let Some(fence) = fence.as_any().downcast_ref::<HeadlessFence>() {
                fence.signal();
            } else {
                return Err(EmberError::InvariantViolation(
                    "execute() given a foreign-backend fence".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // Synchronous backend: execute and we are done.
        self.execute(None, None, None)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::RhiBackend;
    use crate::rhi::headless::HeadlessBackend;
    use crate::rhi::types::{RhiTextureInfo, SubresourceRange};

    #[test]
    fn barrier_with_equal_states_is_elided() {
        let backend = HeadlessBackend::new();
        let texture = backend
            .create_texture(&RhiTextureInfo::default())
            .expect("texture");
        let ctx = backend.immediate_command();
        ctx.texture_barrier(&RhiTextureBarrier {
            texture: texture.clone(),
            old_state: ResourceState::ShaderResource,
            new_state: ResourceState::ShaderResource,
            subresource: SubresourceRange::all(TextureAspect::Color),
        });
        ctx.flush().expect("flush");
        assert_eq!(
            backend
                .journal()
                .count(|e| matches!(e, JournalEvent::TextureBarrier { .. })),
            0
        );
    }
}
