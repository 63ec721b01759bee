//! Command Recording
//!
//! Backend-shared recording and validation. A [`CommandRecorder`] stores
//! the command stream as plain data; each backend replays it at
//! `execute()` time into its native API (or, for the headless backend,
//! into its CPU state machine).
//!
//! Validation happens at record time so both backends reject the same
//! invalid streams: render-pass nesting, draws outside a pass, barriers
//! inside one. Invalid commands are logged and dropped, so recording
//! stays in a valid state and the frame can still complete.

use super::types::{
    Extent2d, Offset2d, ResourceState, RhiBufferBarrier, RhiBufferTextureCopy, RhiTextureBarrier,
    ShaderStages,
};
use super::{
    RhiBufferRef, RhiGraphicsPipelineRef, RhiRenderPassRef, RhiSamplerRef, RhiTextureRef,
    RhiTextureViewRef,
};
use crate::rhi::state::is_valid_transition;

/// One recorded command. Handles are kept alive by the recording.
pub enum RecordedCommand {
    BeginRenderPass(RhiRenderPassRef),
    EndRenderPass,
    SetViewport {
        offset: Offset2d,
        extent: Extent2d,
    },
    SetScissor {
        offset: Offset2d,
        extent: Extent2d,
    },
    SetGraphicsPipeline(RhiGraphicsPipelineRef),
    BindVertexBuffer {
        buffer: RhiBufferRef,
        slot: u32,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: RhiBufferRef,
        offset: u64,
    },
    BindConstantBuffer {
        buffer: RhiBufferRef,
        slot: u32,
        stages: ShaderStages,
        /// Byte offset into the buffer (256-aligned on GPU backends).
        offset: u64,
        /// Bound size; 0 binds the whole remaining buffer.
        size: u64,
    },
    BindTexture {
        texture: RhiTextureRef,
        slot: u32,
        stages: ShaderStages,
    },
    BindTextureView {
        view: RhiTextureViewRef,
        slot: u32,
        stages: ShaderStages,
    },
    BindSampler {
        sampler: RhiSamplerRef,
        slot: u32,
        stages: ShaderStages,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: RhiBufferRef,
        offset: u64,
    },
    TextureBarrier(RhiTextureBarrier),
    BufferBarrier(RhiBufferBarrier),
    CopyBufferToBuffer {
        src: RhiBufferRef,
        src_offset: u64,
        dst: RhiBufferRef,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        src: RhiBufferRef,
        dst: RhiTextureRef,
        region: RhiBufferTextureCopy,
    },
    CopyTextureToBuffer {
        src: RhiTextureRef,
        dst: RhiBufferRef,
        region: RhiBufferTextureCopy,
    },
    GenerateMips(RhiTextureRef),
}

/// Recording state machine shared by every backend.
///
/// Not thread-safe by itself; command contexts wrap it in a mutex
/// (recording is single-threaded per context by contract).
#[derive(Default)]
pub struct CommandRecorder {
    commands: Vec<RecordedCommand>,
    began: bool,
    sealed: bool,
    in_render_pass: bool,
    /// Count of commands rejected by validation since the last begin.
    validation_errors: u32,
}

impl CommandRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new recording.
    pub fn begin(&mut self) {
        if self.in_render_pass {
            log::error!("begin_command while a render pass is open; discarding pass");
        }
        self.commands.clear();
        self.began = true;
        self.sealed = false;
        self.in_render_pass = false;
        self.validation_errors = 0;
    }

    /// Seal the recording for submission.
    pub fn end(&mut self) {
        if self.in_render_pass {
            log::error!("end_command with an open render pass; closing it implicitly");
            self.commands.push(RecordedCommand::EndRenderPass);
            self.in_render_pass = false;
            self.validation_errors += 1;
        }
        self.sealed = true;
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    #[must_use]
    pub fn validation_errors(&self) -> u32 {
        self.validation_errors
    }

    /// Drain the recorded stream for replay.
    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        self.began = false;
        self.sealed = false;
        std::mem::take(&mut self.commands)
    }

    fn reject(&mut self, what: &str, why: &str) {
        log::error!("command rejected: {what}: {why}");
        self.validation_errors += 1;
    }

    fn check_recording(&mut self, what: &str) -> bool {
        if !self.began || self.sealed {
            self.reject(what, "context is not recording (begin_command not active)");
            return false;
        }
        true
    }

    // ── Render pass nesting ────────────────────────────────────────────────

    pub fn begin_render_pass(&mut self, pass: RhiRenderPassRef) {
        if !self.check_recording("begin_render_pass") {
            return;
        }
        if self.in_render_pass {
            self.reject("begin_render_pass", "a render pass is already open");
            return;
        }
        self.in_render_pass = true;
        self.commands.push(RecordedCommand::BeginRenderPass(pass));
    }

    pub fn end_render_pass(&mut self) {
        if !self.check_recording("end_render_pass") {
            return;
        }
        if !self.in_render_pass {
            self.reject("end_render_pass", "no render pass is open");
            return;
        }
        self.in_render_pass = false;
        self.commands.push(RecordedCommand::EndRenderPass);
    }

    // ── State & binds (legal inside and outside a pass) ────────────────────

    pub fn push(&mut self, command: RecordedCommand) {
        if !self.check_recording("command") {
            return;
        }
        self.commands.push(command);
    }

    // ── Draws (inside a pass only) ─────────────────────────────────────────

    pub fn push_draw(&mut self, command: RecordedCommand) {
        if !self.check_recording("draw") {
            return;
        }
        if !self.in_render_pass {
            self.reject("draw", "draws are only legal inside a render pass");
            return;
        }
        self.commands.push(command);
    }

    // ── Barriers (outside a pass only) ─────────────────────────────────────

    pub fn push_texture_barrier(&mut self, barrier: RhiTextureBarrier) {
        if !self.check_recording("texture_barrier") {
            return;
        }
        if self.in_render_pass {
            self.reject("texture_barrier", "barriers are illegal inside a render pass");
            return;
        }
        if barrier.old_state == barrier.new_state {
            // No-op by contract; elided from the stream.
            return;
        }
        if !is_valid_transition(barrier.old_state, barrier.new_state) {
            self.reject(
                "texture_barrier",
                &format!(
                    "illegal transition {:?} -> {:?}",
                    barrier.old_state, barrier.new_state
                ),
            );
            return;
        }
        self.commands.push(RecordedCommand::TextureBarrier(barrier));
    }

    pub fn push_buffer_barrier(&mut self, barrier: RhiBufferBarrier) {
        if !self.check_recording("buffer_barrier") {
            return;
        }
        if self.in_render_pass {
            self.reject("buffer_barrier", "barriers are illegal inside a render pass");
            return;
        }
        if barrier.old_state == barrier.new_state {
            return;
        }
        if barrier.new_state == ResourceState::Undefined {
            self.reject("buffer_barrier", "cannot transition to Undefined");
            return;
        }
        self.commands.push(RecordedCommand::BufferBarrier(barrier));
    }

    // ── Copies / mips (outside a pass only) ────────────────────────────────

    pub fn push_transfer(&mut self, command: RecordedCommand) {
        if !self.check_recording("transfer") {
            return;
        }
        if self.in_render_pass {
            self.reject("transfer", "copies are illegal inside a render pass");
            return;
        }
        self.commands.push(command);
    }
}
