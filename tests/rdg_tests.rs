//! Render Dependency Graph Tests
//!
//! Exercises the builder/executor pair on the headless backend:
//! - schedules are topological orders of the read/write graph
//! - cyclic declarations fail with InvariantViolation and record nothing
//! - barriers are derived from attachment and read usage
//! - imported textures end the frame in Present state
//! - the transient pool reuses compatible textures across frames

use std::sync::Arc;

use ember::errors::EmberError;
use ember::rdg::{RdgBuilder, RdgExecutor, TransientTexturePool};
use ember::rhi::headless::{HeadlessBackend, HeadlessTexture, JournalEvent};
use ember::rhi::types::{
    AttachmentLoadOp, AttachmentStoreOp, Extent2d, Extent3d, MemoryUsage, ResourceState,
    RhiFormat, RhiTextureInfo, SubresourceRange, TextureAspect, TextureUsage,
};
use ember::rhi::{RhiBackend, RhiBackendRef, RhiCommandContext, RhiCommandContextRef, RhiResource};

const EXTENT: Extent2d = Extent2d {
    width: 64,
    height: 64,
};

fn setup() -> (
    Arc<HeadlessBackend>,
    RhiBackendRef,
    TransientTexturePool,
    RhiCommandContextRef,
) {
    let backend = HeadlessBackend::new();
    let rhi: RhiBackendRef = backend.clone();
    let pool = TransientTexturePool::new();
    let pool_handle = rhi.create_command_pool().unwrap();
    let command = rhi.create_command_context(&pool_handle).unwrap();
    (backend, rhi, pool, command)
}

fn run(
    builder: RdgBuilder<'_>,
    rhi: &RhiBackendRef,
    pool: &mut TransientTexturePool,
    command: &RhiCommandContextRef,
) -> ember::errors::Result<()> {
    command.begin_command();
    let result = RdgExecutor::execute(builder, rhi, pool, command);
    command.end_command();
    command.execute(None, None, None).unwrap();
    result
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn declaration_order_is_kept_without_dependencies() {
    let (backend, rhi, mut pool, command) = setup();
    let mut builder = RdgBuilder::new();

    for name in ["A", "B", "C"] {
        let target = builder
            .create_texture(format!("target {name}"))
            .extent(EXTENT)
            .format(RhiFormat::Rgba8Unorm)
            .allow_render_target()
            .finish();
        builder
            .create_render_pass(name)
            .color(
                0,
                target,
                AttachmentLoadOp::Clear,
                AttachmentStoreOp::Store,
                [0.0; 4],
            )
            .execute(|_| {})
            .finish();
    }

    run(builder, &rhi, &mut pool, &command).unwrap();
    assert_eq!(backend.journal().pass_order(), ["A", "B", "C"]);
}

#[test]
fn readers_run_after_their_writer() {
    let (backend, rhi, mut pool, command) = setup();
    let mut builder = RdgBuilder::new();

    let shared = builder
        .create_texture("shared")
        .extent(EXTENT)
        .format(RhiFormat::Rgba8Unorm)
        .allow_render_target()
        .allow_sampled()
        .finish();
    let sink = builder
        .create_texture("sink")
        .extent(EXTENT)
        .format(RhiFormat::Rgba8Unorm)
        .allow_render_target()
        .finish();

    // Reader declared first; writer declared second. The schedule must
    // still place the writer first.
    builder
        .create_render_pass("reader")
        .color(0, sink, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .read(shared, SubresourceRange::all(TextureAspect::Color))
        .execute(|_| {})
        .finish();
    builder
        .create_render_pass("writer")
        .color(0, shared, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .execute(|_| {})
        .finish();

    run(builder, &rhi, &mut pool, &command).unwrap();
    assert_eq!(backend.journal().pass_order(), ["writer", "reader"]);
}

#[test]
fn declared_writes_make_a_pass_a_writer() {
    let (backend, rhi, mut pool, command) = setup();
    let mut builder = RdgBuilder::new();

    let storage = builder
        .create_texture("storage")
        .extent(EXTENT)
        .format(RhiFormat::Rgba16Float)
        .allow_storage()
        .allow_sampled()
        .finish();
    let aux = builder
        .create_texture("aux")
        .extent(EXTENT)
        .format(RhiFormat::Rgba8Unorm)
        .allow_render_target()
        .finish();
    let sink = builder
        .create_texture("sink")
        .extent(EXTENT)
        .format(RhiFormat::Rgba8Unorm)
        .allow_render_target()
        .finish();

    // Consumer declared first; the producer touches `storage` only
    // through a declared write, never as an attachment.
    builder
        .create_render_pass("consume")
        .color(0, sink, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .read(storage, SubresourceRange::all(TextureAspect::Color))
        .execute(|_| {})
        .finish();
    builder
        .create_render_pass("produce")
        .color(0, aux, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .write(storage, ResourceState::UnorderedAccess)
        .execute(|_| {})
        .finish();

    run(builder, &rhi, &mut pool, &command).unwrap();
    assert_eq!(backend.journal().pass_order(), ["produce", "consume"]);

    // The declared write transitions to UnorderedAccess before the
    // producer and back to ShaderResource for the consumer's read.
    let barriers: Vec<_> = backend
        .journal()
        .events()
        .iter()
        .filter_map(|e| match e {
            JournalEvent::TextureBarrier {
                old_state,
                new_state,
                ..
            } => Some((*old_state, *new_state)),
            _ => None,
        })
        .collect();
    assert!(barriers.contains(&(ResourceState::Undefined, ResourceState::UnorderedAccess)));
    assert!(barriers.contains(&(ResourceState::UnorderedAccess, ResourceState::ShaderResource)));
}

#[test]
fn cyclic_graph_fails_deterministically() {
    let (backend, rhi, mut pool, command) = setup();
    let mut builder = RdgBuilder::new();

    let a = builder
        .create_texture("a")
        .extent(EXTENT)
        .format(RhiFormat::Rgba8Unorm)
        .allow_render_target()
        .allow_sampled()
        .finish();
    let b = builder
        .create_texture("b")
        .extent(EXTENT)
        .format(RhiFormat::Rgba8Unorm)
        .allow_render_target()
        .allow_sampled()
        .finish();

    // P writes a, reads b; Q writes b, reads a.
    builder
        .create_render_pass("P")
        .color(0, a, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .read(b, SubresourceRange::all(TextureAspect::Color))
        .execute(|_| {})
        .finish();
    builder
        .create_render_pass("Q")
        .color(0, b, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .read(a, SubresourceRange::all(TextureAspect::Color))
        .execute(|_| {})
        .finish();

    let result = run(builder, &rhi, &mut pool, &command);
    assert!(matches!(result, Err(EmberError::InvariantViolation(_))));
    assert!(backend.journal().pass_order().is_empty());
}

// ============================================================================
// Barriers & states
// ============================================================================

#[test]
fn attachments_and_reads_get_barriers() {
    let (backend, rhi, mut pool, command) = setup();
    let mut builder = RdgBuilder::new();

    let color = builder
        .create_texture("color")
        .extent(EXTENT)
        .format(RhiFormat::Rgba8Unorm)
        .allow_render_target()
        .allow_sampled()
        .finish();
    let output = builder
        .create_texture("output")
        .extent(EXTENT)
        .format(RhiFormat::Rgba8Unorm)
        .allow_render_target()
        .finish();

    builder
        .create_render_pass("draw")
        .color(0, color, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .execute(|_| {})
        .finish();
    builder
        .create_render_pass("post")
        .color(0, output, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .read(color, SubresourceRange::all(TextureAspect::Color))
        .execute(|_| {})
        .finish();

    run(builder, &rhi, &mut pool, &command).unwrap();

    // The shared texture transitions Undefined -> RenderTarget and
    // RenderTarget -> ShaderResource around the two passes.
    let events = backend.journal().events();
    let barriers: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            JournalEvent::TextureBarrier {
                old_state,
                new_state,
                ..
            } => Some((*old_state, *new_state)),
            _ => None,
        })
        .collect();
    assert!(barriers.contains(&(ResourceState::Undefined, ResourceState::RenderTarget)));
    assert!(barriers.contains(&(ResourceState::RenderTarget, ResourceState::ShaderResource)));
}

#[test]
fn imported_textures_finish_in_present_state() {
    let (_, rhi, mut pool, command) = setup();

    let back_buffer = rhi
        .create_texture(&RhiTextureInfo {
            format: RhiFormat::Bgra8Unorm,
            extent: Extent3d::new(EXTENT.width, EXTENT.height, 1),
            usage: TextureUsage::COLOR_TARGET,
            memory: MemoryUsage::GpuOnly,
            ..RhiTextureInfo::default()
        })
        .unwrap();

    let mut builder = RdgBuilder::new();
    let imported = builder
        .create_texture("back buffer")
        .import(back_buffer.clone(), ResourceState::Common)
        .finish();
    builder
        .create_render_pass("final")
        .color(0, imported, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .execute(|_| {})
        .finish();

    run(builder, &rhi, &mut pool, &command).unwrap();

    let concrete = back_buffer
        .as_any()
        .downcast_ref::<HeadlessTexture>()
        .unwrap();
    assert_eq!(concrete.current_state(), Some(ResourceState::Present));
}

#[test]
fn pass_bodies_record_between_begin_and_end() {
    let (backend, rhi, mut pool, command) = setup();
    let mut builder = RdgBuilder::new();

    let target = builder
        .create_texture("target")
        .extent(EXTENT)
        .format(RhiFormat::Rgba8Unorm)
        .allow_render_target()
        .finish();
    builder
        .create_render_pass("body")
        .color(0, target, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .execute(|ctx| {
            ctx.command.draw(3, 1, 0, 0);
        })
        .finish();

    run(builder, &rhi, &mut pool, &command).unwrap();

    let events = backend.journal().events();
    let begin = events
        .iter()
        .position(|e| matches!(e, JournalEvent::BeginRenderPass { .. }))
        .unwrap();
    let draw = events
        .iter()
        .position(|e| matches!(e, JournalEvent::Draw { .. }))
        .unwrap();
    let end = events
        .iter()
        .position(|e| matches!(e, JournalEvent::EndRenderPass))
        .unwrap();
    assert!(begin < draw && draw < end);
}

// ============================================================================
// Transient pool
// ============================================================================

#[test]
fn transient_pool_reuses_textures_across_frames() {
    let (_, rhi, mut pool, command) = setup();

    for _ in 0..3 {
        let mut builder = RdgBuilder::new();
        let target = builder
            .create_texture("frame target")
            .extent(EXTENT)
            .format(RhiFormat::Rgba16Float)
            .allow_render_target()
            .finish();
        builder
            .create_render_pass("frame")
            .color(0, target, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
            .execute(|_| {})
            .finish();
        run(builder, &rhi, &mut pool, &command).unwrap();
    }

    // One texture satisfied all three frames.
    assert_eq!(pool.total_texture_count(), 1);
}

#[test]
fn transient_pool_trim_releases_idle_textures() {
    let (_, rhi, mut pool, command) = setup();

    let mut builder = RdgBuilder::new();
    let target = builder
        .create_texture("once")
        .extent(EXTENT)
        .format(RhiFormat::Rgba8Unorm)
        .allow_render_target()
        .finish();
    builder
        .create_render_pass("once")
        .color(0, target, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, [0.0; 4])
        .execute(|_| {})
        .finish();
    run(builder, &rhi, &mut pool, &command).unwrap();

    assert_eq!(pool.total_texture_count(), 1);
    pool.trim(0);
    pool.trim(0);
    assert_eq!(pool.total_texture_count(), 0);
}
