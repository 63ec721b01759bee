//! Render Graph Executor
//!
//! Consumes an [`RdgBuilder`] and turns it into barriers, RHI render
//! passes, and draw recording on a command context.
//!
//! # Execution algorithm
//!
//! 1. Schedule passes in a topological order of the read/write graph
//!    (a reader depends on the last writer of each handle it reads;
//!    writers of the same handle, attachment or declared, are chained).
//!    Declaration order breaks ties. A cycle is fatal for the frame: no
//!    commands are recorded and
//!    [`EmberError::InvariantViolation`] is returned.
//! 2. Realize transient textures from the pool, imported textures as-is.
//! 3. Per pass, emit `texture_barrier`s taking every attachment and read
//!    to its required state, then begin the RHI render pass, run the
//!    body, and end it.
//! 4. Transition imported textures (notably the swapchain back buffer)
//!    to `Present`.
//!
//! A pass body that fails to bind what it needs only logs; recording
//! stays valid and the frame still presents.

use rustc_hash::FxHashMap;

use crate::errors::{EmberError, Result};
use crate::rhi::state::TextureUsageKind;
use crate::rhi::types::{
    ResourceState, RhiColorAttachment, RhiDepthStencilAttachment, RhiRenderPassInfo,
    RhiTextureBarrier, RhiTextureViewInfo, SubresourceRange,
};
use crate::rhi::{
    RhiBackend, RhiBackendRef, RhiCommandContext, RhiCommandContextRef, RhiResource, RhiTexture,
    RhiTextureRef, RhiTextureViewRef,
};

use super::builder::{RdgBuilder, RdgPassDecl, RdgPassContext, RdgTextureKind};
use super::transient_pool::{TransientTextureDesc, TransientTexturePool};

/// Executes render graphs against an RHI command context.
pub struct RdgExecutor;

struct ResolvedTexture {
    texture: RhiTextureRef,
    state: ResourceState,
    imported: bool,
    /// Allocation index in the transient pool (for state hand-back).
    pool_index: Option<usize>,
}

impl RdgExecutor {
    /// Execute `builder` on `command`. The context must be recording
    /// (between `begin_command` and `end_command`).
    pub fn execute(
        builder: RdgBuilder<'_>,
        backend: &RhiBackendRef,
        pool: &mut TransientTexturePool,
        command: &RhiCommandContextRef,
    ) -> Result<()> {
        let order = Self::schedule(&builder)?;

        // ── Realize textures ───────────────────────────────────────────
        let mut resolved: Vec<ResolvedTexture> = Vec::with_capacity(builder.textures.len());
        let mut pool_allocations = 0usize;
        for decl in &builder.textures {
            match &decl.kind {
                RdgTextureKind::Imported {
                    texture,
                    initial_state,
                } => resolved.push(ResolvedTexture {
                    texture: texture.clone(),
                    state: *initial_state,
                    imported: true,
                    pool_index: None,
                }),
                RdgTextureKind::Transient {
                    extent,
                    format,
                    mip_levels,
                    usage,
                } => {
                    let pooled = pool.allocate(
                        backend,
                        &TransientTextureDesc {
                            extent: *extent,
                            format: *format,
                            usage: *usage,
                            mip_levels: *mip_levels,
                        },
                        "RDG Transient",
                    )?;
                    resolved.push(ResolvedTexture {
                        texture: pooled.texture,
                        state: pooled.initial_state,
                        imported: false,
                        pool_index: Some(pool_allocations),
                    });
                    pool_allocations += 1;
                }
            }
        }

        // Full default views, created once per texture per frame.
        let mut views: Vec<Option<RhiTextureViewRef>> = Vec::with_capacity(resolved.len());
        for entry in &resolved {
            let view = backend
                .create_texture_view(&RhiTextureViewInfo::full(entry.texture.clone()))
                .ok();
            views.push(view);
        }
        let textures: Vec<RhiTextureRef> = resolved.iter().map(|r| r.texture.clone()).collect();

        // ── Run passes in schedule order ───────────────────────────────
        let mut passes: Vec<Option<RdgPassDecl<'_>>> = builder.passes.into_iter().map(Some).collect();
        for &pass_index in &order {
            let Some(pass) = passes[pass_index].take() else {
                continue;
            };
            Self::run_pass(pass, backend, command, &mut resolved, &textures, &views);
        }

        // ── Final transitions ──────────────────────────────────────────
        let mut final_states: FxHashMap<usize, ResourceState> = FxHashMap::default();
        for entry in &mut resolved {
            if entry.imported {
                Self::transition(command, entry, TextureUsageKind::Present.required_state());
            } else if let Some(pool_index) = entry.pool_index {
                final_states.insert(pool_index, entry.state);
            }
        }
        pool.reset(&final_states);
        Ok(())
    }

    /// Topological order over the pass list.
    fn schedule(builder: &RdgBuilder<'_>) -> Result<Vec<usize>> {
        let pass_count = builder.passes.len();
        let texture_count = builder.textures.len();

        // Writers of each handle in declaration order: color attachments,
        // writable depth attachments, and declared non-attachment writes.
        let mut writers: Vec<Vec<usize>> = vec![Vec::new(); texture_count];
        for (index, pass) in builder.passes.iter().enumerate() {
            for color in &pass.colors {
                writers[color.handle.0 as usize].push(index);
            }
            if let Some(depth) = &pass.depth_stencil {
                if !depth.read_only {
                    writers[depth.handle.0 as usize].push(index);
                }
            }
            for write in &pass.writes {
                writers[write.handle.0 as usize].push(index);
            }
        }

        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); pass_count];
        let mut indegree = vec![0usize; pass_count];
        let mut add_edge = |edges: &mut Vec<Vec<usize>>, indegree: &mut Vec<usize>, from: usize, to: usize| {
            if from != to && !edges[from].contains(&to) {
                edges[from].push(to);
                indegree[to] += 1;
            }
        };

        // Write-after-write: chain writers in declaration order.
        for handle_writers in &writers {
            for pair in handle_writers.windows(2) {
                add_edge(&mut edges, &mut indegree, pair[0], pair[1]);
            }
        }

        // Read-after-write: a reader depends on the last writer.
        for (index, pass) in builder.passes.iter().enumerate() {
            let mut reads: Vec<u32> = pass.reads.iter().map(|r| r.handle.0).collect();
            if let Some(depth) = &pass.depth_stencil {
                if depth.read_only {
                    reads.push(depth.handle.0);
                }
            }
            for handle in reads {
                if let Some(&writer) = writers[handle as usize].last() {
                    add_edge(&mut edges, &mut indegree, writer, index);
                }
            }
        }

        // Kahn's algorithm; among ready passes pick the lowest
        // declaration index so ties preserve declaration order.
        let mut order = Vec::with_capacity(pass_count);
        let mut remaining: Vec<bool> = vec![true; pass_count];
        while order.len() < pass_count {
            let next = (0..pass_count).find(|&i| remaining[i] && indegree[i] == 0);
            let Some(next) = next else {
                return Err(EmberError::InvariantViolation(
                    "render graph contains a cycle".to_string(),
                ));
            };
            remaining[next] = false;
            order.push(next);
            for &succ in &edges[next] {
                indegree[succ] -= 1;
            }
        }
        Ok(order)
    }

    fn transition(
        command: &RhiCommandContextRef,
        entry: &mut ResolvedTexture,
        new_state: ResourceState,
    ) {
        if entry.state == new_state {
            return;
        }
        let aspect = entry.texture.info().format.default_aspect();
        command.texture_barrier(&RhiTextureBarrier {
            texture: entry.texture.clone(),
            old_state: entry.state,
            new_state,
            subresource: SubresourceRange::all(aspect),
        });
        entry.state = new_state;
    }

    fn run_pass(
        mut pass: RdgPassDecl<'_>,
        backend: &RhiBackendRef,
        command: &RhiCommandContextRef,
        resolved: &mut [ResolvedTexture],
        textures: &[RhiTextureRef],
        views: &[Option<RhiTextureViewRef>],
    ) {
        // Barriers first (outside the render pass). A handle that is both
        // read and attached as read-only depth stays in DepthRead, which
        // permits shader reads alongside the read-only attachment.
        let read_only_depth = pass
            .depth_stencil
            .filter(|depth| depth.read_only)
            .map(|depth| depth.handle);
        for read in &pass.reads {
            if read_only_depth == Some(read.handle) {
                continue;
            }
            if let Some(entry) = resolved.get_mut(read.handle.0 as usize) {
                Self::transition(command, entry, TextureUsageKind::Sampled.required_state());
            }
        }
        for write in &pass.writes {
            if let Some(entry) = resolved.get_mut(write.handle.0 as usize) {
                Self::transition(command, entry, write.state);
            }
        }
        for color in &pass.colors {
            if let Some(entry) = resolved.get_mut(color.handle.0 as usize) {
                Self::transition(command, entry, TextureUsageKind::ColorTarget.required_state());
            }
        }
        if let Some(depth) = &pass.depth_stencil {
            if let Some(entry) = resolved.get_mut(depth.handle.0 as usize) {
                let usage = if depth.read_only {
                    TextureUsageKind::DepthRead
                } else {
                    TextureUsageKind::DepthWrite
                };
                Self::transition(command, entry, usage.required_state());
            }
        }

        // Assemble the RHI render pass.
        let mut info = RhiRenderPassInfo {
            name: pass.name.clone(),
            ..Default::default()
        };
        for color in &pass.colors {
            let Some(view) = views.get(color.handle.0 as usize).and_then(Option::as_ref) else {
                log::error!("pass '{}': missing color attachment view", pass.name);
                return;
            };
            let extent = resolved[color.handle.0 as usize].texture.info().extent;
            info.extent.width = info.extent.width.max(extent.width);
            info.extent.height = info.extent.height.max(extent.height);
            info.color_attachments.push(RhiColorAttachment {
                view: view.clone(),
                load_op: color.load_op,
                store_op: color.store_op,
                clear_color: color.clear_color,
            });
        }
        if let Some(depth) = &pass.depth_stencil {
            let Some(view) = views.get(depth.handle.0 as usize).and_then(Option::as_ref) else {
                log::error!("pass '{}': missing depth attachment view", pass.name);
                return;
            };
            let extent = resolved[depth.handle.0 as usize].texture.info().extent;
            info.extent.width = info.extent.width.max(extent.width);
            info.extent.height = info.extent.height.max(extent.height);
            info.depth_stencil = Some(RhiDepthStencilAttachment {
                view: view.clone(),
                load_op: depth.load_op,
                store_op: depth.store_op,
                depth_clear: depth.depth_clear,
                stencil_clear: depth.stencil_clear,
                read_only: depth.read_only,
            });
        }

        let render_pass = match backend.create_render_pass(&info) {
            Ok(render_pass) => render_pass,
            Err(e) => {
                log::error!("pass '{}': render pass creation failed: {e}", pass.name);
                return;
            }
        };

        command.begin_render_pass(&render_pass);
        if let Some(body) = pass.execute.take() {
            let mut context = RdgPassContext {
                command,
                textures,
                views,
            };
            body(&mut context);
        }
        command.end_render_pass();
        render_pass.destroy();
    }
}
