//! Render Graph Builder
//!
//! Declarative per-frame expression of render targets, attachments, and
//! passes. A builder is created fresh each frame, filled by the passes,
//! and consumed by the executor.
//!
//! ```ignore
//! let mut builder = RdgBuilder::new();
//! let depth = builder
//!     .create_texture("SceneDepth")
//!     .extent(extent)
//!     .format(RhiFormat::D32Float)
//!     .allow_depth_stencil()
//!     .finish();
//!
//! builder
//!     .create_render_pass("DepthPrePass")
//!     .depth_stencil(depth, AttachmentLoadOp::Clear, AttachmentStoreOp::Store, 1.0, 0, false)
//!     .execute(move |ctx| { /* record draws */ })
//!     .finish();
//! ```

use smallvec::SmallVec;

use crate::rhi::types::{
    AttachmentLoadOp, AttachmentStoreOp, Extent2d, ResourceState, RhiFormat, SubresourceRange,
    TextureUsage,
};
use crate::rhi::{RhiCommandContextRef, RhiTextureRef, RhiTextureViewRef};

// ─── Handles ──────────────────────────────────────────────────────────────────

/// Opaque handle to a graph texture.
///
/// Valid only within the builder that created it; consumed by the
/// executor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RdgTextureHandle(pub(crate) u32);

// ─── Texture declarations ─────────────────────────────────────────────────────

pub(crate) enum RdgTextureKind {
    Transient {
        extent: Extent2d,
        format: RhiFormat,
        mip_levels: u32,
        usage: TextureUsage,
    },
    Imported {
        texture: RhiTextureRef,
        initial_state: ResourceState,
    },
}

pub(crate) struct RdgTextureDecl {
    pub name: String,
    pub kind: RdgTextureKind,
}

/// Fluent builder for one graph texture.
pub struct RdgTextureBuilder<'graph, 'builder> {
    builder: &'builder mut RdgBuilder<'graph>,
    name: String,
    extent: Extent2d,
    format: RhiFormat,
    mip_levels: u32,
    usage: TextureUsage,
    import: Option<(RhiTextureRef, ResourceState)>,
}

impl<'graph> RdgTextureBuilder<'graph, '_> {
    #[must_use]
    pub fn extent(mut self, extent: Extent2d) -> Self {
        self.extent = extent;
        self
    }

    #[must_use]
    pub fn format(mut self, format: RhiFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    #[must_use]
    pub fn allow_render_target(mut self) -> Self {
        self.usage |= TextureUsage::COLOR_TARGET;
        self
    }

    #[must_use]
    pub fn allow_depth_stencil(mut self) -> Self {
        self.usage |= TextureUsage::DEPTH_TARGET;
        self
    }

    #[must_use]
    pub fn allow_sampled(mut self) -> Self {
        self.usage |= TextureUsage::SAMPLED;
        self
    }

    /// Allow UAV-style storage access (see
    /// [`RdgRenderPassBuilder::write`]).
    #[must_use]
    pub fn allow_storage(mut self) -> Self {
        self.usage |= TextureUsage::STORAGE;
        self
    }

    /// Import an existing RHI texture with its current state. The
    /// executor will not allocate or pool it.
    #[must_use]
    pub fn import(mut self, texture: RhiTextureRef, initial_state: ResourceState) -> Self {
        self.import = Some((texture, initial_state));
        self
    }

    /// Commit the declaration and obtain its handle.
    pub fn finish(self) -> RdgTextureHandle {
        let kind = match self.import {
            Some((texture, initial_state)) => RdgTextureKind::Imported {
                texture,
                initial_state,
            },
            None => RdgTextureKind::Transient {
                extent: self.extent,
                format: self.format,
                mip_levels: self.mip_levels,
                usage: self.usage | TextureUsage::SAMPLED,
            },
        };
        let handle = RdgTextureHandle(self.builder.textures.len() as u32);
        self.builder.textures.push(RdgTextureDecl {
            name: self.name,
            kind,
        });
        handle
    }
}

// ─── Pass declarations ────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
pub(crate) struct RdgColorAttachment {
    pub handle: RdgTextureHandle,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

#[derive(Clone, Copy)]
pub(crate) struct RdgDepthAttachment {
    pub handle: RdgTextureHandle,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
    pub depth_clear: f32,
    pub stencil_clear: u32,
    pub read_only: bool,
}

#[derive(Clone, Copy)]
pub(crate) struct RdgRead {
    pub handle: RdgTextureHandle,
    pub subresource: SubresourceRange,
}

/// A non-attachment write dependency (UAV-style storage access).
#[derive(Clone, Copy)]
pub(crate) struct RdgWrite {
    pub handle: RdgTextureHandle,
    pub state: ResourceState,
}

/// The executor-facing context handed to a pass body.
pub struct RdgPassContext<'a> {
    /// The frame's command recorder, inside this pass's render pass.
    pub command: &'a RhiCommandContextRef,
    pub(crate) textures: &'a [RhiTextureRef],
    pub(crate) views: &'a [Option<RhiTextureViewRef>],
}

impl RdgPassContext<'_> {
    /// The RHI texture behind a graph handle.
    #[must_use]
    pub fn texture(&self, handle: RdgTextureHandle) -> Option<&RhiTextureRef> {
        self.textures.get(handle.0 as usize)
    }

    /// The full default view of a graph texture.
    #[must_use]
    pub fn view(&self, handle: RdgTextureHandle) -> Option<&RhiTextureViewRef> {
        self.views.get(handle.0 as usize).and_then(Option::as_ref)
    }
}

pub(crate) type PassExecuteFn<'graph> = Box<dyn FnOnce(&mut RdgPassContext<'_>) + 'graph>;

pub(crate) struct RdgPassDecl<'graph> {
    pub name: String,
    pub colors: SmallVec<[RdgColorAttachment; 8]>,
    pub depth_stencil: Option<RdgDepthAttachment>,
    pub reads: SmallVec<[RdgRead; 8]>,
    pub writes: SmallVec<[RdgWrite; 4]>,
    pub execute: Option<PassExecuteFn<'graph>>,
}

/// Fluent builder for one render pass.
pub struct RdgRenderPassBuilder<'graph, 'builder> {
    builder: &'builder mut RdgBuilder<'graph>,
    decl: RdgPassDecl<'graph>,
}

impl<'graph> RdgRenderPassBuilder<'graph, '_> {
    /// Add a color attachment at `slot`. Slots must be added in order.
    #[must_use]
    pub fn color(
        mut self,
        slot: u32,
        handle: RdgTextureHandle,
        load_op: AttachmentLoadOp,
        store_op: AttachmentStoreOp,
        clear_color: [f32; 4],
    ) -> Self {
        if slot as usize != self.decl.colors.len() {
            log::warn!(
                "pass '{}': color slot {} declared out of order",
                self.decl.name,
                slot
            );
        }
        self.decl.colors.push(RdgColorAttachment {
            handle,
            load_op,
            store_op,
            clear_color,
        });
        self
    }

    /// Set the depth/stencil attachment.
    #[must_use]
    pub fn depth_stencil(
        mut self,
        handle: RdgTextureHandle,
        load_op: AttachmentLoadOp,
        store_op: AttachmentStoreOp,
        depth_clear: f32,
        stencil_clear: u32,
        read_only: bool,
    ) -> Self {
        self.decl.depth_stencil = Some(RdgDepthAttachment {
            handle,
            load_op,
            store_op,
            depth_clear,
            stencil_clear,
            read_only,
        });
        self
    }

    /// Declare an SRV-style read dependency used inside the pass body.
    #[must_use]
    pub fn read(mut self, handle: RdgTextureHandle, subresource: SubresourceRange) -> Self {
        self.decl.reads.push(RdgRead {
            handle,
            subresource,
        });
        self
    }

    /// Declare a non-attachment write dependency in `state` (UAV-style
    /// storage writes). The pass is scheduled as a writer of `handle`
    /// and the texture is transitioned to `state` before the pass runs.
    #[must_use]
    pub fn write(mut self, handle: RdgTextureHandle, state: ResourceState) -> Self {
        self.decl.writes.push(RdgWrite { handle, state });
        self
    }

    /// Set the pass body, invoked between `begin_render_pass` and
    /// `end_render_pass` during execution.
    #[must_use]
    pub fn execute(mut self, body: impl FnOnce(&mut RdgPassContext<'_>) + 'graph) -> Self {
        self.decl.execute = Some(Box::new(body));
        self
    }

    /// Commit the pass.
    pub fn finish(self) {
        self.builder.passes.push(self.decl);
    }
}

// ─── The builder ──────────────────────────────────────────────────────────────

/// Per-frame render graph builder.
///
/// Short-lived: built once per frame and consumed by
/// [`RdgExecutor::execute`](crate::rdg::RdgExecutor::execute). The
/// lifetime parameter lets pass bodies borrow pass state for the frame.
#[derive(Default)]
pub struct RdgBuilder<'graph> {
    pub(crate) textures: Vec<RdgTextureDecl>,
    pub(crate) passes: Vec<RdgPassDecl<'graph>>,
}

impl<'graph> RdgBuilder<'graph> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            textures: Vec::new(),
            passes: Vec::new(),
        }
    }

    /// Declare a graph texture.
    pub fn create_texture(&mut self, name: impl Into<String>) -> RdgTextureBuilder<'graph, '_> {
        RdgTextureBuilder {
            builder: self,
            name: name.into(),
            extent: Extent2d::new(1, 1),
            format: RhiFormat::Rgba8Unorm,
            mip_levels: 1,
            usage: TextureUsage::empty(),
            import: None,
        }
    }

    /// Declare a render pass.
    pub fn create_render_pass(
        &mut self,
        name: impl Into<String>,
    ) -> RdgRenderPassBuilder<'graph, '_> {
        RdgRenderPassBuilder {
            builder: self,
            decl: RdgPassDecl {
                name: name.into(),
                colors: SmallVec::new(),
                depth_stencil: None,
                reads: SmallVec::new(),
                writes: SmallVec::new(),
                execute: None,
            },
        }
    }

    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }
}
