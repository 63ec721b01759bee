//! Render Dependency Graph
//!
//! A declarative per-frame graph of passes and transient resources. The
//! engine derives barrier placement, clear/load/store operations, and
//! execution order from the declarations instead of hand-ordering them.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ RdgBuilder (per frame)                                │
//! │   textures: transient | imported                      │
//! │   passes: attachments + reads + execute closure       │
//! ├──────────────────────────────────────────────────────┤
//! │ RdgExecutor                                           │
//! │   topo sort → barriers → RHI render passes → bodies   │
//! ├──────────────────────────────────────────────────────┤
//! │ TransientTexturePool (persistent across frames)       │
//! └──────────────────────────────────────────────────────┘
//! ```

mod builder;
mod executor;
mod transient_pool;

pub use builder::{RdgBuilder, RdgPassContext, RdgRenderPassBuilder, RdgTextureBuilder, RdgTextureHandle};
pub use executor::RdgExecutor;
pub use transient_pool::{PooledTexture, TransientTextureDesc, TransientTexturePool};
