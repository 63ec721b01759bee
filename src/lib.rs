#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Ember — a small real-time 3D engine core.
//!
//! Three tightly-coupled subsystems make up the crate:
//!
//! - **[`rhi`]**: a backend-agnostic, handle-based render hardware
//!   interface with explicit resource states, command recording, and two
//!   backends (wgpu and a CPU headless reference).
//! - **[`rdg`]**: a per-frame declarative render dependency graph that
//!   derives barrier placement, load/store operations, and execution
//!   order.
//! - **[`render`]**: the concrete pass pipeline (depth pre-pass,
//!   G-buffer, deferred lighting, PBR/NPR forward, skybox, composite)
//!   and the resource/mesh/light managers feeding it, driven by
//!   [`render::system::RenderSystem`].

pub mod assets;
pub mod errors;
pub mod rdg;
pub mod render;
pub mod rhi;

pub use assets::{AssetRoots, AssetUid};
pub use errors::{EmberError, Result};
pub use rdg::{RdgBuilder, RdgExecutor, RdgTextureHandle, TransientTexturePool};
pub use render::resource::{
    Material, MaterialKind, MaterialRef, Mesh, Model, ModelProcessSetting, RenderResourceManager,
    Texture,
};
pub use render::scene::{
    CameraInfo, DirectionalLightInfo, DrawBatch, PointLightInfo, RenderPacket, RenderScene,
};
pub use render::system::RenderSystem;
pub use rhi::headless::HeadlessBackend;
pub use rhi::wgpu_backend::WgpuBackend;
pub use rhi::{RhiBackend, RhiBackendRef};
