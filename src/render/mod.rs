//! Rendering System
//!
//! The concrete engine on top of the RHI and RDG layers:
//!
//! - **[`resource`]**: render resource manager (per-frame uniform
//!   buffers, id allocators, fallback textures, shader cache), materials,
//!   meshes, models, textures, and the panorama converter.
//! - **[`passes`]**: depth pre-pass, G-buffer, deferred lighting, PBR and
//!   NPR forward, skybox, composite, and the depth-visualize debug pass.
//! - **[`system`]**: the per-frame driver orchestrating managers, the
//!   render graph, and presentation.
//!
//! # Control flow per frame
//!
//! ```text
//! scene tick → mesh manager (batches, camera) → light manager (lights)
//!   → per-frame CBVs → RdgBuilder (targets + passes) → RdgExecutor
//!   (barriers, order, draw recording) → swapchain present
//! ```

pub mod light_manager;
pub mod mesh_manager;
pub mod passes;
pub mod resource;
pub mod scene;
pub mod system;

use crate::rhi::types::RhiFormat;

// ─── Formats ──────────────────────────────────────────────────────────────────

/// Scene depth format.
pub const DEPTH_FORMAT: RhiFormat = RhiFormat::D32Float;
/// LDR color format (back buffer, G-buffer attribute targets).
pub const COLOR_FORMAT: RhiFormat = RhiFormat::Rgba8Unorm;
/// HDR lighting target format.
pub const HDR_COLOR_FORMAT: RhiFormat = RhiFormat::Rgba16Float;
/// G-buffer world-position + depth target.
pub const POSITION_DEPTH_FORMAT: RhiFormat = RhiFormat::Rgba32Float;

// ─── Limits ───────────────────────────────────────────────────────────────────

/// CPU-side frames in flight for the driver.
pub const FRAMES_IN_FLIGHT: usize = 2;
/// Triple buffering used by pass-internal per-frame constant buffers.
pub const PASS_FRAMES_IN_FLIGHT: usize = 3;

/// Capacity of the per-frame object buffer (and object-id space).
pub const MAX_PER_FRAME_OBJECT_SIZE: u32 = 4096;
/// Capacity of the material buffer (and material-id space).
pub const MAX_PER_FRAME_RESOURCE_SIZE: u32 = 4096;

/// Cascaded shadow map slice count for the directional light.
pub const DIRECTIONAL_SHADOW_CASCADE_LEVEL: u32 = 4;
/// Point lights that may own a shadow map.
pub const MAX_POINT_SHADOW_COUNT: u32 = 4;
/// Point lights consumed per frame.
pub const MAX_POINT_LIGHT_COUNT: u32 = 16;

/// Byte offset of the first point light inside the light buffer
/// (directional cascades come first).
pub const POINT_LIGHT_OFFSET: u64 = DIRECTIONAL_SHADOW_CASCADE_LEVEL as u64
    * std::mem::size_of::<resource::uniforms::DirectionalLightGpu>() as u64;

/// Uniform-offset alignment required by GPU backends for range binds.
pub const UNIFORM_ALIGNMENT: u64 = 256;
