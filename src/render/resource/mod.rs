//! Render Resources
//!
//! Process-wide GPU resources and the assets that feed draw calls:
//! the resource manager (per-frame uniforms, id allocators, fallback
//! textures, shader cache), materials, meshes, models, textures, and
//! the panorama-to-cube converter.

pub mod allocator;
pub mod manager;
pub mod material;
pub mod mesh;
pub mod model;
pub mod panorama;
pub mod texture;
pub mod uniforms;

pub use allocator::{AllocatedId, IndexAllocator};
pub use manager::RenderResourceManager;
pub use material::{Material, MaterialKind, MaterialRef, NprMaterial, PbrMaterial, SkyboxMaterial};
pub use mesh::Mesh;
pub use model::{MaterialImportType, Model, ModelProcessSetting};
pub use panorama::PanoramaConverter;
pub use texture::{Texture, TextureRef};
