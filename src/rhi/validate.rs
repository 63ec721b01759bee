//! Descriptor Validation
//!
//! Backend-shared checks run before any native allocation, so every
//! backend rejects the same invalid descriptors with the same errors.

use crate::errors::{EmberError, Result};

use super::types::{
    BufferCreation, BufferUsage, MemoryUsage, RhiBufferInfo, RhiTextureInfo, TextureDimension,
};

pub fn validate_buffer_info(info: &RhiBufferInfo) -> Result<()> {
    if info.size == 0 {
        return Err(EmberError::ResourceCreationFailed {
            what: "buffer",
            detail: format!("buffer '{}' has zero size", info.name),
        });
    }
    if info.creation.contains(BufferCreation::PERSISTENT_MAP) && !info.memory.cpu_visible() {
        return Err(EmberError::ResourceCreationFailed {
            what: "buffer",
            detail: format!(
                "buffer '{}' requests persistent map on GPU-only memory",
                info.name
            ),
        });
    }
    if info.memory == MemoryUsage::CpuOnly {
        let gpu_binds = BufferUsage::VERTEX
            | BufferUsage::INDEX
            | BufferUsage::UNIFORM
            | BufferUsage::STORAGE
            | BufferUsage::INDIRECT;
        if info.usage.intersects(gpu_binds) {
            return Err(EmberError::ResourceCreationFailed {
                what: "buffer",
                detail: format!(
                    "buffer '{}' binds CPU-only memory to the GPU ({:?})",
                    info.name, info.usage
                ),
            });
        }
    }
    Ok(())
}

pub fn validate_texture_info(info: &RhiTextureInfo) -> Result<()> {
    if info.extent.width == 0 || info.extent.height == 0 || info.extent.depth == 0 {
        return Err(EmberError::ResourceCreationFailed {
            what: "texture",
            detail: format!("texture '{}' has a zero extent", info.name),
        });
    }
    if info.dimension == TextureDimension::Cube && info.array_layers != 6 {
        return Err(EmberError::ResourceCreationFailed {
            what: "texture",
            detail: format!(
                "cube texture '{}' must have 6 layers, got {}",
                info.name, info.array_layers
            ),
        });
    }
    Ok(())
}
