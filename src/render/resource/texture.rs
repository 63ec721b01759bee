//! Texture Resource
//!
//! CPU-side texture asset plus its GPU objects. Supports 2D textures
//! from one file, cube maps from six files (+X, −X, +Y, −Y, +Z, −Z),
//! raw-pixel construction, and GPU-only render targets.
//!
//! Disk loads decode through the `image` crate, stage through a copy
//! buffer, and run barriers + buffer-to-texture copy + mip generation on
//! the backend's immediate command context, finishing in
//! `ShaderResource` state.

use std::path::Path;
use std::sync::Arc;

use crate::errors::{EmberError, Result};
use crate::rhi::types::{
    BufferCreation, BufferUsage, Extent3d, MemoryUsage, ResourceState, RhiBufferInfo,
    RhiBufferTextureCopy, RhiFormat, RhiTextureBarrier, RhiTextureInfo, RhiTextureViewInfo,
    SubresourceRange, TextureDimension, TextureUsage,
};
use crate::rhi::{
    RhiBackend, RhiBuffer, RhiCommandContext, RhiTexture, RhiTextureRef, RhiTextureViewRef,
};

use super::allocator::AllocatedId;
use super::manager::RenderResourceManager;

// wgpu requires row pitches aligned to 256 bytes for multi-row copies.
const ROW_ALIGNMENT: u32 = 256;

pub struct Texture {
    name: String,
    dimension: TextureDimension,
    format: RhiFormat,
    extent: Extent3d,
    mip_levels: u32,
    rhi_texture: Option<RhiTextureRef>,
    rhi_view: Option<RhiTextureViewRef>,
    /// Bindless id referenced from material GPU structs.
    texture_id: Option<AllocatedId>,
}

impl Texture {
    // ── Constructors ───────────────────────────────────────────────────────

    /// Load a 2D texture from disk.
    pub fn from_file(
        manager: &RenderResourceManager,
        path: impl AsRef<Path>,
        format: RhiFormat,
    ) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)?.to_rgba8();
        let (width, height) = image.dimensions();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "texture".to_string());
        let mut texture = Self::allocate(
            manager,
            name,
            TextureDimension::D2,
            format,
            Extent3d::new(width, height, 1),
            full_mip_count(width, height),
        )?;
        texture.upload_layers(manager, &[image.into_raw()])?;
        Ok(texture)
    }

    /// Load a cube map from six files ordered +X, −X, +Y, −Y, +Z, −Z.
    pub fn from_files(
        manager: &RenderResourceManager,
        paths: &[impl AsRef<Path>; 6],
        format: RhiFormat,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(6);
        let mut extent = Extent3d::new(1, 1, 1);
        for (index, path) in paths.iter().enumerate() {
            let image = image::open(path.as_ref())?.to_rgba8();
            let (width, height) = image.dimensions();
            if index == 0 {
                extent = Extent3d::new(width, height, 1);
            } else if extent.width != width || extent.height != height {
                return Err(EmberError::ImageDecodeError(format!(
                    "cube face {index} is {width}x{height}, expected {}x{}",
                    extent.width, extent.height
                )));
            }
            layers.push(image.into_raw());
        }
        let mut texture = Self::allocate(
            manager,
            "cube".to_string(),
            TextureDimension::Cube,
            format,
            extent,
            1,
        )?;
        texture.upload_layers(manager, &layers)?;
        Ok(texture)
    }

    /// 1×1 texture from a packed RGBA8 pixel. Failures are logged and
    /// leave the GPU side empty (callers fall back per slot).
    #[must_use]
    pub fn from_pixel(manager: &RenderResourceManager, pixel: u32, name: &'static str) -> Self {
        let result = Self::allocate(
            manager,
            name.to_string(),
            TextureDimension::D2,
            RhiFormat::Rgba8Unorm,
            Extent3d::new(1, 1, 1),
            1,
        )
        .and_then(|mut texture| {
            texture.upload_layers(manager, &[pixel.to_le_bytes().to_vec()])?;
            Ok(texture)
        });
        match result {
            Ok(texture) => texture,
            Err(e) => {
                log::error!("fallback texture '{name}' creation failed: {e}");
                Self {
                    name: name.to_string(),
                    dimension: TextureDimension::D2,
                    format: RhiFormat::Rgba8Unorm,
                    extent: Extent3d::new(1, 1, 1),
                    mip_levels: 1,
                    rhi_texture: None,
                    rhi_view: None,
                    texture_id: None,
                }
            }
        }
    }

    /// GPU-only render target (no CPU data, no upload).
    pub fn render_target(
        manager: &RenderResourceManager,
        name: impl Into<String>,
        format: RhiFormat,
        extent: Extent3d,
        dimension: TextureDimension,
        mip_levels: u32,
    ) -> Result<Self> {
        let mut info = RhiTextureInfo {
            dimension,
            format,
            extent,
            mip_levels,
            array_layers: if dimension == TextureDimension::Cube { 6 } else { 1 },
            usage: TextureUsage::SAMPLED
                | if format.is_depth() {
                    TextureUsage::DEPTH_TARGET
                } else {
                    TextureUsage::COLOR_TARGET
                },
            memory: MemoryUsage::GpuOnly,
            name: "",
        };
        if dimension == TextureDimension::Cube {
            info.usage |= TextureUsage::CUBE;
        }
        let name = name.into();
        let rhi_texture = manager.backend().create_texture(&info)?;
        let rhi_view = manager
            .backend()
            .create_texture_view(&RhiTextureViewInfo::full(rhi_texture.clone()))?;
        Ok(Self {
            name,
            dimension,
            format,
            extent,
            mip_levels,
            rhi_texture: Some(rhi_texture),
            rhi_view: Some(rhi_view),
            texture_id: Some(AllocatedId::acquire(manager.texture_id_allocator())),
        })
    }

    fn allocate(
        manager: &RenderResourceManager,
        name: String,
        dimension: TextureDimension,
        format: RhiFormat,
        extent: Extent3d,
        mip_levels: u32,
    ) -> Result<Self> {
        let mut usage = TextureUsage::SAMPLED | TextureUsage::COPY_DST | TextureUsage::COPY_SRC;
        if mip_levels > 1 {
            // Mips are rendered level-by-level at upload time.
            usage |= TextureUsage::COLOR_TARGET;
        }
        if dimension == TextureDimension::Cube {
            usage |= TextureUsage::CUBE;
        }
        let rhi_texture = manager.backend().create_texture(&RhiTextureInfo {
            dimension,
            format,
            extent,
            mip_levels,
            array_layers: if dimension == TextureDimension::Cube { 6 } else { 1 },
            usage,
            memory: MemoryUsage::GpuOnly,
            name: "",
        })?;
        let rhi_view = manager
            .backend()
            .create_texture_view(&RhiTextureViewInfo::full(rhi_texture.clone()))?;
        Ok(Self {
            name,
            dimension,
            format,
            extent,
            mip_levels,
            rhi_texture: Some(rhi_texture),
            rhi_view: Some(rhi_view),
            texture_id: Some(AllocatedId::acquire(manager.texture_id_allocator())),
        })
    }

    /// Wrap an existing RHI texture (used by the panorama converter for
    /// generated cube maps).
    #[must_use]
    pub fn from_rhi(
        manager: &RenderResourceManager,
        name: impl Into<String>,
        texture: RhiTextureRef,
        view: Option<RhiTextureViewRef>,
    ) -> Self {
        let info = texture.info().clone();
        Self {
            name: name.into(),
            dimension: info.dimension,
            format: info.format,
            extent: info.extent,
            mip_levels: info.mip_levels,
            rhi_texture: Some(texture),
            rhi_view: view,
            texture_id: Some(AllocatedId::acquire(manager.texture_id_allocator())),
        }
    }

    // ── Upload ─────────────────────────────────────────────────────────────

    /// Stage `layers` (tightly packed RGBA rows, one entry per array
    /// layer) and copy them into mip 0, then generate the mip chain and
    /// transition to `ShaderResource`.
    fn upload_layers(&mut self, manager: &RenderResourceManager, layers: &[Vec<u8>]) -> Result<()> {
        let Some(rhi_texture) = &self.rhi_texture else {
            return Ok(());
        };
        let backend = manager.backend();
        let bpt = self.format.bytes_per_texel();
        let tight_row = self.extent.width * bpt;
        let padded_row = tight_row.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT;
        let staging_layer_size = u64::from(padded_row) * u64::from(self.extent.height);

        let staging = backend.create_buffer(&RhiBufferInfo {
            size: staging_layer_size * layers.len() as u64,
            stride: 0,
            usage: BufferUsage::COPY_SRC,
            memory: MemoryUsage::CpuToGpu,
            creation: BufferCreation::PERSISTENT_MAP,
            name: "Texture Staging",
        })?;
        let region = staging.map().ok_or(EmberError::ResourceCreationFailed {
            what: "buffer",
            detail: "texture staging buffer is not mappable".to_string(),
        })?;

        for (layer_index, layer) in layers.iter().enumerate() {
            let base = staging_layer_size * layer_index as u64;
            for row in 0..self.extent.height as usize {
                let src = row * tight_row as usize;
                let src_end = (src + tight_row as usize).min(layer.len());
                region.write_bytes(
                    base + row as u64 * u64::from(padded_row),
                    &layer[src..src_end],
                );
            }
        }
        staging.unmap();

        let aspect = self.format.default_aspect();
        let command = backend.immediate_command();
        command.texture_barrier(&RhiTextureBarrier {
            texture: rhi_texture.clone(),
            old_state: ResourceState::Undefined,
            new_state: ResourceState::CopyDst,
            subresource: SubresourceRange::all(aspect),
        });
        for layer_index in 0..layers.len() {
            command.copy_buffer_to_texture(
                &staging,
                rhi_texture,
                &RhiBufferTextureCopy {
                    buffer_offset: staging_layer_size * layer_index as u64,
                    bytes_per_row: padded_row,
                    mip_level: 0,
                    array_layer: layer_index as u32,
                    extent: Extent3d::new(self.extent.width, self.extent.height, 1),
                },
            );
        }
        if self.mip_levels > 1 {
            command.generate_mips(rhi_texture);
        }
        command.texture_barrier(&RhiTextureBarrier {
            texture: rhi_texture.clone(),
            old_state: ResourceState::CopyDst,
            new_state: ResourceState::ShaderResource,
            subresource: SubresourceRange::all(aspect),
        });
        command.flush()?;
        Ok(())
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dimension(&self) -> TextureDimension {
        self.dimension
    }

    #[must_use]
    pub fn format(&self) -> RhiFormat {
        self.format
    }

    #[must_use]
    pub fn extent(&self) -> Extent3d {
        self.extent
    }

    #[must_use]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[must_use]
    pub fn rhi_texture(&self) -> Option<&RhiTextureRef> {
        self.rhi_texture.as_ref()
    }

    #[must_use]
    pub fn rhi_view(&self) -> Option<&RhiTextureViewRef> {
        self.rhi_view.as_ref()
    }

    /// Bindless id for material GPU structs; 0 when unallocated.
    #[must_use]
    pub fn texture_id(&self) -> u32 {
        self.texture_id.as_ref().map_or(0, AllocatedId::id)
    }
}

pub type TextureRef = Arc<Texture>;

/// Full mip chain length for a 2D extent.
#[must_use]
pub fn full_mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_matches_log2() {
        assert_eq!(full_mip_count(1, 1), 1);
        assert_eq!(full_mip_count(2, 2), 2);
        assert_eq!(full_mip_count(256, 256), 9);
        assert_eq!(full_mip_count(640, 480), 10);
    }
}
