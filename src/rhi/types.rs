//! RHI Descriptor Types
//!
//! Plain-data descriptors consumed by the RHI factories, plus the enums
//! shared by every backend (formats, resource states, usage flags).
//! All descriptors are backend-agnostic; backends translate them into
//! their native API at creation time.

use bitflags::bitflags;
use smallvec::SmallVec;

use super::{RhiRootSignatureRef, RhiShaderRef, RhiTexture, RhiTextureRef, RhiTextureViewRef};

// ─── Extents & Offsets ────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3d {
    #[must_use]
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
}

impl Default for Extent3d {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Offset2d {
    pub x: i32,
    pub y: i32,
}

// ─── Formats ──────────────────────────────────────────────────────────────────

/// Texture and vertex-attribute formats used by the engine core.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum RhiFormat {
    #[default]
    Undefined,
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Float,
    R32Uint,
    D32Float,
    D24UnormS8Uint,
}

impl RhiFormat {
    /// Whether this is a depth or depth-stencil format.
    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::D32Float | Self::D24UnormS8Uint)
    }

    /// Whether this format carries a stencil aspect.
    #[must_use]
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint)
    }

    /// The default aspect a view of this format covers.
    #[must_use]
    pub fn default_aspect(self) -> TextureAspect {
        match self {
            Self::D32Float => TextureAspect::Depth,
            Self::D24UnormS8Uint => TextureAspect::DepthStencil,
            _ => TextureAspect::Color,
        }
    }

    /// Bytes per texel (uncompressed formats only).
    #[must_use]
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Self::Undefined => 0,
            Self::R8Unorm => 1,
            Self::Rg8Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8Srgb
            | Self::Bgra8Unorm
            | Self::Bgra8Srgb
            | Self::R32Float
            | Self::R32Uint
            | Self::D32Float
            | Self::D24UnormS8Uint => 4,
            Self::R16Float => 2,
            Self::Rg16Float => 4,
            Self::Rgba16Float | Self::Rg32Float => 8,
            Self::Rgb32Float => 12,
            Self::Rgba32Float => 16,
        }
    }
}

// ─── Resource States ──────────────────────────────────────────────────────────

/// The logical GPU state a resource is in.
///
/// Barriers carry an old and a new state; the backends validate the
/// transition (see [`crate::rhi::state`]) and track per-subresource state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum ResourceState {
    #[default]
    Undefined,
    Common,
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    DepthWrite,
    DepthRead,
    ShaderResource,
    UnorderedAccess,
    CopySrc,
    CopyDst,
    Present,
}

// ─── Usage & Memory Flags ─────────────────────────────────────────────────────

bitflags! {
    /// Buffer bind/usage flags.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct BufferUsage: u32 {
        const VERTEX   = 1 << 0;
        const INDEX    = 1 << 1;
        const UNIFORM  = 1 << 2;
        const STORAGE  = 1 << 3;
        const INDIRECT = 1 << 4;
        const COPY_SRC = 1 << 5;
        const COPY_DST = 1 << 6;
    }
}

bitflags! {
    /// Texture usage flags.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct TextureUsage: u32 {
        const SAMPLED      = 1 << 0;
        const STORAGE      = 1 << 1;
        const COLOR_TARGET = 1 << 2;
        const DEPTH_TARGET = 1 << 3;
        const COPY_SRC     = 1 << 4;
        const COPY_DST     = 1 << 5;
        /// The texture may be viewed as a cube map.
        const CUBE         = 1 << 6;
    }
}

bitflags! {
    /// Buffer creation flags.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct BufferCreation: u32 {
        /// Keep the buffer permanently mappable; `map()` returns the same
        /// region for the buffer's whole lifetime. Requires `CpuToGpu` or
        /// `CpuOnly` memory.
        const PERSISTENT_MAP = 1 << 0;
    }
}

/// Memory class a resource is allocated from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum MemoryUsage {
    #[default]
    GpuOnly,
    CpuToGpu,
    CpuOnly,
}

impl MemoryUsage {
    #[must_use]
    pub fn cpu_visible(self) -> bool {
        matches!(self, Self::CpuToGpu | Self::CpuOnly)
    }
}

bitflags! {
    /// Shader stages a binding is visible to.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct ShaderStages: u32 {
        const VERTEX   = 1 << 0;
        const GEOMETRY = 1 << 1;
        const FRAGMENT = 1 << 2;
        const COMPUTE  = 1 << 3;
    }
}

/// The single stage a shader module is compiled for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ShaderFrequency {
    Vertex,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderFrequency {
    #[must_use]
    pub fn stage(self) -> ShaderStages {
        match self {
            Self::Vertex => ShaderStages::VERTEX,
            Self::Geometry => ShaderStages::GEOMETRY,
            Self::Fragment => ShaderStages::FRAGMENT,
            Self::Compute => ShaderStages::COMPUTE,
        }
    }
}

// ─── Subresources ─────────────────────────────────────────────────────────────

/// Which aspect(s) of a texture a view or barrier covers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum TextureAspect {
    #[default]
    Color,
    Depth,
    Stencil,
    DepthStencil,
}

/// Sentinel meaning "all remaining mips / layers".
pub const SUBRESOURCE_ALL: u32 = u32::MAX;

/// A mip/layer range within a texture.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SubresourceRange {
    pub aspect: TextureAspect,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    /// Every mip and layer of the given aspect.
    #[must_use]
    pub const fn all(aspect: TextureAspect) -> Self {
        Self {
            aspect,
            base_mip: 0,
            mip_count: SUBRESOURCE_ALL,
            base_layer: 0,
            layer_count: SUBRESOURCE_ALL,
        }
    }

    /// Resolve sentinel counts against a concrete texture shape.
    #[must_use]
    pub fn resolve(&self, mip_levels: u32, array_layers: u32) -> Self {
        let mip_count = if self.mip_count == SUBRESOURCE_ALL {
            mip_levels.saturating_sub(self.base_mip)
        } else {
            self.mip_count
        };
        let layer_count = if self.layer_count == SUBRESOURCE_ALL {
            array_layers.saturating_sub(self.base_layer)
        } else {
            self.layer_count
        };
        Self {
            aspect: self.aspect,
            base_mip: self.base_mip,
            mip_count,
            base_layer: self.base_layer,
            layer_count,
        }
    }
}

impl Default for SubresourceRange {
    fn default() -> Self {
        Self::all(TextureAspect::Color)
    }
}

// ─── Resource Descriptors ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct RhiBufferInfo {
    pub size: u64,
    /// Element stride for structured access; 0 when not applicable.
    pub stride: u32,
    pub usage: BufferUsage,
    pub memory: MemoryUsage,
    pub creation: BufferCreation,
    pub name: &'static str,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum TextureDimension {
    #[default]
    D2,
    D2Array,
    Cube,
    D3,
}

#[derive(Clone, Debug)]
pub struct RhiTextureInfo {
    pub dimension: TextureDimension,
    pub format: RhiFormat,
    pub extent: Extent3d,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage: TextureUsage,
    pub memory: MemoryUsage,
    pub name: &'static str,
}

impl Default for RhiTextureInfo {
    fn default() -> Self {
        Self {
            dimension: TextureDimension::D2,
            format: RhiFormat::Rgba8Unorm,
            extent: Extent3d::default(),
            mip_levels: 1,
            array_layers: 1,
            usage: TextureUsage::SAMPLED,
            memory: MemoryUsage::GpuOnly,
            name: "",
        }
    }
}

/// How a texture view interprets its texture.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum TextureViewType {
    #[default]
    D2,
    D2Array,
    Cube,
    D3,
}

#[derive(Clone)]
pub struct RhiTextureViewInfo {
    pub texture: RhiTextureRef,
    /// `Undefined` inherits the texture's format.
    pub format: RhiFormat,
    pub view_type: TextureViewType,
    /// Aspect is derived from the format unless explicitly set here.
    pub subresource: SubresourceRange,
}

impl RhiTextureViewInfo {
    /// A full view of `texture` with everything derived.
    #[must_use]
    pub fn full(texture: RhiTextureRef) -> Self {
        let aspect = texture.info().format.default_aspect();
        let view_type = match texture.info().dimension {
            TextureDimension::D2 => TextureViewType::D2,
            TextureDimension::D2Array => TextureViewType::D2Array,
            TextureDimension::Cube => TextureViewType::Cube,
            TextureDimension::D3 => TextureViewType::D3,
        };
        Self {
            texture,
            format: RhiFormat::Undefined,
            view_type,
            subresource: SubresourceRange::all(aspect),
        }
    }
}

// ─── Sampler ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirrorRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum BorderColor {
    #[default]
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

#[derive(Clone, Debug)]
pub struct RhiSamplerInfo {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mip_mode: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub max_anisotropy: f32,
    pub border_color: BorderColor,
    pub name: &'static str,
}

impl Default for RhiSamplerInfo {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mip_mode: FilterMode::Linear,
            address_u: AddressMode::Repeat,
            address_v: AddressMode::Repeat,
            address_w: AddressMode::Repeat,
            max_anisotropy: 1.0,
            border_color: BorderColor::TransparentBlack,
            name: "",
        }
    }
}

// ─── Shader ───────────────────────────────────────────────────────────────────

/// A shader module descriptor.
///
/// `code` is the backend's accepted bytecode; for the wgpu backend this is
/// WGSL source bytes (UTF-8). Precompiled bytes loaded from disk are always
/// accepted as-is.
#[derive(Clone, Debug)]
pub struct RhiShaderInfo {
    pub frequency: ShaderFrequency,
    pub entry: String,
    pub code: Vec<u8>,
    pub name: String,
}

// ─── Root Signature ───────────────────────────────────────────────────────────

/// A constant-buffer or sampler slot declaration.
#[derive(Clone, Copy, Debug)]
pub struct BindingSlot {
    pub slot: u32,
    pub stages: ShaderStages,
}

/// A texture (SRV) slot declaration.
#[derive(Clone, Copy, Debug)]
pub struct TextureBindingSlot {
    pub slot: u32,
    pub stages: ShaderStages,
    pub dimension: TextureViewType,
    /// Depth textures bind as non-filterable.
    pub depth: bool,
}

/// The descriptor-binding schema shared by a pipeline.
///
/// Slots map to the shader-visible register spaces: constant buffers `b#`,
/// textures `t#`, samplers `s#`. Backends with descriptor-set binding
/// models derive their layouts from this schema.
#[derive(Clone, Debug, Default)]
pub struct RhiRootSignatureInfo {
    pub constant_buffers: Vec<BindingSlot>,
    pub textures: Vec<TextureBindingSlot>,
    pub samplers: Vec<BindingSlot>,
    pub name: &'static str,
}

// ─── Graphics Pipeline ────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    #[default]
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub depth_clip: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            fill_mode: FillMode::Solid,
            depth_clip: true,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare: CompareFunction::LessEqual,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct ColorWriteMask: u32 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const ALL = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Per-render-target blend state.
#[derive(Clone, Copy, Debug)]
pub struct BlendTargetState {
    pub enable: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: ColorWriteMask,
}

impl Default for BlendTargetState {
    fn default() -> Self {
        Self {
            enable: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: ColorWriteMask::ALL,
        }
    }
}

impl BlendTargetState {
    /// Additive blending (src + dst), used by lighting composition.
    #[must_use]
    pub fn additive() -> Self {
        Self {
            enable: true,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::One,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::One,
            alpha_op: BlendOp::Add,
            write_mask: ColorWriteMask::ALL,
        }
    }
}

/// One vertex attribute sourced from a bound vertex-buffer stream.
#[derive(Clone, Copy, Debug)]
pub struct VertexElement {
    /// Which vertex-buffer bind slot feeds this attribute.
    pub stream_index: u32,
    /// The shader-side attribute location.
    pub location: u32,
    pub format: RhiFormat,
    pub offset: u32,
    /// Stream stride; 0 means tightly packed (`format` size).
    pub stride: u32,
}

#[derive(Clone)]
pub struct RhiGraphicsPipelineInfo {
    pub vertex_shader: Option<RhiShaderRef>,
    pub geometry_shader: Option<RhiShaderRef>,
    pub fragment_shader: Option<RhiShaderRef>,
    pub root_signature: Option<RhiRootSignatureRef>,
    pub vertex_elements: Vec<VertexElement>,
    pub primitive_topology: PrimitiveTopology,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub blend_targets: SmallVec<[BlendTargetState; 8]>,
    pub color_formats: SmallVec<[RhiFormat; 8]>,
    pub depth_stencil_format: Option<RhiFormat>,
    pub name: &'static str,
}

impl Default for RhiGraphicsPipelineInfo {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            geometry_shader: None,
            fragment_shader: None,
            root_signature: None,
            vertex_elements: Vec::new(),
            primitive_topology: PrimitiveTopology::TriangleList,
            rasterizer: RasterizerState::default(),
            depth_stencil: DepthStencilState::default(),
            blend_targets: SmallVec::new(),
            color_formats: SmallVec::new(),
            depth_stencil_format: None,
            name: "",
        }
    }
}

// ─── Render Pass ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum AttachmentLoadOp {
    #[default]
    DontCare,
    Load,
    Clear,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum AttachmentStoreOp {
    #[default]
    Store,
    DontCare,
}

#[derive(Clone)]
pub struct RhiColorAttachment {
    pub view: RhiTextureViewRef,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

#[derive(Clone)]
pub struct RhiDepthStencilAttachment {
    pub view: RhiTextureViewRef,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
    pub depth_clear: f32,
    pub stencil_clear: u32,
    pub read_only: bool,
}

/// Immutable description of one render pass instance.
#[derive(Clone, Default)]
pub struct RhiRenderPassInfo {
    pub color_attachments: SmallVec<[RhiColorAttachment; 8]>,
    pub depth_stencil: Option<RhiDepthStencilAttachment>,
    pub extent: Extent2d,
    pub name: String,
}

// ─── Barriers & Copies ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RhiTextureBarrier {
    pub texture: RhiTextureRef,
    pub old_state: ResourceState,
    pub new_state: ResourceState,
    pub subresource: SubresourceRange,
}

#[derive(Clone)]
pub struct RhiBufferBarrier {
    pub buffer: super::RhiBufferRef,
    pub old_state: ResourceState,
    pub new_state: ResourceState,
}

/// One buffer <-> texture copy region.
#[derive(Clone, Copy, Debug)]
pub struct RhiBufferTextureCopy {
    pub buffer_offset: u64,
    /// Row pitch in bytes; 0 means tightly packed.
    pub bytes_per_row: u32,
    pub mip_level: u32,
    pub array_layer: u32,
    pub extent: Extent3d,
}

impl Default for RhiBufferTextureCopy {
    fn default() -> Self {
        Self {
            buffer_offset: 0,
            bytes_per_row: 0,
            mip_level: 0,
            array_layer: 0,
            extent: Extent3d::default(),
        }
    }
}

// ─── Swapchain ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
pub struct RhiSwapchainInfo {
    pub extent: Extent2d,
    pub format: RhiFormat,
    /// Back-buffer count (frames in flight).
    pub image_count: u32,
    pub vsync: bool,
}

impl Default for RhiSwapchainInfo {
    fn default() -> Self {
        Self {
            extent: Extent2d::new(1280, 720),
            format: RhiFormat::Bgra8Unorm,
            image_count: 2,
            vsync: true,
        }
    }
}
