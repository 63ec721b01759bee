//! RHI -> wgpu Enum Conversions

use crate::rhi::types::{
    AddressMode, AttachmentLoadOp, AttachmentStoreOp, BlendFactor, BlendOp, BlendTargetState,
    BufferUsage, ColorWriteMask, CompareFunction, CullMode, FilterMode, MemoryUsage,
    PrimitiveTopology, RhiFormat, ShaderStages, TextureDimension, TextureUsage, TextureViewType,
};

pub fn texture_format(format: RhiFormat) -> wgpu::TextureFormat {
    match format {
        RhiFormat::Undefined | RhiFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        RhiFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        RhiFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
        RhiFormat::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        RhiFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        RhiFormat::Bgra8Srgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        RhiFormat::R16Float => wgpu::TextureFormat::R16Float,
        RhiFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        RhiFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        RhiFormat::R32Float => wgpu::TextureFormat::R32Float,
        RhiFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        // Rgb32Float is not a texture format in WebGPU; widen.
        RhiFormat::Rgb32Float | RhiFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        RhiFormat::R32Uint => wgpu::TextureFormat::R32Uint,
        RhiFormat::D32Float => wgpu::TextureFormat::Depth32Float,
        RhiFormat::D24UnormS8Uint => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

/// Best-effort reverse mapping, used to report the surface's actual
/// format back through the RHI.
pub fn rhi_format_from_wgpu(format: wgpu::TextureFormat) -> RhiFormat {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => RhiFormat::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => RhiFormat::Rgba8Srgb,
        wgpu::TextureFormat::Bgra8Unorm => RhiFormat::Bgra8Unorm,
        wgpu::TextureFormat::Bgra8UnormSrgb => RhiFormat::Bgra8Srgb,
        wgpu::TextureFormat::Rgba16Float => RhiFormat::Rgba16Float,
        other => {
            log::warn!("surface format {other:?} has no RHI equivalent, reporting Bgra8Unorm");
            RhiFormat::Bgra8Unorm
        }
    }
}

pub fn vertex_format(format: RhiFormat) -> wgpu::VertexFormat {
    match format {
        RhiFormat::R32Float => wgpu::VertexFormat::Float32,
        RhiFormat::Rg32Float => wgpu::VertexFormat::Float32x2,
        RhiFormat::Rgb32Float => wgpu::VertexFormat::Float32x3,
        RhiFormat::Rgba32Float => wgpu::VertexFormat::Float32x4,
        RhiFormat::Rgba8Unorm => wgpu::VertexFormat::Unorm8x4,
        RhiFormat::R32Uint => wgpu::VertexFormat::Uint32,
        other => {
            log::warn!("unsupported vertex format {other:?}, defaulting to Float32x4");
            wgpu::VertexFormat::Float32x4
        }
    }
}

pub fn compare_function(func: CompareFunction) -> wgpu::CompareFunction {
    match func {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

pub fn cull_mode(mode: CullMode) -> Option<wgpu::Face> {
    match mode {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

pub fn topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
        PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
        PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

pub fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

pub fn mipmap_filter_mode(mode: FilterMode) -> wgpu::MipmapFilterMode {
    match mode {
        FilterMode::Nearest => wgpu::MipmapFilterMode::Nearest,
        FilterMode::Linear => wgpu::MipmapFilterMode::Linear,
    }
}

pub fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::ClampToBorder => wgpu::AddressMode::ClampToBorder,
    }
}

pub fn shader_stages(stages: ShaderStages) -> wgpu::ShaderStages {
    let mut out = wgpu::ShaderStages::NONE;
    if stages.contains(ShaderStages::VERTEX) || stages.contains(ShaderStages::GEOMETRY) {
        out |= wgpu::ShaderStages::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        out |= wgpu::ShaderStages::FRAGMENT;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        out |= wgpu::ShaderStages::COMPUTE;
    }
    out
}

pub fn view_dimension(view_type: TextureViewType) -> wgpu::TextureViewDimension {
    match view_type {
        TextureViewType::D2 => wgpu::TextureViewDimension::D2,
        TextureViewType::D2Array => wgpu::TextureViewDimension::D2Array,
        TextureViewType::Cube => wgpu::TextureViewDimension::Cube,
        TextureViewType::D3 => wgpu::TextureViewDimension::D3,
    }
}

pub fn texture_usages(usage: TextureUsage, format: RhiFormat) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC;
    if usage.contains(TextureUsage::SAMPLED) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::STORAGE) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsage::COLOR_TARGET)
        || usage.contains(TextureUsage::DEPTH_TARGET)
        || format.is_depth()
    {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    out
}

pub fn buffer_usages(usage: BufferUsage, memory: MemoryUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsage::VERTEX) {
        out |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        out |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        out |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::STORAGE) {
        out |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        out |= wgpu::BufferUsages::INDIRECT;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        out |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        out |= wgpu::BufferUsages::COPY_DST;
    }
    match memory {
        // CPU-visible memory is shadowed and uploaded via the queue.
        MemoryUsage::CpuToGpu => out |= wgpu::BufferUsages::COPY_DST,
        MemoryUsage::CpuOnly => out |= wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        MemoryUsage::GpuOnly => {}
    }
    out
}

pub fn load_op_color(op: AttachmentLoadOp, clear: [f32; 4]) -> wgpu::LoadOp<wgpu::Color> {
    match op {
        AttachmentLoadOp::Load => wgpu::LoadOp::Load,
        AttachmentLoadOp::Clear => wgpu::LoadOp::Clear(wgpu::Color {
            r: f64::from(clear[0]),
            g: f64::from(clear[1]),
            b: f64::from(clear[2]),
            a: f64::from(clear[3]),
        }),
        // WebGPU has no don't-care; load is the conservative choice.
        AttachmentLoadOp::DontCare => wgpu::LoadOp::Load,
    }
}

pub fn load_op_depth(op: AttachmentLoadOp, clear: f32) -> wgpu::LoadOp<f32> {
    match op {
        AttachmentLoadOp::Load | AttachmentLoadOp::DontCare => wgpu::LoadOp::Load,
        AttachmentLoadOp::Clear => wgpu::LoadOp::Clear(clear),
    }
}

pub fn store_op(op: AttachmentStoreOp) -> wgpu::StoreOp {
    match op {
        AttachmentStoreOp::Store => wgpu::StoreOp::Store,
        AttachmentStoreOp::DontCare => wgpu::StoreOp::Discard,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
    }
}

fn blend_op(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    }
}

pub fn blend_state(target: &BlendTargetState) -> Option<wgpu::BlendState> {
    if !target.enable {
        return None;
    }
    Some(wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(target.src_color),
            dst_factor: blend_factor(target.dst_color),
            operation: blend_op(target.color_op),
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(target.src_alpha),
            dst_factor: blend_factor(target.dst_alpha),
            operation: blend_op(target.alpha_op),
        },
    })
}

pub fn write_mask(mask: ColorWriteMask) -> wgpu::ColorWrites {
    let mut out = wgpu::ColorWrites::empty();
    if mask.contains(ColorWriteMask::R) {
        out |= wgpu::ColorWrites::RED;
    }
    if mask.contains(ColorWriteMask::G) {
        out |= wgpu::ColorWrites::GREEN;
    }
    if mask.contains(ColorWriteMask::B) {
        out |= wgpu::ColorWrites::BLUE;
    }
    if mask.contains(ColorWriteMask::A) {
        out |= wgpu::ColorWrites::ALPHA;
    }
    out
}

pub fn texture_dimension(dimension: TextureDimension) -> wgpu::TextureDimension {
    match dimension {
        TextureDimension::D2 | TextureDimension::D2Array | TextureDimension::Cube => {
            wgpu::TextureDimension::D2
        }
        TextureDimension::D3 => wgpu::TextureDimension::D3,
    }
}
