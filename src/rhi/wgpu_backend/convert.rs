//! Conversions from RHI value types to their wgpu counterparts.
//!
//! wgpu has no three-channel formats, so `Rgb*` textures are stored as their
//! `Rgba*` sibling and uploads are widened on the fly (see [`widen_rgb`]).

use crate::errors::{Result, RhiError};
use crate::rhi::state::{BlendFactor, BlendOp, BlendState, CullMode, PolygonMode};
use crate::rhi::texture::TextureType;
use crate::rhi::types::{
    CompareOp, IndexType, MipmapMode, PixelFormat, PrimitiveTopology, SamplerAddressMode,
    SamplerInfo, TexelFilter,
};
use crate::rhi::vertex::VertexAttributeType;

// ─── Formats ─────────────────────────────────────────────────────────────────

pub fn texture_format(format: PixelFormat) -> Result<wgpu::TextureFormat> {
    use wgpu::TextureFormat as F;
    Ok(match format {
        PixelFormat::Unknown => {
            return Err(RhiError::InvalidTextureDesc(
                "undefined pixel format".to_string(),
            ));
        }
        PixelFormat::R8Unorm => F::R8Unorm,
        PixelFormat::Rgb8Unorm | PixelFormat::Rgba8Unorm => F::Rgba8Unorm,
        PixelFormat::Rgb8Snorm | PixelFormat::Rgba8Snorm => F::Rgba8Snorm,
        PixelFormat::R16F => F::R16Float,
        PixelFormat::Rg16F => F::Rg16Float,
        PixelFormat::Rgb16F | PixelFormat::Rgba16F => F::Rgba16Float,
        PixelFormat::Rgb32F | PixelFormat::Rgba32F => F::Rgba32Float,
        PixelFormat::Rgba32Ui => F::Rgba32Uint,
        PixelFormat::Depth16 => F::Depth16Unorm,
        PixelFormat::Depth24 => F::Depth24Plus,
        PixelFormat::Depth32F => F::Depth32Float,
    })
}

/// Usages requested for every texture of `format`.
pub fn texture_usages(format: PixelFormat) -> wgpu::TextureUsages {
    use wgpu::TextureUsages as U;
    if format.is_depth() {
        return U::TEXTURE_BINDING | U::RENDER_ATTACHMENT;
    }
    let mut usages = U::TEXTURE_BINDING | U::COPY_SRC | U::COPY_DST;
    // Snorm formats are not renderable.
    if !matches!(format, PixelFormat::Rgb8Snorm | PixelFormat::Rgba8Snorm) {
        usages |= U::RENDER_ATTACHMENT;
    }
    if matches!(
        format,
        PixelFormat::Rgba8Unorm
            | PixelFormat::Rgba8Snorm
            | PixelFormat::Rgba16F
            | PixelFormat::Rgba32F
            | PixelFormat::Rgba32Ui
    ) {
        usages |= U::STORAGE_BINDING;
    }
    usages
}

/// Converts tightly packed RGB texels to RGBA with an opaque alpha.
///
/// Returns `None` when `format` is not a three-channel format.
pub fn widen_rgb(format: PixelFormat, data: &[u8]) -> Option<Vec<u8>> {
    let alpha: &[u8] = match format {
        PixelFormat::Rgb8Unorm => &[0xff],
        PixelFormat::Rgb8Snorm => &[0x7f],
        // 1.0 as f16 / f32, little endian
        PixelFormat::Rgb16F => &[0x00, 0x3c],
        PixelFormat::Rgb32F => &[0x00, 0x00, 0x80, 0x3f],
        _ => return None,
    };
    let channel = alpha.len();
    let texel = channel * 3;

    let mut out = Vec::with_capacity(data.len() / 3 * 4);
    for rgb in data.chunks_exact(texel) {
        out.extend_from_slice(rgb);
        out.extend_from_slice(alpha);
    }
    Some(out)
}

pub fn vertex_format(ty: VertexAttributeType) -> wgpu::VertexFormat {
    match ty {
        VertexAttributeType::Float => wgpu::VertexFormat::Float32,
        VertexAttributeType::Float2 => wgpu::VertexFormat::Float32x2,
        VertexAttributeType::Float3 => wgpu::VertexFormat::Float32x3,
        VertexAttributeType::Float4 => wgpu::VertexFormat::Float32x4,
        VertexAttributeType::Int4 => wgpu::VertexFormat::Sint32x4,
        VertexAttributeType::UByte4Norm => wgpu::VertexFormat::Unorm8x4,
    }
}

pub fn index_format(ty: IndexType) -> Result<wgpu::IndexFormat> {
    match ty {
        IndexType::U8 => Err(RhiError::Unsupported("8-bit indices".to_string())),
        IndexType::U16 => Ok(wgpu::IndexFormat::Uint16),
        IndexType::U32 => Ok(wgpu::IndexFormat::Uint32),
    }
}

// ─── Rasterization ───────────────────────────────────────────────────────────

pub fn topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
        PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
        PrimitiveTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

#[inline]
pub fn is_strip(topology: PrimitiveTopology) -> bool {
    matches!(
        topology,
        PrimitiveTopology::LineStrip | PrimitiveTopology::TriangleStrip
    )
}

pub fn polygon_mode(mode: PolygonMode) -> wgpu::PolygonMode {
    match mode {
        PolygonMode::Point => wgpu::PolygonMode::Point,
        PolygonMode::Line => wgpu::PolygonMode::Line,
        PolygonMode::Fill => wgpu::PolygonMode::Fill,
    }
}

pub fn cull_mode(mode: CullMode) -> Option<wgpu::Face> {
    match mode {
        CullMode::None => None,
        CullMode::Back => Some(wgpu::Face::Back),
        CullMode::Front => Some(wgpu::Face::Front),
    }
}

pub fn compare_function(op: CompareOp) -> wgpu::CompareFunction {
    match op {
        CompareOp::Never => wgpu::CompareFunction::Never,
        CompareOp::Less => wgpu::CompareFunction::Less,
        CompareOp::Equal => wgpu::CompareFunction::Equal,
        CompareOp::LessOrEqual => wgpu::CompareFunction::LessEqual,
        CompareOp::Greater => wgpu::CompareFunction::Greater,
        CompareOp::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareOp::GreaterOrEqual => wgpu::CompareFunction::GreaterEqual,
        CompareOp::Always => wgpu::CompareFunction::Always,
    }
}

// ─── Blending ────────────────────────────────────────────────────────────────

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    use wgpu::BlendFactor as F;
    match factor {
        BlendFactor::Zero => F::Zero,
        BlendFactor::One => F::One,
        BlendFactor::SrcColor => F::Src,
        BlendFactor::OneMinusSrcColor => F::OneMinusSrc,
        BlendFactor::DstColor => F::Dst,
        BlendFactor::OneMinusDstColor => F::OneMinusDst,
        BlendFactor::SrcAlpha => F::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => F::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => F::DstAlpha,
        BlendFactor::OneMinusDstAlpha => F::OneMinusDstAlpha,
        BlendFactor::ConstantColor => F::Constant,
        BlendFactor::OneMinusConstantColor => F::OneMinusConstant,
        BlendFactor::SrcAlphaSaturate => F::SrcAlphaSaturated,
        BlendFactor::Src1Color => F::Src1,
        BlendFactor::OneMinusSrc1Color => F::OneMinusSrc1,
        BlendFactor::Src1Alpha => F::Src1Alpha,
        BlendFactor::OneMinusSrc1Alpha => F::OneMinusSrc1Alpha,
    }
}

fn blend_component(op: BlendOp, src: BlendFactor, dst: BlendFactor) -> wgpu::BlendComponent {
    let operation = match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    };
    // Min / Max ignore the factors; wgpu requires them to be `One`.
    let (src, dst) = if matches!(op, BlendOp::Min | BlendOp::Max) {
        (wgpu::BlendFactor::One, wgpu::BlendFactor::One)
    } else {
        (blend_factor(src), blend_factor(dst))
    };
    wgpu::BlendComponent {
        src_factor: src,
        dst_factor: dst,
        operation,
    }
}

pub fn blend_state(state: &BlendState) -> Option<wgpu::BlendState> {
    state.enabled.then(|| wgpu::BlendState {
        color: blend_component(state.color_op, state.src_color, state.dst_color),
        alpha: blend_component(state.alpha_op, state.src_alpha, state.dst_alpha),
    })
}

// ─── Sampling ────────────────────────────────────────────────────────────────

fn filter_mode(filter: TexelFilter) -> wgpu::FilterMode {
    match filter {
        TexelFilter::Nearest => wgpu::FilterMode::Nearest,
        TexelFilter::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(mode: SamplerAddressMode) -> wgpu::AddressMode {
    match mode {
        SamplerAddressMode::Repeat => wgpu::AddressMode::Repeat,
        SamplerAddressMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        // No mirror-once mode in WebGPU.
        SamplerAddressMode::ClampToEdge | SamplerAddressMode::MirrorClampToEdge => {
            wgpu::AddressMode::ClampToEdge
        }
        SamplerAddressMode::ClampToBorder => wgpu::AddressMode::ClampToBorder,
    }
}

fn border_color(info: &SamplerInfo) -> Option<wgpu::SamplerBorderColor> {
    let uses_border = [info.address_mode_s, info.address_mode_t, info.address_mode_r]
        .contains(&SamplerAddressMode::ClampToBorder);
    if !uses_border {
        return None;
    }
    let c = info.border_color;
    Some(if c.w < 0.5 {
        wgpu::SamplerBorderColor::TransparentBlack
    } else if c.x + c.y + c.z > 1.5 {
        wgpu::SamplerBorderColor::OpaqueWhite
    } else {
        wgpu::SamplerBorderColor::OpaqueBlack
    })
}

pub fn sampler_descriptor(info: &SamplerInfo) -> wgpu::SamplerDescriptor<'static> {
    let min_filter = filter_mode(info.min_filter);
    let mag_filter = filter_mode(info.mag_filter);
    let mipmap_filter = match info.mipmap_mode {
        MipmapMode::Linear => wgpu::MipmapFilterMode::Linear,
        MipmapMode::None | MipmapMode::Nearest => wgpu::MipmapFilterMode::Nearest,
    };

    // Anisotropy is only valid with all filters linear.
    let all_linear = min_filter == wgpu::FilterMode::Linear
        && mag_filter == wgpu::FilterMode::Linear
        && info.mipmap_mode == MipmapMode::Linear;
    let anisotropy_clamp = if all_linear {
        info.max_anisotropy.clamp(1.0, 16.0) as u16
    } else {
        1
    };

    wgpu::SamplerDescriptor {
        label: Some("RHI Sampler"),
        address_mode_u: address_mode(info.address_mode_s),
        address_mode_v: address_mode(info.address_mode_t),
        address_mode_w: address_mode(info.address_mode_r),
        mag_filter,
        min_filter,
        mipmap_filter,
        lod_max_clamp: if info.mipmap_mode == MipmapMode::None {
            0.0
        } else {
            32.0
        },
        compare: info.compare_op.map(compare_function),
        anisotropy_clamp,
        border_color: border_color(info),
        ..Default::default()
    }
}

// ─── Views ───────────────────────────────────────────────────────────────────

/// Dimension of the view covering every layer of a texture.
pub fn full_view_dimension(ty: TextureType) -> wgpu::TextureViewDimension {
    match ty {
        TextureType::Texture2D => wgpu::TextureViewDimension::D2,
        TextureType::Texture2DArray => wgpu::TextureViewDimension::D2Array,
        TextureType::Texture3D => wgpu::TextureViewDimension::D3,
        TextureType::CubeMap => wgpu::TextureViewDimension::Cube,
        TextureType::CubeMapArray => wgpu::TextureViewDimension::CubeArray,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_formats_are_widened() {
        assert_eq!(
            texture_format(PixelFormat::Rgb16F).unwrap(),
            wgpu::TextureFormat::Rgba16Float
        );
        let widened = widen_rgb(PixelFormat::Rgb8Unorm, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(widened, vec![1, 2, 3, 0xff, 4, 5, 6, 0xff]);
        assert!(widen_rgb(PixelFormat::Rgba8Unorm, &[0; 4]).is_none());
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(texture_format(PixelFormat::Unknown).is_err());
        assert!(index_format(IndexType::U8).is_err());
    }

    #[test]
    fn min_max_blending_forces_unit_factors() {
        let state = BlendState {
            enabled: true,
            color_op: BlendOp::Max,
            ..BlendState::ALPHA
        };
        let blend = blend_state(&state).unwrap();
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(blend.color.dst_factor, wgpu::BlendFactor::One);
        assert_eq!(blend.alpha.src_factor, wgpu::BlendFactor::One);
        assert!(blend_state(&BlendState::default()).is_none());
    }
}
