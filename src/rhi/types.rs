//! Plain value types shared by every layer of the RHI.
//!
//! Nothing in here owns a device object. Enums mirror the capability set of
//! the renderer rather than any particular graphics API; backends translate
//! them (see `wgpu_backend::convert`).

use std::fmt;

use glam::{UVec3, Vec4};

// ─── Geometry ────────────────────────────────────────────────────────────────

/// Width and height of a 2D surface, in texels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `true` when either dimension is zero.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Extent2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Offset2D {
    pub x: i32,
    pub y: i32,
}

/// Axis-aligned rectangle used for viewports, scissors and render areas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect2D {
    pub offset: Offset2D,
    pub extent: Extent2D,
}

impl Rect2D {
    /// Rectangle anchored at the origin.
    #[inline]
    #[must_use]
    pub const fn from_extent(extent: Extent2D) -> Self {
        Self {
            offset: Offset2D { x: 0, y: 0 },
            extent,
        }
    }
}

// ─── Pixel Formats ───────────────────────────────────────────────────────────

/// Storage format of a texture.
///
/// `Unknown` exists so that default-constructed descriptors are detectably
/// malformed; creating a texture with it is an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    Unknown,

    R8Unorm,

    Rgb8Unorm,
    Rgba8Unorm,

    Rgb8Snorm,
    Rgba8Snorm,

    R16F,
    Rg16F,
    Rgb16F,
    Rgba16F,

    Rgb32F,
    Rgba32F,

    Rgba32Ui,

    Depth16,
    Depth24,
    Depth32F,
}

impl PixelFormat {
    /// `true` for depth-only formats.
    #[inline]
    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth16 | Self::Depth24 | Self::Depth32F)
    }

    /// Size of one texel in bytes, as stored by the device.
    ///
    /// Returns `None` for [`PixelFormat::Unknown`].
    #[must_use]
    pub const fn texel_size(self) -> Option<u32> {
        Some(match self {
            Self::Unknown => return None,
            Self::R8Unorm => 1,
            Self::Rgb8Unorm | Self::Rgb8Snorm => 3,
            Self::Rgba8Unorm | Self::Rgba8Snorm => 4,
            Self::R16F | Self::Depth16 => 2,
            Self::Rg16F | Self::Depth24 | Self::Depth32F => 4,
            Self::Rgb16F => 6,
            Self::Rgba16F => 8,
            Self::Rgb32F => 12,
            Self::Rgba32F | Self::Rgba32Ui => 16,
        })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Undefined",
            Self::R8Unorm => "R8_UNorm",
            Self::Rgb8Unorm => "RGB8_UNorm",
            Self::Rgba8Unorm => "RGBA8_UNorm",
            Self::Rgb8Snorm => "RGB8_SNorm",
            Self::Rgba8Snorm => "RGBA8_SNorm",
            Self::R16F => "R16F",
            Self::Rg16F => "RG16F",
            Self::Rgb16F => "RGB16F",
            Self::Rgba16F => "RGBA16F",
            Self::Rgb32F => "RGB32F",
            Self::Rgba32F => "RGBA32F",
            Self::Rgba32Ui => "RGBA32UI",
            Self::Depth16 => "Depth16",
            Self::Depth24 => "Depth24",
            Self::Depth32F => "Depth32F",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Sampling ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TexelFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MipmapMode {
    None,
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SamplerAddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
    MirrorClampToEdge,
}

/// Full sampler state, either attached to a texture
/// ([`RenderContext::setup_sampler`](crate::rhi::RenderContext::setup_sampler))
/// or used to create a standalone sampler object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerInfo {
    pub min_filter: TexelFilter,
    pub mipmap_mode: MipmapMode,
    pub mag_filter: TexelFilter,

    pub address_mode_s: SamplerAddressMode,
    pub address_mode_t: SamplerAddressMode,
    pub address_mode_r: SamplerAddressMode,

    pub max_anisotropy: f32,

    /// Enables depth comparison sampling when set.
    pub compare_op: Option<CompareOp>,
    pub border_color: Vec4,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            min_filter: TexelFilter::Nearest,
            mipmap_mode: MipmapMode::Linear,
            mag_filter: TexelFilter::Linear,
            address_mode_s: SamplerAddressMode::Repeat,
            address_mode_t: SamplerAddressMode::Repeat,
            address_mode_r: SamplerAddressMode::Repeat,
            max_anisotropy: 1.0,
            compare_op: None,
            border_color: Vec4::ZERO,
        }
    }
}

// ─── Draw Parameters ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Width of a single index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U8,
    U16,
    U32,
}

impl IndexType {
    #[inline]
    #[must_use]
    pub const fn stride(self) -> u32 {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Range of a mesh to draw.
///
/// When `num_indices` is zero (or no index buffer is supplied) the draw is
/// non-indexed and covers `num_vertices` starting at `vertex_offset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GeometryInfo {
    pub topology: PrimitiveTopology,
    pub vertex_offset: u32,
    pub num_vertices: u32,
    pub index_offset: u32,
    pub num_indices: u32,
}

/// Compute workgroup counts.
pub type GroupCounts = UVec3;

/// Clear value of a render-pass attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color(Vec4),
    Depth(f32),
}

// ─── Mip Math ────────────────────────────────────────────────────────────────

/// Number of levels in a full mip chain for a texture whose largest
/// dimension is `size`.
#[must_use]
pub fn calc_mip_levels(size: u32) -> u32 {
    if size == 0 {
        return 1;
    }
    u32::BITS - size.leading_zeros()
}

/// Dimensions of mip `level` for a texture of `base_size`. Dimensions never
/// drop below one texel.
#[must_use]
pub fn calc_mip_size(base_size: UVec3, level: u32) -> UVec3 {
    let shift = level.min(31);
    (base_size >> shift).max(UVec3::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_levels_cover_the_full_chain() {
        assert_eq!(calc_mip_levels(1), 1);
        assert_eq!(calc_mip_levels(2), 2);
        assert_eq!(calc_mip_levels(256), 9);
        assert_eq!(calc_mip_levels(300), 9);
        assert_eq!(calc_mip_levels(1024), 11);
    }

    #[test]
    fn mip_size_clamps_to_one_texel() {
        let base = UVec3::new(256, 64, 1);
        assert_eq!(calc_mip_size(base, 0), base);
        assert_eq!(calc_mip_size(base, 2), UVec3::new(64, 16, 1));
        assert_eq!(calc_mip_size(base, 8), UVec3::new(1, 1, 1));
    }

    #[test]
    fn unknown_format_has_no_texel_size() {
        assert_eq!(PixelFormat::Unknown.texel_size(), None);
        assert_eq!(PixelFormat::Rgba16F.texel_size(), Some(8));
        assert!(PixelFormat::Depth32F.is_depth());
    }
}
