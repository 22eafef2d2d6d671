//! Resource descriptors.
//!
//! A descriptor is a plain value naming the shape of a texture or buffer a
//! pass wants, never a physical resource. Descriptors key the transient
//! pool: two descriptors are interchangeable exactly when they compare
//! equal, and [`descriptor_hash`] covers every field (the derives guarantee
//! that nothing affecting allocation is left out of the key).

use std::fmt;
use std::hash::{Hash, Hasher};

use glam::Vec4;
use rustc_hash::FxHasher;

use crate::rhi::{
    CompareOp, Extent2D, MipmapMode, PixelFormat, SamplerAddressMode, SamplerInfo, TexelFilter,
    Texture, TextureCreateInfo, calc_mip_levels,
};

/// 64-bit pool key of a descriptor.
#[must_use]
pub fn descriptor_hash<D: Hash + ?Sized>(desc: &D) -> u64 {
    let mut hasher = FxHasher::default();
    desc.hash(&mut hasher);
    hasher.finish()
}

/// Edge behaviour of a pooled texture's default sampler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    ClampToOpaqueBlack,
    ClampToOpaqueWhite,
}

/// Shape of a transient texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub extent: Extent2D,
    /// Volume depth, `0` for 2D textures.
    pub depth: u32,
    /// `0` requests a full mip chain.
    pub num_mip_levels: u32,
    /// Array layers, `0` for non-array textures.
    pub layers: u32,
    pub format: PixelFormat,
    /// Sample with depth comparison (shadow maps).
    pub shadow_sampler: bool,
    pub wrap_mode: WrapMode,
    pub filter: TexelFilter,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            extent: Extent2D::default(),
            depth: 0,
            num_mip_levels: 1,
            layers: 0,
            format: PixelFormat::Unknown,
            shadow_sampler: false,
            wrap_mode: WrapMode::ClampToEdge,
            filter: TexelFilter::Linear,
        }
    }
}

impl TextureDesc {
    /// Single-mip 2D texture.
    #[must_use]
    pub fn new_2d(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            extent: Extent2D::new(width, height),
            format,
            ..Default::default()
        }
    }

    /// Describes an existing texture (used when importing it into a graph).
    #[must_use]
    pub fn from_texture(texture: &Texture) -> Self {
        Self {
            extent: texture.extent(),
            depth: texture.depth(),
            num_mip_levels: texture.num_mip_levels(),
            layers: texture.num_layers(),
            format: texture.pixel_format(),
            ..Default::default()
        }
    }

    /// Mip count a texture created for this descriptor ends up with.
    #[must_use]
    pub fn resolved_mip_levels(&self) -> u32 {
        match self.num_mip_levels {
            0 => calc_mip_levels(self.extent.width.max(self.extent.height).max(self.depth)),
            n => n,
        }
    }

    /// `true` when `texture` has this descriptor's allocation shape.
    #[must_use]
    pub fn matches(&self, texture: &Texture) -> bool {
        texture.extent() == self.extent
            && texture.depth() == self.depth
            && texture.num_mip_levels() == self.resolved_mip_levels()
            && texture.num_layers() == self.layers
            && texture.pixel_format() == self.format
    }

    #[must_use]
    pub fn create_info(&self) -> TextureCreateInfo {
        TextureCreateInfo {
            extent: self.extent,
            depth: self.depth,
            format: self.format,
            num_faces: 1,
            num_mip_levels: self.num_mip_levels,
            num_layers: self.layers,
        }
    }

    /// Default sampling state of a texture created for this descriptor.
    #[must_use]
    pub fn sampler_info(&self) -> SamplerInfo {
        let (address_mode, border_color) = match self.wrap_mode {
            WrapMode::ClampToEdge => (SamplerAddressMode::ClampToEdge, Vec4::ZERO),
            WrapMode::ClampToOpaqueBlack => (SamplerAddressMode::ClampToBorder, Vec4::W),
            WrapMode::ClampToOpaqueWhite => (SamplerAddressMode::ClampToBorder, Vec4::ONE),
        };

        SamplerInfo {
            min_filter: self.filter,
            mipmap_mode: if self.num_mip_levels != 1 {
                MipmapMode::Nearest
            } else {
                MipmapMode::None
            },
            mag_filter: self.filter,
            address_mode_s: address_mode,
            address_mode_t: address_mode,
            address_mode_r: address_mode,
            compare_op: self.shadow_sampler.then_some(CompareOp::LessOrEqual),
            border_color,
            ..Default::default()
        }
    }
}

impl fmt::Display for TextureDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.depth > 0 {
            write!(f, "{}x{}", self.extent, self.depth)?;
        } else {
            write!(f, "{}", self.extent)?;
        }
        write!(f, " [{}]", self.format)
    }
}

/// Shape of a transient buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    /// Size in bytes.
    pub size: u64,
}

impl fmt::Display for BufferDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "size: {} bytes", self.size)
    }
}

/// Either kind of descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceDesc {
    Texture(TextureDesc),
    Buffer(BufferDesc),
}

impl fmt::Display for ResourceDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Texture(desc) => fmt::Display::fmt(desc, f),
            Self::Buffer(desc) => fmt::Display::fmt(desc, f),
        }
    }
}

impl From<TextureDesc> for ResourceDesc {
    fn from(desc: TextureDesc) -> Self {
        Self::Texture(desc)
    }
}

impl From<BufferDesc> for ResourceDesc {
    fn from(desc: BufferDesc) -> Self {
        Self::Buffer(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TextureDesc {
        TextureDesc::new_2d(256, 256, PixelFormat::Rgba16F)
    }

    #[test]
    fn every_allocation_field_changes_the_hash() {
        let reference = descriptor_hash(&base());
        let variants = [
            TextureDesc {
                extent: Extent2D::new(256, 128),
                ..base()
            },
            TextureDesc {
                extent: Extent2D::new(128, 256),
                ..base()
            },
            TextureDesc { depth: 4, ..base() },
            TextureDesc {
                num_mip_levels: 2,
                ..base()
            },
            TextureDesc { layers: 3, ..base() },
            TextureDesc {
                format: PixelFormat::Rgba32F,
                ..base()
            },
            TextureDesc {
                shadow_sampler: true,
                ..base()
            },
            TextureDesc {
                wrap_mode: WrapMode::ClampToOpaqueWhite,
                ..base()
            },
            TextureDesc {
                filter: TexelFilter::Nearest,
                ..base()
            },
        ];

        for variant in &variants {
            assert_ne!(descriptor_hash(variant), reference, "{variant:?}");
        }
    }

    #[test]
    fn equal_descriptors_hash_equal() {
        assert_eq!(descriptor_hash(&base()), descriptor_hash(&base()));
        assert_eq!(
            descriptor_hash(&BufferDesc { size: 64 }),
            descriptor_hash(&BufferDesc { size: 64 })
        );
        assert_ne!(
            descriptor_hash(&BufferDesc { size: 64 }),
            descriptor_hash(&BufferDesc { size: 65 })
        );
    }

    #[test]
    fn display_matches_graph_labels() {
        assert_eq!(base().to_string(), "256x256 [RGBA16F]");
        let volume = TextureDesc {
            depth: 32,
            ..TextureDesc::new_2d(32, 32, PixelFormat::R16F)
        };
        assert_eq!(volume.to_string(), "32x32x32 [R16F]");
        assert_eq!(BufferDesc { size: 64 }.to_string(), "size: 64 bytes");
    }

    #[test]
    fn sampler_follows_wrap_mode() {
        let shadow = TextureDesc {
            shadow_sampler: true,
            wrap_mode: WrapMode::ClampToOpaqueWhite,
            num_mip_levels: 4,
            ..base()
        };
        let info = shadow.sampler_info();
        assert_eq!(info.address_mode_s, SamplerAddressMode::ClampToBorder);
        assert_eq!(info.border_color, Vec4::ONE);
        assert_eq!(info.compare_op, Some(CompareOp::LessOrEqual));
        assert_eq!(info.mipmap_mode, MipmapMode::Nearest);

        let plain = base().sampler_info();
        assert_eq!(plain.address_mode_t, SamplerAddressMode::ClampToEdge);
        assert_eq!(plain.compare_op, None);
        assert_eq!(plain.mipmap_mode, MipmapMode::None);

        let full_chain = TextureDesc {
            num_mip_levels: 0,
            ..base()
        };
        assert_eq!(full_chain.sampler_info().mipmap_mode, MipmapMode::Nearest);
    }

    #[test]
    fn full_chain_resolves_against_the_largest_dimension() {
        let full_chain = TextureDesc {
            num_mip_levels: 0,
            ..base()
        };
        assert_eq!(full_chain.resolved_mip_levels(), 9);
        assert_eq!(base().resolved_mip_levels(), 1);

        let volume = TextureDesc {
            depth: 64,
            num_mip_levels: 0,
            ..TextureDesc::new_2d(16, 16, PixelFormat::R16F)
        };
        assert_eq!(volume.resolved_mip_levels(), 7);
    }
}
