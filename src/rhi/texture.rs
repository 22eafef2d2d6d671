//! Physical textures.
//!
//! A [`Texture`] is a move-only owner of a device texture handle plus the
//! shape it was created with. Ownership follows the pool discipline: at any
//! time a texture is held by exactly one of the frame graph (checked out),
//! the transient pool (idle), or nobody (destroyed, handle null).

use super::handle::TextureId;
use super::types::{Extent2D, PixelFormat};

use slotmap::Key;

/// Device-side target chosen for a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    Texture2D,
    Texture2DArray,
    Texture3D,
    CubeMap,
    CubeMapArray,
}

impl TextureType {
    /// `true` for cube and cube-array targets; attaching one of these goes
    /// through a per-face view.
    #[inline]
    #[must_use]
    pub const fn is_cube(self) -> bool {
        matches!(self, Self::CubeMap | Self::CubeMapArray)
    }

    #[inline]
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(self, Self::Texture2DArray | Self::CubeMapArray)
    }
}

/// Fully resolved creation parameters handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureCreateInfo {
    pub extent: Extent2D,
    /// Depth of a volume texture; `0` when not volumetric.
    pub depth: u32,
    pub format: PixelFormat,
    /// `1` for plain textures, `6` for cube maps.
    pub num_faces: u32,
    /// `0` requests a full mip chain.
    pub num_mip_levels: u32,
    /// `0` for non-array textures.
    pub num_layers: u32,
}

impl Default for TextureCreateInfo {
    fn default() -> Self {
        Self {
            extent: Extent2D::default(),
            depth: 0,
            format: PixelFormat::Unknown,
            num_faces: 1,
            num_mip_levels: 1,
            num_layers: 0,
        }
    }
}

/// Shape handed to [`GraphicsBackend::create_texture`](super::GraphicsBackend::create_texture)
/// after validation and target selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureShape {
    pub texture_type: TextureType,
    pub extent: Extent2D,
    pub depth: u32,
    pub format: PixelFormat,
    pub num_mip_levels: u32,
    pub num_layers: u32,
}

/// A physical texture.
#[derive(Debug, Default)]
pub struct Texture {
    pub(crate) id: TextureId,
    pub(crate) texture_type: Option<TextureType>,
    pub(crate) extent: Extent2D,
    pub(crate) depth: u32,
    pub(crate) num_mip_levels: u32,
    pub(crate) num_layers: u32,
    pub(crate) format: PixelFormat,
}

impl Texture {
    pub(crate) fn from_shape(id: TextureId, shape: &TextureShape) -> Self {
        Self {
            id,
            texture_type: Some(shape.texture_type),
            extent: shape.extent,
            depth: shape.depth,
            num_mip_levels: shape.num_mip_levels,
            num_layers: shape.num_layers,
            format: shape.format,
        }
    }

    /// `false` once destroyed (or when default-constructed).
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.id.is_null()
    }

    /// Device handle. Identity of the physical resource.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TextureId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn texture_type(&self) -> Option<TextureType> {
        self.texture_type
    }

    #[inline]
    #[must_use]
    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    #[inline]
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    #[must_use]
    pub fn num_mip_levels(&self) -> u32 {
        self.num_mip_levels
    }

    #[inline]
    #[must_use]
    pub fn num_layers(&self) -> u32 {
        self.num_layers
    }

    #[inline]
    #[must_use]
    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    /// Clears the handle without touching the device.
    pub(crate) fn take_id(&mut self) -> TextureId {
        self.texture_type = None;
        self.extent = Extent2D::default();
        self.depth = 0;
        self.num_mip_levels = 0;
        self.num_layers = 0;
        self.format = PixelFormat::Unknown;
        std::mem::take(&mut self.id)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if self.is_valid() {
            log::warn!("Texture leak: {:?}", self.id);
        }
    }
}
