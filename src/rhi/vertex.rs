//! Vertex layouts.
//!
//! A [`VertexFormat`] is an immutable, hashed set of attributes. Equivalent
//! layouts are deduplicated through a [`VertexFormatCache`] owned by the
//! [`RenderContext`](super::RenderContext): meshes sharing a layout share one
//! `Rc<VertexFormat>`, and the cache only keeps weak references so unused
//! layouts disappear together with their last mesh.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeType {
    Float,
    Float2,
    Float3,
    Float4,

    Int4,

    UByte4Norm,
}

impl VertexAttributeType {
    /// Size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 | Self::Int4 => 16,
            Self::UByte4Norm => 4,
        }
    }
}

/// One attribute inside an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub ty: VertexAttributeType,
    /// Byte offset inside the vertex.
    pub offset: u32,
}

/// Shader input locations of the standard mesh attributes.
///
/// These must match the `@location` indices used by geometry shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum AttributeLocation {
    Position = 0,
    Color0,
    Normal,
    TexCoord0,
    TexCoord1,
    Tangent,
    Bitangent,

    Joints,
    Weights,
}

/// Attributes keyed by shader location. Ordered so that hashing is stable.
pub type VertexAttributes = BTreeMap<u32, VertexAttribute>;

/// Hash of an attribute set, shared by the VAO cache and the format cache.
#[must_use]
pub fn attributes_hash(attributes: &VertexAttributes) -> u64 {
    let mut hasher = FxHasher::default();
    for (location, attribute) in attributes {
        location.hash(&mut hasher);
        attribute.hash(&mut hasher);
    }
    hasher.finish()
}

/// An immutable vertex layout.
#[derive(Debug, PartialEq, Eq)]
pub struct VertexFormat {
    hash: u64,
    attributes: VertexAttributes,
    stride: u32,
}

impl VertexFormat {
    #[must_use]
    pub fn builder() -> VertexFormatBuilder {
        VertexFormatBuilder::default()
    }

    #[inline]
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &VertexAttributes {
        &self.attributes
    }

    /// Sum of all attribute sizes.
    #[inline]
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[must_use]
    pub fn contains(&self, location: AttributeLocation) -> bool {
        self.attributes.contains_key(&(location as u32))
    }

    #[must_use]
    pub fn contains_all(&self, locations: &[AttributeLocation]) -> bool {
        locations.iter().all(|l| self.contains(*l))
    }
}

#[derive(Debug, Default)]
pub struct VertexFormatBuilder {
    attributes: VertexAttributes,
}

impl VertexFormatBuilder {
    /// Sets (or replaces) the attribute at `location`.
    #[must_use]
    pub fn attribute(mut self, location: AttributeLocation, attribute: VertexAttribute) -> Self {
        self.attributes.insert(location as u32, attribute);
        self
    }

    /// Resolves the layout through `cache`, returning the shared instance if
    /// an equivalent one is still alive.
    pub fn build(self, cache: &mut VertexFormatCache) -> Rc<VertexFormat> {
        cache.get_or_insert(self.attributes)
    }
}

/// Weak deduplication table for [`VertexFormat`]s, keyed by attribute hash.
#[derive(Debug, Default)]
pub struct VertexFormatCache {
    formats: FxHashMap<u64, Weak<VertexFormat>>,
}

impl VertexFormatCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&mut self, attributes: VertexAttributes) -> Rc<VertexFormat> {
        let hash = attributes_hash(&attributes);

        if let Some(existing) = self.formats.get(&hash).and_then(Weak::upgrade)
            && existing.attributes == attributes
        {
            return existing;
        }

        let stride = attributes.values().map(|a| a.ty.size()).sum();
        let format = Rc::new(VertexFormat {
            hash,
            attributes,
            stride,
        });
        self.formats.insert(hash, Rc::downgrade(&format));
        format
    }

    /// Drops entries whose layout is no longer referenced.
    pub fn purge(&mut self) {
        self.formats.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of entries, including dead ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

/// Shader preprocessor defines describing which optional attributes a
/// layout provides.
#[must_use]
pub fn build_defines(format: &VertexFormat) -> Vec<&'static str> {
    let mut defines = Vec::with_capacity(6);

    if format.contains(AttributeLocation::Color0) {
        defines.push("HAS_COLOR");
    }
    if format.contains(AttributeLocation::Normal) {
        defines.push("HAS_NORMAL");
    }
    if format.contains(AttributeLocation::TexCoord0) {
        defines.push("HAS_TEXCOORD0");
        if format.contains_all(&[AttributeLocation::Tangent, AttributeLocation::Bitangent]) {
            defines.push("HAS_TANGENTS");
        }
    }
    if format.contains(AttributeLocation::TexCoord1) {
        defines.push("HAS_TEXCOORD1");
    }
    if format.contains_all(&[AttributeLocation::Joints, AttributeLocation::Weights]) {
        defines.push("IS_SKINNED");
    }

    defines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_normal() -> VertexFormatBuilder {
        VertexFormat::builder()
            .attribute(
                AttributeLocation::Position,
                VertexAttribute {
                    ty: VertexAttributeType::Float3,
                    offset: 0,
                },
            )
            .attribute(
                AttributeLocation::Normal,
                VertexAttribute {
                    ty: VertexAttributeType::Float3,
                    offset: 12,
                },
            )
    }

    #[test]
    fn equivalent_layouts_are_shared() {
        let mut cache = VertexFormatCache::new();
        let a = position_normal().build(&mut cache);
        let b = position_normal().build(&mut cache);

        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.stride(), 24);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn dead_layouts_are_rebuilt_and_purged() {
        let mut cache = VertexFormatCache::new();
        let first_hash = position_normal().build(&mut cache).hash();
        assert_eq!(cache.len(), 1);

        cache.purge();
        assert!(cache.is_empty());

        let again = position_normal().build(&mut cache);
        assert_eq!(again.hash(), first_hash);
    }

    #[test]
    fn defines_follow_attributes() {
        let mut cache = VertexFormatCache::new();
        let format = position_normal()
            .attribute(
                AttributeLocation::TexCoord0,
                VertexAttribute {
                    ty: VertexAttributeType::Float2,
                    offset: 24,
                },
            )
            .attribute(
                AttributeLocation::Joints,
                VertexAttribute {
                    ty: VertexAttributeType::Int4,
                    offset: 32,
                },
            )
            .build(&mut cache);

        assert_eq!(build_defines(&format), vec!["HAS_NORMAL", "HAS_TEXCOORD0"]);
    }
}
