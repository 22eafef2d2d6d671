//! Physical buffers.

use std::ops::Deref;

use slotmap::Key;

use super::handle::BufferId;
use super::types::IndexType;

/// A physical device buffer.
///
/// Buffers created with initial data are immutable; buffers created empty
/// accept uploads.
#[derive(Debug, Default)]
pub struct Buffer {
    pub(crate) id: BufferId,
    pub(crate) size: u64,
    pub(crate) immutable: bool,
}

impl Buffer {
    pub(crate) fn new(id: BufferId, size: u64, immutable: bool) -> Self {
        Self {
            id,
            size,
            immutable,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.id.is_null()
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub(crate) fn take_id(&mut self) -> BufferId {
        self.size = 0;
        self.immutable = false;
        std::mem::take(&mut self.id)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.is_valid() {
            log::warn!("Buffer leak: {:?}", self.id);
        }
    }
}

/// Buffer holding interleaved vertices of a fixed stride.
#[derive(Debug, Default)]
pub struct VertexBuffer {
    pub(crate) buffer: Buffer,
    pub(crate) stride: u32,
}

impl VertexBuffer {
    #[inline]
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        if self.stride == 0 {
            0
        } else {
            self.buffer.size / u64::from(self.stride)
        }
    }

    /// Gives back the underlying buffer (for destruction).
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }
}

impl Deref for VertexBuffer {
    type Target = Buffer;
    fn deref(&self) -> &Buffer {
        &self.buffer
    }
}

/// Buffer holding indices of a fixed width.
#[derive(Debug)]
pub struct IndexBuffer {
    pub(crate) buffer: Buffer,
    pub(crate) index_type: IndexType,
}

impl IndexBuffer {
    #[inline]
    #[must_use]
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.buffer.size / u64::from(self.index_type.stride())
    }

    #[inline]
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }
}

impl Deref for IndexBuffer {
    type Target = Buffer;
    fn deref(&self) -> &Buffer {
        &self.buffer
    }
}
