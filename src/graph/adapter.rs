//! Frame Graph Adapter
//!
//! Connects the frame graph's resource lifecycle to [`TransientResources`]:
//! a graph "create" becomes a pool acquisition, a graph "destroy" becomes a
//! pool release. Imported resources are referenced, never acquired or
//! released, so their lifetime stays with the caller.
//!
//! ```rust,ignore
//! let skybox = import_texture(&mut fg, "Skybox", &skybox_cubemap);
//!
//! fg.add_callback_pass(
//!     "Sky",
//!     |builder| {
//!         builder.read(skybox);
//!         builder.create::<FrameGraphTexture>("SceneColor", desc)
//!     },
//!     move |color, resources, rc| {
//!         let target = get_texture(resources, *color)?;
//!         // ...
//!         Ok(())
//!     },
//! );
//! ```

use std::fmt;

use super::frame_graph::FrameGraph;
use super::handle::Handle;
use super::pass_resources::PassResources;
use crate::errors::Result;
use crate::rhi::{Buffer, GraphicsBackend, RenderContext, Texture};
use crate::transient::{BufferDesc, ResourceDesc, TextureDesc, TransientResources};

/// The physical resource behind a graph node.
#[derive(Debug)]
pub enum PhysicalResource<'a> {
    /// Acquired from the pool for the duration of the frame.
    Texture(Texture),
    Buffer(Buffer),
    /// Owned by the caller, valid for the graph's lifetime.
    ImportedTexture(&'a Texture),
    ImportedBuffer(&'a Buffer),
}

impl PhysicalResource<'_> {
    #[must_use]
    pub fn is_imported(&self) -> bool {
        matches!(self, Self::ImportedTexture(_) | Self::ImportedBuffer(_))
    }
}

/// A kind of resource the frame graph can manage.
pub trait TransientResource {
    type Desc: Copy + PartialEq + fmt::Debug + fmt::Display + Into<ResourceDesc>;
    type Physical;

    /// Acquires a physical resource for `desc`.
    fn create<B: GraphicsBackend>(
        desc: &Self::Desc,
        rc: &mut RenderContext<B>,
        pool: &mut TransientResources,
    ) -> Result<Self::Physical>;

    /// Gives `resource` back to the pool.
    fn destroy(desc: &Self::Desc, resource: Self::Physical, pool: &mut TransientResources);

    /// Descriptor derived from an existing resource's current properties.
    fn describe(resource: &Self::Physical) -> Self::Desc;

    fn import(resource: &Self::Physical) -> PhysicalResource<'_>;

    fn resolve<'r>(resource: &'r PhysicalResource<'_>) -> Option<&'r Self::Physical>;

    fn descriptor(desc: &ResourceDesc) -> Option<&Self::Desc>;
}

/// Pooled texture.
#[derive(Debug, Clone, Copy)]
pub enum FrameGraphTexture {}

impl TransientResource for FrameGraphTexture {
    type Desc = TextureDesc;
    type Physical = Texture;

    fn create<B: GraphicsBackend>(
        desc: &TextureDesc,
        rc: &mut RenderContext<B>,
        pool: &mut TransientResources,
    ) -> Result<Texture> {
        pool.acquire_texture(rc, desc)
    }

    fn destroy(desc: &TextureDesc, resource: Texture, pool: &mut TransientResources) {
        pool.release_texture(desc, resource);
    }

    fn describe(resource: &Texture) -> TextureDesc {
        TextureDesc::from_texture(resource)
    }

    fn import(resource: &Texture) -> PhysicalResource<'_> {
        PhysicalResource::ImportedTexture(resource)
    }

    fn resolve<'r>(resource: &'r PhysicalResource<'_>) -> Option<&'r Texture> {
        match resource {
            PhysicalResource::Texture(texture) => Some(texture),
            PhysicalResource::ImportedTexture(texture) => Some(*texture),
            _ => None,
        }
    }

    fn descriptor(desc: &ResourceDesc) -> Option<&TextureDesc> {
        match desc {
            ResourceDesc::Texture(desc) => Some(desc),
            ResourceDesc::Buffer(_) => None,
        }
    }
}

/// Pooled buffer.
#[derive(Debug, Clone, Copy)]
pub enum FrameGraphBuffer {}

impl TransientResource for FrameGraphBuffer {
    type Desc = BufferDesc;
    type Physical = Buffer;

    fn create<B: GraphicsBackend>(
        desc: &BufferDesc,
        rc: &mut RenderContext<B>,
        pool: &mut TransientResources,
    ) -> Result<Buffer> {
        pool.acquire_buffer(rc, desc)
    }

    fn destroy(desc: &BufferDesc, resource: Buffer, pool: &mut TransientResources) {
        pool.release_buffer(desc, resource);
    }

    fn describe(resource: &Buffer) -> BufferDesc {
        BufferDesc {
            size: resource.size(),
        }
    }

    fn import(resource: &Buffer) -> PhysicalResource<'_> {
        PhysicalResource::ImportedBuffer(resource)
    }

    fn resolve<'r>(resource: &'r PhysicalResource<'_>) -> Option<&'r Buffer> {
        match resource {
            PhysicalResource::Buffer(buffer) => Some(buffer),
            PhysicalResource::ImportedBuffer(buffer) => Some(*buffer),
            _ => None,
        }
    }

    fn descriptor(desc: &ResourceDesc) -> Option<&BufferDesc> {
        match desc {
            ResourceDesc::Buffer(desc) => Some(desc),
            ResourceDesc::Texture(_) => None,
        }
    }
}

/// Acquires the physical resource of a transient node.
pub(crate) fn create_physical<B: GraphicsBackend>(
    desc: &ResourceDesc,
    rc: &mut RenderContext<B>,
    pool: &mut TransientResources,
) -> Result<PhysicalResource<'static>> {
    Ok(match desc {
        ResourceDesc::Texture(desc) => {
            PhysicalResource::Texture(FrameGraphTexture::create(desc, rc, pool)?)
        }
        ResourceDesc::Buffer(desc) => {
            PhysicalResource::Buffer(FrameGraphBuffer::create(desc, rc, pool)?)
        }
    })
}

/// Releases the physical resource of a transient node. Imported resources
/// are only forgotten.
pub(crate) fn destroy_physical(
    desc: &ResourceDesc,
    resource: PhysicalResource<'_>,
    pool: &mut TransientResources,
) {
    match (desc, resource) {
        (ResourceDesc::Texture(desc), PhysicalResource::Texture(texture)) => {
            FrameGraphTexture::destroy(desc, texture, pool);
        }
        (ResourceDesc::Buffer(desc), PhysicalResource::Buffer(buffer)) => {
            FrameGraphBuffer::destroy(desc, buffer, pool);
        }
        (_, PhysicalResource::ImportedTexture(_) | PhysicalResource::ImportedBuffer(_)) => {}
        (desc, resource) => {
            log::error!("Frame graph resource {resource:?} does not match descriptor {desc}");
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Makes `texture` readable and writable by passes of `fg` without handing
/// its ownership to the pool.
pub fn import_texture<'a, B: GraphicsBackend>(
    fg: &mut FrameGraph<'a, B>,
    name: &str,
    texture: &'a Texture,
) -> Handle<FrameGraphTexture> {
    debug_assert!(texture.is_valid(), "importing a destroyed texture");
    fg.import::<FrameGraphTexture>(name, texture)
}

pub fn import_buffer<'a, B: GraphicsBackend>(
    fg: &mut FrameGraph<'a, B>,
    name: &str,
    buffer: &'a Buffer,
) -> Handle<FrameGraphBuffer> {
    debug_assert!(buffer.is_valid(), "importing a destroyed buffer");
    fg.import::<FrameGraphBuffer>(name, buffer)
}

/// Physical texture behind `handle` for the current pass.
pub fn get_texture<'r>(
    resources: &'r PassResources<'_, '_>,
    handle: Handle<FrameGraphTexture>,
) -> Result<&'r Texture> {
    resources.get(handle)
}

pub fn get_buffer<'r>(
    resources: &'r PassResources<'_, '_>,
    handle: Handle<FrameGraphBuffer>,
) -> Result<&'r Buffer> {
    resources.get(handle)
}
