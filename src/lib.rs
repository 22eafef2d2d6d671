#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Myth RHI
//!
//! Device layer of the Myth renderer:
//!
//! - [`rhi`]: raw backends and the [`RenderContext`] device-state cache
//! - [`transient`]: descriptors and the idle-time evicting resource pool
//! - [`graph`]: a per-frame graph whose transient resources come from the
//!   pool
//! - [`RenderCore`]: owns the context and the pool and drives frames
//!
//! ```rust,ignore
//! use myth_rhi::prelude::*;
//!
//! let mut core = RenderCore::new(HeadlessBackend::new(), PoolSettings::default())?;
//! let mut fg = FrameGraph::new();
//! fg.add_callback_pass(
//!     "Clear",
//!     |builder| {
//!         let color = builder.create::<FrameGraphTexture>(
//!             "Color",
//!             TextureDesc::new_2d(1280, 720, PixelFormat::Rgba8Unorm),
//!         );
//!         builder.write(color);
//!         builder.set_side_effect();
//!     },
//!     |_, _, _| Ok(()),
//! );
//! core.execute(fg)?;
//! core.end_frame(1.0 / 60.0);
//! ```

pub mod errors;
pub mod frame;
pub mod graph;
pub mod rhi;
pub mod settings;
pub mod transient;

pub use errors::{Result, RhiError};
pub use frame::RenderCore;
pub use graph::{FrameGraph, FrameGraphBuffer, FrameGraphTexture, Handle};
pub use rhi::{Buffer, GraphicsBackend, HeadlessBackend, RenderContext, Texture};
pub use settings::{PoolSettings, RhiSettings};
pub use transient::{BufferDesc, TextureDesc, TransientResources};

#[cfg(feature = "wgpu")]
pub use rhi::WgpuBackend;

/// Everything needed to build and run frames.
pub mod prelude {
    pub use crate::errors::{Result, RhiError};
    pub use crate::frame::RenderCore;
    pub use crate::graph::{
        Blackboard, FrameGraph, FrameGraphBuffer, FrameGraphTexture, Handle, PassBuilder,
        PassResources, get_buffer, get_texture, import_buffer, import_texture,
    };
    pub use crate::rhi::{
        AttachmentInfo, Buffer, Extent2D, GeometryInfo, GraphicsBackend, GraphicsPipeline,
        HeadlessBackend, PixelFormat, PrimitiveTopology, Rect2D, RenderContext, RenderingInfo,
        Texture,
    };
    pub use crate::settings::{PoolSettings, RhiSettings};
    pub use crate::transient::{BufferDesc, ResourceDesc, TextureDesc, TransientResources};
}
