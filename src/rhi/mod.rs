//! Render Hardware Interface
//!
//! The device layer of the crate:
//!
//! - [`GraphicsBackend`]: the raw, stateful, handle-based device
//! - [`RenderContext`]: the device-state cache sitting on top of it
//! - [`Texture`] / [`Buffer`]: move-only physical resources
//! - [`GraphicsPipeline`] and its sub-states, diffed on bind
//! - [`VertexFormat`] + [`VertexFormatCache`]: deduplicated vertex layouts
//! - [`PipelineCache`]: per-pass pipelines keyed by vertex format and material
//!
//! Backends: [`HeadlessBackend`] is always available; `WgpuBackend` comes
//! with the `wgpu` feature.

pub mod backend;
pub mod buffer;
pub mod context;
pub mod handle;
pub mod headless;
pub mod pipeline_cache;
pub mod state;
pub mod texture;
pub mod types;
pub mod vertex;

#[cfg(feature = "wgpu")]
pub mod wgpu_backend;

pub use backend::{
    AttachmentTarget, BarrierBits, DefaultClear, FramebufferAttachment, FramebufferDesc,
    GraphicsBackend, ImageAccess, TextureRegion, ViewKey,
};
pub use buffer::{Buffer, IndexBuffer, VertexBuffer};
pub use context::{AttachmentInfo, RenderContext, RenderingInfo};
pub use handle::{
    BufferId, FramebufferId, ProgramId, SamplerId, TextureId, VertexArrayId, ViewId,
};
pub use headless::{Command, DeviceBlend, DeviceCall, DeviceState, HeadlessBackend};
pub use pipeline_cache::{BasePipelineFactory, PipelineCache, pipeline_key};
pub use state::{
    BlendFactor, BlendOp, BlendState, CullMode, DepthStencilState, GraphicsPipeline,
    GraphicsPipelineBuilder, MAX_BLEND_STATES, PipelineSnapshot, PolygonMode, PolygonOffset,
    RasterizerState,
};
pub use texture::{Texture, TextureCreateInfo, TextureShape, TextureType};
pub use types::{
    ClearValue, CompareOp, Extent2D, GeometryInfo, GroupCounts, IndexType, MipmapMode, Offset2D,
    PixelFormat, PrimitiveTopology, Rect2D, SamplerAddressMode, SamplerInfo, TexelFilter,
    calc_mip_levels, calc_mip_size,
};
pub use vertex::{
    AttributeLocation, VertexAttribute, VertexAttributeType, VertexAttributes, VertexFormat,
    VertexFormatBuilder, VertexFormatCache, attributes_hash, build_defines,
};

#[cfg(feature = "wgpu")]
pub use wgpu_backend::WgpuBackend;
