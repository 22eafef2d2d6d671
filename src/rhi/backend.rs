//! Raw device interface.
//!
//! [`GraphicsBackend`] is the stateful, handle-based device underneath the
//! [`RenderContext`](super::RenderContext). Every setter here is assumed to
//! cost a real device call, so the context only calls them when the value
//! actually changes. Backends do not deduplicate anything themselves.
//!
//! Two implementations ship with the crate:
//! - [`HeadlessBackend`](super::HeadlessBackend): software device that
//!   validates handles and counts calls (used by the tests).
//! - `WgpuBackend` (feature `wgpu`): replays the call stream into wgpu passes.

use bitflags::bitflags;
use smallvec::SmallVec;

use super::handle::{
    BufferId, FramebufferId, ProgramId, SamplerId, TextureId, VertexArrayId, ViewId,
};
use super::state::{BlendFactor, BlendOp, CullMode, PolygonMode, PolygonOffset};
use super::texture::TextureShape;
use super::types::{
    ClearValue, CompareOp, GroupCounts, IndexType, PrimitiveTopology, Rect2D, SamplerInfo,
};
use super::vertex::VertexAttributes;
use crate::errors::{Result, ShaderStage};

bitflags! {
    /// Memory barriers issued between passes that write and then read the
    /// same resource through incoherent paths (image stores, SSBO writes).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BarrierBits: u32 {
        const VERTEX_ATTRIB_ARRAY = 1 << 0;
        const ELEMENT_ARRAY = 1 << 1;
        const UNIFORM = 1 << 2;
        const TEXTURE_FETCH = 1 << 3;
        const SHADER_IMAGE_ACCESS = 1 << 4;
        const COMMAND = 1 << 5;
        const TEXTURE_UPDATE = 1 << 6;
        const BUFFER_UPDATE = 1 << 7;
        const FRAMEBUFFER = 1 << 8;
        const SHADER_STORAGE = 1 << 9;
        const ALL = u32::MAX;
    }
}

bitflags! {
    /// Access mode of a storage image binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAccess: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// A 2D reinterpretation of one (mip, layer, face) of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub mip_level: u32,
    pub layer: u32,
    pub face: u32,
}

/// Region of a texture touched by an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub mip_level: u32,
    /// Cube face (`0` for non-cube textures).
    pub face: u32,
    /// Array layer (`0` for non-array textures).
    pub layer: u32,
    pub width: u32,
    pub height: u32,
    /// Depth slices for volume textures, `1` otherwise.
    pub depth: u32,
}

/// Surface a framebuffer attachment resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentTarget {
    /// A single mip (and optional layer) of a 2D, 2D array or 3D texture.
    Texture {
        texture: TextureId,
        mip_level: u32,
        layer: Option<u32>,
    },
    /// A face view of a cube or cube array texture.
    View(ViewId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramebufferAttachment {
    pub target: AttachmentTarget,
    pub clear: Option<ClearValue>,
}

/// Resolved attachment set for an offscreen pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramebufferDesc {
    pub area: Rect2D,
    pub color: SmallVec<[FramebufferAttachment; 4]>,
    pub depth: Option<FramebufferAttachment>,
}

/// Clear requests for the default (presentation) framebuffer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DefaultClear {
    pub color: Option<glam::Vec4>,
    pub depth: Option<f32>,
    pub stencil: Option<i32>,
}

/// The raw graphics device.
///
/// Invalid handles are a caller bug; implementations may panic or ignore
/// them but must never corrupt other objects. Destroying a null handle is a
/// no-op.
pub trait GraphicsBackend {
    /// Human readable backend name, used in log lines.
    fn name(&self) -> &'static str;

    // ─── Textures ────────────────────────────────────────────────────────

    fn create_texture(&mut self, shape: &TextureShape) -> Result<TextureId>;
    fn destroy_texture(&mut self, texture: TextureId);
    fn create_texture_view(&mut self, texture: TextureId, key: ViewKey) -> Result<ViewId>;
    fn destroy_texture_view(&mut self, view: ViewId);

    /// Attaches default sampling state to `texture`.
    fn setup_sampler(&mut self, texture: TextureId, info: &SamplerInfo);
    fn upload_texture(&mut self, texture: TextureId, region: &TextureRegion, data: &[u8]);
    /// Zero-fills every mip of `texture`.
    fn clear_texture(&mut self, texture: TextureId);

    fn create_sampler(&mut self, info: &SamplerInfo) -> Result<SamplerId>;
    fn destroy_sampler(&mut self, sampler: SamplerId);

    // ─── Buffers ─────────────────────────────────────────────────────────

    /// With `data`, the buffer is created immutable.
    fn create_buffer(&mut self, size: u64, data: Option<&[u8]>) -> Result<BufferId>;
    fn destroy_buffer(&mut self, buffer: BufferId);
    fn upload_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);
    fn clear_buffer(&mut self, buffer: BufferId);

    // ─── Programs & Layouts ──────────────────────────────────────────────

    /// Compiles and links a program from its stage sources. Failures carry
    /// the compiler diagnostic.
    fn create_program(&mut self, stages: &[(ShaderStage, &str)]) -> Result<ProgramId>;
    fn destroy_program(&mut self, program: ProgramId);

    fn create_vertex_array(&mut self, attributes: &VertexAttributes) -> Result<VertexArrayId>;
    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayId);

    // ─── Fixed-function State ────────────────────────────────────────────

    fn set_program(&mut self, program: ProgramId);
    fn set_vertex_array(&mut self, vertex_array: VertexArrayId);

    fn set_depth_test(&mut self, enabled: bool);
    fn set_depth_func(&mut self, op: CompareOp);
    fn set_depth_write(&mut self, enabled: bool);

    fn set_polygon_mode(&mut self, mode: PolygonMode);
    /// `mode` selects which primitive class the offset applies to.
    fn set_polygon_offset(&mut self, mode: PolygonMode, offset: Option<PolygonOffset>);
    fn set_cull_mode(&mut self, mode: CullMode);
    fn set_depth_clamp(&mut self, enabled: bool);
    fn set_scissor_test(&mut self, enabled: bool);

    fn set_blend_enabled(&mut self, index: u32, enabled: bool);
    fn set_blend_equation(&mut self, index: u32, color: BlendOp, alpha: BlendOp);
    fn set_blend_func(
        &mut self,
        index: u32,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );

    fn set_viewport(&mut self, rect: Rect2D);
    fn set_scissor(&mut self, rect: Rect2D);

    // ─── Resource Bindings ───────────────────────────────────────────────

    fn bind_texture(&mut self, unit: u32, texture: TextureId, sampler: Option<SamplerId>);
    fn bind_image(&mut self, unit: u32, texture: TextureId, mip_level: u32, access: ImageAccess);
    fn bind_uniform_buffer(&mut self, index: u32, buffer: BufferId);
    fn bind_storage_buffer(&mut self, index: u32, buffer: BufferId);

    fn set_vertex_buffer(&mut self, vertex_array: VertexArrayId, buffer: BufferId, stride: u32);
    fn set_index_buffer(
        &mut self,
        vertex_array: VertexArrayId,
        buffer: BufferId,
        index_type: IndexType,
    );

    fn memory_barrier(&mut self, barriers: BarrierBits);

    // ─── Passes & Commands ───────────────────────────────────────────────

    fn begin_rendering(&mut self, desc: &FramebufferDesc) -> Result<FramebufferId>;
    fn begin_default_rendering(&mut self, area: Rect2D, clear: &DefaultClear) -> Result<()>;
    fn end_rendering(&mut self, framebuffer: FramebufferId);

    fn draw_arrays(
        &mut self,
        topology: PrimitiveTopology,
        first_vertex: u32,
        num_vertices: u32,
        num_instances: u32,
    );
    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        index_type: IndexType,
        first_index: u32,
        num_indices: u32,
        base_vertex: u32,
        num_instances: u32,
    );
    fn dispatch(&mut self, groups: GroupCounts);
}
