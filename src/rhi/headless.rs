//! Software device.
//!
//! [`HeadlessBackend`] implements [`GraphicsBackend`] without a GPU. It keeps
//! real object tables (so handle lifetimes are checked), stores buffer
//! contents, mirrors the fixed-function state, and counts every call by
//! kind. The counters make state elision observable: binding the same
//! pipeline twice must leave them unchanged.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::backend::{
    BarrierBits, DefaultClear, FramebufferDesc, GraphicsBackend, ImageAccess, TextureRegion,
    ViewKey,
};
use super::handle::{
    BufferId, FramebufferId, ProgramId, SamplerId, TextureId, VertexArrayId, ViewId,
};
use super::state::{
    BlendFactor, BlendOp, CullMode, MAX_BLEND_STATES, PolygonMode, PolygonOffset,
};
use super::texture::TextureShape;
use super::types::{CompareOp, GroupCounts, IndexType, PrimitiveTopology, Rect2D, SamplerInfo};
use super::vertex::VertexAttributes;
use crate::errors::{Result, RhiError, ShaderStage};

/// Kinds of device calls, for [`HeadlessBackend::calls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCall {
    CreateTexture,
    DestroyTexture,
    CreateTextureView,
    DestroyTextureView,
    SetupSampler,
    UploadTexture,
    ClearTexture,
    CreateSampler,
    DestroySampler,

    CreateBuffer,
    DestroyBuffer,
    UploadBuffer,
    ClearBuffer,

    CreateProgram,
    DestroyProgram,
    CreateVertexArray,
    DestroyVertexArray,

    SetProgram,
    SetVertexArray,
    SetDepthTest,
    SetDepthFunc,
    SetDepthWrite,
    SetPolygonMode,
    SetPolygonOffset,
    SetCullMode,
    SetDepthClamp,
    SetScissorTest,
    SetBlendEnabled,
    SetBlendEquation,
    SetBlendFunc,
    SetViewport,
    SetScissor,

    BindTexture,
    BindImage,
    BindUniformBuffer,
    BindStorageBuffer,
    SetVertexBuffer,
    SetIndexBuffer,
    MemoryBarrier,

    BeginRendering,
    BeginDefaultRendering,
    EndRendering,
    DrawArrays,
    DrawElements,
    Dispatch,
}

impl DeviceCall {
    /// `true` for calls that change fixed-function or binding state.
    #[must_use]
    pub const fn is_state_change(self) -> bool {
        matches!(
            self,
            Self::SetProgram
                | Self::SetVertexArray
                | Self::SetDepthTest
                | Self::SetDepthFunc
                | Self::SetDepthWrite
                | Self::SetPolygonMode
                | Self::SetPolygonOffset
                | Self::SetCullMode
                | Self::SetDepthClamp
                | Self::SetScissorTest
                | Self::SetBlendEnabled
                | Self::SetBlendEquation
                | Self::SetBlendFunc
                | Self::SetViewport
                | Self::SetScissor
                | Self::SetVertexBuffer
                | Self::SetIndexBuffer
        )
    }
}

/// Blend state as the device sees it, per attachment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceBlend {
    pub enabled: bool,
    pub equation: Option<(BlendOp, BlendOp)>,
    pub func: Option<(BlendFactor, BlendFactor, BlendFactor, BlendFactor)>,
}

/// Fixed-function state currently set on the device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub program: ProgramId,
    pub vertex_array: VertexArrayId,
    pub depth_test: bool,
    pub depth_func: Option<CompareOp>,
    pub depth_write: bool,
    pub polygon_mode: PolygonMode,
    pub polygon_offset: Option<PolygonOffset>,
    pub cull_mode: CullMode,
    pub depth_clamp: bool,
    pub scissor_test: bool,
    pub blend: [DeviceBlend; MAX_BLEND_STATES],
    pub viewport: Rect2D,
    pub scissor: Rect2D,
}

/// A draw or dispatch recorded by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Draw {
        topology: PrimitiveTopology,
        first_vertex: u32,
        num_vertices: u32,
        num_instances: u32,
    },
    DrawIndexed {
        topology: PrimitiveTopology,
        index_type: IndexType,
        first_index: u32,
        num_indices: u32,
        base_vertex: u32,
        num_instances: u32,
    },
    Dispatch(GroupCounts),
}

#[derive(Debug)]
struct TextureObject {
    shape: TextureShape,
    sampler: Option<SamplerInfo>,
}

#[derive(Debug)]
struct BufferObject {
    data: Vec<u8>,
    immutable: bool,
}

#[derive(Debug)]
struct ProgramObject {
    compute: bool,
}

#[derive(Debug, Default)]
struct VertexArrayObject {
    vertex_buffer: Option<(BufferId, u32)>,
    index_buffer: Option<(BufferId, IndexType)>,
}

/// Software device used for tests and tools.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    textures: SlotMap<TextureId, TextureObject>,
    views: SlotMap<ViewId, (TextureId, ViewKey)>,
    samplers: SlotMap<SamplerId, SamplerInfo>,
    buffers: SlotMap<BufferId, BufferObject>,
    programs: SlotMap<ProgramId, ProgramObject>,
    vertex_arrays: SlotMap<VertexArrayId, VertexArrayObject>,
    framebuffers: SlotMap<FramebufferId, FramebufferDesc>,

    state: DeviceState,
    calls: FxHashMap<DeviceCall, u64>,
    commands: Vec<Command>,
}

impl HeadlessBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, call: DeviceCall) {
        log::trace!("headless: {call:?}");
        *self.calls.entry(call).or_default() += 1;
    }

    // ─── Inspection ──────────────────────────────────────────────────────

    /// Number of calls of `kind` issued so far.
    #[must_use]
    pub fn calls(&self, kind: DeviceCall) -> u64 {
        self.calls.get(&kind).copied().unwrap_or(0)
    }

    /// Total number of calls of any kind.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.calls.values().sum()
    }

    /// Total number of state-changing calls.
    #[must_use]
    pub fn state_calls(&self) -> u64 {
        self.calls
            .iter()
            .filter(|(kind, _)| kind.is_state_change())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn reset_counters(&mut self) {
        self.calls.clear();
        self.commands.clear();
    }

    /// Draws and dispatches issued since the last [`reset_counters`](Self::reset_counters).
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[must_use]
    pub fn device_state(&self) -> &DeviceState {
        &self.state
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn live_views(&self) -> usize {
        self.views.len()
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    #[must_use]
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    #[must_use]
    pub fn is_texture_alive(&self, texture: TextureId) -> bool {
        self.textures.contains_key(texture)
    }

    #[must_use]
    pub fn is_buffer_alive(&self, buffer: BufferId) -> bool {
        self.buffers.contains_key(buffer)
    }

    #[must_use]
    pub fn texture_shape(&self, texture: TextureId) -> Option<&TextureShape> {
        self.textures.get(texture).map(|t| &t.shape)
    }

    /// Sampling state attached with `setup_sampler`, if any.
    #[must_use]
    pub fn texture_sampler(&self, texture: TextureId) -> Option<&SamplerInfo> {
        self.textures.get(texture).and_then(|t| t.sampler.as_ref())
    }

    #[must_use]
    pub fn view_key(&self, view: ViewId) -> Option<ViewKey> {
        self.views.get(view).map(|(_, key)| *key)
    }

    #[must_use]
    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.data.as_slice())
    }

    /// Vertex buffer (with stride) attached to `vertex_array`.
    #[must_use]
    pub fn vertex_buffer_of(&self, vertex_array: VertexArrayId) -> Option<(BufferId, u32)> {
        self.vertex_arrays
            .get(vertex_array)
            .and_then(|v| v.vertex_buffer)
    }

    /// Index buffer attached to `vertex_array`.
    #[must_use]
    pub fn index_buffer_of(&self, vertex_array: VertexArrayId) -> Option<(BufferId, IndexType)> {
        self.vertex_arrays
            .get(vertex_array)
            .and_then(|v| v.index_buffer)
    }

    /// Last framebuffer opened with `begin_rendering`, while it is open.
    #[must_use]
    pub fn framebuffer(&self, framebuffer: FramebufferId) -> Option<&FramebufferDesc> {
        self.framebuffers.get(framebuffer)
    }

    fn check_stage(stage: ShaderStage, source: &str) -> Result<()> {
        let entry = match stage {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Fragment => "fs_main",
            ShaderStage::Compute => "cs_main",
        };
        if source.contains(entry) {
            Ok(())
        } else {
            Err(RhiError::ShaderCompilation {
                stage,
                log: format!("entry point `{entry}` not found"),
            })
        }
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_texture(&mut self, shape: &TextureShape) -> Result<TextureId> {
        self.record(DeviceCall::CreateTexture);
        Ok(self.textures.insert(TextureObject {
            shape: *shape,
            sampler: None,
        }))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.record(DeviceCall::DestroyTexture);
        if self.textures.remove(texture).is_none() {
            log::error!("headless: destroy of unknown texture {texture:?}");
        }
    }

    fn create_texture_view(&mut self, texture: TextureId, key: ViewKey) -> Result<ViewId> {
        self.record(DeviceCall::CreateTextureView);
        if !self.textures.contains_key(texture) {
            return Err(RhiError::InvalidHandle("texture"));
        }
        Ok(self.views.insert((texture, key)))
    }

    fn destroy_texture_view(&mut self, view: ViewId) {
        self.record(DeviceCall::DestroyTextureView);
        self.views.remove(view);
    }

    fn setup_sampler(&mut self, texture: TextureId, info: &SamplerInfo) {
        self.record(DeviceCall::SetupSampler);
        if let Some(object) = self.textures.get_mut(texture) {
            object.sampler = Some(*info);
        }
    }

    fn upload_texture(&mut self, texture: TextureId, region: &TextureRegion, data: &[u8]) {
        self.record(DeviceCall::UploadTexture);
        debug_assert!(self.textures.contains_key(texture));
        log::trace!("headless: upload {} bytes to {texture:?} {region:?}", data.len());
    }

    fn clear_texture(&mut self, texture: TextureId) {
        self.record(DeviceCall::ClearTexture);
        debug_assert!(self.textures.contains_key(texture));
    }

    fn create_sampler(&mut self, info: &SamplerInfo) -> Result<SamplerId> {
        self.record(DeviceCall::CreateSampler);
        Ok(self.samplers.insert(*info))
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        self.record(DeviceCall::DestroySampler);
        self.samplers.remove(sampler);
    }

    fn create_buffer(&mut self, size: u64, data: Option<&[u8]>) -> Result<BufferId> {
        self.record(DeviceCall::CreateBuffer);
        let mut bytes = vec![0u8; size as usize];
        if let Some(data) = data {
            let n = data.len().min(bytes.len());
            bytes[..n].copy_from_slice(&data[..n]);
        }
        Ok(self.buffers.insert(BufferObject {
            data: bytes,
            immutable: data.is_some(),
        }))
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.record(DeviceCall::DestroyBuffer);
        if self.buffers.remove(buffer).is_none() {
            log::error!("headless: destroy of unknown buffer {buffer:?}");
        }
    }

    fn upload_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        self.record(DeviceCall::UploadBuffer);
        let Some(object) = self.buffers.get_mut(buffer) else {
            log::error!("headless: upload to unknown buffer {buffer:?}");
            return;
        };
        if object.immutable {
            log::error!("headless: upload to immutable buffer {buffer:?}");
            return;
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > object.data.len() {
            log::error!("headless: upload out of range ({end} > {})", object.data.len());
            return;
        }
        object.data[start..end].copy_from_slice(data);
    }

    fn clear_buffer(&mut self, buffer: BufferId) {
        self.record(DeviceCall::ClearBuffer);
        if let Some(object) = self.buffers.get_mut(buffer)
            && !object.immutable
        {
            object.data.fill(0);
        }
    }

    fn create_program(&mut self, stages: &[(ShaderStage, &str)]) -> Result<ProgramId> {
        self.record(DeviceCall::CreateProgram);
        for (stage, source) in stages {
            Self::check_stage(*stage, source)?;
        }

        let has = |s: ShaderStage| stages.iter().any(|(stage, _)| *stage == s);
        let compute = has(ShaderStage::Compute);
        let graphics = has(ShaderStage::Vertex) && has(ShaderStage::Fragment);
        if compute == graphics || (compute && stages.len() != 1) {
            return Err(RhiError::ProgramLink(
                "a program needs either vertex + fragment stages or a single compute stage"
                    .to_string(),
            ));
        }
        Ok(self.programs.insert(ProgramObject { compute }))
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.record(DeviceCall::DestroyProgram);
        self.programs.remove(program);
    }

    fn create_vertex_array(&mut self, attributes: &VertexAttributes) -> Result<VertexArrayId> {
        self.record(DeviceCall::CreateVertexArray);
        log::trace!("headless: vertex array with {} attributes", attributes.len());
        Ok(self.vertex_arrays.insert(VertexArrayObject::default()))
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.record(DeviceCall::DestroyVertexArray);
        self.vertex_arrays.remove(vertex_array);
    }

    fn set_program(&mut self, program: ProgramId) {
        self.record(DeviceCall::SetProgram);
        debug_assert!(self.programs.contains_key(program));
        self.state.program = program;
    }

    fn set_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.record(DeviceCall::SetVertexArray);
        debug_assert!(self.vertex_arrays.contains_key(vertex_array));
        self.state.vertex_array = vertex_array;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.record(DeviceCall::SetDepthTest);
        self.state.depth_test = enabled;
    }

    fn set_depth_func(&mut self, op: CompareOp) {
        self.record(DeviceCall::SetDepthFunc);
        self.state.depth_func = Some(op);
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.record(DeviceCall::SetDepthWrite);
        self.state.depth_write = enabled;
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.record(DeviceCall::SetPolygonMode);
        self.state.polygon_mode = mode;
    }

    fn set_polygon_offset(&mut self, _mode: PolygonMode, offset: Option<PolygonOffset>) {
        self.record(DeviceCall::SetPolygonOffset);
        self.state.polygon_offset = offset;
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        self.record(DeviceCall::SetCullMode);
        self.state.cull_mode = mode;
    }

    fn set_depth_clamp(&mut self, enabled: bool) {
        self.record(DeviceCall::SetDepthClamp);
        self.state.depth_clamp = enabled;
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        self.record(DeviceCall::SetScissorTest);
        self.state.scissor_test = enabled;
    }

    fn set_blend_enabled(&mut self, index: u32, enabled: bool) {
        self.record(DeviceCall::SetBlendEnabled);
        self.state.blend[index as usize].enabled = enabled;
    }

    fn set_blend_equation(&mut self, index: u32, color: BlendOp, alpha: BlendOp) {
        self.record(DeviceCall::SetBlendEquation);
        self.state.blend[index as usize].equation = Some((color, alpha));
    }

    fn set_blend_func(
        &mut self,
        index: u32,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.record(DeviceCall::SetBlendFunc);
        self.state.blend[index as usize].func = Some((src_color, dst_color, src_alpha, dst_alpha));
    }

    fn set_viewport(&mut self, rect: Rect2D) {
        self.record(DeviceCall::SetViewport);
        self.state.viewport = rect;
    }

    fn set_scissor(&mut self, rect: Rect2D) {
        self.record(DeviceCall::SetScissor);
        self.state.scissor = rect;
    }

    fn bind_texture(&mut self, _unit: u32, texture: TextureId, _sampler: Option<SamplerId>) {
        self.record(DeviceCall::BindTexture);
        debug_assert!(self.textures.contains_key(texture));
    }

    fn bind_image(&mut self, _unit: u32, texture: TextureId, _mip_level: u32, _access: ImageAccess) {
        self.record(DeviceCall::BindImage);
        debug_assert!(self.textures.contains_key(texture));
    }

    fn bind_uniform_buffer(&mut self, _index: u32, buffer: BufferId) {
        self.record(DeviceCall::BindUniformBuffer);
        debug_assert!(self.buffers.contains_key(buffer));
    }

    fn bind_storage_buffer(&mut self, _index: u32, buffer: BufferId) {
        self.record(DeviceCall::BindStorageBuffer);
        debug_assert!(self.buffers.contains_key(buffer));
    }

    fn set_vertex_buffer(&mut self, vertex_array: VertexArrayId, buffer: BufferId, stride: u32) {
        self.record(DeviceCall::SetVertexBuffer);
        if let Some(vao) = self.vertex_arrays.get_mut(vertex_array) {
            vao.vertex_buffer = Some((buffer, stride));
        }
    }

    fn set_index_buffer(
        &mut self,
        vertex_array: VertexArrayId,
        buffer: BufferId,
        index_type: IndexType,
    ) {
        self.record(DeviceCall::SetIndexBuffer);
        if let Some(vao) = self.vertex_arrays.get_mut(vertex_array) {
            vao.index_buffer = Some((buffer, index_type));
        }
    }

    fn memory_barrier(&mut self, _barriers: BarrierBits) {
        self.record(DeviceCall::MemoryBarrier);
    }

    fn begin_rendering(&mut self, desc: &FramebufferDesc) -> Result<FramebufferId> {
        self.record(DeviceCall::BeginRendering);
        Ok(self.framebuffers.insert(desc.clone()))
    }

    fn begin_default_rendering(&mut self, _area: Rect2D, _clear: &DefaultClear) -> Result<()> {
        self.record(DeviceCall::BeginDefaultRendering);
        Ok(())
    }

    fn end_rendering(&mut self, framebuffer: FramebufferId) {
        self.record(DeviceCall::EndRendering);
        self.framebuffers.remove(framebuffer);
    }

    fn draw_arrays(
        &mut self,
        topology: PrimitiveTopology,
        first_vertex: u32,
        num_vertices: u32,
        num_instances: u32,
    ) {
        self.record(DeviceCall::DrawArrays);
        debug_assert!(
            self.programs
                .get(self.state.program)
                .is_some_and(|p| !p.compute),
            "draw without a graphics program"
        );
        self.commands.push(Command::Draw {
            topology,
            first_vertex,
            num_vertices,
            num_instances,
        });
    }

    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        index_type: IndexType,
        first_index: u32,
        num_indices: u32,
        base_vertex: u32,
        num_instances: u32,
    ) {
        self.record(DeviceCall::DrawElements);
        debug_assert!(
            self.vertex_arrays
                .get(self.state.vertex_array)
                .is_some_and(|v| v.index_buffer.is_some()),
            "indexed draw without an index buffer"
        );
        self.commands.push(Command::DrawIndexed {
            topology,
            index_type,
            first_index,
            num_indices,
            base_vertex,
            num_instances,
        });
    }

    fn dispatch(&mut self, groups: GroupCounts) {
        self.record(DeviceCall::Dispatch);
        debug_assert!(
            self.programs
                .get(self.state.program)
                .is_some_and(|p| p.compute),
            "dispatch without a compute program"
        );
        self.commands.push(Command::Dispatch(groups));
    }
}
