//! Device State Cache
//!
//! [`RenderContext`] is the single owner of the graphics device. It creates
//! and destroys physical resources, issues draws and dispatches, and keeps a
//! [`PipelineSnapshot`] of everything currently bound. Every state setter
//! compares against the snapshot first and only reaches the backend when the
//! value really changes, so re-binding the same pipeline dozens of times per
//! frame costs nothing on the device.
//!
//! # Invariants
//!
//! - The snapshot always equals the backend's actual state. It is primed at
//!   construction and only mutated right after the matching backend call.
//! - Binding a destroyed (null) handle is a caller bug, caught by
//!   `debug_assert!` and unspecified in release builds.
//! - Cube-map attachments go through a per-texture view cache keyed by
//!   `(mip, layer, face)`, so attaching two faces of the same texture never
//!   invalidates a view another framebuffer still uses.

use bytemuck::Pod;
use rustc_hash::FxHashMap;
use slotmap::Key;
use smallvec::SmallVec;

use super::backend::{
    AttachmentTarget, BarrierBits, DefaultClear, FramebufferAttachment, FramebufferDesc,
    GraphicsBackend, ImageAccess, TextureRegion, ViewKey,
};
use super::buffer::{Buffer, IndexBuffer, VertexBuffer};
use super::handle::{
    BufferId, FramebufferId, ProgramId, SamplerId, TextureId, VertexArrayId, ViewId,
};
use super::state::{
    BlendState, CullMode, GraphicsPipeline, MAX_BLEND_STATES, PipelineSnapshot, PolygonMode,
    PolygonOffset,
};
use super::texture::{Texture, TextureCreateInfo, TextureShape, TextureType};
use super::types::{
    ClearValue, CompareOp, Extent2D, GeometryInfo, GroupCounts, IndexType, PixelFormat,
    PrimitiveTopology, Rect2D, SamplerInfo, calc_mip_levels, calc_mip_size,
};
use super::vertex::{VertexAttributes, VertexFormatCache, attributes_hash};
use crate::errors::{Result, RhiError, ShaderStage};

/// One framebuffer attachment of an offscreen pass.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentInfo<'t> {
    pub image: &'t Texture,
    pub mip_level: u32,
    /// Array layer. Required for 2D array targets.
    pub layer: Option<u32>,
    /// Cube face, for cube and cube array targets.
    pub face: Option<u32>,
    pub clear_value: Option<ClearValue>,
}

impl<'t> AttachmentInfo<'t> {
    /// Mip 0 of `image`, without clearing.
    #[must_use]
    pub fn new(image: &'t Texture) -> Self {
        Self {
            image,
            mip_level: 0,
            layer: None,
            face: None,
            clear_value: None,
        }
    }

    #[must_use]
    pub fn clear(mut self, value: ClearValue) -> Self {
        self.clear_value = Some(value);
        self
    }
}

/// Attachment set and render area of an offscreen pass.
#[derive(Debug, Clone, Default)]
pub struct RenderingInfo<'t> {
    pub area: Rect2D,
    pub color_attachments: SmallVec<[AttachmentInfo<'t>; 4]>,
    pub depth_attachment: Option<AttachmentInfo<'t>>,
}

type ViewSlots = SmallVec<[(ViewKey, ViewId); 6]>;

/// Caches the device state and owns the backend.
pub struct RenderContext<B: GraphicsBackend> {
    backend: B,

    dummy_vertex_array: VertexArrayId,
    vertex_arrays: FxHashMap<u64, VertexArrayId>,
    vertex_formats: VertexFormatCache,
    views: FxHashMap<TextureId, ViewSlots>,

    current: PipelineSnapshot,
    bound_vertex_buffer: Option<(BufferId, u32)>,
    bound_index_buffer: Option<BufferId>,
    rendering_started: bool,
}

impl<B: GraphicsBackend> RenderContext<B> {
    /// Takes ownership of `backend` and brings its state in line with the
    /// default [`PipelineSnapshot`].
    pub fn new(mut backend: B) -> Result<Self> {
        let dummy_vertex_array = backend.create_vertex_array(&VertexAttributes::new())?;

        let current = PipelineSnapshot {
            vertex_array: dummy_vertex_array,
            ..Default::default()
        };

        // The device starts in an API-defined state that need not match ours.
        backend.set_depth_test(current.depth_stencil.depth_test);
        backend.set_depth_func(current.depth_stencil.depth_compare_op);
        backend.set_depth_write(current.depth_stencil.depth_write);
        backend.set_polygon_mode(current.rasterizer.polygon_mode);
        backend.set_cull_mode(current.rasterizer.cull_mode);
        backend.set_polygon_offset(
            current.rasterizer.polygon_mode,
            current.rasterizer.polygon_offset,
        );
        backend.set_depth_clamp(current.rasterizer.depth_clamp_enable);
        backend.set_scissor_test(current.rasterizer.scissor_test);
        for (index, blend) in current.blend_states.iter().enumerate() {
            let index = index as u32;
            backend.set_blend_enabled(index, blend.enabled);
            backend.set_blend_equation(index, blend.color_op, blend.alpha_op);
            backend.set_blend_func(
                index,
                blend.src_color,
                blend.dst_color,
                blend.src_alpha,
                blend.dst_alpha,
            );
        }
        backend.set_vertex_array(dummy_vertex_array);

        log::info!("RenderContext created on {} backend", backend.name());

        Ok(Self {
            backend,
            dummy_vertex_array,
            vertex_arrays: FxHashMap::default(),
            vertex_formats: VertexFormatCache::new(),
            views: FxHashMap::default(),
            current,
            bound_vertex_buffer: None,
            bound_index_buffer: None,
            rendering_started: false,
        })
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct access to the device.
    ///
    /// Changing fixed-function state through this desynchronizes the cache;
    /// it is meant for backend-specific queries and test instrumentation.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// State the cache believes is currently bound.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> &PipelineSnapshot {
        &self.current
    }

    #[inline]
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.rendering_started
    }

    #[inline]
    pub fn vertex_formats(&mut self) -> &mut VertexFormatCache {
        &mut self.vertex_formats
    }

    // ========================================================================
    // Textures
    // ========================================================================

    /// Creates a texture with exactly the requested shape.
    ///
    /// Target selection: six faces make a cube map, a non-zero depth makes a
    /// volume, anything else is 2D. A non-zero layer count turns 2D and cube
    /// targets into their array variants.
    pub fn create_texture(&mut self, info: &TextureCreateInfo) -> Result<Texture> {
        let shape = resolve_texture_shape(info).inspect_err(|e| log::error!("{e}"))?;
        let id = self.backend.create_texture(&shape)?;

        log::info!(
            "Created texture {:?}: {} [{}] {:?}, {} mips, {} layers",
            id,
            shape.extent,
            shape.format,
            shape.texture_type,
            shape.num_mip_levels,
            shape.num_layers
        );
        Ok(Texture::from_shape(id, &shape))
    }

    /// `num_mip_levels == 0` requests a full chain.
    pub fn create_texture_2d(
        &mut self,
        extent: Extent2D,
        format: PixelFormat,
        num_mip_levels: u32,
        num_layers: u32,
    ) -> Result<Texture> {
        self.create_texture(&TextureCreateInfo {
            extent,
            format,
            num_mip_levels,
            num_layers,
            ..Default::default()
        })
    }

    pub fn create_texture_3d(
        &mut self,
        extent: Extent2D,
        depth: u32,
        format: PixelFormat,
        num_mip_levels: u32,
    ) -> Result<Texture> {
        if depth == 0 {
            return Err(RhiError::InvalidTextureDesc(
                "volume texture with zero depth".to_string(),
            ));
        }
        self.create_texture(&TextureCreateInfo {
            extent,
            depth,
            format,
            num_mip_levels,
            ..Default::default()
        })
    }

    pub fn create_cubemap(
        &mut self,
        size: u32,
        format: PixelFormat,
        num_mip_levels: u32,
        num_layers: u32,
    ) -> Result<Texture> {
        self.create_texture(&TextureCreateInfo {
            extent: Extent2D::new(size, size),
            format,
            num_faces: 6,
            num_mip_levels,
            num_layers,
            ..Default::default()
        })
    }

    /// Attaches default sampling state to `texture`.
    pub fn setup_sampler(&mut self, texture: &Texture, info: &SamplerInfo) {
        debug_assert!(texture.is_valid(), "setup_sampler on a destroyed texture");
        self.backend.setup_sampler(texture.id(), info);
    }

    pub fn create_sampler(&mut self, info: &SamplerInfo) -> Result<SamplerId> {
        self.backend.create_sampler(info)
    }

    /// Uploads a region of one mip / face / layer.
    pub fn upload_texture(&mut self, texture: &Texture, region: &TextureRegion, data: &[u8]) {
        debug_assert!(texture.is_valid(), "upload to a destroyed texture");
        debug_assert!(region.mip_level < texture.num_mip_levels());
        if data.is_empty() {
            return;
        }
        self.backend.upload_texture(texture.id(), region, data);
    }

    /// Uploads a whole mip level of a 2D texture.
    pub fn upload_texture_2d(&mut self, texture: &Texture, mip_level: u32, data: &[u8]) {
        let extent = texture.extent();
        let size = calc_mip_size(glam::UVec3::new(extent.width, extent.height, 1), mip_level);
        self.upload_texture(
            texture,
            &TextureRegion {
                mip_level,
                face: 0,
                layer: 0,
                width: size.x,
                height: size.y,
                depth: 1,
            },
            data,
        );
    }

    /// Zero-fills the texture.
    pub fn clear_texture(&mut self, texture: &Texture) {
        debug_assert!(texture.is_valid(), "clear of a destroyed texture");
        self.backend.clear_texture(texture.id());
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    /// Creates a buffer of `size` bytes. Initial data makes it immutable.
    pub fn create_buffer(&mut self, size: u64, data: Option<&[u8]>) -> Result<Buffer> {
        if size == 0 {
            let err = RhiError::InvalidBufferDesc("zero-sized buffer".to_string());
            log::error!("{err}");
            return Err(err);
        }
        if let Some(data) = data
            && data.len() as u64 != size
        {
            let err = RhiError::InvalidBufferDesc(format!(
                "initial data is {} bytes, buffer is {size}",
                data.len()
            ));
            log::error!("{err}");
            return Err(err);
        }

        let id = self.backend.create_buffer(size, data)?;
        log::info!("Created buffer {id:?}: {size} bytes");
        Ok(Buffer::new(id, size, data.is_some()))
    }

    pub fn create_vertex_buffer(
        &mut self,
        stride: u32,
        capacity: u64,
        data: Option<&[u8]>,
    ) -> Result<VertexBuffer> {
        let buffer = self.create_buffer(u64::from(stride) * capacity, data)?;
        Ok(VertexBuffer { buffer, stride })
    }

    pub fn create_index_buffer(
        &mut self,
        index_type: IndexType,
        capacity: u64,
        data: Option<&[u8]>,
    ) -> Result<IndexBuffer> {
        let buffer = self.create_buffer(u64::from(index_type.stride()) * capacity, data)?;
        Ok(IndexBuffer { buffer, index_type })
    }

    pub fn upload_buffer(&mut self, buffer: &Buffer, offset: u64, data: &[u8]) {
        debug_assert!(buffer.is_valid(), "upload to a destroyed buffer");
        debug_assert!(!buffer.is_immutable(), "upload to an immutable buffer");
        debug_assert!(offset + data.len() as u64 <= buffer.size());
        if data.is_empty() {
            return;
        }
        self.backend.upload_buffer(buffer.id(), offset, data);
    }

    /// Typed variant of [`upload_buffer`](Self::upload_buffer).
    pub fn upload_slice<T: Pod>(&mut self, buffer: &Buffer, offset: u64, data: &[T]) {
        self.upload_buffer(buffer, offset, bytemuck::cast_slice(data));
    }

    pub fn clear_buffer(&mut self, buffer: &Buffer) {
        debug_assert!(buffer.is_valid(), "clear of a destroyed buffer");
        self.backend.clear_buffer(buffer.id());
    }

    // ========================================================================
    // Programs & Vertex Arrays
    // ========================================================================

    pub fn create_graphics_program(&mut self, vert: &str, frag: &str) -> Result<ProgramId> {
        self.backend
            .create_program(&[(ShaderStage::Vertex, vert), (ShaderStage::Fragment, frag)])
            .inspect_err(|e| log::error!("{e}"))
    }

    pub fn create_compute_program(&mut self, code: &str) -> Result<ProgramId> {
        self.backend
            .create_program(&[(ShaderStage::Compute, code)])
            .inspect_err(|e| log::error!("{e}"))
    }

    /// Returns the vertex array for `attributes`, creating it on first use.
    pub fn get_vertex_array(&mut self, attributes: &VertexAttributes) -> Result<VertexArrayId> {
        debug_assert!(!attributes.is_empty());

        let hash = attributes_hash(attributes);
        if let Some(vao) = self.vertex_arrays.get(&hash) {
            return Ok(*vao);
        }

        let vao = self.backend.create_vertex_array(attributes)?;
        self.vertex_arrays.insert(hash, vao);
        log::info!("Created VAO: {hash:#018x}");
        Ok(vao)
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    /// Releases the device texture and its cached views. No-op on a
    /// destroyed texture; the handle is cleared either way.
    pub fn destroy_texture(&mut self, texture: &mut Texture) {
        if !texture.is_valid() {
            return;
        }
        let id = texture.take_id();
        if let Some(views) = self.views.remove(&id) {
            for (_, view) in views {
                self.backend.destroy_texture_view(view);
            }
        }
        self.backend.destroy_texture(id);
    }

    pub fn destroy_buffer(&mut self, buffer: &mut Buffer) {
        if !buffer.is_valid() {
            return;
        }
        let id = buffer.take_id();
        if self.bound_vertex_buffer.is_some_and(|(b, _)| b == id) {
            self.bound_vertex_buffer = None;
        }
        if self.bound_index_buffer == Some(id) {
            self.bound_index_buffer = None;
        }
        self.backend.destroy_buffer(id);
    }

    pub fn destroy_program(&mut self, program: &mut ProgramId) {
        if program.is_null() {
            return;
        }
        let id = std::mem::take(program);
        if self.current.program == id {
            self.current.program = ProgramId::null();
        }
        self.backend.destroy_program(id);
    }

    /// Destroys the pipeline's program. The vertex array belongs to the
    /// VAO cache and is only forgotten.
    pub fn destroy_pipeline(&mut self, pipeline: &mut GraphicsPipeline) {
        self.destroy_program(&mut pipeline.program);
        pipeline.vertex_array = VertexArrayId::null();
    }

    pub fn destroy_sampler(&mut self, sampler: &mut SamplerId) {
        if sampler.is_null() {
            return;
        }
        self.backend.destroy_sampler(std::mem::take(sampler));
    }

    // ========================================================================
    // Rendering Scopes
    // ========================================================================

    /// Opens an offscreen pass.
    pub fn begin_rendering(&mut self, info: &RenderingInfo<'_>) -> Result<FramebufferId> {
        debug_assert!(!self.rendering_started, "nested begin_rendering");

        let mut desc = FramebufferDesc {
            area: info.area,
            ..Default::default()
        };
        if let Some(depth) = &info.depth_attachment {
            desc.depth = Some(self.resolve_attachment(depth)?);
        }
        for attachment in &info.color_attachments {
            let resolved = self.resolve_attachment(attachment)?;
            desc.color.push(resolved);
        }

        // Clears honour depth mask and scissor test.
        if info
            .depth_attachment
            .as_ref()
            .is_some_and(|d| d.clear_value.is_some())
        {
            self.set_depth_write(true);
        }
        self.set_scissor_test(false);

        let framebuffer = self.backend.begin_rendering(&desc)?;
        self.set_viewport(info.area);

        self.rendering_started = true;
        Ok(framebuffer)
    }

    /// Opens a pass on the default (presentation) framebuffer.
    pub fn begin_default_rendering(&mut self, area: Rect2D, clear: &DefaultClear) -> Result<()> {
        if clear.depth.is_some() {
            self.set_depth_write(true);
        }
        self.set_scissor_test(false);

        self.backend.begin_default_rendering(area, clear)?;
        self.set_viewport(area);
        Ok(())
    }

    /// Closes the offscreen pass opened by [`begin_rendering`](Self::begin_rendering).
    pub fn end_rendering(&mut self, framebuffer: FramebufferId) {
        debug_assert!(self.rendering_started && !framebuffer.is_null());
        self.backend.end_rendering(framebuffer);
        self.rendering_started = false;
    }

    fn resolve_attachment(&mut self, info: &AttachmentInfo<'_>) -> Result<FramebufferAttachment> {
        let image = info.image;
        debug_assert!(image.is_valid(), "attaching a destroyed texture");

        let target = match image.texture_type() {
            Some(TextureType::CubeMap | TextureType::CubeMapArray) => {
                let key = ViewKey {
                    mip_level: info.mip_level,
                    layer: info.layer.unwrap_or(0),
                    face: info.face.unwrap_or(0),
                };
                AttachmentTarget::View(self.face_view(image.id(), key)?)
            }
            Some(TextureType::Texture2D) => AttachmentTarget::Texture {
                texture: image.id(),
                mip_level: info.mip_level,
                layer: None,
            },
            Some(TextureType::Texture2DArray | TextureType::Texture3D) => {
                debug_assert!(info.layer.is_some(), "layered attachment without a layer");
                AttachmentTarget::Texture {
                    texture: image.id(),
                    mip_level: info.mip_level,
                    layer: Some(info.layer.unwrap_or(0)),
                }
            }
            None => return Err(RhiError::InvalidHandle("texture")),
        };

        Ok(FramebufferAttachment {
            target,
            clear: info.clear_value,
        })
    }

    /// Returns the cached 2D view of one face, creating it on first use.
    fn face_view(&mut self, texture: TextureId, key: ViewKey) -> Result<ViewId> {
        let slots = self.views.entry(texture).or_default();
        if let Some((_, view)) = slots.iter().find(|(k, _)| *k == key) {
            return Ok(*view);
        }
        let view = self.backend.create_texture_view(texture, key)?;
        slots.push((key, view));
        Ok(view)
    }

    /// Number of cube face views currently cached for `texture`.
    #[must_use]
    pub fn cached_view_count(&self, texture: &Texture) -> usize {
        self.views.get(&texture.id()).map_or(0, SmallVec::len)
    }

    // ========================================================================
    // Pipeline State
    // ========================================================================

    /// Binds `pipeline`, forwarding only the sub-states that differ from the
    /// currently bound ones.
    pub fn bind_pipeline(&mut self, pipeline: &GraphicsPipeline) {
        debug_assert!(pipeline.is_valid(), "binding a destroyed pipeline");

        let mut changed = false;

        let ds = pipeline.depth_stencil;
        changed |= self.set_depth_test(ds.depth_test, ds.depth_compare_op);
        changed |= self.set_depth_write(ds.depth_write);

        let rs = pipeline.rasterizer;
        changed |= self.set_polygon_mode(rs.polygon_mode);
        changed |= self.set_cull_mode(rs.cull_mode);
        changed |= self.set_polygon_offset(rs.polygon_offset);
        changed |= self.set_depth_clamp(rs.depth_clamp_enable);
        changed |= self.set_scissor_test(rs.scissor_test);

        for (index, state) in pipeline.blend_states.iter().enumerate() {
            changed |= self.set_blend_state(index, state);
        }

        changed |= self.set_vertex_array(pipeline.vertex_array);
        changed |= self.set_shader_program(pipeline.program);

        if !changed {
            log::trace!("bind_pipeline: state unchanged, no device calls");
        }
    }

    pub fn set_viewport(&mut self, rect: Rect2D) {
        if self.current.viewport != rect {
            self.backend.set_viewport(rect);
            self.current.viewport = rect;
        }
    }

    pub fn set_scissor(&mut self, rect: Rect2D) {
        if self.current.scissor != rect {
            self.backend.set_scissor(rect);
            self.current.scissor = rect;
        }
    }

    fn set_shader_program(&mut self, program: ProgramId) -> bool {
        debug_assert!(!program.is_null(), "binding a null program");
        if self.current.program == program {
            return false;
        }
        self.backend.set_program(program);
        self.current.program = program;
        true
    }

    fn set_vertex_array(&mut self, vertex_array: VertexArrayId) -> bool {
        let vertex_array = if vertex_array.is_null() {
            self.dummy_vertex_array
        } else {
            vertex_array
        };
        if self.current.vertex_array == vertex_array {
            return false;
        }
        self.backend.set_vertex_array(vertex_array);
        self.current.vertex_array = vertex_array;
        // Buffer bindings live in the vertex array object.
        self.bound_vertex_buffer = None;
        self.bound_index_buffer = None;
        true
    }

    fn set_vertex_buffer(&mut self, vertex_buffer: &VertexBuffer) {
        debug_assert!(vertex_buffer.is_valid(), "binding a destroyed vertex buffer");
        let binding = (vertex_buffer.id(), vertex_buffer.stride());
        if self.bound_vertex_buffer != Some(binding) {
            self.backend
                .set_vertex_buffer(self.current.vertex_array, binding.0, binding.1);
            self.bound_vertex_buffer = Some(binding);
        }
    }

    fn set_index_buffer(&mut self, index_buffer: &IndexBuffer) {
        debug_assert!(index_buffer.is_valid(), "binding a destroyed index buffer");
        let id = index_buffer.id();
        if self.bound_index_buffer != Some(id) {
            self.backend
                .set_index_buffer(self.current.vertex_array, id, index_buffer.index_type());
            self.bound_index_buffer = Some(id);
        }
    }

    /// The compare op is only forwarded while the test is enabled.
    fn set_depth_test(&mut self, enabled: bool, op: CompareOp) -> bool {
        let mut changed = false;
        let current = &mut self.current.depth_stencil;
        if current.depth_test != enabled {
            self.backend.set_depth_test(enabled);
            current.depth_test = enabled;
            changed = true;
        }
        if enabled && current.depth_compare_op != op {
            self.backend.set_depth_func(op);
            current.depth_compare_op = op;
            changed = true;
        }
        changed
    }

    fn set_depth_write(&mut self, enabled: bool) -> bool {
        if self.current.depth_stencil.depth_write == enabled {
            return false;
        }
        self.backend.set_depth_write(enabled);
        self.current.depth_stencil.depth_write = enabled;
        true
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) -> bool {
        if self.current.rasterizer.polygon_mode == mode {
            return false;
        }
        self.backend.set_polygon_mode(mode);
        self.current.rasterizer.polygon_mode = mode;
        true
    }

    /// Applies to the polygon mode that is current at the time of the call,
    /// so [`set_polygon_mode`](Self::set_polygon_mode) must run first.
    fn set_polygon_offset(&mut self, offset: Option<PolygonOffset>) -> bool {
        let current = &mut self.current.rasterizer;
        if current.polygon_offset == offset {
            return false;
        }
        self.backend.set_polygon_offset(current.polygon_mode, offset);
        current.polygon_offset = offset;
        true
    }

    fn set_cull_mode(&mut self, mode: CullMode) -> bool {
        if self.current.rasterizer.cull_mode == mode {
            return false;
        }
        self.backend.set_cull_mode(mode);
        self.current.rasterizer.cull_mode = mode;
        true
    }

    fn set_depth_clamp(&mut self, enabled: bool) -> bool {
        if self.current.rasterizer.depth_clamp_enable == enabled {
            return false;
        }
        self.backend.set_depth_clamp(enabled);
        self.current.rasterizer.depth_clamp_enable = enabled;
        true
    }

    fn set_scissor_test(&mut self, enabled: bool) -> bool {
        if self.current.rasterizer.scissor_test == enabled {
            return false;
        }
        self.backend.set_scissor_test(enabled);
        self.current.rasterizer.scissor_test = enabled;
        true
    }

    /// Equation and factors only matter while blending is enabled, so they
    /// are left untouched (and untracked) for disabled attachments.
    fn set_blend_state(&mut self, index: usize, state: &BlendState) -> bool {
        debug_assert!(index < MAX_BLEND_STATES);
        let current = &mut self.current.blend_states[index];
        if *current == *state {
            return false;
        }

        let mut changed = false;
        let slot = index as u32;
        if current.enabled != state.enabled {
            self.backend.set_blend_enabled(slot, state.enabled);
            current.enabled = state.enabled;
            changed = true;
        }
        if state.enabled {
            if current.color_op != state.color_op || current.alpha_op != state.alpha_op {
                self.backend
                    .set_blend_equation(slot, state.color_op, state.alpha_op);
                current.color_op = state.color_op;
                current.alpha_op = state.alpha_op;
                changed = true;
            }
            if current.src_color != state.src_color
                || current.dst_color != state.dst_color
                || current.src_alpha != state.src_alpha
                || current.dst_alpha != state.dst_alpha
            {
                self.backend.set_blend_func(
                    slot,
                    state.src_color,
                    state.dst_color,
                    state.src_alpha,
                    state.dst_alpha,
                );
                current.src_color = state.src_color;
                current.dst_color = state.dst_color;
                current.src_alpha = state.src_alpha;
                current.dst_alpha = state.dst_alpha;
                changed = true;
            }
        }
        changed
    }

    // ========================================================================
    // Resource Bindings
    // ========================================================================

    pub fn bind_texture(&mut self, unit: u32, texture: &Texture, sampler: Option<SamplerId>) {
        debug_assert!(texture.is_valid(), "binding a destroyed texture");
        self.backend.bind_texture(unit, texture.id(), sampler);
    }

    pub fn bind_image(&mut self, unit: u32, texture: &Texture, mip_level: u32, access: ImageAccess) {
        debug_assert!(texture.is_valid() && mip_level < texture.num_mip_levels());
        self.backend
            .bind_image(unit, texture.id(), mip_level, access);
    }

    pub fn bind_uniform_buffer(&mut self, index: u32, buffer: &Buffer) {
        debug_assert!(buffer.is_valid(), "binding a destroyed uniform buffer");
        self.backend.bind_uniform_buffer(index, buffer.id());
    }

    pub fn bind_storage_buffer(&mut self, index: u32, buffer: &Buffer) {
        debug_assert!(buffer.is_valid(), "binding a destroyed storage buffer");
        self.backend.bind_storage_buffer(index, buffer.id());
    }

    pub fn memory_barrier(&mut self, barriers: BarrierBits) {
        self.backend.memory_barrier(barriers);
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Issues a draw. Indexed when `geometry.num_indices > 0` and an index
    /// buffer is supplied, otherwise `num_vertices` vertices starting at
    /// `vertex_offset` are drawn.
    pub fn draw(
        &mut self,
        vertex_buffer: Option<&VertexBuffer>,
        index_buffer: Option<&IndexBuffer>,
        geometry: &GeometryInfo,
        num_instances: u32,
    ) {
        if let Some(vertex_buffer) = vertex_buffer {
            self.set_vertex_buffer(vertex_buffer);
        }

        match index_buffer {
            Some(index_buffer) if geometry.num_indices > 0 => {
                self.set_index_buffer(index_buffer);
                self.backend.draw_elements(
                    geometry.topology,
                    index_buffer.index_type(),
                    geometry.index_offset,
                    geometry.num_indices,
                    geometry.vertex_offset,
                    num_instances,
                );
            }
            _ => {
                debug_assert!(
                    geometry.num_indices == 0 || index_buffer.is_some(),
                    "indexed geometry without an index buffer"
                );
                self.backend.draw_arrays(
                    geometry.topology,
                    geometry.vertex_offset,
                    geometry.num_vertices,
                    num_instances,
                );
            }
        }
    }

    /// Three attribute-less vertices; the vertex shader expands them.
    pub fn draw_full_screen_triangle(&mut self) {
        self.draw(
            None,
            None,
            &GeometryInfo {
                topology: PrimitiveTopology::TriangleList,
                num_vertices: 3,
                ..Default::default()
            },
            1,
        );
    }

    /// 36 attribute-less vertices forming a unit cube.
    pub fn draw_cube(&mut self) {
        self.draw(
            None,
            None,
            &GeometryInfo {
                topology: PrimitiveTopology::TriangleList,
                num_vertices: 36,
                ..Default::default()
            },
            1,
        );
    }

    /// Binds `program` through the state cache and dispatches.
    pub fn dispatch(&mut self, program: ProgramId, groups: GroupCounts) {
        self.set_shader_program(program);
        self.backend.dispatch(groups);
    }
}

impl<B: GraphicsBackend> Drop for RenderContext<B> {
    fn drop(&mut self) {
        for (_, views) in self.views.drain() {
            for (_, view) in views {
                self.backend.destroy_texture_view(view);
            }
        }
        for (_, vao) in self.vertex_arrays.drain() {
            self.backend.destroy_vertex_array(vao);
        }
        self.backend.destroy_vertex_array(self.dummy_vertex_array);
        log::info!("RenderContext destroyed");
    }
}

/// Validates `info` and picks the device target.
fn resolve_texture_shape(info: &TextureCreateInfo) -> Result<TextureShape> {
    let invalid = |msg: String| Err(RhiError::InvalidTextureDesc(msg));

    if info.extent.is_empty() {
        return invalid(format!("zero extent {}", info.extent));
    }
    if info.format == PixelFormat::Unknown {
        return invalid("unknown pixel format".to_string());
    }

    let texture_type = match (info.num_faces, info.depth, info.num_layers) {
        (6, 0, 0) => TextureType::CubeMap,
        (6, 0, _) => TextureType::CubeMapArray,
        (1, 0, 0) => TextureType::Texture2D,
        (1, 0, _) => TextureType::Texture2DArray,
        (1, _, 0) => TextureType::Texture3D,
        (1, _, _) => return invalid("volume textures cannot be layered".to_string()),
        (6, _, _) => return invalid("cube maps cannot have depth".to_string()),
        (faces, _, _) => return invalid(format!("{faces} faces (expected 1 or 6)")),
    };
    if texture_type.is_cube() && info.extent.width != info.extent.height {
        return invalid(format!("non-square cube map {}", info.extent));
    }

    let largest = info.extent.width.max(info.extent.height).max(info.depth);
    let full_chain = calc_mip_levels(largest);
    let num_mip_levels = match info.num_mip_levels {
        0 => full_chain,
        n if n > full_chain => {
            return invalid(format!("{n} mip levels (at most {full_chain})"));
        }
        n => n,
    };

    Ok(TextureShape {
        texture_type,
        extent: info.extent,
        depth: info.depth,
        format: info.format,
        num_mip_levels,
        num_layers: info.num_layers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32) -> TextureCreateInfo {
        TextureCreateInfo {
            extent: Extent2D::new(width, height),
            format: PixelFormat::Rgba8Unorm,
            ..Default::default()
        }
    }

    #[test]
    fn target_selection() {
        let shape = resolve_texture_shape(&info(64, 32)).unwrap();
        assert_eq!(shape.texture_type, TextureType::Texture2D);

        let layered = TextureCreateInfo {
            num_layers: 4,
            ..info(64, 32)
        };
        assert_eq!(
            resolve_texture_shape(&layered).unwrap().texture_type,
            TextureType::Texture2DArray
        );

        let volume = TextureCreateInfo {
            depth: 16,
            ..info(16, 16)
        };
        assert_eq!(
            resolve_texture_shape(&volume).unwrap().texture_type,
            TextureType::Texture3D
        );

        let cube = TextureCreateInfo {
            num_faces: 6,
            num_layers: 2,
            ..info(32, 32)
        };
        assert_eq!(
            resolve_texture_shape(&cube).unwrap().texture_type,
            TextureType::CubeMapArray
        );
    }

    #[test]
    fn zero_mips_means_full_chain() {
        let shape = resolve_texture_shape(&TextureCreateInfo {
            num_mip_levels: 0,
            ..info(256, 64)
        })
        .unwrap();
        assert_eq!(shape.num_mip_levels, 9);
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        assert!(matches!(
            resolve_texture_shape(&info(0, 16)),
            Err(RhiError::InvalidTextureDesc(_))
        ));
        assert!(matches!(
            resolve_texture_shape(&TextureCreateInfo {
                format: PixelFormat::Unknown,
                ..info(16, 16)
            }),
            Err(RhiError::InvalidTextureDesc(_))
        ));
        assert!(matches!(
            resolve_texture_shape(&TextureCreateInfo {
                num_faces: 6,
                ..info(32, 16)
            }),
            Err(RhiError::InvalidTextureDesc(_))
        ));
        assert!(matches!(
            resolve_texture_shape(&TextureCreateInfo {
                num_mip_levels: 12,
                ..info(256, 256)
            }),
            Err(RhiError::InvalidTextureDesc(_))
        ));
    }
}
