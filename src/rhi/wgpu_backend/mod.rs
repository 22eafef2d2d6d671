//! wgpu Backend
//!
//! [`WgpuBackend`] implements the stateful [`GraphicsBackend`] on top of
//! wgpu's immutable pipelines and explicit passes:
//!
//! - Fixed-function setters only update a local state block.
//! - Draws inside a rendering scope are resolved immediately (pipeline from
//!   the [`PipelineStore`](pipelines::PipelineStore), bind group 0 from the
//!   bound resources) and recorded; `end_rendering` replays them into one
//!   render pass and submits.
//! - Dispatches, uploads and clears are encoded and submitted on the spot.
//!
//! Binding slots map one-to-one onto `@binding(N)` in group 0. A texture
//! bound at slot `N` exposes its sampler at `N + 1`.
//!
//! The default framebuffer is whatever view was handed to
//! [`set_default_target`](WgpuBackend::set_default_target) (usually the
//! current swapchain image). Its pass stays open until the next rendering
//! scope, dispatch or [`flush`](WgpuBackend::flush).

mod convert;
mod pipelines;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;
use wgpu::util::DeviceExt;

use self::pipelines::{DepthKey, PipelineStore, Program, RenderPipelineKey};
use super::backend::{
    AttachmentTarget, BarrierBits, DefaultClear, FramebufferAttachment, FramebufferDesc,
    GraphicsBackend, ImageAccess, TextureRegion, ViewKey,
};
use super::handle::{
    BufferId, FramebufferId, ProgramId, SamplerId, TextureId, VertexArrayId, ViewId,
};
use super::state::{
    BlendFactor, BlendOp, BlendState, CullMode, MAX_BLEND_STATES, PolygonMode, PolygonOffset,
};
use super::texture::{TextureShape, TextureType};
use super::types::{
    ClearValue, CompareOp, GroupCounts, IndexType, PrimitiveTopology, Rect2D, SamplerInfo,
};
use super::vertex::VertexAttributes;
use crate::errors::{Result, RhiError, ShaderStage};
use crate::settings::RhiSettings;

/// Presentation target used by `begin_default_rendering`.
#[derive(Debug, Clone)]
pub struct DefaultTarget {
    pub color: wgpu::TextureView,
    pub color_format: wgpu::TextureFormat,
    pub depth: Option<(wgpu::TextureView, wgpu::TextureFormat)>,
}

struct GpuTexture {
    texture: wgpu::Texture,
    /// View over every mip and layer, used for sampling.
    view: wgpu::TextureView,
    shape: TextureShape,
    format: wgpu::TextureFormat,
    sampler: Option<wgpu::Sampler>,
}

struct GpuView {
    texture: TextureId,
    view: wgpu::TextureView,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
    immutable: bool,
}

#[derive(Default)]
struct GpuVertexArray {
    attributes: VertexAttributes,
    vertex_buffer: Option<(BufferId, u32)>,
    index_buffer: Option<(BufferId, IndexType)>,
}

#[derive(Debug, Clone, Copy)]
enum Binding {
    Texture {
        texture: TextureId,
        sampler: Option<SamplerId>,
    },
    Image {
        texture: TextureId,
        mip_level: u32,
    },
    Buffer(BufferId),
}

/// Loose fixed-function state, folded into pipelines at draw time.
#[derive(Debug, Clone, Default)]
struct DrawState {
    program: ProgramId,
    vertex_array: VertexArrayId,
    depth_test: bool,
    depth_func: CompareOp,
    depth_write: bool,
    polygon_mode: PolygonMode,
    polygon_offset: Option<PolygonOffset>,
    cull_mode: CullMode,
    depth_clamp: bool,
    scissor_test: bool,
    blend: [BlendState; MAX_BLEND_STATES],
    viewport: Rect2D,
    scissor: Rect2D,
}

struct Attachment {
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    depth_slice: Option<u32>,
    clear: Option<ClearValue>,
}

#[derive(Debug, Clone, Copy)]
enum DrawCall {
    Arrays {
        first_vertex: u32,
        num_vertices: u32,
        num_instances: u32,
    },
    Elements {
        first_index: u32,
        num_indices: u32,
        base_vertex: u32,
        num_instances: u32,
    },
}

struct RecordedDraw {
    pipeline: wgpu::RenderPipeline,
    bind_group: Option<wgpu::BindGroup>,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<(wgpu::Buffer, wgpu::IndexFormat)>,
    viewport: Rect2D,
    scissor: Rect2D,
    call: DrawCall,
}

/// A rendering scope being recorded. `framebuffer` is `None` for the
/// default target.
struct OpenPass {
    framebuffer: Option<FramebufferId>,
    area: Rect2D,
    color: SmallVec<[Attachment; 4]>,
    depth: Option<Attachment>,
    draws: Vec<RecordedDraw>,
}

enum BoundResource {
    View(wgpu::TextureView),
    Sampler(wgpu::Sampler),
    Buffer(wgpu::Buffer),
}

/// GPU device driven through wgpu.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    textures: SlotMap<TextureId, GpuTexture>,
    views: SlotMap<ViewId, GpuView>,
    samplers: SlotMap<SamplerId, wgpu::Sampler>,
    buffers: SlotMap<BufferId, GpuBuffer>,
    programs: SlotMap<ProgramId, Program>,
    vertex_arrays: SlotMap<VertexArrayId, GpuVertexArray>,
    framebuffers: SlotMap<FramebufferId, FramebufferDesc>,

    pipelines: PipelineStore,
    default_sampler: wgpu::Sampler,
    default_target: Option<DefaultTarget>,

    state: DrawState,
    bindings: FxHashMap<u32, Binding>,
    pass: Option<OpenPass>,
}

impl WgpuBackend {
    /// Requests an adapter and a device without a surface.
    pub async fn new(settings: &RhiSettings) -> Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RhiError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Myth RHI Device"),
                required_features: settings.required_features,
                required_limits: settings.required_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        log::info!("wgpu backend on {:?}", adapter.get_info().name);
        Ok(Self::from_device(device, queue))
    }

    /// Wraps an existing device, e.g. one shared with a windowing layer.
    #[must_use]
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let default_sampler =
            device.create_sampler(&convert::sampler_descriptor(&SamplerInfo::default()));
        Self {
            device,
            queue,
            textures: SlotMap::with_key(),
            views: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            pipelines: PipelineStore::default(),
            default_sampler,
            default_target: None,
            state: DrawState::default(),
            bindings: FxHashMap::default(),
            pass: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The wgpu texture behind `texture`, for interop with other wgpu code.
    #[must_use]
    pub fn raw_texture(&self, texture: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(texture).map(|t| &t.texture)
    }

    #[must_use]
    pub fn raw_buffer(&self, buffer: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(buffer).map(|b| &b.buffer)
    }

    /// Number of render and compute pipelines built so far.
    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.pipeline_count()
    }

    /// Sets (or clears) the target of `begin_default_rendering`.
    pub fn set_default_target(&mut self, target: Option<DefaultTarget>) {
        self.flush();
        self.default_target = target;
    }

    /// Submits the default-target pass if one is open.
    pub fn flush(&mut self) {
        if let Some(pass) = self.pass.take_if(|p| p.framebuffer.is_none()) {
            self.submit_pass(pass);
        }
    }

    // ─── Helpers ─────────────────────────────────────────────────────────

    fn texture(&self, texture: TextureId) -> Result<&GpuTexture> {
        self.textures
            .get(texture)
            .ok_or(RhiError::InvalidHandle("texture"))
    }

    fn buffer(&self, buffer: BufferId) -> Result<&GpuBuffer> {
        self.buffers
            .get(buffer)
            .ok_or(RhiError::InvalidHandle("buffer"))
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Single-mip, single-layer view of `texture` usable as an attachment.
    fn attachment_view(
        texture: &GpuTexture,
        mip_level: u32,
        layer: u32,
    ) -> (wgpu::TextureView, Option<u32>) {
        if texture.shape.texture_type == TextureType::Texture3D {
            let view = texture.texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::D3),
                base_mip_level: mip_level,
                mip_level_count: Some(1),
                ..Default::default()
            });
            return (view, Some(layer));
        }
        let view = texture.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: mip_level,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        });
        (view, None)
    }

    fn resolve_attachment(&self, attachment: &FramebufferAttachment) -> Result<Attachment> {
        let (view, format, depth_slice) = match attachment.target {
            AttachmentTarget::Texture {
                texture,
                mip_level,
                layer,
            } => {
                let texture = self.texture(texture)?;
                let (view, depth_slice) =
                    Self::attachment_view(texture, mip_level, layer.unwrap_or(0));
                (view, texture.format, depth_slice)
            }
            AttachmentTarget::View(view) => {
                let view = self.views.get(view).ok_or(RhiError::InvalidHandle("view"))?;
                let format = self.texture(view.texture)?.format;
                (view.view.clone(), format, None)
            }
        };
        Ok(Attachment {
            view,
            format,
            depth_slice,
            clear: attachment.clear,
        })
    }

    fn sampler_for(&self, texture: &GpuTexture, sampler: Option<SamplerId>) -> Result<wgpu::Sampler> {
        match sampler {
            Some(id) => self
                .samplers
                .get(id)
                .cloned()
                .ok_or(RhiError::InvalidHandle("sampler")),
            None => Ok(texture
                .sampler
                .clone()
                .unwrap_or_else(|| self.default_sampler.clone())),
        }
    }

    /// Resolves every declared slot against the bound resources.
    fn create_bind_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        slots: &[u32],
    ) -> Result<wgpu::BindGroup> {
        let mut resources: SmallVec<[(u32, BoundResource); 8]> = SmallVec::new();

        for &slot in slots {
            let resource = match self.bindings.get(&slot) {
                Some(Binding::Texture { texture, .. }) => {
                    BoundResource::View(self.texture(*texture)?.view.clone())
                }
                Some(Binding::Image { texture, mip_level }) => {
                    let texture = self.texture(*texture)?;
                    let dimension = match texture.shape.texture_type {
                        TextureType::Texture2D => wgpu::TextureViewDimension::D2,
                        TextureType::Texture3D => wgpu::TextureViewDimension::D3,
                        _ => wgpu::TextureViewDimension::D2Array,
                    };
                    BoundResource::View(texture.texture.create_view(
                        &wgpu::TextureViewDescriptor {
                            dimension: Some(dimension),
                            base_mip_level: *mip_level,
                            mip_level_count: Some(1),
                            ..Default::default()
                        },
                    ))
                }
                Some(Binding::Buffer(buffer)) => {
                    BoundResource::Buffer(self.buffer(*buffer)?.buffer.clone())
                }
                None => match slot.checked_sub(1).and_then(|s| self.bindings.get(&s)) {
                    Some(Binding::Texture { texture, sampler }) => {
                        BoundResource::Sampler(self.sampler_for(self.texture(*texture)?, *sampler)?)
                    }
                    _ => {
                        return Err(RhiError::Unsupported(format!(
                            "binding {slot} is declared but nothing is bound"
                        )));
                    }
                },
            };
            resources.push((slot, resource));
        }

        let entries: Vec<wgpu::BindGroupEntry<'_>> = resources
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    BoundResource::View(view) => wgpu::BindingResource::TextureView(view),
                    BoundResource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                    BoundResource::Buffer(buffer) => buffer.as_entire_binding(),
                },
            })
            .collect();

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("RHI Bind Group"),
            layout,
            entries: &entries,
        }))
    }

    fn record_draw(
        &mut self,
        topology: PrimitiveTopology,
        index_type: Option<IndexType>,
        call: DrawCall,
    ) -> Result<()> {
        let Some(pass) = &self.pass else {
            return Err(RhiError::Unsupported(
                "draw outside a rendering scope".to_string(),
            ));
        };
        let state = &self.state;
        let vao = self
            .vertex_arrays
            .get(state.vertex_array)
            .ok_or(RhiError::InvalidHandle("vertex array"))?;

        let blend = |index: usize| {
            let blend = state.blend.get(index).copied().unwrap_or(state.blend[0]);
            if blend.enabled { blend } else { BlendState::default() }
        };
        let key = RenderPipelineKey {
            program: state.program,
            attributes: vao.attributes.clone(),
            stride: vao.vertex_buffer.map_or(0, |(_, stride)| stride),
            topology,
            strip_index: index_type.filter(|_| convert::is_strip(topology)),
            polygon_mode: state.polygon_mode,
            cull_mode: state.cull_mode,
            depth_bias: state
                .polygon_offset
                .map(|o| (o.factor.to_bits(), o.units.to_bits())),
            depth_clamp: state.depth_clamp,
            depth: pass.depth.as_ref().map(|d| DepthKey {
                format: d.format,
                test: state.depth_test,
                compare: state.depth_func,
                write: state.depth_write,
            }),
            color: pass
                .color
                .iter()
                .enumerate()
                .map(|(i, a)| (a.format, blend(i)))
                .collect(),
        };

        let vertex_buffer = match vao.vertex_buffer {
            Some((buffer, _)) if !vao.attributes.is_empty() => Some(self.buffer(buffer)?.buffer.clone()),
            _ => None,
        };
        let index_buffer = match (index_type, vao.index_buffer) {
            (Some(_), Some((buffer, ty))) => Some((
                self.buffer(buffer)?.buffer.clone(),
                convert::index_format(ty)?,
            )),
            (Some(_), None) => return Err(RhiError::InvalidHandle("index buffer")),
            (None, _) => None,
        };

        let program = self
            .programs
            .get(state.program)
            .ok_or(RhiError::InvalidHandle("program"))?;
        let pipeline = self.pipelines.render(&self.device, program, key)?;
        let slots = program.bindings.clone();
        let bind_group = if slots.is_empty() {
            None
        } else {
            Some(self.create_bind_group(&pipeline.get_bind_group_layout(0), &slots)?)
        };

        let draw = RecordedDraw {
            pipeline,
            bind_group,
            vertex_buffer,
            index_buffer,
            viewport: self.state.viewport,
            scissor: if self.state.scissor_test {
                self.state.scissor
            } else {
                pass.area
            },
            call,
        };
        if let Some(pass) = &mut self.pass {
            pass.draws.push(draw);
        }
        Ok(())
    }

    fn submit_pass(&self, pass: OpenPass) {
        let load_color = |clear: Option<ClearValue>| match clear {
            Some(ClearValue::Color(c)) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(c.x),
                g: f64::from(c.y),
                b: f64::from(c.z),
                a: f64::from(c.w),
            }),
            _ => wgpu::LoadOp::Load,
        };
        let color_attachments: SmallVec<[Option<wgpu::RenderPassColorAttachment<'_>>; 4]> = pass
            .color
            .iter()
            .map(|a| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &a.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: load_color(a.clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: a.depth_slice,
                })
            })
            .collect();
        let depth_stencil_attachment =
            pass.depth
                .as_ref()
                .map(|d| wgpu::RenderPassDepthStencilAttachment {
                    view: &d.view,
                    depth_ops: Some(wgpu::Operations {
                        load: match d.clear {
                            Some(ClearValue::Depth(depth)) => wgpu::LoadOp::Clear(depth),
                            _ => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let mut encoder = self.encoder("RHI Render Encoder");
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("RHI Render Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                ..Default::default()
            });

            for draw in &pass.draws {
                rpass.set_pipeline(&draw.pipeline);
                if let Some(bind_group) = &draw.bind_group {
                    rpass.set_bind_group(0, bind_group, &[]);
                }
                if let Some(buffer) = &draw.vertex_buffer {
                    rpass.set_vertex_buffer(0, buffer.slice(..));
                }

                let viewport = clamp_rect(draw.viewport, pass.area);
                rpass.set_viewport(
                    viewport.offset.x as f32,
                    viewport.offset.y as f32,
                    viewport.extent.width as f32,
                    viewport.extent.height as f32,
                    0.0,
                    1.0,
                );
                let scissor = clamp_rect(draw.scissor, pass.area);
                rpass.set_scissor_rect(
                    scissor.offset.x as u32,
                    scissor.offset.y as u32,
                    scissor.extent.width,
                    scissor.extent.height,
                );

                match draw.call {
                    DrawCall::Arrays {
                        first_vertex,
                        num_vertices,
                        num_instances,
                    } => rpass.draw(first_vertex..first_vertex + num_vertices, 0..num_instances),
                    DrawCall::Elements {
                        first_index,
                        num_indices,
                        base_vertex,
                        num_instances,
                    } => {
                        if let Some((buffer, format)) = &draw.index_buffer {
                            rpass.set_index_buffer(buffer.slice(..), *format);
                        }
                        rpass.draw_indexed(
                            first_index..first_index + num_indices,
                            base_vertex as i32,
                            0..num_instances,
                        );
                    }
                }
            }
        }
        self.submit(encoder);
        log::trace!("wgpu: submitted pass with {} draws", pass.draws.len());
    }

    /// Zero-fills a depth texture through one clearing pass per subresource.
    fn clear_depth_texture(&self, texture: &GpuTexture) {
        let layers = match texture.shape.texture_type {
            TextureType::Texture2D => 1,
            TextureType::Texture2DArray => texture.shape.num_layers.max(1),
            TextureType::CubeMap => 6,
            TextureType::CubeMapArray => 6 * texture.shape.num_layers.max(1),
            TextureType::Texture3D => return,
        };
        let mut encoder = self.encoder("RHI Clear Encoder");
        for mip_level in 0..texture.shape.num_mip_levels.max(1) {
            for layer in 0..layers {
                let (view, _) = Self::attachment_view(texture, mip_level, layer);
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("RHI Depth Clear"),
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(0.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    ..Default::default()
                });
            }
        }
        self.submit(encoder);
    }

    /// Uploads zeros to every mip of a color texture.
    fn zero_fill_texture(&self, texture: &GpuTexture) {
        let Some(texel_size) = texture.format.block_copy_size(None) else {
            return;
        };
        let size = texture.texture.size();
        for mip_level in 0..texture.texture.mip_level_count() {
            // Array layers are kept, 3D depth shrinks with the mip.
            let extent = size.mip_level_size(mip_level, texture.texture.dimension());
            let depth = extent.depth_or_array_layers;
            let bytes = extent.width as usize * extent.height as usize * depth as usize;
            let zeros = vec![0u8; bytes * texel_size as usize];
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture.texture,
                    mip_level,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &zeros,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(extent.width * texel_size),
                    rows_per_image: Some(extent.height),
                },
                wgpu::Extent3d {
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_layers: depth,
                },
            );
        }
    }
}

/// Intersects `rect` with `area`.
fn clamp_rect(rect: Rect2D, area: Rect2D) -> Rect2D {
    let x0 = rect.offset.x.max(area.offset.x).max(0);
    let y0 = rect.offset.y.max(area.offset.y).max(0);
    let right = |r: Rect2D| r.offset.x + r.extent.width as i32;
    let bottom = |r: Rect2D| r.offset.y + r.extent.height as i32;
    let x1 = right(rect).min(right(area)).max(x0);
    let y1 = bottom(rect).min(bottom(area)).max(y0);
    Rect2D {
        offset: super::types::Offset2D { x: x0, y: y0 },
        extent: super::types::Extent2D::new((x1 - x0) as u32, (y1 - y0) as u32),
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    // ─── Textures ────────────────────────────────────────────────────────

    fn create_texture(&mut self, shape: &TextureShape) -> Result<TextureId> {
        let format = convert::texture_format(shape.format)?;
        let (dimension, depth_or_array_layers) = match shape.texture_type {
            TextureType::Texture2D => (wgpu::TextureDimension::D2, 1),
            TextureType::Texture2DArray => (wgpu::TextureDimension::D2, shape.num_layers.max(1)),
            TextureType::Texture3D => (wgpu::TextureDimension::D3, shape.depth.max(1)),
            TextureType::CubeMap => (wgpu::TextureDimension::D2, 6),
            TextureType::CubeMapArray => {
                (wgpu::TextureDimension::D2, 6 * shape.num_layers.max(1))
            }
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("RHI Texture"),
            size: wgpu::Extent3d {
                width: shape.extent.width,
                height: shape.extent.height,
                depth_or_array_layers,
            },
            mip_level_count: shape.num_mip_levels.max(1),
            sample_count: 1,
            dimension,
            format,
            usage: convert::texture_usages(shape.format),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(convert::full_view_dimension(shape.texture_type)),
            ..Default::default()
        });

        Ok(self.textures.insert(GpuTexture {
            texture,
            view,
            shape: *shape,
            format,
            sampler: None,
        }))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        match self.textures.remove(texture) {
            Some(object) => object.texture.destroy(),
            None => log::error!("wgpu: destroy of unknown texture {texture:?}"),
        }
    }

    fn create_texture_view(&mut self, texture: TextureId, key: ViewKey) -> Result<ViewId> {
        let object = self.texture(texture)?;
        let layer = if object.shape.texture_type.is_cube() {
            key.layer * 6 + key.face
        } else {
            key.layer
        };
        let (view, _) = Self::attachment_view(object, key.mip_level, layer);
        Ok(self.views.insert(GpuView { texture, view }))
    }

    fn destroy_texture_view(&mut self, view: ViewId) {
        self.views.remove(view);
    }

    fn setup_sampler(&mut self, texture: TextureId, info: &SamplerInfo) {
        let sampler = self
            .device
            .create_sampler(&convert::sampler_descriptor(info));
        if let Some(object) = self.textures.get_mut(texture) {
            object.sampler = Some(sampler);
        }
    }

    fn upload_texture(&mut self, texture: TextureId, region: &TextureRegion, data: &[u8]) {
        let Ok(object) = self.texture(texture) else {
            log::error!("wgpu: upload to unknown texture {texture:?}");
            return;
        };
        let widened = convert::widen_rgb(object.shape.format, data);
        let data = widened.as_deref().unwrap_or(data);
        let Some(texel_size) = object.format.block_copy_size(None) else {
            log::error!("wgpu: {:?} cannot be uploaded to", object.format);
            return;
        };

        let (z, depth) = match object.shape.texture_type {
            TextureType::Texture3D => (0, region.depth.max(1)),
            TextureType::CubeMap | TextureType::CubeMapArray => {
                (region.layer * 6 + region.face, 1)
            }
            TextureType::Texture2DArray => (region.layer, 1),
            TextureType::Texture2D => (0, 1),
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &object.texture,
                mip_level: region.mip_level,
                origin: wgpu::Origin3d { x: 0, y: 0, z },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.width * texel_size),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: depth,
            },
        );
    }

    fn clear_texture(&mut self, texture: TextureId) {
        let Ok(object) = self.texture(texture) else {
            return;
        };
        if object.shape.format.is_depth() {
            self.clear_depth_texture(object);
            return;
        }
        if self.device.features().contains(wgpu::Features::CLEAR_TEXTURE) {
            let mut encoder = self.encoder("RHI Clear Encoder");
            encoder.clear_texture(&object.texture, &wgpu::ImageSubresourceRange::default());
            self.submit(encoder);
        } else {
            self.zero_fill_texture(object);
        }
    }

    fn create_sampler(&mut self, info: &SamplerInfo) -> Result<SamplerId> {
        let sampler = self
            .device
            .create_sampler(&convert::sampler_descriptor(info));
        Ok(self.samplers.insert(sampler))
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        self.samplers.remove(sampler);
    }

    // ─── Buffers ─────────────────────────────────────────────────────────

    fn create_buffer(&mut self, size: u64, data: Option<&[u8]>) -> Result<BufferId> {
        if size == 0 {
            return Err(RhiError::InvalidBufferDesc("zero size".to_string()));
        }
        let usage = wgpu::BufferUsages::VERTEX
            | wgpu::BufferUsages::INDEX
            | wgpu::BufferUsages::UNIFORM
            | wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        let padded = wgpu::util::align_to(size, wgpu::COPY_BUFFER_ALIGNMENT);

        let buffer = match data {
            Some(data) => {
                let mut contents = vec![0u8; padded as usize];
                let n = data.len().min(contents.len());
                contents[..n].copy_from_slice(&data[..n]);
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("RHI Immutable Buffer"),
                        contents: &contents,
                        usage,
                    })
            }
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("RHI Buffer"),
                size: padded,
                usage,
                mapped_at_creation: false,
            }),
        };

        Ok(self.buffers.insert(GpuBuffer {
            buffer,
            size: padded,
            immutable: data.is_some(),
        }))
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        match self.buffers.remove(buffer) {
            Some(object) => object.buffer.destroy(),
            None => log::error!("wgpu: destroy of unknown buffer {buffer:?}"),
        }
    }

    fn upload_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        let Ok(object) = self.buffer(buffer) else {
            log::error!("wgpu: upload to unknown buffer {buffer:?}");
            return;
        };
        if object.immutable {
            log::error!("wgpu: upload to immutable buffer {buffer:?}");
            return;
        }
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            log::error!("wgpu: unaligned buffer upload offset {offset}");
            return;
        }
        // Copies must be a multiple of four bytes; the tail is zero padded.
        let len = wgpu::util::align_to(data.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT);
        if offset + len > object.size {
            log::error!("wgpu: upload out of range ({} > {})", offset + len, object.size);
            return;
        }
        if len == data.len() as u64 {
            self.queue.write_buffer(&object.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(len as usize, 0);
            self.queue.write_buffer(&object.buffer, offset, &padded);
        }
    }

    fn clear_buffer(&mut self, buffer: BufferId) {
        let Ok(object) = self.buffer(buffer) else {
            return;
        };
        if object.immutable {
            return;
        }
        let mut encoder = self.encoder("RHI Clear Encoder");
        encoder.clear_buffer(&object.buffer, 0, None);
        self.submit(encoder);
    }

    // ─── Programs & Layouts ──────────────────────────────────────────────

    fn create_program(&mut self, stages: &[(ShaderStage, &str)]) -> Result<ProgramId> {
        let program = Program::compile(&self.device, stages)?;
        Ok(self.programs.insert(program))
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.pipelines.forget_program(program);
        self.programs.remove(program);
    }

    fn create_vertex_array(&mut self, attributes: &VertexAttributes) -> Result<VertexArrayId> {
        Ok(self.vertex_arrays.insert(GpuVertexArray {
            attributes: attributes.clone(),
            ..Default::default()
        }))
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.vertex_arrays.remove(vertex_array);
    }

    // ─── Fixed-function State ────────────────────────────────────────────

    fn set_program(&mut self, program: ProgramId) {
        self.state.program = program;
    }

    fn set_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.state.vertex_array = vertex_array;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
    }

    fn set_depth_func(&mut self, op: CompareOp) {
        self.state.depth_func = op;
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.state.depth_write = enabled;
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.state.polygon_mode = mode;
    }

    fn set_polygon_offset(&mut self, _mode: PolygonMode, offset: Option<PolygonOffset>) {
        self.state.polygon_offset = offset;
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        self.state.cull_mode = mode;
    }

    fn set_depth_clamp(&mut self, enabled: bool) {
        self.state.depth_clamp = enabled;
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        self.state.scissor_test = enabled;
    }

    fn set_blend_enabled(&mut self, index: u32, enabled: bool) {
        self.state.blend[index as usize].enabled = enabled;
    }

    fn set_blend_equation(&mut self, index: u32, color: BlendOp, alpha: BlendOp) {
        let blend = &mut self.state.blend[index as usize];
        blend.color_op = color;
        blend.alpha_op = alpha;
    }

    fn set_blend_func(
        &mut self,
        index: u32,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        let blend = &mut self.state.blend[index as usize];
        blend.src_color = src_color;
        blend.dst_color = dst_color;
        blend.src_alpha = src_alpha;
        blend.dst_alpha = dst_alpha;
    }

    fn set_viewport(&mut self, rect: Rect2D) {
        self.state.viewport = rect;
    }

    fn set_scissor(&mut self, rect: Rect2D) {
        self.state.scissor = rect;
    }

    // ─── Resource Bindings ───────────────────────────────────────────────

    fn bind_texture(&mut self, unit: u32, texture: TextureId, sampler: Option<SamplerId>) {
        self.bindings
            .insert(unit, Binding::Texture { texture, sampler });
    }

    fn bind_image(&mut self, unit: u32, texture: TextureId, mip_level: u32, _access: ImageAccess) {
        self.bindings
            .insert(unit, Binding::Image { texture, mip_level });
    }

    fn bind_uniform_buffer(&mut self, index: u32, buffer: BufferId) {
        self.bindings.insert(index, Binding::Buffer(buffer));
    }

    fn bind_storage_buffer(&mut self, index: u32, buffer: BufferId) {
        self.bindings.insert(index, Binding::Buffer(buffer));
    }

    fn set_vertex_buffer(&mut self, vertex_array: VertexArrayId, buffer: BufferId, stride: u32) {
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
        if let Some(vao) = self.vertex_arrays.get_mut(vertex_array) {
            vao.index_buffer = Some((buffer, index_type));
        }
    }

    fn memory_barrier(&mut self, barriers: BarrierBits) {
        // wgpu tracks hazards between submissions itself.
        log::trace!("wgpu: barrier {barriers:?} ignored");
    }

    // ─── Passes & Commands ───────────────────────────────────────────────

    fn begin_rendering(&mut self, desc: &FramebufferDesc) -> Result<FramebufferId> {
        self.flush();
        debug_assert!(self.pass.is_none(), "nested rendering scope");

        let mut color = SmallVec::new();
        for attachment in &desc.color {
            color.push(self.resolve_attachment(attachment)?);
        }
        let depth = match &desc.depth {
            Some(attachment) => Some(self.resolve_attachment(attachment)?),
            None => None,
        };

        let framebuffer = self.framebuffers.insert(desc.clone());
        self.pass = Some(OpenPass {
            framebuffer: Some(framebuffer),
            area: desc.area,
            color,
            depth,
            draws: Vec::new(),
        });
        Ok(framebuffer)
    }

    fn begin_default_rendering(&mut self, area: Rect2D, clear: &DefaultClear) -> Result<()> {
        self.flush();
        let Some(target) = &self.default_target else {
            return Err(RhiError::Unsupported(
                "no default target set on the wgpu backend".to_string(),
            ));
        };
        if clear.stencil.is_some() {
            log::trace!("wgpu: default target has no stencil, clear ignored");
        }

        let color = Attachment {
            view: target.color.clone(),
            format: target.color_format,
            depth_slice: None,
            clear: clear.color.map(ClearValue::Color),
        };
        let depth = target.depth.as_ref().map(|(view, format)| Attachment {
            view: view.clone(),
            format: *format,
            depth_slice: None,
            clear: clear.depth.map(ClearValue::Depth),
        });

        self.pass = Some(OpenPass {
            framebuffer: None,
            area,
            color: std::iter::once(color).collect(),
            depth,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn end_rendering(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(framebuffer);
        match self.pass.take() {
            Some(pass) if pass.framebuffer == Some(framebuffer) => self.submit_pass(pass),
            other => {
                log::error!("wgpu: end_rendering({framebuffer:?}) without a matching scope");
                self.pass = other;
            }
        }
    }

    fn draw_arrays(
        &mut self,
        topology: PrimitiveTopology,
        first_vertex: u32,
        num_vertices: u32,
        num_instances: u32,
    ) {
        let call = DrawCall::Arrays {
            first_vertex,
            num_vertices,
            num_instances,
        };
        if let Err(err) = self.record_draw(topology, None, call) {
            log::error!("wgpu: draw skipped: {err}");
        }
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
        let call = DrawCall::Elements {
            first_index,
            num_indices,
            base_vertex,
            num_instances,
        };
        if let Err(err) = self.record_draw(topology, Some(index_type), call) {
            log::error!("wgpu: indexed draw skipped: {err}");
        }
    }

    fn dispatch(&mut self, groups: GroupCounts) {
        self.flush();
        if self.pass.is_some() {
            log::error!("wgpu: dispatch inside a rendering scope skipped");
            return;
        }

        let Some(program) = self.programs.get(self.state.program) else {
            log::error!("wgpu: dispatch without a program");
            return;
        };
        debug_assert!(program.is_compute(), "dispatch without a compute program");
        let pipeline = match self
            .pipelines
            .compute(&self.device, self.state.program, program)
        {
            Ok(pipeline) => pipeline,
            Err(err) => {
                log::error!("wgpu: dispatch skipped: {err}");
                return;
            }
        };
        let slots = program.bindings.clone();
        let bind_group = if slots.is_empty() {
            None
        } else {
            match self.create_bind_group(&pipeline.get_bind_group_layout(0), &slots) {
                Ok(bind_group) => Some(bind_group),
                Err(err) => {
                    log::error!("wgpu: dispatch skipped: {err}");
                    return;
                }
            }
        };

        let mut encoder = self.encoder("RHI Compute Encoder");
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("RHI Compute Pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&pipeline);
            if let Some(bind_group) = &bind_group {
                cpass.set_bind_group(0, bind_group, &[]);
            }
            cpass.dispatch_workgroups(groups.x, groups.y, groups.z);
        }
        self.submit(encoder);
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        self.flush();
        if !self.textures.is_empty() || !self.buffers.is_empty() {
            log::warn!(
                "WgpuBackend dropped with {} textures and {} buffers alive",
                self.textures.len(),
                self.buffers.len()
            );
        }
    }
}
