//! Render Context Tests
//!
//! Tests for:
//! - State elision: re-binding an identical pipeline issues no device calls
//! - Conditional sub-state: depth func only while testing, blend equation /
//!   factors only while blending
//! - Vertex arrays: null maps to the dummy VAO, attribute sets are shared
//! - Rendering scopes: depth-write forcing, scissor reset, cube face views
//! - Draw dispatch: indexed vs. non-indexed, compute dispatch

use myth_rhi::rhi::{
    AttachmentInfo, BasePipelineFactory, AttributeLocation, BlendState, ClearValue, Command, CompareOp,
    DepthStencilState, DeviceCall, Extent2D, GeometryInfo, GraphicsPipeline, HeadlessBackend,
    IndexType, PipelineCache, PixelFormat, PolygonMode, PolygonOffset, PrimitiveTopology, RasterizerState,
    Rect2D, RenderContext, RenderingInfo, VertexAttribute, VertexAttributeType, VertexFormat,
    build_defines,
};

const VERTEX: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(); }";
const FRAGMENT: &str = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
const COMPUTE: &str = "@compute @workgroup_size(8, 8) fn cs_main() {}";

fn context() -> RenderContext<HeadlessBackend> {
    let mut rc = RenderContext::new(HeadlessBackend::new()).unwrap();
    rc.backend_mut().reset_counters();
    rc
}

fn pipeline(rc: &mut RenderContext<HeadlessBackend>) -> GraphicsPipeline {
    let program = rc.create_graphics_program(VERTEX, FRAGMENT).unwrap();
    GraphicsPipeline::builder()
        .shader_program(program)
        .depth_stencil(DepthStencilState {
            depth_test: true,
            depth_write: true,
            depth_compare_op: CompareOp::LessOrEqual,
        })
        .blend_state(0, BlendState::ALPHA)
        .build()
}

fn calls(rc: &RenderContext<HeadlessBackend>, kind: DeviceCall) -> u64 {
    rc.backend().calls(kind)
}

// ============================================================================
// State elision
// ============================================================================

#[test]
fn new_context_primes_every_state_once() {
    let rc = RenderContext::new(HeadlessBackend::new()).unwrap();
    let backend = rc.backend();
    assert_eq!(backend.calls(DeviceCall::SetDepthTest), 1);
    assert_eq!(backend.calls(DeviceCall::SetDepthFunc), 1);
    assert_eq!(backend.calls(DeviceCall::SetCullMode), 1);
    assert_eq!(backend.calls(DeviceCall::SetBlendEnabled), 2);
    assert_eq!(backend.calls(DeviceCall::CreateVertexArray), 1);
    assert_eq!(backend.device_state().depth_func, Some(CompareOp::Less));
    assert_eq!(backend.device_state().vertex_array, rc.snapshot().vertex_array);
}

#[test]
fn rebinding_the_same_pipeline_is_free() {
    let mut rc = context();
    let pipeline = pipeline(&mut rc);

    rc.bind_pipeline(&pipeline);
    let after_first = rc.backend().state_calls();
    assert!(after_first > 0);

    rc.bind_pipeline(&pipeline);
    rc.bind_pipeline(&pipeline);
    assert_eq!(rc.backend().state_calls(), after_first);
}

#[test]
fn only_changed_substates_are_forwarded() {
    let mut rc = context();
    let a = pipeline(&mut rc);
    let b = GraphicsPipeline::builder()
        .shader_program(a.program())
        .depth_stencil(*a.depth_stencil())
        .blend_state(0, BlendState::ALPHA)
        .rasterizer_state(RasterizerState {
            cull_mode: myth_rhi::rhi::CullMode::None,
            ..Default::default()
        })
        .build();

    rc.bind_pipeline(&a);
    rc.backend_mut().reset_counters();
    rc.bind_pipeline(&b);

    assert_eq!(calls(&rc, DeviceCall::SetCullMode), 1);
    assert_eq!(rc.backend().state_calls(), 1);
}

#[test]
fn depth_func_is_only_sent_while_testing() {
    let mut rc = context();
    let program = rc.create_graphics_program(VERTEX, FRAGMENT).unwrap();
    let untested = GraphicsPipeline::builder()
        .shader_program(program)
        .depth_stencil(DepthStencilState {
            depth_test: false,
            depth_write: true,
            depth_compare_op: CompareOp::Greater,
        })
        .build();

    rc.bind_pipeline(&untested);
    assert_eq!(calls(&rc, DeviceCall::SetDepthFunc), 0);

    let tested = GraphicsPipeline::builder()
        .shader_program(program)
        .depth_stencil(DepthStencilState {
            depth_test: true,
            depth_write: true,
            depth_compare_op: CompareOp::Greater,
        })
        .build();
    rc.bind_pipeline(&tested);
    assert_eq!(calls(&rc, DeviceCall::SetDepthTest), 1);
    assert_eq!(calls(&rc, DeviceCall::SetDepthFunc), 1);
    assert_eq!(rc.backend().device_state().depth_func, Some(CompareOp::Greater));
}

#[test]
fn blend_equation_and_factors_wait_for_blending() {
    let mut rc = context();
    let program = rc.create_graphics_program(VERTEX, FRAGMENT).unwrap();
    let disabled = GraphicsPipeline::builder()
        .shader_program(program)
        .blend_state(
            0,
            BlendState {
                enabled: false,
                ..BlendState::ADDITIVE
            },
        )
        .build();

    rc.bind_pipeline(&disabled);
    assert_eq!(calls(&rc, DeviceCall::SetBlendEquation), 0);
    assert_eq!(calls(&rc, DeviceCall::SetBlendFunc), 0);

    let enabled = GraphicsPipeline::builder()
        .shader_program(program)
        .blend_state(0, BlendState::ADDITIVE)
        .build();
    rc.bind_pipeline(&enabled);
    assert_eq!(calls(&rc, DeviceCall::SetBlendEnabled), 1);
    assert_eq!(calls(&rc, DeviceCall::SetBlendFunc), 1);
    assert!(rc.backend().device_state().blend[0].enabled);
}

#[test]
fn polygon_offset_follows_the_current_mode() {
    let mut rc = context();
    let program = rc.create_graphics_program(VERTEX, FRAGMENT).unwrap();
    let offset = PolygonOffset {
        factor: 1.0,
        units: 2.0,
    };
    let pipeline = GraphicsPipeline::builder()
        .shader_program(program)
        .rasterizer_state(RasterizerState {
            polygon_mode: PolygonMode::Line,
            polygon_offset: Some(offset),
            ..Default::default()
        })
        .build();

    rc.bind_pipeline(&pipeline);
    let state = rc.backend().device_state();
    assert_eq!(state.polygon_mode, PolygonMode::Line);
    assert_eq!(state.polygon_offset, Some(offset));
    assert_eq!(rc.snapshot().rasterizer.polygon_offset, Some(offset));
}

// ============================================================================
// Vertex arrays
// ============================================================================

#[test]
fn pipeline_without_vertex_array_uses_the_dummy() {
    let mut rc = context();
    let dummy = rc.backend().device_state().vertex_array;
    let pipeline = pipeline(&mut rc);

    rc.bind_pipeline(&pipeline);
    assert_eq!(calls(&rc, DeviceCall::SetVertexArray), 0);
    assert_eq!(rc.snapshot().vertex_array, dummy);
}

#[test]
fn equal_attribute_sets_share_one_vertex_array() {
    let mut rc = context();
    let format = VertexFormat::builder()
        .attribute(
            AttributeLocation::Position,
            VertexAttribute {
                ty: VertexAttributeType::Float3,
                offset: 0,
            },
        )
        .build(rc.vertex_formats());
    let attributes = format.attributes().clone();

    let a = rc.get_vertex_array(&attributes).unwrap();
    let b = rc.get_vertex_array(&attributes).unwrap();
    assert_eq!(a, b);
    assert_eq!(calls(&rc, DeviceCall::CreateVertexArray), 1);
}

struct OpaqueFactory {
    built: u32,
}

impl BasePipelineFactory<HeadlessBackend> for OpaqueFactory {
    type Material = str;

    fn create_base_pipeline(
        &mut self,
        rc: &mut RenderContext<HeadlessBackend>,
        format: &VertexFormat,
        _material: Option<&str>,
    ) -> myth_rhi::Result<GraphicsPipeline> {
        self.built += 1;
        let program = rc.create_graphics_program(VERTEX, FRAGMENT)?;
        let vertex_array = rc.get_vertex_array(format.attributes())?;
        Ok(GraphicsPipeline::builder()
            .shader_program(program)
            .vertex_array(vertex_array)
            .build())
    }
}

#[test]
fn pipeline_cache_builds_once_per_format_and_material() {
    let mut rc = context();
    let format = VertexFormat::builder()
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
        .build(rc.vertex_formats());
    assert_eq!(build_defines(&format), vec!["HAS_NORMAL"]);

    let mut cache = PipelineCache::new();
    let mut factory = OpaqueFactory { built: 0 };

    for _ in 0..3 {
        let pipeline = cache
            .get_or_create(&mut rc, &mut factory, &format, Some("lambert"))
            .unwrap();
        assert!(pipeline.is_valid());
    }
    cache
        .get_or_create(&mut rc, &mut factory, &format, Some("phong"))
        .unwrap();

    assert_eq!(factory.built, 2);
    assert_eq!(cache.len(), 2);
    // Both pipelines share the format's vertex array.
    assert_eq!(calls(&rc, DeviceCall::CreateVertexArray), 1);

    cache.clear(&mut rc);
    assert!(cache.is_empty());
    assert_eq!(calls(&rc, DeviceCall::DestroyProgram), 2);
}

// ============================================================================
// Rendering scopes
// ============================================================================

#[test]
fn depth_clear_forces_depth_write_and_disables_scissor() {
    let mut rc = context();
    let program = rc.create_graphics_program(VERTEX, FRAGMENT).unwrap();
    let no_write = GraphicsPipeline::builder()
        .shader_program(program)
        .depth_stencil(DepthStencilState {
            depth_test: true,
            depth_write: false,
            depth_compare_op: CompareOp::Less,
        })
        .rasterizer_state(RasterizerState {
            scissor_test: true,
            ..Default::default()
        })
        .build();
    rc.bind_pipeline(&no_write);
    assert!(!rc.backend().device_state().depth_write);
    assert!(rc.backend().device_state().scissor_test);

    let mut color = rc
        .create_texture_2d(Extent2D::new(64, 64), PixelFormat::Rgba8Unorm, 1, 0)
        .unwrap();
    let mut depth = rc
        .create_texture_2d(Extent2D::new(64, 64), PixelFormat::Depth24, 1, 0)
        .unwrap();

    let area = Rect2D::from_extent(Extent2D::new(64, 64));
    let framebuffer = rc
        .begin_rendering(&RenderingInfo {
            area,
            color_attachments: [AttachmentInfo::new(&color)].into_iter().collect(),
            depth_attachment: Some(AttachmentInfo::new(&depth).clear(ClearValue::Depth(1.0))),
        })
        .unwrap();

    let state = rc.backend().device_state();
    assert!(state.depth_write);
    assert!(!state.scissor_test);
    assert_eq!(state.viewport, area);
    assert!(rc.is_rendering());
    assert_eq!(rc.backend().framebuffer(framebuffer).map(|f| f.color.len()), Some(1));

    rc.end_rendering(framebuffer);
    assert!(!rc.is_rendering());
    assert_eq!(rc.backend().live_framebuffers(), 0);

    rc.destroy_texture(&mut color);
    rc.destroy_texture(&mut depth);
}

#[test]
fn cube_faces_are_attached_through_cached_views() {
    let mut rc = context();
    let mut cube = rc.create_cubemap(32, PixelFormat::Rgba16F, 1, 0).unwrap();
    let area = Rect2D::from_extent(Extent2D::new(32, 32));

    for _ in 0..2 {
        for face in 0..6 {
            let info = RenderingInfo {
                area,
                color_attachments: [AttachmentInfo {
                    face: Some(face),
                    ..AttachmentInfo::new(&cube)
                }]
                .into_iter()
                .collect(),
                depth_attachment: None,
            };
            let framebuffer = rc.begin_rendering(&info).unwrap();
            rc.end_rendering(framebuffer);
        }
    }

    assert_eq!(calls(&rc, DeviceCall::CreateTextureView), 6);
    assert_eq!(rc.cached_view_count(&cube), 6);
    assert_eq!(rc.backend().live_views(), 6);

    rc.destroy_texture(&mut cube);
    assert_eq!(rc.backend().live_views(), 0);
    assert!(!cube.is_valid());
}

// ============================================================================
// Draws
// ============================================================================

#[test]
fn draws_are_indexed_only_with_indices_and_a_buffer() {
    let mut rc = context();
    let pipeline = pipeline(&mut rc);
    rc.bind_pipeline(&pipeline);

    let mut vertices = rc.create_vertex_buffer(12, 3, None).unwrap();
    let mut indices = rc
        .create_index_buffer(IndexType::U16, 3, Some(&[0u8, 0, 1, 0, 2, 0][..]))
        .unwrap();

    let geometry = GeometryInfo {
        topology: PrimitiveTopology::TriangleList,
        num_vertices: 3,
        num_indices: 3,
        ..Default::default()
    };
    rc.draw(Some(&vertices), Some(&indices), &geometry, 1);
    rc.draw(Some(&vertices), None, &GeometryInfo { num_indices: 0, ..geometry }, 2);

    assert_eq!(
        rc.backend().commands(),
        &[
            Command::DrawIndexed {
                topology: PrimitiveTopology::TriangleList,
                index_type: IndexType::U16,
                first_index: 0,
                num_indices: 3,
                base_vertex: 0,
                num_instances: 1,
            },
            Command::Draw {
                topology: PrimitiveTopology::TriangleList,
                first_vertex: 0,
                num_vertices: 3,
                num_instances: 2,
            },
        ]
    );
    // The vertex buffer is bound once.
    assert_eq!(calls(&rc, DeviceCall::SetVertexBuffer), 1);

    rc.destroy_buffer(vertices.buffer_mut());
    rc.destroy_buffer(indices.buffer_mut());
    assert_eq!(rc.backend().live_buffers(), 0);
}

#[test]
fn full_screen_triangle_draws_three_vertices() {
    let mut rc = context();
    let pipeline = pipeline(&mut rc);
    rc.bind_pipeline(&pipeline);

    rc.draw_full_screen_triangle();
    rc.draw_cube();
    assert_eq!(
        rc.backend().commands(),
        &[
            Command::Draw {
                topology: PrimitiveTopology::TriangleList,
                first_vertex: 0,
                num_vertices: 3,
                num_instances: 1,
            },
            Command::Draw {
                topology: PrimitiveTopology::TriangleList,
                first_vertex: 0,
                num_vertices: 36,
                num_instances: 1,
            },
        ]
    );
}

#[test]
fn dispatch_binds_the_compute_program_once() {
    let mut rc = context();
    let program = rc.create_compute_program(COMPUTE).unwrap();

    rc.dispatch(program, glam::UVec3::new(8, 8, 1));
    rc.dispatch(program, glam::UVec3::new(4, 4, 1));

    assert_eq!(calls(&rc, DeviceCall::SetProgram), 1);
    assert_eq!(calls(&rc, DeviceCall::Dispatch), 2);
    assert_eq!(
        rc.backend().commands().last(),
        Some(&Command::Dispatch(glam::UVec3::new(4, 4, 1)))
    );
}

#[test]
fn shader_errors_carry_the_stage() {
    let mut rc = context();
    let err = rc.create_graphics_program("fn main() {}", FRAGMENT).unwrap_err();
    assert!(err.to_string().contains("vertex"), "{err}");

    let err = rc.create_compute_program(VERTEX).unwrap_err();
    assert!(err.to_string().contains("compute"), "{err}");
}
