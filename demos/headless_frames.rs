//! Headless Frames
//!
//! Runs a small deferred-style frame graph on the headless backend for a few
//! hundred frames and reports how the transient pool behaved. The window is
//! resized halfway through, so the old render targets go idle and get
//! evicted one second later.
//!
//! ```text
//! RUST_LOG=info cargo run --example headless_frames
//! RUST_LOG=info cargo run --example headless_frames -- --dot > frame.dot
//! ```

use myth_rhi::prelude::*;
use myth_rhi::rhi::{BlendState, ClearValue, DeviceCall, ProgramId};

const FULL_SCREEN_VS: &str = r"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}
";

const COLOR_FS: &str = r"
@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    let size = vec2<f32>(textureDimensions(source));
    return textureSample(source, source_sampler, pos.xy / size);
}
";

const CULL_CS: &str = r"
@group(0) @binding(0) var<storage, read_write> visible: array<u32>;

@compute @workgroup_size(64)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    visible[id.x] = id.x;
}
";

const FRAMES: u32 = 240;
const DT: f32 = 1.0 / 60.0;

struct Pipelines {
    opaque: GraphicsPipeline,
    composite: GraphicsPipeline,
    cull: ProgramId,
}

impl Pipelines {
    fn new<B: GraphicsBackend>(rc: &mut RenderContext<B>) -> myth_rhi::Result<Self> {
        let opaque = GraphicsPipeline::builder()
            .shader_program(rc.create_graphics_program(FULL_SCREEN_VS, COLOR_FS)?)
            .depth_stencil(myth_rhi::rhi::DepthStencilState {
                depth_test: true,
                depth_write: true,
                depth_compare_op: myth_rhi::rhi::CompareOp::LessOrEqual,
            })
            .build();
        let composite = GraphicsPipeline::builder()
            .shader_program(rc.create_graphics_program(FULL_SCREEN_VS, COLOR_FS)?)
            .blend_state(0, BlendState::ADDITIVE)
            .build();
        let cull = rc.create_compute_program(CULL_CS)?;
        Ok(Self {
            opaque,
            composite,
            cull,
        })
    }

    fn destroy<B: GraphicsBackend>(mut self, rc: &mut RenderContext<B>) {
        rc.destroy_pipeline(&mut self.opaque);
        rc.destroy_pipeline(&mut self.composite);
        rc.destroy_program(&mut self.cull);
    }
}

fn build_frame<'a>(
    fg: &mut FrameGraph<'a, HeadlessBackend>,
    pipelines: &'a Pipelines,
    backbuffer: &'a Texture,
    extent: Extent2D,
) {
    let target = import_texture(fg, "Backbuffer", backbuffer);
    let area = Rect2D::from_extent(extent);

    let visible = fg.add_callback_pass(
        "Culling",
        |builder| {
            let visible =
                builder.create::<FrameGraphBuffer>("VisibleList", BufferDesc { size: 4096 });
            builder.write(visible)
        },
        move |&visible, resources, rc| {
            rc.bind_storage_buffer(0, get_buffer(resources, visible)?);
            rc.dispatch(pipelines.cull, glam::UVec3::new(16, 1, 1));
            Ok(())
        },
    );

    let scene = fg.add_callback_pass(
        "Opaque",
        |builder| {
            builder.read(visible);
            let color = builder.create::<FrameGraphTexture>(
                "SceneColor",
                TextureDesc::new_2d(extent.width, extent.height, PixelFormat::Rgba16F),
            );
            let depth = builder.create::<FrameGraphTexture>(
                "SceneDepth",
                TextureDesc::new_2d(extent.width, extent.height, PixelFormat::Depth24),
            );
            (builder.write(color), builder.write(depth))
        },
        move |&(color, depth), resources, rc| {
            let fb = rc.begin_rendering(&RenderingInfo {
                area,
                color_attachments: [AttachmentInfo::new(get_texture(resources, color)?)
                    .clear(ClearValue::Color(glam::Vec4::ZERO))]
                .into_iter()
                .collect(),
                depth_attachment: Some(
                    AttachmentInfo::new(get_texture(resources, depth)?)
                        .clear(ClearValue::Depth(1.0)),
                ),
            })?;
            rc.bind_pipeline(&pipelines.opaque);
            rc.draw_full_screen_triangle();
            rc.end_rendering(fb);
            Ok(())
        },
    );

    // Half-resolution glow, also used as the composite source.
    let glow = fg.add_callback_pass(
        "Glow",
        |builder| {
            let scene = builder.read(scene.0);
            let glow = builder.create::<FrameGraphTexture>(
                "Glow",
                TextureDesc::new_2d(
                    (extent.width / 2).max(1),
                    (extent.height / 2).max(1),
                    PixelFormat::Rgba16F,
                ),
            );
            (scene, builder.write(glow))
        },
        move |&(scene, glow), resources, rc| {
            let glow_texture = get_texture(resources, glow)?;
            let fb = rc.begin_rendering(&RenderingInfo {
                area: Rect2D::from_extent(glow_texture.extent()),
                color_attachments: [AttachmentInfo::new(glow_texture)].into_iter().collect(),
                depth_attachment: None,
            })?;
            rc.bind_pipeline(&pipelines.composite);
            rc.bind_texture(0, get_texture(resources, scene)?, None);
            rc.draw_full_screen_triangle();
            rc.end_rendering(fb);
            Ok(())
        },
    );

    fg.add_callback_pass(
        "Composite",
        |builder| {
            builder.read(glow.1);
            builder.write(target)
        },
        move |&target, resources, rc| {
            let fb = rc.begin_rendering(&RenderingInfo {
                area,
                color_attachments: [AttachmentInfo::new(get_texture(resources, target)?)]
                    .into_iter()
                    .collect(),
                depth_attachment: None,
            })?;
            rc.bind_pipeline(&pipelines.composite);
            rc.bind_texture(0, get_texture(resources, glow.1)?, None);
            rc.draw_full_screen_triangle();
            rc.end_rendering(fb);
            Ok(())
        },
    );
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let dump_dot = std::env::args().any(|arg| arg == "--dot");

    let mut core = RenderCore::new(HeadlessBackend::new(), PoolSettings::default())?;
    let pipelines = Pipelines::new(core.context_mut())?;

    let mut extent = Extent2D::new(1280, 720);
    let mut backbuffer = core
        .context_mut()
        .create_texture_2d(extent, PixelFormat::Rgba8Unorm, 1, 0)?;

    for frame in 0..FRAMES {
        if frame == FRAMES / 2 {
            extent = Extent2D::new(1920, 1080);
            let (rc, _) = core.split_mut();
            rc.destroy_texture(&mut backbuffer);
            backbuffer = rc.create_texture_2d(extent, PixelFormat::Rgba8Unorm, 1, 0)?;
            log::info!("Resized to {}x{}", extent.width, extent.height);
        }

        let mut fg = FrameGraph::new();
        build_frame(&mut fg, &pipelines, &backbuffer, extent);

        if dump_dot && frame == 0 {
            fg.compile();
            let mut dot = String::new();
            fg.write_graphviz(&mut dot)?;
            println!("{dot}");
        }

        core.execute(fg)?;
        core.end_frame(DT);

        if frame % 60 == 0 {
            let pool = core.transient_resources();
            log::info!(
                "frame {frame}: {} idle textures, {} idle buffers, {} live device textures",
                pool.idle_texture_count(),
                pool.idle_buffer_count(),
                core.context().backend().live_textures(),
            );
        }
    }

    let stats = core.transient_resources().stats();
    let backend = core.context().backend();
    log::info!(
        "{FRAMES} frames: {} textures created, {} reused, {} evicted; {} draws, {} state calls",
        stats.textures_created,
        stats.textures_reused,
        stats.textures_evicted,
        backend.calls(DeviceCall::DrawArrays),
        backend.state_calls(),
    );

    let rc = core.context_mut();
    rc.destroy_texture(&mut backbuffer);
    pipelines.destroy(rc);
    Ok(())
}
