//! Frame Graph Tests
//!
//! Tests for:
//! - Pool-backed execution: acquisition at first use, release after last use
//! - Reuse of released textures by later passes in the same frame
//! - Reuse across frames and eviction through `RenderCore::end_frame`
//! - Imports bypass the pool
//! - Culled passes neither run nor allocate
//! - Error path returns every held resource to the pool
//! - Full mip chains pooled through `RenderCore::execute`
//! - `RenderCore::end_frame` purges dead vertex formats

use std::cell::RefCell;

use myth_rhi::errors::RhiError;
use myth_rhi::graph::{
    FrameGraph, FrameGraphBuffer, FrameGraphTexture, get_buffer, get_texture, import_texture,
};
use myth_rhi::rhi::{
    AttributeLocation, DeviceCall, HeadlessBackend, PixelFormat, RenderContext, TextureId,
    VertexAttribute, VertexAttributeType, VertexFormat,
};
use myth_rhi::settings::PoolSettings;
use myth_rhi::transient::{BufferDesc, TextureDesc, TransientResources};
use myth_rhi::RenderCore;

type Graph<'a> = FrameGraph<'a, HeadlessBackend>;

fn setup() -> (RenderContext<HeadlessBackend>, TransientResources) {
    let rc = RenderContext::new(HeadlessBackend::new()).unwrap();
    (rc, TransientResources::new(PoolSettings::default()))
}

fn color_desc() -> TextureDesc {
    TextureDesc::new_2d(320, 180, PixelFormat::Rgba16F)
}

// ============================================================================
// Execution
// ============================================================================

#[test]
fn created_texture_matches_its_descriptor() {
    let (mut rc, mut pool) = setup();
    let seen = RefCell::new(None);

    let mut fg = Graph::new();
    fg.add_callback_pass(
        "Lighting",
        |builder| {
            let color = builder.create::<FrameGraphTexture>("SceneColor", color_desc());
            builder.set_side_effect();
            builder.write(color)
        },
        |&color, resources, _| {
            let texture = get_texture(resources, color)?;
            assert_eq!(resources.pass_name(), "Lighting");
            assert_eq!(resources.descriptor(color)?, &color_desc());
            assert!(color_desc().matches(texture));
            *seen.borrow_mut() = Some(texture.id());
            Ok(())
        },
    );
    fg.execute(&mut rc, &mut pool).unwrap();

    let id = seen.borrow().expect("pass did not run");
    assert!(pool.is_idle_texture(id));
    assert_eq!(pool.stats().textures_created, 1);

    pool.clear(&mut rc);
    assert!(!rc.backend().is_texture_alive(id));
}

#[test]
fn buffers_are_pooled_like_textures() {
    let (mut rc, mut pool) = setup();
    let mut fg = Graph::new();
    fg.add_callback_pass(
        "Cull",
        |builder| {
            let visible = builder.create::<FrameGraphBuffer>("Visible", BufferDesc { size: 256 });
            builder.set_side_effect();
            builder.write(visible)
        },
        |&visible, resources, rc| {
            let buffer = get_buffer(resources, visible)?;
            assert_eq!(buffer.size(), 256);
            rc.clear_buffer(buffer);
            Ok(())
        },
    );
    fg.execute(&mut rc, &mut pool).unwrap();

    assert_eq!(pool.idle_buffer_count(), 1);
    assert_eq!(rc.backend().calls(DeviceCall::ClearBuffer), 1);
    pool.clear(&mut rc);
    assert_eq!(rc.backend().live_buffers(), 0);
}

#[test]
fn released_textures_serve_later_passes() {
    let (mut rc, mut pool) = setup();
    let ids: RefCell<Vec<TextureId>> = RefCell::new(Vec::new());

    let mut fg = Graph::new();
    let first = fg.add_callback_pass(
        "First",
        |builder| {
            let t = builder.create::<FrameGraphTexture>("First.out", color_desc());
            builder.write(t)
        },
        |&t, resources, _| {
            ids.borrow_mut().push(get_texture(resources, t)?.id());
            Ok(())
        },
    );
    let second = fg.add_callback_pass(
        "Second",
        |builder| {
            builder.read(first);
            let t = builder.create::<FrameGraphTexture>("Second.out", color_desc());
            builder.write(t)
        },
        |&t, resources, _| {
            ids.borrow_mut().push(get_texture(resources, t)?.id());
            Ok(())
        },
    );
    fg.add_callback_pass(
        "Third",
        |builder| {
            builder.read(second);
            let t = builder.create::<FrameGraphTexture>("Third.out", color_desc());
            builder.set_side_effect();
            builder.write(t)
        },
        |&t, resources, _| {
            ids.borrow_mut().push(get_texture(resources, t)?.id());
            Ok(())
        },
    );
    fg.execute(&mut rc, &mut pool).unwrap();

    // First.out dies after Second, so Third picks it up.
    let ids = ids.into_inner();
    assert_eq!(ids.len(), 3);
    assert_ne!(ids[0], ids[1]);
    assert_eq!(ids[0], ids[2]);
    assert_eq!(rc.backend().calls(DeviceCall::CreateTexture), 2);
    assert_eq!(pool.stats().textures_reused, 1);
    assert_eq!(pool.idle_texture_count(), 2);

    pool.clear(&mut rc);
}

#[test]
fn culled_passes_allocate_nothing() {
    let (mut rc, mut pool) = setup();
    let ran = RefCell::new(false);

    let mut fg = Graph::new();
    fg.add_callback_pass(
        "Unused",
        |builder| {
            let t = builder.create::<FrameGraphTexture>("Unused.out", color_desc());
            builder.write(t)
        },
        |_, _, _| {
            *ran.borrow_mut() = true;
            Ok(())
        },
    );
    fg.compile();
    assert_eq!(fg.is_culled("Unused"), Some(true));
    assert_eq!(fg.is_culled("Missing"), None);
    fg.execute(&mut rc, &mut pool).unwrap();

    assert!(!*ran.borrow());
    assert_eq!(rc.backend().calls(DeviceCall::CreateTexture), 0);
    assert_eq!(pool.pool_count(), 0);
}

#[test]
fn imported_textures_bypass_the_pool() {
    let (mut rc, mut pool) = setup();
    let mut backbuffer = rc
        .create_texture_2d(
            myth_rhi::rhi::Extent2D::new(640, 480),
            PixelFormat::Rgba8Unorm,
            1,
            0,
        )
        .unwrap();
    let backbuffer_id = backbuffer.id();

    {
        let mut fg = Graph::new();
        let target = import_texture(&mut fg, "Backbuffer", &backbuffer);
        fg.add_callback_pass(
            "Present",
            |builder| builder.write(target),
            |&target, resources, _| {
                assert_eq!(get_texture(resources, target)?.id(), backbuffer_id);
                Ok(())
            },
        );
        fg.compile();
        // Writing an import is a side effect.
        assert_eq!(fg.is_culled("Present"), Some(false));
        assert_eq!(fg.resource_count(), 1);
        fg.execute(&mut rc, &mut pool).unwrap();
    }

    assert_eq!(pool.pool_count(), 0);
    assert!(!pool.is_idle_texture(backbuffer_id));
    assert!(rc.backend().is_texture_alive(backbuffer_id));

    rc.destroy_texture(&mut backbuffer);
}

#[test]
fn failing_pass_releases_every_resource() {
    let (mut rc, mut pool) = setup();
    let later_ran = RefCell::new(false);

    let mut fg = Graph::new();
    let gbuffer = fg.add_callback_pass(
        "GBuffer",
        |builder| {
            let t = builder.create::<FrameGraphTexture>("GBuffer", color_desc());
            builder.write(t)
        },
        |_, _, _| Err(RhiError::FrameGraph("device lost".to_string())),
    );
    fg.add_callback_pass(
        "Resolve",
        |builder| {
            builder.read(gbuffer);
            builder.set_side_effect();
        },
        |_, _, _| {
            *later_ran.borrow_mut() = true;
            Ok(())
        },
    );

    let err = fg.execute(&mut rc, &mut pool).unwrap_err();
    assert!(err.to_string().contains("device lost"));
    assert!(!*later_ran.borrow());
    assert_eq!(pool.idle_texture_count(), 1);

    pool.clear(&mut rc);
    assert_eq!(rc.backend().live_textures(), 0);
}

// ============================================================================
// Across Frames
// ============================================================================

fn build_frame(fg: &mut Graph<'_>) {
    let bloom = fg.add_callback_pass(
        "Bloom",
        |builder| {
            let t = builder.create::<FrameGraphTexture>(
                "Bloom",
                TextureDesc::new_2d(160, 90, PixelFormat::Rgba16F),
            );
            builder.write(t)
        },
        |_, _, _| Ok(()),
    );
    fg.add_callback_pass(
        "Composite",
        |builder| {
            builder.read(bloom);
            builder.set_side_effect();
        },
        |_, _, _| Ok(()),
    );
}

#[test]
fn render_core_reuses_and_then_evicts() {
    let mut core = RenderCore::new(HeadlessBackend::new(), PoolSettings::default()).unwrap();

    for _ in 0..3 {
        let mut fg = FrameGraph::new();
        build_frame(&mut fg);
        core.execute(fg).unwrap();
        core.end_frame(1.0 / 60.0);
    }

    let stats = core.transient_resources().stats();
    assert_eq!(stats.textures_created, 1);
    assert_eq!(stats.textures_reused, 2);
    assert_eq!(core.frame_count(), 3);
    assert_eq!(core.context().backend().live_textures(), 1);

    // Idle for longer than the limit: gone.
    core.end_frame(0.45);
    core.end_frame(0.45);
    assert_eq!(core.context().backend().live_textures(), 1);
    core.end_frame(0.5);
    assert_eq!(core.context().backend().live_textures(), 0);
    assert_eq!(core.transient_resources().stats().textures_evicted, 1);
    assert!((core.time() - (0.05 + 1.4)).abs() < 1e-4);
}

#[test]
fn mip_chained_targets_survive_execute_across_frames() {
    let mut core = RenderCore::new(HeadlessBackend::new(), PoolSettings::default()).unwrap();
    let desc = TextureDesc {
        num_mip_levels: 0,
        ..TextureDesc::new_2d(256, 256, PixelFormat::Rgba16F)
    };
    let ids: RefCell<Vec<TextureId>> = RefCell::new(Vec::new());

    for _ in 0..2 {
        let mut fg = FrameGraph::new();
        fg.add_callback_pass(
            "DepthPyramid",
            |builder| {
                let pyramid = builder.create::<FrameGraphTexture>("HiZ", desc);
                builder.set_side_effect();
                builder.write(pyramid)
            },
            |&pyramid, resources, _| {
                let texture = get_texture(resources, pyramid)?;
                assert_eq!(texture.num_mip_levels(), 9);
                ids.borrow_mut().push(texture.id());
                Ok(())
            },
        );
        core.execute(fg).unwrap();
        core.end_frame(1.0 / 60.0);
    }

    let ids = ids.into_inner();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);
    assert!(core.transient_resources().is_idle_texture(ids[0]));
    assert_eq!(core.transient_resources().stats().textures_created, 1);
}

#[test]
fn end_frame_purges_unreferenced_vertex_formats() {
    let mut core = RenderCore::new(HeadlessBackend::new(), PoolSettings::default()).unwrap();
    let format = VertexFormat::builder()
        .attribute(
            AttributeLocation::Position,
            VertexAttribute {
                ty: VertexAttributeType::Float3,
                offset: 0,
            },
        )
        .build(core.context_mut().vertex_formats());

    core.end_frame(1.0 / 60.0);
    assert_eq!(core.context_mut().vertex_formats().len(), 1);

    drop(format);
    core.end_frame(1.0 / 60.0);
    assert!(core.context_mut().vertex_formats().is_empty());
}

#[test]
fn split_mut_allows_manual_acquisition() {
    let mut core = RenderCore::new(HeadlessBackend::new(), PoolSettings::default()).unwrap();
    let (rc, pool) = core.split_mut();
    let texture = pool.acquire_texture(rc, &color_desc()).unwrap();
    pool.release_texture(&color_desc(), texture);
    assert_eq!(core.transient_resources().idle_texture_count(), 1);
}
