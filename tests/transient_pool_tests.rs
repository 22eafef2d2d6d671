//! Transient Pool Tests
//!
//! Tests for:
//! - TransientResources: reuse by exact descriptor, bucket separation
//! - Idle eviction: strict threshold, bucket cleanup, clear()
//! - Ownership: an acquired resource is never idle, releases never destroy
//! - Mip-chained and volume descriptors through acquire, release, reacquire
//! - TextureDesc / BufferDesc: hashing covers every allocation field
//! - PoolSettings: serde defaults

use myth_rhi::rhi::{DeviceCall, HeadlessBackend, PixelFormat, RenderContext, TexelFilter};
use myth_rhi::settings::{DEFAULT_MAX_IDLE_SECONDS, PoolSettings};
use myth_rhi::transient::{BufferDesc, TextureDesc, TransientResources, WrapMode, descriptor_hash};

fn setup() -> (RenderContext<HeadlessBackend>, TransientResources) {
    let rc = RenderContext::new(HeadlessBackend::new()).unwrap();
    (rc, TransientResources::new(PoolSettings::default()))
}

fn color_desc() -> TextureDesc {
    TextureDesc::new_2d(1280, 720, PixelFormat::Rgba16F)
}

fn created(rc: &RenderContext<HeadlessBackend>) -> u64 {
    rc.backend().calls(DeviceCall::CreateTexture)
}

fn destroyed(rc: &RenderContext<HeadlessBackend>) -> u64 {
    rc.backend().calls(DeviceCall::DestroyTexture)
}

// ============================================================================
// Reuse
// ============================================================================

#[test]
fn released_texture_is_reused_for_the_same_descriptor() {
    let (mut rc, mut pool) = setup();
    let desc = color_desc();

    let first = pool.acquire_texture(&mut rc, &desc).unwrap();
    let first_id = first.id();
    pool.release_texture(&desc, first);

    let second = pool.acquire_texture(&mut rc, &desc).unwrap();
    assert_eq!(second.id(), first_id);
    assert_eq!(created(&rc), 1);
    assert_eq!(pool.stats().textures_reused, 1);

    pool.release_texture(&desc, second);
    pool.clear(&mut rc);
}

#[test]
fn new_texture_carries_descriptor_shape_and_sampler() {
    let (mut rc, mut pool) = setup();
    let desc = TextureDesc {
        shadow_sampler: true,
        wrap_mode: WrapMode::ClampToOpaqueWhite,
        filter: TexelFilter::Nearest,
        ..TextureDesc::new_2d(512, 512, PixelFormat::Depth32F)
    };

    let texture = pool.acquire_texture(&mut rc, &desc).unwrap();
    assert!(desc.matches(&texture));
    assert_eq!(rc.backend().texture_sampler(texture.id()), Some(&desc.sampler_info()));
    assert_eq!(
        rc.backend().texture_shape(texture.id()).map(|s| s.format),
        Some(PixelFormat::Depth32F)
    );

    pool.release_texture(&desc, texture);
    pool.clear(&mut rc);
}

#[test]
fn full_chain_texture_returns_to_its_bucket() {
    let (mut rc, mut pool) = setup();
    let desc = TextureDesc {
        num_mip_levels: 0,
        ..TextureDesc::new_2d(256, 256, PixelFormat::Rgba16F)
    };

    let texture = pool.acquire_texture(&mut rc, &desc).unwrap();
    let id = texture.id();
    assert_eq!(texture.num_mip_levels(), 9);
    assert!(desc.matches(&texture));

    pool.release_texture(&desc, texture);
    assert!(pool.is_idle_texture(id));

    let again = pool.acquire_texture(&mut rc, &desc).unwrap();
    assert_eq!(again.id(), id);
    assert_eq!(created(&rc), 1);

    pool.release_texture(&desc, again);
    pool.clear(&mut rc);
}

#[test]
fn volume_texture_returns_to_its_bucket() {
    let (mut rc, mut pool) = setup();
    let desc = TextureDesc {
        depth: 32,
        num_mip_levels: 0,
        ..TextureDesc::new_2d(64, 64, PixelFormat::R16F)
    };

    let texture = pool.acquire_texture(&mut rc, &desc).unwrap();
    let id = texture.id();
    assert_eq!(texture.depth(), 32);
    assert_eq!(texture.num_mip_levels(), 7);

    pool.release_texture(&desc, texture);
    assert!(pool.is_idle_texture(id));

    let again = pool.acquire_texture(&mut rc, &desc).unwrap();
    assert_eq!(again.id(), id);
    assert_eq!(pool.stats().textures_reused, 1);

    pool.release_texture(&desc, again);
    pool.clear(&mut rc);
    assert!(!rc.backend().is_texture_alive(id));
}

#[test]
fn descriptors_differing_in_one_field_do_not_share() {
    let (mut rc, mut pool) = setup();
    let a = color_desc();
    let b = TextureDesc {
        filter: TexelFilter::Nearest,
        ..a
    };

    let ta = pool.acquire_texture(&mut rc, &a).unwrap();
    pool.release_texture(&a, ta);

    let tb = pool.acquire_texture(&mut rc, &b).unwrap();
    assert_eq!(created(&rc), 2);
    assert_eq!(pool.idle_texture_count(), 1);
    assert_eq!(pool.pool_count(), 1);

    pool.release_texture(&b, tb);
    assert_eq!(pool.pool_count(), 2);
    pool.clear(&mut rc);
}

#[test]
fn simultaneous_acquires_get_distinct_textures() {
    let (mut rc, mut pool) = setup();
    let desc = color_desc();

    let a = pool.acquire_texture(&mut rc, &desc).unwrap();
    let b = pool.acquire_texture(&mut rc, &desc).unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(pool.live_texture_count(), 2);
    assert_eq!(pool.idle_texture_count(), 0);

    pool.release_texture(&desc, a);
    pool.release_texture(&desc, b);
    assert_eq!(pool.idle_texture_count(), 2);
    assert_eq!(pool.pool_count(), 1);
    pool.clear(&mut rc);
}

#[test]
fn buffers_are_pooled_by_size() {
    let (mut rc, mut pool) = setup();
    let small = BufferDesc { size: 256 };
    let large = BufferDesc { size: 4096 };

    let a = pool.acquire_buffer(&mut rc, &small).unwrap();
    let a_id = a.id();
    assert_eq!(a.size(), 256);
    assert!(!a.is_immutable());
    pool.release_buffer(&small, a);

    let b = pool.acquire_buffer(&mut rc, &large).unwrap();
    assert_ne!(b.id(), a_id);
    let c = pool.acquire_buffer(&mut rc, &small).unwrap();
    assert_eq!(c.id(), a_id);

    let stats = pool.stats();
    assert_eq!(stats.buffers_created, 2);
    assert_eq!(stats.buffers_reused, 1);

    pool.release_buffer(&large, b);
    pool.release_buffer(&small, c);
    pool.clear(&mut rc);
    assert_eq!(rc.backend().live_buffers(), 0);
}

// ============================================================================
// Ownership
// ============================================================================

#[test]
fn acquired_texture_is_not_idle_until_released() {
    let (mut rc, mut pool) = setup();
    let desc = color_desc();

    let texture = pool.acquire_texture(&mut rc, &desc).unwrap();
    let id = texture.id();
    assert!(!pool.is_idle_texture(id));

    // Eviction only touches idle entries.
    pool.update(&mut rc, 10.0);
    assert!(rc.backend().is_texture_alive(id));

    pool.release_texture(&desc, texture);
    assert!(pool.is_idle_texture(id));
    assert!(rc.backend().is_texture_alive(id));
    assert_eq!(destroyed(&rc), 0);

    pool.clear(&mut rc);
    assert!(!rc.backend().is_texture_alive(id));
}

#[test]
fn foreign_resources_are_adopted_on_release() {
    let (mut rc, mut pool) = setup();
    let desc = BufferDesc { size: 64 };
    let buffer = rc.create_buffer(64, None).unwrap();
    let id = buffer.id();

    pool.release_buffer(&desc, buffer);
    assert!(pool.is_idle_buffer(id));
    assert_eq!(pool.live_buffer_count(), 1);

    pool.update(&mut rc, 2.0);
    assert!(!rc.backend().is_buffer_alive(id));
    assert_eq!(pool.live_buffer_count(), 0);
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn eviction_threshold_is_exclusive() {
    let (mut rc, mut pool) = setup();
    let desc = color_desc();

    let texture = pool.acquire_texture(&mut rc, &desc).unwrap();
    pool.release_texture(&desc, texture);

    pool.update(&mut rc, 0.5);
    pool.update(&mut rc, 0.5);
    assert_eq!(pool.idle_texture_count(), 1, "idle == max must survive");

    pool.update(&mut rc, 0.25);
    assert_eq!(pool.idle_texture_count(), 0);
    assert_eq!(pool.pool_count(), 0, "empty buckets are dropped");
    assert_eq!(destroyed(&rc), 1);
    assert_eq!(pool.stats().textures_evicted, 1);
}

#[test]
fn reacquire_resets_idle_time() {
    let (mut rc, mut pool) = setup();
    let desc = color_desc();

    let texture = pool.acquire_texture(&mut rc, &desc).unwrap();
    pool.release_texture(&desc, texture);
    pool.update(&mut rc, 0.9);

    let texture = pool.acquire_texture(&mut rc, &desc).unwrap();
    pool.release_texture(&desc, texture);
    pool.update(&mut rc, 0.9);

    assert_eq!(pool.idle_texture_count(), 1);
    assert_eq!(created(&rc), 1);
    pool.clear(&mut rc);
}

#[test]
fn custom_idle_limit_is_honoured() {
    let mut rc = RenderContext::new(HeadlessBackend::new()).unwrap();
    let mut pool = TransientResources::new(PoolSettings {
        max_idle_seconds: 0.0,
    });
    let desc = BufferDesc { size: 16 };

    let buffer = pool.acquire_buffer(&mut rc, &desc).unwrap();
    pool.release_buffer(&desc, buffer);
    pool.update(&mut rc, 0.0);
    assert_eq!(pool.idle_buffer_count(), 1);

    pool.update(&mut rc, 0.001);
    assert_eq!(pool.idle_buffer_count(), 0);
}

#[test]
fn clear_destroys_only_idle_resources() {
    let (mut rc, mut pool) = setup();
    let desc = color_desc();

    let kept = pool.acquire_texture(&mut rc, &desc).unwrap();
    let idle = pool.acquire_texture(&mut rc, &desc).unwrap();
    pool.release_texture(&desc, idle);

    pool.clear(&mut rc);
    assert_eq!(pool.idle_texture_count(), 0);
    assert!(rc.backend().is_texture_alive(kept.id()));
    assert_eq!(pool.live_texture_count(), 1);

    pool.release_texture(&desc, kept);
    pool.clear(&mut rc);
    assert_eq!(rc.backend().live_textures(), 0);
}

// ============================================================================
// End-to-end frames
// ============================================================================

#[test]
fn three_distinct_textures_then_one_frame_idle() {
    let (mut rc, mut pool) = setup();
    let descs = [
        TextureDesc::new_2d(1920, 1080, PixelFormat::Rgba16F),
        TextureDesc::new_2d(1920, 1080, PixelFormat::Depth24),
        TextureDesc::new_2d(960, 540, PixelFormat::Rgba16F),
    ];

    let textures: Vec<_> = descs
        .iter()
        .map(|d| pool.acquire_texture(&mut rc, d).unwrap())
        .collect();
    for (desc, texture) in descs.iter().zip(textures) {
        pool.release_texture(desc, texture);
    }
    pool.update(&mut rc, 1.0 / 60.0);

    assert_eq!(created(&rc), 3);
    assert_eq!(destroyed(&rc), 0);
    assert_eq!(pool.idle_texture_count(), 3);
    assert_eq!(pool.pool_count(), 3);
    pool.clear(&mut rc);
}

#[test]
fn idle_texture_survives_two_half_seconds_then_goes() {
    let (mut rc, mut pool) = setup();
    let desc = color_desc();

    let texture = pool.acquire_texture(&mut rc, &desc).unwrap();
    let id = texture.id();
    pool.release_texture(&desc, texture);

    pool.update(&mut rc, 0.5);
    assert!(pool.is_idle_texture(id));
    pool.update(&mut rc, 0.5);
    assert!(pool.is_idle_texture(id));
    pool.update(&mut rc, 0.1);
    assert!(!pool.is_idle_texture(id));
    assert!(!rc.backend().is_texture_alive(id));
}

// ============================================================================
// Descriptors & settings
// ============================================================================

#[test]
fn every_allocation_field_reaches_the_hash() {
    let base = color_desc();
    let variants = [
        TextureDesc {
            extent: myth_rhi::rhi::Extent2D::new(1281, 720),
            ..base
        },
        TextureDesc { depth: 4, ..base },
        TextureDesc {
            num_mip_levels: 2,
            ..base
        },
        TextureDesc { layers: 3, ..base },
        TextureDesc {
            format: PixelFormat::Rgba32F,
            ..base
        },
        TextureDesc {
            shadow_sampler: true,
            ..base
        },
        TextureDesc {
            wrap_mode: WrapMode::ClampToOpaqueBlack,
            ..base
        },
        TextureDesc {
            filter: TexelFilter::Nearest,
            ..base
        },
    ];
    for variant in variants {
        assert_ne!(descriptor_hash(&variant), descriptor_hash(&base), "{variant:?}");
    }
    assert_eq!(descriptor_hash(&base), descriptor_hash(&color_desc()));
    assert_ne!(
        descriptor_hash(&BufferDesc { size: 1 }),
        descriptor_hash(&BufferDesc { size: 2 })
    );
}

#[test]
fn pool_settings_default_when_missing() {
    let settings: PoolSettings = serde_json::from_str("{}").unwrap();
    assert_eq!(settings.max_idle_seconds, DEFAULT_MAX_IDLE_SECONDS);

    let settings: PoolSettings = serde_json::from_str(r#"{"max_idle_seconds": 2.5}"#).unwrap();
    assert_eq!(settings.max_idle_seconds, 2.5);
}
