//! Transient Resource Pool
//!
//! Keeps idle physical textures and buffers between frames so that passes
//! requesting the same descriptor frame after frame reuse one allocation
//! instead of creating a new one each time.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   TransientResources                     │
//! │                                                          │
//! │  textures: HashMap<u64, Vec<{Texture, desc, idle}>>      │
//! │  buffers:  HashMap<u64, Vec<{Buffer,  desc, idle}>>      │
//! │                                                          │
//! │  acquire_*(desc) → resource   (moved out of the pool)    │
//! │  release_*(desc, resource)    (moved back, idle = 0)     │
//! │  update(dt)                   (age + evict idle > max)   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Ownership
//!
//! Resources are move-only owners. Acquiring moves a resource *out* of its
//! bucket, releasing moves it back in, eviction destroys it. A resource is
//! therefore always in exactly one place: checked out by a caller, idle in
//! a bucket, or destroyed. No operation hands out a reference to an idle
//! resource.
//!
//! # Eviction
//!
//! [`update`](TransientResources::update) adds `dt` to every idle entry and
//! destroys entries whose idle time is strictly greater than
//! [`PoolSettings::max_idle_seconds`]. Buckets left empty are removed so
//! the hash index itself stays bounded.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

use super::descriptor::{BufferDesc, TextureDesc, descriptor_hash};
use crate::errors::Result;
use crate::rhi::{Buffer, BufferId, GraphicsBackend, RenderContext, Texture, TextureId};
use crate::settings::PoolSettings;

// ─── Pool Internals ──────────────────────────────────────────────────────────

/// A physical resource the pool can hold.
pub(crate) trait PooledResource: Sized {
    type Desc: Copy + Eq + Hash + std::fmt::Display;
    type Id: Copy + Eq + Hash + std::fmt::Debug;

    fn pool_id(&self) -> Self::Id;
    fn destroy<B: GraphicsBackend>(&mut self, rc: &mut RenderContext<B>);
}

impl PooledResource for Texture {
    type Desc = TextureDesc;
    type Id = TextureId;

    fn pool_id(&self) -> TextureId {
        self.id()
    }

    fn destroy<B: GraphicsBackend>(&mut self, rc: &mut RenderContext<B>) {
        rc.destroy_texture(self);
    }
}

impl PooledResource for Buffer {
    type Desc = BufferDesc;
    type Id = BufferId;

    fn pool_id(&self) -> BufferId {
        self.id()
    }

    fn destroy<B: GraphicsBackend>(&mut self, rc: &mut RenderContext<B>) {
        rc.destroy_buffer(self);
    }
}

struct PoolEntry<R: PooledResource> {
    resource: R,
    desc: R::Desc,
    idle_seconds: f32,
}

/// Buckets of idle resources plus the registry of everything this pool
/// created and has not destroyed yet.
struct Pool<R: PooledResource> {
    buckets: FxHashMap<u64, Vec<PoolEntry<R>>>,
    live: FxHashSet<R::Id>,
}

impl<R: PooledResource> Default for Pool<R> {
    fn default() -> Self {
        Self {
            buckets: FxHashMap::default(),
            live: FxHashSet::default(),
        }
    }
}

impl<R: PooledResource> Pool<R> {
    /// Pops the most recently released resource with exactly `desc`.
    /// Entries that only share the hash are skipped.
    fn take(&mut self, desc: &R::Desc) -> Option<R> {
        let bucket = self.buckets.get_mut(&descriptor_hash(desc))?;
        let index = bucket.iter().rposition(|e| e.desc == *desc)?;
        Some(bucket.remove(index).resource)
    }

    fn put(&mut self, desc: R::Desc, resource: R) {
        if self.live.insert(resource.pool_id()) {
            log::warn!(
                "Released {:?} was not created by the pool; adopting it",
                resource.pool_id()
            );
        }
        self.buckets
            .entry(descriptor_hash(&desc))
            .or_default()
            .push(PoolEntry {
                resource,
                desc,
                idle_seconds: 0.0,
            });
    }

    /// Ages every idle entry by `dt` and destroys the expired ones.
    /// Returns the number of destroyed resources.
    fn heartbeat<B: GraphicsBackend>(
        &mut self,
        rc: &mut RenderContext<B>,
        dt: f32,
        max_idle_seconds: f32,
    ) -> usize {
        let mut evicted = 0;
        for bucket in self.buckets.values_mut() {
            bucket.retain_mut(|entry| {
                entry.idle_seconds += dt;
                if entry.idle_seconds <= max_idle_seconds {
                    return true;
                }
                let id = entry.resource.pool_id();
                entry.resource.destroy(rc);
                self.live.remove(&id);
                log::info!("Released resource: {id:?} ({})", entry.desc);
                evicted += 1;
                false
            });
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());
        evicted
    }

    fn drain<B: GraphicsBackend>(&mut self, rc: &mut RenderContext<B>) -> usize {
        let mut destroyed = 0;
        for (_, bucket) in self.buckets.drain() {
            for mut entry in bucket {
                self.live.remove(&entry.resource.pool_id());
                entry.resource.destroy(rc);
                destroyed += 1;
            }
        }
        destroyed
    }

    fn contains(&self, id: R::Id) -> bool {
        self.buckets
            .values()
            .flatten()
            .any(|e| e.resource.pool_id() == id)
    }

    fn idle_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Lifetime counters of a [`TransientResources`] pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub textures_created: u64,
    pub textures_reused: u64,
    pub textures_evicted: u64,
    pub buffers_created: u64,
    pub buffers_reused: u64,
    pub buffers_evicted: u64,
}

/// Hashed-descriptor pool of idle textures and buffers.
///
/// The pool does not own the device; every operation that may create or
/// destroy takes the [`RenderContext`]. Call [`clear`](Self::clear) before
/// dropping the pool, or let [`RenderCore`](crate::RenderCore) do it.
pub struct TransientResources {
    settings: PoolSettings,
    textures: Pool<Texture>,
    buffers: Pool<Buffer>,
    stats: PoolStats,
}

impl Default for TransientResources {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}

impl TransientResources {
    #[must_use]
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            textures: Pool::default(),
            buffers: Pool::default(),
            stats: PoolStats::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    // ── Textures ─────────────────────────────────────────────────────────

    /// Returns an idle texture with exactly `desc`, or creates one.
    ///
    /// Reused textures keep their previous contents.
    pub fn acquire_texture<B: GraphicsBackend>(
        &mut self,
        rc: &mut RenderContext<B>,
        desc: &TextureDesc,
    ) -> Result<Texture> {
        if let Some(texture) = self.textures.take(desc) {
            self.stats.textures_reused += 1;
            return Ok(texture);
        }

        let texture = rc.create_texture(&desc.create_info())?;
        rc.setup_sampler(&texture, &desc.sampler_info());

        self.textures.live.insert(texture.id());
        self.stats.textures_created += 1;
        log::info!("Created transient texture {:?}: {desc}", texture.id());
        Ok(texture)
    }

    /// Returns `texture` to the bucket of `desc`. Nothing is destroyed.
    pub fn release_texture(&mut self, desc: &TextureDesc, texture: Texture) {
        debug_assert!(texture.is_valid(), "releasing a destroyed texture");
        debug_assert!(desc.matches(&texture), "texture released under a foreign descriptor");
        self.textures.put(*desc, texture);
    }

    // ── Buffers ──────────────────────────────────────────────────────────

    /// Returns an idle writable buffer of `desc.size` bytes, or creates one.
    pub fn acquire_buffer<B: GraphicsBackend>(
        &mut self,
        rc: &mut RenderContext<B>,
        desc: &BufferDesc,
    ) -> Result<Buffer> {
        if let Some(buffer) = self.buffers.take(desc) {
            self.stats.buffers_reused += 1;
            return Ok(buffer);
        }

        let buffer = rc.create_buffer(desc.size, None)?;
        self.buffers.live.insert(buffer.id());
        self.stats.buffers_created += 1;
        log::info!("Created transient buffer {:?}: {desc}", buffer.id());
        Ok(buffer)
    }

    pub fn release_buffer(&mut self, desc: &BufferDesc, buffer: Buffer) {
        debug_assert!(buffer.is_valid(), "releasing a destroyed buffer");
        debug_assert_eq!(buffer.size(), desc.size, "buffer released under a foreign descriptor");
        self.buffers.put(*desc, buffer);
    }

    // ── Maintenance ──────────────────────────────────────────────────────

    /// Advances idle time by `dt` seconds and destroys expired resources.
    pub fn update<B: GraphicsBackend>(&mut self, rc: &mut RenderContext<B>, dt: f32) {
        let max_idle = self.settings.max_idle_seconds;
        let textures = self.textures.heartbeat(rc, dt, max_idle);
        let buffers = self.buffers.heartbeat(rc, dt, max_idle);

        self.stats.textures_evicted += textures as u64;
        self.stats.buffers_evicted += buffers as u64;
        if textures + buffers > 0 {
            log::debug!("Pool sweep evicted {textures} textures, {buffers} buffers");
        }
    }

    /// Destroys every idle resource. Checked-out resources are untouched.
    pub fn clear<B: GraphicsBackend>(&mut self, rc: &mut RenderContext<B>) {
        let textures = self.textures.drain(rc);
        let buffers = self.buffers.drain(rc);
        if textures + buffers > 0 {
            log::info!("Transient pool cleared ({textures} textures, {buffers} buffers)");
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// `true` if `id` is currently idle in this pool.
    #[must_use]
    pub fn is_idle_texture(&self, id: TextureId) -> bool {
        self.textures.contains(id)
    }

    #[must_use]
    pub fn is_idle_buffer(&self, id: BufferId) -> bool {
        self.buffers.contains(id)
    }

    #[must_use]
    pub fn idle_texture_count(&self) -> usize {
        self.textures.idle_count()
    }

    #[must_use]
    pub fn idle_buffer_count(&self) -> usize {
        self.buffers.idle_count()
    }

    /// Textures created by the pool and not yet destroyed (idle or checked out).
    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.textures.live.len()
    }

    #[must_use]
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.live.len()
    }

    /// Number of non-empty descriptor buckets, both kinds together.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.textures.buckets.len() + self.buffers.buckets.len()
    }
}

impl Drop for TransientResources {
    fn drop(&mut self) {
        let idle = self.textures.idle_count() + self.buffers.idle_count();
        if idle > 0 {
            log::warn!("TransientResources dropped with {idle} idle resources; call clear() first");
        }
    }
}
