//! Render Core
//!
//! [`RenderCore`] is the owning context object: it holds the device-state
//! cache and the transient pool for the lifetime of the renderer and drives
//! the per-frame cycle.
//!
//! # Lifecycle
//!
//! 1. Create with [`RenderCore::new`] (any backend) or
//!    `RenderCore::with_wgpu` (feature `wgpu`)
//! 2. Each frame, build a [`FrameGraph`] and run it with
//!    [`execute`](RenderCore::execute)
//! 3. Finish the frame with [`end_frame`](RenderCore::end_frame), which runs
//!    the pool's eviction sweep and purges dead vertex formats
//! 4. Dropping the core destroys every idle pooled resource, then the
//!    context tears down its own caches
//!
//! ```rust,ignore
//! let mut core = RenderCore::new(HeadlessBackend::new(), PoolSettings::default())?;
//! loop {
//!     let mut fg = FrameGraph::new();
//!     // ... add passes ...
//!     core.execute(fg)?;
//!     core.end_frame(dt);
//! }
//! ```

use crate::errors::Result;
use crate::graph::FrameGraph;
use crate::rhi::{GraphicsBackend, RenderContext};
use crate::settings::PoolSettings;
use crate::transient::TransientResources;

pub struct RenderCore<B: GraphicsBackend> {
    context: RenderContext<B>,
    transient: TransientResources,

    time: f32,
    frame_count: u64,
}

impl<B: GraphicsBackend> RenderCore<B> {
    pub fn new(backend: B, settings: PoolSettings) -> Result<Self> {
        Ok(Self {
            context: RenderContext::new(backend)?,
            transient: TransientResources::new(settings),
            time: 0.0,
            frame_count: 0,
        })
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &RenderContext<B> {
        &self.context
    }

    #[inline]
    pub fn context_mut(&mut self) -> &mut RenderContext<B> {
        &mut self.context
    }

    #[inline]
    #[must_use]
    pub fn transient_resources(&self) -> &TransientResources {
        &self.transient
    }

    /// Both halves at once, for code that acquires resources by hand.
    #[inline]
    pub fn split_mut(&mut self) -> (&mut RenderContext<B>, &mut TransientResources) {
        (&mut self.context, &mut self.transient)
    }

    /// Simulated seconds accumulated by [`end_frame`](Self::end_frame).
    #[inline]
    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Compiles (if needed) and runs `fg` against this core's context and
    /// pool.
    pub fn execute(&mut self, fg: FrameGraph<'_, B>) -> Result<()> {
        fg.execute(&mut self.context, &mut self.transient)
    }

    /// Ages idle pooled resources by `dt` seconds and evicts expired ones.
    /// Also drops vertex formats nothing references any more.
    pub fn end_frame(&mut self, dt: f32) {
        self.transient.update(&mut self.context, dt);
        self.context.vertex_formats().purge();
        self.time += dt;
        self.frame_count += 1;
    }
}

#[cfg(feature = "wgpu")]
impl RenderCore<crate::rhi::WgpuBackend> {
    /// Creates a headless wgpu device and wraps it. Blocks on the adapter
    /// and device requests.
    pub fn with_wgpu(settings: &crate::settings::RhiSettings) -> Result<Self> {
        let backend = pollster::block_on(crate::rhi::WgpuBackend::new(settings))?;
        Self::new(backend, settings.pool)
    }
}

impl<B: GraphicsBackend> Drop for RenderCore<B> {
    fn drop(&mut self) {
        self.transient.clear(&mut self.context);
        log::info!(
            "RenderCore shut down after {} frames ({:?})",
            self.frame_count,
            self.transient.stats()
        );
    }
}
