//! Per-pass pipeline cache.
//!
//! Geometry passes need one [`GraphicsPipeline`] per (vertex layout,
//! material) combination. The pass supplies a [`BasePipelineFactory`] that
//! knows how to build its pipeline; [`PipelineCache`] memoizes the result
//! under a 64-bit key combining the vertex format hash with the material
//! hash.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use super::backend::GraphicsBackend;
use super::context::RenderContext;
use super::state::GraphicsPipeline;
use super::vertex::VertexFormat;
use crate::errors::Result;

/// Builds the base pipeline of a geometry pass.
pub trait BasePipelineFactory<B: GraphicsBackend> {
    /// Material description the pipeline depends on.
    type Material: Hash + ?Sized;

    fn create_base_pipeline(
        &mut self,
        rc: &mut RenderContext<B>,
        format: &VertexFormat,
        material: Option<&Self::Material>,
    ) -> Result<GraphicsPipeline>;
}

/// Cache key for a (vertex format, material) pair.
#[must_use]
pub fn pipeline_key<M: Hash + ?Sized>(format: &VertexFormat, material: Option<&M>) -> u64 {
    let mut hasher = FxHasher::default();
    format.hash().hash(&mut hasher);
    if let Some(material) = material {
        material.hash(&mut hasher);
    }
    hasher.finish()
}

/// Owns the pipelines of one pass.
#[derive(Debug, Default)]
pub struct PipelineCache {
    pipelines: FxHashMap<u64, GraphicsPipeline>,
}

impl PipelineCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached pipeline, building it through `factory` on a miss.
    pub fn get_or_create<B, F>(
        &mut self,
        rc: &mut RenderContext<B>,
        factory: &mut F,
        format: &VertexFormat,
        material: Option<&F::Material>,
    ) -> Result<&GraphicsPipeline>
    where
        B: GraphicsBackend,
        F: BasePipelineFactory<B>,
    {
        let key = pipeline_key(format, material);

        if !self.pipelines.contains_key(&key) {
            let pipeline = factory.create_base_pipeline(rc, format, material)?;
            log::info!("Created pipeline: {key:#018x}");
            self.pipelines.insert(key, pipeline);
        }

        // Inserted above on a miss.
        self.pipelines
            .get(&key)
            .ok_or(crate::errors::RhiError::InvalidHandle("pipeline"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Destroys every cached pipeline.
    pub fn clear<B: GraphicsBackend>(&mut self, rc: &mut RenderContext<B>) {
        for (_, mut pipeline) in self.pipelines.drain() {
            rc.destroy_pipeline(&mut pipeline);
        }
    }
}
