//! Fixed-function pipeline state.
//!
//! A [`GraphicsPipeline`] bundles a shader program, a vertex array and the
//! depth / rasterizer / blend sub-states. Binding one goes through
//! [`RenderContext::bind_pipeline`](super::RenderContext::bind_pipeline),
//! which only forwards the sub-states that differ from what the device
//! currently has.

use super::handle::{ProgramId, VertexArrayId};
use super::types::{CompareOp, Rect2D};

use slotmap::Key;

/// Number of color attachments with independent blend state.
pub const MAX_BLEND_STATES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: CompareOp,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: true,
            depth_compare_op: CompareOp::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
    Src1Color,
    OneMinusSrc1Color,
    Src1Alpha,
    OneMinusSrc1Alpha,
}

/// Per-attachment blending.
///
/// `src` is the incoming fragment, `dst` the value already in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enabled: bool,

    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,

    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enabled: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
        }
    }
}

impl BlendState {
    /// Plain additive blending (`src + dst`), used by accumulation passes.
    pub const ADDITIVE: Self = Self {
        enabled: true,
        src_color: BlendFactor::One,
        dst_color: BlendFactor::One,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::One,
        alpha_op: BlendOp::Add,
    };

    /// Straight alpha blending.
    pub const ALPHA: Self = Self {
        enabled: true,
        src_color: BlendFactor::SrcAlpha,
        dst_color: BlendFactor::OneMinusSrcAlpha,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
        alpha_op: BlendOp::Add,
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Point,
    Line,
    #[default]
    Fill,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

/// Depth bias applied to rasterized fragments.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolygonOffset {
    pub factor: f32,
    pub units: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub polygon_offset: Option<PolygonOffset>,
    pub depth_clamp_enable: bool,
    pub scissor_test: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            polygon_offset: None,
            depth_clamp_enable: false,
            scissor_test: false,
        }
    }
}

/// A complete graphics pipeline description.
///
/// Not `Clone`: the program handle is owned and released through
/// [`RenderContext::destroy_pipeline`](super::RenderContext::destroy_pipeline).
#[derive(Debug, Default, PartialEq)]
pub struct GraphicsPipeline {
    pub(crate) program: ProgramId,
    pub(crate) vertex_array: VertexArrayId,

    pub(crate) depth_stencil: DepthStencilState,
    pub(crate) rasterizer: RasterizerState,
    pub(crate) blend_states: [BlendState; MAX_BLEND_STATES],
}

impl GraphicsPipeline {
    #[must_use]
    pub fn builder() -> GraphicsPipelineBuilder {
        GraphicsPipelineBuilder::default()
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> ProgramId {
        self.program
    }

    #[inline]
    #[must_use]
    pub fn vertex_array(&self) -> VertexArrayId {
        self.vertex_array
    }

    #[inline]
    #[must_use]
    pub fn depth_stencil(&self) -> &DepthStencilState {
        &self.depth_stencil
    }

    #[inline]
    #[must_use]
    pub fn rasterizer(&self) -> &RasterizerState {
        &self.rasterizer
    }

    #[inline]
    #[must_use]
    pub fn blend_state(&self, attachment: usize) -> &BlendState {
        &self.blend_states[attachment]
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.program.is_null()
    }
}

/// Builder for [`GraphicsPipeline`].
#[derive(Debug, Default)]
pub struct GraphicsPipelineBuilder {
    program: ProgramId,
    vertex_array: VertexArrayId,

    depth_stencil: DepthStencilState,
    rasterizer: RasterizerState,
    blend_states: [BlendState; MAX_BLEND_STATES],
}

impl GraphicsPipelineBuilder {
    #[must_use]
    pub fn shader_program(mut self, program: ProgramId) -> Self {
        self.program = program;
        self
    }

    /// Leaving the vertex array unset draws with an attribute-less layout
    /// (full-screen triangles, procedural cubes).
    #[must_use]
    pub fn vertex_array(mut self, vertex_array: VertexArrayId) -> Self {
        self.vertex_array = vertex_array;
        self
    }

    #[must_use]
    pub fn depth_stencil(mut self, state: DepthStencilState) -> Self {
        self.depth_stencil = state;
        self
    }

    #[must_use]
    pub fn rasterizer_state(mut self, state: RasterizerState) -> Self {
        self.rasterizer = state;
        self
    }

    /// Sets the blend state of one color attachment. Indices at or past
    /// [`MAX_BLEND_STATES`] are ignored.
    #[must_use]
    pub fn blend_state(mut self, attachment: usize, state: BlendState) -> Self {
        debug_assert!(
            attachment < MAX_BLEND_STATES,
            "blend attachment {attachment} out of range"
        );
        match self.blend_states.get_mut(attachment) {
            Some(slot) => *slot = state,
            None => log::warn!("Ignoring blend state for attachment {attachment}"),
        }
        self
    }

    /// Finishes the pipeline. A shader program is mandatory.
    #[must_use]
    pub fn build(self) -> GraphicsPipeline {
        debug_assert!(!self.program.is_null(), "pipeline without shader program");
        GraphicsPipeline {
            program: self.program,
            vertex_array: self.vertex_array,
            depth_stencil: self.depth_stencil,
            rasterizer: self.rasterizer,
            blend_states: self.blend_states,
        }
    }
}

/// State the device currently has bound, as tracked by the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSnapshot {
    pub viewport: Rect2D,
    pub scissor: Rect2D,

    pub program: ProgramId,
    pub vertex_array: VertexArrayId,

    pub depth_stencil: DepthStencilState,
    pub rasterizer: RasterizerState,
    pub blend_states: [BlendState; MAX_BLEND_STATES],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_blend_per_attachment() {
        let builder = GraphicsPipelineBuilder::default()
            .blend_state(0, BlendState::ALPHA)
            .blend_state(1, BlendState::ADDITIVE);
        assert_eq!(builder.blend_states, [BlendState::ALPHA, BlendState::ADDITIVE]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn out_of_range_blend_attachment_is_caught_in_debug() {
        let _ = GraphicsPipelineBuilder::default().blend_state(MAX_BLEND_STATES, BlendState::ALPHA);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn out_of_range_blend_attachment_is_ignored() {
        let builder =
            GraphicsPipelineBuilder::default().blend_state(MAX_BLEND_STATES, BlendState::ALPHA);
        assert_eq!(builder.blend_states, [BlendState::default(); MAX_BLEND_STATES]);
    }
}
