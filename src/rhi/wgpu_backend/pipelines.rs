//! Shader programs and the pipeline objects built from them.
//!
//! wgpu bakes fixed-function state into pipeline objects, so the backend
//! keeps the loose GL-style state and resolves it lazily: at draw time the
//! current state is folded into a [`RenderPipelineKey`] and looked up here.
//! Pipelines use the layout derived from the shader; every program binds
//! its resources in group 0.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::convert;
use crate::errors::{Result, RhiError, ShaderStage};
use crate::rhi::handle::ProgramId;
use crate::rhi::state::{BlendState, CullMode, PolygonMode};
use crate::rhi::types::{CompareOp, IndexType, PrimitiveTopology};
use crate::rhi::vertex::VertexAttributes;

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";
pub const COMPUTE_ENTRY: &str = "cs_main";

/// A compiled program: one module per stage plus the binding slots its
/// sources declare.
pub struct Program {
    pub vertex: Option<wgpu::ShaderModule>,
    pub fragment: Option<wgpu::ShaderModule>,
    pub compute: Option<wgpu::ShaderModule>,
    /// Sorted, deduplicated `@binding(N)` numbers.
    pub bindings: SmallVec<[u32; 8]>,
}

impl Program {
    pub fn compile(device: &wgpu::Device, stages: &[(ShaderStage, &str)]) -> Result<Self> {
        let mut program = Self {
            vertex: None,
            fragment: None,
            compute: None,
            bindings: SmallVec::new(),
        };

        for &(stage, source) in stages {
            let module = compile_module(device, stage, source)?;
            let slot = match stage {
                ShaderStage::Vertex => &mut program.vertex,
                ShaderStage::Fragment => &mut program.fragment,
                ShaderStage::Compute => &mut program.compute,
            };
            if slot.replace(module).is_some() {
                return Err(RhiError::ProgramLink(format!("duplicate {stage} stage")));
            }
            program.bindings.extend(scan_bindings(source));
        }
        program.bindings.sort_unstable();
        program.bindings.dedup();

        let graphics = program.vertex.is_some() && program.fragment.is_some();
        let compute = program.compute.is_some();
        if graphics == compute {
            return Err(RhiError::ProgramLink(
                "a program needs either vertex + fragment stages or a single compute stage"
                    .to_string(),
            ));
        }
        Ok(program)
    }

    #[inline]
    pub fn is_compute(&self) -> bool {
        self.compute.is_some()
    }
}

fn compile_module(
    device: &wgpu::Device,
    stage: ShaderStage,
    source: &str,
) -> Result<wgpu::ShaderModule> {
    let entry = match stage {
        ShaderStage::Vertex => VERTEX_ENTRY,
        ShaderStage::Fragment => FRAGMENT_ENTRY,
        ShaderStage::Compute => COMPUTE_ENTRY,
    };
    if !source.contains(entry) {
        return Err(RhiError::ShaderCompilation {
            stage,
            log: format!("entry point `{entry}` not found"),
        });
    }

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(entry),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let info = pollster::block_on(module.get_compilation_info());
    let errors: Vec<String> = info
        .messages
        .iter()
        .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
        .map(|m| match &m.location {
            Some(loc) => format!("{}:{}: {}", loc.line_number, loc.line_position, m.message),
            None => m.message.clone(),
        })
        .collect();
    if !errors.is_empty() {
        return Err(RhiError::ShaderCompilation {
            stage,
            log: errors.join("\n"),
        });
    }
    Ok(module)
}

/// Binding numbers declared with `@binding(N)` in a WGSL source.
pub fn scan_bindings(source: &str) -> impl Iterator<Item = u32> + '_ {
    const TAG: &str = "@binding(";
    source.match_indices(TAG).filter_map(|(at, _)| {
        let rest = &source[at + TAG.len()..];
        let end = rest.find(')')?;
        rest[..end].trim().parse().ok()
    })
}

// ─── Render Pipelines ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthKey {
    pub format: wgpu::TextureFormat,
    pub test: bool,
    pub compare: CompareOp,
    pub write: bool,
}

/// Everything a render pipeline depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPipelineKey {
    pub program: ProgramId,
    pub attributes: VertexAttributes,
    pub stride: u32,
    pub topology: PrimitiveTopology,
    /// Set for indexed strips.
    pub strip_index: Option<IndexType>,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    /// `(factor, units)` as raw bits.
    pub depth_bias: Option<(u32, u32)>,
    pub depth_clamp: bool,
    pub depth: Option<DepthKey>,
    pub color: SmallVec<[(wgpu::TextureFormat, BlendState); 4]>,
}

fn create_render_pipeline(
    device: &wgpu::Device,
    program: &Program,
    key: &RenderPipelineKey,
) -> Result<wgpu::RenderPipeline> {
    let (Some(vertex), Some(fragment)) = (&program.vertex, &program.fragment) else {
        return Err(RhiError::InvalidHandle("graphics program"));
    };

    let attributes: Vec<wgpu::VertexAttribute> = key
        .attributes
        .iter()
        .map(|(&location, attribute)| wgpu::VertexAttribute {
            format: convert::vertex_format(attribute.ty),
            offset: u64::from(attribute.offset),
            shader_location: location,
        })
        .collect();
    let buffers = if attributes.is_empty() {
        Vec::new()
    } else {
        vec![wgpu::VertexBufferLayout {
            array_stride: u64::from(key.stride),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }]
    };

    let targets: Vec<Option<wgpu::ColorTargetState>> = key
        .color
        .iter()
        .map(|(format, blend)| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: convert::blend_state(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();

    let bias = key
        .depth_bias
        .map(|(factor, units)| wgpu::DepthBiasState {
            constant: f32::from_bits(units) as i32,
            slope_scale: f32::from_bits(factor),
            clamp: 0.0,
        })
        .unwrap_or_default();

    let depth_stencil = key.depth.map(|depth| wgpu::DepthStencilState {
        format: depth.format,
        depth_write_enabled: Some(depth.test && depth.write),
        depth_compare: Some(if depth.test {
            convert::compare_function(depth.compare)
        } else {
            wgpu::CompareFunction::Always
        }),
        stencil: wgpu::StencilState::default(),
        bias,
    });

    let strip_index_format = match key.strip_index {
        Some(ty) => Some(convert::index_format(ty)?),
        None => None,
    };

    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("RHI Render Pipeline"),
        layout: None,
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some(VERTEX_ENTRY),
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some(FRAGMENT_ENTRY),
            targets: &targets,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: convert::topology(key.topology),
            strip_index_format,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: convert::cull_mode(key.cull_mode),
            polygon_mode: convert::polygon_mode(key.polygon_mode),
            unclipped_depth: key.depth_clamp,
            ..Default::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    }))
}

fn create_compute_pipeline(device: &wgpu::Device, program: &Program) -> Result<wgpu::ComputePipeline> {
    let Some(module) = &program.compute else {
        return Err(RhiError::InvalidHandle("compute program"));
    };
    Ok(device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("RHI Compute Pipeline"),
        layout: None,
        module,
        entry_point: Some(COMPUTE_ENTRY),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    }))
}

/// Lazily built pipelines, dropped together with their program.
#[derive(Default)]
pub struct PipelineStore {
    render: FxHashMap<RenderPipelineKey, wgpu::RenderPipeline>,
    compute: FxHashMap<ProgramId, wgpu::ComputePipeline>,
}

impl PipelineStore {
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        program: &Program,
        key: RenderPipelineKey,
    ) -> Result<wgpu::RenderPipeline> {
        if let Some(pipeline) = self.render.get(&key) {
            return Ok(pipeline.clone());
        }
        let pipeline = create_render_pipeline(device, program, &key)?;
        log::debug!(
            "wgpu: created render pipeline #{} for {:?}",
            self.render.len(),
            key.program
        );
        self.render.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    pub fn compute(
        &mut self,
        device: &wgpu::Device,
        id: ProgramId,
        program: &Program,
    ) -> Result<wgpu::ComputePipeline> {
        if let Some(pipeline) = self.compute.get(&id) {
            return Ok(pipeline.clone());
        }
        let pipeline = create_compute_pipeline(device, program)?;
        self.compute.insert(id, pipeline.clone());
        Ok(pipeline)
    }

    pub fn forget_program(&mut self, program: ProgramId) {
        self.render.retain(|key, _| key.program != program);
        self.compute.remove(&program);
    }

    pub fn pipeline_count(&self) -> usize {
        self.render.len() + self.compute.len()
    }
}
