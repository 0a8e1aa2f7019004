use crate::rendering::defs::{MAX_RENDER_TARGETS, PipelineStateType, SamplerStateDesc, ShaderType};
use crate::rendering::device::{
    RealizedGraphicsPipeline, RealizedPipelineDesc, RealizedPipelineKind, RenderDevice, StageModule,
};
use crate::rendering::pipeline::desc::{ComputePipelineStateDesc, GraphicsPipelineStateDesc, PipelineStateDesc};
use crate::rendering::pipeline::error::*;
use crate::rendering::pipeline::translate::*;
use crate::rendering::reflection::ShaderProgramReflection;
use crate::rendering::shader::CompiledShader;
use crate::rendering::vertex_layout::{resolve_input_layout_after, vertex_buffer_descs, ResolvedVertexAttribute};
use snafu::{OptionExt, ResultExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};
use wgpu::{
    BindGroupLayoutEntry, ColorTargetState, ColorWrites, DepthBiasState, DepthStencilState, FrontFace, MultisampleState,
    PrimitiveState, PrimitiveTopology, StencilFaceState, StencilState,
};

struct Realized<D: RenderDevice> {
    handle: D::Pipeline,
    samplers: HashMap<String, D::Sampler>,
}

/// A built pipeline: the descriptor it came from, the reflection of its shaders and the device
/// object.
///
/// The device object can be dropped with [`invalidate`](Self::invalidate) and recreated from the
/// stored descriptor with [`restore`](Self::restore). The reflection stays valid throughout.
pub struct PipelineState<D: RenderDevice> {
    desc: PipelineStateDesc,
    hash: u64,
    debug_name: String,
    reflection: ShaderProgramReflection,
    vertex_layout: Vec<ResolvedVertexAttribute>,
    realized: RwLock<Option<Realized<D>>>,
}

fn primary_shader(desc: &PipelineStateDesc) -> Result<&CompiledShader, PipelineError> {
    let name = desc.debug_name();
    match desc {
        PipelineStateDesc::Graphics(graphics) => graphics
            .vertex_shader
            .as_deref()
            .context(MissingVertexShaderErr { name }),
        PipelineStateDesc::Compute(compute) => compute
            .compute_shader
            .as_deref()
            .context(MissingComputeShaderErr { name }),
    }
}

fn validate(desc: &PipelineStateDesc) -> Result<(), PipelineError> {
    let name = desc.debug_name();
    primary_shader(desc)?;

    for shader in desc.shaders() {
        if shader.stage().naga_stage().is_none() {
            return UnsupportedStageErr {
                name,
                stage: shader.stage(),
            }
            .fail();
        }
    }

    if let PipelineStateDesc::Graphics(graphics) = desc {
        let count = graphics.output.render_target_formats.len();
        if count > MAX_RENDER_TARGETS {
            return TooManyRenderTargetsErr { name, count }.fail();
        }
        if primitive_topology(graphics.primitive_type).is_none() {
            return UnsupportedTopologyErr {
                name,
                primitive: graphics.primitive_type,
            }
            .fail();
        }
    }

    Ok(())
}

fn is_triangles(topology: PrimitiveTopology) -> bool {
    matches!(topology, PrimitiveTopology::TriangleList | PrimitiveTopology::TriangleStrip)
}

fn primitive_state(desc: &GraphicsPipelineStateDesc, topology: PrimitiveTopology) -> PrimitiveState {
    PrimitiveState {
        topology,
        strip_index_format: None,
        front_face: FrontFace::Cw,
        cull_mode: cull_face(desc.cull_mode),
        unclipped_depth: false,
        polygon_mode: polygon_mode(desc.fill_mode),
        conservative: false,
    }
}

fn depth_stencil_state(desc: &GraphicsPipelineStateDesc, topology: PrimitiveTopology) -> Option<DepthStencilState> {
    let format = desc.output.depth_stencil_format?;

    let stencil = if desc.stencil_test && format.has_stencil_aspect() {
        let face = StencilFaceState {
            compare: compare_function(desc.stencil_compare),
            fail_op: stencil_operation(desc.stencil_op_on_stencil_failed),
            depth_fail_op: stencil_operation(desc.stencil_op_on_depth_failed),
            pass_op: stencil_operation(desc.stencil_op_on_passed),
        };
        StencilState {
            front: face,
            back: face,
            read_mask: desc.stencil_compare_mask,
            write_mask: desc.stencil_write_mask,
        }
    } else {
        StencilState::default()
    };

    let bias = if is_triangles(topology) {
        DepthBiasState {
            constant: depth_bias(desc.constant_depth_bias, Some(format)),
            slope_scale: desc.slope_scaled_depth_bias,
            clamp: 0.0,
        }
    } else {
        DepthBiasState::default()
    };

    Some(DepthStencilState {
        format,
        depth_write_enabled: desc.depth_write && !desc.read_only_depth,
        depth_compare: compare_function(desc.depth_compare),
        stencil,
        bias,
    })
}

fn color_targets(desc: &GraphicsPipelineStateDesc) -> Vec<Option<ColorTargetState>> {
    let blend = blend_state(desc.blend_mode);
    let write_mask = if desc.color_write {
        ColorWrites::ALL
    } else {
        ColorWrites::empty()
    };

    desc.output
        .render_target_formats
        .iter()
        .map(|&format| {
            Some(ColorTargetState {
                format,
                blend,
                write_mask,
            })
        })
        .collect()
}

impl<D: RenderDevice> PipelineState<D> {
    /// Validates and reflects `desc`, then creates the device object.
    pub(crate) fn new(device: &D, desc: PipelineStateDesc, hash: u64) -> Result<Self, PipelineError> {
        validate(&desc)?;

        let stages: Vec<&CompiledShader> = desc.shaders().into_iter().map(|s| s.as_ref()).collect();
        let reflection = ShaderProgramReflection::new(&stages);

        let vertex_layout = match &desc {
            PipelineStateDesc::Graphics(graphics) => {
                let vertex = primary_shader(&desc)?;
                resolve_input_layout_after(
                    &vertex.reflection().vertex_attributes,
                    &graphics.input_layout.elements,
                    vertex.reflection().input_locations_end,
                )
            }
            PipelineStateDesc::Compute(_) => Vec::new(),
        };

        let state = Self {
            debug_name: format!("{}#{hash}", desc.debug_name()),
            desc,
            hash,
            reflection,
            vertex_layout,
            realized: RwLock::new(None),
        };

        let realized = state.realize(device)?;
        *state.write() = Some(realized);

        Ok(state)
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Realized<D>>> {
        self.realized.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Realized<D>>> {
        self.realized.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn device_err(&self) -> DeviceErr<&str, u64> {
        DeviceErr {
            name: self.desc.debug_name(),
            hash: self.hash,
        }
    }

    fn module(&self, device: &D, shader: &CompiledShader) -> Result<D::ShaderModule, PipelineError> {
        device.create_shader_module(shader).context(self.device_err())
    }

    fn create_samplers(&self, device: &D) -> Result<HashMap<String, D::Sampler>, PipelineError> {
        let declared = match &self.desc {
            PipelineStateDesc::Graphics(desc) => &desc.samplers,
            PipelineStateDesc::Compute(desc) => &desc.samplers,
        };

        let mut samplers = HashMap::new();
        for (name, resource) in self.reflection.shader_resources() {
            if resource.sampler_bindings.is_empty() {
                continue;
            }

            let sampler = match declared.get(name) {
                Some(sampler) => *sampler,
                None => {
                    warn!("Default sampler is used for resource '{}'", resource.internal_name);
                    SamplerStateDesc::bilinear()
                }
            };

            let label = format!("{}:{name}", self.debug_name);
            let handle = device.create_sampler(&label, &sampler).context(self.device_err())?;
            samplers.insert(name.to_string(), handle);
        }

        Ok(samplers)
    }

    fn realize(&self, device: &D) -> Result<Realized<D>, PipelineError> {
        let bind_group_layouts = self.reflection.bind_group_layouts();

        let handle = match &self.desc {
            PipelineStateDesc::Graphics(desc) => self.realize_graphics(device, desc, &bind_group_layouts)?,
            PipelineStateDesc::Compute(desc) => self.realize_compute(device, desc, &bind_group_layouts)?,
        };
        let samplers = self.create_samplers(device)?;

        debug!("Created pipeline {}", self.debug_name);
        Ok(Realized { handle, samplers })
    }

    fn realize_graphics(
        &self,
        device: &D,
        desc: &GraphicsPipelineStateDesc,
        bind_group_layouts: &BTreeMap<u32, Vec<BindGroupLayoutEntry>>,
    ) -> Result<D::Pipeline, PipelineError> {
        let name = desc.debug_name.as_str();
        let vertex_shader = desc
            .vertex_shader
            .as_deref()
            .context(MissingVertexShaderErr { name })?;
        let topology = primitive_topology(desc.primitive_type).context(UnsupportedTopologyErr {
            name,
            primitive: desc.primitive_type,
        })?;

        let vertex_module = self.module(device, vertex_shader)?;
        let pixel_module = desc
            .pixel_shader
            .as_deref()
            .map(|shader| self.module(device, shader).map(|module| (module, shader)))
            .transpose()?;

        let vertex_buffers = vertex_buffer_descs(&self.vertex_layout);
        let color_targets = color_targets(desc);

        let graphics = RealizedGraphicsPipeline {
            vertex: StageModule {
                module: &vertex_module,
                entry_point: vertex_shader.entry_point(),
            },
            fragment: pixel_module.as_ref().map(|(module, shader)| StageModule {
                module,
                entry_point: shader.entry_point(),
            }),
            vertex_buffers: &vertex_buffers,
            primitive: primitive_state(desc, topology),
            depth_stencil: depth_stencil_state(desc, topology),
            multisample: MultisampleState {
                count: desc.output.multi_sample.max(1),
                mask: !0,
                alpha_to_coverage_enabled: desc.alpha_to_coverage,
            },
            color_targets: &color_targets,
        };

        device
            .create_pipeline(&RealizedPipelineDesc {
                label: &self.debug_name,
                kind: RealizedPipelineKind::Graphics(graphics),
                bind_group_layouts,
            })
            .context(self.device_err())
    }

    fn realize_compute(
        &self,
        device: &D,
        desc: &ComputePipelineStateDesc,
        bind_group_layouts: &BTreeMap<u32, Vec<BindGroupLayoutEntry>>,
    ) -> Result<D::Pipeline, PipelineError> {
        let shader = desc
            .compute_shader
            .as_deref()
            .context(MissingComputeShaderErr {
                name: desc.debug_name.as_str(),
            })?;
        let module = self.module(device, shader)?;

        device
            .create_pipeline(&RealizedPipelineDesc {
                label: &self.debug_name,
                kind: RealizedPipelineKind::Compute(StageModule {
                    module: &module,
                    entry_point: shader.entry_point(),
                }),
                bind_group_layouts,
            })
            .context(self.device_err())
    }

    pub fn desc(&self) -> &PipelineStateDesc {
        &self.desc
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// `"{debug name}#{structural hash}"`, the label the device object carries.
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn pipeline_type(&self) -> PipelineStateType {
        self.desc.pipeline_type()
    }

    pub fn reflection(&self) -> &ShaderProgramReflection {
        &self.reflection
    }

    pub fn vertex_layout(&self) -> &[ResolvedVertexAttribute] {
        &self.vertex_layout
    }

    /// The device object, `None` while invalidated.
    pub fn handle(&self) -> Option<D::Pipeline> {
        self.read().as_ref().map(|r| r.handle.clone())
    }

    /// Sampler created for the shader resource `name`.
    pub fn sampler(&self, name: &str) -> Option<D::Sampler> {
        self.read().as_ref().and_then(|r| r.samplers.get(name).cloned())
    }

    pub fn is_valid(&self) -> bool {
        self.read().is_some()
    }

    /// Drops the device object. The descriptor and reflection are kept for [`restore`](Self::restore).
    pub fn invalidate(&self) {
        self.write().take();
    }

    /// Recreates the device object if it was invalidated.
    pub fn restore(&self, device: &D) -> Result<(), PipelineError> {
        if self.is_valid() {
            return Ok(());
        }

        let realized = self.realize(device)?;
        *self.write() = Some(realized);
        Ok(())
    }

    /// Shader bound to `stage`, if any.
    pub fn shader(&self, stage: ShaderType) -> Option<&CompiledShader> {
        match &self.desc {
            PipelineStateDesc::Graphics(desc) => match stage {
                ShaderType::Vertex => desc.vertex_shader.as_deref(),
                ShaderType::Pixel => desc.pixel_shader.as_deref(),
                ShaderType::Geometry => desc.geometry_shader.as_deref(),
                ShaderType::Hull => desc.hull_shader.as_deref(),
                ShaderType::Domain => desc.domain_shader.as_deref(),
                ShaderType::Compute => None,
            },
            PipelineStateDesc::Compute(desc) => match stage {
                ShaderType::Compute => desc.compute_shader.as_deref(),
                _ => None,
            },
        }
    }
}

impl<D: RenderDevice> std::fmt::Debug for PipelineState<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineState")
            .field("debug_name", &self.debug_name)
            .field("type", &self.pipeline_type())
            .field("valid", &self.is_valid())
            .finish()
    }
}
