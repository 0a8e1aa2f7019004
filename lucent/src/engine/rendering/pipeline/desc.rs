use crate::rendering::defs::{
    BlendMode, CompareMode, CullMode, FillMode, InputLayoutDesc, MAX_RENDER_TARGETS, PipelineStateType,
    PrimitiveType, SamplerStateDesc, StencilOp,
};
use crate::rendering::shader::CompiledShader;
use bon::Builder;
use lucent_utils::StableHasher;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use wgpu::TextureFormat;

pub type RenderTargetFormats = SmallVec<[TextureFormat; MAX_RENDER_TARGETS]>;

/// Formats of the attachments a graphics pipeline renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineStateOutputDesc {
    pub depth_stencil_format: Option<TextureFormat>,
    pub render_target_formats: RenderTargetFormats,
    pub multi_sample: u32,
}

impl Default for PipelineStateOutputDesc {
    fn default() -> Self {
        Self {
            depth_stencil_format: None,
            render_target_formats: SmallVec::new(),
            multi_sample: 1,
        }
    }
}

impl PipelineStateOutputDesc {
    pub fn new(depth_stencil_format: Option<TextureFormat>, render_target_formats: &[TextureFormat]) -> Self {
        Self {
            depth_stencil_format,
            render_target_formats: render_target_formats.iter().copied().collect(),
            multi_sample: 1,
        }
    }
}

/// Everything a graphics pipeline is built from.
///
/// Only the vertex shader is required. The debug name doesn't take part in the structural hash.
#[derive(Debug, Clone, Builder)]
pub struct GraphicsPipelineStateDesc {
    #[builder(into, default)]
    pub debug_name: String,

    pub vertex_shader: Option<Arc<CompiledShader>>,
    pub pixel_shader: Option<Arc<CompiledShader>>,
    pub geometry_shader: Option<Arc<CompiledShader>>,
    pub hull_shader: Option<Arc<CompiledShader>>,
    pub domain_shader: Option<Arc<CompiledShader>>,

    /// Elements the vertex buffers provide.
    #[builder(default)]
    pub input_layout: InputLayoutDesc,
    #[builder(default)]
    pub primitive_type: PrimitiveType,

    #[builder(default = true)]
    pub color_write: bool,
    #[builder(default)]
    pub blend_mode: BlendMode,
    #[builder(default)]
    pub alpha_to_coverage: bool,
    /// Accepted for compatibility, no backend rasterizes antialiased lines.
    #[builder(default)]
    pub line_anti_alias: bool,

    #[builder(default)]
    pub fill_mode: FillMode,
    #[builder(default)]
    pub cull_mode: CullMode,
    /// Normalized, scaled by the depth buffer precision when realized.
    #[builder(default)]
    pub constant_depth_bias: f32,
    #[builder(default)]
    pub slope_scaled_depth_bias: f32,

    #[builder(default = true)]
    pub depth_write: bool,
    #[builder(default = CompareMode::LessEqual)]
    pub depth_compare: CompareMode,
    #[builder(default)]
    pub stencil_test: bool,
    #[builder(default)]
    pub stencil_compare: CompareMode,
    #[builder(default)]
    pub stencil_op_on_passed: StencilOp,
    #[builder(default)]
    pub stencil_op_on_stencil_failed: StencilOp,
    #[builder(default)]
    pub stencil_op_on_depth_failed: StencilOp,
    #[builder(default = 0xff)]
    pub stencil_compare_mask: u32,
    #[builder(default = 0xff)]
    pub stencil_write_mask: u32,
    #[builder(default)]
    pub scissor_test: bool,

    /// Depth is bound read-only, depth writes are forced off.
    #[builder(default)]
    pub read_only_depth: bool,
    #[builder(default)]
    pub output: PipelineStateOutputDesc,

    /// Immutable samplers by resource name.
    #[builder(default)]
    pub samplers: BTreeMap<String, SamplerStateDesc>,
}

impl Default for GraphicsPipelineStateDesc {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn hash_shader<H: Hasher>(shader: &Option<Arc<CompiledShader>>, state: &mut H) {
    shader.as_ref().map(|s| s.hash()).hash(state);
}

impl GraphicsPipelineStateDesc {
    /// Every shader the pipeline was given, in stage order.
    pub fn shaders(&self) -> impl Iterator<Item = &Arc<CompiledShader>> {
        [
            &self.vertex_shader,
            &self.pixel_shader,
            &self.geometry_shader,
            &self.hull_shader,
            &self.domain_shader,
        ]
        .into_iter()
        .flatten()
    }
}

impl Hash for GraphicsPipelineStateDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_shader(&self.vertex_shader, state);
        hash_shader(&self.pixel_shader, state);
        hash_shader(&self.geometry_shader, state);
        hash_shader(&self.hull_shader, state);
        hash_shader(&self.domain_shader, state);

        self.input_layout.hash(state);
        self.primitive_type.hash(state);

        self.color_write.hash(state);
        self.blend_mode.hash(state);
        self.alpha_to_coverage.hash(state);
        self.line_anti_alias.hash(state);

        self.fill_mode.hash(state);
        self.cull_mode.hash(state);
        self.constant_depth_bias.to_bits().hash(state);
        self.slope_scaled_depth_bias.to_bits().hash(state);

        self.depth_write.hash(state);
        self.depth_compare.hash(state);
        self.stencil_test.hash(state);
        self.stencil_compare.hash(state);
        self.stencil_op_on_passed.hash(state);
        self.stencil_op_on_stencil_failed.hash(state);
        self.stencil_op_on_depth_failed.hash(state);
        self.stencil_compare_mask.hash(state);
        self.stencil_write_mask.hash(state);
        self.scissor_test.hash(state);

        self.read_only_depth.hash(state);
        self.output.hash(state);
        self.samplers.hash(state);
    }
}

#[derive(Debug, Clone, Default, Builder)]
pub struct ComputePipelineStateDesc {
    #[builder(into, default)]
    pub debug_name: String,
    pub compute_shader: Option<Arc<CompiledShader>>,
    #[builder(default)]
    pub samplers: BTreeMap<String, SamplerStateDesc>,
}

impl Hash for ComputePipelineStateDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_shader(&self.compute_shader, state);
        self.samplers.hash(state);
    }
}

#[derive(Debug, Clone, Hash)]
pub enum PipelineStateDesc {
    Graphics(GraphicsPipelineStateDesc),
    Compute(ComputePipelineStateDesc),
}

impl PipelineStateDesc {
    pub fn pipeline_type(&self) -> PipelineStateType {
        match self {
            PipelineStateDesc::Graphics(_) => PipelineStateType::Graphics,
            PipelineStateDesc::Compute(_) => PipelineStateType::Compute,
        }
    }

    pub fn debug_name(&self) -> &str {
        match self {
            PipelineStateDesc::Graphics(desc) => &desc.debug_name,
            PipelineStateDesc::Compute(desc) => &desc.debug_name,
        }
    }

    pub fn as_graphics(&self) -> Option<&GraphicsPipelineStateDesc> {
        match self {
            PipelineStateDesc::Graphics(desc) => Some(desc),
            PipelineStateDesc::Compute(_) => None,
        }
    }

    pub fn as_compute(&self) -> Option<&ComputePipelineStateDesc> {
        match self {
            PipelineStateDesc::Compute(desc) => Some(desc),
            PipelineStateDesc::Graphics(_) => None,
        }
    }

    /// Every shader of the pipeline.
    pub fn shaders(&self) -> Vec<&Arc<CompiledShader>> {
        match self {
            PipelineStateDesc::Graphics(desc) => desc.shaders().collect(),
            PipelineStateDesc::Compute(desc) => desc.compute_shader.iter().collect(),
        }
    }

    pub fn uses_shader(&self, hash: u64) -> bool {
        self.shaders().iter().any(|shader| shader.hash() == hash)
    }

    /// Structural hash of every field except the debug name, stable across runs.
    pub fn to_hash(&self) -> u64 {
        let mut hasher = StableHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl From<GraphicsPipelineStateDesc> for PipelineStateDesc {
    fn from(desc: GraphicsPipelineStateDesc) -> Self {
        PipelineStateDesc::Graphics(desc)
    }
}

impl From<ComputePipelineStateDesc> for PipelineStateDesc {
    fn from(desc: ComputePipelineStateDesc) -> Self {
        PipelineStateDesc::Compute(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_name_does_not_change_the_hash() {
        let a = PipelineStateDesc::from(GraphicsPipelineStateDesc::builder().debug_name("a").build());
        let b = PipelineStateDesc::from(GraphicsPipelineStateDesc::builder().debug_name("b").build());
        assert_eq!(a.to_hash(), b.to_hash());
        assert_eq!(a.debug_name(), "a");
    }

    #[test]
    fn state_changes_change_the_hash() {
        let base = GraphicsPipelineStateDesc::default();
        let hash = |desc: &GraphicsPipelineStateDesc| PipelineStateDesc::from(desc.clone()).to_hash();

        let mut biased = base.clone();
        biased.constant_depth_bias = 0.001;
        assert_ne!(hash(&base), hash(&biased));

        let mut blended = base.clone();
        blended.blend_mode = BlendMode::Alpha;
        assert_ne!(hash(&base), hash(&blended));

        let mut output = base.clone();
        output.output.depth_stencil_format = Some(TextureFormat::Depth32Float);
        assert_ne!(hash(&base), hash(&output));

        let mut sampled = base.clone();
        sampled.samplers.insert("DiffMap".into(), SamplerStateDesc::trilinear());
        assert_ne!(hash(&base), hash(&sampled));

        assert_eq!(hash(&base), hash(&GraphicsPipelineStateDesc::default()));
    }

    #[test]
    fn graphics_and_compute_never_collide() {
        let graphics = PipelineStateDesc::from(GraphicsPipelineStateDesc::default());
        let compute = PipelineStateDesc::from(ComputePipelineStateDesc::default());
        assert_ne!(graphics.to_hash(), compute.to_hash());
        assert_eq!(compute.pipeline_type(), PipelineStateType::Compute);
        assert!(compute.as_graphics().is_none());
    }

    #[test]
    fn defaults_match_common_opaque_state() {
        let desc = GraphicsPipelineStateDesc::default();
        assert!(desc.color_write);
        assert!(desc.depth_write);
        assert_eq!(desc.depth_compare, CompareMode::LessEqual);
        assert_eq!(desc.stencil_write_mask, 0xff);
        assert_eq!(desc.output.multi_sample, 1);
        assert_eq!(desc.shaders().count(), 0);
    }
}
