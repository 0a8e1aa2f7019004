use crate::rendering::defs::{PrimitiveType, ShaderType, MAX_RENDER_TARGETS};
use crate::rendering::device::DeviceError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    #[snafu(display("Pipeline '{name}' has no vertex shader"))]
    MissingVertexShader { name: String },

    #[snafu(display("Pipeline '{name}' has no compute shader"))]
    MissingComputeShader { name: String },

    #[snafu(display(
        "Pipeline '{name}' renders into {count} targets, at most {MAX_RENDER_TARGETS} are supported"
    ))]
    TooManyRenderTargets { name: String, count: usize },

    #[snafu(display("Pipeline '{name}' uses primitive type {primitive:?} which no backend supports"))]
    UnsupportedTopology { name: String, primitive: PrimitiveType },

    #[snafu(display("Pipeline '{name}' uses a {stage} shader which no backend supports"))]
    UnsupportedStage { name: String, stage: ShaderType },

    #[snafu(display("Failed to create pipeline '{name}' #{hash}: {source}"))]
    Device {
        name: String,
        hash: u64,
        source: DeviceError,
    },
}
