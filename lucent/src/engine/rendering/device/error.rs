use crate::rendering::shader::ShaderTarget;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
#[snafu(visibility(pub(crate)))]
pub enum DeviceError {
    #[snafu(display("Failed to create {kind} '{label}': {reason}"))]
    Creation {
        kind: &'static str,
        label: String,
        reason: String,
    },

    #[snafu(display("The render device cannot consume {target} shaders"))]
    UnsupportedBytecode { target: ShaderTarget },

    #[snafu(display("Failed to map readback buffer: {source:?}"))]
    Map { source: wgpu::BufferAsyncError },

    #[snafu(display("Failed to map readback buffer: channel closed"))]
    MapChannelClosed,

    #[snafu(display("No pipeline is set, or it has no bind group {group}"))]
    MissingBindGroupLayout { group: u32 },

    #[snafu(display("Cannot generate mips for {format:?} textures"))]
    UnsupportedMipFormat { format: wgpu::TextureFormat },
}
