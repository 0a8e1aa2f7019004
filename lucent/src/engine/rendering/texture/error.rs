use crate::rendering::defs::TextureType;
use crate::rendering::device::DeviceError;
use snafu::Snafu;
use wgpu::TextureFormat;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
#[snafu(visibility(pub(crate)))]
pub enum TextureError {
    #[snafu(display("Invalid {ty:?} dimensions {width}x{height}x{depth} with {array_size} slices"))]
    InvalidDimensions {
        ty: TextureType,
        width: u32,
        height: u32,
        depth: u32,
        array_size: u32,
    },

    #[snafu(display("Texture cannot be both render target and depth-stencil"))]
    ConflictingBindings,

    #[snafu(display(
        "Multi-sampling ({multi_sample}x) is only supported for render target or depth-stencil textures"
    ))]
    MultiSampleWithoutTarget { multi_sample: u32 },

    #[snafu(display("{binding} binding is not supported for {format:?}"))]
    UnsupportedFormat {
        format: TextureFormat,
        binding: &'static str,
    },

    #[snafu(display("Texture '{name}' has no device object"))]
    Uninitialized { name: String },

    #[snafu(display("Failed to create texture '{name}': {source}"))]
    Device { name: String, source: DeviceError },

    #[snafu(display("Mip level {level} is out of range, the texture has {levels}"))]
    InvalidLevel { level: u32, levels: u32 },

    #[snafu(display("Array slice {slice} is out of range, the texture has {slices}"))]
    InvalidSlice { slice: u32, slices: u32 },

    #[snafu(display("Region {offset:?}+{size:?} doesn't fit into level {level} of size {level_size:?}"))]
    RegionOutOfBounds {
        level: u32,
        offset: (u32, u32, u32),
        size: (u32, u32, u32),
        level_size: (u32, u32, u32),
    },

    #[snafu(display("Region offset {offset:?} is not aligned to the {block:?} block size of {format:?}"))]
    MisalignedRegion {
        format: TextureFormat,
        offset: (u32, u32),
        block: (u32, u32),
    },

    #[snafu(display("Buffer of {got} bytes is too small, {needed} bytes are needed"))]
    BufferTooSmall { needed: u64, got: u64 },

    #[snafu(display("Invalid unordered access view key: {reason}"))]
    InvalidUavKey { reason: &'static str },
}
