use crate::rendering::defs::{TextureFlags, TextureType};
use crate::rendering::device::RenderDevice;
use crate::rendering::texture::error::*;
use bon::Builder;
use tracing::warn;
use wgpu::{TextureAspect, TextureFormat, TextureUsages};

/// Highest sample count any texture may ask for.
pub const MAX_MULTI_SAMPLE: u32 = 16;

/// Everything a [`RawTexture`](super::RawTexture) is created from.
///
/// Creation normalizes these: dimensions are made consistent with the type, `num_levels == 0`
/// becomes the full chain, unsupported multisampling is demoted and `num_levels_rtv` is filled in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Builder)]
pub struct RawTextureParams {
    #[builder(default)]
    pub ty: TextureType,
    #[builder(default = TextureFormat::Rgba8Unorm)]
    pub format: TextureFormat,
    #[builder(default)]
    pub flags: TextureFlags,
    /// Width, height and depth in texels.
    pub size: (u32, u32, u32),
    #[builder(default = 1)]
    pub array_size: u32,
    /// 0 for the whole mip chain.
    #[builder(default)]
    pub num_levels: u32,
    #[builder(default = 1)]
    pub multi_sample: u32,
    /// Levels of the texture that gets rendered into. 1 for multisampled textures.
    #[builder(skip)]
    pub num_levels_rtv: u32,
}

impl Default for RawTextureParams {
    fn default() -> Self {
        Self::builder().size((0, 0, 0)).build()
    }
}

impl RawTextureParams {
    pub fn is_render_target(&self) -> bool {
        self.flags.contains(TextureFlags::BIND_RENDER_TARGET)
    }

    pub fn is_depth_stencil(&self) -> bool {
        self.flags.contains(TextureFlags::BIND_DEPTH_STENCIL)
    }

    pub fn is_unordered_access(&self) -> bool {
        self.flags.contains(TextureFlags::BIND_UNORDERED_ACCESS)
    }

    /// Whether a single-sampled companion texture is kept and resolved into.
    pub fn auto_resolves(&self) -> bool {
        self.multi_sample != 1 && !self.flags.contains(TextureFlags::NO_MULTI_SAMPLED_AUTO_RESOLVE)
    }
}

/// Number of levels in the full mip chain of `size`.
pub fn mip_level_count(size: (u32, u32, u32)) -> u32 {
    let (mut x, mut y, mut z) = size;
    let mut levels = 1;
    while x > 1 || y > 1 || z > 1 {
        levels += 1;
        x = (x >> 1).max(1);
        y = (y >> 1).max(1);
        z = (z >> 1).max(1);
    }
    levels
}

pub fn mip_level_size(size: (u32, u32, u32), level: u32) -> (u32, u32, u32) {
    let shrink = |v: u32| v.checked_shr(level).unwrap_or(0).max(1);
    (shrink(size.0), shrink(size.1), shrink(size.2))
}

/// Whether a non-empty region starting at `offset` lies within `level_size` on every axis.
pub fn region_fits(offset: (u32, u32, u32), size: (u32, u32, u32), level_size: (u32, u32, u32)) -> bool {
    let axis = |offset: u32, size: u32, limit: u32| size > 0 && offset.checked_add(size).is_some_and(|end| end <= limit);
    axis(offset.0, size.0, level_size.0) && axis(offset.1, size.1, level_size.1) && axis(offset.2, size.2, level_size.2)
}

/// Bytes one block of `format` takes, a block being one texel for uncompressed formats.
pub fn block_bytes(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Depth24PlusStencil8 | TextureFormat::Depth24Plus => 4,
        TextureFormat::Depth32FloatStencil8 => 8,
        _ => format
            .block_copy_size(None)
            .or_else(|| format.block_copy_size(Some(TextureAspect::DepthOnly)))
            .unwrap_or(4),
    }
}

/// Size in blocks of a region of `size` texels.
pub fn size_in_blocks(size: (u32, u32, u32), format: TextureFormat) -> (u32, u32, u32) {
    let (bw, bh) = format.block_dimensions();
    (size.0.div_ceil(bw), size.1.div_ceil(bh), size.2)
}

pub fn mip_level_size_in_bytes(size: (u32, u32, u32), level: u32, format: TextureFormat) -> u64 {
    let (x, y, z) = size_in_blocks(mip_level_size(size, level), format);
    x as u64 * y as u64 * z as u64 * block_bytes(format) as u64
}

pub(crate) fn validate_bindings(params: &RawTextureParams) -> Result<(), TextureError> {
    if params.is_render_target() && params.is_depth_stencil() {
        return ConflictingBindingsErr.fail();
    }
    Ok(())
}

pub(crate) fn validate_dimensions(params: &mut RawTextureParams) -> Result<(), TextureError> {
    let (x, y, z) = params.size;
    let valid = match params.ty {
        TextureType::Texture2D => x > 0 && y > 0,
        TextureType::TextureCube => x > 0,
        TextureType::Texture3D => x > 0 && y > 0 && z > 0,
        TextureType::Texture2DArray => x > 0 && y > 0 && params.array_size > 0,
    };

    if !valid {
        return InvalidDimensionsErr {
            ty: params.ty,
            width: x,
            height: y,
            depth: z,
            array_size: params.array_size,
        }
        .fail();
    }

    match params.ty {
        TextureType::Texture2D => {
            params.size.2 = 1;
            params.array_size = 1;
        }
        TextureType::TextureCube => {
            params.size = (x, x, 1);
            params.array_size = 6;
        }
        TextureType::Texture3D => params.array_size = 1,
        TextureType::Texture2DArray => params.size.2 = 1,
    }

    Ok(())
}

pub(crate) fn validate_multi_sample(params: &mut RawTextureParams) -> Result<(), TextureError> {
    params.multi_sample = params.multi_sample.clamp(1, MAX_MULTI_SAMPLE);
    if params.multi_sample == 1 {
        params.flags |= TextureFlags::NO_MULTI_SAMPLED_AUTO_RESOLVE;
    }

    if params.multi_sample != 1 && !(params.is_render_target() || params.is_depth_stencil()) {
        return MultiSampleWithoutTargetErr {
            multi_sample: params.multi_sample,
        }
        .fail();
    }

    Ok(())
}

pub(crate) fn validate_levels(params: &mut RawTextureParams) {
    let max_levels = mip_level_count(params.size);
    params.num_levels = match params.num_levels {
        0 => max_levels,
        requested => requested.min(max_levels),
    };

    if params.num_levels > 1 && params.is_depth_stencil() {
        warn!("Depth-stencil texture cannot have mipmaps");
        params.num_levels = 1;
    }

    if params.num_levels > 1
        && params.multi_sample != 1
        && params.flags.contains(TextureFlags::NO_MULTI_SAMPLED_AUTO_RESOLVE)
    {
        warn!("Multi-sampled texture cannot have mipmaps");
        params.num_levels = 1;
    }

    params.num_levels_rtv = if params.multi_sample != 1 {
        1
    } else {
        params.num_levels
    };
}

pub(crate) fn validate_caps<D: RenderDevice>(params: &mut RawTextureParams, device: &D) -> Result<(), TextureError> {
    if params.format == TextureFormat::Depth24PlusStencil8
        && !device.is_format_supported(params.format, TextureUsages::RENDER_ATTACHMENT)
    {
        warn!("Depth24PlusStencil8 is not supported, falling back to Depth32FloatStencil8");
        params.format = TextureFormat::Depth32FloatStencil8;
    }

    if params.multi_sample != 1 && !device.is_sample_count_supported(params.format, params.multi_sample) {
        warn!(
            "{}x multi-sampling is not supported for {:?}, demoting to simple texture",
            params.multi_sample, params.format
        );
        params.multi_sample = 1;
        params.num_levels_rtv = params.num_levels;
        params.flags |= TextureFlags::NO_MULTI_SAMPLED_AUTO_RESOLVE;
    }

    let bindings = [
        (params.is_render_target(), TextureUsages::RENDER_ATTACHMENT, "Render target"),
        (params.is_depth_stencil(), TextureUsages::RENDER_ATTACHMENT, "Depth-stencil"),
        (params.is_unordered_access(), TextureUsages::STORAGE_BINDING, "Unordered access"),
    ];

    for (requested, usage, binding) in bindings {
        if requested && !device.is_format_supported(params.format, usage) {
            warn!("{binding} binding is not supported for {:?}", params.format);
            return UnsupportedFormatErr {
                format: params.format,
                binding,
            }
            .fail();
        }
    }

    Ok(())
}

/// Validates and normalizes `params` in place, in the order bindings, dimensions,
/// multisampling, levels, device capabilities.
pub fn validate_params<D: RenderDevice>(params: &mut RawTextureParams, device: &D) -> Result<(), TextureError> {
    validate_bindings(params)?;
    validate_dimensions(params)?;
    validate_multi_sample(params)?;
    validate_levels(params);
    validate_caps(params, device)
}
