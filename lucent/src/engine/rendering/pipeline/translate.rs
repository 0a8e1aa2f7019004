//! Fixed lookup tables from engine-level state enums to `wgpu` values.

use crate::rendering::defs::{
    BlendMode, CompareMode, CullMode, FillMode, PrimitiveType, SamplerStateDesc, StencilOp,
    TextureAddressMode, TextureFilterMode,
};
use crate::rendering::device::RenderDeviceSettings;
use wgpu::{
    AddressMode, BlendComponent, BlendFactor, BlendOperation, BlendState, CompareFunction, Face,
    FilterMode, PolygonMode, PrimitiveTopology, SamplerDescriptor, StencilOperation, TextureFormat,
};

const BLEND_MODES: usize = 10;

const IS_BLEND_ENABLED: [bool; BLEND_MODES] = [
    false, // Replace
    true,  // Add
    true,  // Multiply
    true,  // Alpha
    true,  // AddAlpha
    true,  // PremulAlpha
    true,  // InvDestAlpha
    true,  // Subtract
    true,  // SubtractAlpha
    true,  // DeferredDecal
];

const SOURCE_BLEND: [BlendFactor; BLEND_MODES] = [
    BlendFactor::One,
    BlendFactor::One,
    BlendFactor::Dst,
    BlendFactor::SrcAlpha,
    BlendFactor::SrcAlpha,
    BlendFactor::One,
    BlendFactor::OneMinusDstAlpha,
    BlendFactor::One,
    BlendFactor::SrcAlpha,
    BlendFactor::SrcAlpha,
];

const DEST_BLEND: [BlendFactor; BLEND_MODES] = [
    BlendFactor::Zero,
    BlendFactor::One,
    BlendFactor::Zero,
    BlendFactor::OneMinusSrcAlpha,
    BlendFactor::One,
    BlendFactor::OneMinusSrcAlpha,
    BlendFactor::DstAlpha,
    BlendFactor::One,
    BlendFactor::One,
    BlendFactor::OneMinusSrcAlpha,
];

const SOURCE_ALPHA_BLEND: [BlendFactor; BLEND_MODES] = [
    BlendFactor::One,
    BlendFactor::One,
    BlendFactor::Dst,
    BlendFactor::SrcAlpha,
    BlendFactor::SrcAlpha,
    BlendFactor::One,
    BlendFactor::OneMinusDstAlpha,
    BlendFactor::One,
    BlendFactor::SrcAlpha,
    BlendFactor::Zero,
];

const DEST_ALPHA_BLEND: [BlendFactor; BLEND_MODES] = [
    BlendFactor::Zero,
    BlendFactor::One,
    BlendFactor::Zero,
    BlendFactor::OneMinusSrcAlpha,
    BlendFactor::One,
    BlendFactor::OneMinusSrcAlpha,
    BlendFactor::DstAlpha,
    BlendFactor::One,
    BlendFactor::One,
    BlendFactor::One,
];

const BLEND_OPERATION: [BlendOperation; BLEND_MODES] = [
    BlendOperation::Add,
    BlendOperation::Add,
    BlendOperation::Add,
    BlendOperation::Add,
    BlendOperation::Add,
    BlendOperation::Add,
    BlendOperation::Add,
    BlendOperation::ReverseSubtract,
    BlendOperation::ReverseSubtract,
    BlendOperation::Add,
];

const COMPARE_FUNCTION: [CompareFunction; 7] = [
    CompareFunction::Always,
    CompareFunction::Equal,
    CompareFunction::NotEqual,
    CompareFunction::Less,
    CompareFunction::LessEqual,
    CompareFunction::Greater,
    CompareFunction::GreaterEqual,
];

const STENCIL_OPERATION: [StencilOperation; 5] = [
    StencilOperation::Keep,
    StencilOperation::Zero,
    StencilOperation::Replace,
    StencilOperation::IncrementWrap,
    StencilOperation::DecrementWrap,
];

const CULL_FACE: [Option<Face>; 3] = [None, Some(Face::Back), Some(Face::Front)];

const POLYGON_MODE: [PolygonMode; 3] = [
    PolygonMode::Fill,
    PolygonMode::Line,
    PolygonMode::Line, // points are not supported
];

const PRIMITIVE_TOPOLOGY: [Option<PrimitiveTopology>; 6] = [
    Some(PrimitiveTopology::TriangleList),
    Some(PrimitiveTopology::LineList),
    Some(PrimitiveTopology::PointList),
    Some(PrimitiveTopology::TriangleStrip),
    Some(PrimitiveTopology::LineStrip),
    None, // triangle fans are not supported
];

/// Min/mag and mip filter per filter mode.
const FILTERS: [(FilterMode, FilterMode); 5] = [
    (FilterMode::Nearest, FilterMode::Nearest), // Nearest
    (FilterMode::Linear, FilterMode::Nearest),  // Bilinear
    (FilterMode::Linear, FilterMode::Linear),   // Trilinear
    (FilterMode::Linear, FilterMode::Linear),   // Anisotropic
    (FilterMode::Nearest, FilterMode::Linear),  // NearestAnisotropic
];

const ADDRESS_MODE: [AddressMode; 3] = [
    AddressMode::Repeat,
    AddressMode::MirrorRepeat,
    AddressMode::ClampToEdge,
];

/// Blend state of every color target, `None` when blending is off.
pub fn blend_state(mode: BlendMode) -> Option<BlendState> {
    let i = mode as usize;
    IS_BLEND_ENABLED[i].then(|| BlendState {
        color: BlendComponent {
            src_factor: SOURCE_BLEND[i],
            dst_factor: DEST_BLEND[i],
            operation: BLEND_OPERATION[i],
        },
        alpha: BlendComponent {
            src_factor: SOURCE_ALPHA_BLEND[i],
            dst_factor: DEST_ALPHA_BLEND[i],
            operation: BLEND_OPERATION[i],
        },
    })
}

pub fn compare_function(mode: CompareMode) -> CompareFunction {
    COMPARE_FUNCTION[mode as usize]
}

pub fn stencil_operation(op: StencilOp) -> StencilOperation {
    STENCIL_OPERATION[op as usize]
}

/// Face to cull. Front faces wind clockwise.
pub fn cull_face(mode: CullMode) -> Option<Face> {
    CULL_FACE[mode as usize]
}

pub fn polygon_mode(mode: FillMode) -> PolygonMode {
    POLYGON_MODE[mode as usize]
}

pub fn primitive_topology(ty: PrimitiveType) -> Option<PrimitiveTopology> {
    PRIMITIVE_TOPOLOGY[ty as usize]
}

/// Scales a normalized constant depth bias by the resolution of the depth format.
pub fn depth_bias(bias: f32, format: Option<TextureFormat>) -> i32 {
    let bits = match format {
        Some(TextureFormat::Depth16Unorm) => 16,
        _ => 24,
    };
    (bias * (1u32 << bits) as f32) as i32
}

pub fn address_mode(mode: TextureAddressMode) -> AddressMode {
    ADDRESS_MODE[mode as usize]
}

/// Resolves [`TextureFilterMode::Default`] against the device settings.
pub fn effective_filter_mode(mode: TextureFilterMode, settings: &RenderDeviceSettings) -> TextureFilterMode {
    match (mode, settings.default_filter_mode) {
        (TextureFilterMode::Default, TextureFilterMode::Default) => TextureFilterMode::Trilinear,
        (TextureFilterMode::Default, default) => default,
        (mode, _) => mode,
    }
}

pub fn sampler_descriptor<'a>(
    label: &'a str,
    desc: &SamplerStateDesc,
    settings: &RenderDeviceSettings,
) -> SamplerDescriptor<'a> {
    let filter_mode = effective_filter_mode(desc.filter_mode, settings);
    let (min_mag, mip) = FILTERS[filter_mode as usize];

    let anisotropy = if desc.anisotropy != 0 {
        desc.anisotropy
    } else {
        settings.default_anisotropy
    };
    // Anisotropic filtering needs every filter to be linear.
    let anisotropy_clamp = match filter_mode {
        TextureFilterMode::Anisotropic => anisotropy.clamp(1, 16) as u16,
        _ => 1,
    };

    SamplerDescriptor {
        label: Some(label),
        address_mode_u: address_mode(desc.address_mode[0]),
        address_mode_v: address_mode(desc.address_mode[1]),
        address_mode_w: address_mode(desc.address_mode[2]),
        mag_filter: min_mag,
        min_filter: min_mag,
        mipmap_filter: mip,
        lod_min_clamp: 0.0,
        lod_max_clamp: 32.0,
        compare: desc.shadow_compare.then_some(CompareFunction::LessEqual),
        anisotropy_clamp,
        border_color: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_tables_follow_blend_mode_order() {
        assert_eq!(blend_state(BlendMode::Replace), None);

        let alpha = blend_state(BlendMode::Alpha).unwrap();
        assert_eq!(alpha.color.src_factor, BlendFactor::SrcAlpha);
        assert_eq!(alpha.color.dst_factor, BlendFactor::OneMinusSrcAlpha);

        let subtract = blend_state(BlendMode::Subtract).unwrap();
        assert_eq!(subtract.color.operation, BlendOperation::ReverseSubtract);
        assert_eq!(subtract.alpha.operation, BlendOperation::ReverseSubtract);

        let decal = blend_state(BlendMode::DeferredDecal).unwrap();
        assert_eq!(decal.color.dst_factor, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(decal.alpha.src_factor, BlendFactor::Zero);
        assert_eq!(decal.alpha.dst_factor, BlendFactor::One);
    }

    #[test]
    fn raster_tables() {
        assert_eq!(cull_face(CullMode::Ccw), Some(Face::Back));
        assert_eq!(cull_face(CullMode::Cw), Some(Face::Front));
        assert_eq!(polygon_mode(FillMode::Point), PolygonMode::Line);
        assert_eq!(primitive_topology(PrimitiveType::TriangleFan), None);
        assert_eq!(stencil_operation(StencilOp::Ref), StencilOperation::Replace);
        assert_eq!(compare_function(CompareMode::GreaterEqual), CompareFunction::GreaterEqual);
    }

    #[test]
    fn depth_bias_scales_by_depth_bits() {
        assert_eq!(depth_bias(1.0 / 65536.0, Some(TextureFormat::Depth16Unorm)), 1);
        assert_eq!(depth_bias(1.0 / 65536.0, Some(TextureFormat::Depth24Plus)), 256);
        assert_eq!(depth_bias(0.0, None), 0);
    }

    #[test]
    fn samplers_fall_back_to_device_defaults() {
        let settings = RenderDeviceSettings::builder()
            .default_filter_mode(TextureFilterMode::Anisotropic)
            .default_anisotropy(8)
            .build();

        let sampler = sampler_descriptor("test", &SamplerStateDesc::default(), &settings);
        assert_eq!(sampler.anisotropy_clamp, 8);
        assert_eq!(sampler.mipmap_filter, FilterMode::Linear);
        assert_eq!(sampler.address_mode_u, AddressMode::Repeat);
        assert_eq!(sampler.compare, None);

        let shadow = SamplerStateDesc {
            shadow_compare: true,
            ..SamplerStateDesc::bilinear()
        };
        let sampler = sampler_descriptor("shadow", &shadow, &settings);
        assert_eq!(sampler.compare, Some(CompareFunction::LessEqual));
        assert_eq!(sampler.mipmap_filter, FilterMode::Nearest);
        assert_eq!(sampler.anisotropy_clamp, 1);
        assert_eq!(sampler.address_mode_w, AddressMode::ClampToEdge);
    }
}
