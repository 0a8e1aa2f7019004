use crate::rendering::defs::{ShaderParameterGroup, ShaderType, TextureUnit};
use lucent_utils::ShaderUniformIndex;
use once_cell::sync::Lazy;
use std::collections::HashMap;

static CONSTANT_BUFFER_NAMES: Lazy<HashMap<&'static str, ShaderParameterGroup>> =
    Lazy::new(|| ShaderParameterGroup::all().map(|g| (g.label(), g)).collect());

static TEXTURE_UNIT_NAMES: Lazy<HashMap<&'static str, TextureUnit>> = Lazy::new(|| {
    HashMap::from([
        ("DiffMap", TextureUnit::Diffuse),
        ("DiffCubeMap", TextureUnit::Diffuse),
        ("AlbedoBuffer", TextureUnit::Diffuse),
        ("NormalMap", TextureUnit::Normal),
        ("NormalBuffer", TextureUnit::Normal),
        ("SpecMap", TextureUnit::Specular),
        ("EmissiveMap", TextureUnit::Emissive),
        ("EnvMap", TextureUnit::Environment),
        ("EnvCubeMap", TextureUnit::Environment),
        ("VolumeMap", TextureUnit::VolumeMap),
        ("Custom1", TextureUnit::Custom1),
        ("Custom2", TextureUnit::Custom2),
        ("LightRampMap", TextureUnit::LightRamp),
        ("LightSpotMap", TextureUnit::LightShape),
        ("LightCubeMap", TextureUnit::LightShape),
        ("ShadowMap", TextureUnit::ShadowMap),
        ("FaceSelectCubeMap", TextureUnit::FaceSelect),
        ("IndirectionCubeMap", TextureUnit::Indirection),
        ("DepthBuffer", TextureUnit::DepthBuffer),
        ("LightBuffer", TextureUnit::LightBuffer),
        ("ZoneCubeMap", TextureUnit::Zone),
        ("ZoneVolumeMap", TextureUnit::Zone),
    ])
});

const SAMPLER_SUFFIXES: [&str; 2] = ["_sampler", "Sampler"];

/// Folds stage-suffixed constant buffer names (`MaterialPS`, `ObjectVS`) back to the shared name.
pub fn sanitize_constant_buffer_name(name: &str) -> &str {
    ShaderType::ALL
        .iter()
        .find_map(|stage| name.strip_suffix(stage.suffix()))
        .filter(|stripped| !stripped.is_empty())
        .unwrap_or(name)
}

pub fn constant_buffer_group(name: &str) -> Option<ShaderParameterGroup> {
    CONSTANT_BUFFER_NAMES
        .get(sanitize_constant_buffer_name(name))
        .copied()
}

/// Drops the single lowercase prefix character naming conventions put in front of shader
/// variables (`cMatDiffColor`, `sDiffMap`, `uOutput`). Names without such a prefix are returned
/// unchanged.
pub fn strip_variable_prefix(name: &str) -> &str {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(prefix), Some(next)) if prefix.is_ascii_lowercase() && next.is_ascii_uppercase() => {
            &name[1..]
        }
        _ => name,
    }
}

/// Name of the texture a separately declared sampler belongs to, if `name` is a sampler name.
pub fn sampler_texture_name(name: &str) -> Option<&str> {
    let name = name.strip_prefix('_').unwrap_or(name);
    SAMPLER_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .filter(|stripped| !stripped.is_empty())
}

/// Texture unit of a resource name without its variable prefix, e.g. `DiffMap`.
pub fn texture_unit(name: &str) -> Option<TextureUnit> {
    TEXTURE_UNIT_NAMES.get(name).copied()
}
