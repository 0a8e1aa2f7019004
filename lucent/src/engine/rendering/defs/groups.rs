use lucent_utils::ShaderUniformIndex;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use static_assertions::const_assert_eq;
use std::fmt::{Display, Formatter};

/// Engine-level bucket a constant buffer belongs to.
///
/// Shaders may declare their buffers under any stage-suffixed spelling (`MaterialPS`, `ObjectVS`),
/// the reflection always folds them back into one of these groups.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
pub enum ShaderParameterGroup {
    Frame = 0,
    Camera,
    Zone,
    Light,
    Material,
    Object,
    Custom,
}

pub const MAX_SHADER_PARAMETER_GROUPS: usize = 7;

const_assert_eq!(MAX_SHADER_PARAMETER_GROUPS, ShaderParameterGroup::Custom as usize + 1);

impl ShaderUniformIndex for ShaderParameterGroup {
    const MAX: usize = MAX_SHADER_PARAMETER_GROUPS;

    fn index(&self) -> usize {
        *self as usize
    }

    fn by_index(index: usize) -> Option<Self> {
        u8::try_from(index).ok().and_then(|i| Self::try_from(i).ok())
    }

    fn name() -> &'static str {
        "Shader Parameter Group"
    }

    fn label(&self) -> &'static str {
        match self {
            ShaderParameterGroup::Frame => "Frame",
            ShaderParameterGroup::Camera => "Camera",
            ShaderParameterGroup::Zone => "Zone",
            ShaderParameterGroup::Light => "Light",
            ShaderParameterGroup::Material => "Material",
            ShaderParameterGroup::Object => "Object",
            ShaderParameterGroup::Custom => "Custom",
        }
    }
}

impl Display for ShaderParameterGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed texture unit a sampled resource is bound to.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
pub enum TextureUnit {
    Diffuse = 0,
    Normal,
    Specular,
    Emissive,
    Environment,
    VolumeMap,
    Custom1,
    Custom2,
    LightRamp,
    LightShape,
    ShadowMap,
    FaceSelect,
    Indirection,
    DepthBuffer,
    LightBuffer,
    Zone,
}

pub const MAX_TEXTURE_UNITS: usize = 16;

const_assert_eq!(MAX_TEXTURE_UNITS, TextureUnit::Zone as usize + 1);

impl ShaderUniformIndex for TextureUnit {
    const MAX: usize = MAX_TEXTURE_UNITS;

    fn index(&self) -> usize {
        *self as usize
    }

    fn by_index(index: usize) -> Option<Self> {
        u8::try_from(index).ok().and_then(|i| Self::try_from(i).ok())
    }

    fn name() -> &'static str {
        "Texture Unit"
    }

    fn label(&self) -> &'static str {
        match self {
            TextureUnit::Diffuse => "Diffuse",
            TextureUnit::Normal => "Normal",
            TextureUnit::Specular => "Specular",
            TextureUnit::Emissive => "Emissive",
            TextureUnit::Environment => "Environment",
            TextureUnit::VolumeMap => "VolumeMap",
            TextureUnit::Custom1 => "Custom1",
            TextureUnit::Custom2 => "Custom2",
            TextureUnit::LightRamp => "LightRamp",
            TextureUnit::LightShape => "LightShape",
            TextureUnit::ShadowMap => "ShadowMap",
            TextureUnit::FaceSelect => "FaceSelect",
            TextureUnit::Indirection => "Indirection",
            TextureUnit::DepthBuffer => "DepthBuffer",
            TextureUnit::LightBuffer => "LightBuffer",
            TextureUnit::Zone => "Zone",
        }
    }
}

/// Programmable pipeline stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderType {
    Vertex,
    Pixel,
    Geometry,
    Hull,
    Domain,
    Compute,
}

impl ShaderType {
    pub const ALL: [ShaderType; 6] = [
        ShaderType::Vertex,
        ShaderType::Pixel,
        ShaderType::Geometry,
        ShaderType::Hull,
        ShaderType::Domain,
        ShaderType::Compute,
    ];

    /// Suffix shaders append to constant buffer names declared for this stage.
    pub const fn suffix(self) -> &'static str {
        match self {
            ShaderType::Vertex => "VS",
            ShaderType::Pixel => "PS",
            ShaderType::Geometry => "GS",
            ShaderType::Hull => "HS",
            ShaderType::Domain => "DS",
            ShaderType::Compute => "CS",
        }
    }

    pub fn naga_stage(self) -> Option<naga::ShaderStage> {
        match self {
            ShaderType::Vertex => Some(naga::ShaderStage::Vertex),
            ShaderType::Pixel => Some(naga::ShaderStage::Fragment),
            ShaderType::Compute => Some(naga::ShaderStage::Compute),
            ShaderType::Geometry | ShaderType::Hull | ShaderType::Domain => None,
        }
    }

    pub fn visibility(self) -> wgpu::ShaderStages {
        match self {
            ShaderType::Vertex => wgpu::ShaderStages::VERTEX,
            ShaderType::Pixel => wgpu::ShaderStages::FRAGMENT,
            ShaderType::Compute => wgpu::ShaderStages::COMPUTE,
            ShaderType::Geometry | ShaderType::Hull | ShaderType::Domain => {
                wgpu::ShaderStages::NONE
            }
        }
    }
}

impl Display for ShaderType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShaderType::Vertex => "vertex",
            ShaderType::Pixel => "pixel",
            ShaderType::Geometry => "geometry",
            ShaderType::Hull => "hull",
            ShaderType::Domain => "domain",
            ShaderType::Compute => "compute",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PipelineStateType {
    Graphics,
    Compute,
}

pub const MAX_RENDER_TARGETS: usize = 8;
pub const MAX_VERTEX_STREAMS: usize = 4;
pub const MAX_IMMUTABLE_SAMPLERS: usize = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_resolve_by_label_and_index() {
        assert_eq!(
            ShaderParameterGroup::by_label("Material"),
            Some(ShaderParameterGroup::Material)
        );
        assert_eq!(ShaderParameterGroup::by_label("Materials"), None);
        assert_eq!(
            ShaderParameterGroup::by_index(6),
            Some(ShaderParameterGroup::Custom)
        );
        assert_eq!(ShaderParameterGroup::by_index(7), None);
        assert_eq!(ShaderParameterGroup::all().count(), MAX_SHADER_PARAMETER_GROUPS);
        assert_eq!(TextureUnit::all().count(), MAX_TEXTURE_UNITS);
    }
}
