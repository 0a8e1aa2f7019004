use crate::rendering::defs::{
    parse_vertex_attribute, ShaderParameterGroup, ShaderType, TextureUnit, VertexShaderAttribute,
    MAX_SHADER_PARAMETER_GROUPS, MAX_TEXTURE_UNITS,
};
use crate::rendering::shader::names::{
    constant_buffer_group, sampler_texture_name, strip_variable_prefix, texture_unit,
};
use crate::rendering::shader::{
    ShaderCompileError, UnknownConstantBufferErr, UnknownTextureErr, UnsupportedResourceErr,
};
use lucent_utils::ShaderUniformIndex;
use naga::valid::ModuleInfo;
use naga::{AddressSpace, Binding, ImageClass, ImageDimension, Module, ScalarKind, StorageAccess, StorageFormat, TypeInner};
use snafu::OptionExt;
use std::collections::HashMap;
use std::num::NonZeroU64;
use tracing::warn;
use wgpu::{
    BindingType, BufferBindingType, SamplerBindingType, StorageTextureAccess, TextureFormat,
    TextureSampleType, TextureViewDimension,
};

/// Location of a resource in the pipeline layout, the handle used to bind it for one stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingSlot {
    pub group: u32,
    pub binding: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ReflectedBinding {
    pub slot: BindingSlot,
    pub ty: BindingType,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ReflectedParameter {
    pub group: ShaderParameterGroup,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedUniform {
    pub name: String,
    pub internal_name: String,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedConstantBuffer {
    pub group: ShaderParameterGroup,
    pub internal_name: String,
    pub size: u32,
    pub binding: ReflectedBinding,
    pub members: Vec<ReflectedUniform>,
}

/// A sampled texture and, when declared separately, its sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedResource {
    pub name: String,
    pub internal_name: String,
    pub unit: TextureUnit,
    pub texture: Option<ReflectedBinding>,
    pub sampler: Option<ReflectedBinding>,
}

/// What an unordered access view is bound to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UavKind {
    Texture { format: TextureFormat },
    Buffer { read_only: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedUav {
    pub name: String,
    pub internal_name: String,
    pub binding: ReflectedBinding,
    pub kind: UavKind,
}

/// Everything one compiled stage needs bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReflection {
    pub stage: ShaderType,
    pub vertex_attributes: Vec<VertexShaderAttribute>,
    /// One past the highest input location of the vertex stage, counting inputs with unknown
    /// semantics too.
    pub input_locations_end: u32,
    pub constant_buffers: Vec<ReflectedConstantBuffer>,
    pub resources: Vec<ReflectedResource>,
    pub uavs: Vec<ReflectedUav>,
    pub parameters: HashMap<String, ReflectedParameter>,
    pub texture_slots: [bool; MAX_TEXTURE_UNITS],
    pub constant_buffer_slots: [bool; MAX_SHADER_PARAMETER_GROUPS],
}

impl StageReflection {
    pub fn new(stage: ShaderType) -> Self {
        Self {
            stage,
            vertex_attributes: Vec::new(),
            input_locations_end: 0,
            constant_buffers: Vec::new(),
            resources: Vec::new(),
            uavs: Vec::new(),
            parameters: HashMap::new(),
            texture_slots: [false; MAX_TEXTURE_UNITS],
            constant_buffer_slots: [false; MAX_SHADER_PARAMETER_GROUPS],
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ReflectedParameter> {
        self.parameters.get(name)
    }

    pub fn resource(&self, name: &str) -> Option<&ReflectedResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn uav(&self, name: &str) -> Option<&ReflectedUav> {
        self.uavs.iter().find(|u| u.name == name)
    }

    pub fn constant_buffer(&self, group: ShaderParameterGroup) -> Option<&ReflectedConstantBuffer> {
        self.constant_buffers.iter().find(|cb| cb.group == group)
    }

    fn resource_entry(&mut self, name: &str, internal_name: &str, unit: TextureUnit) -> &mut ReflectedResource {
        let index = match self.resources.iter().position(|r| r.name == name) {
            Some(index) => index,
            None => {
                self.resources.push(ReflectedResource {
                    name: name.to_string(),
                    internal_name: internal_name.to_string(),
                    unit,
                    texture: None,
                    sampler: None,
                });
                self.resources.len() - 1
            }
        };
        &mut self.resources[index]
    }
}

fn view_dimension(dim: ImageDimension, arrayed: bool) -> TextureViewDimension {
    match (dim, arrayed) {
        (ImageDimension::D1, _) => TextureViewDimension::D1,
        (ImageDimension::D2, false) => TextureViewDimension::D2,
        (ImageDimension::D2, true) => TextureViewDimension::D2Array,
        (ImageDimension::D3, _) => TextureViewDimension::D3,
        (ImageDimension::Cube, false) => TextureViewDimension::Cube,
        (ImageDimension::Cube, true) => TextureViewDimension::CubeArray,
    }
}

fn storage_format(format: StorageFormat) -> Option<TextureFormat> {
    Some(match format {
        StorageFormat::R32Float => TextureFormat::R32Float,
        StorageFormat::R32Uint => TextureFormat::R32Uint,
        StorageFormat::R32Sint => TextureFormat::R32Sint,
        StorageFormat::Rg32Float => TextureFormat::Rg32Float,
        StorageFormat::Rg32Uint => TextureFormat::Rg32Uint,
        StorageFormat::Rg32Sint => TextureFormat::Rg32Sint,
        StorageFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        StorageFormat::Rgba8Snorm => TextureFormat::Rgba8Snorm,
        StorageFormat::Rgba8Uint => TextureFormat::Rgba8Uint,
        StorageFormat::Rgba8Sint => TextureFormat::Rgba8Sint,
        StorageFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
        StorageFormat::Rgba16Float => TextureFormat::Rgba16Float,
        StorageFormat::Rgba16Uint => TextureFormat::Rgba16Uint,
        StorageFormat::Rgba16Sint => TextureFormat::Rgba16Sint,
        StorageFormat::Rgba32Float => TextureFormat::Rgba32Float,
        StorageFormat::Rgba32Uint => TextureFormat::Rgba32Uint,
        StorageFormat::Rgba32Sint => TextureFormat::Rgba32Sint,
        _ => return None,
    })
}

fn storage_access(access: StorageAccess) -> StorageTextureAccess {
    let read = access.contains(StorageAccess::LOAD);
    let write = access.contains(StorageAccess::STORE);
    match (read, write) {
        (true, true) => StorageTextureAccess::ReadWrite,
        (true, false) => StorageTextureAccess::ReadOnly,
        _ => StorageTextureAccess::WriteOnly,
    }
}

fn vertex_inputs(module: &Module, entry_index: usize) -> Vec<(String, u32)> {
    let entry = &module.entry_points[entry_index];
    let mut inputs = Vec::new();

    for argument in &entry.function.arguments {
        match (&argument.binding, &argument.name) {
            (Some(Binding::Location { location, .. }), Some(name)) => {
                inputs.push((name.clone(), *location));
            }
            (Some(_), _) => {} // built-ins such as the vertex or instance index
            (None, _) => {
                if let TypeInner::Struct { members, .. } = &module.types[argument.ty].inner {
                    for member in members {
                        if let (Some(Binding::Location { location, .. }), Some(name)) =
                            (&member.binding, &member.name)
                        {
                            inputs.push((name.clone(), *location));
                        }
                    }
                }
            }
        }
    }

    inputs
}

/// Reflects what the entry point at `entry_index` uses.
///
/// Constant buffers and textures must use one of the engine's known names, anything else fails
/// the whole reflection since nothing could ever bind it.
pub(crate) fn reflect_module(
    name: &str,
    module: &Module,
    info: &ModuleInfo,
    entry_index: usize,
    stage: ShaderType,
) -> Result<StageReflection, ShaderCompileError> {
    let function_info = info.get_entry_point(entry_index);
    let mut reflection = StageReflection::new(stage);

    for (handle, var) in module.global_variables.iter() {
        if function_info[handle].is_empty() {
            continue;
        }
        let Some(resource_binding) = &var.binding else {
            continue;
        };
        let slot = BindingSlot {
            group: resource_binding.group,
            binding: resource_binding.binding,
        };
        let ty = &module.types[var.ty];
        let var_name = var.name.as_deref().unwrap_or_default();

        match var.space {
            AddressSpace::Uniform => {
                let buffer_name = ty.name.as_deref().unwrap_or(var_name);
                let group = constant_buffer_group(buffer_name).context(UnknownConstantBufferErr {
                    name,
                    buffer: buffer_name,
                })?;

                let TypeInner::Struct { members, span } = &ty.inner else {
                    return UnsupportedResourceErr {
                        name,
                        resource: buffer_name,
                        reason: "constant buffers must be structs",
                    }
                    .fail();
                };

                let mut uniforms = Vec::with_capacity(members.len());
                for member in members {
                    let internal_name = member.name.clone().unwrap_or_default();
                    let size = module.types[member.ty].inner.size(module.to_ctx());
                    let uniform = ReflectedUniform {
                        name: strip_variable_prefix(&internal_name).to_string(),
                        internal_name,
                        offset: member.offset,
                        size,
                    };
                    reflection.parameters.insert(
                        uniform.name.clone(),
                        ReflectedParameter {
                            group,
                            offset: uniform.offset,
                            size: uniform.size,
                        },
                    );
                    uniforms.push(uniform);
                }

                reflection.constant_buffer_slots[group.index()] = true;
                reflection.constant_buffers.push(ReflectedConstantBuffer {
                    group,
                    internal_name: buffer_name.to_string(),
                    size: *span,
                    binding: ReflectedBinding {
                        slot,
                        ty: BindingType::Buffer {
                            ty: BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: NonZeroU64::new(*span as u64),
                        },
                    },
                    members: uniforms,
                });
            }
            AddressSpace::Handle => match &ty.inner {
                TypeInner::Image {
                    dim,
                    arrayed,
                    class: ImageClass::Storage { format, access },
                } => {
                    let format = storage_format(*format).context(UnsupportedResourceErr {
                        name,
                        resource: var_name,
                        reason: "storage texture format has no device equivalent",
                    })?;
                    reflection.uavs.push(ReflectedUav {
                        name: strip_variable_prefix(var_name).to_string(),
                        internal_name: var_name.to_string(),
                        binding: ReflectedBinding {
                            slot,
                            ty: BindingType::StorageTexture {
                                access: storage_access(*access),
                                format,
                                view_dimension: view_dimension(*dim, *arrayed),
                            },
                        },
                        kind: UavKind::Texture { format },
                    });
                }
                TypeInner::Image { dim, arrayed, class } => {
                    let (sample_type, multisampled) = match class {
                        ImageClass::Sampled { kind, multi } => {
                            let sample_type = match kind {
                                ScalarKind::Sint => TextureSampleType::Sint,
                                ScalarKind::Uint => TextureSampleType::Uint,
                                _ => TextureSampleType::Float { filterable: !multi },
                            };
                            (sample_type, *multi)
                        }
                        ImageClass::Depth { multi } => (TextureSampleType::Depth, *multi),
                        _ => {
                            return UnsupportedResourceErr {
                                name,
                                resource: var_name,
                                reason: "unsupported image class",
                            }
                            .fail();
                        }
                    };

                    let key = strip_variable_prefix(var_name);
                    let unit = texture_unit(key).context(UnknownTextureErr {
                        name,
                        texture: var_name,
                    })?;

                    reflection.texture_slots[unit.index()] = true;
                    reflection.resource_entry(key, var_name, unit).texture = Some(ReflectedBinding {
                        slot,
                        ty: BindingType::Texture {
                            sample_type,
                            view_dimension: view_dimension(*dim, *arrayed),
                            multisampled,
                        },
                    });
                }
                TypeInner::Sampler { comparison } => {
                    let texture_name = sampler_texture_name(var_name).unwrap_or(var_name);
                    let key = strip_variable_prefix(texture_name);
                    let unit = texture_unit(key).context(UnknownTextureErr {
                        name,
                        texture: var_name,
                    })?;

                    let binding_type = if *comparison {
                        SamplerBindingType::Comparison
                    } else {
                        SamplerBindingType::Filtering
                    };

                    reflection.texture_slots[unit.index()] = true;
                    reflection.resource_entry(key, texture_name, unit).sampler = Some(ReflectedBinding {
                        slot,
                        ty: BindingType::Sampler(binding_type),
                    });
                }
                _ => {
                    return UnsupportedResourceErr {
                        name,
                        resource: var_name,
                        reason: "unsupported handle type",
                    }
                    .fail();
                }
            },
            AddressSpace::Storage { access } => {
                let read_only = !access.contains(StorageAccess::STORE);
                reflection.uavs.push(ReflectedUav {
                    name: strip_variable_prefix(var_name).to_string(),
                    internal_name: var_name.to_string(),
                    binding: ReflectedBinding {
                        slot,
                        ty: BindingType::Buffer {
                            ty: BufferBindingType::Storage { read_only },
                            has_dynamic_offset: false,
                            min_binding_size: NonZeroU64::new(ty.inner.size(module.to_ctx()) as u64),
                        },
                    },
                    kind: UavKind::Buffer { read_only },
                });
            }
            _ => {}
        }
    }

    if stage == ShaderType::Vertex {
        for (input_name, location) in vertex_inputs(module, entry_index) {
            reflection.input_locations_end = reflection.input_locations_end.max(location.saturating_add(1));
            match parse_vertex_attribute(&input_name) {
                Some((semantic, semantic_index)) => {
                    reflection.vertex_attributes.push(VertexShaderAttribute {
                        semantic,
                        semantic_index,
                        input_index: location,
                    });
                }
                None => warn!("Shader '{name}' has vertex input '{input_name}' with unknown semantic"),
            }
        }
        reflection.vertex_attributes.sort_by_key(|a| a.input_index);
    }

    Ok(reflection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use naga::valid::{Capabilities, ValidationFlags, Validator};

    fn reflect(source: &str, stage: ShaderType) -> Result<StageReflection, ShaderCompileError> {
        let module = naga::front::wgsl::parse_str(source).unwrap();
        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .unwrap();
        reflect_module("test", &module, &info, 0, stage)
    }

    #[test]
    fn separate_samplers_merge_into_their_texture() {
        let reflection = reflect(
            r#"
            @group(1) @binding(0) var sDiffMap: texture_2d<f32>;
            @group(1) @binding(1) var sDiffMap_sampler: sampler;

            @fragment
            fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
                return textureSample(sDiffMap, sDiffMap_sampler, uv);
            }
            "#,
            ShaderType::Pixel,
        )
        .unwrap();

        assert_eq!(reflection.resources.len(), 1);
        let resource = reflection.resource("DiffMap").unwrap();
        assert_eq!(resource.unit, TextureUnit::Diffuse);
        assert_eq!(resource.texture.unwrap().slot, BindingSlot { group: 1, binding: 0 });
        assert_eq!(resource.sampler.unwrap().slot, BindingSlot { group: 1, binding: 1 });
        assert!(reflection.texture_slots[TextureUnit::Diffuse.index()]);
    }

    #[test]
    fn unused_globals_are_ignored() {
        let reflection = reflect(
            r#"
            struct Camera { cViewProj: mat4x4<f32> }
            @group(0) @binding(0) var<uniform> camera: Camera;

            @fragment
            fn main() -> @location(0) vec4<f32> {
                return vec4<f32>(1.0);
            }
            "#,
            ShaderType::Pixel,
        )
        .unwrap();

        assert!(reflection.constant_buffers.is_empty());
        assert!(reflection.parameter("ViewProj").is_none());
    }

    #[test]
    fn vertex_builtins_are_skipped() {
        let reflection = reflect(
            r#"
            struct VertexInput {
                @location(1) iTexCoord: vec2<f32>,
                @location(0) iPos: vec3<f32>,
            }

            @vertex
            fn main(input: VertexInput, @builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
                return vec4<f32>(input.iPos + vec3<f32>(input.iTexCoord, f32(index)), 1.0);
            }
            "#,
            ShaderType::Vertex,
        )
        .unwrap();

        assert_eq!(reflection.input_locations_end, 2);
        let semantics: Vec<_> = reflection
            .vertex_attributes
            .iter()
            .map(|a| (a.semantic, a.input_index))
            .collect();
        assert_eq!(
            semantics,
            vec![
                (crate::rendering::defs::VertexElementSemantic::Position, 0),
                (crate::rendering::defs::VertexElementSemantic::TexCoord, 1),
            ]
        );
    }

    #[test]
    fn unknown_vertex_inputs_still_reserve_their_location() {
        let reflection = reflect(
            r#"
            @vertex
            fn main(@location(0) iPos: vec3<f32>, @location(2) wind: f32) -> @builtin(position) vec4<f32> {
                return vec4<f32>(iPos * wind, 1.0);
            }
            "#,
            ShaderType::Vertex,
        )
        .unwrap();

        assert_eq!(reflection.vertex_attributes.len(), 1);
        assert_eq!(reflection.input_locations_end, 3);
    }

    #[test]
    fn unknown_names_fail_reflection() {
        let err = reflect(
            r#"
            struct Weather { cRain: vec4<f32> }
            @group(0) @binding(0) var<uniform> weather: Weather;

            @fragment
            fn main() -> @location(0) vec4<f32> {
                return weather.cRain;
            }
            "#,
            ShaderType::Pixel,
        )
        .unwrap_err();
        assert!(matches!(err, ShaderCompileError::UnknownConstantBuffer { ref buffer, .. } if buffer == "Weather"));

        let err = reflect(
            r#"
            @group(0) @binding(0) var sCloudMap: texture_2d<f32>;

            @fragment
            fn main() -> @location(0) vec4<f32> {
                return textureLoad(sCloudMap, vec2<i32>(0, 0), 0);
            }
            "#,
            ShaderType::Pixel,
        )
        .unwrap_err();
        assert!(matches!(err, ShaderCompileError::UnknownTexture { ref texture, .. } if texture == "sCloudMap"));
    }
}
