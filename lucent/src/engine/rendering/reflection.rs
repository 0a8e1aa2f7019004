//! Whole-program view over the reflections of every stage of one pipeline.

use crate::rendering::defs::{ShaderParameterGroup, ShaderType, TextureUnit, MAX_SHADER_PARAMETER_GROUPS};
use crate::rendering::shader::{BindingSlot, CompiledShader, ReflectedBinding, UavKind};
use lucent_utils::{combine_hash, string_hash, ShaderUniformIndex};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;
use wgpu::{BindGroupLayoutEntry, BindingType, ShaderStages, TextureFormat};

/// Where one stage expects a resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StageBinding {
    pub stage: ShaderType,
    pub slot: BindingSlot,
    pub ty: BindingType,
}

pub type StageBindings = SmallVec<[StageBinding; 2]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBufferReflection {
    pub group: ShaderParameterGroup,
    pub size: u32,
    /// Structural hash of the layout, never 0.
    pub hash: u64,
    pub stage_bindings: StageBindings,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct UniformReflection {
    pub group: ShaderParameterGroup,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderResourceReflection {
    pub internal_name: String,
    pub unit: TextureUnit,
    pub texture_bindings: StageBindings,
    pub sampler_bindings: StageBindings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnorderedAccessViewReflection {
    pub internal_name: String,
    pub kind: UavKind,
    pub stage_bindings: StageBindings,
}

impl UnorderedAccessViewReflection {
    /// Format of the storage texture, `None` for storage buffers.
    pub fn format(&self) -> Option<TextureFormat> {
        match self.kind {
            UavKind::Texture { format } => Some(format),
            UavKind::Buffer { .. } => None,
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self.kind, UavKind::Buffer { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShaderProgramReflection {
    uniform_buffers: [Option<UniformBufferReflection>; MAX_SHADER_PARAMETER_GROUPS],
    uniforms: HashMap<String, UniformReflection>,
    shader_resources: BTreeMap<String, ShaderResourceReflection>,
    unordered_access_views: BTreeMap<String, UnorderedAccessViewReflection>,
}

fn stage_binding(stage: ShaderType, binding: &ReflectedBinding) -> StageBinding {
    StageBinding {
        stage,
        slot: binding.slot,
        ty: binding.ty,
    }
}

impl ShaderProgramReflection {
    pub fn new(stages: &[&CompiledShader]) -> Self {
        let mut program = Self::default();

        for shader in stages {
            program.merge_stage(shader);
        }
        program.recalculate_layout_hashes();

        program
    }

    fn merge_stage(&mut self, shader: &CompiledShader) {
        let stage = shader.stage();
        let reflection = shader.reflection();

        for buffer in &reflection.constant_buffers {
            let binding = stage_binding(stage, &buffer.binding);

            match &mut self.uniform_buffers[buffer.group.index()] {
                Some(existing) => {
                    if existing.size != buffer.size {
                        warn!(
                            "Constant buffer {} is {} bytes in the {stage} shader '{}' but {} bytes in an earlier stage",
                            buffer.group,
                            buffer.size,
                            shader.name(),
                            existing.size
                        );
                    }
                    existing.stage_bindings.push(binding);
                }
                slot @ None => {
                    *slot = Some(UniformBufferReflection {
                        group: buffer.group,
                        size: buffer.size,
                        hash: 0,
                        stage_bindings: SmallVec::from_elem(binding, 1),
                    });
                }
            }

            for member in &buffer.members {
                let uniform = UniformReflection {
                    group: buffer.group,
                    offset: member.offset,
                    size: member.size,
                };
                match self.uniforms.get(&member.name) {
                    Some(existing) if *existing != uniform => warn!(
                        "Shader parameter '{}' is declared as {uniform:?} in the {stage} shader '{}' but as {existing:?} in an earlier stage",
                        member.name,
                        shader.name()
                    ),
                    Some(_) => {}
                    None => {
                        self.uniforms.insert(member.name.clone(), uniform);
                    }
                }
            }
        }

        for resource in &reflection.resources {
            let entry = self
                .shader_resources
                .entry(resource.name.clone())
                .or_insert_with(|| ShaderResourceReflection {
                    internal_name: resource.internal_name.clone(),
                    unit: resource.unit,
                    texture_bindings: SmallVec::new(),
                    sampler_bindings: SmallVec::new(),
                });
            if let Some(texture) = &resource.texture {
                entry.texture_bindings.push(stage_binding(stage, texture));
            }
            if let Some(sampler) = &resource.sampler {
                entry.sampler_bindings.push(stage_binding(stage, sampler));
            }
        }

        for uav in &reflection.uavs {
            self.unordered_access_views
                .entry(uav.name.clone())
                .or_insert_with(|| UnorderedAccessViewReflection {
                    internal_name: uav.internal_name.clone(),
                    kind: uav.kind,
                    stage_bindings: SmallVec::new(),
                })
                .stage_bindings
                .push(stage_binding(stage, &uav.binding));
        }
    }

    fn recalculate_layout_hashes(&mut self) {
        let mut by_group: [Vec<(&str, &UniformReflection)>; MAX_SHADER_PARAMETER_GROUPS] =
            Default::default();
        for (name, uniform) in &self.uniforms {
            by_group[uniform.group.index()].push((name.as_str(), uniform));
        }

        for (buffer, uniforms) in self.uniform_buffers.iter_mut().zip(by_group.iter_mut()) {
            let Some(buffer) = buffer else {
                continue;
            };
            uniforms.sort_unstable_by_key(|(name, _)| *name);

            let mut hash = 0;
            combine_hash(&mut hash, buffer.size as u64);
            for (name, uniform) in uniforms.iter() {
                combine_hash(&mut hash, string_hash(name));
                combine_hash(&mut hash, uniform.offset as u64);
                combine_hash(&mut hash, uniform.size as u64);
            }
            buffer.hash = if hash == 0 { 1 } else { hash };
        }
    }

    pub fn uniform_buffer(&self, group: ShaderParameterGroup) -> Option<&UniformBufferReflection> {
        self.uniform_buffers[group.index()].as_ref()
    }

    pub fn uniform_buffers(&self) -> impl Iterator<Item = &UniformBufferReflection> {
        self.uniform_buffers.iter().flatten()
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformReflection> {
        self.uniforms.get(name)
    }

    pub fn shader_resource(&self, name: &str) -> Option<&ShaderResourceReflection> {
        self.shader_resources.get(name)
    }

    pub fn shader_resources(&self) -> impl Iterator<Item = (&str, &ShaderResourceReflection)> {
        self.shader_resources.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn unordered_access_view(&self, name: &str) -> Option<&UnorderedAccessViewReflection> {
        self.unordered_access_views.get(name)
    }

    pub fn unordered_access_views(&self) -> impl Iterator<Item = (&str, &UnorderedAccessViewReflection)> {
        self.unordered_access_views.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn all_bindings(&self) -> impl Iterator<Item = &StageBinding> {
        let buffers = self.uniform_buffers().flat_map(|b| b.stage_bindings.iter());
        let resources = self
            .shader_resources
            .values()
            .flat_map(|r| r.texture_bindings.iter().chain(r.sampler_bindings.iter()));
        let uavs = self
            .unordered_access_views
            .values()
            .flat_map(|u| u.stage_bindings.iter());
        buffers.chain(resources).chain(uavs)
    }

    /// Bind group layout entries per group index, with stage visibility merged for slots that
    /// several stages share.
    pub fn bind_group_layouts(&self) -> BTreeMap<u32, Vec<BindGroupLayoutEntry>> {
        let mut entries: BTreeMap<BindingSlot, BindGroupLayoutEntry> = BTreeMap::new();

        for binding in self.all_bindings() {
            entries
                .entry(binding.slot)
                .and_modify(|entry| entry.visibility |= binding.stage.visibility())
                .or_insert(BindGroupLayoutEntry {
                    binding: binding.slot.binding,
                    visibility: binding.stage.visibility(),
                    ty: binding.ty,
                    count: None,
                });
        }

        let mut layouts: BTreeMap<u32, Vec<BindGroupLayoutEntry>> = BTreeMap::new();
        for (slot, entry) in entries {
            layouts.entry(slot.group).or_default().push(entry);
        }
        layouts
    }

    /// Stages that read anything from this program.
    pub fn visibility(&self) -> ShaderStages {
        self.all_bindings()
            .fold(ShaderStages::NONE, |acc, b| acc | b.stage.visibility())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::shader::{ShaderCompileOptions, ShaderCompiler, ShaderSource};

    fn compile(stage: ShaderType, source: &str) -> CompiledShader {
        let options = ShaderCompileOptions::builder().name("test").stage(stage).build();
        ShaderCompiler::new()
            .compile(&ShaderSource::Wgsl(source.to_string()), &options)
            .unwrap()
    }

    const SHARED_VS: &str = r#"
        struct Object { cModel: mat4x4<f32> }
        struct MaterialVS { cUOffset: vec4<f32> }
        @group(0) @binding(0) var<uniform> object: Object;
        @group(0) @binding(1) var<uniform> material: MaterialVS;

        @vertex
        fn main(@location(0) iPos: vec3<f32>) -> @builtin(position) vec4<f32> {
            return object.cModel * vec4<f32>(iPos, 1.0) + material.cUOffset;
        }
    "#;

    const SHARED_PS: &str = r#"
        struct MaterialPS { cUOffset: vec4<f32> }
        @group(0) @binding(1) var<uniform> material: MaterialPS;
        @group(1) @binding(0) var sDiffMap: texture_2d<f32>;
        @group(1) @binding(1) var sDiffMap_sampler: sampler;

        @fragment
        fn main() -> @location(0) vec4<f32> {
            return material.cUOffset * textureSample(sDiffMap, sDiffMap_sampler, vec2<f32>(0.5));
        }
    "#;

    #[test]
    fn shared_groups_merge_stage_bindings() {
        let vs = compile(ShaderType::Vertex, SHARED_VS);
        let ps = compile(ShaderType::Pixel, SHARED_PS);
        let program = ShaderProgramReflection::new(&[&vs, &ps]);

        let material = program.uniform_buffer(ShaderParameterGroup::Material).unwrap();
        assert_eq!(material.stage_bindings.len(), 2);
        assert_eq!(material.size, 16);
        assert_ne!(material.hash, 0);

        let object = program.uniform_buffer(ShaderParameterGroup::Object).unwrap();
        assert_eq!(object.stage_bindings.len(), 1);
        assert!(program.uniform_buffer(ShaderParameterGroup::Frame).is_none());

        let offset = program.uniform("UOffset").unwrap();
        assert_eq!(offset.group, ShaderParameterGroup::Material);
        assert!(program.uniform("Missing").is_none());

        let diffuse = program.shader_resource("DiffMap").unwrap();
        assert_eq!(diffuse.texture_bindings.len(), 1);
        assert_eq!(diffuse.sampler_bindings.len(), 1);
        assert!(program.unordered_access_view("DiffMap").is_none());
    }

    #[test]
    fn layout_hash_tracks_structure() {
        let vs = compile(ShaderType::Vertex, SHARED_VS);
        let first = ShaderProgramReflection::new(&[&vs]);
        let again = ShaderProgramReflection::new(&[&vs]);
        let hash = |p: &ShaderProgramReflection| p.uniform_buffer(ShaderParameterGroup::Object).unwrap().hash;
        assert_eq!(hash(&first), hash(&again));

        let wider = compile(
            ShaderType::Vertex,
            &SHARED_VS.replace("cModel: mat4x4<f32>", "cModel: mat4x4<f32>, cExtra: vec4<f32>"),
        );
        let wider = ShaderProgramReflection::new(&[&wider]);
        assert_ne!(hash(&first), hash(&wider));
    }

    #[test]
    fn shared_slots_merge_visibility() {
        let vs = compile(ShaderType::Vertex, SHARED_VS);
        let ps = compile(ShaderType::Pixel, SHARED_PS);
        let layouts = ShaderProgramReflection::new(&[&vs, &ps]).bind_group_layouts();

        let group0 = &layouts[&0];
        assert_eq!(group0.len(), 2);
        let material = group0.iter().find(|e| e.binding == 1).unwrap();
        assert_eq!(material.visibility, ShaderStages::VERTEX | ShaderStages::FRAGMENT);
        assert_eq!(layouts[&1].len(), 2);
    }
}
