use crate::rendering::defs::{MAX_SHADER_PARAMETER_GROUPS, MAX_TEXTURE_UNITS};
use crate::rendering::shader::convert::{inject_pixel_position, merge_split_samplers};
use crate::rendering::shader::reflector::reflect_module;
use crate::rendering::shader::{
    CompiledShader, MissingEntryPointErr, ParseErr, PreprocessErr, Preprocessor, ShaderBytecode,
    ShaderCompileError, ShaderCompileOptions, ShaderSource, ShaderTarget, UnsupportedStageErr,
    ValidationErr, WriteErr,
};
use crate::rendering::defs::ShaderType;
use naga::back::{hlsl, spv, wgsl};
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{FastHashMap, Module, ShaderStage};
use snafu::OptionExt;
use tracing::{error, trace};

/// Reusable shader compiler.
///
/// Holds the naga validator and GLSL front end between calls. Nothing else carries over: every
/// [`compile`](Self::compile) starts from empty slot usage.
pub struct ShaderCompiler {
    validator: Validator,
    glsl: naga::front::glsl::Frontend,
    texture_slots: [bool; MAX_TEXTURE_UNITS],
    constant_buffer_slots: [bool; MAX_SHADER_PARAMETER_GROUPS],
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderCompiler {
    pub fn new() -> Self {
        Self {
            validator: Validator::new(ValidationFlags::all(), Capabilities::all()),
            glsl: naga::front::glsl::Frontend::default(),
            texture_slots: [false; MAX_TEXTURE_UNITS],
            constant_buffer_slots: [false; MAX_SHADER_PARAMETER_GROUPS],
        }
    }

    /// Texture units used by the last compiled shader.
    pub fn texture_slots(&self) -> &[bool; MAX_TEXTURE_UNITS] {
        &self.texture_slots
    }

    /// Parameter groups used by the last compiled shader.
    pub fn constant_buffer_slots(&self) -> &[bool; MAX_SHADER_PARAMETER_GROUPS] {
        &self.constant_buffer_slots
    }

    pub fn compile(
        &mut self,
        source: &ShaderSource,
        options: &ShaderCompileOptions,
    ) -> Result<CompiledShader, ShaderCompileError> {
        self.texture_slots = [false; MAX_TEXTURE_UNITS];
        self.constant_buffer_slots = [false; MAX_SHADER_PARAMETER_GROUPS];

        let result = self.compile_inner(source, options);
        match &result {
            Ok(shader) => trace!(
                "Compiled {} shader '{}' to {} ({:#018x})",
                shader.stage(),
                shader.name(),
                options.target,
                shader.hash()
            ),
            Err(e) => error!("{e}"),
        }
        result
    }

    fn compile_inner(
        &mut self,
        source: &ShaderSource,
        options: &ShaderCompileOptions,
    ) -> Result<CompiledShader, ShaderCompileError> {
        let name = options.name.as_str();
        let naga_stage = options.stage.naga_stage().context(UnsupportedStageErr {
            name,
            stage: options.stage,
        })?;

        let (module, text) = self.parse(source, options, naga_stage)?;

        let info = self.validator.validate(&module).map_err(|e| {
            ValidationErr {
                name,
                diagnostic: e.emit_to_string(text.as_deref().unwrap_or_default()),
            }
            .build()
        })?;

        let entry_index = module
            .entry_points
            .iter()
            .position(|ep| ep.stage == naga_stage && ep.name == options.entry_point)
            .context(MissingEntryPointErr {
                name,
                stage: options.stage,
                entry_point: options.entry_point.as_str(),
            })?;

        let reflection = reflect_module(name, &module, &info, entry_index, options.stage)?;
        self.texture_slots = reflection.texture_slots;
        self.constant_buffer_slots = reflection.constant_buffer_slots;

        let (bytecode, diagnostics) = write_target(&module, &info, options, naga_stage)?;

        Ok(CompiledShader::new(options, bytecode, reflection, diagnostics))
    }

    fn parse(
        &mut self,
        source: &ShaderSource,
        options: &ShaderCompileOptions,
        naga_stage: ShaderStage,
    ) -> Result<(Module, Option<String>), ShaderCompileError> {
        let name = options.name.as_str();

        match source {
            ShaderSource::Wgsl(src) => {
                let processed = Preprocessor::new(&options.defines)
                    .process(src)
                    .map_err(|e| {
                        PreprocessErr {
                            name,
                            line: e.line,
                            reason: e.reason,
                        }
                        .build()
                    })?;
                let module = naga::front::wgsl::parse_str(&processed).map_err(|e| {
                    ParseErr {
                        name,
                        diagnostic: e.emit_to_string(&processed),
                    }
                    .build()
                })?;
                Ok((module, Some(processed)))
            }
            ShaderSource::Glsl(src) => {
                let defines: FastHashMap<String, String> = options
                    .defines
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                let glsl_options = naga::front::glsl::Options {
                    stage: naga_stage,
                    defines,
                };
                let module = self.glsl.parse(&glsl_options, src).map_err(|e| {
                    ParseErr {
                        name,
                        diagnostic: e.emit_to_string(src),
                    }
                    .build()
                })?;
                Ok((module, Some(src.clone())))
            }
            ShaderSource::SpirV(words) => {
                let module = naga::front::spv::parse_u8_slice(
                    bytemuck::cast_slice(words),
                    &naga::front::spv::Options::default(),
                )
                .map_err(|e| {
                    ParseErr {
                        name,
                        diagnostic: e.to_string(),
                    }
                    .build()
                })?;
                Ok((module, None))
            }
        }
    }
}

fn write_target(
    module: &Module,
    info: &ModuleInfo,
    options: &ShaderCompileOptions,
    naga_stage: ShaderStage,
) -> Result<(ShaderBytecode, String), ShaderCompileError> {
    let name = options.name.as_str();
    let target = options.target;
    let write_err = |reason: String| {
        WriteErr {
            name,
            target: target.name(),
            reason,
        }
        .build()
    };

    match target {
        ShaderTarget::Wgsl => {
            let text = wgsl::write_string(module, info, wgsl::WriterFlags::empty())
                .map_err(|e| write_err(e.to_string()))?;
            Ok((ShaderBytecode::Wgsl(text), String::new()))
        }
        ShaderTarget::SpirV => {
            let mut spv_options = spv::Options::default();
            spv_options
                .flags
                .set(spv::WriterFlags::DEBUG, options.debug_info);
            let pipeline_options = spv::PipelineOptions {
                shader_stage: naga_stage,
                entry_point: options.entry_point.clone(),
            };
            let words = spv::write_vec(module, info, &spv_options, Some(&pipeline_options))
                .map_err(|e| write_err(e.to_string()))?;
            Ok((ShaderBytecode::SpirV(words), String::new()))
        }
        ShaderTarget::Hlsl5 => {
            let hlsl_options = hlsl::Options {
                shader_model: hlsl::ShaderModel::V5_0,
                ..Default::default()
            };
            let pipeline_options = hlsl::PipelineOptions {
                entry_point: Some((naga_stage, options.entry_point.clone())),
            };

            let mut text = String::new();
            hlsl::Writer::new(&mut text, &hlsl_options, &pipeline_options)
                .write(module, info, None)
                .map_err(|e| write_err(e.to_string()))?;

            let mut diagnostics = Vec::new();
            let (mut text, renamed) = merge_split_samplers(&text);
            if renamed > 0 {
                diagnostics.push(format!("merged {renamed} split sampler(s)"));
            }
            if options.stage == ShaderType::Pixel {
                if let Some(patched) = inject_pixel_position(&text) {
                    text = patched;
                    diagnostics.push("injected SV_Position into pixel shader input".to_string());
                }
            }

            Ok((ShaderBytecode::Hlsl(text), diagnostics.join("\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::defs::{ShaderParameterGroup, TextureUnit};
    use crate::rendering::shader::{BindingSlot, ShaderDefines, UavKind};
    use lucent_utils::ShaderUniformIndex;

    const LIT_PS: &str = r#"
        struct MaterialPS { cMatDiffColor: vec4<f32> }
        @group(0) @binding(0) var<uniform> material: MaterialPS;
        @group(1) @binding(0) var sDiffMap: texture_2d<f32>;
        @group(1) @binding(1) var sDiffMap_sampler: sampler;

        @fragment
        fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
        #ifdef UNLIT
            return material.cMatDiffColor;
        #else
            return material.cMatDiffColor * textureSample(sDiffMap, sDiffMap_sampler, uv);
        #endif
        }
    "#;

    fn options(stage: ShaderType) -> ShaderCompileOptions {
        ShaderCompileOptions::builder().name("test").stage(stage).build()
    }

    #[test]
    fn slots_are_reset_between_compiles() {
        let mut compiler = ShaderCompiler::new();
        let source = ShaderSource::Wgsl(LIT_PS.to_string());

        compiler.compile(&source, &options(ShaderType::Pixel)).unwrap();
        assert!(compiler.texture_slots()[TextureUnit::Diffuse.index()]);
        assert!(compiler.constant_buffer_slots()[ShaderParameterGroup::Material.index()]);

        let unlit = ShaderCompileOptions::builder()
            .name("test")
            .stage(ShaderType::Pixel)
            .defines(ShaderDefines::from_iter([("UNLIT", "")]))
            .build();
        let shader = compiler.compile(&source, &unlit).unwrap();

        assert!(!compiler.texture_slots()[TextureUnit::Diffuse.index()]);
        assert!(shader.reflection().resources.is_empty());
        assert!(compiler.constant_buffer_slots()[ShaderParameterGroup::Material.index()]);
    }

    #[test]
    fn failures_carry_diagnostics_and_reset_slots() {
        let mut compiler = ShaderCompiler::new();
        compiler
            .compile(&ShaderSource::Wgsl(LIT_PS.to_string()), &options(ShaderType::Pixel))
            .unwrap();

        let broken = ShaderSource::Wgsl("@fragment fn main() -> @location(0) vec4<f32> { return oops; }".into());
        let err = compiler.compile(&broken, &options(ShaderType::Pixel)).unwrap_err();

        assert!(matches!(err, ShaderCompileError::Parse { .. }));
        assert!(err.to_string().contains("oops"));
        assert!(compiler.texture_slots().iter().all(|used| !used));
    }

    #[test]
    fn entry_point_must_match_stage() {
        let mut compiler = ShaderCompiler::new();
        let err = compiler
            .compile(&ShaderSource::Wgsl(LIT_PS.to_string()), &options(ShaderType::Vertex))
            .unwrap_err();
        assert!(matches!(err, ShaderCompileError::MissingEntryPoint { .. }));

        let err = compiler
            .compile(&ShaderSource::Wgsl(LIT_PS.to_string()), &options(ShaderType::Geometry))
            .unwrap_err();
        assert!(matches!(err, ShaderCompileError::UnsupportedStage { .. }));
    }

    #[test]
    fn glsl_and_spirv_sources_reflect_the_same() {
        let glsl = r#"
            #version 450
            layout(location = 0) in vec3 iPos;
            layout(location = 1) in vec2 iTexCoord;
            layout(set = 0, binding = 0) uniform Camera { mat4 cViewProj; };
            layout(location = 0) out vec2 vTexCoord;

            void main() {
                vTexCoord = iTexCoord;
                gl_Position = cViewProj * vec4(iPos, 1.0);
            }
        "#;

        let mut compiler = ShaderCompiler::new();
        let spirv_options = ShaderCompileOptions::builder()
            .name("test")
            .stage(ShaderType::Vertex)
            .target(ShaderTarget::SpirV)
            .build();
        let from_glsl = compiler
            .compile(&ShaderSource::Glsl(glsl.to_string()), &spirv_options)
            .unwrap();

        let ShaderBytecode::SpirV(words) = from_glsl.bytecode().clone() else {
            panic!("expected SPIR-V output");
        };
        let from_spirv = compiler
            .compile(&ShaderSource::SpirV(words), &options(ShaderType::Vertex))
            .unwrap();

        assert_eq!(from_glsl.reflection().vertex_attributes.len(), 2);
        for shader in [&from_glsl, &from_spirv] {
            let view_proj = shader.reflection().parameter("ViewProj").unwrap();
            assert_eq!(view_proj.group, ShaderParameterGroup::Camera);
            assert_eq!(view_proj.size, 64);
        }
    }

    #[test]
    fn storage_buffers_are_unordered_access_views() {
        let source = r#"
            @group(0) @binding(0) var<storage, read_write> uParticles: array<vec4<f32>>;
            @group(0) @binding(1) var<storage, read> uSeeds: array<f32>;

            @compute @workgroup_size(64)
            fn main(@builtin(global_invocation_id) id: vec3<u32>) {
                uParticles[id.x] = uParticles[id.x] + vec4<f32>(uSeeds[id.x]);
            }
        "#;

        let shader = ShaderCompiler::new()
            .compile(&ShaderSource::Wgsl(source.to_string()), &options(ShaderType::Compute))
            .unwrap();

        let particles = shader.reflection().uav("Particles").unwrap();
        assert_eq!(particles.internal_name, "uParticles");
        assert_eq!(particles.kind, UavKind::Buffer { read_only: false });
        assert_eq!(particles.binding.slot, BindingSlot { group: 0, binding: 0 });
        assert!(matches!(
            particles.binding.ty,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                ..
            }
        ));

        let seeds = shader.reflection().uav("Seeds").unwrap();
        assert_eq!(seeds.kind, UavKind::Buffer { read_only: true });
    }

    #[test]
    fn hlsl_output_uses_combined_sampler_names() {
        let mut compiler = ShaderCompiler::new();
        let hlsl_options = ShaderCompileOptions::builder()
            .name("test")
            .stage(ShaderType::Pixel)
            .target(ShaderTarget::Hlsl5)
            .build();
        let shader = compiler
            .compile(&ShaderSource::Wgsl(LIT_PS.to_string()), &hlsl_options)
            .unwrap();

        let text = shader.bytecode().as_text().unwrap();
        assert!(text.contains("sDiffMap_sampler"));
        assert!(text.contains("SV_Position"));
    }
}
