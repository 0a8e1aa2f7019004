#![allow(dead_code)]

use lucent::rendering::defs::ShaderType;
use lucent::rendering::shader::{CompiledShader, ShaderCompileOptions, ShaderCompiler, ShaderSource};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

pub const LIT_VS: &str = r#"
    struct CameraVS { cViewProj: mat4x4<f32> }
    struct ObjectVS { cModel: mat4x4<f32> }
    @group(0) @binding(0) var<uniform> camera: CameraVS;
    @group(0) @binding(1) var<uniform> object: ObjectVS;

    struct VertexOutput {
        @builtin(position) position: vec4<f32>,
        @location(0) normal: vec3<f32>,
        @location(1) uv: vec2<f32>,
    }

    @vertex
    fn main(
        @location(0) iPos: vec3<f32>,
        @location(1) iNormal: vec3<f32>,
        @location(2) iTexCoord: vec2<f32>,
    ) -> VertexOutput {
        var out: VertexOutput;
        out.position = camera.cViewProj * object.cModel * vec4<f32>(iPos, 1.0);
        out.normal = iNormal;
        out.uv = iTexCoord;
        return out;
    }
"#;

pub const LIT_PS: &str = r#"
    struct MaterialPS { cMatDiffColor: vec4<f32> }
    @group(1) @binding(0) var<uniform> material: MaterialPS;
    @group(2) @binding(0) var sDiffMap: texture_2d<f32>;
    @group(2) @binding(1) var sDiffMap_sampler: sampler;

    @fragment
    fn main(@location(0) normal: vec3<f32>, @location(1) uv: vec2<f32>) -> @location(0) vec4<f32> {
        let light = max(dot(normalize(normal), vec3<f32>(0.0, 1.0, 0.0)), 0.1);
        return material.cMatDiffColor * textureSample(sDiffMap, sDiffMap_sampler, uv) * light;
    }
"#;

pub const FILL_CS: &str = r#"
    struct Custom { cFillColor: vec4<f32> }
    @group(0) @binding(0) var<uniform> custom: Custom;
    @group(0) @binding(1) var uOutput: texture_storage_2d_array<rgba8unorm, write>;

    @compute @workgroup_size(8, 8)
    fn main(@builtin(global_invocation_id) id: vec3<u32>) {
        textureStore(uOutput, vec2<i32>(id.xy), i32(id.z), custom.cFillColor);
    }
"#;

/// Routes `tracing` events and the `log` records of naga and wgpu to the test output.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
        let _ = tracing_log::LogTracer::init();
    });
}

pub fn compile(name: &str, stage: ShaderType, source: &str) -> Arc<CompiledShader> {
    let options = ShaderCompileOptions::builder().name(name).stage(stage).build();
    let shader = ShaderCompiler::new()
        .compile(&ShaderSource::Wgsl(source.to_string()), &options)
        .unwrap();
    Arc::new(shader)
}
