mod common;

use common::{compile, init_logging, FILL_CS, LIT_PS, LIT_VS};
use lucent::rendering::defs::{
    InputLayoutDesc, PipelineStateType, PrimitiveType, ShaderParameterGroup, ShaderType, VertexElement,
    VertexElementSemantic, VertexElementType,
};
use lucent::rendering::device::HeadlessDevice;
use lucent::rendering::pipeline::{
    ComputePipelineStateDesc, GraphicsPipelineStateDesc, PipelineError, PipelineStateCache, PipelineStateDesc,
    PipelineStateOutputDesc,
};
use lucent::rendering::texture::BoundRenderTargets;
use more_asserts::assert_lt;
use std::sync::Arc;
use wgpu::{TextureFormat, VertexFormat};

fn mesh_elements() -> [VertexElement; 4] {
    [
        VertexElement::new(VertexElementType::Vector3, VertexElementSemantic::Position, 0),
        VertexElement::new(VertexElementType::Vector3, VertexElementSemantic::Normal, 0),
        VertexElement::new(VertexElementType::Vector4, VertexElementSemantic::Tangent, 0),
        VertexElement::new(VertexElementType::Vector2, VertexElementSemantic::TexCoord, 0),
    ]
}

fn lit_desc() -> GraphicsPipelineStateDesc {
    GraphicsPipelineStateDesc::builder()
        .debug_name("lit")
        .vertex_shader(compile("lit", ShaderType::Vertex, LIT_VS))
        .pixel_shader(compile("lit", ShaderType::Pixel, LIT_PS))
        .input_layout(InputLayoutDesc::from_streams(&[&mesh_elements()]))
        .output(PipelineStateOutputDesc::new(
            Some(TextureFormat::Depth24Plus),
            &[TextureFormat::Rgba8UnormSrgb],
        ))
        .build()
}

#[test]
fn lit_pipeline_matches_mesh_layout_and_reflects_material() {
    init_logging();
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();
    let state = cache.build(&device, &lit_desc().into(), None).unwrap();

    let layout: Vec<_> = state
        .vertex_layout()
        .iter()
        .map(|a| (a.semantic, a.semantic_index, a.input_index, a.offset))
        .collect();
    assert_eq!(
        layout,
        [
            (VertexElementSemantic::Position, 0, 0, 0),
            (VertexElementSemantic::Normal, 0, 1, 12),
            (VertexElementSemantic::TexCoord, 0, 2, 40),
            (VertexElementSemantic::Tangent, 0, 3, 24),
        ]
    );
    assert!(state.vertex_layout().iter().all(|a| a.stride == 48));
    assert_eq!(state.vertex_layout()[3].format, VertexFormat::Float32x4);

    let reflection = state.reflection();
    assert!(reflection.shader_resource("DiffMap").is_some());
    let color = reflection.uniform("MatDiffColor").unwrap();
    assert_eq!(color.group, ShaderParameterGroup::Material);
    assert_eq!((color.offset, color.size), (0, 16));
    assert!(state.sampler("DiffMap").is_some());
    assert_eq!(state.pipeline_type(), PipelineStateType::Graphics);
    assert!(state.debug_name().starts_with("lit#"));
}

#[test]
fn shader_inputs_keep_increasing_slots() {
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();

    let mesh = mesh_elements();
    let shuffled = [
        VertexElement::new(VertexElementType::Vector2, VertexElementSemantic::TexCoord, 0),
        VertexElement::new(VertexElementType::Vector4, VertexElementSemantic::Color, 0),
        VertexElement::new(VertexElementType::Vector3, VertexElementSemantic::Position, 0),
        VertexElement::new(VertexElementType::Vector4, VertexElementSemantic::Tangent, 0).per_instance(),
    ];
    let streams: [&[VertexElement]; 3] = [&mesh[..1], &mesh[..2], &shuffled];

    for elements in streams {
        let mut desc = lit_desc();
        desc.input_layout = InputLayoutDesc::from_streams(&[elements]);
        let state = cache.build(&device, &desc.into(), None).unwrap();
        let layout = state.vertex_layout();

        assert_eq!(layout.len(), elements.len());
        for pair in layout.windows(2) {
            assert_lt!(pair[0].input_index, pair[1].input_index);
        }
        for element in elements {
            assert!(
                layout
                    .iter()
                    .any(|a| a.semantic == element.semantic && a.semantic_index == element.semantic_index),
                "{element:?} was dropped"
            );
        }
    }
}

#[test]
fn identical_descriptors_share_one_pipeline() {
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();

    let first = cache.build(&device, &lit_desc().into(), None).unwrap();
    let mut renamed = lit_desc();
    renamed.debug_name = "renamed".to_string();
    let second = cache.build(&device, &renamed.into(), None).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(device.stats().pipelines, 1);
    assert_eq!(cache.misses(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn output_formats_follow_the_bound_targets() {
    init_logging();
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();
    let bound = BoundRenderTargets {
        depth_stencil_format: Some(TextureFormat::Depth32Float),
        render_target_formats: [TextureFormat::Rgba8UnormSrgb].into_iter().collect(),
        multi_sample: 1,
    };

    let state = cache.build(&device, &lit_desc().into(), Some(&bound)).unwrap();
    let output = &state.desc().as_graphics().unwrap().output;
    assert_eq!(output.depth_stencil_format, Some(TextureFormat::Depth32Float));

    let mut corrected = lit_desc();
    corrected.output = bound.to_output_desc();
    let again = cache.build(&device, &corrected.into(), None).unwrap();
    assert!(Arc::ptr_eq(&state, &again));
}

#[test]
fn invalidated_pipelines_are_restored() {
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();
    let state = cache.build(&device, &lit_desc().into(), None).unwrap();

    cache.invalidate_all();
    assert!(state.handle().is_none());
    assert!(state.sampler("DiffMap").is_none());

    assert_eq!(cache.restore_all(&device), 1);
    assert!(state.is_valid());
    assert_eq!(device.stats().pipelines, 2);

    state.invalidate();
    let rebuilt = cache.build(&device, &lit_desc().into(), None).unwrap();
    assert!(Arc::ptr_eq(&state, &rebuilt));
    assert!(rebuilt.is_valid());
    assert_eq!(cache.misses(), 1);
}

#[test]
fn reloading_a_shader_evicts_its_pipelines() {
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();
    let lit = cache.build(&device, &lit_desc().into(), None).unwrap();
    let compute = ComputePipelineStateDesc::builder()
        .debug_name("fill")
        .compute_shader(compile("fill", ShaderType::Compute, FILL_CS))
        .build();
    let fill = cache.build(&device, &compute.into(), None).unwrap();
    assert_eq!(fill.pipeline_type(), PipelineStateType::Compute);

    let pixel_hash = lit.shader(ShaderType::Pixel).unwrap().hash();
    assert_eq!(cache.invalidate_shader(pixel_hash), 1);
    assert!(!lit.is_valid());
    assert!(fill.is_valid());
    assert_eq!(cache.len(), 1);
}

#[test]
fn failed_builds_are_not_cached() {
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();

    device.set_fail_pipeline_creation(true);
    let result = cache.build(&device, &lit_desc().into(), None);
    assert!(matches!(result, Err(PipelineError::Device { .. })));
    assert!(cache.is_empty());

    device.set_fail_pipeline_creation(false);
    assert!(cache.build(&device, &lit_desc().into(), None).is_ok());
    assert_eq!(cache.len(), 1);
}

#[test]
fn invalid_descriptors_are_rejected() {
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();

    let mut fan = lit_desc();
    fan.primitive_type = PrimitiveType::TriangleFan;
    let result = cache.build(&device, &fan.into(), None);
    assert!(matches!(result, Err(PipelineError::UnsupportedTopology { .. })));

    let mut headless = lit_desc();
    headless.vertex_shader = None;
    let result = cache.build(&device, &PipelineStateDesc::Graphics(headless), None);
    assert!(matches!(result, Err(PipelineError::MissingVertexShader { .. })));

    assert!(cache.is_empty());
    assert_eq!(device.stats().pipelines, 0);
}
