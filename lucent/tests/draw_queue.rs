mod common;

use common::{compile, init_logging, FILL_CS, LIT_PS, LIT_VS};
use lucent::rendering::constant_buffer::ShaderParameterValue;
use lucent::rendering::defs::{
    BufferUsage, InputLayoutDesc, ShaderParameterGroup, ShaderType, TextureFlags, TextureType, VertexElement,
    VertexElementSemantic, VertexElementType,
};
use lucent::rendering::device::{HeadlessContext, HeadlessDevice, RecordedBinding, RecordedCommand, RenderDevice};
use lucent::rendering::draw_queue::{DrawCommandQueue, DrawParams};
use lucent::rendering::pipeline::{
    ComputePipelineStateDesc, GraphicsPipelineStateDesc, PipelineState, PipelineStateCache,
};
use lucent::rendering::texture::{RawTexture, RawTextureParams, UavKey};
use lucent_utils::ShaderUniformIndex;
use nalgebra::Matrix4;
use std::sync::Arc;
use wgpu::{IndexFormat, TextureFormat};

fn lit_pipeline(device: &HeadlessDevice, cache: &PipelineStateCache<HeadlessDevice>) -> Arc<PipelineState<HeadlessDevice>> {
    let elements = [
        VertexElement::new(VertexElementType::Vector3, VertexElementSemantic::Position, 0),
        VertexElement::new(VertexElementType::Vector3, VertexElementSemantic::Normal, 0),
        VertexElement::new(VertexElementType::Vector2, VertexElementSemantic::TexCoord, 0),
    ];
    let desc = GraphicsPipelineStateDesc::builder()
        .debug_name("lit")
        .vertex_shader(compile("lit", ShaderType::Vertex, LIT_VS))
        .pixel_shader(compile("lit", ShaderType::Pixel, LIT_PS))
        .input_layout(InputLayoutDesc::from_streams(&[&elements]))
        .build();
    cache.build(device, &desc.into(), None).unwrap()
}

fn fill_pipeline(device: &HeadlessDevice, cache: &PipelineStateCache<HeadlessDevice>) -> Arc<PipelineState<HeadlessDevice>> {
    let desc = ComputePipelineStateDesc::builder()
        .debug_name("fill")
        .compute_shader(compile("fill", ShaderType::Compute, FILL_CS))
        .build();
    cache.build(device, &desc.into(), None).unwrap()
}

fn bindings(context: &HeadlessContext) -> Vec<&[RecordedBinding]> {
    context
        .commands
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::SetBindings(bindings) => Some(bindings.as_slice()),
            _ => None,
        })
        .collect()
}

#[test]
fn material_draw_is_recorded_once() {
    init_logging();
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();
    let pipeline = lit_pipeline(&device, &cache);
    let mut queue = DrawCommandQueue::new(&device);

    queue.set_pipeline_state(&pipeline);
    assert!(queue.begin_shader_parameter_group(ShaderParameterGroup::Material, true));
    queue.add_shader_parameter("MatDiffColor", ShaderParameterValue::color(1.0, 0.0, 0.0, 1.0));
    queue.commit_shader_parameter_group();
    queue.draw(0, 36);

    assert_eq!(queue.len(), 1);
    let command = &queue.commands()[0];
    let DrawParams::Draw { indexed, count, .. } = command.params else {
        panic!("expected a draw, got {:?}", command.params);
    };
    assert!(!indexed);
    assert_eq!(count, 36);
    assert!(command.index_buffer.is_none());
    assert!(command.constant_buffers[ShaderParameterGroup::Material.index()].is_some());
}

#[test]
fn indexed_frame_binds_every_group() {
    init_logging();
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();
    let pipeline = lit_pipeline(&device, &cache);
    let texture = RawTexture::with_params(&device, "bricks", RawTextureParams::builder().size((64, 64, 1)).build()).unwrap();
    let vertices = device.create_buffer("cube vertices", 24 * 32, BufferUsage::VERTEX | BufferUsage::COPY_DST).unwrap();
    let indices = device.create_buffer("cube indices", 36 * 2, BufferUsage::INDEX | BufferUsage::COPY_DST).unwrap();
    let mut queue = DrawCommandQueue::new(&device);

    queue.set_pipeline_state(&pipeline);
    queue.set_vertex_buffers(&[&vertices]);
    queue.set_index_buffer(Some((&indices, IndexFormat::Uint16)));

    assert!(queue.begin_shader_parameter_group(ShaderParameterGroup::Camera, false));
    queue.add_shader_parameter("ViewProj", Matrix4::<f32>::identity());
    queue.commit_shader_parameter_group();

    for x in 0..3 {
        queue.begin_shader_parameter_group(ShaderParameterGroup::Object, true);
        queue.add_shader_parameter("Model", Matrix4::<f32>::new_translation(&[x as f32, 0.0, 0.0].into()));
        queue.commit_shader_parameter_group();

        if queue.begin_shader_parameter_group(ShaderParameterGroup::Material, false) {
            queue.add_shader_parameter("MatDiffColor", ShaderParameterValue::color(1.0, 1.0, 1.0, 1.0));
            queue.commit_shader_parameter_group();
        }
        assert!(!queue.begin_shader_parameter_group(ShaderParameterGroup::Camera, false));

        queue.add_nullable_shader_resource("DiffMap", None, &texture);
        queue.commit_shader_resources();
        queue.draw_indexed(0, 36, 0);
    }

    let materials: Vec<_> = queue
        .commands()
        .iter()
        .map(|c| c.constant_buffers[ShaderParameterGroup::Material.index()])
        .collect();
    assert!(materials.iter().all(|m| *m == materials[0]));

    let mut context = HeadlessContext::new();
    queue.execute_in_context(&device, &mut context).unwrap();

    assert_eq!(context.draw_calls(), 3);
    let set_index_buffers = context
        .commands
        .iter()
        .filter(|c| matches!(c, RecordedCommand::SetIndexBuffer { format: IndexFormat::Uint16, .. }))
        .count();
    assert_eq!(set_index_buffers, 1);
    assert!(context.commands.contains(&RecordedCommand::DrawIndexed {
        indices: 0..36,
        base_vertex: 0,
        instances: 0..1,
    }));

    let per_draw = bindings(&context);
    assert_eq!(per_draw.len(), 3);
    for set in &per_draw {
        // camera, object, material, texture, sampler
        assert_eq!(set.len(), 5);
        assert!(set.windows(2).all(|pair| pair[0].slot() < pair[1].slot()));
    }
    let object_offsets: Vec<u64> = per_draw
        .iter()
        .map(|set| match set[1] {
            RecordedBinding::Buffer { offset, .. } => offset,
            ref other => panic!("expected the object buffer, got {other:?}"),
        })
        .collect();
    assert_eq!(object_offsets, [256, 768, 1024]);
}

#[test]
fn multisampled_targets_are_resolved_before_sampling() {
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();
    let pipeline = lit_pipeline(&device, &cache);
    let target = RawTexture::with_params(
        &device,
        "scene",
        RawTextureParams::builder()
            .size((128, 128, 1))
            .format(TextureFormat::Rgba16Float)
            .flags(TextureFlags::BIND_RENDER_TARGET)
            .multi_sample(4)
            .build(),
    )
    .unwrap();
    target.mark_dirty();
    let mut queue = DrawCommandQueue::new(&device);

    queue.set_pipeline_state(&pipeline);
    queue.add_shader_resource("DiffMap", &target);
    queue.commit_shader_resources();
    queue.draw(0, 3);
    queue.draw(3, 3);

    let mut context = HeadlessContext::new();
    queue.execute_in_context(&device, &mut context).unwrap();

    assert_eq!(context.draw_calls(), 2);
    assert_eq!(device.stats().resolves, 1);
    assert!(!target.resolve_dirty());
    let sampled = bindings(&context)[0]
        .iter()
        .find_map(|b| match b {
            RecordedBinding::TextureView { texture, .. } => Some(*texture),
            _ => None,
        })
        .unwrap();
    assert_eq!(Some(sampled), target.resolved_texture().map(|t| t.id));
}

#[test]
fn compute_fill_dispatches_with_its_parameters() {
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();
    let pipeline = fill_pipeline(&device, &cache);
    let output = RawTexture::with_params(
        &device,
        "fill target",
        RawTextureParams::builder()
            .ty(TextureType::Texture2DArray)
            .size((32, 32, 1))
            .array_size(4)
            .format(TextureFormat::Rgba8Unorm)
            .flags(TextureFlags::BIND_UNORDERED_ACCESS)
            .build(),
    )
    .unwrap();
    let mut queue = DrawCommandQueue::new(&device);

    queue.set_pipeline_state(&pipeline);
    assert!(queue.begin_shader_parameter_group(ShaderParameterGroup::Custom, true));
    queue.add_shader_parameter("FillColor", ShaderParameterValue::color(0.0, 0.5, 1.0, 1.0));
    queue.commit_shader_parameter_group();
    queue.add_unordered_access_view("Output", &output, UavKey::default().write_only());
    queue.commit_unordered_access_views();
    queue.dispatch(4, 4, 4);

    let mut context = HeadlessContext::new();
    queue.execute_in_context(&device, &mut context).unwrap();

    assert_eq!(context.commands.last(), Some(&RecordedCommand::Dispatch { x: 4, y: 4, z: 4 }));
    let set = bindings(&context)[0];
    assert!(matches!(
        set,
        [RecordedBinding::Buffer { size: 16, .. }, RecordedBinding::TextureView { .. }]
    ));
    let key = UavKey::default().write_only().slices(0, 4).levels(0, 6);
    assert!(output.uav(&key).is_some());
}

#[test]
fn invalidated_pipelines_are_skipped() {
    init_logging();
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();
    let lit = lit_pipeline(&device, &cache);
    let fill = fill_pipeline(&device, &cache);
    let mut queue = DrawCommandQueue::new(&device);

    queue.set_pipeline_state(&lit);
    queue.draw(0, 3);
    queue.set_pipeline_state(&fill);
    queue.dispatch(1, 1, 1);
    lit.invalidate();

    let mut context = HeadlessContext::new();
    queue.execute_in_context(&device, &mut context).unwrap();

    assert_eq!(
        context.commands,
        [
            RecordedCommand::SetPipeline {
                id: fill.handle().unwrap().id,
                label: fill.debug_name().to_string(),
            },
            RecordedCommand::Dispatch { x: 1, y: 1, z: 1 },
        ]
    );
}

#[test]
fn a_reset_queue_starts_from_scratch() {
    let device = HeadlessDevice::new();
    let cache = PipelineStateCache::new();
    let pipeline = lit_pipeline(&device, &cache);
    let mut queue = DrawCommandQueue::new(&device);

    queue.set_pipeline_state(&pipeline);
    queue.begin_shader_parameter_group(ShaderParameterGroup::Material, true);
    queue.commit_shader_parameter_group();
    queue.draw(0, 3);
    let generation = queue.constant_buffers().generation();

    queue.reset();
    assert!(queue.is_empty());
    assert_eq!(queue.scissor_rects().len(), 1);
    assert_eq!(queue.constant_buffers().cursor(), (0, 0));
    assert_eq!(queue.constant_buffers().generation(), generation + 1);

    queue.set_pipeline_state(&pipeline);
    assert!(queue.begin_shader_parameter_group(ShaderParameterGroup::Material, false));
}
