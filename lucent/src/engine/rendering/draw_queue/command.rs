use crate::rendering::constant_buffer::ConstantBufferCollectionRef;
use crate::rendering::defs::{MAX_SHADER_PARAMETER_GROUPS, MAX_VERTEX_STREAMS};
use crate::rendering::device::RenderDevice;
use crate::rendering::pipeline::PipelineState;
use crate::rendering::reflection::StageBindings;
use crate::rendering::texture::{RawTexture, UavKey};
use smallvec::SmallVec;
use std::ops::Range;
use wgpu::IndexFormat;

pub type VertexBuffers<'a, D> = SmallVec<[&'a <D as RenderDevice>::Buffer; MAX_VERTEX_STREAMS]>;
pub type ConstantBufferRefs = [Option<ConstantBufferCollectionRef>; MAX_SHADER_PARAMETER_GROUPS];

/// What a recorded command does once its state is set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DrawParams {
    /// `start` and `count` index the index buffer for indexed draws, the vertices otherwise.
    Draw {
        indexed: bool,
        start: u32,
        count: u32,
        base_vertex: i32,
        instance_start: u32,
        instance_count: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

impl DrawParams {
    pub fn is_dispatch(&self) -> bool {
        matches!(self, DrawParams::Dispatch { .. })
    }
}

/// A texture bound to a shader resource name, along with the sampler the pipeline made for it.
pub struct ShaderResourceEntry<'a, D: RenderDevice> {
    pub texture: &'a RawTexture<D>,
    pub texture_bindings: StageBindings,
    pub sampler_bindings: StageBindings,
    pub sampler: Option<D::Sampler>,
}

/// A texture range bound for unordered access. The view is created when the queue executes.
pub struct UnorderedAccessViewEntry<'a, D: RenderDevice> {
    pub texture: &'a RawTexture<D>,
    pub key: UavKey,
    pub bindings: StageBindings,
}

/// A storage buffer bound whole for unordered access.
pub struct StorageBufferEntry<'a, D: RenderDevice> {
    pub buffer: &'a D::Buffer,
    pub bindings: StageBindings,
}

/// One recorded draw or dispatch.
pub struct DrawCommandDescription<'a, D: RenderDevice> {
    pub pipeline: &'a PipelineState<D>,
    pub vertex_buffers: VertexBuffers<'a, D>,
    pub index_buffer: Option<(&'a D::Buffer, IndexFormat)>,
    pub constant_buffers: ConstantBufferRefs,
    /// Range into [`DrawCommandQueue::shader_resources`](super::DrawCommandQueue::shader_resources).
    pub shader_resources: Range<usize>,
    pub unordered_access_views: Range<usize>,
    /// Range into [`DrawCommandQueue::storage_buffers`](super::DrawCommandQueue::storage_buffers).
    pub storage_buffers: Range<usize>,
    /// Index into [`DrawCommandQueue::scissor_rects`](super::DrawCommandQueue::scissor_rects).
    pub scissor_rect: usize,
    pub stencil_ref: u8,
    pub params: DrawParams,
}

impl<D: RenderDevice> Clone for DrawCommandDescription<'_, D> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline,
            vertex_buffers: self.vertex_buffers.clone(),
            index_buffer: self.index_buffer,
            constant_buffers: self.constant_buffers,
            shader_resources: self.shader_resources.clone(),
            unordered_access_views: self.unordered_access_views.clone(),
            storage_buffers: self.storage_buffers.clone(),
            scissor_rect: self.scissor_rect,
            stencil_ref: self.stencil_ref,
            params: self.params,
        }
    }
}

impl<D: RenderDevice> std::fmt::Debug for DrawCommandDescription<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawCommandDescription")
            .field("pipeline", &self.pipeline.debug_name())
            .field("vertex_buffers", &self.vertex_buffers.len())
            .field("indexed", &self.index_buffer.is_some())
            .field("constant_buffers", &self.constant_buffers)
            .field("shader_resources", &self.shader_resources)
            .field("unordered_access_views", &self.unordered_access_views)
            .field("storage_buffers", &self.storage_buffers)
            .field("scissor_rect", &self.scissor_rect)
            .field("stencil_ref", &self.stencil_ref)
            .field("params", &self.params)
            .finish()
    }
}
