//! The seam between the rendering core and a graphics API.
//!
//! Everything above this module talks to a [`RenderDevice`] for object creation and to a
//! [`RenderContext`] for recording. Two devices ship with the crate:
//!
//! - [`WgpuDevice`] drives a real GPU through `wgpu`
//! - [`HeadlessDevice`] keeps everything in memory and counts what it is asked to do, which is
//!   what the tests run against

mod error;
mod headless;
mod wgpu_backend;

pub use error::*;
pub use headless::*;
pub use wgpu_backend::*;

use crate::rendering::defs::{BufferUsage, SamplerStateDesc, TextureFilterMode};
use crate::rendering::shader::{BindingSlot, CompiledShader, ShaderTarget};
use crate::rendering::vertex_layout::VertexBufferDesc;
use bon::Builder;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Range;
use wgpu::{
    BindGroupLayoutEntry, ColorTargetState, DepthStencilState, Extent3d, IndexFormat,
    MultisampleState, Origin3d, PrimitiveState, TextureFormat, TextureUsages,
};

#[derive(Debug, Clone, Builder)]
pub struct RenderDeviceSettings {
    /// Anisotropy used by samplers that don't ask for a specific one.
    #[builder(default = 4)]
    pub default_anisotropy: u8,
    /// Filter mode substituted for [`TextureFilterMode::Default`].
    #[builder(default = TextureFilterMode::Trilinear)]
    pub default_filter_mode: TextureFilterMode,
    /// Forces a shader target instead of the one the device prefers.
    pub shader_target: Option<ShaderTarget>,
    #[builder(default = cfg!(debug_assertions))]
    pub debug_shader_info: bool,
}

impl Default for RenderDeviceSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderDeviceCaps {
    pub min_uniform_buffer_offset_alignment: u32,
    pub max_color_attachments: u32,
    pub max_texture_dimension_2d: u32,
    pub storage_textures: bool,
    /// Bytecode the device consumes natively.
    pub shader_target: ShaderTarget,
}

/// One subresource region of a texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureRegion {
    pub level: u32,
    pub slice: u32,
    pub origin: Origin3d,
    pub size: Extent3d,
}

/// Texture contents read back to the CPU, rows `row_pitch` bytes apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedTexture {
    pub data: Vec<u8>,
    pub row_pitch: u32,
    pub rows: u32,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

pub enum BoundResource<D: RenderDevice> {
    /// A `size` of 0 binds the rest of the buffer past `offset`.
    Buffer {
        buffer: D::Buffer,
        offset: u64,
        size: u64,
    },
    TextureView(D::TextureView),
    Sampler(D::Sampler),
}

/// A resource ready to be bound for one draw or dispatch.
pub struct ResourceBinding<D: RenderDevice> {
    pub slot: BindingSlot,
    pub resource: BoundResource<D>,
}

pub struct StageModule<'a, D: RenderDevice> {
    pub module: &'a D::ShaderModule,
    pub entry_point: &'a str,
}

pub struct RealizedGraphicsPipeline<'a, D: RenderDevice> {
    pub vertex: StageModule<'a, D>,
    pub fragment: Option<StageModule<'a, D>>,
    pub vertex_buffers: &'a [VertexBufferDesc],
    pub primitive: PrimitiveState,
    pub depth_stencil: Option<DepthStencilState>,
    pub multisample: MultisampleState,
    pub color_targets: &'a [Option<ColorTargetState>],
}

pub enum RealizedPipelineKind<'a, D: RenderDevice> {
    Graphics(RealizedGraphicsPipeline<'a, D>),
    Compute(StageModule<'a, D>),
}

/// Pipeline description with every engine-level value already translated.
pub struct RealizedPipelineDesc<'a, D: RenderDevice> {
    pub label: &'a str,
    pub kind: RealizedPipelineKind<'a, D>,
    /// Layout entries per bind group index.
    pub bind_group_layouts: &'a BTreeMap<u32, Vec<BindGroupLayoutEntry>>,
}

pub trait RenderDevice: Sized + Send + Sync + 'static {
    type ShaderModule: Clone + Debug + Send + Sync;
    type Pipeline: Clone + Debug + Send + Sync;
    type Sampler: Clone + Debug + Send + Sync;
    type Texture: Clone + Debug + Send + Sync;
    type TextureView: Clone + Debug + Send + Sync;
    type Buffer: Clone + Debug + Send + Sync;

    fn settings(&self) -> &RenderDeviceSettings;
    fn caps(&self) -> &RenderDeviceCaps;

    /// Target shaders should be compiled to for this device.
    fn shader_target(&self) -> ShaderTarget {
        self.settings()
            .shader_target
            .unwrap_or(self.caps().shader_target)
    }

    fn is_format_supported(&self, format: TextureFormat, usage: TextureUsages) -> bool;
    fn is_sample_count_supported(&self, format: TextureFormat, sample_count: u32) -> bool;

    fn create_shader_module(&self, shader: &CompiledShader) -> Result<Self::ShaderModule, DeviceError>;
    fn create_sampler(&self, label: &str, desc: &SamplerStateDesc) -> Result<Self::Sampler, DeviceError>;
    fn create_pipeline(&self, desc: &RealizedPipelineDesc<'_, Self>) -> Result<Self::Pipeline, DeviceError>;
    fn create_texture(&self, desc: &wgpu::TextureDescriptor<'_>) -> Result<Self::Texture, DeviceError>;
    fn create_texture_view(
        &self,
        texture: &Self::Texture,
        desc: &wgpu::TextureViewDescriptor<'_>,
    ) -> Result<Self::TextureView, DeviceError>;
    fn create_buffer(&self, label: &str, size: u64, usage: BufferUsage) -> Result<Self::Buffer, DeviceError>;

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);
    fn write_texture(&self, texture: &Self::Texture, region: &TextureRegion, data: &[u8], bytes_per_row: u32);
    fn resolve_texture(&self, source: &Self::Texture, destination: &Self::Texture);
    fn generate_mips(&self, texture: &Self::Texture) -> Result<(), DeviceError>;
    /// Copies one subresource region into CPU memory. Blocks until the copy is done.
    fn read_texture(&self, texture: &Self::Texture, region: &TextureRegion) -> Result<MappedTexture, DeviceError>;
}

/// Recording target for draw and dispatch commands.
pub trait RenderContext<D: RenderDevice> {
    fn set_pipeline(&mut self, pipeline: &D::Pipeline);
    fn set_vertex_buffer(&mut self, slot: u32, buffer: &D::Buffer);
    fn set_index_buffer(&mut self, buffer: &D::Buffer, format: IndexFormat);
    fn set_scissor_rect(&mut self, rect: ScissorRect);
    fn set_stencil_reference(&mut self, reference: u32);
    fn set_bindings(&mut self, bindings: &[ResourceBinding<D>]) -> Result<(), DeviceError>;
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
}
