//! Recording and replaying draw and dispatch commands.
//!
//! A [`DrawCommandQueue`] is filled in the order state is set on a device context: pick a
//! pipeline, bind buffers, write shader parameters group by group, add resources, then draw.
//! Everything is resolved by name through the [`ShaderProgramReflection`] of the current
//! pipeline. Names the pipeline doesn't know are skipped without a word, so one set of
//! parameters can be fed to every variant of a shader.
//!
//! Parameters are packed into a [`ConstantBufferCollection`] owned by the queue. A group whose
//! layout didn't change since it was last packed keeps its block, which is why
//! [`begin_shader_parameter_group`](DrawCommandQueue::begin_shader_parameter_group) reports
//! whether the caller has to write the values at all.
//!
//! [`ShaderProgramReflection`]: crate::rendering::reflection::ShaderProgramReflection

mod command;

pub use command::*;

use crate::rendering::constant_buffer::{
    ConstantBufferCollection, ConstantBufferCollectionRef, ShaderParameterValue,
};
use crate::rendering::defs::{
    PipelineStateType, ShaderParameterGroup, MAX_SHADER_PARAMETER_GROUPS, MAX_VERTEX_STREAMS,
};
use crate::rendering::device::{BoundResource, DeviceError, RenderContext, RenderDevice, ResourceBinding, ScissorRect};
use crate::rendering::pipeline::PipelineState;
use crate::rendering::shader::BindingSlot;
use crate::rendering::texture::{RawTexture, UavKey};
use lucent_utils::{debug_panic, ShaderUniformIndex};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{error, trace, warn};
use wgpu::IndexFormat;

/// State of the command being recorded. Carries over from one draw to the next.
struct PendingCommand<'a, D: RenderDevice> {
    pipeline: Option<&'a PipelineState<D>>,
    vertex_buffers: VertexBuffers<'a, D>,
    index_buffer: Option<(&'a D::Buffer, IndexFormat)>,
    constant_buffers: ConstantBufferRefs,
    shader_resources: Range<usize>,
    unordered_access_views: Range<usize>,
    storage_buffers: Range<usize>,
    scissor_rect: usize,
    stencil_ref: u8,
}

impl<D: RenderDevice> Default for PendingCommand<'_, D> {
    fn default() -> Self {
        Self {
            pipeline: None,
            vertex_buffers: SmallVec::new(),
            index_buffer: None,
            constant_buffers: [None; MAX_SHADER_PARAMETER_GROUPS],
            shader_resources: 0..0,
            unordered_access_views: 0..0,
            storage_buffers: 0..0,
            scissor_rect: 0,
            stencil_ref: 0,
        }
    }
}

struct OpenGroup {
    group: ShaderParameterGroup,
    block: ConstantBufferCollectionRef,
}

pub struct DrawCommandQueue<'a, D: RenderDevice> {
    alignment: u32,
    constant_buffers: ConstantBufferCollection<D>,
    commands: Vec<DrawCommandDescription<'a, D>>,
    scissor_rects: Vec<ScissorRect>,
    shader_resources: Vec<ShaderResourceEntry<'a, D>>,
    unordered_access_views: Vec<UnorderedAccessViewEntry<'a, D>>,
    storage_buffers: Vec<StorageBufferEntry<'a, D>>,

    current: PendingCommand<'a, D>,
    /// Layout hash each group was last packed with, 0 for never.
    group_hashes: [u64; MAX_SHADER_PARAMETER_GROUPS],
    open_group: Option<OpenGroup>,
    committed_resources: usize,
    committed_uavs: usize,
    committed_storage_buffers: usize,
}

fn same<T>(a: Option<&T>, b: &T) -> bool {
    a.is_some_and(|a| std::ptr::eq(a, b))
}

impl<'a, D: RenderDevice> DrawCommandQueue<'a, D> {
    /// Creates an empty queue whose parameter blocks honor the uniform offset alignment of `device`.
    pub fn new(device: &D) -> Self {
        Self::with_alignment(device.caps().min_uniform_buffer_offset_alignment)
    }

    pub fn with_alignment(alignment: u32) -> Self {
        let mut queue = Self {
            alignment,
            constant_buffers: ConstantBufferCollection::new(),
            commands: Vec::new(),
            scissor_rects: Vec::new(),
            shader_resources: Vec::new(),
            unordered_access_views: Vec::new(),
            storage_buffers: Vec::new(),
            current: PendingCommand::default(),
            group_hashes: [0; MAX_SHADER_PARAMETER_GROUPS],
            open_group: None,
            committed_resources: 0,
            committed_uavs: 0,
            committed_storage_buffers: 0,
        };
        queue.reset();
        queue
    }

    /// Drops every recorded command and starts a new constant buffer generation.
    pub fn reset(&mut self) {
        self.constant_buffers.clear_and_initialize(self.alignment);
        self.commands.clear();
        self.scissor_rects.clear();
        self.scissor_rects.push(ScissorRect::default());
        self.shader_resources.clear();
        self.unordered_access_views.clear();
        self.storage_buffers.clear();

        self.current = PendingCommand::default();
        self.group_hashes = [0; MAX_SHADER_PARAMETER_GROUPS];
        self.open_group = None;
        self.committed_resources = 0;
        self.committed_uavs = 0;
        self.committed_storage_buffers = 0;
    }

    pub fn commands(&self) -> &[DrawCommandDescription<'a, D>] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn scissor_rects(&self) -> &[ScissorRect] {
        &self.scissor_rects
    }

    pub fn shader_resources(&self) -> &[ShaderResourceEntry<'a, D>] {
        &self.shader_resources
    }

    pub fn unordered_access_views(&self) -> &[UnorderedAccessViewEntry<'a, D>] {
        &self.unordered_access_views
    }

    pub fn storage_buffers(&self) -> &[StorageBufferEntry<'a, D>] {
        &self.storage_buffers
    }

    pub fn constant_buffers(&self) -> &ConstantBufferCollection<D> {
        &self.constant_buffers
    }

    /// Selects the pipeline for the following commands. Must come before parameters, resources
    /// and draws.
    pub fn set_pipeline_state(&mut self, pipeline: &'a PipelineState<D>) {
        if self.open_group.is_some() {
            warn!("Pipeline changed while a shader parameter group is open, closing it");
            self.open_group = None;
        }
        self.current.pipeline = Some(pipeline);
    }

    pub fn set_vertex_buffers(&mut self, buffers: &[&'a D::Buffer]) {
        if buffers.len() > MAX_VERTEX_STREAMS {
            warn!(
                "{} vertex buffers were given, only the first {MAX_VERTEX_STREAMS} are used",
                buffers.len()
            );
        }
        self.current.vertex_buffers = buffers.iter().take(MAX_VERTEX_STREAMS).copied().collect();
    }

    pub fn set_index_buffer(&mut self, buffer: Option<(&'a D::Buffer, IndexFormat)>) {
        self.current.index_buffer = buffer;
    }

    pub fn set_scissor_rect(&mut self, rect: ScissorRect) {
        if self.scissor_rects.last() != Some(&rect) {
            self.scissor_rects.push(rect);
        }
        self.current.scissor_rect = self.scissor_rects.len() - 1;
    }

    pub fn set_stencil_ref(&mut self, reference: u8) {
        self.current.stencil_ref = reference;
    }

    /// Opens `group` for writing.
    ///
    /// Returns whether parameters have to be added. That is the case if the layout of the group
    /// changed since it was last packed, or if `different_from_previous` says the values did.
    /// Otherwise the previous block is reused as it is.
    pub fn begin_shader_parameter_group(&mut self, group: ShaderParameterGroup, different_from_previous: bool) -> bool {
        let Some(pipeline) = self.current.pipeline else {
            error!("Shader parameter group {group} was begun without a pipeline state");
            debug_panic!("Shader parameter group {group} was begun without a pipeline state");
            return false;
        };

        let Some(buffer) = pipeline.reflection().uniform_buffer(group) else {
            return false;
        };

        let hash = buffer.hash;
        let index = group.index();
        if !different_from_previous && self.group_hashes[index] == hash && self.current.constant_buffers[index].is_some() {
            return false;
        }

        let Some((block, _)) = self.constant_buffers.add_block(buffer.size) else {
            return false;
        };

        self.current.constant_buffers[index] = Some(block);
        self.group_hashes[index] = hash;
        self.open_group = Some(OpenGroup { group, block });
        true
    }

    /// Writes one parameter of the open group. Parameters the pipeline doesn't have are skipped.
    pub fn add_shader_parameter(&mut self, name: &str, value: impl Into<ShaderParameterValue>) {
        let Some(pipeline) = self.current.pipeline else {
            return;
        };
        let Some(uniform) = pipeline.reflection().uniform(name) else {
            return;
        };

        let Some(open) = &self.open_group else {
            error!("Shader parameter '{name}' was added without an open parameter group");
            debug_panic!("Shader parameter '{name}' was added without an open parameter group");
            return;
        };

        if uniform.group != open.group {
            error!(
                "Shader parameter '{name}' belongs to group {} but group {} is open",
                uniform.group, open.group
            );
            return;
        }

        let block = open.block;
        let Some(data) = self.constant_buffers.block_data_mut(&block) else {
            return;
        };
        let range = uniform.offset as usize..(uniform.offset + uniform.size) as usize;
        let Some(dst) = data.get_mut(range) else {
            warn!("Shader parameter '{name}' lies outside of its constant buffer");
            return;
        };
        ConstantBufferCollection::<D>::store_parameter(dst, &value.into());
    }

    /// Closes the open parameter group.
    pub fn commit_shader_parameter_group(&mut self) {
        if self.open_group.take().is_none() {
            trace!("No shader parameter group to commit");
        }
    }

    /// Binds `texture` to the shader resource `name`. Unknown names are skipped.
    pub fn add_shader_resource(&mut self, name: &str, texture: &'a RawTexture<D>) {
        let Some(pipeline) = self.current.pipeline else {
            return;
        };
        let Some(resource) = pipeline.reflection().shader_resource(name) else {
            return;
        };

        self.shader_resources.push(ShaderResourceEntry {
            texture,
            texture_bindings: resource.texture_bindings.clone(),
            sampler_bindings: resource.sampler_bindings.clone(),
            sampler: pipeline.sampler(name),
        });
    }

    /// Like [`add_shader_resource`](Self::add_shader_resource), binding `backup` when there is
    /// no texture so the slot is never left empty.
    pub fn add_nullable_shader_resource(
        &mut self,
        name: &str,
        texture: Option<&'a RawTexture<D>>,
        backup: &'a RawTexture<D>,
    ) {
        self.add_shader_resource(name, texture.unwrap_or(backup));
    }

    /// Makes the resources added since the last commit the ones of the following commands.
    pub fn commit_shader_resources(&mut self) {
        self.current.shader_resources = self.committed_resources..self.shader_resources.len();
        self.committed_resources = self.shader_resources.len();
    }

    /// Binds a part of `texture` for unordered access to `name`.
    ///
    /// Unknown names and keys that don't fit the texture are skipped.
    pub fn add_unordered_access_view(&mut self, name: &str, texture: &'a RawTexture<D>, key: UavKey) {
        let Some(pipeline) = self.current.pipeline else {
            return;
        };
        let Some(uav) = pipeline.reflection().unordered_access_view(name) else {
            return;
        };
        if uav.is_buffer() {
            trace!("Skipping texture '{}' for '{name}', which is a storage buffer", texture.name());
            return;
        }
        let key = match key.validated(texture.params()) {
            Ok(key) => key,
            Err(e) => {
                trace!("Skipping unordered access view '{name}' of '{}': {e}", texture.name());
                return;
            }
        };

        self.unordered_access_views.push(UnorderedAccessViewEntry {
            texture,
            key,
            bindings: uav.stage_bindings.clone(),
        });
    }

    /// Binds the whole of `buffer` for unordered access to `name`.
    ///
    /// Unknown names and names the shader declares as storage textures are skipped.
    pub fn add_unordered_access_buffer(&mut self, name: &str, buffer: &'a D::Buffer) {
        let Some(pipeline) = self.current.pipeline else {
            return;
        };
        let Some(uav) = pipeline.reflection().unordered_access_view(name) else {
            return;
        };
        if !uav.is_buffer() {
            trace!("Skipping buffer for '{name}', which is a storage texture");
            return;
        }

        self.storage_buffers.push(StorageBufferEntry {
            buffer,
            bindings: uav.stage_bindings.clone(),
        });
    }

    /// Commits the views and buffers added since the last commit for the following commands.
    pub fn commit_unordered_access_views(&mut self) {
        self.current.unordered_access_views = self.committed_uavs..self.unordered_access_views.len();
        self.committed_uavs = self.unordered_access_views.len();
        self.current.storage_buffers = self.committed_storage_buffers..self.storage_buffers.len();
        self.committed_storage_buffers = self.storage_buffers.len();
    }

    pub fn draw(&mut self, vertex_start: u32, vertex_count: u32) {
        self.draw_instanced(vertex_start, vertex_count, 0, 1);
    }

    pub fn draw_indexed(&mut self, index_start: u32, index_count: u32, base_vertex: i32) {
        self.draw_indexed_instanced(index_start, index_count, base_vertex, 0, 1);
    }

    pub fn draw_instanced(&mut self, vertex_start: u32, vertex_count: u32, instance_start: u32, instance_count: u32) {
        self.push_command(DrawParams::Draw {
            indexed: false,
            start: vertex_start,
            count: vertex_count,
            base_vertex: 0,
            instance_start,
            instance_count,
        });
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_start: u32,
        index_count: u32,
        base_vertex: i32,
        instance_start: u32,
        instance_count: u32,
    ) {
        self.push_command(DrawParams::Draw {
            indexed: true,
            start: index_start,
            count: index_count,
            base_vertex,
            instance_start,
            instance_count,
        });
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push_command(DrawParams::Dispatch { x, y, z });
    }

    fn push_command(&mut self, params: DrawParams) {
        let Some(pipeline) = self.current.pipeline else {
            error!("Draw command recorded without a pipeline state");
            debug_panic!("Draw command recorded without a pipeline state");
            return;
        };

        let is_compute = pipeline.pipeline_type() == PipelineStateType::Compute;
        if is_compute != params.is_dispatch() {
            error!(
                "Pipeline '{}' is a {:?} pipeline and cannot be used for {params:?}",
                pipeline.debug_name(),
                pipeline.pipeline_type()
            );
            debug_panic!("Draw call doesn't match the pipeline type of '{}'", pipeline.debug_name());
            return;
        }

        if let DrawParams::Draw { indexed, .. } = params
            && indexed != self.current.index_buffer.is_some()
        {
            error!(
                "Indexed draw mismatch for '{}': indexed call {indexed}, index buffer bound {}",
                pipeline.debug_name(),
                self.current.index_buffer.is_some()
            );
            debug_panic!("Indexed draw doesn't match the bound index buffer");
            return;
        }

        let current = &self.current;
        self.commands.push(DrawCommandDescription {
            pipeline,
            vertex_buffers: current.vertex_buffers.clone(),
            index_buffer: current.index_buffer,
            constant_buffers: current.constant_buffers,
            shader_resources: current.shader_resources.clone(),
            unordered_access_views: current.unordered_access_views.clone(),
            storage_buffers: current.storage_buffers.clone(),
            scissor_rect: current.scissor_rect,
            stencil_ref: current.stencil_ref,
            params,
        });
    }

    /// Replays every command into `context` in recording order, then resets the queue.
    ///
    /// State is only set when it differs from the previous command. Constant buffers are
    /// uploaded before the first command that uses them, and pending resolves and mip
    /// generation of sampled textures are done before they're bound.
    pub fn execute_in_context<C: RenderContext<D>>(&mut self, device: &D, context: &mut C) -> Result<(), DeviceError> {
        let result = self.replay(device, context);
        self.reset();
        result
    }

    fn replay<C: RenderContext<D>>(&mut self, device: &D, context: &mut C) -> Result<(), DeviceError> {
        let Self {
            constant_buffers,
            commands,
            scissor_rects,
            shader_resources,
            unordered_access_views,
            storage_buffers,
            ..
        } = self;

        let mut last_pipeline: Option<&PipelineState<D>> = None;
        let mut last_vertex_buffers: VertexBuffers<'_, D> = SmallVec::new();
        let mut last_index_buffer: Option<(&D::Buffer, IndexFormat)> = None;
        let mut last_scissor: Option<ScissorRect> = None;
        let mut last_stencil: Option<u8> = None;
        let mut uploaded = vec![false; constant_buffers.num_buffers()];

        for command in commands.iter() {
            let pipeline = command.pipeline;
            if !same(last_pipeline, pipeline) {
                let Some(handle) = pipeline.handle() else {
                    warn!("Skipping command of invalidated pipeline '{}'", pipeline.debug_name());
                    continue;
                };
                context.set_pipeline(&handle);
                last_pipeline = Some(pipeline);
            }

            for (slot, buffer) in command.vertex_buffers.iter().enumerate() {
                if !same(last_vertex_buffers.get(slot).copied(), *buffer) {
                    context.set_vertex_buffer(slot as u32, buffer);
                }
            }
            last_vertex_buffers.clone_from(&command.vertex_buffers);

            if let Some((buffer, format)) = command.index_buffer {
                let changed = last_index_buffer.is_none_or(|(last, last_format)| {
                    !std::ptr::eq(last, buffer) || last_format != format
                });
                if changed {
                    context.set_index_buffer(buffer, format);
                    last_index_buffer = Some((buffer, format));
                }
            }

            if let Some(graphics) = pipeline.desc().as_graphics() {
                if graphics.scissor_test {
                    let rect = scissor_rects.get(command.scissor_rect).copied().unwrap_or_default();
                    if last_scissor != Some(rect) {
                        context.set_scissor_rect(rect);
                        last_scissor = Some(rect);
                    }
                }
                if graphics.stencil_test && last_stencil != Some(command.stencil_ref) {
                    context.set_stencil_reference(command.stencil_ref as u32);
                    last_stencil = Some(command.stencil_ref);
                }
            }

            let mut bindings: BTreeMap<BindingSlot, BoundResource<D>> = BTreeMap::new();
            let reflection = pipeline.reflection();

            for (index, block) in command.constant_buffers.iter().enumerate() {
                let Some(block) = block else {
                    continue;
                };
                let Some(buffer_reflection) =
                    ShaderParameterGroup::by_index(index).and_then(|group| reflection.uniform_buffer(group))
                else {
                    continue;
                };
                if !constant_buffers.is_current(block) {
                    debug_panic!("Draw command references a constant buffer block of an old generation");
                    continue;
                }

                let buffer_index = block.index as usize;
                if !uploaded.get(buffer_index).copied().unwrap_or(true) {
                    constant_buffers.upload_dirty(device, buffer_index)?;
                    uploaded[buffer_index] = true;
                }
                let Some(buffer) = constant_buffers.buffer(buffer_index) else {
                    continue;
                };

                for binding in &buffer_reflection.stage_bindings {
                    bindings.insert(
                        binding.slot,
                        BoundResource::Buffer {
                            buffer: buffer.clone(),
                            offset: block.offset as u64,
                            size: block.size as u64,
                        },
                    );
                }
            }

            for entry in shader_resources.get(command.shader_resources.clone()).unwrap_or_default() {
                entry.texture.prepare(device);
                let Some(view) = entry.texture.srv() else {
                    warn!("Shader resource '{}' has no device object", entry.texture.name());
                    continue;
                };
                for binding in &entry.texture_bindings {
                    bindings.insert(binding.slot, BoundResource::TextureView(view.clone()));
                }
                if let Some(sampler) = &entry.sampler {
                    for binding in &entry.sampler_bindings {
                        bindings.insert(binding.slot, BoundResource::Sampler(sampler.clone()));
                    }
                }
            }

            for entry in unordered_access_views
                .get(command.unordered_access_views.clone())
                .unwrap_or_default()
            {
                let view = match entry.texture.create_uav(device, &entry.key) {
                    Ok(view) => view,
                    Err(e) => {
                        warn!("Unordered access view of '{}' is skipped: {e}", entry.texture.name());
                        continue;
                    }
                };
                for binding in &entry.bindings {
                    bindings.insert(binding.slot, BoundResource::TextureView(view.clone()));
                }
            }

            for entry in storage_buffers.get(command.storage_buffers.clone()).unwrap_or_default() {
                for binding in &entry.bindings {
                    bindings.insert(
                        binding.slot,
                        BoundResource::Buffer {
                            buffer: entry.buffer.clone(),
                            offset: 0,
                            size: 0,
                        },
                    );
                }
            }

            if !bindings.is_empty() {
                let bindings: Vec<_> = bindings
                    .into_iter()
                    .map(|(slot, resource)| ResourceBinding { slot, resource })
                    .collect();
                context.set_bindings(&bindings)?;
            }

            match command.params {
                DrawParams::Draw {
                    indexed,
                    start,
                    count,
                    base_vertex,
                    instance_start,
                    instance_count,
                } => {
                    let instances = instance_start..instance_start + instance_count;
                    if indexed {
                        context.draw_indexed(start..start + count, base_vertex, instances);
                    } else {
                        context.draw(start..start + count, instances);
                    }
                }
                DrawParams::Dispatch { x, y, z } => context.dispatch(x, y, z),
            }
        }

        Ok(())
    }
}
