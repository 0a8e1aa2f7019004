use super::{WgpuDevice, WgpuPipeline, WgpuPipelineKind};
use crate::rendering::device::{
    BoundResource, DeviceError, MissingBindGroupLayoutErr, RenderContext, ResourceBinding,
    ScissorRect,
};
use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::ops::Range;
use tracing::error;
use wgpu::{
    BindGroupDescriptor, BindGroupEntry, BindingResource, Buffer, BufferBinding, ComputePass,
    IndexFormat, RenderPass,
};

pub enum WgpuPass<'a, 'p> {
    Render(&'a mut RenderPass<'p>),
    Compute(&'a mut ComputePass<'p>),
}

/// Records into an open render or compute pass.
///
/// Bind groups are created on the fly from the layouts of the pipeline that was set last.
pub struct WgpuRenderContext<'a, 'p> {
    device: &'a WgpuDevice,
    pass: WgpuPass<'a, 'p>,
    pipeline: Option<WgpuPipeline>,
}

impl<'a, 'p> WgpuRenderContext<'a, 'p> {
    pub fn render(device: &'a WgpuDevice, pass: &'a mut RenderPass<'p>) -> Self {
        Self {
            device,
            pass: WgpuPass::Render(pass),
            pipeline: None,
        }
    }

    pub fn compute(device: &'a WgpuDevice, pass: &'a mut ComputePass<'p>) -> Self {
        Self {
            device,
            pass: WgpuPass::Compute(pass),
            pipeline: None,
        }
    }

    fn render_pass(&mut self, operation: &str) -> Option<&mut RenderPass<'p>> {
        match &mut self.pass {
            WgpuPass::Render(pass) => Some(&mut **pass),
            WgpuPass::Compute(_) => {
                error!("Cannot {operation} in a compute pass");
                None
            }
        }
    }
}

impl RenderContext<WgpuDevice> for WgpuRenderContext<'_, '_> {
    fn set_pipeline(&mut self, pipeline: &WgpuPipeline) {
        match (&mut self.pass, &pipeline.kind) {
            (WgpuPass::Render(pass), WgpuPipelineKind::Render(render)) => pass.set_pipeline(render),
            (WgpuPass::Compute(pass), WgpuPipelineKind::Compute(compute)) => pass.set_pipeline(compute),
            _ => {
                error!("Pipeline kind doesn't match the kind of the pass it is set on");
                return;
            }
        }
        self.pipeline = Some(pipeline.clone());
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &Buffer) {
        if let Some(pass) = self.render_pass("bind vertex buffers") {
            pass.set_vertex_buffer(slot, buffer.slice(..));
        }
    }

    fn set_index_buffer(&mut self, buffer: &Buffer, format: IndexFormat) {
        if let Some(pass) = self.render_pass("bind an index buffer") {
            pass.set_index_buffer(buffer.slice(..), format);
        }
    }

    fn set_scissor_rect(&mut self, rect: ScissorRect) {
        if let Some(pass) = self.render_pass("set a scissor rect") {
            pass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
        }
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        if let Some(pass) = self.render_pass("set a stencil reference") {
            pass.set_stencil_reference(reference);
        }
    }

    fn set_bindings(&mut self, bindings: &[ResourceBinding<WgpuDevice>]) -> Result<(), DeviceError> {
        let Some(pipeline) = self.pipeline.clone() else {
            let group = bindings.first().map_or(0, |b| b.slot.group);
            return MissingBindGroupLayoutErr { group }.fail();
        };

        let mut groups: BTreeMap<u32, Vec<BindGroupEntry>> = BTreeMap::new();
        for binding in bindings {
            let resource = match &binding.resource {
                BoundResource::Buffer { buffer, offset, size } => BindingResource::Buffer(BufferBinding {
                    buffer,
                    offset: *offset,
                    size: NonZeroU64::new(*size),
                }),
                BoundResource::TextureView(view) => BindingResource::TextureView(view),
                BoundResource::Sampler(sampler) => BindingResource::Sampler(sampler),
            };
            groups.entry(binding.slot.group).or_default().push(BindGroupEntry {
                binding: binding.slot.binding,
                resource,
            });
        }

        if let Some(&group) = groups.keys().last() {
            if group as usize >= pipeline.bind_group_layouts.len() {
                return MissingBindGroupLayoutErr { group }.fail();
            }
        }

        for (group, layout) in pipeline.bind_group_layouts.iter().enumerate() {
            let entries = groups.get(&(group as u32)).map(Vec::as_slice).unwrap_or_default();
            let bind_group = self.device.device().create_bind_group(&BindGroupDescriptor {
                label: Some("Lucent Draw Bind Group"),
                layout,
                entries,
            });

            match &mut self.pass {
                WgpuPass::Render(pass) => pass.set_bind_group(group as u32, &bind_group, &[]),
                WgpuPass::Compute(pass) => pass.set_bind_group(group as u32, &bind_group, &[]),
            }
        }

        Ok(())
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        if let Some(pass) = self.render_pass("draw") {
            pass.draw(vertices, instances);
        }
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        if let Some(pass) = self.render_pass("draw") {
            pass.draw_indexed(indices, base_vertex, instances);
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        match &mut self.pass {
            WgpuPass::Compute(pass) => pass.dispatch_workgroups(x, y, z),
            WgpuPass::Render(_) => error!("Cannot dispatch in a render pass"),
        }
    }
}
