use crate::rendering::device::RenderDevice;
use crate::rendering::pipeline::desc::{GraphicsPipelineStateDesc, PipelineStateDesc};
use crate::rendering::pipeline::error::PipelineError;
use crate::rendering::pipeline::state::PipelineState;
use crate::rendering::texture::BoundRenderTargets;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, trace, warn};

/// Built pipelines by structural descriptor hash.
///
/// Identical descriptors always share one [`PipelineState`]. Failed builds are never stored, the
/// next [`build`](Self::build) with the same descriptor tries again from scratch.
pub struct PipelineStateCache<D: RenderDevice> {
    states: DashMap<u64, Arc<PipelineState<D>>>,
    misses: AtomicUsize,
}

impl<D: RenderDevice> Default for PipelineStateCache<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Overwrites the output formats of `desc` with the ones actually bound.
fn heal_output(desc: &mut GraphicsPipelineStateDesc, bound: &BoundRenderTargets) {
    let output = &mut desc.output;
    let name = &desc.debug_name;

    if output.depth_stencil_format != bound.depth_stencil_format {
        warn!(
            "Pipeline '{name}' expects depth-stencil format {:?} but {:?} is bound, using the bound format",
            output.depth_stencil_format, bound.depth_stencil_format
        );
        output.depth_stencil_format = bound.depth_stencil_format;
    }

    if output.render_target_formats != bound.render_target_formats {
        warn!(
            "Pipeline '{name}' expects render target formats {:?} but {:?} are bound, using the bound formats",
            output.render_target_formats.as_slice(),
            bound.render_target_formats.as_slice()
        );
        output.render_target_formats = bound.render_target_formats.clone();
    }

    if output.multi_sample.max(1) != bound.multi_sample.max(1) {
        warn!(
            "Pipeline '{name}' expects {}x multisampling but the bound targets use {}x",
            output.multi_sample, bound.multi_sample
        );
        output.multi_sample = bound.multi_sample.max(1);
    }
}

impl<D: RenderDevice> PipelineStateCache<D> {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            misses: AtomicUsize::new(0),
        }
    }

    /// Returns the pipeline for `desc`, building it on a cache miss.
    ///
    /// When `bound` is given the output formats of a graphics descriptor are checked against it
    /// first. Mismatches are corrected on a local copy with a warning, and that corrected copy
    /// is what gets hashed and stored.
    pub fn build(
        &self,
        device: &D,
        desc: &PipelineStateDesc,
        bound: Option<&BoundRenderTargets>,
    ) -> Result<Arc<PipelineState<D>>, PipelineError> {
        let mut desc = desc.clone();
        if let (PipelineStateDesc::Graphics(graphics), Some(bound)) = (&mut desc, bound) {
            heal_output(graphics, bound);
        }
        let hash = desc.to_hash();

        let cached = self.states.get(&hash).map(|state| state.clone());
        if let Some(state) = cached {
            trace!("Pipeline cache hit for {}", state.debug_name());
            if !state.is_valid() {
                state.restore(device).inspect_err(|e| error!("{e}"))?;
            }
            return Ok(state);
        }

        let misses = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("Pipeline cache miss #{misses} for '{}' #{hash}", desc.debug_name());

        let state = match PipelineState::new(device, desc, hash) {
            Ok(state) => state,
            Err(e) => {
                error!("{e}");
                return Err(e);
            }
        };

        Ok(self.states.entry(hash).or_insert_with(|| Arc::new(state)).clone())
    }

    pub fn get(&self, hash: u64) -> Option<Arc<PipelineState<D>>> {
        self.states.get(&hash).map(|state| state.clone())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of builds that had to create a new pipeline.
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Drops the device objects of every pipeline, as after a device loss.
    pub fn invalidate_all(&self) {
        for state in self.states.iter() {
            state.invalidate();
        }
    }

    /// Recreates every invalidated pipeline. Failures are logged and left invalid.
    ///
    /// Returns how many pipelines were restored.
    pub fn restore_all(&self, device: &D) -> usize {
        let mut restored = 0;
        for state in self.states.iter() {
            if state.is_valid() {
                continue;
            }
            match state.restore(device) {
                Ok(()) => restored += 1,
                Err(e) => error!("{e}"),
            }
        }
        restored
    }

    /// Invalidates and evicts every pipeline built with the shader whose hash is `shader_hash`.
    ///
    /// States still held elsewhere stay invalid, callers rebuild them with the reloaded shader.
    pub fn invalidate_shader(&self, shader_hash: u64) -> usize {
        let mut evicted = 0;
        self.states.retain(|_, state| {
            if !state.desc().uses_shader(shader_hash) {
                return true;
            }
            state.invalidate();
            evicted += 1;
            false
        });
        evicted
    }

    pub fn clear(&self) {
        self.states.clear();
    }
}
