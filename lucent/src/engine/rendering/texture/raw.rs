use crate::rendering::defs::TextureType;
use crate::rendering::device::{RenderDevice, TextureRegion};
use crate::rendering::texture::error::*;
use crate::rendering::texture::params::{
    block_bytes, mip_level_size, mip_level_size_in_bytes, region_fits, size_in_blocks, validate_params, RawTextureParams,
};
use crate::rendering::texture::uav::UavKey;
use lucent_utils::{align_up, is_aligned};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{error, trace, warn};
use wgpu::{
    Extent3d, Origin3d, TextureAspect, TextureDescriptor, TextureFormat, TextureUsages, TextureViewDescriptor,
    TextureViewDimension,
};

const UPDATE_ROW_ALIGNMENT: u32 = 4;

/// Gets a texture back its contents after a device loss.
pub trait TextureRestorer<D: RenderDevice> {
    /// Recreates `texture` (usually through [`RawTexture::create`] with
    /// [`requested_params`](RawTexture::requested_params)) and uploads its data again.
    ///
    /// Returns whether the contents are complete again.
    fn try_restore(&mut self, device: &D, texture: &mut RawTexture<D>) -> bool;
}

struct TextureHandles<D: RenderDevice> {
    texture: D::Texture,
    /// Single-sampled companion of an auto-resolved multisampled texture.
    resolved: Option<D::Texture>,
    srv: D::TextureView,
    /// Default render target or depth-stencil view.
    target: Option<D::TextureView>,
    target_read_only: Option<D::TextureView>,
    surfaces: Vec<D::TextureView>,
    surfaces_read_only: Vec<D::TextureView>,
}

/// A GPU texture together with all the views the renderer needs of it.
///
/// Multisampled textures are resolved into a single-sampled companion that is what shaders
/// sample, unless [`NO_MULTI_SAMPLED_AUTO_RESOLVE`](crate::rendering::defs::TextureFlags) is set.
/// Resolving and mip generation happen lazily, [`mark_dirty`](Self::mark_dirty) after rendering
/// into the texture and [`prepare`](Self::prepare) before it's read.
pub struct RawTexture<D: RenderDevice> {
    name: String,
    requested: Option<RawTextureParams>,
    params: RawTextureParams,
    handles: Option<TextureHandles<D>>,
    uavs: RwLock<HashMap<UavKey, D::TextureView>>,

    levels_dirty: AtomicBool,
    resolve_dirty: AtomicBool,
    data_lost: bool,
}

impl<D: RenderDevice> RawTexture<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requested: None,
            params: RawTextureParams::default(),
            handles: None,
            uavs: RwLock::default(),
            levels_dirty: AtomicBool::new(false),
            resolve_dirty: AtomicBool::new(false),
            data_lost: false,
        }
    }

    pub fn with_params(device: &D, name: impl Into<String>, params: RawTextureParams) -> Result<Self, TextureError> {
        let mut texture = Self::new(name);
        texture.create(device, params)?;
        Ok(texture)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The effective parameters after validation.
    pub fn params(&self) -> &RawTextureParams {
        &self.params
    }

    /// The parameters the texture was last created with, before validation.
    pub fn requested_params(&self) -> Option<&RawTextureParams> {
        self.requested.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.handles.is_some()
    }

    /// Creates the texture. Does nothing if it already exists with the same parameters.
    ///
    /// On failure the texture is left without device objects.
    pub fn create(&mut self, device: &D, params: RawTextureParams) -> Result<(), TextureError> {
        if self.requested.as_ref() == Some(&params) && self.handles.is_some() {
            return Ok(());
        }

        self.destroy();
        self.requested = Some(params.clone());
        self.params = params;

        validate_params(&mut self.params, device)?;

        let result = self.create_gpu(device);
        if let Err(e) = &result {
            error!("{e}");
            self.destroy();
        }
        result
    }

    fn create_gpu(&mut self, device: &D) -> Result<(), TextureError> {
        self.handles = Some(self.create_handles(device)?);
        if self.params.is_unordered_access() {
            self.create_uav(device, &UavKey::default())?;
        }
        trace!(
            "Created texture '{}' {:?} {:?} {:?}x{} with {} levels",
            self.name,
            self.params.ty,
            self.params.format,
            self.params.size,
            self.params.array_size,
            self.params.num_levels
        );
        Ok(())
    }

    fn texture_usages(&self) -> TextureUsages {
        let params = &self.params;
        let mut usage = TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_SRC | TextureUsages::COPY_DST;

        // mips are generated by rendering into every level
        let renders_mips = params.num_levels_rtv > 1
            && !params.format.is_depth_stencil_format()
            && !params.format.is_compressed();
        if params.is_render_target() || params.is_depth_stencil() || renders_mips {
            usage |= TextureUsages::RENDER_ATTACHMENT;
        }
        if params.is_unordered_access() {
            usage |= TextureUsages::STORAGE_BINDING;
        }
        usage
    }

    fn create_handles(&self, device: &D) -> Result<TextureHandles<D>, TextureError> {
        let params = &self.params;
        let extent = Extent3d {
            width: params.size.0,
            height: params.size.1,
            depth_or_array_layers: match params.ty {
                TextureType::Texture3D => params.size.2,
                _ => params.array_size,
            },
        };

        let texture = device
            .create_texture(&TextureDescriptor {
                label: Some(self.name.as_str()),
                size: extent,
                mip_level_count: params.num_levels_rtv,
                sample_count: params.multi_sample,
                dimension: params.ty.dimension(),
                format: params.format,
                usage: self.texture_usages(),
                view_formats: &[],
            })
            .context(DeviceErr { name: &self.name })?;

        let resolved = if params.auto_resolves() {
            let label = format!("{}:resolved", self.name);
            let resolved = device
                .create_texture(&TextureDescriptor {
                    label: Some(label.as_str()),
                    size: extent,
                    mip_level_count: params.num_levels,
                    sample_count: 1,
                    dimension: params.ty.dimension(),
                    format: params.format,
                    usage: self.texture_usages() | TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .context(DeviceErr { name: &self.name })?;
            Some(resolved)
        } else {
            None
        };

        let srv = {
            let label = format!("{}:srv", self.name);
            let (format, aspect) = self.sampled_format();
            device
                .create_texture_view(
                    resolved.as_ref().unwrap_or(&texture),
                    &TextureViewDescriptor {
                        label: Some(label.as_str()),
                        format: Some(format),
                        dimension: Some(params.ty.view_dimension()),
                        aspect,
                        ..Default::default()
                    },
                )
                .context(DeviceErr { name: &self.name })?
        };

        let mut handles = TextureHandles {
            texture,
            resolved,
            srv,
            target: None,
            target_read_only: None,
            surfaces: Vec::new(),
            surfaces_read_only: Vec::new(),
        };

        if params.is_render_target() || params.is_depth_stencil() {
            let kind = if params.is_render_target() { "rtv" } else { "dsv" };
            let target = self.target_view(device, &handles.texture, kind)?;
            handles.surfaces = self.render_surfaces(device, &handles.texture, kind, &target)?;
            handles.target = Some(target);
        }

        if params.is_depth_stencil() {
            let target = self.target_view(device, &handles.texture, "dsv-read-only")?;
            handles.surfaces_read_only = self.render_surfaces(device, &handles.texture, "dsv-read-only", &target)?;
            handles.target_read_only = Some(target);
        }

        Ok(handles)
    }

    /// Format and aspect shaders see when sampling the texture.
    fn sampled_format(&self) -> (TextureFormat, TextureAspect) {
        let format = self.params.format;
        if format.is_combined_depth_stencil_format() {
            let depth = format.aspect_specific_format(TextureAspect::DepthOnly).unwrap_or(format);
            return (depth, TextureAspect::DepthOnly);
        }
        (format, TextureAspect::All)
    }

    fn target_view(&self, device: &D, texture: &D::Texture, kind: &str) -> Result<D::TextureView, TextureError> {
        let label = format!("{}:{kind}", self.name);
        let dimension = match self.params.ty {
            TextureType::Texture2D => TextureViewDimension::D2,
            TextureType::TextureCube | TextureType::Texture2DArray => TextureViewDimension::D2Array,
            TextureType::Texture3D => TextureViewDimension::D3,
        };
        device
            .create_texture_view(
                texture,
                &TextureViewDescriptor {
                    label: Some(label.as_str()),
                    format: Some(self.params.format),
                    dimension: Some(dimension),
                    mip_level_count: Some(1),
                    ..Default::default()
                },
            )
            .context(DeviceErr { name: &self.name })
    }

    /// One view per renderable slice. 2D textures reuse their default view, 3D ones have none.
    fn render_surfaces(
        &self,
        device: &D,
        texture: &D::Texture,
        kind: &str,
        default: &D::TextureView,
    ) -> Result<Vec<D::TextureView>, TextureError> {
        match self.params.ty {
            TextureType::Texture2D => Ok(vec![default.clone()]),
            TextureType::Texture3D => Ok(Vec::new()),
            TextureType::TextureCube | TextureType::Texture2DArray => (0..self.params.array_size)
                .map(|slice| {
                    let label = format!("{}:{kind}:{slice}", self.name);
                    device
                        .create_texture_view(
                            texture,
                            &TextureViewDescriptor {
                                label: Some(label.as_str()),
                                format: Some(self.params.format),
                                dimension: Some(TextureViewDimension::D2),
                                mip_level_count: Some(1),
                                base_array_layer: slice,
                                array_layer_count: Some(1),
                                ..Default::default()
                            },
                        )
                        .context(DeviceErr { name: &self.name })
                })
                .collect(),
        }
    }

    fn destroy(&mut self) {
        self.handles = None;
        self.uavs.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.levels_dirty.store(false, Ordering::Relaxed);
        self.resolve_dirty.store(false, Ordering::Relaxed);
    }

    /// Returns the unordered access view for `key`, creating it if needed.
    ///
    /// Equivalent keys share one view, so a key with open ranges and one spelling out the same
    /// ranges explicitly get the same view back.
    pub fn create_uav(&self, device: &D, key: &UavKey) -> Result<D::TextureView, TextureError> {
        let handles = self.handles.as_ref().context(UninitializedErr { name: &self.name })?;

        if let Some(view) = self.uav(key) {
            return Ok(view);
        }

        let effective = key.validated(&self.params)?;
        if let Some(view) = self.uav(&effective) {
            self.uavs
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(*key, view.clone());
            return Ok(view);
        }

        let label = format!("{}:{effective}", self.name);
        let dimension = match self.params.ty {
            TextureType::Texture2D => TextureViewDimension::D2,
            TextureType::TextureCube | TextureType::Texture2DArray => TextureViewDimension::D2Array,
            TextureType::Texture3D => TextureViewDimension::D3,
        };
        let (base_array_layer, array_layer_count) = match self.params.ty {
            TextureType::Texture3D => (0, None),
            _ => (effective.first_slice, Some(effective.num_slices)),
        };

        let view = device
            .create_texture_view(
                &handles.texture,
                &TextureViewDescriptor {
                    label: Some(label.as_str()),
                    format: Some(self.params.format),
                    dimension: Some(dimension),
                    base_mip_level: effective.first_level,
                    mip_level_count: Some(effective.num_levels),
                    base_array_layer,
                    array_layer_count,
                    ..Default::default()
                },
            )
            .context(DeviceErr { name: &self.name })?;

        let mut uavs = self.uavs.write().unwrap_or_else(PoisonError::into_inner);
        uavs.insert(*key, view.clone());
        uavs.insert(effective, view.clone());
        Ok(view)
    }

    pub fn uav(&self, key: &UavKey) -> Option<D::TextureView> {
        self.uavs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn texture_region(&self, level: u32, slice: u32, offset: (u32, u32, u32), size: (u32, u32, u32)) -> TextureRegion {
        let is_3d = self.params.ty.is_3d();
        TextureRegion {
            level,
            slice,
            origin: Origin3d {
                x: offset.0,
                y: offset.1,
                z: if is_3d { offset.2 } else { 0 },
            },
            size: Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: if is_3d { size.2 } else { 1 },
            },
        }
    }

    /// Uploads a region of one mip level of one slice.
    ///
    /// `row_pitch` is the distance between rows of blocks in `data`, 0 for tightly packed rows.
    /// Rows that aren't aligned to 4 bytes are repacked before the upload.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &self,
        device: &D,
        level: u32,
        offset: (u32, u32, u32),
        size: (u32, u32, u32),
        slice: u32,
        data: &[u8],
        row_pitch: u32,
    ) -> Result<(), TextureError> {
        let params = &self.params;
        ensure!(
            level < params.num_levels_rtv,
            InvalidLevelErr {
                level,
                levels: params.num_levels_rtv
            }
        );
        ensure!(
            slice < params.array_size,
            InvalidSliceErr {
                slice,
                slices: params.array_size
            }
        );

        let level_size = mip_level_size(params.size, level);
        ensure!(
            region_fits(offset, size, level_size),
            RegionOutOfBoundsErr {
                level,
                offset,
                size,
                level_size
            }
        );

        let block = params.format.block_dimensions();
        if !params.ty.is_3d() {
            ensure!(
                is_aligned(offset.0 as u64, block.0 as u64) && is_aligned(offset.1 as u64, block.1 as u64),
                MisalignedRegionErr {
                    format: params.format,
                    offset: (offset.0, offset.1),
                    block
                }
            );
        }

        let handles = self.handles.as_ref().context(UninitializedErr { name: &self.name })?;

        let (width, height, depth) = size_in_blocks(size, params.format);
        let row_bytes = width * block_bytes(params.format);
        let row_pitch = if row_pitch == 0 { row_bytes } else { row_pitch };
        let rows = height * depth;

        let needed = (rows - 1) as u64 * row_pitch as u64 + row_bytes as u64;
        ensure!(
            data.len() as u64 >= needed,
            BufferTooSmallErr {
                needed,
                got: data.len() as u64
            }
        );

        let region = self.texture_region(level, slice, offset, size);

        if row_pitch % UPDATE_ROW_ALIGNMENT == 0 {
            device.write_texture(&handles.texture, &region, data, row_pitch);
        } else {
            let aligned_pitch = align_up(row_pitch as u64, UPDATE_ROW_ALIGNMENT as u64) as u32;
            warn!(
                "Texture '{}' is updated with rows {row_pitch} bytes apart, repacking them to {UPDATE_ROW_ALIGNMENT} byte alignment",
                self.name
            );

            let mut packed = vec![0; (aligned_pitch * rows) as usize];
            for row in 0..rows as usize {
                let src = row * row_pitch as usize;
                let dst = row * aligned_pitch as usize;
                packed[dst..dst + row_bytes as usize].copy_from_slice(&data[src..src + row_bytes as usize]);
            }
            device.write_texture(&handles.texture, &region, &packed, aligned_pitch);
        }

        if level == 0 {
            self.mark_dirty();
        }

        Ok(())
    }

    /// Reads a whole mip level of one slice into `buffer`, tightly packed.
    ///
    /// Pending resolves and mip generation are done first.
    pub fn read(&self, device: &D, slice: u32, level: u32, buffer: &mut [u8]) -> Result<(), TextureError> {
        let handles = self.handles.as_ref().context(UninitializedErr { name: &self.name })?;
        let params = &self.params;

        ensure!(
            level < params.num_levels,
            InvalidLevelErr {
                level,
                levels: params.num_levels
            }
        );
        ensure!(
            slice < params.array_size,
            InvalidSliceErr {
                slice,
                slices: params.array_size
            }
        );

        let needed = mip_level_size_in_bytes(params.size, level, params.format);
        ensure!(
            buffer.len() as u64 >= needed,
            BufferTooSmallErr {
                needed,
                got: buffer.len() as u64
            }
        );

        self.prepare(device);

        let level_size = mip_level_size(params.size, level);
        let region = self.texture_region(level, slice, (0, 0, 0), level_size);
        let source = handles.resolved.as_ref().unwrap_or(&handles.texture);
        let mapped = device
            .read_texture(source, &region)
            .context(DeviceErr { name: &self.name })?;

        let (width, height, depth) = size_in_blocks(level_size, params.format);
        let row_bytes = (width * block_bytes(params.format)) as usize;
        for row in 0..(height * depth) as usize {
            let src = row * mapped.row_pitch as usize;
            let dst = row * row_bytes;
            let (Some(from), Some(to)) = (
                mapped.data.get(src..src + row_bytes),
                buffer.get_mut(dst..dst + row_bytes),
            ) else {
                break;
            };
            to.copy_from_slice(from);
        }

        Ok(())
    }

    /// Flags the contents as changed, scheduling a resolve and mip generation.
    pub fn mark_dirty(&self) {
        if self.params.num_levels > 1 {
            self.levels_dirty.store(true, Ordering::Relaxed);
        }
        if self.params.multi_sample > 1 && self.params.auto_resolves() {
            self.resolve_dirty.store(true, Ordering::Relaxed);
        }
    }

    pub fn levels_dirty(&self) -> bool {
        self.levels_dirty.load(Ordering::Relaxed)
    }

    pub fn resolve_dirty(&self) -> bool {
        self.resolve_dirty.load(Ordering::Relaxed)
    }

    /// Resolves the multisampled texture into its single-sampled companion.
    pub fn resolve(&self, device: &D) {
        if let Some(handles) = &self.handles
            && let Some(resolved) = &handles.resolved
        {
            device.resolve_texture(&handles.texture, resolved);
            if self.params.num_levels > 1 {
                self.levels_dirty.store(true, Ordering::Relaxed);
            }
        }
        self.resolve_dirty.store(false, Ordering::Relaxed);
    }

    /// Regenerates every mip level below the first from it.
    pub fn generate_levels(&self, device: &D) {
        if self.params.num_levels > 1 {
            let Some(handles) = &self.handles else {
                warn!("Cannot generate levels of uninitialized texture '{}'", self.name);
                return;
            };
            let texture = handles.resolved.as_ref().unwrap_or(&handles.texture);
            if let Err(e) = device.generate_mips(texture) {
                warn!("Failed to generate levels of texture '{}': {e}", self.name);
            }
        }
        self.levels_dirty.store(false, Ordering::Relaxed);
    }

    /// Does any pending resolve and mip generation so the texture can be sampled.
    pub fn prepare(&self, device: &D) {
        if self.resolve_dirty() {
            self.resolve(device);
        }
        if self.levels_dirty() {
            self.generate_levels(device);
        }
    }

    /// Drops every device object, as after a device loss. The parameters are kept.
    pub fn invalidate(&mut self) {
        self.destroy();
    }

    /// Recreates the device objects after [`invalidate`](Self::invalidate).
    ///
    /// The contents are lost unless `restorer` manages to bring them back, which
    /// [`data_lost`](Self::data_lost) reports.
    pub fn restore(&mut self, device: &D, restorer: Option<&mut dyn TextureRestorer<D>>) -> Result<(), TextureError> {
        if self.handles.is_some() {
            return Ok(());
        }
        if self.params.size == (0, 0, 0) {
            self.data_lost = false;
            return Ok(());
        }

        if let Some(restorer) = restorer
            && restorer.try_restore(device, self)
        {
            self.data_lost = false;
            return Ok(());
        }

        self.data_lost = true;
        if self.handles.is_some() {
            return Ok(());
        }
        let result = self.create_gpu(device);
        if let Err(e) = &result {
            error!("{e}");
            self.destroy();
        }
        result
    }

    pub fn data_lost(&self) -> bool {
        self.data_lost
    }

    pub fn clear_data_lost(&mut self) {
        self.data_lost = false;
    }

    pub fn texture(&self) -> Option<&D::Texture> {
        self.handles.as_ref().map(|h| &h.texture)
    }

    pub fn resolved_texture(&self) -> Option<&D::Texture> {
        self.handles.as_ref().and_then(|h| h.resolved.as_ref())
    }

    /// View shaders sample.
    pub fn srv(&self) -> Option<&D::TextureView> {
        self.handles.as_ref().map(|h| &h.srv)
    }

    fn surface<'s>(
        &'s self,
        default: Option<&'s D::TextureView>,
        surfaces: &'s [D::TextureView],
        slice: u32,
    ) -> Option<&'s D::TextureView> {
        match self.params.ty {
            TextureType::Texture3D if slice == 0 => default,
            _ => surfaces.get(slice as usize),
        }
    }

    /// Render target view of one slice, or one cube face.
    pub fn rtv(&self, slice: u32) -> Option<&D::TextureView> {
        if !self.params.is_render_target() {
            return None;
        }
        let handles = self.handles.as_ref()?;
        self.surface(handles.target.as_ref(), &handles.surfaces, slice)
    }

    pub fn dsv(&self, slice: u32) -> Option<&D::TextureView> {
        if !self.params.is_depth_stencil() {
            return None;
        }
        let handles = self.handles.as_ref()?;
        self.surface(handles.target.as_ref(), &handles.surfaces, slice)
    }

    /// Depth-stencil view for passes that test against but don't write depth.
    pub fn dsv_read_only(&self, slice: u32) -> Option<&D::TextureView> {
        let handles = self.handles.as_ref()?;
        self.surface(handles.target_read_only.as_ref(), &handles.surfaces_read_only, slice)
    }

    /// Format the render target and depth-stencil views are created with.
    pub fn view_format(&self) -> TextureFormat {
        self.params.format
    }

    /// Approximate GPU memory taken by the texture, resolve companion included.
    pub fn calculate_memory_use_gpu(&self) -> u64 {
        let Some(handles) = &self.handles else {
            return 0;
        };
        let params = &self.params;

        let mut slice_memory = 0;
        if handles.resolved.is_some() {
            slice_memory += params.multi_sample as u64 * mip_level_size_in_bytes(params.size, 0, params.format);
        }
        for level in 0..params.num_levels {
            slice_memory += mip_level_size_in_bytes(params.size, level, params.format);
        }

        params.array_size as u64 * slice_memory
    }
}

impl<D: RenderDevice> std::fmt::Debug for RawTexture<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawTexture")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("valid", &self.is_valid())
            .field("data_lost", &self.data_lost)
            .finish()
    }
}
