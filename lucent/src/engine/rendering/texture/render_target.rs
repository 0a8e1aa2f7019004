use crate::rendering::device::RenderDevice;
use crate::rendering::pipeline::{PipelineStateOutputDesc, RenderTargetFormats};
use crate::rendering::texture::RawTexture;
use tracing::warn;
use wgpu::TextureFormat;

/// Something that can be rendered into: a slice of a [`RawTexture`] or a view owned elsewhere,
/// like the current swap chain image.
pub enum RenderTargetView<'a, D: RenderDevice> {
    Texture {
        texture: &'a RawTexture<D>,
        slice: u32,
    },
    /// Depth-stencil slice that is tested against but not written.
    ReadOnlyDepth {
        texture: &'a RawTexture<D>,
        slice: u32,
    },
    External {
        view: &'a D::TextureView,
        format: TextureFormat,
        sample_count: u32,
        size: (u32, u32),
    },
}

impl<D: RenderDevice> Clone for RenderTargetView<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: RenderDevice> Copy for RenderTargetView<'_, D> {}

impl<'a, D: RenderDevice> RenderTargetView<'a, D> {
    pub fn texture(texture: &'a RawTexture<D>, slice: u32) -> Self {
        Self::Texture { texture, slice }
    }

    pub fn read_only_depth(texture: &'a RawTexture<D>, slice: u32) -> Self {
        Self::ReadOnlyDepth { texture, slice }
    }

    pub fn external(view: &'a D::TextureView, format: TextureFormat, sample_count: u32, size: (u32, u32)) -> Self {
        Self::External {
            view,
            format,
            sample_count,
            size,
        }
    }

    pub fn format(&self) -> TextureFormat {
        match self {
            Self::Texture { texture, .. } | Self::ReadOnlyDepth { texture, .. } => texture.view_format(),
            Self::External { format, .. } => *format,
        }
    }

    pub fn multi_sample(&self) -> u32 {
        match self {
            Self::Texture { texture, .. } | Self::ReadOnlyDepth { texture, .. } => texture.params().multi_sample,
            Self::External { sample_count, .. } => (*sample_count).max(1),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        match self {
            Self::Texture { texture, .. } | Self::ReadOnlyDepth { texture, .. } => {
                let (width, height, _) = texture.params().size;
                (width, height)
            }
            Self::External { size, .. } => *size,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnlyDepth { .. })
    }

    /// The view to attach. `None` if the texture has no device objects or can't be bound this way.
    pub fn view(&self) -> Option<&'a D::TextureView> {
        match *self {
            Self::Texture { texture, slice } => {
                if texture.params().is_depth_stencil() {
                    texture.dsv(slice)
                } else {
                    texture.rtv(slice)
                }
            }
            Self::ReadOnlyDepth { texture, slice } => texture.dsv_read_only(slice),
            Self::External { view, .. } => Some(view),
        }
    }
}

/// Formats of the attachments a pass renders into, compared against pipeline outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundRenderTargets {
    pub depth_stencil_format: Option<TextureFormat>,
    pub render_target_formats: RenderTargetFormats,
    pub multi_sample: u32,
}

impl BoundRenderTargets {
    pub fn from_views<D: RenderDevice>(
        depth_stencil: Option<&RenderTargetView<'_, D>>,
        render_targets: &[RenderTargetView<'_, D>],
    ) -> Self {
        let multi_sample = depth_stencil
            .into_iter()
            .chain(render_targets)
            .map(RenderTargetView::multi_sample)
            .next()
            .unwrap_or(1);

        let mismatch = depth_stencil
            .into_iter()
            .chain(render_targets)
            .any(|view| view.multi_sample() != multi_sample);
        if mismatch {
            warn!("Bound render targets disagree on multisampling, assuming {multi_sample}x");
        }

        Self {
            depth_stencil_format: depth_stencil.map(RenderTargetView::format),
            render_target_formats: render_targets.iter().map(RenderTargetView::format).collect(),
            multi_sample,
        }
    }

    pub fn to_output_desc(&self) -> PipelineStateOutputDesc {
        PipelineStateOutputDesc {
            depth_stencil_format: self.depth_stencil_format,
            render_target_formats: self.render_target_formats.clone(),
            multi_sample: self.multi_sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::defs::TextureFlags;
    use crate::rendering::device::{HeadlessDevice, HeadlessTextureView};
    use crate::rendering::texture::RawTextureParams;

    #[test]
    fn bound_formats_follow_the_views() {
        let device = HeadlessDevice::new();
        let color = RawTexture::with_params(
            &device,
            "color",
            RawTextureParams::builder()
                .size((32, 32, 1))
                .format(TextureFormat::Rgba16Float)
                .flags(TextureFlags::BIND_RENDER_TARGET)
                .multi_sample(4)
                .build(),
        )
        .unwrap();
        let depth = RawTexture::with_params(
            &device,
            "depth",
            RawTextureParams::builder()
                .size((32, 32, 1))
                .format(TextureFormat::Depth32Float)
                .flags(TextureFlags::BIND_DEPTH_STENCIL)
                .multi_sample(4)
                .build(),
        )
        .unwrap();

        let depth_view = RenderTargetView::read_only_depth(&depth, 0);
        let bound = BoundRenderTargets::from_views(Some(&depth_view), &[RenderTargetView::texture(&color, 0)]);

        assert_eq!(bound.depth_stencil_format, Some(TextureFormat::Depth32Float));
        assert_eq!(bound.render_target_formats.as_slice(), [TextureFormat::Rgba16Float]);
        assert_eq!(bound.multi_sample, 4);
        assert!(depth_view.is_read_only());
        assert_eq!(depth_view.view().map(|v| v.id), depth.dsv_read_only(0).map(|v| v.id));
    }

    #[test]
    fn external_views_report_what_they_are_given() {
        let view = HeadlessTextureView {
            id: 7,
            texture: 3,
            label: "swap chain".to_string(),
            format: Some(TextureFormat::Bgra8UnormSrgb),
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: None,
        };
        let target = RenderTargetView::<HeadlessDevice>::external(&view, TextureFormat::Bgra8UnormSrgb, 0, (800, 600));

        assert_eq!(target.multi_sample(), 1);
        assert_eq!(target.size(), (800, 600));
        assert_eq!(target.view().map(|v| v.id), Some(7));

        let bound = BoundRenderTargets::from_views(None, &[target]);
        assert_eq!(bound.depth_stencil_format, None);
        assert_eq!(bound.to_output_desc().render_target_formats.as_slice(), [TextureFormat::Bgra8UnormSrgb]);
    }
}
