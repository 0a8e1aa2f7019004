//! Matching of vertex shader inputs against the elements vertex buffers provide.
//!
//! Buffers may carry more attributes than a particular shader variant reads. Those extras are
//! kept in the layout at input slots after the shader's own, so every permutation of a shader can
//! share the same vertex buffers.

use crate::rendering::defs::{
    InputLayoutElementDesc, VertexElementSemantic, VertexElementType, VertexShaderAttribute,
};
use itertools::Itertools;
use tracing::debug;
use wgpu::{VertexAttribute, VertexFormat, VertexStepMode};

/// One entry of a concrete input layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedVertexAttribute {
    pub input_index: u32,
    pub buffer_slot: u32,
    pub format: VertexFormat,
    pub offset: u32,
    pub stride: u32,
    pub step_mode: VertexStepMode,
    pub semantic: VertexElementSemantic,
    pub semantic_index: u8,
}

/// Vertex buffer binding with all attributes read from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferDesc {
    pub slot: u32,
    pub stride: u64,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

/// Format the GPU reads a buffer element with.
///
/// Blend indices are always fetched as unsigned bytes and byte colors are always normalized,
/// whatever the buffer declares.
pub fn element_format(semantic: VertexElementSemantic, element_type: VertexElementType) -> VertexFormat {
    match (semantic, element_type) {
        (VertexElementSemantic::BlendIndices, _) => VertexFormat::Uint8x4,
        (VertexElementSemantic::Color, VertexElementType::UByte4) => VertexFormat::Unorm8x4,
        (_, ty) => ty.format(),
    }
}

fn resolve_element(input_index: u32, element: &InputLayoutElementDesc) -> ResolvedVertexAttribute {
    let step_mode = if element.instance_step_rate != 0 {
        VertexStepMode::Instance
    } else {
        VertexStepMode::Vertex
    };

    ResolvedVertexAttribute {
        input_index,
        buffer_slot: element.buffer_index,
        format: element_format(element.semantic, element.element_type),
        offset: element.element_offset,
        stride: element.buffer_stride,
        step_mode,
        semantic: element.semantic,
        semantic_index: element.semantic_index,
    }
}

/// Builds the input layout for `shader` reading from `buffers`.
///
/// Every shader attribute takes the first unconsumed buffer element with the same semantic and
/// semantic index and keeps the shader's own input index. Shader attributes with no matching
/// element are left out. Buffer elements no shader attribute consumed are appended afterwards at
/// increasing input indices, past every input index of `shader`.
pub fn resolve_input_layout(
    shader: &[VertexShaderAttribute],
    buffers: &[InputLayoutElementDesc],
) -> Vec<ResolvedVertexAttribute> {
    resolve_input_layout_after(shader, buffers, 0)
}

/// Like [`resolve_input_layout`], but appended elements also start no lower than
/// `reserved_end`, for shaders with inputs at locations `shader` doesn't list.
pub fn resolve_input_layout_after(
    shader: &[VertexShaderAttribute],
    buffers: &[InputLayoutElementDesc],
    reserved_end: u32,
) -> Vec<ResolvedVertexAttribute> {
    let mut consumed = vec![false; buffers.len()];
    let mut layout = Vec::with_capacity(buffers.len());
    let mut next_index = shader
        .iter()
        .map(|attribute| attribute.input_index.saturating_add(1))
        .fold(reserved_end, u32::max);

    for attribute in shader {
        let matching = buffers.iter().enumerate().position(|(i, element)| {
            !consumed[i]
                && element.semantic == attribute.semantic
                && element.semantic_index == attribute.semantic_index
        });

        let Some(i) = matching else {
            if cfg!(debug_assertions) {
                debug!(
                    "Vertex input #{} '{}{}' is not provided by any vertex buffer and will read zeros",
                    attribute.input_index, attribute.semantic, attribute.semantic_index
                );
            }
            continue;
        };

        consumed[i] = true;
        layout.push(resolve_element(attribute.input_index, &buffers[i]));
    }

    for (element, _) in buffers.iter().zip(&consumed).filter(|(_, used)| !**used) {
        layout.push(resolve_element(next_index, element));
        next_index += 1;
    }

    layout
}

/// Groups a resolved layout into dense vertex buffer slots, the shape `wgpu` pipelines expect.
pub fn vertex_buffer_descs(layout: &[ResolvedVertexAttribute]) -> Vec<VertexBufferDesc> {
    let Some(max_slot) = layout.iter().map(|a| a.buffer_slot).max() else {
        return Vec::new();
    };

    let by_slot = layout.iter().into_group_map_by(|a| a.buffer_slot);

    (0..=max_slot)
        .map(|slot| {
            let attributes = by_slot.get(&slot).map(Vec::as_slice).unwrap_or_default();
            let first = attributes.first();

            VertexBufferDesc {
                slot,
                stride: first.map_or(0, |a| a.stride as u64),
                step_mode: first.map_or(VertexStepMode::Vertex, |a| a.step_mode),
                attributes: attributes
                    .iter()
                    .map(|a| VertexAttribute {
                        format: a.format,
                        offset: a.offset as u64,
                        shader_location: a.input_index,
                    })
                    .collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::defs::{InputLayoutDesc, VertexElement};
    use VertexElementSemantic as Sem;
    use VertexElementType as Ty;

    fn attr(semantic: Sem, semantic_index: u8, input_index: u32) -> VertexShaderAttribute {
        VertexShaderAttribute {
            semantic,
            semantic_index,
            input_index,
        }
    }

    #[test]
    fn duplicate_semantics_are_consumed_in_order() {
        let stream = [
            VertexElement::new(Ty::Vector2, Sem::TexCoord, 0),
            VertexElement::new(Ty::Vector2, Sem::TexCoord, 0),
        ];
        let buffers = InputLayoutDesc::from_streams(&[&stream]);
        let shader = [attr(Sem::TexCoord, 0, 0), attr(Sem::TexCoord, 0, 1)];

        let layout = resolve_input_layout(&shader, &buffers.elements);

        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].offset, 0);
        assert_eq!(layout[1].offset, 8);
    }

    #[test]
    fn missing_semantics_are_dropped() {
        let stream = [VertexElement::new(Ty::Vector3, Sem::Position, 0)];
        let buffers = InputLayoutDesc::from_streams(&[&stream]);
        let shader = [attr(Sem::Position, 0, 0), attr(Sem::Normal, 0, 1)];

        let layout = resolve_input_layout(&shader, &buffers.elements);

        assert_eq!(layout.len(), 1);
        assert_eq!(layout[0].semantic, Sem::Position);
    }

    #[test]
    fn blend_indices_and_colors_are_forced_to_bytes() {
        let stream = [
            VertexElement::new(Ty::UByte4, Sem::Color, 0),
            VertexElement::new(Ty::UByte4Norm, Sem::BlendIndices, 0),
        ];
        let buffers = InputLayoutDesc::from_streams(&[&stream]);
        let shader = [attr(Sem::Color, 0, 0), attr(Sem::BlendIndices, 0, 1)];

        let layout = resolve_input_layout(&shader, &buffers.elements);

        assert_eq!(layout[0].format, VertexFormat::Unorm8x4);
        assert_eq!(layout[1].format, VertexFormat::Uint8x4);
    }

    #[test]
    fn extra_elements_skip_every_shader_location() {
        let stream = [
            VertexElement::new(Ty::Vector3, Sem::Position, 0),
            VertexElement::new(Ty::Vector3, Sem::Normal, 0),
        ];
        let buffers = InputLayoutDesc::from_streams(&[&stream]);

        let unmatched = [attr(Sem::Position, 0, 0), attr(Sem::Tangent, 0, 3)];
        let layout = resolve_input_layout(&unmatched, &buffers.elements);
        assert_eq!(layout[1].semantic, Sem::Normal);
        assert_eq!(layout[1].input_index, 4);

        let shader = [attr(Sem::Position, 0, 0)];
        let layout = resolve_input_layout_after(&shader, &buffers.elements, 3);
        assert_eq!(layout[0].input_index, 0);
        assert_eq!(layout[1].input_index, 3);
    }

    #[test]
    fn buffer_descs_fill_gaps_between_slots() {
        let vertices = [VertexElement::new(Ty::Vector3, Sem::Position, 0)];
        let instances = [VertexElement::new(Ty::Vector4, Sem::TexCoord, 4).per_instance()];
        let buffers = InputLayoutDesc::from_streams(&[&vertices, &[], &instances]);
        let shader = [attr(Sem::Position, 0, 0), attr(Sem::TexCoord, 4, 1)];

        let layout = resolve_input_layout(&shader, &buffers.elements);
        let descs = vertex_buffer_descs(&layout);

        assert_eq!(descs.len(), 3);
        assert!(descs[1].attributes.is_empty());
        assert_eq!(descs[2].step_mode, VertexStepMode::Instance);
        assert_eq!(descs[2].attributes[0].shader_location, 1);
    }
}
