use crate::rendering::defs::MAX_VERTEX_STREAMS;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::{Display, Formatter};
use wgpu::VertexFormat;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
pub enum VertexElementSemantic {
    Position = 0,
    Normal,
    Binormal,
    Tangent,
    TexCoord,
    Color,
    BlendWeights,
    BlendIndices,
    ObjectIndex,
}

impl VertexElementSemantic {
    pub const ALL: [VertexElementSemantic; 9] = [
        VertexElementSemantic::Position,
        VertexElementSemantic::Normal,
        VertexElementSemantic::Binormal,
        VertexElementSemantic::Tangent,
        VertexElementSemantic::TexCoord,
        VertexElementSemantic::Color,
        VertexElementSemantic::BlendWeights,
        VertexElementSemantic::BlendIndices,
        VertexElementSemantic::ObjectIndex,
    ];

    /// Name of the vertex shader input carrying this semantic, without the semantic index.
    pub const fn input_name(self) -> &'static str {
        match self {
            VertexElementSemantic::Position => "iPos",
            VertexElementSemantic::Normal => "iNormal",
            VertexElementSemantic::Binormal => "iBinormal",
            VertexElementSemantic::Tangent => "iTangent",
            VertexElementSemantic::TexCoord => "iTexCoord",
            VertexElementSemantic::Color => "iColor",
            VertexElementSemantic::BlendWeights => "iBlendWeights",
            VertexElementSemantic::BlendIndices => "iBlendIndices",
            VertexElementSemantic::ObjectIndex => "iObjectIndex",
        }
    }

    /// HLSL semantic name of this element.
    pub const fn semantic_name(self) -> &'static str {
        match self {
            VertexElementSemantic::Position => "POSITION",
            VertexElementSemantic::Normal => "NORMAL",
            VertexElementSemantic::Binormal => "BINORMAL",
            VertexElementSemantic::Tangent => "TANGENT",
            VertexElementSemantic::TexCoord => "TEXCOORD",
            VertexElementSemantic::Color => "COLOR",
            VertexElementSemantic::BlendWeights => "BLENDWEIGHT",
            VertexElementSemantic::BlendIndices => "BLENDINDICES",
            VertexElementSemantic::ObjectIndex => "OBJECTINDEX",
        }
    }
}

impl Display for VertexElementSemantic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.semantic_name())
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum VertexElementType {
    Int = 0,
    Float,
    Vector2,
    Vector3,
    Vector4,
    UByte4,
    UByte4Norm,
}

impl VertexElementType {
    pub const fn size(self) -> u32 {
        match self {
            VertexElementType::Int | VertexElementType::Float => 4,
            VertexElementType::Vector2 => 8,
            VertexElementType::Vector3 => 12,
            VertexElementType::Vector4 => 16,
            VertexElementType::UByte4 | VertexElementType::UByte4Norm => 4,
        }
    }

    pub const fn num_components(self) -> u32 {
        match self {
            VertexElementType::Int | VertexElementType::Float => 1,
            VertexElementType::Vector2 => 2,
            VertexElementType::Vector3 => 3,
            VertexElementType::Vector4 | VertexElementType::UByte4 | VertexElementType::UByte4Norm => 4,
        }
    }

    pub const fn is_normalized(self) -> bool {
        matches!(self, VertexElementType::UByte4Norm)
    }

    pub const fn format(self) -> VertexFormat {
        match self {
            VertexElementType::Int => VertexFormat::Sint32,
            VertexElementType::Float => VertexFormat::Float32,
            VertexElementType::Vector2 => VertexFormat::Float32x2,
            VertexElementType::Vector3 => VertexFormat::Float32x3,
            VertexElementType::Vector4 => VertexFormat::Float32x4,
            VertexElementType::UByte4 => VertexFormat::Uint8x4,
            VertexElementType::UByte4Norm => VertexFormat::Unorm8x4,
        }
    }
}

/// One attribute of a vertex stream as the buffer provides it.
///
/// The offset is owned by the buffer layout that contains the element and is filled in by
/// [`InputLayoutDesc::from_streams`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub element_type: VertexElementType,
    pub semantic: VertexElementSemantic,
    pub semantic_index: u8,
    pub per_instance: bool,
    pub offset: u32,
}

impl VertexElement {
    pub const fn new(
        element_type: VertexElementType,
        semantic: VertexElementSemantic,
        semantic_index: u8,
    ) -> Self {
        Self {
            element_type,
            semantic,
            semantic_index,
            per_instance: false,
            offset: 0,
        }
    }

    pub const fn per_instance(mut self) -> Self {
        self.per_instance = true;
        self
    }
}

/// Buffer-side description of one element of the pipeline input layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct InputLayoutElementDesc {
    pub buffer_index: u32,
    pub buffer_stride: u32,
    pub element_offset: u32,
    pub instance_step_rate: u32,

    pub element_type: VertexElementType,
    pub semantic: VertexElementSemantic,
    pub semantic_index: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InputLayoutDesc {
    pub elements: Vec<InputLayoutElementDesc>,
}

impl InputLayoutDesc {
    /// Lays out each stream's elements back to back, assigning offsets and strides.
    ///
    /// Streams beyond [`MAX_VERTEX_STREAMS`] are ignored.
    pub fn from_streams(streams: &[&[VertexElement]]) -> Self {
        let mut elements = Vec::new();

        for (buffer_index, stream) in streams.iter().take(MAX_VERTEX_STREAMS).enumerate() {
            let stride: u32 = stream.iter().map(|e| e.element_type.size()).sum();
            let mut offset = 0;

            for element in stream.iter() {
                elements.push(InputLayoutElementDesc {
                    buffer_index: buffer_index as u32,
                    buffer_stride: stride,
                    element_offset: offset,
                    instance_step_rate: element.per_instance as u32,
                    element_type: element.element_type,
                    semantic: element.semantic,
                    semantic_index: element.semantic_index,
                });
                offset += element.element_type.size();
            }
        }

        Self { elements }
    }
}

/// Vertex input declared by a vertex shader.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexShaderAttribute {
    pub semantic: VertexElementSemantic,
    pub semantic_index: u8,
    pub input_index: u32,
}

/// Parses a vertex shader input name such as `iTexCoord1` into its semantic and semantic index.
///
/// A missing index means index 0. Names that don't start with a known input prefix are rejected.
pub fn parse_vertex_attribute(name: &str) -> Option<(VertexElementSemantic, u8)> {
    for semantic in VertexElementSemantic::ALL {
        let Some(rest) = name.strip_prefix(semantic.input_name()) else {
            continue;
        };

        if rest.is_empty() {
            return Some((semantic, 0));
        }

        return rest.parse::<u8>().ok().map(|index| (semantic, index));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vertex_input_names() {
        assert_eq!(
            parse_vertex_attribute("iPos"),
            Some((VertexElementSemantic::Position, 0))
        );
        assert_eq!(
            parse_vertex_attribute("iTexCoord1"),
            Some((VertexElementSemantic::TexCoord, 1))
        );
        assert_eq!(
            parse_vertex_attribute("iBlendIndices"),
            Some((VertexElementSemantic::BlendIndices, 0))
        );
        assert_eq!(parse_vertex_attribute("iTexCoordX"), None);
        assert_eq!(parse_vertex_attribute("position"), None);
    }

    #[test]
    fn streams_get_packed_offsets() {
        let stream = [
            VertexElement::new(VertexElementType::Vector3, VertexElementSemantic::Position, 0),
            VertexElement::new(VertexElementType::Vector3, VertexElementSemantic::Normal, 0),
            VertexElement::new(VertexElementType::Vector2, VertexElementSemantic::TexCoord, 0),
        ];
        let instances = [VertexElement::new(
            VertexElementType::Vector4,
            VertexElementSemantic::TexCoord,
            4,
        )
        .per_instance()];

        let layout = InputLayoutDesc::from_streams(&[&stream, &instances]);

        assert_eq!(layout.elements.len(), 4);
        assert_eq!(layout.elements[1].element_offset, 12);
        assert_eq!(layout.elements[2].element_offset, 24);
        assert_eq!(layout.elements[2].buffer_stride, 32);
        assert_eq!(layout.elements[3].buffer_index, 1);
        assert_eq!(layout.elements[3].instance_step_rate, 1);
        assert_eq!(layout.elements[3].buffer_stride, 16);
    }
}
