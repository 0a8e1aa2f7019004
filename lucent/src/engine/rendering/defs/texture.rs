use bitflags::bitflags;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum TextureType {
    #[default]
    Texture2D,
    TextureCube,
    Texture3D,
    Texture2DArray,
}

impl TextureType {
    pub const fn is_cube(self) -> bool {
        matches!(self, TextureType::TextureCube)
    }

    pub const fn is_array(self) -> bool {
        matches!(self, TextureType::Texture2DArray)
    }

    pub const fn is_3d(self) -> bool {
        matches!(self, TextureType::Texture3D)
    }

    pub const fn dimension(self) -> wgpu::TextureDimension {
        match self {
            TextureType::Texture3D => wgpu::TextureDimension::D3,
            _ => wgpu::TextureDimension::D2,
        }
    }

    pub const fn view_dimension(self) -> wgpu::TextureViewDimension {
        match self {
            TextureType::Texture2D => wgpu::TextureViewDimension::D2,
            TextureType::TextureCube => wgpu::TextureViewDimension::Cube,
            TextureType::Texture3D => wgpu::TextureViewDimension::D3,
            TextureType::Texture2DArray => wgpu::TextureViewDimension::D2Array,
        }
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u8 {
        const BIND_RENDER_TARGET = 1 << 0;
        const BIND_DEPTH_STENCIL = 1 << 1;
        const BIND_UNORDERED_ACCESS = 1 << 2;
        const NO_MULTI_SAMPLED_AUTO_RESOLVE = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u8 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const COPY_DST = 1 << 3;
        const STORAGE = 1 << 4;
    }
}
