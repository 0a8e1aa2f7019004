use num_enum::{IntoPrimitive, TryFromPrimitive};

#[repr(u8)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum BlendMode {
    #[default]
    Replace = 0,
    Add,
    Multiply,
    Alpha,
    AddAlpha,
    PremulAlpha,
    InvDestAlpha,
    Subtract,
    SubtractAlpha,
    DeferredDecal,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum CompareMode {
    #[default]
    Always = 0,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

/// Triangle culling. Front faces are wound clockwise, so `Ccw` culls back faces.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum CullMode {
    None = 0,
    #[default]
    Ccw,
    Cw,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum FillMode {
    #[default]
    Solid = 0,
    Wireframe,
    /// Not supported by any backend, rasterized as wireframe.
    Point,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum StencilOp {
    #[default]
    Keep = 0,
    Zero,
    Ref,
    Incr,
    Decr,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum PrimitiveType {
    #[default]
    TriangleList = 0,
    LineList,
    PointList,
    TriangleStrip,
    LineStrip,
    /// Not supported by any backend, pipeline creation fails.
    TriangleFan,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum TextureFilterMode {
    Nearest = 0,
    Bilinear,
    Trilinear,
    Anisotropic,
    NearestAnisotropic,
    /// Use whatever the render device is configured with.
    #[default]
    Default,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum TextureAddressMode {
    #[default]
    Wrap = 0,
    Mirror,
    Clamp,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct SamplerStateDesc {
    pub filter_mode: TextureFilterMode,
    pub anisotropy: u8,
    pub shadow_compare: bool,
    /// U, V and W addressing.
    pub address_mode: [TextureAddressMode; 3],
}

impl SamplerStateDesc {
    pub const fn with_filter(filter_mode: TextureFilterMode, address_mode: TextureAddressMode) -> Self {
        Self {
            filter_mode,
            anisotropy: 0,
            shadow_compare: false,
            address_mode: [address_mode; 3],
        }
    }

    pub const fn default_clamp() -> Self {
        Self::with_filter(TextureFilterMode::Default, TextureAddressMode::Clamp)
    }

    pub const fn nearest() -> Self {
        Self::with_filter(TextureFilterMode::Nearest, TextureAddressMode::Clamp)
    }

    pub const fn bilinear() -> Self {
        Self::with_filter(TextureFilterMode::Bilinear, TextureAddressMode::Clamp)
    }

    pub const fn trilinear() -> Self {
        Self::with_filter(TextureFilterMode::Trilinear, TextureAddressMode::Clamp)
    }
}
