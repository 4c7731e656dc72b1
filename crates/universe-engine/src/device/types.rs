use std::fmt;

macro_rules! device_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " #{}"), self.0)
            }
        }
    };
}

device_id!(
    /// Device-side buffer object.
    BufferId,
    "buffer"
);
device_id!(
    /// Vertex-array (input layout) object.
    VertexArrayId,
    "vertex array"
);
device_id!(
    /// Compiled shader program.
    ShaderId,
    "shader"
);
device_id!(
    /// Device-side texture object.
    TextureId,
    "texture"
);

/// Buffer binding slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferTarget {
    /// Per-vertex data.
    Vertex,
    /// 16-bit element indices.
    Index,
}

impl fmt::Display for BufferTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex buffer"),
            Self::Index => f.write_str("index buffer"),
        }
    }
}

/// Update frequency hint passed to the device on allocation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum BufferUsage {
    /// Written once, drawn many times.
    #[default]
    Static,
    /// Rewritten often, e.g. every frame.
    Dynamic,
}

/// Scalar element type of a vertex attribute.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ScalarType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Float,
    Double,
}

impl ScalarType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::Int | Self::UnsignedInt | Self::Float => 4,
            Self::Double => 8,
        }
    }
}

/// Texture dimensionality. Each texture unit has one slot per kind.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureKind {
    D1,
    D2,
    D2Multisample,
    D3,
    Cube,
}

impl TextureKind {
    pub const COUNT: usize = 5;

    pub const ALL: [TextureKind; Self::COUNT] = [
        TextureKind::D1,
        TextureKind::D2,
        TextureKind::D2Multisample,
        TextureKind::D3,
        TextureKind::Cube,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::D1 => 0,
            Self::D2 => 1,
            Self::D2Multisample => 2,
            Self::D3 => 3,
            Self::Cube => 4,
        }
    }
}

/// Primitive assembly mode for draw calls.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
    /// Convex polygon around the first vertex.
    #[default]
    TriangleFan,
}

impl Primitive {
    pub fn is_triangles(self) -> bool {
        matches!(
            self,
            Self::Triangles | Self::TriangleStrip | Self::TriangleFan
        )
    }
}

/// How an enabled vertex input reads from the bound vertex buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AttributePointer {
    pub components: u8,
    pub scalar: ScalarType,
    /// Byte distance between consecutive vertices.
    pub stride: u32,
    /// Byte offset of this attribute inside a vertex.
    pub offset: u32,
}

/// Fixed-function state toggled through hints.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Capability {
    DepthTest,
    StencilTest,
}

/// What sampling does outside `[0, 1]` along one axis.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum TextureWrap {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

/// Texture coordinate axis: `S` is horizontal, `T` vertical.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureAxis {
    S,
    T,
}

/// Sampling options applied when a texture is created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct TextureOptions {
    pub mipmap: bool,
    pub anisotropic: bool,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
}

/// Shader program description handed to `GraphicsDevice::create_shader`.
///
/// `attributes` maps vertex input names to the `@location` they occupy in
/// the WGSL source; anything missing resolves to no location.
#[derive(Debug, Clone, Copy)]
pub struct ShaderDesc<'a> {
    pub label: &'a str,
    pub wgsl: &'a str,
    pub attributes: &'a [(&'a str, u32)],
    /// Samples the 2D texture bound to unit 0.
    pub textured: bool,
}

/// Backend chosen for a display.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum RenderApi {
    /// Let the runtime pick; currently wgpu.
    #[default]
    Preferred,
    Wgpu,
    /// No window output; every device call is recorded.
    Headless,
}

/// Result of acquiring the next frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameStatus {
    Ready,
    /// Nothing can be presented this frame (surface reconfigured or timed out).
    Skipped,
}
