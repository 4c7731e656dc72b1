use crate::device::{TextureAxis, TextureOptions, TextureWrap};

/// Rendering hint, applied with `RenderContext::hint`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Hint {
    /// Request mipmaps for textures created afterwards.
    TextureMipmap(bool),
    /// Request anisotropic filtering for textures created afterwards.
    TextureAnisotropic(bool),
    /// Wrap mode along one axis for textures created afterwards.
    TextureWrap(TextureAxis, TextureWrap),
    DepthTest(bool),
    StencilTest(bool),
    /// Trace every device call through the `log` facade.
    DeviceDebug(bool),
}

/// Current value of every hint.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RenderHints {
    pub texture_mipmap: bool,
    pub texture_anisotropic: bool,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
    pub depth_test: bool,
    pub stencil_test: bool,
    pub device_debug: bool,
}

impl RenderHints {
    pub fn texture_options(&self) -> TextureOptions {
        TextureOptions {
            mipmap: self.texture_mipmap,
            anisotropic: self.texture_anisotropic,
            wrap_s: self.wrap_s,
            wrap_t: self.wrap_t,
        }
    }
}
