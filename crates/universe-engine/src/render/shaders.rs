use crate::device::{GraphicsDevice, ShaderDesc, ShaderId};
use crate::error::Result;
use crate::layout::{ATTR_COLOR, ATTR_POSITION, ATTR_TEXCOORD};

pub(crate) const COLOR_SHADER: ShaderDesc<'static> = ShaderDesc {
    label: "universe color shader",
    wgsl: include_str!("shaders/color.wgsl"),
    attributes: &[(ATTR_POSITION, 0), (ATTR_COLOR, 1)],
    textured: false,
};

pub(crate) const TEXTURE_SHADER: ShaderDesc<'static> = ShaderDesc {
    label: "universe texture shader",
    wgsl: include_str!("shaders/texture.wgsl"),
    attributes: &[(ATTR_POSITION, 0), (ATTR_TEXCOORD, 1)],
    textured: true,
};

pub(crate) const BATCH_SHADER: ShaderDesc<'static> = ShaderDesc {
    label: "universe batch shader",
    wgsl: include_str!("shaders/batch.wgsl"),
    attributes: &[(ATTR_POSITION, 0), (ATTR_COLOR, 1)],
    textured: false,
};

/// Shader programs every context creates on startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BuiltinShaders {
    /// Position + per-vertex color.
    pub color: ShaderId,
    /// Position + texcoord, samples unit 0.
    pub texture: ShaderId,
    /// 2D position + color, for the batched renderer.
    pub batch: ShaderId,
}

impl BuiltinShaders {
    pub(crate) fn create(device: &mut dyn GraphicsDevice) -> Result<Self> {
        Ok(Self {
            color: device.create_shader(&COLOR_SHADER)?,
            texture: device.create_shader(&TEXTURE_SHADER)?,
            batch: device.create_shader(&BATCH_SHADER)?,
        })
    }

    pub(crate) fn all(&self) -> [ShaderId; 3] {
        [self.color, self.texture, self.batch]
    }
}
