use crate::device::{TextureId, TextureKind};
use crate::error::{RenderError, Result};

use super::context::RenderContext;

/// Decoded pixels handed over by an image loader.
///
/// `channels` is 1 (grey), 2 (grey + alpha), 3 (RGB) or 4 (RGBA), 8 bits each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    width: u32,
    height: u32,
    channels: u8,
    pixels: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Result<Self> {
        if !(1..=4).contains(&channels) {
            return Err(RenderError::mismatch(
                "image data",
                format!("{channels} channels per pixel is not supported"),
            ));
        }
        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(RenderError::mismatch(
                "image data",
                format!(
                    "{width}x{height}x{channels} needs {expected} bytes, got {}",
                    pixels.len()
                ),
            ));
        }
        Ok(Self { width, height, channels, pixels })
    }

    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        Self::new(width, height, 4, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Expands to 4 bytes per pixel. Grey is replicated into RGB; missing
    /// alpha is opaque.
    pub fn to_rgba8(&self) -> Vec<u8> {
        if self.channels == 4 {
            return self.pixels.clone();
        }
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for px in self.pixels.chunks_exact(self.channels as usize) {
            let rgba = match *px {
                [g] => [g, g, g, 255],
                [g, a] => [g, g, g, a],
                [r, g, b] => [r, g, b, 255],
                _ => unreachable!("channel count validated on construction"),
            };
            out.extend_from_slice(&rgba);
        }
        out
    }
}

/// Device texture created from an [`ImageData`].
#[derive(Debug)]
pub struct Texture {
    id: Option<TextureId>,
    kind: TextureKind,
    width: u32,
    height: u32,
}

impl Texture {
    pub fn new(ctx: &mut RenderContext, kind: TextureKind, image: &ImageData) -> Result<Self> {
        let rgba = image.to_rgba8();
        let id = ctx.create_texture(kind, image.width, image.height, &rgba)?;
        log::debug!("uploaded {}x{} {kind:?} texture as {id}", image.width, image.height);
        Ok(Self {
            id: Some(id),
            kind,
            width: image.width,
            height: image.height,
        })
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn id(&self) -> Result<TextureId> {
        self.id
            .ok_or_else(|| RenderError::resource(format!("{:?} texture", self.kind), "disposed"))
    }

    pub fn is_disposed(&self) -> bool {
        self.id.is_none()
    }

    /// Binds on `unit`, leaving that unit active.
    pub fn bind(&self, ctx: &mut RenderContext, unit: u32) -> Result<()> {
        let id = self.id()?;
        ctx.set_active_texture_unit(unit)?;
        ctx.bind_texture(self.kind, Some(id))?;
        Ok(())
    }

    /// Unbinds from `unit` if this texture is the one bound there.
    pub fn unbind(&self, ctx: &mut RenderContext, unit: u32) -> Result<()> {
        let id = self.id()?;
        ctx.set_active_texture_unit(unit)?;
        if ctx.cache().texture(self.kind) == Some(id) {
            ctx.bind_texture(self.kind, None)?;
        }
        Ok(())
    }

    pub fn dispose(&mut self, ctx: &mut RenderContext) -> Result<()> {
        let id = self.id()?;
        ctx.delete_texture(id)?;
        self.id = None;
        Ok(())
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            log::warn!("{id} dropped without dispose; device memory leaks until shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCall;
    use crate::render::context::tests::recording_context;

    #[test]
    fn pixel_length_must_match_size() {
        let err = ImageData::new(2, 2, 3, vec![0; 11]).unwrap_err();
        assert!(matches!(err, RenderError::ConfigurationMismatch { .. }));
        assert!(ImageData::new(1, 1, 5, vec![0; 5]).is_err());
    }

    #[test]
    fn grey_alpha_expands_to_rgba() {
        let img = ImageData::new(2, 1, 2, vec![10, 20, 30, 40]).unwrap();
        assert_eq!(img.to_rgba8(), vec![10, 10, 10, 20, 30, 30, 30, 40]);

        let rgb = ImageData::new(1, 1, 3, vec![1, 2, 3]).unwrap();
        assert_eq!(rgb.to_rgba8(), vec![1, 2, 3, 255]);
    }

    #[test]
    fn bind_selects_unit_then_binds_once() {
        let (mut ctx, log) = recording_context();
        let img = ImageData::rgba(1, 1, vec![255; 4]).unwrap();
        let mut tex = Texture::new(&mut ctx, TextureKind::D2, &img).unwrap();

        tex.bind(&mut ctx, 2).unwrap();
        tex.bind(&mut ctx, 2).unwrap();
        assert_eq!(log.count(|c| matches!(c, DeviceCall::BindTexture { .. })), 1);
        assert_eq!(ctx.cache().active_unit(), 2);

        tex.dispose(&mut ctx).unwrap();
    }

    #[test]
    fn use_after_dispose_is_an_error() {
        let (mut ctx, log) = recording_context();
        let img = ImageData::new(1, 1, 1, vec![7]).unwrap();
        let mut tex = Texture::new(&mut ctx, TextureKind::D2, &img).unwrap();
        tex.bind(&mut ctx, 0).unwrap();

        tex.dispose(&mut ctx).unwrap();
        assert_eq!(ctx.cache().texture(TextureKind::D2), None);

        let err = tex.dispose(&mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::ResourceState { .. }));
        assert!(tex.bind(&mut ctx, 0).is_err());
        assert_eq!(log.count(|c| matches!(c, DeviceCall::DeleteTexture(_))), 1);
    }
}
