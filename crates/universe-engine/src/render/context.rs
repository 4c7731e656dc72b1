use glam::Mat4;

use crate::coords::{NormalRect, PixelRect};
use crate::device::{
    AttributePointer, BindingCache, BufferId, BufferTarget, BufferUsage, Capability, FrameStatus,
    GraphicsDevice, Primitive, RenderApi, ShaderDesc, ShaderId, TextureAxis, TextureId,
    TextureKind, VertexArrayId,
};
use crate::error::Result;
use crate::paint::Color;

use super::hint::{Hint, RenderHints};
use super::shaders::BuiltinShaders;

/// Counts of bind requests that reached the device vs. ones the cache
/// answered.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct BindStats {
    pub issued: u64,
    pub elided: u64,
}

/// Everything a component needs to talk to the graphics device.
///
/// Owns the device and the binding cache. All binds go through here so the
/// cache stays equal to device state: the cache is consulted first and
/// written only after the device call succeeded.
pub struct RenderContext {
    device: Box<dyn GraphicsDevice>,
    cache: BindingCache,
    stats: BindStats,
    hints: RenderHints,
    shaders: BuiltinShaders,
    vertex_array: VertexArrayId,
    surface: (u32, u32),
    view_projection: Mat4,
}

macro_rules! traced {
    ($self:ident, $($arg:tt)+) => {
        if $self.hints.device_debug {
            log::trace!($($arg)+);
        }
    };
}

impl RenderContext {
    pub fn new(
        mut device: Box<dyn GraphicsDevice>,
        texture_units: u32,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let shaders = BuiltinShaders::create(device.as_mut())?;
        let vertex_array = device.create_vertex_array()?;

        let mut ctx = Self {
            device,
            cache: BindingCache::new(texture_units),
            stats: BindStats::default(),
            hints: RenderHints::default(),
            shaders,
            vertex_array,
            surface: (width, height),
            view_projection: Mat4::IDENTITY,
        };
        ctx.bind_vertex_array(Some(vertex_array))?;

        log::debug!(
            "render context ready: {:?} backend, {} texture units, {}x{}",
            ctx.api(),
            ctx.cache.texture_units(),
            width,
            height
        );
        Ok(ctx)
    }

    pub fn api(&self) -> RenderApi {
        self.device.api()
    }

    pub fn cache(&self) -> &BindingCache {
        &self.cache
    }

    pub fn stats(&self) -> BindStats {
        self.stats
    }

    pub fn hints(&self) -> RenderHints {
        self.hints
    }

    pub fn shaders(&self) -> &BuiltinShaders {
        &self.shaders
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
        self.device.resize(width, height);
    }

    /// View-projection of the camera currently rendering.
    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }

    pub fn set_view_projection(&mut self, matrix: Mat4) {
        self.view_projection = matrix;
    }

    // ── hints ─────────────────────────────────────────────────────────────

    pub fn hint(&mut self, hint: Hint) -> Result<()> {
        match hint {
            Hint::TextureMipmap(on) => self.hints.texture_mipmap = on,
            Hint::TextureAnisotropic(on) => self.hints.texture_anisotropic = on,
            Hint::TextureWrap(TextureAxis::S, wrap) => self.hints.wrap_s = wrap,
            Hint::TextureWrap(TextureAxis::T, wrap) => self.hints.wrap_t = wrap,
            Hint::DepthTest(on) => {
                self.device.set_capability(Capability::DepthTest, on)?;
                self.hints.depth_test = on;
            }
            Hint::StencilTest(on) => {
                self.device.set_capability(Capability::StencilTest, on)?;
                self.hints.stencil_test = on;
            }
            Hint::DeviceDebug(on) => self.hints.device_debug = on,
        }
        Ok(())
    }

    // ── binding ───────────────────────────────────────────────────────────

    /// Binds `id` to `target` unless it already is. Returns whether a
    /// device call was issued.
    pub fn bind_buffer(&mut self, target: BufferTarget, id: Option<BufferId>) -> Result<bool> {
        if self.cache.buffer(target) == id {
            self.stats.elided += 1;
            return Ok(false);
        }
        traced!(self, "bind {target} {id:?}");
        self.device.bind_buffer(target, id)?;
        self.cache.set_buffer(target, id);
        self.stats.issued += 1;
        Ok(true)
    }

    pub fn bind_vertex_array(&mut self, id: Option<VertexArrayId>) -> Result<bool> {
        if self.cache.vertex_array() == id {
            self.stats.elided += 1;
            return Ok(false);
        }
        traced!(self, "bind vertex array {id:?}");
        self.device.bind_vertex_array(id)?;
        self.cache.set_vertex_array(id);
        self.stats.issued += 1;
        Ok(true)
    }

    pub fn use_shader(&mut self, id: Option<ShaderId>) -> Result<bool> {
        if self.cache.shader() == id {
            self.stats.elided += 1;
            return Ok(false);
        }
        traced!(self, "use shader {id:?}");
        self.device.use_shader(id)?;
        self.cache.set_shader(id);
        self.stats.issued += 1;
        Ok(true)
    }

    /// Selects the texture unit later texture binds address. Binds nothing.
    pub fn set_active_texture_unit(&mut self, unit: u32) -> Result<()> {
        self.cache.check_unit(unit)?;
        if self.cache.active_unit() == unit {
            self.stats.elided += 1;
            return Ok(());
        }
        traced!(self, "active texture unit {unit}");
        self.device.active_texture_unit(unit)?;
        self.cache.set_active_unit(unit)?;
        self.stats.issued += 1;
        Ok(())
    }

    /// Binds a texture on the active unit.
    pub fn bind_texture(&mut self, kind: TextureKind, id: Option<TextureId>) -> Result<bool> {
        if self.cache.texture(kind) == id {
            self.stats.elided += 1;
            return Ok(false);
        }
        traced!(self, "bind {kind:?} texture {id:?} on unit {}", self.cache.active_unit());
        self.device.bind_texture(kind, id)?;
        self.cache.set_texture(kind, id);
        self.stats.issued += 1;
        Ok(true)
    }

    // ── resources ─────────────────────────────────────────────────────────

    pub fn create_buffer(&mut self, target: BufferTarget, usage: BufferUsage) -> Result<BufferId> {
        self.device.create_buffer(target, usage)
    }

    pub fn delete_buffer(&mut self, id: BufferId) -> Result<()> {
        traced!(self, "delete {id}");
        self.device.delete_buffer(id)?;
        self.cache.forget_buffer(id);
        Ok(())
    }

    /// Reallocates the buffer bound to `target`.
    pub fn buffer_data(&mut self, target: BufferTarget, size: usize, data: &[u8]) -> Result<()> {
        traced!(self, "allocate {size} bytes for {target}");
        self.device.buffer_data(target, size, data)
    }

    pub fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) -> Result<()> {
        traced!(self, "write {} bytes at {offset} into {target}", data.len());
        self.device.buffer_sub_data(target, offset, data)
    }

    pub fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId> {
        self.device.create_shader(desc)
    }

    pub fn delete_shader(&mut self, id: ShaderId) -> Result<()> {
        self.device.delete_shader(id)?;
        self.cache.forget_shader(id);
        Ok(())
    }

    pub fn attribute_location(&self, shader: ShaderId, name: &str) -> Result<Option<u32>> {
        self.device.attribute_location(shader, name)
    }

    /// Creates a texture with the current texture hints applied.
    pub fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<TextureId> {
        let options = self.hints.texture_options();
        self.device.create_texture(kind, width, height, rgba, options)
    }

    pub fn delete_texture(&mut self, id: TextureId) -> Result<()> {
        self.device.delete_texture(id)?;
        self.cache.forget_texture(id);
        Ok(())
    }

    pub fn enable_attribute(&mut self, location: u32, pointer: AttributePointer) -> Result<()> {
        traced!(self, "enable attribute {location}: {pointer:?}");
        self.device.enable_attribute(location, pointer)
    }

    pub fn disable_attribute(&mut self, location: u32) -> Result<()> {
        traced!(self, "disable attribute {location}");
        self.device.disable_attribute(location)
    }

    // ── drawing ───────────────────────────────────────────────────────────

    pub fn set_transform(&mut self, matrix: Mat4) -> Result<()> {
        self.device.set_transform(matrix)
    }

    /// Sets the viewport from a normalized rectangle and returns it in pixels.
    pub fn set_viewport(&mut self, rect: NormalRect) -> Result<PixelRect> {
        let (w, h) = self.surface;
        let pixels = rect.to_pixels(w, h);
        self.device.set_viewport(pixels)?;
        Ok(pixels)
    }

    pub fn clear(&mut self, color: Color) -> Result<()> {
        self.device.clear(color)
    }

    pub fn draw_arrays(&mut self, mode: Primitive, first: u32, count: u32) -> Result<()> {
        traced!(self, "draw {count} vertices as {mode:?}");
        self.device.draw_arrays(mode, first, count)
    }

    pub fn draw_elements(&mut self, mode: Primitive, first: u32, count: u32) -> Result<()> {
        traced!(self, "draw {count} indices as {mode:?}");
        self.device.draw_elements(mode, first, count)
    }

    pub fn begin_frame(&mut self) -> Result<FrameStatus> {
        self.device.begin_frame()
    }

    pub fn end_frame(&mut self) -> Result<()> {
        self.device.end_frame()
    }

    /// Releases the context's own device objects.
    pub fn dispose(&mut self) -> Result<()> {
        self.bind_vertex_array(None)?;
        self.device.delete_vertex_array(self.vertex_array)?;
        self.cache.forget_vertex_array(self.vertex_array);
        for shader in self.shaders.all() {
            self.delete_shader(shader)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::device::{CallLog, DeviceCall, RecordingDevice, TextureWrap};

    /// Context over a recording device, with the setup calls cleared
    /// from the log.
    pub(crate) fn recording_context() -> (RenderContext, CallLog) {
        let device = RecordingDevice::new();
        let log = device.log();
        let ctx = RenderContext::new(Box::new(device), 8, 640, 480).unwrap();
        log.clear();
        (ctx, log)
    }

    fn binds(log: &CallLog) -> usize {
        log.count(|c| matches!(c, DeviceCall::BindBuffer { .. }))
    }

    // ── binding cache ─────────────────────────────────────────────────────

    #[test]
    fn binding_same_buffer_twice_issues_one_call() {
        let (mut ctx, log) = recording_context();
        let vbo = ctx.create_buffer(BufferTarget::Vertex, BufferUsage::Static).unwrap();

        assert!(ctx.bind_buffer(BufferTarget::Vertex, Some(vbo)).unwrap());
        assert!(!ctx.bind_buffer(BufferTarget::Vertex, Some(vbo)).unwrap());

        assert_eq!(binds(&log), 1);
        assert_eq!(ctx.stats(), BindStats { issued: 1, elided: 1 });
    }

    #[test]
    fn targets_are_cached_independently() {
        let (mut ctx, log) = recording_context();
        let vbo = ctx.create_buffer(BufferTarget::Vertex, BufferUsage::Static).unwrap();
        let ibo = ctx.create_buffer(BufferTarget::Index, BufferUsage::Static).unwrap();

        ctx.bind_buffer(BufferTarget::Vertex, Some(vbo)).unwrap();
        ctx.bind_buffer(BufferTarget::Index, Some(ibo)).unwrap();
        ctx.bind_buffer(BufferTarget::Vertex, Some(vbo)).unwrap();
        ctx.bind_buffer(BufferTarget::Index, Some(ibo)).unwrap();

        assert_eq!(binds(&log), 2);
    }

    #[test]
    fn failed_bind_leaves_cache_untouched() {
        let (mut ctx, _log) = recording_context();
        let bogus = BufferId::new(999);
        assert!(ctx.bind_buffer(BufferTarget::Vertex, Some(bogus)).is_err());
        assert_eq!(ctx.cache().buffer(BufferTarget::Vertex), None);
    }

    #[test]
    fn deleting_a_bound_buffer_resets_its_slot() {
        let (mut ctx, log) = recording_context();
        let vbo = ctx.create_buffer(BufferTarget::Vertex, BufferUsage::Static).unwrap();
        ctx.bind_buffer(BufferTarget::Vertex, Some(vbo)).unwrap();
        ctx.delete_buffer(vbo).unwrap();
        assert_eq!(ctx.cache().buffer(BufferTarget::Vertex), None);

        let other = ctx.create_buffer(BufferTarget::Vertex, BufferUsage::Static).unwrap();
        ctx.bind_buffer(BufferTarget::Vertex, Some(other)).unwrap();
        assert_eq!(binds(&log), 2);
    }

    #[test]
    fn texture_binds_follow_the_active_unit() {
        let (mut ctx, log) = recording_context();
        let tex = ctx.create_texture(TextureKind::D2, 1, 1, &[255; 4]).unwrap();

        ctx.set_active_texture_unit(0).unwrap();
        ctx.bind_texture(TextureKind::D2, Some(tex)).unwrap();
        ctx.set_active_texture_unit(3).unwrap();
        assert!(ctx.bind_texture(TextureKind::D2, Some(tex)).unwrap());
        ctx.set_active_texture_unit(0).unwrap();
        assert!(!ctx.bind_texture(TextureKind::D2, Some(tex)).unwrap());

        assert_eq!(log.count(|c| matches!(c, DeviceCall::BindTexture { .. })), 2);
        // Unit 0 was already active at start.
        assert_eq!(log.count(|c| matches!(c, DeviceCall::ActiveTextureUnit(_))), 2);
    }

    #[test]
    fn unit_beyond_limit_is_rejected() {
        let (mut ctx, log) = recording_context();
        assert!(ctx.set_active_texture_unit(8).is_err());
        assert!(log.is_empty());
    }

    // ── hints ─────────────────────────────────────────────────────────────

    #[test]
    fn hints_reach_device_or_texture_options() {
        let (mut ctx, log) = recording_context();
        ctx.hint(Hint::DepthTest(true)).unwrap();
        ctx.hint(Hint::TextureMipmap(true)).unwrap();
        ctx.create_texture(TextureKind::D2, 1, 1, &[0; 4]).unwrap();

        let calls = log.calls();
        assert!(calls.contains(&DeviceCall::SetCapability {
            capability: Capability::DepthTest,
            enabled: true,
        }));
        assert!(calls.iter().any(|c| matches!(
            c,
            DeviceCall::CreateTexture { options, .. } if options.mipmap && !options.anisotropic
        )));
    }

    #[test]
    fn wrap_hint_applies_per_axis() {
        let (mut ctx, log) = recording_context();
        ctx.hint(Hint::TextureWrap(TextureAxis::S, TextureWrap::Repeat)).unwrap();
        ctx.create_texture(TextureKind::D2, 1, 1, &[0; 4]).unwrap();
        ctx.hint(Hint::TextureWrap(TextureAxis::T, TextureWrap::MirroredRepeat)).unwrap();
        ctx.create_texture(TextureKind::D2, 1, 1, &[0; 4]).unwrap();

        let wraps: Vec<_> = log
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::CreateTexture { options, .. } => Some((options.wrap_s, options.wrap_t)),
                _ => None,
            })
            .collect();
        assert_eq!(
            wraps,
            vec![
                (TextureWrap::Repeat, TextureWrap::ClampToEdge),
                (TextureWrap::Repeat, TextureWrap::MirroredRepeat),
            ]
        );
    }

    #[test]
    fn viewport_is_scaled_to_surface() {
        let (mut ctx, log) = recording_context();
        let px = ctx.set_viewport(NormalRect::new(0.5, 0.5, 0.5, 0.5)).unwrap();
        assert_eq!(px, PixelRect::new(320, 240, 320, 240));
        assert_eq!(log.calls(), vec![DeviceCall::SetViewport(px)]);
    }

    #[test]
    fn dispose_releases_builtin_objects() {
        let (mut ctx, log) = recording_context();
        ctx.dispose().unwrap();
        assert_eq!(log.count(|c| matches!(c, DeviceCall::DeleteShader(_))), 3);
        assert_eq!(log.count(|c| matches!(c, DeviceCall::DeleteVertexArray(_))), 1);
    }
}
