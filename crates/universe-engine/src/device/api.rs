use glam::Mat4;

use crate::coords::PixelRect;
use crate::error::Result;
use crate::paint::Color;

use super::types::{
    AttributePointer, BufferId, BufferTarget, BufferUsage, Capability, FrameStatus, Primitive,
    RenderApi, ShaderDesc, ShaderId, TextureId, TextureKind, TextureOptions, VertexArrayId,
};

/// Stateful graphics device.
///
/// The shape follows classic bind-then-operate APIs: data uploads and draws
/// act on whatever is currently bound. Callers inside the engine never call
/// the bind methods directly; they go through `RenderContext`, which keeps
/// the binding cache in step with the device.
///
/// All calls are synchronous. A call that returns `Ok` has taken effect for
/// every later call on the same device.
pub trait GraphicsDevice {
    fn api(&self) -> RenderApi;

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&mut self, target: BufferTarget, usage: BufferUsage) -> Result<BufferId>;
    fn delete_buffer(&mut self, id: BufferId) -> Result<()>;
    fn bind_buffer(&mut self, target: BufferTarget, id: Option<BufferId>) -> Result<()>;

    /// (Re)allocates the buffer bound to `target` with `size` bytes and
    /// copies `data` to its start.
    fn buffer_data(&mut self, target: BufferTarget, size: usize, data: &[u8]) -> Result<()>;

    /// Overwrites part of the buffer bound to `target`.
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) -> Result<()>;

    // ── vertex arrays & attributes ────────────────────────────────────────

    fn create_vertex_array(&mut self) -> Result<VertexArrayId>;
    fn delete_vertex_array(&mut self, id: VertexArrayId) -> Result<()>;
    fn bind_vertex_array(&mut self, id: Option<VertexArrayId>) -> Result<()>;
    fn enable_attribute(&mut self, location: u32, pointer: AttributePointer) -> Result<()>;
    fn disable_attribute(&mut self, location: u32) -> Result<()>;

    // ── shaders ───────────────────────────────────────────────────────────

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId>;
    fn delete_shader(&mut self, id: ShaderId) -> Result<()>;
    fn use_shader(&mut self, id: Option<ShaderId>) -> Result<()>;

    /// Input location of a named vertex attribute, `None` if the shader
    /// does not consume it.
    fn attribute_location(&self, shader: ShaderId, name: &str) -> Result<Option<u32>>;

    // ── textures ──────────────────────────────────────────────────────────

    /// Creates a texture from tightly packed RGBA8 pixels.
    fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
        rgba: &[u8],
        options: TextureOptions,
    ) -> Result<TextureId>;
    fn delete_texture(&mut self, id: TextureId) -> Result<()>;
    fn active_texture_unit(&mut self, unit: u32) -> Result<()>;
    fn bind_texture(&mut self, kind: TextureKind, id: Option<TextureId>) -> Result<()>;

    // ── state & drawing ───────────────────────────────────────────────────

    fn set_capability(&mut self, capability: Capability, enabled: bool) -> Result<()>;
    /// Model-view-projection matrix used by subsequent draws.
    fn set_transform(&mut self, matrix: Mat4) -> Result<()>;
    fn set_viewport(&mut self, rect: PixelRect) -> Result<()>;
    fn clear(&mut self, color: Color) -> Result<()>;
    fn draw_arrays(&mut self, mode: Primitive, first: u32, count: u32) -> Result<()>;
    /// Draws `count` u16 indices starting at element `first` of the bound
    /// index buffer.
    fn draw_elements(&mut self, mode: Primitive, first: u32, count: u32) -> Result<()>;

    // ── frame ─────────────────────────────────────────────────────────────

    fn begin_frame(&mut self) -> Result<FrameStatus>;
    fn end_frame(&mut self) -> Result<()>;
    fn resize(&mut self, width: u32, height: u32);
}
