use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glam::Mat4;

use crate::coords::PixelRect;
use crate::error::{RenderError, Result};
use crate::paint::Color;

use super::api::GraphicsDevice;
use super::types::{
    AttributePointer, BufferId, BufferTarget, BufferUsage, Capability, FrameStatus, Primitive,
    RenderApi, ShaderDesc, ShaderId, TextureId, TextureKind, TextureOptions, VertexArrayId,
};

/// One call that reached the device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer { id: BufferId, target: BufferTarget, usage: BufferUsage },
    DeleteBuffer(BufferId),
    BindBuffer { target: BufferTarget, id: Option<BufferId> },
    BufferData { target: BufferTarget, size: usize },
    BufferSubData { target: BufferTarget, offset: usize, len: usize },
    CreateVertexArray(VertexArrayId),
    DeleteVertexArray(VertexArrayId),
    BindVertexArray(Option<VertexArrayId>),
    EnableAttribute { location: u32, pointer: AttributePointer },
    DisableAttribute(u32),
    CreateShader { id: ShaderId, label: String },
    DeleteShader(ShaderId),
    UseShader(Option<ShaderId>),
    CreateTexture { id: TextureId, kind: TextureKind, width: u32, height: u32, options: TextureOptions },
    DeleteTexture(TextureId),
    ActiveTextureUnit(u32),
    BindTexture { kind: TextureKind, id: Option<TextureId> },
    SetCapability { capability: Capability, enabled: bool },
    SetTransform(Mat4),
    SetViewport(PixelRect),
    Clear(Color),
    DrawArrays { mode: Primitive, first: u32, count: u32 },
    /// `indices` holds the index values the draw actually read.
    DrawElements { mode: Primitive, first: u32, count: u32, indices: Vec<u16> },
    BeginFrame,
    EndFrame,
    Resize { width: u32, height: u32 },
}

impl DeviceCall {
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::DrawArrays { .. } | Self::DrawElements { .. })
    }
}

/// Shared handle on the calls recorded by a `RecordingDevice`.
///
/// The device is boxed into a `RenderContext`; tests keep a `CallLog`
/// clone to inspect what it did.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<DeviceCall>>>);

impl CallLog {
    fn push(&self, call: DeviceCall) {
        self.0.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.0.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn draws(&self) -> Vec<DeviceCall> {
        self.0.borrow().iter().filter(|c| c.is_draw()).cloned().collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[derive(Debug)]
struct RecordedBuffer {
    target: BufferTarget,
    data: Vec<u8>,
}

/// Headless device that validates and records every call.
///
/// It keeps enough state to reject what a real device would reject: unknown
/// ids, uploads with nothing bound, draws without a program, reads past the
/// end of a buffer.
#[derive(Debug)]
pub struct RecordingDevice {
    log: CallLog,
    next_id: u32,
    buffers: HashMap<BufferId, RecordedBuffer>,
    vertex_arrays: HashSet<VertexArrayId>,
    shaders: HashMap<ShaderId, HashMap<String, u32>>,
    textures: HashSet<TextureId>,
    bound_vertex: Option<BufferId>,
    bound_index: Option<BufferId>,
    program: Option<ShaderId>,
    in_frame: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            next_id: 1,
            buffers: HashMap::new(),
            vertex_arrays: HashSet::new(),
            shaders: HashMap::new(),
            textures: HashSet::new(),
            bound_vertex: None,
            bound_index: None,
            program: None,
            in_frame: false,
        }
    }

    /// Handle on this device's call log.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Current contents of a buffer, as the device sees them.
    pub fn buffer_contents(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(|b| b.data.as_slice())
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn bound(&self, target: BufferTarget) -> Result<BufferId> {
        let slot = match target {
            BufferTarget::Vertex => self.bound_vertex,
            BufferTarget::Index => self.bound_index,
        };
        slot.ok_or_else(|| RenderError::usage(target.to_string(), "no buffer bound"))
    }

    fn bound_mut(&mut self, target: BufferTarget) -> Result<&mut RecordedBuffer> {
        let id = self.bound(target)?;
        self.buffers
            .get_mut(&id)
            .ok_or_else(|| RenderError::resource(id.to_string(), "deleted while bound"))
    }

    fn require_program(&self, what: &str) -> Result<()> {
        if self.program.is_none() {
            return Err(RenderError::usage(what, "no shader program in use"));
        }
        Ok(())
    }
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for RecordingDevice {
    fn api(&self) -> RenderApi {
        RenderApi::Headless
    }

    fn create_buffer(&mut self, target: BufferTarget, usage: BufferUsage) -> Result<BufferId> {
        let id = BufferId::new(self.next());
        self.buffers.insert(id, RecordedBuffer { target, data: Vec::new() });
        self.log.push(DeviceCall::CreateBuffer { id, target, usage });
        Ok(id)
    }

    fn delete_buffer(&mut self, id: BufferId) -> Result<()> {
        if self.buffers.remove(&id).is_none() {
            return Err(RenderError::resource(id.to_string(), "unknown or already deleted"));
        }
        if self.bound_vertex == Some(id) {
            self.bound_vertex = None;
        }
        if self.bound_index == Some(id) {
            self.bound_index = None;
        }
        self.log.push(DeviceCall::DeleteBuffer(id));
        Ok(())
    }

    fn bind_buffer(&mut self, target: BufferTarget, id: Option<BufferId>) -> Result<()> {
        if let Some(id) = id {
            let buffer = self
                .buffers
                .get(&id)
                .ok_or_else(|| RenderError::resource(id.to_string(), "unknown buffer"))?;
            if buffer.target != target {
                return Err(RenderError::mismatch(
                    id.to_string(),
                    format!("created as {} but bound as {target}", buffer.target),
                ));
            }
        }
        match target {
            BufferTarget::Vertex => self.bound_vertex = id,
            BufferTarget::Index => self.bound_index = id,
        }
        self.log.push(DeviceCall::BindBuffer { target, id });
        Ok(())
    }

    fn buffer_data(&mut self, target: BufferTarget, size: usize, data: &[u8]) -> Result<()> {
        if data.len() > size {
            return Err(RenderError::capacity(target.to_string(), data.len(), size));
        }
        let buffer = self.bound_mut(target)?;
        buffer.data.clear();
        buffer.data.resize(size, 0);
        buffer.data[..data.len()].copy_from_slice(data);
        self.log.push(DeviceCall::BufferData { target, size });
        Ok(())
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) -> Result<()> {
        let buffer = self.bound_mut(target)?;
        let end = offset + data.len();
        if end > buffer.data.len() {
            return Err(RenderError::capacity(target.to_string(), end, buffer.data.len()));
        }
        buffer.data[offset..end].copy_from_slice(data);
        self.log.push(DeviceCall::BufferSubData { target, offset, len: data.len() });
        Ok(())
    }

    fn create_vertex_array(&mut self) -> Result<VertexArrayId> {
        let id = VertexArrayId::new(self.next());
        self.vertex_arrays.insert(id);
        self.log.push(DeviceCall::CreateVertexArray(id));
        Ok(id)
    }

    fn delete_vertex_array(&mut self, id: VertexArrayId) -> Result<()> {
        if !self.vertex_arrays.remove(&id) {
            return Err(RenderError::resource(id.to_string(), "unknown or already deleted"));
        }
        self.log.push(DeviceCall::DeleteVertexArray(id));
        Ok(())
    }

    fn bind_vertex_array(&mut self, id: Option<VertexArrayId>) -> Result<()> {
        if let Some(id) = id {
            if !self.vertex_arrays.contains(&id) {
                return Err(RenderError::resource(id.to_string(), "unknown vertex array"));
            }
        }
        self.log.push(DeviceCall::BindVertexArray(id));
        Ok(())
    }

    fn enable_attribute(&mut self, location: u32, pointer: AttributePointer) -> Result<()> {
        self.bound(BufferTarget::Vertex)?;
        self.log.push(DeviceCall::EnableAttribute { location, pointer });
        Ok(())
    }

    fn disable_attribute(&mut self, location: u32) -> Result<()> {
        self.log.push(DeviceCall::DisableAttribute(location));
        Ok(())
    }

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId> {
        let id = ShaderId::new(self.next());
        let locations = desc
            .attributes
            .iter()
            .map(|(name, loc)| (name.to_string(), *loc))
            .collect();
        self.shaders.insert(id, locations);
        self.log.push(DeviceCall::CreateShader { id, label: desc.label.to_string() });
        Ok(id)
    }

    fn delete_shader(&mut self, id: ShaderId) -> Result<()> {
        if self.shaders.remove(&id).is_none() {
            return Err(RenderError::resource(id.to_string(), "unknown or already deleted"));
        }
        if self.program == Some(id) {
            self.program = None;
        }
        self.log.push(DeviceCall::DeleteShader(id));
        Ok(())
    }

    fn use_shader(&mut self, id: Option<ShaderId>) -> Result<()> {
        if let Some(id) = id {
            if !self.shaders.contains_key(&id) {
                return Err(RenderError::resource(id.to_string(), "unknown shader"));
            }
        }
        self.program = id;
        self.log.push(DeviceCall::UseShader(id));
        Ok(())
    }

    fn attribute_location(&self, shader: ShaderId, name: &str) -> Result<Option<u32>> {
        let locations = self
            .shaders
            .get(&shader)
            .ok_or_else(|| RenderError::resource(shader.to_string(), "unknown shader"))?;
        Ok(locations.get(name).copied())
    }

    fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
        rgba: &[u8],
        options: TextureOptions,
    ) -> Result<TextureId> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(RenderError::mismatch(
                "texture upload",
                format!("expected {expected} bytes of RGBA8, got {}", rgba.len()),
            ));
        }
        let id = TextureId::new(self.next());
        self.textures.insert(id);
        self.log.push(DeviceCall::CreateTexture { id, kind, width, height, options });
        Ok(id)
    }

    fn delete_texture(&mut self, id: TextureId) -> Result<()> {
        if !self.textures.remove(&id) {
            return Err(RenderError::resource(id.to_string(), "unknown or already deleted"));
        }
        self.log.push(DeviceCall::DeleteTexture(id));
        Ok(())
    }

    fn active_texture_unit(&mut self, unit: u32) -> Result<()> {
        self.log.push(DeviceCall::ActiveTextureUnit(unit));
        Ok(())
    }

    fn bind_texture(&mut self, kind: TextureKind, id: Option<TextureId>) -> Result<()> {
        if let Some(id) = id {
            if !self.textures.contains(&id) {
                return Err(RenderError::resource(id.to_string(), "unknown texture"));
            }
        }
        self.log.push(DeviceCall::BindTexture { kind, id });
        Ok(())
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) -> Result<()> {
        self.log.push(DeviceCall::SetCapability { capability, enabled });
        Ok(())
    }

    fn set_transform(&mut self, matrix: Mat4) -> Result<()> {
        self.log.push(DeviceCall::SetTransform(matrix));
        Ok(())
    }

    fn set_viewport(&mut self, rect: PixelRect) -> Result<()> {
        self.log.push(DeviceCall::SetViewport(rect));
        Ok(())
    }

    fn clear(&mut self, color: Color) -> Result<()> {
        self.log.push(DeviceCall::Clear(color));
        Ok(())
    }

    fn draw_arrays(&mut self, mode: Primitive, first: u32, count: u32) -> Result<()> {
        self.require_program("draw_arrays")?;
        self.bound(BufferTarget::Vertex)?;
        self.log.push(DeviceCall::DrawArrays { mode, first, count });
        Ok(())
    }

    fn draw_elements(&mut self, mode: Primitive, first: u32, count: u32) -> Result<()> {
        self.require_program("draw_elements")?;
        self.bound(BufferTarget::Vertex)?;
        let index = self.bound(BufferTarget::Index)?;
        let data = self
            .buffers
            .get(&index)
            .map(|b| b.data.as_slice())
            .unwrap_or_default();

        let start = first as usize * 2;
        let end = start + count as usize * 2;
        if end > data.len() {
            return Err(RenderError::capacity("draw_elements", end, data.len()));
        }
        let indices = data[start..end]
            .chunks_exact(2)
            .map(|b| u16::from_ne_bytes([b[0], b[1]]))
            .collect();

        self.log.push(DeviceCall::DrawElements { mode, first, count, indices });
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<FrameStatus> {
        if self.in_frame {
            return Err(RenderError::usage("frame", "begin_frame called twice"));
        }
        self.in_frame = true;
        self.log.push(DeviceCall::BeginFrame);
        Ok(FrameStatus::Ready)
    }

    fn end_frame(&mut self) -> Result<()> {
        if !self.in_frame {
            return Err(RenderError::usage("frame", "end_frame without begin_frame"));
        }
        self.in_frame = false;
        self.log.push(DeviceCall::EndFrame);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.log.push(DeviceCall::Resize { width, height });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_reads_indices_from_bound_buffer() {
        let mut dev = RecordingDevice::new();
        let log = dev.log();

        let shader = dev
            .create_shader(&ShaderDesc { label: "t", wgsl: "", attributes: &[], textured: false })
            .unwrap();
        let vbo = dev.create_buffer(BufferTarget::Vertex, BufferUsage::Static).unwrap();
        let ibo = dev.create_buffer(BufferTarget::Index, BufferUsage::Static).unwrap();
        dev.use_shader(Some(shader)).unwrap();
        dev.bind_buffer(BufferTarget::Vertex, Some(vbo)).unwrap();
        dev.bind_buffer(BufferTarget::Index, Some(ibo)).unwrap();
        dev.buffer_data(BufferTarget::Index, 8, bytemuck::cast_slice(&[3u16, 1, 2])).unwrap();

        dev.draw_elements(Primitive::Triangles, 1, 2).unwrap();
        let draws = log.draws();
        assert_eq!(
            draws,
            vec![DeviceCall::DrawElements {
                mode: Primitive::Triangles,
                first: 1,
                count: 2,
                indices: vec![1, 2],
            }]
        );
    }

    #[test]
    fn draw_without_program_fails() {
        let mut dev = RecordingDevice::new();
        let vbo = dev.create_buffer(BufferTarget::Vertex, BufferUsage::Static).unwrap();
        dev.bind_buffer(BufferTarget::Vertex, Some(vbo)).unwrap();
        let err = dev.draw_arrays(Primitive::Triangles, 0, 3).unwrap_err();
        assert!(matches!(err, RenderError::UsageState { .. }));
    }

    #[test]
    fn binding_to_wrong_target_is_a_mismatch() {
        let mut dev = RecordingDevice::new();
        let ibo = dev.create_buffer(BufferTarget::Index, BufferUsage::Static).unwrap();
        let err = dev.bind_buffer(BufferTarget::Vertex, Some(ibo)).unwrap_err();
        assert!(matches!(err, RenderError::ConfigurationMismatch { .. }));
    }

    #[test]
    fn deleting_twice_fails() {
        let mut dev = RecordingDevice::new();
        let vbo = dev.create_buffer(BufferTarget::Vertex, BufferUsage::Static).unwrap();
        dev.delete_buffer(vbo).unwrap();
        assert!(dev.delete_buffer(vbo).is_err());
    }
}
