use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3};

use crate::buffer::GrowableBuffer;
use crate::device::{BufferTarget, BufferUsage, Primitive, ScalarType, TextureKind};
use crate::error::{RenderError, Result};
use crate::layout::{
    ATTR_COLOR, ATTR_NORMAL, ATTR_POSITION, ATTR_TEXCOORD, AttributeLayout, AttributeSource,
};
use crate::paint::Color;
use crate::render::{BatchMesh, ImageData, RenderContext, Texture};
use crate::scene::{Node, NodeCtx};

use super::accumulator::{Dims, ShapeGeometry, ShapeVertexAccumulator, VertexKind};

/// How a shape's surface is painted.
#[derive(Debug, Clone)]
pub enum Fill {
    /// Nothing is drawn.
    None,
    /// Per-vertex color, captured when each vertex is submitted.
    Color(Color),
    /// A 2D texture sampled with the vertices' texture coordinates.
    Texture(Rc<ImageData>),
}

impl Default for Fill {
    fn default() -> Self {
        Fill::Color(Color::WHITE)
    }
}

/// Node holding user-built geometry.
///
/// Vertices are collected on the CPU between `begin` and `end`, then
/// uploaded at setup or on the first draw after the shape was closed again.
/// The fill decides which vertex call is legal: colored vertices for color
/// fills, textured vertices for texture fills.
pub struct Shape {
    mode: Primitive,
    fill: Fill,
    batched: bool,
    accumulator: ShapeVertexAccumulator,
    layout: AttributeLayout,
    geometry: ShapeGeometry,
    dirty: bool,
    vbo: Option<GrowableBuffer<f32>>,
    texture: Option<Texture>,
    texture_dirty: bool,
    mesh: BatchMesh,
}

impl Default for Shape {
    fn default() -> Self {
        Self::new(Primitive::default())
    }
}

impl Shape {
    pub fn new(mode: Primitive) -> Self {
        Self {
            mode,
            fill: Fill::default(),
            batched: false,
            accumulator: ShapeVertexAccumulator::new(),
            layout: AttributeLayout::new(),
            geometry: ShapeGeometry::default(),
            dirty: false,
            vbo: None,
            texture: None,
            texture_dirty: false,
            mesh: BatchMesh::new(),
        }
    }

    #[inline]
    pub fn mode(&self) -> Primitive {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Primitive) {
        self.mode = mode;
    }

    #[inline]
    pub fn fill_state(&self) -> &Fill {
        &self.fill
    }

    pub fn fill(&mut self, color: Color) {
        self.fill = Fill::Color(color);
    }

    /// Fills with `image`. The texture is created on the next draw.
    pub fn fill_texture(&mut self, image: Rc<ImageData>) {
        self.fill = Fill::Texture(image);
        self.texture_dirty = true;
    }

    pub fn no_fill(&mut self) {
        self.fill = Fill::None;
    }

    /// Hands colored triangle geometry to the batched renderer instead of
    /// drawing it directly.
    pub fn set_batched(&mut self, batched: bool) {
        self.batched = batched;
    }

    #[inline]
    pub fn is_batched(&self) -> bool {
        self.batched
    }

    /// Vertices of the last closed session.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.geometry.vertex_count
    }

    pub fn layout(&self) -> &AttributeLayout {
        &self.layout
    }

    // ── building ──────────────────────────────────────────────────────────

    pub fn begin(&mut self) -> Result<()> {
        self.accumulator.begin()
    }

    pub fn normal(&mut self, x: f32, y: f32, z: f32) -> Result<()> {
        self.accumulator.normal(Vec3::new(x, y, z))
    }

    pub fn vertex(&mut self, x: f32, y: f32) -> Result<()> {
        let color = self.vertex_color()?;
        self.accumulator.colored(Vec3::new(x, y, 0.0), Dims::Two, color)
    }

    pub fn vertex3(&mut self, x: f32, y: f32, z: f32) -> Result<()> {
        let color = self.vertex_color()?;
        self.accumulator.colored(Vec3::new(x, y, z), Dims::Three, color)
    }

    pub fn vertex_uv(&mut self, x: f32, y: f32, u: f32, v: f32) -> Result<()> {
        self.check_textured()?;
        self.accumulator.textured(Vec3::new(x, y, 0.0), Dims::Two, Vec2::new(u, v))
    }

    pub fn vertex3_uv(&mut self, x: f32, y: f32, z: f32, u: f32, v: f32) -> Result<()> {
        self.check_textured()?;
        self.accumulator.textured(Vec3::new(x, y, z), Dims::Three, Vec2::new(u, v))
    }

    fn vertex_color(&self) -> Result<Color> {
        match &self.fill {
            Fill::Color(color) => Ok(*color),
            Fill::None => Ok(Color::WHITE),
            Fill::Texture(_) => Err(RenderError::mismatch(
                "shape",
                "texture-filled shape needs vertices with texture coordinates",
            )),
        }
    }

    fn check_textured(&self) -> Result<()> {
        match self.fill {
            Fill::Texture(_) | Fill::None => Ok(()),
            Fill::Color(_) => Err(RenderError::mismatch(
                "shape",
                "color-filled shape got vertices with texture coordinates",
            )),
        }
    }

    /// Closes the session and fixes the layout to its vertex kind.
    pub fn end(&mut self) -> Result<()> {
        let geometry = self.accumulator.end()?;
        if let Some(kind) = geometry.kind {
            self.register_layout(kind)?;
        }
        self.geometry = geometry;
        self.dirty = true;
        Ok(())
    }

    fn register_layout(&mut self, kind: VertexKind) -> Result<()> {
        let (name, ty_count, other) = match kind {
            VertexKind::Textured => (ATTR_TEXCOORD, 2, ATTR_COLOR),
            VertexKind::Colored => (ATTR_COLOR, 4, ATTR_TEXCOORD),
        };
        if self.layout.get(other).is_some() {
            return Err(RenderError::mismatch(
                format!("attribute `{name}`"),
                format!("shape layout already carries `{other}`"),
            ));
        }
        self.layout.register(ATTR_POSITION, ScalarType::Float, 3)?;
        self.layout.register(ATTR_NORMAL, ScalarType::Float, 3)?;
        self.layout.register(name, ScalarType::Float, ty_count)?;
        Ok(())
    }

    // ── device side ───────────────────────────────────────────────────────

    fn upload(&mut self, render: &mut RenderContext) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if !self.geometry.data.is_empty() {
            match self.vbo.as_mut() {
                Some(vbo) => vbo.clear()?,
                None => {
                    let vbo = GrowableBuffer::new(
                        render,
                        BufferTarget::Vertex,
                        BufferUsage::Static,
                        self.geometry.data.len(),
                    )?;
                    self.vbo = Some(vbo);
                }
            }
            if let Some(vbo) = self.vbo.as_mut() {
                vbo.put(render, &self.geometry.data)?;
            }
        }
        self.dirty = false;
        Ok(())
    }

    fn refresh_texture(&mut self, render: &mut RenderContext) -> Result<()> {
        if !self.texture_dirty {
            return Ok(());
        }
        if let Some(mut old) = self.texture.take() {
            old.dispose(render)?;
        }
        if let Fill::Texture(image) = &self.fill {
            self.texture = Some(Texture::new(render, TextureKind::D2, image)?);
        }
        self.texture_dirty = false;
        Ok(())
    }

    fn submit_batched(&mut self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        let stride = ShapeGeometry::floats_per_vertex(VertexKind::Colored);
        let triangles = triangle_indices(self.mode, self.geometry.vertex_count)?;

        self.mesh.clear();
        for vertex in self.geometry.data.chunks_exact(stride) {
            let position = Vec3::from_slice(&vertex[0..3]);
            let color = Color::new(vertex[6], vertex[7], vertex[8], vertex[9]);
            self.mesh.push_vertex(ctx.world, position, color);
        }
        for [a, b, c] in triangles {
            self.mesh.push_triangle(a, b, c);
        }
        ctx.batch.submit(ctx.render, &self.mesh)
    }

    fn draw_direct(&mut self, render: &mut RenderContext, world: Mat4) -> Result<()> {
        self.upload(render)?;
        self.refresh_texture(render)?;

        let textured = self.geometry.kind == Some(VertexKind::Textured);
        let shader = if textured {
            render.shaders().texture
        } else {
            render.shaders().color
        };
        if textured != matches!(self.fill, Fill::Texture(_)) {
            return Err(RenderError::mismatch(
                "shape",
                "fill kind changed after the geometry was closed",
            ));
        }

        render.use_shader(Some(shader))?;
        let view_projection = render.view_projection();
        render.set_transform(view_projection * world)?;
        self.bind_attributes(render, shader)?;
        if let Some(texture) = &self.texture {
            texture.bind(render, 0)?;
        }
        render.draw_arrays(self.mode, 0, self.geometry.vertex_count as u32)
    }
}

/// Triangle list covering `count` vertices drawn as `mode`. Fails when an
/// index would not fit in `u16`.
fn triangle_indices(mode: Primitive, count: usize) -> Result<Vec<[u16; 3]>> {
    let count = u16::try_from(count)
        .map_err(|_| RenderError::capacity("batched shape", count, u16::MAX as usize))?;
    Ok(match mode {
        Primitive::Triangles => (0..count / 3).map(|t| [t * 3, t * 3 + 1, t * 3 + 2]).collect(),
        Primitive::TriangleStrip => (0..count.saturating_sub(2))
            .map(|i| if i % 2 == 0 { [i, i + 1, i + 2] } else { [i + 1, i, i + 2] })
            .collect(),
        Primitive::TriangleFan => (1..count.saturating_sub(1)).map(|i| [0, i, i + 1]).collect(),
        Primitive::Points | Primitive::Lines | Primitive::LineStrip => Vec::new(),
    })
}

impl AttributeSource for Shape {
    fn parts_mut(&mut self) -> (Option<&mut GrowableBuffer<f32>>, &mut AttributeLayout) {
        (self.vbo.as_mut(), &mut self.layout)
    }
}

impl Node for Shape {
    fn setup(&mut self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        self.upload(ctx.render)?;
        self.refresh_texture(ctx.render)
    }

    fn draw(&mut self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        if matches!(self.fill, Fill::None) || self.geometry.vertex_count == 0 {
            return Ok(());
        }
        let batchable = self.batched
            && self.geometry.kind == Some(VertexKind::Colored)
            && self.mode.is_triangles();
        if batchable {
            self.submit_batched(ctx)
        } else {
            self.draw_direct(ctx.render, ctx.world)
        }
    }

    fn dispose(&mut self, render: &mut RenderContext) -> Result<()> {
        if let Some(mut vbo) = self.vbo.take() {
            vbo.dispose(render)?;
        }
        if let Some(mut texture) = self.texture.take() {
            texture.dispose(render)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CallLog, DeviceCall, RecordingDevice, RenderApi};
    use crate::scene::{Display, DisplayConfig, NodeId};

    fn started() -> (Display, CallLog) {
        let mut display = Display::new(DisplayConfig::default());
        let device = RecordingDevice::new();
        let log = device.log();
        display.set_renderer(RenderApi::Headless).unwrap();
        display.start(Box::new(device)).unwrap();
        log.clear();
        (display, log)
    }

    fn triangle(color: Color) -> Shape {
        let mut shape = Shape::new(Primitive::Triangles);
        shape.fill(color);
        shape.begin().unwrap();
        shape.vertex(0.0, 0.0).unwrap();
        shape.vertex(1.0, 0.0).unwrap();
        shape.vertex(0.0, 1.0).unwrap();
        shape.end().unwrap();
        shape
    }

    fn attach(display: &mut Display, shape: Shape) -> NodeId {
        let id = display.create_node(shape);
        display.add(display.root(), id).unwrap();
        id
    }

    // ── fill checks ───────────────────────────────────────────────────────

    #[test]
    fn texcoord_vertex_on_color_fill_is_a_mismatch() {
        let mut shape = Shape::default();
        shape.fill(Color::WHITE);
        shape.begin().unwrap();
        let err = shape.vertex_uv(0.0, 0.0, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, RenderError::ConfigurationMismatch { .. }));
    }

    #[test]
    fn plain_vertex_on_texture_fill_is_a_mismatch() {
        let mut shape = Shape::default();
        shape.fill_texture(Rc::new(ImageData::rgba(1, 1, vec![0; 4]).unwrap()));
        shape.begin().unwrap();
        let err = shape.vertex(0.0, 0.0).unwrap_err();
        assert!(matches!(err, RenderError::ConfigurationMismatch { .. }));
    }

    #[test]
    fn vertex_before_begin_is_a_usage_error() {
        let mut shape = Shape::default();
        assert!(matches!(shape.vertex(0.0, 0.0), Err(RenderError::UsageState { .. })));
    }

    #[test]
    fn reclosing_with_the_other_fill_kind_conflicts() {
        let mut shape = triangle(Color::WHITE);
        assert_eq!(shape.layout().stride(), 40);

        shape.fill_texture(Rc::new(ImageData::rgba(1, 1, vec![0; 4]).unwrap()));
        shape.begin().unwrap();
        shape.vertex_uv(0.0, 0.0, 0.0, 0.0).unwrap();
        let err = shape.end().unwrap_err();
        assert!(matches!(err, RenderError::ConfigurationMismatch { .. }));
    }

    // ── drawing ───────────────────────────────────────────────────────────

    #[test]
    fn draws_once_per_frame_with_cached_binds() {
        let (mut display, log) = started();
        attach(&mut display, triangle(Color::rgb(1.0, 0.0, 0.0)));
        log.clear();

        display.draw().unwrap();
        display.draw().unwrap();

        let draws = log.draws();
        assert_eq!(
            draws,
            vec![
                DeviceCall::DrawArrays { mode: Primitive::Triangles, first: 0, count: 3 },
                DeviceCall::DrawArrays { mode: Primitive::Triangles, first: 0, count: 3 },
            ]
        );
        // Uploaded at setup; the shader stays current across frames.
        assert_eq!(log.count(|c| matches!(c, DeviceCall::BufferData { .. })), 0);
        assert_eq!(log.count(|c| matches!(c, DeviceCall::UseShader(_))), 1);
    }

    #[test]
    fn no_fill_draws_nothing() {
        let (mut display, log) = started();
        let mut shape = triangle(Color::WHITE);
        shape.no_fill();
        attach(&mut display, shape);

        display.draw().unwrap();
        assert!(log.draws().is_empty());
    }

    #[test]
    fn reclosed_geometry_is_uploaded_on_next_draw() {
        let (mut display, log) = started();
        let id = attach(&mut display, triangle(Color::WHITE));
        {
            let shape = display.behavior_mut::<Shape>(id).unwrap();
            shape.begin().unwrap();
            for i in 0..6 {
                shape.vertex(i as f32, 0.0).unwrap();
            }
            shape.end().unwrap();
        }
        log.clear();

        display.draw().unwrap();
        assert_eq!(
            log.draws(),
            vec![DeviceCall::DrawArrays { mode: Primitive::Triangles, first: 0, count: 6 }]
        );
        assert_eq!(log.count(|c| matches!(c, DeviceCall::BufferData { .. })), 1);
    }

    #[test]
    fn textured_shape_binds_its_texture_on_unit_zero() {
        let (mut display, log) = started();
        let mut shape = Shape::new(Primitive::TriangleFan);
        shape.fill_texture(Rc::new(ImageData::rgba(1, 1, vec![255; 4]).unwrap()));
        shape.begin().unwrap();
        shape.vertex_uv(0.0, 0.0, 0.0, 0.0).unwrap();
        shape.vertex_uv(1.0, 0.0, 1.0, 0.0).unwrap();
        shape.vertex_uv(1.0, 1.0, 1.0, 1.0).unwrap();
        shape.end().unwrap();
        attach(&mut display, shape);

        display.draw().unwrap();
        assert_eq!(log.count(|c| matches!(c, DeviceCall::CreateTexture { .. })), 1);
        assert_eq!(log.count(|c| matches!(c, DeviceCall::BindTexture { .. })), 1);
        assert_eq!(
            log.draws(),
            vec![DeviceCall::DrawArrays { mode: Primitive::TriangleFan, first: 0, count: 3 }]
        );
    }

    #[test]
    fn batched_shapes_share_one_draw() {
        let (mut display, log) = started();
        for _ in 0..3 {
            let mut shape = triangle(Color::WHITE);
            shape.set_batched(true);
            attach(&mut display, shape);
        }

        display.draw().unwrap();
        let draws = log.draws();
        assert_eq!(draws.len(), 1);
        assert!(matches!(
            &draws[0],
            DeviceCall::DrawElements { count: 9, indices, .. } if indices[6..] == [6, 7, 8]
        ));
    }

    #[test]
    fn dispose_releases_buffer_and_texture() {
        let (mut display, log) = started();
        let id = attach(&mut display, triangle(Color::WHITE));
        display.dispose_node(id).unwrap();
        assert_eq!(log.count(|c| matches!(c, DeviceCall::DeleteBuffer(_))), 1);
    }

    #[test]
    fn fan_and_strip_indices() {
        assert_eq!(
            triangle_indices(Primitive::TriangleFan, 5).unwrap(),
            vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]
        );
        assert_eq!(triangle_indices(Primitive::TriangleStrip, 4).unwrap(), vec![[0, 1, 2], [2, 1, 3]]);
        assert!(triangle_indices(Primitive::TriangleFan, 2).unwrap().is_empty());
    }

    #[test]
    fn indices_beyond_u16_are_a_capacity_error() {
        let last = triangle_indices(Primitive::TriangleFan, 65_535).unwrap();
        assert_eq!(last.last(), Some(&[0, 65_533, 65_534]));
        assert!(matches!(
            triangle_indices(Primitive::TriangleFan, 65_536),
            Err(RenderError::Capacity { requested: 65_536, .. })
        ));
        assert!(triangle_indices(Primitive::Triangles, 70_000).is_err());
    }
}
