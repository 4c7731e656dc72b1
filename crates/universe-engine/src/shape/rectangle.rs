use crate::error::Result;
use crate::paint::Color;
use crate::render::BatchMesh;
use crate::scene::{Node, NodeCtx};

/// Solid 2D quad centered on its node's origin, always drawn through the
/// batched renderer.
#[derive(Debug, Clone)]
pub struct Rectangle {
    pub width: f32,
    pub height: f32,
    pub color: Color,
    mesh: BatchMesh,
}

impl Rectangle {
    pub fn new(width: f32, height: f32, color: Color) -> Self {
        Self {
            width,
            height,
            color,
            mesh: BatchMesh::new(),
        }
    }
}

impl Node for Rectangle {
    fn draw(&mut self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        self.mesh.clear();
        self.mesh.push_quad(ctx.world, self.width, self.height, self.color);
        ctx.batch.submit(ctx.render, &self.mesh)
    }
}
