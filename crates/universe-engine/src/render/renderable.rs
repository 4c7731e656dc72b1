use glam::{Mat4, Vec2, Vec3};

use crate::paint::Color;

use super::batch::BATCH_VERTEX_FLOATS;

/// Geometry that can be handed to the batched renderer.
///
/// Vertices are flat `[x, y, r, g, b, a]` groups. Indices are local to this
/// renderable and start at 0.
pub trait Renderable {
    fn vertices(&self) -> &[f32];
    fn indices(&self) -> &[u16];
    fn vertex_count(&self) -> usize;
}

/// Owned batch geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchMesh {
    vertices: Vec<f32>,
    indices: Vec<u16>,
}

impl BatchMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(vertices: Vec<f32>, indices: Vec<u16>) -> Self {
        Self { vertices, indices }
    }

    /// Axis-aligned `width` x `height` quad centered on the origin, moved
    /// into world space by `world`.
    pub fn quad(world: Mat4, width: f32, height: f32, color: Color) -> Self {
        let mut mesh = Self::new();
        mesh.push_quad(world, width, height, color);
        mesh
    }

    pub fn push_quad(&mut self, world: Mat4, width: f32, height: f32, color: Color) {
        let (hw, hh) = (width * 0.5, height * 0.5);
        let corners = [
            Vec2::new(-hw, -hh),
            Vec2::new(hw, -hh),
            Vec2::new(hw, hh),
            Vec2::new(-hw, hh),
        ];
        let [a, b, c, d] = corners.map(|corner| self.push_vertex(world, corner.extend(0.0), color));
        self.push_triangle(a, b, c);
        self.push_triangle(a, c, d);
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Appends a vertex after transforming it by `world`. Returns its index.
    pub fn push_vertex(&mut self, world: Mat4, position: Vec3, color: Color) -> u16 {
        let index = self.vertex_count() as u16;
        let p = world.transform_point3(position);
        self.vertices.extend_from_slice(&[p.x, p.y]);
        self.vertices.extend_from_slice(&color.to_array());
        index
    }

    pub fn push_triangle(&mut self, a: u16, b: u16, c: u16) {
        self.indices.extend_from_slice(&[a, b, c]);
    }
}

impl Renderable for BatchMesh {
    fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    fn indices(&self) -> &[u16] {
        &self.indices
    }

    fn vertex_count(&self) -> usize {
        self.vertices.len() / BATCH_VERTEX_FLOATS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_is_moved_into_world_space() {
        let world = Mat4::from_translation(Vec3::new(10.0, 20.0, 0.0));
        let quad = BatchMesh::quad(world, 2.0, 4.0, Color::WHITE);

        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(&quad.vertices()[..2], &[9.0, 18.0]);
        assert_eq!(&quad.vertices()[12..14], &[11.0, 22.0]);
        assert_eq!(quad.indices(), &[0, 1, 2, 0, 2, 3]);
    }
}
