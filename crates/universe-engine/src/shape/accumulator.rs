use glam::{Vec2, Vec3};

use crate::buffer::{ACCUMULATOR_GROWTH_THRESHOLD, grow_capacity};
use crate::error::{RenderError, Result};
use crate::paint::Color;

const INITIAL_VERTICES: usize = 64;

/// Dimensionality fixed by the first vertex of a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dims {
    Two,
    Three,
}

/// Per-vertex payload fixed by the first vertex of a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VertexKind {
    /// Carries a texture coordinate.
    Textured,
    /// Carries an RGBA color.
    Colored,
}

/// Interleaved result of a closed session.
///
/// Per vertex: position (3), normal (3), then texcoord (2) or color (4).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeGeometry {
    pub data: Vec<f32>,
    pub vertex_count: usize,
    /// `None` when the session had no vertex.
    pub kind: Option<VertexKind>,
}

impl ShapeGeometry {
    pub fn floats_per_vertex(kind: VertexKind) -> usize {
        match kind {
            VertexKind::Textured => 3 + 3 + 2,
            VertexKind::Colored => 3 + 3 + 4,
        }
    }
}

/// Collects vertices between `begin` and `end` into parallel arrays.
///
/// The first vertex of a session decides 2D vs 3D and textured vs colored;
/// every later vertex in the same session has to agree.
#[derive(Debug)]
pub struct ShapeVertexAccumulator {
    positions: Vec<f32>,
    normals: Vec<f32>,
    texcoords: Vec<f32>,
    colors: Vec<f32>,
    /// Vertices the arrays are sized for.
    capacity: usize,
    count: usize,
    normal: Vec3,
    open: bool,
    dims: Option<Dims>,
    kind: Option<VertexKind>,
}

impl Default for ShapeVertexAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeVertexAccumulator {
    pub fn new() -> Self {
        Self {
            positions: Vec::with_capacity(INITIAL_VERTICES * 3),
            normals: Vec::with_capacity(INITIAL_VERTICES * 3),
            texcoords: Vec::with_capacity(INITIAL_VERTICES * 2),
            colors: Vec::with_capacity(INITIAL_VERTICES * 4),
            capacity: INITIAL_VERTICES,
            count: 0,
            normal: Vec3::Z,
            open: false,
            dims: None,
            kind: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn dims(&self) -> Option<Dims> {
        self.dims
    }

    pub fn kind(&self) -> Option<VertexKind> {
        self.kind
    }

    /// Opens a session, discarding what the previous one collected.
    pub fn begin(&mut self) -> Result<()> {
        if self.open {
            return Err(RenderError::usage("shape", "begin called while already open"));
        }
        self.positions.clear();
        self.normals.clear();
        self.texcoords.clear();
        self.colors.clear();
        self.count = 0;
        self.normal = Vec3::Z;
        self.dims = None;
        self.kind = None;
        self.open = true;
        Ok(())
    }

    /// Normal used by the vertices that follow.
    pub fn normal(&mut self, normal: Vec3) -> Result<()> {
        self.check_open("normal")?;
        self.normal = normal;
        Ok(())
    }

    pub fn colored(&mut self, position: Vec3, dims: Dims, color: Color) -> Result<()> {
        self.admit(dims, VertexKind::Colored)?;
        self.colors.extend_from_slice(&color.to_array());
        self.push(position);
        Ok(())
    }

    pub fn textured(&mut self, position: Vec3, dims: Dims, uv: Vec2) -> Result<()> {
        self.admit(dims, VertexKind::Textured)?;
        self.texcoords.extend_from_slice(&uv.to_array());
        self.push(position);
        Ok(())
    }

    fn check_open(&self, call: &str) -> Result<()> {
        if !self.open {
            return Err(RenderError::usage("shape", format!("{call} called before begin")));
        }
        Ok(())
    }

    fn admit(&mut self, dims: Dims, kind: VertexKind) -> Result<()> {
        self.check_open("vertex")?;
        match self.dims {
            Some(fixed) if fixed != dims => {
                return Err(RenderError::mismatch(
                    "shape vertex",
                    format!("session started with {fixed:?}D vertices, got {dims:?}D"),
                ));
            }
            _ => {}
        }
        match self.kind {
            Some(fixed) if fixed != kind => {
                return Err(RenderError::mismatch(
                    "shape vertex",
                    format!("session started with {fixed:?} vertices, got {kind:?}"),
                ));
            }
            _ => {}
        }
        self.reserve(self.count + 1)?;
        self.dims = Some(dims);
        self.kind = Some(kind);
        Ok(())
    }

    fn reserve(&mut self, min: usize) -> Result<()> {
        if min <= self.capacity {
            return Ok(());
        }
        let grown = grow_capacity(self.capacity, min, ACCUMULATOR_GROWTH_THRESHOLD)?;
        log::trace!("shape accumulator: {} -> {grown} vertices", self.capacity);
        self.positions.reserve_exact(grown * 3 - self.positions.len());
        self.normals.reserve_exact(grown * 3 - self.normals.len());
        match self.kind {
            Some(VertexKind::Textured) => self.texcoords.reserve_exact(grown * 2 - self.texcoords.len()),
            _ => self.colors.reserve_exact(grown * 4 - self.colors.len()),
        }
        self.capacity = grown;
        Ok(())
    }

    fn push(&mut self, position: Vec3) {
        self.positions.extend_from_slice(&position.to_array());
        self.normals.extend_from_slice(&self.normal.to_array());
        self.count += 1;
    }

    /// Closes the session and interleaves what it collected.
    pub fn end(&mut self) -> Result<ShapeGeometry> {
        if !self.open {
            return Err(RenderError::usage("shape", "end called without begin"));
        }
        self.open = false;

        let Some(kind) = self.kind else {
            return Ok(ShapeGeometry::default());
        };
        let stride = ShapeGeometry::floats_per_vertex(kind);
        let mut data = Vec::with_capacity(self.count * stride);
        for i in 0..self.count {
            data.extend_from_slice(&self.positions[i * 3..i * 3 + 3]);
            data.extend_from_slice(&self.normals[i * 3..i * 3 + 3]);
            match kind {
                VertexKind::Textured => data.extend_from_slice(&self.texcoords[i * 2..i * 2 + 2]),
                VertexKind::Colored => data.extend_from_slice(&self.colors[i * 4..i * 4 + 4]),
            }
        }
        Ok(ShapeGeometry {
            data,
            vertex_count: self.count,
            kind: Some(kind),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_before_begin_fails() {
        let mut acc = ShapeVertexAccumulator::new();
        let err = acc.colored(Vec3::ZERO, Dims::Two, Color::WHITE).unwrap_err();
        assert!(matches!(err, RenderError::UsageState { .. }));
        assert!(acc.normal(Vec3::X).is_err());
    }

    #[test]
    fn first_vertex_fixes_the_session() {
        let mut acc = ShapeVertexAccumulator::new();
        acc.begin().unwrap();
        acc.colored(Vec3::ZERO, Dims::Two, Color::WHITE).unwrap();

        let err = acc.textured(Vec3::ZERO, Dims::Two, Vec2::ZERO).unwrap_err();
        assert!(matches!(err, RenderError::ConfigurationMismatch { .. }));
        let err = acc.colored(Vec3::ONE, Dims::Three, Color::WHITE).unwrap_err();
        assert!(matches!(err, RenderError::ConfigurationMismatch { .. }));
        assert_eq!(acc.count(), 1);

        // A new session starts over.
        acc.end().unwrap();
        acc.begin().unwrap();
        acc.textured(Vec3::ONE, Dims::Three, Vec2::ONE).unwrap();
    }

    #[test]
    fn end_interleaves_fields() {
        let mut acc = ShapeVertexAccumulator::new();
        acc.begin().unwrap();
        acc.textured(Vec3::new(1.0, 2.0, 0.0), Dims::Two, Vec2::new(0.5, 0.25)).unwrap();
        acc.normal(Vec3::X).unwrap();
        acc.textured(Vec3::new(3.0, 4.0, 0.0), Dims::Two, Vec2::new(1.0, 0.0)).unwrap();

        let geometry = acc.end().unwrap();
        assert_eq!(geometry.kind, Some(VertexKind::Textured));
        assert_eq!(geometry.vertex_count, 2);
        assert_eq!(
            geometry.data,
            vec![
                1.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.5, 0.25, //
                3.0, 4.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0,
            ]
        );
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut acc = ShapeVertexAccumulator::new();
        acc.begin().unwrap();
        for i in 0..500 {
            acc.colored(Vec3::splat(i as f32), Dims::Three, Color::BLACK).unwrap();
        }
        let geometry = acc.end().unwrap();
        assert_eq!(geometry.vertex_count, 500);
        assert_eq!(geometry.data.len(), 500 * 10);
        assert_eq!(geometry.data[499 * 10], 499.0);
    }

    #[test]
    fn end_twice_fails() {
        let mut acc = ShapeVertexAccumulator::new();
        acc.begin().unwrap();
        assert_eq!(acc.end().unwrap(), ShapeGeometry::default());
        assert!(matches!(acc.end(), Err(RenderError::UsageState { .. })));
    }
}
