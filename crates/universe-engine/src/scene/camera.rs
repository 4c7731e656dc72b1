use glam::Mat4;

use crate::coords::NormalRect;

use super::node::Node;

/// How a camera maps view space to clip space.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub enum Projection {
    /// Clip space is view space.
    #[default]
    Identity,
    /// `half_height` world units above and below the view center; the width
    /// follows the viewport aspect.
    Orthographic { half_height: f32, near: f32, far: f32 },
    /// Vertical field of view in radians.
    Perspective { fov_y: f32, near: f32, far: f32 },
}

impl Projection {
    pub fn matrix(self, aspect: f32) -> Mat4 {
        match self {
            Self::Identity => Mat4::IDENTITY,
            Self::Orthographic { half_height, near, far } => {
                let half_width = half_height * aspect;
                Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, near, far)
            }
            Self::Perspective { fov_y, near, far } => Mat4::perspective_rh(fov_y, aspect, near, far),
        }
    }
}

/// Node that renders the scene into a part of the surface.
///
/// The view matrix is the inverse of the camera's world matrix. With no
/// camera attached, the display draws once through [`Camera::DEFAULT`].
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Camera {
    pub viewport: NormalRect,
    pub projection: Projection,
}

impl Camera {
    pub const DEFAULT: Camera = Camera {
        viewport: NormalRect::FULL,
        projection: Projection::Identity,
    };

    pub fn new(viewport: NormalRect, projection: Projection) -> Self {
        Self { viewport, projection }
    }

    pub fn orthographic(viewport: NormalRect, half_height: f32) -> Self {
        Self::new(
            viewport,
            Projection::Orthographic { half_height, near: -1.0, far: 1.0 },
        )
    }

    pub fn perspective(viewport: NormalRect, fov_y: f32, near: f32, far: f32) -> Self {
        Self::new(viewport, Projection::Perspective { fov_y, near, far })
    }

    /// Projection times view for a camera placed at `world`.
    pub fn view_projection(&self, world: Mat4, aspect: f32) -> Mat4 {
        self.projection.matrix(aspect) * world.inverse()
    }
}

impl Node for Camera {
    fn as_camera(&self) -> Option<&Camera> {
        Some(self)
    }
}
