use glam::{Mat4, Quat, Vec3};

/// Local translation, rotation and scale of a node.
///
/// Mutators accumulate: `translate` adds, `rotate` post-multiplies, `scale`
/// multiplies component-wise.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::IDENTITY }
    }

    pub fn translate(&mut self, offset: Vec3) -> &mut Self {
        self.translation += offset;
        self
    }

    pub fn translate_xy(&mut self, x: f32, y: f32) -> &mut Self {
        self.translate(Vec3::new(x, y, 0.0))
    }

    pub fn rotate(&mut self, rotation: Quat) -> &mut Self {
        self.rotation = (self.rotation * rotation).normalize();
        self
    }

    pub fn rotate_x(&mut self, radians: f32) -> &mut Self {
        self.rotate(Quat::from_rotation_x(radians))
    }

    pub fn rotate_y(&mut self, radians: f32) -> &mut Self {
        self.rotate(Quat::from_rotation_y(radians))
    }

    pub fn rotate_z(&mut self, radians: f32) -> &mut Self {
        self.rotate(Quat::from_rotation_z(radians))
    }

    pub fn scale(&mut self, factors: Vec3) -> &mut Self {
        self.scale *= factors;
        self
    }

    pub fn scale_uniform(&mut self, factor: f32) -> &mut Self {
        self.scale(Vec3::splat(factor))
    }

    /// Scale, then rotate, then translate.
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn mutators_accumulate() {
        let mut t = Transform::default();
        t.translate_xy(1.0, 2.0).translate(Vec3::new(1.0, 0.0, 3.0));
        t.scale_uniform(2.0).scale(Vec3::new(1.0, 0.5, 1.0));

        assert_eq!(t.translation, Vec3::new(2.0, 2.0, 3.0));
        assert_eq!(t.scale, Vec3::new(2.0, 1.0, 2.0));
    }

    #[test]
    fn local_matrix_scales_before_rotating() {
        let mut t = Transform::from_translation(Vec3::new(10.0, 0.0, 0.0));
        t.rotate_z(FRAC_PI_2).scale_uniform(2.0);

        let p = t.local_matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(10.0, 2.0, 0.0), 1e-5));
    }
}
