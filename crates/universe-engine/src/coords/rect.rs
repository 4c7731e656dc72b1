/// Rectangle in normalized surface coordinates, `[0, 1]` on both axes.
///
/// The origin is the top-left corner of the surface. Cameras use this to
/// describe which part of the surface they render into.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NormalRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl NormalRect {
    /// The whole surface.
    pub const FULL: NormalRect = NormalRect::new(0.0, 0.0, 1.0, 1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    /// Clamps the rectangle so it lies inside the unit square.
    pub fn clamped(self) -> Self {
        let x = self.x.clamp(0.0, 1.0);
        let y = self.y.clamp(0.0, 1.0);
        let w = self.w.clamp(0.0, 1.0 - x);
        let h = self.h.clamp(0.0, 1.0 - y);
        Self { x, y, w, h }
    }

    /// Converts to pixels on a surface of the given size.
    ///
    /// Each component is scaled then truncated, so a half-pixel edge
    /// belongs to the left/top neighbour.
    pub fn to_pixels(self, width: u32, height: u32) -> PixelRect {
        let r = self.clamped();
        let (fw, fh) = (width as f32, height as f32);
        PixelRect {
            x: (r.x * fw) as u32,
            y: (r.y * fh) as u32,
            width: (r.w * fw) as u32,
            height: (r.h * fh) as u32,
        }
    }
}

impl Default for NormalRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Rectangle in physical pixels, top-left origin.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height; 1.0 for degenerate rectangles.
    pub fn aspect(self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── to_pixels ─────────────────────────────────────────────────────────

    #[test]
    fn full_rect_covers_surface() {
        assert_eq!(NormalRect::FULL.to_pixels(640, 480), PixelRect::new(0, 0, 640, 480));
    }

    #[test]
    fn right_half_of_surface() {
        let px = NormalRect::new(0.5, 0.0, 0.5, 1.0).to_pixels(640, 480);
        assert_eq!(px, PixelRect::new(320, 0, 320, 480));
    }

    #[test]
    fn fractional_pixels_truncate() {
        let px = NormalRect::new(0.25, 0.25, 0.5, 0.5).to_pixels(101, 99);
        assert_eq!(px, PixelRect::new(25, 24, 50, 49));
    }

    // ── clamped ───────────────────────────────────────────────────────────

    #[test]
    fn out_of_range_rect_is_clamped() {
        let r = NormalRect::new(0.75, -0.5, 1.0, 2.0).clamped();
        assert_eq!(r, NormalRect::new(0.75, 0.0, 0.25, 1.0));
    }

    #[test]
    fn empty_rect() {
        assert!(NormalRect::new(0.0, 0.0, 0.0, 1.0).is_empty());
        assert!(!NormalRect::FULL.is_empty());
        assert!(PixelRect::new(0, 0, 10, 0).is_empty());
    }

    // ── aspect ────────────────────────────────────────────────────────────

    #[test]
    fn aspect_ratio() {
        assert_eq!(PixelRect::new(0, 0, 200, 100).aspect(), 2.0);
        assert_eq!(PixelRect::new(0, 0, 200, 0).aspect(), 1.0);
    }
}
