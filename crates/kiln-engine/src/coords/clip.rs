/// Scissor rectangle in physical pixels (top-left origin).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ClipRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl ClipRect {
    #[inline]
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.w == 0 || self.h == 0
    }

    #[inline]
    pub fn right(self) -> u32 {
        self.x.saturating_add(self.w)
    }

    #[inline]
    pub fn bottom(self) -> u32 {
        self.y.saturating_add(self.h)
    }

    /// Returns the overlap of two rectangles, or `None` if they only touch or
    /// are disjoint.
    #[inline]
    pub fn intersect(self, other: ClipRect) -> Option<ClipRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());

        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some(ClipRect::new(x0, y0, x1 - x0, y1 - y0))
        }
    }

    /// Clamps the rectangle to a `width` × `height` target.
    ///
    /// The result may be empty when the rectangle lies outside the target.
    #[inline]
    pub fn clamp_to(self, width: u32, height: u32) -> ClipRect {
        self.intersect(ClipRect::new(0, 0, width, height))
            .unwrap_or_default()
    }

    /// Mirrors the rectangle vertically inside a target of `height` rows.
    ///
    /// Converts between top-left and bottom-left origin conventions; applying
    /// it twice yields the original rectangle.
    #[inline]
    pub fn flip_y(self, height: u32) -> ClipRect {
        ClipRect::new(self.x, height.saturating_sub(self.bottom()), self.w, self.h)
    }
}
