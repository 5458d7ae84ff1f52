use glam::DVec2;

/// Axis-aligned bounding rectangle in the tree's coordinate system.
///
/// Invariant: `ll.x <= ur.x` and `ll.y <= ur.y`. The constructor sorts the
/// corners so the invariant always holds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mbr {
    /// Lower-left corner.
    pub ll: DVec2,
    /// Upper-right corner.
    pub ur: DVec2,
}

impl Mbr {
    /// Create a rectangle from two opposite corners.
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self {
            ll: a.min(b),
            ur: a.max(b),
        }
    }

    /// Create a rectangle from `[min_x, min_y, max_x, max_y]`.
    pub fn from_array(bounds: [f64; 4]) -> Self {
        Self::new(
            DVec2::new(bounds[0], bounds[1]),
            DVec2::new(bounds[2], bounds[3]),
        )
    }

    pub fn width(&self) -> f64 {
        self.ur.x - self.ll.x
    }

    pub fn height(&self) -> f64 {
        self.ur.y - self.ll.y
    }

    /// Width and height as a vector.
    pub fn span(&self) -> DVec2 {
        self.ur - self.ll
    }

    pub fn center(&self) -> DVec2 {
        (self.ll + self.ur) * 0.5
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.ll.x && p.x <= self.ur.x && p.y >= self.ll.y && p.y <= self.ur.y
    }

    /// Returns true if the two rectangles share any area or touch.
    pub fn overlaps(&self, other: &Mbr) -> bool {
        self.ll.x <= other.ur.x
            && self.ur.x >= other.ll.x
            && self.ll.y <= other.ur.y
            && self.ur.y >= other.ll.y
    }

    /// The shared region, or `None` if the rectangles are disjoint.
    pub fn intersection(&self, other: &Mbr) -> Option<Mbr> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Mbr {
            ll: self.ll.max(other.ll),
            ur: self.ur.min(other.ur),
        })
    }
}
