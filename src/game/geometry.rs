//! Geometry module
//!
//! Axis-aligned rectangles used for collision planes, player footprints,
//! door triggers and area bounds.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle with half-open bounds.
///
/// Non-degenerate rectangles satisfy `x1 < x2` and `y1 < y2`. Two rectangles
/// that only share an edge do not overlap, so adjacent planes tile seamlessly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rectangle {
    /// Create a rectangle from its two corners
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a rectangle from a top-left corner and a size
    pub const fn from_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Check if the rectangle encloses no area
    pub fn is_empty(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    /// Check if two rectangles overlap. Touching edges are not an overlap.
    pub fn overlaps(&self, other: &Rectangle) -> bool {
        self.x1 < other.x2 && self.x2 > other.x1 && self.y1 < other.y2 && self.y2 > other.y1
    }

    /// Check if `other` lies entirely within this rectangle (inclusive bounds)
    pub fn contains(&self, other: &Rectangle) -> bool {
        other.x1 >= self.x1 && other.x2 <= self.x2 && other.y1 >= self.y1 && other.y2 <= self.y2
    }

    /// Check if a point lies within this rectangle (half-open)
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    /// Shift both corners
    pub fn translate(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }

    /// Scale both corners, e.g. to turn tile coordinates into pixels
    pub fn multiply(self, factor: i32) -> Self {
        Self::new(
            self.x1 * factor,
            self.y1 * factor,
            self.x2 * factor,
            self.y2 * factor,
        )
    }

    /// Express this rectangle in the coordinate space whose origin is the
    /// top-left corner of `origin`
    pub fn relative_to(self, origin: &Rectangle) -> Self {
        self.translate(-origin.x1, -origin.y1)
    }
}

impl std::fmt::Display for Rectangle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})-({},{})", self.x1, self.y1, self.x2, self.y2)
    }
}
