use std::fmt::{self, Debug, Formatter};

use serde::{Deserialize, Serialize};

use super::Abs;

/// An axis-aligned rectangle.
///
/// Grows downwards: `y` is the top edge and `y + height` the bottom edge.
#[derive(
    Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
pub struct Rect {
    pub x: Abs,
    pub y: Abs,
    pub width: Abs,
    pub height: Abs,
}

impl Rect {
    /// Create a new rectangle.
    pub const fn new(x: Abs, y: Abs, width: Abs, height: Abs) -> Self {
        Self { x, y, width, height }
    }

    /// The zero rectangle.
    pub const fn zero() -> Self {
        Self::new(Abs::zero(), Abs::zero(), Abs::zero(), Abs::zero())
    }

    /// The bottom edge.
    pub fn bottom(&self) -> Abs {
        self.y + self.height
    }

    /// The right edge.
    pub fn right(&self) -> Abs {
        self.x + self.width
    }

    /// Moves the bottom edge, keeping the top edge in place.
    ///
    /// The height never drops below zero.
    pub fn set_bottom(&mut self, bottom: Abs) {
        self.height = (bottom - self.y).max(Abs::zero());
    }

    /// Whether the rectangle covers a non-empty area.
    pub fn has_area(&self) -> bool {
        self.width > Abs::zero() && self.height > Abs::zero()
    }

    /// The distance from the bottom edge to a limit below it.
    pub fn bottom_dist(&self, limit: Abs) -> Abs {
        limit - self.bottom()
    }

    /// The rectangle translated by the given offsets.
    pub fn translate(self, dx: Abs, dy: Abs) -> Self {
        Self { x: self.x + dx, y: self.y + dy, ..self }
    }
}

impl Debug for Rect {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Rect({:?}, {:?}, {:?} x {:?})", self.x, self.y, self.width, self.height)
    }
}
