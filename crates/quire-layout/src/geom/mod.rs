//! Geometrical primitives.

mod abs;
mod rect;

pub use self::abs::{Abs, AbsUnit};
pub use self::rect::Rect;
