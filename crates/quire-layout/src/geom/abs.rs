use std::fmt::{self, Debug, Formatter};
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg};

use quire_utils::Numeric;
use serde::{Deserialize, Serialize};

/// An absolute length, stored as a whole number of twips.
///
/// Arithmetic saturates at [`Abs::MAX`] and its negation so that growth
/// requests of "as much as possible" can be expressed without overflow.
#[derive(
    Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Abs(i64);

impl Abs {
    /// The largest representable length.
    pub const MAX: Self = Self(i64::MAX);

    /// The zero length.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create an absolute length from a number of twips.
    pub const fn raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Create an absolute length from a value in a unit.
    pub fn with_unit(val: f64, unit: AbsUnit) -> Self {
        Self((val * unit.raw_scale()).round() as i64)
    }

    /// Create an absolute length from a number of points.
    pub fn pt(pt: f64) -> Self {
        Self::with_unit(pt, AbsUnit::Pt)
    }

    /// Create an absolute length from a number of millimeters.
    pub fn mm(mm: f64) -> Self {
        Self::with_unit(mm, AbsUnit::Mm)
    }

    /// Get the value of this absolute length in twips.
    pub const fn to_raw(self) -> i64 {
        self.0
    }

    /// Get the value of this absolute length in a unit.
    pub fn to_unit(self, unit: AbsUnit) -> f64 {
        self.0 as f64 / unit.raw_scale()
    }

    /// Convert this to a number of points.
    pub fn to_pt(self) -> f64 {
        self.to_unit(AbsUnit::Pt)
    }

    /// Convert this to a number of millimeters.
    pub fn to_mm(self) -> f64 {
        self.to_unit(AbsUnit::Mm)
    }

    /// The minimum of this and another absolute length.
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Set to the minimum of this and another absolute length.
    pub fn set_min(&mut self, other: Self) {
        *self = (*self).min(other);
    }

    /// The maximum of this and another absolute length.
    pub fn max(self, other: Self) -> Self {
        Self(self.0.max(other.0))
    }

    /// Set to the maximum of this and another absolute length.
    pub fn set_max(&mut self, other: Self) {
        *self = (*self).max(other);
    }

    /// Whether the other absolute length fits into this one.
    pub fn fits(self, other: Self) -> bool {
        self >= other
    }
}

impl Numeric for Abs {
    fn zero() -> Self {
        Self::zero()
    }
}

impl Debug for Abs {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if *self == Self::MAX {
            f.write_str("max")
        } else {
            write!(f, "{}tw", self.0)
        }
    }
}

impl Neg for Abs {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl Add for Abs {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

quire_utils::sub_impl!(Abs - Abs -> Abs);

impl Mul<i64> for Abs {
    type Output = Self;

    fn mul(self, other: i64) -> Self {
        Self(self.0.saturating_mul(other))
    }
}

impl Div<i64> for Abs {
    type Output = Self;

    fn div(self, other: i64) -> Self {
        Self(self.0 / other)
    }
}

quire_utils::assign_impl!(Abs += Abs);
quire_utils::assign_impl!(Abs -= Abs);
quire_utils::assign_impl!(Abs *= i64);
quire_utils::assign_impl!(Abs /= i64);

impl Sum for Abs {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Self> for Abs {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Different units of absolute measurement.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AbsUnit {
    /// Twips, the raw unit.
    Twip,
    /// Points.
    Pt,
    /// Millimeters.
    Mm,
}

impl AbsUnit {
    /// How many twips correspond to a value of `1.0` in this unit.
    const fn raw_scale(self) -> f64 {
        match self {
            AbsUnit::Twip => 1.0,
            AbsUnit::Pt => 20.0,
            AbsUnit::Mm => 1440.0 / 25.4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_unit_conversion() {
        assert_eq!(Abs::pt(12.0), Abs::raw(240));
        assert!((Abs::mm(25.4).to_pt() - 72.0).abs() < 1e-9);
    }

    #[test]
    fn test_length_saturates() {
        assert_eq!(Abs::MAX + Abs::raw(1), Abs::MAX);
        assert_eq!(Abs::MAX - Abs::raw(-1), Abs::MAX);
        assert_eq!(-Abs::raw(i64::MIN), Abs::MAX);
        assert!((Abs::MAX - Abs::raw(10)).is_positive());
    }
}
