//! Utilities for Quire.

#[macro_use]
mod macros;

use std::fmt::{Debug, Formatter};
use std::hash::Hash;
use std::ops::{Add, Neg, Sub};

use siphasher::sip128::{Hasher128, SipHasher13};

/// Turn a closure into a struct implementing [`Debug`].
pub fn debug<F>(f: F) -> impl Debug
where
    F: Fn(&mut Formatter) -> std::fmt::Result,
{
    struct Wrapper<F>(F);

    impl<F> Debug for Wrapper<F>
    where
        F: Fn(&mut Formatter) -> std::fmt::Result,
    {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            self.0(f)
        }
    }

    Wrapper(f)
}

/// Calculate a 128-bit siphash of a value.
pub fn hash128<T: Hash + ?Sized>(value: &T) -> u128 {
    let mut state = SipHasher13::new();
    value.hash(&mut state);
    state.finish128().as_u128()
}

/// Check if the [`Option`]-wrapped L is same to R.
pub fn option_eq<L, R>(left: Option<L>, other: R) -> bool
where
    L: PartialEq<R>,
{
    left.is_some_and(|v| v == other)
}

/// A numeric type.
pub trait Numeric:
    Sized
    + Debug
    + Copy
    + Ord
    + Neg<Output = Self>
    + Add<Output = Self>
    + Sub<Output = Self>
{
    /// The identity element for addition.
    fn zero() -> Self;

    /// Whether `self` is zero.
    fn is_zero(self) -> bool {
        self == Self::zero()
    }

    /// Whether `self` is strictly larger than zero.
    fn is_positive(self) -> bool {
        self > Self::zero()
    }

    /// Whether `self` is strictly smaller than zero.
    fn is_negative(self) -> bool {
        self < Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash128_is_stable_for_equal_values() {
        assert_eq!(hash128(&(1u32, "a")), hash128(&(1u32, "a")));
        assert_ne!(hash128(&(1u32, "a")), hash128(&(2u32, "a")));
    }

    #[test]
    fn test_option_eq() {
        assert!(option_eq(Some(3), 3));
        assert!(!option_eq(Some(3), 4));
        assert!(!option_eq(None::<i32>, 3));
    }
}
