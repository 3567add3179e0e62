use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Trait bound for the numeric element type of feature matrices and targets.
/// Implemented for `f32` and `f64`.
pub trait Float:
    Copy
    + Clone
    + Default
    + PartialOrd
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Sum
    + Serialize
    + for<'de> Deserialize<'de>
    + 'static
{
    const ZERO: Self;
    const ONE: Self;
    const TWO: Self;
    const HALF: Self;
    const NEG_ONE: Self;
    const EPSILON: Self;
    const INFINITY: Self;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
    fn from_usize(v: usize) -> Self;

    fn abs(self) -> Self;
    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn powf(self, n: Self) -> Self;
    fn tanh(self) -> Self;
    fn round(self) -> Self;
    fn max(self, other: Self) -> Self;
    fn min(self, other: Self) -> Self;
    fn is_finite(self) -> bool;
    fn signum(self) -> Self;

    /// Total ordering used when sorting feature values and distances.
    fn total_cmp(&self, other: &Self) -> std::cmp::Ordering;
}

macro_rules! impl_float {
    ($t:ident) => {
        impl Float for $t {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            const TWO: Self = 2.0;
            const HALF: Self = 0.5;
            const NEG_ONE: Self = -1.0;
            const EPSILON: Self = $t::EPSILON;
            const INFINITY: Self = $t::INFINITY;

            #[inline] fn from_f64(v: f64) -> Self { v as $t }
            #[inline] fn to_f64(self) -> f64 { self as f64 }
            #[inline] fn from_usize(v: usize) -> Self { v as $t }
            #[inline] fn abs(self) -> Self { $t::abs(self) }
            #[inline] fn sqrt(self) -> Self { $t::sqrt(self) }
            #[inline] fn exp(self) -> Self { $t::exp(self) }
            #[inline] fn ln(self) -> Self { $t::ln(self) }
            #[inline] fn powi(self, n: i32) -> Self { $t::powi(self, n) }
            #[inline] fn powf(self, n: Self) -> Self { $t::powf(self, n) }
            #[inline] fn tanh(self) -> Self { $t::tanh(self) }
            #[inline] fn round(self) -> Self { $t::round(self) }
            #[inline] fn max(self, other: Self) -> Self { $t::max(self, other) }
            #[inline] fn min(self, other: Self) -> Self { $t::min(self, other) }
            #[inline] fn is_finite(self) -> bool { $t::is_finite(self) }
            #[inline] fn signum(self) -> Self { $t::signum(self) }
            #[inline] fn total_cmp(&self, other: &Self) -> std::cmp::Ordering { $t::total_cmp(self, other) }
        }
    };
}

impl_float!(f32);
impl_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_roundtrip_through_f64() {
        assert_eq!(<f32 as Float>::from_f64(1.5).to_f64(), 1.5);
        assert_eq!(<f64 as Float>::from_usize(7), 7.0);
    }

    #[test]
    fn test_total_cmp_orders_negative_zero() {
        use std::cmp::Ordering;
        assert_eq!(Float::total_cmp(&-1.0f64, &2.0), Ordering::Less);
        assert_eq!(Float::total_cmp(&3.0f32, &3.0), Ordering::Equal);
    }
}
