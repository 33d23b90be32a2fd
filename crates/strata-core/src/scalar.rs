//! Numeric element types and machine constants.
//!
//! [`RealScalar`] supplies the constants equilibration needs (smallest and
//! largest safe magnitudes, the floating-point radix) together with exact
//! power-of-radix rounding. [`Scalar`] covers the matrix entry types: real
//! `f32`/`f64` and their complex counterparts.

use std::fmt::{Debug, Display};
use std::ops::{Add, Div, Mul};

use num_complex::Complex;
use strata_comm::Element;

/// Real floating-point type used for scale factors.
pub trait RealScalar:
    Element
    + Debug
    + Display
    + PartialOrd
    + Add<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
{
    /// Base of the floating-point representation.
    const RADIX: Self;

    fn zero() -> Self;

    fn one() -> Self;

    /// Smallest positive magnitude whose reciprocal does not overflow.
    fn safe_min() -> Self;

    /// Reciprocal of [`safe_min`](Self::safe_min).
    fn safe_max() -> Self;

    fn abs(self) -> Self;

    fn is_finite(self) -> bool;

    fn max(self, other: Self) -> Self;

    fn min(self, other: Self) -> Self;

    fn to_f64(self) -> f64;

    /// Largest `k` with `radix^k <= self`, for positive finite `self`.
    ///
    /// Binary radix reads the exponent bits directly; other radices start
    /// from a logarithm estimate and step until the bracket holds exactly.
    fn floor_exponent(self, radix: Self) -> i32;

    /// `radix^k`, exact for binary radix down to the subnormal range.
    fn radix_pow(radix: Self, k: i32) -> Self;

    /// Round a positive value down to the nearest power of `radix`.
    ///
    /// Zero and non-finite values are returned unchanged.
    fn round_down_to_power(self, radix: Self) -> Self {
        if !(self > Self::zero()) || !self.is_finite() {
            return self;
        }
        Self::radix_pow(radix, self.floor_exponent(radix))
    }

    /// Round a positive value up to the smallest power of `radix` that is
    /// not below it. Exact powers map to themselves.
    ///
    /// Zero and non-finite values are returned unchanged.
    fn round_up_to_power(self, radix: Self) -> Self {
        if !(self > Self::zero()) || !self.is_finite() {
            return self;
        }
        let k = self.floor_exponent(radix);
        let below = Self::radix_pow(radix, k);
        if below == self {
            below
        } else {
            Self::radix_pow(radix, k + 1)
        }
    }
}

macro_rules! impl_real_scalar {
    ($t:ty, $bits:ty, $mant:expr, $bias:expr) => {
        impl RealScalar for $t {
            const RADIX: Self = <$t>::RADIX as $t;

            fn zero() -> Self {
                0.0
            }

            fn one() -> Self {
                1.0
            }

            fn safe_min() -> Self {
                // 1 / MAX is smaller than MIN_POSITIVE for IEEE types, so the
                // smallest normal number is already safe to invert.
                <$t>::MIN_POSITIVE
            }

            fn safe_max() -> Self {
                1.0 / <$t>::MIN_POSITIVE
            }

            fn abs(self) -> Self {
                <$t>::abs(self)
            }

            fn is_finite(self) -> bool {
                <$t>::is_finite(self)
            }

            fn max(self, other: Self) -> Self {
                <$t>::max(self, other)
            }

            fn min(self, other: Self) -> Self {
                <$t>::min(self, other)
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn floor_exponent(self, radix: Self) -> i32 {
                if radix == 2.0 {
                    let bits = self.to_bits();
                    let exp_mask: $bits = (1 << (<$bits>::BITS - 1 - $mant)) - 1;
                    let exp_field = ((bits >> $mant) & exp_mask) as i32;
                    if exp_field == 0 {
                        let mantissa = bits & ((1 << $mant) - 1);
                        let top = (<$bits>::BITS - 1 - mantissa.leading_zeros()) as i32;
                        return top - ($bias - 1) - $mant;
                    }
                    return exp_field - $bias;
                }
                let mut k = (self.ln() / radix.ln()).floor() as i32;
                while Self::radix_pow(radix, k) > self {
                    k -= 1;
                }
                while Self::radix_pow(radix, k + 1) <= self {
                    k += 1;
                }
                k
            }

            fn radix_pow(radix: Self, k: i32) -> Self {
                if radix != 2.0 {
                    return radix.powi(k);
                }
                let min_normal = 1 - $bias;
                if k > $bias {
                    <$t>::INFINITY
                } else if k >= min_normal {
                    <$t>::from_bits(((k + $bias) as $bits) << $mant)
                } else if k >= min_normal - $mant {
                    <$t>::from_bits((1 as $bits) << (k - (min_normal - $mant)))
                } else {
                    0.0
                }
            }
        }
    };
}

impl_real_scalar!(f32, u32, 23, 127);
impl_real_scalar!(f64, u64, 52, 1023);

/// Matrix entry type that equilibration can measure.
pub trait Scalar: Element + Debug {
    type Real: RealScalar;

    /// Magnitude used to size scale factors: `|x|` for real entries and
    /// `|re| + |im|` for complex entries.
    fn abs1(self) -> Self::Real;
}

impl Scalar for f32 {
    type Real = f32;

    fn abs1(self) -> f32 {
        self.abs()
    }
}

impl Scalar for f64 {
    type Real = f64;

    fn abs1(self) -> f64 {
        self.abs()
    }
}

impl<R: RealScalar> Scalar for Complex<R> {
    type Real = R;

    fn abs1(self) -> R {
        self.re.abs() + self.im.abs()
    }
}
