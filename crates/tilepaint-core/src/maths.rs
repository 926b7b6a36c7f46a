//! Channel arithmetic for compositing.
//!
//! Integer channels are treated as fixed-point fractions of their unit
//! (255 or 65535). Every product is formed in a wider accumulator and
//! narrowed once with round-half-up, so repeated blends do not drift.
//! Float channels use plain arithmetic on the normalized value.
//!
//! ```
//! use tilepaint_core::maths::ChannelMath;
//!
//! assert_eq!(u8::mul(255, 128), 128);
//! assert_eq!(u8::lerp(0, 255, 128), 128);
//! assert_eq!(u16::mul(65535, 65535), 65535);
//! ```

use crate::pixel::PixelFormat;
use half::f16;

/// Fixed-point / float arithmetic on one channel value.
pub trait ChannelMath: PixelFormat {
    /// `a * b / unit`, rounded.
    fn mul(a: Self, b: Self) -> Self;

    /// `a * b * c / unit^2`, rounded once.
    fn mul3(a: Self, b: Self, c: Self) -> Self;

    /// `a * unit / b`, rounded and clamped to unit. Zero `b` yields unit.
    fn div(a: Self, b: Self) -> Self;

    /// `a + (b - a) * t / unit`, rounded.
    fn lerp(a: Self, b: Self, t: Self) -> Self;

    /// `unit - a`.
    fn inv(a: Self) -> Self;

    /// Saturating addition, clamped to unit.
    fn add_clamped(a: Self, b: Self) -> Self;

    /// Opacity in [0, 1] expressed in channel units.
    fn from_opacity(opacity: f32) -> Self;

    /// Exact zero test.
    fn is_zero(self) -> bool;

    /// Exact unit test.
    fn is_unit(self) -> bool;

    /// Union of two coverages: `a + b - a * b`.
    #[inline]
    fn union(a: Self, b: Self) -> Self {
        Self::add_clamped(a, Self::mul(b, Self::inv(a)))
    }

    /// Scales an 8-bit mask value into channel units.
    #[inline]
    fn from_mask(m: u8) -> Self {
        Self::from_value(crate::pixel::ChannelValue::U8(m))
    }
}

macro_rules! impl_integer_math {
    ($t:ty, $wide:ty, $unit:expr) => {
        impl ChannelMath for $t {
            #[inline]
            fn mul(a: Self, b: Self) -> Self {
                ((a as $wide * b as $wide + $unit / 2) / $unit) as $t
            }

            #[inline]
            fn mul3(a: Self, b: Self, c: Self) -> Self {
                let u2 = ($unit as u64) * ($unit as u64);
                ((a as u64 * b as u64 * c as u64 + u2 / 2) / u2) as $t
            }

            #[inline]
            fn div(a: Self, b: Self) -> Self {
                if b == 0 {
                    return <$t>::MAX;
                }
                let q = (a as $wide * $unit + b as $wide / 2) / b as $wide;
                q.min($unit) as $t
            }

            #[inline]
            fn lerp(a: Self, b: Self, t: Self) -> Self {
                let t = t as $wide;
                ((b as $wide * t + a as $wide * ($unit - t) + $unit / 2) / $unit) as $t
            }

            #[inline]
            fn inv(a: Self) -> Self {
                <$t>::MAX - a
            }

            #[inline]
            fn add_clamped(a: Self, b: Self) -> Self {
                a.saturating_add(b)
            }

            #[inline]
            fn from_opacity(opacity: f32) -> Self {
                <$t as PixelFormat>::from_f32(opacity)
            }

            #[inline]
            fn is_zero(self) -> bool {
                self == 0
            }

            #[inline]
            fn is_unit(self) -> bool {
                self == <$t>::MAX
            }
        }
    };
}

impl_integer_math!(u8, u32, 255);
impl_integer_math!(u16, u64, 65535);

impl ChannelMath for f32 {
    #[inline]
    fn mul(a: Self, b: Self) -> Self {
        a * b
    }

    #[inline]
    fn mul3(a: Self, b: Self, c: Self) -> Self {
        a * b * c
    }

    #[inline]
    fn div(a: Self, b: Self) -> Self {
        if b == 0.0 { 1.0 } else { (a / b).min(1.0) }
    }

    #[inline]
    fn lerp(a: Self, b: Self, t: Self) -> Self {
        a + (b - a) * t
    }

    #[inline]
    fn inv(a: Self) -> Self {
        1.0 - a
    }

    #[inline]
    fn add_clamped(a: Self, b: Self) -> Self {
        (a + b).min(1.0)
    }

    #[inline]
    fn from_opacity(opacity: f32) -> Self {
        opacity.clamp(0.0, 1.0)
    }

    #[inline]
    fn is_zero(self) -> bool {
        self == 0.0
    }

    #[inline]
    fn is_unit(self) -> bool {
        self == 1.0
    }
}

impl ChannelMath for f16 {
    #[inline]
    fn mul(a: Self, b: Self) -> Self {
        f16::from_f32(f32::mul(a.to_f32(), b.to_f32()))
    }

    #[inline]
    fn mul3(a: Self, b: Self, c: Self) -> Self {
        f16::from_f32(f32::mul3(a.to_f32(), b.to_f32(), c.to_f32()))
    }

    #[inline]
    fn div(a: Self, b: Self) -> Self {
        f16::from_f32(f32::div(a.to_f32(), b.to_f32()))
    }

    #[inline]
    fn lerp(a: Self, b: Self, t: Self) -> Self {
        f16::from_f32(f32::lerp(a.to_f32(), b.to_f32(), t.to_f32()))
    }

    #[inline]
    fn inv(a: Self) -> Self {
        f16::from_f32(1.0 - a.to_f32())
    }

    #[inline]
    fn add_clamped(a: Self, b: Self) -> Self {
        f16::from_f32(f32::add_clamped(a.to_f32(), b.to_f32()))
    }

    #[inline]
    fn from_opacity(opacity: f32) -> Self {
        f16::from_f32(opacity.clamp(0.0, 1.0))
    }

    #[inline]
    fn is_zero(self) -> bool {
        self.to_f32() == 0.0
    }

    #[inline]
    fn is_unit(self) -> bool {
        self.to_f32() == 1.0
    }
}
