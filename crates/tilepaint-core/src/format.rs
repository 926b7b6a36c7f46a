//! Channel storage types.
//!
//! [`ChannelType`] is the runtime tag for how one channel of a pixel is
//! stored in tile memory. The compile-time counterpart is the
//! [`PixelFormat`](crate::pixel::PixelFormat) trait, implemented for the
//! matching Rust types.
//!
//! | tag | Rust type | bytes | range |
//! |-----|-----------|-------|-------|
//! | `U8`  | `u8`  | 1 | 0..=255 |
//! | `U16` | `u16` | 2 | 0..=65535 |
//! | `F16` | `half::f16` | 2 | 0.0..=1.0 nominal |
//! | `F32` | `f32` | 4 | 0.0..=1.0 nominal |
//!
//! ```rust
//! use tilepaint_core::ChannelType;
//!
//! assert_eq!(ChannelType::U16.bytes_per_channel(), 2);
//! assert!(ChannelType::F16.is_float());
//! assert_eq!(ChannelType::U8.to_string(), "u8");
//! ```

/// Storage type of a single pixel channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelType {
    /// 8-bit unsigned integer.
    #[default]
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 16-bit half-precision float.
    F16,
    /// 32-bit single-precision float.
    F32,
}

impl ChannelType {
    /// Every supported storage type, narrowest first.
    pub const ALL: [ChannelType; 4] = [Self::U8, Self::U16, Self::F16, Self::F32];

    /// Number of bytes per channel.
    #[inline]
    pub const fn bytes_per_channel(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::F16 => 2,
            Self::F32 => 4,
        }
    }

    /// Number of bits per channel.
    #[inline]
    pub const fn bits(&self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::U16 => 16,
            Self::F16 => 16,
            Self::F32 => 32,
        }
    }

    /// Whether this is a floating-point format.
    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F16 | Self::F32)
    }

    /// Whether this is an integer format.
    #[inline]
    pub const fn is_integer(&self) -> bool {
        !self.is_float()
    }

    /// Value representing full intensity, as f32 (255, 65535, or 1.0).
    #[inline]
    pub fn unit_value(&self) -> f32 {
        match self {
            Self::U8 => 255.0,
            Self::U16 => 65535.0,
            Self::F16 | Self::F32 => 1.0,
        }
    }

    /// Short name, used as the suffix of builtin color space ids.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::F16 => "f16",
            Self::F32 => "f32",
        }
    }

    /// Parses a short name produced by [`name`](Self::name).
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "u8" => Some(Self::U8),
            "u16" => Some(Self::U16),
            "f16" => Some(Self::F16),
            "f32" => Some(Self::F32),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_and_bits() {
        for ty in ChannelType::ALL {
            assert_eq!(ty.bytes_per_channel() * 8, ty.bits() as usize);
        }
    }

    #[test]
    fn test_name_roundtrip() {
        for ty in ChannelType::ALL {
            assert_eq!(ChannelType::from_name(ty.name()), Some(ty));
        }
        assert_eq!(ChannelType::from_name("u32"), None);
    }

    #[test]
    fn test_is_float() {
        assert!(!ChannelType::U8.is_float());
        assert!(!ChannelType::U16.is_float());
        assert!(ChannelType::F16.is_float());
        assert!(ChannelType::F32.is_float());
    }
}
