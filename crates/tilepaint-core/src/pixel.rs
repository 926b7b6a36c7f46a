//! Pixel layouts and numeric conversion between bit depths.
//!
//! # Types
//!
//! - [`PixelFormat`] - Trait for channel storage types (u8, u16, f16, f32)
//! - [`PixelTraits`] - Runtime pixel layout: channel count, storage type, alpha position
//! - [`PixelConverter`] - Depth conversion between two layouts, resolved once
//!
//! # Conversion rules
//!
//! Channels are rescaled proportionally to the destination range:
//!
//! - `u8 -> u16` is `v * 257` (exact)
//! - `u16 -> u8` is `(v + 128) / 257` (rounded, never truncated)
//! - integer -> float maps `0..=max` onto `0.0..=1.0`
//! - float -> integer clamps to `0.0..=1.0`, then rounds
//!
//! Going up and back down in integer depth is lossless. Going down loses
//! precision; that is expected, not an error.
//!
//! Alpha follows the color rule. A destination without alpha drops it;
//! a destination with alpha fed from a source without one gets opaque alpha.
//! Different *color* channel counts are a color-space conversion and are
//! rejected here.
//!
//! ```
//! use tilepaint_core::pixel::{PixelConverter, PixelTraits};
//! use tilepaint_core::ChannelType;
//!
//! let rgba8 = PixelTraits::new(4, ChannelType::U8, Some(3));
//! let rgba16 = PixelTraits::new(4, ChannelType::U16, Some(3));
//! let conv = PixelConverter::new(rgba8, rgba16).unwrap();
//!
//! let src = [255u8, 128, 0, 255];
//! let mut dst = [0u8; 8];
//! conv.convert(&src, &mut dst, 1);
//! assert_eq!(u16::from_ne_bytes([dst[2], dst[3]]), 128 * 257);
//! ```

use crate::error::{Error, Result};
use crate::format::ChannelType;
use half::f16;
use std::fmt;

/// Rec.709 luminance coefficient for red channel.
pub const REC709_LUMA_R: f32 = 0.2126;

/// Rec.709 luminance coefficient for green channel.
pub const REC709_LUMA_G: f32 = 0.7152;

/// Rec.709 luminance coefficient for blue channel.
pub const REC709_LUMA_B: f32 = 0.0722;

/// Calculate Rec.709 luminance from normalized RGB values.
///
/// ```
/// use tilepaint_core::pixel::luminance_rec709;
/// let luma = luminance_rec709([0.5, 0.3, 0.2]);
/// assert!((luma - 0.3353).abs() < 0.0001);
/// ```
#[inline]
pub fn luminance_rec709(rgb: [f32; 3]) -> f32 {
    rgb[0] * REC709_LUMA_R + rgb[1] * REC709_LUMA_G + rgb[2] * REC709_LUMA_B
}

/// A channel value in its natural representation.
///
/// Intermediate form used when converting between storage types so that
/// integer-to-integer paths stay exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue {
    /// 8-bit integer value.
    U8(u8),
    /// 16-bit integer value.
    U16(u16),
    /// Normalized float value.
    Float(f32),
}

/// Trait for channel storage types.
///
/// Implemented for `u8`, `u16`, `f16` and `f32`. Pixel bytes in tiles are
/// stored in native byte order; [`read`](PixelFormat::read) and
/// [`write`](PixelFormat::write) do the unaligned access.
///
/// ```
/// use tilepaint_core::PixelFormat;
///
/// let byte_val: u8 = 128;
/// assert!((byte_val.to_f32() - 0.502).abs() < 0.01);
///
/// let back: u16 = PixelFormat::from_f32(0.5);
/// assert_eq!(back, 32768);
/// ```
pub trait PixelFormat: Copy + Default + Send + Sync + PartialOrd + fmt::Debug + 'static {
    /// Runtime tag of this type.
    const CHANNEL_TYPE: ChannelType;

    /// Size in bytes.
    const SIZE: usize;

    /// Whether this is a floating-point format.
    const IS_FLOAT: bool;

    /// Convert to f32; integers normalize to [0.0, 1.0].
    fn to_f32(self) -> f32;

    /// Convert from f32; integers clamp to [0.0, 1.0] and round.
    fn from_f32(v: f32) -> Self;

    /// Natural representation for exact conversion.
    fn to_value(self) -> ChannelValue;

    /// Build from any representation, rescaling to this type's range.
    fn from_value(v: ChannelValue) -> Self;

    /// Read from the first [`SIZE`](Self::SIZE) bytes of `bytes`.
    fn read(bytes: &[u8]) -> Self;

    /// Write into the first [`SIZE`](Self::SIZE) bytes of `bytes`.
    fn write(self, bytes: &mut [u8]);

    /// Zero value.
    fn zero() -> Self;

    /// One value (1.0 for floats, max for integers).
    fn one() -> Self;
}

impl PixelFormat for u8 {
    const CHANNEL_TYPE: ChannelType = ChannelType::U8;
    const SIZE: usize = 1;
    const IS_FLOAT: bool = false;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / 255.0
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        (v.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    #[inline]
    fn to_value(self) -> ChannelValue {
        ChannelValue::U8(self)
    }

    #[inline]
    fn from_value(v: ChannelValue) -> Self {
        match v {
            ChannelValue::U8(v) => v,
            ChannelValue::U16(v) => ((v as u32 + 128) / 257) as u8,
            ChannelValue::Float(f) => Self::from_f32(f),
        }
    }

    #[inline]
    fn read(bytes: &[u8]) -> Self {
        bytes[0]
    }

    #[inline]
    fn write(self, bytes: &mut [u8]) {
        bytes[0] = self;
    }

    #[inline]
    fn zero() -> Self {
        0
    }

    #[inline]
    fn one() -> Self {
        255
    }
}

impl PixelFormat for u16 {
    const CHANNEL_TYPE: ChannelType = ChannelType::U16;
    const SIZE: usize = 2;
    const IS_FLOAT: bool = false;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / 65535.0
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        (v.clamp(0.0, 1.0) * 65535.0).round() as u16
    }

    #[inline]
    fn to_value(self) -> ChannelValue {
        ChannelValue::U16(self)
    }

    #[inline]
    fn from_value(v: ChannelValue) -> Self {
        match v {
            ChannelValue::U8(v) => v as u16 * 257,
            ChannelValue::U16(v) => v,
            ChannelValue::Float(f) => Self::from_f32(f),
        }
    }

    #[inline]
    fn read(bytes: &[u8]) -> Self {
        u16::from_ne_bytes([bytes[0], bytes[1]])
    }

    #[inline]
    fn write(self, bytes: &mut [u8]) {
        bytes[..2].copy_from_slice(&self.to_ne_bytes());
    }

    #[inline]
    fn zero() -> Self {
        0
    }

    #[inline]
    fn one() -> Self {
        65535
    }
}

impl PixelFormat for f16 {
    const CHANNEL_TYPE: ChannelType = ChannelType::F16;
    const SIZE: usize = 2;
    const IS_FLOAT: bool = true;

    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }

    #[inline]
    fn to_value(self) -> ChannelValue {
        ChannelValue::Float(f16::to_f32(self))
    }

    #[inline]
    fn from_value(v: ChannelValue) -> Self {
        match v {
            ChannelValue::U8(v) => f16::from_f32(v as f32 / 255.0),
            ChannelValue::U16(v) => f16::from_f32(v as f32 / 65535.0),
            ChannelValue::Float(f) => f16::from_f32(f),
        }
    }

    #[inline]
    fn read(bytes: &[u8]) -> Self {
        f16::from_bits(u16::from_ne_bytes([bytes[0], bytes[1]]))
    }

    #[inline]
    fn write(self, bytes: &mut [u8]) {
        bytes[..2].copy_from_slice(&self.to_bits().to_ne_bytes());
    }

    #[inline]
    fn zero() -> Self {
        f16::ZERO
    }

    #[inline]
    fn one() -> Self {
        f16::ONE
    }
}

impl PixelFormat for f32 {
    const CHANNEL_TYPE: ChannelType = ChannelType::F32;
    const SIZE: usize = 4;
    const IS_FLOAT: bool = true;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }

    #[inline]
    fn to_value(self) -> ChannelValue {
        ChannelValue::Float(self)
    }

    #[inline]
    fn from_value(v: ChannelValue) -> Self {
        match v {
            ChannelValue::U8(v) => v as f32 / 255.0,
            ChannelValue::U16(v) => v as f32 / 65535.0,
            ChannelValue::Float(f) => f,
        }
    }

    #[inline]
    fn read(bytes: &[u8]) -> Self {
        f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[inline]
    fn write(self, bytes: &mut [u8]) {
        bytes[..4].copy_from_slice(&self.to_ne_bytes());
    }

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn one() -> Self {
        1.0
    }
}

/// Reads the normalized value of one channel of any storage type.
#[inline]
pub fn read_normalized(ty: ChannelType, bytes: &[u8]) -> f32 {
    match ty {
        ChannelType::U8 => u8::read(bytes).to_f32(),
        ChannelType::U16 => u16::read(bytes).to_f32(),
        ChannelType::F16 => f16::read(bytes).to_f32(),
        ChannelType::F32 => f32::read(bytes),
    }
}

/// Writes a normalized value into one channel of any storage type.
#[inline]
pub fn write_normalized(ty: ChannelType, v: f32, bytes: &mut [u8]) {
    match ty {
        ChannelType::U8 => u8::from_f32(v).write(bytes),
        ChannelType::U16 => u16::from_f32(v).write(bytes),
        ChannelType::F16 => f16::from_f32(v).write(bytes),
        ChannelType::F32 => v.write(bytes),
    }
}

/// Runtime description of a pixel layout.
///
/// The byte stride is `channel_count * channel_type.bytes_per_channel()`
/// and is the same for every pixel with these traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelTraits {
    channel_count: u8,
    channel_type: ChannelType,
    alpha_index: Option<u8>,
}

impl PixelTraits {
    /// Creates a layout. `alpha_index`, when set, must be a valid channel.
    #[inline]
    pub const fn new(channel_count: u8, channel_type: ChannelType, alpha_index: Option<u8>) -> Self {
        assert!(channel_count > 0 && channel_count <= 32);
        if let Some(a) = alpha_index {
            assert!(a < channel_count);
        }
        Self {
            channel_count,
            channel_type,
            alpha_index,
        }
    }

    /// Number of channels, alpha included.
    #[inline]
    pub const fn channel_count(&self) -> usize {
        self.channel_count as usize
    }

    /// Storage type shared by all channels.
    #[inline]
    pub const fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    /// Index of the alpha channel, if any.
    #[inline]
    pub const fn alpha_index(&self) -> Option<usize> {
        match self.alpha_index {
            Some(a) => Some(a as usize),
            None => None,
        }
    }

    /// Whether the layout carries alpha.
    #[inline]
    pub const fn has_alpha(&self) -> bool {
        self.alpha_index.is_some()
    }

    /// Bytes per channel.
    #[inline]
    pub const fn channel_size(&self) -> usize {
        self.channel_type.bytes_per_channel()
    }

    /// Bytes per pixel.
    #[inline]
    pub const fn pixel_size(&self) -> usize {
        self.channel_count as usize * self.channel_type.bytes_per_channel()
    }

    /// Number of non-alpha channels.
    #[inline]
    pub const fn color_channel_count(&self) -> usize {
        self.channel_count as usize - if self.alpha_index.is_some() { 1 } else { 0 }
    }

    /// Indices of non-alpha channels, in storage order.
    pub fn color_channels(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.channel_count()).filter(move |&c| Some(c) != self.alpha_index())
    }

    /// Same shape with a different storage type.
    #[inline]
    pub const fn with_channel_type(&self, channel_type: ChannelType) -> Self {
        Self {
            channel_count: self.channel_count,
            channel_type,
            alpha_index: self.alpha_index,
        }
    }
}

impl fmt::Display for PixelTraits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.channel_count, self.channel_type)?;
        if let Some(a) = self.alpha_index {
            write!(f, " (alpha @{a})")?;
        }
        Ok(())
    }
}

type ChannelFn = fn(&[u8], &mut [u8]);
type UnitFn = fn(&mut [u8]);

#[inline]
fn convert_channel<S: PixelFormat, D: PixelFormat>(src: &[u8], dst: &mut [u8]) {
    D::from_value(S::read(src).to_value()).write(dst);
}

fn write_unit<D: PixelFormat>(dst: &mut [u8]) {
    D::one().write(dst);
}

fn select_dst<S: PixelFormat>(dst: ChannelType) -> ChannelFn {
    match dst {
        ChannelType::U8 => convert_channel::<S, u8>,
        ChannelType::U16 => convert_channel::<S, u16>,
        ChannelType::F16 => convert_channel::<S, f16>,
        ChannelType::F32 => convert_channel::<S, f32>,
    }
}

fn channel_fn(src: ChannelType, dst: ChannelType) -> ChannelFn {
    match src {
        ChannelType::U8 => select_dst::<u8>(dst),
        ChannelType::U16 => select_dst::<u16>(dst),
        ChannelType::F16 => select_dst::<f16>(dst),
        ChannelType::F32 => select_dst::<f32>(dst),
    }
}

fn unit_fn(ty: ChannelType) -> UnitFn {
    match ty {
        ChannelType::U8 => write_unit::<u8>,
        ChannelType::U16 => write_unit::<u16>,
        ChannelType::F16 => write_unit::<f16>,
        ChannelType::F32 => write_unit::<f32>,
    }
}

/// Converts pixels between two layouts of equal color channel count.
///
/// The per-channel routine is picked once at construction so the pixel loop
/// has no type dispatch.
#[derive(Clone)]
pub struct PixelConverter {
    src: PixelTraits,
    dst: PixelTraits,
    /// (source channel, destination channel) byte offsets.
    map: Vec<(usize, usize)>,
    /// Destination alpha offset to set opaque (source has no alpha).
    opaque_alpha: Option<usize>,
    channel: ChannelFn,
    unit: UnitFn,
}

impl PixelConverter {
    /// Builds a converter, or fails if the color channel counts differ.
    pub fn new(src: PixelTraits, dst: PixelTraits) -> Result<Self> {
        if src.color_channel_count() != dst.color_channel_count() {
            return Err(Error::channel_mismatch(
                src.channel_count,
                dst.channel_count,
            ));
        }
        let (ss, ds) = (src.channel_size(), dst.channel_size());
        let mut map: Vec<(usize, usize)> = src
            .color_channels()
            .zip(dst.color_channels())
            .map(|(s, d)| (s * ss, d * ds))
            .collect();
        let mut opaque_alpha = None;
        match (src.alpha_index(), dst.alpha_index()) {
            (Some(sa), Some(da)) => map.push((sa * ss, da * ds)),
            (None, Some(da)) => opaque_alpha = Some(da * ds),
            // Alpha dropped, not blended into color.
            (_, None) => {}
        }
        Ok(Self {
            src,
            dst,
            map,
            opaque_alpha,
            channel: channel_fn(src.channel_type, dst.channel_type),
            unit: unit_fn(dst.channel_type),
        })
    }

    /// Source layout.
    pub fn source(&self) -> PixelTraits {
        self.src
    }

    /// Destination layout.
    pub fn destination(&self) -> PixelTraits {
        self.dst
    }

    /// Converts `count` pixels from `src` into `dst`.
    ///
    /// Both buffers must hold at least `count` pixels of their layout.
    pub fn convert(&self, src: &[u8], dst: &mut [u8], count: usize) {
        let (sp, dp) = (self.src.pixel_size(), self.dst.pixel_size());
        debug_assert!(src.len() >= count * sp);
        debug_assert!(dst.len() >= count * dp);
        for (s, d) in src
            .chunks_exact(sp)
            .zip(dst.chunks_exact_mut(dp))
            .take(count)
        {
            for &(so, doff) in &self.map {
                (self.channel)(&s[so..], &mut d[doff..]);
            }
            if let Some(a) = self.opaque_alpha {
                (self.unit)(&mut d[a..]);
            }
        }
    }
}

impl fmt::Debug for PixelConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelConverter")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .finish()
    }
}

/// One-shot conversion of `count` pixels.
///
/// Prefer [`PixelConverter`] when converting many buffers.
pub fn convert_pixels(
    src_traits: PixelTraits,
    src: &[u8],
    dst_traits: PixelTraits,
    dst: &mut [u8],
    count: usize,
) -> Result<()> {
    if src.len() < count * src_traits.pixel_size() {
        return Err(Error::buffer_too_small(count * src_traits.pixel_size(), src.len()));
    }
    if dst.len() < count * dst_traits.pixel_size() {
        return Err(Error::buffer_too_small(count * dst_traits.pixel_size(), dst.len()));
    }
    PixelConverter::new(src_traits, dst_traits)?.convert(src, dst, count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RGBA8: PixelTraits = PixelTraits::new(4, ChannelType::U8, Some(3));
    const RGBA16: PixelTraits = PixelTraits::new(4, ChannelType::U16, Some(3));
    const RGBAF32: PixelTraits = PixelTraits::new(4, ChannelType::F32, Some(3));
    const RGB16: PixelTraits = PixelTraits::new(3, ChannelType::U16, None);

    #[test]
    fn test_pixel_format_u8() {
        assert_eq!(u8::SIZE, 1);
        assert!(!u8::IS_FLOAT);
        assert!((128u8.to_f32() - 0.502).abs() < 0.01);
        assert_eq!(u8::from_f32(0.5), 128);
        assert_eq!(u8::from_f32(2.0), 255);
        assert_eq!(u8::from_f32(-1.0), 0);
    }

    #[test]
    fn test_byte_roundtrip() {
        let mut buf = [0u8; 4];
        0x1234u16.write(&mut buf);
        assert_eq!(u16::read(&buf), 0x1234);
        0.25f32.write(&mut buf);
        assert_eq!(f32::read(&buf), 0.25);
        f16::from_f32(0.5).write(&mut buf);
        assert_eq!(f16::read(&buf).to_f32(), 0.5);
    }

    #[test]
    fn test_u8_u16_roundtrip_is_lossless() {
        let conv_up = PixelConverter::new(RGBA8, RGBA16).unwrap();
        let conv_down = PixelConverter::new(RGBA16, RGBA8).unwrap();
        for v in 0..=255u8 {
            let src = [v, v, v, v];
            let mut wide = [0u8; 8];
            conv_up.convert(&src, &mut wide, 1);
            assert_eq!(u16::read(&wide[0..]), v as u16 * 257);
            let mut back = [0u8; 4];
            conv_down.convert(&wide, &mut back, 1);
            assert_eq!(back, src, "value {v}");
        }
    }

    #[test]
    fn test_u16_to_u8_rounds() {
        // 383 / 257 = 1.49 -> 1, 386 / 257 = 1.502 -> 2
        assert_eq!(u8::from_value(ChannelValue::U16(383)), 1);
        assert_eq!(u8::from_value(ChannelValue::U16(386)), 2);
        assert_eq!(u8::from_value(ChannelValue::U16(65535)), 255);
        assert_eq!(u8::from_value(ChannelValue::U16(128)), 0);
        assert_eq!(u8::from_value(ChannelValue::U16(129)), 1);
    }

    #[test]
    fn test_float_clamps_before_rounding() {
        let mut src = [0u8; 16];
        2.0f32.write(&mut src[0..]);
        (-0.5f32).write(&mut src[4..]);
        0.5f32.write(&mut src[8..]);
        1.0f32.write(&mut src[12..]);
        let mut dst = [0u8; 4];
        convert_pixels(RGBAF32, &src, RGBA8, &mut dst, 1).unwrap();
        assert_eq!(dst, [255, 0, 128, 255]);
    }

    #[test]
    fn test_int_to_float_range() {
        let src = [255u8, 0, 51, 255];
        let mut dst = [0u8; 16];
        convert_pixels(RGBA8, &src, RGBAF32, &mut dst, 1).unwrap();
        assert_eq!(f32::read(&dst[0..]), 1.0);
        assert_eq!(f32::read(&dst[4..]), 0.0);
        assert!((f32::read(&dst[8..]) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_alpha_dropped_not_blended() {
        let src = [200u8, 100, 50, 0];
        let mut dst = [0u8; 6];
        convert_pixels(RGBA8, &src, RGB16, &mut dst, 1).unwrap();
        assert_eq!(u16::read(&dst[0..]), 200 * 257);
        assert_eq!(u16::read(&dst[2..]), 100 * 257);
        assert_eq!(u16::read(&dst[4..]), 50 * 257);
    }

    #[test]
    fn test_missing_alpha_becomes_opaque() {
        let mut src = [0u8; 6];
        1000u16.write(&mut src[0..]);
        let mut dst = [0u8; 4];
        convert_pixels(RGB16, &src, RGBA8, &mut dst, 1).unwrap();
        assert_eq!(dst[3], 255);
    }

    #[test]
    fn test_channel_count_mismatch() {
        let gray = PixelTraits::new(2, ChannelType::U8, Some(1));
        let err = PixelConverter::new(RGBA8, gray).unwrap_err();
        assert!(matches!(err, Error::ChannelMismatch { .. }));
    }

    #[test]
    fn test_short_buffer() {
        let src = [0u8; 4];
        let mut dst = [0u8; 4];
        assert!(convert_pixels(RGBA8, &src, RGBA16, &mut dst, 1).is_err());
    }

    #[test]
    fn test_traits_layout() {
        assert_eq!(RGBA16.pixel_size(), 8);
        assert_eq!(RGBA16.color_channel_count(), 3);
        assert_eq!(RGB16.alpha_index(), None);
        assert_eq!(RGBA8.color_channels().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(RGBA8.with_channel_type(ChannelType::U16), RGBA16);
    }
}
