//! Composite operations: blend one scanline into another.
//!
//! A composite op reads `pixel_count` source pixels and the same number of
//! destination pixels, both laid out by the same [`PixelTraits`], and
//! writes the blended result into the destination in place.
//!
//! # Alpha-affecting ops
//!
//! - [`ids::OVER`] - Porter-Duff over
//! - [`ids::ERASE`] - scales destination alpha down, color untouched
//! - [`ids::COPY`] - replaces the destination, interpolated by opacity
//! - [`ids::BEHIND`] - paints under existing content
//! - [`ids::DESTINATION_IN`] - keeps the destination where the source is opaque
//!
//! These run in exact fixed-point math for integer channels (see
//! [`ChannelMath`]).
//!
//! # Blend modes
//!
//! Separable modes (multiply, screen, overlay, ...) and the RGB-only
//! non-separable modes (hue, saturation, color, luminosity) compute the
//! blended color in normalized `f32` and composite it with union alpha:
//!
//! ```text
//! a'  = sa + da - sa * da
//! c'  = (s * sa * (1 - da) + d * da * (1 - sa) + sa * da * B(s, d)) / a'
//! ```
//!
//! where `sa` already includes opacity and mask.
//!
//! # Example
//!
//! ```rust
//! use tilepaint_core::composite::{self, CompositeParams};
//! use tilepaint_core::{ChannelType, PixelTraits};
//!
//! let rgba8 = PixelTraits::new(4, ChannelType::U8, Some(3));
//! let over = composite::create(composite::ids::OVER, rgba8, true).unwrap();
//!
//! let src = [0u8, 0, 255, 255];
//! let mut dst = [255u8, 0, 0, 255];
//! over.composite(&src, &mut dst, 1, &CompositeParams::new(0.5));
//! assert_eq!(dst, [127, 0, 128, 255]);
//! ```

use crate::format::ChannelType;
use crate::maths::ChannelMath;
use crate::pixel::{PixelFormat, PixelTraits};
use half::f16;
use std::fmt;
use std::sync::Arc;

/// Builtin composite op ids.
pub mod ids {
    /// Porter-Duff over.
    pub const OVER: &str = "over";
    /// Alpha erase.
    pub const ERASE: &str = "erase";
    /// Opacity-weighted replace.
    pub const COPY: &str = "copy";
    /// Paint below existing content.
    pub const BEHIND: &str = "behind";
    /// Keep destination inside source alpha.
    pub const DESTINATION_IN: &str = "destination-in";
    /// `s * d`
    pub const MULTIPLY: &str = "multiply";
    /// `s + d - s * d`
    pub const SCREEN: &str = "screen";
    /// Hard light with layers swapped.
    pub const OVERLAY: &str = "overlay";
    /// `min(s, d)`
    pub const DARKEN: &str = "darken";
    /// `max(s, d)`
    pub const LIGHTEN: &str = "lighten";
    /// `d / (1 - s)`
    pub const COLOR_DODGE: &str = "color-dodge";
    /// `1 - (1 - d) / s`
    pub const COLOR_BURN: &str = "color-burn";
    /// Multiply or screen by source.
    pub const HARD_LIGHT: &str = "hard-light";
    /// W3C soft light.
    pub const SOFT_LIGHT: &str = "soft-light";
    /// `|s - d|`
    pub const DIFFERENCE: &str = "difference";
    /// `s + d - 2 * s * d`
    pub const EXCLUSION: &str = "exclusion";
    /// `min(1, s + d)`
    pub const ADD: &str = "add";
    /// `max(0, d - s)`
    pub const SUBTRACT: &str = "subtract";
    /// `d / s`
    pub const DIVIDE: &str = "divide";
    /// `max(0, s + d - 1)`
    pub const LINEAR_BURN: &str = "linear-burn";
    /// `d + 2 * s - 1`
    pub const LINEAR_LIGHT: &str = "linear-light";
    /// Darken or lighten by source.
    pub const PIN_LIGHT: &str = "pin-light";
    /// Source hue, destination saturation and luminosity.
    pub const HUE: &str = "hue";
    /// Source saturation.
    pub const SATURATION: &str = "saturation";
    /// Source hue and saturation.
    pub const COLOR: &str = "color";
    /// Source luminosity.
    pub const LUMINOSITY: &str = "luminosity";
}

/// Set of channel indices a composite op may write.
///
/// Unset channels keep their destination value. Clearing the alpha bit is
/// "alpha lock"; setting only the alpha bit refills coverage without
/// touching color.
///
/// ```rust
/// use tilepaint_core::composite::ChannelFlags;
///
/// let lock = ChannelFlags::all().without(3);
/// assert!(lock.contains(0));
/// assert!(!lock.contains(3));
/// assert!(ChannelFlags::only(3).contains(3));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelFlags(u32);

impl ChannelFlags {
    /// Every channel.
    #[inline]
    pub const fn all() -> Self {
        Self(u32::MAX)
    }

    /// No channel.
    #[inline]
    pub const fn none() -> Self {
        Self(0)
    }

    /// Exactly one channel.
    #[inline]
    pub const fn only(index: usize) -> Self {
        Self(1 << index)
    }

    /// From a raw bit mask, bit `n` meaning channel `n`.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bit mask.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Adds a channel.
    #[inline]
    pub const fn with(self, index: usize) -> Self {
        Self(self.0 | (1 << index))
    }

    /// Removes a channel.
    #[inline]
    pub const fn without(self, index: usize) -> Self {
        Self(self.0 & !(1 << index))
    }

    /// Whether the channel may be written.
    #[inline]
    pub const fn contains(&self, index: usize) -> bool {
        index < 32 && self.0 & (1 << index) != 0
    }

    /// Whether every channel of a layout may be written.
    pub fn covers(&self, traits: &PixelTraits) -> bool {
        (0..traits.channel_count()).all(|c| self.contains(c))
    }
}

impl Default for ChannelFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for ChannelFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelFlags({:#b})", self.0)
    }
}

/// Per-call read-only parameters.
#[derive(Debug, Clone, Copy)]
pub struct CompositeParams<'a> {
    /// Overall opacity in [0, 1].
    pub opacity: f32,
    /// Optional 8-bit coverage, one byte per pixel, scaling opacity.
    pub mask: Option<&'a [u8]>,
    /// Channels the op may write.
    pub channel_flags: ChannelFlags,
}

impl<'a> CompositeParams<'a> {
    /// Parameters with the given opacity, no mask, all channels.
    #[inline]
    pub fn new(opacity: f32) -> Self {
        Self {
            opacity,
            mask: None,
            channel_flags: ChannelFlags::all(),
        }
    }

    /// Adds a per-pixel mask.
    #[inline]
    pub fn with_mask(mut self, mask: &'a [u8]) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Restricts written channels.
    #[inline]
    pub fn with_flags(mut self, flags: ChannelFlags) -> Self {
        self.channel_flags = flags;
        self
    }
}

impl Default for CompositeParams<'_> {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Family of a composite op, for listing and UI grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeCategory {
    /// Porter-Duff style ops that act mostly on alpha.
    Alpha,
    /// Per-channel blend formula.
    Separable,
    /// Blend formula over the whole RGB triple.
    NonSeparable,
    /// Registered by the application.
    Custom,
}

/// A stateless blend function bound to one pixel layout.
///
/// Implementations must not allocate or log per pixel. Both buffers are in
/// the layout the op was created for; feeding bytes from another color
/// space is a caller bug.
pub trait CompositeOp: Send + Sync + fmt::Debug {
    /// Stable id, e.g. `"over"`.
    fn id(&self) -> &str;

    /// Family of this op.
    fn category(&self) -> CompositeCategory {
        CompositeCategory::Custom
    }

    /// Whether an all-zero (fully transparent) source pixel leaves the
    /// destination pixel unchanged. Callers may then skip regions the
    /// source never painted.
    fn transparent_source_is_noop(&self) -> bool {
        false
    }

    /// Blends `pixel_count` pixels of `src` into `dst`.
    fn composite(&self, src: &[u8], dst: &mut [u8], pixel_count: usize, params: &CompositeParams<'_>);
}

/// Byte layout resolved once per op.
#[derive(Debug, Clone)]
struct Layout {
    pixel_size: usize,
    /// (channel index, byte offset) of color channels.
    colors: Vec<(usize, usize)>,
    /// (channel index, byte offset) of alpha.
    alpha: Option<(usize, usize)>,
}

impl Layout {
    fn new(traits: &PixelTraits) -> Self {
        let cs = traits.channel_size();
        Self {
            pixel_size: traits.pixel_size(),
            colors: traits.color_channels().map(|c| (c, c * cs)).collect(),
            alpha: traits.alpha_index().map(|a| (a, a * cs)),
        }
    }

    #[inline]
    fn check(&self, src: &[u8], dst: &[u8], n: usize, params: &CompositeParams<'_>) {
        debug_assert!(src.len() >= n * self.pixel_size, "source scanline too short");
        debug_assert!(dst.len() >= n * self.pixel_size, "destination scanline too short");
        debug_assert!(params.mask.is_none_or(|m| m.len() >= n), "mask too short");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlphaKind {
    Over,
    Erase,
    Copy,
    Behind,
    DestinationIn,
}

#[derive(Debug)]
struct AlphaOp {
    id: &'static str,
    kind: AlphaKind,
    channel_type: ChannelType,
    layout: Layout,
}

impl AlphaOp {
    fn run<T: ChannelMath>(&self, src: &[u8], dst: &mut [u8], n: usize, p: &CompositeParams<'_>) {
        let layout = &self.layout;
        let ps = layout.pixel_size;
        let flags = p.channel_flags;
        let opacity = T::from_opacity(p.opacity);
        let alpha_off = layout.alpha.map(|(_, o)| o);
        let write_alpha = layout.alpha.filter(|&(i, _)| flags.contains(i)).map(|(_, o)| o);

        for (i, (s, d)) in src.chunks_exact(ps).zip(dst.chunks_exact_mut(ps)).take(n).enumerate() {
            let op = match p.mask {
                Some(m) => T::mul(opacity, T::from_mask(m[i])),
                None => opacity,
            };
            if op.is_zero() {
                continue;
            }
            let sa = alpha_off.map_or(T::one(), |o| T::read(&s[o..]));
            let da = alpha_off.map_or(T::one(), |o| T::read(&d[o..]));

            match self.kind {
                AlphaKind::Over => {
                    let sa = T::mul(sa, op);
                    if sa.is_zero() {
                        continue;
                    }
                    let na = T::union(sa, da);
                    // Straight alpha: color weight is the source share of the result.
                    let w = if da.is_zero() { T::one() } else { T::div(sa, na) };
                    for &(c, o) in &layout.colors {
                        if flags.contains(c) {
                            T::lerp(T::read(&d[o..]), T::read(&s[o..]), w).write(&mut d[o..]);
                        }
                    }
                    if let Some(o) = write_alpha {
                        na.write(&mut d[o..]);
                    }
                }
                AlphaKind::Erase => {
                    if let Some(o) = write_alpha {
                        T::mul(da, T::inv(T::mul(sa, op))).write(&mut d[o..]);
                    }
                }
                AlphaKind::Copy => {
                    for &(c, o) in &layout.colors {
                        if flags.contains(c) {
                            T::lerp(T::read(&d[o..]), T::read(&s[o..]), op).write(&mut d[o..]);
                        }
                    }
                    if let Some(o) = write_alpha {
                        T::lerp(da, sa, op).write(&mut d[o..]);
                    }
                }
                AlphaKind::Behind => {
                    if da.is_unit() {
                        continue;
                    }
                    let sa = T::mul(sa, op);
                    let na = T::union(da, sa);
                    if na.is_zero() {
                        continue;
                    }
                    let w = T::div(da, na);
                    for &(c, o) in &layout.colors {
                        if flags.contains(c) {
                            T::lerp(T::read(&s[o..]), T::read(&d[o..]), w).write(&mut d[o..]);
                        }
                    }
                    if let Some(o) = write_alpha {
                        na.write(&mut d[o..]);
                    }
                }
                AlphaKind::DestinationIn => {
                    if let Some(o) = write_alpha {
                        T::lerp(da, T::mul(da, sa), op).write(&mut d[o..]);
                    }
                }
            }
        }
    }
}

impl CompositeOp for AlphaOp {
    fn id(&self) -> &str {
        self.id
    }

    fn category(&self) -> CompositeCategory {
        CompositeCategory::Alpha
    }

    fn transparent_source_is_noop(&self) -> bool {
        self.layout.alpha.is_some() && !matches!(self.kind, AlphaKind::Copy | AlphaKind::DestinationIn)
    }

    fn composite(&self, src: &[u8], dst: &mut [u8], pixel_count: usize, params: &CompositeParams<'_>) {
        self.layout.check(src, dst, pixel_count, params);
        match self.channel_type {
            ChannelType::U8 => self.run::<u8>(src, dst, pixel_count, params),
            ChannelType::U16 => self.run::<u16>(src, dst, pixel_count, params),
            ChannelType::F16 => self.run::<f16>(src, dst, pixel_count, params),
            ChannelType::F32 => self.run::<f32>(src, dst, pixel_count, params),
        }
    }
}

/// Per-channel blend formula `B(src, dst)` on normalized values.
pub type SeparableFn = fn(f32, f32) -> f32;

/// Whole-triple blend formula on normalized RGB.
pub type NonSeparableFn = fn([f32; 3], [f32; 3]) -> [f32; 3];

#[derive(Debug, Clone, Copy)]
enum Formula {
    Separable(SeparableFn),
    NonSeparable(NonSeparableFn),
}

#[derive(Debug)]
struct BlendOp {
    id: &'static str,
    formula: Formula,
    channel_type: ChannelType,
    layout: Layout,
}

/// Union-alpha composite of one blended channel, all values normalized.
#[inline]
fn union_channel(s: f32, d: f32, b: f32, sa: f32, da: f32, na: f32) -> f32 {
    (s * sa * (1.0 - da) + d * da * (1.0 - sa) + sa * da * b) / na
}

impl BlendOp {
    fn run<T: ChannelMath>(&self, src: &[u8], dst: &mut [u8], n: usize, p: &CompositeParams<'_>) {
        let layout = &self.layout;
        let ps = layout.pixel_size;
        let flags = p.channel_flags;
        let opacity = p.opacity.clamp(0.0, 1.0);
        let alpha_off = layout.alpha.map(|(_, o)| o);
        let write_alpha = layout.alpha.filter(|&(i, _)| flags.contains(i)).map(|(_, o)| o);

        for (i, (s, d)) in src.chunks_exact(ps).zip(dst.chunks_exact_mut(ps)).take(n).enumerate() {
            let op = match p.mask {
                Some(m) => opacity * m[i] as f32 / 255.0,
                None => opacity,
            };
            let sa = alpha_off.map_or(1.0, |o| T::read(&s[o..]).to_f32()) * op;
            if sa <= 0.0 {
                continue;
            }
            let da = alpha_off.map_or(1.0, |o| T::read(&d[o..]).to_f32());
            let na = sa + da - sa * da;

            match self.formula {
                Formula::Separable(blend) => {
                    for &(c, o) in &layout.colors {
                        if flags.contains(c) {
                            let sc = T::read(&s[o..]).to_f32();
                            let dc = T::read(&d[o..]).to_f32();
                            let r = union_channel(sc, dc, blend(sc, dc), sa, da, na);
                            T::from_f32(r).write(&mut d[o..]);
                        }
                    }
                }
                Formula::NonSeparable(blend) => {
                    let mut sc = [0.0f32; 3];
                    let mut dc = [0.0f32; 3];
                    for (k, &(_, o)) in layout.colors.iter().take(3).enumerate() {
                        sc[k] = T::read(&s[o..]).to_f32();
                        dc[k] = T::read(&d[o..]).to_f32();
                    }
                    let b = blend(sc, dc);
                    for (k, &(c, o)) in layout.colors.iter().take(3).enumerate() {
                        if flags.contains(c) {
                            let r = union_channel(sc[k], dc[k], b[k], sa, da, na);
                            T::from_f32(r).write(&mut d[o..]);
                        }
                    }
                }
            }
            if let Some(o) = write_alpha {
                T::from_f32(na).write(&mut d[o..]);
            }
        }
    }
}

impl CompositeOp for BlendOp {
    fn id(&self) -> &str {
        self.id
    }

    fn category(&self) -> CompositeCategory {
        match self.formula {
            Formula::Separable(_) => CompositeCategory::Separable,
            Formula::NonSeparable(_) => CompositeCategory::NonSeparable,
        }
    }

    fn transparent_source_is_noop(&self) -> bool {
        self.layout.alpha.is_some()
    }

    fn composite(&self, src: &[u8], dst: &mut [u8], pixel_count: usize, params: &CompositeParams<'_>) {
        self.layout.check(src, dst, pixel_count, params);
        match self.channel_type {
            ChannelType::U8 => self.run::<u8>(src, dst, pixel_count, params),
            ChannelType::U16 => self.run::<u16>(src, dst, pixel_count, params),
            ChannelType::F16 => self.run::<f16>(src, dst, pixel_count, params),
            ChannelType::F32 => self.run::<f32>(src, dst, pixel_count, params),
        }
    }
}

// Separable formulas, `s` source, `d` destination (backdrop).

fn multiply(s: f32, d: f32) -> f32 {
    s * d
}

fn screen(s: f32, d: f32) -> f32 {
    s + d - s * d
}

fn hard_light(s: f32, d: f32) -> f32 {
    if s <= 0.5 {
        multiply(2.0 * s, d)
    } else {
        screen(2.0 * s - 1.0, d)
    }
}

fn overlay(s: f32, d: f32) -> f32 {
    hard_light(d, s)
}

fn darken(s: f32, d: f32) -> f32 {
    s.min(d)
}

fn lighten(s: f32, d: f32) -> f32 {
    s.max(d)
}

fn color_dodge(s: f32, d: f32) -> f32 {
    if d <= 0.0 {
        0.0
    } else if s >= 1.0 {
        1.0
    } else {
        (d / (1.0 - s)).min(1.0)
    }
}

fn color_burn(s: f32, d: f32) -> f32 {
    if d >= 1.0 {
        1.0
    } else if s <= 0.0 {
        0.0
    } else {
        1.0 - ((1.0 - d) / s).min(1.0)
    }
}

fn soft_light(s: f32, d: f32) -> f32 {
    if s <= 0.5 {
        d - (1.0 - 2.0 * s) * d * (1.0 - d)
    } else {
        let dd = if d <= 0.25 {
            ((16.0 * d - 12.0) * d + 4.0) * d
        } else {
            d.sqrt()
        };
        d + (2.0 * s - 1.0) * (dd - d)
    }
}

fn difference(s: f32, d: f32) -> f32 {
    (s - d).abs()
}

fn exclusion(s: f32, d: f32) -> f32 {
    s + d - 2.0 * s * d
}

fn add(s: f32, d: f32) -> f32 {
    (s + d).min(1.0)
}

fn subtract(s: f32, d: f32) -> f32 {
    (d - s).max(0.0)
}

fn divide(s: f32, d: f32) -> f32 {
    if s <= 0.0 {
        if d <= 0.0 { 0.0 } else { 1.0 }
    } else {
        (d / s).min(1.0)
    }
}

fn linear_burn(s: f32, d: f32) -> f32 {
    (s + d - 1.0).max(0.0)
}

fn linear_light(s: f32, d: f32) -> f32 {
    (d + 2.0 * s - 1.0).clamp(0.0, 1.0)
}

fn pin_light(s: f32, d: f32) -> f32 {
    if s < 0.5 {
        d.min(2.0 * s)
    } else {
        d.max(2.0 * s - 1.0)
    }
}

// Non-separable helpers on RGB triples.

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 && l - n > f32::EPSILON {
        for v in &mut out {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 && x - l > f32::EPSILON {
        for v in &mut out {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|&a, &b| c[a].total_cmp(&c[b]));
    let [lo, mid, hi] = idx;
    let mut out = [0.0f32; 3];
    if c[hi] > c[lo] {
        out[mid] = (c[mid] - c[lo]) * s / (c[hi] - c[lo]);
        out[hi] = s;
    }
    out
}

fn hue(s: [f32; 3], d: [f32; 3]) -> [f32; 3] {
    set_lum(set_sat(s, sat(d)), lum(d))
}

fn saturation(s: [f32; 3], d: [f32; 3]) -> [f32; 3] {
    set_lum(set_sat(d, sat(s)), lum(d))
}

fn color(s: [f32; 3], d: [f32; 3]) -> [f32; 3] {
    set_lum(s, lum(d))
}

fn luminosity(s: [f32; 3], d: [f32; 3]) -> [f32; 3] {
    set_lum(d, lum(s))
}

const ALPHA_OPS: [(&str, AlphaKind); 5] = [
    (ids::OVER, AlphaKind::Over),
    (ids::ERASE, AlphaKind::Erase),
    (ids::COPY, AlphaKind::Copy),
    (ids::BEHIND, AlphaKind::Behind),
    (ids::DESTINATION_IN, AlphaKind::DestinationIn),
];

const SEPARABLE_OPS: [(&str, SeparableFn); 17] = [
    (ids::MULTIPLY, multiply),
    (ids::SCREEN, screen),
    (ids::OVERLAY, overlay),
    (ids::DARKEN, darken),
    (ids::LIGHTEN, lighten),
    (ids::COLOR_DODGE, color_dodge),
    (ids::COLOR_BURN, color_burn),
    (ids::HARD_LIGHT, hard_light),
    (ids::SOFT_LIGHT, soft_light),
    (ids::DIFFERENCE, difference),
    (ids::EXCLUSION, exclusion),
    (ids::ADD, add),
    (ids::SUBTRACT, subtract),
    (ids::DIVIDE, divide),
    (ids::LINEAR_BURN, linear_burn),
    (ids::LINEAR_LIGHT, linear_light),
    (ids::PIN_LIGHT, pin_light),
];

const NON_SEPARABLE_OPS: [(&str, NonSeparableFn); 4] = [
    (ids::HUE, hue),
    (ids::SATURATION, saturation),
    (ids::COLOR, color),
    (ids::LUMINOSITY, luminosity),
];

/// The over op for `traits`.
pub fn over(traits: PixelTraits) -> Arc<dyn CompositeOp> {
    Arc::new(AlphaOp {
        id: ids::OVER,
        kind: AlphaKind::Over,
        channel_type: traits.channel_type(),
        layout: Layout::new(&traits),
    })
}

/// Creates a builtin op for `traits`, or `None` if the id is unknown or
/// not valid for the layout.
///
/// `rgb` enables the non-separable modes, which need exactly three color
/// channels in R, G, B order.
pub fn create(id: &str, traits: PixelTraits, rgb: bool) -> Option<Arc<dyn CompositeOp>> {
    let layout = Layout::new(&traits);
    let channel_type = traits.channel_type();
    if let Some(&(id, kind)) = ALPHA_OPS.iter().find(|(name, _)| *name == id) {
        return Some(Arc::new(AlphaOp {
            id,
            kind,
            channel_type,
            layout,
        }));
    }
    let formula = if let Some(&(name, f)) = SEPARABLE_OPS.iter().find(|(name, _)| *name == id) {
        (name, Formula::Separable(f))
    } else if let Some(&(name, f)) = NON_SEPARABLE_OPS.iter().find(|(name, _)| *name == id) {
        if !rgb || traits.color_channel_count() != 3 {
            return None;
        }
        (name, Formula::NonSeparable(f))
    } else {
        return None;
    };
    Some(Arc::new(BlendOp {
        id: formula.0,
        formula: formula.1,
        channel_type,
        layout,
    }))
}

/// Every builtin op valid for `traits`.
///
/// Layouts without color channels (alpha masks) only get the alpha ops.
pub fn builtin_ops(traits: PixelTraits, rgb: bool) -> Vec<Arc<dyn CompositeOp>> {
    let mut names: Vec<&str> = ALPHA_OPS.iter().map(|(n, _)| *n).collect();
    if traits.color_channel_count() > 0 {
        names.extend(SEPARABLE_OPS.iter().map(|(n, _)| *n));
        if rgb && traits.color_channel_count() == 3 {
            names.extend(NON_SEPARABLE_OPS.iter().map(|(n, _)| *n));
        }
    }
    names
        .into_iter()
        .filter_map(|id| create(id, traits, rgb))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RGBA8: PixelTraits = PixelTraits::new(4, ChannelType::U8, Some(3));
    const RGBA16: PixelTraits = PixelTraits::new(4, ChannelType::U16, Some(3));
    const RGBAF32: PixelTraits = PixelTraits::new(4, ChannelType::F32, Some(3));
    const GRAY8: PixelTraits = PixelTraits::new(2, ChannelType::U8, Some(1));

    fn op(id: &str, traits: PixelTraits) -> Arc<dyn CompositeOp> {
        create(id, traits, true).unwrap()
    }

    fn f32_bytes(px: [f32; 4]) -> Vec<u8> {
        px.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    fn f32_pixel(bytes: &[u8]) -> [f32; 4] {
        [0, 1, 2, 3].map(|c| f32::read(&bytes[c * 4..]))
    }

    #[test]
    fn test_transparent_source_noop_flags() {
        for id in [ids::OVER, ids::ERASE, ids::BEHIND, ids::MULTIPLY, ids::HUE] {
            let o = op(id, RGBA8);
            assert!(o.transparent_source_is_noop(), "{id}");
            let mut dst = [10u8, 20, 30, 128];
            o.composite(&[0; 4], &mut dst, 1, &CompositeParams::default());
            assert_eq!(dst, [10, 20, 30, 128], "{id}");
        }
        for id in [ids::COPY, ids::DESTINATION_IN] {
            let o = op(id, RGBA8);
            assert!(!o.transparent_source_is_noop(), "{id}");
            let mut dst = [10u8, 20, 30, 128];
            o.composite(&[0; 4], &mut dst, 1, &CompositeParams::default());
            assert_eq!(dst[3], 0, "{id}");
        }
    }

    #[test]
    fn test_over_opaque_replaces() {
        let over = op(ids::OVER, RGBA8);
        for dst_px in [[0u8, 0, 0, 0], [10, 200, 30, 77], [255, 255, 255, 255]] {
            let src = [12u8, 34, 56, 255];
            let mut dst = dst_px;
            over.composite(&src, &mut dst, 1, &CompositeParams::new(1.0));
            assert_eq!(dst, src);
        }
    }

    #[test]
    fn test_over_half_opacity() {
        let over = op(ids::OVER, RGBA8);
        let src = [0u8, 0, 255, 255];
        let mut dst = [255u8, 0, 0, 255];
        over.composite(&src, &mut dst, 1, &CompositeParams::new(0.5));
        assert!((127..=128).contains(&dst[0]));
        assert_eq!(dst[1], 0);
        assert!((127..=128).contains(&dst[2]));
        assert_eq!(dst[3], 255);
    }

    #[test]
    fn test_over_onto_transparent_keeps_source_color() {
        let over = op(ids::OVER, RGBA8);
        let src = [200u8, 100, 50, 128];
        let mut dst = [0u8, 0, 0, 0];
        over.composite(&src, &mut dst, 1, &CompositeParams::new(1.0));
        assert_eq!(dst, [200, 100, 50, 128]);
    }

    #[test]
    fn test_over_u16_exact() {
        let over = op(ids::OVER, RGBA16);
        let mut src = [0u8; 8];
        let mut dst = [0u8; 8];
        for (c, v) in [1000u16, 2000, 3000, 65535].into_iter().enumerate() {
            v.write(&mut src[c * 2..]);
        }
        for c in 0..4 {
            40000u16.write(&mut dst[c * 2..]);
        }
        over.composite(&src, &mut dst, 1, &CompositeParams::new(1.0));
        assert_eq!(dst, src);
    }

    #[test]
    fn test_erase_keeps_color() {
        let erase = op(ids::ERASE, RGBA8);
        let src = [0u8, 0, 0, 255];
        let mut dst = [91u8, 17, 203, 255];
        erase.composite(&src, &mut dst, 1, &CompositeParams::new(1.0));
        assert_eq!(dst, [91, 17, 203, 0]);

        let mut partial = [91u8, 17, 203, 200];
        erase.composite(&src, &mut partial, 1, &CompositeParams::new(0.5));
        assert_eq!(&partial[..3], &[91, 17, 203]);
        assert_eq!(partial[3], 100);
    }

    #[test]
    fn test_mask_scales_opacity() {
        let over = op(ids::OVER, RGBA8);
        let src = [255u8, 255, 255, 255, 255, 255, 255, 255];
        let mut dst = [0u8, 0, 0, 255, 0, 0, 0, 255];
        let mask = [0u8, 255];
        over.composite(&src, &mut dst, 2, &CompositeParams::new(1.0).with_mask(&mask));
        assert_eq!(&dst[..4], &[0, 0, 0, 255]);
        assert_eq!(&dst[4..], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_alpha_lock() {
        let over = op(ids::OVER, RGBA8);
        let src = [255u8, 0, 0, 255];
        let mut dst = [0u8, 0, 255, 100];
        let params = CompositeParams::new(1.0).with_flags(ChannelFlags::all().without(3));
        over.composite(&src, &mut dst, 1, &params);
        assert_eq!(dst, [255, 0, 0, 100]);
    }

    #[test]
    fn test_copy_and_behind() {
        let copy = op(ids::COPY, RGBA8);
        let mut dst = [10u8, 20, 30, 40];
        copy.composite(&[1, 2, 3, 0], &mut dst, 1, &CompositeParams::new(1.0));
        assert_eq!(dst, [1, 2, 3, 0]);

        let behind = op(ids::BEHIND, RGBA8);
        let mut opaque = [10u8, 20, 30, 255];
        behind.composite(&[200, 200, 200, 255], &mut opaque, 1, &CompositeParams::new(1.0));
        assert_eq!(opaque, [10, 20, 30, 255]);
        let mut empty = [0u8, 0, 0, 0];
        behind.composite(&[200, 100, 0, 255], &mut empty, 1, &CompositeParams::new(1.0));
        assert_eq!(empty, [200, 100, 0, 255]);
    }

    #[test]
    fn test_destination_in() {
        let dst_in = op(ids::DESTINATION_IN, GRAY8);
        let mut dst = [50u8, 200];
        dst_in.composite(&[0, 0], &mut dst, 1, &CompositeParams::new(1.0));
        assert_eq!(dst, [50, 0]);
    }

    #[test]
    fn test_multiply_opaque() {
        let mul = op(ids::MULTIPLY, RGBAF32);
        let src = f32_bytes([0.5, 1.0, 0.0, 1.0]);
        let mut dst = f32_bytes([0.5, 0.25, 0.75, 1.0]);
        mul.composite(&src, &mut dst, 1, &CompositeParams::new(1.0));
        let out = f32_pixel(&dst);
        assert_relative_eq!(out[0], 0.25);
        assert_relative_eq!(out[1], 0.25);
        assert_relative_eq!(out[2], 0.0);
        assert_relative_eq!(out[3], 1.0);
    }

    #[test]
    fn test_screen_onto_transparent_is_source() {
        let scr = op(ids::SCREEN, RGBAF32);
        let src = f32_bytes([0.2, 0.4, 0.6, 1.0]);
        let mut dst = f32_bytes([0.9, 0.9, 0.9, 0.0]);
        scr.composite(&src, &mut dst, 1, &CompositeParams::new(1.0));
        let out = f32_pixel(&dst);
        assert_relative_eq!(out[0], 0.2);
        assert_relative_eq!(out[2], 0.6);
        assert_relative_eq!(out[3], 1.0);
    }

    #[test]
    fn test_separable_formulas() {
        assert_relative_eq!(difference(0.2, 0.7), 0.5, epsilon = 1e-6);
        assert_relative_eq!(exclusion(0.5, 0.5), 0.5, epsilon = 1e-6);
        assert_relative_eq!(overlay(0.5, 0.25), 0.25, epsilon = 1e-6);
        assert_relative_eq!(color_dodge(0.5, 0.25), 0.5, epsilon = 1e-6);
        assert_relative_eq!(color_burn(0.5, 0.75), 0.5, epsilon = 1e-6);
        assert_relative_eq!(soft_light(0.5, 0.3), 0.3, epsilon = 1e-6);
        assert_relative_eq!(divide(0.5, 0.25), 0.5, epsilon = 1e-6);
        assert_relative_eq!(pin_light(0.2, 0.9), 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_luminosity_keeps_gray_gray() {
        let out = luminosity([0.5, 0.5, 0.5], [1.0, 0.0, 0.0]);
        assert_relative_eq!(lum(out), 0.5, epsilon = 1e-5);
        let gray = color([0.4, 0.4, 0.4], [0.8, 0.8, 0.8]);
        assert_relative_eq!(gray[0], 0.8, epsilon = 1e-5);
        assert_relative_eq!(gray[2], 0.8, epsilon = 1e-5);
    }

    #[test]
    fn test_non_separable_requires_rgb() {
        assert!(create(ids::HUE, GRAY8, false).is_none());
        assert!(create(ids::HUE, RGBA8, true).is_some());
        assert!(create("no-such-op", RGBA8, true).is_none());
    }

    #[test]
    fn test_builtin_sets() {
        assert_eq!(builtin_ops(RGBA8, true).len(), 26);
        assert_eq!(builtin_ops(GRAY8, false).len(), 22);
        let alpha = PixelTraits::new(1, ChannelType::U8, Some(0));
        assert_eq!(builtin_ops(alpha, false).len(), 5);
    }

    #[test]
    fn test_zero_opacity_is_noop() {
        for o in builtin_ops(RGBA8, true) {
            let mut dst = [11u8, 22, 33, 44];
            o.composite(&[200, 100, 50, 255], &mut dst, 1, &CompositeParams::new(0.0));
            assert_eq!(dst, [11, 22, 33, 44], "op {}", o.id());
        }
    }
}
