//! Color spaces: pixel layout plus meaning.
//!
//! A [`ColorSpace`] is what every other component treats as "the type of a
//! pixel". It combines
//!
//! - a [`ColorModel`] (RGBA, GrayA, Alpha, CMYKA) naming the channels,
//! - a [`PixelTraits`] fixing storage type and byte layout,
//! - an opaque [`ColorProfile`] token,
//! - the table of [`CompositeOp`]s valid for that layout,
//! - the default pixel and the shared default tile derived from it.
//!
//! Color spaces are immutable once built and shared through `Arc`. They are
//! looked up in an explicit [`ColorSpaceRegistry`]; nothing here is
//! process-global.
//!
//! # Builtin ids
//!
//! | id | channels |
//! |----|----------|
//! | `rgba-{u8,u16,f16,f32}` | R G B A |
//! | `graya-{u8,u16,f16,f32}` | Gray A |
//! | `cmyka-{u8,u16,f16,f32}` | C M Y K A |
//! | `alpha-u8`, `alpha-f32` | A |
//!
//! ```rust
//! use tilepaint_core::colorspace::ColorSpaceRegistry;
//!
//! let registry = ColorSpaceRegistry::with_builtins();
//! let rgba = registry.get("rgba-u8").unwrap();
//! assert_eq!(rgba.pixel_size(), 4);
//! assert!(rgba.composite_op("multiply").is_some());
//! assert!(rgba.composite_op("not-an-op").is_none());
//! ```

use crate::composite::{self, CompositeOp};
use crate::error::{Error, Result};
use crate::format::ChannelType;
use crate::pixel::{self, PixelConverter, PixelTraits};
use crate::TILE_AREA;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Channel naming and color semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorModel {
    /// Red, green, blue, alpha.
    Rgba,
    /// Gray, alpha.
    GrayA,
    /// Alpha only; selections and masks.
    Alpha,
    /// Cyan, magenta, yellow, key, alpha.
    Cmyka,
}

impl ColorModel {
    /// Every model.
    pub const ALL: [ColorModel; 4] = [Self::Rgba, Self::GrayA, Self::Alpha, Self::Cmyka];

    /// Id prefix, e.g. `"rgba"`.
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Rgba => "rgba",
            Self::GrayA => "graya",
            Self::Alpha => "alpha",
            Self::Cmyka => "cmyka",
        }
    }

    /// Parses an id prefix.
    pub fn from_prefix(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.prefix() == s)
    }

    /// Channel names in storage order.
    pub const fn channel_names(&self) -> &'static [&'static str] {
        match self {
            Self::Rgba => &["red", "green", "blue", "alpha"],
            Self::GrayA => &["gray", "alpha"],
            Self::Alpha => &["alpha"],
            Self::Cmyka => &["cyan", "magenta", "yellow", "key", "alpha"],
        }
    }

    /// Pixel layout for a storage type. Alpha is always the last channel.
    pub const fn traits(&self, channel_type: ChannelType) -> PixelTraits {
        let n = self.channel_names().len() as u8;
        PixelTraits::new(n, channel_type, Some(n - 1))
    }

    /// Whether the non-separable RGB blend modes apply.
    pub const fn is_rgb(&self) -> bool {
        matches!(self, Self::Rgba)
    }

    /// Storage types offered as builtin spaces.
    pub fn builtin_channel_types(&self) -> &'static [ChannelType] {
        match self {
            Self::Alpha => &[ChannelType::U8, ChannelType::F32],
            _ => &ChannelType::ALL,
        }
    }

    fn default_profile(&self) -> ColorProfile {
        match self {
            Self::Rgba => ColorProfile::new("sRGB built-in"),
            Self::GrayA => ColorProfile::new("Gray D65 built-in"),
            Self::Alpha => ColorProfile::new("linear alpha"),
            Self::Cmyka => ColorProfile::new("naive CMYK"),
        }
    }
}

impl fmt::Display for ColorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Role of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Carries color.
    Color,
    /// Carries coverage.
    Alpha,
}

/// Metadata of one channel, for importers, exporters and UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Display name, e.g. `"red"`.
    pub name: String,
    /// Color or alpha.
    pub role: ChannelRole,
    /// Channel index within the pixel.
    pub index: usize,
    /// Byte offset within the pixel.
    pub offset: usize,
    /// Storage type.
    pub channel_type: ChannelType,
}

/// Opaque color profile token.
///
/// Profiles are never interpreted here; they are handed to an external
/// [`ColorTransform`] when converting between models.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorProfile {
    name: String,
}

impl ColorProfile {
    /// Creates a profile token.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Conversion between different color models, e.g. an ICC engine.
pub trait ColorTransform: Send + Sync {
    /// Converts `count` pixels from `src_space` into `dst_space`.
    fn transform(
        &self,
        src_space: &ColorSpace,
        src: &[u8],
        dst_space: &ColorSpace,
        dst: &mut [u8],
        count: usize,
    ) -> Result<()>;
}

/// An immutable, shareable color space.
pub struct ColorSpace {
    id: String,
    model: ColorModel,
    traits: PixelTraits,
    channels: Vec<ChannelInfo>,
    profile: ColorProfile,
    ops: Vec<Arc<dyn CompositeOp>>,
    over: Arc<dyn CompositeOp>,
    default_pixel: Vec<u8>,
    default_tile: OnceLock<Arc<[u8]>>,
}

impl ColorSpace {
    /// Builds the builtin space for a model and storage type.
    pub fn builtin(model: ColorModel, channel_type: ChannelType) -> Arc<ColorSpace> {
        ColorSpaceBuilder::new(model, channel_type).build()
    }

    /// Id, e.g. `"rgba-u16"`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Color model.
    pub fn model(&self) -> ColorModel {
        self.model
    }

    /// Pixel layout.
    pub fn traits(&self) -> PixelTraits {
        self.traits
    }

    /// Storage type of every channel.
    pub fn channel_type(&self) -> ChannelType {
        self.traits.channel_type()
    }

    /// Bytes per pixel.
    #[inline]
    pub fn pixel_size(&self) -> usize {
        self.traits.pixel_size()
    }

    /// Channel metadata, fixed at construction.
    pub fn channel_info(&self) -> &[ChannelInfo] {
        &self.channels
    }

    /// Attached profile token.
    pub fn profile(&self) -> &ColorProfile {
        &self.profile
    }

    /// Bytes of the empty pixel. All zero for builtin spaces.
    pub fn default_pixel(&self) -> &[u8] {
        &self.default_pixel
    }

    /// Shared contents of a never-written tile.
    ///
    /// Built on first use and kept for the life of the color space. Never
    /// mutated; writers copy it.
    pub fn default_tile(&self) -> Arc<[u8]> {
        self.default_tile
            .get_or_init(|| {
                debug!(space = %self.id, "building default tile");
                self.default_pixel.repeat(TILE_AREA).into()
            })
            .clone()
    }

    /// Whether byte buffers of `other` can be read as this space.
    pub fn is_compatible(&self, other: &ColorSpace) -> bool {
        self.id == other.id && self.traits == other.traits
    }

    /// Looks up a composite op. Unknown ids return `None`.
    pub fn composite_op(&self, id: &str) -> Option<Arc<dyn CompositeOp>> {
        self.ops.iter().find(|op| op.id() == id).cloned()
    }

    /// Looks up a composite op, falling back to over for unknown ids.
    pub fn composite_op_or_over(&self, id: &str) -> Arc<dyn CompositeOp> {
        if let Some(op) = self.composite_op(id) {
            return op;
        }
        warn!(space = %self.id, op = id, "unknown composite op, using over");
        self.over.clone()
    }

    /// Ids of every registered op, in registration order.
    pub fn composite_op_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.ops.iter().map(|op| op.id())
    }

    /// Weighted mix of `pixels` into `dst`.
    ///
    /// `weights` are fixed-point fractions totalling 255; negative weights
    /// are allowed (sharpening kernels). Color is alpha-weighted, alpha is
    /// the weighted mix of alphas. When every input is transparent the color
    /// falls back to a plain weighted mix, so identical inputs come back
    /// unchanged.
    ///
    /// ```rust
    /// use tilepaint_core::colorspace::ColorSpaceRegistry;
    ///
    /// let rgba = ColorSpaceRegistry::with_builtins().get("rgba-u8").unwrap();
    /// let a = [200u8, 100, 0, 255];
    /// let b = [0u8, 100, 200, 255];
    /// let mut out = [0u8; 4];
    /// rgba.mix_colors(&[&a[..], &b[..]], &[128, 127], &mut out);
    /// assert_eq!(out, [100, 100, 100, 255]);
    /// ```
    pub fn mix_colors(&self, pixels: &[&[u8]], weights: &[i16], dst: &mut [u8]) {
        debug_assert_eq!(pixels.len(), weights.len());
        self.mix(pixels, |i| weights[i] as f64 / 255.0, dst);
    }

    /// Mix with equal weights, for box filters.
    pub fn mix_colors_uniform(&self, pixels: &[&[u8]], dst: &mut [u8]) {
        if pixels.is_empty() {
            dst[..self.pixel_size()].copy_from_slice(&self.default_pixel);
            return;
        }
        let w = 1.0 / pixels.len() as f64;
        self.mix(pixels, |_| w, dst);
    }

    fn mix(&self, pixels: &[&[u8]], weight: impl Fn(usize) -> f64, dst: &mut [u8]) {
        let ty = self.traits.channel_type();
        let cs = self.traits.channel_size();
        let read = |px: &[u8], c: usize| pixel::read_normalized(ty, &px[c * cs..]) as f64;

        let Some(a) = self.traits.alpha_index() else {
            for c in 0..self.traits.channel_count() {
                let v: f64 = pixels.iter().enumerate().map(|(i, &px)| read(px, c) * weight(i)).sum();
                pixel::write_normalized(ty, v as f32, &mut dst[c * cs..]);
            }
            return;
        };

        let alpha_sum: f64 = pixels.iter().enumerate().map(|(i, &px)| read(px, a) * weight(i)).sum();
        for c in self.traits.color_channels() {
            let v = if alpha_sum.abs() > f64::EPSILON {
                pixels
                    .iter()
                    .enumerate()
                    .map(|(i, &px)| read(px, c) * read(px, a) * weight(i))
                    .sum::<f64>()
                    / alpha_sum
            } else {
                pixels.iter().enumerate().map(|(i, &px)| read(px, c) * weight(i)).sum()
            };
            pixel::write_normalized(ty, v as f32, &mut dst[c * cs..]);
        }
        pixel::write_normalized(ty, alpha_sum as f32, &mut dst[a * cs..]);
    }

    /// Converts `count` pixels to straight 8-bit RGBA for display.
    ///
    /// Lossy for high bit depths and for CMYK, which uses the naive
    /// `(1 - c) * (1 - k)` formula. Alpha spaces render as opaque gray.
    pub fn to_rgba8(&self, src: &[u8], dst: &mut [u8], count: usize) {
        let ty = self.traits.channel_type();
        let cs = self.traits.channel_size();
        let ps = self.pixel_size();
        for (s, d) in src.chunks_exact(ps).zip(dst.chunks_exact_mut(4)).take(count) {
            let ch = |c: usize| pixel::read_normalized(ty, &s[c * cs..]);
            let rgba = match self.model {
                ColorModel::Rgba => [ch(0), ch(1), ch(2), ch(3)],
                ColorModel::GrayA => [ch(0), ch(0), ch(0), ch(1)],
                ColorModel::Alpha => [ch(0), ch(0), ch(0), 1.0],
                ColorModel::Cmyka => {
                    let k = 1.0 - ch(3);
                    [(1.0 - ch(0)) * k, (1.0 - ch(1)) * k, (1.0 - ch(2)) * k, ch(4)]
                }
            };
            for (out, v) in d.iter_mut().zip(rgba) {
                *out = pixel::PixelFormat::from_f32(v);
            }
        }
    }

    /// Converts `count` straight 8-bit RGBA pixels into this space.
    ///
    /// Gray uses Rec.709 luminance. Alpha spaces store luminance times alpha.
    pub fn from_rgba8(&self, src: &[u8], dst: &mut [u8], count: usize) {
        let ty = self.traits.channel_type();
        let cs = self.traits.channel_size();
        let ps = self.pixel_size();
        for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(ps)).take(count) {
            let [r, g, b, a] = [s[0], s[1], s[2], s[3]].map(|v| v as f32 / 255.0);
            let mut put = |c: usize, v: f32| pixel::write_normalized(ty, v, &mut d[c * cs..]);
            match self.model {
                ColorModel::Rgba => {
                    put(0, r);
                    put(1, g);
                    put(2, b);
                    put(3, a);
                }
                ColorModel::GrayA => {
                    put(0, pixel::luminance_rec709([r, g, b]));
                    put(1, a);
                }
                ColorModel::Alpha => put(0, pixel::luminance_rec709([r, g, b]) * a),
                ColorModel::Cmyka => {
                    let k = 1.0 - r.max(g).max(b);
                    let ink = |v: f32| if k >= 1.0 { 0.0 } else { (1.0 - v - k) / (1.0 - k) };
                    put(0, ink(r));
                    put(1, ink(g));
                    put(2, ink(b));
                    put(3, k);
                    put(4, a);
                }
            }
        }
    }

    /// Converts `count` pixels from this space into `dst_space`.
    ///
    /// Same model: depth conversion. Different model: `transform` if
    /// given; otherwise the destination is left untouched, a warning is
    /// logged and `Ok(false)` is returned.
    pub fn convert_pixels_to(
        &self,
        dst_space: &ColorSpace,
        src: &[u8],
        dst: &mut [u8],
        count: usize,
        transform: Option<&dyn ColorTransform>,
    ) -> Result<bool> {
        let (need_src, need_dst) = (count * self.pixel_size(), count * dst_space.pixel_size());
        if src.len() < need_src {
            return Err(Error::buffer_too_small(need_src, src.len()));
        }
        if dst.len() < need_dst {
            return Err(Error::buffer_too_small(need_dst, dst.len()));
        }
        if self.model == dst_space.model {
            PixelConverter::new(self.traits, dst_space.traits)?.convert(src, dst, count);
            return Ok(true);
        }
        match transform {
            Some(t) => {
                t.transform(self, src, dst_space, dst, count)?;
                Ok(true)
            }
            None => {
                warn!(src = %self.id, dst = %dst_space.id, "no color transform, conversion skipped");
                Ok(false)
            }
        }
    }
}

impl fmt::Debug for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorSpace")
            .field("id", &self.id)
            .field("traits", &self.traits)
            .field("profile", &self.profile.name)
            .field("ops", &self.ops.len())
            .finish()
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl PartialEq for ColorSpace {
    fn eq(&self, other: &Self) -> bool {
        self.is_compatible(other)
    }
}

impl Eq for ColorSpace {}

/// Builder for builtin and customised color spaces.
///
/// ```rust
/// use tilepaint_core::colorspace::{ColorModel, ColorSpaceBuilder};
/// use tilepaint_core::ChannelType;
///
/// let space = ColorSpaceBuilder::new(ColorModel::GrayA, ChannelType::U16)
///     .id("gray-linear-u16")
///     .profile("Gray linear")
///     .build();
/// assert_eq!(space.id(), "gray-linear-u16");
/// assert_eq!(space.pixel_size(), 4);
/// ```
pub struct ColorSpaceBuilder {
    id: String,
    model: ColorModel,
    traits: PixelTraits,
    profile: ColorProfile,
    extra_ops: Vec<Arc<dyn CompositeOp>>,
    default_pixel: Option<Vec<u8>>,
}

impl ColorSpaceBuilder {
    /// Starts from the builtin definition.
    pub fn new(model: ColorModel, channel_type: ChannelType) -> Self {
        Self {
            id: format!("{}-{}", model.prefix(), channel_type.name()),
            model,
            traits: model.traits(channel_type),
            profile: model.default_profile(),
            extra_ops: Vec::new(),
            default_pixel: None,
        }
    }

    /// Overrides the id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Overrides the profile token.
    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.profile = ColorProfile::new(name);
        self
    }

    /// Registers an extra op. An op with a builtin id replaces the builtin.
    pub fn with_op(mut self, op: Arc<dyn CompositeOp>) -> Self {
        self.extra_ops.push(op);
        self
    }

    /// Overrides the empty pixel. Must be exactly one pixel long.
    pub fn default_pixel(mut self, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != self.traits.pixel_size() {
            return Err(Error::buffer_too_small(self.traits.pixel_size(), bytes.len()));
        }
        self.default_pixel = Some(bytes.to_vec());
        Ok(self)
    }

    /// Layout the space will use.
    pub fn traits(&self) -> PixelTraits {
        self.traits
    }

    /// Finishes the space.
    pub fn build(self) -> Arc<ColorSpace> {
        let traits = self.traits;
        let cs = traits.channel_size();
        let channels = self
            .model
            .channel_names()
            .iter()
            .enumerate()
            .map(|(index, name)| ChannelInfo {
                name: (*name).to_string(),
                role: if Some(index) == traits.alpha_index() {
                    ChannelRole::Alpha
                } else {
                    ChannelRole::Color
                },
                index,
                offset: index * cs,
                channel_type: traits.channel_type(),
            })
            .collect();

        let mut ops = composite::builtin_ops(traits, self.model.is_rgb());
        for op in self.extra_ops {
            match ops.iter_mut().find(|o| o.id() == op.id()) {
                Some(slot) => *slot = op,
                None => ops.push(op),
            }
        }

        let over = ops
            .iter()
            .find(|o| o.id() == composite::ids::OVER)
            .cloned()
            .unwrap_or_else(|| composite::over(traits));

        Arc::new(ColorSpace {
            id: self.id,
            model: self.model,
            traits,
            channels,
            profile: self.profile,
            ops,
            over,
            default_pixel: self
                .default_pixel
                .unwrap_or_else(|| vec![0; traits.pixel_size()]),
            default_tile: OnceLock::new(),
        })
    }
}

/// Explicit set of color spaces, owned by a document or session.
#[derive(Debug, Clone, Default)]
pub struct ColorSpaceRegistry {
    spaces: BTreeMap<String, Arc<ColorSpace>>,
}

impl ColorSpaceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every builtin space.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        for model in ColorModel::ALL {
            for &ty in model.builtin_channel_types() {
                reg.register(ColorSpace::builtin(model, ty));
            }
        }
        debug!(count = reg.len(), "registered builtin color spaces");
        reg
    }

    /// Adds a space, returning the one it replaced.
    pub fn register(&mut self, space: Arc<ColorSpace>) -> Option<Arc<ColorSpace>> {
        self.spaces.insert(space.id().to_string(), space)
    }

    /// Looks up a space by id.
    pub fn get(&self, id: &str) -> Result<Arc<ColorSpace>> {
        self.spaces
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownColorSpace(id.to_string()))
    }

    /// Whether an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.spaces.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.spaces.keys().map(String::as_str)
    }

    /// Registered spaces, sorted by id.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ColorSpace>> + '_ {
        self.spaces.values()
    }

    /// Number of registered spaces.
    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::{CompositeCategory, CompositeParams};
    use crate::pixel::PixelFormat;

    fn space(id: &str) -> Arc<ColorSpace> {
        ColorSpaceRegistry::with_builtins().get(id).unwrap()
    }

    #[test]
    fn test_builtin_ids() {
        let reg = ColorSpaceRegistry::with_builtins();
        assert_eq!(reg.len(), 14);
        for id in ["rgba-u8", "rgba-f16", "graya-u16", "cmyka-f32", "alpha-u8", "alpha-f32"] {
            assert!(reg.contains(id), "{id}");
        }
        assert!(!reg.contains("alpha-u16"));
        assert!(matches!(reg.get("lab-u8"), Err(Error::UnknownColorSpace(_))));
    }

    #[test]
    fn test_channel_info() {
        let cmyk = space("cmyka-u16");
        let info = cmyk.channel_info();
        assert_eq!(info.len(), 5);
        assert_eq!(info[3].name, "key");
        assert_eq!(info[3].offset, 6);
        assert_eq!(info[4].role, ChannelRole::Alpha);
        assert_eq!(info[0].role, ChannelRole::Color);
    }

    #[test]
    fn test_default_tile_is_shared() {
        let rgba = space("rgba-u8");
        let a = rgba.default_tile();
        let b = rgba.default_tile();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), TILE_AREA * 4);
        assert!(a.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_unknown_op_falls_back_to_over() {
        let rgba = space("rgba-u8");
        assert!(rgba.composite_op("sparkle").is_none());
        assert_eq!(rgba.composite_op_or_over("sparkle").id(), "over");
        assert!(space("graya-u8").composite_op("hue").is_none());
    }

    #[test]
    fn test_mix_identical_any_split() {
        let rgba = space("rgba-u8");
        for px in [[12u8, 34, 56, 78], [200, 10, 90, 255], [7, 8, 9, 0]] {
            for w0 in [0i16, 1, 100, 128, 254, 255] {
                let mut out = [0u8; 4];
                rgba.mix_colors(&[&px[..], &px[..]], &[w0, 255 - w0], &mut out);
                assert_eq!(out, px, "split {w0}");
            }
        }
    }

    #[test]
    fn test_mix_alpha_weighted() {
        let rgba = space("rgba-u8");
        let red = [255u8, 0, 0, 255];
        let clear_blue = [0u8, 0, 255, 0];
        let mut out = [0u8; 4];
        rgba.mix_colors(&[&red[..], &clear_blue[..]], &[128, 127], &mut out);
        // Transparent pixels do not tint the result.
        assert_eq!(&out[..3], &[255, 0, 0]);
        assert_eq!(out[3], 128);
    }

    #[test]
    fn test_mix_u16() {
        let gray = space("graya-u16");
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        40000u16.write(&mut a[0..]);
        65535u16.write(&mut a[2..]);
        b.copy_from_slice(&a);
        let mut out = [0u8; 4];
        gray.mix_colors_uniform(&[&a[..], &b[..]], &mut out);
        assert_eq!(u16::read(&out[0..]), 40000);
        assert_eq!(u16::read(&out[2..]), 65535);
    }

    #[test]
    fn test_rgba8_roundtrip() {
        let rgba16 = space("rgba-u16");
        let src = [10u8, 128, 250, 77];
        let mut wide = [0u8; 8];
        rgba16.from_rgba8(&src, &mut wide, 1);
        let mut back = [0u8; 4];
        rgba16.to_rgba8(&wide, &mut back, 1);
        assert_eq!(back, src);
    }

    #[test]
    fn test_cmyk_display() {
        let cmyk = space("cmyka-u8");
        let mut px = [0u8; 5];
        cmyk.from_rgba8(&[255, 0, 0, 255], &mut px, 1);
        assert_eq!(px, [0, 255, 255, 0, 255]);
        let mut rgba = [0u8; 4];
        cmyk.to_rgba8(&px, &mut rgba, 1);
        assert_eq!(rgba, [255, 0, 0, 255]);
    }

    #[test]
    fn test_convert_depth_and_model() {
        let rgba8 = space("rgba-u8");
        let rgba16 = space("rgba-u16");
        let gray8 = space("graya-u8");
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 8];
        assert!(rgba8.convert_pixels_to(&rgba16, &src, &mut dst, 1, None).unwrap());
        assert_eq!(u16::read(&dst[4..]), 3 * 257);

        let mut untouched = [9u8; 2];
        assert!(!rgba8.convert_pixels_to(&gray8, &src, &mut untouched, 1, None).unwrap());
        assert_eq!(untouched, [9, 9]);
    }

    #[test]
    fn test_convert_with_transform() {
        struct ToGray;
        impl ColorTransform for ToGray {
            fn transform(&self, _: &ColorSpace, src: &[u8], _: &ColorSpace, dst: &mut [u8], count: usize) -> Result<()> {
                for i in 0..count {
                    dst[i * 2] = src[i * 4 + 1];
                    dst[i * 2 + 1] = src[i * 4 + 3];
                }
                Ok(())
            }
        }
        let rgba8 = space("rgba-u8");
        let gray8 = space("graya-u8");
        let mut dst = [0u8; 2];
        assert!(rgba8.convert_pixels_to(&gray8, &[0, 99, 0, 200], &mut dst, 1, Some(&ToGray)).unwrap());
        assert_eq!(dst, [99, 200]);
    }

    #[test]
    fn test_custom_op_registration() {
        #[derive(Debug)]
        struct Invert;
        impl CompositeOp for Invert {
            fn id(&self) -> &str {
                "invert"
            }
            fn composite(&self, _: &[u8], dst: &mut [u8], n: usize, _: &CompositeParams<'_>) {
                for v in dst.iter_mut().take(n * 2) {
                    *v = 255 - *v;
                }
            }
        }
        let space = ColorSpaceBuilder::new(ColorModel::GrayA, ChannelType::U8)
            .with_op(Arc::new(Invert))
            .build();
        let op = space.composite_op("invert").unwrap();
        assert_eq!(op.category(), CompositeCategory::Custom);
        let mut dst = [0u8, 255];
        op.composite(&[0, 0], &mut dst, 1, &CompositeParams::default());
        assert_eq!(dst, [255, 0]);
        assert_eq!(space.composite_op_ids().last(), Some("invert"));
    }

    #[test]
    fn test_compatibility() {
        let a = space("rgba-u8");
        let b = ColorSpace::builtin(ColorModel::Rgba, ChannelType::U8);
        assert!(a.is_compatible(&b));
        assert_ne!(*a, *space("rgba-u16"));
    }
}
