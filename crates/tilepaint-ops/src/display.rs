//! 8-bit RGBA rendering for display.
//!
//! This is the only place device content leaves its color space for a
//! screen. The conversion is lossy: deep channels are rounded to 8 bits and
//! models other than RGBA are mapped by [`ColorSpace::to_rgba8`] unless a
//! [`ColorTransform`] is supplied.

use crate::error::OpsResult;
use tilepaint_core::{ChannelType, ColorModel, ColorSpace, ColorTransform, Rect};
use tilepaint_store::PaintDevice;
use tracing::{trace, warn};

/// Tightly packed RGBA8 pixels of a canvas rect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Canvas rect rendered.
    pub rect: Rect,
    /// Row-major RGBA8 bytes.
    pub pixels: Vec<u8>,
}

impl DisplayImage {
    /// Pixel at image coordinates `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let at = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[at..at + 4]);
        px
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }
}

/// Renders `rect` of `device` to RGBA8.
///
/// With `transform`, pixels go through it into `rgba-u8`; a device whose
/// model the transform cannot reach falls back to the builtin mapping.
/// Absent tiles render as the default pixel. An empty rect yields an empty
/// image.
///
/// ```rust
/// use tilepaint_core::{ColorSpaceRegistry, Rect};
/// use tilepaint_ops::display::convert_to_rgba8;
/// use tilepaint_store::PaintDevice;
///
/// let gray = ColorSpaceRegistry::with_builtins().get("graya-u16").unwrap();
/// let mut dev = PaintDevice::new(gray);
/// dev.set_pixel(1, 0, &65535u16.to_ne_bytes().repeat(2)).unwrap();
///
/// let img = convert_to_rgba8(&dev, Rect::new(0, 0, 2, 1), None).unwrap();
/// assert_eq!(img.pixel(0, 0), [0, 0, 0, 0]);
/// assert_eq!(img.pixel(1, 0), [255, 255, 255, 255]);
/// ```
pub fn convert_to_rgba8(
    device: &PaintDevice,
    rect: Rect,
    transform: Option<&dyn ColorTransform>,
) -> OpsResult<DisplayImage> {
    if rect.is_empty() {
        return Ok(DisplayImage {
            width: 0,
            height: 0,
            rect,
            pixels: Vec::new(),
        });
    }
    let space = device.color_space();
    let rgba8 = ColorSpace::builtin(ColorModel::Rgba, ChannelType::U8);
    let ps = space.pixel_size();
    let width = rect.width as usize;
    let mut row = vec![0u8; width * ps];
    let mut pixels = vec![0u8; rect.area() as usize * 4];
    let mut fallback_logged = false;

    for (i, y) in rect.rows().enumerate() {
        device.read_bytes(Rect::new(rect.x, y, rect.width, 1), &mut row)?;
        let out = &mut pixels[i * width * 4..(i + 1) * width * 4];
        let converted = match transform {
            Some(t) => space.convert_pixels_to(&rgba8, &row, out, width, Some(t))?,
            None => false,
        };
        if !converted {
            if transform.is_some() && !fallback_logged {
                warn!(space = %space.id(), "display transform unavailable, using builtin mapping");
                fallback_logged = true;
            }
            space.to_rgba8(&row, out, width);
        }
    }
    trace!(device = %device.id(), %rect, "rendered for display");
    Ok(DisplayImage {
        width: rect.width as u32,
        height: rect.height as u32,
        rect,
        pixels,
    })
}
