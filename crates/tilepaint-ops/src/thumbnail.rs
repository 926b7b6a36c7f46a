//! Downsampled preview devices.
//!
//! Each thumbnail pixel is the average of the source area it covers.
//! Absent source tiles take part as the default pixel, so edges fade
//! to transparent instead of being skipped. With `oversample = Some(n)`
//! only an `n x n` grid of samples per area is averaged.

use crate::error::OpsResult;
use std::sync::Arc;
use tilepaint_core::{Error, Rect};
use tilepaint_store::{CancellationToken, Checkpoint, Completion, PaintDevice};
use tracing::debug;

/// Half-open span `[start, end)` of source coordinates for output index `i`.
fn area_span(origin: i32, extent: i32, out: u32, i: u32) -> (i32, i32) {
    let (origin, extent, out, i) = (origin as i64, extent as i64, out as i64, i as i64);
    let start = origin + i * extent / out;
    let end = (origin + (i + 1) * extent / out).max(start + 1);
    (start as i32, end as i32)
}

/// Sample positions inside `[start, end)`.
fn samples(start: i32, end: i32, oversample: Option<u32>) -> Vec<i32> {
    match oversample {
        None => (start..end).collect(),
        Some(n) => {
            let n = n.max(1) as i64;
            let len = (end - start) as i64;
            let mut picks: Vec<i32> = (0..n)
                .map(|k| start + ((2 * k + 1) * len / (2 * n)) as i32)
                .collect();
            picks.dedup();
            picks
        }
    }
}

/// Builds a `width x height` device averaging `rect` of `src`.
///
/// The result shares the source's color space and tile budget, with
/// content at `(0, 0)`. Rows are produced top to bottom; a cancelled run
/// returns the rows finished so far.
///
/// ```rust
/// use tilepaint_core::{ColorSpaceRegistry, Rect};
/// use tilepaint_ops::thumbnail::create_thumbnail_device;
/// use tilepaint_store::PaintDevice;
///
/// let rgba = ColorSpaceRegistry::with_builtins().get("rgba-u8").unwrap();
/// let mut src = PaintDevice::new(rgba);
/// src.fill(Rect::new(0, 0, 64, 128), &[255, 0, 0, 255]).unwrap();
///
/// let thumb = create_thumbnail_device(&src, 2, 1, Rect::new(0, 0, 128, 128), None, None)
///     .unwrap()
///     .into_inner();
/// assert_eq!(thumb.pixel(0, 0), &[255, 0, 0, 255]);
/// assert_eq!(thumb.pixel(1, 0), &[0, 0, 0, 0]);
/// ```
pub fn create_thumbnail_device(
    src: &PaintDevice,
    width: u32,
    height: u32,
    rect: Rect,
    oversample: Option<u32>,
    cancel: Option<&CancellationToken>,
) -> OpsResult<Completion<PaintDevice>> {
    let space = Arc::clone(src.color_space());
    let mut thumb = PaintDevice::with_budget(Arc::clone(&space), Arc::clone(src.tile_store().budget()));
    if width == 0 || height == 0 || rect.is_empty() {
        return Ok(Completion::Finished(thumb));
    }
    if width > i32::MAX as u32 || height > i32::MAX as u32 {
        return Err(Error::invalid_dimensions(width, height, "thumbnail too large").into());
    }

    let ps = space.pixel_size();
    let idle = CancellationToken::new();
    let mut checkpoint = Checkpoint::new(cancel.unwrap_or(&idle), 1);
    let columns: Vec<Vec<i32>> = (0..width)
        .map(|tx| {
            let (x0, x1) = area_span(rect.x, rect.width, width, tx);
            samples(x0, x1, oversample)
        })
        .collect();
    let mut out_row = vec![0u8; width as usize * ps];
    let mut band = Vec::new();

    for ty in 0..height {
        if checkpoint.stop_requested() {
            debug!(device = %src.id(), row = ty, "thumbnail interrupted");
            return Ok(Completion::Interrupted(thumb));
        }
        let (y0, y1) = area_span(rect.y, rect.height, height, ty);
        let band_rect = Rect::new(rect.x, y0, rect.width, y1 - y0);
        band.resize(band_rect.area() as usize * ps, 0);
        src.read_bytes(band_rect, &mut band)?;
        let rows = samples(y0, y1, oversample);
        let stride = rect.width as usize * ps;

        let mut picked: Vec<&[u8]> = Vec::with_capacity(rows.len() * columns[0].len());
        for (tx, cols) in columns.iter().enumerate() {
            picked.clear();
            for &y in &rows {
                let row = &band[(y - y0) as usize * stride..][..stride];
                for &x in cols {
                    let at = (x - rect.x) as usize * ps;
                    picked.push(&row[at..at + ps]);
                }
            }
            space.mix_colors_uniform(&picked, &mut out_row[tx * ps..(tx + 1) * ps]);
        }
        thumb.write_bytes(Rect::new(0, ty as i32, width as i32, 1), &out_row)?;
        checkpoint.row_done();
    }
    debug!(device = %src.id(), width, height, %rect, "thumbnail built");
    Ok(Completion::Finished(thumb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tilepaint_core::pixel::read_normalized;
    use tilepaint_core::{ChannelType, ColorSpaceRegistry};

    fn space(id: &str) -> Arc<tilepaint_core::ColorSpace> {
        ColorSpaceRegistry::with_builtins().get(id).unwrap()
    }

    #[test]
    fn test_area_span_covers_source() {
        let spans: Vec<_> = (0..3).map(|i| area_span(-5, 10, 3, i)).collect();
        assert_eq!(spans, vec![(-5, -2), (-2, 1), (1, 5)]);
        // Upscaling still reads one pixel per output.
        assert_eq!(area_span(0, 2, 4, 3), (1, 2));
    }

    #[test]
    fn test_absent_tiles_fade_edges() {
        let mut src = PaintDevice::new(space("graya-u8"));
        src.fill(Rect::new(0, 0, 2, 1), &[255, 255]).unwrap();
        let thumb = create_thumbnail_device(&src, 1, 1, Rect::new(0, 0, 4, 1), None, None)
            .unwrap()
            .into_inner();
        let px = thumb.pixel(0, 0);
        assert_eq!(px[0], 255);
        assert!((127..=128).contains(&px[1]));
    }

    #[test]
    fn test_float_average_is_alpha_weighted() {
        let mut src = PaintDevice::new(space("graya-f32"));
        let px = |v: f32, a: f32| [v.to_ne_bytes(), a.to_ne_bytes()].concat();
        src.set_pixel(0, 0, &px(0.25, 1.0)).unwrap();
        src.set_pixel(1, 0, &px(0.75, 0.5)).unwrap();
        let thumb = create_thumbnail_device(&src, 1, 1, Rect::new(0, 0, 4, 1), None, None)
            .unwrap()
            .into_inner();
        let out = thumb.pixel(0, 0);
        assert_relative_eq!(read_normalized(ChannelType::F32, &out[4..]), 0.375, epsilon = 1e-6);
        // (0.25 * 1.0 + 0.75 * 0.5) / 1.5
        assert_relative_eq!(read_normalized(ChannelType::F32, out), 5.0 / 12.0, epsilon = 1e-6);
    }

    #[test]
    fn test_oversample_picks_centres() {
        let mut src = PaintDevice::new(space("graya-u8"));
        src.set_pixel(2, 2, &[77, 255]).unwrap();
        let thumb = create_thumbnail_device(&src, 1, 1, Rect::new(0, 0, 4, 4), Some(1), None)
            .unwrap()
            .into_inner();
        assert_eq!(thumb.pixel(0, 0), &[77, 255]);
    }

    #[test]
    fn test_degenerate_thumbnail_is_empty() {
        let src = PaintDevice::new(space("rgba-u8"));
        let thumb = create_thumbnail_device(&src, 0, 10, Rect::new(0, 0, 10, 10), None, None).unwrap();
        assert!(thumb.is_finished());
        assert_eq!(thumb.into_inner().tile_store().tile_count(), 0);
    }

    #[test]
    fn test_cancelled_thumbnail() {
        let src = PaintDevice::new(space("rgba-u8"));
        let token = CancellationToken::new();
        token.cancel();
        let thumb = create_thumbnail_device(&src, 4, 4, Rect::new(0, 0, 8, 8), None, Some(&token)).unwrap();
        assert!(thumb.is_interrupted());
    }
}
