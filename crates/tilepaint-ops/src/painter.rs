//! Device-to-device compositing.
//!
//! A [`Painter`] blends a source (another device or a solid color) into a
//! destination device, one scanline at a time, through a composite op of
//! the destination's color space. An optional `alpha-u8` mask device scales
//! opacity per pixel.
//!
//! Source rows are read into a scratch buffer, so source and destination
//! never alias, and destination tiles are only allocated for rows the
//! composite actually touches.
//!
//! ```rust
//! use tilepaint_core::{ColorSpaceRegistry, Rect};
//! use tilepaint_ops::Painter;
//! use tilepaint_store::PaintDevice;
//!
//! let rgba = ColorSpaceRegistry::with_builtins().get("rgba-u8").unwrap();
//! let mut dst = PaintDevice::new(rgba.clone());
//! let mut src = PaintDevice::new(rgba);
//! dst.fill(Rect::new(0, 0, 8, 8), &[255, 0, 0, 255]).unwrap();
//! src.fill(Rect::new(0, 0, 8, 8), &[0, 0, 255, 255]).unwrap();
//!
//! let done = Painter::new(&mut dst)
//!     .opacity(0.5)
//!     .bit_blt(&src, Rect::new(0, 0, 8, 8), None)
//!     .unwrap();
//! assert!(done.is_finished());
//! assert_eq!(dst.pixel(3, 3), &[127, 0, 128, 255]);
//! ```

use crate::error::OpsResult;
use std::sync::Arc;
use tilepaint_core::composite::ids;
use tilepaint_core::{ChannelFlags, CompositeOp, CompositeParams, Error, Rect};
use tilepaint_store::{CancellationToken, Checkpoint, Completion, PaintDevice};
use tracing::{debug, trace};

/// Where source rows come from.
#[derive(Clone, Copy)]
enum Source<'s> {
    Device(&'s PaintDevice),
    Solid(&'s [u8]),
}

/// Compositing session against one destination device.
pub struct Painter<'a> {
    dst: &'a mut PaintDevice,
    op_id: String,
    opacity: f32,
    flags: ChannelFlags,
    cancel: Option<&'a CancellationToken>,
    check_rows: u32,
}

impl<'a> Painter<'a> {
    /// Painter using `over` at full opacity on every channel.
    pub fn new(dst: &'a mut PaintDevice) -> Self {
        Self {
            dst,
            op_id: ids::OVER.to_string(),
            opacity: 1.0,
            flags: ChannelFlags::all(),
            cancel: None,
            check_rows: 1,
        }
    }

    /// Composite op by id. Unknown ids fall back to `over` when used.
    pub fn op(mut self, id: impl Into<String>) -> Self {
        self.op_id = id.into();
        self
    }

    /// Opacity, clamped to [0, 1].
    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Channels the op may write.
    pub fn channel_flags(mut self, flags: ChannelFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Polls `token` before the first scanline, then every `rows` scanlines.
    pub fn cancel_with(mut self, token: &'a CancellationToken, rows: u32) -> Self {
        self.cancel = Some(token);
        self.check_rows = rows.max(1);
        self
    }

    /// The destination device.
    pub fn device(&self) -> &PaintDevice {
        self.dst
    }

    fn resolve_op(&self) -> Arc<dyn CompositeOp> {
        self.dst.color_space().composite_op_or_over(&self.op_id)
    }

    /// Composites `rect` of `src` onto the same canvas rect of the
    /// destination.
    ///
    /// Source and destination must share a color space; `mask`, if given,
    /// must be a one-byte-per-pixel (`alpha-u8`) device.
    pub fn bit_blt(&mut self, src: &PaintDevice, rect: Rect, mask: Option<&PaintDevice>) -> OpsResult<Completion<()>> {
        let dst_space = self.dst.color_space();
        if !dst_space.is_compatible(src.color_space()) {
            return Err(Error::color_space_mismatch(src.color_space().id(), dst_space.id()).into());
        }
        let op = self.resolve_op();
        // Only the source's painted extent can change the destination.
        let rect = if op.transparent_source_is_noop() && src.default_pixel().iter().all(|&b| b == 0) {
            rect.intersect(&src.extent()).unwrap_or_default()
        } else {
            rect
        };
        self.composite(Source::Device(src), rect, mask, op)
    }

    /// Composites a solid `pixel` over `rect`, scaled by `mask`.
    pub fn fill_rect_with_mask(&mut self, rect: Rect, pixel: &[u8], mask: Option<&PaintDevice>) -> OpsResult<Completion<()>> {
        let ps = self.dst.pixel_size();
        if pixel.len() != ps {
            return Err(Error::buffer_too_small(ps, pixel.len()).into());
        }
        let op = self.resolve_op();
        self.composite(Source::Solid(pixel), rect, mask, op)
    }

    fn composite(
        &mut self,
        source: Source<'_>,
        rect: Rect,
        mask: Option<&PaintDevice>,
        op: Arc<dyn CompositeOp>,
    ) -> OpsResult<Completion<()>> {
        if let Some(m) = mask {
            if m.pixel_size() != 1 {
                return Err(Error::color_space_mismatch(m.color_space().id(), "alpha-u8").into());
            }
        }
        let Some(rect) = self.dst.clip(rect) else {
            return Ok(Completion::Finished(()));
        };
        if self.opacity <= 0.0 {
            return Ok(Completion::Finished(()));
        }

        let ps = self.dst.pixel_size();
        let width = rect.width as usize;
        let mut src_row = vec![0u8; width * ps];
        if let Source::Solid(pixel) = source {
            for px in src_row.chunks_exact_mut(ps) {
                px.copy_from_slice(pixel);
            }
        }
        let mut mask_row = vec![0u8; if mask.is_some() { width } else { 0 }];

        let idle = CancellationToken::new();
        let mut checkpoint = Checkpoint::new(self.cancel.unwrap_or(&idle), self.check_rows);
        let (opacity, flags) = (self.opacity, self.flags);

        if checkpoint.stop_requested() {
            debug!(device = %self.dst.id(), row = rect.y, op = op.id(), "composite interrupted");
            return Ok(Completion::Interrupted(()));
        }
        for y in rect.rows() {
            let row = Rect::new(rect.x, y, rect.width, 1);
            if let Source::Device(src) = source {
                src.read_bytes(row, &mut src_row)?;
            }
            if let Some(m) = mask {
                m.read_bytes(row, &mut mask_row)?;
                if mask_row.iter().all(|&v| v == 0) {
                    checkpoint.row_done();
                    continue;
                }
            }
            self.dst.for_each_span_mut(row, |x, _, span| {
                let start = (x - rect.x) as usize;
                let n = span.len() / ps;
                let mut params = CompositeParams::new(opacity).with_flags(flags);
                if mask.is_some() {
                    params = params.with_mask(&mask_row[start..start + n]);
                }
                op.composite(&src_row[start * ps..(start + n) * ps], span, n, &params);
            })?;
            if checkpoint.row_done() && y + 1 < rect.bottom() {
                debug!(device = %self.dst.id(), row = y, op = op.id(), "composite interrupted");
                return Ok(Completion::Interrupted(()));
            }
        }
        trace!(device = %self.dst.id(), %rect, op = op.id(), opacity, "composited");
        Ok(Completion::Finished(()))
    }
}
