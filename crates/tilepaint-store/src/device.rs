//! The paint device: an unbounded canvas over a sparse tile store.
//!
//! A device pairs a [`TileStore`] with an origin offset. Canvas coordinates
//! and store coordinates differ by that offset:
//!
//! ```text
//! canvas = store + offset
//! ```
//!
//! so [`PaintDevice::move_to`] relocates the content without touching a
//! single tile.
//!
//! Geometry is forgiving: empty rectangles are no-ops and rectangles
//! reaching past the addressable range are clipped silently. Errors are
//! reported per operation (a fill, an iterator construction), never per
//! pixel, and only for resource exhaustion or misuse such as a wrongly
//! sized pixel buffer.
//!
//! # Example
//!
//! ```rust
//! use tilepaint_core::{ColorSpaceRegistry, Rect};
//! use tilepaint_store::PaintDevice;
//!
//! let registry = ColorSpaceRegistry::with_builtins();
//! let mut dev = PaintDevice::new(registry.get("rgba-u8").unwrap());
//! assert!(dev.extent().is_empty());
//!
//! dev.fill(Rect::new(10, 10, 20, 20), &[255, 0, 0, 255]).unwrap();
//! assert_eq!(dev.pixel(15, 15), &[255, 0, 0, 255]);
//! assert_eq!(dev.pixel(0, 0), &[0, 0, 0, 0]);
//! assert_eq!(dev.extent(), Rect::new(0, 0, 64, 64));
//! assert_eq!(dev.exact_bounds(), Rect::new(10, 10, 20, 20));
//! ```

use crate::budget::TileBudget;
use crate::cancel::{Checkpoint, Completion};
use crate::iter::{HLineIter, HLineIterMut, RectIter, RectIterMut};
use crate::store::TileStore;
use crate::tile::{pixel_offset, TileCoord};
use crate::transaction::Transaction;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tilepaint_core::{ColorSpace, ColorTransform, Error, Rect, Result, COORD_LIMIT, TILE_SIZE};
use tracing::{debug, trace};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique device identity. Copies made with
/// [`PaintDevice::try_clone`] get a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

impl DeviceId {
    fn next() -> Self {
        Self(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev#{}", self.0)
    }
}

/// A canvas: tile store, origin offset and color space.
pub struct PaintDevice {
    id: DeviceId,
    store: TileStore,
    offset: (i32, i32),
    /// Offset at `begin_transaction`, while one is open.
    tx_offset: Option<(i32, i32)>,
}

impl PaintDevice {
    /// Empty device with an unlimited tile budget.
    pub fn new(space: Arc<ColorSpace>) -> Self {
        Self::from_store(TileStore::new(space))
    }

    /// Empty device drawing tiles from a shared budget.
    pub fn with_budget(space: Arc<ColorSpace>, budget: Arc<TileBudget>) -> Self {
        Self::from_store(TileStore::with_budget(space, budget))
    }

    fn from_store(store: TileStore) -> Self {
        Self {
            id: DeviceId::next(),
            store,
            offset: (0, 0),
            tx_offset: None,
        }
    }

    /// Device identity.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Color space of the pixel data.
    pub fn color_space(&self) -> &Arc<ColorSpace> {
        self.store.color_space()
    }

    /// Bytes per pixel.
    #[inline]
    pub fn pixel_size(&self) -> usize {
        self.store.color_space().pixel_size()
    }

    /// Value every never-written pixel reads as.
    pub fn default_pixel(&self) -> &[u8] {
        self.store.color_space().default_pixel()
    }

    /// The backing tile store.
    pub fn tile_store(&self) -> &TileStore {
        &self.store
    }

    /// The backing tile store, mutable.
    pub fn tile_store_mut(&mut self) -> &mut TileStore {
        &mut self.store
    }

    /// Canvas position of store coordinate (0, 0).
    pub fn offset(&self) -> (i32, i32) {
        self.offset
    }

    /// Moves the content so store (0, 0) lands on canvas (x, y).
    ///
    /// The offset is clamped to the addressable range.
    pub fn move_to(&mut self, x: i32, y: i32) {
        self.offset = (x.clamp(-COORD_LIMIT, COORD_LIMIT), y.clamp(-COORD_LIMIT, COORD_LIMIT));
    }

    /// Part of `rect` this device can address, or `None`.
    pub fn clip(&self, rect: Rect) -> Option<Rect> {
        let reachable = Rect::addressable().translated(self.offset.0, self.offset.1);
        rect.clipped()?.intersect(&reachable)
    }

    fn to_store(&self, x: i32, y: i32) -> Option<(i32, i32)> {
        let sx = x.checked_sub(self.offset.0)?;
        let sy = y.checked_sub(self.offset.1)?;
        Rect::addressable().contains(sx, sy).then_some((sx, sy))
    }

    fn check_pixel(&self, bytes: &[u8]) -> Result<()> {
        let ps = self.pixel_size();
        if bytes.len() != ps {
            return Err(Error::buffer_too_small(ps, bytes.len()));
        }
        Ok(())
    }

    /// Raw bytes of the pixel at canvas (x, y). Never allocates.
    pub fn pixel(&self, x: i32, y: i32) -> &[u8] {
        let Some((sx, sy)) = self.to_store(x, y) else {
            return self.default_pixel();
        };
        let (coord, ox, oy) = TileCoord::containing(sx, sy);
        let at = pixel_offset(ox, oy, self.pixel_size());
        &self.store.tile_at(coord)[at..at + self.pixel_size()]
    }

    /// Overwrites one pixel. Points outside the addressable range are
    /// ignored.
    pub fn set_pixel(&mut self, x: i32, y: i32, bytes: &[u8]) -> Result<()> {
        self.check_pixel(bytes)?;
        let Some((sx, sy)) = self.to_store(x, y) else {
            return Ok(());
        };
        let (coord, ox, oy) = TileCoord::containing(sx, sy);
        self.store
            .writable_tile_at(coord)?
            .pixel_mut(ox, oy)
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Conservative bounds of the content in canvas coordinates: every
    /// allocated tile, whole.
    pub fn extent(&self) -> Rect {
        Rect::from_tile_rect(&self.store.extent_in_tiles(), TILE_SIZE)
            .translated(self.offset.0, self.offset.1)
    }

    /// Tight bounds of pixels that differ from the default pixel.
    ///
    /// Scans every allocated tile.
    pub fn exact_bounds(&self) -> Rect {
        let default = self.default_pixel();
        let ps = self.pixel_size();
        let side = TILE_SIZE as usize;
        let mut bounds = Rect::default();
        for (coord, tile) in self.store.iter() {
            if tile.is_filled_with(default) {
                continue;
            }
            let (mut x0, mut y0, mut x1, mut y1) = (side, side, 0, 0);
            for (i, px) in tile.data().chunks_exact(ps).enumerate() {
                if px != default {
                    let (ox, oy) = (i % side, i / side);
                    x0 = x0.min(ox);
                    x1 = x1.max(ox + 1);
                    y0 = y0.min(oy);
                    y1 = y1.max(oy + 1);
                }
            }
            let found = Rect::new(
                coord.left() + x0 as i32,
                coord.top() + y0 as i32,
                (x1 - x0) as i32,
                (y1 - y0) as i32,
            );
            bounds = bounds.union(&found);
        }
        bounds.translated(self.offset.0, self.offset.1)
    }

    /// Read cursor over one row starting at (x, y), `width` pixels long.
    pub fn hline_iter(&self, x: i32, y: i32, width: i32) -> HLineIter<'_> {
        let rect = self.clip(Rect::new(x, y, width, 1)).unwrap_or_default();
        HLineIter::new(&self.store, rect, self.offset)
    }

    /// Read cursor over a rectangle. Never allocates.
    pub fn rect_iter(&self, rect: Rect) -> RectIter<'_> {
        let rect = self.clip(rect).unwrap_or_default();
        RectIter::new(&self.store, rect, self.offset)
    }

    /// Write cursor over one row. Tiles are allocated as they are written.
    pub fn hline_iter_mut(&mut self, x: i32, y: i32, width: i32) -> HLineIterMut<'_> {
        let rect = self.clip(Rect::new(x, y, width, 1)).unwrap_or_default();
        HLineIterMut::new(&mut self.store, rect, self.offset)
    }

    /// Write cursor over a rectangle. Tiles are allocated as they are written.
    pub fn rect_iter_mut(&mut self, rect: Rect) -> RectIterMut<'_> {
        let rect = self.clip(rect).unwrap_or_default();
        RectIterMut::new(&mut self.store, rect, self.offset)
    }

    /// Calls `f(x, y, bytes)` for every contiguous intra-tile run of `rect`,
    /// row by row. `x`, `y` are the canvas position of the run's first pixel.
    pub fn for_each_span(&self, rect: Rect, mut f: impl FnMut(i32, i32, &[u8])) {
        let mut it = self.rect_iter(rect);
        while !it.is_done() {
            let n = it.n_conseq_pixels();
            f(it.x(), it.y(), it.span());
            it.next_pixels(n);
        }
    }

    /// Writable variant of [`for_each_span`](Self::for_each_span).
    pub fn for_each_span_mut(&mut self, rect: Rect, mut f: impl FnMut(i32, i32, &mut [u8])) -> Result<()> {
        let mut it = self.rect_iter_mut(rect);
        while !it.is_done() {
            let n = it.n_conseq_pixels();
            let (x, y) = (it.x(), it.y());
            f(x, y, it.span_mut()?);
            it.next_pixels(n);
        }
        Ok(())
    }

    /// Fills `rect` with one pixel value.
    pub fn fill(&mut self, rect: Rect, pixel: &[u8]) -> Result<()> {
        self.check_pixel(pixel)?;
        self.for_each_span_mut(rect, |_, _, span| {
            for px in span.chunks_exact_mut(pixel.len()) {
                px.copy_from_slice(pixel);
            }
        })?;
        trace!(device = %self.id, %rect, "filled");
        Ok(())
    }

    /// Fills `rect` row by row, polling `checkpoint` before the first row
    /// and then at its interval.
    ///
    /// Tiles are allocated as rows reach them; an interrupted fill leaves
    /// every written row complete.
    pub fn fill_cancellable(&mut self, rect: Rect, pixel: &[u8], checkpoint: &mut Checkpoint<'_>) -> Result<Completion<()>> {
        self.check_pixel(pixel)?;
        let Some(rect) = self.clip(rect) else {
            return Ok(Completion::Finished(()));
        };
        if checkpoint.stop_requested() {
            debug!(device = %self.id, row = rect.y, "fill interrupted");
            return Ok(Completion::Interrupted(()));
        }
        for y in rect.rows() {
            let mut it = self.hline_iter_mut(rect.x, y, rect.width);
            while !it.is_done() {
                let n = it.n_conseq_pixels();
                for px in it.span_mut()?.chunks_exact_mut(pixel.len()) {
                    px.copy_from_slice(pixel);
                }
                it.next_pixels(n);
            }
            if checkpoint.row_done() && y + 1 < rect.bottom() {
                debug!(device = %self.id, row = y, "fill interrupted");
                return Ok(Completion::Interrupted(()));
            }
        }
        Ok(Completion::Finished(()))
    }

    /// Resets `rect` to the default pixel.
    ///
    /// Only allocated tiles are written; tiles stay allocated.
    pub fn clear(&mut self, rect: Rect) -> Result<()> {
        let Some(rect) = self.clip(rect) else {
            return Ok(());
        };
        let local = rect.translated(-self.offset.0, -self.offset.1);
        let default = self.store.color_space().default_pixel().to_vec();
        let coords: Vec<TileCoord> = self
            .store
            .iter_in(local.to_tile_rect(TILE_SIZE))
            .map(|(c, _)| c)
            .collect();
        for coord in coords {
            let tile_px = Rect::new(coord.left(), coord.top(), TILE_SIZE, TILE_SIZE);
            let Some(part) = tile_px.intersect(&local) else {
                continue;
            };
            let tile = self.store.writable_tile_at(coord)?;
            fill_tile_part(tile.data_mut(), part.translated(-coord.left(), -coord.top()), &default);
        }
        trace!(device = %self.id, %rect, "cleared");
        Ok(())
    }

    /// Frees every tile. The device reads as default everywhere.
    pub fn clear_all(&mut self) -> usize {
        self.store.clear_all()
    }

    /// Copies `rect` into `buf`, row-major and tightly packed.
    ///
    /// Pixels outside the addressable range read as the default pixel.
    pub fn read_bytes(&self, rect: Rect, buf: &mut [u8]) -> Result<()> {
        if rect.is_empty() {
            return Ok(());
        }
        let ps = self.pixel_size();
        let stride = rect.width as usize * ps;
        let need = stride * rect.height as usize;
        if buf.len() < need {
            return Err(Error::buffer_too_small(need, buf.len()));
        }
        let Some(inside) = self.clip(rect) else {
            fill_pixels(&mut buf[..need], self.default_pixel());
            return Ok(());
        };
        if inside != rect {
            fill_pixels(&mut buf[..need], self.default_pixel());
        }
        self.for_each_span(inside, |x, y, span| {
            let at = (y - rect.y) as usize * stride + (x - rect.x) as usize * ps;
            buf[at..at + span.len()].copy_from_slice(span);
        });
        Ok(())
    }

    /// Writes `buf` (row-major, tightly packed) into `rect`.
    ///
    /// The part of `rect` outside the addressable range is skipped.
    pub fn write_bytes(&mut self, rect: Rect, buf: &[u8]) -> Result<()> {
        if rect.is_empty() {
            return Ok(());
        }
        let ps = self.pixel_size();
        let stride = rect.width as usize * ps;
        let need = stride * rect.height as usize;
        if buf.len() < need {
            return Err(Error::buffer_too_small(need, buf.len()));
        }
        let Some(inside) = self.clip(rect) else {
            return Ok(());
        };
        self.for_each_span_mut(inside, |x, y, span| {
            let at = (y - rect.y) as usize * stride + (x - rect.x) as usize * ps;
            span.copy_from_slice(&buf[at..at + span.len()]);
        })
    }

    /// Keeps only `rect`: tiles wholly outside are freed, the outside part
    /// of straddling tiles is reset to default.
    pub fn crop(&mut self, rect: Rect) -> Result<()> {
        let Some(rect) = self.clip(rect) else {
            let freed = self.store.clear_all();
            debug!(device = %self.id, freed, "cropped to nothing");
            return Ok(());
        };
        let local = rect.translated(-self.offset.0, -self.offset.1);
        let keep = local.to_tile_rect(TILE_SIZE);
        let freed = self.store.retain(|c| keep.contains(c.tx, c.ty));

        let default = self.store.color_space().default_pixel().to_vec();
        let straddling: Vec<TileCoord> = self
            .store
            .coords()
            .filter(|c| !local.contains_rect(&Rect::new(c.left(), c.top(), TILE_SIZE, TILE_SIZE)))
            .collect();
        for coord in &straddling {
            let tile_px = Rect::new(coord.left(), coord.top(), TILE_SIZE, TILE_SIZE);
            let inside = tile_px
                .intersect(&local)
                .map(|r| r.translated(-coord.left(), -coord.top()))
                .unwrap_or_default();
            let tile = self.store.writable_tile_at(*coord)?;
            for band in outside_bands(Rect::from_size(TILE_SIZE, TILE_SIZE), inside) {
                fill_tile_part(tile.data_mut(), band, &default);
            }
        }
        debug!(device = %self.id, %rect, freed, trimmed = straddling.len(), "cropped");
        Ok(())
    }

    /// Re-encodes the device in `space`.
    ///
    /// Returns `Ok(false)`, device unchanged, when the models differ and no
    /// transform is given.
    pub fn convert_to(&mut self, space: Arc<ColorSpace>, transform: Option<&dyn ColorTransform>) -> Result<bool> {
        self.store.convert_to(space, transform)
    }

    /// Fallible deep copy with a new id, sharing the tile budget.
    pub fn try_clone(&self) -> Result<PaintDevice> {
        let mut copy = Self::from_store(self.store.try_clone()?);
        copy.offset = self.offset;
        Ok(copy)
    }

    /// Starts recording prior tile state for undo.
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.store.begin_journal()?;
        self.tx_offset = Some(self.offset);
        trace!(device = %self.id, "transaction opened");
        Ok(())
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.store.is_journaling()
    }

    /// Closes the open transaction and hands back its memento.
    pub fn commit_transaction(&mut self) -> Option<Transaction> {
        let journal = self.store.take_journal()?;
        let offset = self.tx_offset.take().unwrap_or(self.offset);
        let tx = Transaction {
            space_id: self.color_space().id().to_string(),
            journal,
            offset,
        };
        debug!(device = %self.id, tiles = tx.len(), "transaction committed");
        Some(tx)
    }

    /// Closes the open transaction and puts everything it touched back.
    pub fn abort_transaction(&mut self) -> Result<()> {
        if let Some(tx) = self.commit_transaction() {
            self.revert(tx)?;
        }
        Ok(())
    }

    /// Restores the state recorded by `tx`, bit for bit, including freeing
    /// tiles `tx` allocated. Returns the inverse transaction for redo.
    pub fn revert(&mut self, tx: Transaction) -> Result<Transaction> {
        if self.in_transaction() {
            return Err(Error::other("cannot revert while a transaction is open"));
        }
        if tx.space_id != self.color_space().id() {
            return Err(Error::color_space_mismatch(tx.space_id, self.color_space().id()));
        }
        let redo = self.store.restore(tx.journal);
        let current = std::mem::replace(&mut self.offset, tx.offset);
        debug!(device = %self.id, tiles = redo.entries.len(), "transaction reverted");
        Ok(Transaction {
            space_id: tx.space_id,
            journal: redo,
            offset: current,
        })
    }
}

impl fmt::Debug for PaintDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaintDevice")
            .field("id", &self.id)
            .field("space", &self.color_space().id())
            .field("offset", &self.offset)
            .field("tiles", &self.store.tile_count())
            .finish()
    }
}

/// Writes `pixel` over every pixel of `buf`.
fn fill_pixels(buf: &mut [u8], pixel: &[u8]) {
    for px in buf.chunks_exact_mut(pixel.len()) {
        px.copy_from_slice(pixel);
    }
}

/// Writes `pixel` over `part` (tile-local pixels) of a tile buffer.
fn fill_tile_part(data: &mut [u8], part: Rect, pixel: &[u8]) {
    if part.is_empty() {
        return;
    }
    let ps = pixel.len();
    for oy in part.rows() {
        let start = pixel_offset(part.x as usize, oy as usize, ps);
        fill_pixels(&mut data[start..start + part.width as usize * ps], pixel);
    }
}

/// Up to four rectangles covering `outer` minus `inner`.
fn outside_bands(outer: Rect, inner: Rect) -> Vec<Rect> {
    let Some(inner) = inner.intersect(&outer) else {
        return vec![outer];
    };
    [
        Rect::new(outer.x, outer.y, outer.width, inner.y - outer.y),
        Rect::new(outer.x, inner.bottom(), outer.width, outer.bottom() - inner.bottom()),
        Rect::new(outer.x, inner.y, inner.x - outer.x, inner.height),
        Rect::new(inner.right(), inner.y, outer.right() - inner.right(), inner.height),
    ]
    .into_iter()
    .filter(|r| !r.is_empty())
    .collect()
}
