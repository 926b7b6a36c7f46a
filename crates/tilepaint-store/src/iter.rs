//! Pixel cursors over a rectangular region of a tile store.
//!
//! Two families:
//!
//! - [`HLineIter`] / [`HLineIterMut`] walk one row,
//! - [`RectIter`] / [`RectIterMut`] walk a rectangle row by row.
//!
//! Cursors hide tile boundaries: crossing into the next tile re-resolves
//! the tile and intra-tile offset internally. Callers only observe the
//! coordinates reported by `x()` / `y()`, which are canvas coordinates.
//!
//! Read cursors never allocate. Write cursors allocate a tile the first
//! time a pixel in it is written; those writable accessors are the only
//! fallible step, and a failed allocation leaves the tile absent.
//!
//! Cursors are not restartable; build a new one to walk a region again.
//!
//! ```rust
//! use tilepaint_core::{ColorSpaceRegistry, Rect};
//! use tilepaint_store::PaintDevice;
//!
//! let space = ColorSpaceRegistry::with_builtins().get("graya-u8").unwrap();
//! let mut dev = PaintDevice::new(space);
//! {
//!     let mut it = dev.rect_iter_mut(Rect::new(60, 0, 8, 2));
//!     while !it.is_done() {
//!         let x = it.x() as u8;
//!         it.raw_data_mut().unwrap().copy_from_slice(&[x, 255]);
//!         it.next_pixel();
//!     }
//! }
//! assert_eq!(dev.pixel(63, 1), &[63, 255]);
//! assert_eq!(dev.pixel(64, 1), &[64, 255]);
//! ```

use crate::store::TileStore;
use crate::tile::{pixel_offset, split_coord, Tile, TileCoord};
use tilepaint_core::{Rect, Result, TILE_SIZE};

/// Cursor position shared by every iterator flavour.
#[derive(Debug, Clone, Copy)]
struct Walk {
    /// Region in canvas coordinates, already clipped.
    rect: Rect,
    /// Canvas minus store coordinates.
    offset: (i32, i32),
    pixel_size: usize,
    x: i32,
    y: i32,
    done: bool,
    /// Canvas x where the contiguous run in the current tile ends.
    run_end: i32,
    /// Byte offset of the current pixel in the current tile.
    pos: usize,
    coord: TileCoord,
}

impl Walk {
    fn new(rect: Rect, offset: (i32, i32), pixel_size: usize) -> Self {
        let mut walk = Self {
            rect,
            offset,
            pixel_size,
            x: rect.x,
            y: rect.y,
            done: rect.is_empty(),
            run_end: rect.x,
            pos: 0,
            coord: TileCoord::new(0, 0),
        };
        if !walk.done {
            walk.seek();
        }
        walk
    }

    fn seek(&mut self) {
        let (tx, ox) = split_coord(self.x - self.offset.0);
        let (ty, oy) = split_coord(self.y - self.offset.1);
        self.coord = TileCoord::new(tx, ty);
        self.pos = pixel_offset(ox, oy, self.pixel_size);
        self.run_end = (self.x + (TILE_SIZE - ox as i32)).min(self.rect.right());
    }

    /// Advances `n` pixels within the current run; returns `true` when a
    /// new tile (or row) was entered.
    fn advance(&mut self, n: usize) -> bool {
        if self.done {
            return false;
        }
        self.x += n as i32;
        if self.x >= self.rect.right() {
            self.next_row();
            true
        } else if self.x >= self.run_end {
            self.seek();
            true
        } else {
            self.pos += n * self.pixel_size;
            false
        }
    }

    fn next_row(&mut self) {
        self.y += 1;
        self.x = self.rect.x;
        if self.y >= self.rect.bottom() {
            self.done = true;
        } else {
            self.seek();
        }
    }

    #[inline]
    fn conseq(&self) -> usize {
        if self.done { 0 } else { (self.run_end - self.x) as usize }
    }
}

macro_rules! cursor_accessors {
    () => {
        /// Canvas x of the current pixel.
        #[inline]
        pub fn x(&self) -> i32 {
            self.walk.x
        }

        /// Canvas y of the current pixel.
        #[inline]
        pub fn y(&self) -> i32 {
            self.walk.y
        }

        /// Whether the walk is exhausted.
        #[inline]
        pub fn is_done(&self) -> bool {
            self.walk.done
        }

        /// Pixels left in the current contiguous run (same tile, same row).
        #[inline]
        pub fn n_conseq_pixels(&self) -> usize {
            self.walk.conseq()
        }

        /// The walked region, clipped.
        #[inline]
        pub fn rect(&self) -> Rect {
            self.walk.rect
        }
    };
}

/// Read cursor over a rectangle.
#[derive(Debug)]
pub struct RectIter<'a> {
    store: &'a TileStore,
    walk: Walk,
    tile: &'a [u8],
}

impl<'a> RectIter<'a> {
    /// Cursor over `rect` (canvas coordinates, already clipped).
    pub(crate) fn new(store: &'a TileStore, rect: Rect, offset: (i32, i32)) -> Self {
        let walk = Walk::new(rect, offset, store.color_space().pixel_size());
        Self {
            store,
            tile: store.tile_at(walk.coord),
            walk,
        }
    }

    cursor_accessors!();

    /// Bytes of the current pixel.
    #[inline]
    pub fn raw_data(&self) -> &'a [u8] {
        &self.tile[self.walk.pos..self.walk.pos + self.walk.pixel_size]
    }

    /// Bytes of the current contiguous run.
    #[inline]
    pub fn span(&self) -> &'a [u8] {
        let end = self.walk.pos + self.walk.conseq() * self.walk.pixel_size;
        &self.tile[self.walk.pos..end]
    }

    /// Moves one pixel right, wrapping to the next row. `false` when done.
    #[inline]
    pub fn next_pixel(&mut self) -> bool {
        self.next_pixels(1)
    }

    /// Moves `n` pixels right within the current run.
    pub fn next_pixels(&mut self, n: usize) -> bool {
        debug_assert!(n <= self.walk.conseq().max(1));
        if self.walk.advance(n) && !self.walk.done {
            self.tile = self.store.tile_at(self.walk.coord);
        }
        !self.walk.done
    }

    /// Jumps to the start of the next row. `false` when done.
    pub fn next_row(&mut self) -> bool {
        if !self.walk.done {
            self.walk.next_row();
            if !self.walk.done {
                self.tile = self.store.tile_at(self.walk.coord);
            }
        }
        !self.walk.done
    }
}

/// Read cursor over one row.
#[derive(Debug)]
pub struct HLineIter<'a> {
    inner: RectIter<'a>,
}

impl<'a> HLineIter<'a> {
    pub(crate) fn new(store: &'a TileStore, rect: Rect, offset: (i32, i32)) -> Self {
        debug_assert!(rect.height <= 1);
        Self {
            inner: RectIter::new(store, rect, offset),
        }
    }

    /// Canvas x of the current pixel.
    #[inline]
    pub fn x(&self) -> i32 {
        self.inner.x()
    }

    /// Canvas y of the row.
    #[inline]
    pub fn y(&self) -> i32 {
        self.inner.y()
    }

    /// Whether the row is exhausted.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// Pixels left in the current tile.
    #[inline]
    pub fn n_conseq_pixels(&self) -> usize {
        self.inner.n_conseq_pixels()
    }

    /// Bytes of the current pixel.
    #[inline]
    pub fn raw_data(&self) -> &'a [u8] {
        self.inner.raw_data()
    }

    /// Bytes of the current contiguous run.
    #[inline]
    pub fn span(&self) -> &'a [u8] {
        self.inner.span()
    }

    /// Moves one pixel right. `false` at the end of the row.
    #[inline]
    pub fn next_pixel(&mut self) -> bool {
        self.inner.next_pixel()
    }

    /// Moves `n` pixels right within the current run.
    #[inline]
    pub fn next_pixels(&mut self, n: usize) -> bool {
        self.inner.next_pixels(n)
    }
}

/// Write cursor over a rectangle.
///
/// A tile is allocated the first time a pixel in it is written through
/// [`raw_data_mut`](Self::raw_data_mut) or [`span_mut`](Self::span_mut);
/// walking past a tile or reading it leaves it absent.
#[derive(Debug)]
pub struct RectIterMut<'a> {
    store: &'a mut TileStore,
    walk: Walk,
}

impl<'a> RectIterMut<'a> {
    /// Cursor over `rect` (canvas coordinates, already clipped).
    pub(crate) fn new(store: &'a mut TileStore, rect: Rect, offset: (i32, i32)) -> Self {
        let walk = Walk::new(rect, offset, store.color_space().pixel_size());
        Self { store, walk }
    }

    cursor_accessors!();

    fn tile_mut(&mut self) -> Result<&mut Tile> {
        self.store.writable_tile_at(self.walk.coord)
    }

    /// Bytes of the current pixel. Absent tiles read as default.
    #[inline]
    pub fn raw_data(&self) -> &[u8] {
        let pos = self.walk.pos;
        &self.store.tile_at(self.walk.coord)[pos..pos + self.walk.pixel_size]
    }

    /// Bytes of the current pixel, writable. Allocates the tile on first use.
    #[inline]
    pub fn raw_data_mut(&mut self) -> Result<&mut [u8]> {
        let pos = self.walk.pos;
        let ps = self.walk.pixel_size;
        Ok(&mut self.tile_mut()?.data_mut()[pos..pos + ps])
    }

    /// Bytes of the current contiguous run, writable. Allocates the tile on
    /// first use.
    #[inline]
    pub fn span_mut(&mut self) -> Result<&mut [u8]> {
        let pos = self.walk.pos;
        let end = pos + self.walk.conseq() * self.walk.pixel_size;
        Ok(&mut self.tile_mut()?.data_mut()[pos..end])
    }

    /// Bytes of the current contiguous run. Absent tiles read as default.
    #[inline]
    pub fn span(&self) -> &[u8] {
        let pos = self.walk.pos;
        let end = pos + self.walk.conseq() * self.walk.pixel_size;
        &self.store.tile_at(self.walk.coord)[pos..end]
    }

    /// Moves one pixel right, wrapping to the next row. `false` when done.
    #[inline]
    pub fn next_pixel(&mut self) -> bool {
        self.next_pixels(1)
    }

    /// Moves `n` pixels right within the current run.
    pub fn next_pixels(&mut self, n: usize) -> bool {
        debug_assert!(n <= self.walk.conseq().max(1));
        self.walk.advance(n);
        !self.walk.done
    }

    /// Jumps to the start of the next row. `false` when done.
    pub fn next_row(&mut self) -> bool {
        if !self.walk.done {
            self.walk.next_row();
        }
        !self.walk.done
    }
}

/// Write cursor over one row.
#[derive(Debug)]
pub struct HLineIterMut<'a> {
    inner: RectIterMut<'a>,
}

impl<'a> HLineIterMut<'a> {
    pub(crate) fn new(store: &'a mut TileStore, rect: Rect, offset: (i32, i32)) -> Self {
        debug_assert!(rect.height <= 1);
        Self {
            inner: RectIterMut::new(store, rect, offset),
        }
    }

    /// Canvas x of the current pixel.
    #[inline]
    pub fn x(&self) -> i32 {
        self.inner.x()
    }

    /// Canvas y of the row.
    #[inline]
    pub fn y(&self) -> i32 {
        self.inner.y()
    }

    /// Whether the row is exhausted.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// Pixels left in the current tile.
    #[inline]
    pub fn n_conseq_pixels(&self) -> usize {
        self.inner.n_conseq_pixels()
    }

    /// Bytes of the current pixel.
    #[inline]
    pub fn raw_data(&self) -> &[u8] {
        self.inner.raw_data()
    }

    /// Bytes of the current pixel, writable. Allocates the tile on first use.
    #[inline]
    pub fn raw_data_mut(&mut self) -> Result<&mut [u8]> {
        self.inner.raw_data_mut()
    }

    /// Bytes of the current contiguous run, writable. Allocates the tile on
    /// first use.
    #[inline]
    pub fn span_mut(&mut self) -> Result<&mut [u8]> {
        self.inner.span_mut()
    }

    /// Moves one pixel right. `false` at the end of the row.
    #[inline]
    pub fn next_pixel(&mut self) -> bool {
        self.inner.next_pixel()
    }

    /// Moves `n` pixels right within the current run.
    #[inline]
    pub fn next_pixels(&mut self, n: usize) -> bool {
        self.inner.next_pixels(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::TileBudget;
    use std::sync::Arc;
    use tilepaint_core::{ColorSpace, ColorSpaceRegistry};

    fn gray8() -> Arc<ColorSpace> {
        ColorSpaceRegistry::with_builtins().get("graya-u8").unwrap()
    }

    #[test]
    fn test_read_walk_crosses_tiles() {
        let store = TileStore::new(gray8());
        let mut it = RectIter::new(&store, Rect::new(-2, -1, 4, 2), (0, 0));
        let mut seen = Vec::new();
        while !it.is_done() {
            seen.push((it.x(), it.y(), it.n_conseq_pixels()));
            it.next_pixel();
        }
        assert_eq!(
            seen,
            vec![
                (-2, -1, 2),
                (-1, -1, 1),
                (0, -1, 2),
                (1, -1, 1),
                (-2, 0, 2),
                (-1, 0, 1),
                (0, 0, 2),
                (1, 0, 1),
            ]
        );
        assert_eq!(store.tile_count(), 0);
    }

    #[test]
    fn test_spans() {
        let store = TileStore::new(gray8());
        let mut it = RectIter::new(&store, Rect::new(10, 0, 200, 1), (0, 0));
        let mut runs = Vec::new();
        while !it.is_done() {
            let n = it.n_conseq_pixels();
            assert_eq!(it.span().len(), n * 2);
            runs.push(n);
            it.next_pixels(n);
        }
        assert_eq!(runs, vec![54, 64, 64, 18]);
    }

    #[test]
    fn test_write_walk_allocates_on_first_write() {
        let mut store = TileStore::new(gray8());
        {
            let mut it = RectIterMut::new(&mut store, Rect::new(-1, -1, 2, 2), (0, 0));
            assert!(!it.is_done());
            assert_eq!(it.raw_data(), &[0, 0]);
            // (-1, -1) and (0, -1) are skipped without writing.
            it.next_pixel();
            it.next_pixel();
            it.raw_data_mut().unwrap().copy_from_slice(&[7, 255]);
        }
        assert_eq!(store.tile_count(), 1);
        assert!(store.is_allocated(TileCoord::new(-1, 0)));
    }

    #[test]
    fn test_single_write_over_large_rect_claims_one_tile() {
        let budget = Arc::new(TileBudget::with_limit(4));
        let mut store = TileStore::with_budget(gray8(), Arc::clone(&budget));
        {
            let mut it = RectIterMut::new(&mut store, Rect::new(0, 0, 640, 640), (0, 0));
            it.raw_data_mut().unwrap().copy_from_slice(&[1, 255]);
        }
        assert_eq!(store.tile_count(), 1);
        assert_eq!(budget.used(), 1);
    }

    #[test]
    fn test_budget_exhaustion_surfaces_on_write() {
        let budget = Arc::new(TileBudget::with_limit(1));
        let mut store = TileStore::with_budget(gray8(), Arc::clone(&budget));
        let mut it = RectIterMut::new(&mut store, Rect::new(0, 0, 128, 1), (0, 0));
        let n = it.n_conseq_pixels();
        assert_eq!(n, 64);
        assert!(it.span_mut().is_ok());
        assert!(it.next_pixels(n));
        assert!(it.span_mut().unwrap_err().is_allocation_error());
        assert_eq!(it.span(), &[0u8; 128][..]);
        drop(it);
        assert_eq!(store.tile_count(), 1);
        assert_eq!(budget.used(), 1);
    }

    #[test]
    fn test_write_then_read_with_offset() {
        let mut store = TileStore::new(gray8());
        let offset = (100, -50);
        {
            let mut it = RectIterMut::new(&mut store, Rect::new(90, -60, 20, 20), offset);
            while !it.is_done() {
                let v = (it.x() - 90 + it.y() + 60) as u8;
                it.raw_data_mut().unwrap().copy_from_slice(&[v, 255]);
                it.next_pixel();
            }
        }
        // Canvas (90, -60) is store (-10, -10).
        let (c, ox, oy) = TileCoord::containing(-10, -10);
        assert_eq!(&store.tile_at(c)[pixel_offset(ox, oy, 2)..][..2], &[0, 255]);

        let mut it = RectIter::new(&store, Rect::new(95, -55, 3, 1), offset);
        let mut vals = Vec::new();
        while !it.is_done() {
            vals.push(it.raw_data()[0]);
            it.next_pixel();
        }
        assert_eq!(vals, vec![10, 11, 12]);
    }

    #[test]
    fn test_next_row_skips_rest() {
        let store = TileStore::new(gray8());
        let mut it = RectIter::new(&store, Rect::new(0, 0, 10, 3), (0, 0));
        assert!(it.next_row());
        assert_eq!((it.x(), it.y()), (0, 1));
        assert!(it.next_row());
        assert!(!it.next_row());
        assert!(it.is_done());
        assert!(!it.next_pixel());
    }

    #[test]
    fn test_empty_rect_is_done() {
        let mut store = TileStore::new(gray8());
        assert!(RectIter::new(&store, Rect::new(0, 0, 0, 5), (0, 0)).is_done());
        assert!(RectIterMut::new(&mut store, Rect::new(0, 0, 5, 0), (0, 0)).is_done());
        assert_eq!(store.tile_count(), 0);
    }
}
