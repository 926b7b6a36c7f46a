//! Sparse tile storage for one paint device.
//!
//! Coordinates never written are absent from the map and read as the color
//! space's shared default tile. Absent and explicitly-default tiles are
//! indistinguishable to readers.
//!
//! Per coordinate the state machine is
//!
//! ```text
//! Absent --first write--> Allocated --clear/crop/purge--> Absent
//! ```
//!
//! Painting transparency into an allocated tile keeps it allocated; only
//! [`TileStore::clear`] and [`TileStore::purge_default_tiles`] free tiles.

use crate::budget::TileBudget;
use crate::tile::{Tile, TileCoord};
use crate::transaction::Journal;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tilepaint_core::{ColorSpace, ColorTransform, Error, Rect, Result, TILE_AREA};
use tracing::{debug, trace, warn};

/// Sparse map from tile coordinate to tile.
pub struct TileStore {
    space: Arc<ColorSpace>,
    default_tile: Arc<[u8]>,
    tiles: BTreeMap<TileCoord, Tile>,
    /// Bounds of allocated coordinates, in tile units.
    extent: Rect,
    budget: Arc<TileBudget>,
    journal: Option<Journal>,
}

impl TileStore {
    /// Empty store with an unlimited budget.
    pub fn new(space: Arc<ColorSpace>) -> Self {
        Self::with_budget(space, Arc::new(TileBudget::unlimited()))
    }

    /// Empty store drawing tiles from a shared budget.
    pub fn with_budget(space: Arc<ColorSpace>, budget: Arc<TileBudget>) -> Self {
        Self {
            default_tile: space.default_tile(),
            space,
            tiles: BTreeMap::new(),
            extent: Rect::default(),
            budget,
            journal: None,
        }
    }

    /// Color space of every tile.
    pub fn color_space(&self) -> &Arc<ColorSpace> {
        &self.space
    }

    /// Budget tiles are drawn from.
    pub fn budget(&self) -> &Arc<TileBudget> {
        &self.budget
    }

    /// Shared default tile contents.
    pub fn default_tile(&self) -> &[u8] {
        &self.default_tile
    }

    /// Number of allocated tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Bytes held by allocated tiles.
    pub fn memory_bytes(&self) -> usize {
        self.tiles.values().map(Tile::size_bytes).sum()
    }

    /// Whether a coordinate holds its own tile.
    pub fn is_allocated(&self, coord: TileCoord) -> bool {
        self.tiles.contains_key(&coord)
    }

    /// Read-only tile contents. Never allocates.
    #[inline]
    pub fn tile_at(&self, coord: TileCoord) -> &[u8] {
        match self.tiles.get(&coord) {
            Some(t) => t.data(),
            None => &self.default_tile,
        }
    }

    /// The allocated tile at a coordinate, if any.
    pub fn tile(&self, coord: TileCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }

    /// Writable tile, allocated from the default tile if absent.
    ///
    /// Allocation and insertion are one step. Failure leaves the store
    /// unchanged.
    pub fn writable_tile_at(&mut self, coord: TileCoord) -> Result<&mut Tile> {
        match self.tiles.entry(coord) {
            Entry::Occupied(e) => {
                if let Some(journal) = self.journal.as_mut() {
                    journal.record_existing(coord, e.get())?;
                }
                Ok(e.into_mut())
            }
            Entry::Vacant(v) => {
                self.budget.acquire()?;
                let tile = match Tile::try_copy_of(&self.default_tile) {
                    Ok(t) => t,
                    Err(e) => {
                        self.budget.release(1);
                        return Err(e);
                    }
                };
                if let Some(journal) = self.journal.as_mut() {
                    journal.record_absent(coord);
                }
                self.extent = self.extent.union(&Rect::new(coord.tx, coord.ty, 1, 1));
                trace!(tile = %coord, "allocated tile");
                Ok(v.insert(tile))
            }
        }
    }

    /// Allocates every tile in `tiles` (tile units) that is still absent.
    pub fn ensure_allocated(&mut self, tiles: Rect) -> Result<()> {
        for ty in tiles.rows() {
            for tx in tiles.x..tiles.right() {
                self.writable_tile_at(TileCoord::new(tx, ty))?;
            }
        }
        Ok(())
    }

    /// Writable access to every tile in a tile rectangle, row-major.
    ///
    /// Absent tiles are allocated first; if any allocation fails nothing is
    /// returned but tiles allocated so far stay (each is complete).
    pub fn writable_tiles_in(&mut self, tiles: Rect) -> Result<Vec<(TileCoord, &mut Tile)>> {
        if tiles.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_allocated(tiles)?;
        let (x0, x1) = (tiles.x, tiles.right());
        let lo = TileCoord::new(x0, tiles.y);
        let hi = TileCoord::new(x1, tiles.bottom() - 1);
        Ok(self
            .tiles
            .range_mut(lo..hi)
            .filter(|(c, _)| c.tx >= x0 && c.tx < x1)
            .map(|(c, t)| (*c, t))
            .collect())
    }

    /// Allocated tiles, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (TileCoord, &Tile)> + '_ {
        self.tiles.iter().map(|(c, t)| (*c, t))
    }

    /// Allocated tiles inside a tile rectangle, row-major.
    pub fn iter_in(&self, tiles: Rect) -> impl Iterator<Item = (TileCoord, &Tile)> + '_ {
        let (x0, x1) = (tiles.x, tiles.right());
        let range = if tiles.is_empty() {
            None
        } else {
            Some(TileCoord::new(x0, tiles.y)..TileCoord::new(x1, tiles.bottom() - 1))
        };
        range
            .into_iter()
            .flat_map(move |r| self.tiles.range(r))
            .filter(move |(c, _)| c.tx >= x0 && c.tx < x1)
            .map(|(c, t)| (*c, t))
    }

    /// Allocated coordinates, row-major.
    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.tiles.keys().copied()
    }

    /// Bounds of allocated coordinates, in tile units.
    ///
    /// Never shrinks from writes; only freeing tiles can shrink it.
    pub fn extent_in_tiles(&self) -> Rect {
        self.extent
    }

    fn recompute_extent(&mut self) {
        self.extent = self
            .tiles
            .keys()
            .fold(Rect::default(), |acc, c| acc.union(&Rect::new(c.tx, c.ty, 1, 1)));
    }

    fn remove_tile(&mut self, coord: TileCoord) -> bool {
        match self.tiles.remove(&coord) {
            Some(tile) => {
                if let Some(journal) = self.journal.as_mut() {
                    journal.record_removed(coord, tile);
                }
                self.budget.release(1);
                true
            }
            None => false,
        }
    }

    /// Frees every tile inside a tile rectangle, reverting them to absent.
    ///
    /// Returns the number of tiles freed.
    pub fn clear(&mut self, tiles: Rect) -> usize {
        let doomed: Vec<TileCoord> = self.iter_in(tiles).map(|(c, _)| c).collect();
        let freed = doomed.into_iter().filter(|&c| self.remove_tile(c)).count();
        if freed > 0 {
            self.recompute_extent();
            debug!(freed, rect = %tiles, "cleared tiles");
        }
        freed
    }

    /// Frees every tile whose coordinate does not satisfy `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(TileCoord) -> bool) -> usize {
        let doomed: Vec<TileCoord> = self.coords().filter(|&c| !keep(c)).collect();
        let freed = doomed.into_iter().filter(|&c| self.remove_tile(c)).count();
        if freed > 0 {
            self.recompute_extent();
        }
        freed
    }

    /// Frees every tile.
    pub fn clear_all(&mut self) -> usize {
        self.retain(|_| false)
    }

    /// Frees allocated tiles whose bytes equal the default tile.
    ///
    /// Explicit compaction; writes never do this on their own.
    pub fn purge_default_tiles(&mut self) -> usize {
        let default = Arc::clone(&self.default_tile);
        let doomed: Vec<TileCoord> = self
            .tiles
            .iter()
            .filter(|(_, t)| t.data() == &default[..])
            .map(|(c, _)| *c)
            .collect();
        let freed = doomed.into_iter().filter(|&c| self.remove_tile(c)).count();
        if freed > 0 {
            self.recompute_extent();
            debug!(freed, "purged default tiles");
        }
        freed
    }

    /// Whether a transaction journal is recording.
    pub fn is_journaling(&self) -> bool {
        self.journal.is_some()
    }

    pub(crate) fn begin_journal(&mut self) -> Result<()> {
        if self.journal.is_some() {
            return Err(Error::other("a transaction is already open"));
        }
        self.journal = Some(Journal::default());
        Ok(())
    }

    pub(crate) fn take_journal(&mut self) -> Option<Journal> {
        self.journal.take()
    }

    /// Puts back the prior state recorded in `journal`.
    ///
    /// Returns the journal of the state it replaced, for redo.
    pub(crate) fn restore(&mut self, journal: Journal) -> Journal {
        let mut redo = Journal::default();
        let (mut added, mut removed) = (0usize, 0usize);
        for (coord, prior) in journal.entries {
            let current = self.tiles.remove(&coord);
            if current.is_some() {
                removed += 1;
            }
            if let Some(tile) = prior {
                self.tiles.insert(coord, tile);
                added += 1;
            }
            redo.entries.insert(coord, current);
        }
        // Undo may exceed the ceiling: it restores tiles the user already had.
        self.budget.force_acquire(added);
        self.budget.release(removed);
        self.recompute_extent();
        debug!(added, removed, "restored tiles");
        redo
    }

    /// Re-encodes every tile (and the default tile) into `space`.
    ///
    /// Returns `Ok(false)` and leaves the store unchanged when the
    /// conversion is unsupported.
    pub fn convert_to(&mut self, space: Arc<ColorSpace>, transform: Option<&dyn ColorTransform>) -> Result<bool> {
        if self.journal.is_some() {
            return Err(Error::other("cannot convert color space inside a transaction"));
        }
        if self.space.is_compatible(&space) {
            return Ok(true);
        }
        if self.space.model() != space.model() && transform.is_none() {
            warn!(from = %self.space, to = %space, "no color transform, device left unconverted");
            return Ok(false);
        }
        let mut converted = BTreeMap::new();
        for (coord, tile) in &self.tiles {
            let mut out = Tile::try_copy_of(&space.default_tile())?;
            if !self
                .space
                .convert_pixels_to(&space, tile.data(), out.data_mut(), TILE_AREA, transform)?
            {
                return Ok(false);
            }
            converted.insert(*coord, out);
        }
        debug!(from = %self.space, to = %space, tiles = converted.len(), "converted store");
        self.tiles = converted;
        self.default_tile = space.default_tile();
        self.space = space;
        Ok(true)
    }

    /// Fallible deep copy drawing from the same budget.
    pub fn try_clone(&self) -> Result<TileStore> {
        let mut tiles = BTreeMap::new();
        let mut taken = 0usize;
        for (coord, tile) in &self.tiles {
            let copy = self.budget.acquire().and_then(|_| {
                taken += 1;
                tile.try_clone()
            });
            match copy {
                Ok(t) => {
                    tiles.insert(*coord, t);
                }
                Err(e) => {
                    self.budget.release(taken);
                    return Err(e);
                }
            }
        }
        Ok(TileStore {
            space: Arc::clone(&self.space),
            default_tile: Arc::clone(&self.default_tile),
            tiles,
            extent: self.extent,
            budget: Arc::clone(&self.budget),
            journal: None,
        })
    }
}

impl Drop for TileStore {
    fn drop(&mut self) {
        self.budget.release(self.tiles.len());
    }
}

impl std::fmt::Debug for TileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileStore")
            .field("space", &self.space.id())
            .field("tiles", &self.tiles.len())
            .field("extent", &self.extent)
            .field("journaling", &self.journal.is_some())
            .finish()
    }
}
