//! Undo mementos.
//!
//! While a transaction is open the store records, on first write access to
//! each tile, what that coordinate held before: a copy of the old tile, or
//! the fact that it was absent. Reverting puts exactly that back, including
//! freeing tiles the transaction allocated, and yields the inverse
//! transaction for redo.

use crate::tile::{Tile, TileCoord};
use std::collections::BTreeMap;
use tilepaint_core::{Rect, Result};

/// Prior state of touched tiles, keyed by coordinate.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    pub(crate) entries: BTreeMap<TileCoord, Option<Tile>>,
}

impl Journal {
    /// Records an existing tile unless already recorded.
    pub(crate) fn record_existing(&mut self, coord: TileCoord, tile: &Tile) -> Result<()> {
        if !self.entries.contains_key(&coord) {
            self.entries.insert(coord, Some(tile.try_clone()?));
        }
        Ok(())
    }

    /// Records that a coordinate was absent, unless already recorded.
    pub(crate) fn record_absent(&mut self, coord: TileCoord) {
        self.entries.entry(coord).or_insert(None);
    }

    /// Records a tile being removed, taking ownership of it.
    pub(crate) fn record_removed(&mut self, coord: TileCoord, tile: Tile) {
        self.entries.entry(coord).or_insert(Some(tile));
    }
}

/// A committed set of tile changes that can be reverted.
#[derive(Debug)]
pub struct Transaction {
    pub(crate) space_id: String,
    pub(crate) journal: Journal,
    pub(crate) offset: (i32, i32),
}

impl Transaction {
    /// Color space id of the device it was recorded on.
    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    /// Number of tiles touched.
    pub fn len(&self) -> usize {
        self.journal.entries.len()
    }

    /// Whether nothing was touched.
    pub fn is_empty(&self) -> bool {
        self.journal.entries.is_empty()
    }

    /// Coordinates touched, row-major.
    pub fn touched_tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.journal.entries.keys().copied()
    }

    /// Coordinates that were absent before the transaction.
    pub fn allocated_tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.journal
            .entries
            .iter()
            .filter(|(_, prior)| prior.is_none())
            .map(|(c, _)| *c)
    }

    /// Device offset before the transaction.
    pub fn offset(&self) -> (i32, i32) {
        self.offset
    }

    /// Bounding rectangle of touched tiles, in tile units.
    pub fn tile_bounds(&self) -> Rect {
        self.touched_tiles()
            .fold(Rect::default(), |acc, c| acc.union(&Rect::new(c.tx, c.ty, 1, 1)))
    }

    /// Bytes held by saved tile copies.
    pub fn memory_bytes(&self) -> usize {
        self.journal
            .entries
            .values()
            .flatten()
            .map(Tile::size_bytes)
            .sum()
    }
}
