//! Tiles and tile coordinates.
//!
//! A tile is a `TILE_SIZE x TILE_SIZE` block of raw pixel bytes in one
//! color space, rows stored top to bottom without padding.
//!
//! Canvas coordinates map to tiles with floor division, so the pixel at
//! `x = -1` lives in the last column of tile `-1`:
//!
//! ```rust
//! use tilepaint_store::tile::split_coord;
//!
//! assert_eq!(split_coord(-1), (-1, 63));
//! assert_eq!(split_coord(-64), (-1, 0));
//! assert_eq!(split_coord(-65), (-2, 63));
//! assert_eq!(split_coord(64), (1, 0));
//! ```

use std::fmt;
use tilepaint_core::{Error, Result, TILE_AREA, TILE_SIZE};

/// Splits a pixel coordinate into (tile index, offset within the tile).
#[inline]
pub const fn split_coord(v: i32) -> (i32, usize) {
    (v.div_euclid(TILE_SIZE), v.rem_euclid(TILE_SIZE) as usize)
}

/// Integer tile coordinate.
///
/// Ordering is row-major (`ty` first), which is the traversal order of
/// every store iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Tile row.
    pub ty: i32,
    /// Tile column.
    pub tx: i32,
}

impl TileCoord {
    /// Creates a coordinate from column and row.
    #[inline]
    pub const fn new(tx: i32, ty: i32) -> Self {
        Self { ty, tx }
    }

    /// Tile holding pixel (x, y), plus the pixel's offset inside it.
    #[inline]
    pub const fn containing(x: i32, y: i32) -> (Self, usize, usize) {
        let (tx, ox) = split_coord(x);
        let (ty, oy) = split_coord(y);
        (Self::new(tx, ty), ox, oy)
    }

    /// Pixel x of the tile's left edge.
    #[inline]
    pub const fn left(&self) -> i32 {
        self.tx * TILE_SIZE
    }

    /// Pixel y of the tile's top edge.
    #[inline]
    pub const fn top(&self) -> i32 {
        self.ty * TILE_SIZE
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.tx, self.ty)
    }
}

/// Byte offset of pixel (ox, oy) inside a tile buffer.
#[inline]
pub const fn pixel_offset(ox: usize, oy: usize, pixel_size: usize) -> usize {
    (oy * TILE_SIZE as usize + ox) * pixel_size
}

/// An allocated tile, exclusively owned by its store slot.
#[derive(Clone, PartialEq, Eq)]
pub struct Tile {
    data: Vec<u8>,
}

impl Tile {
    /// Allocates a tile holding a copy of `template`.
    ///
    /// Allocation failure is reported, never turned into a panic.
    pub fn try_copy_of(template: &[u8]) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(template.len())
            .map_err(|e| Error::allocation_failed(template.len(), e.to_string()))?;
        data.extend_from_slice(template);
        Ok(Self { data })
    }

    /// Fallible clone.
    pub fn try_clone(&self) -> Result<Self> {
        Self::try_copy_of(&self.data)
    }

    /// Raw bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes, mutable.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes per pixel.
    #[inline]
    pub fn pixel_size(&self) -> usize {
        self.data.len() / TILE_AREA
    }

    /// Bytes of one pixel.
    #[inline]
    pub fn pixel(&self, ox: usize, oy: usize) -> &[u8] {
        let ps = self.pixel_size();
        let at = pixel_offset(ox, oy, ps);
        &self.data[at..at + ps]
    }

    /// Bytes of one pixel, mutable.
    #[inline]
    pub fn pixel_mut(&mut self, ox: usize, oy: usize) -> &mut [u8] {
        let ps = self.pixel_size();
        let at = pixel_offset(ox, oy, ps);
        &mut self.data[at..at + ps]
    }

    /// Whether every pixel equals `pixel`.
    pub fn is_filled_with(&self, pixel: &[u8]) -> bool {
        self.data.chunks_exact(pixel.len()).all(|p| p == pixel)
    }

    /// Heap bytes held.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.data.capacity()
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_coords_floor() {
        for v in -64..0 {
            let (t, o) = split_coord(v);
            assert_eq!(t, -1);
            assert_eq!(o, (v + 64) as usize);
        }
        assert_eq!(split_coord(-1), (-1, 63));
        assert_eq!(split_coord(-65), (-2, 63));
        assert_eq!(split_coord(0), (0, 0));
        assert_eq!(split_coord(63), (0, 63));
    }

    #[test]
    fn test_containing() {
        let (c, ox, oy) = TileCoord::containing(-1, 130);
        assert_eq!(c, TileCoord::new(-1, 2));
        assert_eq!((ox, oy), (63, 2));
        assert_eq!(c.left(), -64);
        assert_eq!(c.top(), 128);
    }

    #[test]
    fn test_row_major_order() {
        let mut coords = vec![
            TileCoord::new(1, 0),
            TileCoord::new(0, 1),
            TileCoord::new(-1, 1),
            TileCoord::new(5, -2),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![
                TileCoord::new(5, -2),
                TileCoord::new(1, 0),
                TileCoord::new(-1, 1),
                TileCoord::new(0, 1),
            ]
        );
    }

    #[test]
    fn test_tile_pixels() {
        let template = vec![0u8; TILE_AREA * 4];
        let mut tile = Tile::try_copy_of(&template).unwrap();
        assert_eq!(tile.pixel_size(), 4);
        assert!(tile.is_filled_with(&[0, 0, 0, 0]));
        tile.pixel_mut(63, 63).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(tile.pixel(63, 63), &[1, 2, 3, 4]);
        assert_eq!(&tile.data()[tile.data().len() - 4..], &[1, 2, 3, 4]);
        assert!(!tile.is_filled_with(&[0, 0, 0, 0]));
        assert_eq!(tile.try_clone().unwrap(), tile);
    }
}
