//! Parallel bulk operations using Rayon.
//!
//! Work is split by destination tile. Every tile of the region is
//! allocated up front on the calling thread, then each worker owns one
//! `&mut Tile` exclusively, so no locking happens in the pixel loops.
//!
//! # Example
//!
//! ```rust
//! use tilepaint_core::{ColorSpaceRegistry, Rect};
//! use tilepaint_ops::parallel;
//! use tilepaint_store::PaintDevice;
//!
//! let rgba = ColorSpaceRegistry::with_builtins().get("rgba-u8").unwrap();
//! let mut dev = PaintDevice::new(rgba);
//! parallel::par_fill(&mut dev, Rect::new(-100, -100, 300, 300), &[9, 9, 9, 255]).unwrap();
//! assert_eq!(dev.pixel(-100, 199), &[9, 9, 9, 255]);
//! assert_eq!(dev.tile_store().tile_count(), 36);
//! ```

use crate::error::OpsResult;
use rayon::prelude::*;
use tilepaint_core::{CompositeParams, Error, Rect, TILE_SIZE};
use tilepaint_store::tile::pixel_offset;
use tilepaint_store::{PaintDevice, Tile, TileCoord};
use tracing::trace;

/// Pixel rectangle of a tile.
fn tile_rect(coord: TileCoord) -> Rect {
    Rect::new(coord.left(), coord.top(), TILE_SIZE, TILE_SIZE)
}

/// Tiles of `dst` under canvas `rect`, with `rect` in store coordinates.
fn claim_tiles(dst: &mut PaintDevice, rect: Rect) -> OpsResult<(Rect, Vec<(TileCoord, &mut Tile)>)> {
    let (ox, oy) = dst.offset();
    let local = rect.translated(-ox, -oy);
    let tiles = dst
        .tile_store_mut()
        .writable_tiles_in(local.to_tile_rect(TILE_SIZE))?;
    Ok((local, tiles))
}

/// Fills `rect` with `pixel`, one tile per task.
pub fn par_fill(dst: &mut PaintDevice, rect: Rect, pixel: &[u8]) -> OpsResult<()> {
    let ps = dst.pixel_size();
    if pixel.len() != ps {
        return Err(Error::buffer_too_small(ps, pixel.len()).into());
    }
    let Some(rect) = dst.clip(rect) else {
        return Ok(());
    };
    let (local, tiles) = claim_tiles(dst, rect)?;
    let count = tiles.len();
    tiles.into_par_iter().for_each(|(coord, tile)| {
        let Some(part) = tile_rect(coord).intersect(&local) else {
            return;
        };
        let part = part.translated(-coord.left(), -coord.top());
        let data = tile.data_mut();
        for oy in part.rows() {
            let start = pixel_offset(part.x as usize, oy as usize, ps);
            for px in data[start..start + part.width as usize * ps].chunks_exact_mut(ps) {
                px.copy_from_slice(pixel);
            }
        }
    });
    trace!(%rect, tiles = count, "parallel fill");
    Ok(())
}

/// Composites `rect` of `src` onto `dst` with op `op_id`, one destination
/// tile per task. Unknown op ids fall back to `over`.
pub fn par_composite(
    dst: &mut PaintDevice,
    src: &PaintDevice,
    rect: Rect,
    op_id: &str,
    params: &CompositeParams<'_>,
) -> OpsResult<()> {
    if !dst.color_space().is_compatible(src.color_space()) {
        return Err(Error::color_space_mismatch(src.color_space().id(), dst.color_space().id()).into());
    }
    if params.mask.is_some() {
        return Err(Error::other("per-pixel masks are not supported by parallel composite").into());
    }
    let op = dst.color_space().composite_op_or_over(op_id);
    let ps = dst.pixel_size();
    let Some(rect) = dst.clip(rect) else {
        return Ok(());
    };
    let (ox, oy) = dst.offset();
    let (local, tiles) = claim_tiles(dst, rect)?;
    let count = tiles.len();

    tiles.into_par_iter().try_for_each(|(coord, tile)| -> OpsResult<()> {
        let Some(part) = tile_rect(coord).intersect(&local) else {
            return Ok(());
        };
        let width = part.width as usize;
        let mut row = vec![0u8; width * ps];
        let data = tile.data_mut();
        for y in part.rows() {
            src.read_bytes(Rect::new(part.x + ox, y + oy, part.width, 1), &mut row)?;
            let start = pixel_offset(
                (part.x - coord.left()) as usize,
                (y - coord.top()) as usize,
                ps,
            );
            op.composite(&row, &mut data[start..start + width * ps], width, params);
        }
        Ok(())
    })?;
    trace!(%rect, tiles = count, op = op_id, "parallel composite");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::painter::Painter;
    use tilepaint_core::composite::ids;
    use tilepaint_core::ColorSpaceRegistry;

    #[test]
    fn test_par_composite_matches_sequential() {
        let rgba = ColorSpaceRegistry::with_builtins().get("rgba-u8").unwrap();
        let mut src = PaintDevice::new(rgba.clone());
        src.fill(Rect::new(-20, -20, 150, 90), &[10, 200, 30, 180]).unwrap();
        src.set_pixel(5, 5, &[255, 255, 255, 255]).unwrap();

        let mut base = PaintDevice::new(rgba);
        base.fill(Rect::new(0, 0, 200, 200), &[90, 90, 200, 120]).unwrap();
        base.move_to(-7, 3);
        let mut seq = base.try_clone().unwrap();
        let mut par = base.try_clone().unwrap();

        let rect = Rect::new(-30, -30, 220, 220);
        Painter::new(&mut seq).op(ids::MULTIPLY).opacity(0.7).bit_blt(&src, rect, None).unwrap();
        par_composite(&mut par, &src, rect, ids::MULTIPLY, &CompositeParams::new(0.7)).unwrap();

        let mut a = vec![0u8; rect.area() as usize * 4];
        let mut b = a.clone();
        seq.read_bytes(rect, &mut a).unwrap();
        par.read_bytes(rect, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_par_fill_with_offset() {
        let gray = ColorSpaceRegistry::with_builtins().get("graya-u16").unwrap();
        let mut dev = PaintDevice::new(gray);
        dev.move_to(10, 10);
        par_fill(&mut dev, Rect::new(0, 0, 20, 20), &[1, 2, 3, 4]).unwrap();
        assert_eq!(dev.exact_bounds(), Rect::new(0, 0, 20, 20));
        assert_eq!(dev.pixel(19, 0), &[1, 2, 3, 4]);
        assert!(par_fill(&mut dev, Rect::new(0, 0, 1, 1), &[1]).is_err());
    }
}
