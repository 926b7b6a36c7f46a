//! # tilepaint-store
//!
//! Sparse tiled storage for an unbounded raster canvas.
//!
//! - [`Tile`], [`TileCoord`] - Fixed 64x64 pixel blocks and their grid address
//! - [`TileStore`] - Lazy allocation over a shared default tile
//! - [`PaintDevice`] - The canvas: store plus origin offset
//! - [`RectIter`], [`HLineIter`] (and `Mut` variants) - Tile-crossing cursors
//! - [`Transaction`] - Undo mementos, including prior absence of tiles
//! - [`TileBudget`] - Shared ceiling on allocated tiles
//! - [`CancellationToken`], [`Checkpoint`], [`Completion`] - Cooperative cancellation
//!
//! ## Concurrency
//!
//! A device is not internally synchronized. Callers serialize writers whose
//! regions overlap and may run disjoint work in parallel (see the
//! scheduler in `tilepaint-ops`). Reads through `&PaintDevice` are free to
//! run concurrently; the default tile is immutable and shared.
//!
//! ## Example
//!
//! ```rust
//! use tilepaint_core::{ColorSpaceRegistry, Rect};
//! use tilepaint_store::PaintDevice;
//!
//! let registry = ColorSpaceRegistry::with_builtins();
//! let mut dev = PaintDevice::new(registry.get("rgba-u8").unwrap());
//!
//! dev.begin_transaction().unwrap();
//! dev.fill(Rect::new(0, 0, 10, 10), &[0, 255, 0, 255]).unwrap();
//! let tx = dev.commit_transaction().unwrap();
//!
//! dev.revert(tx).unwrap();
//! assert_eq!(dev.tile_store().tile_count(), 0);
//! ```

#![warn(missing_docs)]

pub mod budget;
pub mod cancel;
pub mod device;
pub mod iter;
pub mod store;
pub mod tile;
pub mod transaction;

pub use budget::TileBudget;
pub use cancel::{CancellationToken, Checkpoint, Completion};
pub use device::{DeviceId, PaintDevice};
pub use iter::{HLineIter, HLineIterMut, RectIter, RectIterMut};
pub use store::TileStore;
pub use tile::{Tile, TileCoord};
pub use transaction::Transaction;
