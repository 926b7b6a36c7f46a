//! # tilepaint-core
//!
//! Core pixel types for a tiled raster painting engine.
//!
//! This crate provides the types every other tilepaint crate agrees on:
//!
//! - [`ChannelType`], [`PixelFormat`], [`PixelTraits`] - Channel storage and pixel layout
//! - [`PixelConverter`] - Depth conversion between layouts
//! - [`ChannelMath`] - Fixed-point and float channel arithmetic
//! - [`ColorSpace`], [`ColorSpaceRegistry`] - Named layouts with composite ops
//! - [`CompositeOp`] - Scanline blend functions
//! - [`Rect`] - Signed rectangles on an unbounded canvas
//!
//! ## Design
//!
//! Pixel bytes are only meaningful together with their [`ColorSpace`]. Two
//! buffers in different spaces are never blended directly; they go through
//! [`ColorSpace::convert_pixels_to`] first.
//!
//! Per-channel type dispatch happens once per scanline call, never per
//! pixel. Inner loops are monomorphized over the storage type.
//!
//! ## Crate Structure
//!
//! ```text
//! tilepaint-core (this crate)
//!    ^
//!    |
//!    +-- tilepaint-store (tiles, devices, iterators, transactions)
//!           ^
//!           +-- tilepaint-ops (painter, thumbnails, LOD, scheduler)
//!                  ^
//!                  +-- tilepaint-cli
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod colorspace;
pub mod composite;
pub mod error;
pub mod format;
pub mod maths;
pub mod pixel;
pub mod rect;

pub use colorspace::{
    ChannelInfo, ChannelRole, ColorModel, ColorProfile, ColorSpace, ColorSpaceBuilder,
    ColorSpaceRegistry, ColorTransform,
};
pub use composite::{ChannelFlags, CompositeCategory, CompositeOp, CompositeParams};
pub use error::*;
pub use format::*;
pub use maths::ChannelMath;
pub use pixel::{luminance_rec709, PixelConverter, PixelFormat, PixelTraits};
pub use rect::{Rect, COORD_LIMIT};

/// Edge length of a tile in pixels.
pub const TILE_SIZE: i32 = 64;

/// Pixels per tile.
pub const TILE_AREA: usize = (TILE_SIZE * TILE_SIZE) as usize;

/// Prelude module for convenient imports.
///
/// ```
/// use tilepaint_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::colorspace::{ColorModel, ColorSpace, ColorSpaceRegistry};
    pub use crate::composite::{ids as composite_ids, ChannelFlags, CompositeOp, CompositeParams};
    pub use crate::error::{Error, Result};
    pub use crate::format::ChannelType;
    pub use crate::pixel::{PixelFormat, PixelTraits};
    pub use crate::rect::Rect;
    pub use crate::{TILE_AREA, TILE_SIZE};
}
