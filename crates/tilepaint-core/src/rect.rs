//! Signed rectangles in canvas and tile coordinates.
//!
//! The canvas is unbounded in both directions, so rectangles carry signed
//! origins. Widths and heights are signed too; anything non-positive is an
//! empty rectangle rather than an error.
//!
//! ```text
//! (-n,-n)          (0,0) ────────► X
//!                    │
//!                    │   ┌──────────┐
//!                    │   │  Region  │
//!                    │   └──────────┘
//!                    ▼
//!                    Y
//! ```
//!
//! Only coordinates within [`COORD_LIMIT`] are addressable. Rectangles
//! reaching past it are clipped by [`Rect::clipped`], never rejected.
//!
//! ```rust
//! use tilepaint_core::Rect;
//!
//! let rect = Rect::new(-10, 20, 100, 50);
//! assert!(rect.contains(-10, 25));
//! assert!(!rect.contains(90, 25));
//!
//! let other = Rect::new(50, 40, 100, 50);
//! let overlap = rect.intersect(&other).unwrap();
//! assert_eq!(overlap, Rect::new(50, 40, 40, 30));
//! ```

use std::fmt;

/// Largest absolute canvas coordinate. Pixels at `-COORD_LIMIT..COORD_LIMIT`
/// are valid; everything else is clipped away.
pub const COORD_LIMIT: i32 = 1 << 29;

/// A rectangle defined by origin (x, y) and dimensions (width, height).
///
/// Left and top edges are inclusive, right and bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// X coordinate of the left edge (inclusive)
    pub x: i32,
    /// Y coordinate of the top edge (inclusive)
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl Rect {
    /// Creates a new rectangle with the given origin and dimensions.
    #[inline]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle at the origin.
    #[inline]
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Creates a rectangle from two corners, the second exclusive.
    ///
    /// ```rust
    /// use tilepaint_core::Rect;
    ///
    /// let rect = Rect::from_corners(10, 20, -10, 70);
    /// assert_eq!(rect, Rect::new(-10, 20, 20, 50));
    /// ```
    #[inline]
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        let (min_x, max_x) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (min_y, max_y) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Self::from_edges(min_x as i64, min_y as i64, max_x as i64, max_y as i64)
    }

    /// Builds from wide edges, saturating to `i32`.
    fn from_edges(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64);
        let (l, t) = (clamp(left), clamp(top));
        Self::new(
            l as i32,
            t as i32,
            clamp(right - l).max(0) as i32,
            clamp(bottom - t).max(0) as i32,
        )
    }

    /// X coordinate of the right edge (exclusive), saturating.
    #[inline]
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Y coordinate of the bottom edge (exclusive), saturating.
    #[inline]
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    fn right_wide(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    #[inline]
    fn bottom_wide(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Area in pixels; zero for empty rectangles.
    #[inline]
    pub const fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    /// Returns `true` if either dimension is zero or negative.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Returns `true` if the point (px, py) is inside this rectangle.
    #[inline]
    pub fn contains(&self, px: i32, py: i32) -> bool {
        !self.is_empty()
            && px >= self.x
            && (px as i64) < self.right_wide()
            && py >= self.y
            && (py as i64) < self.bottom_wide()
    }

    /// Returns `true` if this rectangle fully contains a non-empty `other`.
    #[inline]
    pub fn contains_rect(&self, other: &Rect) -> bool {
        !other.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.right_wide() <= self.right_wide()
            && other.bottom_wide() <= self.bottom_wide()
    }

    /// Returns `true` if the rectangles share at least one pixel.
    #[inline]
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.intersect(other).is_some()
    }

    /// Intersection, or `None` when the rectangles do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        if self.is_empty() || other.is_empty() {
            return None;
        }
        let left = self.x.max(other.x) as i64;
        let top = self.y.max(other.y) as i64;
        let right = self.right_wide().min(other.right_wide());
        let bottom = self.bottom_wide().min(other.bottom_wide());
        if right > left && bottom > top {
            Some(Self::from_edges(left, top, right, bottom))
        } else {
            None
        }
    }

    /// Smallest rectangle containing both. Empty inputs are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => Rect::default(),
            (true, false) => *other,
            (false, true) => *self,
            (false, false) => Self::from_edges(
                self.x.min(other.x) as i64,
                self.y.min(other.y) as i64,
                self.right_wide().max(other.right_wide()),
                self.bottom_wide().max(other.bottom_wide()),
            ),
        }
    }

    /// Same size, origin moved by (dx, dy), saturating.
    #[inline]
    pub const fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Grows every edge outward by `n` pixels.
    #[inline]
    pub fn expanded(&self, n: i32) -> Rect {
        Self::from_edges(
            self.x as i64 - n as i64,
            self.y as i64 - n as i64,
            self.right_wide() + n as i64,
            self.bottom_wide() + n as i64,
        )
    }

    /// The part of this rectangle inside the addressable range.
    ///
    /// ```rust
    /// use tilepaint_core::rect::{Rect, COORD_LIMIT};
    ///
    /// let r = Rect::new(COORD_LIMIT - 10, 0, 100, 5).clipped().unwrap();
    /// assert_eq!(r.width, 10);
    /// assert!(Rect::new(0, 0, 0, 5).clipped().is_none());
    /// ```
    pub fn clipped(&self) -> Option<Rect> {
        self.intersect(&Self::addressable())
    }

    /// Every pixel the canvas can hold.
    #[inline]
    pub const fn addressable() -> Rect {
        Rect::new(-COORD_LIMIT, -COORD_LIMIT, 2 * COORD_LIMIT, 2 * COORD_LIMIT)
    }

    /// Tile-coordinate rectangle covering every tile this rect touches.
    ///
    /// Uses floor division, so negative pixels land in negative tiles.
    ///
    /// ```rust
    /// use tilepaint_core::Rect;
    ///
    /// assert_eq!(Rect::new(-1, 0, 2, 64).to_tile_rect(64), Rect::new(-1, 0, 2, 1));
    /// assert_eq!(Rect::new(10, 10, 20, 20).to_tile_rect(64), Rect::new(0, 0, 1, 1));
    /// ```
    pub fn to_tile_rect(&self, tile_size: i32) -> Rect {
        if self.is_empty() {
            return Rect::default();
        }
        let ts = tile_size as i64;
        let tx0 = (self.x as i64).div_euclid(ts);
        let ty0 = (self.y as i64).div_euclid(ts);
        let tx1 = (self.right_wide() - 1).div_euclid(ts) + 1;
        let ty1 = (self.bottom_wide() - 1).div_euclid(ts) + 1;
        Self::from_edges(tx0, ty0, tx1, ty1)
    }

    /// Pixel rectangle covered by a tile-coordinate rectangle.
    pub fn from_tile_rect(tiles: &Rect, tile_size: i32) -> Rect {
        if tiles.is_empty() {
            return Rect::default();
        }
        let ts = tile_size as i64;
        Self::from_edges(
            tiles.x as i64 * ts,
            tiles.y as i64 * ts,
            tiles.right_wide() * ts,
            tiles.bottom_wide() * ts,
        )
    }

    /// Rectangle covering this one at `1 / factor` resolution.
    ///
    /// Edges are rounded outward so every source pixel maps into the result.
    pub fn scaled_down(&self, factor: i32) -> Rect {
        if self.is_empty() || factor <= 1 {
            return *self;
        }
        let f = factor as i64;
        Self::from_edges(
            (self.x as i64).div_euclid(f),
            (self.y as i64).div_euclid(f),
            (self.right_wide() + f - 1).div_euclid(f),
            (self.bottom_wide() + f - 1).div_euclid(f),
        )
    }

    /// Iterates row indices from top to bottom.
    #[inline]
    pub fn rows(&self) -> std::ops::Range<i32> {
        if self.is_empty() {
            0..0
        } else {
            self.y..self.bottom()
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert!(Rect::new(0, 0, 0, 10).is_empty());
        assert!(Rect::new(0, 0, 10, -3).is_empty());
        assert!(!Rect::new(-5, -5, 1, 1).is_empty());
        assert_eq!(Rect::new(0, 0, -4, 4).area(), 0);
    }

    #[test]
    fn test_intersect_negative() {
        let a = Rect::new(-100, -100, 150, 150);
        let b = Rect::new(0, 0, 100, 100);
        assert_eq!(a.intersect(&b), Some(Rect::new(0, 0, 50, 50)));
        assert_eq!(a.intersect(&Rect::new(50, 50, 1, 1)), None);
    }

    #[test]
    fn test_union_ignores_empty() {
        let a = Rect::new(10, 10, 5, 5);
        assert_eq!(a.union(&Rect::default()), a);
        assert_eq!(Rect::default().union(&a), a);
        assert_eq!(
            a.union(&Rect::new(-10, 0, 5, 5)),
            Rect::new(-10, 0, 25, 15)
        );
    }

    #[test]
    fn test_tile_rect_floor_division() {
        assert_eq!(Rect::new(-1, -1, 1, 1).to_tile_rect(64), Rect::new(-1, -1, 1, 1));
        assert_eq!(Rect::new(-64, 0, 64, 1).to_tile_rect(64), Rect::new(-1, 0, 1, 1));
        assert_eq!(Rect::new(-65, 0, 1, 1).to_tile_rect(64), Rect::new(-2, 0, 1, 1));
        assert_eq!(Rect::new(0, 0, 256, 256).to_tile_rect(64), Rect::new(0, 0, 4, 4));
        assert_eq!(Rect::new(63, 63, 2, 2).to_tile_rect(64), Rect::new(0, 0, 2, 2));
        assert_eq!(
            Rect::from_tile_rect(&Rect::new(-1, 0, 2, 1), 64),
            Rect::new(-64, 0, 128, 64)
        );
    }

    #[test]
    fn test_clip_to_addressable() {
        let huge = Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        let clipped = huge.clipped().unwrap();
        assert_eq!(clipped.x, -COORD_LIMIT);
        assert!(clipped.right() <= COORD_LIMIT);
        assert!(Rect::new(COORD_LIMIT, 0, 10, 10).clipped().is_none());
    }

    #[test]
    fn test_scaled_down_rounds_outward() {
        assert_eq!(Rect::new(1, 1, 3, 3).scaled_down(2), Rect::new(0, 0, 2, 2));
        assert_eq!(Rect::new(-3, 0, 2, 2).scaled_down(2), Rect::new(-2, 0, 2, 1));
        assert_eq!(Rect::new(0, 0, 256, 256).scaled_down(4), Rect::new(0, 0, 64, 64));
    }

    #[test]
    fn test_contains_edges() {
        let r = Rect::new(-10, -10, 20, 20);
        assert!(r.contains(-10, -10));
        assert!(r.contains(9, 9));
        assert!(!r.contains(10, 0));
        assert!(r.contains_rect(&Rect::new(-5, -5, 15, 15)));
        assert!(!r.contains_rect(&Rect::new(-5, -5, 16, 15)));
    }
}
