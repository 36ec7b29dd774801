//! Pixel-rectangle, perimeter, and tile-span geometry shared by the
//! simulation core.
//!
//! Everything in this crate works on truncated pixel coordinates: rectangles
//! are anchored at their bottom-left pixel and store their footprint in whole
//! pixels, with inclusive `right`/`top` edges. Contact between two rectangles
//! is defined by perimeter coincidence (a one-pixel-wide edge of one shares
//! cells with the facing edge of the other), not by area overlap, which is
//! what the collision scan in the core consumes.

use serde::{Deserialize, Serialize};

/// Rectangular pixel footprint anchored at its bottom-left corner.
///
/// Coordinates are signed so callers can form probe rectangles that hang off
/// the world edge; emptiness is ruled out at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    left: i64,
    bottom: i64,
    width: u32,
    height: u32,
}

impl PixelRect {
    /// Create a rectangle from its bottom-left corner and footprint.
    ///
    /// Zero-sized footprints have no perimeter and are rejected by debug
    /// assertion; release builds treat them as a one-pixel cell.
    #[must_use]
    pub fn new(left: i64, bottom: i64, width: u32, height: u32) -> Self {
        debug_assert!(width > 0 && height > 0, "pixel rects must be non-empty");
        Self {
            left,
            bottom,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Leftmost pixel column.
    #[must_use]
    pub const fn left(&self) -> i64 {
        self.left
    }

    /// Bottommost pixel row.
    #[must_use]
    pub const fn bottom(&self) -> i64 {
        self.bottom
    }

    /// Footprint width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Footprint height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Rightmost pixel column (inclusive).
    #[must_use]
    pub const fn right(&self) -> i64 {
        self.left + self.width as i64 - 1
    }

    /// Topmost pixel row (inclusive).
    #[must_use]
    pub const fn top(&self) -> i64 {
        self.bottom + self.height as i64 - 1
    }

    /// The same anchor with a different footprint.
    #[must_use]
    pub fn resized(&self, width: u32, height: u32) -> Self {
        Self::new(self.left, self.bottom, width, height)
    }

    /// True when `(x, y)` lies inside the rectangle.
    #[must_use]
    pub const fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.left && x <= self.right() && y >= self.bottom && y <= self.top()
    }

    /// Area overlap test with inclusive edges.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.left <= other.right()
            && other.left <= self.right()
            && self.bottom <= other.top()
            && other.bottom <= self.top()
    }

    /// Shrink the rectangle by `margin` pixels on every side.
    ///
    /// Returns `None` when the footprint is too small to survive the inset;
    /// the core uses the one-pixel inset to test solidity without counting a
    /// body's own perimeter as an overlap.
    #[must_use]
    pub fn inset(&self, margin: u32) -> Option<Self> {
        let shrink = margin as u64 * 2;
        if (self.width as u64) <= shrink || (self.height as u64) <= shrink {
            return None;
        }
        Some(Self {
            left: self.left + margin as i64,
            bottom: self.bottom + margin as i64,
            width: self.width - margin * 2,
            height: self.height - margin * 2,
        })
    }

    /// True when this rectangle's left perimeter shares cells with the
    /// other's right perimeter.
    #[must_use]
    pub const fn contact_left(&self, other: &Self) -> bool {
        self.left == other.right() && rows_meet(self, other)
    }

    /// True when this rectangle's right perimeter shares cells with the
    /// other's left perimeter.
    #[must_use]
    pub const fn contact_right(&self, other: &Self) -> bool {
        self.right() == other.left && rows_meet(self, other)
    }

    /// True when this rectangle's bottom perimeter shares cells with the
    /// other's top perimeter.
    #[must_use]
    pub const fn contact_bottom(&self, other: &Self) -> bool {
        self.bottom == other.top() && columns_meet(self, other)
    }

    /// True when this rectangle's top perimeter shares cells with the
    /// other's bottom perimeter.
    #[must_use]
    pub const fn contact_top(&self, other: &Self) -> bool {
        self.top() == other.bottom && columns_meet(self, other)
    }

    /// Horizontal contact in either orientation.
    #[must_use]
    pub const fn horizontal_contact(&self, other: &Self) -> bool {
        self.contact_left(other) || self.contact_right(other)
    }

    /// Vertical contact in either orientation.
    #[must_use]
    pub const fn vertical_contact(&self, other: &Self) -> bool {
        self.contact_bottom(other) || self.contact_top(other)
    }

    /// Any perimeter contact between the two rectangles.
    #[must_use]
    pub const fn any_contact(&self, other: &Self) -> bool {
        self.horizontal_contact(other) || self.vertical_contact(other)
    }

    /// Inclusive range of tile coordinates intersected by the rectangle.
    #[must_use]
    pub fn tile_span(&self, tile_size: u32) -> TileSpan {
        let size = tile_size.max(1);
        let (x0, y0) = tile_containing(self.left, self.bottom, size);
        let (x1, y1) = tile_containing(self.right(), self.top(), size);
        TileSpan { x0, y0, x1, y1 }
    }
}

/// Shared rows between two rectangles' vertical extents.
const fn rows_meet(a: &PixelRect, b: &PixelRect) -> bool {
    a.bottom <= b.top() && b.bottom <= a.top()
}

/// Shared columns between two rectangles' horizontal extents.
const fn columns_meet(a: &PixelRect, b: &PixelRect) -> bool {
    a.left <= b.right() && b.left <= a.right()
}

/// Tile coordinate containing the pixel `(px, py)` for a given tile size.
///
/// Uses euclidean division so pixels left of or below the origin map to
/// negative tile coordinates instead of rounding toward zero.
#[must_use]
pub const fn tile_containing(px: i64, py: i64, tile_size: u32) -> (i64, i64) {
    let size = tile_size as i64;
    (px.div_euclid(size), py.div_euclid(size))
}

/// Bottom-left pixel of the tile at `(tx, ty)` for a given tile size.
#[must_use]
pub const fn tile_bottom_left(tx: i64, ty: i64, tile_size: u32) -> (i64, i64) {
    let size = tile_size as i64;
    (tx * size, ty * size)
}

/// Inclusive rectangular range of tile coordinates.
///
/// Iteration is row-major from the bottom row upward and left to right within
/// each row; the core relies on that order for its deterministic first-match
/// scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileSpan {
    /// Leftmost tile column.
    pub x0: i64,
    /// Bottommost tile row.
    pub y0: i64,
    /// Rightmost tile column (inclusive).
    pub x1: i64,
    /// Topmost tile row (inclusive).
    pub y1: i64,
}

impl TileSpan {
    /// Number of tiles covered by the span.
    #[must_use]
    pub const fn len(&self) -> u64 {
        let cols = (self.x1 - self.x0 + 1) as u64;
        let rows = (self.y1 - self.y0 + 1) as u64;
        cols * rows
    }

    /// True when the span covers no tiles; cannot occur for spans derived
    /// from a non-empty [`PixelRect`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.x1 < self.x0 || self.y1 < self.y0
    }

    /// True when the two spans share at least one tile.
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.x0 <= other.x1 && other.x0 <= self.x1 && self.y0 <= other.y1 && other.y0 <= self.y1
    }

    /// True when `(tx, ty)` lies inside the span.
    #[must_use]
    pub const fn contains(&self, tx: i64, ty: i64) -> bool {
        tx >= self.x0 && tx <= self.x1 && ty >= self.y0 && ty <= self.y1
    }

    /// Tile coordinates in scan order: bottom row to top row, left to right.
    pub fn cells(&self) -> impl Iterator<Item = (i64, i64)> {
        let (x0, x1) = (self.x0, self.x1);
        (self.y0..=self.y1).flat_map(move |y| (x0..=x1).map(move |x| (x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(left: i64, bottom: i64, width: u32, height: u32) -> PixelRect {
        PixelRect::new(left, bottom, width, height)
    }

    #[test]
    fn inclusive_edges_cover_the_footprint() {
        let r = rect(10, 20, 4, 3);
        assert_eq!(r.right(), 13);
        assert_eq!(r.top(), 22);
        assert!(r.contains(13, 22));
        assert!(!r.contains(14, 22));
    }

    #[test]
    fn resizing_keeps_the_anchor() {
        let r = rect(10, 20, 4, 3).resized(6, 8);
        assert_eq!((r.left(), r.bottom()), (10, 20));
        assert_eq!((r.width(), r.height()), (6, 8));
        assert_eq!(r.right(), 15);
        assert_eq!(r.top(), 27);
    }

    #[test]
    fn overlap_is_commutative() {
        let a = rect(0, 0, 10, 10);
        let b = rect(9, 9, 5, 5);
        let c = rect(20, 0, 3, 3);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn horizontal_contact_is_symmetric() {
        // a's right column sits exactly on b's left column.
        let a = rect(0, 0, 5, 5);
        let b = rect(4, 3, 5, 5);
        assert!(a.contact_right(&b));
        assert!(b.contact_left(&a));
        assert!(a.horizontal_contact(&b));
        assert!(b.horizontal_contact(&a));
        // One row apart: columns align but no shared rows.
        let c = rect(4, 6, 5, 5);
        assert!(!a.contact_right(&c));
        assert!(!c.contact_left(&a));
    }

    #[test]
    fn vertical_contact_distinguishes_top_and_bottom() {
        let lower = rect(0, 0, 6, 4);
        let upper = rect(2, 3, 6, 4);
        assert!(upper.contact_bottom(&lower));
        assert!(lower.contact_top(&upper));
        assert!(!upper.contact_top(&lower));
        assert!(!lower.contact_bottom(&upper));
    }

    #[test]
    fn deep_overlap_is_not_perimeter_contact() {
        let a = rect(0, 0, 8, 8);
        let b = rect(2, 2, 2, 2);
        assert!(a.overlaps(&b));
        assert!(!a.any_contact(&b));
    }

    #[test]
    fn inset_drops_the_perimeter() {
        let r = rect(5, 5, 4, 3);
        let inner = r.inset(1).expect("4x3 survives a one pixel inset");
        assert_eq!((inner.left(), inner.bottom()), (6, 6));
        assert_eq!((inner.width(), inner.height()), (2, 1));
        assert!(rect(0, 0, 2, 5).inset(1).is_none());
    }

    #[test]
    fn tile_containing_floors_negative_pixels() {
        assert_eq!(tile_containing(0, 0, 16), (0, 0));
        assert_eq!(tile_containing(15, 15, 16), (0, 0));
        assert_eq!(tile_containing(16, 31, 16), (1, 1));
        assert_eq!(tile_containing(-1, -16, 16), (-1, -1));
        assert_eq!(tile_containing(-17, 5, 16), (-2, 0));
    }

    #[test]
    fn tile_round_trip_stays_within_one_tile() {
        for px in [0_i64, 7, 15, 16, 33, 255, 1000] {
            for py in [0_i64, 3, 31, 64, 999] {
                let (tx, ty) = tile_containing(px, py, 32);
                let (bx, by) = tile_bottom_left(tx, ty, 32);
                assert!(bx <= px && px - bx < 32, "x round trip for {px}");
                assert!(by <= py && py - by < 32, "y round trip for {py}");
            }
        }
    }

    #[test]
    fn tile_span_scans_bottom_to_top_left_to_right() {
        // 20x20 rect across a 16px grid touches a 2x2 block of tiles.
        let span = rect(8, 8, 20, 20).tile_span(16);
        let cells: Vec<_> = span.cells().collect();
        assert_eq!(cells, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert_eq!(span.len(), 4);
        assert!(!span.is_empty());
    }

    #[test]
    fn tile_span_intersection_matches_cell_sharing() {
        let a = rect(0, 0, 32, 32).tile_span(16);
        let b = rect(31, 31, 10, 10).tile_span(16);
        let c = rect(64, 0, 8, 8).tile_span(16);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(a.contains(1, 1));
        assert!(!a.contains(4, 0));
    }

    #[test]
    fn single_pixel_rect_has_coincident_edges() {
        let dot = rect(3, 3, 1, 1);
        assert_eq!(dot.right(), 3);
        assert_eq!(dot.top(), 3);
        let beside = rect(4, 3, 1, 1);
        assert!(dot.contact_right(&beside));
        assert!(beside.contact_left(&dot));
    }
}
