//! Tile grid storage and feature queries.

use serde::{Deserialize, Serialize};
use tidepool_geom::{PixelRect, TileSpan, tile_containing};

use crate::error::WorldError;

/// Feature code carried by one terrain tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Feature {
    /// Passable, no effect.
    Air = 0,
    /// Impassable ground.
    Solid = 1,
    /// Passable, damages most species on a timer.
    Water = 2,
    /// Passable, damages on first touch and on a timer.
    Magma = 3,
}

impl Feature {
    /// Number of distinct feature codes.
    pub const COUNT: usize = 4;

    /// All feature codes in numeric order.
    pub const ALL: [Self; Self::COUNT] = [Self::Air, Self::Solid, Self::Water, Self::Magma];

    /// Numeric code of the feature.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Feature for a numeric code, if the code is known.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Air),
            1 => Some(Self::Solid),
            2 => Some(Self::Water),
            3 => Some(Self::Magma),
            _ => None,
        }
    }

    /// True for impassable terrain.
    #[must_use]
    pub const fn is_solid(self) -> bool {
        matches!(self, Self::Solid)
    }
}

/// Presence vector over the four feature codes, indexed by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeaturePresence([bool; Feature::COUNT]);

impl FeaturePresence {
    /// True when the probed rectangle touched at least one tile of `feature`.
    #[must_use]
    pub const fn contains(&self, feature: Feature) -> bool {
        self.0[feature as usize]
    }

    /// The raw presence flags, indexed by feature code.
    #[must_use]
    pub const fn as_array(&self) -> [bool; Feature::COUNT] {
        self.0
    }

    pub(crate) fn mark(&mut self, feature: Feature) {
        self.0[feature as usize] = true;
    }
}

/// Fixed-size grid of terrain tiles.
///
/// Tile coordinates are zero-based from the bottom-left corner; pixel
/// coordinates cover `[0, width * tile_size)` by `[0, height * tile_size)`.
/// Cell mutation is gated by the owning world's phase, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainGrid {
    tile_size: u32,
    width: u32,
    height: u32,
    cells: Vec<Feature>,
}

impl TerrainGrid {
    /// Construct an all-air grid of `width * height` tiles.
    pub fn new(tile_size: u32, width: u32, height: u32) -> Result<Self, WorldError> {
        if tile_size == 0 {
            return Err(WorldError::InvalidConfig("tile_size must be non-zero"));
        }
        if width == 0 || height == 0 {
            return Err(WorldError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        Ok(Self {
            tile_size,
            width,
            height,
            cells: vec![Feature::Air; (width as usize) * (height as usize)],
        })
    }

    /// Grid width in tiles.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Edge length of one tile in pixels.
    #[must_use]
    pub const fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// World width in pixels.
    #[must_use]
    pub const fn pixel_width(&self) -> i64 {
        self.width as i64 * self.tile_size as i64
    }

    /// World height in pixels.
    #[must_use]
    pub const fn pixel_height(&self) -> i64 {
        self.height as i64 * self.tile_size as i64
    }

    /// Returns the flat index for `(x, y)` without bounds checks.
    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Feature at a tile coordinate, if inside the grid.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<Feature> {
        if x < self.width && y < self.height {
            Some(self.cells[self.offset(x, y)])
        } else {
            None
        }
    }

    /// Mutable feature slot at a tile coordinate, if inside the grid.
    pub fn get_mut(&mut self, x: u32, y: u32) -> Option<&mut Feature> {
        if x < self.width && y < self.height {
            let idx = self.offset(x, y);
            Some(&mut self.cells[idx])
        } else {
            None
        }
    }

    /// Bounds-checked read of a tile's feature code.
    pub fn feature_at(&self, tx: i64, ty: i64) -> Result<Feature, WorldError> {
        self.checked_tile(tx, ty)
            .map(|(x, y)| self.cells[self.offset(x, y)])
    }

    /// Bounds-checked write of a tile's feature code.
    pub fn set_feature(&mut self, tx: i64, ty: i64, feature: Feature) -> Result<(), WorldError> {
        let (x, y) = self.checked_tile(tx, ty)?;
        let idx = self.offset(x, y);
        self.cells[idx] = feature;
        Ok(())
    }

    /// Tile containing the pixel `(px, py)`.
    pub fn tile_at_pixel(&self, px: i64, py: i64) -> Result<(u32, u32), WorldError> {
        let (tx, ty) = tile_containing(px, py, self.tile_size);
        self.checked_tile(tx, ty)
    }

    /// True when every corner of `rect` lies inside the world's pixel extent.
    #[must_use]
    pub fn contains_rect(&self, rect: &PixelRect) -> bool {
        rect.left() >= 0
            && rect.bottom() >= 0
            && rect.right() < self.pixel_width()
            && rect.top() < self.pixel_height()
    }

    /// Inclusive range of tiles intersected by `rect`.
    ///
    /// Fails with an out-of-bounds error if any corner of the rectangle lies
    /// outside the world; iterate the returned span for the tile coordinates
    /// in scan order (bottom row upward, left to right).
    pub fn span_for_rect(&self, rect: &PixelRect) -> Result<TileSpan, WorldError> {
        if !self.contains_rect(rect) {
            let (tx, ty) = tile_containing(rect.left(), rect.bottom(), self.tile_size);
            return Err(WorldError::OutOfBounds {
                x: tx,
                y: ty,
                width: self.width,
                height: self.height,
            });
        }
        Ok(rect.tile_span(self.tile_size))
    }

    /// Presence vector of the features intersected by `rect`.
    pub fn features_in_rect(&self, rect: &PixelRect) -> Result<FeaturePresence, WorldError> {
        let span = self.span_for_rect(rect)?;
        Ok(self.probe_span(&span))
    }

    /// Presence vector over a span already known to be inside the grid;
    /// out-of-range cells are skipped rather than reported.
    pub(crate) fn probe_span(&self, span: &TileSpan) -> FeaturePresence {
        let mut presence = FeaturePresence::default();
        for (tx, ty) in span.cells() {
            if tx < 0 || ty < 0 {
                continue;
            }
            if let Some(feature) = self.get(tx as u32, ty as u32) {
                presence.mark(feature);
            }
        }
        presence
    }

    /// True when any tile of `span` carries `feature`; cells outside the
    /// grid are skipped.
    pub(crate) fn span_has(&self, span: &TileSpan, feature: Feature) -> bool {
        span.cells().any(|(tx, ty)| {
            tx >= 0 && ty >= 0 && self.get(tx as u32, ty as u32) == Some(feature)
        })
    }

    fn checked_tile(&self, tx: i64, ty: i64) -> Result<(u32, u32), WorldError> {
        if tx >= 0 && ty >= 0 && tx < i64::from(self.width) && ty < i64::from(self.height) {
            Ok((tx as u32, ty as u32))
        } else {
            Err(WorldError::OutOfBounds {
                x: tx,
                y: ty,
                width: self.width,
                height: self.height,
            })
        }
    }
}
