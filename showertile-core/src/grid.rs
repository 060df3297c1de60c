//! Tile grid and coordinate mapping.
//!
//! The grid is a square of `n × n` tiles centered on the shower core.
//! Particle coordinates arrive in centimeters (as written by CORSIKA);
//! tile centers are reported in meters.

use crate::config::GridConfig;
use crate::{Error, Result};
use std::ops::{Index, IndexMut};

/// Minimum-arrival-time value of a tile that never received a particle.
pub const SENTINEL_TIME: f32 = 1.0e9;

/// Geometry of the square tile grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileGeometry {
    half_side_m: f64,
    tile_side_m: f64,
    tiles: usize,
}

impl TileGeometry {
    /// Creates a geometry from the footprint side and the tile side (meters).
    ///
    /// # Errors
    /// Returns `Error::ConfigError` unless the footprint holds a whole, even
    /// number of tiles that fits the 16-bit tile index of the record format.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn new(map_side_m: f64, tile_side_m: f64) -> Result<Self> {
        if !(tile_side_m > 0.0 && map_side_m > tile_side_m) {
            return Err(Error::ConfigError(format!(
                "map side {map_side_m} m must exceed a positive tile side {tile_side_m} m"
            )));
        }
        let ratio = map_side_m / tile_side_m;
        let tiles = ratio.round();
        if (ratio - tiles).abs() > 1e-9 {
            return Err(Error::ConfigError(format!(
                "map side {map_side_m} m is not a whole number of {tile_side_m} m tiles"
            )));
        }
        let tiles = tiles as usize;
        if tiles % 2 != 0 || tiles > usize::from(u16::MAX) {
            return Err(Error::ConfigError(format!(
                "tile count per side must be even and at most {}, got {tiles}",
                u16::MAX
            )));
        }
        Ok(Self {
            half_side_m: map_side_m / 2.0,
            tile_side_m,
            tiles,
        })
    }

    /// Creates a geometry from configuration.
    ///
    /// # Errors
    /// See [`TileGeometry::new`].
    pub fn from_config(config: &GridConfig) -> Result<Self> {
        Self::new(config.map_side_m, config.tile_side_m)
    }

    /// Number of tiles along x.
    #[inline]
    #[must_use]
    pub fn nx(&self) -> usize {
        self.tiles
    }

    /// Number of tiles along y.
    #[inline]
    #[must_use]
    pub fn ny(&self) -> usize {
        self.tiles
    }

    /// Total number of tiles.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles * self.tiles
    }

    /// Tile whose lower-left corner sits at the grid center.
    #[must_use]
    pub fn center_tile(&self) -> (usize, usize) {
        (self.tiles / 2, self.tiles / 2)
    }

    /// Half of the footprint side (meters).
    #[must_use]
    pub fn half_side_m(&self) -> f64 {
        self.half_side_m
    }

    /// Half of the footprint side (centimeters).
    #[must_use]
    pub fn half_side_cm(&self) -> f64 {
        self.half_side_m * 100.0
    }

    /// Tile side (meters).
    #[must_use]
    pub fn tile_side_m(&self) -> f64 {
        self.tile_side_m
    }

    /// Maps a coordinate in centimeters to a tile index.
    ///
    /// # Errors
    /// Returns `Error::TileOutOfRange` if the coordinate lies outside the footprint.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn tile_index(&self, coord_cm: f64) -> Result<usize> {
        let index = ((coord_cm / 100.0 + self.half_side_m) / self.tile_side_m).floor();
        if index >= 0.0 && index < self.tiles as f64 {
            Ok(index as usize)
        } else {
            Err(Error::TileOutOfRange {
                coord_cm,
                tiles: self.tiles,
            })
        }
    }

    /// Maps a position in centimeters to tile indices `(m, n)`.
    ///
    /// # Errors
    /// Returns `Error::TileOutOfRange` if either coordinate lies outside the footprint.
    pub fn tile_of(&self, x_cm: f64, y_cm: f64) -> Result<(usize, usize)> {
        Ok((self.tile_index(x_cm)?, self.tile_index(y_cm)?))
    }

    /// Center of a tile along one axis (meters).
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn tile_center(&self, index: usize) -> f64 {
        (index as f64 + 0.5) * self.tile_side_m - self.half_side_m
    }

    /// Center of tile `(m, n)` (meters).
    #[must_use]
    pub fn tile_center_xy(&self, m: usize, n: usize) -> (f64, f64) {
        (self.tile_center(m), self.tile_center(n))
    }

    /// True when both coordinates (centimeters) lie strictly inside the footprint.
    #[must_use]
    pub fn contains_cm(&self, x_cm: f64, y_cm: f64) -> bool {
        let limit = self.half_side_cm();
        x_cm.abs() < limit && y_cm.abs() < limit
    }
}

/// Owned, row-major `nx × ny` array of per-tile values.
#[derive(Clone, Debug, PartialEq)]
pub struct TileGrid<T> {
    nx: usize,
    ny: usize,
    cells: Vec<T>,
}

/// Per-tile minimum arrival times (nanoseconds).
pub type TimeTable = TileGrid<f32>;

impl<T: Clone> TileGrid<T> {
    /// Creates a grid with every tile set to `value`.
    #[must_use]
    pub fn filled(nx: usize, ny: usize, value: T) -> Self {
        Self {
            nx,
            ny,
            cells: vec![value; nx * ny],
        }
    }

    /// Creates a grid shaped like `geometry` with every tile set to `value`.
    #[must_use]
    pub fn for_geometry(geometry: &TileGeometry, value: T) -> Self {
        Self::filled(geometry.nx(), geometry.ny(), value)
    }

    /// Sets every tile to `value`.
    pub fn fill(&mut self, value: T) {
        self.cells.fill(value);
    }
}

impl<T> TileGrid<T> {
    /// Wraps an existing row-major buffer.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the buffer length is not `nx * ny`.
    pub fn from_vec(nx: usize, ny: usize, cells: Vec<T>) -> Result<Self> {
        if cells.len() != nx * ny {
            return Err(Error::ConfigError(format!(
                "grid buffer holds {} values, expected {nx} x {ny}",
                cells.len()
            )));
        }
        Ok(Self { nx, ny, cells })
    }

    /// Number of tiles along x.
    #[must_use]
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Number of tiles along y.
    #[must_use]
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Row-major view of all tiles.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    /// Mutable row-major view of all tiles.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.cells
    }

    /// Iterates over `((m, n), value)` pairs in row-major order.
    pub fn iter_indexed(&self) -> impl Iterator<Item = ((usize, usize), &T)> + '_ {
        let ny = self.ny;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, value)| ((i / ny, i % ny), value))
    }
}

impl<T> Index<(usize, usize)> for TileGrid<T> {
    type Output = T;

    #[inline]
    fn index(&self, (m, n): (usize, usize)) -> &T {
        &self.cells[m * self.ny + n]
    }
}

impl<T> IndexMut<(usize, usize)> for TileGrid<T> {
    #[inline]
    fn index_mut(&mut self, (m, n): (usize, usize)) -> &mut T {
        &mut self.cells[m * self.ny + n]
    }
}

impl TimeTable {
    /// Creates a time table with every tile at [`SENTINEL_TIME`].
    #[must_use]
    pub fn unvisited(geometry: &TileGeometry) -> Self {
        Self::for_geometry(geometry, SENTINEL_TIME)
    }

    /// True when tile `(m, n)` has received a time.
    #[allow(clippy::float_cmp)]
    #[inline]
    #[must_use]
    pub fn is_set(&self, m: usize, n: usize) -> bool {
        self[(m, n)] != SENTINEL_TIME
    }
}
