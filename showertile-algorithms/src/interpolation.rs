//! Near-core interpolation.
//!
//! Thinning leaves the tiles around the shower core without particles. The
//! interpolation disk covers them: its radius is set by the first populated
//! tile walking outward along the central row. Every tile inside the disk
//! takes its values from the sampling ring just outside it, along the ray
//! from the core through the tile.

use showertile_core::record::clamp_count;
use showertile_core::{BinCounts, Error, Result, TileGeometry, TileGrid, TimeTable, SENTINEL_TIME};

/// Distance added to the first populated tile center to get the disk radius (m).
pub const DISK_MARGIN_M: f64 = 2.0;

/// Distance from the disk edge to the sampling ring (m).
pub const RING_OFFSET_M: f64 = 7.5;

/// Extra tiles scanned beyond the first populated tile.
pub const SCAN_MARGIN_TILES: usize = 5;

/// Power of the radial lateral-distribution scaling.
pub const RADIAL_EXPONENT: f64 = 2.6;

/// Attenuation length of the zenith correction (m).
pub const ATTENUATION_LENGTH_M: f64 = 575.0;

/// One tile inside the disk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiskTile {
    /// Tile index along x.
    pub m: usize,
    /// Tile index along y.
    pub n: usize,
    /// Tile center x (m).
    pub x_m: f64,
    /// Tile center y (m).
    pub y_m: f64,
    /// Distance of the tile center from the core (m).
    pub radius_m: f64,
}

/// Extrapolation of one disk tile from its sampling tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadialScaling {
    /// Tile on the sampling ring along the ray through the disk tile.
    pub sample: (usize, usize),
    /// Multiplier applied to the sampled counts.
    pub count_factor: f64,
    /// Disk tile radius over sampling radius.
    pub radius_ratio: f64,
    /// Cosine of the shower zenith angle.
    pub cos_zenith: f64,
}

impl RadialScaling {
    /// Extrapolates one bin of the sampling tile onto the disk tile.
    ///
    /// Counts are truncated and capped at the counter ceiling. The
    /// inclination blends the sample's apparent cosine with the shower's by
    /// radius.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn scale(&self, sample: &BinCounts) -> BinCounts {
        let scaled = |count: u16| clamp_count((f64::from(count) * self.count_factor).floor()) as u16;
        let top = scaled(sample.top);
        let bottom = scaled(sample.bottom);

        let sample_mean = 0.5 * (f64::from(sample.top) + f64::from(sample.bottom));
        let inclination = if sample_mean > 0.0 {
            let cos_sample = f64::from(sample.inclination) / sample_mean;
            let mean = 0.5 * (f64::from(top) + f64::from(bottom));
            let blended = self.radius_ratio * cos_sample + (1.0 - self.radius_ratio) * self.cos_zenith;
            clamp_count((blended * mean).floor()) as u16
        } else {
            0
        };
        BinCounts::new(top, bottom, inclination)
    }
}

/// Core region whose values are extrapolated from the ring around it.
#[derive(Clone, Debug)]
pub struct InterpolationDisk {
    geometry: TileGeometry,
    radius_m: f64,
    half_extent: usize,
    tiles: Vec<DiskTile>,
}

impl InterpolationDisk {
    /// Places the disk from a minimum-time table.
    ///
    /// # Errors
    /// Returns `Error::EmptyShower` if no tile on the central row, from the
    /// center outward, was ever reached.
    pub fn locate(geometry: &TileGeometry, times: &TimeTable) -> Result<Self> {
        let (center_m, center_n) = geometry.center_tile();
        let edge = (center_m..geometry.nx())
            .find(|&m| times.is_set(m, center_n))
            .ok_or(Error::EmptyShower)?;
        let radius_m = geometry.tile_center(edge) + DISK_MARGIN_M;
        let half_extent = edge - center_m + SCAN_MARGIN_TILES;
        log::debug!("interpolation disk radius {radius_m} m (first populated tile m = {edge})");
        Ok(Self::with_radius(geometry, radius_m, half_extent))
    }

    /// Builds a disk of a given radius, scanning `half_extent` tiles around
    /// the center.
    #[must_use]
    pub fn with_radius(geometry: &TileGeometry, radius_m: f64, half_extent: usize) -> Self {
        let (center_m, center_n) = geometry.center_tile();
        let m_range = center_m.saturating_sub(half_extent)..(center_m + half_extent).min(geometry.nx());
        let mut tiles = Vec::new();
        for m in m_range {
            let n_range =
                center_n.saturating_sub(half_extent)..(center_n + half_extent).min(geometry.ny());
            for n in n_range {
                let (x_m, y_m) = geometry.tile_center_xy(m, n);
                let radius = x_m.hypot(y_m);
                if radius < radius_m {
                    tiles.push(DiskTile {
                        m,
                        n,
                        x_m,
                        y_m,
                        radius_m: radius,
                    });
                }
            }
        }
        Self {
            geometry: *geometry,
            radius_m,
            half_extent,
            tiles,
        }
    }

    /// Disk radius (m).
    #[must_use]
    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Radius of the ring the disk is sampled from (m).
    #[must_use]
    pub fn sampling_radius_m(&self) -> f64 {
        self.radius_m + RING_OFFSET_M
    }

    /// Tiles scanned on each side of the center.
    #[must_use]
    pub fn half_extent(&self) -> usize {
        self.half_extent
    }

    /// Tiles inside the disk.
    #[must_use]
    pub fn tiles(&self) -> &[DiskTile] {
        &self.tiles
    }

    /// Mask of the disk tiles over the whole grid.
    #[must_use]
    pub fn mask(&self) -> TileGrid<bool> {
        let mut mask = TileGrid::for_geometry(&self.geometry, false);
        for tile in &self.tiles {
            mask[(tile.m, tile.n)] = true;
        }
        mask
    }

    /// Ring tiles on both sides of the core along the ray through `tile`.
    /// A side falling off the grid is `None`.
    #[must_use]
    pub fn ring_tiles(&self, tile: &DiskTile) -> (Option<(usize, usize)>, Option<(usize, usize)>) {
        let factor = self.sampling_radius_m() / tile.radius_m;
        let x_cm = 100.0 * tile.x_m * factor;
        let y_cm = 100.0 * tile.y_m * factor;
        (
            self.geometry.tile_of(x_cm, y_cm).ok(),
            self.geometry.tile_of(-x_cm, -y_cm).ok(),
        )
    }

    /// Fills the disk tiles of a minimum-time table.
    ///
    /// The value is the mean of the two opposite ring tiles plus their
    /// difference shrunk by the outward scale factor. A missing side falls
    /// back to the other; with both missing the tile becomes unvisited.
    /// Returns the number of tiles filled.
    #[allow(clippy::cast_possible_truncation)]
    pub fn interpolate_times(&self, times: &mut TimeTable) -> usize {
        let ring_value = |times: &TimeTable, tile: Option<(usize, usize)>| {
            tile.filter(|&(m, n)| times.is_set(m, n))
                .map(|(m, n)| f64::from(times[(m, n)]))
        };
        let mut filled = 0;
        for tile in &self.tiles {
            let (near, far) = self.ring_tiles(tile);
            let factor = self.sampling_radius_m() / tile.radius_m;
            let value = match (ring_value(times, near), ring_value(times, far)) {
                (Some(near), Some(far)) => 0.5 * (near + far) + (near - far) / factor / 2.0,
                (Some(single), None) | (None, Some(single)) => single,
                (None, None) => {
                    times[(tile.m, tile.n)] = SENTINEL_TIME;
                    continue;
                }
            };
            times[(tile.m, tile.n)] = value as f32;
            filled += 1;
        }
        filled
    }

    /// Count scaling for a disk tile.
    ///
    /// Returns `None` if the sampling tile falls off the grid.
    #[must_use]
    pub fn scaling(&self, tile: &DiskTile, zenith_rad: f64) -> Option<RadialScaling> {
        let sampling_radius = self.sampling_radius_m();
        let factor = sampling_radius / tile.radius_m;
        let cos_zenith = zenith_rad.cos();
        let zenith_correction = (tile.x_m * cos_zenith).hypot(tile.y_m) / tile.radius_m;
        let sample = self
            .geometry
            .tile_of(100.0 * tile.x_m * factor, 100.0 * tile.y_m * factor)
            .ok()?;
        Some(RadialScaling {
            sample,
            count_factor: factor.powf(RADIAL_EXPONENT)
                * (zenith_correction * (sampling_radius - tile.radius_m) / ATTENUATION_LENGTH_M)
                    .exp(),
            radius_ratio: tile.radius_m / sampling_radius,
            cos_zenith,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 100 x 100 tiles of 6 m, populated only beyond `hole_m` from the core
    /// with times growing along x.
    fn ring_table(geometry: &TileGeometry, hole_m: f64) -> TimeTable {
        let mut times = TimeTable::unvisited(geometry);
        for m in 0..geometry.nx() {
            for n in 0..geometry.ny() {
                let (x, y) = geometry.tile_center_xy(m, n);
                if x.hypot(y) > hole_m {
                    times[(m, n)] = (50_000.0 + x) as f32;
                }
            }
        }
        times
    }

    #[test]
    fn test_locate_disk() {
        let geometry = TileGeometry::new(600.0, 6.0).unwrap();
        let times = ring_table(&geometry, 40.0);
        let disk = InterpolationDisk::locate(&geometry, &times).unwrap();
        // first populated center on the central row: 45 m (tile 57)
        assert_relative_eq!(disk.radius_m(), 47.0);
        assert_eq!(disk.half_extent(), 7 + SCAN_MARGIN_TILES);
        assert!(disk.tiles().iter().all(|t| t.radius_m < 47.0));
        assert!(disk.mask()[(50, 50)]);
        assert!(!disk.mask()[(58, 50)]);
    }

    #[test]
    fn test_empty_shower() {
        let geometry = TileGeometry::new(600.0, 6.0).unwrap();
        let times = TimeTable::unvisited(&geometry);
        assert!(matches!(
            InterpolationDisk::locate(&geometry, &times),
            Err(Error::EmptyShower)
        ));
    }

    #[test]
    fn test_interpolated_times_lie_between_ring_values() {
        let geometry = TileGeometry::new(600.0, 6.0).unwrap();
        let mut times = ring_table(&geometry, 40.0);
        let disk = InterpolationDisk::locate(&geometry, &times).unwrap();
        let filled = disk.interpolate_times(&mut times);
        assert_eq!(filled, disk.tiles().len());
        for tile in disk.tiles() {
            let (near, far) = disk.ring_tiles(tile);
            let near = times[near.unwrap()];
            let far = times[far.unwrap()];
            let value = times[(tile.m, tile.n)];
            assert!(value >= near.min(far) && value <= near.max(far));
        }
    }

    #[test]
    fn test_one_sided_ring() {
        let geometry = TileGeometry::new(600.0, 6.0).unwrap();
        let mut times = ring_table(&geometry, 40.0);
        // wipe the negative-x half of the ring
        for m in 0..50 {
            for n in 0..100 {
                times[(m, n)] = SENTINEL_TIME;
            }
        }
        let disk = InterpolationDisk::with_radius(&geometry, 47.0, 12);
        disk.interpolate_times(&mut times);
        let tile = disk
            .tiles()
            .iter()
            .find(|t| t.m == 51 && t.n == 50)
            .unwrap();
        let (near, _) = disk.ring_tiles(tile);
        assert!((times[(51, 50)] - times[near.unwrap()]).abs() < f32::EPSILON);
        // a tile on the wiped side whose ring tiles are both gone stays unvisited
        let (near, far) = disk.ring_tiles(disk.tiles().iter().find(|t| t.m == 49 && t.n == 49).unwrap());
        assert!(!times.is_set(near.unwrap().0, near.unwrap().1));
        assert!(times.is_set(far.unwrap().0, far.unwrap().1));
    }

    #[test]
    fn test_scaled_counts_bounded() {
        let geometry = TileGeometry::new(600.0, 6.0).unwrap();
        // disk covering tiles within 50 m of the core
        let disk = InterpolationDisk::with_radius(&geometry, 50.0, 12);
        let sample = BinCounts::new(400, 300, 300);
        let sampling_radius = disk.sampling_radius_m();
        for tile in disk.tiles() {
            let scaling = disk.scaling(tile, 0.3).unwrap();
            let scaled = scaling.scale(&sample);
            let rf = sampling_radius / tile.radius_m;
            let bound = rf.powf(RADIAL_EXPONENT) * ((sampling_radius - tile.radius_m) / ATTENUATION_LENGTH_M).exp();
            assert!(scaled.top > 0);
            assert!(f64::from(scaled.top) <= (400.0 * bound).min(60_000.0));
            assert!(f64::from(scaled.bottom) <= (300.0 * bound).min(60_000.0));
            assert!(2 * u32::from(scaled.inclination) <= u32::from(scaled.top) + u32::from(scaled.bottom));
        }
    }

    #[test]
    fn test_scale_empty_sample() {
        let scaling = RadialScaling {
            sample: (0, 0),
            count_factor: 3.0,
            radius_ratio: 0.5,
            cos_zenith: 1.0,
        };
        assert_eq!(scaling.scale(&BinCounts::default()), BinCounts::default());
    }
}
