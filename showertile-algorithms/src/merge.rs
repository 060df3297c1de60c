//! Sparse merge of partial tile files.
//!
//! Workers that process disjoint particle subsets observe different
//! per-tile minimum times. Their records carry global bins (whole bins since
//! the shower reference time), so the merge sums counters keyed by
//! `(m, n, global bin)` and keeps the smallest minimum seen for every tile.
//! Records a worker extrapolated for its own core disk are not summed: that
//! disk is located again from the worker's table and its cells skipped.
//! Once every file is in, the core disk is placed on the merged minima and
//! its tiles are re-synthesized from the sampling ring.

use crate::arrival::quantize_time;
use crate::interpolation::InterpolationDisk;
use rayon::prelude::*;
use showertile_core::{
    BinCounts, Error, EventHeader, Result, TileGeometry, TileRecord, TimeTable,
};
use std::collections::HashMap;

/// Headers whose reference times differ by more than this belong to different showers.
pub const REFERENCE_TIME_TOLERANCE_NS: f64 = 1e-3;

/// Sparse key: tile indices and global bin.
pub type MergeKey = (u16, u16, i32);

/// Sums partial tile files into one sparse counter map.
#[derive(Debug)]
pub struct MergeAccumulator {
    geometry: TileGeometry,
    bin_width_ns: f64,
    max_bins: usize,
    header: Option<EventHeader>,
    minimum: TimeTable,
    cells: HashMap<MergeKey, BinCounts>,
    files: usize,
}

impl MergeAccumulator {
    /// Creates an empty merge for a grid and time binning.
    #[must_use]
    pub fn new(geometry: TileGeometry, bin_width_ns: f64, max_bins: usize) -> Self {
        Self {
            minimum: TimeTable::unvisited(&geometry),
            geometry,
            bin_width_ns,
            max_bins,
            header: None,
            cells: HashMap::new(),
            files: 0,
        }
    }

    /// Number of files merged so far.
    #[must_use]
    pub fn files(&self) -> usize {
        self.files
    }

    /// Header of the first file.
    #[must_use]
    pub fn header(&self) -> Option<&EventHeader> {
        self.header.as_ref()
    }

    /// Smallest minimum time seen per tile.
    #[must_use]
    pub fn minimum_times(&self) -> &TimeTable {
        &self.minimum
    }

    /// Number of non-empty `(tile, bin)` cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when no cell holds counts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Summed counters of one cell.
    #[must_use]
    pub fn get(&self, m: u16, n: u16, bin: i32) -> Option<&BinCounts> {
        self.cells.get(&(m, n, bin))
    }

    /// Iterates over all cells in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&MergeKey, &BinCounts)> + '_ {
        self.cells.iter()
    }

    /// Adds one partial file.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeader` if the file describes another shower,
    /// or `Error::InvalidRecord` if its table or records do not fit the grid.
    pub fn add_file<I>(&mut self, header: &EventHeader, times: &TimeTable, records: I) -> Result<()>
    where
        I: IntoIterator<Item = TileRecord>,
    {
        if let Some(first) = &self.header {
            let delta = (first.reference_time_ns() - header.reference_time_ns()).abs();
            if delta > REFERENCE_TIME_TOLERANCE_NS {
                return Err(Error::InvalidHeader(format!(
                    "partial file {} describes another shower (reference time differs by {delta} ns)",
                    self.files + 1
                )));
            }
        } else {
            self.header = Some(header.clone());
        }
        if times.nx() != self.geometry.nx() || times.ny() != self.geometry.ny() {
            return Err(Error::InvalidRecord(format!(
                "time table is {} x {}, grid is {} x {}",
                times.nx(),
                times.ny(),
                self.geometry.nx(),
                self.geometry.ny()
            )));
        }

        // the worker extrapolated its own disk; those cells are re-synthesized in `finish`
        let worker_disk = match InterpolationDisk::locate(&self.geometry, times) {
            Ok(disk) => Some(disk.mask()),
            Err(Error::EmptyShower) => None,
            Err(e) => return Err(e),
        };

        for (global, observed) in self.minimum.as_mut_slice().iter_mut().zip(times.as_slice()) {
            if *observed < *global {
                *global = *observed;
            }
        }

        let (nx, ny) = (self.geometry.nx(), self.geometry.ny());
        let (mut count, mut extrapolated) = (0usize, 0usize);
        for record in records {
            let (m, n) = (usize::from(record.m), usize::from(record.n));
            if m >= nx || n >= ny {
                return Err(Error::InvalidRecord(format!(
                    "tile ({}, {}) outside the {nx} x {ny} grid",
                    record.m, record.n
                )));
            }
            if worker_disk.as_ref().is_some_and(|mask| mask[(m, n)]) {
                extrapolated += 1;
                continue;
            }
            self.cells
                .entry((record.m, record.n, i32::from(record.bin)))
                .or_default()
                .accumulate(&record.counts());
            count += 1;
        }
        self.files += 1;
        log::debug!(
            "merged partial file {} ({count} records, {extrapolated} core records skipped)",
            self.files
        );
        Ok(())
    }

    /// Re-synthesizes the core disk and returns the merged shower.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeader` if no file was added,
    /// `Error::EmptyShower` if the merged table has no populated tile on the
    /// central row, or `Error::BinOverflow` for bins outside the record range.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn finish(mut self) -> Result<MergedTiles> {
        let header = self
            .header
            .take()
            .ok_or_else(|| Error::InvalidHeader("no partial files to merge".to_string()))?;
        let reference = header.reference_time_ns();
        let bin_width = self.bin_width_ns;
        let bin_offset = |time: f32| ((f64::from(time) - reference) / bin_width).round() as i64;

        let disk = InterpolationDisk::locate(&self.geometry, &self.minimum)?;
        let mut interpolated = self.minimum.clone();
        disk.interpolate_times(&mut interpolated);
        // merged minima are already on the bin grid; only the disk is new
        for tile in disk.tiles() {
            if interpolated.is_set(tile.m, tile.n) {
                let time = &mut interpolated[(tile.m, tile.n)];
                *time = quantize_time(*time, reference, bin_width);
            }
        }

        let mask = disk.mask();
        let before = self.cells.len();
        self.cells
            .retain(|&(m, n, _), _| !mask[(usize::from(m), usize::from(n))]);
        let dropped = before - self.cells.len();

        let mut synthesized = Vec::new();
        for tile in disk.tiles() {
            if !interpolated.is_set(tile.m, tile.n) {
                continue;
            }
            let Some(scaling) = disk.scaling(tile, header.zenith_rad()) else {
                continue;
            };
            let (sm, sn) = scaling.sample;
            if !self.minimum.is_set(sm, sn) {
                continue;
            }
            let sample_offset = bin_offset(self.minimum[(sm, sn)]);
            let tile_offset = bin_offset(interpolated[(tile.m, tile.n)]);
            for k in 0..self.max_bins as i64 {
                let Ok(sample_bin) = i32::try_from(sample_offset + k) else {
                    continue;
                };
                let Some(sample) = self.cells.get(&(sm as u16, sn as u16, sample_bin)) else {
                    continue;
                };
                let scaled = scaling.scale(sample);
                if scaled.is_empty() {
                    continue;
                }
                let bin = tile_offset + k;
                let bin = i32::try_from(bin).map_err(|_| Error::BinOverflow {
                    m: tile.m,
                    n: tile.n,
                    bin,
                })?;
                synthesized.push(((tile.m as u16, tile.n as u16, bin), scaled));
            }
        }
        log::info!(
            "core disk radius {:.1} m: {} tiles, {dropped} cells replaced by {} synthesized",
            disk.radius_m(),
            disk.tiles().len(),
            synthesized.len()
        );
        self.cells.extend(synthesized);

        let cos_zenith = header.cos_zenith();
        let mut records = self
            .cells
            .into_iter()
            .map(|((m, n, bin), counts)| -> Result<TileRecord> {
                Ok(TileRecord {
                    m,
                    n,
                    top: counts.top,
                    bottom: counts.bottom,
                    bin: i16::try_from(bin).map_err(|_| Error::BinOverflow {
                        m: usize::from(m),
                        n: usize::from(n),
                        bin: i64::from(bin),
                    })?,
                    inclination: counts.inclination_or_fallback(cos_zenith),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        records.par_sort_unstable_by_key(|r| (r.m, r.n, r.bin));

        Ok(MergedTiles {
            header,
            minimum_times: interpolated,
            records,
        })
    }
}

/// Result of a merge, ready to serialize.
#[derive(Debug)]
pub struct MergedTiles {
    /// Header of the shower.
    pub header: EventHeader,
    /// Merged minimum times with the core disk interpolated.
    pub minimum_times: TimeTable,
    /// Records sorted by `(m, n, bin)`.
    pub records: Vec<TileRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use showertile_core::HEADER_WORDS;

    fn header(height_cm: f32) -> EventHeader {
        let mut words = vec![0.0f32; HEADER_WORDS];
        words[6] = height_cm;
        words[9] = 1.0;
        EventHeader::from_words(&words, 0.0).unwrap()
    }

    fn record(m: u16, n: u16, bin: i16, top: u16) -> TileRecord {
        TileRecord {
            m,
            n,
            top,
            bottom: top / 2,
            bin,
            inclination: top / 4,
        }
    }

    #[test]
    fn test_add_file_sums_and_tracks_minimum() {
        let geometry = TileGeometry::new(60.0, 6.0).unwrap();
        let header = header(1.0e6);
        let mut merger = MergeAccumulator::new(geometry, 20.0, 100);

        let mut first = TimeTable::unvisited(&geometry);
        first[(2, 2)] = 40_000.0;
        let mut second = TimeTable::unvisited(&geometry);
        second[(2, 2)] = 39_980.0;
        second[(7, 1)] = 41_000.0;

        merger.add_file(&header, &first, vec![record(2, 2, 5, 100)]).unwrap();
        merger
            .add_file(&header, &second, vec![record(2, 2, 5, 10), record(7, 1, 3, 8)])
            .unwrap();

        assert_eq!(merger.files(), 2);
        assert_eq!(merger.len(), 2);
        assert_eq!(merger.get(2, 2, 5).unwrap().top, 110);
        assert!((merger.minimum_times()[(2, 2)] - 39_980.0).abs() < f32::EPSILON);
        assert!(merger.minimum_times().is_set(7, 1));
    }

    #[test]
    fn test_other_shower_rejected() {
        let geometry = TileGeometry::new(60.0, 6.0).unwrap();
        let table = TimeTable::unvisited(&geometry);
        let mut merger = MergeAccumulator::new(geometry, 20.0, 100);
        merger.add_file(&header(1.0e6), &table, Vec::new()).unwrap();
        assert!(matches!(
            merger.add_file(&header(2.0e6), &table, Vec::new()),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_record_outside_grid_rejected() {
        let geometry = TileGeometry::new(60.0, 6.0).unwrap();
        let table = TimeTable::unvisited(&geometry);
        let mut merger = MergeAccumulator::new(geometry, 20.0, 100);
        assert!(matches!(
            merger.add_file(&header(1.0e6), &table, vec![record(10, 0, 0, 1)]),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_finish_without_files() {
        let geometry = TileGeometry::new(60.0, 6.0).unwrap();
        let merger = MergeAccumulator::new(geometry, 20.0, 100);
        assert!(matches!(merger.finish(), Err(Error::InvalidHeader(_))));
    }
}
