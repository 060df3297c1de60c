//! Time-batched VEM accumulation.
//!
//! The full tile × time counter space does not fit in memory, so counters
//! exist for one batch of consecutive time bins at a time. Batch 0 scans the
//! particle file; every particle belonging to a later batch is written to a
//! spill sink and scanned again when its batch comes up.
//!
//! Bin indices are relative to each tile's quantized minimum arrival time.

use crate::arrival::is_outlier;
use crate::eloss::EnergyLossSampler;
use crate::interpolation::InterpolationDisk;
use rand::Rng;
use rayon::prelude::*;
use showertile_core::record::{clamp_count, saturating_count_add};
use showertile_core::{
    BinCounts, Error, EventHeader, ParticleCuts, ParticleRecord, ParticleSink, Result,
    ShowerTileConfig, TileGeometry, TileGrid, TileRecord, TimeTable, COUNT_CEILING,
    PARTICLE_WORDS,
};
use std::cmp::Ordering;

/// Relative width of the deposit jitter.
pub const JITTER_FRACTION: f64 = 0.07;

/// Destination for particles deferred to a later batch.
pub trait SpillSink {
    /// Stores one raw particle record.
    ///
    /// # Errors
    /// Returns an error if the record cannot be stored.
    fn spill(&mut self, raw: &[f32; PARTICLE_WORDS]) -> Result<()>;
}

impl SpillSink for Vec<[f32; PARTICLE_WORDS]> {
    fn spill(&mut self, raw: &[f32; PARTICLE_WORDS]) -> Result<()> {
        self.push(*raw);
        Ok(())
    }
}

/// Draws a pair of independent standard-normal values (Box-Muller).
pub fn standard_normal_pair<R: Rng + ?Sized>(rng: &mut R) -> (f64, f64) {
    // 1 - [0, 1) keeps the logarithm finite
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    let radius = (-2.0 * u1.ln()).sqrt();
    let angle = std::f64::consts::TAU * u2;
    (radius * angle.cos(), radius * angle.sin())
}

/// Counters of every tile for the bins of one batch.
///
/// Layout is tile-major: the bins of tile `(m, n)` are contiguous.
#[derive(Clone, Debug)]
pub struct BatchCounters {
    ny: usize,
    bins: usize,
    cells: Vec<BinCounts>,
}

impl BatchCounters {
    /// Allocates zeroed counters for `bins` bins per tile.
    #[must_use]
    pub fn new(geometry: &TileGeometry, bins: usize) -> Self {
        Self {
            ny: geometry.ny(),
            bins,
            cells: vec![BinCounts::default(); geometry.tile_count() * bins],
        }
    }

    /// Memory needed per time bin of batch for a grid.
    #[must_use]
    pub fn bytes_per_bin(geometry: &TileGeometry) -> usize {
        geometry.tile_count() * std::mem::size_of::<BinCounts>()
    }

    /// Bins per tile.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        self.cells
            .par_iter_mut()
            .for_each(|cell| *cell = BinCounts::default());
    }

    /// Counters of tile `(m, n)`.
    #[must_use]
    pub fn tile(&self, m: usize, n: usize) -> &[BinCounts] {
        let start = (m * self.ny + n) * self.bins;
        &self.cells[start..start + self.bins]
    }

    /// Mutable counters of tile `(m, n)`.
    pub fn tile_mut(&mut self, m: usize, n: usize) -> &mut [BinCounts] {
        let start = (m * self.ny + n) * self.bins;
        &mut self.cells[start..start + self.bins]
    }
}

/// Particle tallies of one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Deposited into this batch's counters.
    pub accumulated: usize,
    /// Deferred to a later batch.
    pub spilled: usize,
    /// Earlier than light travel to their tile.
    pub outliers: usize,
    /// Landed in an interpolated core tile.
    pub core_skipped: usize,
    /// Later than the last recorded bin of their tile.
    pub beyond_window: usize,
}

impl BatchStats {
    /// Adds another batch's tallies.
    pub fn add(&mut self, other: &BatchStats) {
        self.accumulated += other.accumulated;
        self.spilled += other.spilled;
        self.outliers += other.outliers;
        self.core_skipped += other.core_skipped;
        self.beyond_window += other.beyond_window;
    }

    /// Particles whose fate has been decided (everything but spills).
    #[must_use]
    pub fn settled(&self) -> usize {
        self.accumulated + self.outliers + self.core_skipped + self.beyond_window
    }
}

/// Batch geometry and calibration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccumulatorSettings {
    /// Width of one time bin (ns).
    pub bin_width_ns: f64,
    /// Time bins per batch.
    pub bins_per_batch: usize,
    /// Time bins recorded per tile.
    pub max_bins: usize,
    /// Deposit of one vertical-equivalent muon (MeV).
    pub vem_mev: f64,
}

impl AccumulatorSettings {
    /// Settings from a run configuration and a resolved batch size.
    #[must_use]
    pub fn from_config(config: &ShowerTileConfig, bins_per_batch: usize) -> Self {
        Self {
            bin_width_ns: config.time.bin_width_ns,
            bins_per_batch: bins_per_batch.clamp(1, config.time.max_bins.max(1)),
            max_bins: config.time.max_bins,
            vem_mev: config.vem_mev,
        }
    }

    /// Number of batches covering all recorded bins.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.max_bins.div_ceil(self.bins_per_batch)
    }

    /// Bins held by the counters.
    #[must_use]
    pub fn counter_bins(&self) -> usize {
        self.bins_per_batch.min(self.max_bins)
    }
}

/// Accumulates energy deposits for one batch at a time.
pub struct BatchAccumulator<E, R> {
    geometry: TileGeometry,
    cuts: ParticleCuts,
    settings: AccumulatorSettings,
    times: TimeTable,
    disk: InterpolationDisk,
    in_disk: TileGrid<bool>,
    sampler: E,
    rng: R,
    counters: BatchCounters,
    current: Option<usize>,
    stats: BatchStats,
    totals: BatchStats,
}

impl<E: EnergyLossSampler, R: Rng> BatchAccumulator<E, R> {
    /// Creates an accumulator over quantized minimum times.
    ///
    /// Tiles inside `disk` never accumulate particles; their counters are
    /// extrapolated from the sampling ring when a batch is finished.
    #[must_use]
    pub fn new(
        geometry: TileGeometry,
        cuts: ParticleCuts,
        settings: AccumulatorSettings,
        times: TimeTable,
        disk: InterpolationDisk,
        sampler: E,
        rng: R,
    ) -> Self {
        Self {
            counters: BatchCounters::new(&geometry, settings.counter_bins()),
            in_disk: disk.mask(),
            geometry,
            cuts,
            settings,
            times,
            disk,
            sampler,
            rng,
            current: None,
            stats: BatchStats::default(),
            totals: BatchStats::default(),
        }
    }

    /// Batch geometry and calibration.
    #[must_use]
    pub fn settings(&self) -> &AccumulatorSettings {
        &self.settings
    }

    /// Quantized minimum times the bins are anchored to.
    #[must_use]
    pub fn times(&self) -> &TimeTable {
        &self.times
    }

    /// Core disk excluded from accumulation.
    #[must_use]
    pub fn disk(&self) -> &InterpolationDisk {
        &self.disk
    }

    /// Counters of the batch in progress.
    #[must_use]
    pub fn counters(&self) -> &BatchCounters {
        &self.counters
    }

    /// Tallies of the batch in progress.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Tallies of all finished batches.
    #[must_use]
    pub fn totals(&self) -> BatchStats {
        self.totals
    }

    /// Batch in progress, if any.
    #[must_use]
    pub fn current_batch(&self) -> Option<usize> {
        self.current
    }

    /// Starts batch `index` with zeroed counters.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` unless `index` is past the previous batch
    /// and within the batch count.
    pub fn begin_batch(&mut self, index: usize) -> Result<()> {
        if self.current.is_some_and(|current| index <= current)
            || index >= self.settings.batch_count()
        {
            return Err(Error::ConfigError(format!(
                "cannot start batch {index} after {:?} of {}",
                self.current,
                self.settings.batch_count()
            )));
        }
        self.counters.reset();
        self.stats = BatchStats::default();
        self.current = Some(index);
        Ok(())
    }

    /// Routes one particle: deposits it, defers it to `spill` or tallies it.
    ///
    /// # Errors
    /// Returns `Error::BatchOrdering` for a particle belonging to an earlier
    /// batch, or the spill sink's error.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn accumulate<W: SpillSink + ?Sized>(
        &mut self,
        particle: &ParticleRecord,
        header: &EventHeader,
        spill: &mut W,
    ) -> Result<()> {
        if !self.cuts.accepts(particle) {
            return Ok(());
        }
        let current = self.current.ok_or_else(|| {
            Error::ConfigError("particle accumulated before a batch was started".to_string())
        })?;
        let (m, n) = self.geometry.tile_of(particle.x_cm(), particle.y_cm())?;
        if self.in_disk[(m, n)] {
            self.stats.core_skipped += 1;
            return Ok(());
        }
        let time = particle.time_ns();
        if is_outlier(&self.geometry, header, m, n, time) {
            self.stats.outliers += 1;
            return Ok(());
        }

        let bin = ((time - f64::from(self.times[(m, n)])) / self.settings.bin_width_ns).floor();
        if bin >= self.settings.max_bins as f64 {
            self.stats.beyond_window += 1;
            return Ok(());
        }
        let bin = bin as i64;
        let per_batch = self.settings.bins_per_batch as i64;
        let batch = bin.div_euclid(per_batch);
        match batch.cmp(&(current as i64)) {
            Ordering::Less => Err(Error::BatchOrdering { batch, current }),
            Ordering::Greater => {
                spill.spill(particle.raw())?;
                self.stats.spilled += 1;
                Ok(())
            }
            Ordering::Equal => {
                self.deposit(m, n, bin.rem_euclid(per_batch) as usize, particle);
                self.stats.accumulated += 1;
                Ok(())
            }
        }
    }

    fn deposit(&mut self, m: usize, n: usize, k: usize, particle: &ParticleRecord) {
        let cell = self.counters.tile(m, n)[k];
        if cell.top >= COUNT_CEILING || cell.bottom >= COUNT_CEILING {
            return;
        }
        let (upper, lower) = self.sampler.sample(
            particle.id(),
            particle.kinetic_energy_mev(),
            particle.sec_theta(),
            &mut self.rng,
        );
        let (g1, g2) = standard_normal_pair(&mut self.rng);
        let vem_scale = 100.0 / self.settings.vem_mev;
        let top = (upper * (1.0 + JITTER_FRACTION * g1) * vem_scale).max(0.0);
        let bottom = (lower * (1.0 + JITTER_FRACTION * g2) * vem_scale).max(0.0);

        let cell = &mut self.counters.tile_mut(m, n)[k];
        cell.top = saturating_count_add(cell.top, clamp_count(top));
        cell.bottom = saturating_count_add(cell.bottom, clamp_count(bottom));
        cell.inclination = saturating_count_add(
            cell.inclination,
            clamp_count(0.5 * (top + bottom) / particle.sec_theta()),
        );
    }

    /// Per-particle sink for a scan of the current batch.
    pub fn sink<'a, W: SpillSink + ?Sized>(
        &'a mut self,
        spill: &'a mut W,
    ) -> BatchSink<'a, E, R, W> {
        BatchSink {
            accumulator: self,
            spill,
        }
    }

    /// Extrapolates the core tiles, then returns the records of the batch.
    ///
    /// # Errors
    /// Returns `Error::BinOverflow` if a global bin does not fit the record
    /// format, or `Error::ConfigError` when no batch is in progress.
    pub fn finish_batch(&mut self, header: &EventHeader) -> Result<Vec<TileRecord>> {
        let current = self
            .current
            .ok_or_else(|| Error::ConfigError("no batch in progress".to_string()))?;
        self.interpolate_core(header.zenith_rad());
        let records = self.batch_records(current, header)?;
        self.totals.add(&self.stats);
        log::debug!(
            "batch {current}: {} accumulated, {} spilled, {} outliers, {} core, {} beyond window, {} records",
            self.stats.accumulated,
            self.stats.spilled,
            self.stats.outliers,
            self.stats.core_skipped,
            self.stats.beyond_window,
            records.len()
        );
        Ok(records)
    }

    fn interpolate_core(&mut self, zenith_rad: f64) {
        for tile in self.disk.tiles() {
            let Some(scaling) = self.disk.scaling(tile, zenith_rad) else {
                continue;
            };
            let (sm, sn) = scaling.sample;
            let sampled: Vec<BinCounts> = self
                .counters
                .tile(sm, sn)
                .iter()
                .map(|counts| scaling.scale(counts))
                .collect();
            self.counters.tile_mut(tile.m, tile.n).copy_from_slice(&sampled);
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn batch_records(&self, current: usize, header: &EventHeader) -> Result<Vec<TileRecord>> {
        let times = &self.times;
        let counters = &self.counters;
        let bin_width = self.settings.bin_width_ns;
        let reference = header.reference_time_ns();
        let cos_zenith = header.cos_zenith();
        let first_bin = (current * self.settings.bins_per_batch) as i64;
        let ny = self.geometry.ny();

        let rows = (0..self.geometry.nx())
            .into_par_iter()
            .map(|m| -> Result<Vec<TileRecord>> {
                let mut row = Vec::new();
                for n in 0..ny {
                    if !times.is_set(m, n) {
                        continue;
                    }
                    let offset = ((f64::from(times[(m, n)]) - reference) / bin_width).round() as i64;
                    for (k, counts) in counters.tile(m, n).iter().enumerate() {
                        if counts.is_empty() {
                            continue;
                        }
                        let bin = offset + first_bin + k as i64;
                        row.push(TileRecord {
                            m: m as u16,
                            n: n as u16,
                            top: counts.top,
                            bottom: counts.bottom,
                            bin: i16::try_from(bin).map_err(|_| Error::BinOverflow { m, n, bin })?,
                            inclination: counts.inclination_or_fallback(cos_zenith),
                        });
                    }
                }
                Ok(row)
            })
            .collect::<Result<Vec<Vec<TileRecord>>>>()?;
        Ok(rows.into_iter().flatten().collect())
    }
}

/// [`ParticleSink`] adapter feeding one batch scan into an accumulator.
pub struct BatchSink<'a, E, R, W: ?Sized> {
    accumulator: &'a mut BatchAccumulator<E, R>,
    spill: &'a mut W,
}

impl<E, R, W> ParticleSink for BatchSink<'_, E, R, W>
where
    E: EnergyLossSampler,
    R: Rng,
    W: SpillSink + ?Sized,
{
    fn process_particle(&mut self, particle: &ParticleRecord, header: &EventHeader) -> Result<()> {
        self.accumulator.accumulate(particle, header, &mut *self.spill)
    }
}
