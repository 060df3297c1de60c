//! Partial-run driver: one particle file in, one partial tile file out.
//!
//! Pass 1 finds the per-tile minimum arrival times. The core disk is placed
//! and interpolated, times are quantized, then the accumulation runs batch
//! by batch: batch 0 scans the particle file, every later batch replays the
//! spill file written by its predecessor.

use crate::batching::BatchSizing;
use crate::reader::CorsikaFileReader;
use crate::spill::SpillRing;
use crate::writer::{write_time_table_file, TileFileWriter};
use crate::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use showertile_algorithms::{
    quantize_times, AccumulatorSettings, ArrivalStats, ArrivalTimePass, BatchAccumulator,
    BatchStats, EnergyLossSampler, InterpolationDisk,
};
use showertile_core::{EventHeader, ParticleCuts, ShowerTileConfig, TileGeometry};
use showertile_corsika::ParticleFileStats;
use std::path::{Path, PathBuf};

/// Outcome of one partial run.
#[derive(Clone, Debug)]
pub struct PartialSummary {
    pub header: EventHeader,
    pub stream: ParticleFileStats,
    pub arrival: ArrivalStats,
    pub batches: BatchStats,
    /// Batches actually scanned; the run stops early once nothing is deferred.
    pub batches_run: usize,
    pub bins_per_batch: usize,
    pub disk_radius_m: f64,
    pub records: usize,
}

/// Converts one particle file into a partial tile file.
#[derive(Clone, Debug)]
pub struct PartialRun {
    config: ShowerTileConfig,
    geometry: TileGeometry,
    sizing: BatchSizing,
    times_path: Option<PathBuf>,
}

impl PartialRun {
    /// Prepares a run.
    ///
    /// # Errors
    /// Returns an error if the configuration is inconsistent.
    pub fn new(config: ShowerTileConfig) -> Result<Self> {
        config.validate()?;
        let geometry = TileGeometry::from_config(&config.grid)?;
        Ok(Self {
            sizing: BatchSizing::from_config(&config.batching),
            config,
            geometry,
            times_path: None,
        })
    }

    /// Override batch sizing.
    #[must_use]
    pub fn with_sizing(mut self, sizing: BatchSizing) -> Self {
        self.sizing = sizing;
        self
    }

    /// Also write the observed minimum-time table to `path`.
    #[must_use]
    pub fn with_times_dump<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.times_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn geometry(&self) -> &TileGeometry {
        &self.geometry
    }

    /// Runs every pass over `particles`, writing the partial file to `output`.
    /// Spill files live next to `output` and are removed on return.
    ///
    /// # Errors
    /// Returns an error on unreadable or malformed input, an empty shower,
    /// a batch ordering violation, or any write failure.
    #[allow(clippy::cast_precision_loss)]
    pub fn run<E, P, Q>(&self, sampler: E, particles: P, output: Q) -> Result<PartialSummary>
    where
        E: EnergyLossSampler,
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let output = output.as_ref();
        let cuts = ParticleCuts::new(&self.geometry, &self.config.cuts);
        let reader = CorsikaFileReader::open(particles, self.config.observation_level_cm)?;
        log::info!(
            "{}: {} bytes, {} x {} tiles of {} m",
            reader.path().display(),
            reader.len(),
            self.geometry.nx(),
            self.geometry.ny(),
            self.geometry.tile_side_m()
        );

        let mut pass = ArrivalTimePass::new(self.geometry, cuts);
        let scan = reader.for_each_particle(&mut pass)?;
        let (observed, arrival) = pass.finish();
        let header = scan.header;
        log::info!(
            "core reference time {:.3} ns, zenith {:.4} rad",
            header.reference_time_ns(),
            header.zenith_rad()
        );
        if let Some(path) = &self.times_path {
            write_time_table_file(path, &observed)?;
        }

        let reference = header.reference_time_ns();
        let bin_width = self.config.time.bin_width_ns;
        let disk = InterpolationDisk::locate(&self.geometry, &observed)?;
        let mut anchors = observed.clone();
        let filled = disk.interpolate_times(&mut anchors);
        log::info!(
            "interpolation disk radius {:.1} m, {filled} of {} tiles filled",
            disk.radius_m(),
            disk.tiles().len()
        );
        quantize_times(&mut anchors, reference, bin_width);
        let mut table = observed;
        quantize_times(&mut table, reference, bin_width);

        let mut writer = TileFileWriter::create(output)?;
        writer.write_header(&header)?;
        writer.write_time_table(&table)?;

        let bins_per_batch = self
            .sizing
            .bins_per_batch(&self.geometry, self.config.time.max_bins)?;
        let settings = AccumulatorSettings::from_config(&self.config, bins_per_batch);
        let disk_radius_m = disk.radius_m();
        let mut accumulator = BatchAccumulator::new(
            self.geometry,
            cuts,
            settings,
            anchors,
            disk,
            sampler,
            ChaCha8Rng::seed_from_u64(self.config.seed),
        );

        let batch_count = settings.batch_count();
        let mut ring = SpillRing::create(output)?;
        let mut batches_run = 0;
        for batch in 0..batch_count {
            accumulator.begin_batch(batch)?;
            if batch == 0 {
                reader.for_each_particle(&mut accumulator.sink(ring.producer_mut()))?;
            } else {
                let (consumer, producer) = ring.split();
                if let Some(consumer) = consumer {
                    consumer.for_each_particle(&header, &mut accumulator.sink(producer))?;
                }
            }
            let records = accumulator.finish_batch(&header)?;
            writer.write_records(&records)?;
            batches_run += 1;
            log::info!(
                "batch {}/{batch_count} done ({:.0}%), {} records, {} particles deferred",
                batch + 1,
                100.0 * (batch + 1) as f64 / batch_count as f64,
                records.len(),
                ring.pending()
            );
            if ring.pending() == 0 {
                log::debug!("no particles deferred past batch {batch}, stopping");
                break;
            }
            ring.rotate()?;
        }
        ring.finish()?;
        let records = writer.finish()?;

        Ok(PartialSummary {
            header,
            stream: scan.stats,
            arrival,
            batches: accumulator.totals(),
            batches_run,
            bins_per_batch,
            disk_radius_m,
            records,
        })
    }
}
