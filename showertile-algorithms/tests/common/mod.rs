#![allow(dead_code, clippy::cast_precision_loss)]
//! Synthetic showers and a worker loop shared by the integration tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use showertile_algorithms::{
    quantize_times, AccumulatorSettings, ArrivalStats, ArrivalTimePass, BatchAccumulator,
    BatchStats, EnergyLossSampler, InterpolationDisk,
};
use showertile_core::{
    CutConfig, EventHeader, ParticleCuts, ParticleRecord, ParticleSink, Result,
    ShowerTileConfig, TileGeometry, TileRecord, TimeTable, HEADER_WORDS, PARTICLE_WORDS,
};

pub type RawParticle = [f32; PARTICLE_WORDS];

pub const BIN_WIDTH_NS: f64 = 20.0;

/// 100 x 100 tiles of 6 m.
pub fn small_geometry() -> TileGeometry {
    TileGeometry::new(600.0, 6.0).unwrap()
}

pub fn small_config() -> ShowerTileConfig {
    ShowerTileConfig::default().with_grid(600.0, 6.0)
}

/// Vertical shower with its first interaction 10 km above the observation plane.
pub fn vertical_header() -> EventHeader {
    let mut words = vec![0.0f32; HEADER_WORDS];
    words[6] = 1.0e6;
    words[9] = 1.0;
    EventHeader::from_words(&words, 0.0).unwrap()
}

/// Muons on an annulus from 40 m to 280 m around the core, arriving up to
/// 30 us after the shower front. A few are impossible (earlier than light)
/// and a few fall outside the footprint.
#[allow(clippy::cast_possible_truncation)]
pub fn synthetic_shower(header: &EventHeader, count: usize, seed: u64) -> Vec<RawParticle> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut particles = Vec::with_capacity(count + 20);
    for _ in 0..count {
        let radius_cm = rng.gen_range(4_000.0..28_000.0);
        let angle = rng.gen_range(0.0..std::f64::consts::TAU);
        let (x, y) = (radius_cm * angle.cos(), radius_cm * angle.sin());
        let delay = rng.gen_range(0.0..30_000.0);
        let time = header.light_travel_time_ns(x, y) + 50.0 + delay;
        let px: f32 = rng.gen_range(-0.2..0.2);
        particles.push([5001.0, px, 0.0, 1.0, x as f32, y as f32, time as f32]);
    }
    for i in 0..10 {
        let x = 10_000.0 + 600.0 * f64::from(i);
        let time = header.light_travel_time_ns(x, 0.0) - 500.0;
        particles.push([5001.0, 0.0, 0.0, 1.0, x as f32, 0.0, time as f32]);
    }
    for i in 0..10 {
        particles.push([5001.0, 0.0, 0.0, 1.0, 31_000.0, 100.0 * i as f32, 40_000.0]);
    }
    particles
}

/// Constant deposits, ignoring the particle.
#[derive(Clone, Copy, Debug)]
pub struct FixedLoss {
    pub upper: f64,
    pub lower: f64,
}

impl Default for FixedLoss {
    fn default() -> Self {
        Self {
            upper: 2.05,
            lower: 1.5,
        }
    }
}

impl EnergyLossSampler for FixedLoss {
    fn sample<R: Rng + ?Sized>(
        &mut self,
        _id: i32,
        _kinetic_energy_mev: f64,
        _sec_theta: f64,
        _rng: &mut R,
    ) -> (f64, f64) {
        (self.upper, self.lower)
    }
}

/// Everything one worker produces for a partial tile file.
pub struct WorkerOutput {
    /// Quantized observed minima, as written to a partial file.
    pub table: TimeTable,
    /// Minima the bins were anchored to, core disk interpolated.
    pub anchors: TimeTable,
    pub disk: InterpolationDisk,
    pub records: Vec<TileRecord>,
    pub arrival: ArrivalStats,
    pub totals: BatchStats,
    /// Particles still deferred after the last batch.
    pub leftover: usize,
}

/// Arrival pass, interpolation, then every batch, spilling to memory.
pub fn run_worker(
    geometry: &TileGeometry,
    header: &EventHeader,
    particles: &[RawParticle],
    bins_per_batch: usize,
    seed: u64,
) -> Result<WorkerOutput> {
    let cuts = ParticleCuts::new(geometry, &CutConfig::default());
    let mut pass = ArrivalTimePass::new(*geometry, cuts);
    for raw in particles {
        pass.process_particle(&ParticleRecord::from_raw(*raw), header)?;
    }
    let (observed, arrival) = pass.finish();

    let disk = InterpolationDisk::locate(geometry, &observed)?;
    let mut anchors = observed.clone();
    disk.interpolate_times(&mut anchors);
    quantize_times(&mut anchors, header.reference_time_ns(), BIN_WIDTH_NS);

    let mut table = observed;
    quantize_times(&mut table, header.reference_time_ns(), BIN_WIDTH_NS);

    let settings = AccumulatorSettings::from_config(&small_config(), bins_per_batch);
    let mut accumulator = BatchAccumulator::new(
        *geometry,
        cuts,
        settings,
        anchors.clone(),
        disk.clone(),
        FixedLoss::default(),
        ChaCha8Rng::seed_from_u64(seed),
    );

    let mut input = particles.to_vec();
    let mut records = Vec::new();
    for batch in 0..settings.batch_count() {
        accumulator.begin_batch(batch)?;
        let mut spill: Vec<RawParticle> = Vec::new();
        {
            let mut sink = accumulator.sink(&mut spill);
            for raw in &input {
                sink.process_particle(&ParticleRecord::from_raw(*raw), header)?;
            }
        }
        records.extend(accumulator.finish_batch(header)?);
        input = spill;
    }

    Ok(WorkerOutput {
        table,
        anchors,
        disk,
        records,
        arrival,
        totals: accumulator.totals(),
        leftover: input.len(),
    })
}
