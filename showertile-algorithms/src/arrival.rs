//! Minimum-arrival-time pass.
//!
//! One scan over the shower stores, per tile, the earliest arrival among the
//! particles that pass the cuts. Arrivals earlier than light could travel
//! from the first interaction to the tile are simulation artifacts; they are
//! counted and never stored.

use showertile_core::{
    EventHeader, ParticleCuts, ParticleRecord, ParticleSink, Result, TileGeometry, TimeTable,
    SENTINEL_TIME,
};

/// Counters of one arrival-time scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArrivalStats {
    /// Particles that passed both cuts.
    pub accepted: usize,
    /// Accepted particles rejected as earlier than light travel.
    pub outliers: usize,
    /// Times a tile minimum was lowered.
    pub updates: usize,
}

/// Per-tile minimum arrival time accumulator.
#[derive(Debug)]
pub struct ArrivalTimePass {
    geometry: TileGeometry,
    cuts: ParticleCuts,
    times: TimeTable,
    stats: ArrivalStats,
}

impl ArrivalTimePass {
    /// Creates a pass with every tile unvisited.
    #[must_use]
    pub fn new(geometry: TileGeometry, cuts: ParticleCuts) -> Self {
        Self {
            times: TimeTable::unvisited(&geometry),
            geometry,
            cuts,
            stats: ArrivalStats::default(),
        }
    }

    /// Current minimum times.
    #[must_use]
    pub fn times(&self) -> &TimeTable {
        &self.times
    }

    /// Tallies so far.
    #[must_use]
    pub fn stats(&self) -> ArrivalStats {
        self.stats
    }

    /// Finishes the pass, logging its statistics.
    #[must_use]
    pub fn finish(self) -> (TimeTable, ArrivalStats) {
        log::info!(
            "arrival pass: {} particles accepted, {} outliers, {} minimum updates",
            self.stats.accepted,
            self.stats.outliers,
            self.stats.updates
        );
        if self.stats.outliers > 0 {
            log::warn!(
                "{} particles arrived earlier than light travel from the first interaction",
                self.stats.outliers
            );
        }
        (self.times, self.stats)
    }
}

impl ParticleSink for ArrivalTimePass {
    #[allow(clippy::cast_possible_truncation)]
    fn process_particle(&mut self, particle: &ParticleRecord, header: &EventHeader) -> Result<()> {
        if !self.cuts.accepts(particle) {
            return Ok(());
        }
        let (m, n) = self.geometry.tile_of(particle.x_cm(), particle.y_cm())?;
        self.stats.accepted += 1;

        let time = particle.time_ns();
        if time < f64::from(self.times[(m, n)]) {
            if is_outlier(&self.geometry, header, m, n, time) {
                self.stats.outliers += 1;
            } else {
                self.times[(m, n)] = time as f32;
                self.stats.updates += 1;
            }
        }
        Ok(())
    }
}

/// True when `time_ns` is earlier than light travel from the shower origin
/// to the center of tile `(m, n)`.
#[must_use]
pub fn is_outlier(
    geometry: &TileGeometry,
    header: &EventHeader,
    m: usize,
    n: usize,
    time_ns: f64,
) -> bool {
    let (x_m, y_m) = geometry.tile_center_xy(m, n);
    time_ns < header.light_travel_time_ns(x_m * 100.0, y_m * 100.0)
}

/// Snaps every visited tile onto the bin grid anchored at `reference_ns`.
///
/// The result never exceeds the input time and lies within one bin width of
/// it; unvisited tiles keep [`SENTINEL_TIME`].
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub fn quantize_times(times: &mut TimeTable, reference_ns: f64, bin_width_ns: f64) {
    use rayon::prelude::*;

    times.as_mut_slice().par_iter_mut().for_each(|t| {
        if *t != SENTINEL_TIME {
            *t = quantize_time(*t, reference_ns, bin_width_ns);
        }
    });
}

/// Quantizes one time; rounding to `f32` is never allowed to move it past
/// the original value.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn quantize_time(time_ns: f32, reference_ns: f64, bin_width_ns: f64) -> f32 {
    let raw = f64::from(time_ns);
    let quantized = reference_ns + bin_width_ns * ((raw - reference_ns) / bin_width_ns).floor();
    (quantized as f32).min(time_ns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use showertile_core::{CutConfig, HEADER_WORDS};

    fn setup() -> (TileGeometry, ParticleCuts, EventHeader) {
        let geometry = TileGeometry::new(600.0, 6.0).unwrap();
        let cuts = ParticleCuts::new(&geometry, &CutConfig::default());
        let mut words = vec![0.0f32; HEADER_WORDS];
        words[6] = 1_000_000.0;
        words[9] = 1.0;
        let header = EventHeader::from_words(&words, 0.0).unwrap();
        (geometry, cuts, header)
    }

    fn electron(x_cm: f32, y_cm: f32, time_ns: f32) -> ParticleRecord {
        ParticleRecord::from_raw([3001.0, 0.0, 0.0, 0.1, x_cm, y_cm, time_ns])
    }

    #[test]
    fn test_minimum_is_monotonic() {
        let (geometry, cuts, header) = setup();
        let mut pass = ArrivalTimePass::new(geometry, cuts);
        // light travel from 10 km straight above is ~33 356 ns
        let arrivals = [40_000.0, 45_000.0, 38_000.0, 39_000.0, 36_000.0];
        let mut previous = SENTINEL_TIME;
        for t in arrivals {
            pass.process_particle(&electron(10.0, 10.0, t), &header).unwrap();
            let current = pass.times()[(50, 50)];
            assert!(current <= previous);
            previous = current;
        }
        assert!((previous - 36_000.0).abs() < f32::EPSILON);
        assert_eq!(pass.stats().updates, 3);
        assert_eq!(pass.stats().accepted, 5);
    }

    #[test]
    fn test_outlier_is_counted_not_stored() {
        let (geometry, cuts, header) = setup();
        let mut pass = ArrivalTimePass::new(geometry, cuts);
        pass.process_particle(&electron(10.0, 10.0, 20_000.0), &header).unwrap();
        assert!(!pass.times().is_set(50, 50));
        assert_eq!(pass.stats().outliers, 1);

        pass.process_particle(&electron(10.0, 10.0, 34_000.0), &header).unwrap();
        assert!(pass.times().is_set(50, 50));
    }

    #[test]
    fn test_cut_particles_ignored() {
        let (geometry, cuts, header) = setup();
        let mut pass = ArrivalTimePass::new(geometry, cuts);
        pass.process_particle(&electron(40_000.0, 0.0, 40_000.0), &header).unwrap();
        pass.process_particle(&electron(0.0, 0.0, 5_000.0), &header).unwrap();
        let (_, stats) = pass.finish();
        assert_eq!(stats, ArrivalStats::default());
    }

    #[test]
    fn test_quantization_bounds() {
        let reference = 33_356.409_5;
        for raw in [33_356.41f32, 33_400.0, 35_123.456, 99_999.99, 120_000.5] {
            let q = quantize_time(raw, reference, 20.0);
            let diff = f64::from(raw) - f64::from(q);
            assert!(diff >= 0.0, "{raw} -> {q}");
            assert!(diff < 20.0, "{raw} -> {q}");
        }
    }

    #[test]
    fn test_quantize_keeps_sentinel() {
        let geometry = TileGeometry::new(120.0, 6.0).unwrap();
        let mut times = TimeTable::unvisited(&geometry);
        times[(1, 2)] = 40_013.0;
        quantize_times(&mut times, 40_000.0, 20.0);
        assert!((times[(1, 2)] - 40_000.0).abs() < f32::EPSILON);
        assert!(!times.is_set(0, 0));
    }
}
