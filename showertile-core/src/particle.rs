//! CORSIKA particle and event-header models.
//!
//! Raw float blocks are kept verbatim; derived quantities are computed once
//! at construction so every pass sees identical values.

use crate::config::CutConfig;
use crate::grid::TileGeometry;
use crate::{Error, Result};

/// Floats in one particle record.
pub const PARTICLE_WORDS: usize = 7;

/// Particle records in one particle sub-block.
pub const PARTICLES_PER_SUBBLOCK: usize = 39;

/// Floats in one sub-block (and in the event header).
pub const HEADER_WORDS: usize = PARTICLE_WORDS * PARTICLES_PER_SUBBLOCK;

/// Speed of light (cm/ns).
pub const LIGHT_SPEED_CM_PER_NS: f64 = 29.979_25;

/// Rest masses (GeV) indexed by CORSIKA particle id.
pub const PARTICLE_MASSES_GEV: [f64; 26] = [
    0.0, 0.0, 0.511e-3, 0.511e-3, 0.0, 105.7e-3, 105.7e-3, 135.0e-3, 140.0e-3, 140.0e-3, 498.0e-3,
    494.0e-3, 494.0e-3, 940.0e-3, 938.0e-3, 938.0e-3, 498.0e-3, 549.0e-3, 1116.0e-3, 1189.0e-3,
    1193.0e-3, 1197.0e-3, 1315.0e-3, 1321.0e-3, 1672.0e-3, 940.0e-3,
];

/// Rest mass for a particle id; ids outside the table are treated as massless.
#[must_use]
pub fn particle_mass_gev(id: i32) -> f64 {
    usize::try_from(id)
        .ok()
        .and_then(|i| PARTICLE_MASSES_GEV.get(i))
        .copied()
        .unwrap_or(0.0)
}

/// Per-shower metadata decoded from the EVTH sub-block.
#[derive(Clone, Debug, PartialEq)]
pub struct EventHeader {
    raw: Vec<f32>,
    origin_cm: [f64; 3],
    reference_time_ns: f64,
    zenith_rad: f64,
    observation_level_cm: f64,
}

impl EventHeader {
    /// Decodes the header words of an EVTH sub-block.
    ///
    /// Word 6 is the first-interaction height, words 7..=9 the primary
    /// momentum and word 10 the zenith angle.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeader` if the block has the wrong length or the
    /// primary momentum has no vertical component.
    pub fn from_words(words: &[f32], observation_level_cm: f64) -> Result<Self> {
        if words.len() != HEADER_WORDS {
            return Err(Error::InvalidHeader(format!(
                "expected {HEADER_WORDS} words, got {}",
                words.len()
            )));
        }
        let height = f64::from(words[6]);
        let (px, py, pz) = (
            f64::from(words[7]),
            f64::from(words[8]),
            f64::from(words[9]),
        );
        if pz == 0.0 {
            return Err(Error::InvalidHeader(
                "primary momentum has zero vertical component".to_string(),
            ));
        }
        let depth = height - observation_level_cm;
        let origin_cm = [-px / pz * depth, -py / pz * depth, height];
        let reference_time_ns = origin_cm[0].hypot(origin_cm[1]).hypot(depth) / LIGHT_SPEED_CM_PER_NS;
        Ok(Self {
            raw: words.to_vec(),
            origin_cm,
            reference_time_ns,
            zenith_rad: f64::from(words[10]),
            observation_level_cm,
        })
    }

    /// Header words verbatim.
    #[must_use]
    pub fn raw(&self) -> &[f32] {
        &self.raw
    }

    /// First-interaction point (cm); z is height above sea level.
    #[must_use]
    pub fn origin_cm(&self) -> [f64; 3] {
        self.origin_cm
    }

    /// Light travel time from the first interaction to the core on the observation plane.
    #[must_use]
    pub fn reference_time_ns(&self) -> f64 {
        self.reference_time_ns
    }

    /// Shower zenith angle (radians).
    #[must_use]
    pub fn zenith_rad(&self) -> f64 {
        self.zenith_rad
    }

    /// Cosine of the zenith angle, the per-particle inclination estimate for tiles
    /// without a usable inclination count.
    #[must_use]
    pub fn cos_zenith(&self) -> f64 {
        self.zenith_rad.cos()
    }

    /// Azimuth of the primary (radians).
    #[must_use]
    pub fn azimuth_rad(&self) -> f64 {
        f64::from(self.raw[11])
    }

    /// CORSIKA id of the primary particle.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn primary_id(&self) -> i32 {
        self.raw[2] as i32
    }

    /// Energy of the primary (GeV).
    #[must_use]
    pub fn primary_energy_gev(&self) -> f64 {
        f64::from(self.raw[3])
    }

    /// Height of the first interaction (cm).
    #[must_use]
    pub fn first_interaction_height_cm(&self) -> f64 {
        self.origin_cm[2]
    }

    /// Height of the observation plane (cm), as configured for this run.
    #[must_use]
    pub fn observation_level_cm(&self) -> f64 {
        self.observation_level_cm
    }

    /// Straight-line light travel time from the first interaction to a point
    /// on the observation plane.
    #[must_use]
    pub fn light_travel_time_ns(&self, x_cm: f64, y_cm: f64) -> f64 {
        let [ox, oy, oz] = self.origin_cm;
        (ox - x_cm)
            .hypot(oy - y_cm)
            .hypot(oz - self.observation_level_cm)
            / LIGHT_SPEED_CM_PER_NS
    }
}

/// One particle record with its derived quantities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleRecord {
    raw: [f32; PARTICLE_WORDS],
    id: i32,
    kinetic_energy_gev: f64,
    sec_theta: f64,
}

impl ParticleRecord {
    /// Builds a record from its seven raw floats:
    /// type code, px, py, pz (GeV/c), x, y (cm), time since first interaction (ns).
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn from_raw(raw: [f32; PARTICLE_WORDS]) -> Self {
        let id = (f64::from(raw[0]) / 1000.0) as i32;
        let (px, py, pz) = (f64::from(raw[1]), f64::from(raw[2]), f64::from(raw[3]));
        let momentum = pz.hypot(px.hypot(py));
        let mass = particle_mass_gev(id);
        Self {
            raw,
            id,
            kinetic_energy_gev: mass.hypot(momentum) - mass,
            sec_theta: momentum / pz,
        }
    }

    /// Raw record verbatim.
    #[must_use]
    pub fn raw(&self) -> &[f32; PARTICLE_WORDS] {
        &self.raw
    }

    /// CORSIKA particle id (type code / 1000).
    #[must_use]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Kinetic energy (GeV): total energy from momentum and rest mass, minus the mass.
    #[must_use]
    pub fn kinetic_energy_gev(&self) -> f64 {
        self.kinetic_energy_gev
    }

    #[must_use]
    pub fn kinetic_energy_mev(&self) -> f64 {
        self.kinetic_energy_gev * 1000.0
    }

    /// Secant of the incidence angle on the observation plane.
    #[must_use]
    pub fn sec_theta(&self) -> f64 {
        self.sec_theta
    }

    /// Position on the observation plane relative to the core (cm).
    #[must_use]
    pub fn x_cm(&self) -> f64 {
        f64::from(self.raw[4])
    }

    /// See [`x_cm`](Self::x_cm).
    #[must_use]
    pub fn y_cm(&self) -> f64 {
        f64::from(self.raw[5])
    }

    /// Time since first interaction (ns).
    #[must_use]
    pub fn time_ns(&self) -> f64 {
        f64::from(self.raw[6])
    }
}

/// Per-particle callback of a stream scan.
///
/// Each pass supplies its own implementation; closures qualify directly.
pub trait ParticleSink {
    /// Processes one decoded particle.
    ///
    /// # Errors
    /// Any error aborts the scan and is propagated to its caller.
    fn process_particle(&mut self, particle: &ParticleRecord, header: &EventHeader) -> Result<()>;
}

impl<F> ParticleSink for F
where
    F: FnMut(&ParticleRecord, &EventHeader) -> Result<()>,
{
    fn process_particle(&mut self, particle: &ParticleRecord, header: &EventHeader) -> Result<()> {
        self(particle, header)
    }
}

/// Geometric and physical particle selection shared by all passes.
#[derive(Clone, Copy, Debug)]
pub struct ParticleCuts {
    half_side_cm: f64,
    min_time_ns: f64,
    min_kinetic_energy_gev: f64,
}

impl ParticleCuts {
    /// Lowest supported particle id.
    pub const MIN_ID: i32 = 1;
    /// One past the highest supported particle id.
    pub const END_ID: i32 = 26;

    #[must_use]
    pub fn new(geometry: &TileGeometry, cuts: &CutConfig) -> Self {
        Self {
            half_side_cm: geometry.half_side_cm(),
            min_time_ns: cuts.min_time_ns,
            min_kinetic_energy_gev: cuts.min_kinetic_energy_kev / 1.0e6,
        }
    }

    /// Inside the footprint and later than the time threshold.
    #[must_use]
    pub fn passes_geometric(&self, particle: &ParticleRecord) -> bool {
        particle.x_cm().abs() < self.half_side_cm
            && particle.y_cm().abs() < self.half_side_cm
            && particle.time_ns() > self.min_time_ns
    }

    /// Supported species above the kinetic energy threshold.
    #[must_use]
    pub fn passes_physical(&self, particle: &ParticleRecord) -> bool {
        (Self::MIN_ID..Self::END_ID).contains(&particle.id())
            && particle.kinetic_energy_gev() > self.min_kinetic_energy_gev
    }

    /// Both cuts.
    #[must_use]
    pub fn accepts(&self, particle: &ParticleRecord) -> bool {
        self.passes_physical(particle) && self.passes_geometric(particle)
    }
}
