//! Detector energy-loss sampling.
//!
//! The accumulator asks a sampler for the energy a particle deposits in the
//! upper and lower scintillator layers. [`TabulatedEnergyLoss`] samples a
//! precomputed detector-response table stored as JSON.

use rand::Rng;
use serde::Deserialize;
use showertile_core::{read_json_file, Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Largest sec(theta) the table is consulted for.
pub const MAX_SEC_THETA: f64 = 10.0;

/// Source of per-particle energy deposits.
pub trait EnergyLossSampler {
    /// Samples `(upper, lower)` layer deposits in MeV.
    ///
    /// Unsupported particle ids yield `(0.0, 0.0)`.
    fn sample<R: Rng + ?Sized>(
        &mut self,
        id: i32,
        kinetic_energy_mev: f64,
        sec_theta: f64,
        rng: &mut R,
    ) -> (f64, f64);
}

impl<T: EnergyLossSampler + ?Sized> EnergyLossSampler for &mut T {
    fn sample<R: Rng + ?Sized>(
        &mut self,
        id: i32,
        kinetic_energy_mev: f64,
        sec_theta: f64,
        rng: &mut R,
    ) -> (f64, f64) {
        (**self).sample(id, kinetic_energy_mev, sec_theta, rng)
    }
}

/// One weighted 2-D energy-loss bin, log10(deposit / MeV).
///
/// A missing layer value means no deposit in that layer.
#[derive(Clone, Debug, Deserialize)]
pub struct LossBin {
    /// Upper-layer deposit.
    pub upper: Option<f64>,
    /// Lower-layer deposit.
    pub lower: Option<f64>,
    /// Relative frequency of the bin.
    pub weight: f64,
}

/// Energy-loss histogram for one (kinetic energy, sec(theta)) cell.
#[derive(Clone, Debug, Deserialize)]
pub struct LossCell {
    /// Probability of a non-zero deposit.
    pub p_loss: f64,
    /// Non-zero deposit bins.
    pub bins: Vec<LossBin>,
}

/// Response table for one particle species.
#[derive(Clone, Debug, Deserialize)]
pub struct ParticleLossTable {
    /// CORSIKA particle id.
    pub id: i32,
    /// Lower edge of the first kinetic energy bin, log10(KE / MeV).
    pub log10_ke_min: f64,
    /// Kinetic energy bin width in log10(KE / MeV).
    pub log10_ke_bin: f64,
    /// Lower edge of the first sec(theta) bin.
    pub sec_theta_min: f64,
    /// sec(theta) bin width.
    pub sec_theta_bin: f64,
    /// Width of the log10 deposit bins; sampled values are spread uniformly
    /// over `[value, value + width)`.
    #[serde(default)]
    pub log10_loss_bin: f64,
    /// `cells[ke][sec_theta]`.
    pub cells: Vec<Vec<LossCell>>,
}

#[derive(Debug, Deserialize)]
struct LossTableFile {
    particles: Vec<ParticleLossTable>,
}

impl ParticleLossTable {
    fn validate(&self) -> Result<()> {
        let invalid = |what: &str| {
            Err(Error::ConfigError(format!(
                "energy-loss table for id {}: {what}",
                self.id
            )))
        };
        if !(self.log10_ke_bin > 0.0 && self.sec_theta_bin > 0.0) {
            return invalid("bin widths must be positive");
        }
        if self.log10_loss_bin < 0.0 {
            return invalid("log10_loss_bin must not be negative");
        }
        let Some(width) = self.cells.first().map(Vec::len) else {
            return invalid("no kinetic energy bins");
        };
        if width == 0 || self.cells.iter().any(|row| row.len() != width) {
            return invalid(
                "every kinetic energy bin needs the same non-zero number of sec(theta) bins",
            );
        }
        let bad_cell = self.cells.iter().flatten().any(|cell| {
            !(0.0..=1.0).contains(&cell.p_loss) || cell.bins.iter().any(|b| !(b.weight >= 0.0))
        });
        if bad_cell {
            return invalid("probabilities must lie in [0, 1] and weights must be non-negative");
        }
        Ok(())
    }

    fn cell<R: Rng + ?Sized>(&self, log10_ke: f64, sec_theta: f64, rng: &mut R) -> &LossCell {
        let ke = nearest_bin(log10_ke, self.log10_ke_min, self.log10_ke_bin, self.cells.len(), rng);
        let row = &self.cells[ke];
        let sec = nearest_bin(sec_theta, self.sec_theta_min, self.sec_theta_bin, row.len(), rng);
        &row[sec]
    }
}

/// Picks one of the two bins whose centers bracket `value`, the closer one
/// being the more likely. Values beyond the outermost centers use the edge bin.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn nearest_bin<R: Rng + ?Sized>(value: f64, min: f64, width: f64, count: usize, rng: &mut R) -> usize {
    let position = (value - min) / width - 0.5;
    if position <= 0.0 {
        return 0;
    }
    let lower = position.floor() as usize;
    if lower + 1 >= count {
        return count - 1;
    }
    if rng.gen::<f64>() < position - lower as f64 {
        lower + 1
    } else {
        lower
    }
}

/// Energy-loss sampler backed by a tabulated detector response.
#[derive(Clone, Debug, Default)]
pub struct TabulatedEnergyLoss {
    particles: HashMap<i32, ParticleLossTable>,
}

impl TabulatedEnergyLoss {
    /// Load a table from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the table is malformed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let table: LossTableFile = read_json_file(path.as_ref())?;
        Self::from_tables(table.particles)
    }

    /// Load a table from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid table.
    pub fn from_json(json: &str) -> Result<Self> {
        let table: LossTableFile = serde_json::from_str(json)?;
        Self::from_tables(table.particles)
    }

    /// Build a sampler from per-particle tables.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for malformed or duplicate tables.
    pub fn from_tables(tables: Vec<ParticleLossTable>) -> Result<Self> {
        let mut particles = HashMap::with_capacity(tables.len());
        for table in tables {
            table.validate()?;
            let id = table.id;
            if particles.insert(id, table).is_some() {
                return Err(Error::ConfigError(format!(
                    "energy-loss table lists particle id {id} twice"
                )));
            }
        }
        Ok(Self { particles })
    }

    /// Particle ids with a response table.
    pub fn particle_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.particles.keys().copied()
    }
}

impl EnergyLossSampler for TabulatedEnergyLoss {
    fn sample<R: Rng + ?Sized>(
        &mut self,
        id: i32,
        kinetic_energy_mev: f64,
        sec_theta: f64,
        rng: &mut R,
    ) -> (f64, f64) {
        let Some(table) = self.particles.get(&id) else {
            return (0.0, 0.0);
        };
        if !(kinetic_energy_mev > 0.0) {
            return (0.0, 0.0);
        }
        let log10_ke = kinetic_energy_mev.log10();
        if log10_ke < table.log10_ke_min {
            return (0.0, 0.0);
        }
        let sec_theta = sec_theta.clamp(1.0, MAX_SEC_THETA);
        let cell = table.cell(log10_ke, sec_theta, rng);
        if rng.gen::<f64>() >= cell.p_loss {
            return (0.0, 0.0);
        }

        let total: f64 = cell.bins.iter().map(|b| b.weight).sum();
        if !(total > 0.0) {
            return (0.0, 0.0);
        }
        let mut pick = rng.gen::<f64>() * total;
        let bin = cell
            .bins
            .iter()
            .find(|b| {
                pick -= b.weight;
                pick < 0.0
            })
            .or_else(|| cell.bins.iter().rev().find(|b| b.weight > 0.0));
        let Some(bin) = bin else {
            return (0.0, 0.0);
        };

        let mut deposit = |log10_loss: Option<f64>| {
            log10_loss.map_or(0.0, |value| {
                10f64.powf(value + table.log10_loss_bin * rng.gen::<f64>())
            })
        };
        let upper = deposit(bin.upper);
        let lower = deposit(bin.lower);
        (upper, lower)
    }
}
