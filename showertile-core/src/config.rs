//! Run configuration.
//!
//! Every field has a default matching the Telescope Array ground-array
//! setup, so an empty JSON object is a valid configuration file.

use crate::error::read_json_file;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Footprint of the tile grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Side of the square detector footprint (meters).
    pub map_side_m: f64,
    /// Side of one square tile (meters).
    pub tile_side_m: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            map_side_m: 16_800.0,
            tile_side_m: 6.0,
        }
    }
}

/// Time quantization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Width of one time bin (nanoseconds).
    pub bin_width_ns: f64,
    /// Number of time bins recorded per tile.
    pub max_bins: usize,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            bin_width_ns: 20.0,
            max_bins: 1280,
        }
    }
}

/// Particle selection thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutConfig {
    /// Minimum kinetic energy (keV); particles at or below it are dropped.
    pub min_kinetic_energy_kev: f64,
    /// Minimum time since first interaction (nanoseconds).
    pub min_time_ns: f64,
}

impl Default for CutConfig {
    fn default() -> Self {
        Self {
            min_kinetic_energy_kev: 0.0,
            min_time_ns: 1.0e4,
        }
    }
}

/// Sizing of the time-bin batches used by the accumulation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Explicit number of time bins per batch. Overrides `memory_fraction`.
    pub bins_per_batch: Option<usize>,
    /// Fraction of available system memory the batch counters may occupy.
    pub memory_fraction: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            bins_per_batch: None,
            memory_fraction: 0.5,
        }
    }
}

/// Full configuration of a showertile run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowerTileConfig {
    pub grid: GridConfig,
    pub time: TimeConfig,
    pub cuts: CutConfig,
    pub batching: BatchConfig,
    /// Height of the observation plane above sea level (cm).
    pub observation_level_cm: f64,
    /// Energy deposit of one vertical-equivalent muon (MeV).
    pub vem_mev: f64,
    /// Seed of the random source used for energy-loss sampling.
    pub seed: u64,
}

impl Default for ShowerTileConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            time: TimeConfig::default(),
            cuts: CutConfig::default(),
            batching: BatchConfig::default(),
            observation_level_cm: 1430.0e2,
            vem_mev: 2.05,
            seed: 314_159_265,
        }
    }
}

impl ShowerTileConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON,
    /// or describes an inconsistent setup.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = read_json_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not valid JSON or the values are inconsistent.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the grid footprint.
    #[must_use]
    pub fn with_grid(mut self, map_side_m: f64, tile_side_m: f64) -> Self {
        self.grid = GridConfig {
            map_side_m,
            tile_side_m,
        };
        self
    }

    /// Set the number of time bins per tile.
    #[must_use]
    pub fn with_max_bins(mut self, max_bins: usize) -> Self {
        self.time.max_bins = max_bins;
        self
    }

    /// Set an explicit batch size in time bins.
    #[must_use]
    pub fn with_bins_per_batch(mut self, bins: usize) -> Self {
        self.batching.bins_per_batch = Some(bins.max(1));
        self
    }

    /// Set the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the minimum kinetic energy (keV).
    #[must_use]
    pub fn with_min_kinetic_energy_kev(mut self, kev: f64) -> Self {
        self.cuts.min_kinetic_energy_kev = kev;
        self
    }

    /// Check the configuration for internal consistency.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !(self.grid.tile_side_m > 0.0 && self.grid.map_side_m > self.grid.tile_side_m) {
            return Err(Error::ConfigError(format!(
                "map side {} m must exceed a positive tile side {} m",
                self.grid.map_side_m, self.grid.tile_side_m
            )));
        }
        if !(self.time.bin_width_ns > 0.0) {
            return Err(Error::ConfigError(format!(
                "bin width must be positive, got {} ns",
                self.time.bin_width_ns
            )));
        }
        if self.time.max_bins == 0 || self.time.max_bins > i16::MAX as usize {
            return Err(Error::ConfigError(format!(
                "max_bins must be in 1..={}, got {}",
                i16::MAX,
                self.time.max_bins
            )));
        }
        if !(self.vem_mev > 0.0) {
            return Err(Error::ConfigError("vem_mev must be positive".to_string()));
        }
        if self.batching.bins_per_batch == Some(0) {
            return Err(Error::ConfigError(
                "bins_per_batch must be at least 1".to_string(),
            ));
        }
        if !(0.0 < self.batching.memory_fraction && self.batching.memory_fraction <= 1.0) {
            return Err(Error::ConfigError(
                "memory_fraction must be in (0.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }
}
