//! Memory-budgeted sizing of accumulation batches.
//!
//! A batch holds one [`BinCounts`](showertile_core::BinCounts) per tile and
//! time bin, so its size is counted in bins: the budget divided by the
//! counter bytes of one bin across the grid, with 20% headroom.

use crate::{Error, Result};
use showertile_algorithms::BatchCounters;
use showertile_core::{BatchConfig, TileGeometry};
use sysinfo::System;

/// Counter bytes are scaled by `HEADROOM_NUM / HEADROOM_DEN` (1.2).
const HEADROOM_NUM: u64 = 6;
const HEADROOM_DEN: u64 = 5;

/// How many time bins one batch may hold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BatchSizing {
    /// A fixed number of bins, clamped to `1..=max_bins`.
    Bins(usize),
    /// A fraction in `(0, 1]` of the memory the system reports available.
    MemoryFraction(f64),
    /// A fixed byte budget for the batch counters.
    MemoryBytes(u64),
}

impl Default for BatchSizing {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

impl BatchSizing {
    /// Sizing from the batching section of a run configuration. An explicit
    /// bin count wins over the memory fraction.
    #[must_use]
    pub fn from_config(config: &BatchConfig) -> Self {
        match config.bins_per_batch {
            Some(bins) => Self::Bins(bins),
            None => Self::MemoryFraction(config.memory_fraction),
        }
    }

    /// Bins per batch for `geometry`, between 1 and `max_bins`.
    ///
    /// # Errors
    /// Returns an error if the memory fraction is out of range, system memory
    /// cannot be queried, or the budget cannot hold a single bin.
    pub fn bins_per_batch(&self, geometry: &TileGeometry, max_bins: usize) -> Result<usize> {
        let max_bins = max_bins.max(1);
        let budget = match *self {
            Self::Bins(bins) => return Ok(bins.clamp(1, max_bins)),
            Self::MemoryBytes(bytes) => bytes,
            Self::MemoryFraction(fraction) => fraction_of_available(fraction)?,
        };

        let bin_bytes = BatchCounters::bytes_per_bin(geometry) as u64 * HEADROOM_NUM;
        let bins = budget.saturating_mul(HEADROOM_DEN) / bin_bytes.max(1);
        if bins == 0 {
            return Err(Error::InvalidFormat(format!(
                "memory budget of {budget} bytes cannot hold one time bin ({} bytes)",
                bin_bytes / HEADROOM_DEN
            )));
        }
        let bins = usize::try_from(bins).map_or(max_bins, |bins| bins.min(max_bins));
        log::info!(
            "batch size {bins} bins ({} KiB of counters)",
            bins as u64 * bin_bytes / HEADROOM_DEN / 1024
        );
        Ok(bins)
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn fraction_of_available(fraction: f64) -> Result<u64> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(Error::InvalidFormat(format!(
            "memory fraction {fraction} is outside (0, 1]"
        )));
    }
    let mut system = System::new();
    system.refresh_memory();
    match system.available_memory() {
        0 => Err(Error::InvalidFormat(
            "system reports no available memory".to_string(),
        )),
        available => Ok((available as f64 * fraction) as u64),
    }
}
