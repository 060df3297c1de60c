//! showertile-algorithms: the passes that turn a particle stream into tiles.
//!
//! - **Arrival-time pass** - per-tile minimum arrival time with outlier rejection
//! - **Interpolation** - near-core disk search and radial extrapolation
//! - **Batch accumulator** - memory-bounded, time-batched VEM counting
//! - **Merge** - sparse summation of partial tile files
//! - **Energy loss** - detector response sampling
//!
#![warn(missing_docs)]

mod accumulator;
mod arrival;
mod eloss;
pub mod interpolation;
mod merge;

pub use accumulator::{
    standard_normal_pair, AccumulatorSettings, BatchAccumulator, BatchCounters, BatchSink,
    BatchStats, SpillSink, JITTER_FRACTION,
};
pub use arrival::{is_outlier, quantize_time, quantize_times, ArrivalStats, ArrivalTimePass};
pub use eloss::{
    EnergyLossSampler, LossBin, LossCell, ParticleLossTable, TabulatedEnergyLoss, MAX_SEC_THETA,
};
pub use interpolation::{DiskTile, InterpolationDisk, RadialScaling};
pub use merge::{MergeAccumulator, MergeKey, MergedTiles, REFERENCE_TIME_TOLERANCE_NS};
