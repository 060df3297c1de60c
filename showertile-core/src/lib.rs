//! showertile-core: Core types for air-shower tile processing.
//!
//! This crate provides the foundational pieces shared by every pass:
//! the tile grid and its coordinate mapping, the CORSIKA particle and
//! event-header models with their derived fields and cuts, the
//! fixed-width tile record, and the run configuration.
//!

pub mod config;
pub mod error;
pub mod grid;
pub mod particle;
pub mod record;

pub use config::{BatchConfig, CutConfig, GridConfig, ShowerTileConfig, TimeConfig};
pub use error::{read_json_file, Error, Result};
pub use grid::{TileGeometry, TileGrid, TimeTable, SENTINEL_TIME};
pub use particle::{
    EventHeader, ParticleCuts, ParticleRecord, ParticleSink, HEADER_WORDS, PARTICLES_PER_SUBBLOCK,
    PARTICLE_WORDS,
};
pub use record::{BinCounts, TileRecord, COUNT_CEILING, TILE_RECORD_BYTES};
