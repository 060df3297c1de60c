//! showertile-corsika: CORSIKA particle-file decoder.
//!
//! This crate decodes the block-structured CORSIKA particle output and the
//! unframed "plain" particle streams used as spill files between batches.
//!
//! # Key Components
//!
//! - [`SubBlockKind`] - sub-block classification by its 4-byte tag
//! - [`CorsikaStream`] - framed decoder delivering particles to a sink
//! - [`PlainParticleStream`] - bare 7-float records, no framing
//! - [`BlockWriter`] - framed block encoder for synthetic particle files
//!
//! Both decoders are push-style: they call
//! [`ParticleSink::process_particle`](showertile_core::ParticleSink) once per
//! particle, in file order, and stop at the first error.

mod block;
mod error;
mod plain;
mod stream;
mod writer;

pub use block::{
    ParticleFileStats, SubBlockKind, BLOCK_BYTES, BLOCK_PAYLOAD_BYTES, SUBBLOCKS_PER_BLOCK,
    SUBBLOCK_BYTES,
};
pub use error::{Error, Result};
pub use plain::{encode_particle, PlainParticleStream, PLAIN_RECORD_BYTES};
pub use stream::{CorsikaStream, StreamSummary};
pub use writer::BlockWriter;
