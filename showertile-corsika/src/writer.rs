//! Framed CORSIKA block writer.
//!
//! Produces files the [`CorsikaStream`](crate::CorsikaStream) decoder
//! accepts: sub-blocks are packed 21 to a block, and the final block is
//! padded with zero-filled sub-blocks.

use crate::block::{BLOCK_PAYLOAD_BYTES, SUBBLOCKS_PER_BLOCK, SUBBLOCK_BYTES};
use crate::plain::encode_particle;
use crate::SubBlockKind;
use showertile_core::{HEADER_WORDS, PARTICLES_PER_SUBBLOCK, PARTICLE_WORDS};

/// Accumulates sub-blocks and serializes them into framed blocks.
#[derive(Debug, Default)]
pub struct BlockWriter {
    subblocks: Vec<Vec<u8>>,
    pending: Vec<[f32; PARTICLE_WORDS]>,
}

impl BlockWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tagged sub-block. Words after the tag are taken from
    /// `words[1..]`; missing words are zero.
    pub fn push_tagged(&mut self, kind: SubBlockKind, words: &[f32]) {
        self.flush_particles();
        let mut bytes = vec![0u8; SUBBLOCK_BYTES];
        for (chunk, value) in bytes.chunks_exact_mut(4).zip(words).skip(1) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        if let Some(tag) = kind.tag() {
            bytes[..4].copy_from_slice(tag);
        }
        self.subblocks.push(bytes);
    }

    /// Appends an event header built from `words` (at most 273 floats).
    pub fn push_event_header(&mut self, words: &[f32]) {
        self.push_tagged(SubBlockKind::EventHeader, &words[..words.len().min(HEADER_WORDS)]);
    }

    /// Queues a particle record; records are packed 39 to a sub-block.
    pub fn push_particle(&mut self, raw: [f32; PARTICLE_WORDS]) {
        self.pending.push(raw);
        if self.pending.len() == PARTICLES_PER_SUBBLOCK {
            self.flush_particles();
        }
    }

    fn flush_particles(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut bytes = Vec::with_capacity(SUBBLOCK_BYTES);
        for raw in self.pending.drain(..) {
            bytes.extend_from_slice(&encode_particle(&raw));
        }
        bytes.resize(SUBBLOCK_BYTES, 0);
        self.subblocks.push(bytes);
    }

    /// Serializes everything pushed so far.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.flush_particles();
        let length = (BLOCK_PAYLOAD_BYTES as i32).to_le_bytes();
        let mut out = Vec::new();
        for block in self.subblocks.chunks(SUBBLOCKS_PER_BLOCK) {
            out.extend_from_slice(&length);
            for sub in block {
                out.extend_from_slice(sub);
            }
            out.resize(out.len() + (SUBBLOCKS_PER_BLOCK - block.len()) * SUBBLOCK_BYTES, 0);
            out.extend_from_slice(&length);
        }
        out
    }
}
