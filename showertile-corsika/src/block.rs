//! CORSIKA block framing and sub-block classification.
//!
//! A block is a 4-byte length word, 21 sub-blocks of 273 floats and a
//! closing length word equal to the first.

use showertile_core::HEADER_WORDS;

/// Sub-blocks per block.
pub const SUBBLOCKS_PER_BLOCK: usize = 21;

/// Bytes per sub-block.
pub const SUBBLOCK_BYTES: usize = HEADER_WORDS * 4;

/// Bytes between the two length words of a block.
pub const BLOCK_PAYLOAD_BYTES: usize = SUBBLOCKS_PER_BLOCK * SUBBLOCK_BYTES;

/// Bytes per block including both length words.
pub const BLOCK_BYTES: usize = BLOCK_PAYLOAD_BYTES + 8;

/// Sub-block types, identified by the 4-byte tag in their first word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubBlockKind {
    /// Run header (`RUNH`).
    RunHeader,
    /// Event header (`EVTH`).
    EventHeader,
    /// Longitudinal profile (`LONG`).
    Longitudinal,
    /// Event end (`EVTE`).
    EventEnd,
    /// Run end (`RUNE`).
    RunEnd,
    /// Untagged block of particle records.
    Particles,
}

impl SubBlockKind {
    /// Classifies a sub-block by its leading tag.
    #[must_use]
    pub fn from_tag(tag: [u8; 4]) -> Self {
        match &tag {
            b"RUNH" => SubBlockKind::RunHeader,
            b"EVTH" => SubBlockKind::EventHeader,
            b"LONG" => SubBlockKind::Longitudinal,
            b"EVTE" => SubBlockKind::EventEnd,
            b"RUNE" => SubBlockKind::RunEnd,
            _ => SubBlockKind::Particles,
        }
    }

    /// Tag written at the start of the sub-block, if it carries one.
    #[must_use]
    pub fn tag(self) -> Option<&'static [u8; 4]> {
        match self {
            SubBlockKind::RunHeader => Some(b"RUNH"),
            SubBlockKind::EventHeader => Some(b"EVTH"),
            SubBlockKind::Longitudinal => Some(b"LONG"),
            SubBlockKind::EventEnd => Some(b"EVTE"),
            SubBlockKind::RunEnd => Some(b"RUNE"),
            SubBlockKind::Particles => None,
        }
    }
}

/// Per-file counts of what a scan encountered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticleFileStats {
    pub run_headers: usize,
    pub event_headers: usize,
    pub longitudinal: usize,
    pub event_ends: usize,
    pub run_ends: usize,
    pub particle_subblocks: usize,
    pub particles: usize,
    pub blocks: usize,
}

impl ParticleFileStats {
    pub(crate) fn record(&mut self, kind: SubBlockKind) {
        match kind {
            SubBlockKind::RunHeader => self.run_headers += 1,
            SubBlockKind::EventHeader => self.event_headers += 1,
            SubBlockKind::Longitudinal => self.longitudinal += 1,
            SubBlockKind::EventEnd => self.event_ends += 1,
            SubBlockKind::RunEnd => self.run_ends += 1,
            SubBlockKind::Particles => self.particle_subblocks += 1,
        }
    }
}

/// Decodes little-endian floats; `out` must hold `bytes.len() / 4` values.
pub(crate) fn decode_f32s(bytes: &[u8], out: &mut [f32]) {
    for (value, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
        *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size() {
        assert_eq!(SUBBLOCK_BYTES, 1092);
        assert_eq!(BLOCK_PAYLOAD_BYTES, 22_932);
    }

    #[test]
    fn test_tag_classification() {
        for kind in [
            SubBlockKind::RunHeader,
            SubBlockKind::EventHeader,
            SubBlockKind::Longitudinal,
            SubBlockKind::EventEnd,
            SubBlockKind::RunEnd,
        ] {
            let tag = *kind.tag().unwrap();
            assert_eq!(SubBlockKind::from_tag(tag), kind);
        }
        assert_eq!(SubBlockKind::from_tag([0, 0, 0, 0]), SubBlockKind::Particles);
        assert_eq!(SubBlockKind::from_tag(*b"evth"), SubBlockKind::Particles);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = ParticleFileStats::default();
        stats.record(SubBlockKind::EventHeader);
        stats.record(SubBlockKind::Particles);
        stats.record(SubBlockKind::Particles);
        assert_eq!(stats.event_headers, 1);
        assert_eq!(stats.particle_subblocks, 2);
    }
}
