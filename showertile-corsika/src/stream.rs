//! Framed CORSIKA particle-file decoder.

use crate::block::{
    decode_f32s, ParticleFileStats, SubBlockKind, BLOCK_BYTES, BLOCK_PAYLOAD_BYTES,
    SUBBLOCK_BYTES,
};
use crate::plain::PLAIN_RECORD_BYTES;
use crate::{Error, Result};
use showertile_core::{EventHeader, ParticleRecord, ParticleSink, HEADER_WORDS, PARTICLE_WORDS};

/// Outcome of a complete scan.
#[derive(Debug, Clone)]
pub struct StreamSummary {
    /// Header of the first shower in the stream.
    pub header: EventHeader,
    /// Sub-block and particle counts.
    pub stats: ParticleFileStats,
}

/// Decoder over the bytes of a CORSIKA particle file.
pub struct CorsikaStream<'a> {
    data: &'a [u8],
    observation_level_cm: f64,
}

impl<'a> CorsikaStream<'a> {
    /// Creates a decoder. The observation level is needed to derive the
    /// event header's reference time.
    #[must_use]
    pub fn new(data: &'a [u8], observation_level_cm: f64) -> Self {
        Self {
            data,
            observation_level_cm,
        }
    }

    /// Number of whole blocks in the data.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.data.len() / BLOCK_BYTES
    }

    /// Decodes every block and hands each particle to `sink`.
    ///
    /// Only the first event header is used; later ones are counted and skipped.
    /// Zero-filled particle records are skipped without being counted.
    ///
    /// # Errors
    /// Returns an error on framing violations, on particles preceding the
    /// event header, on a stream without event header, or when `sink` fails.
    #[allow(clippy::float_cmp)]
    pub fn for_each_particle<S: ParticleSink + ?Sized>(&self, sink: &mut S) -> Result<StreamSummary> {
        let mut stats = ParticleFileStats::default();
        let mut header: Option<EventHeader> = None;
        let mut words = vec![0.0f32; HEADER_WORDS];
        let mut raw = [0.0f32; PARTICLE_WORDS];
        let mut offset = 0usize;

        while offset < self.data.len() {
            let available = self.data.len() - offset;
            if available < BLOCK_BYTES {
                return Err(Error::Truncated {
                    what: "block",
                    offset,
                    needed: BLOCK_BYTES,
                    available,
                });
            }
            let block = &self.data[offset..offset + BLOCK_BYTES];
            let leading = read_i32(&block[..4]);
            let trailing = read_i32(&block[BLOCK_BYTES - 4..]);
            if leading != trailing || usize::try_from(leading).ok() != Some(BLOCK_PAYLOAD_BYTES) {
                return Err(Error::BadBlockLength {
                    offset,
                    leading,
                    trailing,
                    expected: BLOCK_PAYLOAD_BYTES,
                });
            }
            stats.blocks += 1;

            let payload = &block[4..BLOCK_BYTES - 4];
            for (i, sub) in payload.chunks_exact(SUBBLOCK_BYTES).enumerate() {
                let sub_offset = offset + 4 + i * SUBBLOCK_BYTES;
                let kind = SubBlockKind::from_tag([sub[0], sub[1], sub[2], sub[3]]);
                stats.record(kind);
                match kind {
                    SubBlockKind::EventHeader => {
                        if header.is_some() {
                            log::warn!(
                                "additional event header at byte offset {sub_offset} ignored, only the first shower is read"
                            );
                        } else {
                            decode_f32s(sub, &mut words);
                            header = Some(EventHeader::from_words(&words, self.observation_level_cm)?);
                        }
                    }
                    SubBlockKind::Particles => {
                        for record in sub.chunks_exact(PLAIN_RECORD_BYTES) {
                            decode_f32s(record, &mut raw);
                            // zero type word: padding
                            if raw[0] == 0.0 {
                                continue;
                            }
                            let Some(event) = header.as_ref() else {
                                return Err(Error::ParticlesBeforeHeader(sub_offset));
                            };
                            stats.particles += 1;
                            sink.process_particle(&ParticleRecord::from_raw(raw), event)?;
                        }
                    }
                    _ => {}
                }
            }
            offset += BLOCK_BYTES;
        }

        log::info!(
            "read {} blocks; RUNH: {}, EVTH: {}, particle sub-blocks: {}, LONG: {}, EVTE: {}, RUNE: {}",
            stats.blocks,
            stats.run_headers,
            stats.event_headers,
            stats.particle_subblocks,
            stats.longitudinal,
            stats.event_ends,
            stats.run_ends
        );

        let header = header.ok_or(Error::NoEventHeader)?;
        Ok(StreamSummary { header, stats })
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
