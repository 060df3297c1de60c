//! Unframed particle streams.
//!
//! Spill files hold bare 7-float records back to back, with no header and
//! no block framing. The shower's event header is supplied by the caller.

use crate::block::decode_f32s;
use crate::{Error, Result};
use showertile_core::{EventHeader, ParticleRecord, ParticleSink, PARTICLE_WORDS};

/// Bytes per plain particle record.
pub const PLAIN_RECORD_BYTES: usize = PARTICLE_WORDS * 4;

/// Serializes a raw particle record in plain-stream layout.
#[must_use]
pub fn encode_particle(raw: &[f32; PARTICLE_WORDS]) -> [u8; PLAIN_RECORD_BYTES] {
    let mut bytes = [0u8; PLAIN_RECORD_BYTES];
    for (chunk, value) in bytes.chunks_exact_mut(4).zip(raw) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decoder over a plain particle stream.
pub struct PlainParticleStream<'a> {
    data: &'a [u8],
}

impl<'a> PlainParticleStream<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of whole records in the stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / PLAIN_RECORD_BYTES
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Hands every record to `sink` together with `header`.
    /// Returns the number of records read.
    ///
    /// # Errors
    /// Returns `Error::Truncated` if the stream ends inside a record, or the
    /// sink's error.
    pub fn for_each_particle<S: ParticleSink + ?Sized>(
        &self,
        header: &EventHeader,
        sink: &mut S,
    ) -> Result<usize> {
        let tail = self.data.len() % PLAIN_RECORD_BYTES;
        if tail != 0 {
            return Err(Error::Truncated {
                what: "plain particle record",
                offset: self.data.len() - tail,
                needed: PLAIN_RECORD_BYTES,
                available: tail,
            });
        }
        let mut raw = [0.0f32; PARTICLE_WORDS];
        for record in self.data.chunks_exact(PLAIN_RECORD_BYTES) {
            decode_f32s(record, &mut raw);
            sink.process_particle(&ParticleRecord::from_raw(raw), header)?;
        }
        Ok(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use showertile_core::HEADER_WORDS;

    fn header() -> EventHeader {
        let mut words = vec![0.0f32; HEADER_WORDS];
        words[6] = 1.0e6;
        words[9] = 1.0;
        EventHeader::from_words(&words, 0.0).unwrap()
    }

    #[test]
    fn test_plain_stream_passes_header_through() {
        let header = header();
        let mut data = Vec::new();
        data.extend_from_slice(&encode_particle(&[1000.0, 0.0, 0.0, 1.0, 1.0, 2.0, 3.0e4]));
        data.extend_from_slice(&encode_particle(&[5000.0, 0.0, 0.0, 2.0, 4.0, 5.0, 4.0e4]));

        let mut seen = Vec::new();
        let count = PlainParticleStream::new(&data)
            .for_each_particle(&header, &mut |p: &ParticleRecord, h: &EventHeader| {
                assert_eq!(h, &header);
                seen.push(p.id());
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(seen, vec![1, 5]);
    }

    #[test]
    fn test_plain_stream_truncated() {
        let mut data = encode_particle(&[1000.0; PARTICLE_WORDS]).to_vec();
        data.extend_from_slice(&[0u8; 5]);
        let result = PlainParticleStream::new(&data)
            .for_each_particle(&header(), &mut |_: &ParticleRecord, _: &EventHeader| Ok(()));
        assert!(matches!(
            result,
            Err(Error::Truncated {
                offset: 28,
                available: 5,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_plain_stream() {
        let stream = PlainParticleStream::new(&[]);
        assert!(stream.is_empty());
        let count = stream
            .for_each_particle(&header(), &mut |_: &ParticleRecord, _: &EventHeader| Ok(()))
            .unwrap();
        assert_eq!(count, 0);
    }
}
