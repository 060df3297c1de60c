//! Memory-mapped file readers.
//!

use crate::{Error, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use showertile_core::{
    EventHeader, ParticleSink, TileGeometry, TileRecord, TimeTable, HEADER_WORDS,
    TILE_RECORD_BYTES,
};
use showertile_corsika::{CorsikaStream, PlainParticleStream, StreamSummary};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Bytes of the event header at the start of every tile file.
pub const HEADER_BYTES: usize = HEADER_WORDS * 4;

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the whole file
/// into memory. Empty files are not mapped and read as an empty slice.
pub struct MappedFileReader {
    mmap: Option<Mmap>,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns `Error::FileOpen` if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::open(path, e))?;
        let len = file.metadata().map_err(|e| Error::open(path, e))?.len();
        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
            // This is the standard safety contract for memory mapping.
            #[allow(unsafe_code)]
            let mmap = unsafe { Mmap::map(&file).map_err(|e| Error::open(path, e))? };
            Some(mmap)
        };
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A block-framed CORSIKA particle file.
pub struct CorsikaFileReader {
    reader: MappedFileReader,
    observation_level_cm: f64,
}

impl CorsikaFileReader {
    /// Opens a particle file; headers are decoded against `observation_level_cm`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P, observation_level_cm: f64) -> Result<Self> {
        Ok(Self {
            reader: MappedFileReader::open(path)?,
            observation_level_cm,
        })
    }

    /// Decoder over the mapped bytes.
    #[must_use]
    pub fn stream(&self) -> CorsikaStream<'_> {
        CorsikaStream::new(self.reader.as_bytes(), self.observation_level_cm)
    }

    /// Scans every particle of the file into `sink`.
    ///
    /// # Errors
    /// Returns an error on malformed framing, a missing event header or a
    /// sink failure.
    pub fn for_each_particle<S: ParticleSink + ?Sized>(&self, sink: &mut S) -> Result<StreamSummary> {
        self.stream().for_each_particle(sink).map_err(Error::from)
    }

    /// File size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reader.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.reader.path()
    }
}

/// A plain spill file of bare particle records.
pub struct PlainFileReader {
    reader: MappedFileReader,
}

impl PlainFileReader {
    /// Opens a spill file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            reader: MappedFileReader::open(path)?,
        })
    }

    /// Scans every record, handing `header` through to the sink.
    ///
    /// # Errors
    /// Returns an error if the file ends mid-record or the sink fails.
    pub fn for_each_particle<S: ParticleSink + ?Sized>(
        &self,
        header: &EventHeader,
        sink: &mut S,
    ) -> Result<usize> {
        PlainParticleStream::new(self.reader.as_bytes())
            .for_each_particle(header, sink)
            .map_err(Error::from)
    }
}

/// A partial tile file: header, minimum-time table, records.
pub struct PartialTileReader {
    reader: MappedFileReader,
    header: EventHeader,
    times: TimeTable,
    records_offset: usize,
}

impl PartialTileReader {
    /// Opens a partial tile file written for `geometry`.
    ///
    /// # Errors
    /// Returns `Error::InvalidFormat` if the file is shorter than its header
    /// and table or ends mid-record, and header decoding errors.
    pub fn open<P: AsRef<Path>>(
        path: P,
        geometry: &TileGeometry,
        observation_level_cm: f64,
    ) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        let bytes = reader.as_bytes();
        let table_bytes = geometry.tile_count() * 4;
        let records_offset = HEADER_BYTES + table_bytes;
        check_layout(&reader, records_offset)?;

        let header = decode_header(&bytes[..HEADER_BYTES], observation_level_cm)?;
        let cells = decode_f32s(&bytes[HEADER_BYTES..records_offset]);
        let times = TimeTable::from_vec(geometry.nx(), geometry.ny(), cells)?;
        Ok(Self {
            reader,
            header,
            times,
            records_offset,
        })
    }

    #[must_use]
    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    /// Quantized observed minimum times of the worker.
    #[must_use]
    pub fn times(&self) -> &TimeTable {
        &self.times
    }

    /// Number of tile records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        (self.reader.len() - self.records_offset) / TILE_RECORD_BYTES
    }

    /// Iterates over the tile records, decoding from the mapping.
    pub fn records(&self) -> impl Iterator<Item = TileRecord> + '_ {
        decode_records(&self.reader.as_bytes()[self.records_offset..])
    }
}

/// A merged tile file: header and records.
pub struct TileFileReader {
    reader: MappedFileReader,
    header: EventHeader,
}

impl TileFileReader {
    /// Opens a merged tile file.
    ///
    /// # Errors
    /// Returns `Error::InvalidFormat` if the file is shorter than its header
    /// or ends mid-record, and header decoding errors.
    pub fn open<P: AsRef<Path>>(path: P, observation_level_cm: f64) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        check_layout(&reader, HEADER_BYTES)?;
        let header = decode_header(&reader.as_bytes()[..HEADER_BYTES], observation_level_cm)?;
        Ok(Self { reader, header })
    }

    #[must_use]
    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    /// Number of tile records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        (self.reader.len() - HEADER_BYTES) / TILE_RECORD_BYTES
    }

    /// Iterates over the tile records.
    pub fn records(&self) -> impl Iterator<Item = TileRecord> + '_ {
        decode_records(&self.reader.as_bytes()[HEADER_BYTES..])
    }
}

fn check_layout(reader: &MappedFileReader, records_offset: usize) -> Result<()> {
    let len = reader.len();
    if len < records_offset {
        return Err(Error::InvalidFormat(format!(
            "{} holds {len} bytes, shorter than its {records_offset}-byte preamble",
            reader.path().display()
        )));
    }
    let tail = (len - records_offset) % TILE_RECORD_BYTES;
    if tail != 0 {
        return Err(Error::InvalidFormat(format!(
            "{} ends mid-record ({tail} trailing bytes)",
            reader.path().display()
        )));
    }
    Ok(())
}

fn decode_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .par_chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn decode_header(bytes: &[u8], observation_level_cm: f64) -> Result<EventHeader> {
    let words = decode_f32s(bytes);
    Ok(EventHeader::from_words(&words, observation_level_cm)?)
}

fn decode_records(bytes: &[u8]) -> impl Iterator<Item = TileRecord> + '_ {
    bytes.chunks_exact(TILE_RECORD_BYTES).map(|chunk| {
        let mut buf = [0u8; TILE_RECORD_BYTES];
        buf.copy_from_slice(chunk);
        TileRecord::from_bytes(&buf)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mapped_reader() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4, 5]).unwrap();
        file.flush().unwrap();

        let reader = MappedFileReader::open(file.path()).unwrap();
        assert_eq!(reader.len(), 5);
        assert_eq!(reader.as_bytes(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_file_reads_empty() {
        let file = NamedTempFile::new().unwrap();
        let reader = MappedFileReader::open(file.path()).unwrap();
        assert!(reader.is_empty());
        assert!(reader.as_bytes().is_empty());
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.dat");
        let err = MappedFileReader::open(&path).err().unwrap();
        assert!(matches!(err, Error::FileOpen { .. }));
        assert!(err.to_string().contains("absent.dat"));
    }

    #[test]
    fn test_tile_file_ending_mid_record() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; HEADER_BYTES + TILE_RECORD_BYTES + 5])
            .unwrap();
        file.flush().unwrap();
        assert!(matches!(
            TileFileReader::open(file.path(), 0.0),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_partial_file_shorter_than_table() {
        let geometry = TileGeometry::new(60.0, 6.0).unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; HEADER_BYTES + 10]).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            PartialTileReader::open(file.path(), &geometry, 0.0),
            Err(Error::InvalidFormat(_))
        ));
    }
}
