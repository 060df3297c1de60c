//! Double-buffered spill files.
//!
//! Particles deferred to a later batch go to the producer file while the
//! consumer file (written during the previous batch) is replayed. After each
//! batch the two files swap roles. The consumer is only mapped after its
//! producer handle has been flushed and closed, and a file is only truncated
//! for writing after its mapping has been dropped.

use crate::reader::PlainFileReader;
use crate::{Error, Result};
use showertile_algorithms::SpillSink;
use showertile_core::PARTICLE_WORDS;
use showertile_corsika::encode_particle;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Producer side of the ring: an append-only plain particle file.
pub struct SpillWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    records: usize,
}

impl SpillWriter {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::open(path, e))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            records: 0,
        })
    }

    /// Records written since the file was created.
    #[must_use]
    pub fn records(&self) -> usize {
        self.records
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::write(&self.path, e))
    }

    fn close(mut self) -> Result<PathBuf> {
        self.flush()?;
        Ok(self.path)
    }
}

impl SpillSink for SpillWriter {
    fn spill(&mut self, raw: &[f32; PARTICLE_WORDS]) -> showertile_core::Result<()> {
        self.writer
            .write_all(&encode_particle(raw))
            .map_err(|e| showertile_core::Error::file(&self.path, e))?;
        self.records += 1;
        Ok(())
    }
}

/// Two spill files, `<output>.1.tmp` and `<output>.2.tmp`, with swapping
/// producer and consumer roles.
pub struct SpillRing {
    paths: [PathBuf; 2],
    producer_index: usize,
    producer: SpillWriter,
    consumer: Option<PlainFileReader>,
    removed: bool,
}

impl SpillRing {
    /// Creates the ring next to `output`; the first file starts as producer.
    ///
    /// # Errors
    /// Returns `Error::FileOpen` if the spill file cannot be created.
    pub fn create<P: AsRef<Path>>(output: P) -> Result<Self> {
        let output = output.as_ref();
        let paths = [spill_path(output, 1), spill_path(output, 2)];
        let producer = SpillWriter::create(&paths[0])?;
        Ok(Self {
            paths,
            producer_index: 0,
            producer,
            consumer: None,
            removed: false,
        })
    }

    /// Paths of both spill files.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf; 2] {
        &self.paths
    }

    /// Particles spilled during the current batch.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.producer.records()
    }

    /// Producer for batch 0, which has nothing to replay.
    pub fn producer_mut(&mut self) -> &mut SpillWriter {
        &mut self.producer
    }

    /// Consumer to replay (absent before the first swap) and the producer
    /// collecting particles for the next batch.
    pub fn split(&mut self) -> (Option<&PlainFileReader>, &mut SpillWriter) {
        (self.consumer.as_ref(), &mut self.producer)
    }

    /// Closes the producer, maps it as the next consumer and truncates the
    /// other file as the next producer.
    ///
    /// # Errors
    /// Returns an error if a file cannot be flushed, created or mapped.
    pub fn rotate(&mut self) -> Result<()> {
        self.consumer = None;
        let next = 1 - self.producer_index;
        let fresh = SpillWriter::create(&self.paths[next])?;
        let finished = std::mem::replace(&mut self.producer, fresh).close()?;
        log::debug!("spill swap: replaying {}", finished.display());
        self.consumer = Some(PlainFileReader::open(&finished)?);
        self.producer_index = next;
        Ok(())
    }

    /// Closes both files and removes them.
    ///
    /// # Errors
    /// Returns an error if a file exists but cannot be removed.
    pub fn finish(mut self) -> Result<()> {
        self.consumer = None;
        self.producer.flush()?;
        self.remove_files()
    }

    fn remove_files(&mut self) -> Result<()> {
        self.removed = true;
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::open(path, e)),
            }
        }
        Ok(())
    }
}

impl Drop for SpillRing {
    fn drop(&mut self) {
        if !self.removed {
            self.consumer = None;
            if let Err(e) = self.remove_files() {
                log::warn!("spill files left behind: {e}");
            }
        }
    }
}

fn spill_path(output: &Path, index: usize) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(format!(".{index}.tmp"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use showertile_core::{EventHeader, ParticleRecord, HEADER_WORDS};

    fn header() -> EventHeader {
        let mut words = vec![0.0f32; HEADER_WORDS];
        words[6] = 1.0e6;
        words[9] = 1.0;
        EventHeader::from_words(&words, 0.0).unwrap()
    }

    fn particle(i: u8) -> [f32; PARTICLE_WORDS] {
        [5001.0, 0.0, 0.0, 1.0, f32::from(i), 0.0, 40_000.0]
    }

    fn replay(reader: &PlainFileReader) -> Vec<[f32; PARTICLE_WORDS]> {
        let mut seen = Vec::new();
        let mut sink = |p: &ParticleRecord, _: &EventHeader| -> showertile_core::Result<()> {
            seen.push(*p.raw());
            Ok(())
        };
        reader.for_each_particle(&header(), &mut sink).unwrap();
        seen
    }

    #[test]
    fn test_roles_swap_each_batch() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("shower.tiles");
        let mut ring = SpillRing::create(&output).unwrap();
        assert!(ring.paths()[0].ends_with("shower.tiles.1.tmp"));
        assert!(ring.paths()[1].ends_with("shower.tiles.2.tmp"));

        for i in 0..3 {
            ring.producer_mut().spill(&particle(i)).unwrap();
        }
        assert_eq!(ring.pending(), 3);
        ring.rotate().unwrap();
        assert_eq!(ring.pending(), 0);

        // replay batch 1 while deferring one particle to batch 2
        let (consumer, producer) = ring.split();
        let replayed = replay(consumer.unwrap());
        assert_eq!(replayed, vec![particle(0), particle(1), particle(2)]);
        producer.spill(&replayed[2]).unwrap();
        assert!(producer.path().ends_with("shower.tiles.2.tmp"));

        ring.rotate().unwrap();
        let (consumer, producer) = ring.split();
        assert_eq!(replay(consumer.unwrap()), vec![particle(2)]);
        assert!(producer.path().ends_with("shower.tiles.1.tmp"));
        assert_eq!(producer.records(), 0);

        let paths = ring.paths().clone();
        ring.finish().unwrap();
        assert!(!paths[0].exists());
        assert!(!paths[1].exists());
    }

    #[test]
    fn test_empty_batch_replays_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ring = SpillRing::create(dir.path().join("out")).unwrap();
        ring.rotate().unwrap();
        let (consumer, _) = ring.split();
        assert!(replay(consumer.unwrap()).is_empty());
    }

    #[test]
    fn test_drop_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = {
            let mut ring = SpillRing::create(dir.path().join("out")).unwrap();
            ring.producer_mut().spill(&particle(1)).unwrap();
            ring.rotate().unwrap();
            ring.paths().clone()
        };
        assert!(!paths[0].exists());
        assert!(!paths[1].exists());
    }

    #[test]
    fn test_create_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("gone").join("shower.tiles");
        let err = SpillRing::create(&output).err().unwrap();
        assert!(err.to_string().contains("shower.tiles.1.tmp"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_spill_error_names_path() {
        // 400 records overflow the write buffer; /dev/full rejects the write
        let mut writer = SpillWriter::create(Path::new("/dev/full")).unwrap();
        let err = (0..400)
            .map(|_| writer.spill(&particle(7)))
            .find_map(std::result::Result::err)
            .unwrap();
        assert!(matches!(err, showertile_core::Error::File { .. }));
        assert!(err.to_string().contains("/dev/full"));
    }
}
