//! Tile file writers.

use crate::{Error, Result};
use showertile_core::{EventHeader, TileRecord, TimeTable};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sequential writer of partial and merged tile files.
///
/// Layout: event header (273 little-endian f32), then for partial files the
/// row-major minimum-time table, then 12-byte tile records.
pub struct TileFileWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    records: usize,
}

impl TileFileWriter {
    /// Creates (or truncates) the output file.
    ///
    /// # Errors
    /// Returns `Error::FileOpen` if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::open(path, e))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            records: 0,
        })
    }

    /// Writes the raw event header words.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_header(&mut self, header: &EventHeader) -> Result<()> {
        write_f32s(&mut self.writer, header.raw()).map_err(|e| Error::write(&self.path, e))
    }

    /// Writes a minimum-time table.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_time_table(&mut self, times: &TimeTable) -> Result<()> {
        write_f32s(&mut self.writer, times.as_slice()).map_err(|e| Error::write(&self.path, e))
    }

    /// Appends tile records.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_records(&mut self, records: &[TileRecord]) -> Result<()> {
        for record in records {
            self.writer
                .write_all(&record.to_bytes())
                .map_err(|e| Error::write(&self.path, e))?;
        }
        self.records += records.len();
        Ok(())
    }

    /// Records written so far.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Flushes and closes the file, returning the record count.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn finish(mut self) -> Result<usize> {
        self.writer
            .flush()
            .map_err(|e| Error::write(&self.path, e))?;
        log::debug!("wrote {} records to {}", self.records, self.path.display());
        Ok(self.records)
    }
}

/// Writes a minimum-time table on its own: NX·NY little-endian f32, row-major.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_time_table_file<P: AsRef<Path>>(path: P, times: &TimeTable) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| Error::open(path, e))?;
    let mut writer = BufWriter::new(file);
    write_f32s(&mut writer, times.as_slice())
        .and_then(|()| writer.flush())
        .map_err(|e| Error::write(path, e))
}

fn write_f32s<W: Write>(writer: &mut W, values: &[f32]) -> std::io::Result<()> {
    for value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}
