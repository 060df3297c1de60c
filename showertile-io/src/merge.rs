//! Merge driver: many partial tile files in, one tile file out.

use crate::reader::PartialTileReader;
use crate::writer::TileFileWriter;
use crate::{Error, Result};
use showertile_algorithms::MergeAccumulator;
use showertile_core::{EventHeader, ShowerTileConfig, TileGeometry};
use std::path::{Path, PathBuf};

/// Outcome of a merge.
#[derive(Clone, Debug)]
pub struct MergeSummary {
    pub header: EventHeader,
    /// Partial files read.
    pub files: usize,
    /// Records read across all inputs.
    pub input_records: usize,
    /// Records written.
    pub records: usize,
}

/// Sums `inputs` into a single tile file at `output`.
///
/// Inputs must come from workers of the same shower run with the same grid
/// and time binning as `config`. Their order does not affect the output.
///
/// # Errors
/// Returns an error if the list is empty, an input cannot be read or
/// belongs to another shower, or the output cannot be written.
pub fn merge_partial_files<P, Q>(config: &ShowerTileConfig, inputs: &[P], output: Q) -> Result<MergeSummary>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    if inputs.is_empty() {
        return Err(Error::InvalidFormat("no partial files to merge".to_string()));
    }
    config.validate()?;
    let geometry = TileGeometry::from_config(&config.grid)?;
    let mut merge = MergeAccumulator::new(geometry, config.time.bin_width_ns, config.time.max_bins);

    let mut input_records = 0;
    for input in inputs {
        let reader = PartialTileReader::open(input, &geometry, config.observation_level_cm)?;
        log::info!(
            "merging {} ({} records)",
            input.as_ref().display(),
            reader.record_count()
        );
        input_records += reader.record_count();
        merge.add_file(reader.header(), reader.times(), reader.records())?;
    }
    log::debug!("{} distinct tile bins before core synthesis", merge.len());

    let files = merge.files();
    let merged = merge.finish()?;
    let mut writer = TileFileWriter::create(output.as_ref())?;
    writer.write_header(&merged.header)?;
    writer.write_records(&merged.records)?;
    let records = writer.finish()?;
    log::info!(
        "{records} records from {files} partial files written to {}",
        output.as_ref().display()
    );

    Ok(MergeSummary {
        header: merged.header,
        files,
        input_records,
        records,
    })
}

/// Reads a list of partial file paths, one per line.
///
/// Blank lines and lines starting with `#` are skipped; surrounding
/// whitespace is trimmed.
///
/// # Errors
/// Returns `Error::FileOpen` if the list cannot be read.
pub fn read_list_file<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::open(path, e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}
