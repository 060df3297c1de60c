//! showertile-io: File I/O and run drivers for showertile.
//!
//! This crate maps particle files and tile files into memory via memmap2,
//! writes partial and merged tile files, manages the double-buffered spill
//! files between accumulation batches, and drives the two top-level
//! operations: [`PartialRun`] and [`merge_partial_files`].
//!

pub mod batching;
mod error;
mod merge;
mod pipeline;
mod reader;
pub mod spill;
mod writer;

pub use batching::BatchSizing;
pub use error::{Error, Result};
pub use merge::{merge_partial_files, read_list_file, MergeSummary};
pub use pipeline::{PartialRun, PartialSummary};
pub use reader::{
    CorsikaFileReader, MappedFileReader, PartialTileReader, PlainFileReader, TileFileReader,
    HEADER_BYTES,
};
pub use spill::{SpillRing, SpillWriter};
pub use writer::{write_time_table_file, TileFileWriter};
