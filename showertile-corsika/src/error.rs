//! CORSIKA decoding error types.

use thiserror::Error;

/// Result type for CORSIKA decoding.
pub type Result<T> = std::result::Result<T, Error>;

/// CORSIKA decoding error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Data ends inside a block or record.
    #[error("truncated {what} at byte offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Block length words disagree with each other or with the fixed block size.
    #[error("block at byte offset {offset} has length words {leading}/{trailing}, expected {expected}")]
    BadBlockLength {
        offset: usize,
        leading: i32,
        trailing: i32,
        expected: usize,
    },

    /// A particle sub-block appeared before any event header.
    #[error("particle sub-block at byte offset {0} precedes the event header")]
    ParticlesBeforeHeader(usize),

    /// The stream holds no event header at all.
    #[error("no event header found in particle stream")]
    NoEventHeader,

    /// Core library error (including errors raised by particle sinks).
    #[error("core error: {0}")]
    CoreError(#[from] showertile_core::Error),
}
