//! Error types for showertile-core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for showertile operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for showertile operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A coordinate maps to a tile outside the grid.
    #[error("coordinate {coord_cm} cm maps outside the {tiles}-tile grid")]
    TileOutOfRange { coord_cm: f64, tiles: usize },

    /// Event header block is malformed.
    #[error("invalid event header: {0}")]
    InvalidHeader(String),

    /// No tile along the central row ever received a particle.
    #[error("no populated tile found on the central row; cannot place the interpolation disk")]
    EmptyShower,

    /// A particle belongs to a batch that has already been written.
    #[error("particle assigned to batch {batch} while accumulating batch {current}")]
    BatchOrdering { batch: i64, current: usize },

    /// A tile record does not fit the grid it is read against.
    #[error("invalid tile record: {0}")]
    InvalidRecord(String),

    /// A global bin index does not fit the 16-bit record field.
    #[error("tile ({m}, {n}) bin {bin} does not fit the tile record format")]
    BinOverflow { m: usize, n: usize, bin: i64 },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A named file could not be read or written.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A named JSON file could not be parsed.
    #[error("{}: {source}", path.display())]
    FileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error with no file attached.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// I/O failure on `path`.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// JSON parse failure in `path`.
    pub fn file_parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::FileParse {
            path: path.into(),
            source,
        }
    }
}

/// Reads a JSON document from `path`, naming the file in any error.
///
/// # Errors
/// Returns `Error::File` if the file cannot be opened and
/// `Error::FileParse` if it is not a valid document of type `T`.
pub fn read_json_file<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let file = std::fs::File::open(path).map_err(|e| Error::file(path, e))?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| Error::file_parse(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_json_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_config.json");
        let err = read_json_file::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, Error::File { .. }));
        assert!(err.to_string().contains("run_config.json"));
    }

    #[test]
    fn test_malformed_json_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_json_file::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, Error::FileParse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }
}
