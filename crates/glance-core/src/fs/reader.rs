//! Raw byte access used by the preview orchestrator.

use std::path::Path;
use std::time::SystemTime;

use crate::error::{CoreError, CoreResult};

/// Source of raw file bytes.
///
/// The orchestrator reads through this trait so hosts can plug in another
/// backend (and tests can observe or delay reads).
pub trait FileReader: Send + Sync {
    /// Reads the whole file at `path`.
    fn read(&self, path: &Path) -> CoreResult<Vec<u8>>;
}

/// Reads from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileReader;

impl FileReader for LocalFileReader {
    fn read(&self, path: &Path) -> CoreResult<Vec<u8>> {
        read_file_bytes(path)
    }
}

/// Reads the whole file at `path`.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if `path` does not exist.
/// - [`CoreError::PermissionDenied`] if it is not readable.
/// - [`CoreError::Io`] for any other failure.
pub fn read_file_bytes(path: &Path) -> CoreResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| CoreError::from_io(e, path))
}

/// Returns the current modification time of `path`.
///
/// # Errors
///
/// Same mapping as [`read_file_bytes`]; platforms without modification
/// times report [`CoreError::Io`].
pub fn stat_modified_at(path: &Path) -> CoreResult<SystemTime> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| CoreError::from_io(e, path))
}
