//! Error types for `glance-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`.

use std::path::PathBuf;

/// Unified error type for all core operations.
///
/// Pipeline and storage variants are absorbed by the preview orchestrator;
/// the caller of [`crate::PreviewService::resolve_preview`] never sees them.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The target path does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// The process lacks permission to access the path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A directory was expected but the path points to a file.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The destination of a rename or paste is already taken.
    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),

    /// A file or directory name is invalid (empty, contains path separators, etc.).
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Failed to parse a TOML configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// The file's format is not eligible for preview generation.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The image bytes could not be decoded.
    #[error("decode failure: {0}")]
    Decode(String),

    /// The thumbnail could not be re-encoded.
    #[error("encode failure: {0}")]
    Encode(String),

    /// The preview cache could not be read or written.
    #[error("preview cache unavailable: {0}")]
    StorageUnavailable(String),

    /// A newer batch took over the active job slot.
    ///
    /// Flow control only; never surfaced as a request failure.
    #[error("superseded by a newer batch")]
    Superseded,

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Maps an I/O error on `path` to the most specific variant.
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }
}

/// Convenience alias used throughout `glance-core`.
pub type CoreResult<T> = Result<T, CoreError>;
