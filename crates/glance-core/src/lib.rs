//! glance core library: UI-agnostic thumbnail previews for a file browser.
//!
//! `glance-core` resolves image thumbnails for the entries of a directory
//! listing, caches them keyed by path and modification time, abandons work
//! for listings the user has already navigated away from, and keeps the
//! cache consistent when files are renamed, deleted, or pasted.
//!
//! # Modules
//!
//! - [`thumb`]: Batch supersession, the preview cache, the image pipeline, the per-file orchestrator, and cache consistency.
//! - [`fs`]: File system abstractions: [`FileIdentity`], directory reading, byte access, and cache-aware mutations.
//! - [`config`]: User-facing configuration (TOML-based settings).
//! - [`error`]: Unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod config;
pub mod error;
pub mod fs;
pub mod thumb;

pub use config::settings::Config;
pub use error::{CoreError, CoreResult};
pub use fs::identity::{classify, FileIdentity, FileKind};
pub use fs::ops::{delete_file, paste_file, read_directory, rename_file};
pub use fs::reader::{read_file_bytes, stat_modified_at, FileReader, LocalFileReader};
pub use thumb::{
    BatchToken, CacheCoordinator, CacheLookup, JobSupervisor, JsonPreviewStore,
    MemoryPreviewStore, PipelineSettings, PreviewFormat, PreviewRecord, PreviewService,
    PreviewStore,
};
