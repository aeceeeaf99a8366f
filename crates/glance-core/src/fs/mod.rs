//! File system abstractions for glance.
//!
//! This module provides the entry type handed to frontends
//! ([`identity::FileIdentity`]), raw byte access ([`reader`]), and the
//! directory read and mutation helpers in [`ops`] that keep the preview
//! cache consistent.

pub mod identity;
pub mod ops;
pub mod reader;

pub use identity::{classify, FileIdentity, FileKind};
pub use reader::{read_file_bytes, stat_modified_at, FileReader, LocalFileReader};
