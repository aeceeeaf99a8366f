//! Per-request file identity and type classification.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use unicode_normalization::UnicodeNormalization;

use crate::error::{CoreError, CoreResult};

/// Extensions classified as [`FileKind::Image`].
///
/// Only a subset of these can actually be turned into a thumbnail; see
/// [`crate::thumb::pipeline::PreviewFormat`].
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "jpe", "gif", "bmp", "webp", "ico", "tiff", "tif",
];

/// Coarse type tag used to gate preview generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Folder,
    Image,
    Other,
}

impl FileKind {
    /// Returns the lower-case tag (`"folder"`, `"image"`, `"other"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Image => "image",
            Self::Other => "other",
        }
    }
}

/// Classifies a file by its (lower-case, dot-less) extension.
pub fn classify(extension: Option<&str>, is_folder: bool) -> FileKind {
    if is_folder {
        return FileKind::Folder;
    }
    match extension {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => FileKind::Image,
        _ => FileKind::Other,
    }
}

/// Returns the extension of `path`, lower-cased and without the leading dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_lowercase)
}

/// Resolves `path` against the current directory without touching symlinks.
/// Falls back to `path` as given when the current directory is unavailable.
pub(crate) fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::path::absolute(&path).unwrap_or(path)
}

/// Immutable view of a file as seen by one preview request.
///
/// Built fresh from filesystem metadata each time a file is shown; only
/// its preview is ever cached. Use [`FileIdentity::with_preview`] to attach
/// a thumbnail rather than mutating an existing value.
///
/// # Examples
///
/// ```no_run
/// use glance_core::FileIdentity;
/// use std::path::Path;
///
/// let identity = FileIdentity::from_path(Path::new("/photos/cat.png")).unwrap();
/// assert_eq!(identity.name(), "cat.png");
/// assert_eq!(identity.extension(), Some("png"));
/// assert!(identity.preview().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    path: PathBuf,
    parent: PathBuf,
    name: String,
    extension: Option<String>,
    kind: FileKind,
    modified: Option<SystemTime>,
    preview: Option<String>,
}

impl FileIdentity {
    /// Creates an identity from a path and its metadata.
    ///
    /// A relative `path` is made absolute against the current directory, so
    /// the same file always yields the same cache key. Folders never carry
    /// an extension, even when their name contains a dot.
    pub fn new(path: PathBuf, metadata: &std::fs::Metadata) -> Self {
        let path = absolute(path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().nfc().collect::<String>())
            .unwrap_or_default();
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let is_folder = metadata.is_dir();
        let extension = if is_folder { None } else { extension_of(&path) };
        let kind = classify(extension.as_deref(), is_folder);

        Self {
            path,
            parent,
            name,
            extension,
            kind,
            modified: metadata.modified().ok(),
            preview: None,
        }
    }

    /// Stats `path` (following symlinks) and builds its identity.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if `path` does not exist.
    /// - [`CoreError::PermissionDenied`] if it cannot be stat'ed.
    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| CoreError::from_io(e, path))?;
        Ok(Self::new(path.to_path_buf(), &metadata))
    }

    /// Returns a copy of this identity with the preview payload set.
    #[must_use]
    pub fn with_preview(self, preview: impl Into<String>) -> Self {
        Self {
            preview: Some(preview.into()),
            ..self
        }
    }

    /// Returns a copy of this identity with no preview payload.
    #[must_use]
    pub fn without_preview(self) -> Self {
        Self {
            preview: None,
            ..self
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parent(&self) -> &Path {
        &self.parent
    }

    /// Returns the NFC-normalised display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file name without its extension.
    pub fn stem(&self) -> &str {
        if self.extension.is_none() {
            return &self.name;
        }
        Path::new(&self.name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.name)
    }

    /// Returns the lower-case extension without the dot, if any.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind == FileKind::Folder
    }

    /// Returns the last-modified time, if the platform reports one.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Returns the base64 thumbnail payload, if one was resolved.
    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }
}
