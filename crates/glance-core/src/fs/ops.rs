//! Directory reading and file mutations that keep the preview cache in sync.
//!
//! Every mutation here succeeds or fails on the filesystem alone. Once the
//! disk change is done, the matching [`CacheCoordinator`] hook runs; if it
//! fails the error is logged and the mutation still reports success.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::fs::identity::{absolute, FileIdentity};
use crate::thumb::consistency::CacheCoordinator;

/// Reads the immediate contents of a directory and returns them as [`FileIdentity`] values.
///
/// The returned entries are **unsorted** and carry no previews. Entries
/// whose metadata cannot be read are skipped.
///
/// # Errors
///
/// - [`CoreError::NotFound`]: the path does not exist.
/// - [`CoreError::NotADirectory`]: the path is not a directory.
/// - [`CoreError::PermissionDenied`]: read access is denied.
/// - [`CoreError::Io`]: any other I/O error.
///
/// # Examples
///
/// ```no_run
/// use glance_core::read_directory;
/// use std::path::Path;
///
/// let entries = read_directory(Path::new("/home/user/Pictures")).unwrap();
/// for entry in &entries {
///     println!("{} ({})", entry.name(), entry.kind().as_str());
/// }
/// ```
pub fn read_directory(path: &Path) -> CoreResult<Vec<FileIdentity>> {
    if !path.exists() {
        return Err(CoreError::NotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(CoreError::NotADirectory(path.to_path_buf()));
    }

    let read_dir = std::fs::read_dir(path).map_err(|e| CoreError::from_io(e, path))?;

    let mut entries = Vec::new();
    for dir_entry in read_dir {
        let Ok(dir_entry) = dir_entry else {
            continue;
        };
        let Ok(metadata) = dir_entry.metadata() else {
            continue;
        };
        entries.push(FileIdentity::new(dir_entry.path(), &metadata));
    }

    Ok(entries)
}

/// Renames `identity` within its parent folder.
///
/// The in-memory preview is carried over only when the extension stays the
/// same. The coordinator then updates the cache the same way.
///
/// # Errors
///
/// - [`CoreError::InvalidName`] if `new_name` is not a plain file name.
/// - [`CoreError::NotFound`] if `identity` no longer exists.
/// - [`CoreError::AlreadyExists`] if `new_name` is taken.
/// - [`CoreError::Io`] for any other I/O failure.
pub fn rename_file(
    coordinator: &CacheCoordinator,
    identity: &FileIdentity,
    new_name: &str,
) -> CoreResult<FileIdentity> {
    if !is_valid_filename(new_name) {
        return Err(CoreError::InvalidName(new_name.to_string()));
    }
    std::fs::symlink_metadata(identity.path())
        .map_err(|e| CoreError::from_io(e, identity.path()))?;

    let new_path = identity.parent().join(new_name);
    if new_path != identity.path() && std::fs::symlink_metadata(&new_path).is_ok() {
        return Err(CoreError::AlreadyExists(new_path));
    }

    std::fs::rename(identity.path(), &new_path)
        .map_err(|e| CoreError::from_io(e, identity.path()))?;

    let mut renamed = FileIdentity::from_path(&new_path)?;
    if let Some(preview) = identity.preview() {
        if renamed.extension() == identity.extension() {
            renamed = renamed.with_preview(preview);
        }
    }

    if let Err(e) = coordinator.on_rename(identity, &renamed) {
        tracing::warn!(path = %new_path.display(), "failed to update preview cache after rename: {e}");
    }

    Ok(renamed)
}

/// Deletes `identity` from disk (recursively for folders) and drops its
/// cached previews.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if `identity` no longer exists.
/// - [`CoreError::PermissionDenied`] or [`CoreError::Io`] if removal fails.
pub fn delete_file(coordinator: &CacheCoordinator, identity: &FileIdentity) -> CoreResult<()> {
    remove_path(identity.path())?;

    if let Err(e) = coordinator.on_delete(identity) {
        tracing::warn!(path = %identity.path().display(), "failed to update preview cache after delete: {e}");
    }

    Ok(())
}

/// Copies `source` into `target_dir` and returns the pasted entry.
///
/// Pasting into the source's own folder picks a free `"<name> - Copy"`
/// name, then `"<name> - Copy (1)"` and so on, keeping the extension.
/// Anywhere else an existing entry with the same name is an error. The
/// returned identity carries the source's in-memory preview.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if `source` or `target_dir` does not exist.
/// - [`CoreError::NotADirectory`] if `target_dir` is not a directory.
/// - [`CoreError::AlreadyExists`] if the name is taken in another folder.
/// - [`CoreError::Io`] for any other I/O failure.
pub fn paste_file(
    coordinator: &CacheCoordinator,
    source: &FileIdentity,
    target_dir: &Path,
) -> CoreResult<FileIdentity> {
    std::fs::symlink_metadata(source.path()).map_err(|e| CoreError::from_io(e, source.path()))?;
    let target_dir = absolute(target_dir.to_path_buf());
    let target_meta =
        std::fs::metadata(&target_dir).map_err(|e| CoreError::from_io(e, &target_dir))?;
    if !target_meta.is_dir() {
        return Err(CoreError::NotADirectory(target_dir));
    }

    let mut dest = target_dir.join(source.name());
    if std::fs::symlink_metadata(&dest).is_ok() {
        if !same_dir(&target_dir, source.parent()) {
            return Err(CoreError::AlreadyExists(dest));
        }
        dest = free_copy_name(source, &target_dir);
    }

    copy_path(source.path(), &dest)?;

    let mut pasted = FileIdentity::from_path(&dest)?;
    if let Some(preview) = source.preview() {
        pasted = pasted.with_preview(preview);
    }

    if let Err(e) = coordinator.on_copy(source, &pasted) {
        tracing::warn!(path = %dest.display(), "failed to update preview cache after paste: {e}");
    }

    Ok(pasted)
}

/// Whether `a` and `b` name the same folder, looking through `..` and
/// symlinks when both can be resolved.
fn same_dir(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// First `"<name> - Copy"` style path in `dir` that is not taken yet.
fn free_copy_name(source: &FileIdentity, dir: &Path) -> PathBuf {
    let name = Path::new(source.name());
    let (stem, suffix) = if source.is_folder() {
        (source.name().to_string(), String::new())
    } else {
        let stem = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = name
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        (stem, suffix)
    };

    let mut index = 0u32;
    loop {
        let candidate = if index == 0 {
            dir.join(format!("{stem} - Copy{suffix}"))
        } else {
            dir.join(format!("{stem} - Copy ({index}){suffix}"))
        };
        if std::fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        index += 1;
    }
}

/// Copies a file or directory recursively; symlinks are copied as links.
fn copy_path(src: &Path, dest: &Path) -> CoreResult<()> {
    let meta = std::fs::symlink_metadata(src).map_err(|e| CoreError::from_io(e, src))?;

    if meta.is_dir() {
        copy_dir_recursive(src, dest, 0)
    } else if meta.is_symlink() {
        copy_symlink(src, dest)
    } else {
        std::fs::copy(src, dest).map_err(|e| CoreError::from_io(e, src))?;
        Ok(())
    }
}

/// Maximum recursion depth for copy_dir_recursive to prevent symlink loops.
const MAX_COPY_DEPTH: usize = 64;

fn copy_dir_recursive(src: &Path, dest: &Path, depth: usize) -> CoreResult<()> {
    if depth > MAX_COPY_DEPTH {
        return Err(CoreError::Io(std::io::Error::other(format!(
            "maximum recursion depth ({MAX_COPY_DEPTH}) exceeded during copy"
        ))));
    }

    std::fs::create_dir_all(dest)?;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let entry_path = entry.path();
        let target = dest.join(entry.file_name());

        // file_type() does not follow symlinks
        let ft = entry.file_type()?;
        if ft.is_symlink() {
            copy_symlink(&entry_path, &target)?;
        } else if ft.is_dir() {
            copy_dir_recursive(&entry_path, &target, depth + 1)?;
        } else {
            std::fs::copy(&entry_path, &target)?;
        }
    }

    Ok(())
}

fn copy_symlink(src: &Path, dest: &Path) -> CoreResult<()> {
    #[cfg(unix)]
    {
        let link_target = std::fs::read_link(src)?;
        std::os::unix::fs::symlink(link_target, dest)?;
    }
    #[cfg(not(unix))]
    std::fs::copy(src, dest)?;
    Ok(())
}

fn remove_path(path: &Path) -> CoreResult<()> {
    // symlink_metadata: never follow a link into its target
    let meta = std::fs::symlink_metadata(path).map_err(|e| CoreError::from_io(e, path))?;

    if meta.is_dir() {
        std::fs::remove_dir_all(path).map_err(|e| CoreError::from_io(e, path))
    } else {
        std::fs::remove_file(path).map_err(|e| CoreError::from_io(e, path))
    }
}

fn is_valid_filename(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.contains('/') || name.contains('\0') {
        return false;
    }
    #[cfg(windows)]
    if name.contains('\\') || name.contains(':') {
        return false;
    }
    Path::new(name).file_name() == Some(OsStr::new(name))
}
