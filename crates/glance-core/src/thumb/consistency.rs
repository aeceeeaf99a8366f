//! Keeps cached previews attached to the right file across mutations.
//!
//! The filesystem operations in [`crate::fs::ops`] call these hooks after
//! the mutation itself succeeded. Hook failures are returned so they can be
//! logged, but they must never undo or fail the mutation: a lost record
//! only costs a regeneration.

use std::path::Path;
use std::sync::Arc;

use crate::error::CoreResult;
use crate::fs::identity::FileIdentity;
use crate::fs::reader::stat_modified_at;
use crate::thumb::store::{CacheLookup, PreviewStore};

/// Applies rename, delete and copy events to a [`PreviewStore`].
#[derive(Clone)]
pub struct CacheCoordinator {
    store: Arc<dyn PreviewStore>,
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn PreviewStore>) -> Self {
        Self { store }
    }

    /// `old` was renamed to `new`.
    ///
    /// Folders carry their whole subtree along. A file keeps its record
    /// only while its extension is unchanged; any extension change (even
    /// `jpg` → `jpeg`) drops the record, since a thumbnail made for one
    /// file type is not evidence for another.
    pub fn on_rename(&self, old: &FileIdentity, new: &FileIdentity) -> CoreResult<()> {
        if old.is_folder() {
            return self.store.move_subtree(old.path(), new.path());
        }
        if old.extension() == new.extension() {
            return self.store.move_key(old.path(), new.path());
        }

        tracing::debug!(
            from = %old.path().display(),
            to = %new.path().display(),
            "extension changed, dropping cached preview"
        );
        self.store.delete(old.path())?;
        self.store.delete(new.path())
    }

    /// `identity` was deleted from disk.
    pub fn on_delete(&self, identity: &FileIdentity) -> CoreResult<()> {
        if identity.is_folder() {
            self.store.delete_subtree(identity.path())
        } else {
            self.store.delete(identity.path())
        }
    }

    /// `source` was copied to `dest`.
    ///
    /// A fresh source record is cloned under the destination path, stamped
    /// with the destination's own modification time. Sources without a
    /// fresh record are left for lazy generation on first view.
    pub fn on_copy(&self, source: &FileIdentity, dest: &FileIdentity) -> CoreResult<()> {
        if source.is_folder() {
            return self.copy_subtree(source.path(), dest.path());
        }

        let (Some(source_modified), Some(dest_modified)) = (source.modified(), dest.modified())
        else {
            return Ok(());
        };
        if let CacheLookup::Fresh(preview) = self.store.lookup(source.path(), source_modified)? {
            self.store.put(dest.path(), dest_modified, &preview)?;
        }
        Ok(())
    }

    /// Clones every still-fresh record below `source` to the mirrored path
    /// below `dest`.
    fn copy_subtree(&self, source: &Path, dest: &Path) -> CoreResult<()> {
        for (path, record) in self.store.records_under(source)? {
            let Ok(relative) = path.strip_prefix(source) else {
                continue;
            };
            let target = dest.join(relative);

            let (Ok(source_modified), Ok(dest_modified)) =
                (stat_modified_at(&path), stat_modified_at(&target))
            else {
                continue;
            };
            if source_modified != record.modified_at {
                continue;
            }
            self.store.put(&target, dest_modified, &record.preview)?;
        }
        Ok(())
    }
}
