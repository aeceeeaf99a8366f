//! Application state shared by every subcommand.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glance_core::{
    CacheCoordinator, Config, FileIdentity, FileKind, JsonPreviewStore, MemoryPreviewStore,
    PreviewService, PreviewStore,
};
use tokio::sync::mpsc;

use crate::background::{spawn_preview_batch, PreviewMessage};

/// Store, preview service and cache coordinator built from one [`Config`].
pub struct App {
    config: Config,
    service: Arc<PreviewService>,
    coordinator: CacheCoordinator,
}

impl App {
    /// Builds the app, opening the persistent cache at `cache_path` unless
    /// the config overrides the path or disables persistence.
    ///
    /// A cache file that cannot be opened is logged and replaced by an
    /// in-memory store; previews still work, they just are not kept.
    pub fn new(config: Config, cache_path: &Path) -> Self {
        let store = open_store(&config, cache_path);
        let service = Arc::new(PreviewService::new(
            Arc::clone(&store),
            config.pipeline_settings(),
        ));
        let coordinator = CacheCoordinator::new(store);
        Self {
            config,
            service,
            coordinator,
        }
    }

    pub fn store(&self) -> &Arc<dyn PreviewStore> {
        self.service.store()
    }

    /// Lists `dir` with previews resolved.
    ///
    /// Hidden entries are dropped unless `general.show_hidden` is set.
    /// Folders come first, then entries by name. A relative `dir` is
    /// resolved against the current directory first, so every entry's
    /// cache key is absolute.
    pub async fn browse(&self, dir: &Path) -> anyhow::Result<Vec<FileIdentity>> {
        let dir = std::path::absolute(dir)?;
        let mut entries = glance_core::read_directory(&dir)?;
        if !self.config.general.show_hidden {
            entries.retain(|e| !e.name().starts_with('.'));
        }
        entries.sort_by(|a, b| {
            b.is_folder()
                .cmp(&a.is_folder())
                .then_with(|| a.name().cmp(b.name()))
        });

        let total = entries.len();
        let mut resolved = entries.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_preview_batch(
            Arc::clone(&self.service),
            entries,
            self.config.preview.use_cache,
            tx,
        );

        for _ in 0..total {
            match rx.recv().await {
                Some(PreviewMessage::Resolved { index, identity }) => resolved[index] = identity,
                None => break,
            }
        }

        Ok(resolved)
    }

    pub fn rename(&self, path: &Path, new_name: &str) -> anyhow::Result<FileIdentity> {
        let identity = FileIdentity::from_path(path)?;
        Ok(glance_core::rename_file(
            &self.coordinator,
            &identity,
            new_name,
        )?)
    }

    pub fn delete(&self, path: &Path) -> anyhow::Result<()> {
        let identity = FileIdentity::from_path(path)?;
        glance_core::delete_file(&self.coordinator, &identity)?;
        Ok(())
    }

    pub fn paste(&self, source: &Path, target_dir: &Path) -> anyhow::Result<FileIdentity> {
        let identity = FileIdentity::from_path(source)?;
        Ok(glance_core::paste_file(
            &self.coordinator,
            &identity,
            &std::path::absolute(target_dir)?,
        )?)
    }

    pub fn cache_size(&self) -> anyhow::Result<u64> {
        Ok(self.store().size_bytes()?)
    }

    pub fn clear_cache(&self) -> anyhow::Result<()> {
        self.store().clear()?;
        Ok(())
    }
}

fn open_store(config: &Config, default_path: &Path) -> Arc<dyn PreviewStore> {
    if !config.cache.persist {
        return Arc::new(MemoryPreviewStore::new());
    }

    let path: PathBuf = config
        .cache
        .path
        .clone()
        .unwrap_or_else(|| default_path.to_path_buf());
    match JsonPreviewStore::open(&path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(path = %path.display(), "preview cache unavailable, using memory: {e}");
            Arc::new(MemoryPreviewStore::new())
        }
    }
}

/// One listing line: kind, name, and the preview's base64 length.
pub fn format_entry(identity: &FileIdentity) -> String {
    let kind = match identity.kind() {
        FileKind::Folder => "dir",
        FileKind::Image => "img",
        FileKind::Other => "file",
    };
    let preview = identity
        .preview()
        .map(|p| format!("{} bytes", p.len()))
        .unwrap_or_else(|| "-".to_string());
    format!("{kind:<4} {:<40} {preview}", identity.name())
}
