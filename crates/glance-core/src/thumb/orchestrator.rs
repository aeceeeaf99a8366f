//! Per-file preview resolution.
//!
//! [`PreviewService::resolve_preview`] answers "what is this file's preview
//! right now" for one file of a browse batch. It serves fresh cache records
//! directly, regenerates stale or missing ones, and checks with the
//! [`JobSupervisor`] before every expensive step so a superseded batch stops
//! early. Failures never reach the caller: a file that cannot be previewed
//! simply comes back without one.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::fs::identity::{FileIdentity, FileKind};
use crate::fs::reader::{FileReader, LocalFileReader};
use crate::thumb::pipeline::{self, PipelineSettings, PreviewFormat};
use crate::thumb::store::{CacheLookup, PreviewStore};
use crate::thumb::supersession::{BatchToken, JobSupervisor};

/// Resolves previews for browse batches.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct PreviewService {
    store: Arc<dyn PreviewStore>,
    reader: Arc<dyn FileReader>,
    supervisor: Arc<JobSupervisor>,
    settings: PipelineSettings,
}

impl PreviewService {
    /// Creates a service reading from the local filesystem.
    pub fn new(store: Arc<dyn PreviewStore>, settings: PipelineSettings) -> Self {
        Self {
            store,
            reader: Arc::new(LocalFileReader),
            supervisor: Arc::new(JobSupervisor::new()),
            settings,
        }
    }

    /// Replaces the byte source.
    #[must_use]
    pub fn with_reader(self, reader: Arc<dyn FileReader>) -> Self {
        Self { reader, ..self }
    }

    pub fn store(&self) -> &Arc<dyn PreviewStore> {
        &self.store
    }

    pub fn supervisor(&self) -> &Arc<JobSupervisor> {
        &self.supervisor
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Returns `identity` with its preview populated, or left as it was.
    ///
    /// `remaining` is the number of calls of this batch still to come after
    /// this one; the call with `remaining == 0` releases the batch's slot.
    /// With `use_cache` off the store is neither read nor written.
    ///
    /// A call whose batch was superseded before generation returns the
    /// input unchanged. One superseded after generation still returns the
    /// new preview but does not cache it, so it cannot race the newer
    /// batch's write for the same path.
    pub fn resolve_preview(
        &self,
        identity: FileIdentity,
        token: BatchToken,
        remaining: usize,
        use_cache: bool,
    ) -> FileIdentity {
        let is_last = remaining == 0;

        if !self.supervisor.begin(token) {
            return identity;
        }

        if identity.kind() != FileKind::Image {
            self.supervisor.end(token, is_last);
            return identity;
        }

        let modified = identity.modified();
        if use_cache {
            if let Some(modified) = modified {
                match self.store.lookup(identity.path(), modified) {
                    Ok(CacheLookup::Fresh(preview)) => {
                        self.supervisor.end(token, is_last);
                        return identity.with_preview(preview);
                    }
                    Ok(CacheLookup::Stale) => {
                        tracing::debug!(path = %identity.path().display(), "cached preview is stale");
                    }
                    Ok(CacheLookup::Miss) => {}
                    Err(e) => {
                        tracing::warn!(path = %identity.path().display(), "preview cache lookup failed: {e}");
                    }
                }
            }
        }

        let preview = match self.generate(&identity, token) {
            Ok(preview) => preview,
            Err(CoreError::Superseded) => {
                tracing::debug!(batch = %token, path = %identity.path().display(), "skipping preview of superseded batch");
                return identity;
            }
            Err(e) => {
                tracing::debug!(path = %identity.path().display(), "no preview: {e}");
                self.supervisor.end(token, is_last);
                return identity.without_preview();
            }
        };

        if !self.supervisor.checkpoint(token) {
            return identity.with_preview(preview);
        }

        if use_cache {
            match modified {
                Some(modified) => {
                    if let Err(e) = self.store.put(identity.path(), modified, &preview) {
                        tracing::warn!(path = %identity.path().display(), "preview cache write failed: {e}");
                    }
                }
                None => {
                    tracing::debug!(path = %identity.path().display(), "no modification time, preview not cached");
                }
            }
        }

        if !self.supervisor.checkpoint(token) {
            return identity.with_preview(preview);
        }

        self.supervisor.end(token, is_last);
        identity.with_preview(preview)
    }

    /// Reads, decodes, resizes and encodes, checking for supersession
    /// before each step.
    fn generate(&self, identity: &FileIdentity, token: BatchToken) -> CoreResult<String> {
        let extension = identity.extension().unwrap_or_default();
        let format = PreviewFormat::from_extension(extension)?;

        self.ensure_active(token)?;
        let bytes = self.reader.read(identity.path())?;

        self.ensure_active(token)?;
        let decoded = pipeline::decode(&bytes)?;

        self.ensure_active(token)?;
        let resized = pipeline::resize(&decoded, self.settings.max_edge);

        self.ensure_active(token)?;
        pipeline::encode(&resized, format, self.settings.jpeg_quality)
    }

    fn ensure_active(&self, token: BatchToken) -> CoreResult<()> {
        if self.supervisor.checkpoint(token) {
            Ok(())
        } else {
            Err(CoreError::Superseded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumb::pipeline::tests::sample_image_bytes;
    use crate::thumb::store::{MemoryPreviewStore, PreviewRecord};
    use image::ImageFormat;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn token(raw: u64) -> BatchToken {
        BatchToken::new(raw).unwrap()
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> FileIdentity {
        let path = dir.join(name);
        fs::write(&path, sample_image_bytes(width, height, ImageFormat::Png)).unwrap();
        FileIdentity::from_path(&path).unwrap()
    }

    fn service_with(store: Arc<MemoryPreviewStore>) -> PreviewService {
        PreviewService::new(store, PipelineSettings::default())
    }

    /// Counts reads and delegates to the local filesystem.
    #[derive(Default)]
    struct CountingReader {
        reads: AtomicUsize,
    }

    impl FileReader for CountingReader {
        fn read(&self, path: &Path) -> CoreResult<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            LocalFileReader.read(path)
        }
    }

    /// Starts a newer batch while `target` is being read.
    struct HijackingReader {
        supervisor: Arc<JobSupervisor>,
        newer: BatchToken,
        target: PathBuf,
    }

    impl FileReader for HijackingReader {
        fn read(&self, path: &Path) -> CoreResult<Vec<u8>> {
            let bytes = LocalFileReader.read(path);
            if path == self.target {
                self.supervisor.begin(self.newer);
            }
            bytes
        }
    }

    /// Store that starts a newer batch while a record is being written.
    struct HijackingStore {
        inner: MemoryPreviewStore,
        supervisor: std::sync::OnceLock<Arc<JobSupervisor>>,
        newer: BatchToken,
    }

    impl PreviewStore for HijackingStore {
        fn lookup(&self, path: &Path, current: SystemTime) -> CoreResult<CacheLookup> {
            self.inner.lookup(path, current)
        }
        fn put(&self, path: &Path, modified_at: SystemTime, preview: &str) -> CoreResult<()> {
            self.inner.put(path, modified_at, preview)?;
            if let Some(supervisor) = self.supervisor.get() {
                supervisor.begin(self.newer);
            }
            Ok(())
        }
        fn move_key(&self, old: &Path, new: &Path) -> CoreResult<()> {
            self.inner.move_key(old, new)
        }
        fn move_subtree(&self, old: &Path, new: &Path) -> CoreResult<()> {
            self.inner.move_subtree(old, new)
        }
        fn delete(&self, path: &Path) -> CoreResult<()> {
            self.inner.delete(path)
        }
        fn delete_subtree(&self, folder: &Path) -> CoreResult<()> {
            self.inner.delete_subtree(folder)
        }
        fn records_under(&self, folder: &Path) -> CoreResult<Vec<(PathBuf, PreviewRecord)>> {
            self.inner.records_under(folder)
        }
        fn size_bytes(&self) -> CoreResult<u64> {
            self.inner.size_bytes()
        }
        fn clear(&self) -> CoreResult<()> {
            self.inner.clear()
        }
    }

    /// Store whose every operation fails.
    struct BrokenStore;

    fn broken() -> CoreError {
        CoreError::StorageUnavailable("disk on fire".to_string())
    }

    impl PreviewStore for BrokenStore {
        fn lookup(&self, _: &Path, _: SystemTime) -> CoreResult<CacheLookup> {
            Err(broken())
        }
        fn put(&self, _: &Path, _: SystemTime, _: &str) -> CoreResult<()> {
            Err(broken())
        }
        fn move_key(&self, _: &Path, _: &Path) -> CoreResult<()> {
            Err(broken())
        }
        fn move_subtree(&self, _: &Path, _: &Path) -> CoreResult<()> {
            Err(broken())
        }
        fn delete(&self, _: &Path) -> CoreResult<()> {
            Err(broken())
        }
        fn delete_subtree(&self, _: &Path) -> CoreResult<()> {
            Err(broken())
        }
        fn records_under(&self, _: &Path) -> CoreResult<Vec<(PathBuf, PreviewRecord)>> {
            Err(broken())
        }
        fn size_bytes(&self) -> CoreResult<u64> {
            Err(broken())
        }
        fn clear(&self) -> CoreResult<()> {
            Err(broken())
        }
    }

    #[test]
    fn generates_and_caches_missing_preview() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryPreviewStore::new());
        let service = service_with(Arc::clone(&store));
        let identity = write_png(tmp.path(), "a.png", 200, 100);

        let resolved = service.resolve_preview(identity.clone(), token(1), 0, true);

        let preview = resolved.preview().expect("preview generated");
        let cached = store
            .lookup(identity.path(), identity.modified().unwrap())
            .unwrap();
        assert_eq!(cached, CacheLookup::Fresh(preview.to_string()));
        assert_eq!(service.supervisor().active(), None);
    }

    #[test]
    fn fresh_cache_hit_skips_pipeline() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryPreviewStore::new());
        let reader = Arc::new(CountingReader::default());
        let service = service_with(Arc::clone(&store)).with_reader(reader.clone());
        let identity = write_png(tmp.path(), "a.png", 50, 50);
        store
            .put(identity.path(), identity.modified().unwrap(), "Y2FjaGVk")
            .unwrap();

        let resolved = service.resolve_preview(identity, token(1), 0, true);

        assert_eq!(resolved.preview(), Some("Y2FjaGVk"));
        assert_eq!(reader.reads.load(Ordering::SeqCst), 0);
        assert_eq!(service.supervisor().active(), None);
    }

    #[test]
    fn stale_record_is_regenerated_and_overwritten() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryPreviewStore::new());
        let reader = Arc::new(CountingReader::default());
        let service = service_with(Arc::clone(&store)).with_reader(reader.clone());
        let identity = write_png(tmp.path(), "a.png", 50, 50);
        let old_mtime = identity.modified().unwrap() - Duration::from_secs(60);
        store.put(identity.path(), old_mtime, "b2xk").unwrap();

        let resolved = service.resolve_preview(identity.clone(), token(1), 0, true);

        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
        let preview = resolved.preview().unwrap();
        assert_ne!(preview, "b2xk");
        assert_eq!(
            store
                .lookup(identity.path(), identity.modified().unwrap())
                .unwrap(),
            CacheLookup::Fresh(preview.to_string())
        );
    }

    #[test]
    fn cache_disabled_never_touches_store() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryPreviewStore::new());
        let service = service_with(Arc::clone(&store));
        let identity = write_png(tmp.path(), "a.png", 50, 50);
        store
            .put(identity.path(), identity.modified().unwrap(), "Y2FjaGVk")
            .unwrap();

        let resolved = service.resolve_preview(identity, token(1), 0, false);

        let preview = resolved.preview().unwrap();
        assert_ne!(preview, "Y2FjaGVk");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn non_image_is_returned_unchanged_and_ends_batch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        fs::write(&path, "hello").unwrap();
        let identity = FileIdentity::from_path(&path).unwrap();
        let store = Arc::new(MemoryPreviewStore::new());
        let service = service_with(Arc::clone(&store));

        let resolved = service.resolve_preview(identity.clone(), token(3), 0, true);

        assert_eq!(resolved, identity);
        assert!(store.is_empty());
        assert_eq!(service.supervisor().active(), None);
    }

    #[test]
    fn non_last_call_keeps_batch_active() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(Arc::new(MemoryPreviewStore::new()));
        let identity = write_png(tmp.path(), "a.png", 20, 10);

        service.resolve_preview(identity, token(3), 2, true);

        assert_eq!(service.supervisor().active(), Some(token(3)));
    }

    #[test]
    fn folder_is_returned_unchanged() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("pics.png");
        fs::create_dir(&dir).unwrap();
        let identity = FileIdentity::from_path(&dir).unwrap();
        let service = service_with(Arc::new(MemoryPreviewStore::new()));

        let resolved = service.resolve_preview(identity.clone(), token(1), 0, true);
        assert_eq!(resolved, identity);
    }

    #[test]
    fn unsupported_image_format_gets_no_preview() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("anim.gif");
        fs::write(&path, "GIF89a").unwrap();
        let identity = FileIdentity::from_path(&path).unwrap();
        let store = Arc::new(MemoryPreviewStore::new());
        let reader = Arc::new(CountingReader::default());
        let service = service_with(Arc::clone(&store)).with_reader(reader.clone());

        let resolved = service.resolve_preview(identity, token(1), 0, true);

        assert!(resolved.preview().is_none());
        assert_eq!(reader.reads.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
        assert_eq!(service.supervisor().active(), None);
    }

    #[test]
    fn corrupt_image_gets_no_preview() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        fs::write(&path, "this is not a jpeg").unwrap();
        let identity = FileIdentity::from_path(&path).unwrap().with_preview("bGVmdG92ZXI=");
        let store = Arc::new(MemoryPreviewStore::new());
        let service = service_with(Arc::clone(&store));

        let resolved = service.resolve_preview(identity, token(1), 0, true);

        assert!(resolved.preview().is_none());
        assert!(store.is_empty());
        assert_eq!(service.supervisor().active(), None);
    }

    #[test]
    fn deleted_file_gets_no_preview() {
        let tmp = TempDir::new().unwrap();
        let identity = write_png(tmp.path(), "gone.png", 10, 10);
        fs::remove_file(identity.path()).unwrap();
        let service = service_with(Arc::new(MemoryPreviewStore::new()));

        let resolved = service.resolve_preview(identity, token(1), 0, true);
        assert!(resolved.preview().is_none());
    }

    #[test]
    fn broken_store_still_yields_preview() {
        let tmp = TempDir::new().unwrap();
        let service = PreviewService::new(Arc::new(BrokenStore), PipelineSettings::default());
        let identity = write_png(tmp.path(), "a.png", 30, 60);

        let resolved = service.resolve_preview(identity, token(1), 0, true);

        assert!(resolved.preview().is_some());
        assert_eq!(service.supervisor().active(), None);
    }

    #[test]
    fn superseded_during_read_returns_input_unchanged() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryPreviewStore::new());
        let service = service_with(Arc::clone(&store));
        let supervisor = Arc::clone(service.supervisor());
        let identity = write_png(tmp.path(), "a.png", 40, 40);
        let service = service.with_reader(Arc::new(HijackingReader {
            supervisor,
            newer: token(20),
            target: identity.path().to_path_buf(),
        }));

        let resolved = service.resolve_preview(identity.clone(), token(10), 0, true);

        assert_eq!(resolved, identity);
        assert!(store.is_empty());
        assert_eq!(service.supervisor().active(), Some(token(20)));
    }

    #[test]
    fn superseded_during_write_keeps_record_and_slot() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(HijackingStore {
            inner: MemoryPreviewStore::new(),
            supervisor: std::sync::OnceLock::new(),
            newer: token(20),
        });
        let service = PreviewService::new(store.clone(), PipelineSettings::default());
        let _ = store.supervisor.set(Arc::clone(service.supervisor()));
        let identity = write_png(tmp.path(), "a.png", 40, 40);

        let resolved = service.resolve_preview(identity, token(10), 0, true);

        assert!(resolved.preview().is_some());
        assert_eq!(store.inner.len(), 1);
        assert_eq!(service.supervisor().active(), Some(token(20)));
    }

    #[test]
    fn newer_batch_supersedes_trailing_call_of_older_batch() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryPreviewStore::new());
        let service = service_with(Arc::clone(&store));
        let a = write_png(tmp.path(), "a.png", 20, 10);
        let b = write_png(tmp.path(), "b.png", 20, 10);
        let c = write_png(tmp.path(), "c.png", 20, 10);
        let d = write_png(tmp.path(), "d.png", 20, 10);
        let (t1, t2) = (token(100), token(200));
        let supervisor = Arc::clone(service.supervisor());
        let service = service.with_reader(Arc::new(HijackingReader {
            supervisor,
            newer: t2,
            target: c.path().to_path_buf(),
        }));

        assert!(service.resolve_preview(a, t1, 2, true).preview().is_some());
        assert!(service.resolve_preview(b, t1, 1, true).preview().is_some());
        assert_eq!(service.supervisor().active(), Some(t1));

        // t2 arrives while the last call of t1 is reading its file.
        let trailing = service.resolve_preview(c.clone(), t1, 0, true);
        assert_eq!(trailing, c);
        assert_eq!(
            store.lookup(c.path(), c.modified().unwrap()).unwrap(),
            CacheLookup::Miss
        );
        assert_eq!(service.supervisor().active(), Some(t2));

        let newer = service.resolve_preview(d.clone(), t2, 0, true);
        assert!(newer.preview().is_some());
        assert!(store.lookup(d.path(), d.modified().unwrap()).unwrap().is_fresh());
        assert_eq!(service.supervisor().active(), None);
    }

    #[test]
    fn later_call_of_any_batch_owns_slot_after_begin() {
        let tmp = TempDir::new().unwrap();
        let service = service_with(Arc::new(MemoryPreviewStore::new()));
        let c = write_png(tmp.path(), "c.png", 20, 10);
        let d = write_png(tmp.path(), "d.png", 20, 10);

        service.resolve_preview(d, token(200), 3, true);
        assert_eq!(service.supervisor().active(), Some(token(200)));

        let resolved = service.resolve_preview(c, token(100), 1, true);
        assert!(resolved.preview().is_some());
        assert_eq!(service.supervisor().active(), Some(token(100)));
    }

    #[test]
    fn concurrent_batch_resolution() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryPreviewStore::new());
        let service = service_with(Arc::clone(&store));
        let files: Vec<FileIdentity> = (0..6)
            .map(|i| write_png(tmp.path(), &format!("{i}.png"), 30 + i, 20))
            .collect();
        let batch = token(7);
        service.supervisor().begin(batch);

        std::thread::scope(|scope| {
            for (i, file) in files.iter().enumerate() {
                let service = &service;
                let remaining = files.len() - 1 - i;
                scope.spawn(move || {
                    service.resolve_preview(file.clone(), batch, remaining.max(1), true)
                });
            }
        });

        assert_eq!(store.len(), files.len());
        assert_eq!(service.supervisor().active(), Some(batch));
    }
}
