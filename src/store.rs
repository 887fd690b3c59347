//! Live-reloading portfolio store.
//!
//! [`PortfolioStore`] keeps the last-loaded [`Portfolio`] together with the
//! modification time of the source it came from. Every [`load`] probes the
//! source's mtime and reloads when it is newer than the cached one, so
//! edits to `portfolio.json` show up without a restart.
//!
//! # Consistency
//!
//! The cached document is an `Arc<Portfolio>` that is swapped whole; it is
//! never mutated. A reader keeps whatever snapshot it obtained even if a
//! reload happens while it is still using it. Reloads are serialized by a
//! dedicated mutex and re-check staleness after acquiring it, so a burst
//! of concurrent readers triggers one disk read, not one per reader.
//!
//! # Failure
//!
//! I/O and parse errors are logged and answered with the empty document.
//! The previous cache entry is kept, so the next call retries.
//!
//! [`load`]: PortfolioStore::load

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use folio_core::models::Portfolio;

/// Where the portfolio document comes from.
///
/// Production code uses [`FileSource`]; tests substitute an in-memory
/// source with a controllable clock.
pub trait DocumentSource: Send + Sync {
    /// Last modification time of the document.
    fn modified(&self) -> Result<SystemTime>;
    /// Full document text.
    fn read(&self) -> Result<String>;
    /// Human-readable location for log messages.
    fn describe(&self) -> String;
}

/// A portfolio document on the local file system.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSource for FileSource {
    fn modified(&self) -> Result<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to stat {}", self.path.display()))
    }

    fn read(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    document: Arc<Portfolio>,
    /// `None` is the forced-reload sentinel: older than any real mtime.
    loaded_mtime: Option<SystemTime>,
}

impl CacheEntry {
    fn is_stale(&self, mtime: SystemTime) -> bool {
        self.loaded_mtime.map_or(true, |loaded| mtime > loaded)
    }
}

/// Owned, shareable cache of the portfolio document.
pub struct PortfolioStore {
    source: Box<dyn DocumentSource>,
    cache: RwLock<Option<CacheEntry>>,
    reload_lock: Mutex<()>,
    reloads: AtomicU64,
    empty: Arc<Portfolio>,
}

impl PortfolioStore {
    pub fn new(source: impl DocumentSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cache: RwLock::new(None),
            reload_lock: Mutex::new(()),
            reloads: AtomicU64::new(0),
            empty: Arc::new(Portfolio::default()),
        }
    }

    /// Store over a JSON file on disk.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(FileSource::new(path))
    }

    /// Returns the current document, reloading it if the source changed.
    ///
    /// Never fails: an unreadable or invalid source yields the empty
    /// document (see [`Portfolio::is_empty`]).
    pub fn load(&self) -> Arc<Portfolio> {
        match self.try_load() {
            Ok(doc) => doc,
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::warn!(source = %self.source.describe(), %error, "portfolio load failed");
                self.empty.clone()
            }
        }
    }

    /// Drops the cached timestamp and reloads unconditionally.
    pub fn force_reload(&self) -> Arc<Portfolio> {
        self.invalidate();
        self.load()
    }

    /// Like [`force_reload`](Self::force_reload), but reports load errors
    /// instead of answering with the empty document.
    pub fn try_force_reload(&self) -> Result<Arc<Portfolio>> {
        self.invalidate();
        self.try_load()
    }

    /// [`load`](Self::load) on the blocking pool, for async callers.
    pub async fn load_async(self: &Arc<Self>) -> Arc<Portfolio> {
        let store = self.clone();
        match tokio::task::spawn_blocking(move || store.load()).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(error = %e, "portfolio load task failed");
                self.empty.clone()
            }
        }
    }

    /// [`try_force_reload`](Self::try_force_reload) on the blocking pool.
    pub async fn try_force_reload_async(self: &Arc<Self>) -> Result<Arc<Portfolio>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.try_force_reload())
            .await
            .context("portfolio reload task failed")?
    }

    fn invalidate(&self) {
        let _reload = self.reload_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = cache.as_mut() {
            entry.loaded_mtime = None;
        }
    }

    /// Number of times the source has been read and parsed successfully.
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Modification time of the cached document, if one is loaded.
    pub fn loaded_mtime(&self) -> Option<SystemTime> {
        self.cached().and_then(|e| e.loaded_mtime)
    }

    fn cached(&self) -> Option<CacheEntry> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn try_load(&self) -> Result<Arc<Portfolio>> {
        let mtime = self.source.modified()?;

        if let Some(entry) = self.cached() {
            if !entry.is_stale(mtime) {
                return Ok(entry.document);
            }
        }

        let _reload = self.reload_lock.lock().unwrap_or_else(|e| e.into_inner());

        // Another caller may have reloaded while we waited.
        if let Some(entry) = self.cached() {
            if !entry.is_stale(mtime) {
                return Ok(entry.document);
            }
        }

        let text = self.source.read()?;
        let document = Arc::new(
            Portfolio::from_json(&text)
                .with_context(|| format!("Invalid portfolio JSON in {}", self.source.describe()))?,
        );

        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(CacheEntry {
            document: document.clone(),
            loaded_mtime: Some(mtime),
        });
        self.reloads.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            source = %self.source.describe(),
            sections = document.section_names().len(),
            "portfolio reloaded"
        );

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// In-memory source whose content and mtime are set by the test.
    #[derive(Clone)]
    struct FakeSource {
        state: Arc<Mutex<(SystemTime, Option<String>)>>,
        reads: Arc<AtomicUsize>,
    }

    impl FakeSource {
        fn new(text: &str) -> Self {
            Self {
                state: Arc::new(Mutex::new((
                    SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
                    Some(text.to_string()),
                ))),
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn write(&self, text: &str, advance: Duration) {
            let mut state = self.state.lock().unwrap();
            state.0 += advance;
            state.1 = Some(text.to_string());
        }

        fn remove(&self) {
            self.state.lock().unwrap().1 = None;
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl DocumentSource for FakeSource {
        fn modified(&self) -> Result<SystemTime> {
            let state = self.state.lock().unwrap();
            match state.1 {
                Some(_) => Ok(state.0),
                None => anyhow::bail!("no such file"),
            }
        }

        fn read(&self) -> Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.state
                .lock()
                .unwrap()
                .1
                .clone()
                .ok_or_else(|| anyhow::anyhow!("no such file"))
        }

        fn describe(&self) -> String {
            "fake".to_string()
        }
    }

    #[test]
    fn test_repeated_load_reads_once() {
        let source = FakeSource::new(r#"{"about": "v1"}"#);
        let store = PortfolioStore::new(source.clone());

        let a = store.load();
        let b = store.load();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.about.as_deref(), Some("v1"));
        assert_eq!(source.reads(), 1);
        assert_eq!(store.reload_count(), 1);
    }

    #[test]
    fn test_newer_mtime_triggers_single_reload() {
        let source = FakeSource::new(r#"{"about": "v1"}"#);
        let store = PortfolioStore::new(source.clone());
        store.load();

        source.write(r#"{"about": "v2"}"#, Duration::from_secs(1));
        assert_eq!(store.load().about.as_deref(), Some("v2"));
        assert_eq!(store.load().about.as_deref(), Some("v2"));
        assert_eq!(store.reload_count(), 2);
        assert_eq!(source.reads(), 2);
    }

    #[test]
    fn test_same_mtime_change_is_invisible() {
        let source = FakeSource::new(r#"{"about": "v1"}"#);
        let store = PortfolioStore::new(source.clone());
        store.load();

        source.write(r#"{"about": "v2"}"#, Duration::ZERO);
        assert_eq!(store.load().about.as_deref(), Some("v1"));
    }

    #[test]
    fn test_force_reload_ignores_mtime() {
        let source = FakeSource::new(r#"{"about": "v1"}"#);
        let store = PortfolioStore::new(source.clone());
        store.load();

        source.write(r#"{"about": "v2"}"#, Duration::ZERO);
        assert_eq!(store.force_reload().about.as_deref(), Some("v2"));
        assert_eq!(store.reload_count(), 2);
        // Cache is valid again afterwards.
        store.load();
        assert_eq!(store.reload_count(), 2);
    }

    #[test]
    fn test_force_reload_before_first_load() {
        let store = PortfolioStore::new(FakeSource::new(r#"{"about": "v1"}"#));
        assert_eq!(store.force_reload().about.as_deref(), Some("v1"));
        assert_eq!(store.reload_count(), 1);
    }

    #[test]
    fn test_try_force_reload_reports_errors() {
        let source = FakeSource::new(r#"{"about": "v1"}"#);
        let store = PortfolioStore::new(source.clone());
        store.load();

        source.write("[broken", Duration::ZERO);
        let err = store.try_force_reload().unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid portfolio JSON"));
        // The failed reload left the sentinel, so the next good write is picked up.
        source.write(r#"{"about": "v2"}"#, Duration::ZERO);
        assert_eq!(store.load().about.as_deref(), Some("v2"));
    }

    #[test]
    fn test_invalid_json_yields_empty_then_recovers() {
        let source = FakeSource::new("{ not json");
        let store = PortfolioStore::new(source.clone());
        assert!(store.load().is_empty());
        assert_eq!(store.reload_count(), 0);

        source.write(r#"{"about": "fixed"}"#, Duration::from_secs(1));
        assert_eq!(store.load().about.as_deref(), Some("fixed"));
    }

    #[test]
    fn test_missing_source_yields_empty() {
        let source = FakeSource::new(r#"{"about": "v1"}"#);
        let store = PortfolioStore::new(source.clone());
        store.load();
        source.remove();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_old_snapshot_survives_reload() {
        let source = FakeSource::new(r#"{"about": "v1"}"#);
        let store = PortfolioStore::new(source.clone());
        let old = store.load();

        source.write(r#"{"about": "v2"}"#, Duration::from_secs(5));
        let new = store.load();
        assert_eq!(old.about.as_deref(), Some("v1"));
        assert_eq!(new.about.as_deref(), Some("v2"));
    }

    #[test]
    fn test_concurrent_readers_reload_once() {
        let source = FakeSource::new(r#"{"about": "v1"}"#);
        let store = Arc::new(PortfolioStore::new(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.load())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().about.as_deref(), Some("v1"));
        }
        assert_eq!(source.reads(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_async_loads_run_off_the_runtime_thread() {
        let source = FakeSource::new(r#"{"about": "v1"}"#);
        let store = Arc::new(PortfolioStore::new(source.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.load_async().await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().about.as_deref(), Some("v1"));
        }
        assert_eq!(source.reads(), 1);

        source.write("[broken", Duration::from_secs(1));
        let err = store.try_force_reload_async().await.unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid portfolio JSON"));
        assert!(store.load_async().await.is_empty());
    }
}
