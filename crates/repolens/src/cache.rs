//! On-disk cache of validated fetch results.
//!
//! One JSON file per [`Fingerprint`], named `<fingerprint>.json`. Each entry
//! carries its own TTL, so entries written under different settings coexist.
//! Writes go to a temporary file in the same directory and are then renamed
//! into place, so a reader sees either the old entry or the new one. Entries
//! that fail to parse are treated as misses and removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{FetchError, Result, classify};
use crate::model::RepositoryRecord;
use crate::request::Fingerprint;

/// Longest accepted cache directory path, in characters.
pub const MAX_CACHE_DIR_LEN: usize = 500;

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Which entries [`CacheStore::clear`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Fingerprint(Fingerprint),
}

/// Summary of the cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entry files present.
    pub entries: usize,
    /// Entries that are expired or unreadable.
    pub expired: usize,
    /// Total size of entry files.
    pub bytes: u64,
}

impl CacheStats {
    #[inline]
    pub fn live(&self) -> usize {
        self.entries - self.expired
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    fingerprint: String,
    created_at: DateTime<Utc>,
    ttl_secs: u64,
    records: Vec<RepositoryRecord>,
}

impl CacheEntry {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let expires_at = i64::try_from(self.ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl));
        match expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

/// File-backed cache keyed by request fingerprint.
#[derive(Clone)]
pub struct CacheStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").field("dir", &self.dir).finish()
    }
}

impl CacheStore {
    /// Use `dir` as the cache directory. It is created on first write.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let display = dir.to_string_lossy().to_string();

        if display.trim().is_empty() {
            return Err(FetchError::configuration(
                "cache.open",
                "cache directory must not be empty",
            )
            .with_field("cache_dir", display));
        }
        if display.chars().count() > MAX_CACHE_DIR_LEN {
            return Err(FetchError::configuration(
                "cache.open",
                format!("cache directory path is longer than {MAX_CACHE_DIR_LEN} characters"),
            )
            .with_field("cache_dir", display));
        }
        if dir.is_file() {
            return Err(FetchError::configuration(
                "cache.open",
                format!("cache directory {display} is a file"),
            )
            .with_field("cache_dir", display));
        }

        Ok(Self {
            dir,
            clock: Arc::new(SystemClock),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.{ENTRY_EXTENSION}", fingerprint.as_str()))
    }

    fn temp_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            "{}.{ENTRY_EXTENSION}.{}.{n}.{TEMP_EXTENSION}",
            fingerprint.as_str(),
            std::process::id()
        ))
    }

    /// Look up a live entry.
    ///
    /// Missing, expired and unreadable entries are all misses; the latter two
    /// are removed. Only an I/O failure other than "not found" is an error.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<RepositoryRecord>>> {
        let path = self.entry_path(fingerprint);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(classify(e, "cache.get").with_info("path", path.display())),
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt cache entry");
                self.discard(&path).await;
                return Ok(None);
            }
        };

        if entry.fingerprint != fingerprint.as_str() {
            tracing::warn!(path = %path.display(), "Discarding cache entry with mismatched fingerprint");
            self.discard(&path).await;
            return Ok(None);
        }

        if !entry.is_valid_at(self.clock.now()) {
            tracing::debug!(
                fingerprint = %fingerprint,
                created_at = %entry.created_at,
                ttl_secs = entry.ttl_secs,
                "Cache entry expired"
            );
            self.discard(&path).await;
            return Ok(None);
        }

        Ok(Some(entry.records))
    }

    /// Store `records` under `fingerprint`, replacing any previous entry.
    pub async fn put(
        &self,
        fingerprint: &Fingerprint,
        records: &[RepositoryRecord],
        ttl: Duration,
    ) -> Result<()> {
        let entry = CacheEntry {
            fingerprint: fingerprint.as_str().to_string(),
            created_at: self.clock.now(),
            ttl_secs: ttl.as_secs(),
            records: records.to_vec(),
        };
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| FetchError::cache("cache.put", format!("serialize entry: {e}")))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| classify(e, "cache.put").with_info("path", self.dir.display()))?;

        let temp = self.temp_path(fingerprint);
        let target = self.entry_path(fingerprint);

        if let Err(e) = write_and_publish(&temp, &target, &bytes).await {
            if let Err(cleanup) = fs::remove_file(&temp).await
                && cleanup.kind() != std::io::ErrorKind::NotFound
            {
                tracing::debug!(path = %temp.display(), error = %cleanup, "Failed to remove temporary cache file");
            }
            return Err(classify(e, "cache.put").with_info("path", target.display()));
        }

        tracing::debug!(
            fingerprint = %fingerprint,
            records = records.len(),
            ttl_secs = ttl.as_secs(),
            "Cache entry written"
        );
        Ok(())
    }

    /// Remove entries. Returns how many entry files were removed.
    pub async fn clear(&self, scope: ClearScope) -> Result<usize> {
        match scope {
            ClearScope::Fingerprint(fingerprint) => {
                match fs::remove_file(self.entry_path(&fingerprint)).await {
                    Ok(()) => Ok(1),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
                    Err(e) => Err(classify(e, "cache.clear")),
                }
            }
            ClearScope::All => {
                let mut removed = 0;
                for (path, kind) in self.list().await? {
                    fs::remove_file(&path)
                        .await
                        .map_err(|e| classify(e, "cache.clear").with_info("path", path.display()))?;
                    if kind == FileKind::Entry {
                        removed += 1;
                    }
                }
                Ok(removed)
            }
        }
    }

    /// Count entries, expired entries and bytes on disk.
    pub async fn stats(&self) -> Result<CacheStats> {
        let now = self.clock.now();
        let mut stats = CacheStats::default();

        for (path, kind) in self.list().await? {
            if kind != FileKind::Entry {
                continue;
            }
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(classify(e, "cache.stats")),
            };
            stats.entries += 1;
            stats.bytes += bytes.len() as u64;
            let live = serde_json::from_slice::<CacheEntry>(&bytes)
                .map(|entry| entry.is_valid_at(now))
                .unwrap_or(false);
            if !live {
                stats.expired += 1;
            }
        }

        Ok(stats)
    }

    /// Remove expired and unreadable entries. Returns how many were removed.
    pub async fn prune_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut removed = 0;

        for (path, kind) in self.list().await? {
            if kind != FileKind::Entry {
                continue;
            }
            let live = match fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<CacheEntry>(&bytes)
                    .map(|entry| entry.is_valid_at(now))
                    .unwrap_or(false),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(classify(e, "cache.prune")),
            };
            if !live {
                self.discard(&path).await;
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<(PathBuf, FileKind)>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(classify(e, "cache.list")),
        };

        let mut files = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| classify(e, "cache.list"))?
        {
            let path = item.path();
            let kind = match path.extension().and_then(|e| e.to_str()) {
                Some(ENTRY_EXTENSION) => FileKind::Entry,
                Some(TEMP_EXTENSION) => FileKind::Temp,
                _ => continue,
            };
            files.push((path, kind));
        }
        files.sort();
        Ok(files)
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache entry");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FileKind {
    Entry,
    Temp,
}

async fn write_and_publish(temp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp, target).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::ErrorKind;
    use crate::model::tests::raw_repo;
    use crate::model::{RepositoryRecord, Strictness};
    use crate::request::{FetchRequest, ItemLimit, OwnerKind};

    /// Clock that only moves when told to.
    pub(crate) struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        pub(crate) fn new() -> Arc<Self> {
            let start = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("valid timestamp")
                .with_timezone(&Utc);
            Arc::new(Self(Mutex::new(start)))
        }

        pub(crate) fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap_or_else(|e| e.into_inner());
            *now += TimeDelta::from_std(by).expect("duration fits");
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    fn records() -> Vec<RepositoryRecord> {
        let mut described = raw_repo("octocat", "hello-world");
        described.description = Some("My first repository".to_string());
        described.topics = Some(vec!["demo".into()]);
        vec![
            RepositoryRecord::from_raw(described, 0, Strictness::Lenient).expect("valid"),
            RepositoryRecord::from_raw(raw_repo("octocat", "spoon-knife"), 1, Strictness::Lenient)
                .expect("valid"),
        ]
    }

    fn fingerprint(owner: &str) -> Fingerprint {
        FetchRequest::new(owner, OwnerKind::User, ItemLimit::Unbounded).fingerprint()
    }

    fn store(dir: &tempfile::TempDir) -> (CacheStore, Arc<ManualClock>) {
        let clock = ManualClock::new();
        let store = CacheStore::open(dir.path().join("cache"))
            .expect("open")
            .with_clock(clock.clone());
        (store, clock)
    }

    #[tokio::test]
    async fn put_then_get_returns_identical_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = store(&dir);
        let fp = fingerprint("octocat");

        store
            .put(&fp, &records(), Duration::from_secs(3600))
            .await
            .expect("put");
        let cached = store.get(&fp).await.expect("get").expect("hit");
        assert_eq!(cached, records());
    }

    #[tokio::test]
    async fn missing_entry_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = store(&dir);
        assert_eq!(store.get(&fingerprint("nobody")).await.expect("get"), None);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_is_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, clock) = store(&dir);
        let fp = fingerprint("octocat");

        store
            .put(&fp, &records(), Duration::from_secs(60))
            .await
            .expect("put");

        clock.advance(Duration::from_secs(59));
        assert!(store.get(&fp).await.expect("get").is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get(&fp).await.expect("get"), None);
        assert!(!store.entry_path(&fp).exists());
    }

    #[tokio::test]
    async fn ttl_is_per_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, clock) = store(&dir);
        let short = fingerprint("short");
        let long = fingerprint("long");

        store.put(&short, &records(), Duration::from_secs(10)).await.expect("put");
        store.put(&long, &records(), Duration::from_secs(1000)).await.expect("put");

        clock.advance(Duration::from_secs(100));
        assert!(store.get(&short).await.expect("get").is_none());
        assert!(store.get(&long).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss_and_is_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = store(&dir);
        let fp = fingerprint("octocat");

        std::fs::create_dir_all(store.dir()).expect("mkdir");
        std::fs::write(store.entry_path(&fp), b"{\"fingerprint\": \"trunc").expect("write");

        assert_eq!(store.get(&fp).await.expect("get"), None);
        assert!(!store.entry_path(&fp).exists());
    }

    #[tokio::test]
    async fn entry_under_wrong_name_is_discarded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = store(&dir);
        let a = fingerprint("a");
        let b = fingerprint("b");

        store.put(&a, &records(), Duration::from_secs(60)).await.expect("put");
        std::fs::rename(store.entry_path(&a), store.entry_path(&b)).expect("rename");

        assert_eq!(store.get(&b).await.expect("get"), None);
    }

    #[tokio::test]
    async fn put_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = store(&dir);
        let fp = fingerprint("octocat");

        store.put(&fp, &records(), Duration::from_secs(60)).await.expect("put");
        store.put(&fp, &records()[..1], Duration::from_secs(60)).await.expect("overwrite");

        let names: Vec<String> = std::fs::read_dir(store.dir())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![format!("{fp}.json")]);
        assert_eq!(store.get(&fp).await.expect("get").expect("hit").len(), 1);
    }

    #[tokio::test]
    async fn clear_by_fingerprint_leaves_others() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = store(&dir);
        let a = fingerprint("a");
        let b = fingerprint("b");

        store.put(&a, &records(), Duration::from_secs(60)).await.expect("put");
        store.put(&b, &records(), Duration::from_secs(60)).await.expect("put");

        assert_eq!(store.clear(ClearScope::Fingerprint(a.clone())).await.expect("clear"), 1);
        assert_eq!(store.clear(ClearScope::Fingerprint(a.clone())).await.expect("clear"), 0);
        assert!(store.get(&a).await.expect("get").is_none());
        assert!(store.get(&b).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn clear_all_removes_entries_and_stray_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = store(&dir);

        store.put(&fingerprint("a"), &records(), Duration::from_secs(60)).await.expect("put");
        store.put(&fingerprint("b"), &records(), Duration::from_secs(60)).await.expect("put");
        std::fs::write(store.dir().join("leftover.json.1.2.tmp"), b"partial").expect("write");
        std::fs::write(store.dir().join("notes.txt"), b"keep me").expect("write");

        assert_eq!(store.clear(ClearScope::All).await.expect("clear"), 2);
        let remaining: Vec<String> = std::fs::read_dir(store.dir())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining, vec!["notes.txt".to_string()]);
    }

    #[tokio::test]
    async fn clear_and_stats_on_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = store(&dir);
        assert_eq!(store.clear(ClearScope::All).await.expect("clear"), 0);
        assert_eq!(store.stats().await.expect("stats"), CacheStats::default());
    }

    #[tokio::test]
    async fn stats_and_prune() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, clock) = store(&dir);

        store.put(&fingerprint("old"), &records(), Duration::from_secs(10)).await.expect("put");
        store.put(&fingerprint("new"), &records(), Duration::from_secs(1000)).await.expect("put");
        std::fs::write(store.dir().join(format!("{}.json", fingerprint("bad"))), b"nope")
            .expect("write");
        clock.advance(Duration::from_secs(100));

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.expired, 2);
        assert_eq!(stats.live(), 1);
        assert!(stats.bytes > 0);

        assert_eq!(store.prune_expired().await.expect("prune"), 2);
        let stats = store.stats().await.expect("stats");
        assert_eq!((stats.entries, stats.expired), (1, 0));
    }

    #[test]
    fn open_rejects_bad_directories() {
        let err = CacheStore::open("").expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.context().field.as_deref(), Some("cache_dir"));

        let err = CacheStore::open("x".repeat(MAX_CACHE_DIR_LEN + 1)).expect_err("long");
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let file = tempfile::NamedTempFile::new().expect("temp file");
        let err = CacheStore::open(file.path()).expect_err("file");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn unwritable_directory_is_a_cache_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").expect("write");

        let store = CacheStore::open(blocker.join("cache")).expect("open");
        let err = store
            .put(&fingerprint("octocat"), &records(), Duration::from_secs(60))
            .await
            .expect_err("cannot create dir under a file");
        assert_eq!(err.kind(), ErrorKind::Cache);
    }
}
