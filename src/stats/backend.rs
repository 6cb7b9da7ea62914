/// Persistence backends for the stats record.
///
/// The record lives inside a single JSON document under the fixed key
/// [`STATS_KEY`]. It is always read and written as a whole; other keys in the
/// document are carried through untouched.
///
/// [`JsonFileBackend`] serializes writers with an exclusive lock file next to
/// the document, which holds across threads and across processes, and
/// replaces the document atomically (temp file + rename).
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use serde_json::{Map, Value};

use super::{Stats, StatsError, StatsResult};

/// Key under which the stats record is stored.
pub const STATS_KEY: &str = "promptGreenStats";

/// How long a writer waits for the lock before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(2);

/// Pause between lock attempts.
const LOCK_RETRY: Duration = Duration::from_millis(10);

/// A lock file older than this is assumed to belong to a dead writer.
const STALE_LOCK_AGE: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Load/save of the typed stats record.
pub trait StatsBackend: Send + Sync {
    /// The stored record, or `None` if nothing has been written yet.
    fn load(&self) -> StatsResult<Option<Stats>>;

    /// Overwrite the stored record.
    fn save(&self, stats: &Stats) -> StatsResult<()>;

    /// Read, transform, and write back the record while holding exclusive
    /// access. Returns what was written.
    fn update(&self, apply: &mut dyn FnMut(Option<Stats>) -> Stats) -> StatsResult<Stats>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local backend used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    record: Mutex<Option<Stats>>,
}

impl MemoryBackend {
    pub fn with_stats(stats: Stats) -> Self {
        Self {
            record: Mutex::new(Some(stats)),
        }
    }
}

impl StatsBackend for MemoryBackend {
    fn load(&self) -> StatsResult<Option<Stats>> {
        Ok(self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, stats: &Stats) -> StatsResult<()> {
        *self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(stats.clone());
        Ok(())
    }

    fn update(&self, apply: &mut dyn FnMut(Option<Stats>) -> Stats) -> StatsResult<Stats> {
        let mut record = self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = apply(record.clone());
        *record = Some(next.clone());
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// Backend storing the record in a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    /// Read the whole document. A missing file is an empty document; an
    /// unparseable one is logged and treated as empty so the user is never
    /// blocked by a corrupted file.
    fn read_document(&self) -> StatsResult<Map<String, Value>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(StatsError::io(
                    format!("reading {}", self.path.display()),
                    err,
                ));
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            _ => {
                tracing::warn!(path = %self.path.display(), "storage document is corrupt; starting fresh");
                Ok(Map::new())
            }
        }
    }

    /// The stored record. One that does not match the schema is salvaged
    /// field by field rather than discarded, so totals never go backwards.
    fn record_from(document: &Map<String, Value>) -> Option<Stats> {
        let value = document.get(STATS_KEY)?;
        match serde_json::from_value(value.clone()) {
            Ok(stats) => Some(stats),
            Err(err) => {
                let salvaged = Stats::salvage(value, Utc::now());
                if salvaged.is_some() {
                    tracing::warn!(error = %err, "stored stats record has unexpected fields; keeping readable totals");
                } else {
                    tracing::warn!(error = %err, "stored stats record is not an object; starting fresh");
                }
                salvaged
            }
        }
    }

    /// Replace the document atomically.
    fn write_document(&self, document: &Map<String, Value>) -> StatsResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| StatsError::io(format!("creating {}", parent.display()), err))?;
        }

        let json = serde_json::to_string_pretty(document)?;
        let tmp = sibling(&self.path, &format!("tmp-{}", std::process::id()));
        fs::write(&tmp, json)
            .map_err(|err| StatsError::io(format!("writing {}", tmp.display()), err))?;
        fs::rename(&tmp, &self.path).map_err(|err| {
            let _ = fs::remove_file(&tmp);
            StatsError::io(format!("replacing {}", self.path.display()), err)
        })
    }

    fn store(&self, document: &mut Map<String, Value>, stats: &Stats) -> StatsResult<()> {
        document.insert(STATS_KEY.to_string(), serde_json::to_value(stats)?);
        self.write_document(document)
    }
}

impl StatsBackend for JsonFileBackend {
    fn load(&self) -> StatsResult<Option<Stats>> {
        Ok(Self::record_from(&self.read_document()?))
    }

    fn save(&self, stats: &Stats) -> StatsResult<()> {
        let _lock = LockFile::acquire(self.lock_path())?;
        let mut document = self.read_document()?;
        self.store(&mut document, stats)
    }

    fn update(&self, apply: &mut dyn FnMut(Option<Stats>) -> Stats) -> StatsResult<Stats> {
        let _lock = LockFile::acquire(self.lock_path())?;
        let mut document = self.read_document()?;
        let next = apply(Self::record_from(&document));
        self.store(&mut document, &next)?;
        Ok(next)
    }
}

/// `storage.json` → `storage.json.<suffix>`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Lock file
// ---------------------------------------------------------------------------

/// Exclusive advisory lock held by creating a file with `create_new`.
/// Removed on drop.
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: PathBuf) -> StatsResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| StatsError::io(format!("creating {}", parent.display()), err))?;
        }

        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) && reclaim_stale(&path) {
                        tracing::warn!(path = %path.display(), "reclaimed stale storage lock");
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(StatsError::LockTimeout(path));
                    }
                    thread::sleep(LOCK_RETRY);
                }
                Err(err) => {
                    return Err(StatsError::io(format!("locking {}", path.display()), err));
                }
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Move a stale lock out of the way and delete it.
///
/// The rename is atomic, so of several waiters that all judged the lock
/// stale only one moves any given file. The moved file is checked again:
/// if it turns out to be a fresh lock another waiter created in between,
/// it is linked back in place (never over an existing lock) and nothing is
/// reclaimed.
fn reclaim_stale(path: &Path) -> bool {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let claimed = sibling(path, &format!("stale-{}-{nanos}", std::process::id()));
    if fs::rename(path, &claimed).is_err() {
        return false;
    }

    if is_stale(&claimed) {
        let _ = fs::remove_file(&claimed);
        return true;
    }

    if let Err(err) = fs::hard_link(&claimed, path) {
        tracing::warn!(path = %path.display(), error = %err, "could not restore a live storage lock");
    }
    let _ = fs::remove_file(&claimed);
    false
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("storage.json"));
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("nested").join("storage.json"));
        let stats = Stats::new(Utc::now());
        backend.save(&stats).unwrap();
        assert_eq!(backend.load().unwrap(), Some(stats));
    }

    #[test]
    fn unrelated_keys_survive_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, r#"{"apiStatus":{"isOnline":true}}"#).unwrap();

        let backend = JsonFileBackend::new(&path);
        backend
            .update(&mut |current| {
                let mut stats = current.unwrap_or_else(|| Stats::new(Utc::now()));
                stats.apply(1, 0.1, Utc::now());
                stats
            })
            .unwrap();

        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["apiStatus"]["isOnline"], true);
        assert_eq!(doc[STATS_KEY]["optimizations"], 1);
    }

    #[test]
    fn corrupt_document_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{not json").unwrap();
        let backend = JsonFileBackend::new(&path);
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn lock_is_released_after_update() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("storage.json"));
        backend.update(&mut |_| Stats::new(Utc::now())).unwrap();
        assert!(!backend.lock_path().exists());
    }

    #[test]
    fn held_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("storage.json"));
        let _held = LockFile::acquire(backend.lock_path()).unwrap();
        let err = backend.save(&Stats::new(Utc::now())).unwrap_err();
        assert!(matches!(err, StatsError::LockTimeout(_)));
    }

    #[test]
    fn concurrent_updates_from_separate_backends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                // Separate instances stand in for separate surfaces.
                let backend = Arc::new(JsonFileBackend::new(&path));
                thread::spawn(move || {
                    for _ in 0..10 {
                        backend
                            .update(&mut |current| {
                                let mut stats = current.unwrap_or_else(|| Stats::new(Utc::now()));
                                stats.apply(1, 0.0, Utc::now());
                                stats
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = JsonFileBackend::new(&path).load().unwrap().unwrap();
        assert_eq!(stats.optimizations_count, 40);
        assert_eq!(stats.cumulative_tokens_saved, 40);
    }

    fn backdate(path: &Path, age: Duration) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("storage.json"));
        fs::write(backend.lock_path(), "4242\n").unwrap();
        backdate(&backend.lock_path(), STALE_LOCK_AGE * 2);

        backend.save(&Stats::new(Utc::now())).unwrap();
        assert!(!backend.lock_path().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn fresh_lock_survives_reclaim_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("storage.json"));
        let _held = LockFile::acquire(backend.lock_path()).unwrap();

        // A waiter that judged the lock stale a moment ago must not steal it.
        assert!(!reclaim_stale(&backend.lock_path()));
        assert!(backend.lock_path().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn mistyped_record_keeps_readable_totals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(
            &path,
            r#"{"promptGreenStats":{"optimizations":3,"tokensSaved":12,"co2Reduced":"075.00%","installDate":"2024-05-01T10:00:00.000Z"}}"#,
        )
        .unwrap();

        let backend = JsonFileBackend::new(&path);
        let stats = backend
            .update(&mut |current| {
                let mut stats = current.unwrap_or_else(|| Stats::new(Utc::now()));
                stats.apply(2, 0.5, Utc::now());
                stats
            })
            .unwrap();

        assert_eq!(stats.optimizations_count, 4);
        assert_eq!(stats.cumulative_tokens_saved, 14);
        assert!((stats.cumulative_co2_reduced - 0.5).abs() < 1e-9);
        assert_eq!(stats.install_date.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn sibling_appends_suffix() {
        assert_eq!(
            sibling(Path::new("/a/storage.json"), "lock"),
            PathBuf::from("/a/storage.json.lock")
        );
    }
}
