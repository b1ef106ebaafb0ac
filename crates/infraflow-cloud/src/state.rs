//! Persisted deployment state
//!
//! `.infraflow/state.json` records every resource an adapter has created,
//! keyed by logical id, so a re-run with unchanged configuration reuses the
//! existing resource instead of creating a second one.

use crate::adapter::Outputs;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
pub const STATE_DIR: &str = ".infraflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Locks older than this are considered abandoned
const STALE_LOCK_HOURS: i64 = 1;

/// Every resource known to the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    pub version: u32,

    pub updated_at: DateTime<Utc>,

    /// Records keyed by logical resource id
    pub resources: BTreeMap<String, ResourceRecord>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ResourceRecord> {
        self.resources.get(id)
    }

    /// Insert or replace the record for `id`
    pub fn upsert(&mut self, id: impl Into<String>, record: ResourceRecord) {
        self.resources.insert(id.into(), record);
        self.updated_at = Utc::now();
    }
}

/// What an adapter remembers about one created resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Provider-assigned identifier
    pub remote_id: String,

    pub kind: String,

    /// Resolved configuration of the last successful create or update
    pub config: Map<String, Value>,

    pub outputs: Outputs,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(
        remote_id: impl Into<String>,
        kind: impl Into<String>,
        config: Map<String, Value>,
        outputs: Outputs,
    ) -> Self {
        let now = Utc::now();
        Self {
            remote_id: remote_id.into(),
            kind: kind.into(),
            config,
            outputs,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `config` matches what was last applied
    pub fn is_current(&self, kind: &str, config: &Map<String, Value>) -> bool {
        self.kind == kind && &self.config == config
    }

    /// Replace configuration and outputs after an in-place update
    pub fn update(&mut self, config: Map<String, Value>, outputs: Outputs) {
        self.config = config;
        self.outputs = outputs;
        self.updated_at = Utc::now();
    }

    pub fn get_output<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.outputs
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Reads and writes the state file of one project
#[derive(Debug, Clone)]
pub struct StateManager {
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn tmp_path(&self) -> PathBuf {
        self.state_dir().join(STATE_TMP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!(path = %dir.display(), "Created state directory");
        }
        Ok(())
    }

    /// Load the state, or an empty one when no file exists yet
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, starting empty");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(Error::State(format!(
                "state file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(resources = state.resources.len(), "Loaded state");
        Ok(state)
    }

    /// Write the state, keeping the previous file as a backup.
    ///
    /// The new content goes to a temporary file first; `state.json` is only
    /// replaced once it is complete, so a failed save leaves the old file.
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let tmp = self.tmp_path();
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, content).await?;

        if let Err(e) = self.replace_with(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }

        tracing::debug!(resources = state.resources.len(), "Saved state");
        Ok(())
    }

    async fn replace_with(&self, tmp: &Path, path: &Path) -> Result<()> {
        if path.exists() {
            fs::copy(path, self.backup_path()).await?;
        }
        fs::rename(tmp, path).await?;
        Ok(())
    }

    /// Take the project lock for the duration of a run.
    ///
    /// The lock file is created exclusively, so of two concurrent callers
    /// only one succeeds. A lock older than an hour is taken over, but only
    /// if it is still the same lock when it is removed.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let info = LockInfo::current();
        if create_lock_file(&lock_path, &info).await? {
            tracing::debug!("Acquired state lock");
            return Ok(StateLock::new(lock_path));
        }

        let held = read_lock(&lock_path).await?;
        let age = Utc::now().signed_duration_since(held.acquired_at);
        if age.num_hours() < STALE_LOCK_HOURS {
            return Err(held_by(&held));
        }

        // Someone may have replaced the stale lock since it was read.
        let recheck = read_lock(&lock_path).await?;
        if recheck != held {
            return Err(held_by(&recheck));
        }
        tracing::warn!(holder = %held.holder, pid = held.pid, "Removing stale lock");
        match fs::remove_file(&lock_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if create_lock_file(&lock_path, &info).await? {
            tracing::debug!("Acquired state lock");
            return Ok(StateLock::new(lock_path));
        }
        Err(held_by(&read_lock(&lock_path).await?))
    }
}

/// Create the lock file exclusively; `false` when it already exists
async fn create_lock_file(path: &Path, info: &LockInfo) -> Result<bool> {
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    file.write_all(serde_json::to_string_pretty(info)?.as_bytes())
        .await?;
    file.flush().await?;
    Ok(true)
}

/// Read the current lock; one still being written counts as held
async fn read_lock(path: &Path) -> Result<LockInfo> {
    let content = fs::read_to_string(path).await?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Lock(format!("state is locked (lock file not readable yet: {e})"))
    })
}

fn held_by(held: &LockInfo) -> Error {
    Error::Lock(format!(
        "state is locked by {} (pid {}) since {}",
        held.holder, held.pid, held.acquired_at
    ))
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// Held project lock; removed on release or drop
#[derive(Debug)]
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    fn new(lock_path: PathBuf) -> Self {
        Self {
            lock_path,
            released: false,
        }
    }

    pub async fn release(mut self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await?;
            tracing::debug!("Released state lock");
        }
        self.released = true;
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record() -> ResourceRecord {
        let mut config = Map::new();
        config.insert("location".to_string(), json!("westus"));
        ResourceRecord::new(
            "/subscriptions/sub/resourceGroups/rg1",
            "Microsoft.Resources/resourceGroups",
            config,
            Outputs::from([("name".to_string(), json!("rg1"))]),
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.upsert("rg", record());
        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        let rg = loaded.get("rg").unwrap();
        assert_eq!(rg.remote_id, "/subscriptions/sub/resourceGroups/rg1");
        assert_eq!(rg.get_output::<String>("name").as_deref(), Some("rg1"));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_state() {
        let temp_dir = tempdir().unwrap();
        let state = StateManager::new(temp_dir.path()).load().await.unwrap();
        assert!(state.resources.is_empty());
    }

    #[tokio::test]
    async fn test_second_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        manager.save(&GlobalState::new()).await.unwrap();
        manager.save(&GlobalState::new()).await.unwrap();
        assert!(manager.state_dir().join(STATE_BACKUP).exists());
    }

    #[tokio::test]
    async fn test_newer_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let mut state = GlobalState::new();
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        assert!(matches!(manager.load().await, Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(manager.acquire_lock().await, Err(Error::Lock(_))));
        lock.release().await.unwrap();

        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!manager.state_dir().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.upsert("rg", record());
        manager.save(&state).await.unwrap();

        // A directory in place of the backup makes the next save fail
        std::fs::create_dir_all(manager.backup_path().join("blocker")).unwrap();
        state.upsert("vnet", record());
        assert!(manager.save(&state).await.is_err());

        let loaded = manager.load().await.unwrap();
        assert!(loaded.get("rg").is_some());
        assert!(loaded.get("vnet").is_none());
        assert!(!manager.tmp_path().exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_acquire_has_one_winner() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let (first, second) = tokio::join!(manager.acquire_lock(), manager.acquire_lock());
        let winners = [first.is_ok(), second.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count();
        assert_eq!(winners, 1);
        assert!(matches!(first.as_ref().err().or(second.as_ref().err()), Some(Error::Lock(_))));
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        std::fs::create_dir_all(manager.state_dir()).unwrap();

        let stale = LockInfo {
            holder: "old-host".to_string(),
            pid: 1,
            acquired_at: Utc::now() - chrono::TimeDelta::hours(2),
        };
        std::fs::write(manager.lock_path(), serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = manager.acquire_lock().await.unwrap();
        let held = read_lock(&manager.lock_path()).await.unwrap();
        assert_eq!(held.pid, std::process::id());
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_fresh_foreign_lock_is_respected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        std::fs::create_dir_all(manager.state_dir()).unwrap();

        let other = LockInfo {
            holder: "ci-runner".to_string(),
            pid: 4242,
            acquired_at: Utc::now(),
        };
        std::fs::write(manager.lock_path(), serde_json::to_string(&other).unwrap()).unwrap();

        match manager.acquire_lock().await {
            Err(Error::Lock(message)) => assert!(message.contains("ci-runner")),
            other => panic!("Expected lock error, got {other:?}"),
        }
        assert!(manager.lock_path().exists());
    }

    #[test]
    fn test_record_detects_config_changes() {
        let mut rec = record();
        let same = rec.config.clone();
        assert!(rec.is_current("Microsoft.Resources/resourceGroups", &same));

        let mut changed = same.clone();
        changed.insert("location".to_string(), json!("eastus"));
        assert!(!rec.is_current("Microsoft.Resources/resourceGroups", &changed));

        rec.update(changed.clone(), Outputs::new());
        assert!(rec.is_current("Microsoft.Resources/resourceGroups", &changed));
    }
}
