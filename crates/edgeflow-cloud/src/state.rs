//! Remote state persistence
//!
//! The snapshot records, per node id, what was last applied: whether the
//! resource exists, the properties and content hash that were submitted, and
//! the provider-assigned outputs. It is read once at planning time and
//! committed per node as operations finish.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edgeflow_core::OutputSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

use crate::error::{CloudError, Result};
use crate::provider::ResultProperties;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Last known record of a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub exists: bool,

    pub kind: String,

    pub api_version: String,

    /// Properties as last submitted
    pub properties: serde_json::Value,

    /// Content hash of the last successful submission
    pub hash: String,

    /// Provider-assigned outputs
    #[serde(default)]
    pub outputs: ResultProperties,

    /// Error of the most recent failed attempt, cleared on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl RemoteRecord {
    pub fn new(
        kind: impl Into<String>,
        api_version: impl Into<String>,
        properties: serde_json::Value,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            exists: true,
            kind: kind.into(),
            api_version: api_version.into(),
            properties,
            hash: hash.into(),
            outputs: ResultProperties::new(),
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_outputs(mut self, outputs: ResultProperties) -> Self {
        self.outputs = outputs;
        self
    }
}

/// Remote state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Records indexed by node id
    pub records: BTreeMap<String, RemoteRecord>,
}

impl Default for RemoteSnapshot {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            records: BTreeMap::new(),
        }
    }
}

impl RemoteSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: &str) -> Option<&RemoteRecord> {
        self.records.get(node)
    }

    /// Whether the node exists remotely.
    pub fn exists(&self, node: &str) -> bool {
        self.records.get(node).is_some_and(|r| r.exists)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Apply one node's outcome.
    pub fn apply(&mut self, node: &str, outcome: &NodeOutcome) {
        match outcome {
            NodeOutcome::Provisioned(record) => {
                self.records.insert(node.to_string(), record.clone());
            }
            NodeOutcome::Failed(message) => {
                if let Some(record) = self.records.get_mut(node) {
                    record.last_error = Some(message.clone());
                    record.updated_at = Utc::now();
                }
            }
        }
        self.updated_at = Utc::now();
    }
}

impl OutputSource for RemoteSnapshot {
    fn output(&self, node: &str, field: &str) -> Option<serde_json::Value> {
        self.records
            .get(node)
            .filter(|r| r.exists)
            .and_then(|r| r.outputs.get(field))
            .cloned()
    }
}

/// What the executor hands to the store once a node reaches a terminal
/// state.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Provisioned(RemoteRecord),
    /// A failed create leaves no record; a failed update keeps the previous
    /// one and notes the error
    Failed(String),
}

/// State store interface
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last known snapshot; an absent store is an empty snapshot
    async fn load(&self) -> Result<RemoteSnapshot>;

    /// Persist a single node's outcome
    async fn commit(&self, node: &str, outcome: &NodeOutcome) -> Result<()>;
}

/// In-memory store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<RemoteSnapshot>,
    commits: Mutex<Vec<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: RemoteSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            commits: Mutex::new(Vec::new()),
        }
    }

    /// Current contents.
    pub fn snapshot(&self) -> RemoteSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Node ids in commit order.
    pub fn commits(&self) -> Vec<String> {
        self.commits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<RemoteSnapshot> {
        Ok(self.snapshot())
    }

    async fn commit(&self, node: &str, outcome: &NodeOutcome) -> Result<()> {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .apply(node, outcome);
        self.commits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(node.to_string());
        Ok(())
    }
}

/// JSON file store under a state directory (`state.json`).
pub struct FileStateStore {
    state_dir: PathBuf,
    /// Serialises read-modify-write of the file
    write: tokio::sync::Mutex<()>,
}

impl FileStateStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            write: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Get the state file path
    fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    /// Get the backup file path
    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    /// Get the lock file path
    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    async fn read(&self) -> Result<RemoteSnapshot> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty snapshot");
            return Ok(RemoteSnapshot::new());
        }

        let content = fs::read_to_string(&path).await?;
        let snapshot: RemoteSnapshot = serde_json::from_str(&content)?;

        // Version check
        if snapshot.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                snapshot.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} records", snapshot.records.len());
        Ok(snapshot)
    }

    /// Save the snapshot, keeping the previous file as a backup
    pub async fn save(&self, snapshot: &RemoteSnapshot) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} records", snapshot.records.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than one hour are stale
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<RemoteSnapshot> {
        self.read().await
    }

    async fn commit(&self, node: &str, outcome: &NodeOutcome) -> Result<()> {
        let _guard = self.write.lock().await;
        let mut snapshot = self.read().await?;
        snapshot.apply(node, outcome);
        self.save(&snapshot).await
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
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
