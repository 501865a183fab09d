//! State store
//!
//! Manages `.tessera/state.json`, the last-known attributes of every managed
//! resource keyed by address, and `.tessera/lock.json`, the single lock over
//! the whole store.

use crate::error::StateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_core::{Attributes, PROJECT_DIR};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, StateError>;

/// Persisted format version (MAJOR.MINOR)
pub const STATE_FORMAT_VERSION: &str = "1.0";

const STATE_FILE: &str = "state.json";
const STATE_TEMP: &str = "state.json.tmp";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Last-known state of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub address: String,

    pub resource_type: String,

    /// Provider-assigned identifier
    pub provider_id: String,

    /// Resolved inputs last sent to the provider
    #[serde(default)]
    pub inputs: Attributes,

    /// Attributes after the last operation (inputs overlaid with provider output)
    #[serde(default)]
    pub attributes: Attributes,

    /// Dependency addresses at apply time
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl StateRecord {
    pub fn new(
        address: impl Into<String>,
        resource_type: impl Into<String>,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            resource_type: resource_type.into(),
            provider_id: provider_id.into(),
            inputs: Attributes::new(),
            attributes: Attributes::new(),
            dependencies: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_inputs(mut self, inputs: Attributes) -> Self {
        self.attributes = inputs.clone();
        self.inputs = inputs;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Overlay provider-reported attributes on top of the inputs
    pub fn set_reported(&mut self, reported: Attributes) {
        let mut attributes = self.inputs.clone();
        attributes.extend(reported);
        self.attributes = attributes;
        self.updated_at = Utc::now();
    }
}

/// Snapshot of the whole store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Format version (MAJOR.MINOR)
    pub version: String,

    /// Incremented by every commit
    #[serde(default)]
    pub serial: u64,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub records: BTreeMap<String, StateRecord>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: STATE_FORMAT_VERSION.to_string(),
            serial: 0,
            updated_at: Utc::now(),
            records: BTreeMap::new(),
        }
    }
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<&StateRecord> {
        self.records.get(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Upsert a record, or remove it when `record` is `None`
    pub fn apply(&mut self, address: &str, record: Option<StateRecord>) {
        match record {
            Some(record) => {
                self.records.insert(address.to_string(), record);
            }
            None => {
                self.records.remove(address);
            }
        }
        self.serial += 1;
        self.updated_at = Utc::now();
    }
}

fn check_version(path: &Path, version: &str) -> Result<()> {
    let major = |v: &str| v.split('.').next().and_then(|m| m.parse::<u32>().ok());
    let found = major(version).ok_or_else(|| StateError::Corrupt {
        path: path.to_path_buf(),
        message: format!("invalid format version '{}'", version),
    })?;
    if Some(found) != major(STATE_FORMAT_VERSION) {
        return Err(StateError::MigrationRequired {
            found: version.to_string(),
            supported: STATE_FORMAT_VERSION.to_string(),
        });
    }
    Ok(())
}

/// Lock file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    pub holder: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    fn new(ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: now,
            expires_at: expiry_after(now, ttl),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Lock acquisition options
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// How long to wait for a live lock (zero: fail immediately)
    pub timeout: Duration,
    /// Lifetime of the lock without a heartbeat
    pub ttl: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            ttl: Duration::from_secs(300),
        }
    }
}

/// State store rooted at `<project>/.tessera`
#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            state_dir: project_root.as_ref().join(PROJECT_DIR),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            debug!(dir = %self.state_dir.display(), "Created state directory");
        }
        Ok(())
    }

    /// Load a snapshot for reading
    ///
    /// Fails with `Locked` while another holder has a live lock.
    pub async fn load(&self) -> Result<StateSnapshot> {
        if let Some(lock) = self.read_lock().await? {
            if !lock.is_expired() {
                return Err(StateError::Locked {
                    holder: lock.holder,
                    lock_id: lock.id,
                    acquired_at: lock.acquired_at,
                });
            }
            warn!(lock_id = %lock.id, holder = %lock.holder, "Ignoring expired lock for read");
        }
        self.read_snapshot().await
    }

    async fn read_snapshot(&self) -> Result<StateSnapshot> {
        let path = self.state_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("State file not found, returning empty state");
                return Ok(StateSnapshot::new());
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |message: String| StateError::Corrupt {
            path: path.clone(),
            message,
        };
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        let version = value
            .get("version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| corrupt("missing format version".to_string()))?;
        check_version(&path, version)?;

        let snapshot: StateSnapshot =
            serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))?;
        debug!(
            serial = snapshot.serial,
            records = snapshot.len(),
            "Loaded state"
        );
        Ok(snapshot)
    }

    /// Write a snapshot durably: temp file, fsync, backup, rename
    async fn write_snapshot(&self, snapshot: &StateSnapshot) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let temp = self.state_dir.join(STATE_TEMP);
        let content = serde_json::to_vec_pretty(snapshot)?;

        let mut file = fs::File::create(&temp).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        if fs::try_exists(&path).await? {
            fs::copy(&path, self.backup_path()).await?;
        }
        fs::rename(&temp, &path).await?;

        debug!(serial = snapshot.serial, records = snapshot.len(), "Saved state");
        Ok(())
    }

    /// Current lock, if any
    pub async fn read_lock(&self) -> Result<Option<LockInfo>> {
        let path = self.lock_path();
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let info = serde_json::from_str(&content).map_err(|e| StateError::Corrupt {
                    path,
                    message: e.to_string(),
                })?;
                Ok(Some(info))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Acquire the store lock
    ///
    /// A live lock is waited on up to `options.timeout`. An expired lock is
    /// reported as `StaleLock` and left in place.
    pub async fn acquire_lock(&self, options: &LockOptions) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let started = tokio::time::Instant::now();
        loop {
            let info = LockInfo::new(options.ttl);
            if self.try_create_lock(&info).await? {
                info!(lock_id = %info.id, "Acquired state lock");
                let heartbeat = tokio::spawn(heartbeat(lock_path.clone(), info.id.clone(), options.ttl));
                return Ok(StateLock {
                    info,
                    lock_path,
                    heartbeat: Some(heartbeat),
                    released: false,
                });
            }

            // Lock vanished between the create attempt and the read
            let Some(existing) = self.read_lock().await? else {
                continue;
            };

            if existing.is_expired() {
                warn!(
                    lock_id = %existing.id,
                    holder = %existing.holder,
                    expired_at = %existing.expires_at,
                    "Found stale state lock"
                );
                return Err(StateError::StaleLock {
                    holder: existing.holder,
                    lock_id: existing.id,
                    expired_at: existing.expires_at,
                });
            }

            let waited = started.elapsed();
            if waited >= options.timeout {
                if options.timeout.is_zero() {
                    return Err(StateError::Locked {
                        holder: existing.holder,
                        lock_id: existing.id,
                        acquired_at: existing.acquired_at,
                    });
                }
                return Err(StateError::LockTimeout {
                    holder: existing.holder,
                    waited_secs: waited.as_secs(),
                });
            }

            debug!(holder = %existing.holder, "State is locked, waiting");
            tokio::time::sleep(LOCK_POLL_INTERVAL.min(options.timeout - waited)).await;
        }
    }

    /// Create the lock file atomically; `false` when it already exists
    async fn try_create_lock(&self, info: &LockInfo) -> Result<bool> {
        let temp = self.state_dir.join(format!("lock.{}.tmp", info.id));
        fs::write(&temp, serde_json::to_vec_pretty(info)?).await?;
        let linked = fs::hard_link(&temp, self.lock_path()).await;
        fs::remove_file(&temp).await?;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a lock left behind by a dead holder
    pub async fn force_unlock(&self, lock_id: &str) -> Result<LockInfo> {
        let current = self.read_lock().await?.ok_or(StateError::NotLocked)?;
        if current.id != lock_id {
            return Err(StateError::LockIdMismatch {
                requested: lock_id.to_string(),
                current: current.id,
            });
        }
        fs::remove_file(self.lock_path()).await?;
        warn!(lock_id = %current.id, holder = %current.holder, "Force-unlocked state");
        Ok(current)
    }

    /// Lock the store and load its snapshot for mutation
    pub async fn open_session(&self, options: &LockOptions) -> Result<StateSession> {
        let lock = self.acquire_lock(options).await?;
        let snapshot = self.read_snapshot().await?;
        Ok(StateSession {
            store: self.clone(),
            lock,
            snapshot,
        })
    }
}

async fn read_lock_file(lock_path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(lock_path).await.ok()?;
    serde_json::from_str(&content).ok()
}

/// Renew the lock expiry while the guard lives
///
/// The holder is checked again right before the rename. A force-unlock and a
/// new acquire landing between that check and the rename can still be
/// overwritten.
async fn heartbeat(lock_path: PathBuf, lock_id: String, ttl: Duration) {
    let interval = (ttl / 3).max(Duration::from_millis(100));
    let temp = lock_path.with_extension("heartbeat.tmp");
    loop {
        tokio::time::sleep(interval).await;
        let Some(mut info) = read_lock_file(&lock_path).await else {
            return;
        };
        if info.id != lock_id {
            return;
        }
        info.expires_at = expiry_after(Utc::now(), ttl);

        let bytes = match serde_json::to_vec_pretty(&info) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(lock_id = %lock_id, error = %e, "Failed to renew state lock");
                continue;
            }
        };
        if let Err(e) = fs::write(&temp, bytes).await {
            warn!(lock_id = %lock_id, error = %e, "Failed to renew state lock");
            continue;
        }
        let still_ours = read_lock_file(&lock_path)
            .await
            .is_some_and(|current| current.id == lock_id);
        if !still_ours {
            let _ = fs::remove_file(&temp).await;
            warn!(lock_id = %lock_id, "State lock changed hands, stopping renewal");
            return;
        }
        let renewed = fs::rename(&temp, &lock_path).await;
        match renewed {
            Ok(()) => debug!(lock_id = %lock_id, "Renewed state lock"),
            Err(e) => warn!(lock_id = %lock_id, error = %e, "Failed to renew state lock"),
        }
    }
}

/// RAII guard for the state lock
#[derive(Debug)]
pub struct StateLock {
    info: LockInfo,
    lock_path: PathBuf,
    heartbeat: Option<JoinHandle<()>>,
    released: bool,
}

impl StateLock {
    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
            let _ = heartbeat.await;
        }
        if !self.released {
            self.released = true;
            let current = match fs::read_to_string(&self.lock_path).await {
                Ok(content) => serde_json::from_str::<LockInfo>(&content).ok(),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };
            match current {
                Some(current) if current.id == self.info.id => {
                    fs::remove_file(&self.lock_path).await?;
                    info!(lock_id = %self.info.id, "Released state lock");
                }
                _ => warn!(lock_id = %self.info.id, "State lock was already removed"),
            }
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        if !self.released {
            // Only remove the file if it is still ours
            let ours = std::fs::read_to_string(&self.lock_path)
                .ok()
                .and_then(|c| serde_json::from_str::<LockInfo>(&c).ok())
                .is_some_and(|current| current.id == self.info.id);
            if ours {
                let _ = std::fs::remove_file(&self.lock_path);
            }
        }
    }
}

/// Locked, mutable view of the store
#[derive(Debug)]
pub struct StateSession {
    store: StateStore,
    lock: StateLock,
    snapshot: StateSnapshot,
}

impl StateSession {
    pub fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    pub fn lock(&self) -> &StateLock {
        &self.lock
    }

    /// Upsert or delete one record and persist before returning
    pub async fn commit(&mut self, address: &str, record: Option<StateRecord>) -> Result<()> {
        let mut next = self.snapshot.clone();
        let removed = record.is_none();
        next.apply(address, record);
        self.store.write_snapshot(&next).await?;
        self.snapshot = next;
        info!(
            address,
            serial = self.snapshot.serial,
            removed,
            "Committed state"
        );
        Ok(())
    }

    pub async fn release(self) -> Result<()> {
        self.lock.release().await
    }
}
