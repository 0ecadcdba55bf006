//! JSON file backed site store
//!
//! Manages `<data_dir>/sites.json` with a backup of the previous version and
//! a lock file guarding read-modify-write cycles.

use crate::SiteStore;
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siteflow_core::SiteRecord;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "sites.json";
const STATE_BACKUP: &str = "sites.json.backup";
const STATE_TEMP: &str = "sites.json.tmp";
const LOCK_FILE: &str = "sites.lock";
const LOCK_ATTEMPTS: u32 = 50;
const LOCK_RETRY_MS: u64 = 100;

/// On-disk index of all sites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteIndex {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Records keyed by site url
    pub sites: BTreeMap<String, SiteRecord>,
}

impl Default for SiteIndex {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            sites: BTreeMap::new(),
        }
    }
}

pub struct JsonSiteStore {
    data_dir: PathBuf,
}

impl JsonSiteStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.data_dir.join(STATE_BACKUP)
    }

    fn temp_path(&self) -> PathBuf {
        self.data_dir.join(STATE_TEMP)
    }

    fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }

    async fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir).await?;
            tracing::debug!("Created data directory: {}", self.data_dir.display());
        }
        Ok(())
    }

    /// Load the current index
    ///
    /// Falls back to the backup when the main file is missing.
    pub async fn load(&self) -> Result<SiteIndex> {
        let path = self.state_path();
        let source = if path.exists() {
            path
        } else if self.backup_path().exists() {
            tracing::warn!("Site index missing, loading backup");
            self.backup_path()
        } else {
            tracing::debug!("Site index not found, returning empty index");
            return Ok(SiteIndex::default());
        };

        let content = fs::read_to_string(&source).await?;
        let index: SiteIndex = serde_json::from_str(&content)?;

        if index.version > STATE_VERSION {
            return Err(StoreError::StateError(format!(
                "Site index version {} is newer than supported version {}",
                index.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded site index with {} sites", index.sites.len());
        Ok(index)
    }

    /// Save the index, keeping the previous version as a backup
    ///
    /// The new index is written to a temporary file and renamed over the
    /// main file, so `sites.json` always holds a complete index.
    async fn save(&self, index: &SiteIndex) -> Result<()> {
        self.ensure_data_dir().await?;

        let path = self.state_path();
        let temp = self.temp_path();

        let content = serde_json::to_string_pretty(index)?;
        let mut file = fs::File::create(&temp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!("Saved site index with {} sites", index.sites.len());
        Ok(())
    }

    /// Acquire the store lock, waiting briefly for other writers
    async fn acquire_lock(&self) -> Result<StoreLock> {
        self.ensure_data_dir().await?;
        let lock_path = self.lock_path();

        for _ in 0..LOCK_ATTEMPTS {
            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await;

            match opened {
                Ok(mut file) => {
                    let lock_info = LockInfo {
                        holder: format!("pid {}", std::process::id()),
                        acquired_at: Utc::now(),
                    };
                    file.write_all(serde_json::to_string(&lock_info)?.as_bytes())
                        .await?;
                    tracing::debug!("Acquired site store lock");
                    return Ok(StoreLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    self.clear_stale_lock(&lock_path).await?;
                    tokio::time::sleep(Duration::from_millis(LOCK_RETRY_MS)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::LockError(format!(
            "Site store is locked: {}",
            lock_path.display()
        )))
    }

    /// Remove a lock left behind for more than an hour
    async fn clear_stale_lock(&self, lock_path: &Path) -> Result<()> {
        let Ok(content) = fs::read_to_string(lock_path).await else {
            return Ok(());
        };
        let Ok(lock_info) = serde_json::from_str::<LockInfo>(&content) else {
            return Ok(());
        };

        let age = Utc::now().signed_duration_since(lock_info.acquired_at);
        if age.num_hours() >= 1 {
            tracing::warn!("Removing stale lock from {}", lock_info.holder);
            let _ = fs::remove_file(lock_path).await;
        }
        Ok(())
    }
}

#[async_trait]
impl SiteStore for JsonSiteStore {
    async fn find(&self, url: &str) -> Result<Option<SiteRecord>> {
        Ok(self.load().await?.sites.remove(url))
    }

    async fn create(&self, record: &SiteRecord) -> Result<String> {
        let lock = self.acquire_lock().await?;

        let mut index = self.load().await?;
        if index.sites.contains_key(&record.site_url) {
            lock.release().await?;
            return Err(StoreError::SiteExists(record.site_url.clone()));
        }

        index.sites.insert(record.site_url.clone(), record.clone());
        index.updated_at = Utc::now();
        let saved = self.save(&index).await;
        lock.release().await?;
        saved?;

        Ok(record.site_url.clone())
    }

    async fn list(&self) -> Result<Vec<SiteRecord>> {
        Ok(self.load().await?.sites.into_values().collect())
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let lock = self.acquire_lock().await?;

        let mut index = self.load().await?;
        if index.sites.remove(url).is_none() {
            lock.release().await?;
            return Err(StoreError::SiteNotFound(url.to_string()));
        }
        index.updated_at = Utc::now();
        let saved = self.save(&index).await;
        lock.release().await?;
        saved
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the store lock
struct StoreLock {
    lock_path: PathBuf,
    released: bool,
}

impl StoreLock {
    async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released site store lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
