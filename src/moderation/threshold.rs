use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{ModerationError, ModerationResult};
use crate::voice::GroupId;

/// Decibel threshold, always within `0..=150`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Threshold(u8);

impl Threshold {
    pub const MIN: i64 = 0;
    pub const MAX: i64 = 150;
    pub const DEFAULT: Threshold = Threshold(70);

    pub fn new(value: i64) -> ModerationResult<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(ModerationError::InvalidRange(value.to_string()));
        }
        Ok(Self(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Strict comparison: an estimate equal to the threshold does not exceed it
    pub fn is_exceeded_by(self, decibels: f64) -> bool {
        decibels > f64::from(self.0)
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-group threshold configuration
///
/// `get` sits on the evaluation path and never waits on I/O.
#[async_trait::async_trait]
pub trait ThresholdStore: Send + Sync {
    /// Configured threshold, or the default when unset
    fn get(&self, group: &GroupId) -> Threshold;

    /// Persist an already-validated threshold
    async fn put(&self, group: &GroupId, threshold: Threshold) -> ModerationResult<()>;

    /// Validate and persist. Out-of-range values are rejected before anything is written.
    async fn set(&self, group: &GroupId, value: i64) -> ModerationResult<Threshold> {
        let threshold = Threshold::new(value)?;
        self.put(group, threshold).await?;
        Ok(threshold)
    }
}

/// Volatile store, used in tests and when persistence is not wanted
#[derive(Debug, Default)]
pub struct MemoryThresholdStore {
    thresholds: RwLock<HashMap<GroupId, Threshold>>,
}

impl MemoryThresholdStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ThresholdStore for MemoryThresholdStore {
    fn get(&self, group: &GroupId) -> Threshold {
        self.thresholds
            .read()
            .ok()
            .and_then(|thresholds| thresholds.get(group).copied())
            .unwrap_or_default()
    }

    async fn put(&self, group: &GroupId, threshold: Threshold) -> ModerationResult<()> {
        self.thresholds
            .write()
            .map_err(|_| ModerationError::Store(anyhow::anyhow!("threshold map poisoned")))?
            .insert(group.clone(), threshold);
        Ok(())
    }
}

/// On-disk shape: `{ "guilds": { "<group>": { "decibelThreshold": 70 } } }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ThresholdFile {
    #[serde(default)]
    guilds: BTreeMap<String, GroupSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GroupSettings {
    #[serde(rename = "decibelThreshold", default, skip_serializing_if = "Option::is_none")]
    decibel_threshold: Option<i64>,
}

/// JSON-file store, written through on every change
///
/// Writes are serialized by `writer` and happen outside the state lock, which
/// is only taken for the in-memory read or swap.
pub struct JsonThresholdStore {
    path: PathBuf,
    file: RwLock<ThresholdFile>,
    writer: Mutex<()>,
}

impl JsonThresholdStore {
    /// Open the store at `path`, creating an empty file when missing
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = if fs::try_exists(&path).await.unwrap_or(false) {
            let data = fs::read(&path)
                .await
                .with_context(|| format!("Failed to read threshold file: {}", path.display()))?;
            serde_json::from_slice::<ThresholdFile>(&data)
                .with_context(|| format!("Failed to parse threshold file: {}", path.display()))?
        } else {
            let file = ThresholdFile::default();
            write_file(&path, &file).await?;
            info!("Created threshold file at {}", path.display());
            file
        };

        info!(
            "Threshold store loaded: {} ({} groups configured)",
            path.display(),
            file.guilds.len()
        );

        Ok(Self {
            path,
            file: RwLock::new(file),
            writer: Mutex::new(()),
        })
    }

    fn poisoned() -> ModerationError {
        ModerationError::Store(anyhow::anyhow!("threshold file state poisoned"))
    }
}

#[async_trait::async_trait]
impl ThresholdStore for JsonThresholdStore {
    fn get(&self, group: &GroupId) -> Threshold {
        let stored = self.file.read().ok().and_then(|file| {
            file.guilds
                .get(group.as_str())
                .and_then(|settings| settings.decibel_threshold)
        });

        match stored.map(Threshold::new) {
            Some(Ok(threshold)) => threshold,
            Some(Err(e)) => {
                warn!("Ignoring stored threshold for group {}: {}", group, e);
                Threshold::DEFAULT
            }
            None => Threshold::DEFAULT,
        }
    }

    async fn put(&self, group: &GroupId, threshold: Threshold) -> ModerationResult<()> {
        let _writer = self.writer.lock().await;

        let mut updated = self.file.read().map_err(|_| Self::poisoned())?.clone();
        updated
            .guilds
            .entry(group.as_str().to_string())
            .or_default()
            .decibel_threshold = Some(i64::from(threshold.value()));

        // Readers keep seeing the previous value until the file is written
        write_file(&self.path, &updated)
            .await
            .map_err(ModerationError::Store)?;
        *self.file.write().map_err(|_| Self::poisoned())? = updated;

        info!("Decibel threshold for group {} set to {}", group, threshold);
        Ok(())
    }
}

async fn write_file(path: &Path, file: &ThresholdFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(file)?;
    fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write threshold file: {}", path.display()))?;
    Ok(())
}
