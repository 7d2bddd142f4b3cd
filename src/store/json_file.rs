//! JSON-file-backed content store: a read-through in-memory map flushed to
//! disk on every write, so already-decided items survive a restart. In-flight
//! locks are deliberately not persisted; a restart simply drops them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::content::ContentRecord;

use super::{apply_update, ContentStore, RecordUpdate};

pub const DEFAULT_STATE_PATH: &str = "state/content_records.json";

pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, ContentRecord>>,
}

impl JsonFileStore {
    /// Open (or create) the store at `path`, loading any existing records.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cache = match fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str::<HashMap<String, ContentRecord>>(&s)
                .with_context(|| format!("parse state file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }

    /// Serialize the whole map and write it out. Write-then-rename so a
    /// crash mid-flush cannot truncate the previous state.
    async fn flush(&self, cache: &HashMap<String, ContentRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(cache).context("serialize state")?;
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename into {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContentStore for JsonFileStore {
    async fn get(&self, id: &str) -> Result<Option<ContentRecord>> {
        Ok(self.cache.lock().await.get(id).cloned())
    }

    async fn add(&self, record: ContentRecord) -> Result<()> {
        let mut cache = self.cache.lock().await;
        cache.insert(record.id.clone(), record);
        self.flush(&cache).await
    }

    async fn update(&self, id: &str, update: RecordUpdate) -> Result<()> {
        let mut cache = self.cache.lock().await;
        if let Some(record) = cache.get_mut(id) {
            apply_update(record, update);
            self.flush(&cache).await?;
        }
        Ok(())
    }

    async fn mark_announced(&self, id: &str) -> Result<()> {
        let mut cache = self.cache.lock().await;
        if let Some(record) = cache.get_mut(id) {
            record.announced = true;
            record.last_updated = Utc::now();
            self.flush(&cache).await?;
        }
        Ok(())
    }
}
