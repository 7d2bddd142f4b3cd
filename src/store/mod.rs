// src/store/mod.rs
pub mod json_file;

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::content::ContentRecord;
use crate::lifecycle::LifecycleState;
use crate::source_priority::SourcePriority;

pub use json_file::JsonFileStore;

/// Partial update applied to an existing record on a later sighting.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub source: Option<String>,
    pub state: Option<LifecycleState>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Durable system of record for "has this already been decided". Writes must
/// be visible to subsequent reads within the same process; eventual
/// consistency is not acceptable here.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ContentRecord>>;
    async fn add(&self, record: ContentRecord) -> Result<()>;
    async fn update(&self, id: &str, update: RecordUpdate) -> Result<()>;
    /// Sets `announced = true`. Never reverts.
    async fn mark_announced(&self, id: &str) -> Result<()>;
}

/// Apply a partial update in place; shared by the store implementations.
pub(crate) fn apply_update(record: &mut ContentRecord, update: RecordUpdate) {
    if let Some(source) = update.source {
        record.source = source;
    }
    if let Some(state) = update.state {
        // A record that reached a terminal state never moves back to
        // scheduled or live, whatever a late sighting claims.
        if !(record.state.is_terminal() && !state.is_terminal()) {
            record.state = state;
        }
    }
    if let Some(title) = update.title {
        record.title = Some(title);
    }
    if let Some(url) = update.url {
        record.url = Some(url);
    }
    record.last_updated = update.last_updated.unwrap_or_else(Utc::now);
}

/// Upgrade helper: the update a later sighting applies when it wins
/// arbitration against an existing, unannounced record.
pub fn source_upgrade(
    existing: &ContentRecord,
    incoming_source: &str,
    priority: &SourcePriority,
    now: DateTime<Utc>,
) -> RecordUpdate {
    RecordUpdate {
        source: Some(
            priority
                .sturdier(&existing.source, incoming_source)
                .to_string(),
        ),
        last_updated: Some(now),
        ..Default::default()
    }
}

/// In-memory content store. Suitable for tests and for deployments where the
/// durable medium is wired in behind [`JsonFileStore`] instead.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    records: Mutex<HashMap<String, ContentRecord>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    async fn get(&self, id: &str) -> Result<Option<ContentRecord>> {
        Ok(self
            .records
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned())
    }

    async fn add(&self, record: ContentRecord) -> Result<()> {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn update(&self, id: &str, update: RecordUpdate) -> Result<()> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        if let Some(record) = records.get_mut(id) {
            apply_update(record, update);
        }
        Ok(())
    }

    async fn mark_announced(&self, id: &str) -> Result<()> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        if let Some(record) = records.get_mut(id) {
            record.announced = true;
            record.last_updated = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentKind;

    fn record(id: &str, source: &str) -> ContentRecord {
        ContentRecord::new(
            id,
            source,
            ContentKind::Video,
            LifecycleState::Published,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn add_get_update_round_trip() {
        let store = MemoryContentStore::new();
        store.add(record("v1", "scraper")).await.unwrap();

        store
            .update(
                "v1",
                RecordUpdate {
                    source: Some("webhook".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let got = store.get("v1").await.unwrap().unwrap();
        assert_eq!(got.source, "webhook");
        assert!(!got.announced);
    }

    #[tokio::test]
    async fn mark_announced_sticks() {
        let store = MemoryContentStore::new();
        store.add(record("v1", "api")).await.unwrap();
        store.mark_announced("v1").await.unwrap();
        assert!(store.get("v1").await.unwrap().unwrap().announced);
    }

    #[tokio::test]
    async fn terminal_state_is_never_regressed() {
        let store = MemoryContentStore::new();
        let mut r = record("v1", "api");
        r.state = LifecycleState::Ended;
        store.add(r).await.unwrap();

        // A stale scraper sighting still claims the stream is live.
        store
            .update(
                "v1",
                RecordUpdate {
                    state: Some(LifecycleState::Live),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            store.get("v1").await.unwrap().unwrap().state,
            LifecycleState::Ended
        );

        // Terminal-to-terminal moves are fine.
        store
            .update(
                "v1",
                RecordUpdate {
                    state: Some(LifecycleState::Published),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            store.get("v1").await.unwrap().unwrap().state,
            LifecycleState::Published
        );
    }

    #[test]
    fn source_upgrade_picks_higher_trust() {
        let p = SourcePriority::default();
        let existing = record("v1", "scraper");
        let up = source_upgrade(&existing, "webhook", &p, Utc::now());
        assert_eq!(up.source.as_deref(), Some("webhook"));

        let existing = record("v2", "webhook");
        let up = source_upgrade(&existing, "scraper", &p, Utc::now());
        assert_eq!(up.source.as_deref(), Some("webhook"));
    }
}
