//! content.rs — Shared data model: content kinds, producer payloads, the
//! durable per-item record, and the `ProcessOutcome` shape every call to the
//! arbiter resolves to.
//!
//! The payload is a typed shape over the known content kinds plus an open
//! `metadata` bag for platform-specific extensions; producers that only know
//! a URL and a timestamp can leave everything else empty.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleState;

/// Kind of a logical content item as reported (or inferred) from producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Video,
    Livestream,
    Post,
    Reply,
    Retweet,
    Quote,
    Unknown,
}

impl Default for ContentKind {
    fn default() -> Self {
        ContentKind::Unknown
    }
}

/// What a producer hands the arbiter about one sighting of a content item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPayload {
    #[serde(default)]
    pub kind: ContentKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Producer-reported publication time; items with no timestamp are
    /// treated as fresh (see `FreshnessPolicy`).
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Explicit lifecycle hint, if the producer knows it.
    #[serde(default)]
    pub state: Option<LifecycleState>,
    #[serde(default)]
    pub is_live: Option<bool>,
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Set when this sighting is a repost of someone else's item.
    #[serde(default)]
    pub retweeted_by: Option<String>,
    #[serde(default)]
    pub quoted_url: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Platform-specific extensions (channel ids, thumbnails, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Durable record for one logical content item; the system of record for
/// "has this already been decided".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub kind: ContentKind,
    pub state: LifecycleState,
    /// Most trusted source that has reported this id so far.
    pub source: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Once true, never reverts.
    pub announced: bool,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ContentRecord {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        kind: ContentKind,
        state: LifecycleState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            state,
            source: source.into(),
            published_at: None,
            url: None,
            title: None,
            announced: false,
            last_updated: now,
            metadata: HashMap::new(),
        }
    }

    /// Fill the optional descriptive fields from a payload (builder style).
    pub fn with_payload(mut self, payload: &ContentPayload) -> Self {
        self.published_at = payload.published_at;
        self.url = payload.url.clone();
        self.title = payload.title.clone();
        self.metadata = payload.metadata.clone();
        self
    }
}

/// What happened to one `process()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Announced,
    Skip,
    Error,
}

/// Machine-readable reason attached to every non-announced outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyAnnounced,
    SourcePriority,
    DuplicateDetected,
    ContentTooOld,
    RecentExternalAnnouncement,
    DeliverySkipped,
    DeliveryFailed,
    InvalidContentId,
    ProcessingError,
}

/// Result of one `process()` call. Every call resolves to one of these; no
/// decision is silent and errors never escape as panics or bare `Err`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    /// Free-form context: winning source, delivery ids, error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ProcessOutcome {
    pub fn announced(details: serde_json::Value) -> Self {
        Self {
            action: Action::Announced,
            reason: None,
            details: Some(details),
        }
    }

    pub fn skip(reason: SkipReason) -> Self {
        Self {
            action: Action::Skip,
            reason: Some(reason),
            details: None,
        }
    }

    pub fn error(reason: SkipReason) -> Self {
        Self {
            action: Action::Error,
            reason: Some(reason),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_announced(&self) -> bool {
        self.action == Action::Announced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_serializes_with_snake_case_reasons() {
        let o = ProcessOutcome::skip(SkipReason::SourcePriority)
            .with_details(json!({"existing_source": "webhook"}));
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["action"], json!("skip"));
        assert_eq!(v["reason"], json!("source_priority"));
        assert_eq!(v["details"]["existing_source"], json!("webhook"));
    }

    #[test]
    fn announced_outcome_has_no_reason_key() {
        let o = ProcessOutcome::announced(json!({"message_id": "1"}));
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["action"], json!("announced"));
        assert!(v.get("reason").is_none());
    }

    #[test]
    fn payload_accepts_minimal_json() {
        let p: ContentPayload =
            serde_json::from_str(r#"{"url": "https://example.com/v/1"}"#).unwrap();
        assert_eq!(p.kind, ContentKind::Unknown);
        assert_eq!(p.url.as_deref(), Some("https://example.com/v/1"));
        assert!(p.published_at.is_none());
    }
}
