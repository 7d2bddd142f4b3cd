pub mod discord;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::content::{ContentKind, ContentPayload};

pub use discord::DiscordDelivery;

/// What the arbiter hands the delivery channel once an item wins.
#[derive(Debug, Clone, Serialize)]
pub struct AnnouncePayload {
    pub content_id: String,
    pub source: String,
    pub kind: ContentKind,
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub timestamp_iso: String,
}

impl AnnouncePayload {
    pub fn from_payload(content_id: &str, source: &str, payload: &ContentPayload) -> Self {
        Self {
            content_id: content_id.to_string(),
            source: source.to_string(),
            kind: payload.kind,
            title: payload.title.clone(),
            url: payload.url.clone(),
            author: payload.author.clone(),
            timestamp_iso: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Outcome reported by the delivery channel. `success=false` without
/// `skipped` is a permanent failure; `skipped=true` asks the arbiter to
/// leave the record open for a later attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub skipped: bool,
}

impl DeliveryOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            skipped: true,
            ..Default::default()
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// The outbound announcement channel. `recently_announced` is the
/// pre-announce race guard: fingerprint-aware channels override it to report
/// whether the same content just went out through another instance; the
/// default says no.
#[async_trait::async_trait]
pub trait DeliveryCollaborator: Send + Sync {
    async fn announce(&self, payload: &AnnouncePayload) -> Result<DeliveryOutcome>;

    async fn recently_announced(&self, _fingerprint: &str) -> Result<bool> {
        Ok(false)
    }
}
