//! classify.rs — Optional content classification.
//!
//! Classification refines the content kind attached to a record (original
//! post vs. retweet vs. quote vs. reply); it never gates the announce
//! decision. The collaborator is optional: an arbiter without one simply
//! keeps the producer-reported kind.

use anyhow::Result;
use serde::Serialize;

use crate::content::{ContentKind, ContentPayload};

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub kind: ContentKind,
    /// 0.0 .. 1.0
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[async_trait::async_trait]
pub trait ClassifierCollaborator: Send + Sync {
    async fn classify(&self, payload: &ContentPayload) -> Result<Classification>;
}

/// Rule-based classifier over payload fields. Disambiguates repost shapes
/// the producers themselves often mislabel.
#[derive(Debug, Default, Clone)]
pub struct HeuristicClassifier;

#[async_trait::async_trait]
impl ClassifierCollaborator for HeuristicClassifier {
    async fn classify(&self, payload: &ContentPayload) -> Result<Classification> {
        Ok(classify_heuristic(payload))
    }
}

pub fn classify_heuristic(payload: &ContentPayload) -> Classification {
    // A reposting account trumps every other hint.
    if payload.retweeted_by.is_some() {
        return Classification {
            kind: ContentKind::Retweet,
            confidence: 0.95,
            details: Some("retweeted_by present".into()),
        };
    }
    if payload.quoted_url.is_some() {
        return Classification {
            kind: ContentKind::Quote,
            confidence: 0.9,
            details: Some("quoted_url present".into()),
        };
    }
    if payload.reply_to.is_some() {
        return Classification {
            kind: ContentKind::Reply,
            confidence: 0.9,
            details: Some("reply_to present".into()),
        };
    }
    if payload.is_live == Some(true) || payload.scheduled_start.is_some() {
        return Classification {
            kind: ContentKind::Livestream,
            confidence: 0.8,
            details: Some("live hints present".into()),
        };
    }

    match payload.kind {
        ContentKind::Unknown => Classification {
            kind: if payload.text.is_some() {
                ContentKind::Post
            } else {
                ContentKind::Unknown
            },
            confidence: 0.5,
            details: None,
        },
        kind => Classification {
            kind,
            confidence: 0.7,
            details: None,
        },
    }
}
