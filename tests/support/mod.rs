// Shared test collaborators: a scriptable delivery mock and arbiter wiring.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use content_arbiter::arbiter::Arbiter;
use content_arbiter::content::{ContentKind, ContentPayload};
use content_arbiter::deliver::{AnnouncePayload, DeliveryCollaborator, DeliveryOutcome};
use content_arbiter::fingerprint::MemoryFingerprintStore;
use content_arbiter::store::MemoryContentStore;

/// One scripted response per announce call; the last entry repeats.
#[derive(Debug, Clone, Copy)]
pub enum Mode {
    Ok,
    /// Transport-level error (announce returns Err).
    Fail,
    /// `success=false, skipped=false` — permanent rejection.
    Reject,
    /// `success=false, skipped=true` — try again later.
    Skip,
}

pub struct MockDelivery {
    script: Vec<Mode>,
    next: AtomicUsize,
    pub calls: AtomicUsize,
    delay: Option<Duration>,
    recent: AtomicBool,
}

impl MockDelivery {
    pub fn with_script(script: Vec<Mode>) -> Self {
        Self {
            script,
            next: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            delay: None,
            recent: AtomicBool::new(false),
        }
    }

    pub fn ok() -> Self {
        Self::with_script(vec![Mode::Ok])
    }

    pub fn failing() -> Self {
        Self::with_script(vec![Mode::Fail])
    }

    pub fn rejecting() -> Self {
        Self::with_script(vec![Mode::Reject])
    }

    /// Hold each announce open for `ms` so calls can overlap.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(ms));
        self
    }

    pub fn set_recent(&self, recent: bool) {
        self.recent.store(recent, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeliveryCollaborator for MockDelivery {
    async fn announce(&self, _payload: &AnnouncePayload) -> Result<DeliveryOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        let mode = *self
            .script
            .get(idx)
            .or_else(|| self.script.last())
            .expect("script must not be empty");
        match mode {
            Mode::Ok => Ok(DeliveryOutcome::ok()),
            Mode::Fail => Err(anyhow!("webhook unreachable")),
            Mode::Reject => Ok(DeliveryOutcome::failed("channel refused the message")),
            Mode::Skip => Ok(DeliveryOutcome::skipped("channel busy, retry later")),
        }
    }

    async fn recently_announced(&self, _fingerprint: &str) -> Result<bool> {
        Ok(self.recent.load(Ordering::SeqCst))
    }
}

/// Arbiter over in-memory stores and the given delivery mock.
pub fn arbiter_with(delivery: Arc<MockDelivery>) -> Arbiter {
    Arbiter::new(
        Arc::new(MemoryContentStore::new()),
        Arc::new(MemoryFingerprintStore::new()),
        delivery,
    )
}

/// A video payload with a URL, published "just now".
pub fn video_payload(url: &str) -> ContentPayload {
    ContentPayload {
        kind: ContentKind::Video,
        url: Some(url.to_string()),
        title: Some("Test upload".to_string()),
        author: Some("tester".to_string()),
        published_at: Some(chrono::Utc::now()),
        ..Default::default()
    }
}
