//! # Arbitration Engine
//!
//! The orchestrator: given `(content_id, source, payload)`, decides
//! skip/announce, enforces single-flight execution per id, and applies
//! source-priority rules. Correctness target: at most one announcement per
//! logical content item, under concurrent, out-of-order, partially-failing
//! producers, using only process-local coordination.
//!
//! Every decision lands in a [`ProcessOutcome`] with a machine-readable
//! reason and bumps the matching counter; no skip is silent.

pub mod inflight;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::classify::ClassifierCollaborator;
use crate::content::{Action, ContentPayload, ContentRecord, ProcessOutcome, SkipReason};
use crate::deliver::{AnnouncePayload, DeliveryCollaborator};
use crate::fingerprint::{FingerprintStore, Fingerprinter, UrlFingerprinter};
use crate::freshness::FreshnessPolicy;
use crate::lifecycle::derive_state;
use crate::source_priority::SourcePriority;
use crate::store::{source_upgrade, ContentStore};

use inflight::{Flight, InflightMap};

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("arbiter_processed_total", "Total process() calls.");
        describe_counter!("arbiter_announced_total", "Successful announcements.");
        describe_counter!(
            "arbiter_duplicates_skipped_total",
            "Calls skipped by fingerprint or external-announcement dedup."
        );
        describe_counter!(
            "arbiter_race_prevented_total",
            "Callers that joined an in-flight attempt instead of re-running."
        );
        describe_counter!(
            "arbiter_source_priority_skips_total",
            "Calls skipped because a higher-trust source holds the record."
        );
        describe_counter!("arbiter_processing_errors_total", "Calls that errored.");
        describe_counter!(
            "arbiter_lock_timeouts_total",
            "Processing locks force-evicted by the timeout timer."
        );
        describe_gauge!("arbiter_active_processing", "Ids currently in flight.");
    });
}

#[derive(Default)]
struct Counters {
    total_processed: AtomicU64,
    duplicates_skipped: AtomicU64,
    race_conditions_prevented: AtomicU64,
    source_priority_skips: AtomicU64,
    processing_errors: AtomicU64,
}

/// Snapshot returned by [`Arbiter::get_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct ArbiterStats {
    pub total_processed: u64,
    pub duplicates_skipped: u64,
    pub race_conditions_prevented: u64,
    pub source_priority_skips: u64,
    pub processing_errors: u64,
    pub lock_timeouts: u64,
    pub active_processing: usize,
    pub source_priority: Vec<String>,
    pub lock_timeout_ms: u64,
}

pub struct Arbiter {
    store: Arc<dyn ContentStore>,
    fingerprints: Arc<dyn FingerprintStore>,
    fingerprinter: Arc<dyn Fingerprinter>,
    delivery: Arc<dyn DeliveryCollaborator>,
    classifier: Option<Arc<dyn ClassifierCollaborator>>,
    priority: RwLock<SourcePriority>,
    freshness: FreshnessPolicy,
    inflight: InflightMap,
    lock_timeout: Duration,
    counters: Counters,
}

impl Arbiter {
    pub fn new(
        store: Arc<dyn ContentStore>,
        fingerprints: Arc<dyn FingerprintStore>,
        delivery: Arc<dyn DeliveryCollaborator>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            fingerprints,
            fingerprinter: Arc::new(UrlFingerprinter),
            delivery,
            classifier: None,
            priority: RwLock::new(SourcePriority::default()),
            freshness: FreshnessPolicy::default(),
            inflight: InflightMap::new(),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            counters: Counters::default(),
        }
    }

    pub fn with_fingerprinter(mut self, f: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = f;
        self
    }

    pub fn with_classifier(mut self, c: Arc<dyn ClassifierCollaborator>) -> Self {
        self.classifier = Some(c);
        self
    }

    pub fn with_freshness(mut self, policy: FreshnessPolicy) -> Self {
        self.freshness = policy;
        self
    }

    pub fn with_source_priority(mut self, priority: SourcePriority) -> Self {
        self.priority = RwLock::new(priority);
        self
    }

    pub fn with_lock_timeout_ms(mut self, ms: u64) -> Self {
        self.lock_timeout = Duration::from_millis(ms);
        self
    }

    /// The sole producer-facing entry point. Never returns `Err`: every
    /// failure mode is folded into a `ProcessOutcome` with a reason.
    pub async fn process(
        &self,
        content_id: &str,
        source: &str,
        payload: &ContentPayload,
    ) -> ProcessOutcome {
        self.counters.total_processed.fetch_add(1, Ordering::Relaxed);
        counter!("arbiter_processed_total").increment(1);

        // 1) Input validation. Unknown sources are accepted (they rank
        //    last); an empty id is fatal to this call only.
        let content_id = content_id.trim();
        if content_id.is_empty() {
            return self.note_error(
                ProcessOutcome::error(SkipReason::InvalidContentId)
                    .with_details(json!({"error": "contentId must be a non-empty identifier"})),
            );
        }

        // 2/3) Single-flight: install the lock before the first await, or
        //      join the in-flight attempt for this id.
        match self.inflight.begin(content_id, source, self.lock_timeout) {
            Flight::Joiner {
                mut rx,
                winning_source,
            } => {
                self.counters
                    .race_conditions_prevented
                    .fetch_add(1, Ordering::Relaxed);
                counter!("arbiter_race_prevented_total").increment(1);

                let joined = match rx.changed().await {
                    Ok(()) => rx.borrow().clone(),
                    Err(_) => None,
                };
                match joined {
                    Some(prior) if prior.action == Action::Error => self.note_error(
                        ProcessOutcome::error(SkipReason::ProcessingError).with_details(json!({
                            "joined_in_flight": true,
                            "winning_source": winning_source,
                            "error": "in-flight attempt failed",
                        })),
                    ),
                    Some(_) => ProcessOutcome::skip(SkipReason::DuplicateDetected).with_details(
                        json!({"joined_in_flight": true, "winning_source": winning_source}),
                    ),
                    // Holder aborted without settling (cancelled or evicted).
                    None => self.note_error(
                        ProcessOutcome::error(SkipReason::ProcessingError).with_details(json!({
                            "joined_in_flight": true,
                            "error": "in-flight attempt aborted",
                        })),
                    ),
                }
            }
            Flight::Holder(guard) => {
                let outcome = self.arbitrate(content_id, source, payload).await;
                if outcome.action == Action::Error {
                    self.counters
                        .processing_errors
                        .fetch_add(1, Ordering::Relaxed);
                    counter!("arbiter_processing_errors_total").increment(1);
                }
                guard.settle(outcome.clone());
                gauge!("arbiter_active_processing").set(self.inflight.len() as f64);
                outcome
            }
        }
    }

    /// Steps 4–10 for the lock holder.
    async fn arbitrate(
        &self,
        content_id: &str,
        source: &str,
        payload: &ContentPayload,
    ) -> ProcessOutcome {
        let now = Utc::now();
        gauge!("arbiter_active_processing").set(self.inflight.len() as f64);

        // 4) Existing-record check and source-priority arbitration.
        let existing = match self.store.get(content_id).await {
            Ok(r) => r,
            Err(e) => {
                warn!(content_id, error = ?e, "content store lookup failed");
                return ProcessOutcome::error(SkipReason::ProcessingError)
                    .with_details(json!({"error": e.to_string()}));
            }
        };

        if let Some(record) = &existing {
            if record.announced {
                return ProcessOutcome::skip(SkipReason::AlreadyAnnounced)
                    .with_details(json!({"existing_source": record.source}));
            }
            let blocked = {
                let priority = self.priority.read().expect("priority rwlock poisoned");
                !priority.can_preempt(source, &record.source)
            };
            if blocked {
                self.counters
                    .source_priority_skips
                    .fetch_add(1, Ordering::Relaxed);
                counter!("arbiter_source_priority_skips_total").increment(1);
                return ProcessOutcome::skip(SkipReason::SourcePriority).with_details(json!({
                    "existing_source": record.source,
                    "incoming_source": source,
                }));
            }
        }

        // 5) Duplicate-fingerprint check. A failing store must not suppress
        //    legitimate content, so errors read as "not a duplicate".
        let fingerprint = self.fingerprinter.fingerprint(content_id, payload);
        match self.fingerprints.is_duplicate(&fingerprint).await {
            Ok(true) => {
                self.counters
                    .duplicates_skipped
                    .fetch_add(1, Ordering::Relaxed);
                counter!("arbiter_duplicates_skipped_total").increment(1);
                return ProcessOutcome::skip(SkipReason::DuplicateDetected)
                    .with_details(json!({"fingerprint": fingerprint}));
            }
            Ok(false) => {}
            Err(e) => {
                warn!(content_id, error = ?e, "duplicate check failed; treating as not a duplicate");
            }
        }

        // 6) Freshness filter.
        if !self
            .freshness
            .is_fresh(payload.kind, payload.published_at, now)
        {
            return ProcessOutcome::skip(SkipReason::ContentTooOld).with_details(json!({
                "published_at": payload.published_at,
                "max_age_secs": self.freshness.max_age_secs,
            }));
        }

        // 7) Optional classification; refines the recorded kind, never
        //    gates the decision.
        let mut kind = payload.kind;
        if let Some(classifier) = &self.classifier {
            match classifier.classify(payload).await {
                Ok(c) => kind = c.kind,
                Err(e) => warn!(content_id, error = ?e, "classifier failed; keeping reported kind"),
            }
        }

        // 8) Persist: new record in its derived lifecycle state, or upgrade
        //    the existing record's source and bump last_updated.
        let state = derive_state(payload, now);
        let persisted = match &existing {
            None => {
                let record = ContentRecord::new(content_id, source, kind, state, now)
                    .with_payload(payload);
                self.store.add(record).await
            }
            Some(record) => {
                let mut update = {
                    let priority = self.priority.read().expect("priority rwlock poisoned");
                    source_upgrade(record, source, &priority, now)
                };
                update.state = Some(state);
                self.store.update(content_id, update).await
            }
        };
        if let Err(e) = persisted {
            warn!(content_id, error = ?e, "content store write failed");
            return ProcessOutcome::error(SkipReason::ProcessingError)
                .with_details(json!({"error": e.to_string()}));
        }

        // 9) Pre-announce race guard: somebody else may have announced this
        //    content between our checks and now. Mark the fingerprint so the
        //    next sighting short-circuits at step 5.
        match self.delivery.recently_announced(&fingerprint).await {
            Ok(true) => {
                self.counters
                    .duplicates_skipped
                    .fetch_add(1, Ordering::Relaxed);
                counter!("arbiter_duplicates_skipped_total").increment(1);
                if let Err(e) = self.fingerprints.mark_seen(&fingerprint).await {
                    warn!(content_id, error = ?e, "fingerprint mark_seen failed");
                }
                return ProcessOutcome::skip(SkipReason::RecentExternalAnnouncement)
                    .with_details(json!({"fingerprint": fingerprint}));
            }
            Ok(false) => {}
            Err(e) => {
                warn!(content_id, error = ?e, "recent-announcement probe failed; proceeding");
            }
        }

        // 10) Delivery.
        let mut announce = AnnouncePayload::from_payload(content_id, source, payload);
        announce.kind = kind;

        match self.delivery.announce(&announce).await {
            Ok(outcome) if outcome.success => {
                self.finalize(content_id, Some(&fingerprint)).await;
                counter!("arbiter_announced_total").increment(1);
                ProcessOutcome::announced(json!({
                    "source": source,
                    "channel_id": outcome.channel_id,
                    "message_id": outcome.message_id,
                    "fingerprint": fingerprint,
                }))
            }
            Ok(outcome) if outcome.skipped => {
                // Collaborator asked to try again later; the record stays
                // open for a future, possibly higher-priority, attempt.
                ProcessOutcome::skip(SkipReason::DeliverySkipped)
                    .with_details(json!({"reason": outcome.reason}))
            }
            Ok(outcome) => {
                // Permanent failure: finalize anyway so a broken item cannot
                // become a retry storm.
                self.finalize(content_id, None).await;
                ProcessOutcome::error(SkipReason::DeliveryFailed)
                    .with_details(json!({"reason": outcome.reason}))
            }
            Err(e) => {
                warn!(content_id, error = ?e, "delivery collaborator failed");
                self.finalize(content_id, None).await;
                ProcessOutcome::error(SkipReason::DeliveryFailed)
                    .with_details(json!({"error": e.to_string()}))
            }
        }
    }

    /// Mark the record announced and, when the announcement actually went
    /// out, record its fingerprint.
    async fn finalize(&self, content_id: &str, fingerprint: Option<&str>) {
        if let Err(e) = self.store.mark_announced(content_id).await {
            warn!(content_id, error = ?e, "mark_announced failed");
        }
        if let Some(fp) = fingerprint {
            if let Err(e) = self.fingerprints.mark_seen(fp).await {
                warn!(content_id, error = ?e, "fingerprint mark_seen failed");
            }
        }
    }

    fn note_error(&self, outcome: ProcessOutcome) -> ProcessOutcome {
        self.counters
            .processing_errors
            .fetch_add(1, Ordering::Relaxed);
        counter!("arbiter_processing_errors_total").increment(1);
        outcome
    }

    pub fn get_stats(&self) -> ArbiterStats {
        let priority = self.priority.read().expect("priority rwlock poisoned");
        ArbiterStats {
            total_processed: self.counters.total_processed.load(Ordering::Relaxed),
            duplicates_skipped: self.counters.duplicates_skipped.load(Ordering::Relaxed),
            race_conditions_prevented: self
                .counters
                .race_conditions_prevented
                .load(Ordering::Relaxed),
            source_priority_skips: self.counters.source_priority_skips.load(Ordering::Relaxed),
            processing_errors: self.counters.processing_errors.load(Ordering::Relaxed),
            lock_timeouts: self.inflight.timeouts(),
            active_processing: self.inflight.len(),
            source_priority: priority.order().to_vec(),
            lock_timeout_ms: self.lock_timeout.as_millis() as u64,
        }
    }

    /// Drop all in-flight locks; returns the count cleared. Operational
    /// recovery only.
    pub fn force_clear_queue(&self, reason: &str) -> usize {
        let cleared = self.inflight.clear_all();
        warn!(reason, cleared, "force-cleared in-flight processing queue");
        gauge!("arbiter_active_processing").set(0.0);
        cleared
    }

    /// Replace the trust order at runtime. Rejects an empty order.
    pub fn update_source_priority(&self, order: Vec<String>) -> anyhow::Result<()> {
        let new = SourcePriority::new(order)
            .ok_or_else(|| anyhow::anyhow!("source priority order must be a non-empty list"))?;
        let mut priority = self.priority.write().expect("priority rwlock poisoned");
        *priority = new;
        Ok(())
    }
}
