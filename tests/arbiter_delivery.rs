// tests/arbiter_delivery.rs
//
// Delivery-edge behavior:
// - a failing collaborator finalizes the record (no retry storms)
// - an explicit `skipped` leaves the record open
// - fingerprint dedup across different ids for the same content
// - the pre-announce race guard and its fingerprint write
// - a broken fingerprint store never suppresses legitimate content

mod support;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use content_arbiter::content::{Action, SkipReason};
use content_arbiter::fingerprint::FingerprintStore;
use content_arbiter::store::MemoryContentStore;
use support::{arbiter_with, video_payload, MockDelivery, Mode};

#[tokio::test]
async fn transport_failure_finalizes_record() {
    let delivery = Arc::new(MockDelivery::failing());
    let arbiter = arbiter_with(delivery.clone());
    let payload = video_payload("https://example.com/v/broken");

    let first = arbiter.process("broken", "webhook", &payload).await;
    assert_eq!(first.action, Action::Error);
    assert_eq!(first.reason, Some(SkipReason::DeliveryFailed));

    // No endless retries: the id is decided, later sightings are skipped.
    let second = arbiter.process("broken", "webhook", &payload).await;
    assert_eq!(second.reason, Some(SkipReason::AlreadyAnnounced));
    assert_eq!(delivery.call_count(), 1);

    let stats = arbiter.get_stats();
    assert_eq!(stats.processing_errors, 1);
}

#[tokio::test]
async fn rejection_without_skip_also_finalizes() {
    let delivery = Arc::new(MockDelivery::rejecting());
    let arbiter = arbiter_with(delivery.clone());
    let payload = video_payload("https://example.com/v/rejected");

    let first = arbiter.process("rejected", "api", &payload).await;
    assert_eq!(first.reason, Some(SkipReason::DeliveryFailed));

    let second = arbiter.process("rejected", "api", &payload).await;
    assert_eq!(second.reason, Some(SkipReason::AlreadyAnnounced));
}

#[tokio::test]
async fn explicit_skip_leaves_record_open() {
    let delivery = Arc::new(MockDelivery::with_script(vec![Mode::Skip, Mode::Ok]));
    let arbiter = arbiter_with(delivery.clone());
    let payload = video_payload("https://example.com/v/busy");

    let first = arbiter.process("busy", "api", &payload).await;
    assert_eq!(first.action, Action::Skip);
    assert_eq!(first.reason, Some(SkipReason::DeliverySkipped));

    // The record stayed open; the retry announces.
    let second = arbiter.process("busy", "api", &payload).await;
    assert!(second.is_announced());
    assert_eq!(delivery.call_count(), 2);
}

#[tokio::test]
async fn same_content_under_two_ids_is_deduplicated() {
    let delivery = Arc::new(MockDelivery::ok());
    let arbiter = arbiter_with(delivery.clone());

    // Mirror/repost: different producer ids, same canonical URL.
    let payload = video_payload("https://example.com/v/shared?utm_source=feed");
    let mirror = video_payload("https://EXAMPLE.com/v/shared");

    let first = arbiter.process("orig-id", "webhook", &payload).await;
    assert!(first.is_announced());

    let second = arbiter.process("mirror-id", "scraper", &mirror).await;
    assert_eq!(second.reason, Some(SkipReason::DuplicateDetected));
    assert_eq!(delivery.call_count(), 1);
    assert_eq!(arbiter.get_stats().duplicates_skipped, 1);
}

#[tokio::test]
async fn race_guard_skip_marks_fingerprint() {
    let delivery = Arc::new(MockDelivery::ok());
    delivery.set_recent(true);
    let arbiter = arbiter_with(delivery.clone());
    let payload = video_payload("https://example.com/v/guarded");

    let first = arbiter.process("guarded", "webhook", &payload).await;
    assert_eq!(first.reason, Some(SkipReason::RecentExternalAnnouncement));
    assert_eq!(delivery.call_count(), 0, "delivery never invoked");

    // Guard skip wrote the fingerprint: a different id for the same URL now
    // short-circuits at the dedup step even with the guard disarmed.
    delivery.set_recent(false);
    let second = arbiter
        .process("guarded-mirror", "webhook", &payload)
        .await;
    assert_eq!(second.reason, Some(SkipReason::DuplicateDetected));
    assert_eq!(delivery.call_count(), 0);
}

struct BrokenFingerprintStore;

#[async_trait::async_trait]
impl FingerprintStore for BrokenFingerprintStore {
    async fn is_duplicate(&self, _fingerprint: &str) -> Result<bool> {
        Err(anyhow!("fingerprint backend down"))
    }

    async fn mark_seen(&self, _fingerprint: &str) -> Result<()> {
        Err(anyhow!("fingerprint backend down"))
    }
}

#[tokio::test]
async fn broken_fingerprint_store_does_not_suppress_content() {
    let delivery = Arc::new(MockDelivery::ok());
    let arbiter = content_arbiter::arbiter::Arbiter::new(
        Arc::new(MemoryContentStore::new()),
        Arc::new(BrokenFingerprintStore),
        delivery.clone(),
    );

    let outcome = arbiter
        .process("resilient", "api", &video_payload("https://example.com/v/r"))
        .await;
    assert!(
        outcome.is_announced(),
        "dedup errors read as not-a-duplicate: {outcome:?}"
    );
    assert_eq!(delivery.call_count(), 1);
}

#[tokio::test]
async fn delivery_details_carry_collaborator_reason() {
    let delivery = Arc::new(MockDelivery::rejecting());
    let arbiter = arbiter_with(delivery);
    let outcome = arbiter
        .process("why", "api", &video_payload("https://example.com/v/why"))
        .await;
    let details = outcome.details.expect("failure details");
    assert_eq!(details["reason"], "channel refused the message");
}
