// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod arbiter;
pub mod classify;
pub mod config;
pub mod content;
pub mod deliver;
pub mod fingerprint;
pub mod freshness;
pub mod lifecycle;
pub mod metrics;
pub mod source_priority;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::arbiter::{Arbiter, ArbiterStats};
pub use crate::content::{Action, ContentKind, ContentPayload, ContentRecord, ProcessOutcome, SkipReason};
pub use crate::deliver::{AnnouncePayload, DeliveryCollaborator, DeliveryOutcome};
pub use crate::fingerprint::{FingerprintStore, Fingerprinter};
pub use crate::lifecycle::LifecycleState;
pub use crate::source_priority::SourcePriority;
pub use crate::store::ContentStore;

// Convenient router access: `content_arbiter::api::create_router` or `content_arbiter::router`
pub use crate::api::create_router as router;
