//! # Lifecycle State Machine
//! Pure, testable logic that maps producer hints → lifecycle state.
//! No I/O and no internal memory: re-evaluating on every sighting is
//! idempotent and order-independent given the same hints.
//!
//! Progression: scheduled → live → published/ended (terminal). A scheduled
//! item that never reports "live" ages out via the freshness filter rather
//! than through an explicit transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{ContentKind, ContentPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Scheduled,
    Live,
    Published,
    Ended,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Published | LifecycleState::Ended)
    }
}

/// Derive the lifecycle state for a sighting. Hint order: an explicit state
/// wins; then `is_live`; then `scheduled_start` vs. `now`; else published.
pub fn derive_state(payload: &ContentPayload, now: DateTime<Utc>) -> LifecycleState {
    if let Some(state) = payload.state {
        return state;
    }

    match payload.is_live {
        Some(true) => return LifecycleState::Live,
        Some(false) => {
            // Explicitly not live: a stream that was scheduled in the past
            // has ended; anything else is plain published content.
            if let Some(start) = payload.scheduled_start {
                return if start > now {
                    LifecycleState::Scheduled
                } else {
                    LifecycleState::Ended
                };
            }
            return LifecycleState::Published;
        }
        None => {}
    }

    if let Some(start) = payload.scheduled_start {
        return if start > now {
            LifecycleState::Scheduled
        } else {
            LifecycleState::Live
        };
    }

    // No hints at all: streams without hints are assumed live, everything
    // else is already published.
    match payload.kind {
        ContentKind::Livestream => LifecycleState::Live,
        _ => LifecycleState::Published,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn payload() -> ContentPayload {
        ContentPayload::default()
    }

    #[test]
    fn explicit_state_wins_over_all_hints() {
        let mut p = payload();
        p.state = Some(LifecycleState::Ended);
        p.is_live = Some(true);
        p.scheduled_start = Some(Utc::now() + Duration::hours(1));
        assert_eq!(derive_state(&p, Utc::now()), LifecycleState::Ended);
    }

    #[test]
    fn is_live_true_yields_live() {
        let mut p = payload();
        p.is_live = Some(true);
        assert_eq!(derive_state(&p, Utc::now()), LifecycleState::Live);
    }

    #[test]
    fn future_scheduled_start_yields_scheduled() {
        let now = Utc::now();
        let mut p = payload();
        p.scheduled_start = Some(now + Duration::minutes(30));
        assert_eq!(derive_state(&p, now), LifecycleState::Scheduled);
    }

    #[test]
    fn past_scheduled_start_without_live_flag_yields_live() {
        let now = Utc::now();
        let mut p = payload();
        p.scheduled_start = Some(now - Duration::minutes(5));
        assert_eq!(derive_state(&p, now), LifecycleState::Live);
    }

    #[test]
    fn not_live_with_past_schedule_yields_ended() {
        let now = Utc::now();
        let mut p = payload();
        p.is_live = Some(false);
        p.scheduled_start = Some(now - Duration::hours(2));
        assert_eq!(derive_state(&p, now), LifecycleState::Ended);
    }

    #[test]
    fn bare_post_defaults_to_published() {
        let mut p = payload();
        p.kind = ContentKind::Post;
        assert_eq!(derive_state(&p, Utc::now()), LifecycleState::Published);
    }

    #[test]
    fn terminal_states_are_published_and_ended() {
        assert!(LifecycleState::Published.is_terminal());
        assert!(LifecycleState::Ended.is_terminal());
        assert!(!LifecycleState::Scheduled.is_terminal());
        assert!(!LifecycleState::Live.is_terminal());
    }

    #[test]
    fn derivation_is_idempotent() {
        let now = Utc::now();
        let mut p = payload();
        p.kind = ContentKind::Livestream;
        p.scheduled_start = Some(now - Duration::minutes(1));
        let a = derive_state(&p, now);
        let b = derive_state(&p, now);
        assert_eq!(a, b);
    }
}
