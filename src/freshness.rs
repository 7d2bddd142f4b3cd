//! freshness.rs — Age gate for incoming sightings.
//!
//! Policy, overridable per deployment: an item is fresh when its reported
//! `published_at` is within `max_age` of now AND not older than the floor
//! cutoff (typically process start, so a backfilled feed cannot replay
//! history on restart). Livestreams may be exempted from the age window,
//! since a stream scheduled days ago legitimately goes live late.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::content::ContentKind;

#[derive(Debug, Clone, Deserialize)]
pub struct FreshnessPolicy {
    /// Rolling max-age window in seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: i64,
    /// Items published before this instant are stale regardless of window.
    #[serde(default)]
    pub floor: Option<DateTime<Utc>>,
    /// Skip the age check for livestreams.
    #[serde(default = "default_true")]
    pub ignore_age_for_live: bool,
}

fn default_max_age_secs() -> i64 {
    6 * 3600
}

fn default_true() -> bool {
    true
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            floor: None,
            ignore_age_for_live: true,
        }
    }
}

impl FreshnessPolicy {
    /// Floor at process start: nothing published before boot is announced.
    pub fn since_startup(max_age_secs: i64) -> Self {
        Self {
            max_age_secs,
            floor: Some(Utc::now()),
            ignore_age_for_live: true,
        }
    }

    /// Is a sighting fresh enough to announce? Items without a timestamp are
    /// treated as fresh; producers that cannot date their finds should not
    /// be silenced for it.
    pub fn is_fresh(
        &self,
        kind: ContentKind,
        published_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(ts) = published_at else {
            return true;
        };

        if self.ignore_age_for_live && kind == ContentKind::Livestream {
            return true;
        }

        if let Some(floor) = self.floor {
            if ts < floor {
                return false;
            }
        }

        now.signed_duration_since(ts) <= Duration::seconds(self.max_age_secs)
    }
}
