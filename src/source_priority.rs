//! # Source Priority
//!
//! A configurable, ordered trust list over producers (e.g. "webhook",
//! "api", "scraper") governing conflict resolution when several producers
//! race to announce the same content id.
//!
//! - Lower rank = more trusted; `rank_of` is a total order.
//! - Case-insensitive lookup with normalization of punctuation and dashes.
//! - Unknown sources are accepted but always sort last.

/// Default trust order: push notifications beat API polling beats scraping.
pub const DEFAULT_ORDER: [&str; 3] = ["webhook", "api", "scraper"];

#[derive(Debug, Clone)]
pub struct SourcePriority {
    /// Ordered list of canonical source names, most trusted first.
    order: Vec<String>,
}

fn default_order() -> Vec<String> {
    DEFAULT_ORDER.iter().map(|s| s.to_string()).collect()
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self {
            order: default_order(),
        }
    }
}

impl SourcePriority {
    /// Build from an explicit order. Returns `None` for an empty list; a
    /// priority table with no entries cannot arbitrate anything.
    pub fn new(order: Vec<String>) -> Option<Self> {
        if order.is_empty() {
            return None;
        }
        Some(Self {
            order: order.into_iter().map(|s| normalize(&s)).collect(),
        })
    }

    /// Rank of a source in the trust order; unknown sources rank after every
    /// configured one.
    pub fn rank_of(&self, source: &str) -> usize {
        let s = normalize(source);
        self.order
            .iter()
            .position(|k| *k == s)
            .unwrap_or(self.order.len())
    }

    /// True when `incoming` is at least as trusted as `existing` (rank ≤).
    /// A lower-trust source must never preempt work already claimed by a
    /// higher-trust one.
    pub fn can_preempt(&self, incoming: &str, existing: &str) -> bool {
        self.rank_of(incoming) <= self.rank_of(existing)
    }

    /// The more trusted of two source names (ties keep the existing one).
    pub fn sturdier<'a>(&self, existing: &'a str, incoming: &'a str) -> &'a str {
        if self.rank_of(incoming) < self.rank_of(existing) {
            incoming
        } else {
            existing
        }
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }
}

/// Normalize a source name: lowercase, separators → spaces, collapse runs.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_ascii_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(['\n', '\r', '\t', '.', ','], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
