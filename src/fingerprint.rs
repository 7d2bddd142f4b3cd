//! # Duplicate Fingerprints
//!
//! Derives a stable identity key for a content sighting so the same
//! real-world item reported under different ids (reposts, mirrors, retweets
//! of one original) is announced only once.
//!
//! Two derivations, selected at construction time rather than probed at call
//! time:
//! - [`UrlFingerprinter`] — canonicalized URL; the default.
//! - [`RichFingerprinter`] — sha256 over platform + normalized text + author,
//!   for platforms where URLs are not stable identity.
//!
//! The store is append-only within the dedup retention window: written after
//! a successful announcement, read before every arbitration decision.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::content::ContentPayload;

/// Derives the dedup key for a payload. Falls back to the content id when a
/// payload carries nothing usable.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, content_id: &str, payload: &ContentPayload) -> String;
}

/// Canonical-URL fingerprint: lowercase scheme/host, strip fragments and
/// tracking query parameters, trim trailing slashes.
#[derive(Debug, Default, Clone)]
pub struct UrlFingerprinter;

impl Fingerprinter for UrlFingerprinter {
    fn fingerprint(&self, content_id: &str, payload: &ContentPayload) -> String {
        match payload.url.as_deref() {
            Some(url) if !url.trim().is_empty() => format!("url:{}", canonicalize_url(url)),
            _ => format!("id:{content_id}"),
        }
    }
}

/// Content-hash fingerprint for unstable-URL platforms. A retweet and its
/// original collapse to one key because the hash covers the original author
/// and text, not the reposting account.
#[derive(Debug, Clone)]
pub struct RichFingerprinter {
    platform: String,
}

impl RichFingerprinter {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

impl Fingerprinter for RichFingerprinter {
    fn fingerprint(&self, content_id: &str, payload: &ContentPayload) -> String {
        let text = payload.text.as_deref().unwrap_or("");
        let author = payload.author.as_deref().unwrap_or("");
        if text.is_empty() && author.is_empty() {
            // Nothing content-shaped to hash; degrade to the URL derivation.
            return UrlFingerprinter.fingerprint(content_id, payload);
        }

        let mut hasher = Sha256::new();
        hasher.update(self.platform.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(normalize_text(text).as_bytes());
        hasher.update(b"\x1f");
        hasher.update(author.trim().to_ascii_lowercase().as_bytes());
        format!("sha256:{:x}", hasher.finalize())
    }
}

/// Normalize text before hashing: decode HTML entities, strip tags, unify
/// quotes, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_ascii_lowercase();

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

fn canonicalize_url(url: &str) -> String {
    let url = url.trim();

    // Split off the fragment first; it never carries identity.
    let url = url.split('#').next().unwrap_or(url);

    let (base, query) = match url.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (url, None),
    };

    // Lowercase scheme and host, leave the path's case alone.
    let base = match base.find("://") {
        Some(idx) => {
            let scheme = base[..idx].to_ascii_lowercase();
            let rest = &base[idx + 3..];
            let (host, path) = match rest.find('/') {
                Some(p) => (&rest[..p], &rest[p..]),
                None => (rest, ""),
            };
            format!("{scheme}://{}{}", host.to_ascii_lowercase(), path)
        }
        None => base.to_string(),
    };
    let base = base.trim_end_matches('/').to_string();

    // Keep only query parameters that contribute identity (video ids, post
    // ids); drop tracking noise like utm_* / fbclid / ref.
    let kept: Vec<&str> = query
        .map(|q| {
            q.split('&')
                .filter(|kv| {
                    let key = kv.split('=').next().unwrap_or("");
                    let key = key.to_ascii_lowercase();
                    !(key.starts_with("utm_")
                        || key == "fbclid"
                        || key == "gclid"
                        || key == "ref"
                        || key == "si"
                        || key == "feature"
                        || key.is_empty())
                })
                .collect()
        })
        .unwrap_or_default();

    if kept.is_empty() {
        base
    } else {
        let mut kept = kept;
        kept.sort_unstable();
        format!("{base}?{}", kept.join("&"))
    }
}

/// Append-only seen-set consulted before every arbitration decision.
#[async_trait::async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn is_duplicate(&self, fingerprint: &str) -> Result<bool>;
    async fn mark_seen(&self, fingerprint: &str) -> Result<()>;
}

/// In-memory fingerprint store; process-local, grows monotonically within
/// the dedup retention window.
#[derive(Debug, Default)]
pub struct MemoryFingerprintStore {
    seen: Mutex<HashSet<String>>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FingerprintStore for MemoryFingerprintStore {
    async fn is_duplicate(&self, fingerprint: &str) -> Result<bool> {
        Ok(self
            .seen
            .lock()
            .expect("fingerprint mutex poisoned")
            .contains(fingerprint))
    }

    async fn mark_seen(&self, fingerprint: &str) -> Result<()> {
        self.seen
            .lock()
            .expect("fingerprint mutex poisoned")
            .insert(fingerprint.to_string());
        Ok(())
    }
}
