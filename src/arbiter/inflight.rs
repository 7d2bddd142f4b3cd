//! Single-flight processing locks, keyed by content id.
//!
//! This is a cooperative-scheduling mutex, not an OS lock: the map is only
//! ever locked across map mutations (never across an await), and a lock is
//! installed synchronously before the caller's first await, which closes the
//! interleave window between two `process()` calls for the same id.
//!
//! Each entry carries a watch channel that propagates the holder's final
//! outcome to joiners, and an abortable timer task that force-evicts the
//! entry if the underlying work stalls. Eviction trades single-flight
//! strictness for liveness: a later sighting of a wedged id is not blocked
//! forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::content::ProcessOutcome;

struct Entry {
    generation: u64,
    /// Source of the call that holds this lock; joiners report it.
    source: String,
    rx: watch::Receiver<Option<ProcessOutcome>>,
    timer: JoinHandle<()>,
}

struct Inner {
    map: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
    timeouts: AtomicU64,
}

/// Outcome of trying to acquire the per-id lock.
pub enum Flight {
    /// This caller owns the flight and must settle the guard.
    Holder(FlightGuard),
    /// Another call is already in flight for this id; await its result.
    Joiner {
        rx: watch::Receiver<Option<ProcessOutcome>>,
        winning_source: String,
    },
}

#[derive(Clone)]
pub struct InflightMap {
    inner: Arc<Inner>,
}

impl InflightMap {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                map: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                timeouts: AtomicU64::new(0),
            }),
        }
    }

    /// Acquire or join the lock for `id`. Synchronous on purpose: must run
    /// before the caller's first await.
    pub fn begin(&self, id: &str, source: &str, timeout: Duration) -> Flight {
        let mut map = self.inner.map.lock().expect("inflight mutex poisoned");

        if let Some(entry) = map.get(id) {
            return Flight::Joiner {
                rx: entry.rx.clone(),
                winning_source: entry.source.clone(),
            };
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);

        let timer = tokio::spawn({
            let inner = self.inner.clone();
            let id = id.to_string();
            async move {
                tokio::time::sleep(timeout).await;
                let mut map = inner.map.lock().expect("inflight mutex poisoned");
                if map.get(&id).map(|e| e.generation) == Some(generation) {
                    let entry = map.remove(&id);
                    drop(map);
                    drop(entry);
                    inner.timeouts.fetch_add(1, Ordering::Relaxed);
                    counter!("arbiter_lock_timeouts_total").increment(1);
                    tracing::warn!(content_id = %id, "processing lock evicted by timeout");
                }
            }
        });

        map.insert(
            id.to_string(),
            Entry {
                generation,
                source: source.to_string(),
                rx,
                timer,
            },
        );

        Flight::Holder(FlightGuard {
            inner: self.inner.clone(),
            id: id.to_string(),
            generation,
            tx: Some(tx),
        })
    }

    /// Number of ids currently in flight.
    pub fn len(&self) -> usize {
        self.inner.map.lock().expect("inflight mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total lock-timeout evictions since startup.
    pub fn timeouts(&self) -> u64 {
        self.inner.timeouts.load(Ordering::Relaxed)
    }

    /// Administrative escape hatch: drop every in-flight lock. Holders keep
    /// running and settle into removed entries (a no-op); subsequent calls
    /// for those ids start fresh attempts.
    pub fn clear_all(&self) -> usize {
        let mut map = self.inner.map.lock().expect("inflight mutex poisoned");
        let n = map.len();
        for (_, entry) in map.drain() {
            entry.timer.abort();
        }
        n
    }
}

impl Default for InflightMap {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII side of a held lock. `settle` publishes the outcome to joiners and
/// evicts the entry; dropping without settling (panic, cancellation) evicts
/// the entry and signals joiners that the flight aborted.
pub struct FlightGuard {
    inner: Arc<Inner>,
    id: String,
    generation: u64,
    tx: Option<watch::Sender<Option<ProcessOutcome>>>,
}

impl FlightGuard {
    pub fn settle(mut self, outcome: ProcessOutcome) {
        self.evict();
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(outcome));
        }
    }

    fn evict(&self) {
        let mut map = self.inner.map.lock().expect("inflight mutex poisoned");
        if map.get(&self.id).map(|e| e.generation) == Some(self.generation) {
            if let Some(entry) = map.remove(&self.id) {
                entry.timer.abort();
            }
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.evict();
        // tx (if still present) drops here; joiners observe the abort.
    }
}
