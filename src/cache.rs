//! Process-wide memoization of projection runs
//!
//! A run is keyed by a fingerprint of the fully resolved assumption set plus the
//! time grid's bounds and cadence. Each fingerprint owns a slot guarded by its own
//! lock, so concurrent callers asking for the same key wait on a single
//! computation while distinct keys compute in parallel. Failed computations
//! leave the slot empty and are retried on the next request.

use crate::assumptions::AssumptionSet;
use crate::error::Result;
use crate::projection::{ProjectionRun, TimeGrid};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, TryLockError};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic identity of an (assumption set, time grid) pair
///
/// Equality is on the canonical text, so two fingerprints match exactly when
/// every assumption value (bit for bit) and the grid bounds and cadence match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    digest: u64,
    canonical: String,
}

impl Fingerprint {
    pub fn of(assumptions: &AssumptionSet, grid: &TimeGrid) -> Self {
        let mut canonical = String::new();
        for (name, value) in assumptions.iter() {
            canonical.push_str(name);
            canonical.push('=');
            canonical.push_str(&format!("{:016x}", value.to_bits()));
            canonical.push(';');
        }
        canonical.push('@');
        canonical.push_str(&grid.canonical());

        let digest = canonical
            .bytes()
            .fold(FNV_OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(FNV_PRIME));

        Self { digest, canonical }
    }

    /// 64-bit FNV-1a digest of the canonical form
    pub fn digest(&self) -> u64 {
        self.digest
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.digest)
    }
}

type Slot = Arc<Mutex<Option<Arc<ProjectionRun>>>>;

/// Memo table of completed runs
#[derive(Debug, Default)]
pub struct ProjectionCache {
    slots: Mutex<HashMap<Fingerprint, Slot>>,

    /// Statistics
    hits: AtomicU64,
    misses: AtomicU64,
}

static GLOBAL: OnceLock<Arc<ProjectionCache>> = OnceLock::new();

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking compute leaves its slot empty, which is still consistent
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProjectionCache {
    /// Create an empty, private cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache shared by every comparator that does not bring its own
    pub fn global() -> Arc<ProjectionCache> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ProjectionCache::new())))
    }

    /// Return the stored run for this (assumptions, grid) pair, computing it at
    /// most once per distinct fingerprint
    pub fn get_or_compute<F>(&self, assumptions: &AssumptionSet, grid: &TimeGrid, compute: F) -> Result<Arc<ProjectionRun>>
    where
        F: FnOnce(&AssumptionSet, &TimeGrid) -> Result<ProjectionRun>,
    {
        let key = Fingerprint::of(assumptions, grid);
        let slot = {
            let mut slots = lock(&self.slots);
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        // Held across the computation: concurrent requests for this key queue here
        let mut entry = lock(&slot);
        if let Some(run) = entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Cache hit for {}", key);
            return Ok(Arc::clone(run));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("Cache miss for {}; computing", key);
        match compute(assumptions, grid) {
            Ok(run) => {
                let run = Arc::new(run);
                *entry = Some(Arc::clone(&run));
                Ok(run)
            }
            Err(e) => {
                drop(entry);
                self.evict_if_empty(&key, &slot);
                Err(e)
            }
        }
    }

    // Only the map and the failed caller hold the slot; queued callers keep it alive
    fn evict_if_empty(&self, key: &Fingerprint, slot: &Slot) {
        let mut slots = lock(&self.slots);
        let orphaned = slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && Arc::strong_count(slot) == 2);
        if orphaned {
            slots.remove(key);
        }
    }

    /// Stored run for a fingerprint, if one has completed
    pub fn get(&self, key: &Fingerprint) -> Option<Arc<ProjectionRun>> {
        let slot = lock(&self.slots).get(key).cloned()?;
        let entry = lock(&slot);
        entry.clone()
    }

    /// Drop every stored run and reset statistics
    pub fn invalidate_all(&self) {
        let mut slots = lock(&self.slots);
        let dropped = slots.len();
        slots.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        log::debug!("Projection cache invalidated ({} entries)", dropped);
    }

    /// Get number of completed entries. Runs still being computed are not counted.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = lock(&self.slots).values().cloned().collect();
        slots
            .iter()
            .filter(|slot| match slot.try_lock() {
                Ok(entry) => entry.is_some(),
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_some(),
                Err(TryLockError::WouldBlock) => false,
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
