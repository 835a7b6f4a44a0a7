// SPDX-License-Identifier: AGPL-3.0-or-later
// TesseraDB - Tiered Learned Index Engine
// Copyright (C) 2026 Tessera Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Hybrid two-tier learned index.
//!
//! ## Problem
//!
//! A learned base structure answers point lookups in near-constant time but
//! absorbs inserts poorly; a tree absorbs inserts well but pays O(log n) on
//! every read. Rebuilding the learned structure inline would stall writers
//! for the whole rebuild.
//!
//! ## Solution
//!
//! Run both, rotated:
//!
//! ```text
//! Insert ──► delta[rw] (write-optimized)          Lookup ──► delta[rw]
//!               │ trigger: rw_size ≥ ratio × total     │ miss ▼
//!               ▼                                      delta[ro]
//!        role swap rw ↔ ro                             │ miss ▼
//!               │                                      base[r]
//!               ▼
//!        migrator drains delta[ro] ──► base[w] ── swap r ↔ w ──► base[w']
//!               │
//!               ▼
//!        clear delta[ro]
//! ```
//!
//! Two delta instances and two base instances rotate through the roles, so
//! foreground inserts and lookups keep running while the background migrator
//! converges both base instances to the same contents. A key that was ever
//! visible stays visible through every phase: it is in the read-only delta
//! until both base drains complete, and only then is the delta cleared.
//!
//! The foreground stall at initiation is bounded by a handful of atomic
//! stores and an index flip, all performed under the delta exclusive lock the
//! inserter already holds.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::base_index::BaseIndex;
use crate::config::HybridConfig;
use crate::delta_index::DeltaIndex;
use crate::error::{IndexError, Result};
use crate::key::{KeyValue, NOT_FOUND};
use crate::migrator::{self, MigrationSignal};

/// Counters kept by the hybrid. Relaxed atomics: observability, not
/// synchronization.
#[derive(Debug, Default)]
pub struct HybridStats {
    pub lookups: AtomicU64,
    pub inserts: AtomicU64,
    pub range_queries: AtomicU64,
    pub migrations_started: AtomicU64,
    pub migrations_completed: AtomicU64,
    pub migrations_aborted: AtomicU64,
    pub keys_migrated: AtomicU64,
}

/// Point-in-time copy of [`HybridStats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub lookups: u64,
    pub inserts: u64,
    pub range_queries: u64,
    pub migrations_started: u64,
    pub migrations_completed: u64,
    pub migrations_aborted: u64,
    pub keys_migrated: u64,
}

impl HybridStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            range_queries: self.range_queries.load(Ordering::Relaxed),
            migrations_started: self.migrations_started.load(Ordering::Relaxed),
            migrations_completed: self.migrations_completed.load(Ordering::Relaxed),
            migrations_aborted: self.migrations_aborted.load(Ordering::Relaxed),
            keys_migrated: self.keys_migrated.load(Ordering::Relaxed),
        }
    }
}

/// The two delta instances and the index of the one currently absorbing
/// writes. Owned storage behind one lock: a role swap flips `rw` in place,
/// so no half-swapped state is ever observable and nothing moves in memory.
pub(crate) struct DeltaPair {
    pub(crate) slots: [DeltaIndex; 2],
    pub(crate) rw: usize,
}

impl DeltaPair {
    pub(crate) fn rw(&self) -> &DeltaIndex {
        &self.slots[self.rw]
    }

    pub(crate) fn rw_mut(&mut self) -> &mut DeltaIndex {
        &mut self.slots[self.rw]
    }

    pub(crate) fn ro(&self) -> &DeltaIndex {
        &self.slots[1 - self.rw]
    }

    pub(crate) fn ro_index(&self) -> usize {
        1 - self.rw
    }
}

/// State shared between the foreground paths and the migrator worker.
pub(crate) struct HybridCore {
    pub(crate) config: HybridConfig,

    /// Delta pair. Exclusive for inserts and the migrator's clear; shared for
    /// lookups, range folds, and the migrator's snapshot.
    pub(crate) deltas: RwLock<DeltaPair>,

    /// Base instances, independently locked so draining one never blocks
    /// readers of the other.
    pub(crate) bases: [RwLock<BaseIndex>; 2],
    /// Which base slot currently serves reads.
    pub(crate) base_r: AtomicUsize,

    /// Distinct keys ever inserted plus the initial load.
    pub(crate) total_size: AtomicU64,
    /// Live counts in the read-write / read-only deltas.
    pub(crate) rw_size: AtomicU64,
    pub(crate) ro_size: AtomicU64,

    pub(crate) migration_in_progress: AtomicBool,
    /// When false, foreground inserts and delta lookups spin-yield.
    pub(crate) fg_admit: AtomicBool,
    /// When false, readers must not consult the reader base slot.
    pub(crate) base_readable: AtomicBool,
    /// Tells a running migration to abort; set at teardown.
    pub(crate) cancel: AtomicBool,

    /// Held by the migrator for its whole run, and briefly by an inserter
    /// re-checking the trigger.
    pub(crate) migration_mutex: Mutex<()>,

    pub(crate) stats: HybridStats,
}

impl HybridCore {
    fn new(config: HybridConfig) -> Self {
        let delta = |c: &HybridConfig| {
            DeltaIndex::new(c.delta_epsilon, c.delta_staging_limit, c.search)
        };
        let base = |c: &HybridConfig| {
            BaseIndex::new(c.base_epsilon, c.base_merge_threshold, c.search)
        };
        Self {
            deltas: RwLock::new(DeltaPair {
                slots: [delta(&config), delta(&config)],
                rw: 0,
            }),
            bases: [RwLock::new(base(&config)), RwLock::new(base(&config))],
            base_r: AtomicUsize::new(0),
            total_size: AtomicU64::new(0),
            rw_size: AtomicU64::new(0),
            ro_size: AtomicU64::new(0),
            migration_in_progress: AtomicBool::new(false),
            fg_admit: AtomicBool::new(true),
            base_readable: AtomicBool::new(true),
            cancel: AtomicBool::new(false),
            migration_mutex: Mutex::new(()),
            stats: HybridStats::default(),
            config,
        }
    }

    pub(crate) fn spin_until(flag: &AtomicBool) {
        while !flag.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
    }

    fn base_lookup(&self, key: u64) -> Option<u64> {
        Self::spin_until(&self.base_readable);
        let idx = self.base_r.load(Ordering::Acquire);
        self.bases[idx].read().lookup(key)
    }
}

/// The hybrid index. Shareable across threads behind an `Arc`; every method
/// takes `&self`.
pub struct HybridIndex {
    core: Arc<HybridCore>,
    migrate_tx: Option<Sender<MigrationSignal>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HybridIndex {
    /// Create an empty hybrid with a long-lived migrator worker.
    pub fn new(config: HybridConfig) -> Result<Self> {
        config.validate()?;
        let core = Arc::new(HybridCore::new(config));
        // One slot is enough: the in-progress flag guarantees at most one
        // outstanding signal.
        let (tx, rx) = bounded::<MigrationSignal>(1);
        let worker = migrator::spawn(Arc::clone(&core), rx);
        Ok(Self {
            core,
            migrate_tx: Some(tx),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(HybridConfig::default())
    }

    /// Bulk-load sorted, unique data into **both** base instances so the
    /// roles can swap freely from the first migration on. Returns the
    /// combined load time in nanoseconds.
    pub fn build(&self, data: &[KeyValue], _num_threads: usize) -> Result<u64> {
        for (i, pair) in data.windows(2).enumerate() {
            if pair[0].key > pair[1].key {
                return Err(IndexError::UnsortedBulkLoad { index: i + 1 });
            }
            if pair[0].key == pair[1].key {
                return Err(IndexError::DuplicateBulkKey { key: pair[0].key });
            }
        }

        let start = Instant::now();
        self.core.bases[0].write().bulk_load(data);
        let first = start.elapsed().as_nanos() as u64;

        let start = Instant::now();
        self.core.bases[1].write().bulk_load(data);
        let second = start.elapsed().as_nanos() as u64;

        self.core
            .total_size
            .store(data.len() as u64, Ordering::Release);
        tracing::info!(keys = data.len(), "bulk load complete");
        Ok(first + second)
    }

    /// Point lookup: read-write delta, then read-only delta, then the reader
    /// base. The first hit wins, which resolves a duplicated key in favor of
    /// its newest value.
    pub fn lookup(&self, key: u64) -> Option<u64> {
        let core = &*self.core;
        core.stats.lookups.fetch_add(1, Ordering::Relaxed);

        // Fast path: both deltas empty, serve straight from the base. The
        // initiation sequence stores ro_size before zeroing rw_size, so a
        // reader that observes rw_size == 0 also observes the carried
        // ro_size and never sees a phantom (0, 0).
        if core.rw_size.load(Ordering::Acquire) == 0
            && core.ro_size.load(Ordering::Acquire) == 0
        {
            return core.base_lookup(key);
        }

        HybridCore::spin_until(&core.fg_admit);
        {
            let pair = core.deltas.read();
            if let Some(value) = pair.rw().lookup(key) {
                return Some(value);
            }
            if let Some(value) = pair.ro().lookup(key) {
                return Some(value);
            }
        }
        core.base_lookup(key)
    }

    /// Harness-convention lookup: `NOT_FOUND` on miss.
    pub fn equality_lookup(&self, key: u64, _thread_id: u32) -> u64 {
        self.lookup(key).unwrap_or(NOT_FOUND)
    }

    /// Sum of values over keys in `[lo, hi]` present in the read-write
    /// delta. The base tier is deliberately not consulted; see DESIGN.md.
    pub fn range_query(&self, lo: u64, hi: u64, _thread_id: u32) -> u64 {
        self.core.stats.range_queries.fetch_add(1, Ordering::Relaxed);
        let pair = self.core.deltas.read();
        pair.rw().range_sum(lo, hi)
    }

    /// Point insert. May initiate a migration when the write delta crosses
    /// its share of the total population.
    pub fn insert(&self, kv: KeyValue, _thread_id: u32) {
        let core = &*self.core;
        HybridCore::spin_until(&core.fg_admit);

        let mut pair = core.deltas.write();
        pair.rw_mut().insert(kv.key, kv.value);
        let new_rw = core.rw_size.fetch_add(1, Ordering::AcqRel) + 1;
        let new_total = core.total_size.fetch_add(1, Ordering::AcqRel) + 1;
        core.stats.inserts.fetch_add(1, Ordering::Relaxed);

        if new_rw as f64 >= core.config.migration_ratio * new_total as f64
            && !core.migration_in_progress.load(Ordering::Acquire)
        {
            // Double-checked initiation. Taking the migration mutex while
            // holding the delta lock cannot invert against the worker: the
            // worker only touches the delta pair while migration_in_progress
            // is set, and this path only reaches for the mutex while it is
            // clear.
            let _trigger_guard = core.migration_mutex.lock();
            if !core.migration_in_progress.load(Ordering::Acquire) {
                self.initiate_migration(&mut pair);
            }
        }
    }

    /// Total in-memory footprint of all four sub-indexes.
    pub fn size_bytes(&self) -> usize {
        let pair = self.core.deltas.read();
        let b0 = self.core.bases[0].read();
        let b1 = self.core.bases[1].read();
        pair.slots[0].size_bytes() + pair.slots[1].size_bytes() + b0.size_bytes() + b1.size_bytes()
    }

    /// Distinct keys ever inserted plus the initial load.
    pub fn total_keys(&self) -> u64 {
        self.core.total_size.load(Ordering::Acquire)
    }

    /// Stable identifier; the suffix encodes the migration ratio.
    pub fn name(&self) -> String {
        format!("TesseraHybrid_{}", self.core.config.migration_ratio)
    }

    /// The hybrid only serves unique-key workloads, and a configuration
    /// using the vectorized scan primitive is excluded outright.
    pub fn applicable(
        &self,
        unique: bool,
        _range_query: bool,
        _insert: bool,
        _multithread: bool,
        _ops_filename: &str,
    ) -> bool {
        unique && self.core.config.search.name() != "LinearSimd"
    }

    pub fn variants(&self) -> Vec<String> {
        Vec::new()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.core.stats.snapshot()
    }

    pub fn config(&self) -> &HybridConfig {
        &self.core.config
    }

    /// True between initiation and completion of a migration.
    pub fn migration_in_progress(&self) -> bool {
        self.core.migration_in_progress.load(Ordering::Acquire)
    }

    /// Role swap and worker hand-off. Runs with the delta exclusive lock
    /// held, so the stall other threads observe is four atomic stores and an
    /// index flip.
    fn initiate_migration(&self, pair: &mut DeltaPair) {
        let core = &*self.core;

        core.migration_in_progress.store(true, Ordering::Release);
        core.stats.migrations_started.fetch_add(1, Ordering::Relaxed);

        core.fg_admit.store(false, Ordering::Release);
        pair.rw = 1 - pair.rw;
        // Order matters for the lookup fast path: carry ro_size before
        // zeroing rw_size.
        core.ro_size
            .store(core.rw_size.load(Ordering::Acquire), Ordering::Release);
        core.rw_size.store(0, Ordering::Release);
        core.fg_admit.store(true, Ordering::Release);

        tracing::debug!(
            ro_keys = core.ro_size.load(Ordering::Relaxed),
            "migration initiated"
        );

        if let Some(tx) = &self.migrate_tx {
            if tx.try_send(MigrationSignal::Drain).is_err() {
                // Worker gone: only happens during teardown.
                tracing::warn!(
                    error = %IndexError::WorkerUnavailable,
                    "migration signal dropped"
                );
                core.migration_in_progress.store(false, Ordering::Release);
            }
        }
    }
}

impl Drop for HybridIndex {
    fn drop(&mut self) {
        self.core.cancel.store(true, Ordering::Release);
        // Closing the channel wakes an idle worker; the cancel flag stops a
        // draining one between entries.
        self.migrate_tx.take();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HybridConfig;

    /// Ratio high enough that small tests never trigger a migration.
    fn quiet_config() -> HybridConfig {
        HybridConfig {
            migration_ratio: 0.9,
            ..Default::default()
        }
    }

    fn data(n: u64) -> Vec<KeyValue> {
        (0..n).map(|i| KeyValue::new(i * 10, i * 100)).collect()
    }

    #[test]
    fn test_build_and_lookup() {
        let index = HybridIndex::new(quiet_config()).unwrap();
        let ns = index.build(&data(1000), 1).unwrap();
        assert!(ns > 0);
        assert_eq!(index.total_keys(), 1000);
        assert_eq!(index.lookup(500), Some(5000));
        assert_eq!(index.lookup(505), None);
        assert_eq!(index.equality_lookup(505, 0), NOT_FOUND);
    }

    #[test]
    fn test_build_rejects_unsorted() {
        let index = HybridIndex::new(quiet_config()).unwrap();
        let bad = vec![KeyValue::new(5, 0), KeyValue::new(3, 0)];
        assert!(matches!(
            index.build(&bad, 1),
            Err(IndexError::UnsortedBulkLoad { index: 1 })
        ));
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let index = HybridIndex::new(quiet_config()).unwrap();
        let bad = vec![KeyValue::new(3, 0), KeyValue::new(3, 1)];
        assert!(matches!(
            index.build(&bad, 1),
            Err(IndexError::DuplicateBulkKey { key: 3 })
        ));
    }

    #[test]
    fn test_insert_visible_immediately() {
        let index = HybridIndex::new(quiet_config()).unwrap();
        index.build(&data(100), 1).unwrap();
        index.insert(KeyValue::new(5, 55), 0);
        assert_eq!(index.lookup(5), Some(55));
        assert_eq!(index.total_keys(), 101);
    }

    #[test]
    fn test_delta_shadows_base() {
        let index = HybridIndex::new(quiet_config()).unwrap();
        index.build(&data(100), 1).unwrap();
        // Key 10 is bulk-loaded with value 100; overwrite via the delta.
        index.insert(KeyValue::new(10, 7), 0);
        assert_eq!(index.lookup(10), Some(7));
    }

    #[test]
    fn test_range_query_folds_write_delta_only() {
        let index = HybridIndex::new(quiet_config()).unwrap();
        index.build(&data(100), 1).unwrap();
        assert_eq!(index.range_query(0, 990, 0), 0, "base keys are not folded");
        index.insert(KeyValue::new(15, 3), 0);
        index.insert(KeyValue::new(25, 4), 0);
        index.insert(KeyValue::new(9999, 9), 0);
        assert_eq!(index.range_query(10, 30, 0), 7);
        assert_eq!(index.range_query(0, u64::MAX, 0), 16);
    }

    #[test]
    fn test_name_encodes_ratio() {
        let index = HybridIndex::with_defaults().unwrap();
        assert_eq!(index.name(), "TesseraHybrid_0.002");
    }

    #[test]
    fn test_applicability() {
        let index = HybridIndex::with_defaults().unwrap();
        assert!(index.applicable(true, true, true, true, "ops"));
        assert!(!index.applicable(false, true, true, true, "ops"));

        let simd = HybridIndex::new(HybridConfig {
            search: crate::search::SearchPrimitive::LinearSimd,
            ..quiet_config()
        })
        .unwrap();
        assert!(!simd.applicable(true, true, true, true, "ops"));
        assert!(simd.variants().is_empty());
    }

    #[test]
    fn test_size_bytes_counts_all_four() {
        let index = HybridIndex::new(quiet_config()).unwrap();
        let empty = index.size_bytes();
        index.build(&data(10_000), 1).unwrap();
        let built = index.size_bytes();
        // Both bases carry the load.
        assert!(built >= empty + 2 * 10_000 * std::mem::size_of::<KeyValue>());
        index.insert(KeyValue::new(3, 3), 0);
        assert!(index.size_bytes() > built);
    }

    #[test]
    fn test_trigger_initiates_migration() {
        let config = HybridConfig {
            migration_ratio: 0.002,
            ..Default::default()
        };
        let index = HybridIndex::new(config).unwrap();
        index.build(&data(10_000), 1).unwrap();

        // 0.002 × 10_021 ≈ 20, so 21 fresh inserts cross the trigger.
        for i in 0..21u64 {
            index.insert(KeyValue::new(1_000_000 + i, i), 0);
        }

        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        while index.stats().migrations_completed == 0 {
            assert!(Instant::now() < deadline, "migration never completed");
            std::thread::yield_now();
        }

        // Every key stays visible after the drain.
        for i in 0..21u64 {
            assert_eq!(index.lookup(1_000_000 + i), Some(i));
        }
        assert_eq!(index.lookup(500), Some(5000));
        let stats = index.stats();
        assert_eq!(stats.migrations_started, 1);
        assert!(stats.keys_migrated >= 21);
    }

    #[test]
    fn test_drop_without_activity_is_clean() {
        let index = HybridIndex::with_defaults().unwrap();
        drop(index);
    }
}
