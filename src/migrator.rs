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

//! Background migrator.
//!
//! One long-lived worker drains the read-only delta into both base instances
//! and then clears it. The run is a straight-line state machine:
//!
//! ```text
//! Idle ──► Preparing ──► Draining1 ──► Swapping ──► Draining2 ──► Finalizing ──► Idle
//!          snapshot       fill the      flip the      fill the      clear the
//!          delta[ro]      writer base   reader role   other base    delta[ro]
//! ```
//!
//! Visibility through the run: the drained keys stay in the read-only delta
//! until Finalizing, and Finalizing only runs after **both** base instances
//! contain them. A reader can always find a key in at least one tier it is
//! allowed to consult.
//!
//! The worker never acquires a delta or base lock after clearing the
//! in-progress flag, and the insert path only waits on the migration mutex
//! while that flag is clear; that asymmetry is what keeps the lock order
//! acyclic.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::hybrid::HybridCore;
use crate::key::KeyValue;

/// Message from the insert path to the worker.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MigrationSignal {
    Drain,
}

/// Spawn the long-lived worker. It parks on the channel between migrations
/// and exits when the channel closes or `cancel` is raised.
pub(crate) fn spawn(core: Arc<HybridCore>, rx: Receiver<MigrationSignal>) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(MigrationSignal::Drain) = rx.recv() {
            if core.cancel.load(Ordering::Acquire) {
                break;
            }
            run_migration(&core);
        }
    })
}

/// One full migration. Holds the migration mutex for the whole run.
fn run_migration(core: &HybridCore) {
    let _migration_guard = core.migration_mutex.lock();

    // Preparing: snapshot the read-only delta in key order. Ordered input is
    // not needed for correctness, but the base absorbs it with better
    // locality.
    let drained: Vec<KeyValue> = core.deltas.read().ro().extract_all();
    tracing::debug!(keys = drained.len(), "migration draining");

    // Draining1: fill the writer base while the reader base keeps serving.
    let writer = 1 - core.base_r.load(Ordering::Acquire);
    if !drain_into(core, writer, &drained) {
        abort(core, drained.len());
        return;
    }

    // Swapping: flip the reader role. Readers spin-yield across the flip.
    core.base_readable.store(false, Ordering::Release);
    core.base_r.store(writer, Ordering::Release);
    core.base_readable.store(true, Ordering::Release);

    // Draining2: fill the former reader so both bases converge.
    if !drain_into(core, 1 - writer, &drained) {
        abort(core, drained.len());
        return;
    }

    // Finalizing: every drained key is now in both bases, so the read-only
    // delta can be emptied and its count published as zero.
    {
        let mut pair = core.deltas.write();
        let ro = pair.ro_index();
        pair.slots[ro].clear();
    }
    core.ro_size.store(0, Ordering::Release);

    core.stats
        .keys_migrated
        .fetch_add(drained.len() as u64, Ordering::Relaxed);
    core.stats
        .migrations_completed
        .fetch_add(1, Ordering::Relaxed);
    core.migration_in_progress.store(false, Ordering::Release);
    tracing::debug!(keys = drained.len(), "migration complete");
}

/// Insert the snapshot into one base slot. Returns false when cancelled
/// mid-drain; the caller abandons the run.
fn drain_into(core: &HybridCore, slot: usize, entries: &[KeyValue]) -> bool {
    let mut base = core.bases[slot].write();
    for kv in entries {
        if core.cancel.load(Ordering::Acquire) {
            return false;
        }
        base.insert(kv.key, kv.value);
    }
    true
}

fn abort(core: &HybridCore, keys: usize) {
    core.stats.migrations_aborted.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(keys, "migration aborted by cancellation");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HybridConfig;
    use crate::hybrid::HybridIndex;
    use std::time::{Duration, Instant};

    fn eager_config() -> HybridConfig {
        // Small ratio so a handful of inserts trigger a drain.
        HybridConfig {
            migration_ratio: 0.01,
            ..Default::default()
        }
    }

    fn wait_for_completion(index: &HybridIndex, n: u64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while index.stats().migrations_completed < n {
            assert!(Instant::now() < deadline, "migration stalled");
            thread::yield_now();
        }
    }

    #[test]
    fn test_migration_converges_both_bases() {
        let index = HybridIndex::new(eager_config()).unwrap();
        let data: Vec<KeyValue> = (0..10_000u64).map(|i| KeyValue::new(i * 2, i)).collect();
        index.build(&data, 1).unwrap();

        for i in 0..150u64 {
            index.insert(KeyValue::new(1_000_000 + i, i), 0);
        }
        wait_for_completion(&index, 1);

        // Keys drained by the migration are served by the base tier; the
        // stragglers still sit in the write delta. All stay visible.
        for i in 0..150u64 {
            assert_eq!(index.lookup(1_000_000 + i), Some(i));
        }
        assert!(index.stats().keys_migrated >= 100);
    }

    #[test]
    fn test_back_to_back_migrations() {
        let index = HybridIndex::new(eager_config()).unwrap();
        let data: Vec<KeyValue> = (0..5_000u64).map(|i| KeyValue::new(i * 3, i)).collect();
        index.build(&data, 1).unwrap();

        let mut next_key = 10_000_000u64;
        for round in 1..=3u64 {
            for _ in 0..200 {
                index.insert(KeyValue::new(next_key, next_key), 0);
                next_key += 1;
            }
            wait_for_completion(&index, round);
        }

        for key in 10_000_000..next_key {
            assert_eq!(index.lookup(key), Some(key), "key {} lost", key);
        }
        let stats = index.stats();
        assert!(stats.migrations_completed >= 3);
        assert_eq!(stats.migrations_aborted, 0);
    }

    #[test]
    fn test_updated_key_survives_migration_chain() {
        let index = HybridIndex::new(eager_config()).unwrap();
        let data: Vec<KeyValue> = (0..5_000u64).map(|i| KeyValue::new(i, i)).collect();
        index.build(&data, 1).unwrap();

        index.insert(KeyValue::new(42, 1), 0);
        for i in 0..100u64 {
            index.insert(KeyValue::new(100_000 + i, 0), 0);
        }
        wait_for_completion(&index, 1);

        index.insert(KeyValue::new(42, 2), 0);
        assert_eq!(index.lookup(42), Some(2));
        for i in 100..200u64 {
            index.insert(KeyValue::new(100_000 + i, 0), 0);
        }
        wait_for_completion(&index, 2);
        assert_eq!(index.lookup(42), Some(2), "newest value must survive");
    }
}
