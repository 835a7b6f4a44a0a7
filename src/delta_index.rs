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

//! Write-optimized delta tier.
//!
//! The delta absorbs point inserts at tree speed and stays small: the hybrid
//! drains it into the base tier before it exceeds a fraction of the total
//! population. Internally it is a tiny LSM:
//!
//! ```text
//! insert ──► staging tree (BTreeMap, O(log n))
//!                  │ seal at staging_limit
//!                  ▼
//!            sorted runs, newest last, each with a loose-ε PLA model
//!                  │ logarithmic merge keeps the run count bounded
//!                  ▼
//!            extract_all ──► ordered drain for the migrator
//! ```
//!
//! A key updated twice may exist in several places at once; every read path
//! resolves duplicates newest-first (staging, then runs newest to oldest).

use std::collections::BTreeMap;

use crate::key::KeyValue;
use crate::pla::PlaModel;
use crate::search::{find_in_bounds, SearchPrimitive};

/// One immutable sorted run with its model.
#[derive(Debug)]
struct DeltaRun {
    entries: Vec<KeyValue>,
    model: PlaModel,
}

impl DeltaRun {
    fn from_sorted(entries: Vec<KeyValue>, epsilon: usize) -> Self {
        let model = PlaModel::build(&entries, epsilon);
        Self { entries, model }
    }

    fn lookup(&self, key: u64, primitive: SearchPrimitive) -> Option<u64> {
        let segment = self.model.locate(key)?;
        let (lo, hi) = segment.search_bounds(key, self.entries.len());
        find_in_bounds(&self.entries, key, lo, hi, primitive).map(|i| self.entries[i].value)
    }

    fn range(&self, lo: u64, hi: u64) -> &[KeyValue] {
        let start = self.entries.partition_point(|e| e.key < lo);
        let end = self.entries.partition_point(|e| e.key <= hi);
        &self.entries[start..end]
    }
}

/// Write-optimized, approximate-bound ordered map over `(u64, u64)`.
#[derive(Debug)]
pub struct DeltaIndex {
    staging: BTreeMap<u64, u64>,
    /// Sorted runs, oldest first.
    runs: Vec<DeltaRun>,
    staging_limit: usize,
    epsilon: usize,
    search: SearchPrimitive,
}

impl DeltaIndex {
    pub fn new(epsilon: usize, staging_limit: usize, search: SearchPrimitive) -> Self {
        Self {
            staging: BTreeMap::new(),
            runs: Vec::new(),
            staging_limit: staging_limit.max(1),
            epsilon,
            search,
        }
    }

    /// Add or overwrite `key`. O(log n) amortized: staging absorbs the
    /// insert, and sealing plus logarithmic run merging amortizes out.
    pub fn insert(&mut self, key: u64, value: u64) {
        self.staging.insert(key, value);
        if self.staging.len() >= self.staging_limit {
            self.seal_staging();
        }
    }

    pub fn lookup(&self, key: u64) -> Option<u64> {
        if let Some(&value) = self.staging.get(&key) {
            return Some(value);
        }
        for run in self.runs.iter().rev() {
            if let Some(value) = run.lookup(key, self.search) {
                return Some(value);
            }
        }
        None
    }

    /// All live entries in key order, newest value winning per key. Does not
    /// mutate: the migrator snapshots from a shared borrow.
    pub fn extract_all(&self) -> Vec<KeyValue> {
        let mut merged: BTreeMap<u64, u64> = BTreeMap::new();
        for run in &self.runs {
            for e in &run.entries {
                merged.insert(e.key, e.value);
            }
        }
        for (&key, &value) in &self.staging {
            merged.insert(key, value);
        }
        merged
            .into_iter()
            .map(|(key, value)| KeyValue::new(key, value))
            .collect()
    }

    /// Empty the delta. Amortized O(1): the backing storage is dropped
    /// wholesale rather than removed entry by entry.
    pub fn clear(&mut self) {
        self.staging = BTreeMap::new();
        self.runs = Vec::new();
    }

    /// Sum of values over keys in `[lo, hi]`, each live key counted once.
    pub fn range_sum(&self, lo: u64, hi: u64) -> u64 {
        if lo > hi {
            return 0;
        }
        if self.runs.is_empty() {
            return self
                .staging
                .range(lo..=hi)
                .fold(0u64, |acc, (_, v)| acc.wrapping_add(*v));
        }
        // Duplicates can straddle staging and runs; merge the window so each
        // key contributes its newest value exactly once.
        let mut window: BTreeMap<u64, u64> = BTreeMap::new();
        for run in &self.runs {
            for e in run.range(lo, hi) {
                window.insert(e.key, e.value);
            }
        }
        for (&k, &v) in self.staging.range(lo..=hi) {
            window.insert(k, v);
        }
        window.values().fold(0u64, |acc, v| acc.wrapping_add(*v))
    }

    /// Stored entry count. A key updated across runs is counted per copy;
    /// this feeds size accounting, not visibility.
    pub fn len(&self) -> usize {
        self.staging.len() + self.runs.iter().map(|r| r.entries.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.staging.is_empty() && self.runs.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        let staging = self.staging.len() * 2 * std::mem::size_of::<u64>();
        let runs: usize = self
            .runs
            .iter()
            .map(|r| r.entries.len() * std::mem::size_of::<KeyValue>() + r.model.size_bytes())
            .sum();
        std::mem::size_of::<Self>() + staging + runs
    }

    fn seal_staging(&mut self) {
        let staging = std::mem::take(&mut self.staging);
        let entries: Vec<KeyValue> = staging
            .into_iter()
            .map(|(key, value)| KeyValue::new(key, value))
            .collect();
        self.runs.push(DeltaRun::from_sorted(entries, self.epsilon));

        // Logarithmic method: cascade-merge while the older neighbor is not
        // at least twice the size of the newest run.
        while self.runs.len() >= 2 {
            let newest = self.runs[self.runs.len() - 1].entries.len();
            let older = self.runs[self.runs.len() - 2].entries.len();
            if older > newest * 2 {
                break;
            }
            let newer = self.runs.pop().expect("two runs checked above");
            let older = self.runs.pop().expect("two runs checked above");
            let merged = merge_runs(older.entries, newer.entries);
            self.runs.push(DeltaRun::from_sorted(merged, self.epsilon));
        }
    }
}

/// Merge two sorted runs; `newer` wins on key collisions.
fn merge_runs(older: Vec<KeyValue>, newer: Vec<KeyValue>) -> Vec<KeyValue> {
    let mut merged = Vec::with_capacity(older.len() + newer.len());
    let mut o = older.into_iter().peekable();
    let mut n = newer.into_iter().peekable();

    loop {
        match (o.peek(), n.peek()) {
            (Some(a), Some(b)) => {
                if a.key < b.key {
                    merged.push(o.next().expect("peeked"));
                } else if a.key > b.key {
                    merged.push(n.next().expect("peeked"));
                } else {
                    o.next();
                    merged.push(n.next().expect("peeked"));
                }
            }
            (Some(_), None) => merged.push(o.next().expect("peeked")),
            (None, Some(_)) => merged.push(n.next().expect("peeked")),
            (None, None) => break,
        }
    }
    merged
}
