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

//! Read-optimized base tier.
//!
//! One sorted slab with a tight-ε PLA model serves the steady state; point
//! inserts arriving from the migrator either update a slab entry in place or
//! land in a small overlay tree that shadows the slab until it is folded back
//! in and the model refit. The base never shrinks and is never drained.

use std::collections::BTreeMap;

use crate::key::KeyValue;
use crate::pla::PlaModel;
use crate::search::{find_in_bounds, SearchPrimitive};

/// Write-capable learned map over `(u64, u64)`.
#[derive(Debug)]
pub struct BaseIndex {
    /// Bulk-loaded entries plus folded-in inserts, sorted by key.
    slab: Vec<KeyValue>,
    model: PlaModel,
    /// Inserts not yet folded into the slab. Shadows the slab on lookup.
    overlay: BTreeMap<u64, u64>,
    merge_threshold: usize,
    epsilon: usize,
    search: SearchPrimitive,
}

impl BaseIndex {
    pub fn new(epsilon: usize, merge_threshold: usize, search: SearchPrimitive) -> Self {
        Self {
            slab: Vec::new(),
            model: PlaModel::empty(),
            overlay: BTreeMap::new(),
            merge_threshold: merge_threshold.max(1),
            epsilon,
            search,
        }
    }

    /// One-shot O(n) construction from sorted, unique data. Replaces any
    /// previous contents.
    pub fn bulk_load(&mut self, data: &[KeyValue]) {
        self.slab = data.to_vec();
        self.model = PlaModel::build(&self.slab, self.epsilon);
        self.overlay = BTreeMap::new();
    }

    /// Point insert. Overwrites on duplicate key; safe to call repeatedly
    /// with the same key during a migration drain.
    pub fn insert(&mut self, key: u64, value: u64) {
        if let Some(slot) = self.find_slab_slot(key) {
            self.slab[slot].value = value;
            return;
        }
        self.overlay.insert(key, value);
        if self.overlay.len() >= self.merge_threshold {
            self.merge_overlay();
        }
    }

    pub fn lookup(&self, key: u64) -> Option<u64> {
        if let Some(&value) = self.overlay.get(&key) {
            return Some(value);
        }
        self.find_slab_slot(key).map(|i| self.slab[i].value)
    }

    pub fn len(&self) -> usize {
        self.slab.len() + self.overlay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty() && self.overlay.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.slab.len() * std::mem::size_of::<KeyValue>()
            + self.overlay.len() * 2 * std::mem::size_of::<u64>()
            + self.model.size_bytes()
    }

    /// Exposed for observability: how many inserts await the next fold.
    pub fn overlay_len(&self) -> usize {
        self.overlay.len()
    }

    fn find_slab_slot(&self, key: u64) -> Option<usize> {
        if self.slab.is_empty() {
            return None;
        }
        let segment = self.model.locate(key)?;
        let (lo, hi) = segment.search_bounds(key, self.slab.len());
        find_in_bounds(&self.slab, key, lo, hi, self.search)
    }

    /// Fold the overlay into the slab and refit the model. O(n).
    fn merge_overlay(&mut self) {
        tracing::debug!(
            slab = self.slab.len(),
            overlay = self.overlay.len(),
            "folding base overlay into slab"
        );

        let slab = std::mem::take(&mut self.slab);
        let overlay = std::mem::take(&mut self.overlay);
        let mut merged = Vec::with_capacity(slab.len() + overlay.len());

        let mut s = slab.into_iter().peekable();
        let mut o = overlay.into_iter().peekable();
        loop {
            match (s.peek(), o.peek()) {
                (Some(a), Some(&(k, v))) => {
                    if a.key < k {
                        merged.push(s.next().expect("peeked"));
                    } else if a.key > k {
                        merged.push(KeyValue::new(k, v));
                        o.next();
                    } else {
                        // Overlay entries are newer than slab entries.
                        s.next();
                        merged.push(KeyValue::new(k, v));
                        o.next();
                    }
                }
                (Some(_), None) => merged.push(s.next().expect("peeked")),
                (None, Some(&(k, v))) => {
                    merged.push(KeyValue::new(k, v));
                    o.next();
                }
                (None, None) => break,
            }
        }

        self.slab = merged;
        self.model = PlaModel::build(&self.slab, self.epsilon);
    }
}
