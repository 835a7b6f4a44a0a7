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

//! Piecewise-linear approximation of the key→position mapping.
//!
//! For sorted keys k₁ < k₂ < ... < kₙ the position of a key is its rank; a
//! linear model `pos ≈ pos₀ + slope × (k - k₀)` approximates that mapping
//! within an error bound ε, so a lookup only searches 2ε + 1 slots instead of
//! the whole slab.
//!
//! Segments are grown with a single-pass shrinking-cone fit: each segment
//! keeps the interval of slopes that places every covered point within ε of
//! its true rank, and is closed as soon as the interval empties. The pass is
//! O(n) total, and a second cheap pass records each segment's *exact* maximum
//! error so search windows never over-trust ε.
//!
//! Key offsets are taken relative to the segment origin through `u128`
//! widening, so keys near `u64::MAX` lose no precision.

use serde::{Deserialize, Serialize};

use crate::key::KeyValue;

/// One linear segment of the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// First key covered by this segment.
    pub start_key: u64,
    /// Rank of `start_key` in the slab.
    pub start_pos: usize,
    /// Positions per unit of key offset.
    pub slope: f64,
    /// Exact maximum rounding error observed over the covered keys.
    pub max_error: usize,
}

impl Segment {
    /// Predicted rank for `key`. Callers must have located this segment via
    /// [`PlaModel::locate`], so `key >= start_key` holds.
    #[inline]
    pub fn predict(&self, key: u64) -> usize {
        debug_assert!(key >= self.start_key);
        let dx = (key as u128 - self.start_key as u128) as f64;
        let pos = self.start_pos as f64 + self.slope * dx;
        pos.max(0.0).round() as usize
    }

    /// Search window `[lo, hi]` for `key` in a slab of `len` entries.
    #[inline]
    pub fn search_bounds(&self, key: u64, len: usize) -> (usize, usize) {
        let predicted = self.predict(key);
        let lo = predicted.saturating_sub(self.max_error);
        let hi = (predicted + self.max_error).min(len.saturating_sub(1));
        (lo, hi)
    }
}

/// A full piecewise model over one sorted slab.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaModel {
    segments: Vec<Segment>,
}

impl PlaModel {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fit a model over sorted, unique entries with error bound `epsilon`.
    pub fn build(entries: &[KeyValue], epsilon: usize) -> Self {
        if entries.is_empty() {
            return Self::empty();
        }

        let eps = epsilon.max(1) as f64;
        let mut segments = Vec::new();
        let mut start = 0usize;

        while start < entries.len() {
            let origin_key = entries[start].key;

            // Shrinking cone: the feasible slope interval [slope_lo, slope_hi]
            // narrows with each admitted point and the segment closes when it
            // empties. Slopes are non-negative because ranks are monotone.
            let mut slope_lo = 0.0f64;
            let mut slope_hi = f64::INFINITY;
            let mut end = start + 1;

            while end < entries.len() {
                let dx = (entries[end].key as u128 - origin_key as u128) as f64;
                debug_assert!(dx > 0.0, "keys must be unique and sorted");
                let dy = (end - start) as f64;

                let lo = ((dy - eps) / dx).max(slope_lo);
                let hi = ((dy + eps) / dx).min(slope_hi);
                if lo > hi {
                    break;
                }
                slope_lo = lo;
                slope_hi = hi;
                end += 1;
            }

            let slope = if slope_hi.is_finite() {
                (slope_lo + slope_hi) / 2.0
            } else {
                // Single-point segment: the cone never narrowed.
                0.0
            };

            let mut segment = Segment {
                start_key: origin_key,
                start_pos: start,
                slope,
                max_error: 0,
            };
            segment.max_error = exact_max_error(&segment, &entries[start..end]);
            segments.push(segment);
            start = end;
        }

        Self { segments }
    }

    /// Segment responsible for `key`, or `None` when `key` precedes the
    /// smallest indexed key (and is therefore absent).
    pub fn locate(&self, key: u64) -> Option<&Segment> {
        if self.segments.is_empty() {
            return None;
        }
        let idx = self.segments.partition_point(|s| s.start_key <= key);
        if idx == 0 {
            None
        } else {
            Some(&self.segments[idx - 1])
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn max_error(&self) -> usize {
        self.segments.iter().map(|s| s.max_error).max().unwrap_or(0)
    }

    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.segments.len() * std::mem::size_of::<Segment>()
    }
}

fn exact_max_error(segment: &Segment, covered: &[KeyValue]) -> usize {
    let mut max_error = 0usize;
    for (offset, entry) in covered.iter().enumerate() {
        let actual = segment.start_pos + offset;
        let predicted = segment.predict(entry.key);
        max_error = max_error.max(predicted.abs_diff(actual));
    }
    max_error
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(keys: &[u64]) -> Vec<KeyValue> {
        keys.iter().map(|&k| KeyValue::new(k, k + 1)).collect()
    }

    fn assert_covers(model: &PlaModel, data: &[KeyValue]) {
        for (i, e) in data.iter().enumerate() {
            let seg = model
                .locate(e.key)
                .unwrap_or_else(|| panic!("no segment for key {}", e.key));
            let (lo, hi) = seg.search_bounds(e.key, data.len());
            assert!(
                lo <= i && i <= hi,
                "key {} at rank {} outside window [{}, {}]",
                e.key,
                i,
                lo,
                hi
            );
        }
    }

    #[test]
    fn test_empty_model() {
        let model = PlaModel::build(&[], 16);
        assert_eq!(model.segment_count(), 0);
        assert!(model.locate(42).is_none());
    }

    #[test]
    fn test_single_key() {
        let data = entries(&[42]);
        let model = PlaModel::build(&data, 16);
        assert_eq!(model.segment_count(), 1);
        assert_covers(&model, &data);
        assert!(model.locate(41).is_none());
    }

    #[test]
    fn test_sequential_keys_one_segment() {
        let data: Vec<KeyValue> = (0..10_000u64).map(|i| KeyValue::new(i, i)).collect();
        let model = PlaModel::build(&data, 4);
        assert_eq!(model.segment_count(), 1, "linear data needs one segment");
        assert!(model.max_error() <= 4);
        assert_covers(&model, &data);
    }

    #[test]
    fn test_gapped_keys_stay_within_epsilon() {
        let keys: Vec<u64> = (0..5_000u64).map(|i| i * 7 + (i % 13) * 11).collect();
        let mut keys = keys;
        keys.sort_unstable();
        keys.dedup();
        let data = entries(&keys);
        let model = PlaModel::build(&data, 8);
        assert!(model.max_error() <= 8 + 1);
        assert_covers(&model, &data);
    }

    #[test]
    fn test_clustered_keys_split_into_segments() {
        let mut keys: Vec<u64> = (0..1000).collect();
        keys.extend((0..1000).map(|i| 10_000_000 + i * 1000));
        keys.extend((0..1000).map(|i| u64::MAX - 2_000_000 + i * 3));
        let data = entries(&keys);
        let model = PlaModel::build(&data, 4);
        assert!(model.segment_count() >= 2);
        assert_covers(&model, &data);
    }

    #[test]
    fn test_keys_near_u64_max() {
        let keys: Vec<u64> = (0..1000u64).map(|i| u64::MAX - 50_000 + i * 17).collect();
        let data = entries(&keys);
        let model = PlaModel::build(&data, 4);
        assert_covers(&model, &data);
    }

    #[test]
    fn test_locate_below_minimum_is_miss() {
        let data = entries(&[100, 200, 300]);
        let model = PlaModel::build(&data, 4);
        assert!(model.locate(99).is_none());
        assert!(model.locate(100).is_some());
        // Beyond the maximum still resolves to the last segment; the bounded
        // search turns it into a miss.
        assert!(model.locate(u64::MAX).is_some());
    }
}
