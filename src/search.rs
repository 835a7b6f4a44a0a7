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

//! Bounded search primitives.
//!
//! A learned model narrows a lookup to a small window `[lo, hi]` of a sorted
//! slab; one of these primitives resolves the window to an exact slot. Binary
//! search wins for wide windows, a straight scan wins for the tight windows a
//! good model produces, and the chunked scan trades early exit for a loop the
//! compiler can vectorize.

use serde::{Deserialize, Serialize};

use crate::key::KeyValue;

/// How a model prediction is resolved to an exact slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPrimitive {
    /// Branching binary search over the predicted window.
    #[default]
    BranchingBinary,
    /// Straight linear scan with early exit.
    Linear,
    /// Chunked linear scan without early exit, written so the inner
    /// comparison loop vectorizes.
    LinearSimd,
}

impl SearchPrimitive {
    pub fn name(&self) -> &'static str {
        match self {
            SearchPrimitive::BranchingBinary => "BranchingBinary",
            SearchPrimitive::Linear => "Linear",
            SearchPrimitive::LinearSimd => "LinearSimd",
        }
    }
}

/// Find `key` within `entries[lo..=hi]`, returning its absolute slot.
///
/// `lo`/`hi` are clamped to the slab; an inverted window yields a miss.
pub fn find_in_bounds(
    entries: &[KeyValue],
    key: u64,
    lo: usize,
    hi: usize,
    primitive: SearchPrimitive,
) -> Option<usize> {
    if entries.is_empty() {
        return None;
    }
    let hi = hi.min(entries.len() - 1);
    let lo = lo.min(hi);
    let window = &entries[lo..=hi];

    match primitive {
        SearchPrimitive::BranchingBinary => window
            .binary_search_by_key(&key, |e| e.key)
            .ok()
            .map(|i| i + lo),
        SearchPrimitive::Linear => {
            for (i, e) in window.iter().enumerate() {
                if e.key == key {
                    return Some(lo + i);
                }
                if e.key > key {
                    return None;
                }
            }
            None
        }
        SearchPrimitive::LinearSimd => {
            for (ci, chunk) in window.chunks(8).enumerate() {
                let mut hit = false;
                for e in chunk {
                    hit |= e.key == key;
                }
                if hit {
                    for (i, e) in chunk.iter().enumerate() {
                        if e.key == key {
                            return Some(lo + ci * 8 + i);
                        }
                    }
                }
            }
            None
        }
    }
}
