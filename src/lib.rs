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

//! Tessera Index
//!
//! A concurrent, in-memory, two-tier learned index over unique `u64` keys.
//!
//! # Architecture
//!
//! ```text
//!            writes                        reads
//!              │                             │
//!              ▼                             ▼
//!        ┌──────────┐  miss  ┌──────────┐  miss  ┌──────────┐
//!        │ delta[rw]│ ─────► │ delta[ro]│ ─────► │  base[r] │
//!        └──────────┘        └──────────┘        └──────────┘
//!              │ ratio trigger     ▲                   ▲
//!              ▼                   │ cleared last      │ swapped mid-drain
//!        ┌─────────────────────────────────────────────────┐
//!        │          background migrator (one worker)       │
//!        └─────────────────────────────────────────────────┘
//! ```
//!
//! Inserts land in a small write-optimized delta; when the delta exceeds a
//! configured fraction of the total population (0.2% by default) its role is
//! swapped and a background worker drains it into both read-optimized base
//! instances, then clears it. Foreground operations never block on the
//! drain: the stall at initiation is a handful of atomic stores, and the
//! stall at the base role swap is a brief spin-yield.
//!
//! Both tiers are learned structures: piecewise-linear models predict a
//! key's rank within an error bound, and a bounded search primitive resolves
//! the prediction to an exact slot.
//!
//! # Example
//!
//! ```rust
//! use tessera_index::{HybridConfig, HybridIndex, KeyValue, NOT_FOUND};
//!
//! let index = HybridIndex::new(HybridConfig::default()).unwrap();
//! let data: Vec<KeyValue> = (0..1000u64).map(|i| KeyValue::new(i * 2, i)).collect();
//! index.build(&data, 1).unwrap();
//!
//! index.insert(KeyValue::new(7, 70), 0);
//! assert_eq!(index.lookup(7), Some(70));
//! assert_eq!(index.equality_lookup(9, 0), NOT_FOUND);
//! ```
//!
//! # Scope
//!
//! Single process, unique keys, no deletions, no durability. Point inserts,
//! point lookups, and a delta-side range fold; everything else belongs to
//! the caller.

pub mod base_index;
pub mod config;
pub mod delta_index;
pub mod error;
pub mod hybrid;
pub mod key;
mod migrator;
pub mod pla;
pub mod search;

pub use base_index::BaseIndex;
pub use config::HybridConfig;
pub use delta_index::DeltaIndex;
pub use error::{IndexError, Result};
pub use hybrid::{HybridIndex, HybridStats, StatsSnapshot};
pub use key::{KeyValue, NOT_FOUND};
pub use search::SearchPrimitive;

/// Crate version.
pub const TESSERA_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_smoke() {
        let index = HybridIndex::with_defaults().unwrap();
        let data: Vec<KeyValue> = (0..100u64).map(|i| KeyValue::new(i * 10, i)).collect();
        index.build(&data, 1).unwrap();

        assert_eq!(index.lookup(990), Some(99));
        assert_eq!(index.equality_lookup(991, 0), NOT_FOUND);
        assert!(index.name().starts_with("TesseraHybrid_"));
        assert!(index.size_bytes() > 0);
    }
}
