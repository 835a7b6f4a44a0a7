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

//! Key and record types shared by every tier of the index.

use serde::{Deserialize, Serialize};

/// Sentinel returned by lookups that miss.
///
/// The workload contract reserves `u64::MAX`: it is never a legal value, so a
/// plain `u64` return channel can carry both hits and misses without an
/// out-of-band flag.
pub const NOT_FOUND: u64 = u64::MAX;

/// A single key-value record.
///
/// Keys are unique across the whole index; ordering is by key alone as far as
/// the index is concerned (the derived ordering falls back to the value only
/// for fully equal keys, which the uniqueness contract rules out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: u64,
    pub value: u64,
}

impl KeyValue {
    pub fn new(key: u64, value: u64) -> Self {
        Self { key, value }
    }
}

impl From<(u64, u64)> for KeyValue {
    fn from((key, value): (u64, u64)) -> Self {
        Self { key, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_by_key() {
        let a = KeyValue::new(1, 900);
        let b = KeyValue::new(2, 100);
        assert!(a < b);
    }

    #[test]
    fn test_sentinel_is_reserved() {
        assert_eq!(NOT_FOUND, u64::MAX);
    }
}
