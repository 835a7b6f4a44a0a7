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

//! Error types for tessera-index.
//!
//! Lookup misses are values (`NOT_FOUND` or `None`), never errors. The error
//! type only covers construction-time problems: invalid configuration and
//! invalid bulk-load input.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("bulk load data is not sorted ascending at index {index}")]
    UnsortedBulkLoad { index: usize },

    #[error("bulk load data contains duplicate key {key}")]
    DuplicateBulkKey { key: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("migration worker unavailable")]
    WorkerUnavailable,
}

pub type Result<T> = std::result::Result<T, IndexError>;
