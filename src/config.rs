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

//! Configuration for the hybrid index.
//!
//! All tuning lives in one value object handed to the index at construction;
//! there is no process-global state.

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::search::SearchPrimitive;

/// Configuration for [`HybridIndex`](crate::hybrid::HybridIndex).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Fraction of the total population the write delta may reach before a
    /// migration is triggered.
    /// Default: 0.002 (0.2%)
    pub migration_ratio: f64,

    /// Error bound for the delta tier's run models. Loose, because delta runs
    /// are small and short-lived.
    /// Default: 64
    pub delta_epsilon: usize,

    /// Staging-tree size at which the delta seals a sorted run.
    /// Default: 256
    pub delta_staging_limit: usize,

    /// Error bound for the base tier's slab model. Tight, because the slab
    /// serves the read-heavy steady state.
    /// Default: 16
    pub base_epsilon: usize,

    /// Overlay size at which a base instance folds migrated inserts back into
    /// its slab and refits the model.
    /// Default: 16384
    pub base_merge_threshold: usize,

    /// How model predictions are resolved to exact slots.
    pub search: SearchPrimitive,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            migration_ratio: 0.002,
            delta_epsilon: 64,
            delta_staging_limit: 256,
            base_epsilon: 16,
            base_merge_threshold: 16_384,
            search: SearchPrimitive::default(),
        }
    }
}

impl HybridConfig {
    /// Profile for insert-dominated workloads: a larger delta amortizes
    /// migrations over more inserts.
    pub fn for_write_heavy() -> Self {
        Self {
            migration_ratio: 0.01,
            delta_staging_limit: 1024,
            ..Default::default()
        }
    }

    /// Profile for lookup-dominated workloads: migrate early and keep the
    /// base model tight.
    pub fn for_read_heavy() -> Self {
        Self {
            migration_ratio: 0.0005,
            base_epsilon: 8,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.migration_ratio.is_finite()
            || self.migration_ratio <= 0.0
            || self.migration_ratio >= 1.0
        {
            return Err(IndexError::InvalidConfig(format!(
                "migration_ratio must be in (0, 1), got {}",
                self.migration_ratio
            )));
        }
        if self.delta_epsilon == 0 || self.base_epsilon == 0 {
            return Err(IndexError::InvalidConfig(
                "error bounds must be at least 1".into(),
            ));
        }
        if self.delta_staging_limit == 0 || self.base_merge_threshold == 0 {
            return Err(IndexError::InvalidConfig(
                "staging and merge thresholds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(HybridConfig::default().validate().is_ok());
        assert!(HybridConfig::for_write_heavy().validate().is_ok());
        assert!(HybridConfig::for_read_heavy().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_ratio() {
        for ratio in [0.0, 1.0, -0.5, f64::NAN, f64::INFINITY] {
            let config = HybridConfig {
                migration_ratio: ratio,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "ratio {} accepted", ratio);
        }
    }

    #[test]
    fn test_rejects_zero_thresholds() {
        let config = HybridConfig {
            delta_staging_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HybridConfig {
            base_epsilon: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
