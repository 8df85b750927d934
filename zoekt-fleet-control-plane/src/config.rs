// Copyright 2025-Present the zoekt-fleet authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zoekt_fleet_types::{IndexingLimits, WatermarkThresholds};

fn default_buffer_factor() -> f64 {
    3.0
}

fn default_max_indices_per_replica() -> usize {
    5
}

fn default_watermark_backoff_secs() -> u64 {
    30 * 60
}

fn default_rebalance_debounce_secs() -> u64 {
    5 * 60
}

fn default_eviction_batch_size() -> usize {
    100
}

fn default_force_reindex_percentage() -> f64 {
    0.5
}

fn default_max_routing_projects() -> usize {
    30_000
}

fn default_callback_service_type() -> String {
    "zoekt".to_string()
}

/// Tuning knobs of the control plane. All fields have conservative defaults
/// so an empty config document is valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    /// Multiplies raw repository sizes to produce a conservative storage
    /// estimate, absorbing index growth and overhead.
    #[serde(default = "default_buffer_factor")]
    pub buffer_factor: f64,
    #[serde(default = "default_max_indices_per_replica")]
    pub max_indices_per_replica: usize,
    #[serde(default)]
    pub watermarks: WatermarkThresholds,
    /// How long a watermark-blocked indexing request waits before retrying.
    #[serde(default = "default_watermark_backoff_secs")]
    pub watermark_backoff_secs: u64,
    /// Minimum interval between rebalance runs, enforced system-wide.
    #[serde(default = "default_rebalance_debounce_secs")]
    pub rebalance_debounce_secs: u64,
    /// Number of namespaces destroyed per eviction batch, bounding
    /// transaction size.
    #[serde(default = "default_eviction_batch_size")]
    pub eviction_batch_size: usize,
    /// Percentage of index requests stochastically upgraded to force-reindex
    /// as a background freshness check.
    #[serde(default = "default_force_reindex_percentage")]
    pub force_reindex_percentage: f64,
    /// Hard ceiling on the number of projects in one routing request.
    #[serde(default = "default_max_routing_projects")]
    pub max_routing_projects: usize,
    #[serde(default)]
    pub indexing_limits: IndexingLimits,
    #[serde(default = "default_callback_service_type")]
    pub callback_service_type: String,
}

impl Default for FleetConfig {
    fn default() -> FleetConfig {
        FleetConfig {
            buffer_factor: default_buffer_factor(),
            max_indices_per_replica: default_max_indices_per_replica(),
            watermarks: WatermarkThresholds::default(),
            watermark_backoff_secs: default_watermark_backoff_secs(),
            rebalance_debounce_secs: default_rebalance_debounce_secs(),
            eviction_batch_size: default_eviction_batch_size(),
            force_reindex_percentage: default_force_reindex_percentage(),
            max_routing_projects: default_max_routing_projects(),
            indexing_limits: IndexingLimits::default(),
            callback_service_type: default_callback_service_type(),
        }
    }
}

impl FleetConfig {
    pub fn watermark_backoff(&self) -> Duration {
        Duration::from_secs(self.watermark_backoff_secs)
    }

    pub fn rebalance_debounce(&self) -> Duration {
        Duration::from_secs(self.rebalance_debounce_secs)
    }

    /// Force-reindex probability in `[0, 1]`.
    pub fn force_reindex_probability(&self) -> f64 {
        (self.force_reindex_percentage / 100.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_document_is_valid() {
        let config: FleetConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, FleetConfig::default());
        assert_eq!(config.buffer_factor, 3.0);
        assert_eq!(config.watermarks.low, 0.6);
        assert_eq!(config.watermarks.high, 0.7);
        assert_eq!(config.watermark_backoff(), Duration::from_secs(1800));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let config_res: Result<FleetConfig, _> =
            serde_json::from_str(r#"{"buffer_fact": 2.0}"#);
        assert!(config_res.is_err());
    }

    #[test]
    fn test_force_reindex_probability_clamped() {
        let mut config = FleetConfig::default();
        assert_eq!(config.force_reindex_probability(), 0.005);
        config.force_reindex_percentage = 250.0;
        assert_eq!(config.force_reindex_probability(), 1.0);
    }
}
