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

use serde::{Deserialize, Serialize};

use crate::{NodeId, WatermarkLevel, WatermarkThresholds};

/// A search-serving host.
///
/// Nodes are registered out-of-band. The control plane only mutates
/// `used_bytes`: the provisioning executor increments it when an index is
/// materialized, the eviction rebalancer decrements it when indices are
/// destroyed. `used_bytes <= total_bytes` is a soft invariant: the planner
/// never plans to exceed it, eviction corrects transient violations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub online: bool,
    /// Max number of tasks this node processes in parallel.
    pub concurrency_limit: u16,
    pub schema_version: u16,
}

impl Node {
    pub fn unclaimed_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }

    /// Fractional storage utilization. A node advertising zero total storage
    /// is treated as full.
    pub fn storage_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64
    }

    pub fn watermark_level(&self, thresholds: &WatermarkThresholds) -> WatermarkLevel {
        thresholds.level_for(self.storage_ratio())
    }
}
