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

/// Utilization-ratio thresholds gating admission of new indexing work and
/// triggering eviction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WatermarkThresholds {
    pub low: f64,
    pub high: f64,
}

impl Default for WatermarkThresholds {
    fn default() -> WatermarkThresholds {
        WatermarkThresholds {
            low: 0.6,
            high: 0.7,
        }
    }
}

impl WatermarkThresholds {
    pub fn low_exceeded(&self, ratio: f64) -> bool {
        ratio >= self.low
    }

    pub fn high_exceeded(&self, ratio: f64) -> bool {
        ratio >= self.high
    }

    pub fn level_for(&self, ratio: f64) -> WatermarkLevel {
        if ratio >= 1.0 {
            WatermarkLevel::Critical
        } else if self.high_exceeded(ratio) {
            WatermarkLevel::High
        } else if self.low_exceeded(ratio) {
            WatermarkLevel::Low
        } else {
            WatermarkLevel::Healthy
        }
    }
}

/// Utilization band of a node.
///
/// `Critical` means `used_bytes >= total_bytes`: the soft capacity invariant
/// is transiently violated and only eviction can bring the node back.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum WatermarkLevel {
    Healthy,
    Low,
    High,
    Critical,
}
