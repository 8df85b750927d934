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

//! Watermark-based admission control.
//!
//! Stateless circuit breaker consulted before new indexing tasks are created
//! for an index. It protects nodes from accepting more initial-indexing work
//! than they can store while always letting deletions and incremental
//! updates through: deletions reduce pressure, incremental updates are
//! assumed small.

use std::time::Duration;

use zoekt_fleet_types::{Node, TaskType, WatermarkLevel};

use crate::FleetConfig;

/// Decision for one task-creation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Allow,
    /// Blocked; retry the request after the given backoff.
    Backoff(Duration),
}

/// Evaluates whether a task of `task_type` may be created for an index
/// living on `node`.
///
/// `initial_indexing` marks requests for repositories that never completed
/// an indexing run (or were selected for force-reindex): those are the
/// expensive ones the low watermark exists for.
pub fn admit(
    task_type: TaskType,
    initial_indexing: bool,
    node: &Node,
    config: &FleetConfig,
) -> Admission {
    if task_type.is_delete() {
        return Admission::Allow;
    }
    let level = node.watermark_level(&config.watermarks);
    if level >= WatermarkLevel::High {
        return Admission::Backoff(config.watermark_backoff());
    }
    if level >= WatermarkLevel::Low && initial_indexing {
        return Admission::Backoff(config.watermark_backoff());
    }
    Admission::Allow
}
