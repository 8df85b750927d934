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
use time::OffsetDateTime;

use crate::{NodeId, ProjectId, RepositoryId, TaskId};

/// Schema default for a task's `retries_left`.
pub const DEFAULT_TASK_RETRIES: u16 = 3;

/// One unit of work targeting one repository, dispatched to exactly one node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub node_id: NodeId,
    pub zoekt_repository_id: RepositoryId,
    pub project_id: ProjectId,
    pub state: TaskState,
    /// Earliest dispatch time. A minimum delay, not a deadline.
    pub perform_at: OffsetDateTime,
    pub retries_left: u16,
}

impl Task {
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.perform_at <= now
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    IndexRepo,
    ForceIndexRepo,
    DeleteRepo,
}

impl TaskType {
    /// Deletion tasks relieve storage pressure and are never gated by
    /// watermark logic.
    pub fn is_delete(&self) -> bool {
        matches!(self, TaskType::DeleteRepo)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Done,
    Failed,
    Orphaned,
}
