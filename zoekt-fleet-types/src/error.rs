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
use thiserror::Error;

use crate::{NamespaceId, NodeId, ProjectId, TaskId};

/// Non-fatal errors accumulated while planning a namespace. They are data in
/// the resulting plan, never exceptions: one namespace failing to plan does
/// not abort planning for the others.
#[derive(Clone, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum PlanningError {
    #[error("replica reached the maximum of {limit} indices")]
    IndexLimitExceeded { limit: usize },
    #[error("no node can accommodate {required_bytes} bytes")]
    NodeUnavailable {
        project_id: Option<ProjectId>,
        required_bytes: u64,
    },
}

/// Recoverable provisioning errors, collected and returned to the caller.
#[derive(Clone, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum ProvisioningError {
    #[error("enabled namespace {namespace_id} no longer exists")]
    MissingEnabledNamespace { namespace_id: NamespaceId },
    #[error("live indices already exist for namespace {namespace_id}")]
    IndexAlreadyExists { namespace_id: NamespaceId },
    #[error(
        "node {node_id} cannot accommodate {required_bytes} bytes ({unclaimed_bytes} unclaimed)"
    )]
    NodeCapacityExceeded {
        node_id: NodeId,
        required_bytes: u64,
        unclaimed_bytes: u64,
    },
    #[error("node {node_id} no longer exists")]
    MissingNode { node_id: NodeId },
}

/// Hard task lifecycle errors. Unknown ids/types indicate a schema or code
/// mismatch and fail loudly rather than being silently ignored.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum TaskError {
    #[error("unknown task {task_id}")]
    UnknownTask { task_id: TaskId },
    #[error("repository for task {task_id} no longer exists")]
    MissingRepository { task_id: TaskId },
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RoutingError {
    #[error("cannot route {requested} projects in one request (limit {limit})")]
    TooManyProjects { requested: usize, limit: usize },
}
