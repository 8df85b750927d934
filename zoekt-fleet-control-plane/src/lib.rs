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

//! Control plane for a fleet of zoekt search nodes.
//!
//! The control plane decides how code-search index replicas are distributed
//! across nodes, tracks and reserves storage capacity, and routes indexing
//! and search work to the right node:
//!
//! 1. The [`planner`] computes a storage-aware assignment of projects to
//!    indices to replicas to nodes, without mutating any state.
//! 2. The [`provisioning`] executor applies a plan all-or-nothing,
//!    materializing replicas/indices and claiming node storage.
//! 3. The [`watermark`] controller gates admission of new indexing work when
//!    node utilization crosses the low/high thresholds.
//! 4. The [`rebalancer`] evicts namespaces off overloaded nodes until they
//!    fall back under the low watermark.
//! 5. The [`tasks`] module owns the per-repository task state machine
//!    (creation, presentation to workers, completion callbacks, retries,
//!    orphan detection).
//! 6. The [`routing`] module builds the node -> project-ids table used to
//!    dispatch search queries.
//!
//! Everything operates on the in-memory [`FleetModel`]; persistence and
//! transport are collaborators of the surrounding application.

mod config;
mod model;
pub mod planner;
pub mod policy;
pub mod provisioning;
pub mod rebalancer;
pub mod routing;
pub mod tasks;
pub mod watermark;

pub use config::FleetConfig;
pub use model::FleetModel;


#[cfg(test)]
pub(crate) mod test_helpers {
    use time::OffsetDateTime;
    use zoekt_fleet_types::{
        GitalyConnectionInfo, Index, IndexState, NamespaceId, Node, NodeId, Project, ProjectId,
        Replica, RepositoryId, Task, TaskId, TaskState, TaskType, DEFAULT_TASK_RETRIES,
    };

    pub fn test_node(node_id: &str, total_bytes: u64) -> Node {
        Node {
            id: NodeId::from(node_id),
            total_bytes,
            used_bytes: 0,
            online: true,
            concurrency_limit: 10,
            schema_version: 1,
        }
    }

    pub fn test_project(
        project_id: ProjectId,
        namespace_id: NamespaceId,
        repository_size_bytes: u64,
    ) -> Project {
        Project {
            id: project_id,
            namespace_id,
            repository_size_bytes,
            traversal_ids: vec![namespace_id],
            visibility_level: 20,
            repository_access_level: 20,
            forked: false,
            archived: false,
            gitaly: GitalyConnectionInfo {
                address: "tcp://gitaly:8075".to_string(),
                token: "secret".to_string(),
                storage: "default".to_string(),
                path: format!("@hashed/{project_id}.git"),
            },
        }
    }

    pub fn test_index(replica: &Replica, node_id: &str, reserved_bytes: u64) -> Index {
        Index {
            id: zoekt_fleet_types::IndexId::new(),
            replica_id: replica.id,
            namespace_id: replica.namespace_id,
            node_id: NodeId::from(node_id),
            reserved_bytes,
            state: IndexState::Pending,
            project_id_from: None,
            project_id_to: None,
        }
    }

    pub fn test_task(
        repository_id: RepositoryId,
        project_id: ProjectId,
        node_id: &str,
        task_type: TaskType,
    ) -> Task {
        Task {
            id: TaskId::new(),
            task_type,
            node_id: NodeId::from(node_id),
            zoekt_repository_id: repository_id,
            project_id,
            state: TaskState::Pending,
            perform_at: OffsetDateTime::now_utc(),
            retries_left: DEFAULT_TASK_RETRIES,
        }
    }
}
