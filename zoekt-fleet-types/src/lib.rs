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

//! Value types shared across the zoekt-fleet control plane: the capacity
//! model (nodes, replicas, indices, repositories, tasks), watermark levels,
//! worker-facing payloads, lifecycle events and the error taxonomy.

mod error;
mod events;
mod ids;
mod index;
mod namespace;
mod node;
mod payload;
mod project;
mod repository;
mod task;
mod watermark;

pub use error::{PlanningError, ProvisioningError, RoutingError, TaskError};
pub use events::{IndexMarkedAsToDeleteEvent, OrphanedIndexEvent, TaskFailedEvent};
pub use ids::{IndexId, NamespaceId, NodeId, ProjectId, ReplicaId, RepositoryId, TaskId};
pub use index::{Index, IndexState, Replica, ReplicaState};
pub use namespace::{EnabledNamespace, NamespaceMetadata};
pub use node::Node;
pub use payload::{
    AdditionalCallbackPayload, CallbackDescriptor, CallbackPayload, DeletePayload,
    GitalyConnectionInfo, IndexPayload, IndexingLimits, ProjectMetadata, RepoStats, TaskCallback,
    TaskCallbackRef, TaskPayload,
};
pub use project::Project;
pub use repository::{RepositoryState, ZoektRepository, DEFAULT_REPOSITORY_RETRIES};
pub use task::{Task, TaskState, TaskType, DEFAULT_TASK_RETRIES};
pub use watermark::{WatermarkLevel, WatermarkThresholds};
