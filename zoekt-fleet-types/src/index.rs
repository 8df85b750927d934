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

use crate::{IndexId, NamespaceId, NodeId, ProjectId, ReplicaId};

/// One full copy of a namespace's searchable content, composed of 1..N
/// indices. Indices of one replica map to distinct nodes; two replicas of the
/// same namespace never share a node (the replica is the redundancy domain).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Replica {
    pub id: ReplicaId,
    pub namespace_id: NamespaceId,
    pub state: ReplicaState,
}

impl Replica {
    pub fn new(namespace_id: NamespaceId) -> Replica {
        Replica {
            id: ReplicaId::new(),
            namespace_id,
            state: ReplicaState::Pending,
        }
    }
}

/// Ordering matters: less-ready replicas sort first and are destroyed first
/// during replica-count reduction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaState {
    Pending,
    Ready,
}

/// A storage-bounded shard of a replica, pinned to exactly one node and
/// responsible for a contiguous range of projects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub id: IndexId,
    pub replica_id: ReplicaId,
    pub namespace_id: NamespaceId,
    pub node_id: NodeId,
    /// Storage claimed on the node when this index was materialized.
    pub reserved_bytes: u64,
    pub state: IndexState,
    /// Project range bounds, used to track incremental-indexing progress.
    /// `project_id_to = None` means "from `project_id_from` and beyond".
    pub project_id_from: Option<ProjectId>,
    pub project_id_to: Option<ProjectId>,
}

impl Index {
    /// Whether `project_id` falls within this index's range bounds.
    pub fn covers_project(&self, project_id: ProjectId) -> bool {
        match (self.project_id_from, self.project_id_to) {
            (None, _) => false,
            (Some(from), None) => project_id >= from,
            (Some(from), Some(to)) => project_id >= from && project_id <= to,
        }
    }

    pub fn searchable(&self) -> bool {
        matches!(self.state, IndexState::Initializing | IndexState::Ready)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Pending,
    Initializing,
    Ready,
    Orphaned,
    PendingDeletion,
}
