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

use std::collections::BTreeMap;

use fnv::FnvHashMap;
use zoekt_fleet_types::{
    EnabledNamespace, Index, IndexId, NamespaceId, Node, NodeId, Project, ProjectId, Replica,
    ReplicaId, RepositoryId, RepositoryState, Task, TaskId, TaskState, ZoektRepository,
};

/// In-memory authoritative view of the fleet.
///
/// All control-plane components read from and write to this model; durability
/// is the concern of the surrounding application, which replays its records
/// into the model at startup and persists mutations after each control-loop
/// invocation. Writers that need all-or-nothing semantics (the provisioning
/// executor) stage their mutations on a clone and swap it in on success.
///
/// Nodes, namespaces and projects live in `BTreeMap`s: the planner iterates
/// them and must be deterministic for identical inputs.
#[derive(Clone, Debug, Default)]
pub struct FleetModel {
    nodes: BTreeMap<NodeId, Node>,
    namespaces: BTreeMap<NamespaceId, EnabledNamespace>,
    projects: BTreeMap<ProjectId, Project>,
    replicas: FnvHashMap<ReplicaId, Replica>,
    indices: FnvHashMap<IndexId, Index>,
    repositories: FnvHashMap<RepositoryId, ZoektRepository>,
    tasks: FnvHashMap<TaskId, Task>,
}

impl FleetModel {
    // ---------------------------------------------------------------------
    // Nodes

    pub fn upsert_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn online_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|node| node.online)
    }

    // ---------------------------------------------------------------------
    // Enabled namespaces

    pub fn upsert_namespace(&mut self, namespace: EnabledNamespace) {
        self.namespaces.insert(namespace.namespace_id, namespace);
    }

    pub fn namespace(&self, namespace_id: NamespaceId) -> Option<&EnabledNamespace> {
        self.namespaces.get(&namespace_id)
    }

    pub fn namespace_mut(&mut self, namespace_id: NamespaceId) -> Option<&mut EnabledNamespace> {
        self.namespaces.get_mut(&namespace_id)
    }

    /// Removes an enabled namespace (subscription expiry). Replicas and
    /// indices are left behind on purpose: the orphan sweep detects and
    /// retires them through the regular deletion flow.
    pub fn remove_namespace(&mut self, namespace_id: NamespaceId) -> Option<EnabledNamespace> {
        self.namespaces.remove(&namespace_id)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &EnabledNamespace> {
        self.namespaces.values()
    }

    pub fn namespace_ids(&self) -> Vec<NamespaceId> {
        self.namespaces.keys().copied().collect()
    }

    // ---------------------------------------------------------------------
    // Projects

    pub fn upsert_project(&mut self, project: Project) {
        self.projects.insert(project.id, project);
    }

    pub fn project(&self, project_id: ProjectId) -> Option<&Project> {
        self.projects.get(&project_id)
    }

    pub fn remove_project(&mut self, project_id: ProjectId) -> Option<Project> {
        self.projects.remove(&project_id)
    }

    /// Projects of a namespace in ascending project-id order, the stable
    /// order the planner simulates in.
    pub fn projects_in_namespace(&self, namespace_id: NamespaceId) -> Vec<&Project> {
        self.projects
            .values()
            .filter(|project| project.namespace_id == namespace_id)
            .collect()
    }

    // ---------------------------------------------------------------------
    // Replicas

    pub fn add_replica(&mut self, replica: Replica) {
        self.replicas.insert(replica.id, replica);
    }

    pub fn replica(&self, replica_id: ReplicaId) -> Option<&Replica> {
        self.replicas.get(&replica_id)
    }

    pub fn replica_mut(&mut self, replica_id: ReplicaId) -> Option<&mut Replica> {
        self.replicas.get_mut(&replica_id)
    }

    pub fn replicas_for_namespace(&self, namespace_id: NamespaceId) -> Vec<&Replica> {
        let mut replicas: Vec<&Replica> = self
            .replicas
            .values()
            .filter(|replica| replica.namespace_id == namespace_id)
            .collect();
        replicas.sort_by_key(|replica| replica.id);
        replicas
    }

    /// Destroys a replica, cascading to its indices (and releasing the
    /// storage they reserved on their nodes).
    pub fn remove_replica(&mut self, replica_id: ReplicaId) -> Option<Replica> {
        let replica = self.replicas.remove(&replica_id)?;
        let index_ids: Vec<IndexId> = self
            .indices
            .values()
            .filter(|index| index.replica_id == replica_id)
            .map(|index| index.id)
            .collect();
        for index_id in index_ids {
            self.remove_index(index_id);
        }
        Some(replica)
    }

    // ---------------------------------------------------------------------
    // Indices

    pub fn add_index(&mut self, index: Index) {
        self.indices.insert(index.id, index);
    }

    pub fn index(&self, index_id: IndexId) -> Option<&Index> {
        self.indices.get(&index_id)
    }

    pub fn index_mut(&mut self, index_id: IndexId) -> Option<&mut Index> {
        self.indices.get_mut(&index_id)
    }

    pub fn indices(&self) -> impl Iterator<Item = &Index> {
        self.indices.values()
    }

    pub fn indices_for_node(&self, node_id: &NodeId) -> Vec<&Index> {
        let mut indices: Vec<&Index> = self
            .indices
            .values()
            .filter(|index| index.node_id == *node_id)
            .collect();
        indices.sort_by_key(|index| index.id);
        indices
    }

    pub fn indices_for_namespace(&self, namespace_id: NamespaceId) -> Vec<&Index> {
        let mut indices: Vec<&Index> = self
            .indices
            .values()
            .filter(|index| index.namespace_id == namespace_id)
            .collect();
        indices.sort_by_key(|index| index.id);
        indices
    }

    pub fn indices_for_replica(&self, replica_id: ReplicaId) -> Vec<&Index> {
        let mut indices: Vec<&Index> = self
            .indices
            .values()
            .filter(|index| index.replica_id == replica_id)
            .collect();
        indices.sort_by_key(|index| index.id);
        indices
    }

    /// Destroys an index: releases the storage it reserved on its node,
    /// cascades to its repositories and orphans outstanding tasks.
    pub fn remove_index(&mut self, index_id: IndexId) -> Option<Index> {
        let index = self.indices.remove(&index_id)?;
        if let Some(node) = self.nodes.get_mut(&index.node_id) {
            node.used_bytes = node.used_bytes.saturating_sub(index.reserved_bytes);
        }
        let repository_ids: Vec<RepositoryId> = self
            .repositories
            .values()
            .filter(|repository| repository.index_id == index_id)
            .map(|repository| repository.id)
            .collect();
        for repository_id in repository_ids {
            self.remove_repository(repository_id);
        }
        Some(index)
    }

    // ---------------------------------------------------------------------
    // Repositories

    pub fn add_repository(&mut self, repository: ZoektRepository) {
        self.repositories.insert(repository.id, repository);
    }

    pub fn repository(&self, repository_id: RepositoryId) -> Option<&ZoektRepository> {
        self.repositories.get(&repository_id)
    }

    pub fn repository_mut(&mut self, repository_id: RepositoryId) -> Option<&mut ZoektRepository> {
        self.repositories.get_mut(&repository_id)
    }

    pub fn repository_for(
        &self,
        index_id: IndexId,
        project_id: ProjectId,
    ) -> Option<&ZoektRepository> {
        self.repositories
            .values()
            .find(|repository| repository.index_id == index_id && repository.project_id == project_id)
    }

    pub fn repositories_for_index(&self, index_id: IndexId) -> Vec<&ZoektRepository> {
        let mut repositories: Vec<&ZoektRepository> = self
            .repositories
            .values()
            .filter(|repository| repository.index_id == index_id)
            .collect();
        repositories.sort_by_key(|repository| repository.id);
        repositories
    }

    /// Removes a repository and orphans its outstanding pending tasks.
    pub fn remove_repository(&mut self, repository_id: RepositoryId) -> Option<ZoektRepository> {
        let repository = self.repositories.remove(&repository_id)?;
        for task in self.tasks.values_mut() {
            if task.zoekt_repository_id == repository_id && task.state == TaskState::Pending {
                task.state = TaskState::Orphaned;
            }
        }
        Some(repository)
    }

    // ---------------------------------------------------------------------
    // Tasks

    pub fn add_task(&mut self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.get(&task_id)
    }

    pub fn task_mut(&mut self, task_id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&task_id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Pending tasks of a node ordered by (perform_at, id).
    pub fn pending_tasks_for_node(&self, node_id: &NodeId) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|task| task.node_id == *node_id && task.state == TaskState::Pending)
            .collect();
        tasks.sort_by_key(|task| (task.perform_at, task.id));
        tasks
    }

    // ---------------------------------------------------------------------
    // Derived state

    /// Whether every project the index is responsible for has a repository
    /// record. Gates the `pending -> initializing` index transition.
    pub fn index_fully_populated(&self, index_id: IndexId) -> bool {
        let Some(index) = self.index(index_id) else {
            return false;
        };
        self.projects_in_namespace(index.namespace_id)
            .into_iter()
            .filter(|project| index.covers_project(project.id))
            .all(|project| self.repository_for(index_id, project.id).is_some())
    }

    /// Whether every repository of the index finished indexing. Gates the
    /// `initializing -> ready` index transition.
    pub fn index_repositories_ready(&self, index_id: IndexId) -> bool {
        self.repositories_for_index(index_id)
            .iter()
            .all(|repository| repository.state == RepositoryState::Ready)
    }
}
