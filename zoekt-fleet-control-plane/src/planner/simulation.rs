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

use fnv::FnvHashSet;
use zoekt_fleet_types::{NodeId, PlanningError, Project, ProjectId};

use crate::model::FleetModel;
use crate::FleetConfig;

/// Mutable working copy of node capacities, built once from the model at the
/// start of planning and discarded afterwards. The caller's state is never
/// mutated; claims recorded here only steer the rest of the same planning
/// run.
pub(crate) struct NodeArena {
    nodes: Vec<WorkingNode>,
}

struct WorkingNode {
    node_id: NodeId,
    unclaimed_bytes: u64,
}

impl NodeArena {
    /// Snapshots online nodes in ascending node-id order.
    pub fn from_model(model: &FleetModel) -> NodeArena {
        let nodes = model
            .online_nodes()
            .map(|node| WorkingNode {
                node_id: node.id.clone(),
                unclaimed_bytes: node.unclaimed_bytes(),
            })
            .collect();
        NodeArena { nodes }
    }

    fn claim(&mut self, node_id: &NodeId, num_bytes: u64) {
        if let Some(node) = self
            .nodes
            .iter_mut()
            .find(|node| node.node_id == *node_id)
        {
            node.unclaimed_bytes = node.unclaimed_bytes.saturating_sub(num_bytes);
        }
    }

    /// First node in snapshot order with room for `required_bytes`, skipping
    /// nodes already exhausted for the namespace being planned.
    fn best_fit(
        &self,
        required_bytes: u64,
        exhausted: &FnvHashSet<NodeId>,
    ) -> Option<(NodeId, u64)> {
        self.nodes
            .iter()
            .find(|node| {
                !exhausted.contains(&node.node_id) && node.unclaimed_bytes >= required_bytes
            })
            .map(|node| (node.node_id.clone(), node.unclaimed_bytes))
    }

    /// Non-exhausted node with the most unclaimed space, for "empty" replicas
    /// of project-less namespaces.
    fn most_unclaimed(&self, exhausted: &FnvHashSet<NodeId>) -> Option<(NodeId, u64)> {
        self.nodes
            .iter()
            .filter(|node| !exhausted.contains(&node.node_id))
            .max_by_key(|node| node.unclaimed_bytes)
            .map(|node| (node.node_id.clone(), node.unclaimed_bytes))
    }
}

/// One simulated index: node pin, storage bookkeeping and project range.
/// `max_storage_bytes` is frozen at the node's unclaimed space when the index
/// was opened.
pub(crate) struct IndexSim {
    pub node_id: NodeId,
    pub max_storage_bytes: u64,
    pub required_storage_bytes: u64,
    pub project_id_from: Option<ProjectId>,
    pub project_id_to: Option<ProjectId>,
}

pub(crate) struct NamespaceSimulation {
    pub replicas: Vec<Vec<IndexSim>>,
    pub errors: Vec<PlanningError>,
}

fn scaled_size(repository_size_bytes: u64, buffer_factor: f64) -> u64 {
    (repository_size_bytes as f64 * buffer_factor).ceil() as u64
}

/// Simulates filling `num_replicas` new replicas with the namespace's
/// projects, claiming storage from the arena as it goes.
///
/// `exhausted` carries the nodes already hosting (or now chosen to host) an
/// index of this namespace. A node used by one replica is never reused by
/// another replica of the same namespace: the replica is the redundancy
/// domain, collocating two replicas would defeat it.
pub(crate) fn simulate_namespace(
    projects: &[&Project],
    num_replicas: usize,
    arena: &mut NodeArena,
    exhausted: &mut FnvHashSet<NodeId>,
    config: &FleetConfig,
) -> NamespaceSimulation {
    let mut replicas = Vec::with_capacity(num_replicas);
    let mut errors = Vec::new();
    for _ in 0..num_replicas {
        let (indices, replica_errors) = simulate_replica(projects, arena, exhausted, config);
        errors.extend(replica_errors);
        replicas.push(indices);
    }
    NamespaceSimulation { replicas, errors }
}

fn simulate_replica(
    projects: &[&Project],
    arena: &mut NodeArena,
    exhausted: &mut FnvHashSet<NodeId>,
    config: &FleetConfig,
) -> (Vec<IndexSim>, Vec<PlanningError>) {
    let mut indices: Vec<IndexSim> = Vec::new();
    let mut errors: Vec<PlanningError> = Vec::new();

    if projects.is_empty() {
        match arena.most_unclaimed(exhausted) {
            Some((node_id, unclaimed_bytes)) => {
                exhausted.insert(node_id.clone());
                indices.push(IndexSim {
                    node_id,
                    max_storage_bytes: unclaimed_bytes,
                    required_storage_bytes: 0,
                    project_id_from: None,
                    project_id_to: None,
                });
            }
            None => {
                errors.push(PlanningError::NodeUnavailable {
                    project_id: None,
                    required_bytes: 0,
                });
            }
        }
        return (indices, errors);
    }

    let mut last_assigned: Option<ProjectId> = None;
    for project in projects {
        let required_bytes = scaled_size(project.repository_size_bytes, config.buffer_factor);
        if let Some(current) = indices.last_mut() {
            if current.required_storage_bytes + required_bytes <= current.max_storage_bytes {
                current.required_storage_bytes += required_bytes;
                let node_id = current.node_id.clone();
                arena.claim(&node_id, required_bytes);
                last_assigned = Some(project.id);
                continue;
            }
        }
        if indices.len() == config.max_indices_per_replica {
            errors.push(PlanningError::IndexLimitExceeded {
                limit: config.max_indices_per_replica,
            });
            break;
        }
        let Some((node_id, unclaimed_bytes)) = arena.best_fit(required_bytes, exhausted) else {
            errors.push(PlanningError::NodeUnavailable {
                project_id: Some(project.id),
                required_bytes,
            });
            break;
        };
        // The previous index is sealed: its range ends at the last project
        // it actually received.
        if let Some(previous) = indices.last_mut() {
            previous.project_id_to = last_assigned;
        }
        exhausted.insert(node_id.clone());
        arena.claim(&node_id, required_bytes);
        indices.push(IndexSim {
            node_id,
            max_storage_bytes: unclaimed_bytes,
            required_storage_bytes: required_bytes,
            project_id_from: Some(project.id),
            project_id_to: None,
        });
        last_assigned = Some(project.id);
    }
    (indices, errors)
}
