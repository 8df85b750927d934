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

//! Builds the per-query search routing table.
//!
//! The table maps each requested project to exactly one serving node. When a
//! project is reachable through several nodes (multiple replicas), it goes
//! to the node serving the largest batch of this query, so a single search
//! request fans out to as few nodes as possible.

use std::collections::{BTreeMap, BTreeSet};

use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;
use zoekt_fleet_types::{NamespaceId, NodeId, ProjectId, ReplicaState, RoutingError};

use crate::model::FleetModel;
use crate::policy::{PolicyFlag, PolicyGate};
use crate::FleetConfig;

/// Resolves `project_ids` to their serving nodes.
///
/// Duplicate ids are collapsed. Projects with no searchable serving index
/// (unknown, namespace not enabled, namespace not serving search) are left
/// out of the table. Requests beyond `max_routing_projects` are rejected
/// outright: the table is built in memory per query.
pub fn route(
    model: &FleetModel,
    project_ids: &[ProjectId],
    policy_gate: &dyn PolicyGate,
    config: &FleetConfig,
) -> Result<FnvHashMap<NodeId, Vec<ProjectId>>, RoutingError> {
    if project_ids.len() > config.max_routing_projects {
        return Err(RoutingError::TooManyProjects {
            requested: project_ids.len(),
            limit: config.max_routing_projects,
        });
    }
    let unique_project_ids: BTreeSet<ProjectId> = project_ids.iter().copied().collect();

    let mut groups: BTreeMap<NodeId, BTreeSet<ProjectId>> = BTreeMap::new();
    for project_id in unique_project_ids {
        let Some(project) = model.project(project_id) else {
            continue;
        };
        let Some(namespace) = model.namespace(project.namespace_id) else {
            continue;
        };
        if !namespace.search {
            continue;
        }
        let replica_path =
            policy_gate.enabled(PolicyFlag::ReplicaPathRouting, Some(namespace.namespace_id));
        for node_id in serving_nodes(model, project_id, namespace.namespace_id, replica_path) {
            groups.entry(node_id).or_default().insert(project_id);
        }
    }

    // Largest group first; node id breaks ties so the table is stable for
    // identical inputs.
    let ordered_groups = groups
        .into_iter()
        .sorted_by(|(left_node, left), (right_node, right)| {
            right
                .len()
                .cmp(&left.len())
                .then_with(|| left_node.cmp(right_node))
        });

    let mut claimed: FnvHashSet<ProjectId> = FnvHashSet::default();
    let mut table: FnvHashMap<NodeId, Vec<ProjectId>> = FnvHashMap::default();
    for (node_id, group) in ordered_groups {
        let project_ids: Vec<ProjectId> = group
            .into_iter()
            .filter(|project_id| claimed.insert(*project_id))
            .collect();
        if !project_ids.is_empty() {
            table.insert(node_id, project_ids);
        }
    }
    Ok(table)
}

/// Nodes with a searchable copy of `project_id`, through one of two join
/// paths selected by feature toggle: ready replicas, or searchable indices
/// joined directly.
fn serving_nodes(
    model: &FleetModel,
    project_id: ProjectId,
    namespace_id: NamespaceId,
    replica_path: bool,
) -> Vec<NodeId> {
    if replica_path {
        model
            .replicas_for_namespace(namespace_id)
            .into_iter()
            .filter(|replica| replica.state == ReplicaState::Ready)
            .flat_map(|replica| model.indices_for_replica(replica.id))
            .filter(|index| index.covers_project(project_id))
            .map(|index| index.node_id.clone())
            .collect()
    } else {
        model
            .indices_for_namespace(namespace_id)
            .into_iter()
            .filter(|index| index.searchable() && index.covers_project(project_id))
            .map(|index| index.node_id.clone())
            .collect()
    }
}
