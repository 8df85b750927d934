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

//! Storage-aware allocation planning.
//!
//! [`plan`] diffs each namespace's desired replica count against its
//! existing replicas and simulates filling new replicas with projects,
//! against an in-memory capacity snapshot. The output [`Plan`] is a pure
//! value: planning performs no I/O and mutates nothing, so it is safe to
//! call repeatedly and discard.

mod simulation;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use fnv::FnvHashSet;
use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, warn};
use zoekt_fleet_types::{NamespaceId, NodeId, PlanningError, ProjectId, ReplicaId};

use crate::model::FleetModel;
use crate::planner::simulation::{simulate_namespace, IndexSim, NodeArena};
use crate::FleetConfig;

/// Result of one planning run over a set of namespaces.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Plan {
    /// Sum of `required_storage_bytes` over all indices of all create plans.
    pub total_required_storage_bytes: u64,
    pub create: Vec<NamespaceCreatePlan>,
    pub destroy: Vec<NamespaceDestroyPlan>,
    pub unchanged: Vec<NamespaceId>,
    /// Per-node storage deltas, replayed from the create plans against the
    /// capacity snapshot taken at the start of planning.
    pub nodes: Vec<NodeChangeSummary>,
    /// Namespaces excluded from `create`/`destroy` because planning
    /// accumulated errors for them.
    pub failures: Vec<NamespaceFailure>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NamespaceCreatePlan {
    pub namespace_id: NamespaceId,
    pub replicas: Vec<ReplicaPlan>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReplicaPlan {
    pub indices: Vec<IndexPlan>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndexPlan {
    pub node_id: NodeId,
    pub required_storage_bytes: u64,
    /// Node headroom frozen when this index was opened during simulation.
    pub max_storage_bytes: u64,
    pub project_id_from: Option<ProjectId>,
    pub project_id_to: Option<ProjectId>,
}

impl From<IndexSim> for IndexPlan {
    fn from(sim: IndexSim) -> IndexPlan {
        IndexPlan {
            node_id: sim.node_id,
            required_storage_bytes: sim.required_storage_bytes,
            max_storage_bytes: sim.max_storage_bytes,
            project_id_from: sim.project_id_from,
            project_id_to: sim.project_id_to,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NamespaceDestroyPlan {
    pub namespace_id: NamespaceId,
    pub replica_ids: Vec<ReplicaId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeChangeSummary {
    pub node_id: NodeId,
    pub claimed_storage_bytes: u64,
    pub unclaimed_storage_bytes_before: u64,
    pub unclaimed_storage_bytes_after: u64,
    pub namespace_ids: Vec<NamespaceId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NamespaceFailure {
    pub namespace_id: NamespaceId,
    pub errors: Vec<PlanningError>,
}

/// Computes an assignment plan for the given namespaces against a capacity
/// snapshot of the online nodes.
///
/// Per namespace, the action is `create` (desired replicas > existing),
/// `destroy` (desired < existing, less-ready replicas selected first) or
/// `unchanged`. A namespace whose simulation accumulates any error lands in
/// `failures` and contributes nothing to `create`/`destroy`; planning
/// continues for the other namespaces.
pub fn plan(model: &FleetModel, namespace_ids: &[NamespaceId], config: &FleetConfig) -> Plan {
    let mut arena = NodeArena::from_model(model);
    let mut create: Vec<NamespaceCreatePlan> = Vec::new();
    let mut destroy: Vec<NamespaceDestroyPlan> = Vec::new();
    let mut unchanged: Vec<NamespaceId> = Vec::new();
    let mut failures: Vec<NamespaceFailure> = Vec::new();

    for &namespace_id in namespace_ids {
        let Some(namespace) = model.namespace(namespace_id) else {
            debug!(%namespace_id, "skipping unknown namespace");
            continue;
        };
        let existing_replicas = model.replicas_for_namespace(namespace_id);
        let num_existing = existing_replicas.len();
        let num_desired = namespace.replica_count as usize;

        match num_desired.cmp(&num_existing) {
            Ordering::Equal => {
                unchanged.push(namespace_id);
            }
            Ordering::Less => {
                // Less-ready replicas go first: state ascending, id descending.
                let replica_ids: Vec<ReplicaId> = existing_replicas
                    .into_iter()
                    .sorted_by(|left, right| {
                        left.state.cmp(&right.state).then(right.id.cmp(&left.id))
                    })
                    .take(num_existing - num_desired)
                    .map(|replica| replica.id)
                    .collect();
                destroy.push(NamespaceDestroyPlan {
                    namespace_id,
                    replica_ids,
                });
            }
            Ordering::Greater => {
                let projects = model.projects_in_namespace(namespace_id);
                // Nodes already hosting an index of this namespace are off
                // limits for new replicas.
                let mut exhausted: FnvHashSet<NodeId> = model
                    .indices_for_namespace(namespace_id)
                    .iter()
                    .map(|index| index.node_id.clone())
                    .collect();
                let simulation = simulate_namespace(
                    &projects,
                    num_desired - num_existing,
                    &mut arena,
                    &mut exhausted,
                    config,
                );
                if simulation.errors.is_empty() {
                    let replicas = simulation
                        .replicas
                        .into_iter()
                        .map(|indices| ReplicaPlan {
                            indices: indices.into_iter().map(IndexPlan::from).collect(),
                        })
                        .collect();
                    create.push(NamespaceCreatePlan {
                        namespace_id,
                        replicas,
                    });
                } else {
                    warn!(%namespace_id, errors = ?simulation.errors, "namespace planning failed");
                    failures.push(NamespaceFailure {
                        namespace_id,
                        errors: simulation.errors,
                    });
                }
            }
        }
    }

    let nodes = summarize_node_changes(model, &create);
    let total_required_storage_bytes = create
        .iter()
        .flat_map(|namespace_plan| &namespace_plan.replicas)
        .flat_map(|replica_plan| &replica_plan.indices)
        .map(|index_plan| index_plan.required_storage_bytes)
        .sum();

    Plan {
        total_required_storage_bytes,
        create,
        destroy,
        unchanged,
        nodes,
        failures,
    }
}

/// Replays every create-plan index's storage claim against the snapshot to
/// produce per-node before/after summaries.
fn summarize_node_changes(
    model: &FleetModel,
    create: &[NamespaceCreatePlan],
) -> Vec<NodeChangeSummary> {
    let mut claims: BTreeMap<NodeId, (u64, BTreeSet<NamespaceId>)> = BTreeMap::new();
    for namespace_plan in create {
        for replica_plan in &namespace_plan.replicas {
            for index_plan in &replica_plan.indices {
                let (claimed, namespace_ids) =
                    claims.entry(index_plan.node_id.clone()).or_default();
                *claimed += index_plan.required_storage_bytes;
                namespace_ids.insert(namespace_plan.namespace_id);
            }
        }
    }
    claims
        .into_iter()
        .map(|(node_id, (claimed_storage_bytes, namespace_ids))| {
            let unclaimed_before = model
                .node(&node_id)
                .map(|node| node.unclaimed_bytes())
                .unwrap_or(0);
            NodeChangeSummary {
                node_id,
                claimed_storage_bytes,
                unclaimed_storage_bytes_before: unclaimed_before,
                unclaimed_storage_bytes_after: unclaimed_before
                    .saturating_sub(claimed_storage_bytes),
                namespace_ids: namespace_ids.into_iter().collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use zoekt_fleet_types::{EnabledNamespace, Replica, ReplicaState};

    use super::*;
    use crate::test_helpers::{test_node, test_project};

    fn model_with_nodes(node_specs: &[(&str, u64)]) -> FleetModel {
        let mut model = FleetModel::default();
        for (node_id, total_bytes) in node_specs {
            model.upsert_node(test_node(node_id, *total_bytes));
        }
        model
    }

    #[test]
    fn test_plan_single_project_single_node() {
        let mut model = model_with_nodes(&[("node-1", 1_000)]);
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 1));
        model.upsert_project(test_project(ProjectId(1), NamespaceId(1), 100));

        let plan = plan(&model, &[NamespaceId(1)], &FleetConfig::default());

        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.failures.len(), 0);
        let namespace_plan = &plan.create[0];
        assert_eq!(namespace_plan.replicas.len(), 1);
        let index_plan = &namespace_plan.replicas[0].indices[0];
        assert_eq!(index_plan.node_id, NodeId::from("node-1"));
        assert_eq!(index_plan.required_storage_bytes, 300);
        assert_eq!(index_plan.project_id_from, Some(ProjectId(1)));
        assert_eq!(index_plan.project_id_to, None);
        assert_eq!(plan.total_required_storage_bytes, 300);

        assert_eq!(plan.nodes.len(), 1);
        let node_summary = &plan.nodes[0];
        assert_eq!(node_summary.claimed_storage_bytes, 300);
        assert_eq!(node_summary.unclaimed_storage_bytes_before, 1_000);
        assert_eq!(node_summary.unclaimed_storage_bytes_after, 700);
        assert_eq!(node_summary.namespace_ids, vec![NamespaceId(1)]);
    }

    #[test]
    fn test_plan_node_unavailable() {
        let mut model = model_with_nodes(&[("node-1", 200)]);
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 1));
        model.upsert_project(test_project(ProjectId(1), NamespaceId(1), 100));

        let plan = plan(&model, &[NamespaceId(1)], &FleetConfig::default());

        assert!(plan.create.is_empty());
        assert_eq!(plan.failures.len(), 1);
        assert_eq!(plan.failures[0].namespace_id, NamespaceId(1));
        assert_eq!(
            plan.failures[0].errors,
            vec![PlanningError::NodeUnavailable {
                project_id: Some(ProjectId(1)),
                required_bytes: 300,
            }]
        );
        assert_eq!(plan.total_required_storage_bytes, 0);
    }

    #[test]
    fn test_plan_opens_new_index_when_full() {
        let mut model = model_with_nodes(&[("node-1", 1_000), ("node-2", 1_000)]);
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 1));
        model.upsert_project(test_project(ProjectId(1), NamespaceId(1), 200));
        model.upsert_project(test_project(ProjectId(2), NamespaceId(1), 200));

        let plan = plan(&model, &[NamespaceId(1)], &FleetConfig::default());

        let indices = &plan.create[0].replicas[0].indices;
        assert_eq!(indices.len(), 2);
        assert_eq!(indices[0].node_id, NodeId::from("node-1"));
        assert_eq!(indices[0].required_storage_bytes, 600);
        // Sealed when the second index was opened.
        assert_eq!(indices[0].project_id_from, Some(ProjectId(1)));
        assert_eq!(indices[0].project_id_to, Some(ProjectId(1)));
        assert_eq!(indices[1].node_id, NodeId::from("node-2"));
        assert_eq!(indices[1].project_id_from, Some(ProjectId(2)));
        assert_eq!(indices[1].project_id_to, None);
        assert_eq!(plan.total_required_storage_bytes, 1_200);
    }

    #[test]
    fn test_plan_replicas_never_share_a_node() {
        let mut model = model_with_nodes(&[("node-1", 1_000), ("node-2", 1_000)]);
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 2));
        model.upsert_project(test_project(ProjectId(1), NamespaceId(1), 100));

        let plan = plan(&model, &[NamespaceId(1)], &FleetConfig::default());

        let replicas = &plan.create[0].replicas;
        assert_eq!(replicas.len(), 2);
        assert_ne!(
            replicas[0].indices[0].node_id,
            replicas[1].indices[0].node_id
        );
    }

    #[test]
    fn test_plan_fails_when_not_enough_nodes_for_replicas() {
        let mut model = model_with_nodes(&[("node-1", 1_000), ("node-2", 1_000)]);
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 3));
        model.upsert_project(test_project(ProjectId(1), NamespaceId(1), 100));

        let plan = plan(&model, &[NamespaceId(1)], &FleetConfig::default());

        assert!(plan.create.is_empty());
        assert_eq!(plan.failures.len(), 1);
        assert!(matches!(
            plan.failures[0].errors[0],
            PlanningError::NodeUnavailable { .. }
        ));
    }

    #[test]
    fn test_plan_index_limit_exceeded() {
        let mut model = model_with_nodes(&[("node-1", 700), ("node-2", 700)]);
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 1));
        model.upsert_project(test_project(ProjectId(1), NamespaceId(1), 200));
        model.upsert_project(test_project(ProjectId(2), NamespaceId(1), 200));
        let config = FleetConfig {
            max_indices_per_replica: 1,
            ..FleetConfig::default()
        };

        let plan = plan(&model, &[NamespaceId(1)], &config);

        assert!(plan.create.is_empty());
        assert_eq!(
            plan.failures[0].errors,
            vec![PlanningError::IndexLimitExceeded { limit: 1 }]
        );
    }

    #[test]
    fn test_plan_empty_namespace_picks_roomiest_node() {
        let mut model = model_with_nodes(&[("node-1", 500), ("node-2", 2_000)]);
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 1));

        let plan = plan(&model, &[NamespaceId(1)], &FleetConfig::default());

        let index_plan = &plan.create[0].replicas[0].indices[0];
        assert_eq!(index_plan.node_id, NodeId::from("node-2"));
        assert_eq!(index_plan.required_storage_bytes, 0);
        assert_eq!(index_plan.project_id_from, None);
    }

    #[test]
    fn test_plan_destroy_prefers_less_ready_replicas() {
        let mut model = model_with_nodes(&[("node-1", 1_000)]);
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 1));

        let mut ready = Replica::new(NamespaceId(1));
        ready.state = ReplicaState::Ready;
        let pending_a = Replica::new(NamespaceId(1));
        let pending_b = Replica::new(NamespaceId(1));
        let ready_id = ready.id;
        let pending_ids = [pending_a.id, pending_b.id];
        model.add_replica(ready);
        model.add_replica(pending_a);
        model.add_replica(pending_b);

        let plan = plan(&model, &[NamespaceId(1)], &FleetConfig::default());

        assert_eq!(plan.destroy.len(), 1);
        let destroyed = &plan.destroy[0].replica_ids;
        assert_eq!(destroyed.len(), 2);
        // Both pending replicas go before the ready one, highest id first.
        assert!(!destroyed.contains(&ready_id));
        let max_pending = pending_ids.iter().max().unwrap();
        assert_eq!(destroyed[0], *max_pending);
    }

    #[test]
    fn test_plan_unchanged_namespace() {
        let mut model = model_with_nodes(&[("node-1", 1_000)]);
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 1));
        model.add_replica(Replica::new(NamespaceId(1)));

        let plan = plan(&model, &[NamespaceId(1)], &FleetConfig::default());

        assert_eq!(plan.unchanged, vec![NamespaceId(1)]);
        assert!(plan.create.is_empty());
        assert!(plan.destroy.is_empty());
    }

    #[test]
    fn test_plan_is_pure_and_deterministic() {
        let mut model = model_with_nodes(&[("node-1", 1_000), ("node-2", 800)]);
        for namespace_ord in 1..=3u64 {
            model.upsert_namespace(EnabledNamespace::new(NamespaceId(namespace_ord), 1));
            model.upsert_project(test_project(
                ProjectId(namespace_ord * 10),
                NamespaceId(namespace_ord),
                100,
            ));
        }
        let namespace_ids: Vec<NamespaceId> = model.namespace_ids();
        let config = FleetConfig::default();

        let first_plan = plan(&model, &namespace_ids, &config);
        let second_plan = plan(&model, &namespace_ids, &config);
        assert_eq!(first_plan, second_plan);

        // Planning alone must not touch persisted state.
        assert_eq!(model.node(&NodeId::from("node-1")).unwrap().used_bytes, 0);
        assert_eq!(model.node(&NodeId::from("node-2")).unwrap().used_bytes, 0);
        assert!(model.indices().next().is_none());
    }

    #[test]
    fn test_plan_skips_offline_nodes() {
        let mut model = model_with_nodes(&[("node-1", 10_000)]);
        model.node_mut(&NodeId::from("node-1")).unwrap().online = false;
        model.upsert_node(test_node("node-2", 1_000));
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 1));
        model.upsert_project(test_project(ProjectId(1), NamespaceId(1), 100));

        let plan = plan(&model, &[NamespaceId(1)], &FleetConfig::default());

        assert_eq!(
            plan.create[0].replicas[0].indices[0].node_id,
            NodeId::from("node-2")
        );
    }
}
