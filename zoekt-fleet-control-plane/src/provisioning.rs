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

//! Applies a previously computed [`Plan`](crate::planner::Plan) to the fleet
//! model.
//!
//! All mutations are staged on a clone of the model and swapped in at the
//! end, making one `execute` call all-or-nothing. Recoverable per-namespace
//! errors are collected and returned as data; they skip the affected
//! namespace (or index) without aborting the rest of the plan.

use bytesize::ByteSize;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};
use zoekt_fleet_types::{
    Index, IndexId, IndexState, NamespaceId, NodeId, ProvisioningError, Replica,
};

use crate::model::FleetModel;
use crate::planner::Plan;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProvisioningResult {
    pub errors: Vec<NamespaceProvisioningError>,
    pub created_index_ids: Vec<IndexId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NamespaceProvisioningError {
    pub namespace_id: NamespaceId,
    pub error: ProvisioningError,
}

/// Materializes the plan: destroys replicas scheduled for removal, creates
/// the planned replicas/indices and claims node storage.
///
/// Capacity is re-validated against the live node records, not the planner's
/// snapshot: another writer may have claimed storage since planning, and the
/// stale-snapshot race must not overcommit a node.
pub fn execute(model: &mut FleetModel, plan: &Plan) -> ProvisioningResult {
    let mut staged = model.clone();
    let mut errors: Vec<NamespaceProvisioningError> = Vec::new();
    let mut created_index_ids: Vec<IndexId> = Vec::new();

    for destroy_plan in &plan.destroy {
        for &replica_id in &destroy_plan.replica_ids {
            if staged.remove_replica(replica_id).is_some() {
                info!(
                    namespace_id = %destroy_plan.namespace_id,
                    %replica_id,
                    "destroyed replica"
                );
            }
        }
    }

    for namespace_plan in &plan.create {
        let namespace_id = namespace_plan.namespace_id;
        if staged.namespace(namespace_id).is_none() {
            warn!(%namespace_id, "missing_enabled_namespace: skipping namespace");
            errors.push(NamespaceProvisioningError {
                namespace_id,
                error: ProvisioningError::MissingEnabledNamespace { namespace_id },
            });
            continue;
        }

        // This plan supersedes whatever replicas the namespace had.
        let superseded: Vec<_> = staged
            .replicas_for_namespace(namespace_id)
            .iter()
            .map(|replica| replica.id)
            .collect();
        for replica_id in superseded {
            staged.remove_replica(replica_id);
        }

        // Provisioning must not double-assign: live indices outside any
        // replica (ad-hoc assignments) block the namespace.
        if !staged.indices_for_namespace(namespace_id).is_empty() {
            warn!(%namespace_id, "index_already_exists: skipping namespace");
            errors.push(NamespaceProvisioningError {
                namespace_id,
                error: ProvisioningError::IndexAlreadyExists { namespace_id },
            });
            continue;
        }

        for replica_plan in &namespace_plan.replicas {
            let replica = Replica::new(namespace_id);
            let replica_id = replica.id;
            staged.add_replica(replica);

            for index_plan in &replica_plan.indices {
                let node_id = index_plan.node_id.clone();
                let required_bytes = index_plan.required_storage_bytes;
                match validate_capacity(&staged, &node_id, required_bytes) {
                    Ok(()) => {}
                    Err(error) => {
                        warn!(%namespace_id, %node_id, %error, "skipping index");
                        errors.push(NamespaceProvisioningError {
                            namespace_id,
                            error,
                        });
                        continue;
                    }
                }
                let index = Index {
                    id: IndexId::new(),
                    replica_id,
                    namespace_id,
                    node_id: node_id.clone(),
                    reserved_bytes: required_bytes,
                    state: IndexState::Pending,
                    project_id_from: index_plan.project_id_from,
                    project_id_to: index_plan.project_id_to,
                };
                created_index_ids.push(index.id);
                staged.add_index(index);
                let node = staged
                    .node_mut(&node_id)
                    .expect("node presence was just validated");
                node.used_bytes += required_bytes;
                info!(
                    %namespace_id,
                    %node_id,
                    reserved = %ByteSize(required_bytes),
                    "created index"
                );
            }
        }

        let namespace = staged
            .namespace_mut(namespace_id)
            .expect("namespace presence was checked above");
        namespace.metadata.last_rollout_failed_at = None;
    }

    // Namespaces the planner could not place keep a failure marker so the
    // gradual rollout can back off and retry them later.
    let now = OffsetDateTime::now_utc();
    for failure in &plan.failures {
        if let Some(namespace) = staged.namespace_mut(failure.namespace_id) {
            namespace.metadata.last_rollout_failed_at = Some(now);
        }
    }

    *model = staged;
    ProvisioningResult {
        errors,
        created_index_ids,
    }
}

fn validate_capacity(
    staged: &FleetModel,
    node_id: &NodeId,
    required_bytes: u64,
) -> Result<(), ProvisioningError> {
    let Some(node) = staged.node(node_id) else {
        return Err(ProvisioningError::MissingNode {
            node_id: node_id.clone(),
        });
    };
    let unclaimed_bytes = node.unclaimed_bytes();
    if required_bytes > unclaimed_bytes {
        return Err(ProvisioningError::NodeCapacityExceeded {
            node_id: node_id.clone(),
            required_bytes,
            unclaimed_bytes,
        });
    }
    Ok(())
}
