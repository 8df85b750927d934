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

//! Evicts namespaces off overloaded nodes.
//!
//! Nodes at or above the high watermark stop accepting indexing work, but
//! only eviction brings them back under the low watermark. Evicted
//! namespaces are not re-provisioned here: the next planning run sees them
//! as namespaces with missing indices and places them again, on nodes with
//! room.

use std::collections::BTreeSet;

use bytesize::ByteSize;
use fnv::FnvHashMap;
use itertools::Itertools;
use serde::Serialize;
use tracing::info;
use zoekt_fleet_common::debounce::Debouncer;
use zoekt_fleet_types::{NamespaceId, NodeId, ReplicaId, WatermarkLevel};

use crate::model::FleetModel;
use crate::FleetConfig;

/// Shared debounce key. The interval applies to the whole system, not per
/// node: one rebalance pass visits every overloaded node.
pub const REBALANCE_DEBOUNCE_KEY: &str = "rebalance";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RebalanceOutcome {
    pub evictions: Vec<NodeEviction>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeEviction {
    pub node_id: NodeId,
    pub namespace_ids: Vec<NamespaceId>,
    pub reclaimed_bytes: u64,
}

/// Runs one eviction pass over every online node at or above the high
/// watermark. Returns `None` when the debouncer short-circuits the run.
pub fn rebalance(
    model: &mut FleetModel,
    debouncer: &Debouncer,
    config: &FleetConfig,
) -> Option<RebalanceOutcome> {
    if !debouncer.try_acquire(REBALANCE_DEBOUNCE_KEY, config.rebalance_debounce()) {
        return None;
    }
    let overloaded: Vec<NodeId> = model
        .online_nodes()
        .filter(|node| node.watermark_level(&config.watermarks) >= WatermarkLevel::High)
        .map(|node| node.id.clone())
        .collect();

    let mut evictions = Vec::new();
    for node_id in overloaded {
        if let Some(eviction) = evict_from_node(model, &node_id, config) {
            evictions.push(eviction);
        }
    }
    Some(RebalanceOutcome { evictions })
}

/// Selects namespaces hosted on `node_id` by ascending footprint and
/// destroys their replicas touching that node until the projected
/// utilization falls below the low watermark. The next planning run sees
/// the missing replicas and places them again, on nodes with room.
///
/// Smallest-footprint-first bounds the data moved per eviction at the cost
/// of disrupting more namespaces.
fn evict_from_node(
    model: &mut FleetModel,
    node_id: &NodeId,
    config: &FleetConfig,
) -> Option<NodeEviction> {
    let node = model.node(node_id)?;
    let total_bytes = node.total_bytes;
    let mut running_used_bytes = node.used_bytes;

    let mut footprints: FnvHashMap<NamespaceId, u64> = FnvHashMap::default();
    let mut replica_ids_by_namespace: FnvHashMap<NamespaceId, BTreeSet<ReplicaId>> =
        FnvHashMap::default();
    for index in model.indices_for_node(node_id) {
        *footprints.entry(index.namespace_id).or_default() += index.reserved_bytes;
        replica_ids_by_namespace
            .entry(index.namespace_id)
            .or_default()
            .insert(index.replica_id);
    }

    let candidates = footprints
        .into_iter()
        .sorted_by_key(|(namespace_id, footprint)| (*footprint, *namespace_id));

    let mut selected: Vec<NamespaceId> = Vec::new();
    let mut reclaimed_bytes = 0u64;
    for (namespace_id, footprint) in candidates {
        if (running_used_bytes as f64 / total_bytes as f64) < config.watermarks.low {
            break;
        }
        running_used_bytes = running_used_bytes.saturating_sub(footprint);
        reclaimed_bytes += footprint;
        selected.push(namespace_id);
    }
    if selected.is_empty() {
        return None;
    }

    for batch in &selected.iter().chunks(config.eviction_batch_size) {
        let batch: Vec<NamespaceId> = batch.copied().collect();
        for &namespace_id in &batch {
            // Stale results must not be served while the namespace has no
            // full copy; search comes back once planning re-covers it.
            if let Some(namespace) = model.namespace_mut(namespace_id) {
                namespace.search = false;
            }
            if let Some(replica_ids) = replica_ids_by_namespace.remove(&namespace_id) {
                for replica_id in replica_ids {
                    model.remove_replica(replica_id);
                }
            }
        }
        info!(%node_id, namespace_ids = ?batch, "evicted namespace batch");
    }
    info!(
        %node_id,
        reclaimed = %ByteSize(reclaimed_bytes),
        num_namespaces = selected.len(),
        "rebalanced node"
    );
    Some(NodeEviction {
        node_id: node_id.clone(),
        namespace_ids: selected,
        reclaimed_bytes,
    })
}
