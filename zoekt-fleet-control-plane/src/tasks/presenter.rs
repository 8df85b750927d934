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

//! Serializes a node's next batch of pending tasks into worker payloads.
//!
//! Presentation is strictly read-only: a presented task stays `pending`
//! until its completion callback arrives, so a worker crash between fetch
//! and callback leaves the task eligible for the next fetch.

use time::OffsetDateTime;
use zoekt_fleet_types::{
    CallbackDescriptor, CallbackPayload, DeletePayload, GitalyConnectionInfo, IndexPayload, Node,
    NodeId, ProjectMetadata, Task, TaskPayload, TaskType, WatermarkLevel,
};

use crate::model::FleetModel;
use crate::FleetConfig;

/// Returns up to `node.concurrency_limit` due pending tasks for `node_id`,
/// serialized in dispatch order.
///
/// At or above the high watermark only deletion tasks are handed out;
/// indexing work resumes once the node recovers. Offline or unknown nodes
/// get an empty batch.
pub fn present(
    model: &FleetModel,
    node_id: &NodeId,
    now: OffsetDateTime,
    config: &FleetConfig,
) -> Vec<TaskPayload> {
    let Some(node) = model.node(node_id) else {
        return Vec::new();
    };
    if !node.online {
        return Vec::new();
    }
    let deletes_only = node.watermark_level(&config.watermarks) >= WatermarkLevel::High;
    model
        .pending_tasks_for_node(node_id)
        .into_iter()
        .filter(|task| task.is_due(now))
        .filter(|task| !deletes_only || task.task_type.is_delete())
        .take(usize::from(node.concurrency_limit))
        .map(|task| serialize_task(model, node, task, config))
        .collect()
}

fn serialize_task(
    model: &FleetModel,
    node: &Node,
    task: &Task,
    config: &FleetConfig,
) -> TaskPayload {
    match task.task_type {
        TaskType::DeleteRepo => TaskPayload::Delete(DeletePayload {
            repo_id: task.project_id.0,
            callback: CallbackDescriptor {
                name: "delete".to_string(),
                payload: CallbackPayload::Delete {
                    task_id: task.id,
                    service_type: config.callback_service_type.clone(),
                },
            },
        }),
        TaskType::IndexRepo | TaskType::ForceIndexRepo => {
            let project = model.project(task.project_id);
            // A deleted project is still presented: `MissingRepo` tells the
            // worker to drop whatever it holds for this repo.
            let (metadata, gitaly_connection_info) = match project {
                Some(project) => (
                    ProjectMetadata {
                        project_id: project.id.0,
                        traversal_ids: project.traversal_ids.clone(),
                        visibility_level: project.visibility_level,
                        repository_access_level: project.repository_access_level,
                        forked: project.forked,
                        archived: project.archived,
                    },
                    project.gitaly.clone(),
                ),
                None => (
                    ProjectMetadata {
                        project_id: task.project_id.0,
                        traversal_ids: Vec::new(),
                        visibility_level: 0,
                        repository_access_level: 0,
                        forked: false,
                        archived: false,
                    },
                    GitalyConnectionInfo {
                        address: String::new(),
                        token: String::new(),
                        storage: String::new(),
                        path: String::new(),
                    },
                ),
            };
            let limits = &config.indexing_limits;
            TaskPayload::Index(IndexPayload {
                repo_id: task.project_id.0,
                file_size_limit: limits.file_size_limit,
                parallelism: limits.parallelism,
                timeout: limits.timeout.clone(),
                file_count_limit: limits.file_count_limit,
                trigram_max: limits.trigram_max,
                missing_repo: project.is_none(),
                metadata,
                gitaly_connection_info,
                callback: CallbackDescriptor {
                    name: "index".to_string(),
                    payload: CallbackPayload::Index {
                        task_id: task.id,
                        schema_version: node.schema_version,
                    },
                },
                force: (task.task_type == TaskType::ForceIndexRepo).then_some(true),
            })
        }
    }
}
