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

//! Worker-facing payload shapes and the inbound completion callback.
//!
//! Field names follow the wire format the indexer daemon expects, hence the
//! PascalCase top-level keys.

use serde::{Deserialize, Serialize};

use crate::{NamespaceId, TaskId};

/// Serialized form of a task handed to a worker node.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskPayload {
    Index(IndexPayload),
    Delete(DeletePayload),
}

/// Payload for `index_repo` / `force_index_repo` tasks.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexPayload {
    pub repo_id: u64,
    pub file_size_limit: u64,
    pub parallelism: u16,
    pub timeout: String,
    pub file_count_limit: u64,
    pub trigram_max: u64,
    pub missing_repo: bool,
    pub metadata: ProjectMetadata,
    pub gitaly_connection_info: GitalyConnectionInfo,
    pub callback: CallbackDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}

/// Payload for `delete_repo` tasks.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeletePayload {
    pub repo_id: u64,
    pub callback: CallbackDescriptor,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectMetadata {
    pub project_id: u64,
    pub traversal_ids: Vec<NamespaceId>,
    pub visibility_level: u8,
    pub repository_access_level: u8,
    pub forked: bool,
    pub archived: bool,
}

/// Coordinates the worker needs to fetch the git repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GitalyConnectionInfo {
    pub address: String,
    pub token: String,
    pub storage: String,
    pub path: String,
}

/// Callback descriptor embedded in every payload, carrying the task id the
/// worker echoes back on completion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CallbackDescriptor {
    pub name: String,
    pub payload: CallbackPayload,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallbackPayload {
    Index {
        task_id: TaskId,
        schema_version: u16,
    },
    Delete {
        task_id: TaskId,
        service_type: String,
    },
}

/// Inbound completion callback reported by a worker.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TaskCallback {
    pub payload: TaskCallbackRef,
    #[serde(default)]
    pub additional_payload: Option<AdditionalCallbackPayload>,
    pub success: bool,
}

impl TaskCallback {
    pub fn task_id(&self) -> TaskId {
        self.payload.task_id
    }

    pub fn repo_stats(&self) -> Option<&RepoStats> {
        self.additional_payload
            .as_ref()
            .and_then(|additional| additional.repo_stats.as_ref())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TaskCallbackRef {
    pub task_id: TaskId,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AdditionalCallbackPayload {
    #[serde(default)]
    pub repo_stats: Option<RepoStats>,
}

/// Stats reported by the indexer after a successful run.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct RepoStats {
    pub size_in_bytes: u64,
    pub index_file_count: u64,
}

/// Per-task indexing limits handed to the worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexingLimits {
    pub file_size_limit: u64,
    pub parallelism: u16,
    pub timeout: String,
    pub file_count_limit: u64,
    pub trigram_max: u64,
}

impl Default for IndexingLimits {
    fn default() -> IndexingLimits {
        IndexingLimits {
            file_size_limit: 1 << 20,
            parallelism: 2,
            timeout: "30m".to_string(),
            file_count_limit: 500_000,
            trigram_max: 20_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_payload_wire_shape() {
        let payload = IndexPayload {
            repo_id: 42,
            file_size_limit: 1 << 20,
            parallelism: 2,
            timeout: "30m".to_string(),
            file_count_limit: 500_000,
            trigram_max: 20_000,
            missing_repo: false,
            metadata: ProjectMetadata {
                project_id: 42,
                traversal_ids: vec![NamespaceId(1)],
                visibility_level: 20,
                repository_access_level: 20,
                forked: false,
                archived: false,
            },
            gitaly_connection_info: GitalyConnectionInfo {
                address: "tcp://gitaly:8075".to_string(),
                token: "secret".to_string(),
                storage: "default".to_string(),
                path: "@hashed/ab/cd/abcd.git".to_string(),
            },
            callback: CallbackDescriptor {
                name: "index".to_string(),
                payload: CallbackPayload::Index {
                    task_id: TaskId::new(),
                    schema_version: 1,
                },
            },
            force: Some(true),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["RepoId"], 42);
        assert_eq!(json["FileSizeLimit"], 1 << 20);
        assert_eq!(json["GitalyConnectionInfo"]["Address"], "tcp://gitaly:8075");
        assert_eq!(json["Callback"]["name"], "index");
        assert_eq!(json["Callback"]["payload"]["schema_version"], 1);
        assert_eq!(json["Force"], true);
    }

    #[test]
    fn test_delete_payload_omits_force() {
        let payload = DeletePayload {
            repo_id: 7,
            callback: CallbackDescriptor {
                name: "delete".to_string(),
                payload: CallbackPayload::Delete {
                    task_id: TaskId::new(),
                    service_type: "zoekt".to_string(),
                },
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["RepoId"], 7);
        assert_eq!(json["Callback"]["name"], "delete");
        assert_eq!(json["Callback"]["payload"]["service_type"], "zoekt");
        assert!(json.get("Force").is_none());
    }

    #[test]
    fn test_task_callback_deserialization() {
        let task_id = TaskId::new();
        let json = format!(
            r#"{{
                "payload": {{ "task_id": "{task_id}" }},
                "additional_payload": {{
                    "repo_stats": {{ "size_in_bytes": 1234, "index_file_count": 10 }}
                }},
                "success": true
            }}"#
        );
        let callback: TaskCallback = serde_json::from_str(&json).unwrap();
        assert_eq!(callback.task_id(), task_id);
        assert!(callback.success);
        assert_eq!(callback.repo_stats().unwrap().size_in_bytes, 1234);
    }

    #[test]
    fn test_task_callback_without_stats() {
        let task_id = TaskId::new();
        let json = format!(
            r#"{{ "payload": {{ "task_id": "{task_id}" }}, "success": false }}"#
        );
        let callback: TaskCallback = serde_json::from_str(&json).unwrap();
        assert!(!callback.success);
        assert!(callback.repo_stats().is_none());
    }
}
