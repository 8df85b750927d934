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

//! Per-repository task state machine.
//!
//! Tasks move `pending -> done` on a success callback, or burn through
//! `retries_left` on failure callbacks until they reach the terminal
//! `failed` state. Presentation to workers is read-only and lives in
//! [`presenter`]; a task stays `pending` until its worker reports back, so a
//! lost worker merely leaves the task eligible for redispatch.

pub mod presenter;

use std::num::NonZeroUsize;
use std::time::Duration;

use fnv::FnvHashSet;
use itertools::Itertools;
use rand::Rng;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};
use zoekt_fleet_common::cooldown::{CooldownMap, CooldownStatus};
use zoekt_fleet_common::pubsub::EventBroker;
use zoekt_fleet_types::{
    IndexId, IndexMarkedAsToDeleteEvent, IndexState, OrphanedIndexEvent, ProjectId, ReplicaState,
    RepositoryState, Task, TaskCallback, TaskError, TaskFailedEvent, TaskId, TaskState, TaskType,
    ZoektRepository, DEFAULT_REPOSITORY_RETRIES, DEFAULT_TASK_RETRIES,
};

use crate::model::FleetModel;
use crate::watermark::{self, Admission};
use crate::FleetConfig;

/// Upper bound on tracked per-index watermark cooldowns before the map
/// starts growing.
const WATERMARK_COOLDOWN_CAPACITY: usize = 4_096;

/// One task-creation request, targeting one project of one index.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskRequest {
    pub index_id: IndexId,
    pub project_id: ProjectId,
    pub task_type: TaskType,
    /// Minimum delay before the task becomes dispatchable.
    pub delay: Option<Duration>,
}

impl TaskRequest {
    pub fn new(index_id: IndexId, project_id: ProjectId, task_type: TaskType) -> TaskRequest {
        TaskRequest {
            index_id,
            project_id,
            task_type,
            delay: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskCreation {
    pub created_task_ids: Vec<TaskId>,
    /// Requests blocked by watermark admission. No task exists for these;
    /// the caller re-submits them after the backoff.
    pub deferred: Vec<DeferredRequest>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeferredRequest {
    pub index_id: IndexId,
    pub project_id: ProjectId,
    pub retry_after: Duration,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OrphanSweepOutcome {
    pub orphaned_index_ids: Vec<IndexId>,
    pub marked_for_deletion_index_ids: Vec<IndexId>,
}

/// Owns task creation, completion callbacks and the orphan sweep.
pub struct TaskLifecycleManager {
    event_broker: EventBroker,
    /// Short-circuits admission checks for indices whose node recently
    /// reported watermark pressure, sparing repeated node reads. Keyed by
    /// `(index, initial)` so a cooldown armed by an initial-indexing refusal
    /// never covers incremental updates the watermark lets through.
    watermark_cooldowns: CooldownMap<(IndexId, bool)>,
}

impl TaskLifecycleManager {
    pub fn new(event_broker: EventBroker) -> TaskLifecycleManager {
        TaskLifecycleManager {
            event_broker,
            watermark_cooldowns: CooldownMap::new(
                NonZeroUsize::new(WATERMARK_COOLDOWN_CAPACITY)
                    .expect("the capacity should be non-zero"),
            ),
        }
    }

    /// Bulk-creates pending tasks for the given requests, creating missing
    /// repository records on the fly.
    ///
    /// A small configurable share of plain indexing invocations is upgraded
    /// to force-reindex as a background freshness check. The coin is tossed
    /// once per invocation: either every upgradable request of this batch is
    /// upgraded or none is, and independent invocations draw independently.
    pub fn create_tasks(
        &mut self,
        model: &mut FleetModel,
        requests: &[TaskRequest],
        now: OffsetDateTime,
        config: &FleetConfig,
    ) -> TaskCreation {
        let force_upgrade = rand::thread_rng().gen_bool(config.force_reindex_probability());
        let mut creation = TaskCreation::default();
        let mut touched_index_ids: FnvHashSet<IndexId> = FnvHashSet::default();

        for request in requests {
            let Some(index) = model.index(request.index_id) else {
                warn!(index_id = %request.index_id, "task request for unknown index");
                continue;
            };
            let node_id = index.node_id.clone();
            let namespace_id = index.namespace_id;

            let force_reindex_namespace = model
                .namespace(namespace_id)
                .map(|namespace| namespace.metadata.force_reindex)
                .unwrap_or(false);
            let task_type = match request.task_type {
                TaskType::IndexRepo if force_reindex_namespace || force_upgrade => {
                    TaskType::ForceIndexRepo
                }
                task_type => task_type,
            };

            let repository = match model.repository_for(request.index_id, request.project_id) {
                Some(repository) => repository.clone(),
                None if task_type.is_delete() => {
                    warn!(
                        index_id = %request.index_id,
                        project_id = %request.project_id,
                        "delete request for unknown repository"
                    );
                    continue;
                }
                None => {
                    let repository = ZoektRepository::new(request.index_id, request.project_id);
                    model.add_repository(repository.clone());
                    repository
                }
            };

            if !task_type.is_delete() {
                let Some(node) = model.node(&node_id) else {
                    warn!(%node_id, index_id = %request.index_id, "task request for unknown node");
                    continue;
                };
                let initial_indexing = repository.awaiting_initial_indexing()
                    || task_type == TaskType::ForceIndexRepo;
                let cooldown_key = (request.index_id, initial_indexing);
                if self.watermark_cooldowns.status(&cooldown_key) == CooldownStatus::InCooldown {
                    creation.deferred.push(DeferredRequest {
                        index_id: request.index_id,
                        project_id: request.project_id,
                        retry_after: config.watermark_backoff(),
                    });
                    continue;
                }
                if let Admission::Backoff(backoff) =
                    watermark::admit(task_type, initial_indexing, node, config)
                {
                    self.watermark_cooldowns.update(cooldown_key, backoff);
                    info!(%node_id, index_id = %request.index_id, "indexing blocked by watermark");
                    creation.deferred.push(DeferredRequest {
                        index_id: request.index_id,
                        project_id: request.project_id,
                        retry_after: backoff,
                    });
                    continue;
                }
            }

            let task = Task {
                id: TaskId::new(),
                task_type,
                node_id,
                zoekt_repository_id: repository.id,
                project_id: request.project_id,
                state: TaskState::Pending,
                perform_at: now + request.delay.unwrap_or(Duration::ZERO),
                retries_left: DEFAULT_TASK_RETRIES,
            };
            creation.created_task_ids.push(task.id);
            model.add_task(task);
            touched_index_ids.insert(request.index_id);
        }

        // An index starts initializing once every project in its range has a
        // repository record.
        for index_id in touched_index_ids {
            let fully_populated = model.index_fully_populated(index_id);
            if let Some(index) = model.index_mut(index_id) {
                if index.state == IndexState::Pending && fully_populated {
                    index.state = IndexState::Initializing;
                    info!(%index_id, "index initializing");
                }
            }
        }
        creation
    }

    /// Applies one worker completion callback.
    ///
    /// Safe to replay: a callback for a task already in a terminal state is
    /// a no-op, so transport-level duplicates and late deliveries are
    /// harmless.
    pub fn process_callback(
        &mut self,
        model: &mut FleetModel,
        callback: &TaskCallback,
        now: OffsetDateTime,
    ) -> Result<(), TaskError> {
        let task_id = callback.task_id();
        let Some(task) = model.task(task_id) else {
            return Err(TaskError::UnknownTask { task_id });
        };
        let task = task.clone();
        if callback.success {
            self.process_success(model, &task, callback, now)
        } else {
            self.process_failure(model, &task);
            Ok(())
        }
    }

    fn process_success(
        &mut self,
        model: &mut FleetModel,
        task: &Task,
        callback: &TaskCallback,
        now: OffsetDateTime,
    ) -> Result<(), TaskError> {
        if task.state == TaskState::Done {
            return Ok(());
        }
        if task.task_type.is_delete() {
            // The repository may already be gone (cascaded away with its
            // index); the task still completes.
            model.remove_repository(task.zoekt_repository_id);
        } else {
            let Some(repository) = model.repository_mut(task.zoekt_repository_id) else {
                return Err(TaskError::MissingRepository { task_id: task.id });
            };
            repository.state = RepositoryState::Ready;
            repository.indexed_at = Some(now);
            repository.retries_left = DEFAULT_REPOSITORY_RETRIES;
            if let Some(stats) = callback.repo_stats() {
                repository.size_bytes = stats.size_in_bytes;
                repository.index_file_count = stats.index_file_count;
            }
        }
        if let Some(task) = model.task_mut(task.id) {
            task.state = TaskState::Done;
        }
        if !task.task_type.is_delete() {
            self.advance_index(model, task);
        }
        Ok(())
    }

    /// Promotes the index, its replica and finally the namespace's search
    /// flag as indexing completes bottom-up.
    fn advance_index(&mut self, model: &mut FleetModel, task: &Task) {
        let Some(repository) = model.repository(task.zoekt_repository_id) else {
            return;
        };
        let index_id = repository.index_id;
        let Some(index) = model.index(index_id) else {
            return;
        };
        let replica_id = index.replica_id;
        let namespace_id = index.namespace_id;

        if index.state != IndexState::Initializing
            || !model.index_fully_populated(index_id)
            || !model.index_repositories_ready(index_id)
        {
            return;
        }
        if let Some(index) = model.index_mut(index_id) {
            index.state = IndexState::Ready;
            info!(%index_id, "index ready");
        }

        let replica_ready = model
            .indices_for_replica(replica_id)
            .iter()
            .all(|index| index.state == IndexState::Ready);
        if !replica_ready {
            return;
        }
        if let Some(replica) = model.replica_mut(replica_id) {
            replica.state = ReplicaState::Ready;
            info!(%replica_id, "replica ready");
        }

        let num_ready_replicas = model
            .replicas_for_namespace(namespace_id)
            .iter()
            .filter(|replica| replica.state == ReplicaState::Ready)
            .count();
        let Some(namespace) = model.namespace_mut(namespace_id) else {
            return;
        };
        if num_ready_replicas >= usize::from(namespace.replica_count) && !namespace.search {
            namespace.search = true;
            info!(%namespace_id, "namespace serving search");
        }
    }

    fn process_failure(&mut self, model: &mut FleetModel, task: &Task) {
        if task.state != TaskState::Pending {
            return;
        }
        // The `> 1` guard routes the boundary case to the terminal branch,
        // so the counter never wraps below zero.
        if task.retries_left > 1 {
            if let Some(task) = model.task_mut(task.id) {
                task.retries_left -= 1;
            }
            return;
        }
        if let Some(task) = model.task_mut(task.id) {
            task.state = TaskState::Failed;
            task.retries_left = 0;
        }
        warn!(task_id = %task.id, repository_id = %task.zoekt_repository_id, "task failed");
        self.event_broker.publish(TaskFailedEvent {
            zoekt_repository_id: task.zoekt_repository_id,
        });
    }

    /// Finds indices whose owning namespace or replica no longer exists.
    ///
    /// Two-phase handover: a newly detected orphan is only marked, the next
    /// sweep hands it to the deletion flow. Detection and deletion stay
    /// decoupled so a flapping namespace record does not immediately destroy
    /// its indices.
    pub fn sweep_orphans(
        &mut self,
        model: &mut FleetModel,
        config: &FleetConfig,
    ) -> OrphanSweepOutcome {
        let to_delete: Vec<IndexId> = model
            .indices()
            .filter(|index| index.state == IndexState::Orphaned)
            .map(|index| index.id)
            .sorted()
            .collect();
        for &index_id in &to_delete {
            if let Some(index) = model.index_mut(index_id) {
                index.state = IndexState::PendingDeletion;
            }
        }
        for batch in &to_delete.iter().chunks(config.eviction_batch_size) {
            let index_ids: Vec<IndexId> = batch.copied().collect();
            info!(?index_ids, "indices marked for deletion");
            self.event_broker
                .publish(IndexMarkedAsToDeleteEvent { index_ids });
        }

        let orphaned: Vec<IndexId> = model
            .indices()
            .filter(|index| {
                matches!(
                    index.state,
                    IndexState::Pending | IndexState::Initializing | IndexState::Ready
                )
            })
            .filter(|index| {
                model.namespace(index.namespace_id).is_none()
                    || model.replica(index.replica_id).is_none()
            })
            .map(|index| index.id)
            .sorted()
            .collect();
        for &index_id in &orphaned {
            if let Some(index) = model.index_mut(index_id) {
                index.state = IndexState::Orphaned;
            }
        }
        for batch in &orphaned.iter().chunks(config.eviction_batch_size) {
            let index_ids: Vec<IndexId> = batch.copied().collect();
            warn!(?index_ids, "orphaned indices detected");
            self.event_broker.publish(OrphanedIndexEvent { index_ids });
        }

        OrphanSweepOutcome {
            orphaned_index_ids: orphaned,
            marked_for_deletion_index_ids: to_delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use zoekt_fleet_common::pubsub::EventSubscriber;
    use zoekt_fleet_types::{EnabledNamespace, NamespaceId, NodeId, Replica, TaskCallbackRef};

    use super::*;
    use crate::test_helpers::{test_index, test_node, test_project};

    struct Fixture {
        model: FleetModel,
        manager: TaskLifecycleManager,
        index_id: IndexId,
        config: FleetConfig,
    }

    fn fixture() -> Fixture {
        let mut model = FleetModel::default();
        model.upsert_node(test_node("node-1", 1_000));
        model.upsert_namespace(EnabledNamespace::new(NamespaceId(1), 1));
        model.upsert_project(test_project(ProjectId(1), NamespaceId(1), 10));
        model.upsert_project(test_project(ProjectId(2), NamespaceId(1), 10));

        let replica = Replica::new(NamespaceId(1));
        let mut index = test_index(&replica, "node-1", 60);
        index.project_id_from = Some(ProjectId(1));
        let index_id = index.id;
        model.add_replica(replica);
        model.add_index(index);

        let mut config = FleetConfig::default();
        // No stochastic upgrades unless a test opts in.
        config.force_reindex_percentage = 0.0;
        Fixture {
            model,
            manager: TaskLifecycleManager::new(EventBroker::default()),
            index_id,
            config,
        }
    }

    fn index_requests(fixture: &Fixture) -> Vec<TaskRequest> {
        vec![
            TaskRequest::new(fixture.index_id, ProjectId(1), TaskType::IndexRepo),
            TaskRequest::new(fixture.index_id, ProjectId(2), TaskType::IndexRepo),
        ]
    }

    fn success_callback(task_id: TaskId) -> TaskCallback {
        TaskCallback {
            payload: TaskCallbackRef { task_id },
            additional_payload: None,
            success: true,
        }
    }

    fn failure_callback(task_id: TaskId) -> TaskCallback {
        TaskCallback {
            payload: TaskCallbackRef { task_id },
            additional_payload: None,
            success: false,
        }
    }

    #[test]
    fn test_create_tasks_creates_repositories_lazily() {
        let mut fixture = fixture();
        let now = OffsetDateTime::now_utc();
        let requests = index_requests(&fixture);
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);

        assert_eq!(creation.created_task_ids.len(), 2);
        assert!(creation.deferred.is_empty());
        for project_id in [ProjectId(1), ProjectId(2)] {
            let repository = fixture
                .model
                .repository_for(fixture.index_id, project_id)
                .unwrap();
            assert_eq!(repository.state, RepositoryState::Pending);
        }
        // Every covered project has a repository record now.
        assert_eq!(
            fixture.model.index(fixture.index_id).unwrap().state,
            IndexState::Initializing
        );
    }

    #[test]
    fn test_create_tasks_namespace_force_reindex() {
        let mut fixture = fixture();
        fixture
            .model
            .namespace_mut(NamespaceId(1))
            .unwrap()
            .metadata
            .force_reindex = true;
        let now = OffsetDateTime::now_utc();
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(1),
            TaskType::IndexRepo,
        )];
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);

        let task = fixture.model.task(creation.created_task_ids[0]).unwrap();
        assert_eq!(task.task_type, TaskType::ForceIndexRepo);
    }

    #[test]
    fn test_create_tasks_stochastic_upgrade_applies_to_whole_batch() {
        let mut fixture = fixture();
        fixture.config.force_reindex_percentage = 100.0;
        let now = OffsetDateTime::now_utc();
        let requests = index_requests(&fixture);
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);

        for task_id in &creation.created_task_ids {
            assert_eq!(
                fixture.model.task(*task_id).unwrap().task_type,
                TaskType::ForceIndexRepo
            );
        }
    }

    #[test]
    fn test_create_tasks_watermark_deferral_and_cooldown() {
        let mut fixture = fixture();
        let node_id = NodeId::from("node-1");
        fixture.model.node_mut(&node_id).unwrap().used_bytes = 750;
        let now = OffsetDateTime::now_utc();
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(1),
            TaskType::IndexRepo,
        )];
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        assert!(creation.created_task_ids.is_empty());
        assert_eq!(creation.deferred.len(), 1);
        assert_eq!(
            creation.deferred[0].retry_after,
            fixture.config.watermark_backoff()
        );

        // The cooldown short-circuits even after the node recovers.
        fixture.model.node_mut(&node_id).unwrap().used_bytes = 0;
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        assert!(creation.created_task_ids.is_empty());
        assert_eq!(creation.deferred.len(), 1);
    }

    #[test]
    fn test_cooldown_from_initial_indexing_spares_incremental_updates() {
        let mut fixture = fixture();
        let node_id = NodeId::from("node-1");
        let now = OffsetDateTime::now_utc();
        // Project 2 completes a full indexing run while the node is healthy,
        // so its next request is an incremental update.
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(2),
            TaskType::IndexRepo,
        )];
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        fixture
            .manager
            .process_callback(
                &mut fixture.model,
                &success_callback(creation.created_task_ids[0]),
                now,
            )
            .unwrap();

        // Low watermark: initial indexing for project 1 is deferred and arms
        // the cooldown.
        fixture.model.node_mut(&node_id).unwrap().used_bytes = 650;
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(1),
            TaskType::IndexRepo,
        )];
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        assert!(creation.created_task_ids.is_empty());
        assert_eq!(creation.deferred.len(), 1);

        // The incremental update for project 2 passes both the watermark and
        // the armed cooldown.
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(2),
            TaskType::IndexRepo,
        )];
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        assert_eq!(creation.created_task_ids.len(), 1);
        assert!(creation.deferred.is_empty());
    }

    #[test]
    fn test_create_tasks_admits_deletes_on_overloaded_node() {
        let mut fixture = fixture();
        let now = OffsetDateTime::now_utc();
        // Seed the repository first, deletes never create one.
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(1),
            TaskType::IndexRepo,
        )];
        fixture
            .manager
            .create_tasks(&mut fixture.model, &requests, now, &fixture.config);

        let node_id = NodeId::from("node-1");
        fixture.model.node_mut(&node_id).unwrap().used_bytes = 950;
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(1),
            TaskType::DeleteRepo,
        )];
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        assert_eq!(creation.created_task_ids.len(), 1);
        assert!(creation.deferred.is_empty());
    }

    #[test]
    fn test_success_callback_is_idempotent() {
        let mut fixture = fixture();
        let now = OffsetDateTime::now_utc();
        let requests = index_requests(&fixture);
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        let task_id = creation.created_task_ids[0];

        let mut callback = success_callback(task_id);
        callback.additional_payload = Some(zoekt_fleet_types::AdditionalCallbackPayload {
            repo_stats: Some(zoekt_fleet_types::RepoStats {
                size_in_bytes: 1_234,
                index_file_count: 10,
            }),
        });
        let first_indexed_at = OffsetDateTime::now_utc();
        fixture
            .manager
            .process_callback(&mut fixture.model, &callback, first_indexed_at)
            .unwrap();

        let repository_id = fixture.model.task(task_id).unwrap().zoekt_repository_id;
        let repository = fixture.model.repository(repository_id).unwrap().clone();
        assert_eq!(repository.state, RepositoryState::Ready);
        assert_eq!(repository.size_bytes, 1_234);
        assert_eq!(repository.indexed_at, Some(first_indexed_at));
        assert_eq!(fixture.model.task(task_id).unwrap().state, TaskState::Done);

        // The duplicate callback must not touch the repository again.
        let later = first_indexed_at + Duration::from_secs(60);
        fixture
            .manager
            .process_callback(&mut fixture.model, &callback, later)
            .unwrap();
        let repository = fixture.model.repository(repository_id).unwrap();
        assert_eq!(repository.indexed_at, Some(first_indexed_at));
    }

    #[test]
    fn test_success_advances_index_replica_and_namespace() {
        let mut fixture = fixture();
        let now = OffsetDateTime::now_utc();
        let requests = index_requests(&fixture);
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);

        for (num_done, task_id) in creation.created_task_ids.iter().enumerate() {
            fixture
                .manager
                .process_callback(&mut fixture.model, &success_callback(*task_id), now)
                .unwrap();
            let index = fixture.model.index(fixture.index_id).unwrap();
            if num_done == 0 {
                assert_eq!(index.state, IndexState::Initializing);
            } else {
                assert_eq!(index.state, IndexState::Ready);
            }
        }
        let replica_id = fixture.model.index(fixture.index_id).unwrap().replica_id;
        assert_eq!(
            fixture.model.replica(replica_id).unwrap().state,
            ReplicaState::Ready
        );
        assert!(fixture.model.namespace(NamespaceId(1)).unwrap().search);
    }

    #[test]
    fn test_delete_success_with_missing_repository() {
        let mut fixture = fixture();
        let now = OffsetDateTime::now_utc();
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(1),
            TaskType::IndexRepo,
        )];
        fixture
            .manager
            .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        let repository_id = fixture
            .model
            .repository_for(fixture.index_id, ProjectId(1))
            .unwrap()
            .id;
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(1),
            TaskType::DeleteRepo,
        )];
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        let task_id = creation.created_task_ids[0];

        // The repository vanished before the worker reported back.
        fixture.model.remove_repository(repository_id);
        fixture
            .manager
            .process_callback(&mut fixture.model, &success_callback(task_id), now)
            .unwrap();
        assert_eq!(fixture.model.task(task_id).unwrap().state, TaskState::Done);
    }

    #[test]
    fn test_unknown_task_callback_is_an_error() {
        let mut fixture = fixture();
        let now = OffsetDateTime::now_utc();
        let callback = success_callback(TaskId::new());
        let error = fixture
            .manager
            .process_callback(&mut fixture.model, &callback, now)
            .unwrap_err();
        assert!(matches!(error, TaskError::UnknownTask { .. }));
    }

    #[test]
    fn test_failure_callback_retry_monotonicity() {
        let mut fixture = fixture();
        let now = OffsetDateTime::now_utc();
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(1),
            TaskType::IndexRepo,
        )];
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        let task_id = creation.created_task_ids[0];
        let callback = failure_callback(task_id);

        let mut observed = Vec::new();
        for _ in 0..DEFAULT_TASK_RETRIES + 2 {
            fixture
                .manager
                .process_callback(&mut fixture.model, &callback, now)
                .unwrap();
            let task = fixture.model.task(task_id).unwrap();
            observed.push((task.retries_left, task.state));
        }
        // 3 -> 2 -> 1 -> terminal failed at 0, then no-ops.
        assert_eq!(
            observed,
            vec![
                (2, TaskState::Pending),
                (1, TaskState::Pending),
                (0, TaskState::Failed),
                (0, TaskState::Failed),
                (0, TaskState::Failed),
            ]
        );
    }

    #[derive(Debug, Clone)]
    struct CountingSubscriber {
        counter: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSubscriber<TaskFailedEvent> for CountingSubscriber {
        async fn handle_event(&mut self, _event: TaskFailedEvent) {
            self.counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn test_task_failed_event_published_exactly_once() {
        let event_broker = EventBroker::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let _subscription = event_broker.subscribe(CountingSubscriber {
            counter: counter.clone(),
        });

        let mut fixture = fixture();
        fixture.manager = TaskLifecycleManager::new(event_broker);
        let now = OffsetDateTime::now_utc();
        let requests = vec![TaskRequest::new(
            fixture.index_id,
            ProjectId(1),
            TaskType::IndexRepo,
        )];
        let creation =
            fixture
                .manager
                .create_tasks(&mut fixture.model, &requests, now, &fixture.config);
        let task_id = creation.created_task_ids[0];
        fixture
            .model
            .task_mut(task_id)
            .unwrap()
            .retries_left = 1;

        let callback = failure_callback(task_id);
        fixture
            .manager
            .process_callback(&mut fixture.model, &callback, now)
            .unwrap();
        // A duplicate failure callback after the terminal transition.
        fixture
            .manager
            .process_callback(&mut fixture.model, &callback, now)
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        let task = fixture.model.task(task_id).unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.retries_left, 0);
    }

    #[test]
    fn test_sweep_orphans_two_phase() {
        let mut fixture = fixture();
        let index_id = fixture.index_id;
        fixture.model.remove_namespace(NamespaceId(1));

        let outcome = fixture
            .manager
            .sweep_orphans(&mut fixture.model, &fixture.config);
        assert_eq!(outcome.orphaned_index_ids, vec![index_id]);
        assert!(outcome.marked_for_deletion_index_ids.is_empty());
        assert_eq!(
            fixture.model.index(index_id).unwrap().state,
            IndexState::Orphaned
        );

        let outcome = fixture
            .manager
            .sweep_orphans(&mut fixture.model, &fixture.config);
        assert!(outcome.orphaned_index_ids.is_empty());
        assert_eq!(outcome.marked_for_deletion_index_ids, vec![index_id]);
        assert_eq!(
            fixture.model.index(index_id).unwrap().state,
            IndexState::PendingDeletion
        );
    }

    #[test]
    fn test_sweep_ignores_healthy_indices() {
        let mut fixture = fixture();
        let outcome = fixture
            .manager
            .sweep_orphans(&mut fixture.model, &fixture.config);
        assert_eq!(outcome, OrphanSweepOutcome::default());
        assert_eq!(
            fixture.model.index(fixture.index_id).unwrap().state,
            IndexState::Pending
        );
    }
}
