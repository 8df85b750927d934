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

use zoekt_fleet_common::pubsub::Event;

use crate::{IndexId, RepositoryId};

/// Published exactly once when a task exhausts its retries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskFailedEvent {
    pub zoekt_repository_id: RepositoryId,
}

impl Event for TaskFailedEvent {}

/// Published by the orphan sweep for indices whose owning namespace or
/// replica no longer justifies their existence.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrphanedIndexEvent {
    pub index_ids: Vec<IndexId>,
}

impl Event for OrphanedIndexEvent {}

/// Published when orphaned indices are handed over to the deletion flow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexMarkedAsToDeleteEvent {
    pub index_ids: Vec<IndexId>,
}

impl Event for IndexMarkedAsToDeleteEvent {}
