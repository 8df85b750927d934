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

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{IndexId, ProjectId, RepositoryId};

/// Schema default for `retries_left`, restored on every successful indexing
/// run (future failures are treated as a new problem).
pub const DEFAULT_REPOSITORY_RETRIES: u16 = 10;

/// One project's repository within an index. Created lazily the first time an
/// indexing task targets the project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoektRepository {
    pub id: RepositoryId,
    pub index_id: IndexId,
    pub project_id: ProjectId,
    pub state: RepositoryState,
    pub size_bytes: u64,
    pub index_file_count: u64,
    pub retries_left: u16,
    pub indexed_at: Option<OffsetDateTime>,
}

impl ZoektRepository {
    pub fn new(index_id: IndexId, project_id: ProjectId) -> ZoektRepository {
        ZoektRepository {
            id: RepositoryId::new(),
            index_id,
            project_id,
            state: RepositoryState::Pending,
            size_bytes: 0,
            index_file_count: 0,
            retries_left: DEFAULT_REPOSITORY_RETRIES,
            indexed_at: None,
        }
    }

    /// A repository that never completed an indexing run. Initial indexing is
    /// subject to the low watermark, incremental updates are not.
    pub fn awaiting_initial_indexing(&self) -> bool {
        matches!(
            self.state,
            RepositoryState::Pending | RepositoryState::Initializing
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryState {
    Pending,
    Initializing,
    Ready,
    Failed,
}
