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

use crate::payload::GitalyConnectionInfo;
use crate::{NamespaceId, ProjectId};

/// A project as the control plane sees it: enough to estimate storage during
/// planning and to build worker payloads. Registered out-of-band by the
/// surrounding application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub namespace_id: NamespaceId,
    /// Raw git repository size, before the planner applies its buffer factor.
    pub repository_size_bytes: u64,
    pub traversal_ids: Vec<NamespaceId>,
    pub visibility_level: u8,
    pub repository_access_level: u8,
    pub forked: bool,
    pub archived: bool,
    pub gitaly: GitalyConnectionInfo,
}
