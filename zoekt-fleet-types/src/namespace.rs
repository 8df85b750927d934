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

use crate::NamespaceId;

/// A root namespace opted into code search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnabledNamespace {
    pub namespace_id: NamespaceId,
    /// Desired number of full copies of this namespace's search index.
    pub replica_count: u16,
    /// Whether the namespace currently serves search traffic. Flipped off
    /// during eviction, back on once replicas are fully covered again.
    pub search: bool,
    pub metadata: NamespaceMetadata,
}

impl EnabledNamespace {
    pub fn new(namespace_id: NamespaceId, replica_count: u16) -> EnabledNamespace {
        EnabledNamespace {
            namespace_id,
            replica_count,
            search: false,
            metadata: NamespaceMetadata::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceMetadata {
    /// Set when a planning/provisioning rollout for this namespace failed,
    /// cleared on the next successful provisioning.
    pub last_rollout_failed_at: Option<OffsetDateTime>,
    /// Forces all indexing tasks for this namespace to be full reindexes.
    pub force_reindex: bool,
}
