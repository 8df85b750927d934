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

use std::fmt;

use fnv::FnvHashSet;
use zoekt_fleet_types::NamespaceId;

/// Behavior toggles evaluated at runtime, possibly scoped to a namespace.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PolicyFlag {
    /// Routes search queries through ready replicas instead of joining
    /// searchable indices directly.
    ReplicaPathRouting,
}

/// Injected capability answering "is this behavior enabled here?".
///
/// Control-loop tasks receive a gate at construction instead of consulting
/// an ambient feature-flag service, so tests can inject deterministic policy.
pub trait PolicyGate: fmt::Debug + Send + Sync {
    fn enabled(&self, flag: PolicyFlag, namespace_id: Option<NamespaceId>) -> bool;
}

/// Gate with a fixed set of enabled flags, ignoring scope.
#[derive(Debug, Default)]
pub struct StaticPolicyGate {
    enabled_flags: FnvHashSet<PolicyFlag>,
}

impl StaticPolicyGate {
    pub fn with_flags(flags: impl IntoIterator<Item = PolicyFlag>) -> StaticPolicyGate {
        StaticPolicyGate {
            enabled_flags: flags.into_iter().collect(),
        }
    }
}

impl PolicyGate for StaticPolicyGate {
    fn enabled(&self, flag: PolicyFlag, _namespace_id: Option<NamespaceId>) -> bool {
        self.enabled_flags.contains(&flag)
    }
}
