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

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Atomic "set if not exists with expiry" store backing the [`Debouncer`].
///
/// Production deployments back this with a shared cache so the debounce holds
/// across processes. The in-memory implementation is good enough for a single
/// control plane process and for tests.
pub trait DebounceStore: fmt::Debug + Send + Sync + 'static {
    /// Sets `key` with the given time-to-live if it is absent or expired.
    ///
    /// Returns `true` if the key was set by this call, `false` if a live
    /// entry already existed.
    fn try_set(&self, key: &str, ttl: Duration) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemoryDebounceStore {
    deadlines: Mutex<HashMap<String, Instant>>,
}

impl DebounceStore for InMemoryDebounceStore {
    fn try_set(&self, key: &str, ttl: Duration) -> bool {
        let mut deadlines = self
            .deadlines
            .lock()
            .expect("the lock should not be poisoned");
        let now = Instant::now();
        match deadlines.get(key) {
            Some(deadline) if *deadline > now => false,
            _ => {
                deadlines.insert(key.to_string(), now + ttl);
                true
            }
        }
    }
}

/// Gate for periodic tasks that must not run more often than a fixed period.
///
/// `try_acquire` is a short-circuit: the first caller within a period wins and
/// runs the task, every other caller observes `false` and becomes a no-op for
/// that invocation.
#[derive(Debug, Clone)]
pub struct Debouncer {
    store: Arc<dyn DebounceStore>,
}

impl Debouncer {
    pub fn new(store: Arc<dyn DebounceStore>) -> Debouncer {
        Debouncer { store }
    }

    pub fn in_memory() -> Debouncer {
        Debouncer::new(Arc::new(InMemoryDebounceStore::default()))
    }

    pub fn try_acquire(&self, key: &str, period: Duration) -> bool {
        self.store.try_set(key, period)
    }
}
