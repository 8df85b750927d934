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

use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

/// A map that keeps track of a cooldown deadline for each of its keys.
///
/// Internally it uses an [`LruCache`] to prune the oldest entries when the
/// capacity is reached. If the capacity is reached but the oldest entry is not
/// outdated, the capacity is extended (2x).
pub struct CooldownMap<K>(LruCache<K, Instant>);

#[derive(Debug, PartialEq)]
pub enum CooldownStatus {
    Ready,
    InCooldown,
}

impl<K: Hash + Eq> CooldownMap<K> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self(LruCache::new(capacity))
    }

    /// Returns the current status of `key` without arming a new cooldown.
    pub fn status(&mut self, key: &K) -> CooldownStatus {
        let now = Instant::now();
        match self.0.get(key) {
            Some(deadline) if *deadline > now => CooldownStatus::InCooldown,
            _ => CooldownStatus::Ready,
        }
    }

    /// Arms the cooldown for the given key if it isn't currently in cooldown.
    ///
    /// The status returned is the one before the update (after an update, the
    /// status is always `InCooldown`).
    pub fn update(&mut self, key: K, cooldown_interval: Duration) -> CooldownStatus {
        let deadline_opt = self.0.get_mut(&key);
        let now = Instant::now();
        if let Some(deadline) = deadline_opt {
            if *deadline > now {
                CooldownStatus::InCooldown
            } else {
                *deadline = now + cooldown_interval;
                CooldownStatus::Ready
            }
        } else {
            let capacity: usize = self.0.cap().into();
            if self.0.len() == capacity {
                let grow = match self.0.peek_lru() {
                    Some((_, deadline)) => *deadline > now,
                    None => false,
                };
                if grow {
                    // the oldest entry is not outdated, grow the LRU
                    self.0.resize(NonZeroUsize::new(capacity * 2).unwrap());
                }
            }
            self.0.push(key, now + cooldown_interval);
            CooldownStatus::Ready
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_map_status_is_read_only() {
        let mut cooldown_map: CooldownMap<&str> = CooldownMap::new(NonZeroUsize::new(4).unwrap());
        assert_eq!(cooldown_map.status(&"idx"), CooldownStatus::Ready);
        // status() must not arm a cooldown
        assert_eq!(cooldown_map.status(&"idx"), CooldownStatus::Ready);
        assert_eq!(
            cooldown_map.update("idx", Duration::from_secs(5)),
            CooldownStatus::Ready
        );
        assert_eq!(cooldown_map.status(&"idx"), CooldownStatus::InCooldown);
    }

    #[test]
    fn test_cooldown_map_resize() {
        let mut cooldown_map = CooldownMap::new(NonZeroUsize::new(2).unwrap());
        let cooldown_interval = Duration::from_secs(1);
        assert_eq!(
            cooldown_map.update("key1", cooldown_interval),
            CooldownStatus::Ready
        );
        assert_eq!(
            cooldown_map.update("key1", cooldown_interval),
            CooldownStatus::InCooldown
        );
        assert_eq!(
            cooldown_map.update("key2", cooldown_interval),
            CooldownStatus::Ready
        );
        // Hitting the capacity, the map should grow transparently
        assert_eq!(
            cooldown_map.update("key3", cooldown_interval),
            CooldownStatus::Ready
        );
        assert_eq!(
            cooldown_map.update("key1", cooldown_interval),
            CooldownStatus::InCooldown
        );
        assert_eq!(
            cooldown_map.update("key2", cooldown_interval),
            CooldownStatus::InCooldown
        );
        assert_eq!(cooldown_map.0.cap(), NonZeroUsize::new(4).unwrap());
    }

    #[test]
    fn test_cooldown_map_expired() {
        let mut cooldown_map = CooldownMap::new(NonZeroUsize::new(2).unwrap());
        let cooldown_interval_short = Duration::from_millis(50);
        let cooldown_interval_long = Duration::from_secs(5);

        assert_eq!(
            cooldown_map.update("key_short", cooldown_interval_short),
            CooldownStatus::Ready
        );
        assert_eq!(
            cooldown_map.update("key_long", cooldown_interval_long),
            CooldownStatus::Ready
        );

        std::thread::sleep(cooldown_interval_short.mul_f32(1.5));
        assert_eq!(
            cooldown_map.update("key_short", cooldown_interval_short),
            CooldownStatus::Ready
        );
        assert_eq!(
            cooldown_map.update("key_long", cooldown_interval_long),
            CooldownStatus::InCooldown
        );
    }
}
