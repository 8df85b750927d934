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

//! In-process event pubsub.
//!
//! The broker is strictly local: only events published in-process reach the
//! subscribers. Control-loop code publishes lifecycle events (task failures,
//! orphaned indices) and downstream consumers subscribe to them.
//!
//! Subscriptions live in a single table keyed by the event's `TypeId`. Each
//! entry is a type-erased dispatch closure built at subscription time: it
//! downcasts the published event, clones it and hands it to its subscriber
//! on a dedicated tokio task.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;

/// Handlers are dropped if they take longer than this to complete.
const SUBSCRIBER_TIMEOUT: Duration = Duration::from_secs(600);

pub trait Event: fmt::Debug + Clone + Send + Sync + 'static {}

#[async_trait]
pub trait EventSubscriber<E>: Send + Sync + 'static {
    async fn handle_event(&mut self, event: E);
}

type DispatchFn = Box<dyn Fn(&dyn Any) + Send + Sync>;

struct Subscription {
    subscription_id: usize,
    dispatch: DispatchFn,
}

#[derive(Clone, Default)]
pub struct EventBroker {
    inner: Arc<InnerEventBroker>,
}

#[derive(Default)]
struct InnerEventBroker {
    subscription_sequence: AtomicUsize,
    subscriptions: Mutex<HashMap<TypeId, Vec<Subscription>>>,
}

impl fmt::Debug for EventBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let num_subscriptions = self
            .inner
            .subscriptions
            .lock()
            .map(|subscriptions| subscriptions.values().map(Vec::len).sum::<usize>())
            .unwrap_or(0);
        f.debug_struct("EventBroker")
            .field("num_subscriptions", &num_subscriptions)
            .finish()
    }
}

impl EventBroker {
    /// Subscribes to an event type.
    ///
    /// The subscription lives until the returned handle is dropped or
    /// cancelled.
    pub fn subscribe<E>(&self, subscriber: impl EventSubscriber<E>) -> EventSubscriptionHandle
    where E: Event {
        let subscription_id = self
            .inner
            .subscription_sequence
            .fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(tokio::sync::Mutex::new(subscriber));
        let dispatch: DispatchFn = Box::new(move |any_event| {
            let event = any_event
                .downcast_ref::<E>()
                .expect("the event type should match its subscription entry")
                .clone();
            let subscriber = subscriber.clone();
            tokio::spawn(async move {
                let mut subscriber = subscriber.lock().await;
                let _ = tokio::time::timeout(SUBSCRIBER_TIMEOUT, subscriber.handle_event(event))
                    .await;
            });
        });
        self.inner
            .subscriptions
            .lock()
            .expect("the lock should not be poisoned")
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscription {
                subscription_id,
                dispatch,
            });
        EventSubscriptionHandle {
            event_type_id: TypeId::of::<E>(),
            subscription_id,
            broker: Arc::downgrade(&self.inner),
        }
    }

    /// Publishes an event.
    ///
    /// Each subscriber runs on its own tokio task. Publishing with no
    /// subscribers registered for `E` spawns nothing, so it is safe to call
    /// from outside a runtime in that case.
    pub fn publish<E>(&self, event: E)
    where E: Event {
        let subscriptions = self
            .inner
            .subscriptions
            .lock()
            .expect("the lock should not be poisoned");

        if let Some(typed_subscriptions) = subscriptions.get(&TypeId::of::<E>()) {
            for subscription in typed_subscriptions {
                (subscription.dispatch)(&event);
            }
        }
    }
}

pub struct EventSubscriptionHandle {
    event_type_id: TypeId,
    subscription_id: usize,
    broker: Weak<InnerEventBroker>,
}

impl EventSubscriptionHandle {
    pub fn cancel(self) {}
}

impl Drop for EventSubscriptionHandle {
    fn drop(&mut self) {
        let Some(broker) = self.broker.upgrade() else {
            return;
        };
        let mut subscriptions = broker
            .subscriptions
            .lock()
            .expect("the lock should not be poisoned");
        if let Some(typed_subscriptions) = subscriptions.get_mut(&self.event_type_id) {
            typed_subscriptions
                .retain(|subscription| subscription.subscription_id != self.subscription_id);
        }
    }
}
