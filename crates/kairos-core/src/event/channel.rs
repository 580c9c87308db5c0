// Copyright 2025 eraflo
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

//! A named event channel with a priority-ordered delivery queue.

use crate::event::{EventError, EventPriority, EventRef, SubscriberRef};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// A queued event together with the bookkeeping that orders it.
///
/// The heap pops the highest priority first; within one priority, the lowest
/// arrival sequence wins, which preserves publish order.
struct QueuedEvent {
    priority: EventPriority,
    seq: u64,
    event: EventRef,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A named pub/sub channel.
///
/// Subscribers are keyed by name and unordered relative to each other.
/// Published events wait in the channel's queue until [`flush`] drains them,
/// except [`EventPriority::Immediate`] events, which are handed to all
/// current subscribers synchronously from inside [`publish`].
///
/// [`flush`]: EventChannel::flush
/// [`publish`]: EventChannel::publish
pub struct EventChannel {
    name: String,
    subscribers: HashMap<String, SubscriberRef>,
    queue: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

impl EventChannel {
    /// Creates an empty channel with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: HashMap::new(),
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// The channel's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a subscriber under its own reported name.
    ///
    /// Rejects empty names and a second registration under the same name.
    pub fn subscribe(&mut self, subscriber: SubscriberRef) -> Result<(), EventError> {
        let key = subscriber.lock().unwrap().name().to_string();
        if key.is_empty() {
            return Err(EventError::UnnamedSubscriber(self.name.clone()));
        }
        if self.subscribers.contains_key(&key) {
            return Err(EventError::AlreadySubscribed {
                channel: self.name.clone(),
                subscriber: key,
            });
        }
        log::debug!(
            "[EventChannel] '{}' gained subscriber '{}'",
            self.name,
            key
        );
        subscriber.lock().unwrap().on_connect(&self.name);
        self.subscribers.insert(key, subscriber);
        Ok(())
    }

    /// Removes the subscriber registered under `name`.
    pub fn unsubscribe(&mut self, name: &str) -> Result<(), EventError> {
        match self.subscribers.remove(name) {
            Some(subscriber) => {
                log::debug!("[EventChannel] '{}' lost subscriber '{}'", self.name, name);
                subscriber.lock().unwrap().on_disconnect(&self.name);
                Ok(())
            }
            None => Err(EventError::NotSubscribed {
                channel: self.name.clone(),
                subscriber: name.to_string(),
            }),
        }
    }

    /// Removes every subscriber, notifying each one. Notification order is
    /// unspecified.
    pub fn disconnect_all(&mut self) {
        for (name, subscriber) in self.subscribers.drain() {
            log::debug!("[EventChannel] '{}' lost subscriber '{}'", self.name, name);
            subscriber.lock().unwrap().on_disconnect(&self.name);
        }
    }

    /// Publishes an event onto this channel.
    ///
    /// Immediate events reach every current subscriber before this call
    /// returns; everything else waits for the next [`flush`](EventChannel::flush).
    pub fn publish(&mut self, event: EventRef) {
        let priority = event.priority();
        if priority == EventPriority::Immediate {
            self.deliver(&event);
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(QueuedEvent {
            priority,
            seq,
            event,
        });
    }

    /// Drains the queue, delivering events in priority order (arrival order
    /// within one priority).
    pub fn flush(&mut self) {
        while let Some(queued) = self.queue.pop() {
            self.deliver(&queued.event);
        }
    }

    fn deliver(&self, event: &EventRef) {
        log::trace!(
            "[EventChannel] '{}' delivering '{}' to {} subscriber(s)",
            self.name,
            event.type_name(),
            self.subscribers.len()
        );
        for subscriber in self.subscribers.values() {
            subscriber.lock().unwrap().on_event(event);
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of events waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }
}
