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

//! Central registry of event channels and event factories.

use crate::context::CoreContext;
use crate::event::{EventChannel, EventError, EventFactory, EventRef, SubscriberRef};
use crate::task::{Task, TaskError};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Channel the kernel publishes task lifecycle events on. Always present and
/// never removable.
pub const SYSTEM_CHANNEL: &str = "system";

/// Pseudo channel name that addresses every channel at once.
pub const BROADCAST: &str = "";

/// Owns all named [`EventChannel`]s and routes published events to them.
///
/// The manager is registered with the kernel as an ordinary task; its update
/// flushes every channel's queue once per tick. Subscriber callbacks run
/// while the manager is borrowed, so they must not call back into it; a
/// subscriber that wants to publish in reaction to an event keeps its own
/// queue and drains it from a task.
pub struct EventManager {
    channels: HashMap<String, EventChannel>,
    factories: Vec<Box<dyn EventFactory>>,
}

impl EventManager {
    /// Creates a manager holding only the [`SYSTEM_CHANNEL`].
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        channels.insert(
            SYSTEM_CHANNEL.to_string(),
            EventChannel::new(SYSTEM_CHANNEL),
        );
        Self {
            channels,
            factories: Vec::new(),
        }
    }

    /// Creates a new empty channel.
    ///
    /// The broadcast name and [`SYSTEM_CHANNEL`] are reserved; duplicates are
    /// rejected.
    pub fn create_channel(&mut self, name: &str) -> Result<(), EventError> {
        if name == BROADCAST || name == SYSTEM_CHANNEL {
            return Err(EventError::ReservedChannel(name.to_string()));
        }
        if self.channels.contains_key(name) {
            return Err(EventError::ChannelExists(name.to_string()));
        }
        log::info!("[EventManager] Channel '{}' created", name);
        self.channels
            .insert(name.to_string(), EventChannel::new(name));
        Ok(())
    }

    /// Removes a channel, dropping its queue after disconnecting every
    /// subscriber.
    pub fn remove_channel(&mut self, name: &str) -> Result<(), EventError> {
        if name == SYSTEM_CHANNEL {
            return Err(EventError::ReservedChannel(name.to_string()));
        }
        match self.channels.remove(name) {
            Some(mut channel) => {
                channel.disconnect_all();
                log::info!("[EventManager] Channel '{}' removed", name);
                Ok(())
            }
            None => Err(EventError::ChannelNotFound(name.to_string())),
        }
    }

    /// Registers a subscriber on a channel.
    pub fn subscribe(&mut self, channel: &str, subscriber: SubscriberRef) -> Result<(), EventError> {
        self.channels
            .get_mut(channel)
            .ok_or_else(|| EventError::ChannelNotFound(channel.to_string()))?
            .subscribe(subscriber)
    }

    /// Removes the named subscriber from a channel.
    pub fn unsubscribe(&mut self, channel: &str, subscriber: &str) -> Result<(), EventError> {
        self.channels
            .get_mut(channel)
            .ok_or_else(|| EventError::ChannelNotFound(channel.to_string()))?
            .unsubscribe(subscriber)
    }

    /// Publishes an event.
    ///
    /// With [`BROADCAST`] as the channel name the event is published on every
    /// channel; the shared payload is not copied. Immediate events are
    /// delivered synchronously per channel.
    pub fn emit(&mut self, channel: &str, event: EventRef) -> Result<(), EventError> {
        if channel == BROADCAST {
            for target in self.channels.values_mut() {
                target.publish(Arc::clone(&event));
            }
            return Ok(());
        }
        self.channels
            .get_mut(channel)
            .ok_or_else(|| EventError::ChannelNotFound(channel.to_string()))?
            .publish(event);
        Ok(())
    }

    /// Flushes every channel's queue.
    pub fn deliver_all(&mut self) {
        for channel in self.channels.values_mut() {
            channel.flush();
        }
    }

    /// Registers an event factory. Factories are consulted in registration
    /// order by [`create_event`](EventManager::create_event).
    pub fn register_factory(&mut self, factory: Box<dyn EventFactory>) {
        self.factories.push(factory);
    }

    /// Builds an event from its dotted type name, or `None` when no
    /// registered factory recognizes the name.
    pub fn create_event(&self, type_name: &str) -> Option<EventRef> {
        self.factories
            .iter()
            .find_map(|factory| factory.create(type_name))
    }

    /// Read access to a channel.
    pub fn channel(&self, name: &str) -> Option<&EventChannel> {
        self.channels.get(name)
    }

    /// Write access to a channel.
    pub fn channel_mut(&mut self, name: &str) -> Option<&mut EventChannel> {
        self.channels.get_mut(name)
    }

    /// True when a channel with this name exists.
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Number of channels, including the system channel.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for EventManager {
    fn name(&self) -> &str {
        "events"
    }

    fn update(&mut self, _context: &CoreContext) -> Result<(), TaskError> {
        self.deliver_all();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
