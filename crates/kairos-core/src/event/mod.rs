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

//! Priority-ordered publish/subscribe event routing.
//!
//! Events are immutable, reference-counted payloads published onto named
//! [`EventChannel`]s. Non-immediate events wait in a per-channel priority
//! queue until the channel is flushed; [`EventPriority::Immediate`] events
//! bypass the queue and reach subscribers synchronously.

pub mod channel;
pub mod factory;
pub mod manager;

pub use channel::EventChannel;
pub use factory::{EventFactory, MessageEvent, MessageEventFactory};
pub use manager::{EventManager, BROADCAST, SYSTEM_CHANNEL};

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Scheduling class of an event within a channel's queue.
///
/// Higher priorities drain first; events of equal priority are delivered in
/// arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    /// Drained after everything else.
    Low,
    /// Default class for gameplay and housekeeping traffic.
    Normal,
    /// Drained before normal traffic.
    High,
    /// Never queued: delivered synchronously at publish time.
    Immediate,
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An immutable event payload.
///
/// Implementations are shared behind [`EventRef`], so one publish can fan
/// out to every channel without copying the payload.
pub trait Event: Send + Sync {
    /// Dotted type name (e.g. `"task.start"`), used for factory construction
    /// and logging.
    fn type_name(&self) -> &str;

    /// Scheduling class applied when the event is published.
    fn priority(&self) -> EventPriority {
        EventPriority::Normal
    }

    /// Allows subscribers to downcast to the concrete payload type.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to an immutable event payload.
pub type EventRef = Arc<dyn Event>;

/// A sink for delivered events.
///
/// Subscribers are keyed by name within a channel; delivery order across the
/// subscribers of one channel is unspecified. `on_event` must not call back
/// into the [`EventManager`] that is delivering to it.
pub trait EventSubscriber: Send {
    /// Registry key for this subscriber. Unique within a channel.
    fn name(&self) -> &str;

    /// Receives one event. Called once per delivered event.
    fn on_event(&mut self, event: &EventRef);

    /// Called after the subscriber is registered on a channel.
    fn on_connect(&mut self, _channel: &str) {}

    /// Called when the subscriber is removed from a channel, including when
    /// the whole channel is removed.
    fn on_disconnect(&mut self, _channel: &str) {}
}

/// Shared handle to a subscriber.
pub type SubscriberRef = Arc<Mutex<dyn EventSubscriber>>;

/// Error raised by channel and manager operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A channel with this name already exists.
    ChannelExists(String),
    /// No channel with this name exists.
    ChannelNotFound(String),
    /// The name is reserved for kernel use and cannot be created or removed.
    ReservedChannel(String),
    /// The subscriber reported an empty name and cannot be registered.
    UnnamedSubscriber(String),
    /// The subscriber is already registered on the channel.
    AlreadySubscribed {
        /// Channel the registration targeted.
        channel: String,
        /// Name of the offending subscriber.
        subscriber: String,
    },
    /// The subscriber is not registered on the channel.
    NotSubscribed {
        /// Channel the removal targeted.
        channel: String,
        /// Name of the missing subscriber.
        subscriber: String,
    },
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::ChannelExists(name) => {
                write!(f, "Event channel '{}' already exists", name)
            }
            EventError::ChannelNotFound(name) => {
                write!(f, "Event channel '{}' not found", name)
            }
            EventError::ReservedChannel(name) => {
                write!(f, "Event channel name '{}' is reserved", name)
            }
            EventError::UnnamedSubscriber(channel) => {
                write!(
                    f,
                    "Subscribers on channel '{}' must report a non-empty name",
                    channel
                )
            }
            EventError::AlreadySubscribed {
                channel,
                subscriber,
            } => {
                write!(
                    f,
                    "Subscriber '{}' is already registered on channel '{}'",
                    subscriber, channel
                )
            }
            EventError::NotSubscribed {
                channel,
                subscriber,
            } => {
                write!(
                    f,
                    "Subscriber '{}' is not registered on channel '{}'",
                    subscriber, channel
                )
            }
        }
    }
}

impl std::error::Error for EventError {}
