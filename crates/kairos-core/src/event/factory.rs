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

//! Construction of events by type name.
//!
//! Callers that only know an event's dotted type name at runtime (scripts,
//! consoles, config-driven triggers) go through registered factories instead
//! of concrete constructors.

use crate::event::{Event, EventPriority, EventRef};
use std::any::Any;
use std::sync::Arc;

/// Builds events from their dotted type names.
///
/// Factories registered with the [`EventManager`](crate::event::EventManager)
/// are consulted in registration order; returning `None` passes the name to
/// the next factory.
pub trait EventFactory: Send {
    /// Returns a fresh event for `type_name`, or `None` if this factory does
    /// not recognize the name.
    fn create(&self, type_name: &str) -> Option<EventRef>;
}

/// A plain text notification event.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    text: String,
    priority: EventPriority,
}

impl MessageEvent {
    /// Type name under which [`MessageEventFactory`] builds this event.
    pub const TYPE_NAME: &'static str = "message";

    /// A normal-priority message.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_priority(text, EventPriority::Normal)
    }

    /// A message with an explicit scheduling class.
    pub fn with_priority(text: impl Into<String>, priority: EventPriority) -> Self {
        Self {
            text: text.into(),
            priority,
        }
    }

    /// The message body.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Event for MessageEvent {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn priority(&self) -> EventPriority {
        self.priority
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`MessageEvent`], the built-in name-constructible event.
#[derive(Debug, Default)]
pub struct MessageEventFactory;

impl EventFactory for MessageEventFactory {
    fn create(&self, type_name: &str) -> Option<EventRef> {
        if type_name == MessageEvent::TYPE_NAME {
            Some(Arc::new(MessageEvent::new("")))
        } else {
            None
        }
    }
}
