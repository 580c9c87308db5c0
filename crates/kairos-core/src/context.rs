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

//! Shared services handed to every task update.

use crate::event::EventManager;
use crate::time::Clock;
use std::sync::{Arc, Mutex};

/// The services a task may reach during its update.
///
/// Cloning is cheap: clones share the same clock and event manager, which is
/// how worker threads and the kernel see a single runtime. Both services sit
/// behind a `Mutex`; keep locks short-lived inside `update` and never call
/// back into the event manager from inside a subscriber it is delivering to.
#[derive(Clone)]
pub struct CoreContext {
    /// Channel registry and dispatch queues.
    pub events: Arc<Mutex<EventManager>>,
    /// Frame timing and time observers.
    pub clock: Arc<Mutex<Clock>>,
}

impl CoreContext {
    /// Creates a context with a fresh event manager and an unbound clock.
    ///
    /// Bind a [`TimeSource`](crate::time::TimeSource) to the clock before
    /// ticking, otherwise the clock task reports
    /// [`ClockError::NoTimeSource`](crate::time::ClockError::NoTimeSource).
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(EventManager::new())),
            clock: Arc::new(Mutex::new(Clock::new())),
        }
    }
}

impl Default for CoreContext {
    fn default() -> Self {
        Self::new()
    }
}
