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

//! Resource lifetime notifications.
//!
//! Hosts that hand resources (scripts, plugin data, assets) to the runtime
//! register a [`ResourceTracker`] to hear about load and unload transitions.
//! [`ResourceLedger`] is the bundled tracker used when a host only needs
//! counting and duplicate detection.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Error raised by resource tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A resource with this name was already reported as loaded.
    AlreadyLoaded(String),
    /// The resource was never reported as loaded.
    NotLoaded(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::AlreadyLoaded(name) => {
                write!(f, "Resource '{}' is already loaded", name)
            }
            ResourceError::NotLoaded(name) => write!(f, "Resource '{}' is not loaded", name),
        }
    }
}

impl std::error::Error for ResourceError {}

/// Receives load and unload notifications for named resources.
pub trait ResourceTracker: Send {
    /// Called when a resource finished loading.
    fn resource_loaded(&mut self, name: &str) -> Result<(), ResourceError>;

    /// Called when a resource was released.
    fn resource_unloaded(&mut self, name: &str) -> Result<(), ResourceError>;
}

/// Shared, thread-safe handle to a tracker.
pub type ResourceTrackerRef = Arc<Mutex<dyn ResourceTracker>>;

/// Tracker that keeps the set of currently loaded resource names.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    loaded: HashSet<String>,
}

impl ResourceLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently loaded resources.
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// True when the named resource is currently loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains(name)
    }
}

impl ResourceTracker for ResourceLedger {
    fn resource_loaded(&mut self, name: &str) -> Result<(), ResourceError> {
        if !self.loaded.insert(name.to_string()) {
            return Err(ResourceError::AlreadyLoaded(name.to_string()));
        }
        log::debug!("[ResourceLedger] '{}' loaded", name);
        Ok(())
    }

    fn resource_unloaded(&mut self, name: &str) -> Result<(), ResourceError> {
        if !self.loaded.remove(name) {
            return Err(ResourceError::NotLoaded(name.to_string()));
        }
        log::debug!("[ResourceLedger] '{}' unloaded", name);
        Ok(())
    }
}
