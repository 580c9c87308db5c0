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

//! # Kairos Script
//!
//! Command and scripting surface for the Kairos kernel.
//!
//! A [`CommandRegistry`] maps textual command names to closures, and
//! [`register_core_bindings`] wires the standard clock, task and event
//! commands into one. [`ScriptTask`] runs inside the kernel, draining
//! command lines queued from anywhere through its [`CommandQueue`] and
//! delegating `script.*` lines to a pluggable [`ScriptHost`] interpreter.

#![warn(missing_docs)]

pub mod bindings;
pub mod host;
pub mod registry;
pub mod task;

pub use bindings::register_core_bindings;
pub use host::ScriptHost;
pub use registry::{CommandFn, CommandRegistry, ScriptError};
pub use task::{CommandQueue, ScriptTask};
