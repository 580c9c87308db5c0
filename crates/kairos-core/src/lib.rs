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

//! # Kairos Core
//!
//! Cooperative task kernel with prioritized scheduling, dependency gating,
//! channel-based event routing and frame timing. Hosts drive the runtime by
//! calling [`Kernel::one_tick`] in a loop.

#![warn(missing_docs)]

pub mod context;
pub mod event;
pub mod kernel;
pub mod resource;
pub mod task;
pub mod time;

pub use context::CoreContext;
pub use kernel::{Kernel, KernelError, KernelHandle, TickReport};
pub use task::{Task, TaskDescriptor, TaskError, TaskId, TaskRef};
pub use time::{Clock, FrameTiming, Timer};
