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

//! Traits and core types for schedulable units of work (Tasks).

pub mod worker;

use crate::context::CoreContext;
use crate::event::EventError;
use crate::time::ClockError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A stable identifier assigned to a task when it is attached to the kernel.
///
/// Identifiers are never reused within a kernel's lifetime, so a stale id
/// held after removal simply stops resolving instead of aliasing a newer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a task as tracked by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Attached but not yet executed, or stopped after execution.
    Stopped,
    /// Actively driven by the kernel (or by its worker thread).
    Running,
    /// Temporarily excluded from execution until resumed.
    Suspended,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Distinguishes housekeeping tasks owned by the kernel from user tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// A task registered by the embedding application.
    User,
    /// A task the kernel registered for its own housekeeping.
    System,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Attachment parameters for [`Kernel::add_task`](crate::kernel::Kernel::add_task).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Signed priority key. Lower values execute earlier in the tick.
    pub order: i32,
    /// When set, the task runs on its own worker thread instead of the
    /// kernel's cooperative scan.
    pub threaded: bool,
    /// User or system classification.
    pub kind: TaskKind,
    /// Whether `remove_task` may destroy this task. Protected tasks are
    /// only torn down by `shutdown`.
    pub can_kill: bool,
}

impl Default for TaskDescriptor {
    fn default() -> Self {
        Self {
            order: 0,
            threaded: false,
            kind: TaskKind::User,
            can_kill: true,
        }
    }
}

impl TaskDescriptor {
    /// Descriptor for a cooperative task at the given priority.
    pub fn with_order(order: i32) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Descriptor for a task driven by a dedicated worker thread.
    pub fn threaded() -> Self {
        Self {
            threaded: true,
            ..Self::default()
        }
    }
}

/// A read-only snapshot of a task's bookkeeping, as reported by the kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    /// Kernel-assigned identifier.
    pub id: TaskId,
    /// Name the task reported when attached.
    pub name: String,
    /// Current scheduling priority key.
    pub order: i32,
    /// User or system classification.
    pub kind: TaskKind,
    /// Lifecycle state at the time of the snapshot.
    pub state: TaskState,
    /// Whether the task runs on a dedicated worker thread.
    pub threaded: bool,
    /// Whether `remove_task` may destroy this task.
    pub can_kill: bool,
}

/// Error raised by a task's `update` and captured per-task by the kernel.
///
/// A failing update never aborts the tick; the kernel records the error in
/// the tick report and keeps driving the remaining tasks.
#[derive(Debug)]
pub enum TaskError {
    /// A task-defined failure with a human-readable description.
    Failed(String),
    /// A clock task failed to advance.
    Clock(ClockError),
    /// An event task failed to route or deliver.
    Event(EventError),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Failed(msg) => write!(f, "Task update failed: {}", msg),
            TaskError::Clock(err) => write!(f, "Clock task error: {}", err),
            TaskError::Event(err) => write!(f, "Event task error: {}", err),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Failed(_) => None,
            TaskError::Clock(err) => Some(err),
            TaskError::Event(err) => Some(err),
        }
    }
}

impl From<ClockError> for TaskError {
    fn from(err: ClockError) -> Self {
        TaskError::Clock(err)
    }
}

impl From<EventError> for TaskError {
    fn from(err: EventError) -> Self {
        TaskError::Event(err)
    }
}

/// The foundational interface for a schedulable unit of work.
///
/// A task is attached to the [`Kernel`](crate::kernel::Kernel) together with
/// a [`TaskDescriptor`] and is then driven once per tick (or continuously on
/// a worker thread when attached as threaded). Lifecycle hooks default to
/// no-ops so simple tasks only implement [`name`](Task::name) and
/// [`update`](Task::update).
pub trait Task: Send {
    /// Returns the task's name. Names are unique within a kernel.
    fn name(&self) -> &str;

    /// Performs one slice of the task's work.
    ///
    /// Cooperative tasks are called once per tick in priority order; threaded
    /// tasks are called in a tight loop on their worker thread. Errors are
    /// captured per-task and never tear down the scheduler.
    fn update(&mut self, context: &CoreContext) -> Result<(), TaskError>;

    /// Called once before the task's first update.
    fn on_start(&mut self) {}

    /// Called when the task is removed or the kernel shuts down.
    fn on_stop(&mut self) {}

    /// Called when a suspend request takes effect.
    fn on_suspend(&mut self) {}

    /// Called when a resume request takes effect.
    fn on_resume(&mut self) {}

    /// Allows downcasting to concrete task types.
    fn as_any(&self) -> &dyn Any;

    /// Allows mutable downcasting to concrete task types.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared handle to a task. The kernel and worker threads lock it briefly
/// around each update; embedders may hold clones for direct interaction.
pub type TaskRef = Arc<Mutex<dyn Task>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_descriptor_defaults() {
        let desc = TaskDescriptor::default();
        assert_eq!(desc.order, 0);
        assert!(!desc.threaded);
        assert_eq!(desc.kind, TaskKind::User);
        assert!(desc.can_kill);
    }

    #[test]
    fn test_task_descriptor_helpers() {
        assert_eq!(TaskDescriptor::with_order(-5).order, -5);
        assert!(TaskDescriptor::threaded().threaded);
    }

    #[test]
    fn test_task_id_display_and_order() {
        assert_eq!(TaskId(7).to_string(), "7");
        assert!(TaskId(1) < TaskId(2));
    }

    #[test]
    fn test_task_error_display() {
        let err = TaskError::Failed("out of widgets".to_string());
        assert_eq!(err.to_string(), "Task update failed: out of widgets");
    }

    #[test]
    fn test_task_error_source_chains() {
        use std::error::Error;
        let err = TaskError::from(ClockError::NoTimeSource);
        assert!(err.source().is_some());
        assert!(TaskError::Failed("x".into()).source().is_none());
    }

    #[test]
    fn test_task_state_serde_round_trip() {
        let json = serde_json::to_string(&TaskState::Suspended).unwrap();
        let back: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaskState::Suspended);
    }
}
