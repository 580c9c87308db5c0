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

//! The cooperative task kernel.
//!
//! The kernel owns every attached task and drives the non-threaded ones once
//! per [`one_tick`](Kernel::one_tick) call, in ascending order of their
//! signed priority key (ties broken by attachment id). Threaded tasks run on
//! their own [`Worker`](crate::task::worker::Worker); the kernel only relays
//! control requests to them and reconciles their observed state during the
//! tick.
//!
//! Task updates that fail are captured per task in the [`TickReport`]; one
//! misbehaving task never stalls the rest of the schedule.

mod graph;

use crate::context::CoreContext;
use crate::event::{Event, EventPriority, EventRef, SYSTEM_CHANNEL};
use crate::task::worker::{Worker, WorkerState};
use crate::task::{
    TaskDescriptor, TaskError, TaskId, TaskInfo, TaskKind, TaskRef, TaskState,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Name under which the kernel registers the shared clock.
pub const CLOCK_TASK_NAME: &str = "clock";
/// Name under which the kernel registers the shared event manager.
pub const EVENTS_TASK_NAME: &str = "events";
/// Priority key of the clock task. Runs before user tasks so they see fresh
/// frame timing.
pub const CLOCK_TASK_ORDER: i32 = -10_000;
/// Priority key of the event manager task. Runs after user tasks so events
/// published during the tick flush in the same tick.
pub const EVENTS_TASK_ORDER: i32 = 10_000;

/// Type name of the event announcing a task's first execution.
pub const TASK_START_EVENT: &str = "task.start";
/// Type name of the event announcing an effective suspend.
pub const TASK_SUSPEND_EVENT: &str = "task.suspend";
/// Type name of the event announcing an effective resume.
pub const TASK_RESUME_EVENT: &str = "task.resume";
/// Type name of the event announcing a stop or removal.
pub const TASK_STOP_EVENT: &str = "task.stop";

/// The lifecycle transition a [`TaskLifecycleEvent`] announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskLifecycle {
    /// The task executed for the first time.
    Started,
    /// A suspend took effect.
    Suspended,
    /// A resume took effect.
    Resumed,
    /// The task was stopped or removed.
    Stopped,
}

impl fmt::Display for TaskLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Event published on the [`SYSTEM_CHANNEL`] when a task changes lifecycle
/// state. Delivered at immediate priority, so system subscribers observe
/// transitions in the order they happen.
#[derive(Debug, Clone)]
pub struct TaskLifecycleEvent {
    /// Which transition happened.
    pub kind: TaskLifecycle,
    /// Id of the affected task.
    pub task: TaskId,
    /// Name of the affected task.
    pub task_name: String,
}

impl TaskLifecycleEvent {
    /// Builds a lifecycle announcement.
    pub fn new(kind: TaskLifecycle, task: TaskId, task_name: impl Into<String>) -> Self {
        Self {
            kind,
            task,
            task_name: task_name.into(),
        }
    }
}

impl Event for TaskLifecycleEvent {
    fn type_name(&self) -> &str {
        match self.kind {
            TaskLifecycle::Started => TASK_START_EVENT,
            TaskLifecycle::Suspended => TASK_SUSPEND_EVENT,
            TaskLifecycle::Resumed => TASK_RESUME_EVENT,
            TaskLifecycle::Stopped => TASK_STOP_EVENT,
        }
    }

    fn priority(&self) -> EventPriority {
        EventPriority::Immediate
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Error raised by kernel operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// A task with the same name is already attached.
    NameInUse(String),
    /// No attached task carries this id.
    UnknownTaskId(TaskId),
    /// No attached task carries this name.
    UnknownTaskName(String),
    /// The task was attached with `can_kill: false`.
    Protected {
        /// Id of the protected task.
        id: TaskId,
        /// Name of the protected task.
        name: String,
    },
    /// A task cannot depend on itself.
    SelfDependency(TaskId),
    /// The dependency edge already exists.
    DuplicateDependency {
        /// The task that would be gated.
        dependent: TaskId,
        /// The task it waits on.
        dependency: TaskId,
    },
    /// Accepting the edge would make the dependency graph cyclic.
    DependencyCycle {
        /// The task that would be gated.
        dependent: TaskId,
        /// The task it waits on.
        dependency: TaskId,
    },
    /// The worker thread for a threaded task could not be spawned.
    ThreadSpawn {
        /// Name of the task whose worker failed.
        task: String,
        /// Operating system error text.
        details: String,
    },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NameInUse(name) => {
                write!(f, "Task name '{}' is already in use", name)
            }
            KernelError::UnknownTaskId(id) => write!(f, "No task with id {}", id),
            KernelError::UnknownTaskName(name) => write!(f, "No task named '{}'", name),
            KernelError::Protected { id, name } => {
                write!(f, "Task '{}' (id {}) is protected and cannot be removed", name, id)
            }
            KernelError::SelfDependency(id) => {
                write!(f, "Task {} cannot depend on itself", id)
            }
            KernelError::DuplicateDependency {
                dependent,
                dependency,
            } => {
                write!(f, "Task {} already depends on task {}", dependent, dependency)
            }
            KernelError::DependencyCycle {
                dependent,
                dependency,
            } => {
                write!(
                    f,
                    "Making task {} depend on task {} would create a dependency cycle",
                    dependent, dependency
                )
            }
            KernelError::ThreadSpawn { task, details } => {
                write!(f, "Failed to spawn worker thread for task '{}': {}", task, details)
            }
        }
    }
}

impl std::error::Error for KernelError {}

/// Outcome of one task's update within a tick.
#[derive(Debug)]
pub struct TaskTickResult {
    /// Id of the executed task.
    pub id: TaskId,
    /// Name of the executed task.
    pub name: String,
    /// Whether the update succeeded.
    pub outcome: Result<(), TaskError>,
}

/// Per-tick summary returned by [`Kernel::one_tick`].
///
/// Contains one entry per cooperative task that actually executed this tick;
/// suspended, blocked and threaded tasks do not appear.
#[derive(Debug)]
pub struct TickReport {
    /// The tick's sequence number, starting at 1.
    pub frame: u64,
    /// Per-task outcomes in execution order.
    pub results: Vec<TaskTickResult>,
}

impl TickReport {
    /// True when every executed task succeeded.
    pub fn is_clean(&self) -> bool {
        self.results.iter().all(|result| result.outcome.is_ok())
    }

    /// Number of failed updates this tick.
    pub fn error_count(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.outcome.is_err())
            .count()
    }
}

/// Control requests that can be queued from task code or other threads.
#[derive(Debug, Clone)]
enum KernelCommand {
    Remove(String),
    Suspend(String),
    Resume(String),
}

/// A cloneable, thread-safe requester for kernel operations.
///
/// Tasks, scripts and plugins cannot borrow the kernel while it is ticking,
/// so mutations requested through a handle are queued and applied at the
/// start of the next tick. Queries are served from a snapshot the kernel
/// refreshes every tick.
#[derive(Clone)]
pub struct KernelHandle {
    commands: flume::Sender<KernelCommand>,
    directory: Arc<Mutex<Vec<TaskInfo>>>,
}

impl KernelHandle {
    /// Requests removal of the named task.
    pub fn remove_task(&self, name: &str) {
        self.send(KernelCommand::Remove(name.to_string()));
    }

    /// Requests suspension of the named task.
    pub fn suspend_task(&self, name: &str) {
        self.send(KernelCommand::Suspend(name.to_string()));
    }

    /// Requests resumption of the named task.
    pub fn resume_task(&self, name: &str) {
        self.send(KernelCommand::Resume(name.to_string()));
    }

    /// Snapshot of all attached tasks, ordered like the schedule.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.directory.lock().unwrap().clone()
    }

    /// Snapshot of one task by name.
    pub fn task(&self, name: &str) -> Option<TaskInfo> {
        self.directory
            .lock()
            .unwrap()
            .iter()
            .find(|info| info.name == name)
            .cloned()
    }

    fn send(&self, command: KernelCommand) {
        if self.commands.send(command).is_err() {
            log::warn!("[KernelHandle] Kernel no longer exists; request dropped");
        }
    }
}

/// Bookkeeping the kernel holds per attached task.
struct TaskRecord {
    id: TaskId,
    name: String,
    task: TaskRef,
    order: i32,
    kind: TaskKind,
    can_kill: bool,
    state: TaskState,
    started: bool,
    deps: Vec<TaskId>,
    worker: Option<Worker>,
}

/// The cooperative scheduler at the core of the runtime.
///
/// A fresh kernel already carries two protected system tasks: the shared
/// [`Clock`](crate::time::Clock) (early in the schedule) and the shared
/// [`EventManager`](crate::event::EventManager) (late, so the tick's events
/// flush the same tick). Both are reachable through the kernel's
/// [`CoreContext`], which is also passed to every task update.
pub struct Kernel {
    context: CoreContext,
    records: HashMap<TaskId, TaskRecord>,
    names: HashMap<String, TaskId>,
    exec_order: Vec<TaskId>,
    order_dirty: bool,
    next_id: u64,
    frame: u64,
    command_tx: flume::Sender<KernelCommand>,
    command_rx: flume::Receiver<KernelCommand>,
    directory: Arc<Mutex<Vec<TaskInfo>>>,
}

impl Kernel {
    /// Creates a kernel around the given context and registers the context's
    /// clock and event manager as protected system tasks.
    pub fn new(context: CoreContext) -> Self {
        let (command_tx, command_rx) = flume::unbounded();
        let mut kernel = Self {
            context,
            records: HashMap::new(),
            names: HashMap::new(),
            exec_order: Vec::new(),
            order_dirty: false,
            next_id: 1,
            frame: 0,
            command_tx,
            command_rx,
            directory: Arc::new(Mutex::new(Vec::new())),
        };

        let clock: TaskRef = kernel.context.clock.clone();
        kernel.attach(
            clock,
            TaskDescriptor {
                order: CLOCK_TASK_ORDER,
                threaded: false,
                kind: TaskKind::System,
                can_kill: false,
            },
        );
        let events: TaskRef = kernel.context.events.clone();
        kernel.attach(
            events,
            TaskDescriptor {
                order: EVENTS_TASK_ORDER,
                threaded: false,
                kind: TaskKind::System,
                can_kill: false,
            },
        );
        kernel
    }

    /// The shared context handed to every task update.
    pub fn context(&self) -> &CoreContext {
        &self.context
    }

    /// A cloneable requester for deferred kernel operations.
    pub fn handle(&self) -> KernelHandle {
        KernelHandle {
            commands: self.command_tx.clone(),
            directory: Arc::clone(&self.directory),
        }
    }

    /// Attaches a task under the parameters in `descriptor`.
    ///
    /// The task's reported name must be unique. Threaded tasks start their
    /// worker loop immediately; cooperative tasks first execute on the next
    /// tick.
    pub fn add_task(
        &mut self,
        task: TaskRef,
        descriptor: TaskDescriptor,
    ) -> Result<TaskId, KernelError> {
        let name = task.lock().unwrap().name().to_string();
        if self.names.contains_key(&name) {
            return Err(KernelError::NameInUse(name));
        }

        let worker = if descriptor.threaded {
            let mut worker = Worker::new(name.clone());
            worker
                .start(Arc::clone(&task), self.context.clone())
                .map_err(|err| KernelError::ThreadSpawn {
                    task: name.clone(),
                    details: err.to_string(),
                })?;
            Some(worker)
        } else {
            None
        };

        let id = TaskId(self.next_id);
        self.next_id += 1;
        log::info!(
            "[Kernel] Task '{}' attached (id {}, order {}, threaded: {})",
            name,
            id,
            descriptor.order,
            descriptor.threaded
        );
        self.records.insert(
            id,
            TaskRecord {
                id,
                name: name.clone(),
                task,
                order: descriptor.order,
                kind: descriptor.kind,
                can_kill: descriptor.can_kill,
                state: TaskState::Stopped,
                started: false,
                deps: Vec::new(),
                worker,
            },
        );
        self.names.insert(name, id);
        self.exec_order.push(id);
        self.order_dirty = true;
        self.refresh_directory();
        Ok(id)
    }

    /// Alias used by `Kernel::new` where failure is impossible.
    fn attach(&mut self, task: TaskRef, descriptor: TaskDescriptor) {
        if let Err(err) = self.add_task(task, descriptor) {
            log::error!("[Kernel] System task registration failed: {}", err);
        }
    }

    /// Stops and detaches a task.
    ///
    /// Threaded tasks are joined; the call returns once their loop has
    /// finished the current iteration and run `on_stop`. Protected tasks
    /// (attached with `can_kill: false`) are refused.
    pub fn remove_task(&mut self, id: TaskId) -> Result<(), KernelError> {
        let record = self
            .records
            .get(&id)
            .ok_or(KernelError::UnknownTaskId(id))?;
        if !record.can_kill {
            return Err(KernelError::Protected {
                id,
                name: record.name.clone(),
            });
        }
        self.destroy_task(id);
        Ok(())
    }

    /// [`remove_task`](Kernel::remove_task) addressed by name.
    pub fn remove_task_by_name(&mut self, name: &str) -> Result<(), KernelError> {
        let id = self
            .names
            .get(name)
            .copied()
            .ok_or_else(|| KernelError::UnknownTaskName(name.to_string()))?;
        self.remove_task(id)
    }

    /// Shared handle to an attached task, or `None` when the id is stale.
    pub fn task_by_id(&self, id: TaskId) -> Option<TaskRef> {
        self.records.get(&id).map(|record| Arc::clone(&record.task))
    }

    /// Shared handle to an attached task, or `None` when unknown.
    pub fn task_by_name(&self, name: &str) -> Option<TaskRef> {
        self.names.get(name).and_then(|id| self.task_by_id(*id))
    }

    /// Bookkeeping snapshot for one task.
    pub fn task_info(&self, id: TaskId) -> Option<TaskInfo> {
        self.records.get(&id).map(Self::info_of)
    }

    /// Bookkeeping snapshots for all tasks, in schedule order.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        let mut infos: Vec<TaskInfo> = self.records.values().map(Self::info_of).collect();
        infos.sort_by_key(|info| (info.order, info.id));
        infos
    }

    /// Number of attached tasks, system tasks included.
    pub fn task_count(&self) -> usize {
        self.records.len()
    }

    /// Number of completed ticks.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Suspends a task.
    ///
    /// Cooperative tasks stop executing with the next tick; threaded tasks
    /// receive a request their loop honors between iterations. Suspending an
    /// already suspended task is a no-op that reports success.
    pub fn suspend_task(&mut self, id: TaskId) -> Result<(), KernelError> {
        let notify = {
            let record = self
                .records
                .get_mut(&id)
                .ok_or(KernelError::UnknownTaskId(id))?;
            if let Some(worker) = record.worker.as_ref() {
                worker.request_suspend();
                None
            } else if record.state == TaskState::Suspended {
                None
            } else {
                let was_started = record.started;
                record.state = TaskState::Suspended;
                if was_started {
                    record.task.lock().unwrap().on_suspend();
                    Some(record.name.clone())
                } else {
                    None
                }
            }
        };
        if let Some(name) = notify {
            self.emit_lifecycle(TaskLifecycle::Suspended, id, &name);
        }
        self.refresh_directory();
        Ok(())
    }

    /// [`suspend_task`](Kernel::suspend_task) addressed by name.
    pub fn suspend_task_by_name(&mut self, name: &str) -> Result<(), KernelError> {
        let id = self
            .names
            .get(name)
            .copied()
            .ok_or_else(|| KernelError::UnknownTaskName(name.to_string()))?;
        self.suspend_task(id)
    }

    /// Resumes a suspended task. Resuming a running task is a no-op that
    /// reports success.
    pub fn resume_task(&mut self, id: TaskId) -> Result<(), KernelError> {
        let notify = {
            let record = self
                .records
                .get_mut(&id)
                .ok_or(KernelError::UnknownTaskId(id))?;
            if let Some(worker) = record.worker.as_ref() {
                worker.request_resume();
                None
            } else if record.state != TaskState::Suspended {
                None
            } else if record.started {
                record.state = TaskState::Running;
                record.task.lock().unwrap().on_resume();
                Some(record.name.clone())
            } else {
                // Suspended before it ever ran: back to pristine, the next
                // tick starts it normally.
                record.state = TaskState::Stopped;
                None
            }
        };
        if let Some(name) = notify {
            self.emit_lifecycle(TaskLifecycle::Resumed, id, &name);
        }
        self.refresh_directory();
        Ok(())
    }

    /// [`resume_task`](Kernel::resume_task) addressed by name.
    pub fn resume_task_by_name(&mut self, name: &str) -> Result<(), KernelError> {
        let id = self
            .names
            .get(name)
            .copied()
            .ok_or_else(|| KernelError::UnknownTaskName(name.to_string()))?;
        self.resume_task(id)
    }

    /// Gates `dependent` on `dependency`: the dependent only executes in
    /// ticks where all of its dependencies are currently running. Removed
    /// dependencies count as satisfied.
    ///
    /// Self edges, duplicate edges and edges that would create a cycle are
    /// rejected.
    pub fn add_dependency(
        &mut self,
        dependent: TaskId,
        dependency: TaskId,
    ) -> Result<(), KernelError> {
        if dependent == dependency {
            return Err(KernelError::SelfDependency(dependent));
        }
        match self.records.get(&dependent) {
            None => return Err(KernelError::UnknownTaskId(dependent)),
            Some(record) if record.deps.contains(&dependency) => {
                return Err(KernelError::DuplicateDependency {
                    dependent,
                    dependency,
                });
            }
            Some(_) => {}
        }
        if !self.records.contains_key(&dependency) {
            return Err(KernelError::UnknownTaskId(dependency));
        }

        let nodes: Vec<TaskId> = self.records.keys().copied().collect();
        let mut edges: Vec<(TaskId, TaskId)> = Vec::new();
        for record in self.records.values() {
            for dep in &record.deps {
                edges.push((record.id, *dep));
            }
        }
        edges.push((dependent, dependency));
        if graph::check_acyclic(&nodes, edges).is_err() {
            return Err(KernelError::DependencyCycle {
                dependent,
                dependency,
            });
        }

        if let Some(record) = self.records.get_mut(&dependent) {
            record.deps.push(dependency);
        }
        self.order_dirty = true;
        log::debug!(
            "[Kernel] Task {} now depends on task {}",
            dependent,
            dependency
        );
        Ok(())
    }

    /// Changes a task's priority key. The schedule re-sorts lazily on the
    /// next tick.
    pub fn set_task_order(&mut self, id: TaskId, order: i32) -> Result<(), KernelError> {
        match self.records.get_mut(&id) {
            Some(record) => {
                record.order = order;
                self.order_dirty = true;
            }
            None => return Err(KernelError::UnknownTaskId(id)),
        }
        self.refresh_directory();
        Ok(())
    }

    /// Runs one scheduler pass.
    ///
    /// Applies queued handle requests, re-sorts the schedule if needed, then
    /// drives every runnable cooperative task once and reconciles threaded
    /// task states. Lifecycle events observed during the pass are published
    /// on the system channel after the scan.
    pub fn one_tick(&mut self) -> TickReport {
        self.drain_commands();
        self.sort_if_dirty();
        self.frame += 1;

        let order = self.exec_order.clone();
        let mut results = Vec::new();
        let mut lifecycle: Vec<(TaskLifecycle, TaskId, String)> = Vec::new();

        for id in order {
            if self.poll_worker(id, &mut lifecycle) {
                continue;
            }

            let runnable = match self.records.get(&id) {
                None => false,
                Some(record) => {
                    record.state != TaskState::Suspended
                        && record.deps.iter().all(|dep| match self.records.get(dep) {
                            None => true,
                            Some(dep_record) => dep_record.state == TaskState::Running,
                        })
                }
            };
            if !runnable {
                continue;
            }

            if let Some(record) = self.records.get_mut(&id) {
                if !record.started {
                    record.task.lock().unwrap().on_start();
                    record.started = true;
                    record.state = TaskState::Running;
                    lifecycle.push((TaskLifecycle::Started, id, record.name.clone()));
                }
                let outcome = record.task.lock().unwrap().update(&self.context);
                if let Err(err) = &outcome {
                    log::warn!("[Kernel] Task '{}' update failed: {}", record.name, err);
                }
                results.push(TaskTickResult {
                    id,
                    name: record.name.clone(),
                    outcome,
                });
            }
        }

        for (kind, id, name) in lifecycle {
            self.emit_lifecycle(kind, id, &name);
        }
        self.refresh_directory();

        TickReport {
            frame: self.frame,
            results,
        }
    }

    /// Stops and detaches every task, protected ones included, in reverse
    /// schedule order so late-running tasks stop first. Worker threads are
    /// joined before this returns.
    pub fn shutdown(&mut self) {
        log::info!("[Kernel] Shutting down {} task(s)", self.records.len());
        self.sort_if_dirty();
        let mut order = self.exec_order.clone();
        order.reverse();
        for id in order {
            self.destroy_task(id);
        }
    }

    /// Reconciles a threaded task's record with its worker's observed state.
    /// Returns false for cooperative tasks.
    fn poll_worker(&mut self, id: TaskId, lifecycle: &mut Vec<(TaskLifecycle, TaskId, String)>) -> bool {
        let record = match self.records.get_mut(&id) {
            Some(record) => record,
            None => return false,
        };
        let worker = match record.worker.as_ref() {
            Some(worker) => worker,
            None => return false,
        };

        let mapped = match worker.observed_state() {
            WorkerState::Running | WorkerState::NextSuspend => TaskState::Running,
            WorkerState::Sleeping | WorkerState::NextResume => TaskState::Suspended,
            WorkerState::Stop => TaskState::Stopped,
        };
        if mapped != record.state {
            match mapped {
                TaskState::Running => {
                    if !record.started {
                        record.started = true;
                        lifecycle.push((TaskLifecycle::Started, id, record.name.clone()));
                    } else {
                        lifecycle.push((TaskLifecycle::Resumed, id, record.name.clone()));
                    }
                }
                TaskState::Suspended => {
                    lifecycle.push((TaskLifecycle::Suspended, id, record.name.clone()));
                }
                TaskState::Stopped => {
                    log::warn!(
                        "[Kernel] Worker for task '{}' exited on its own",
                        record.name
                    );
                    lifecycle.push((TaskLifecycle::Stopped, id, record.name.clone()));
                }
            }
            record.state = mapped;
        }
        true
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            let outcome = match &command {
                KernelCommand::Remove(name) => self.remove_task_by_name(name),
                KernelCommand::Suspend(name) => self.suspend_task_by_name(name),
                KernelCommand::Resume(name) => self.resume_task_by_name(name),
            };
            if let Err(err) = outcome {
                log::warn!("[Kernel] Deferred request {:?} failed: {}", command, err);
            }
        }
    }

    fn sort_if_dirty(&mut self) {
        if !self.order_dirty {
            return;
        }
        let orders: HashMap<TaskId, i32> = self
            .records
            .iter()
            .map(|(id, record)| (*id, record.order))
            .collect();
        self.exec_order
            .sort_by_key(|id| (orders.get(id).copied().unwrap_or(0), *id));
        for record in self.records.values_mut() {
            record
                .deps
                .sort_by_key(|dep| (orders.get(dep).copied().unwrap_or(0), *dep));
        }
        self.order_dirty = false;
    }

    /// Tears a task down unconditionally. Used by removal and shutdown.
    fn destroy_task(&mut self, id: TaskId) {
        let mut record = match self.records.remove(&id) {
            Some(record) => record,
            None => return,
        };
        if let Some(worker) = record.worker.as_mut() {
            // The loop runs on_stop on its own thread before exiting.
            worker.stop();
        } else if record.started && record.state != TaskState::Stopped {
            record.task.lock().unwrap().on_stop();
        }
        self.names.remove(&record.name);
        self.exec_order.retain(|other| *other != id);
        log::info!("[Kernel] Task '{}' removed (id {})", record.name, id);
        self.emit_lifecycle(TaskLifecycle::Stopped, id, &record.name);
        self.refresh_directory();
    }

    fn emit_lifecycle(&self, kind: TaskLifecycle, id: TaskId, name: &str) {
        let event: EventRef = Arc::new(TaskLifecycleEvent::new(kind, id, name));
        if let Err(err) = self
            .context
            .events
            .lock()
            .unwrap()
            .emit(SYSTEM_CHANNEL, event)
        {
            log::error!(
                "[Kernel] Failed to announce {} of task '{}': {}",
                kind,
                name,
                err
            );
        }
    }

    fn refresh_directory(&self) {
        let mut snapshot: Vec<TaskInfo> = self.records.values().map(Self::info_of).collect();
        snapshot.sort_by_key(|info| (info.order, info.id));
        *self.directory.lock().unwrap() = snapshot;
    }

    fn info_of(record: &TaskRecord) -> TaskInfo {
        TaskInfo {
            id: record.id,
            name: record.name.clone(),
            order: record.order,
            kind: record.kind,
            state: record.state,
            threaded: record.worker.is_some(),
            can_kill: record.can_kill,
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(CoreContext::new())
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        if !self.records.is_empty() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use crate::time::VirtualTimeSource;

    struct SpyTask {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl SpyTask {
        fn shared(name: &str, log: &Arc<Mutex<Vec<String>>>) -> TaskRef {
            Arc::new(Mutex::new(Self {
                name: name.to_string(),
                log: Arc::clone(log),
                fail: false,
            }))
        }

        fn failing(name: &str, log: &Arc<Mutex<Vec<String>>>) -> TaskRef {
            Arc::new(Mutex::new(Self {
                name: name.to_string(),
                log: Arc::clone(log),
                fail: true,
            }))
        }

        fn mark(&self, suffix: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}.{}", self.name, suffix));
        }
    }

    impl Task for SpyTask {
        fn name(&self) -> &str {
            &self.name
        }

        fn update(&mut self, _context: &CoreContext) -> Result<(), TaskError> {
            self.log.lock().unwrap().push(self.name.clone());
            if self.fail {
                Err(TaskError::Failed("synthetic failure".to_string()))
            } else {
                Ok(())
            }
        }

        fn on_start(&mut self) {
            self.mark("start");
        }

        fn on_stop(&mut self) {
            self.mark("stop");
        }

        fn on_suspend(&mut self) {
            self.mark("suspend");
        }

        fn on_resume(&mut self) {
            self.mark("resume");
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn test_kernel() -> Kernel {
        let context = CoreContext::new();
        context
            .clock
            .lock()
            .unwrap()
            .bind_source(Box::new(VirtualTimeSource::new(0.01)));
        Kernel::new(context)
    }

    fn updates_only(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|entry| !entry.contains('.'))
            .cloned()
            .collect()
    }

    #[test]
    fn test_new_kernel_carries_system_tasks() {
        let kernel = test_kernel();
        assert_eq!(kernel.task_count(), 2);
        assert!(kernel.task_by_name(CLOCK_TASK_NAME).is_some());
        assert!(kernel.task_by_name(EVENTS_TASK_NAME).is_some());

        let infos = kernel.tasks();
        assert_eq!(infos.first().map(|info| info.name.as_str()), Some("clock"));
        assert_eq!(infos.last().map(|info| info.name.as_str()), Some("events"));
        assert!(infos.iter().all(|info| info.kind == TaskKind::System));
    }

    #[test]
    fn test_system_tasks_are_protected() {
        let mut kernel = test_kernel();
        let clock_id = kernel.tasks()[0].id;
        let err = kernel.remove_task(clock_id).unwrap_err();
        assert!(matches!(err, KernelError::Protected { .. }));
        assert_eq!(kernel.task_count(), 2);
    }

    #[test]
    fn test_duplicate_task_name_rejected() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        kernel
            .add_task(SpyTask::shared("ai", &log), TaskDescriptor::default())
            .unwrap();
        let err = kernel
            .add_task(SpyTask::shared("ai", &log), TaskDescriptor::default())
            .unwrap_err();
        assert_eq!(err, KernelError::NameInUse("ai".to_string()));
        // The rejected add leaves the active set untouched.
        assert_eq!(kernel.task_count(), 3);
    }

    #[test]
    fn test_lookups_resolve_until_removal() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = kernel
            .add_task(SpyTask::shared("ai", &log), TaskDescriptor::default())
            .unwrap();

        assert!(kernel.task_by_id(id).is_some());
        assert!(kernel.task_by_name("ai").is_some());
        let info = kernel.task_info(id).unwrap();
        assert_eq!(info.id, id);
        assert_eq!(info.name, "ai");

        kernel.remove_task(id).unwrap();
        assert!(kernel.task_by_id(id).is_none());
        assert!(kernel.task_by_name("ai").is_none());
        assert!(kernel.task_info(id).is_none());

        // The retired id is never handed out again, even for the same name.
        let replacement = kernel
            .add_task(SpyTask::shared("ai", &log), TaskDescriptor::default())
            .unwrap();
        assert_ne!(replacement, id);
        assert!(kernel.task_by_id(id).is_none());
    }

    #[test]
    fn test_tick_runs_tasks_in_priority_order() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        kernel
            .add_task(SpyTask::shared("late", &log), TaskDescriptor::with_order(10))
            .unwrap();
        kernel
            .add_task(SpyTask::shared("early", &log), TaskDescriptor::with_order(-10))
            .unwrap();
        kernel
            .add_task(SpyTask::shared("mid-a", &log), TaskDescriptor::default())
            .unwrap();
        kernel
            .add_task(SpyTask::shared("mid-b", &log), TaskDescriptor::default())
            .unwrap();

        kernel.one_tick();

        // Equal keys fall back to attachment order (mid-a before mid-b).
        assert_eq!(updates_only(&log), vec!["early", "mid-a", "mid-b", "late"]);
    }

    #[test]
    fn test_reprioritization_takes_effect_next_tick() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = kernel
            .add_task(SpyTask::shared("a", &log), TaskDescriptor::with_order(0))
            .unwrap();
        kernel
            .add_task(SpyTask::shared("b", &log), TaskDescriptor::with_order(1))
            .unwrap();
        kernel.one_tick();
        assert_eq!(updates_only(&log), vec!["a", "b"]);

        kernel.set_task_order(a, 5).unwrap();
        log.lock().unwrap().clear();
        kernel.one_tick();
        assert_eq!(updates_only(&log), vec!["b", "a"]);
    }

    #[test]
    fn test_failing_task_does_not_stall_the_tick() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        kernel
            .add_task(SpyTask::failing("broken", &log), TaskDescriptor::with_order(-1))
            .unwrap();
        kernel
            .add_task(SpyTask::shared("healthy", &log), TaskDescriptor::with_order(1))
            .unwrap();

        let report = kernel.one_tick();

        assert_eq!(updates_only(&log), vec!["broken", "healthy"]);
        assert_eq!(report.error_count(), 1);
        assert!(!report.is_clean());
        let failed = report
            .results
            .iter()
            .find(|result| result.outcome.is_err())
            .unwrap();
        assert_eq!(failed.name, "broken");
    }

    #[test]
    fn test_suspend_resume_cooperative_task() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = kernel
            .add_task(SpyTask::shared("worker", &log), TaskDescriptor::default())
            .unwrap();

        kernel.one_tick();
        kernel.suspend_task(id).unwrap();
        // Idempotent: a second suspend is accepted and does nothing.
        kernel.suspend_task(id).unwrap();
        kernel.one_tick();
        kernel.resume_task(id).unwrap();
        kernel.resume_task(id).unwrap();
        kernel.one_tick();

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec![
                "worker.start",
                "worker",
                "worker.suspend",
                "worker.resume",
                "worker"
            ]
        );
    }

    #[test]
    fn test_suspend_before_first_run_delays_start() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = kernel
            .add_task(SpyTask::shared("held", &log), TaskDescriptor::default())
            .unwrap();

        kernel.suspend_task(id).unwrap();
        kernel.one_tick();
        assert!(log.lock().unwrap().is_empty());

        kernel.resume_task(id).unwrap();
        kernel.one_tick();
        assert_eq!(
            log.lock().unwrap().clone(),
            vec!["held.start", "held"]
        );
    }

    #[test]
    fn test_dependency_gates_until_running() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        // The dependent sits earlier in the schedule than its dependency, so
        // on the first tick the dependency has not started yet.
        let dependent = kernel
            .add_task(SpyTask::shared("consumer", &log), TaskDescriptor::with_order(-1))
            .unwrap();
        let dependency = kernel
            .add_task(SpyTask::shared("producer", &log), TaskDescriptor::with_order(1))
            .unwrap();
        kernel.add_dependency(dependent, dependency).unwrap();

        kernel.one_tick();
        assert_eq!(updates_only(&log), vec!["producer"]);

        kernel.one_tick();
        assert_eq!(updates_only(&log), vec!["producer", "consumer", "producer"]);
    }

    #[test]
    fn test_dependency_on_removed_task_is_satisfied() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let dependent = kernel
            .add_task(SpyTask::shared("consumer", &log), TaskDescriptor::with_order(-1))
            .unwrap();
        let dependency = kernel
            .add_task(SpyTask::shared("producer", &log), TaskDescriptor::with_order(1))
            .unwrap();
        kernel.add_dependency(dependent, dependency).unwrap();
        kernel.remove_task(dependency).unwrap();

        kernel.one_tick();

        assert_eq!(updates_only(&log), vec!["consumer"]);
    }

    #[test]
    fn test_suspended_dependency_blocks_dependent() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let dependency = kernel
            .add_task(SpyTask::shared("producer", &log), TaskDescriptor::with_order(-1))
            .unwrap();
        let dependent = kernel
            .add_task(SpyTask::shared("consumer", &log), TaskDescriptor::with_order(1))
            .unwrap();
        kernel.add_dependency(dependent, dependency).unwrap();

        kernel.one_tick();
        assert_eq!(updates_only(&log), vec!["producer", "consumer"]);

        kernel.suspend_task(dependency).unwrap();
        log.lock().unwrap().clear();
        kernel.one_tick();
        assert!(updates_only(&log).is_empty());
    }

    #[test]
    fn test_dependency_validation() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = kernel
            .add_task(SpyTask::shared("a", &log), TaskDescriptor::default())
            .unwrap();
        let b = kernel
            .add_task(SpyTask::shared("b", &log), TaskDescriptor::default())
            .unwrap();
        let c = kernel
            .add_task(SpyTask::shared("c", &log), TaskDescriptor::default())
            .unwrap();

        assert_eq!(
            kernel.add_dependency(a, a).unwrap_err(),
            KernelError::SelfDependency(a)
        );
        kernel.add_dependency(a, b).unwrap();
        assert_eq!(
            kernel.add_dependency(a, b).unwrap_err(),
            KernelError::DuplicateDependency {
                dependent: a,
                dependency: b
            }
        );
        kernel.add_dependency(b, c).unwrap();
        assert_eq!(
            kernel.add_dependency(c, a).unwrap_err(),
            KernelError::DependencyCycle {
                dependent: c,
                dependency: a
            }
        );
        assert_eq!(
            kernel.add_dependency(a, TaskId(999)).unwrap_err(),
            KernelError::UnknownTaskId(TaskId(999))
        );
    }

    #[test]
    fn test_handle_requests_are_deferred_to_next_tick() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        kernel
            .add_task(SpyTask::shared("worker", &log), TaskDescriptor::default())
            .unwrap();
        let handle = kernel.handle();

        kernel.one_tick();
        handle.suspend_task("worker");
        // Request is queued, not applied: no suspend callback yet.
        assert!(!log.lock().unwrap().contains(&"worker.suspend".to_string()));

        kernel.one_tick();
        assert!(log.lock().unwrap().contains(&"worker.suspend".to_string()));

        handle.remove_task("worker");
        kernel.one_tick();
        assert!(kernel.task_by_name("worker").is_none());
    }

    #[test]
    fn test_handle_directory_snapshot() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        kernel
            .add_task(SpyTask::shared("worker", &log), TaskDescriptor::with_order(3))
            .unwrap();
        let handle = kernel.handle();

        let info = handle.task("worker").unwrap();
        assert_eq!(info.order, 3);
        assert_eq!(info.state, TaskState::Stopped);

        kernel.one_tick();
        let info = handle.task("worker").unwrap();
        assert_eq!(info.state, TaskState::Running);
        assert_eq!(handle.tasks().len(), 3);
    }

    #[test]
    fn test_remove_task_by_name_unknown_fails() {
        let mut kernel = test_kernel();
        assert_eq!(
            kernel.remove_task_by_name("ghost").unwrap_err(),
            KernelError::UnknownTaskName("ghost".to_string())
        );
    }

    #[test]
    fn test_shutdown_stops_in_reverse_schedule_order() {
        let mut kernel = test_kernel();
        let log = Arc::new(Mutex::new(Vec::new()));
        kernel
            .add_task(SpyTask::shared("first", &log), TaskDescriptor::with_order(-1))
            .unwrap();
        kernel
            .add_task(SpyTask::shared("second", &log), TaskDescriptor::with_order(1))
            .unwrap();
        kernel.one_tick();
        log.lock().unwrap().clear();

        kernel.shutdown();

        assert_eq!(kernel.task_count(), 0);
        let entries = log.lock().unwrap().clone();
        assert_eq!(entries, vec!["second.stop", "first.stop"]);
    }

    #[test]
    fn test_tick_report_frame_counts() {
        let mut kernel = test_kernel();
        let first = kernel.one_tick();
        let second = kernel.one_tick();
        assert_eq!(first.frame, 1);
        assert_eq!(second.frame, 2);
        assert_eq!(kernel.frame(), 2);
    }

    #[test]
    fn test_kernel_error_display() {
        assert_eq!(
            KernelError::NameInUse("ai".to_string()).to_string(),
            "Task name 'ai' is already in use"
        );
        assert_eq!(
            KernelError::DependencyCycle {
                dependent: TaskId(2),
                dependency: TaskId(5)
            }
            .to_string(),
            "Making task 2 depend on task 5 would create a dependency cycle"
        );
    }
}
