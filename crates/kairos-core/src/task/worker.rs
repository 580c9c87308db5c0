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

//! Worker thread wrapper that drives a single task in a loop.
//!
//! The kernel never calls a threaded task's `update` itself. Instead it
//! attaches a [`Worker`], sends it control commands over a channel, and polls
//! the worker's last observed state once per tick. All task callbacks run on
//! the worker thread, strictly sequenced between loop iterations.

use crate::context::CoreContext;
use crate::task::TaskRef;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// State of a worker's control loop, published after each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// The loop has exited (or was never started).
    Stop = 0,
    /// The loop is calling the task's `update` each iteration.
    Running = 1,
    /// A suspend request was accepted; `on_suspend` fires next iteration.
    NextSuspend = 2,
    /// The loop is parked on its control channel, burning no CPU.
    Sleeping = 3,
    /// A resume request was accepted; `on_resume` fires next iteration.
    NextResume = 4,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => WorkerState::Running,
            2 => WorkerState::NextSuspend,
            3 => WorkerState::Sleeping,
            4 => WorkerState::NextResume,
            _ => WorkerState::Stop,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Control commands accepted by the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerCommand {
    Suspend,
    Resume,
    Stop,
}

/// Drives one task on a dedicated thread.
///
/// Commands are only observed between iterations, so `update`, lifecycle
/// callbacks and state transitions happen in strict sequence on the worker
/// thread. While sleeping, the loop blocks on its control channel instead of
/// spinning.
pub struct Worker {
    task_name: String,
    commands: Option<flume::Sender<WorkerCommand>>,
    observed: Arc<AtomicU8>,
    failures: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Creates an idle wrapper for the named task. No thread is spawned
    /// until [`start`](Worker::start) is called.
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            commands: None,
            observed: Arc::new(AtomicU8::new(WorkerState::Stop as u8)),
            failures: Arc::new(AtomicUsize::new(0)),
            handle: None,
        }
    }

    /// Spawns the worker thread and enters the control loop.
    ///
    /// A no-op (with a logged warning) if the loop is already running.
    pub fn start(&mut self, task: TaskRef, context: CoreContext) -> io::Result<()> {
        if self.handle.is_some() && self.observed_state() != WorkerState::Stop {
            log::warn!(
                "[Worker] start() ignored: task '{}' is already running",
                self.task_name
            );
            return Ok(());
        }
        // A previous loop may have exited on its own; reap it first.
        if let Some(handle) = self.handle.take() {
            join_worker(&self.task_name, handle);
        }

        let (tx, rx) = flume::unbounded();
        let observed = Arc::clone(&self.observed);
        let failures = Arc::clone(&self.failures);
        let name = self.task_name.clone();
        let handle = thread::Builder::new()
            .name(format!("kairos-task-{}", self.task_name))
            .spawn(move || run_loop(name, task, context, rx, observed, failures))?;

        self.commands = Some(tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Asks the loop to suspend after the current iteration.
    pub fn request_suspend(&self) {
        self.send(WorkerCommand::Suspend);
    }

    /// Asks a sleeping loop to resume. Wakes the parked thread.
    pub fn request_resume(&self) {
        self.send(WorkerCommand::Resume);
    }

    /// Asks the loop to exit, then blocks until the thread has finished its
    /// current iteration and run `on_stop`.
    pub fn stop(&mut self) {
        self.send(WorkerCommand::Stop);
        self.commands = None;
        if let Some(handle) = self.handle.take() {
            join_worker(&self.task_name, handle);
        }
    }

    /// Last state published by the worker thread.
    pub fn observed_state(&self) -> WorkerState {
        WorkerState::from_u8(self.observed.load(Ordering::Acquire))
    }

    /// Number of failed updates since the loop started. Failures do not stop
    /// the loop.
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    fn send(&self, command: WorkerCommand) {
        if let Some(tx) = &self.commands {
            if tx.send(command).is_err() {
                log::warn!(
                    "[Worker] task '{}' loop has already exited; {:?} dropped",
                    self.task_name,
                    command
                );
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

/// Joins the worker thread, escalating a task panic to the caller.
fn join_worker(task_name: &str, handle: JoinHandle<()>) {
    if let Err(payload) = handle.join() {
        log::error!("[Worker] task '{}' panicked on its worker thread", task_name);
        std::panic::resume_unwind(payload);
    }
}

fn run_loop(
    name: String,
    task: TaskRef,
    context: CoreContext,
    rx: flume::Receiver<WorkerCommand>,
    observed: Arc<AtomicU8>,
    failures: Arc<AtomicUsize>,
) {
    let mut state = WorkerState::Running;
    task.lock().unwrap().on_start();
    observed.store(state as u8, Ordering::Release);
    log::debug!("[Worker] task '{}' loop started", name);

    loop {
        // Commands are drained between iterations only.
        loop {
            match rx.try_recv() {
                Ok(command) => state = apply(state, command),
                Err(flume::TryRecvError::Empty) => break,
                Err(flume::TryRecvError::Disconnected) => {
                    state = WorkerState::Stop;
                    break;
                }
            }
        }

        match state {
            WorkerState::Running => {
                if let Err(err) = task.lock().unwrap().update(&context) {
                    failures.fetch_add(1, Ordering::Release);
                    log::warn!("[Worker] task '{}' update failed: {}", name, err);
                }
                thread::yield_now();
            }
            WorkerState::NextSuspend => {
                task.lock().unwrap().on_suspend();
                state = WorkerState::Sleeping;
                observed.store(state as u8, Ordering::Release);
            }
            WorkerState::Sleeping => {
                // Parked: block until the kernel sends the next command.
                match rx.recv() {
                    Ok(command) => state = apply(state, command),
                    Err(flume::RecvError::Disconnected) => state = WorkerState::Stop,
                }
            }
            WorkerState::NextResume => {
                task.lock().unwrap().on_resume();
                state = WorkerState::Running;
                observed.store(state as u8, Ordering::Release);
            }
            WorkerState::Stop => break,
        }
    }

    task.lock().unwrap().on_stop();
    observed.store(WorkerState::Stop as u8, Ordering::Release);
    log::debug!("[Worker] task '{}' loop exited", name);
}

fn apply(state: WorkerState, command: WorkerCommand) -> WorkerState {
    match (state, command) {
        (_, WorkerCommand::Stop) => WorkerState::Stop,
        (WorkerState::Running, WorkerCommand::Suspend) => WorkerState::NextSuspend,
        (WorkerState::Sleeping, WorkerCommand::Resume) => WorkerState::NextResume,
        // Suspend while sleeping, resume while running: already there.
        (other, _) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskError};
    use std::any::Any;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    const SETTLE_TIMEOUT_MS: u64 = 2000;
    const POLL_INTERVAL_MS: u64 = 1;

    struct CountingTask {
        updates: Arc<AtomicUsize>,
        starts: Arc<AtomicUsize>,
        suspends: Arc<AtomicUsize>,
        resumes: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl CountingTask {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let updates = Arc::new(AtomicUsize::new(0));
            let task = Self {
                updates: Arc::clone(&updates),
                starts: Arc::new(AtomicUsize::new(0)),
                suspends: Arc::new(AtomicUsize::new(0)),
                resumes: Arc::new(AtomicUsize::new(0)),
                stops: Arc::new(AtomicUsize::new(0)),
            };
            (task, updates)
        }
    }

    impl Task for CountingTask {
        fn name(&self) -> &str {
            "counting"
        }

        fn update(&mut self, _context: &CoreContext) -> Result<(), TaskError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_start(&mut self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn on_suspend(&mut self) {
            self.suspends.fetch_add(1, Ordering::SeqCst);
        }

        fn on_resume(&mut self) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn wait_for_state(worker: &Worker, expected: WorkerState) {
        let deadline = std::time::Instant::now() + Duration::from_millis(SETTLE_TIMEOUT_MS);
        while worker.observed_state() != expected {
            assert!(
                std::time::Instant::now() < deadline,
                "worker never reached {:?} (stuck at {:?})",
                expected,
                worker.observed_state()
            );
            thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
        }
    }

    #[test]
    fn test_worker_runs_and_stops() {
        // ARRANGE
        let (task, updates) = CountingTask::new();
        let task: TaskRef = Arc::new(Mutex::new(task));
        let mut worker = Worker::new("counting");

        // ACT
        worker.start(Arc::clone(&task), CoreContext::new()).unwrap();
        wait_for_state(&worker, WorkerState::Running);
        while updates.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
        }
        worker.stop();

        // ASSERT
        assert_eq!(worker.observed_state(), WorkerState::Stop);
        assert!(updates.load(Ordering::SeqCst) >= 1);
        let guard = task.lock().unwrap();
        let counting = guard.as_any().downcast_ref::<CountingTask>().unwrap();
        assert_eq!(counting.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counting.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_suspend_parks_and_resume_wakes() {
        // ARRANGE
        let (task, updates) = CountingTask::new();
        let task: TaskRef = Arc::new(Mutex::new(task));
        let mut worker = Worker::new("counting");
        worker.start(Arc::clone(&task), CoreContext::new()).unwrap();
        wait_for_state(&worker, WorkerState::Running);

        // ACT: suspend and let the loop settle into its parked state.
        worker.request_suspend();
        wait_for_state(&worker, WorkerState::Sleeping);
        let parked_count = updates.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(updates.load(Ordering::SeqCst), parked_count);

        // ACT: resume and observe updates flowing again.
        worker.request_resume();
        wait_for_state(&worker, WorkerState::Running);
        while updates.load(Ordering::SeqCst) == parked_count {
            thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
        }
        worker.stop();

        // ASSERT
        let guard = task.lock().unwrap();
        let counting = guard.as_any().downcast_ref::<CountingTask>().unwrap();
        assert_eq!(counting.suspends.load(Ordering::SeqCst), 1);
        assert_eq!(counting.resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_stop_while_sleeping() {
        let (task, _updates) = CountingTask::new();
        let task: TaskRef = Arc::new(Mutex::new(task));
        let mut worker = Worker::new("counting");
        worker.start(Arc::clone(&task), CoreContext::new()).unwrap();
        worker.request_suspend();
        wait_for_state(&worker, WorkerState::Sleeping);

        worker.stop();

        assert_eq!(worker.observed_state(), WorkerState::Stop);
        let guard = task.lock().unwrap();
        let counting = guard.as_any().downcast_ref::<CountingTask>().unwrap();
        assert_eq!(counting.stops.load(Ordering::SeqCst), 1);
    }

    struct FlakyTask;

    impl Task for FlakyTask {
        fn name(&self) -> &str {
            "flaky"
        }

        fn update(&mut self, _context: &CoreContext) -> Result<(), TaskError> {
            thread::sleep(Duration::from_millis(1));
            Err(TaskError::Failed("always".to_string()))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_worker_counts_failures_without_stopping() {
        let task: TaskRef = Arc::new(Mutex::new(FlakyTask));
        let mut worker = Worker::new("flaky");
        worker.start(Arc::clone(&task), CoreContext::new()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_millis(SETTLE_TIMEOUT_MS);
        while worker.failure_count() < 3 {
            assert!(
                std::time::Instant::now() < deadline,
                "failures never accumulated (count {})",
                worker.failure_count()
            );
            thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
        }

        // Still alive despite the failures.
        assert_eq!(worker.observed_state(), WorkerState::Running);
        worker.stop();
        assert!(worker.failure_count() >= 3);
    }

    #[test]
    fn test_worker_redundant_commands_are_noops() {
        let (task, _updates) = CountingTask::new();
        let task: TaskRef = Arc::new(Mutex::new(task));
        let mut worker = Worker::new("counting");
        worker.start(Arc::clone(&task), CoreContext::new()).unwrap();
        wait_for_state(&worker, WorkerState::Running);

        // Resume while running and double suspend must not misroute the loop.
        worker.request_resume();
        worker.request_suspend();
        worker.request_suspend();
        wait_for_state(&worker, WorkerState::Sleeping);
        worker.stop();

        let guard = task.lock().unwrap();
        let counting = guard.as_any().downcast_ref::<CountingTask>().unwrap();
        assert_eq!(counting.suspends.load(Ordering::SeqCst), 1);
        assert_eq!(counting.resumes.load(Ordering::SeqCst), 0);
    }
}
