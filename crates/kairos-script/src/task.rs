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

//! The kernel task that drains queued command lines.

use crate::host::ScriptHost;
use crate::registry::{CommandRegistry, ScriptError};
use kairos_core::context::CoreContext;
use kairos_core::resource::ResourceTrackerRef;
use kairos_core::task::{Task, TaskError};
use std::any::Any;

/// Cloneable feed of command lines for a [`ScriptTask`].
///
/// Safe to use from any thread; lines are executed in arrival order on the
/// kernel tick.
#[derive(Clone)]
pub struct CommandQueue {
    lines: flume::Sender<String>,
}

impl CommandQueue {
    /// Queues one command line.
    pub fn push(&self, line: impl Into<String>) {
        if self.lines.send(line.into()).is_err() {
            log::warn!("[CommandQueue] Script task is gone; line dropped");
        }
    }
}

/// Bridges command lines, scripts and the kernel.
///
/// Attached to the kernel as an ordinary cooperative task, it drains lines
/// queued through its [`CommandQueue`] each tick. `script.*` lines drive the
/// wrapped [`ScriptHost`]; everything else is dispatched through the task's
/// [`CommandRegistry`]. Script loads and unloads are reported to the
/// configured resource tracker.
pub struct ScriptTask {
    registry: CommandRegistry,
    host: Box<dyn ScriptHost>,
    tracker: Option<ResourceTrackerRef>,
    lines_tx: flume::Sender<String>,
    lines_rx: flume::Receiver<String>,
}

impl ScriptTask {
    /// Wraps a script host. Bindings are registered on
    /// [`registry_mut`](ScriptTask::registry_mut) before the task is attached.
    pub fn new(host: Box<dyn ScriptHost>) -> Self {
        let (lines_tx, lines_rx) = flume::unbounded();
        Self {
            registry: CommandRegistry::new(),
            host,
            tracker: None,
            lines_tx,
            lines_rx,
        }
    }

    /// Reports script loads and unloads to `tracker` from now on.
    pub fn set_tracker(&mut self, tracker: ResourceTrackerRef) {
        self.tracker = Some(tracker);
    }

    /// A cloneable feed for queued command lines.
    pub fn queue(&self) -> CommandQueue {
        CommandQueue {
            lines: self.lines_tx.clone(),
        }
    }

    /// The task's command registry.
    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Loads a script into the host and records it as a resource.
    pub fn load_script(&mut self, name: &str, source: &str) -> Result<(), ScriptError> {
        self.host.load(name, source)?;
        if let Some(tracker) = &self.tracker {
            tracker.lock().unwrap().resource_loaded(name)?;
        }
        log::info!("[ScriptTask] Script '{}' loaded", name);
        Ok(())
    }

    /// Runs a loaded script's top level.
    pub fn run_script(&mut self, name: &str) -> Result<(), ScriptError> {
        self.host.run(name)
    }

    /// Calls a function in a loaded script.
    pub fn call_function(
        &mut self,
        name: &str,
        function: &str,
        args: &[&str],
    ) -> Result<String, ScriptError> {
        self.host.call(name, function, args)
    }

    /// Unloads a script and releases its resource record.
    pub fn unload_script(&mut self, name: &str) -> Result<(), ScriptError> {
        self.host.unload(name)?;
        if let Some(tracker) = &self.tracker {
            tracker.lock().unwrap().resource_unloaded(name)?;
        }
        log::info!("[ScriptTask] Script '{}' unloaded", name);
        Ok(())
    }

    /// Executes one command line immediately.
    ///
    /// `script.load <name> <source...>` treats everything after the name as
    /// source text; other `script.*` forms take names and arguments as
    /// separate tokens.
    pub fn execute(&mut self, line: &str) -> Result<String, ScriptError> {
        let mut parts = line.split_whitespace();
        let command = match parts.next() {
            Some(command) => command,
            None => return Ok(String::new()),
        };
        let args: Vec<&str> = parts.collect();
        match command {
            "script.load" => {
                if args.len() < 2 {
                    return Err(ScriptError::InvalidArguments {
                        command: command.to_string(),
                        expected: 2,
                        got: args.len(),
                    });
                }
                let source = args[1..].join(" ");
                self.load_script(args[0], &source)?;
                Ok(format!("script '{}' loaded", args[0]))
            }
            "script.run" => {
                if args.len() != 1 {
                    return Err(ScriptError::InvalidArguments {
                        command: command.to_string(),
                        expected: 1,
                        got: args.len(),
                    });
                }
                self.run_script(args[0])?;
                Ok(format!("script '{}' ran", args[0]))
            }
            "script.call" => {
                if args.len() < 2 {
                    return Err(ScriptError::InvalidArguments {
                        command: command.to_string(),
                        expected: 2,
                        got: args.len(),
                    });
                }
                self.call_function(args[0], args[1], &args[2..])
            }
            "script.unload" => {
                if args.len() != 1 {
                    return Err(ScriptError::InvalidArguments {
                        command: command.to_string(),
                        expected: 1,
                        got: args.len(),
                    });
                }
                self.unload_script(args[0])?;
                Ok(format!("script '{}' unloaded", args[0]))
            }
            _ => self.registry.call(command, &args),
        }
    }
}

impl Task for ScriptTask {
    fn name(&self) -> &str {
        "script"
    }

    fn update(&mut self, _context: &CoreContext) -> Result<(), TaskError> {
        while let Ok(line) = self.lines_rx.try_recv() {
            match self.execute(&line) {
                Ok(output) if !output.is_empty() => log::info!("[ScriptTask] {}", output),
                Ok(_) => {}
                Err(err) => log::warn!("[ScriptTask] '{}' failed: {}", line, err),
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
