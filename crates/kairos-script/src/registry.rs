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

//! Named commands callable across the string boundary.

use kairos_core::resource::ResourceError;
use std::collections::HashMap;
use std::fmt;

/// Error raised by the command registry and script surface.
#[derive(Debug)]
pub enum ScriptError {
    /// No command is registered under this name.
    UnknownCommand(String),
    /// A command with this name is already registered.
    DuplicateCommand(String),
    /// The command was called with the wrong number of arguments.
    InvalidArguments {
        /// The command that was called.
        command: String,
        /// Number of arguments it expects.
        expected: usize,
        /// Number of arguments it received.
        got: usize,
    },
    /// The command or script ran and reported failure.
    Failed(String),
    /// Resource bookkeeping for a script rejected the transition.
    Resource(ResourceError),
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::UnknownCommand(name) => write!(f, "Unknown command '{}'", name),
            ScriptError::DuplicateCommand(name) => {
                write!(f, "Command '{}' is already registered", name)
            }
            ScriptError::InvalidArguments {
                command,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Command '{}' expects {} argument(s), got {}",
                    command, expected, got
                )
            }
            ScriptError::Failed(details) => write!(f, "Command failed: {}", details),
            ScriptError::Resource(err) => write!(f, "Script resource error: {}", err),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScriptError::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for ScriptError {
    fn from(err: ResourceError) -> Self {
        ScriptError::Resource(err)
    }
}

/// Boxed command body. Receives pre-split arguments, returns display text.
pub type CommandFn = Box<dyn FnMut(&[&str]) -> Result<String, ScriptError> + Send>;

/// Maps command names to callable bodies.
///
/// This is the runtime's only text-based surface: consoles, scripts and
/// plugins turn strings into behavior here, and everything behind the
/// boundary stays fully typed.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandFn>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command body under a unique name.
    pub fn register(
        &mut self,
        name: &str,
        command: impl FnMut(&[&str]) -> Result<String, ScriptError> + Send + 'static,
    ) -> Result<(), ScriptError> {
        if self.commands.contains_key(name) {
            return Err(ScriptError::DuplicateCommand(name.to_string()));
        }
        log::debug!("[CommandRegistry] '{}' registered", name);
        self.commands.insert(name.to_string(), Box::new(command));
        Ok(())
    }

    /// Removes a registered command.
    pub fn unregister(&mut self, name: &str) -> Result<(), ScriptError> {
        if self.commands.remove(name).is_none() {
            return Err(ScriptError::UnknownCommand(name.to_string()));
        }
        log::debug!("[CommandRegistry] '{}' unregistered", name);
        Ok(())
    }

    /// Calls a command with pre-split arguments.
    pub fn call(&mut self, name: &str, args: &[&str]) -> Result<String, ScriptError> {
        let command = self
            .commands
            .get_mut(name)
            .ok_or_else(|| ScriptError::UnknownCommand(name.to_string()))?;
        command(args)
    }

    /// Splits a whitespace-separated line into command and arguments and
    /// calls it. Blank lines are a successful no-op.
    pub fn run_line(&mut self, line: &str) -> Result<String, ScriptError> {
        let mut parts = line.split_whitespace();
        let name = match parts.next() {
            Some(name) => name,
            None => return Ok(String::new()),
        };
        let args: Vec<&str> = parts.collect();
        self.call(name, &args)
    }

    /// Registered command names, sorted.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Returns an error unless exactly `expected` arguments were supplied.
pub(crate) fn expect_args(command: &str, expected: usize, args: &[&str]) -> Result<(), ScriptError> {
    if args.len() != expected {
        return Err(ScriptError::InvalidArguments {
            command: command.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}
