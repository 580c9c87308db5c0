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

//! The interpreter seam behind the script surface.

use crate::registry::ScriptError;

/// A scripting-language runtime the script task drives.
///
/// Implementations wrap a concrete interpreter. The runtime core never
/// parses script text itself; names and arguments cross this boundary as
/// strings and everything behind it stays interpreter-specific.
pub trait ScriptHost: Send {
    /// Compiles and retains a script under a unique name.
    fn load(&mut self, name: &str, source: &str) -> Result<(), ScriptError>;

    /// Runs a loaded script's top level.
    fn run(&mut self, name: &str) -> Result<(), ScriptError>;

    /// Calls a function defined by a loaded script, returning its display
    /// text.
    fn call(&mut self, name: &str, function: &str, args: &[&str]) -> Result<String, ScriptError>;

    /// Discards a loaded script and its interpreter state.
    fn unload(&mut self, name: &str) -> Result<(), ScriptError>;
}
