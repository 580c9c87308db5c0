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

//! The C ABI every Kairos plugin library exports.
//!
//! A plugin is a shared library exposing five `extern "C"` symbols. The
//! loader resolves them into a [`PluginApi`] table, gates on
//! [`ENGINE_API_VERSION`], and then calls `initialize` with an opaque pointer
//! to a [`PluginHost`], through which the plugin registers its tasks,
//! channels and subscribers.

use kairos_core::context::CoreContext;
use kairos_core::event::{EventError, SubscriberRef};
use kairos_core::kernel::{Kernel, KernelError};
use kairos_core::task::{TaskDescriptor, TaskId, TaskRef};
use std::os::raw::{c_char, c_void};

/// ABI revision this engine speaks. A plugin reporting anything else is
/// refused at load time.
pub const ENGINE_API_VERSION: u32 = 2;

/// Symbol name of [`InitializeFn`].
pub const INITIALIZE_SYMBOL: &[u8] = b"kairos_plugin_initialize";
/// Symbol name of [`EngineVersionFn`].
pub const ENGINE_VERSION_SYMBOL: &[u8] = b"kairos_plugin_engine_version";
/// Symbol name of [`VersionStringFn`].
pub const VERSION_STRING_SYMBOL: &[u8] = b"kairos_plugin_version_string";
/// Symbol name of [`LastErrorFn`].
pub const LAST_ERROR_SYMBOL: &[u8] = b"kairos_plugin_last_error";
/// Symbol name of [`ReleaseFn`].
pub const RELEASE_SYMBOL: &[u8] = b"kairos_plugin_release";

/// Entry point: the plugin registers itself against the [`PluginHost`]
/// behind `host`. Returns false on failure, with the reason available from
/// the last-error symbol.
pub type InitializeFn = unsafe extern "C" fn(host: *mut c_void) -> bool;

/// Reports the [`ENGINE_API_VERSION`] the plugin was compiled against.
pub type EngineVersionFn = unsafe extern "C" fn() -> u32;

/// Human-readable plugin version, as a NUL-terminated string with static
/// lifetime.
pub type VersionStringFn = unsafe extern "C" fn() -> *const c_char;

/// Description of the plugin's most recent failure, as a NUL-terminated
/// string that stays valid until the next plugin call. May return null.
pub type LastErrorFn = unsafe extern "C" fn() -> *const c_char;

/// Final teardown. Called exactly once, when the plugin is dropped.
pub type ReleaseFn = unsafe extern "C" fn();

/// The resolved function table of one plugin library.
#[derive(Clone, Copy, Debug)]
pub struct PluginApi {
    /// See [`InitializeFn`].
    pub initialize: InitializeFn,
    /// See [`EngineVersionFn`].
    pub engine_version: EngineVersionFn,
    /// See [`VersionStringFn`].
    pub version_string: VersionStringFn,
    /// See [`LastErrorFn`].
    pub last_error: LastErrorFn,
    /// See [`ReleaseFn`].
    pub release: ReleaseFn,
}

/// The kernel facade handed to a plugin's `initialize`.
///
/// Borrows the kernel for the duration of the call, so plugins register
/// synchronously and cannot retain the reference. Anything a plugin wants to
/// do later happens through the tasks and subscribers it registers here (or
/// through a [`KernelHandle`](kairos_core::kernel::KernelHandle) it clones
/// out of [`handle`](PluginHost::handle)).
pub struct PluginHost<'a> {
    kernel: &'a mut Kernel,
}

impl<'a> PluginHost<'a> {
    /// Wraps a kernel borrow for one initialize call.
    pub fn new(kernel: &'a mut Kernel) -> Self {
        Self { kernel }
    }

    /// Reconstitutes the host reference inside a plugin's initialize symbol.
    ///
    /// # Safety
    /// `raw` must be the exact pointer the loader passed to
    /// [`InitializeFn`], and the reference must not outlive that call.
    pub unsafe fn from_raw<'h>(raw: *mut c_void) -> &'h mut PluginHost<'h> {
        &mut *(raw as *mut PluginHost<'h>)
    }

    /// Attaches a task to the hosting kernel.
    pub fn add_task(
        &mut self,
        task: TaskRef,
        descriptor: TaskDescriptor,
    ) -> Result<TaskId, KernelError> {
        self.kernel.add_task(task, descriptor)
    }

    /// Creates an event channel on the hosting kernel's event manager.
    pub fn create_channel(&mut self, name: &str) -> Result<(), EventError> {
        self.kernel.context().events.lock().unwrap().create_channel(name)
    }

    /// Subscribes to an event channel on the hosting kernel's event manager.
    pub fn subscribe(
        &mut self,
        channel: &str,
        subscriber: SubscriberRef,
    ) -> Result<(), EventError> {
        self.kernel
            .context()
            .events
            .lock()
            .unwrap()
            .subscribe(channel, subscriber)
    }

    /// The hosting kernel's shared context.
    pub fn context(&self) -> &CoreContext {
        self.kernel.context()
    }

    /// A detachable requester the plugin may keep beyond initialize.
    pub fn handle(&self) -> kairos_core::kernel::KernelHandle {
        self.kernel.handle()
    }
}
