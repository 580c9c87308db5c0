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

//! Ready-made commands exposing the kernel across the string boundary.

use crate::registry::{expect_args, CommandRegistry, ScriptError};
use kairos_core::context::CoreContext;
use kairos_core::kernel::KernelHandle;

/// Registers the standard kernel commands on a registry.
///
/// Task mutations go through the [`KernelHandle`], so they apply at the
/// start of the kernel's next tick; the commands report the request, not
/// its completion.
///
/// Registered commands:
/// - `clock.reset` — rezeroes the shared clock;
/// - `clock.stats` — one-line timing snapshot;
/// - `task.list` — one line per attached task;
/// - `task.suspend <name>` / `task.resume <name>` / `task.remove <name>`;
/// - `event.emit <channel> <type>` — builds the event via the registered
///   factories and publishes it.
pub fn register_core_bindings(
    registry: &mut CommandRegistry,
    context: &CoreContext,
    kernel: &KernelHandle,
) -> Result<(), ScriptError> {
    let clock = context.clone();
    registry.register("clock.reset", move |args| {
        expect_args("clock.reset", 0, args)?;
        clock.clock.lock().unwrap().reset();
        Ok("clock reset".to_string())
    })?;

    let clock = context.clone();
    registry.register("clock.stats", move |args| {
        expect_args("clock.stats", 0, args)?;
        let timing = clock.clock.lock().unwrap().timing();
        Ok(format!(
            "frame {} elapsed {:.3}s delta {:.4}s filtered {:.4}s",
            timing.frame, timing.elapsed, timing.delta, timing.filtered
        ))
    })?;

    let handle = kernel.clone();
    registry.register("task.list", move |args| {
        expect_args("task.list", 0, args)?;
        let lines: Vec<String> = handle
            .tasks()
            .iter()
            .map(|info| {
                format!(
                    "{} {} order {} [{}]",
                    info.id, info.name, info.order, info.state
                )
            })
            .collect();
        Ok(lines.join("\n"))
    })?;

    let handle = kernel.clone();
    registry.register("task.suspend", move |args| {
        expect_args("task.suspend", 1, args)?;
        handle.suspend_task(args[0]);
        Ok(format!("suspend of '{}' requested", args[0]))
    })?;

    let handle = kernel.clone();
    registry.register("task.resume", move |args| {
        expect_args("task.resume", 1, args)?;
        handle.resume_task(args[0]);
        Ok(format!("resume of '{}' requested", args[0]))
    })?;

    let handle = kernel.clone();
    registry.register("task.remove", move |args| {
        expect_args("task.remove", 1, args)?;
        handle.remove_task(args[0]);
        Ok(format!("removal of '{}' requested", args[0]))
    })?;

    let events = context.clone();
    registry.register("event.emit", move |args| {
        expect_args("event.emit", 2, args)?;
        let (channel, type_name) = (args[0], args[1]);
        let mut events = events.events.lock().unwrap();
        let event = events
            .create_event(type_name)
            .ok_or_else(|| ScriptError::Failed(format!("no factory builds '{}'", type_name)))?;
        events
            .emit(channel, event)
            .map_err(|err| ScriptError::Failed(err.to_string()))?;
        Ok(format!("'{}' emitted on '{}'", type_name, channel))
    })?;

    Ok(())
}
