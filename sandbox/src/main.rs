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

// Kairos Sandbox
// Demo binary wiring a kernel end to end: clock, tasks, events, the console
// surface and (optionally) a plugin library.

use anyhow::{Context, Result};
use kairos_core::context::CoreContext;
use kairos_core::event::{EventRef, EventSubscriber, MessageEventFactory, SYSTEM_CHANNEL};
use kairos_core::kernel::{Kernel, TaskLifecycleEvent};
use kairos_core::resource::{ResourceLedger, ResourceTrackerRef};
use kairos_core::task::{Task, TaskDescriptor, TaskError};
use kairos_core::time::{ClockConfig, SystemTimeSource, TimeObserverRef, Timer};
use kairos_plugins::{PluginHost, PluginRegistry};
use kairos_script::{register_core_bindings, ScriptError, ScriptHost, ScriptTask};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Settings for one sandbox run, read from `sandbox.json` when present.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct RuntimeConfig {
    /// Number of kernel ticks before shutdown.
    ticks: u64,
    /// Frames between stats lines. Zero silences them.
    stats_every: u64,
    /// Clock settings applied before the first tick.
    clock: ClockConfig,
    /// Plugin library loaded at startup, when set.
    plugin: Option<PathBuf>,
    /// Console lines queued before the first tick.
    boot_lines: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ticks: 120,
            stats_every: 30,
            clock: ClockConfig {
                max_rate: Some(60.0),
                ..ClockConfig::default()
            },
            plugin: None,
            boot_lines: vec!["task.list".to_string()],
        }
    }
}

fn load_config(path: &str) -> Result<RuntimeConfig> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse '{}'", path))?;
            log::info!("[Sandbox] Configuration loaded from '{}'", path);
            Ok(config)
        }
        Err(_) => {
            log::info!("[Sandbox] No '{}' found; using defaults", path);
            Ok(RuntimeConfig::default())
        }
    }
}

/// Spins a little orbit from the shared clock, to give the scheduler
/// something continuous to run.
struct SimulationTask {
    angle: f64,
}

impl Task for SimulationTask {
    fn name(&self) -> &str {
        "simulation"
    }

    fn update(&mut self, context: &CoreContext) -> Result<(), TaskError> {
        let timing = context.clock.lock().unwrap().timing();
        self.angle = (self.angle + timing.delta) % std::f64::consts::TAU;
        Ok(())
    }

    fn on_stop(&mut self) {
        log::info!("[Simulation] Final angle {:.3} rad", self.angle);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Burns a little time on its own worker thread so suspends and resumes
/// are visible in the log.
struct HeartbeatTask {
    beats: u64,
}

impl Task for HeartbeatTask {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn update(&mut self, _context: &CoreContext) -> Result<(), TaskError> {
        self.beats += 1;
        thread::sleep(Duration::from_millis(5));
        Ok(())
    }

    fn on_stop(&mut self) {
        log::info!("[Heartbeat] {} beats", self.beats);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Prints task lifecycle announcements from the system channel.
struct AnnouncementLogger;

impl EventSubscriber for AnnouncementLogger {
    fn name(&self) -> &str {
        "announcement-logger"
    }

    fn on_event(&mut self, event: &EventRef) {
        if let Some(lifecycle) = event.as_any().downcast_ref::<TaskLifecycleEvent>() {
            log::info!("[Events] {} '{}'", event.type_name(), lifecycle.task_name);
        }
    }
}

/// Stand-in interpreter: stores sources and logs what it is asked to do.
#[derive(Default)]
struct EchoScriptHost {
    scripts: HashMap<String, String>,
}

impl EchoScriptHost {
    fn source(&self, name: &str) -> Result<&String, ScriptError> {
        self.scripts
            .get(name)
            .ok_or_else(|| ScriptError::Failed(format!("script '{}' is not loaded", name)))
    }
}

impl ScriptHost for EchoScriptHost {
    fn load(&mut self, name: &str, source: &str) -> Result<(), ScriptError> {
        self.scripts.insert(name.to_string(), source.to_string());
        Ok(())
    }

    fn run(&mut self, name: &str) -> Result<(), ScriptError> {
        let source = self.source(name)?;
        log::info!("[{}] {}", name, source);
        Ok(())
    }

    fn call(&mut self, name: &str, function: &str, args: &[&str]) -> Result<String, ScriptError> {
        self.source(name)?;
        Ok(format!("{}({}) acknowledged", function, args.join(", ")))
    }

    fn unload(&mut self, name: &str) -> Result<(), ScriptError> {
        match self.scripts.remove(name) {
            Some(_) => Ok(()),
            None => Err(ScriptError::Failed(format!(
                "script '{}' is not loaded",
                name
            ))),
        }
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config("sandbox.json")?;

    // --- Step 1: Shared services and the kernel ---
    let context = CoreContext::new();
    {
        let mut clock = context.clock.lock().unwrap();
        clock.apply_config(&config.clock);
        clock.bind_source(Box::new(SystemTimeSource::new()));
    }
    context
        .events
        .lock()
        .unwrap()
        .register_factory(Box::new(MessageEventFactory));

    let mut kernel = Kernel::new(context);
    kernel
        .context()
        .events
        .lock()
        .unwrap()
        .subscribe(SYSTEM_CHANNEL, Arc::new(Mutex::new(AnnouncementLogger)))?;

    // --- Step 2: Demo tasks and a derived timer ---
    kernel.add_task(
        Arc::new(Mutex::new(SimulationTask { angle: 0.0 })),
        TaskDescriptor::default(),
    )?;
    kernel.add_task(
        Arc::new(Mutex::new(HeartbeatTask { beats: 0 })),
        TaskDescriptor::threaded(),
    )?;

    let slow_motion = Arc::new(Mutex::new(Timer::new()));
    slow_motion.lock().unwrap().set_scale(0.5);
    kernel
        .context()
        .clock
        .lock()
        .unwrap()
        .add_time_observer("slow-motion", Arc::clone(&slow_motion) as TimeObserverRef)?;

    // --- Step 3: The console surface ---
    let mut script = ScriptTask::new(Box::new(EchoScriptHost::default()));
    script.set_tracker(Arc::new(Mutex::new(ResourceLedger::new())) as ResourceTrackerRef);
    register_core_bindings(script.registry_mut(), kernel.context(), &kernel.handle())?;
    let console = script.queue();
    // Console lines run early in the tick so their effects land this frame.
    kernel.add_task(
        Arc::new(Mutex::new(script)),
        TaskDescriptor::with_order(-100),
    )?;

    for line in &config.boot_lines {
        console.push(line.clone());
    }
    console.push("script.load greeter Hello from the script surface");
    console.push("script.run greeter");

    // --- Step 4: Optional plugin ---
    let mut plugins = PluginRegistry::new();
    if let Some(path) = &config.plugin {
        let mut host = PluginHost::new(&mut kernel);
        // The library is trusted to honor the plugin ABI contract.
        match unsafe { plugins.load(path, &mut host) } {
            Ok(()) => log::info!("[Sandbox] Plugin '{}' installed", path.display()),
            Err(err) => log::warn!("[Sandbox] Plugin skipped: {}", err),
        }
    }

    // --- Step 5: Run ---
    for _ in 0..config.ticks {
        let report = kernel.one_tick();
        for result in &report.results {
            if let Err(err) = &result.outcome {
                log::warn!(
                    "[Sandbox] Task '{}' failed on frame {}: {}",
                    result.name,
                    report.frame,
                    err
                );
            }
        }
        if config.stats_every > 0 && report.frame % config.stats_every == 0 {
            let timing = kernel.context().clock.lock().unwrap().timing();
            log::info!(
                "[Sandbox] frame {} delta {:.4}s filtered {:.4}s elapsed {:.2}s slow-motion {:.2}s",
                timing.frame,
                timing.delta,
                timing.filtered,
                timing.elapsed,
                slow_motion.lock().unwrap().elapsed()
            );
        }
    }

    // --- Step 6: Shutdown ---
    // Tasks a plugin registered stop before its library is released.
    kernel.shutdown();
    plugins.unload_all();
    Ok(())
}
