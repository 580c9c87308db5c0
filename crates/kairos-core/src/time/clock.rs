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

//! The clock task: measures, filters and publishes frame time.

use crate::context::CoreContext;
use crate::task::{Task, TaskError};
use crate::time::source::TimeSource;
use crate::time::FrameTiming;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Default width of the frame duration smoothing window.
pub const DEFAULT_FILTER_WINDOW: usize = 10;

/// Stable identity of a registered time observer.
///
/// Handles are 1-based and never reused by a clock; [`ObserverHandle::NONE`]
/// is the reserved "not registered" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverHandle(pub u32);

impl ObserverHandle {
    /// The reserved null handle.
    pub const NONE: ObserverHandle = ObserverHandle(0);
}

impl fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives the clock's [`FrameTiming`] after every advance.
///
/// Observers run while the clock is borrowed; they must not call back into
/// the shared clock handle.
pub trait TimeObserver: Send {
    /// Called once per clock advance with the fresh timing snapshot.
    fn on_time(&mut self, timing: &FrameTiming);
}

/// Shared handle to a time observer.
pub type TimeObserverRef = Arc<Mutex<dyn TimeObserver>>;

/// Error raised by clock operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// The clock cannot advance because no time source is bound.
    NoTimeSource,
    /// An observer with this name is already registered.
    DuplicateObserver(String),
    /// No observer is registered under this handle.
    UnknownObserverHandle(ObserverHandle),
    /// No observer is registered under this name.
    UnknownObserverName(String),
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::NoTimeSource => write!(f, "No time source is bound to the clock"),
            ClockError::DuplicateObserver(name) => {
                write!(f, "Time observer '{}' is already registered", name)
            }
            ClockError::UnknownObserverHandle(handle) => {
                write!(f, "No time observer with handle {}", handle)
            }
            ClockError::UnknownObserverName(name) => {
                write!(f, "No time observer named '{}'", name)
            }
        }
    }
}

impl std::error::Error for ClockError {}

/// Tuning knobs for the clock, deserializable from application config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Width of the smoothing window, in frames. Clamped to at least 1.
    pub filter_window: usize,
    /// When set, every frame advances simulated time by exactly this many
    /// seconds regardless of the measured duration.
    pub fixed_step: Option<f64>,
    /// When set, the clock busy-waits so frames never complete faster than
    /// this rate (in frames per second).
    pub max_rate: Option<f64>,
    /// When set, the time source is rebased every time this many seconds of
    /// simulated time accumulate.
    pub sync_interval: Option<f64>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            filter_window: DEFAULT_FILTER_WINDOW,
            fixed_step: None,
            max_rate: None,
            sync_interval: None,
        }
    }
}

struct ObserverEntry {
    handle: ObserverHandle,
    name: String,
    observer: TimeObserverRef,
}

/// Measures frame durations from a bound [`TimeSource`] and publishes them.
///
/// The clock is an ordinary task (registered by the kernel under the name
/// `"clock"`); each update advances simulated time by one frame. Raw frame
/// durations are smoothed over a sliding window, optionally replaced by a
/// fixed step, and optionally paced to a maximum frame rate by busy-waiting
/// on the source. Registered [`TimeObserver`]s are notified after every
/// advance.
pub struct Clock {
    source: Option<Box<dyn TimeSource>>,
    filter_window: usize,
    fixed_step: Option<f64>,
    max_rate: Option<f64>,
    sync_interval: Option<f64>,
    samples: VecDeque<f64>,
    last_source_time: f64,
    last_sync: f64,
    timing: FrameTiming,
    observers: Vec<ObserverEntry>,
    next_handle: u32,
}

impl Clock {
    /// A clock with default configuration and no time source.
    pub fn new() -> Self {
        Self::with_config(ClockConfig::default())
    }

    /// A clock tuned by `config`, with no time source bound yet.
    pub fn with_config(config: ClockConfig) -> Self {
        let mut clock = Self {
            source: None,
            filter_window: DEFAULT_FILTER_WINDOW,
            fixed_step: None,
            max_rate: None,
            sync_interval: None,
            samples: VecDeque::new(),
            last_source_time: 0.0,
            last_sync: 0.0,
            timing: FrameTiming::default(),
            observers: Vec::new(),
            next_handle: 1,
        };
        clock.apply_config(&config);
        clock
    }

    /// Applies every field of `config` to the running clock.
    pub fn apply_config(&mut self, config: &ClockConfig) {
        self.set_filter_window(config.filter_window);
        self.set_fixed_step(config.fixed_step);
        self.set_max_rate(config.max_rate);
        self.set_sync_interval(config.sync_interval);
    }

    /// Binds the source the clock reads time from.
    ///
    /// The first reading is consumed as the baseline, so the next advance
    /// measures from "now" instead of from the source's epoch.
    pub fn bind_source(&mut self, mut source: Box<dyn TimeSource>) {
        self.last_source_time = source.seconds();
        self.source = Some(source);
        log::info!("[Clock] Time source bound");
    }

    /// True when a time source is bound.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Advances simulated time by one frame.
    ///
    /// Fails with [`ClockError::NoTimeSource`] when no source is bound. With
    /// a max rate configured this call busy-waits until the minimum frame
    /// interval has passed, which requires a source that actually advances.
    pub fn advance(&mut self) -> Result<FrameTiming, ClockError> {
        let source = self.source.as_mut().ok_or(ClockError::NoTimeSource)?;

        let mut now = source.seconds();
        if let Some(max_rate) = self.max_rate {
            let min_interval = 1.0 / max_rate;
            while now - self.last_source_time < min_interval {
                std::hint::spin_loop();
                now = source.seconds();
            }
        }

        let raw_delta = (now - self.last_source_time).max(0.0);
        self.last_source_time = now;
        let delta = self.fixed_step.unwrap_or(raw_delta);

        self.samples.push_back(delta);
        while self.samples.len() > self.filter_window {
            self.samples.pop_front();
        }
        let filtered = self.samples.iter().sum::<f64>() / self.samples.len() as f64;

        self.timing.frame += 1;
        self.timing.delta = delta;
        self.timing.raw_delta = raw_delta;
        self.timing.filtered = filtered;
        self.timing.elapsed += delta;

        if let Some(interval) = self.sync_interval {
            if self.timing.elapsed - self.last_sync >= interval {
                source.rebase();
                self.last_source_time = 0.0;
                self.last_sync = self.timing.elapsed;
                log::debug!("[Clock] Source rebased at {:.3}s", self.timing.elapsed);
            }
        }

        let timing = self.timing;
        for entry in &self.observers {
            entry.observer.lock().unwrap().on_time(&timing);
        }
        Ok(timing)
    }

    /// Rezeroes simulated time, the frame counter and the smoothing window.
    ///
    /// Configuration and registered observers are kept; the bound source is
    /// rebased so the next advance measures a small delta.
    pub fn reset(&mut self) {
        self.timing = FrameTiming::default();
        self.samples.clear();
        self.last_sync = 0.0;
        self.last_source_time = 0.0;
        if let Some(source) = self.source.as_mut() {
            source.rebase();
        }
        log::debug!("[Clock] Reset");
    }

    /// Latest published timing snapshot.
    pub fn timing(&self) -> FrameTiming {
        self.timing
    }

    /// Changes the smoothing window width. Zero is clamped to 1.
    pub fn set_filter_window(&mut self, window: usize) {
        if window == 0 {
            log::warn!("[Clock] Filter window of 0 requested; clamping to 1");
        }
        self.filter_window = window.max(1);
        while self.samples.len() > self.filter_window {
            self.samples.pop_front();
        }
    }

    /// Sets or clears the fixed per-frame step.
    pub fn set_fixed_step(&mut self, fixed_step: Option<f64>) {
        self.fixed_step = fixed_step;
    }

    /// Sets or clears the maximum frame rate. Non-positive rates disable
    /// pacing.
    pub fn set_max_rate(&mut self, max_rate: Option<f64>) {
        match max_rate {
            Some(rate) if rate <= 0.0 => {
                log::warn!("[Clock] Ignoring non-positive max rate {}", rate);
                self.max_rate = None;
            }
            other => self.max_rate = other,
        }
    }

    /// Sets or clears the source resync interval, in simulated seconds.
    pub fn set_sync_interval(&mut self, sync_interval: Option<f64>) {
        self.sync_interval = sync_interval;
    }

    /// Registers an observer under a unique name.
    ///
    /// Returns the observer's stable handle. Handles start at 1 and are
    /// never reused; 0 is reserved as [`ObserverHandle::NONE`].
    pub fn add_time_observer(
        &mut self,
        name: &str,
        observer: TimeObserverRef,
    ) -> Result<ObserverHandle, ClockError> {
        if self.observers.iter().any(|entry| entry.name == name) {
            return Err(ClockError::DuplicateObserver(name.to_string()));
        }
        let handle = ObserverHandle(self.next_handle);
        self.next_handle += 1;
        self.observers.push(ObserverEntry {
            handle,
            name: name.to_string(),
            observer,
        });
        log::debug!("[Clock] Observer '{}' registered as {}", name, handle);
        Ok(handle)
    }

    /// Removes the observer registered under `handle`.
    pub fn remove_time_observer(&mut self, handle: ObserverHandle) -> Result<(), ClockError> {
        let before = self.observers.len();
        self.observers.retain(|entry| entry.handle != handle);
        if self.observers.len() == before {
            return Err(ClockError::UnknownObserverHandle(handle));
        }
        Ok(())
    }

    /// Removes the observer registered under `name`.
    pub fn remove_time_observer_by_name(&mut self, name: &str) -> Result<(), ClockError> {
        let before = self.observers.len();
        self.observers.retain(|entry| entry.name != name);
        if self.observers.len() == before {
            return Err(ClockError::UnknownObserverName(name.to_string()));
        }
        Ok(())
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for Clock {
    fn name(&self) -> &str {
        "clock"
    }

    fn update(&mut self, _context: &CoreContext) -> Result<(), TaskError> {
        self.advance()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::source::VirtualTimeSource;
    use approx::assert_relative_eq;

    /// Source that replays a scripted list of cumulative readings, holding
    /// the final value afterwards.
    struct ScriptedSource {
        readings: Vec<f64>,
        index: usize,
    }

    impl ScriptedSource {
        fn new(readings: Vec<f64>) -> Self {
            Self { readings, index: 0 }
        }
    }

    impl TimeSource for ScriptedSource {
        fn seconds(&mut self) -> f64 {
            let value = self.readings[self.index.min(self.readings.len() - 1)];
            self.index += 1;
            value
        }

        fn rebase(&mut self) {}
    }

    struct AccumulatingObserver {
        total: f64,
    }

    impl TimeObserver for AccumulatingObserver {
        fn on_time(&mut self, timing: &FrameTiming) {
            self.total += timing.filtered;
        }
    }

    #[test]
    fn test_advance_without_source_fails() {
        let mut clock = Clock::new();
        assert_eq!(clock.advance().unwrap_err(), ClockError::NoTimeSource);
    }

    #[test]
    fn test_fixed_virtual_steps_accumulate() {
        let mut clock = Clock::new();
        clock.bind_source(Box::new(VirtualTimeSource::new(1.0)));

        for _ in 0..3 {
            let timing = clock.advance().unwrap();
            assert_relative_eq!(timing.delta, 1.0);
        }

        let timing = clock.timing();
        assert_eq!(timing.frame, 3);
        assert_relative_eq!(timing.elapsed, 3.0);
    }

    #[test]
    fn test_filtered_delta_is_window_mean() {
        // Baseline reading 1.0, then deltas 1.0, 2.0, 3.0, 4.0.
        let mut clock = Clock::with_config(ClockConfig {
            filter_window: 2,
            ..ClockConfig::default()
        });
        clock.bind_source(Box::new(ScriptedSource::new(vec![1.0, 2.0, 4.0, 7.0, 11.0])));

        clock.advance().unwrap();
        clock.advance().unwrap();
        let third = clock.advance().unwrap();
        assert_relative_eq!(third.filtered, (2.0 + 3.0) / 2.0);
        let fourth = clock.advance().unwrap();
        assert_relative_eq!(fourth.filtered, (3.0 + 4.0) / 2.0);
    }

    #[test]
    fn test_filtered_mean_with_partial_window() {
        let mut clock = Clock::with_config(ClockConfig {
            filter_window: 8,
            ..ClockConfig::default()
        });
        clock.bind_source(Box::new(ScriptedSource::new(vec![0.0, 2.0, 6.0])));

        let first = clock.advance().unwrap();
        assert_relative_eq!(first.filtered, 2.0);
        let second = clock.advance().unwrap();
        assert_relative_eq!(second.filtered, 3.0);
    }

    #[test]
    fn test_fixed_step_overrides_measured_delta() {
        let mut clock = Clock::new();
        clock.set_fixed_step(Some(0.1));
        clock.bind_source(Box::new(VirtualTimeSource::new(5.0)));

        let timing = clock.advance().unwrap();

        assert_relative_eq!(timing.delta, 0.1);
        assert_relative_eq!(timing.raw_delta, 5.0);
        assert_relative_eq!(timing.elapsed, 0.1);
    }

    #[test]
    fn test_max_rate_paces_frames() {
        // The source gains 0.5s per reading; at a 1 Hz cap every advance
        // must consume at least 1.0s of source time.
        let mut clock = Clock::new();
        clock.set_max_rate(Some(1.0));
        clock.bind_source(Box::new(VirtualTimeSource::new(0.5)));

        let first = clock.advance().unwrap();
        let second = clock.advance().unwrap();

        assert!(first.raw_delta >= 1.0);
        assert!(second.raw_delta >= 1.0);
    }

    #[test]
    fn test_non_positive_max_rate_disables_pacing() {
        let mut clock = Clock::new();
        clock.set_max_rate(Some(-60.0));
        clock.bind_source(Box::new(VirtualTimeSource::new(0.25)));
        let timing = clock.advance().unwrap();
        assert_relative_eq!(timing.raw_delta, 0.25);
    }

    #[test]
    fn test_sync_interval_rebases_without_time_jump() {
        let mut clock = Clock::new();
        clock.set_sync_interval(Some(2.0));
        clock.bind_source(Box::new(VirtualTimeSource::new(1.0)));

        for _ in 0..4 {
            let timing = clock.advance().unwrap();
            assert_relative_eq!(timing.delta, 1.0);
        }
        assert_relative_eq!(clock.timing().elapsed, 4.0);
    }

    #[test]
    fn test_reset_rezeroes_but_keeps_config() {
        let mut clock = Clock::new();
        clock.set_fixed_step(Some(0.5));
        clock.bind_source(Box::new(VirtualTimeSource::new(1.0)));
        clock.advance().unwrap();
        clock.advance().unwrap();

        clock.reset();

        assert_eq!(clock.timing().frame, 0);
        assert_relative_eq!(clock.timing().elapsed, 0.0);
        let timing = clock.advance().unwrap();
        assert_relative_eq!(timing.delta, 0.5);
    }

    #[test]
    fn test_observer_handles_are_one_based_and_stable() {
        let mut clock = Clock::new();
        let first = clock
            .add_time_observer(
                "first",
                Arc::new(Mutex::new(AccumulatingObserver { total: 0.0 })),
            )
            .unwrap();
        let second = clock
            .add_time_observer(
                "second",
                Arc::new(Mutex::new(AccumulatingObserver { total: 0.0 })),
            )
            .unwrap();

        assert_eq!(first, ObserverHandle(1));
        assert_eq!(second, ObserverHandle(2));
        assert_ne!(first, ObserverHandle::NONE);

        // Removing the first and adding again must not reuse handle 1.
        clock.remove_time_observer(first).unwrap();
        let third = clock
            .add_time_observer(
                "third",
                Arc::new(Mutex::new(AccumulatingObserver { total: 0.0 })),
            )
            .unwrap();
        assert_eq!(third, ObserverHandle(3));
    }

    #[test]
    fn test_duplicate_observer_name_rejected() {
        let mut clock = Clock::new();
        clock
            .add_time_observer(
                "stats",
                Arc::new(Mutex::new(AccumulatingObserver { total: 0.0 })),
            )
            .unwrap();
        let err = clock
            .add_time_observer(
                "stats",
                Arc::new(Mutex::new(AccumulatingObserver { total: 0.0 })),
            )
            .unwrap_err();
        assert_eq!(err, ClockError::DuplicateObserver("stats".to_string()));
    }

    #[test]
    fn test_remove_unknown_observer_fails() {
        let mut clock = Clock::new();
        assert_eq!(
            clock.remove_time_observer(ObserverHandle(9)).unwrap_err(),
            ClockError::UnknownObserverHandle(ObserverHandle(9))
        );
        assert_eq!(
            clock.remove_time_observer_by_name("ghost").unwrap_err(),
            ClockError::UnknownObserverName("ghost".to_string())
        );
    }

    #[test]
    fn test_observers_accumulate_filtered_time() {
        let mut clock = Clock::new();
        let observer = Arc::new(Mutex::new(AccumulatingObserver { total: 0.0 }));
        clock
            .add_time_observer("accumulator", Arc::clone(&observer) as TimeObserverRef)
            .unwrap();
        clock.bind_source(Box::new(VirtualTimeSource::new(1.0)));

        clock.advance().unwrap();
        clock.advance().unwrap();
        clock.advance().unwrap();

        assert_relative_eq!(observer.lock().unwrap().total, 3.0);
    }

    #[test]
    fn test_removed_observer_no_longer_notified() {
        let mut clock = Clock::new();
        let observer = Arc::new(Mutex::new(AccumulatingObserver { total: 0.0 }));
        let handle = clock
            .add_time_observer("accumulator", Arc::clone(&observer) as TimeObserverRef)
            .unwrap();
        clock.bind_source(Box::new(VirtualTimeSource::new(1.0)));

        clock.advance().unwrap();
        clock.remove_time_observer(handle).unwrap();
        clock.advance().unwrap();

        assert_relative_eq!(observer.lock().unwrap().total, 1.0);
        assert_eq!(clock.observer_count(), 0);
    }

    #[test]
    fn test_zero_filter_window_clamps_to_one() {
        let mut clock = Clock::with_config(ClockConfig {
            filter_window: 0,
            ..ClockConfig::default()
        });
        clock.bind_source(Box::new(ScriptedSource::new(vec![0.0, 1.0, 5.0])));

        clock.advance().unwrap();
        let second = clock.advance().unwrap();
        // Window of one: filtered equals the latest delta.
        assert_relative_eq!(second.filtered, 4.0);
    }

    #[test]
    fn test_clock_config_deserializes_with_defaults() {
        let config: ClockConfig = serde_json::from_str(r#"{ "fixed_step": 0.016 }"#).unwrap();
        assert_eq!(config.filter_window, DEFAULT_FILTER_WINDOW);
        assert_eq!(config.fixed_step, Some(0.016));
        assert_eq!(config.max_rate, None);
    }
}
