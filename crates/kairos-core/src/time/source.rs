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

//! Pluggable origins of monotonic time.

use std::time::Instant;

/// A monotonic supplier of seconds since its own epoch.
///
/// The clock consumes readings as deltas, so absolute values only need to be
/// monotonic between two [`rebase`](TimeSource::rebase) calls. Rebasing moves
/// the epoch to "now" so readings restart near zero before `f64` precision
/// degrades on long runs.
pub trait TimeSource: Send {
    /// Seconds elapsed since the source's epoch.
    fn seconds(&mut self) -> f64;

    /// Moves the epoch to the present instant.
    fn rebase(&mut self);
}

/// Wall-clock time source backed by [`Instant`].
#[derive(Debug)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    /// Creates a source with its epoch at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn seconds(&mut self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn rebase(&mut self) {
        self.origin = Instant::now();
    }
}

/// Deterministic time source that advances by a fixed step per reading.
///
/// Intended for tests and offline simulation: every call to
/// [`seconds`](TimeSource::seconds) moves time forward by the configured
/// step, so a clock driven from this source sees identical frame durations
/// on every run.
#[derive(Debug)]
pub struct VirtualTimeSource {
    current: f64,
    step: f64,
}

impl VirtualTimeSource {
    /// Creates a source that gains `step` seconds per reading.
    pub fn new(step: f64) -> Self {
        Self { current: 0.0, step }
    }

    /// Changes the per-reading step.
    pub fn set_step(&mut self, step: f64) {
        self.step = step;
    }
}

impl TimeSource for VirtualTimeSource {
    fn seconds(&mut self) -> f64 {
        self.current += self.step;
        self.current
    }

    fn rebase(&mut self) {
        self.current = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_system_source_is_monotonic() {
        let mut source = SystemTimeSource::new();
        let first = source.seconds();
        let second = source.seconds();
        assert!(second >= first);
    }

    #[test]
    fn test_system_source_rebase_restarts_near_zero() {
        let mut source = SystemTimeSource::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let before = source.seconds();
        source.rebase();
        let after = source.seconds();
        assert!(after < before);
    }

    #[test]
    fn test_virtual_source_steps_deterministically() {
        let mut source = VirtualTimeSource::new(0.25);
        assert_relative_eq!(source.seconds(), 0.25);
        assert_relative_eq!(source.seconds(), 0.5);
        source.set_step(1.0);
        assert_relative_eq!(source.seconds(), 1.5);
        source.rebase();
        assert_relative_eq!(source.seconds(), 1.0);
    }
}
