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

//! Derived timers that follow the clock at their own pace.

use crate::time::clock::TimeObserver;
use crate::time::FrameTiming;

/// A clock-following timer with local scale, pause and fixed-step controls.
///
/// Register a timer as a time observer and it accumulates the clock's
/// filtered frame duration, multiplied by its scale. A fixed step replaces
/// the clock-driven duration; pausing freezes the timer without
/// unregistering it.
#[derive(Debug)]
pub struct Timer {
    elapsed: f64,
    scale: f64,
    paused: bool,
    fixed_step: Option<f64>,
}

impl Timer {
    /// A running timer at scale 1.0.
    pub fn new() -> Self {
        Self {
            elapsed: 0.0,
            scale: 1.0,
            paused: false,
            fixed_step: None,
        }
    }

    /// Accumulated local time in seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Current time scale.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Sets the time scale. 2.0 runs double speed, 0.5 half speed.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    /// True while the timer ignores clock advances.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pauses or unpauses accumulation.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Sets or clears a fixed per-frame step that replaces the clock's
    /// filtered duration. The scale still applies.
    pub fn set_fixed_step(&mut self, fixed_step: Option<f64>) {
        self.fixed_step = fixed_step;
    }

    /// Rezeroes accumulated time. Scale, pause and step settings are kept.
    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeObserver for Timer {
    fn on_time(&mut self, timing: &FrameTiming) {
        if self.paused {
            return;
        }
        let step = self.fixed_step.unwrap_or(timing.filtered);
        self.elapsed += self.scale * step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame(filtered: f64) -> FrameTiming {
        FrameTiming {
            frame: 1,
            delta: filtered,
            raw_delta: filtered,
            filtered,
            elapsed: filtered,
        }
    }

    #[test]
    fn test_timer_follows_filtered_duration() {
        let mut timer = Timer::new();
        timer.on_time(&frame(0.5));
        timer.on_time(&frame(0.25));
        assert_relative_eq!(timer.elapsed(), 0.75);
    }

    #[test]
    fn test_timer_scale_speeds_and_slows() {
        let mut timer = Timer::new();
        timer.set_scale(2.0);
        timer.on_time(&frame(1.0));
        timer.set_scale(0.5);
        timer.on_time(&frame(1.0));
        assert_relative_eq!(timer.elapsed(), 2.5);
    }

    #[test]
    fn test_paused_timer_freezes() {
        let mut timer = Timer::new();
        timer.on_time(&frame(1.0));
        timer.set_paused(true);
        timer.on_time(&frame(1.0));
        timer.on_time(&frame(1.0));
        timer.set_paused(false);
        timer.on_time(&frame(1.0));
        assert_relative_eq!(timer.elapsed(), 2.0);
    }

    #[test]
    fn test_fixed_step_ignores_clock_duration() {
        let mut timer = Timer::new();
        timer.set_fixed_step(Some(0.1));
        timer.on_time(&frame(5.0));
        timer.on_time(&frame(0.001));
        assert_relative_eq!(timer.elapsed(), 0.2);
    }

    #[test]
    fn test_reset_keeps_settings() {
        let mut timer = Timer::new();
        timer.set_scale(3.0);
        timer.on_time(&frame(1.0));
        timer.reset();
        assert_relative_eq!(timer.elapsed(), 0.0);
        timer.on_time(&frame(1.0));
        assert_relative_eq!(timer.elapsed(), 3.0);
    }
}
