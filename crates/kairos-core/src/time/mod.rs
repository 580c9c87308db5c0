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

//! Frame timing: time sources, the clock task, and derived timers.

pub mod clock;
pub mod source;
pub mod timer;

pub use clock::{Clock, ClockConfig, ClockError, ObserverHandle, TimeObserver, TimeObserverRef};
pub use source::{SystemTimeSource, TimeSource, VirtualTimeSource};
pub use timer::Timer;

use serde::{Deserialize, Serialize};

/// Snapshot of one clock advance, handed to every time observer.
///
/// All durations are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameTiming {
    /// Number of completed clock advances since start (or reset).
    pub frame: u64,
    /// Effective frame duration: the fixed step when one is configured,
    /// otherwise the measured duration.
    pub delta: f64,
    /// Measured duration between the last two source readings.
    pub raw_delta: f64,
    /// Mean of the last few effective durations (sliding window).
    pub filtered: f64,
    /// Accumulated effective time since start (or reset).
    pub elapsed: f64,
}
