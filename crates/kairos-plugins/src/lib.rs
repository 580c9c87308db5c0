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

//! # Kairos Plugins
//!
//! Dynamic-library plugin loading for the Kairos kernel: a five-symbol C ABI,
//! engine-version gating, and a registry that owns loaded plugins until
//! release.

#![warn(missing_docs)]

pub mod api;
pub mod loader;

pub use api::{PluginApi, PluginHost, ENGINE_API_VERSION};
pub use loader::{Plugin, PluginError, PluginRegistry};
