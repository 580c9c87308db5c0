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

//! Resolves plugin libraries into callable [`Plugin`]s and keeps them alive.

use crate::api::{
    PluginApi, PluginHost, ENGINE_API_VERSION, ENGINE_VERSION_SYMBOL, INITIALIZE_SYMBOL,
    LAST_ERROR_SYMBOL, RELEASE_SYMBOL, VERSION_STRING_SYMBOL,
};
use libloading::Library;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};

/// Error raised while loading or initializing a plugin.
#[derive(Debug)]
pub enum PluginError {
    /// The shared library could not be opened.
    LoadFailed {
        /// Library path as given to the loader.
        path: PathBuf,
        /// Loader error text.
        details: String,
    },
    /// A required ABI symbol is missing from the library.
    MissingSymbol {
        /// Library path as given to the loader.
        path: PathBuf,
        /// Name of the missing symbol.
        symbol: String,
        /// Loader error text.
        details: String,
    },
    /// The plugin was compiled against a different engine ABI revision.
    EngineVersionMismatch {
        /// Library path as given to the loader.
        path: PathBuf,
        /// Revision the plugin reported.
        plugin: u32,
        /// Revision this engine speaks.
        engine: u32,
    },
    /// The plugin's initialize entry point reported failure.
    InitializeFailed {
        /// Library path as given to the loader.
        path: PathBuf,
        /// The plugin's last-error text.
        details: String,
    },
    /// A plugin from this path is already registered.
    AlreadyLoaded(PathBuf),
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginError::LoadFailed { path, details } => {
                write!(f, "Failed to load plugin '{}': {}", path.display(), details)
            }
            PluginError::MissingSymbol {
                path,
                symbol,
                details,
            } => {
                write!(
                    f,
                    "Plugin '{}' is missing symbol '{}': {}",
                    path.display(),
                    symbol,
                    details
                )
            }
            PluginError::EngineVersionMismatch {
                path,
                plugin,
                engine,
            } => {
                write!(
                    f,
                    "Plugin '{}' targets engine ABI {} but this engine speaks {}",
                    path.display(),
                    plugin,
                    engine
                )
            }
            PluginError::InitializeFailed { path, details } => {
                write!(
                    f,
                    "Plugin '{}' failed to initialize: {}",
                    path.display(),
                    details
                )
            }
            PluginError::AlreadyLoaded(path) => {
                write!(f, "Plugin '{}' is already loaded", path.display())
            }
        }
    }
}

impl std::error::Error for PluginError {}

/// A loaded, version-gated plugin.
///
/// Dropping a plugin calls its release symbol and then unmaps the library.
/// All ABI trust is established at construction: both constructors are
/// `unsafe`, and everything after that (initialize, queries, drop) relies on
/// the contract they document.
#[derive(Debug)]
pub struct Plugin {
    api: PluginApi,
    path: PathBuf,
    version: String,
    // Keeps the code mapped while `api` is callable. None for tables built
    // from in-process function pointers.
    _library: Option<Library>,
}

impl Plugin {
    /// Opens a shared library, resolves the five ABI symbols and gates on
    /// the engine version. The plugin is not initialized yet.
    ///
    /// # Safety
    /// Loading a library runs arbitrary code (constructors) and the resolved
    /// symbols are trusted to follow the documented ABI. Only load plugin
    /// binaries you trust.
    pub unsafe fn load(path: &Path) -> Result<Self, PluginError> {
        let library = Library::new(path).map_err(|err| PluginError::LoadFailed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
        let api = resolve_api(&library, path)?;
        let mut plugin = Self::from_api(api, path)?;
        plugin._library = Some(library);
        log::info!(
            "[PluginLoader] '{}' loaded (version {})",
            path.display(),
            plugin.version
        );
        Ok(plugin)
    }

    /// Builds a plugin from an already-resolved function table. Applies the
    /// same engine-version gate as [`load`](Plugin::load).
    ///
    /// # Safety
    /// Every function pointer in `api` must follow the ABI contract of the
    /// symbol it stands in for, for the lifetime of the returned plugin.
    pub unsafe fn from_api(api: PluginApi, path: impl Into<PathBuf>) -> Result<Self, PluginError> {
        let path = path.into();
        let reported = (api.engine_version)();
        if reported != ENGINE_API_VERSION {
            return Err(PluginError::EngineVersionMismatch {
                path,
                plugin: reported,
                engine: ENGINE_API_VERSION,
            });
        }
        let version = cstr_to_string((api.version_string)());
        Ok(Self {
            api,
            path,
            version,
            _library: None,
        })
    }

    /// Runs the plugin's initialize entry point against the host.
    pub fn initialize(&mut self, host: &mut PluginHost<'_>) -> Result<(), PluginError> {
        let ok = unsafe { (self.api.initialize)(host as *mut PluginHost as *mut c_void) };
        if !ok {
            return Err(PluginError::InitializeFailed {
                path: self.path.clone(),
                details: self.last_error(),
            });
        }
        log::info!("[PluginLoader] '{}' initialized", self.path.display());
        Ok(())
    }

    /// The path the plugin was loaded from (or registered under).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The plugin's reported version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The plugin's most recent error text, empty when none.
    pub fn last_error(&self) -> String {
        unsafe { cstr_to_string((self.api.last_error)()) }
    }
}

impl Drop for Plugin {
    fn drop(&mut self) {
        log::info!("[PluginLoader] '{}' released", self.path.display());
        unsafe { (self.api.release)() };
    }
}

/// Owns every loaded plugin, keyed by path.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and initializes a plugin library.
    ///
    /// # Safety
    /// Same contract as [`Plugin::load`].
    pub unsafe fn load(
        &mut self,
        path: &Path,
        host: &mut PluginHost<'_>,
    ) -> Result<(), PluginError> {
        let plugin = Plugin::load(path)?;
        self.install(plugin, host)
    }

    /// Initializes a pre-built plugin and takes ownership of it. Duplicate
    /// paths are refused.
    pub fn install(
        &mut self,
        mut plugin: Plugin,
        host: &mut PluginHost<'_>,
    ) -> Result<(), PluginError> {
        if self.plugins.iter().any(|known| known.path() == plugin.path()) {
            return Err(PluginError::AlreadyLoaded(plugin.path().to_path_buf()));
        }
        plugin.initialize(host)?;
        self.plugins.push(plugin);
        Ok(())
    }

    /// The loaded plugins, in load order.
    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Number of loaded plugins.
    pub fn count(&self) -> usize {
        self.plugins.len()
    }

    /// Releases every plugin, in reverse load order.
    pub fn unload_all(&mut self) {
        while let Some(plugin) = self.plugins.pop() {
            drop(plugin);
        }
    }
}

fn resolve_api(library: &Library, path: &Path) -> Result<PluginApi, PluginError> {
    // Resolving a symbol with the wrong signature is UB at call time; the
    // five types below are the published ABI.
    macro_rules! symbol {
        ($name:expr, $ty:ty) => {
            unsafe { library.get::<$ty>($name) }
                .map(|symbol| *symbol)
                .map_err(|err| PluginError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: String::from_utf8_lossy($name).into_owned(),
                    details: err.to_string(),
                })?
        };
    }

    Ok(PluginApi {
        initialize: symbol!(INITIALIZE_SYMBOL, crate::api::InitializeFn),
        engine_version: symbol!(ENGINE_VERSION_SYMBOL, crate::api::EngineVersionFn),
        version_string: symbol!(VERSION_STRING_SYMBOL, crate::api::VersionStringFn),
        last_error: symbol!(LAST_ERROR_SYMBOL, crate::api::LastErrorFn),
        release: symbol!(RELEASE_SYMBOL, crate::api::ReleaseFn),
    })
}

unsafe fn cstr_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}
