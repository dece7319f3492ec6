use std::collections::HashMap;
use std::ffi::{CString, c_char, c_int};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

use libloading::Library;
use stepd_plugin_api::{
    PLUGIN_NAME_SYMBOL, PLUGIN_TYPE_SYMBOL, SPANK_HOOK_SYMBOLS, SPANK_OPTIONS_SYMBOL,
    SPANK_PLUGIN_TYPE, StSpankHook, StSpankOptCb, StSpankOption,
};

use crate::error::{Error, Result};
use crate::ffi;
use crate::handle::SpankHandle;
use crate::plugin::{OptionCallback, Phase, SpankOption, SpankPlugin};
use crate::util::cstr_to_string_lossy;

/// Upper bound on entries read from a `spank_options` table.
const MAX_OPTION_TABLE_LEN: usize = 4096;

/// Turns a stack-file path into a plugin.
pub trait PluginLoader {
    /// Cheap check that `path` holds something this loader accepts.
    fn peek(&self, path: &Path) -> bool;

    fn load(&self, path: &Path) -> Result<Box<dyn SpankPlugin>>;
}

/// Whether `name` is one of the lifecycle entry points.
pub fn symbol_supported(name: &str) -> bool {
    SPANK_HOOK_SYMBOLS.contains(&name)
}

/// Loads shared-object plugins with `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl PluginLoader for NativeLoader {
    fn peek(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        // SAFETY: Opening a library runs its initializers; stack entries are trusted.
        let Ok(lib) = (unsafe { Library::new(path) }) else {
            return false;
        };
        read_identity(&lib, path).is_ok()
    }

    fn load(&self, path: &Path) -> Result<Box<dyn SpankPlugin>> {
        Ok(Box::new(NativePlugin::open(path)?))
    }
}

struct NativePlugin {
    name: String,
    hooks: [Option<StSpankHook>; 8],
    options: Vec<SpankOption>,
    // Dropped last: hooks and option callbacks point into the image.
    _lib: Library,
}

impl NativePlugin {
    fn open(path: &Path) -> Result<Self> {
        // SAFETY: Opening a library runs its initializers; stack entries are trusted.
        let lib = unsafe { Library::new(path) }.map_err(|e| Error::load(path, e.to_string()))?;
        let name = read_identity(&lib, path)?;

        let mut hooks: [Option<StSpankHook>; 8] = [None; 8];
        for (slot, symbol) in hooks.iter_mut().zip(SPANK_HOOK_SYMBOLS) {
            // SAFETY: Hook symbols have the `StSpankHook` signature by ABI contract.
            *slot = unsafe { lib.get::<StSpankHook>(symbol.as_bytes()) }
                .ok()
                .map(|sym| *sym);
        }
        if hooks.iter().all(Option::is_none) {
            return Err(Error::NoSymbols {
                path: path.to_path_buf(),
            });
        }

        let options = read_option_table(&lib, &name);
        tracing::debug!(
            plugin = %name,
            path = %path.display(),
            hooks = hooks.iter().flatten().count(),
            options = options.len(),
            "loaded native plugin"
        );
        Ok(Self {
            name,
            hooks,
            options,
            _lib: lib,
        })
    }
}

impl SpankPlugin for NativePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn implements(&self, phase: Phase) -> bool {
        self.hooks[phase.index()].is_some()
    }

    fn invoke(&self, phase: Phase, spank: &mut SpankHandle<'_>, argv: &[String]) -> i32 {
        match self.hooks[phase.index()] {
            Some(hook) => ffi::call_hook(hook, spank, argv),
            None => 0,
        }
    }

    fn options(&self) -> Vec<SpankOption> {
        self.options.clone()
    }
}

/// Reads `plugin_name` and checks `plugin_type`. Both are NUL-terminated
/// character arrays exported by the module.
fn read_identity(lib: &Library, path: &Path) -> Result<String> {
    let name = read_cstr_symbol(lib, PLUGIN_NAME_SYMBOL)
        .ok_or_else(|| Error::load(path, format!("missing `{PLUGIN_NAME_SYMBOL}` symbol")))?;
    match read_cstr_symbol(lib, PLUGIN_TYPE_SYMBOL) {
        Some(kind) if kind == SPANK_PLUGIN_TYPE => Ok(name),
        Some(kind) => Err(Error::load(
            path,
            format!("plugin type `{kind}` is not `{SPANK_PLUGIN_TYPE}`"),
        )),
        None => Err(Error::load(
            path,
            format!("missing `{PLUGIN_TYPE_SYMBOL}` symbol"),
        )),
    }
}

fn read_cstr_symbol(lib: &Library, symbol: &str) -> Option<String> {
    // SAFETY: The symbol address is the first byte of a NUL-terminated array.
    let sym = unsafe { lib.get::<*const c_char>(symbol.as_bytes()) }.ok()?;
    unsafe { cstr_to_string_lossy(*sym) }
}

fn read_option_table(lib: &Library, plugin: &str) -> Vec<SpankOption> {
    // SAFETY: `spank_options` is an array of `StSpankOption` ending with a null name.
    let Ok(sym) = (unsafe { lib.get::<*const StSpankOption>(SPANK_OPTIONS_SYMBOL.as_bytes()) })
    else {
        return Vec::new();
    };
    let table: *const StSpankOption = *sym;
    let mut options = Vec::new();
    for index in 0..MAX_OPTION_TABLE_LEN {
        // SAFETY: Entries up to and including the terminator are readable.
        let entry = unsafe { &*table.add(index) };
        if entry.is_end() {
            return options;
        }
        options.push(unsafe { option_from_ffi(entry) });
    }
    tracing::warn!(
        plugin = %plugin,
        max = MAX_OPTION_TABLE_LEN,
        "option table has no terminator, truncating"
    );
    options
}

unsafe fn option_from_ffi(entry: &StSpankOption) -> SpankOption {
    let name = unsafe { cstr_to_string_lossy(entry.name) }.unwrap_or_default();
    let arginfo = unsafe { cstr_to_string_lossy(entry.arginfo) };
    let usage = unsafe { cstr_to_string_lossy(entry.usage) }.unwrap_or_default();
    SpankOption {
        name,
        arginfo,
        usage,
        has_arg: entry.has_arg != 0,
        val: entry.val,
        cb: entry.cb.map(wrap_option_callback),
    }
}

fn wrap_option_callback(cb: StSpankOptCb) -> OptionCallback {
    Arc::new(move |val: c_int, optarg: Option<&str>, remote: bool| {
        let optarg = optarg.and_then(|s| CString::new(s).ok());
        let optarg_ptr = optarg.as_ref().map_or(ptr::null(), |s| s.as_ptr());
        // SAFETY: `cb` comes from the plugin's option table; the stack drops
        // cached options before unloading images.
        unsafe { cb(val, optarg_ptr, c_int::from(remote)) }
    })
}

type PluginFactory = Box<dyn Fn() -> Result<Box<dyn SpankPlugin>> + Send + Sync>;

/// In-process loader that maps stack-file paths to plugin constructors.
#[derive(Default)]
pub struct FnLoader {
    factories: HashMap<PathBuf, PluginFactory>,
}

impl FnLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, path: impl Into<PathBuf>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn SpankPlugin>> + Send + Sync + 'static,
    {
        self.factories.insert(path.into(), Box::new(factory));
        self
    }
}

impl PluginLoader for FnLoader {
    fn peek(&self, path: &Path) -> bool {
        self.factories.contains_key(path)
    }

    fn load(&self, path: &Path) -> Result<Box<dyn SpankPlugin>> {
        let factory = self
            .factories
            .get(path)
            .ok_or_else(|| Error::load(path, "no such plugin"))?;
        factory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::FnPlugin;

    #[test]
    fn only_lifecycle_names_are_supported() {
        assert!(symbol_supported("slurm_spank_task_exit"));
        assert!(!symbol_supported("slurm_spank_fini"));
        assert!(!symbol_supported("spank_options"));
    }

    #[test]
    fn native_loader_rejects_non_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_a_plugin.so");
        std::fs::write(&path, b"plain text").unwrap();

        assert!(!NativeLoader.peek(&path));
        assert!(matches!(
            NativeLoader.load(&path),
            Err(Error::Load { .. })
        ));
        assert!(!NativeLoader.peek(&dir.path().join("missing.so")));
    }

    #[test]
    fn fn_loader_resolves_registered_paths() {
        let mut loader = FnLoader::new();
        loader.register("/plugins/demo.so", || {
            Ok(Box::new(FnPlugin::new("demo")) as Box<dyn SpankPlugin>)
        });
        assert!(loader.peek(Path::new("/plugins/demo.so")));
        assert!(!loader.peek(Path::new("/plugins/other.so")));
        assert_eq!(
            loader.load(Path::new("/plugins/demo.so")).unwrap().name(),
            "demo"
        );
        assert!(loader.load(Path::new("/plugins/other.so")).is_err());
    }
}
