use core::ffi::{c_char, c_int, c_void};

use crate::StLogLevel;

/// Handle passed to every lifecycle hook.
///
/// Ownership: the host builds the handle on its stack for the duration of one
/// hook call. Plugins must not keep the pointer after the hook returns.
#[repr(C)]
#[derive(Debug)]
pub struct StSpankHandle {
    /// Must equal [`crate::SPANK_MAGIC`].
    pub magic: u32,
    pub reserved: u32,
    /// Outlives the handle: valid for as long as the plugin stays loaded.
    pub vtable: *const StSpankHostVTable,
    /// Host-private state behind the handle.
    pub host: *mut c_void,
}

/// Host services available to plugins through a handle.
///
/// Every entry returns one of the `ESPANK_*` codes unless noted otherwise.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StSpankHostVTable {
    /// Integer-valued items. `arg` is the lookup key for pid and id
    /// translation items. For `JobArgv`, `JobEnv` and `JobSupplementaryGids`
    /// the result is the list length, except that a non-negative `arg` on
    /// `JobSupplementaryGids` selects one gid.
    pub get_item_int: unsafe extern "C" fn(
        spank: *mut StSpankHandle,
        item: c_int,
        arg: i64,
        out: *mut i64,
    ) -> c_int,
    /// String-valued items: version strings, and `JobArgv` / `JobEnv` entries
    /// selected by `index`. Copies a NUL-terminated string into `buf`;
    /// `ESPANK_NOSPACE` when it does not fit, leaving `buf` untouched.
    pub get_item_str: unsafe extern "C" fn(
        spank: *mut StSpankHandle,
        item: c_int,
        index: u32,
        buf: *mut c_char,
        len: usize,
    ) -> c_int,
    pub getenv: unsafe extern "C" fn(
        spank: *mut StSpankHandle,
        name: *const c_char,
        buf: *mut c_char,
        len: usize,
    ) -> c_int,
    pub setenv: unsafe extern "C" fn(
        spank: *mut StSpankHandle,
        name: *const c_char,
        value: *const c_char,
        overwrite: c_int,
    ) -> c_int,
    pub unsetenv: unsafe extern "C" fn(spank: *mut StSpankHandle, name: *const c_char) -> c_int,
    /// Returns 1 on the execution side, 0 on the launcher side, -1 on a bad handle.
    pub remote: unsafe extern "C" fn(spank: *mut StSpankHandle) -> c_int,
    /// Accepts a null `spank` for messages logged outside a hook call.
    pub log: unsafe extern "C" fn(spank: *mut StSpankHandle, level: StLogLevel, msg: *const c_char),
}
