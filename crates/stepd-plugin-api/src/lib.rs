#![allow(clippy::missing_safety_doc)]

use core::ffi::{c_char, c_int};

mod handle;
mod item;
mod option;

pub use handle::*;
pub use item::*;
pub use option::*;

/// Lifecycle entry points, in phase order. A module must export at least one.
pub const SPANK_HOOK_SYMBOLS: [&str; 8] = [
    "slurm_spank_init",
    "slurm_spank_init_post_opt",
    "slurm_spank_local_user_init",
    "slurm_spank_user_init",
    "slurm_spank_task_init",
    "slurm_spank_task_post_fork",
    "slurm_spank_task_exit",
    "slurm_spank_exit",
];

pub const SPANK_OPTIONS_SYMBOL: &str = "spank_options";
pub const PLUGIN_NAME_SYMBOL: &str = "plugin_name";
pub const PLUGIN_TYPE_SYMBOL: &str = "plugin_type";
pub const SPANK_PLUGIN_TYPE: &str = "spank";

/// Tag carried by every valid handle.
pub const SPANK_MAGIC: u32 = 0x00a5_a500;

/// Longest accepted option name, in bytes.
pub const SPANK_OPTION_MAXLEN: usize = 75;

// Status codes returned through the host vtable.
pub const ESPANK_SUCCESS: c_int = 0;
pub const ESPANK_ERROR: c_int = 1;
pub const ESPANK_BAD_ARG: c_int = 2;
pub const ESPANK_NOT_TASK: c_int = 3;
pub const ESPANK_ENV_EXISTS: c_int = 4;
pub const ESPANK_ENV_NOEXIST: c_int = 5;
pub const ESPANK_NOSPACE: c_int = 6;
pub const ESPANK_NOT_REMOTE: c_int = 7;
pub const ESPANK_NOEXIST: c_int = 8;
pub const ESPANK_NOT_EXECD: c_int = 9;

/// Lifecycle hook. `argv` holds `ac` plugin arguments from the stack file,
/// followed by a null pointer.
pub type StSpankHook =
    unsafe extern "C" fn(spank: *mut StSpankHandle, ac: c_int, argv: *const *const c_char) -> c_int;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StLogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}
