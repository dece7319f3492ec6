//! Plugin stack for the step manager: loading, option handling, lifecycle
//! dispatch and the context handle plugins query.

mod dispatch;
mod env;
mod error;
mod ffi;
mod handle;
mod job;
mod load;
mod options;
mod plugin;
mod stack;
mod util;

pub use error::{Error, Result, SpankError, SpankResult};
pub use handle::{
    ContextKind, JobRef, SpankHandle, VERSION, VERSION_MAJOR, VERSION_MICRO, VERSION_MINOR,
};
pub use job::{LauncherJobInfo, StepContext, StepLayout, TaskRecord};
pub use load::{FnLoader, NativeLoader, PluginLoader, symbol_supported};
pub use options::{
    MAX_FORWARDED_KEY_LEN, OPT_TYPE_SPANK, OptionEntry, OptionIdAllocator, OptionRecord,
    OptionRegistry, SPANK_OPTVAL_BASE,
};
pub use plugin::{FnPlugin, HookFn, OptionCallback, Phase, SpankOption, SpankPlugin};
pub use stack::{ParseError, PluginRecord, PluginStack, StackEntry, parse_line, resolve_path};
pub use stepd_plugin_api::StSpankItem as SpankItem;
