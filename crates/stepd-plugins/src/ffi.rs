//! Host side of the native plugin ABI.
//!
//! Native hooks receive a `StSpankHandle` whose `host` pointer refers to the
//! [`SpankHandle`] of the current dispatch. Every vtable entry validates the
//! handle before touching it.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;

use stepd_plugin_api::*;

use crate::error::{SpankError, SpankResult};
use crate::handle::SpankHandle;
use crate::util::copy_nul_terminated;

pub(crate) const PLUGIN_LOG_TARGET: &str = "stepd_plugins::plugin";

static HOST_VTABLE: StSpankHostVTable = StSpankHostVTable {
    get_item_int: host_get_item_int,
    get_item_str: host_get_item_str,
    getenv: host_getenv,
    setenv: host_setenv,
    unsetenv: host_unsetenv,
    remote: host_remote,
    log: host_log,
};

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Runs `f`, returning `default` if it panics.
fn guard_with_default<T>(op: &'static str, default: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            tracing::error!(
                op,
                panic = %panic_message(payload),
                "panic across plugin ffi boundary"
            );
            default
        }
    }
}

/// Calls a native hook with a handle bound to `spank` and a NULL-terminated argv.
pub(crate) fn call_hook(hook: StSpankHook, spank: &mut SpankHandle<'_>, argv: &[String]) -> i32 {
    let args: Vec<CString> = argv
        .iter()
        .filter_map(|arg| CString::new(arg.as_str()).ok())
        .collect();
    let mut arg_ptrs: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    let ac = arg_ptrs.len() as c_int;
    arg_ptrs.push(ptr::null());

    let mut raw = StSpankHandle {
        magic: SPANK_MAGIC,
        reserved: 0,
        vtable: &HOST_VTABLE,
        host: (spank as *mut SpankHandle<'_>).cast::<c_void>(),
    };
    // SAFETY: `raw`, `args` and `arg_ptrs` outlive the call.
    unsafe { hook(&mut raw, ac, arg_ptrs.as_ptr()) }
}

/// Recovers the dispatch handle behind a raw handle, or `None` if it is invalid.
unsafe fn host_handle<'h>(spank: *mut StSpankHandle) -> Option<&'h mut SpankHandle<'h>> {
    if spank.is_null() {
        return None;
    }
    // SAFETY: Non-null handles come from `call_hook` or a caller-built struct.
    let raw = unsafe { &*spank };
    if raw.magic != SPANK_MAGIC || raw.host.is_null() {
        return None;
    }
    // SAFETY: A valid magic means `host` was set by `call_hook` for this call.
    Some(unsafe { &mut *raw.host.cast::<SpankHandle<'h>>() })
}

unsafe fn str_arg<'s>(ptr: *const c_char) -> Option<&'s str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

fn status(result: SpankResult<()>) -> c_int {
    match result {
        Ok(()) => ESPANK_SUCCESS,
        Err(err) => err.code(),
    }
}

fn item_int(spank: &SpankHandle<'_>, item: StSpankItem, arg: i64) -> SpankResult<i64> {
    let pid = || i32::try_from(arg).map_err(|_| SpankError::BadArg);
    let id = || u32::try_from(arg).map_err(|_| SpankError::BadArg);
    let value: i64 = match item {
        StSpankItem::JobUid => spank.uid()?.into(),
        StSpankItem::JobGid => spank.gid()?.into(),
        StSpankItem::JobId => spank.job_id()?.into(),
        StSpankItem::JobStepId => spank.step_id()?.into(),
        StSpankItem::JobNnodes => spank.nnodes()?.into(),
        StSpankItem::JobNodeId => spank.node_id()?.into(),
        StSpankItem::JobLocalTaskCount => spank.local_task_count()?.into(),
        StSpankItem::JobTotalTaskCount => spank.total_task_count()?.into(),
        StSpankItem::JobNcpus => spank.ncpus()?.into(),
        StSpankItem::JobArgv => spank.argv()?.len() as i64,
        StSpankItem::JobEnv => spank.env()?.len() as i64,
        StSpankItem::TaskId => spank.task_id()?.into(),
        StSpankItem::TaskGlobalId => spank.task_global_id()?.into(),
        StSpankItem::TaskExitStatus => spank.task_exit_status()?.into(),
        StSpankItem::TaskPid => spank.task_pid()?.into(),
        StSpankItem::JobPidToGlobalId => spank.pid_to_global_id(pid()?)?.into(),
        StSpankItem::JobPidToLocalId => spank.pid_to_local_id(pid()?)?.into(),
        StSpankItem::JobLocalToGlobalId => spank.local_to_global_id(id()?)?.into(),
        StSpankItem::JobGlobalToLocalId => spank.global_to_local_id(id()?)?.into(),
        StSpankItem::JobSupplementaryGids => {
            let gids = spank.supplementary_gids()?;
            if arg < 0 {
                gids.len() as i64
            } else {
                let gid = gids.get(arg as usize).ok_or(SpankError::NoExist)?;
                i64::from(*gid)
            }
        }
        StSpankItem::StepCpusPerTask => spank.cpus_per_task()?.into(),
        StSpankItem::VersionMajor | StSpankItem::VersionMinor | StSpankItem::VersionMicro => spank
            .version(item)?
            .parse()
            .map_err(|_| SpankError::Error)?,
        StSpankItem::Version => return Err(SpankError::BadArg),
    };
    Ok(value)
}

fn item_str<'s>(spank: &'s SpankHandle<'_>, item: StSpankItem, index: u32) -> SpankResult<&'s str> {
    let entry = |list: &'s [String]| {
        list.get(index as usize)
            .map(String::as_str)
            .ok_or(SpankError::NoExist)
    };
    match item {
        StSpankItem::Version
        | StSpankItem::VersionMajor
        | StSpankItem::VersionMinor
        | StSpankItem::VersionMicro => spank.version(item),
        StSpankItem::JobArgv => entry(spank.argv()?),
        StSpankItem::JobEnv => entry(spank.env()?),
        _ => Err(SpankError::BadArg),
    }
}

unsafe extern "C" fn host_get_item_int(
    spank: *mut StSpankHandle,
    item: c_int,
    arg: i64,
    out: *mut i64,
) -> c_int {
    guard_with_default("get_item_int", ESPANK_ERROR, || {
        let Some(handle) = (unsafe { host_handle(spank) }) else {
            return ESPANK_BAD_ARG;
        };
        let Some(item) = StSpankItem::from_raw(item) else {
            return ESPANK_BAD_ARG;
        };
        if out.is_null() {
            return ESPANK_BAD_ARG;
        }
        match item_int(handle, item, arg) {
            Ok(value) => {
                // SAFETY: Checked non-null above; the caller owns the slot.
                unsafe { *out = value };
                ESPANK_SUCCESS
            }
            Err(err) => err.code(),
        }
    })
}

unsafe extern "C" fn host_get_item_str(
    spank: *mut StSpankHandle,
    item: c_int,
    index: u32,
    buf: *mut c_char,
    len: usize,
) -> c_int {
    guard_with_default("get_item_str", ESPANK_ERROR, || {
        let Some(handle) = (unsafe { host_handle(spank) }) else {
            return ESPANK_BAD_ARG;
        };
        let Some(item) = StSpankItem::from_raw(item) else {
            return ESPANK_BAD_ARG;
        };
        if buf.is_null() {
            return ESPANK_BAD_ARG;
        }
        let value = match item_str(handle, item, index) {
            Ok(value) => value,
            Err(err) => return err.code(),
        };
        // SAFETY: The caller provides `len` writable bytes at `buf`.
        let out = unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), len) };
        if copy_nul_terminated(value, out) {
            ESPANK_SUCCESS
        } else {
            ESPANK_NOSPACE
        }
    })
}

unsafe extern "C" fn host_getenv(
    spank: *mut StSpankHandle,
    name: *const c_char,
    buf: *mut c_char,
    len: usize,
) -> c_int {
    guard_with_default("getenv", ESPANK_ERROR, || {
        let Some(handle) = (unsafe { host_handle(spank) }) else {
            return ESPANK_BAD_ARG;
        };
        let Some(name) = (unsafe { str_arg(name) }) else {
            return ESPANK_BAD_ARG;
        };
        if buf.is_null() {
            return ESPANK_BAD_ARG;
        }
        // SAFETY: The caller provides `len` writable bytes at `buf`.
        let out = unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), len) };
        status(handle.getenv_into(name, out).map(|_| ()))
    })
}

unsafe extern "C" fn host_setenv(
    spank: *mut StSpankHandle,
    name: *const c_char,
    value: *const c_char,
    overwrite: c_int,
) -> c_int {
    guard_with_default("setenv", ESPANK_ERROR, || {
        let Some(handle) = (unsafe { host_handle(spank) }) else {
            return ESPANK_BAD_ARG;
        };
        let (Some(name), Some(value)) = (unsafe { str_arg(name) }, unsafe { str_arg(value) })
        else {
            return ESPANK_BAD_ARG;
        };
        status(handle.setenv(name, value, overwrite != 0))
    })
}

unsafe extern "C" fn host_unsetenv(spank: *mut StSpankHandle, name: *const c_char) -> c_int {
    guard_with_default("unsetenv", ESPANK_ERROR, || {
        let Some(handle) = (unsafe { host_handle(spank) }) else {
            return ESPANK_BAD_ARG;
        };
        let Some(name) = (unsafe { str_arg(name) }) else {
            return ESPANK_BAD_ARG;
        };
        status(handle.unsetenv(name))
    })
}

unsafe extern "C" fn host_remote(spank: *mut StSpankHandle) -> c_int {
    match unsafe { host_handle(spank) } {
        Some(handle) => c_int::from(handle.is_remote()),
        None => -1,
    }
}

unsafe extern "C" fn host_log(spank: *mut StSpankHandle, level: StLogLevel, msg: *const c_char) {
    if msg.is_null() {
        return;
    }
    let text = unsafe { CStr::from_ptr(msg) }.to_string_lossy();
    let phase = unsafe { host_handle(spank) }.map_or("unknown", |h| h.phase().name());
    match level {
        StLogLevel::Error => tracing::error!(target: PLUGIN_LOG_TARGET, phase, "{text}"),
        StLogLevel::Warn => tracing::warn!(target: PLUGIN_LOG_TARGET, phase, "{text}"),
        StLogLevel::Info => tracing::info!(target: PLUGIN_LOG_TARGET, phase, "{text}"),
        StLogLevel::Debug => tracing::debug!(target: PLUGIN_LOG_TARGET, phase, "{text}"),
        StLogLevel::Trace => tracing::trace!(target: PLUGIN_LOG_TARGET, phase, "{text}"),
    }
}

#[cfg(test)]
mod tests;
