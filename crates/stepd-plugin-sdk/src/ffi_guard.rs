//! Panic guards for exported `extern "C"` entry points.
//!
//! A panic must not unwind into the host, so every generated hook and option
//! callback runs its body through one of these helpers.

use std::ffi::CString;
use std::sync::atomic::{AtomicPtr, Ordering};

use stepd_plugin_api::{StLogLevel, StSpankHostVTable};

use crate::Spank;

/// Host services seen on the last valid handle. Option callbacks get no
/// handle, so their panics are reported through this.
static HOST_VTABLE: AtomicPtr<StSpankHostVTable> = AtomicPtr::new(core::ptr::null_mut());

pub(crate) fn remember_host(vtable: &StSpankHostVTable) {
    HOST_VTABLE.store(
        (vtable as *const StSpankHostVTable).cast_mut(),
        Ordering::Release,
    );
}

/// Logs without a handle. Falls back to stderr before any hook has run.
pub fn host_log(level: StLogLevel, msg: &str) {
    let vtable = HOST_VTABLE.load(Ordering::Acquire);
    let msg = msg.split('\0').next().unwrap_or_default();
    match (vtable.is_null(), CString::new(msg)) {
        (false, Ok(text)) => {
            // SAFETY: The host vtable stays valid while the plugin is loaded.
            unsafe { ((*vtable).log)(core::ptr::null_mut(), level, text.as_ptr()) };
        }
        _ => eprintln!("{msg}"),
    }
}

/// Extract a human-readable message from a panic payload.
pub fn panic_message(payload: Box<dyn core::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Runs `f`, returning `default` if it panics. The panic goes to [`host_log`].
pub fn guard_with_default<T>(op: &'static str, default: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(val) => val,
        Err(payload) => {
            let msg = panic_message(payload);
            host_log(StLogLevel::Error, &format!("panic in `{op}`: {msg}"));
            default
        }
    }
}

/// Runs a hook body. On panic the message goes to the host log and `-1` is returned.
pub fn guard_hook(spank: &Spank<'_>, op: &'static str, f: impl FnOnce() -> i32) -> i32 {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(rc) => rc,
        Err(payload) => {
            let msg = panic_message(payload);
            spank.log(StLogLevel::Error, &format!("panic in `{op}`: {msg}"));
            -1
        }
    }
}
