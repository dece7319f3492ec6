use std::ffi::{CStr, c_char};

/// Copies a possibly-null C string into an owned `String`.
pub unsafe fn cstr_to_string_lossy(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let s = unsafe { CStr::from_ptr(ptr) };
    Some(s.to_string_lossy().into_owned())
}

/// Writes `value` plus a terminating NUL into `buf`. Returns `false`, leaving
/// `buf` untouched, when it does not fit.
pub fn copy_nul_terminated(value: &str, buf: &mut [u8]) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() >= buf.len() {
        return false;
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    buf[bytes.len()] = 0;
    true
}
