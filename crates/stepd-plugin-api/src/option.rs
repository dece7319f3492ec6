use core::ffi::{c_char, c_int};

/// Option callback. `remote` is 0 on the launcher side and 1 when the option
/// was forwarded to the execution side.
pub type StSpankOptCb =
    unsafe extern "C" fn(val: c_int, optarg: *const c_char, remote: c_int) -> c_int;

/// One entry of a plugin's `spank_options` table. The table ends with an entry
/// whose `name` is null.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StSpankOption {
    pub name: *const c_char,
    /// Placeholder shown in help output, e.g. `LEVEL`. Null when the option takes no argument.
    pub arginfo: *const c_char,
    pub usage: *const c_char,
    pub has_arg: c_int,
    /// Plugin-local value handed back to `cb`.
    pub val: c_int,
    pub cb: Option<StSpankOptCb>,
}

// Tables are immutable statics inside the plugin image.
unsafe impl Sync for StSpankOption {}
unsafe impl Send for StSpankOption {}

impl StSpankOption {
    pub const END: StSpankOption = StSpankOption {
        name: core::ptr::null(),
        arginfo: core::ptr::null(),
        usage: core::ptr::null(),
        has_arg: 0,
        val: 0,
        cb: None,
    };

    pub fn is_end(&self) -> bool {
        self.name.is_null()
    }
}
