use core::ffi::{c_char, c_int};

use stepd_plugin_api::StSpankHandle;

use crate::{Spank, collect_args, ffi_guard};

/// `plugin_name`-style symbol contents: `s` followed by a NUL.
#[doc(hidden)]
pub const fn __cstr_array<const N: usize>(s: &str) -> [u8; N] {
    let bytes = s.as_bytes();
    let mut out = [0u8; N];
    let mut i = 0;
    while i < bytes.len() && i + 1 < N {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

/// Body of a generated lifecycle symbol.
///
/// # Safety
/// Arguments are those the host passed to the hook.
#[doc(hidden)]
pub unsafe fn __run_hook(
    op: &'static str,
    raw: *mut StSpankHandle,
    ac: c_int,
    argv: *const *const c_char,
    hook: fn(&Spank<'_>, &[String]) -> i32,
) -> c_int {
    let Ok(spank) = (unsafe { Spank::from_raw(raw) }) else {
        return -1;
    };
    let args = unsafe { collect_args(ac, argv) };
    ffi_guard::guard_hook(&spank, op, || hook(&spank, &args))
}

/// Body of a generated option callback.
///
/// # Safety
/// `optarg` must be null or a valid C string.
#[doc(hidden)]
pub unsafe fn __run_option(
    val: c_int,
    optarg: *const c_char,
    remote: c_int,
    cb: fn(i32, Option<&str>, bool) -> i32,
) -> c_int {
    let optarg = if optarg.is_null() {
        None
    } else {
        Some(unsafe { core::ffi::CStr::from_ptr(optarg) }.to_string_lossy().into_owned())
    };
    ffi_guard::guard_with_default("option callback", -1, || {
        cb(val, optarg.as_deref(), remote != 0)
    })
}

#[doc(hidden)]
#[macro_export]
macro_rules! __spank_opt_cstr {
    () => {
        core::ptr::null()
    };
    ($s:literal) => {
        concat!($s, "\0").as_ptr().cast::<core::ffi::c_char>()
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __spank_one {
    ($($t:tt)*) => {
        1
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __spank_unit {
    ($($t:tt)*) => {
        ()
    };
}

/// Exports a SPANK plugin.
///
/// ```ignore
/// fn user_init(spank: &Spank<'_>, argv: &[String]) -> i32 { 0 }
/// fn on_level(val: i32, optarg: Option<&str>, remote: bool) -> i32 { 0 }
///
/// spank_plugin! {
///     name: "demo",
///     hooks: { slurm_spank_user_init => user_init },
///     options: [
///         { name: "demo-level", arginfo: "LEVEL", usage: "set the level", val: 1, cb: on_level },
///     ],
/// }
/// ```
///
/// An option with `arginfo` takes an argument.
#[macro_export]
macro_rules! spank_plugin {
    (
        name: $name:literal,
        hooks: { $($symbol:ident => $hook:path),+ $(,)? }
        $(, options: [
            $({
                name: $opt_name:literal,
                $(arginfo: $arginfo:literal,)?
                usage: $usage:literal,
                val: $val:expr,
                cb: $cb:path $(,)?
            }),* $(,)?
        ])?
        $(,)?
    ) => {
        #[unsafe(no_mangle)]
        #[allow(non_upper_case_globals)]
        pub static plugin_name: [u8; $name.len() + 1] = $crate::__cstr_array($name);

        #[unsafe(no_mangle)]
        #[allow(non_upper_case_globals)]
        pub static plugin_type: [u8; $crate::SPANK_PLUGIN_TYPE.len() + 1] =
            $crate::__cstr_array($crate::SPANK_PLUGIN_TYPE);

        $(
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn $symbol(
                spank: *mut $crate::StSpankHandle,
                ac: core::ffi::c_int,
                argv: *const *const core::ffi::c_char,
            ) -> core::ffi::c_int {
                unsafe { $crate::__run_hook(stringify!($symbol), spank, ac, argv, $hook) }
            }
        )+

        $(
            #[unsafe(no_mangle)]
            #[allow(non_upper_case_globals)]
            pub static spank_options: [
                $crate::StSpankOption;
                <[()]>::len(&[$($crate::__spank_unit!($opt_name)),*]) + 1
            ] = [
                $(
                    $crate::StSpankOption {
                        name: $crate::__spank_opt_cstr!($opt_name),
                        arginfo: $crate::__spank_opt_cstr!($($arginfo)?),
                        usage: $crate::__spank_opt_cstr!($usage),
                        has_arg: 0 $(+ $crate::__spank_one!($arginfo))?,
                        val: $val,
                        cb: {
                            unsafe extern "C" fn shim(
                                val: core::ffi::c_int,
                                optarg: *const core::ffi::c_char,
                                remote: core::ffi::c_int,
                            ) -> core::ffi::c_int {
                                unsafe { $crate::__run_option(val, optarg, remote, $cb) }
                            }
                            Some(shim)
                        },
                    },
                )*
                $crate::StSpankOption::END,
            ];
        )?
    };
}
