use core::ffi::{CStr, c_char, c_int};
use core::marker::PhantomData;
use std::ffi::CString;

use stepd_plugin_api::*;

use crate::{SdkError, SdkResult};

const INITIAL_BUF_LEN: usize = 256;
const MAX_BUF_LEN: usize = 1 << 20;

/// Safe view of the handle passed to a hook. Valid for the duration of the hook call.
pub struct Spank<'a> {
    raw: *mut StSpankHandle,
    vtable: &'a StSpankHostVTable,
    _marker: PhantomData<&'a mut StSpankHandle>,
}

impl<'a> Spank<'a> {
    /// # Safety
    /// `raw` must be null or point to a handle that stays valid for `'a`.
    pub unsafe fn from_raw(raw: *mut StSpankHandle) -> SdkResult<Self> {
        if raw.is_null() {
            return Err(SdkError::InvalidHandle);
        }
        let handle = unsafe { &*raw };
        if handle.magic != SPANK_MAGIC || handle.vtable.is_null() {
            return Err(SdkError::InvalidHandle);
        }
        let vtable = unsafe { &*handle.vtable };
        crate::ffi_guard::remember_host(vtable);
        Ok(Self {
            raw,
            vtable,
            _marker: PhantomData,
        })
    }

    /// Whether the hook runs inside the step manager rather than the launcher.
    pub fn remote(&self) -> bool {
        unsafe { (self.vtable.remote)(self.raw) == 1 }
    }

    pub fn item_int(&self, item: StSpankItem, arg: i64) -> SdkResult<i64> {
        let mut out = 0i64;
        SdkError::check(unsafe {
            (self.vtable.get_item_int)(self.raw, item as c_int, arg, &mut out)
        })?;
        Ok(out)
    }

    fn item_u32(&self, item: StSpankItem) -> SdkResult<u32> {
        Ok(self.item_int(item, 0)? as u32)
    }

    pub fn uid(&self) -> SdkResult<u32> {
        self.item_u32(StSpankItem::JobUid)
    }

    pub fn gid(&self) -> SdkResult<u32> {
        self.item_u32(StSpankItem::JobGid)
    }

    pub fn job_id(&self) -> SdkResult<u32> {
        self.item_u32(StSpankItem::JobId)
    }

    pub fn step_id(&self) -> SdkResult<u32> {
        self.item_u32(StSpankItem::JobStepId)
    }

    pub fn node_id(&self) -> SdkResult<u32> {
        self.item_u32(StSpankItem::JobNodeId)
    }

    pub fn local_task_count(&self) -> SdkResult<u32> {
        self.item_u32(StSpankItem::JobLocalTaskCount)
    }

    pub fn total_task_count(&self) -> SdkResult<u32> {
        self.item_u32(StSpankItem::JobTotalTaskCount)
    }

    pub fn task_id(&self) -> SdkResult<u32> {
        self.item_u32(StSpankItem::TaskId)
    }

    pub fn task_global_id(&self) -> SdkResult<u32> {
        self.item_u32(StSpankItem::TaskGlobalId)
    }

    pub fn task_pid(&self) -> SdkResult<i32> {
        Ok(self.item_int(StSpankItem::TaskPid, 0)? as i32)
    }

    pub fn task_exit_status(&self) -> SdkResult<i32> {
        Ok(self.item_int(StSpankItem::TaskExitStatus, 0)? as i32)
    }

    pub fn supplementary_gids(&self) -> SdkResult<Vec<u32>> {
        let count = self.item_int(StSpankItem::JobSupplementaryGids, -1)?;
        (0..count)
            .map(|i| {
                self.item_int(StSpankItem::JobSupplementaryGids, i)
                    .map(|gid| gid as u32)
            })
            .collect()
    }

    pub fn item_str(&self, item: StSpankItem, index: u32) -> SdkResult<String> {
        read_growing(|buf, len| unsafe {
            (self.vtable.get_item_str)(self.raw, item as c_int, index, buf, len)
        })
    }

    pub fn argv(&self) -> SdkResult<Vec<String>> {
        self.list(StSpankItem::JobArgv)
    }

    pub fn env(&self) -> SdkResult<Vec<String>> {
        self.list(StSpankItem::JobEnv)
    }

    fn list(&self, item: StSpankItem) -> SdkResult<Vec<String>> {
        let count = self.item_int(item, 0)?;
        (0..count as u32).map(|i| self.item_str(item, i)).collect()
    }

    pub fn version(&self) -> SdkResult<String> {
        self.item_str(StSpankItem::Version, 0)
    }

    pub fn getenv(&self, name: &str) -> SdkResult<String> {
        let name = CString::new(name).map_err(|_| SdkError::InteriorNul)?;
        read_growing(|buf, len| unsafe { (self.vtable.getenv)(self.raw, name.as_ptr(), buf, len) })
    }

    pub fn setenv(&self, name: &str, value: &str, overwrite: bool) -> SdkResult<()> {
        let name = CString::new(name).map_err(|_| SdkError::InteriorNul)?;
        let value = CString::new(value).map_err(|_| SdkError::InteriorNul)?;
        SdkError::check(unsafe {
            (self.vtable.setenv)(
                self.raw,
                name.as_ptr(),
                value.as_ptr(),
                c_int::from(overwrite),
            )
        })
    }

    pub fn unsetenv(&self, name: &str) -> SdkResult<()> {
        let name = CString::new(name).map_err(|_| SdkError::InteriorNul)?;
        SdkError::check(unsafe { (self.vtable.unsetenv)(self.raw, name.as_ptr()) })
    }

    /// Log through the host. Messages with interior NULs are cut at the first NUL.
    pub fn log(&self, level: StLogLevel, msg: &str) {
        let msg = msg.split('\0').next().unwrap_or_default();
        if let Ok(msg) = CString::new(msg) {
            unsafe { (self.vtable.log)(self.raw, level, msg.as_ptr()) };
        }
    }

    pub fn info(&self, msg: &str) {
        self.log(StLogLevel::Info, msg);
    }

    pub fn error(&self, msg: &str) {
        self.log(StLogLevel::Error, msg);
    }
}

/// Calls `read` with a growing buffer until the value fits.
fn read_growing(mut read: impl FnMut(*mut c_char, usize) -> c_int) -> SdkResult<String> {
    let mut len = INITIAL_BUF_LEN;
    loop {
        let mut buf = vec![0 as c_char; len];
        match read(buf.as_mut_ptr(), len) {
            ESPANK_SUCCESS => {
                let value = unsafe { CStr::from_ptr(buf.as_ptr()) };
                return Ok(value.to_string_lossy().into_owned());
            }
            ESPANK_NOSPACE if len < MAX_BUF_LEN => len *= 4,
            code => return Err(SdkError::Status(code)),
        }
    }
}

/// Collects a hook's `argv` into owned strings.
///
/// # Safety
/// `argv` must hold `ac` valid C strings.
pub unsafe fn collect_args(ac: c_int, argv: *const *const c_char) -> Vec<String> {
    if argv.is_null() || ac <= 0 {
        return Vec::new();
    }
    (0..ac as usize)
        .filter_map(|i| {
            let arg = unsafe { *argv.add(i) };
            (!arg.is_null()).then(|| unsafe { CStr::from_ptr(arg) }.to_string_lossy().into_owned())
        })
        .collect()
}
