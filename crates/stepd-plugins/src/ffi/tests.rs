use super::*;
use crate::handle::JobRef;
use crate::job::{StepContext, TaskRecord};
use crate::plugin::Phase;

fn step() -> StepContext {
    StepContext {
        job_id: 7,
        uid: 1000,
        gids: vec![100, 27],
        tasks: vec![TaskRecord::new(0, 3)],
        env: vec!["HOME=/home/user".to_string()],
        argv: vec!["prog".to_string(), "--flag".to_string()],
        nprocs: 4,
        ..StepContext::default()
    }
}

fn raw_for(spank: &mut SpankHandle<'_>) -> StSpankHandle {
    StSpankHandle {
        magic: SPANK_MAGIC,
        reserved: 0,
        vtable: &HOST_VTABLE,
        host: (spank as *mut SpankHandle<'_>).cast(),
    }
}

#[test]
fn bad_magic_and_null_handles_are_rejected() {
    let mut step = step();
    let mut spank = SpankHandle::new(Phase::UserInit, Some(JobRef::Remote(&mut step)), None);
    let mut raw = raw_for(&mut spank);
    raw.magic = 0xdead_beef;

    let mut out = 0i64;
    unsafe {
        assert_eq!(
            host_get_item_int(&mut raw, StSpankItem::JobId as c_int, 0, &mut out),
            ESPANK_BAD_ARG
        );
        assert_eq!(
            host_get_item_int(ptr::null_mut(), StSpankItem::JobId as c_int, 0, &mut out),
            ESPANK_BAD_ARG
        );
        assert_eq!(host_remote(&mut raw), -1);
    }
}

#[test]
fn integer_items_and_list_lengths() {
    let mut step = step();
    let mut spank = SpankHandle::new(
        Phase::UserTaskInit,
        Some(JobRef::Remote(&mut step)),
        Some(0),
    );
    let mut raw = raw_for(&mut spank);
    let mut out = 0i64;
    unsafe {
        let get = |raw: &mut StSpankHandle, item: StSpankItem, arg: i64, out: &mut i64| {
            host_get_item_int(raw, item as c_int, arg, out)
        };
        assert_eq!(get(&mut raw, StSpankItem::JobId, 0, &mut out), ESPANK_SUCCESS);
        assert_eq!(out, 7);
        assert_eq!(get(&mut raw, StSpankItem::JobArgv, 0, &mut out), ESPANK_SUCCESS);
        assert_eq!(out, 2);
        assert_eq!(
            get(&mut raw, StSpankItem::JobSupplementaryGids, -1, &mut out),
            ESPANK_SUCCESS
        );
        assert_eq!(out, 2);
        assert_eq!(
            get(&mut raw, StSpankItem::JobSupplementaryGids, 1, &mut out),
            ESPANK_SUCCESS
        );
        assert_eq!(out, 27);
        assert_eq!(get(&mut raw, StSpankItem::TaskGlobalId, 0, &mut out), ESPANK_SUCCESS);
        assert_eq!(out, 3);
        assert_eq!(
            get(&mut raw, StSpankItem::TaskExitStatus, 0, &mut out),
            ESPANK_NOT_EXECD
        );
        assert_eq!(host_get_item_int(&mut raw, 99, 0, &mut out), ESPANK_BAD_ARG);
        assert_eq!(host_remote(&mut raw), 1);
    }
}

#[test]
fn string_items_report_nospace_without_partial_copy() {
    let mut step = step();
    let mut spank = SpankHandle::new(Phase::UserInit, Some(JobRef::Remote(&mut step)), None);
    let mut raw = raw_for(&mut spank);

    let mut small = [b'x' as c_char; 4];
    let mut big = [0 as c_char; 32];
    unsafe {
        assert_eq!(
            host_get_item_str(
                &mut raw,
                StSpankItem::JobArgv as c_int,
                1,
                small.as_mut_ptr(),
                small.len(),
            ),
            ESPANK_NOSPACE
        );
        assert!(small.iter().all(|&c| c == b'x' as c_char));

        assert_eq!(
            host_get_item_str(
                &mut raw,
                StSpankItem::JobArgv as c_int,
                1,
                big.as_mut_ptr(),
                big.len(),
            ),
            ESPANK_SUCCESS
        );
        assert_eq!(CStr::from_ptr(big.as_ptr()).to_str(), Ok("--flag"));

        assert_eq!(
            host_get_item_str(
                &mut raw,
                StSpankItem::JobArgv as c_int,
                5,
                big.as_mut_ptr(),
                big.len(),
            ),
            ESPANK_NOEXIST
        );

        assert_eq!(
            host_getenv(&mut raw, c"HOME".as_ptr(), small.as_mut_ptr(), small.len()),
            ESPANK_NOSPACE
        );
        assert!(small.iter().all(|&c| c == b'x' as c_char));
        assert_eq!(
            host_getenv(&mut raw, c"MISSING".as_ptr(), big.as_mut_ptr(), big.len()),
            ESPANK_ENV_NOEXIST
        );
    }
}

#[test]
fn launcher_handles_cannot_touch_the_environment() {
    let mut spank = SpankHandle::new(Phase::Init, None, None);
    let mut raw = raw_for(&mut spank);
    let mut buf = [0 as c_char; 16];
    unsafe {
        assert_eq!(
            host_getenv(&mut raw, c"HOME".as_ptr(), buf.as_mut_ptr(), buf.len()),
            ESPANK_NOT_REMOTE
        );
        assert_eq!(
            host_setenv(&mut raw, c"HOME".as_ptr(), c"/tmp".as_ptr(), 1),
            ESPANK_NOT_REMOTE
        );
        assert_eq!(host_unsetenv(&mut raw, c"HOME".as_ptr()), ESPANK_NOT_REMOTE);
        assert_eq!(host_remote(&mut raw), 0);
    }
}

unsafe extern "C" fn exporting_hook(
    spank: *mut StSpankHandle,
    ac: c_int,
    argv: *const *const c_char,
) -> c_int {
    let vtable = unsafe { &*(*spank).vtable };
    let first = unsafe { CStr::from_ptr(*argv) };
    assert_eq!(ac, 2);
    assert!(unsafe { *argv.add(2) }.is_null());
    unsafe { (vtable.setenv)(spank, c"FROM_HOOK".as_ptr(), first.as_ptr(), 0) }
}

#[test]
fn hooks_edit_the_step_through_the_vtable() {
    let mut step = step();
    {
        let mut spank = SpankHandle::new(Phase::UserInit, Some(JobRef::Remote(&mut step)), None);
        let argv = vec!["value-1".to_string(), "extra".to_string()];
        assert_eq!(call_hook(exporting_hook, &mut spank, &argv), ESPANK_SUCCESS);
        assert_eq!(
            call_hook(exporting_hook, &mut spank, &argv),
            ESPANK_ENV_EXISTS
        );
    }
    assert_eq!(step.getenv("FROM_HOOK"), Some("value-1"));
}
