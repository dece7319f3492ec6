use std::sync::Mutex;

use stepd_plugin_sdk::{Spank, spank_plugin};

static LEVEL: Mutex<Option<String>> = Mutex::new(None);

fn init(spank: &Spank<'_>, _argv: &[String]) -> i32 {
    spank.info("demo plugin init");
    0
}

fn user_init(spank: &Spank<'_>, argv: &[String]) -> i32 {
    let arg = argv.first().map(String::as_str).unwrap_or("none");
    if spank.setenv("DEMO_PLUGIN_ARG", arg, true).is_err() {
        return -1;
    }
    let level = LEVEL.lock().ok().and_then(|level| level.clone());
    match level {
        Some(level) if spank.setenv("DEMO_LEVEL", &level, true).is_err() => -1,
        _ => 0,
    }
}

fn task_init(spank: &Spank<'_>, _argv: &[String]) -> i32 {
    let Ok(gtid) = spank.task_global_id() else {
        return -1;
    };
    match spank.setenv("DEMO_TASK_GTID", &gtid.to_string(), true) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

fn on_level(_val: i32, optarg: Option<&str>, remote: bool) -> i32 {
    match optarg {
        Some("bad") | None => -1,
        Some(level) => {
            if remote {
                if let Ok(mut slot) = LEVEL.lock() {
                    *slot = Some(level.to_string());
                }
            }
            0
        }
    }
}

fn on_flag(_val: i32, _optarg: Option<&str>, _remote: bool) -> i32 {
    0
}

spank_plugin! {
    name: "demo",
    hooks: {
        slurm_spank_init => init,
        slurm_spank_user_init => user_init,
        slurm_spank_task_init => task_init,
    },
    options: [
        { name: "demo-level", arginfo: "LEVEL", usage: "demo plugin level", val: 7, cb: on_level },
        { name: "demo-flag", usage: "demo plugin flag", val: 8, cb: on_flag },
    ],
}
