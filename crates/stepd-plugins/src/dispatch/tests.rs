use std::sync::Arc;

use parking_lot::Mutex;
use stepd_proto::JobOptions;

use crate::job::{StepContext, TaskRecord};
use crate::options::OPT_TYPE_SPANK;
use crate::plugin::{FnPlugin, Phase, SpankOption, SpankPlugin};
use crate::stack::PluginStack;
use crate::{Error, JobRef};

type Log = Arc<Mutex<Vec<String>>>;

fn logging_plugin(name: &str, log: &Log, rc: i32) -> FnPlugin {
    let mut plugin = FnPlugin::new(name);
    for phase in Phase::ALL {
        let log = Arc::clone(log);
        let label = format!("{name}:{}", phase.name());
        plugin = plugin.hook(phase, move |_, _| {
            log.lock().push(label.clone());
            rc
        });
    }
    plugin
}

fn stack_of(entries: Vec<(FnPlugin, bool)>) -> PluginStack {
    let mut stack = PluginStack::default();
    for (plugin, required) in entries {
        let path = format!("/plugins/{}.so", plugin.name());
        stack.push(path, required, Vec::new(), Box::new(plugin));
    }
    stack
}

fn step_with_tasks(n: u32) -> StepContext {
    StepContext {
        tasks: (0..n).map(|i| TaskRecord::new(i, i)).collect(),
        nprocs: n,
        ..StepContext::default()
    }
}

#[test]
fn plugins_run_in_stack_order() {
    let log: Log = Arc::default();
    let stack = stack_of(vec![
        (logging_plugin("a", &log, 0), false),
        (logging_plugin("b", &log, 0), true),
        (logging_plugin("c", &log, 0), false),
    ]);
    let mut step = step_with_tasks(1);
    stack
        .invoke(Phase::UserInit, Some(JobRef::Remote(&mut step)), None)
        .unwrap();
    assert_eq!(
        *log.lock(),
        vec!["a:user_init", "b:user_init", "c:user_init"]
    );
}

#[test]
fn required_failure_stops_the_walk() {
    let log: Log = Arc::default();
    let stack = stack_of(vec![
        (logging_plugin("a", &log, 0), false),
        (logging_plugin("b", &log, -1), true),
        (logging_plugin("c", &log, 0), false),
    ]);
    let err = stack.invoke(Phase::Init, None, None).unwrap_err();
    assert!(matches!(
        err,
        Error::PluginFailed { ref plugin, phase: "init", rc: -1 } if plugin == "b"
    ));
    assert_eq!(*log.lock(), vec!["a:init", "b:init"]);
}

#[test]
fn optional_failure_is_ignored() {
    let log: Log = Arc::default();
    let stack = stack_of(vec![
        (logging_plugin("a", &log, -5), false),
        (logging_plugin("b", &log, 0), true),
    ]);
    stack.invoke(Phase::Exit, None, None).unwrap();
    assert_eq!(*log.lock(), vec!["a:exit", "b:exit"]);
}

#[test]
fn unimplemented_hooks_are_skipped() {
    let log: Log = Arc::default();
    let only_exit = {
        let log = Arc::clone(&log);
        FnPlugin::new("exit-only").hook(Phase::Exit, move |_, _| {
            log.lock().push("exit-only:exit".to_string());
            0
        })
    };
    let stack = stack_of(vec![(only_exit, true), (logging_plugin("b", &log, 0), false)]);
    stack.invoke(Phase::Init, None, None).unwrap();
    assert_eq!(*log.lock(), vec!["b:init"]);
}

#[test]
fn empty_stack_always_succeeds() {
    let stack = PluginStack::default();
    assert!(stack.invoke(Phase::TaskExit, None, Some(3)).is_ok());
}

#[test]
fn lifecycle_runs_remote_phases_in_order() {
    let log: Log = Arc::default();
    let mut stack = stack_of(vec![(logging_plugin("a", &log, 0), true)]);
    let mut step = step_with_tasks(2);

    stack.init(Some(&mut step)).unwrap();
    stack.user(&mut step).unwrap();
    for task in 0..2 {
        stack.user_task(&mut step, task).unwrap();
        stack.task_post_fork(&mut step, task).unwrap();
    }
    for task in 0..2 {
        stack.task_exit(&mut step, task).unwrap();
    }
    stack.fini(Some(JobRef::Remote(&mut step))).unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "a:init",
            "a:init_post_opt",
            "a:user_init",
            "a:task_init",
            "a:task_post_fork",
            "a:task_init",
            "a:task_post_fork",
            "a:task_exit",
            "a:task_exit",
            "a:exit",
        ]
    );
    assert!(stack.is_empty());
    assert!(stack.options().is_empty());
}

#[test]
fn phases_cannot_repeat_or_go_backwards() {
    let mut stack = PluginStack::default();
    let mut step = step_with_tasks(1);

    assert!(matches!(
        stack.user_task(&mut step, 0),
        Err(Error::PhaseOrder { phase: "task_init", .. })
    ));
    stack.init(Some(&mut step)).unwrap();
    stack.user(&mut step).unwrap();
    assert!(matches!(
        stack.user(&mut step),
        Err(Error::PhaseOrder { phase: "user_init", .. })
    ));
    stack.user_task(&mut step, 0).unwrap();
    assert!(stack.user_task(&mut step, 0).is_err());
    stack.fini(None).unwrap();
    assert!(stack.task_exit(&mut step, 0).is_err());
}

#[test]
fn init_applies_forwarded_options_between_sub_phases() {
    let log: Log = Arc::default();
    let plugin = {
        let init_log = Arc::clone(&log);
        let post_log = Arc::clone(&log);
        let opt_log = Arc::clone(&log);
        FnPlugin::new("demo")
            .hook(Phase::Init, move |_, _| {
                init_log.lock().push("init".to_string());
                0
            })
            .hook(Phase::InitPostOpt, move |_, _| {
                post_log.lock().push("init_post_opt".to_string());
                0
            })
            .option(
                SpankOption::with_arg("level", "N", "level").callback(move |_, arg, remote| {
                    opt_log
                        .lock()
                        .push(format!("option {} remote={remote}", arg.unwrap_or("")));
                    0
                }),
            )
    };
    let mut stack = stack_of(vec![(plugin, true)]);

    let mut options = JobOptions::new();
    options.append(OPT_TYPE_SPANK, "level:demo", Some("4".to_string()));
    let mut step = StepContext {
        options,
        ..step_with_tasks(1)
    };
    stack.init(Some(&mut step)).unwrap();
    assert_eq!(
        *log.lock(),
        vec!["init", "option 4 remote=true", "init_post_opt"]
    );
}

#[test]
fn hooks_see_task_context_and_edit_env() {
    let plugin = FnPlugin::new("env").hook(Phase::UserTaskInit, |spank, argv| {
        let gtid = match spank.task_global_id() {
            Ok(id) => id,
            Err(_) => return -1,
        };
        let value = format!("{}-{gtid}", argv.join(","));
        match spank.setenv("DEMO_TASK", &value, true) {
            Ok(()) => 0,
            Err(_) => -1,
        }
    });
    let mut stack = PluginStack::default();
    stack.push(
        "/plugins/env.so",
        true,
        vec!["x".to_string(), "y".to_string()],
        Box::new(plugin),
    );

    let mut step = step_with_tasks(2);
    step.tasks[1].gtid = 9;
    stack.init(Some(&mut step)).unwrap();
    stack.user(&mut step).unwrap();
    stack.user_task(&mut step, 1).unwrap();
    assert_eq!(step.getenv("DEMO_TASK"), Some("x,y-9"));
}
