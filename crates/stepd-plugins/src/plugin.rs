use std::fmt;
use std::sync::Arc;

use stepd_plugin_api::SPANK_HOOK_SYMBOLS;

use crate::handle::SpankHandle;

/// Lifecycle phases, in the order a step walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Init,
    InitPostOpt,
    LocalUserInit,
    UserInit,
    UserTaskInit,
    TaskPostFork,
    TaskExit,
    Exit,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Init,
        Phase::InitPostOpt,
        Phase::LocalUserInit,
        Phase::UserInit,
        Phase::UserTaskInit,
        Phase::TaskPostFork,
        Phase::TaskExit,
        Phase::Exit,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Exported symbol a native module provides for this phase.
    pub fn symbol(self) -> &'static str {
        SPANK_HOOK_SYMBOLS[self.index()]
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::InitPostOpt => "init_post_opt",
            Phase::LocalUserInit => "local_user_init",
            Phase::UserInit => "user_init",
            Phase::UserTaskInit => "task_init",
            Phase::TaskPostFork => "task_post_fork",
            Phase::TaskExit => "task_exit",
            Phase::Exit => "exit",
        }
    }

    pub fn is_task_scoped(self) -> bool {
        matches!(
            self,
            Phase::UserTaskInit | Phase::TaskPostFork | Phase::TaskExit
        )
    }

    /// Whether tasks may have been started by the time this phase runs.
    pub fn tasks_started(self) -> bool {
        matches!(self, Phase::TaskPostFork | Phase::TaskExit | Phase::Exit)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `(val, optarg, remote) -> rc`. A negative rc rejects the option.
pub type OptionCallback = Arc<dyn Fn(i32, Option<&str>, bool) -> i32 + Send + Sync>;

/// Command-line option contributed by a plugin.
#[derive(Clone)]
pub struct SpankOption {
    pub name: String,
    pub arginfo: Option<String>,
    pub usage: String,
    pub has_arg: bool,
    /// Plugin-local value handed back to `cb`.
    pub val: i32,
    pub cb: Option<OptionCallback>,
}

impl SpankOption {
    pub fn flag(name: impl Into<String>, usage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arginfo: None,
            usage: usage.into(),
            has_arg: false,
            val: 0,
            cb: None,
        }
    }

    pub fn with_arg(
        name: impl Into<String>,
        arginfo: impl Into<String>,
        usage: impl Into<String>,
    ) -> Self {
        Self {
            arginfo: Some(arginfo.into()),
            has_arg: true,
            ..Self::flag(name, usage)
        }
    }

    pub fn val(mut self, val: i32) -> Self {
        self.val = val;
        self
    }

    pub fn callback<F>(mut self, cb: F) -> Self
    where
        F: Fn(i32, Option<&str>, bool) -> i32 + Send + Sync + 'static,
    {
        self.cb = Some(Arc::new(cb));
        self
    }

    pub fn invoke(&self, optarg: Option<&str>, remote: bool) -> i32 {
        match &self.cb {
            Some(cb) => cb(self.val, optarg, remote),
            None => 0,
        }
    }
}

impl fmt::Debug for SpankOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpankOption")
            .field("name", &self.name)
            .field("arginfo", &self.arginfo)
            .field("has_arg", &self.has_arg)
            .field("val", &self.val)
            .field("cb", &self.cb.is_some())
            .finish()
    }
}

/// A loaded plugin: a name, a subset of lifecycle hooks and an option table.
pub trait SpankPlugin: Send {
    fn name(&self) -> &str;

    fn implements(&self, phase: Phase) -> bool;

    /// Runs the hook for `phase`. Only called when [`Self::implements`] is true.
    fn invoke(&self, phase: Phase, spank: &mut SpankHandle<'_>, argv: &[String]) -> i32;

    fn options(&self) -> Vec<SpankOption> {
        Vec::new()
    }
}

pub type HookFn = Box<dyn Fn(&mut SpankHandle<'_>, &[String]) -> i32 + Send>;

/// Plugin assembled from closures, for built-in plugins and tests.
pub struct FnPlugin {
    name: String,
    hooks: [Option<HookFn>; 8],
    options: Vec<SpankOption>,
}

impl FnPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: Default::default(),
            options: Vec::new(),
        }
    }

    pub fn hook<F>(mut self, phase: Phase, f: F) -> Self
    where
        F: Fn(&mut SpankHandle<'_>, &[String]) -> i32 + Send + 'static,
    {
        self.hooks[phase.index()] = Some(Box::new(f));
        self
    }

    pub fn option(mut self, option: SpankOption) -> Self {
        self.options.push(option);
        self
    }
}

impl SpankPlugin for FnPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn implements(&self, phase: Phase) -> bool {
        self.hooks[phase.index()].is_some()
    }

    fn invoke(&self, phase: Phase, spank: &mut SpankHandle<'_>, argv: &[String]) -> i32 {
        match &self.hooks[phase.index()] {
            Some(hook) => hook(spank, argv),
            None => 0,
        }
    }

    fn options(&self) -> Vec<SpankOption> {
        self.options.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_symbols_follow_declaration_order() {
        assert_eq!(Phase::Init.symbol(), "slurm_spank_init");
        assert_eq!(Phase::UserTaskInit.symbol(), "slurm_spank_task_init");
        assert_eq!(Phase::Exit.symbol(), "slurm_spank_exit");
        assert!(Phase::UserInit < Phase::UserTaskInit);
    }

    #[test]
    fn fn_plugin_reports_only_registered_hooks() {
        let plugin = FnPlugin::new("demo").hook(Phase::UserInit, |_, _| 0);
        assert!(plugin.implements(Phase::UserInit));
        assert!(!plugin.implements(Phase::Init));
    }

    #[test]
    fn option_without_callback_accepts() {
        let opt = SpankOption::flag("quiet", "be quiet");
        assert_eq!(opt.invoke(None, false), 0);
        let opt = opt.val(3).callback(|val, _, remote| if remote { val } else { -val });
        assert_eq!(opt.invoke(None, true), 3);
        assert_eq!(opt.invoke(None, false), -3);
    }
}
