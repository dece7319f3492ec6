use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::handle::{JobRef, SpankHandle};
use crate::job::{LauncherJobInfo, StepContext};
use crate::plugin::Phase;
use crate::stack::PluginStack;

/// Enforces phase order: step-scoped phases move strictly forward, task phases
/// run once per task between `user_init` and `exit`.
#[derive(Debug, Default)]
pub(crate) struct PhaseTracker {
    last_step_phase: Option<Phase>,
    task_phases: HashSet<(Phase, usize)>,
}

impl PhaseTracker {
    fn admit(&mut self, phase: Phase, task: Option<usize>) -> Result<()> {
        if !phase.is_task_scoped() {
            if let Some(last) = self.last_step_phase.filter(|&last| phase <= last) {
                return Err(Error::phase_order(
                    phase.name(),
                    format!("already past `{}`", last.name()),
                ));
            }
            self.last_step_phase = Some(phase);
            return Ok(());
        }

        let Some(task) = task else {
            return Err(Error::phase_order(phase.name(), "no task given"));
        };
        match self.last_step_phase {
            Some(last) if last >= Phase::UserInit && last < Phase::Exit => {}
            _ => {
                return Err(Error::phase_order(
                    phase.name(),
                    "task phases run between user_init and exit",
                ));
            }
        }
        if !self.task_phases.insert((phase, task)) {
            return Err(Error::phase_order(
                phase.name(),
                format!("already ran for task {task}"),
            ));
        }
        Ok(())
    }
}

impl PluginStack {
    /// Runs `phase` on every plugin that implements it, in stack order.
    ///
    /// A negative return from a required plugin stops the walk and fails the
    /// phase. Optional plugins that fail are logged and skipped over.
    pub fn invoke(&self, phase: Phase, job: Option<JobRef<'_>>, task: Option<usize>) -> Result<()> {
        if self.plugins.is_empty() {
            return Ok(());
        }
        let mut spank = SpankHandle::new(phase, job, task);
        for record in &self.plugins {
            if !record.plugin.implements(phase) {
                continue;
            }
            let rc = record.plugin.invoke(phase, &mut spank, &record.argv);
            tracing::debug!(
                plugin = %record.name(),
                phase = phase.name(),
                rc,
                "plugin hook returned"
            );
            if rc >= 0 {
                continue;
            }
            if record.required {
                tracing::error!(
                    plugin = %record.name(),
                    phase = phase.name(),
                    rc,
                    "required plugin failed"
                );
                return Err(Error::PluginFailed {
                    plugin: record.name().to_string(),
                    phase: phase.name(),
                    rc,
                });
            }
            tracing::warn!(
                plugin = %record.name(),
                phase = phase.name(),
                rc,
                "optional plugin failed, continuing"
            );
        }
        Ok(())
    }

    fn invoke_step(&mut self, phase: Phase, job: Option<JobRef<'_>>) -> Result<()> {
        self.tracker.admit(phase, None)?;
        self.invoke(phase, job, None)
    }

    fn invoke_task(&mut self, phase: Phase, step: &mut StepContext, task: usize) -> Result<()> {
        self.tracker.admit(phase, Some(task))?;
        self.invoke(phase, Some(JobRef::Remote(step)), Some(task))
    }

    /// Runs `init`, applies forwarded options on the execution side, then
    /// runs `init_post_opt`.
    pub fn init(&mut self, step: Option<&mut StepContext>) -> Result<()> {
        match step {
            Some(step) => {
                self.invoke_step(Phase::Init, Some(JobRef::Remote(&mut *step)))?;
                let applied = self.options.deserialize_and_apply(&step.options);
                tracing::debug!(applied, "applied forwarded plugin options");
                self.invoke_step(Phase::InitPostOpt, Some(JobRef::Remote(step)))
            }
            None => {
                self.invoke_step(Phase::Init, None)?;
                self.invoke_step(Phase::InitPostOpt, None)
            }
        }
    }

    pub fn local_user(&mut self, job: &LauncherJobInfo) -> Result<()> {
        self.invoke_step(Phase::LocalUserInit, Some(JobRef::Local(job)))
    }

    pub fn user(&mut self, step: &mut StepContext) -> Result<()> {
        self.invoke_step(Phase::UserInit, Some(JobRef::Remote(step)))
    }

    pub fn user_task(&mut self, step: &mut StepContext, task: usize) -> Result<()> {
        self.invoke_task(Phase::UserTaskInit, step, task)
    }

    pub fn task_post_fork(&mut self, step: &mut StepContext, task: usize) -> Result<()> {
        self.invoke_task(Phase::TaskPostFork, step, task)
    }

    pub fn task_exit(&mut self, step: &mut StepContext, task: usize) -> Result<()> {
        self.invoke_task(Phase::TaskExit, step, task)
    }

    /// Runs `exit`, then tears the stack down whatever the outcome.
    pub fn fini(&mut self, job: Option<JobRef<'_>>) -> Result<()> {
        let result = self.invoke_step(Phase::Exit, job);
        self.teardown();
        result
    }
}

#[cfg(test)]
mod tests;
