use stepd_plugin_api::StSpankItem;

use crate::env;
use crate::error::{SpankError, SpankResult};
use crate::job::{LauncherJobInfo, StepContext, TaskRecord};
use crate::plugin::Phase;
use crate::util::copy_nul_terminated;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");
pub const VERSION_MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");
pub const VERSION_MICRO: &str = env!("CARGO_PKG_VERSION_PATCH");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Launcher side, before the job runs.
    Local,
    /// Execution side, inside the step manager.
    Remote,
}

pub enum JobRef<'a> {
    Local(&'a LauncherJobInfo),
    Remote(&'a mut StepContext),
}

/// Context handed to a plugin hook.
///
/// Valid only for the duration of one hook call. The job is absent when the
/// launcher runs phases before a job exists.
pub struct SpankHandle<'a> {
    kind: ContextKind,
    phase: Phase,
    job: Option<JobRef<'a>>,
    task: Option<usize>,
}

/// Items that can be answered on the launcher side.
fn valid_in_local_context(item: StSpankItem) -> bool {
    matches!(
        item,
        StSpankItem::JobUid
            | StSpankItem::JobGid
            | StSpankItem::JobId
            | StSpankItem::JobStepId
            | StSpankItem::JobArgv
            | StSpankItem::JobEnv
            | StSpankItem::JobTotalTaskCount
            | StSpankItem::JobNnodes
    )
}

fn is_version_item(item: StSpankItem) -> bool {
    matches!(
        item,
        StSpankItem::Version
            | StSpankItem::VersionMajor
            | StSpankItem::VersionMinor
            | StSpankItem::VersionMicro
    )
}

impl<'a> SpankHandle<'a> {
    pub fn new(phase: Phase, job: Option<JobRef<'a>>, task: Option<usize>) -> Self {
        let (kind, task) = match &job {
            Some(JobRef::Remote(step)) => (
                ContextKind::Remote,
                task.filter(|&index| index < step.tasks.len()),
            ),
            _ => (ContextKind::Local, None),
        };
        Self {
            kind,
            phase,
            job,
            task,
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_remote(&self) -> bool {
        self.kind == ContextKind::Remote
    }

    fn check(&self, item: StSpankItem) -> SpankResult<()> {
        if is_version_item(item) {
            return Ok(());
        }
        if self.kind == ContextKind::Local && !valid_in_local_context(item) {
            return Err(SpankError::NotRemote);
        }
        if self.job.is_none() {
            return Err(SpankError::BadArg);
        }
        Ok(())
    }

    /// Remote-only accessors check the context kind before the job.
    fn require_remote(&self) -> SpankResult<()> {
        if self.kind != ContextKind::Remote {
            return Err(SpankError::NotRemote);
        }
        Ok(())
    }

    fn step(&self) -> SpankResult<&StepContext> {
        self.require_remote()?;
        match &self.job {
            Some(JobRef::Remote(step)) => Ok(&**step),
            Some(JobRef::Local(_)) => Err(SpankError::NotRemote),
            None => Err(SpankError::BadArg),
        }
    }

    fn step_mut(&mut self) -> SpankResult<&mut StepContext> {
        self.require_remote()?;
        match &mut self.job {
            Some(JobRef::Remote(step)) => Ok(&mut **step),
            Some(JobRef::Local(_)) => Err(SpankError::NotRemote),
            None => Err(SpankError::BadArg),
        }
    }

    fn current_task(&self) -> SpankResult<&TaskRecord> {
        let step = self.step()?;
        self.task
            .and_then(|index| step.tasks.get(index))
            .ok_or(SpankError::NotTask)
    }

    fn pick<T>(
        &self,
        item: StSpankItem,
        local: impl FnOnce(&LauncherJobInfo) -> SpankResult<T>,
        remote: impl FnOnce(&StepContext) -> SpankResult<T>,
    ) -> SpankResult<T> {
        self.check(item)?;
        match &self.job {
            Some(JobRef::Local(job)) => local(job),
            Some(JobRef::Remote(step)) => remote(&**step),
            None => Err(SpankError::BadArg),
        }
    }

    pub fn uid(&self) -> SpankResult<u32> {
        self.pick(StSpankItem::JobUid, |j| Ok(j.uid), |s| Ok(s.uid))
    }

    pub fn gid(&self) -> SpankResult<u32> {
        self.pick(StSpankItem::JobGid, |j| Ok(j.gid), |s| Ok(s.gid))
    }

    pub fn job_id(&self) -> SpankResult<u32> {
        self.pick(StSpankItem::JobId, |j| Ok(j.job_id), |s| Ok(s.job_id))
    }

    pub fn step_id(&self) -> SpankResult<u32> {
        self.pick(StSpankItem::JobStepId, |j| Ok(j.step_id), |s| Ok(s.step_id))
    }

    pub fn nnodes(&self) -> SpankResult<u32> {
        self.pick(
            StSpankItem::JobNnodes,
            |j| j.step_layout.map(|l| l.node_cnt).ok_or(SpankError::EnvNoExist),
            |s| Ok(s.nnodes),
        )
    }

    pub fn total_task_count(&self) -> SpankResult<u32> {
        self.pick(
            StSpankItem::JobTotalTaskCount,
            |j| j.step_layout.map(|l| l.task_cnt).ok_or(SpankError::EnvNoExist),
            |s| Ok(s.nprocs),
        )
    }

    pub fn argv(&self) -> SpankResult<&[String]> {
        self.check(StSpankItem::JobArgv)?;
        match &self.job {
            Some(JobRef::Local(job)) => Ok(job.argv.as_slice()),
            Some(JobRef::Remote(step)) => Ok(step.argv.as_slice()),
            None => Err(SpankError::BadArg),
        }
    }

    pub fn env(&self) -> SpankResult<&[String]> {
        self.check(StSpankItem::JobEnv)?;
        match &self.job {
            Some(JobRef::Local(job)) => Ok(job.env.as_slice()),
            Some(JobRef::Remote(step)) => Ok(step.env.as_slice()),
            None => Err(SpankError::BadArg),
        }
    }

    pub fn node_id(&self) -> SpankResult<u32> {
        self.check(StSpankItem::JobNodeId)?;
        Ok(self.step()?.node_id)
    }

    pub fn local_task_count(&self) -> SpankResult<u32> {
        self.check(StSpankItem::JobLocalTaskCount)?;
        Ok(self.step()?.tasks.len() as u32)
    }

    pub fn ncpus(&self) -> SpankResult<u16> {
        self.check(StSpankItem::JobNcpus)?;
        Ok(self.step()?.cpus)
    }

    pub fn cpus_per_task(&self) -> SpankResult<u32> {
        self.check(StSpankItem::StepCpusPerTask)?;
        Ok(self.step()?.cpus_per_task)
    }

    pub fn supplementary_gids(&self) -> SpankResult<&[u32]> {
        self.check(StSpankItem::JobSupplementaryGids)?;
        Ok(self.step()?.gids.as_slice())
    }

    pub fn task_id(&self) -> SpankResult<u32> {
        self.check(StSpankItem::TaskId)?;
        Ok(self.current_task()?.id)
    }

    pub fn task_global_id(&self) -> SpankResult<u32> {
        self.check(StSpankItem::TaskGlobalId)?;
        Ok(self.current_task()?.gtid)
    }

    /// The task's pid; `NotExecd` until the task has been started.
    pub fn task_pid(&self) -> SpankResult<i32> {
        self.check(StSpankItem::TaskPid)?;
        self.current_task()?.pid.ok_or(SpankError::NotExecd)
    }

    pub fn task_exit_status(&self) -> SpankResult<i32> {
        self.check(StSpankItem::TaskExitStatus)?;
        if !self.phase.tasks_started() {
            return Err(SpankError::NotExecd);
        }
        self.current_task()?.exit_status.ok_or(SpankError::NotTask)
    }

    fn task_for_pid(&self, item: StSpankItem, pid: i32) -> SpankResult<&TaskRecord> {
        self.check(item)?;
        let step = self.step()?;
        if !self.phase.tasks_started() {
            return Err(SpankError::NotExecd);
        }
        step.task_by_pid(pid).ok_or(SpankError::NoExist)
    }

    pub fn pid_to_global_id(&self, pid: i32) -> SpankResult<u32> {
        Ok(self.task_for_pid(StSpankItem::JobPidToGlobalId, pid)?.gtid)
    }

    pub fn pid_to_local_id(&self, pid: i32) -> SpankResult<u32> {
        Ok(self.task_for_pid(StSpankItem::JobPidToLocalId, pid)?.id)
    }

    pub fn local_to_global_id(&self, local_id: u32) -> SpankResult<u32> {
        self.check(StSpankItem::JobLocalToGlobalId)?;
        let step = self.step()?;
        step.tasks
            .get(local_id as usize)
            .map(|t| t.gtid)
            .ok_or(SpankError::NoExist)
    }

    pub fn global_to_local_id(&self, global_id: u32) -> SpankResult<u32> {
        self.check(StSpankItem::JobGlobalToLocalId)?;
        let step = self.step()?;
        if global_id >= step.nprocs {
            return Err(SpankError::BadArg);
        }
        step.tasks
            .iter()
            .find(|t| t.gtid == global_id)
            .map(|t| t.id)
            .ok_or(SpankError::NoExist)
    }

    pub fn version(&self, item: StSpankItem) -> SpankResult<&'static str> {
        match item {
            StSpankItem::Version => Ok(VERSION),
            StSpankItem::VersionMajor => Ok(VERSION_MAJOR),
            StSpankItem::VersionMinor => Ok(VERSION_MINOR),
            StSpankItem::VersionMicro => Ok(VERSION_MICRO),
            _ => Err(SpankError::BadArg),
        }
    }

    pub fn getenv(&self, name: &str) -> SpankResult<&str> {
        self.require_remote()?;
        if !env::is_valid_name(name) {
            return Err(SpankError::BadArg);
        }
        self.step()?.getenv(name).ok_or(SpankError::EnvNoExist)
    }

    /// Copies the value plus a NUL into `buf`. `NoSpace` leaves `buf` untouched.
    pub fn getenv_into(&self, name: &str, buf: &mut [u8]) -> SpankResult<usize> {
        let value = self.getenv(name)?;
        if !copy_nul_terminated(value, buf) {
            return Err(SpankError::NoSpace);
        }
        Ok(value.len())
    }

    pub fn setenv(&mut self, name: &str, value: &str, overwrite: bool) -> SpankResult<()> {
        self.require_remote()?;
        if !env::is_valid_name(name) || value.contains('\0') {
            return Err(SpankError::BadArg);
        }
        let step = self.step_mut()?;
        if !overwrite && step.getenv(name).is_some() {
            return Err(SpankError::EnvExists);
        }
        step.setenv(name, value);
        Ok(())
    }

    pub fn unsetenv(&mut self, name: &str) -> SpankResult<()> {
        self.require_remote()?;
        if !env::is_valid_name(name) {
            return Err(SpankError::BadArg);
        }
        self.step_mut()?.unsetenv(name);
        Ok(())
    }
}
