use stepd_proto::JobOptions;

use crate::env;

/// One task of the step running on this node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRecord {
    /// Node-local task id.
    pub id: u32,
    /// Job-global task id.
    pub gtid: u32,
    pub pid: Option<i32>,
    /// Wait status, set once the task has been reaped.
    pub exit_status: Option<i32>,
}

impl TaskRecord {
    pub fn new(id: u32, gtid: u32) -> Self {
        Self {
            id,
            gtid,
            ..Self::default()
        }
    }
}

/// Execution-side view of a job step on one node.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub job_id: u32,
    pub step_id: u32,
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
    pub tasks: Vec<TaskRecord>,
    pub env: Vec<String>,
    pub argv: Vec<String>,
    pub nnodes: u32,
    pub nprocs: u32,
    pub node_id: u32,
    pub cpus: u16,
    pub cpus_per_task: u32,
    pub batch: bool,
    pub cwd: String,
    pub options: JobOptions,
}

impl StepContext {
    pub fn getenv(&self, name: &str) -> Option<&str> {
        env::getenvp(&self.env, name)
    }

    pub fn setenv(&mut self, name: &str, value: &str) {
        env::setenvp(&mut self.env, name, value);
    }

    pub fn unsetenv(&mut self, name: &str) -> bool {
        env::unsetenvp(&mut self.env, name)
    }

    pub fn task_by_pid(&self, pid: i32) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.pid == Some(pid))
    }
}

/// Node and task counts known to the launcher once a step has been allocated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepLayout {
    pub node_cnt: u32,
    pub task_cnt: u32,
}

/// Launcher-side view of a job, before any task exists.
#[derive(Debug, Clone, Default)]
pub struct LauncherJobInfo {
    pub uid: u32,
    pub gid: u32,
    pub job_id: u32,
    pub step_id: u32,
    pub argv: Vec<String>,
    pub env: Vec<String>,
    pub step_layout: Option<StepLayout>,
}
