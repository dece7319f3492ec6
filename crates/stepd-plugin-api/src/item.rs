/// Items a plugin can query through `get_item_int` / `get_item_str`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StSpankItem {
    JobUid = 0,
    JobGid = 1,
    JobId = 2,
    JobStepId = 3,
    JobNnodes = 4,
    JobNodeId = 5,
    JobLocalTaskCount = 6,
    JobTotalTaskCount = 7,
    JobNcpus = 8,
    JobArgv = 9,
    JobEnv = 10,
    TaskId = 11,
    TaskGlobalId = 12,
    TaskExitStatus = 13,
    TaskPid = 14,
    JobPidToGlobalId = 15,
    JobPidToLocalId = 16,
    JobLocalToGlobalId = 17,
    JobGlobalToLocalId = 18,
    JobSupplementaryGids = 19,
    Version = 20,
    VersionMajor = 21,
    VersionMinor = 22,
    VersionMicro = 23,
    StepCpusPerTask = 24,
}

impl StSpankItem {
    pub const ALL: [StSpankItem; 25] = [
        StSpankItem::JobUid,
        StSpankItem::JobGid,
        StSpankItem::JobId,
        StSpankItem::JobStepId,
        StSpankItem::JobNnodes,
        StSpankItem::JobNodeId,
        StSpankItem::JobLocalTaskCount,
        StSpankItem::JobTotalTaskCount,
        StSpankItem::JobNcpus,
        StSpankItem::JobArgv,
        StSpankItem::JobEnv,
        StSpankItem::TaskId,
        StSpankItem::TaskGlobalId,
        StSpankItem::TaskExitStatus,
        StSpankItem::TaskPid,
        StSpankItem::JobPidToGlobalId,
        StSpankItem::JobPidToLocalId,
        StSpankItem::JobLocalToGlobalId,
        StSpankItem::JobGlobalToLocalId,
        StSpankItem::JobSupplementaryGids,
        StSpankItem::Version,
        StSpankItem::VersionMajor,
        StSpankItem::VersionMinor,
        StSpankItem::VersionMicro,
        StSpankItem::StepCpusPerTask,
    ];

    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(raw).ok()?).copied()
    }
}
