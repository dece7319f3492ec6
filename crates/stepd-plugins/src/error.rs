use std::ffi::c_int;
use std::path::PathBuf;

use stepd_plugin_api::*;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load plugin `{path}`: {details}")]
    Load { path: PathBuf, details: String },
    #[error("plugin `{path}` exports no lifecycle symbols")]
    NoSymbols { path: PathBuf },
    #[error("{file}:{line}: {message}")]
    InvalidLine {
        file: String,
        line: usize,
        message: String,
    },
    #[error("{file}:{line}: failed to load required plugin `{path}`")]
    RequiredPlugin {
        file: String,
        line: usize,
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
    #[error("required plugin `{plugin}`: {phase}() failed with rc={rc}")]
    PluginFailed {
        plugin: String,
        phase: &'static str,
        rc: i32,
    },
    #[error("phase `{phase}` rejected: {reason}")]
    PhaseOrder { phase: &'static str, reason: String },
    #[error("no plugin option is registered with value {0}")]
    UnknownOption(i32),
    #[error("option `--{name}` was rejected by plugin `{plugin}` (rc={rc})")]
    OptionCallback {
        name: String,
        plugin: String,
        rc: i32,
    },
    #[error("io failed at `{path}`: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn load(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            details: details.into(),
        }
    }

    pub fn invalid_line(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::InvalidLine {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn phase_order(phase: &'static str, reason: impl Into<String>) -> Self {
        Self::PhaseOrder {
            phase,
            reason: reason.into(),
        }
    }

    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported to a plugin by a context query.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SpankError {
    #[error("generic error")]
    Error = ESPANK_ERROR,
    #[error("bad argument")]
    BadArg = ESPANK_BAD_ARG,
    #[error("not in task context")]
    NotTask = ESPANK_NOT_TASK,
    #[error("environment variable exists")]
    EnvExists = ESPANK_ENV_EXISTS,
    #[error("no such environment variable")]
    EnvNoExist = ESPANK_ENV_NOEXIST,
    #[error("buffer too small")]
    NoSpace = ESPANK_NOSPACE,
    #[error("valid only in remote context")]
    NotRemote = ESPANK_NOT_REMOTE,
    #[error("id or pid does not exist on this node")]
    NoExist = ESPANK_NOEXIST,
    #[error("lookup by pid requested, but no tasks running")]
    NotExecd = ESPANK_NOT_EXECD,
}

pub type SpankResult<T> = std::result::Result<T, SpankError>;

impl SpankError {
    pub fn code(self) -> c_int {
        self as c_int
    }

    pub fn from_code(code: c_int) -> Option<Self> {
        Some(match code {
            ESPANK_ERROR => Self::Error,
            ESPANK_BAD_ARG => Self::BadArg,
            ESPANK_NOT_TASK => Self::NotTask,
            ESPANK_ENV_EXISTS => Self::EnvExists,
            ESPANK_ENV_NOEXIST => Self::EnvNoExist,
            ESPANK_NOSPACE => Self::NoSpace,
            ESPANK_NOT_REMOTE => Self::NotRemote,
            ESPANK_NOEXIST => Self::NoExist,
            ESPANK_NOT_EXECD => Self::NotExecd,
            _ => return None,
        })
    }
}
