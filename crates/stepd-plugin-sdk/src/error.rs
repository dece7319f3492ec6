use core::ffi::c_int;

use stepd_plugin_api::*;
use thiserror::Error;

pub type SdkResult<T> = Result<T, SdkError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SdkError {
    #[error("invalid spank handle")]
    InvalidHandle,
    #[error("string argument contains a NUL byte")]
    InteriorNul,
    #[error("host returned status {0}")]
    Status(c_int),
}

impl SdkError {
    pub(crate) fn check(status: c_int) -> SdkResult<()> {
        match status {
            ESPANK_SUCCESS => Ok(()),
            code => Err(Self::Status(code)),
        }
    }

    pub fn status(&self) -> c_int {
        match self {
            Self::Status(code) => *code,
            Self::InvalidHandle | Self::InteriorNul => ESPANK_BAD_ARG,
        }
    }

    pub fn is_env_exists(&self) -> bool {
        self.status() == ESPANK_ENV_EXISTS
    }
}
