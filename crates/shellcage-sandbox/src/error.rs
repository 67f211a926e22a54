//! Sandbox error types.

use crate::backend::Platform;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("invalid sandbox policy: {0}")]
    PolicyValidation(String),

    #[error("no sandbox backend available for platform '{platform}'")]
    UnsupportedPlatform { platform: Platform },

    #[error("cannot safely embed command in sandbox invocation: {0}")]
    WrapEscaping(String),
}

pub type Result<T, E = SandboxError> = std::result::Result<T, E>;
