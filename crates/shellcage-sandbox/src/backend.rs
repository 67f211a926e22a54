//! Platform selection.
//!
//! Each supported OS gets one [`SandboxBackend`] implementation, chosen once
//! from a [`Platform`] value. Platforms without a backend either fail or run
//! unconfined, depending on [`OnUnsupported`]; the choice is never implicit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};
use crate::macos::SeatbeltBackend;
use crate::policy::AccessPolicy;
use crate::profile::CompiledProfile;
use crate::wrapper::WrappedCommand;

pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Operating system identity as seen by the backend registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` style name.
    pub fn from_os_name(name: &str) -> Self {
        match name {
            "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            other => Platform::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::MacOs => f.write_str("macos"),
            Platform::Linux => f.write_str("linux"),
            Platform::Windows => f.write_str("windows"),
            Platform::Other(name) => f.write_str(name),
        }
    }
}

/// What to do when the running platform has no sandbox backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnUnsupported {
    /// Return [`SandboxError::UnsupportedPlatform`].
    #[default]
    Fail,
    /// Run the command without any confinement, logging a warning.
    RunUnconfined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapOptions {
    /// Shell used to interpret the command line.
    pub shell: String,
    pub on_unsupported: OnUnsupported,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            on_unsupported: OnUnsupported::default(),
        }
    }
}

/// A profile compiler and command wrapper for one platform.
pub trait SandboxBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compile `policy` into this platform's profile language.
    fn compile(&self, policy: &AccessPolicy) -> Result<CompiledProfile>;

    /// Wrap `command` so it runs under `profile`.
    fn wrap(&self, profile: CompiledProfile, command: &str, shell: &str)
    -> Result<WrappedCommand>;

    fn wrap_policy(&self, policy: &AccessPolicy, shell: &str) -> Result<WrappedCommand> {
        let profile = self.compile(policy)?;
        self.wrap(profile, policy.command(), shell)
    }
}

/// The backend registered for `platform`, if any.
pub fn backend_for(platform: &Platform) -> Option<Box<dyn SandboxBackend>> {
    match platform {
        Platform::MacOs => Some(Box::new(SeatbeltBackend)),
        Platform::Linux | Platform::Windows | Platform::Other(_) => None,
    }
}

/// Wrap `policy.command()` for an explicit platform.
pub fn wrap_command_for_platform(
    policy: &AccessPolicy,
    platform: &Platform,
    options: &WrapOptions,
) -> Result<WrappedCommand> {
    if let Some(backend) = backend_for(platform) {
        return backend.wrap_policy(policy, &options.shell);
    }

    match options.on_unsupported {
        OnUnsupported::Fail => Err(SandboxError::UnsupportedPlatform {
            platform: platform.clone(),
        }),
        OnUnsupported::RunUnconfined => {
            tracing::warn!(
                %platform,
                "no sandbox backend for this platform, running command unconfined"
            );
            WrappedCommand::unconfined(&options.shell, policy.command())
        }
    }
}

/// Wrap `policy.command()` for the platform this process is running on.
pub fn wrap_command_for_current_platform(
    policy: &AccessPolicy,
    options: &WrapOptions,
) -> Result<WrappedCommand> {
    wrap_command_for_platform(policy, &Platform::current(), options)
}
