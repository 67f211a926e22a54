//! CLI configuration file support
//!
//! Loads configuration from ~/.config/shellcage/config.toml

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shellcage_sandbox::config::expand_user_patterns;
use shellcage_sandbox::{AccessPolicy, SandboxConfig, WrapOptions};

use crate::cli::PolicyArgs;

/// CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Sandbox defaults applied to every command
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl CliConfig {
    /// Load configuration from `explicit`, or from the default path.
    ///
    /// A missing default file yields defaults. An explicit path must exist and parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("shellcage").join("config.toml"))
    }

    /// Sandbox settings with command-line overrides applied.
    pub fn sandbox_with(&self, args: &PolicyArgs) -> SandboxConfig {
        let mut sandbox = self.sandbox.clone();

        if args.no_network_restriction {
            sandbox.needs_network_restriction = false;
            sandbox.allow_local_binding = false;
        }
        if args.allow_local_binding {
            sandbox.allow_local_binding = true;
        }
        if let Some(shell) = &args.shell {
            sandbox.shell = shell.clone();
        }
        if let Some(mode) = args.on_unsupported {
            sandbox.on_unsupported = mode.into();
        }

        sandbox
    }

    /// Validated policy and wrap options for `command`.
    ///
    /// `--allow-read`/`--allow-write` extend the configured list, or the
    /// built-in defaults when the file sets none.
    pub fn resolve(
        &self,
        args: &PolicyArgs,
        command: impl Into<String>,
    ) -> Result<(AccessPolicy, WrapOptions)> {
        let sandbox = self.sandbox_with(args);
        let policy = sandbox
            .policy_builder(command)
            .extend_read_allow_list(expand_user_patterns(&args.allow_read))
            .extend_write_allow_list(expand_user_patterns(&args.allow_write))
            .build()?;
        Ok((policy, sandbox.wrap_options()))
    }
}
