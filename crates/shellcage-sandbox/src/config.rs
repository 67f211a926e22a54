//! Serializable sandbox settings, as loaded from a config file.

use serde::{Deserialize, Serialize};

use crate::backend::{DEFAULT_SHELL, OnUnsupported, WrapOptions};
use crate::error::Result;
use crate::policy::{AccessPolicy, AccessPolicyBuilder, expand_home};

/// Sandbox settings. Every field has a default, so an empty table is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SandboxConfig {
    /// Restrict network access to loopback. Defaults to `true`.
    pub needs_network_restriction: bool,
    /// Allow binding and listening on loopback addresses.
    pub allow_local_binding: bool,
    /// Readable path patterns. `None` uses the built-in minimal list.
    pub read_config: Option<Vec<String>>,
    /// Writable path patterns. `None` uses the built-in minimal list.
    pub write_config: Option<Vec<String>>,
    /// Shell that interprets the command line.
    pub shell: String,
    pub on_unsupported: OnUnsupported,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            needs_network_restriction: true,
            allow_local_binding: false,
            read_config: None,
            write_config: None,
            shell: DEFAULT_SHELL.to_string(),
            on_unsupported: OnUnsupported::default(),
        }
    }
}

impl SandboxConfig {
    /// Resolve these settings into a validated policy for `command`.
    ///
    /// `~` is expanded against the current user's home directory and existing
    /// paths are canonicalized so symlinked locations match what the kernel sees.
    pub fn into_policy(&self, command: impl Into<String>) -> Result<AccessPolicy> {
        self.policy_builder(command).build()
    }

    /// Like [`SandboxConfig::into_policy`], leaving the builder open for more patterns.
    pub fn policy_builder(&self, command: impl Into<String>) -> AccessPolicyBuilder {
        let mut builder = AccessPolicy::builder(command)
            .network_restriction(self.needs_network_restriction)
            .allow_local_binding(self.allow_local_binding)
            .canonicalize_paths(true);
        if let Some(read) = &self.read_config {
            builder = builder.read_allow_list(expand_user_patterns(read));
        }
        if let Some(write) = &self.write_config {
            builder = builder.write_allow_list(expand_user_patterns(write));
        }
        builder
    }

    pub fn wrap_options(&self) -> WrapOptions {
        WrapOptions {
            shell: self.shell.clone(),
            on_unsupported: self.on_unsupported,
        }
    }
}

/// Expand a leading `~` in each pattern against the current user's home.
pub fn expand_user_patterns(patterns: &[String]) -> Vec<String> {
    let home = dirs::home_dir();
    patterns
        .iter()
        .map(|p| expand_home(p, home.as_deref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SandboxError;

    #[test]
    fn test_empty_table_uses_defaults() {
        let config: SandboxConfig = toml::from_str("").unwrap();
        assert_eq!(config, SandboxConfig::default());
        assert!(config.needs_network_restriction);
        assert_eq!(config.shell, "/bin/bash");
        assert_eq!(config.on_unsupported, OnUnsupported::Fail);
    }

    #[test]
    fn test_parse_full_config() {
        let config: SandboxConfig = toml::from_str(
            r#"
            needs-network-restriction = true
            allow-local-binding = true
            read-config = ["/usr", "/opt/data"]
            write-config = ["/tmp/out"]
            shell = "/bin/zsh"
            on-unsupported = "run-unconfined"
            "#,
        )
        .unwrap();
        assert!(config.allow_local_binding);
        assert_eq!(
            config.read_config,
            Some(vec!["/usr".to_string(), "/opt/data".to_string()])
        );
        assert_eq!(config.write_config, Some(vec!["/tmp/out".to_string()]));
        assert_eq!(config.shell, "/bin/zsh");
        assert_eq!(config.on_unsupported, OnUnsupported::RunUnconfined);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result: std::result::Result<SandboxConfig, _> = toml::from_str("allow-everything = true");
        assert!(result.is_err());
    }

    #[test]
    fn test_into_policy() {
        let config = SandboxConfig {
            allow_local_binding: true,
            read_config: Some(vec!["/definitely/missing/dir".to_string()]),
            ..SandboxConfig::default()
        };
        let policy = config.into_policy("python3 -V").unwrap();
        assert_eq!(policy.command(), "python3 -V");
        assert!(policy.needs_network_restriction());
        assert!(policy.allow_local_binding());
        assert_eq!(
            policy.read_allow_list().unwrap(),
            &[crate::PathPattern::subpath("/definitely/missing/dir")]
        );
        assert!(policy.write_allow_list().is_none());
    }

    #[test]
    fn test_into_policy_expands_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let config = SandboxConfig {
            read_config: Some(vec!["~/shellcage-test-missing".to_string()]),
            ..SandboxConfig::default()
        };
        let policy = config.into_policy("true").unwrap();
        assert_eq!(
            policy.read_allow_list().unwrap(),
            &[crate::PathPattern::subpath(
                home.join("shellcage-test-missing")
            )]
        );
    }

    #[test]
    fn test_into_policy_rejects_contradictory_flags() {
        let config = SandboxConfig {
            needs_network_restriction: false,
            allow_local_binding: true,
            ..SandboxConfig::default()
        };
        assert!(matches!(
            config.into_policy("true").unwrap_err(),
            SandboxError::PolicyValidation(_)
        ));
    }

    #[test]
    fn test_wrap_options() {
        let config = SandboxConfig {
            shell: "/bin/sh".to_string(),
            on_unsupported: OnUnsupported::RunUnconfined,
            ..SandboxConfig::default()
        };
        let options = config.wrap_options();
        assert_eq!(options.shell, "/bin/sh");
        assert_eq!(options.on_unsupported, OnUnsupported::RunUnconfined);
    }
}
