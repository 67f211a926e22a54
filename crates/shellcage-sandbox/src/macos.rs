//! macOS sandbox using Seatbelt (`sandbox-exec`).
//!
//! Wraps the original command as:
//! `/usr/bin/sandbox-exec -p <profile> -- <shell> -c <command>`
//!
//! Profile rendering is plain text generation, so it is compiled on every
//! platform; only the backend registry restricts it to macOS at run time.

use crate::backend::SandboxBackend;
use crate::error::Result;
use crate::loopback::{AddressFamily, LoopbackPattern};
use crate::policy::{AccessPolicy, PathPattern};
use crate::profile::CompiledProfile;
use crate::rule::{self, Domain, Effect, RulePattern, SandboxRule};
use crate::wrapper::{self, WrappedCommand};

pub const SANDBOX_EXEC: &str = "/usr/bin/sandbox-exec";

/// Operations every interpreter needs regardless of policy.
const BASELINE: &str = "\
(version 1)
(deny default)
(allow process-fork)
(allow signal (target same-sandbox))
(allow sysctl-read)
(allow mach-lookup)
(allow ipc-posix-shm)
(allow file-read-metadata)
(allow file-ioctl (literal \"/dev/tty\") (literal \"/dev/null\"))
(allow system-socket)
";

/// Seatbelt backend for macOS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeatbeltBackend;

impl SandboxBackend for SeatbeltBackend {
    fn name(&self) -> &'static str {
        "seatbelt"
    }

    fn compile(&self, policy: &AccessPolicy) -> Result<CompiledProfile> {
        Ok(compile_profile(policy))
    }

    fn wrap(
        &self,
        profile: CompiledProfile,
        command: &str,
        shell: &str,
    ) -> Result<WrappedCommand> {
        wrap_command_macos(profile, command, shell)
    }
}

/// Compile `policy` into a complete Seatbelt profile.
pub fn compile_profile(policy: &AccessPolicy) -> CompiledProfile {
    let rules = rule::compile_rules(policy);
    let text = render_profile(&rules);
    tracing::debug!(
        rules = rules.len(),
        bytes = text.len(),
        network_restricted = policy.needs_network_restriction(),
        "compiled seatbelt profile"
    );
    CompiledProfile::new(rules, text)
}

pub(crate) fn wrap_command_macos(
    profile: CompiledProfile,
    command: &str,
    shell: &str,
) -> Result<WrappedCommand> {
    wrapper::validate_command(command)?;
    wrapper::validate_shell(shell)?;
    wrapper::validate_profile(profile.as_str())?;

    Ok(WrappedCommand {
        program: SANDBOX_EXEC.to_string(),
        args: vec![
            "-p".to_string(),
            profile.into_string(),
            "--".to_string(),
            shell.to_string(),
            "-c".to_string(),
            command.to_string(),
        ],
    })
}

fn render_profile(rules: &[SandboxRule]) -> String {
    let mut profile = String::from(BASELINE);
    let mut current: Option<Domain> = None;

    for rule in rules {
        if current != Some(rule.domain) {
            profile.push_str(&format!("\n; {}\n", rule.domain));
            current = Some(rule.domain);
        }
        profile.push_str(&render_rule(rule));
        profile.push('\n');
    }

    profile
}

fn render_rule(rule: &SandboxRule) -> String {
    let effect = match rule.effect {
        Effect::Allow => "allow",
        Effect::Deny => "deny",
    };
    let operation = operation_for(rule.domain);

    match &rule.pattern {
        RulePattern::Any => format!("({effect} {operation})"),
        RulePattern::Path(path) => format!("({effect} {operation} {})", path_filter(path)),
        RulePattern::Address(address) => format!(
            "({effect} {operation} {}) ; {address}",
            address_filter(rule.domain, address)
        ),
    }
}

fn operation_for(domain: Domain) -> &'static str {
    match domain {
        Domain::ProcessExec => "process-exec",
        Domain::FileRead => "file-read*",
        Domain::FileWrite => "file-write*",
        Domain::NetworkBind => "network-bind",
        Domain::NetworkListen => "network-inbound",
        Domain::NetworkConnect => "network-outbound",
    }
}

fn path_filter(path: &PathPattern) -> String {
    match path {
        PathPattern::Literal(p) => {
            format!("(literal \"{}\")", escape_sbpl_string(&p.to_string_lossy()))
        }
        PathPattern::Subpath(p) => {
            format!("(subpath \"{}\")", escape_sbpl_string(&p.to_string_lossy()))
        }
        PathPattern::Glob(glob) => format!("(regex #\"{}\")", glob_to_regex(glob)),
    }
}

/// Seatbelt only understands `localhost` and `*` as hosts, qualified by family.
/// `ip4`/`ip6` pin the plain loopback of each family; the IPv4-mapped block is
/// reached through the family-agnostic `ip` qualifier, which is what a dual-stack
/// IPv6 socket presents when it talks over the IPv4 loopback.
fn address_filter(domain: Domain, address: &LoopbackPattern) -> String {
    let side = match domain {
        Domain::NetworkConnect => "remote",
        _ => "local",
    };
    let family = if address.is_ipv4_mapped() {
        "ip"
    } else {
        match address.family() {
            AddressFamily::Ipv4 => "ip4",
            AddressFamily::Ipv6 => "ip6",
        }
    };
    format!("({side} {family} \"localhost:*\")")
}

fn escape_sbpl_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Translate a validated glob into an anchored POSIX regex.
fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = glob.chars().peekable();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        if in_class {
            if c == ']' {
                in_class = false;
            }
            regex.push(c);
            continue;
        }
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                regex.push_str(".*");
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            '[' => {
                in_class = true;
                regex.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    regex.push('^');
                }
            }
            '.' | '^' | '$' | '+' | '(' | ')' | '{' | '}' | '|' => {
                regex.push('\\');
                regex.push(c);
            }
            other => regex.push(other),
        }
    }

    regex.push('$');
    regex
}
