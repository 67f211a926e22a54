//! Platform-neutral rule model.
//!
//! A policy is first lowered into an ordered list of [`SandboxRule`]s and only
//! then rendered into a concrete profile language, so loopback expansion and
//! rule selection can be tested without looking at profile text.

use std::fmt;

use crate::loopback::{self, LoopbackPattern};
use crate::policy::{AccessPolicy, PathPattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Allow,
    Deny,
}

/// Rule domains, in the order they are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    ProcessExec,
    FileRead,
    FileWrite,
    NetworkBind,
    NetworkListen,
    NetworkConnect,
}

impl Domain {
    pub fn is_network(self) -> bool {
        matches!(
            self,
            Domain::NetworkBind | Domain::NetworkListen | Domain::NetworkConnect
        )
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::ProcessExec => "process-exec",
            Domain::FileRead => "file-read",
            Domain::FileWrite => "file-write",
            Domain::NetworkBind => "network-bind",
            Domain::NetworkListen => "network-listen",
            Domain::NetworkConnect => "network-connect",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RulePattern {
    /// The whole domain.
    Any,
    Path(PathPattern),
    Address(LoopbackPattern),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxRule {
    pub effect: Effect,
    pub domain: Domain,
    pub pattern: RulePattern,
}

impl SandboxRule {
    pub fn allow(domain: Domain, pattern: RulePattern) -> Self {
        Self {
            effect: Effect::Allow,
            domain,
            pattern,
        }
    }
}

impl fmt::Display for SandboxRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let effect = match self.effect {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        };
        match &self.pattern {
            RulePattern::Any => write!(f, "{effect} {} *", self.domain),
            RulePattern::Path(path) => write!(f, "{effect} {} {path}", self.domain),
            RulePattern::Address(address) => write!(f, "{effect} {} {address}", self.domain),
        }
    }
}

/// Lower a policy into its complete, ordered rule list.
///
/// Only allow rules are produced; everything else falls to the default-deny
/// baseline of the rendered profile.
pub fn compile_rules(policy: &AccessPolicy) -> Vec<SandboxRule> {
    let mut rules = vec![SandboxRule::allow(Domain::ProcessExec, RulePattern::Any)];

    rules.extend(
        policy
            .effective_read_patterns()
            .into_iter()
            .map(|p| SandboxRule::allow(Domain::FileRead, RulePattern::Path(p))),
    );
    rules.extend(
        policy
            .effective_write_patterns()
            .into_iter()
            .map(|p| SandboxRule::allow(Domain::FileWrite, RulePattern::Path(p))),
    );

    rules.extend(network_rules(policy));

    rules.sort_by_key(|rule| rule.domain);
    dedup_preserving_order(rules)
}

fn network_rules(policy: &AccessPolicy) -> Vec<SandboxRule> {
    let network_domains = [
        Domain::NetworkBind,
        Domain::NetworkListen,
        Domain::NetworkConnect,
    ];

    if !policy.needs_network_restriction() {
        return network_domains
            .into_iter()
            .map(|domain| SandboxRule::allow(domain, RulePattern::Any))
            .collect();
    }

    let loopback = loopback::all_loopback_patterns();
    let mut rules = Vec::new();

    if policy.allow_local_binding() {
        for domain in [Domain::NetworkBind, Domain::NetworkListen] {
            rules.extend(
                loopback
                    .iter()
                    .map(|p| SandboxRule::allow(domain, RulePattern::Address(*p))),
            );
        }
    }

    rules.extend(
        loopback
            .iter()
            .map(|p| SandboxRule::allow(Domain::NetworkConnect, RulePattern::Address(*p))),
    );

    rules
}

fn dedup_preserving_order(rules: Vec<SandboxRule>) -> Vec<SandboxRule> {
    let mut seen = std::collections::HashSet::new();
    rules
        .into_iter()
        .filter(|rule| seen.insert(rule.clone()))
        .collect()
}
