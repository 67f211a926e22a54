//! OS sandbox policy compiler for untrusted shell commands.
//!
//! Turns a declarative [`AccessPolicy`] into a default-deny OS sandbox
//! profile and an invocation that runs the command under it.
//!
//! # Usage
//!
//! The pipeline has three stages:
//! 1. **Policy** ([`AccessPolicy::builder`] or [`SandboxConfig::into_policy`]):
//!    validates path patterns and flag combinations up front.
//! 2. **Compilation** ([`SandboxBackend::compile`]): lowers the policy into
//!    [`SandboxRule`]s, expanding loopback into every address form the kernel
//!    may present, then renders the platform profile.
//! 3. **Wrapping** ([`wrap_command_for_current_platform`]): returns a
//!    [`WrappedCommand`] to spawn. Nothing is spawned by this crate.
//!
//! Only macOS (Seatbelt) has a backend. On other platforms the caller decides
//! through [`OnUnsupported`] whether to fail or run unconfined.

pub mod backend;
pub mod config;
pub mod error;
pub mod loopback;
pub mod macos;
pub mod policy;
pub mod profile;
pub mod rule;
pub mod wrapper;

pub use backend::{
    OnUnsupported, Platform, SandboxBackend, WrapOptions, backend_for, wrap_command_for_platform,
    wrap_command_for_current_platform,
};
pub use config::SandboxConfig;
pub use error::{Result, SandboxError};
pub use loopback::{AddressClass, AddressFamily, LoopbackIntent, LoopbackPattern, classify};
pub use macos::SeatbeltBackend;
pub use policy::{AccessPolicy, AccessPolicyBuilder, PathPattern};
pub use profile::CompiledProfile;
pub use rule::{Domain, Effect, RulePattern, SandboxRule};
pub use wrapper::WrappedCommand;
