use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use shellcage_sandbox::OnUnsupported;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "shellcage")]
#[command(
    version,
    about = "Shellcage - run shell commands inside a default-deny OS sandbox"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/shellcage/config.toml)
    #[arg(long, global = true, env = "SHELLCAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command inside the sandbox
    Run(RunArgs),

    /// Print the sandboxed invocation without running it
    Wrap(WrapArgs),

    /// Print the compiled sandbox profile
    Profile(PolicyArgs),

    /// Classify addresses as loopback or restricted
    Classify {
        /// IP address, socket address or CIDR block
        #[arg(required = true)]
        addresses: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Policy overrides shared by every subcommand that builds a policy.
#[derive(Args, Debug, Clone, Default)]
pub struct PolicyArgs {
    /// Allow binding and listening on loopback addresses
    #[arg(long)]
    pub allow_local_binding: bool,

    /// Do not restrict network access
    #[arg(long, conflicts_with = "allow_local_binding")]
    pub no_network_restriction: bool,

    /// Additional readable path or glob (repeatable)
    #[arg(long = "allow-read", value_name = "PATTERN")]
    pub allow_read: Vec<String>,

    /// Additional writable path or glob (repeatable)
    #[arg(long = "allow-write", value_name = "PATTERN")]
    pub allow_write: Vec<String>,

    /// Shell that interprets the command
    #[arg(long)]
    pub shell: Option<String>,

    /// Behavior on platforms without a sandbox backend
    #[arg(long, value_enum)]
    pub on_unsupported: Option<UnsupportedMode>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Kill the command after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Command line to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WrapArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Command line to wrap
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnsupportedMode {
    Fail,
    RunUnconfined,
}

impl From<UnsupportedMode> for OnUnsupported {
    fn from(mode: UnsupportedMode) -> Self {
        match mode {
            UnsupportedMode::Fail => OnUnsupported::Fail,
            UnsupportedMode::RunUnconfined => OnUnsupported::RunUnconfined,
        }
    }
}

/// Join trailing arguments into one shell command line.
///
/// A single argument is taken as a complete command line; several arguments
/// are quoted so the shell sees them as separate words.
pub fn command_line(args: &[String]) -> String {
    match args {
        [single] => single.clone(),
        _ => shell_words::join(args),
    }
}
