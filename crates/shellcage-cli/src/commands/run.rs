use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{Context, Result};
use shellcage_sandbox::wrap_command_for_current_platform;
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::cli::{RunArgs, command_line};
use crate::config::CliConfig;

/// Exit code reported when `--timeout` kills the command, matching timeout(1).
pub const TIMEOUT_EXIT_CODE: i32 = 124;

pub async fn run(args: RunArgs, config: &CliConfig) -> Result<i32> {
    let (policy, options) = config.resolve(&args.policy, command_line(&args.command))?;
    let wrapped = wrap_command_for_current_platform(&policy, &options)?;

    tracing::debug!(
        program = %wrapped.program,
        command = policy.command(),
        "spawning command"
    );

    let (program, argv) = wrapped.into_parts();
    let mut command = Command::new(&program);
    command.args(&argv).kill_on_drop(true);

    // A timed run gets its own process group so the deadline reaches every
    // process the shell forks, not just the shell.
    #[cfg(unix)]
    {
        if args.timeout.is_some() {
            command.process_group(0);
        }
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to spawn {program}"))?;

    let status = match args.timeout {
        Some(secs) => match timeout(Duration::from_secs(secs), child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                tracing::warn!(timeout_secs = secs, "command timed out, killing it");
                kill_process_group(&mut child).await;
                return Ok(TIMEOUT_EXIT_CODE);
            }
        },
        None => child.wait().await?,
    };

    Ok(exit_code(status))
}

/// SIGKILL the child's whole process group, then reap the child.
async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) {
            if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                tracing::debug!(pid, error = %err, "failed to kill process group");
            }
        }
    }

    child.kill().await.ok();
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
