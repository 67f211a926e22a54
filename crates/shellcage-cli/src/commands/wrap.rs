use anyhow::Result;
use shellcage_sandbox::wrap_command_for_current_platform;

use crate::cli::{WrapArgs, command_line};
use crate::config::CliConfig;
use crate::output::{OutputFormat, print_json};

pub fn run(args: WrapArgs, config: &CliConfig, format: OutputFormat) -> Result<()> {
    let (policy, options) = config.resolve(&args.policy, command_line(&args.command))?;
    let wrapped = wrap_command_for_current_platform(&policy, &options)?;

    if format.is_json() {
        return print_json(&wrapped);
    }

    println!("{}", wrapped.to_shell_string());
    Ok(())
}
