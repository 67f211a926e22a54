use anyhow::Result;
use serde_json::json;
use shellcage_sandbox::{SandboxBackend, SeatbeltBackend};

use crate::cli::PolicyArgs;
use crate::config::CliConfig;
use crate::output::{OutputFormat, print_json};

/// Print the Seatbelt profile for the configured policy. Compilation does not
/// depend on the host OS, so this works everywhere.
pub fn run(args: PolicyArgs, config: &CliConfig, format: OutputFormat) -> Result<()> {
    let (policy, _) = config.resolve(&args, String::new())?;
    let profile = SeatbeltBackend.compile(&policy)?;

    if format.is_json() {
        let rules: Vec<String> = profile.rules().iter().map(ToString::to_string).collect();
        return print_json(&json!({
            "backend": SeatbeltBackend.name(),
            "rules": rules,
            "profile": profile.as_str(),
        }));
    }

    print!("{}", profile.as_str());
    Ok(())
}
