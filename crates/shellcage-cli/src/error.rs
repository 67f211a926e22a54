use colored::Colorize;
use shellcage_sandbox::SandboxError;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    match err.downcast_ref::<SandboxError>() {
        Some(SandboxError::UnsupportedPlatform { .. }) => {
            eprintln!("\n{}", "Suggestion:".yellow().bold());
            eprintln!("  Only macOS has a sandbox backend. To run without confinement:");
            eprintln!(
                "  {} shellcage run --on-unsupported run-unconfined -- <command>",
                "$".dimmed()
            );
        }
        Some(SandboxError::PolicyValidation(_)) => {
            eprintln!("\n{}", "Suggestion:".yellow().bold());
            eprintln!("  Path patterns must be absolute; globs use *, **, ? and [...].");
        }
        Some(SandboxError::WrapEscaping(_)) => {
            eprintln!("\n{}", "Suggestion:".yellow().bold());
            eprintln!("  Check the command for unbalanced quotes.");
        }
        None => {}
    }

    std::process::exit(1);
}
