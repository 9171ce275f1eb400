use super::{Cli, Commands};
use crate::project_commands::{RunRequest, check_command, eval_command, run_command};
use anyhow::Result;

pub(crate) fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            dir,
            provider,
            max_retries,
            settle_ms,
            hint,
            write,
            out,
            report,
        } => {
            let export = if write { Some(dir.clone()) } else { out };
            run_command(RunRequest {
                dir,
                provider,
                max_retries,
                settle_ms,
                hint,
                export,
                report,
            })
        }
        Commands::Check { dir, provider } => check_command(dir, provider),
        Commands::Eval { code } => eval_command(code),
    }
}
