use std::path::PathBuf;

use clap::{Args, Subcommand};

use taskpipe::trigger;
use taskpipe::TriggerSyncOutput;

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct TriggerArgs {
    #[command(subcommand)]
    command: TriggerCommand,
}

#[derive(Subcommand)]
enum TriggerCommand {
    /// Copy git-derived init params into the CLI trigger
    Sync {
        /// Pipeline file to update
        file: PathBuf,
    },
}

pub fn run(args: TriggerArgs, global: &GlobalArgs) -> CmdResult<TriggerSyncOutput> {
    match args.command {
        TriggerCommand::Sync { file } => {
            let fs = global.fs()?;
            let updated = trigger::sync_cli_trigger_file(&fs, &file)?;
            Ok((TriggerSyncOutput { path: file, updated }, 0))
        }
    }
}
