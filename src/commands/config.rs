use clap::{Args, Subcommand};
use serde::Serialize;

use taskpipe::defaults::{self, TaskpipeConfig};

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Display configuration (config.json merged over defaults)
    Show {
        /// Show only built-in defaults (ignore config.json)
        #[arg(long)]
        builtin: bool,
    },
    /// Show the path to config.json
    Path,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<TaskpipeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
}

pub fn run(args: ConfigArgs, global: &GlobalArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show { builtin } => {
            let config = if builtin {
                defaults::builtin_defaults()
            } else {
                global.config.clone()
            };
            Ok((
                ConfigOutput {
                    command: "config.show".to_string(),
                    config: Some(config),
                    path: None,
                    exists: None,
                },
                0,
            ))
        }
        ConfigCommand::Path => Ok((
            ConfigOutput {
                command: "config.path".to_string(),
                config: None,
                path: Some(defaults::config_path()?),
                exists: Some(defaults::config_exists()),
            },
            0,
        )),
    }
}
