use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;

use taskpipe::base;
use taskpipe::catalog::HttpCatalog;
use taskpipe::BaseInsertReport;

use super::{CmdResult, GlobalArgs, Reporter};

#[derive(Args)]
pub struct BaseArgs {
    #[command(subcommand)]
    command: BaseCommand,
}

#[derive(Subcommand)]
enum BaseCommand {
    /// Add the default base to pipelines that do not declare one
    Add {
        /// Pipeline files or directories (defaults to the pipeline directory)
        paths: Vec<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
pub struct BaseOutput {
    command: String,
    #[serde(flatten)]
    report: BaseInsertReport,
}

pub fn run(args: BaseArgs, global: &GlobalArgs, reporter: &Reporter) -> CmdResult<BaseOutput> {
    match args.command {
        BaseCommand::Add { paths } => add(&paths, global, reporter),
    }
}

fn add(paths: &[PathBuf], global: &GlobalArgs, reporter: &Reporter) -> CmdResult<BaseOutput> {
    let fs = global.fs()?;
    let targets = global.targets(&fs, paths)?;
    let catalog = HttpCatalog::from_config(&global.config)?;

    let report = base::add_default_base(&fs, &catalog, &targets, &global.config.default_arch)?;
    if report.updated.is_empty() && !report.has_errors() {
        reporter.notice("Every pipeline already declares a base");
    }

    let exit_code = if report.has_errors() { 1 } else { 0 };
    Ok((
        BaseOutput {
            command: "base.add".to_string(),
            report,
        },
        exit_code,
    ))
}
