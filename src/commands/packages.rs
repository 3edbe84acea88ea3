use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;

use taskpipe::catalog::HttpCatalog;
use taskpipe::packages::{self, LatestMajor, LatestMinor, VersionPicker};
use taskpipe::PackageReport;

use super::{CmdResult, GlobalArgs, Reporter};

#[derive(Args)]
pub struct PackagesArgs {
    #[command(subcommand)]
    command: PackagesCommand,
}

#[derive(Subcommand)]
enum PackagesCommand {
    /// Add the latest version to package references that have none
    Resolve {
        /// Pipeline files or directories (defaults to the pipeline directory)
        paths: Vec<PathBuf>,
    },
    /// Move every package reference to its newest version
    Update {
        /// Pipeline files or directories (defaults to the pipeline directory)
        paths: Vec<PathBuf>,
        /// Allow moving to a new major version
        #[arg(long)]
        major: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct PackagesOutput {
    command: String,
    #[serde(flatten)]
    report: PackageReport,
}

pub fn run(args: PackagesArgs, global: &GlobalArgs, reporter: &Reporter) -> CmdResult<PackagesOutput> {
    match args.command {
        PackagesCommand::Resolve { paths } => {
            execute("packages.resolve", &paths, &LatestMajor, false, global, reporter)
        }
        PackagesCommand::Update { paths, major } => {
            let picker: &dyn VersionPicker = if major { &LatestMajor } else { &LatestMinor };
            execute("packages.update", &paths, picker, true, global, reporter)
        }
    }
}

fn execute(
    command: &str,
    paths: &[PathBuf],
    picker: &dyn VersionPicker,
    update: bool,
    global: &GlobalArgs,
    reporter: &Reporter,
) -> CmdResult<PackagesOutput> {
    let fs = global.fs()?;
    let targets = global.targets(&fs, paths)?;
    let catalog = HttpCatalog::from_config(&global.config)?;

    let report = packages::resolve_files(&fs, &catalog, &targets, picker, update)?;
    if report.replacements.is_empty() {
        reporter.notice("No package references needed updating");
    }

    Ok((
        PackagesOutput {
            command: command.to_string(),
            report,
        },
        0,
    ))
}
