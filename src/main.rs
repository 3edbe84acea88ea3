use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{base, config, packages, trigger, GlobalArgs, Reporter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "taskpipe")]
#[command(version = VERSION)]
#[command(about = "Maintain task pipeline YAML files without losing their formatting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and update package references in task calls
    Packages(packages::PackagesArgs),
    /// Manage the base pipelines run under
    Base(base::BaseArgs),
    /// Keep the CLI trigger in line with git-driven triggers
    Trigger(trigger::TriggerArgs),
    /// Show taskpipe configuration
    Config(config::ConfigArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs::load();
    let mut reporter = Reporter::new();

    let (json_result, exit_code) = commands::run_json(cli.command, &global, &mut reporter);
    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
