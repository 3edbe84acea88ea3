use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use taskpipe::defaults::{self, TaskpipeConfig};
use taskpipe::discovery::{self, Target};
use taskpipe::local_files::LocalFs;

pub type CmdResult<T> = taskpipe::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    pub config: TaskpipeConfig,
}

impl GlobalArgs {
    pub fn load() -> Self {
        Self {
            config: defaults::load_config(),
        }
    }

    /// Local filesystem writing new files with the configured mode.
    pub fn fs(&self) -> taskpipe::Result<LocalFs> {
        Ok(LocalFs::with_default_mode(self.config.file_mode()?))
    }

    /// Files named by `paths`, or the pipeline directory when empty.
    pub fn targets(&self, fs: &LocalFs, paths: &[PathBuf]) -> taskpipe::Result<Vec<Target>> {
        discovery::collect_targets(fs, paths, Path::new(&self.config.pipeline_dir))
    }
}

/// Status output for one invocation, written to stderr when it is a terminal.
#[derive(Default)]
pub(crate) struct Reporter {
    banner_shown: bool,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce work that may wait on the network. Shown once per reporter.
    pub fn banner(&mut self) {
        if !self.banner_shown {
            self.banner_shown = true;
            self.notice("taskpipe is working...");
        }
    }

    pub fn notice(&self, message: &str) {
        if std::io::stderr().is_terminal() {
            eprintln!("{}", message);
        }
    }
}

pub mod base;
pub mod config;
pub mod packages;
pub mod trigger;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
    ($args:expr, $global:expr, $reporter:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global, $reporter))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
    reporter: &mut Reporter,
) -> (taskpipe::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Config(args) => dispatch!(args, global, config),
        crate::Commands::Trigger(args) => dispatch!(args, global, trigger),
        crate::Commands::Packages(args) => {
            reporter.banner();
            dispatch!(args, global, reporter, packages)
        }
        crate::Commands::Base(args) => {
            reporter.banner();
            dispatch!(args, global, reporter, base)
        }
    }
}
