//! Turn command-line paths into the list of YAML files to process.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::local_files::FileSystem;

/// A file to process and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: PathBuf,
    /// Named directly rather than found by walking a directory.
    pub explicit: bool,
}

impl Target {
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            explicit: true,
        }
    }

    pub fn discovered(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            explicit: false,
        }
    }
}

/// Expand `inputs` into targets. Directories are walked for `*.yml`/`*.yaml`;
/// with no inputs, `default_dir` is walked.
pub fn collect_targets(
    fs: &dyn FileSystem,
    inputs: &[PathBuf],
    default_dir: &Path,
) -> Result<Vec<Target>> {
    if inputs.is_empty() {
        if !default_dir.is_dir() {
            return Err(Error::validation_invalid_argument(
                "paths",
                format!(
                    "No paths given and the pipeline directory {} does not exist",
                    default_dir.display()
                ),
            ));
        }
        return walk(fs, default_dir);
    }

    let mut targets = Vec::new();
    for input in inputs {
        if input.is_dir() {
            targets.extend(walk(fs, input)?);
        } else if input.exists() {
            targets.push(Target::explicit(input.clone()));
        } else {
            return Err(Error::validation_invalid_argument(
                "paths",
                format!("No such file or directory: {}", input.display()),
            ));
        }
    }

    let mut seen = std::collections::HashSet::new();
    targets.retain(|t| seen.insert(t.path.clone()));
    Ok(targets)
}

fn walk(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<Target>> {
    Ok(fs
        .list_yaml(dir)?
        .into_iter()
        .map(Target::discovered)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_files::local;
    use tempfile::tempdir;

    #[test]
    fn directories_are_walked_and_files_are_explicit() {
        let dir = tempdir().unwrap();
        let pipelines = dir.path().join(".taskpipe");
        std::fs::create_dir(&pipelines).unwrap();
        std::fs::write(pipelines.join("ci.yml"), "tasks: []\n").unwrap();
        let single = dir.path().join("other.yaml");
        std::fs::write(&single, "tasks: []\n").unwrap();

        let targets =
            collect_targets(&local(), &[pipelines.clone(), single.clone()], &pipelines).unwrap();
        assert_eq!(
            targets,
            vec![
                Target::discovered(pipelines.join("ci.yml")),
                Target::explicit(single),
            ]
        );
    }

    #[test]
    fn empty_inputs_use_default_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.yml"), "tasks: []\n").unwrap();
        let targets = collect_targets(&local(), &[], dir.path()).unwrap();
        assert_eq!(targets.len(), 1);
        assert!(!targets[0].explicit);
    }

    #[test]
    fn missing_paths_are_rejected() {
        let dir = tempdir().unwrap();
        let err = collect_targets(&local(), &[dir.path().join("nope.yml")], dir.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
    }
}
