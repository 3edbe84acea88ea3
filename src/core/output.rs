//! Public output types for taskpipe transforms.
//!
//! These are returned by the library operations and serialized as the
//! `data` payload of CLI responses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Error;

/// Original reference text to the text that replaced it, ordered for display.
pub type ReplacementMap = BTreeMap<String, String>;

// ============================================================================
// Package Operations
// ============================================================================

/// Result of a package resolve/update run.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PackageReport {
    pub replacements: ReplacementMap,
    pub written: Vec<PathBuf>,
    /// Files found by directory walk that could not be parsed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unparsable: Vec<FileError>,
}

// ============================================================================
// Base Operations
// ============================================================================

/// A file that failed, with the reason.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub path: PathBuf,
    pub error: String,
    pub code: String,
}

impl FileError {
    pub fn new(path: &Path, error: &Error) -> Self {
        Self {
            path: path.to_path_buf(),
            error: error.detail_text(),
            code: error.code.as_str().to_string(),
        }
    }
}

/// Per-file outcome of default base insertion.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BaseInsertReport {
    pub updated: Vec<PathBuf>,
    pub errored: Vec<FileError>,
    pub skipped: Vec<PathBuf>,
}

impl BaseInsertReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_updated(&mut self, path: &Path) {
        self.updated.push(path.to_path_buf());
    }

    pub fn record_error(&mut self, path: &Path, error: &Error) {
        self.errored.push(FileError::new(path, error));
    }

    pub fn record_skipped(&mut self, path: &Path) {
        self.skipped.push(path.to_path_buf());
    }

    pub fn has_errors(&self) -> bool {
        !self.errored.is_empty()
    }
}

// ============================================================================
// Trigger Operations
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSyncOutput {
    pub path: PathBuf,
    pub updated: bool,
}
