// Public modules
pub mod base;
pub mod catalog;
pub mod defaults;
pub mod discovery;
pub mod error;
pub mod local_files;
pub mod output;
pub mod packages;
pub mod trigger;
pub mod yaml;

// Internal modules - not part of public API
pub(crate) mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use output::{BaseInsertReport, FileError, PackageReport, ReplacementMap, TriggerSyncOutput};
