use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base taskpipe config directory (universal ~/.config/taskpipe/ on all platforms)
pub fn taskpipe() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("taskpipe"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("taskpipe"))
    }
}

/// Global config.json file path
pub fn config_json() -> Result<PathBuf> {
    Ok(taskpipe()?.join("config.json"))
}
