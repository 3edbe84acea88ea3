use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Permission bits for files that do not exist yet.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// File system operations used when loading and saving pipeline files.
pub trait FileSystem {
    fn read(&self, path: &Path) -> Result<String>;

    /// Permission bits of an existing file, `None` when there is no file.
    fn mode(&self, path: &Path) -> Result<Option<u32>>;

    fn write_with_mode(&self, path: &Path, content: &str, mode: u32) -> Result<()>;

    /// YAML files (`*.yml`, `*.yaml`) below `dir`, sorted.
    fn list_yaml(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    fn default_mode(&self) -> u32 {
        DEFAULT_FILE_MODE
    }

    /// Write `content`, keeping the mode of the file being replaced.
    fn write(&self, path: &Path, content: &str) -> Result<()> {
        let mode = self.mode(path)?.unwrap_or_else(|| self.default_mode());
        self.write_with_mode(path, content, mode)
    }
}

/// Local filesystem implementation
pub struct LocalFs {
    default_mode: u32,
}

impl LocalFs {
    pub fn new() -> Self {
        Self {
            default_mode: DEFAULT_FILE_MODE,
        }
    }

    pub fn with_default_mode(default_mode: u32) -> Self {
        Self { default_mode }
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for LocalFs {
    fn read(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::internal_io(
                    format!("File not found: {}", path.display()),
                    Some("read file".to_string()),
                )
            } else {
                Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
            }
        })
    }

    fn mode(&self, path: &Path) -> Result<Option<u32>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(permission_bits(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::internal_io(
                e.to_string(),
                Some(format!("stat {}", path.display())),
            )),
        }
    }

    fn write_with_mode(&self, path: &Path, content: &str, mode: u32) -> Result<()> {
        // A rename would replace a read-only file, so refuse it up front.
        if fs::metadata(path).is_ok_and(|meta| meta.permissions().readonly()) {
            return Err(Error::internal_io(
                format!("Permission denied: {} is read-only", path.display()),
                Some("write file".to_string()),
            ));
        }

        // Atomic write: write to temp file, then rename
        let parent = path.parent().ok_or_else(|| {
            Error::internal_io(
                format!("Invalid path: {}", path.display()),
                Some("write file".to_string()),
            )
        })?;

        let filename = path.file_name().ok_or_else(|| {
            Error::internal_io(
                format!("Invalid path: {}", path.display()),
                Some("write file".to_string()),
            )
        })?;

        let tmp_path = parent.join(format!(".{}.tmp", filename.to_string_lossy()));

        fs::write(&tmp_path, content)
            .map_err(|e| Error::internal_io(e.to_string(), Some("write temp file".to_string())))?;

        if let Err(e) = set_permission_bits(&tmp_path, mode) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            Error::internal_io(e.to_string(), Some("rename temp file".to_string()))
        })?;

        Ok(())
    }

    fn list_yaml(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let root = glob::Pattern::escape(&dir.to_string_lossy());
        let mut files = Vec::new();
        for ext in ["yml", "yaml"] {
            let pattern = format!("{}/**/*.{}", root, ext);
            let paths = glob::glob(&pattern).map_err(|e| {
                Error::internal_unexpected(format!("Invalid glob pattern {}: {}", pattern, e))
            })?;
            files.extend(paths.flatten().filter(|p| p.is_file()));
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    fn default_mode(&self) -> u32 {
        self.default_mode
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        DEFAULT_FILE_MODE
    }
}

#[cfg(unix)]
fn set_permission_bits(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::internal_io(e.to_string(), Some("set file mode".to_string())))
}

#[cfg(not(unix))]
fn set_permission_bits(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some("set file mode".to_string())))?
        .permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms)
        .map_err(|e| Error::internal_io(e.to_string(), Some("set file mode".to_string())))
}

/// Convenience function to get local filesystem
pub fn local() -> LocalFs {
    LocalFs::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_fs_write_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.yml");
        let fs = local();

        fs.write(&path, "tasks: []\n").unwrap();
        assert_eq!(fs.read(&path).unwrap(), "tasks: []\n");
        assert!(!dir.path().join(".pipeline.yml.tmp").exists());
    }

    #[test]
    fn test_missing_file_has_no_mode() {
        let dir = tempdir().unwrap();
        assert_eq!(local().mode(&dir.path().join("nope.yml")).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("ci.yml");
        std::fs::write(&path, "a: 1\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        local().write(&path, "a: 2\n").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_read_only_files_are_not_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locked.yml");
        std::fs::write(&path, "a: 1\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        let err = local().write(&path, "a: 2\n").unwrap_err();
        assert_eq!(err.code.as_str(), "internal.io_error");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a: 1\n");
        assert!(!dir.path().join(".locked.yml.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_new_files_use_default_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("new.yml");
        LocalFs::with_default_mode(0o640)
            .write(&path, "a: 1\n")
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn test_list_yaml_walks_subdirectories() {
        let dir = tempdir().unwrap();
        let fs = local();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        fs.write(&dir.path().join("a.yml"), "a: 1\n").unwrap();
        fs.write(&dir.path().join("nested/b.yaml"), "b: 1\n").unwrap();
        fs.write(&dir.path().join("notes.txt"), "text").unwrap();

        let files = fs.list_yaml(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.yml"), dir.path().join("nested/b.yaml")]
        );
    }
}
