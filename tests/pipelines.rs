use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use taskpipe::base::add_default_base;
use taskpipe::catalog::{BaseCatalog, BaseSpec, PackageCatalog, PackageVersions};
use taskpipe::discovery::Target;
use taskpipe::local_files::local;
use taskpipe::packages::{resolve_files, LatestMajor};
use taskpipe::trigger::sync_cli_trigger_file;
use taskpipe::{Error, Result};
use tempfile::tempdir;

struct StubCatalog {
    versions: PackageVersions,
    base: BaseSpec,
    base_calls: Cell<usize>,
}

impl StubCatalog {
    fn new() -> Self {
        Self {
            versions: PackageVersions {
                renames: BTreeMap::new(),
                latest_major: BTreeMap::from([
                    ("mint/setup-node".to_string(), "1.3.0".to_string()),
                    ("git/clone".to_string(), "1.6.5".to_string()),
                ]),
                latest_minor: BTreeMap::new(),
            },
            base: BaseSpec {
                image: "gentoo 99".to_string(),
                config: "default".to_string(),
                arch: String::new(),
            },
            base_calls: Cell::new(0),
        }
    }
}

impl PackageCatalog for StubCatalog {
    fn package_versions(&self) -> Result<PackageVersions> {
        Ok(self.versions.clone())
    }
}

impl BaseCatalog for StubCatalog {
    fn default_base(&self) -> Result<BaseSpec> {
        self.base_calls.set(self.base_calls.get() + 1);
        Ok(self.base.clone())
    }
}

struct UnreachableCatalog;

impl PackageCatalog for UnreachableCatalog {
    fn package_versions(&self) -> Result<PackageVersions> {
        Err(Error::remote_request_failed(
            "API error: HTTP 503",
            json!({ "status": 503 }),
        ))
    }
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn gentoo_base_is_inserted_end_to_end() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "ci.yml", "tasks:\n  - key: a\n  - key: b\n");
    let catalog = StubCatalog::new();

    let report = add_default_base(&local(), &catalog, &[Target::explicit(&path)], "x86_64").unwrap();

    assert_eq!(report.updated, vec![path.clone()]);
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "base:\n  image: gentoo 99\n  config: default\n\ntasks:\n  - key: a\n  - key: b\n"
    );
}

#[test]
fn base_insertion_isolates_per_file_failures() {
    let dir = tempdir().unwrap();
    let pipeline = "tasks:\n  - key: a\n";
    let first = write(dir.path(), "a.yml", pipeline);
    let second = write(dir.path(), "b.yml", pipeline);
    let third = write(dir.path(), "c.yml", pipeline);
    let mut perms = fs::metadata(&second).unwrap().permissions();
    perms.set_readonly(true);
    fs::set_permissions(&second, perms).unwrap();
    let catalog = StubCatalog::new();
    let targets: Vec<Target> = [&first, &second, &third]
        .into_iter()
        .map(Target::explicit)
        .collect();

    let report = add_default_base(&local(), &catalog, &targets, "x86_64").unwrap();

    assert_eq!(report.updated, vec![first.clone(), third.clone()]);
    assert_eq!(report.errored.len(), 1);
    assert_eq!(report.errored[0].path, second);
    assert_eq!(report.errored[0].code, "internal.io_error");
    assert_eq!(fs::read_to_string(&second).unwrap(), pipeline);
    assert!(fs::read_to_string(&third).unwrap().starts_with("base:\n"));
    assert_eq!(catalog.base_calls.get(), 1);
}

#[test]
fn base_is_not_fetched_when_nothing_is_eligible() {
    let dir = tempdir().unwrap();
    let has_base = write(dir.path(), "a.yml", "base:\n  image: x\n  config: y\ntasks:\n  - key: a\n");
    let list = write(dir.path(), "b.yml", "- key: a\n");
    let catalog = StubCatalog::new();

    let report = add_default_base(
        &local(),
        &catalog,
        &[Target::explicit(&has_base), Target::explicit(&list)],
        "x86_64",
    )
    .unwrap();

    assert!(report.updated.is_empty());
    assert_eq!(report.skipped, vec![has_base, list]);
    assert_eq!(catalog.base_calls.get(), 0);
}

#[test]
fn package_resolution_writes_nothing_when_any_file_is_malformed() {
    let dir = tempdir().unwrap();
    let first_text = "tasks:\n  - key: a\n    call: mint/setup-node\n";
    let first = write(dir.path(), "a.yml", first_text);
    let second = write(
        dir.path(),
        "b.yml",
        "tasks:\n  - key: b\n    call:\n      package: mint/setup-node\n",
    );
    let catalog = StubCatalog::new();

    let err = resolve_files(
        &local(),
        &catalog,
        &[Target::explicit(&first), Target::explicit(&second)],
        &LatestMajor,
        false,
    )
    .unwrap_err();

    assert_eq!(err.code.as_str(), "yaml.structural_mismatch");
    assert_eq!(fs::read_to_string(&first).unwrap(), first_text);
}

#[test]
fn package_resolution_aborts_when_version_table_is_unavailable() {
    let dir = tempdir().unwrap();
    let text = "tasks:\n  - key: a\n    call: mint/setup-node\n";
    let path = write(dir.path(), "a.yml", text);

    let err = resolve_files(&local(), &UnreachableCatalog, &[Target::explicit(&path)], &LatestMajor, false)
        .unwrap_err();

    assert_eq!(err.code.as_str(), "remote.request_failed");
    assert_eq!(fs::read_to_string(&path).unwrap(), text);
}

#[test]
fn package_resolution_is_idempotent_on_disk() {
    let dir = tempdir().unwrap();
    let path = write(
        dir.path(),
        "ci.yml",
        "# checkout first\ntasks:\n  - key: code\n    call: git/clone # clone\n  - key: deps\n    call: mint/setup-node\n",
    );
    let catalog = StubCatalog::new();
    let targets = [Target::explicit(&path)];

    let first = resolve_files(&local(), &catalog, &targets, &LatestMajor, false).unwrap();
    assert_eq!(first.written, vec![path.clone()]);
    assert_eq!(first.replacements["git/clone"], "1.6.5");
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "# checkout first\ntasks:\n  - key: code\n    call: git/clone 1.6.5 # clone\n  - key: deps\n    call: mint/setup-node 1.3.0\n"
    );

    let second = resolve_files(&local(), &catalog, &targets, &LatestMajor, false).unwrap();
    assert!(second.written.is_empty());
    assert!(second.replacements.is_empty());
}

#[test]
fn unparsable_files_abort_only_when_named() {
    let dir = tempdir().unwrap();
    let broken = write(dir.path(), "broken.yml", "tasks: [\n");
    let good = write(dir.path(), "good.yml", "- key: a\n  call: mint/setup-node\n");
    let catalog = StubCatalog::new();

    let report = resolve_files(
        &local(),
        &catalog,
        &[Target::discovered(&broken), Target::discovered(&good)],
        &LatestMajor,
        false,
    )
    .unwrap();
    assert_eq!(report.unparsable.len(), 1);
    assert_eq!(report.written, vec![good.clone()]);

    let err = resolve_files(&local(), &catalog, &[Target::explicit(&broken)], &LatestMajor, false)
        .unwrap_err();
    assert_eq!(err.code.as_str(), "yaml.parse_failed");
}

#[cfg(unix)]
#[test]
fn saved_files_keep_their_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let path = write(dir.path(), "ci.yml", "tasks:\n  - key: a\n");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

    add_default_base(&local(), &StubCatalog::new(), &[Target::explicit(&path)], "x86_64").unwrap();

    let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

#[test]
fn trigger_sync_saves_only_when_changed() {
    let dir = tempdir().unwrap();
    let path = write(
        dir.path(),
        "ci.yml",
        "on:\n  github:\n    push:\n      init:\n        sha: ${{ event.git.sha }}\n\ntasks:\n  - key: a\n",
    );

    assert!(sync_cli_trigger_file(&local(), &path).unwrap());
    let synced = fs::read_to_string(&path).unwrap();
    assert!(synced.contains("  cli:\n    init:\n      sha: ${{ event.git.sha }}\n"));

    assert!(!sync_cli_trigger_file(&local(), &path).unwrap());
    assert_eq!(fs::read_to_string(&path).unwrap(), synced);
}
