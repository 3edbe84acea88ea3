//! Package reference resolution.
//!
//! Task `call` values of the form `namespace/name [version]` reference
//! published packages. Resolving fills in missing versions; updating also
//! moves pinned versions forward. Both go through a [`VersionPicker`].

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::{PackageCatalog, PackageVersions};
use crate::discovery::Target;
use crate::error::{Error, Result};
use crate::local_files::FileSystem;
use crate::output::{FileError, PackageReport, ReplacementMap};
use crate::yaml::{Document, Node, Path};

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<name>[a-z0-9][a-z0-9_.-]*/[a-z0-9][a-z0-9_.-]*)(?:\s+(?P<version>(?P<major>0|[1-9]\d*)(?:\.(?:0|[1-9]\d*)){2}))?$",
        )
        .expect("Invalid package reference pattern")
    })
}

/// A parsed `namespace/name [version]` call value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReference {
    pub original: String,
    pub name: String,
    pub version: Option<String>,
    pub major_version: Option<String>,
}

impl PackageReference {
    /// `None` for values that are not package references, such as embedded runs.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = reference_pattern().captures(text.trim())?;
        Some(Self {
            original: text.to_string(),
            name: caps["name"].to_string(),
            version: caps.name("version").map(|m| m.as_str().to_string()),
            major_version: caps.name("major").map(|m| m.as_str().to_string()),
        })
    }
}

// ============================================================================
// Version pickers
// ============================================================================

/// Chooses the version a reference should point at.
pub trait VersionPicker {
    fn pick(&self, versions: &PackageVersions, name: &str, major: Option<&str>) -> Result<String>;
}

/// Newest published version, whatever its major.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestMajor;

/// Newest version within the requested major.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestMinor;

impl VersionPicker for LatestMajor {
    fn pick(&self, versions: &PackageVersions, name: &str, _major: Option<&str>) -> Result<String> {
        versions.latest_major.get(name).cloned().ok_or_else(|| {
            Error::package_version_unresolved(
                name,
                None,
                format!("Unable to find the package `{}`", name),
            )
        })
    }
}

impl VersionPicker for LatestMinor {
    fn pick(&self, versions: &PackageVersions, name: &str, major: Option<&str>) -> Result<String> {
        let Some(major) = major else {
            return LatestMajor.pick(versions, name, None);
        };

        let majors = versions.latest_minor.get(name).ok_or_else(|| {
            Error::package_version_unresolved(
                name,
                Some(major.to_string()),
                format!("Unable to find the package `{}`", name),
            )
        })?;

        majors.get(major).cloned().ok_or_else(|| {
            Error::package_version_unresolved(
                name,
                Some(major.to_string()),
                format!("Unable to find major version {} for package `{}`", major, name),
            )
        })
    }
}

// ============================================================================
// Resolution
// ============================================================================

fn call_path(doc: &Document) -> Option<&'static str> {
    if doc.is_task_pipeline() {
        Some("$.tasks[*].call")
    } else if doc.is_task_list() {
        Some("$[*].call")
    } else {
        None
    }
}

/// Rewrite the package references of one document.
///
/// Returns whether anything changed. Picker failures are logged and the
/// reference is left alone; any other failure is returned before the
/// document is touched.
pub fn resolve_document(
    doc: &mut Document,
    versions: &PackageVersions,
    picker: &dyn VersionPicker,
    update: bool,
    replacements: &mut ReplacementMap,
) -> Result<bool> {
    let Some(calls) = call_path(doc) else {
        return Ok(false);
    };

    let mut edits: Vec<(Path, Node)> = Vec::new();
    doc.for_each(calls, |element| {
        let scalar = element.node().as_scalar().ok_or_else(|| {
            Error::yaml_structural_mismatch(
                element.path().to_string(),
                "scalar",
                element.node().kind_name(),
            )
        })?;

        let Some(reference) = PackageReference::parse(scalar.value()) else {
            return Ok(());
        };
        if reference.version.is_some() && !update {
            return Ok(());
        }

        let name = versions
            .renames
            .get(&reference.name)
            .cloned()
            .unwrap_or_else(|| reference.name.clone());

        let version = match picker.pick(versions, &name, reference.major_version.as_deref()) {
            Ok(version) => version,
            Err(e) => {
                log_status!("packages", "Warning: {}", e.message);
                return Ok(());
            }
        };

        let replacement = format!("{} {}", name, version);
        if replacement == scalar.value() {
            return Ok(());
        }

        let display = if name == reference.name {
            version
        } else {
            replacement.clone()
        };
        replacements.insert(reference.original.clone(), display);
        edits.push((
            element.path().clone(),
            Node::Scalar(scalar.restyled(&replacement)),
        ));
        Ok(())
    })?;

    let changed = !edits.is_empty();
    for (path, node) in edits {
        doc.replace_at(&path, node)?;
    }
    Ok(changed)
}

/// Resolve references across files, writing only once every file has been scanned.
///
/// The version table is fetched before any file is read. A structural error
/// in any file aborts the whole run with nothing written.
pub fn resolve_files(
    fs: &dyn FileSystem,
    catalog: &dyn PackageCatalog,
    targets: &[Target],
    picker: &dyn VersionPicker,
    update: bool,
) -> Result<PackageReport> {
    let versions = catalog.package_versions()?;
    let mut report = PackageReport::default();
    let mut pending: Vec<(PathBuf, Document)> = Vec::new();

    for target in targets {
        let text = fs.read(&target.path)?;
        let mut doc = match Document::parse(&text) {
            Ok(doc) => doc,
            Err(e) if !target.explicit => {
                log_status!(
                    "packages",
                    "Skipping {}: {}",
                    target.path.display(),
                    e.detail_text()
                );
                report.unparsable.push(FileError::new(&target.path, &e));
                continue;
            }
            Err(e) => return Err(e.with_hint(format!("File: {}", target.path.display()))),
        };

        let changed = resolve_document(&mut doc, &versions, picker, update, &mut report.replacements)
            .map_err(|e| e.with_hint(format!("File: {}", target.path.display())))?;
        if changed && doc.has_changes() {
            pending.push((target.path.clone(), doc));
        }
    }

    for (path, doc) in pending {
        doc.save_with(fs, &path)?;
        log_status!("packages", "Updated {}", path.display());
        report.written.push(path);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn versions() -> PackageVersions {
        PackageVersions {
            renames: BTreeMap::from([("mint/old-node".to_string(), "mint/setup-node".to_string())]),
            latest_major: BTreeMap::from([
                ("mint/setup-node".to_string(), "1.3.0".to_string()),
                ("mint/git-clone".to_string(), "2.0.1".to_string()),
            ]),
            latest_minor: BTreeMap::from([(
                "mint/setup-node".to_string(),
                BTreeMap::from([
                    ("1".to_string(), "1.3.0".to_string()),
                    ("0".to_string(), "0.9.2".to_string()),
                ]),
            )]),
        }
    }

    fn resolve(text: &str, picker: &dyn VersionPicker, update: bool) -> (Document, ReplacementMap, bool) {
        let mut doc = Document::parse(text).unwrap();
        let mut replacements = ReplacementMap::new();
        let changed = resolve_document(&mut doc, &versions(), picker, update, &mut replacements).unwrap();
        (doc, replacements, changed)
    }

    #[test]
    fn parses_references() {
        let r = PackageReference::parse("mint/setup-node 1.2.3").unwrap();
        assert_eq!(r.name, "mint/setup-node");
        assert_eq!(r.version.as_deref(), Some("1.2.3"));
        assert_eq!(r.major_version.as_deref(), Some("1"));

        let r = PackageReference::parse("mint/setup-node").unwrap();
        assert_eq!(r.version, None);

        assert!(PackageReference::parse("mint/setup-node 2").is_none());
        assert!(PackageReference::parse("mint/setup-node 2.1").is_none());

        assert!(PackageReference::parse("${{ run.mint-dir }}/tasks.yml").is_none());
        assert!(PackageReference::parse("setup-node").is_none());
        assert!(PackageReference::parse("mint/setup-node latest").is_none());
    }

    #[test]
    fn latest_major_ignores_requested_major() {
        assert_eq!(LatestMajor.pick(&versions(), "mint/setup-node", Some("0")).unwrap(), "1.3.0");
        let err = LatestMajor.pick(&versions(), "mint/unknown", None).unwrap_err();
        assert_eq!(err.code.as_str(), "package.version_unresolved");
    }

    #[test]
    fn latest_minor_stays_within_major() {
        let v = versions();
        assert_eq!(LatestMinor.pick(&v, "mint/setup-node", Some("0")).unwrap(), "0.9.2");
        assert_eq!(LatestMinor.pick(&v, "mint/setup-node", None).unwrap(), "1.3.0");
        assert!(LatestMinor.pick(&v, "mint/setup-node", Some("7")).is_err());
        assert!(LatestMinor.pick(&v, "mint/git-clone", Some("2")).is_err());
    }

    #[test]
    fn fills_in_missing_versions_only() {
        let (doc, replacements, changed) = resolve(
            "tasks:\n  - key: a\n    call: mint/setup-node # node\n  - key: b\n    call: mint/git-clone 1.0.0\n  - key: c\n    call: ${{ run.mint-dir }}/sub.yml\n",
            &LatestMajor,
            false,
        );
        assert!(changed);
        assert_eq!(
            doc.serialize(),
            "tasks:\n  - key: a\n    call: mint/setup-node 1.3.0 # node\n  - key: b\n    call: mint/git-clone 1.0.0\n  - key: c\n    call: ${{ run.mint-dir }}/sub.yml\n"
        );
        assert_eq!(replacements.len(), 1);
        assert_eq!(replacements["mint/setup-node"], "1.3.0");
    }

    #[test]
    fn resolving_twice_changes_nothing() {
        let (doc, _, _) = resolve("tasks:\n  - key: a\n    call: mint/setup-node\n", &LatestMajor, false);
        let (second, replacements, changed) = resolve(doc.serialize(), &LatestMajor, false);
        assert!(!changed);
        assert!(!second.has_changes());
        assert!(replacements.is_empty());
    }

    #[test]
    fn update_follows_renames_and_keeps_quotes() {
        let (doc, replacements, changed) = resolve(
            "- key: a\n  call: 'mint/old-node 0.1.0'\n",
            &LatestMinor,
            true,
        );
        assert!(changed);
        assert_eq!(doc.serialize(), "- key: a\n  call: 'mint/setup-node 0.9.2'\n");
        assert_eq!(replacements["mint/old-node 0.1.0"], "mint/setup-node 0.9.2");
    }

    #[test]
    fn partial_versions_are_not_references() {
        let text = "tasks:\n  - key: a\n    call: mint/setup-node 1\n  - key: b\n    call: mint/setup-node 0.9\n";
        let (doc, replacements, changed) = resolve(text, &LatestMinor, true);
        assert!(!changed);
        assert!(replacements.is_empty());
        assert_eq!(doc.serialize(), text);
    }

    #[test]
    fn picker_failures_leave_references_alone() {
        let (doc, replacements, changed) = resolve(
            "tasks:\n  - key: a\n    call: mint/unknown\n  - key: b\n    call: mint/setup-node\n",
            &LatestMajor,
            false,
        );
        assert!(changed);
        assert_eq!(doc.read("$.tasks[0].call").unwrap(), "mint/unknown");
        assert_eq!(doc.read("$.tasks[1].call").unwrap(), "mint/setup-node 1.3.0");
        assert_eq!(replacements.len(), 1);
    }

    #[test]
    fn non_scalar_calls_are_structural_errors() {
        let mut doc = Document::parse("tasks:\n  - key: a\n    call: mint/setup-node\n  - key: b\n    call:\n      nested: true\n").unwrap();
        let mut replacements = ReplacementMap::new();
        let err = resolve_document(&mut doc, &versions(), &LatestMajor, false, &mut replacements)
            .unwrap_err();
        assert_eq!(err.code.as_str(), "yaml.structural_mismatch");
        assert!(!doc.has_changes());
    }

    #[test]
    fn other_documents_are_ignored() {
        let (_, replacements, changed) = resolve("base:\n  image: x\n", &LatestMajor, false);
        assert!(!changed);
        assert!(replacements.is_empty());
    }
}
