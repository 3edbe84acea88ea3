//! Default base insertion.
//!
//! Pipelines without a `base` get the platform default, inserted right above
//! `tasks`. Every file is handled on its own: one failure is reported and the
//! rest still get updated.

use crate::catalog::{BaseCatalog, BaseSpec};
use crate::discovery::Target;
use crate::error::Result;
use crate::local_files::FileSystem;
use crate::output::BaseInsertReport;
use crate::yaml::{Document, Node};

/// Calls that interpolate a path run another pipeline file instead of a package.
fn is_embedded_run(task: &Node) -> bool {
    task.as_mapping()
        .and_then(|m| m.get("call"))
        .and_then(Node::as_str)
        .is_some_and(|call| call.contains("${{"))
}

/// A task pipeline without `base` where at least one task runs locally.
pub fn is_eligible(doc: &Document) -> bool {
    if !doc.is_task_pipeline() || doc.has_path("$.base") {
        return false;
    }

    doc.root()
        .and_then(Node::as_mapping)
        .and_then(|root| root.get("tasks"))
        .and_then(Node::as_sequence)
        .is_some_and(|tasks| tasks.items().iter().any(|t| !is_embedded_run(t.value())))
}

/// `{image, config}` plus `arch` when it is set and not the default.
pub fn base_node(spec: &BaseSpec, default_arch: &str) -> Node {
    let mut fields = vec![
        ("image", Node::string(spec.image.as_str())),
        ("config", Node::string(spec.config.as_str())),
    ];
    if !spec.arch.is_empty() && spec.arch != default_arch {
        fields.push(("arch", Node::string(spec.arch.as_str())));
    }
    Node::mapping(fields)
}

/// Insert `base` above `tasks`.
pub fn insert_base(doc: &mut Document, spec: &BaseSpec, default_arch: &str) -> Result<()> {
    doc.insert_before(
        "$.tasks",
        Node::mapping([("base", base_node(spec, default_arch))]),
    )
}

/// Add the default base to every eligible file.
///
/// The base is fetched once, and only when some file needs it. A failed
/// fetch is returned; per-file failures land in the report.
pub fn add_default_base(
    fs: &dyn FileSystem,
    catalog: &dyn BaseCatalog,
    targets: &[Target],
    default_arch: &str,
) -> Result<BaseInsertReport> {
    let mut report = BaseInsertReport::new();
    let mut base: Option<BaseSpec> = None;

    for target in targets {
        let path = target.path.as_path();
        let mut doc = match fs.read(path).and_then(|text| Document::parse(&text)) {
            Ok(doc) => doc,
            Err(e) => {
                report.record_error(path, &e);
                continue;
            }
        };

        if !is_eligible(&doc) {
            report.record_skipped(path);
            continue;
        }

        if base.is_none() {
            base = Some(catalog.default_base()?);
        }
        let Some(spec) = base.as_ref() else {
            continue;
        };

        let result = insert_base(&mut doc, spec, default_arch).and_then(|_| doc.save_with(fs, path));
        match result {
            Ok(()) => {
                log_status!("base", "Added base to {}", path.display());
                report.record_updated(path);
            }
            Err(e) => {
                log_status!("base", "Failed to update {}: {}", path.display(), e.detail_text());
                report.record_error(path, &e);
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gentoo() -> BaseSpec {
        BaseSpec {
            image: "gentoo 99".to_string(),
            config: "default".to_string(),
            arch: String::new(),
        }
    }

    #[test]
    fn inserts_base_above_tasks() {
        let mut doc = Document::parse("tasks:\n  - key: a\n  - key: b\n").unwrap();
        assert!(is_eligible(&doc));
        insert_base(&mut doc, &gentoo(), "x86_64").unwrap();
        assert_eq!(
            doc.serialize(),
            "base:\n  image: gentoo 99\n  config: default\n\ntasks:\n  - key: a\n  - key: b\n"
        );
    }

    #[test]
    fn arch_only_when_not_default() {
        let spec = BaseSpec {
            arch: "x86_64".to_string(),
            ..gentoo()
        };
        assert!(base_node(&spec, "x86_64").as_mapping().unwrap().get("arch").is_none());

        let spec = BaseSpec {
            arch: "arm64".to_string(),
            ..gentoo()
        };
        let node = base_node(&spec, "x86_64");
        assert_eq!(node.as_mapping().unwrap().get("arch").and_then(Node::as_str), Some("arm64"));
    }

    #[test]
    fn eligibility() {
        let eligible = |text: &str| is_eligible(&Document::parse(text).unwrap());
        assert!(eligible("tasks:\n  - key: a\n    call: ${{ run.dir }}/x.yml\n  - key: b\n"));
        assert!(!eligible("base:\n  image: x\ntasks:\n  - key: a\n"));
        assert!(!eligible("tasks:\n  - key: a\n    call: ${{ run.dir }}/x.yml\n"));
        assert!(!eligible("tasks: []\n"));
        assert!(!eligible("- key: a\n"));
        assert!(!eligible("on:\n  cli: {}\n"));
    }

    #[test]
    fn keeps_comment_block_with_tasks() {
        let mut doc =
            Document::parse("on:\n  cli:\n    init: {}\n\n# Build steps\n# run in order\ntasks:\n  - key: a\n")
                .unwrap();
        insert_base(&mut doc, &gentoo(), "x86_64").unwrap();
        assert_eq!(
            doc.serialize(),
            "on:\n  cli:\n    init: {}\n\nbase:\n  image: gentoo 99\n  config: default\n\n# Build steps\n# run in order\ntasks:\n  - key: a\n"
        );
    }
}
