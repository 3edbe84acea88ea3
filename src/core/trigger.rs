//! Keep the CLI trigger's init params in line with the git-driven triggers.
//!
//! Pipelines started by a push get the commit from `event.git.*`. When the
//! same pipeline is started from the command line, `on.cli.init` has to
//! declare those params too, otherwise `git/clone` tasks have nothing to
//! check out.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::local_files::FileSystem;
use crate::packages::PackageReference;
use crate::yaml::{Document, Mapping, Node};

/// Init value the CLI trigger uses for git-derived params.
pub const CURRENT_COMMIT: &str = "${{ event.git.sha }}";

fn git_expression() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{\{\s*event\.git\.(?:sha|ref)\s*\}\}").expect("Invalid git expression pattern")
    })
}

fn init_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\$\{\{\s*init\.([A-Za-z0-9_-]+)\s*\}\}$").expect("Invalid init reference pattern")
    })
}

fn is_git_value(node: &Node) -> bool {
    node.as_str().is_some_and(|v| git_expression().is_match(v))
}

fn push_unique(params: &mut Vec<String>, param: &str) {
    if !params.iter().any(|p| p == param) {
        params.push(param.to_string());
    }
}

fn root_mapping(doc: &Document) -> Option<&Mapping> {
    doc.root().and_then(Node::as_mapping)
}

/// Init params of every non-CLI trigger whose value comes from git.
pub fn git_trigger_params(doc: &Document) -> Vec<String> {
    let mut params = Vec::new();
    let Some(on) = root_mapping(doc).and_then(|r| r.get("on")).and_then(Node::as_mapping) else {
        return params;
    };

    for entry in on.entries() {
        if entry.key() != "cli" {
            collect_init_params(entry.value(), &mut params);
        }
    }
    params
}

fn collect_init_params(node: &Node, params: &mut Vec<String>) {
    match node {
        Node::Mapping(mapping) => {
            for entry in mapping.entries() {
                match (entry.key(), entry.value()) {
                    ("init", Node::Mapping(init)) => {
                        for param in init.entries() {
                            if is_git_value(param.value()) {
                                push_unique(params, param.key());
                            }
                        }
                    }
                    (_, value) => collect_init_params(value, params),
                }
            }
        }
        Node::Sequence(sequence) => {
            for item in sequence.items() {
                collect_init_params(item.value(), params);
            }
        }
        Node::Scalar(_) => {}
    }
}

fn is_git_clone(call: &str) -> bool {
    PackageReference::parse(call)
        .is_some_and(|r| r.name == "git/clone" || r.name.ends_with("/git-clone"))
}

/// The init param `git/clone` tasks check out, if any.
///
/// Fails when clone tasks disagree on the param.
pub fn clone_ref_param(doc: &Document) -> Result<Option<String>> {
    if !doc.is_task_pipeline() {
        return Ok(None);
    }

    let mut params = Vec::new();
    doc.for_each("$.tasks", |task| {
        let Some(task) = task.node().as_mapping() else {
            return Ok(());
        };
        if !task.get("call").and_then(Node::as_str).is_some_and(is_git_clone) {
            return Ok(());
        }

        let reference = task
            .get("with")
            .and_then(Node::as_mapping)
            .and_then(|with| with.get("ref"))
            .and_then(Node::as_str)
            .and_then(|r| init_reference().captures(r.trim()));
        if let Some(caps) = reference {
            push_unique(&mut params, &caps[1]);
        }
        Ok(())
    })?;

    match params.len() {
        0 => Ok(None),
        1 => Ok(params.pop()),
        _ => Err(Error::trigger_ambiguous_ref(params)),
    }
}

fn cli_has_git_param(doc: &Document) -> bool {
    root_mapping(doc)
        .and_then(|r| r.get("on"))
        .and_then(Node::as_mapping)
        .and_then(|on| on.get("cli"))
        .and_then(Node::as_mapping)
        .and_then(|cli| cli.get("init"))
        .and_then(Node::as_mapping)
        .is_some_and(|init| init.entries().iter().any(|e| is_git_value(e.value())))
}

/// Deepest level of `on.cli.init` that can take the new params.
enum CliEdit {
    PrependOn,
    SetOn,
    SetCli,
    SetInit,
    MergeInit,
}

fn cli_edit(doc: &Document) -> CliEdit {
    let Some(on) = root_mapping(doc).and_then(|r| r.get("on")) else {
        return CliEdit::PrependOn;
    };
    let Some(on) = on.as_mapping() else {
        return CliEdit::SetOn;
    };
    let Some(cli) = on.get("cli").and_then(Node::as_mapping) else {
        return CliEdit::SetCli;
    };
    match cli.get("init") {
        Some(Node::Mapping(_)) => CliEdit::MergeInit,
        _ => CliEdit::SetInit,
    }
}

/// Add the git-derived init params to `on.cli.init`.
///
/// Returns `true` when the document was changed. Documents whose CLI
/// trigger already carries a git param, or that declare none, are left
/// alone.
pub fn sync_cli_trigger(doc: &mut Document) -> Result<bool> {
    if doc.root().is_some() && root_mapping(doc).is_none() {
        return Ok(false);
    }

    let mut params = git_trigger_params(doc);
    if let Some(param) = clone_ref_param(doc)? {
        push_unique(&mut params, &param);
    }

    if params.is_empty() || cli_has_git_param(doc) {
        return Ok(false);
    }

    let init = Node::mapping(params.iter().map(|p| (p.as_str(), Node::string(CURRENT_COMMIT))));
    match cli_edit(doc) {
        CliEdit::PrependOn => doc.prepend(Node::mapping([(
            "on",
            Node::mapping([("cli", Node::mapping([("init", init)]))]),
        )]))?,
        CliEdit::SetOn => doc.set(
            "$.on",
            Node::mapping([("cli", Node::mapping([("init", init)]))]),
        )?,
        CliEdit::SetCli => doc.set("$.on.cli", Node::mapping([("init", init)]))?,
        CliEdit::SetInit => doc.set("$.on.cli.init", init)?,
        CliEdit::MergeInit => doc.merge("$.on.cli.init", init)?,
    }

    Ok(true)
}

/// Sync the CLI trigger of the file at `path`, saving only when it changed.
pub fn sync_cli_trigger_file(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    let text = fs.read(path)?;
    let mut doc = Document::parse(&text)?;
    if !sync_cli_trigger(&mut doc)? || !doc.has_changes() {
        return Ok(false);
    }

    doc.save_with(fs, path)?;
    log_status!("trigger", "Updated CLI trigger in {}", path.display());
    Ok(true)
}
