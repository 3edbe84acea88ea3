//! Format-preserving YAML documents and path-addressed edits.
//!
//! - `node` - Tree model carrying comments, blank lines and indentation
//! - `parser` - Text to tree
//! - `emit` - Tree to text
//! - `path` - `$.tasks[*].call` style addressing
//!
//! A `Document` caches two serializations: the baseline taken right after
//! parsing and the current one, recomputed lazily after each edit.
//! `has_changes()` compares the two, so only real edits cause a write.

mod emit;
mod node;
mod parser;
mod path;

pub use node::{
    CollectionStyle, Entry, Item, Mapping, Node, Scalar, ScalarStyle, Sequence, Trivia,
};
pub use path::{Path, Step};

use std::cell::OnceCell;

use crate::error::{Error, Result};
use crate::local_files::{self, FileSystem};
use node::Stream;

/// A parsed YAML file.
#[derive(Debug)]
pub struct Document {
    stream: Stream,
    baseline: String,
    current: OnceCell<String>,
}

/// One element visited by [`Document::for_each`].
#[derive(Debug)]
pub struct Element<'a> {
    path: Path,
    node: &'a Node,
}

impl<'a> Element<'a> {
    /// Concrete path of this element, usable with the mutation methods.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }
}

impl Document {
    pub fn parse(text: &str) -> Result<Self> {
        let stream = parser::parse_stream(text)?;
        let baseline = emit::emit_stream(&stream);
        Ok(Self {
            stream,
            baseline,
            current: OnceCell::new(),
        })
    }

    pub fn load(fs: &dyn FileSystem, path: &std::path::Path) -> Result<Self> {
        let text = fs.read(path)?;
        Self::parse(&text)
    }

    /// Current YAML text. Cached until the next edit.
    pub fn serialize(&self) -> &str {
        self.current
            .get_or_init(|| emit::emit_stream(&self.stream))
    }

    pub fn has_changes(&self) -> bool {
        self.serialize() != self.baseline
    }

    /// Write to `path`, keeping the permission bits of an existing file.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        self.save_with(&local_files::local(), path)
    }

    pub fn save_with(&self, fs: &dyn FileSystem, path: &std::path::Path) -> Result<()> {
        fs.write(path, self.serialize())
    }

    pub fn root(&self) -> Option<&Node> {
        self.stream.root()
    }

    /// Single mapping document with a `tasks` field.
    pub fn is_task_pipeline(&self) -> bool {
        self.stream.is_single()
            && matches!(self.stream.root(), Some(Node::Mapping(m)) if m.contains_key("tasks"))
    }

    /// Single document whose root is a sequence.
    pub fn is_task_list(&self) -> bool {
        self.stream.is_single() && matches!(self.stream.root(), Some(Node::Sequence(_)))
    }

    fn touch(&mut self) {
        self.current.take();
    }

    /// Flow collections on the way to `path` no longer match their source text.
    fn edited(&mut self, path: &Path) {
        if let Some(root) = self.stream.root_mut() {
            forget_flow_sources(root, path.steps());
        }
        self.touch();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn select(&self, path: &Path) -> Result<Vec<(Path, &Node)>> {
        let root = self
            .stream
            .root()
            .ok_or_else(|| Error::yaml_path_not_found(path.to_string()))?;
        let mut matches = Vec::new();
        select(root, path.steps(), Path::root(), &mut matches)?;
        Ok(matches)
    }

    /// Scalar value, or YAML text of a collection. Wildcards yield a sequence of matches.
    pub fn read(&self, expr: &str) -> Result<String> {
        let path = Path::parse(expr)?;
        let matches = self.select(&path)?;
        match matches.as_slice() {
            [] => Err(Error::yaml_path_not_found(path.to_string())),
            [(_, node)] => Ok(node_text(node)),
            many => {
                let nodes = many.iter().map(|(_, n)| (*n).clone());
                Ok(node_text(&Node::sequence(nodes)))
            }
        }
    }

    /// Like [`read`](Self::read) but returns an empty string on any error.
    pub fn try_read(&self, expr: &str) -> String {
        self.read(expr).unwrap_or_default()
    }

    pub fn has_path(&self, expr: &str) -> bool {
        Path::parse(expr)
            .and_then(|path| self.select(&path))
            .is_ok_and(|m| !m.is_empty())
    }

    /// Visit every non-null element of the sequence at `expr`, or every match of a wildcard path.
    ///
    /// A structural mismatch while resolving `expr` means there is nothing to
    /// visit. Stops at the first error returned by `f`.
    pub fn for_each<F>(&self, expr: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&Element<'_>) -> Result<()>,
    {
        let path = Path::parse(expr)?;
        let matches = match self.select(&path) {
            Ok(matches) => matches,
            Err(e) if e.is_structural_mismatch() => return Ok(()),
            Err(e) => return Err(e),
        };

        let elements: Vec<(Path, &Node)> = if path.has_wildcard() {
            matches
        } else {
            match matches.into_iter().next() {
                Some((at, Node::Sequence(seq))) => seq
                    .items()
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (at.index(i), item.value()))
                    .collect(),
                _ => return Ok(()),
            }
        };

        for (path, node) in elements {
            if node.is_null() {
                continue;
            }
            f(&Element { path, node })?;
        }
        Ok(())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    fn node_mut(&mut self, path: &Path) -> Result<&mut Node> {
        if path.has_wildcard() {
            return Err(Error::yaml_path_invalid(
                path.to_string(),
                "wildcards cannot be used to edit a document",
            ));
        }
        let root = self
            .stream
            .root_mut()
            .ok_or_else(|| Error::yaml_path_not_found(path.to_string()))?;
        resolve_mut(root, path.steps())
    }

    fn merge_at(&mut self, path: &Path, incoming: Mapping) -> Result<()> {
        match self.node_mut(path)? {
            Node::Mapping(mapping) => mapping.merge(incoming),
            other => {
                return Err(Error::yaml_path_not_found(path.to_string()).with_hint(format!(
                    "{} holds a {}, not a mapping",
                    path,
                    other.kind_name()
                )))
            }
        }
        self.edited(path);
        Ok(())
    }

    /// Merge the fields of `value` into the mapping at `expr`.
    ///
    /// Existing fields with the same name are overwritten. Every other field,
    /// and the comments attached to it, is left alone.
    pub fn merge(&mut self, expr: &str, value: Node) -> Result<()> {
        let incoming = expect_mapping(value)?;
        let path = Path::parse(expr)?;
        self.merge_at(&path, incoming)
    }

    /// Replace the existing node at `expr`.
    pub fn replace(&mut self, expr: &str, value: Node) -> Result<()> {
        let path = Path::parse(expr)?;
        self.replace_at(&path, value)
    }

    pub fn replace_at(&mut self, path: &Path, mut value: Node) -> Result<()> {
        let target = self.node_mut(path)?;
        if let (Some(indent), Some(_)) = (target.indent(), value.indent()) {
            value.set_indent(indent);
        }
        *target = value;
        self.edited(path);
        Ok(())
    }

    /// Create or overwrite the named child `field` of `parent` (`expr = parent.field`).
    pub fn set(&mut self, expr: &str, value: Node) -> Result<()> {
        let path = Path::parse(expr)?;
        let Some((parent, Step::Field(field))) = path.split_last() else {
            return Err(Error::yaml_path_invalid(
                expr,
                "set requires a path ending in a field name",
            ));
        };
        let mut incoming = Mapping::new();
        incoming.insert(field.clone(), value);
        self.merge_at(&parent, incoming)
    }

    /// Insert the fields of `value` as root fields directly above `root_field`.
    ///
    /// The new fields go above the whole comment block that leads `root_field`,
    /// and one blank line separates them from it.
    pub fn insert_before(&mut self, root_field: &str, value: Node) -> Result<()> {
        let path = Path::parse(root_field)?;
        let [Step::Field(anchor)] = path.steps() else {
            return Err(Error::yaml_path_invalid(
                root_field,
                "only a single root-level field can anchor an insertion",
            ));
        };
        let incoming = expect_mapping(value)?;
        let root = self.root_mapping_mut()?;

        let index = root
            .position(anchor)
            .ok_or_else(|| Error::yaml_path_not_found(path.to_string()))?;
        if let Some(existing) = incoming.keys().find(|k| root.contains_key(k)) {
            return Err(Error::validation_invalid_argument(
                "value",
                format!("Field `{}` already exists", existing),
            ));
        }
        if incoming.is_empty() {
            return Ok(());
        }

        let anchor_entry = &mut root.entries[index];
        let split = anchor_entry
            .leading
            .iter()
            .position(Trivia::is_comment)
            .unwrap_or(anchor_entry.leading.len());
        let above: Vec<Trivia> = anchor_entry.leading.drain(..split).collect();
        anchor_entry.leading.insert(0, Trivia::Blank);

        let mut entries = incoming.entries;
        if let Some(first) = entries.first_mut() {
            let own = std::mem::take(&mut first.leading);
            first.leading = above.into_iter().chain(own).collect();
        }
        root.entries.splice(index..index, entries);
        root.style = CollectionStyle::Block;
        self.touch();
        Ok(())
    }

    /// Insert the fields of `value` above all existing content, separated by one blank line.
    pub fn prepend(&mut self, value: Node) -> Result<()> {
        let incoming = expect_mapping(value)?;
        if self.stream.root().is_none() {
            if let Some(doc) = self.stream.docs.first_mut() {
                doc.node = Some(Node::Mapping(Mapping {
                    indent: 0,
                    ..incoming
                }));
            }
            self.touch();
            return Ok(());
        }

        let root = self.root_mapping_mut()?;
        if let Some(existing) = incoming.keys().find(|k| root.contains_key(k)) {
            return Err(Error::validation_invalid_argument(
                "value",
                format!("Field `{}` already exists", existing),
            ));
        }
        if let Some(first) = root.entries.first_mut() {
            first.leading.insert(0, Trivia::Blank);
        }
        root.entries.splice(0..0, incoming.entries);
        root.style = CollectionStyle::Block;
        self.touch();
        Ok(())
    }

    fn root_mapping_mut(&mut self) -> Result<&mut Mapping> {
        match self.stream.root_mut() {
            Some(Node::Mapping(m)) => Ok(m),
            Some(other) => Err(Error::yaml_structural_mismatch(
                "$",
                "mapping",
                other.kind_name(),
            )),
            None => Err(Error::yaml_path_not_found("$")),
        }
    }
}

fn expect_mapping(value: Node) -> Result<Mapping> {
    match value {
        Node::Mapping(m) => Ok(m),
        other => Err(Error::yaml_structural_mismatch(
            "value",
            "mapping",
            other.kind_name(),
        )),
    }
}

fn node_text(node: &Node) -> String {
    match node {
        Node::Scalar(s) if s.is_null() => String::new(),
        Node::Scalar(s) => s.value().to_string(),
        _ => emit::emit_node(node).trim_end_matches('\n').to_string(),
    }
}

fn select<'a>(
    node: &'a Node,
    steps: &[Step],
    at: Path,
    out: &mut Vec<(Path, &'a Node)>,
) -> Result<()> {
    let Some((step, rest)) = steps.split_first() else {
        out.push((at, node));
        return Ok(());
    };

    match step {
        Step::Field(name) => {
            let Node::Mapping(mapping) = node else {
                return Err(Error::yaml_structural_mismatch(
                    at.to_string(),
                    "mapping",
                    node.kind_name(),
                ));
            };
            let at = at.field(name.clone());
            let child = mapping
                .get(name)
                .ok_or_else(|| Error::yaml_path_not_found(at.to_string()))?;
            select(child, rest, at, out)
        }
        Step::Index(index) => {
            let Node::Sequence(sequence) = node else {
                return Err(Error::yaml_structural_mismatch(
                    at.to_string(),
                    "sequence",
                    node.kind_name(),
                ));
            };
            let at = at.index(*index);
            let child = sequence
                .get(*index)
                .ok_or_else(|| Error::yaml_path_not_found(at.to_string()))?;
            select(child, rest, at, out)
        }
        Step::Wildcard => {
            let Node::Sequence(sequence) = node else {
                return Err(Error::yaml_structural_mismatch(
                    at.to_string(),
                    "sequence",
                    node.kind_name(),
                ));
            };
            for (i, item) in sequence.items().iter().enumerate() {
                match select(item.value(), rest, at.index(i), out) {
                    Ok(()) => {}
                    // Elements lacking the rest of the path are not matches.
                    Err(e)
                        if e.is_structural_mismatch()
                            || e.code == crate::error::ErrorCode::YamlPathNotFound => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        }
    }
}

fn forget_flow_sources(root: &mut Node, steps: &[Step]) {
    let mut current = root;
    for step in steps {
        current.forget_source();
        let next = match (step, current) {
            (Step::Field(name), Node::Mapping(mapping)) => mapping.get_mut(name),
            (Step::Index(index), Node::Sequence(sequence)) => {
                sequence.items.get_mut(*index).map(|item| &mut item.value)
            }
            _ => None,
        };
        let Some(next) = next else {
            return;
        };
        current = next;
    }
    current.forget_source();
}

fn resolve_mut<'a>(root: &'a mut Node, steps: &[Step]) -> Result<&'a mut Node> {
    let mut current = root;
    let mut at = Path::root();

    for step in steps {
        current = match (step, current) {
            (Step::Field(name), Node::Mapping(mapping)) => {
                at = at.field(name.clone());
                mapping
                    .get_mut(name)
                    .ok_or_else(|| Error::yaml_path_not_found(at.to_string()))?
            }
            (Step::Index(index), Node::Sequence(sequence)) => {
                at = at.index(*index);
                sequence
                    .items
                    .get_mut(*index)
                    .map(|item| &mut item.value)
                    .ok_or_else(|| Error::yaml_path_not_found(at.to_string()))?
            }
            (Step::Field(_), other) => {
                return Err(Error::yaml_structural_mismatch(
                    at.to_string(),
                    "mapping",
                    other.kind_name(),
                ))
            }
            (Step::Index(_), other) => {
                return Err(Error::yaml_structural_mismatch(
                    at.to_string(),
                    "sequence",
                    other.kind_name(),
                ))
            }
            (Step::Wildcard, _) => {
                return Err(Error::yaml_path_invalid(
                    at.to_string(),
                    "wildcards cannot be used to edit a document",
                ))
            }
        };
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::parse(text).unwrap()
    }

    #[test]
    fn reparsing_serialized_output_is_stable() {
        let text = "tasks:\n    - key: a   # first\n      run:   echo a\n\n\n    - key: b\n";
        let first = doc(text);
        let second = doc(first.serialize());
        let third = doc(second.serialize());
        assert!(!second.has_changes());
        assert!(!third.has_changes());
        assert_eq!(second.serialize(), third.serialize());
    }

    #[test]
    fn untouched_documents_report_no_changes() {
        let d = doc("# comment\ntasks:\n  - key: a\n");
        assert!(!d.has_changes());
    }

    #[test]
    fn classifies_documents() {
        assert!(doc("tasks:\n  - key: a\n").is_task_pipeline());
        assert!(!doc("tasks:\n  - key: a\n").is_task_list());
        assert!(doc("- key: a\n").is_task_list());
        assert!(!doc("base:\n  image: x\n").is_task_pipeline());
        assert!(!doc("tasks: []\n---\ntasks: []\n").is_task_pipeline());
        assert!(!doc("- a\n---\n- b\n").is_task_list());
        assert!(!doc("").is_task_pipeline());
    }

    #[test]
    fn read_returns_values_and_collections() {
        let d = doc("base:\n  image: \"ubuntu 24.04\"\n  config: none\ntasks:\n  - key: a\n  - key: b\n");
        assert_eq!(d.read("$.base.image").unwrap(), "ubuntu 24.04");
        assert_eq!(d.read("$.base").unwrap(), "image: \"ubuntu 24.04\"\nconfig: none");
        assert_eq!(d.read("$.tasks[1].key").unwrap(), "b");
        assert_eq!(d.read("$.tasks[*].key").unwrap(), "- a\n- b");
        assert_eq!(
            d.read("$.base.arch").unwrap_err().code.as_str(),
            "yaml.path_not_found"
        );
        assert_eq!(d.try_read("$.base.arch"), "");
        assert!(d.has_path("$.tasks[0]"));
        assert!(!d.has_path("$.tasks[5]"));
    }

    #[test]
    fn flow_collections_are_rewritten_only_when_edited() {
        let mut d = doc("outer: { inner: [ x, y ] }\nlist: [ a,  b ]\n");
        d.set("$.name", Node::string("ci")).unwrap();
        assert_eq!(
            d.serialize(),
            "outer: { inner: [ x, y ] }\nlist: [ a,  b ]\nname: ci\n"
        );

        assert!(d.replace("$.list[7]", Node::string("z")).is_err());
        d.replace("$.outer.inner[0]", Node::string("z")).unwrap();
        assert_eq!(
            d.serialize(),
            "outer: {inner: [z, y]}\nlist: [ a,  b ]\nname: ci\n"
        );
    }

    #[test]
    fn merge_overwrites_named_fields_only() {
        let mut d = doc("parent:\n  p:\n    # keep me\n    a: 1\n    b: 2\n  sibling: x\n");
        d.merge("$.parent.p", Node::parse("b: 3\nc: 4\n").unwrap())
            .unwrap();
        assert_eq!(
            d.serialize(),
            "parent:\n  p:\n    # keep me\n    a: 1\n    b: 3\n    c: 4\n  sibling: x\n"
        );
        assert!(d.has_changes());
    }

    #[test]
    fn set_replaces_the_whole_subtree() {
        let mut d = doc("parent:\n  p:\n    a: 1\n    b: 2\n  sibling: x\n");
        d.set("$.parent.p", Node::parse("c: 4\n").unwrap()).unwrap();
        assert_eq!(d.serialize(), "parent:\n  p:\n    c: 4\n  sibling: x\n");

        d.set("$.parent.q", Node::string("new")).unwrap();
        assert_eq!(d.read("$.parent.q").unwrap(), "new");
    }

    #[test]
    fn merge_requires_existing_mapping() {
        let mut d = doc("a:\n  b: 1\nc: scalar\n");
        let missing = d.merge("$.x", Node::parse("k: v").unwrap()).unwrap_err();
        assert_eq!(missing.code.as_str(), "yaml.path_not_found");
        let scalar = d.merge("$.c", Node::parse("k: v").unwrap()).unwrap_err();
        assert_eq!(scalar.code.as_str(), "yaml.path_not_found");
        let not_mapping = d.merge("$.a", Node::string("v")).unwrap_err();
        assert_eq!(not_mapping.code.as_str(), "yaml.structural_mismatch");
        assert!(!d.has_changes());
    }

    #[test]
    fn replace_keeps_surrounding_comments() {
        let mut d = doc("tasks:\n  # setup\n  - key: a\n    call: mint/setup-node 1.0.0 # pinned\n");
        d.replace("$.tasks[0].call", Node::string("mint/setup-node 1.2.0"))
            .unwrap();
        assert_eq!(
            d.serialize(),
            "tasks:\n  # setup\n  - key: a\n    call: mint/setup-node 1.2.0 # pinned\n"
        );
        assert!(d.replace("$.tasks[3].call", Node::string("x")).is_err());
    }

    #[test]
    fn insert_before_moves_above_leading_comment_block() {
        let mut d = doc("on:\n  cli: {}\n\n# Tasks\n\n# more\ntasks:\n  - key: a\n");
        d.insert_before(
            "$.tasks",
            Node::parse("base:\n  image: x\n").unwrap(),
        )
        .unwrap();
        assert_eq!(
            d.serialize(),
            "on:\n  cli: {}\n\nbase:\n  image: x\n\n# Tasks\n\n# more\ntasks:\n  - key: a\n"
        );
    }

    #[test]
    fn insert_before_does_not_skip_uncommented_blank_lines() {
        let mut d = doc("on:\n  cli: {}\n\ntasks:\n  - key: a\n");
        d.insert_before("$.tasks", Node::parse("base:\n  image: x\n").unwrap())
            .unwrap();
        assert_eq!(
            d.serialize(),
            "on:\n  cli: {}\n\nbase:\n  image: x\n\ntasks:\n  - key: a\n"
        );
    }

    #[test]
    fn insert_before_rejects_nested_anchors() {
        let mut d = doc("a:\n  b: 1\n");
        let err = d
            .insert_before("$.a.b", Node::parse("c: 1").unwrap())
            .unwrap_err();
        assert_eq!(err.code.as_str(), "yaml.path_invalid");
    }

    #[test]
    fn for_each_visits_non_null_elements() {
        let d = doc("tasks:\n  - key: a\n    call: mint/a\n  - key: b\n  - key: c\n    call: mint/c 1.0.0\n  -\n");
        let mut seen = Vec::new();
        d.for_each("$.tasks[*].call", |el| {
            seen.push((el.path().to_string(), el.node().as_str().unwrap_or("").to_string()));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                ("$.tasks[0].call".to_string(), "mint/a".to_string()),
                ("$.tasks[2].call".to_string(), "mint/c 1.0.0".to_string()),
            ]
        );

        let mut count = 0;
        d.for_each("$.tasks", |_| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn for_each_treats_mismatch_as_empty_and_propagates_others() {
        let d = doc("tasks: nope\n");
        assert!(d.for_each("$.tasks[*].call", |_| Ok(())).is_ok());
        assert!(d.for_each("$.tasks", |_| Ok(())).is_ok());
        let err = d.for_each("$.missing[*]", |_| Ok(())).unwrap_err();
        assert_eq!(err.code.as_str(), "yaml.path_not_found");
    }

    #[test]
    fn for_each_stops_at_first_error() {
        let d = doc("- a\n- b\n- c\n");
        let mut visited = 0;
        let result = d.for_each("$", |el| {
            visited += 1;
            if el.node().as_str() == Some("b") {
                return Err(Error::other("stop"));
            }
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(visited, 2);
    }

    #[test]
    fn prepend_adds_fields_above_everything() {
        let mut d = doc("# pipeline\ntasks:\n  - key: a\n");
        d.prepend(Node::parse("on:\n  cli:\n    init: {}\n").unwrap())
            .unwrap();
        assert_eq!(
            d.serialize(),
            "on:\n  cli:\n    init: {}\n\n# pipeline\ntasks:\n  - key: a\n"
        );
    }
}
