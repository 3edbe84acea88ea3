//! Format-preserving YAML tree.
//!
//! Every collection remembers its indentation relative to the line that owns
//! it, and every entry/item carries the comment and blank lines that preceded
//! it in the source. Emission walks the tree and writes that trivia back
//! verbatim, so untouched content survives an edit elsewhere in the document.

use crate::error::{Error, Result};

/// A comment or blank line attached above an entry, item or document end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trivia {
    Blank,
    /// `offset` is the comment column relative to the column of the line it precedes.
    Comment { offset: isize, text: String },
}

impl Trivia {
    pub fn is_comment(&self) -> bool {
        matches!(self, Trivia::Comment { .. })
    }
}

/// A continuation line of a multi-line scalar, relative to the owner column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailLine {
    pub(crate) offset: usize,
    pub(crate) text: String,
}

/// A flow collection exactly as it was written, kept until it is edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FlowSource {
    /// Text from the opening bracket to the end of the owner line.
    pub(crate) first: String,
    pub(crate) tail: Vec<TailLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStyle {
    Block,
    Flow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub(crate) style: ScalarStyle,
    pub(crate) props: Option<String>,
    /// Text written on the owner line. For block scalars this is the header (`|-`, `>2`).
    pub(crate) raw: String,
    pub(crate) tail: Vec<TailLine>,
    pub(crate) value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub(crate) leading: Vec<Trivia>,
    pub(crate) key: Scalar,
    /// Inline comment, verbatim including the whitespace before `#`.
    pub(crate) comment: Option<String>,
    pub(crate) value: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub(crate) leading: Vec<Trivia>,
    pub(crate) comment: Option<String>,
    pub(crate) value: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub(crate) style: CollectionStyle,
    pub(crate) props: Option<String>,
    pub(crate) indent: usize,
    pub(crate) entries: Vec<Entry>,
    pub(crate) source: Option<FlowSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub(crate) style: CollectionStyle,
    pub(crate) props: Option<String>,
    pub(crate) indent: usize,
    pub(crate) items: Vec<Item>,
    pub(crate) source: Option<FlowSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Mapping(Mapping),
    Sequence(Sequence),
}

/// One document of a YAML stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Root {
    /// Directives, `---` marker and anything above it, verbatim.
    pub(crate) head: Vec<String>,
    pub(crate) node: Option<Node>,
    pub(crate) trailing: Vec<Trivia>,
    /// `...` marker, verbatim.
    pub(crate) end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stream {
    pub(crate) docs: Vec<Root>,
    /// Lines after the final `...` that start no new document.
    pub(crate) tail: Vec<String>,
}

impl Stream {
    pub fn root(&self) -> Option<&Node> {
        self.docs.first().and_then(|d| d.node.as_ref())
    }

    pub fn root_mut(&mut self) -> Option<&mut Node> {
        self.docs.first_mut().and_then(|d| d.node.as_mut())
    }

    pub fn is_single(&self) -> bool {
        self.docs.len() == 1
    }
}

// ============================================================================
// Scalars
// ============================================================================

const RESERVED_PLAIN: &[&str] = &[
    "", "~", "null", "Null", "NULL", "true", "True", "TRUE", "false", "False", "FALSE", "yes",
    "Yes", "YES", "no", "No", "NO", "on", "On", "ON", "off", "Off", "OFF",
];

/// YAML 1.1 booleans. Quoted as values, but plain as keys (`on:`).
const LEGACY_BOOLEANS: &[&str] = &[
    "yes", "Yes", "YES", "no", "No", "NO", "on", "On", "ON", "off", "Off", "OFF",
];

fn looks_numeric(value: &str) -> bool {
    let v = value.strip_prefix(['-', '+']).unwrap_or(value);
    if v.is_empty() {
        return false;
    }
    if v.starts_with("0x") || v.starts_with("0o") {
        return true;
    }
    if matches!(v, ".inf" | ".Inf" | ".INF" | ".nan" | ".NaN" | ".NAN") {
        return true;
    }
    let mut dots = 0;
    let mut digits = 0;
    for c in v.chars() {
        match c {
            '0'..='9' | '_' => digits += 1,
            '.' => dots += 1,
            'e' | 'E' => {}
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

/// True when `value` can be written as a plain scalar and read back as the same string.
pub(crate) fn is_plain_safe(value: &str) -> bool {
    if RESERVED_PLAIN.contains(&value) || looks_numeric(value) {
        return false;
    }
    if value.trim() != value || value.contains('\n') || value.contains('\t') {
        return false;
    }
    let first = value.chars().next().unwrap_or(' ');
    if "-?:,[]{}#&*!|>'\"%@`".contains(first) {
        // `-x` and `:x` are fine as plain text, but keep it simple and quote.
        return false;
    }
    if value.contains(": ") || value.contains(" #") || value.ends_with(':') {
        return false;
    }
    true
}

fn double_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl Scalar {
    pub(crate) fn new(style: ScalarStyle, raw: String, tail: Vec<TailLine>, value: String) -> Self {
        Self {
            style,
            props: None,
            raw,
            tail,
            value,
        }
    }

    /// A string scalar, plain when that reads back unchanged, double-quoted otherwise.
    pub fn string(value: impl Into<String>) -> Self {
        let value = value.into();
        let raw = if is_plain_safe(&value) {
            value.clone()
        } else {
            double_quote(&value)
        };
        let style = if raw.starts_with('"') {
            ScalarStyle::DoubleQuoted
        } else {
            ScalarStyle::Plain
        };
        Self::new(style, raw, Vec::new(), value)
    }

    /// A mapping key. Like [`string`](Self::string), except legacy booleans stay plain.
    pub fn key(name: impl Into<String>) -> Self {
        let name = name.into();
        if LEGACY_BOOLEANS.contains(&name.as_str()) {
            return Self::new(ScalarStyle::Plain, name.clone(), Vec::new(), name);
        }
        Self::string(name)
    }

    pub fn null() -> Self {
        Self::new(ScalarStyle::Plain, String::new(), Vec::new(), String::new())
    }

    /// Same quoting style and properties, different value.
    pub fn restyled(&self, value: &str) -> Self {
        let raw = match self.style {
            ScalarStyle::Plain if is_plain_safe(value) => value.to_string(),
            ScalarStyle::SingleQuoted if !value.contains('\n') => single_quote(value),
            ScalarStyle::DoubleQuoted => double_quote(value),
            _ => return Self {
                props: self.props.clone(),
                ..Self::string(value)
            },
        };
        Self {
            style: self.style,
            props: self.props.clone(),
            raw,
            tail: Vec::new(),
            value: value.to_string(),
        }
    }

    /// Decoded value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Source text as written on the owner line.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn style(&self) -> ScalarStyle {
        self.style
    }

    pub fn is_null(&self) -> bool {
        self.style == ScalarStyle::Plain
            && self.tail.is_empty()
            && matches!(self.raw.as_str(), "" | "~" | "null" | "Null" | "NULL")
    }
}

// ============================================================================
// Collections
// ============================================================================

impl Entry {
    pub fn new(key: impl Into<String>, value: Node) -> Self {
        Self {
            leading: Vec::new(),
            key: Scalar::key(key),
            comment: None,
            value,
        }
    }

    pub fn key(&self) -> &str {
        self.key.value()
    }

    pub fn value(&self) -> &Node {
        &self.value
    }
}

impl Item {
    pub fn new(value: Node) -> Self {
        Self {
            leading: Vec::new(),
            comment: None,
            value,
        }
    }

    pub fn value(&self) -> &Node {
        &self.value
    }
}

impl Mapping {
    pub fn new() -> Self {
        Self {
            style: CollectionStyle::Block,
            props: None,
            indent: 2,
            entries: Vec::new(),
            source: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|e| e.key() == key).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.entries
            .iter_mut()
            .find(|e| e.key() == key)
            .map(|e| &mut e.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key() == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key())
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Node) {
        self.upsert(Entry::new(key, value));
    }

    /// Overwrite the value of an existing key, keeping its leading trivia, or append.
    pub(crate) fn upsert(&mut self, entry: Entry) {
        match self.position(entry.key()) {
            Some(idx) => {
                let existing = &mut self.entries[idx];
                existing.value = entry.value;
                if entry.comment.is_some() {
                    existing.comment = entry.comment;
                }
            }
            None => self.entries.push(entry),
        }
        self.style = CollectionStyle::Block;
        self.source = None;
    }

    /// Field-by-field merge of `other` into `self`.
    pub fn merge(&mut self, other: Mapping) {
        for entry in other.entries {
            self.upsert(entry);
        }
    }
}

impl Default for Mapping {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self {
            style: CollectionStyle::Block,
            props: None,
            indent: 2,
            items: Vec::new(),
            source: None,
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.items.get(index).map(|i| &i.value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, value: Node) {
        self.items.push(Item::new(value));
        self.style = CollectionStyle::Block;
        self.source = None;
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Node
// ============================================================================

impl Node {
    /// Parse a YAML snippet holding exactly one document.
    pub fn parse(text: &str) -> Result<Node> {
        let stream = super::parser::parse_stream(text)?;
        if !stream.is_single() {
            return Err(Error::yaml_parse(
                "expected a single YAML document",
                None,
                None,
            ));
        }
        stream
            .docs
            .into_iter()
            .next()
            .and_then(|d| d.node)
            .ok_or_else(|| Error::yaml_parse("empty YAML document", None, None))
    }

    pub fn string(value: impl Into<String>) -> Node {
        Node::Scalar(Scalar::string(value))
    }

    pub fn null() -> Node {
        Node::Scalar(Scalar::null())
    }

    /// Block mapping built from ordered pairs.
    pub fn mapping<K, I>(pairs: I) -> Node
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Node)>,
    {
        let mut mapping = Mapping::new();
        for (key, value) in pairs {
            mapping.insert(key, value);
        }
        Node::Mapping(mapping)
    }

    pub fn sequence<I: IntoIterator<Item = Node>>(values: I) -> Node {
        let mut sequence = Sequence::new();
        for value in values {
            sequence.push(value);
        }
        Node::Sequence(sequence)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Node::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Decoded value when this is a non-null scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) if !s.is_null() => Some(s.value()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(s) if s.is_null())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Scalar(s) if s.is_null() => "null",
            Node::Scalar(_) => "scalar",
            Node::Mapping(_) => "mapping",
            Node::Sequence(_) => "sequence",
        }
    }

    pub(crate) fn indent(&self) -> Option<usize> {
        match self {
            Node::Mapping(m) if m.style == CollectionStyle::Block => Some(m.indent),
            Node::Sequence(s) if s.style == CollectionStyle::Block => Some(s.indent),
            _ => None,
        }
    }

    pub(crate) fn set_indent(&mut self, indent: usize) {
        match self {
            Node::Mapping(m) => m.indent = indent,
            Node::Sequence(s) => s.indent = indent,
            Node::Scalar(_) => {}
        }
    }

    /// Stop emitting this collection's source text verbatim.
    pub(crate) fn forget_source(&mut self) {
        match self {
            Node::Mapping(m) => m.source = None,
            Node::Sequence(s) => s.source = None,
            Node::Scalar(_) => {}
        }
    }
}
