//! Serializer for the format-preserving tree.

use super::node::{CollectionStyle, Entry, FlowSource, Item, Node, Root, Scalar, Stream, Trivia};

pub(crate) fn emit_stream(stream: &Stream) -> String {
    let mut out = String::new();
    for doc in &stream.docs {
        emit_root(&mut out, doc);
    }
    for line in &stream.tail {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// YAML text of a single node, as if it were a document root.
pub(crate) fn emit_node(node: &Node) -> String {
    let mut out = String::new();
    emit_top(&mut out, node, 0);
    out
}

fn emit_root(out: &mut String, root: &Root) {
    for line in &root.head {
        out.push_str(line);
        out.push('\n');
    }
    if let Some(node) = &root.node {
        emit_top(out, node, node.indent().unwrap_or(0));
    }
    write_trivia(out, &root.trailing, 0);
    if let Some(end) = &root.end {
        out.push_str(end);
        out.push('\n');
    }
}

fn emit_top(out: &mut String, node: &Node, column: usize) {
    if is_block_collection(node) {
        if let Some(props) = props_of(node) {
            pad(out, column);
            out.push_str(props);
            out.push('\n');
        }
        emit_block(out, node, column, false);
        return;
    }

    pad(out, column);
    match node {
        Node::Scalar(s) => {
            write_scalar(out, s);
            out.push('\n');
            write_tail(out, s, column);
        }
        _ => write_flow(out, node, None, column),
    }
}

fn pad(out: &mut String, column: usize) {
    out.extend(std::iter::repeat(' ').take(column));
}

fn write_trivia(out: &mut String, trivia: &[Trivia], column: usize) {
    for line in trivia {
        match line {
            Trivia::Blank => out.push('\n'),
            Trivia::Comment { offset, text } => {
                let col = (column as isize + offset).max(0) as usize;
                pad(out, col);
                out.push_str(text);
                out.push('\n');
            }
        }
    }
}

fn is_block_collection(node: &Node) -> bool {
    match node {
        Node::Mapping(m) => m.style == CollectionStyle::Block && !m.entries.is_empty(),
        Node::Sequence(s) => s.style == CollectionStyle::Block && !s.items.is_empty(),
        Node::Scalar(_) => false,
    }
}

fn props_of(node: &Node) -> Option<&str> {
    match node {
        Node::Scalar(s) => s.props.as_deref(),
        Node::Mapping(m) => m.props.as_deref(),
        Node::Sequence(s) => s.props.as_deref(),
    }
}

/// Relative indentation used for a block collection nested under a key or dash.
fn child_indent(node: &Node, under_item: bool) -> usize {
    let indent = node.indent().unwrap_or(2);
    match node {
        Node::Mapping(_) if under_item => indent.max(2),
        Node::Mapping(_) if indent == 0 => 2,
        Node::Sequence(_) if under_item => indent.max(2),
        _ => indent,
    }
}

/// Emit a non-empty block collection whose lines start at `column`.
///
/// With `inline_first` the caller already wrote the prefix of the first line.
fn emit_block(out: &mut String, node: &Node, column: usize, inline_first: bool) {
    match node {
        Node::Mapping(m) => {
            for (i, entry) in m.entries.iter().enumerate() {
                if !(inline_first && i == 0) {
                    write_trivia(out, &entry.leading, column);
                    pad(out, column);
                }
                emit_entry(out, entry, column);
            }
        }
        Node::Sequence(s) => {
            for (i, item) in s.items.iter().enumerate() {
                if !(inline_first && i == 0) {
                    write_trivia(out, &item.leading, column);
                    pad(out, column);
                }
                emit_item(out, item, column);
            }
        }
        Node::Scalar(_) => {}
    }
}

fn emit_entry(out: &mut String, entry: &Entry, column: usize) {
    out.push_str(&entry.key.raw);
    out.push(':');
    emit_value(out, &entry.value, entry.comment.as_deref(), column, false);
}

fn emit_item(out: &mut String, item: &Item, column: usize) {
    out.push('-');
    emit_value(out, &item.value, item.comment.as_deref(), column, true);
}

fn first_has_trivia(node: &Node) -> bool {
    match node {
        Node::Mapping(m) => m.entries.first().is_some_and(|e| !e.leading.is_empty()),
        Node::Sequence(s) => s.items.first().is_some_and(|i| !i.leading.is_empty()),
        Node::Scalar(_) => false,
    }
}

fn emit_value(
    out: &mut String,
    value: &Node,
    comment: Option<&str>,
    column: usize,
    under_item: bool,
) {
    if let Node::Scalar(s) = value {
        if !(s.raw.is_empty() && s.props.is_none()) {
            out.push(' ');
            write_scalar(out, s);
        }
        out.push_str(comment.unwrap_or(""));
        out.push('\n');
        write_tail(out, s, column);
        return;
    }

    if !is_block_collection(value) {
        out.push(' ');
        write_flow(out, value, comment, column);
        return;
    }

    let indent = child_indent(value, under_item);
    let props = props_of(value);
    if under_item && props.is_none() && comment.is_none() && !first_has_trivia(value) {
        pad(out, indent - 1);
        emit_block(out, value, column + indent, true);
        return;
    }

    if let Some(props) = props {
        out.push(' ');
        out.push_str(props);
    }
    out.push_str(comment.unwrap_or(""));
    out.push('\n');
    emit_block(out, value, column + indent, false);
}

fn write_scalar(out: &mut String, scalar: &Scalar) {
    if let Some(props) = &scalar.props {
        out.push_str(props);
        if !scalar.raw.is_empty() {
            out.push(' ');
        }
    }
    out.push_str(&scalar.raw);
}

fn write_tail(out: &mut String, scalar: &Scalar, column: usize) {
    for line in &scalar.tail {
        if !line.text.is_empty() {
            pad(out, column + line.offset);
            out.push_str(&line.text);
        }
        out.push('\n');
    }
}

fn flow_source(node: &Node) -> Option<&FlowSource> {
    match node {
        Node::Mapping(m) if m.style == CollectionStyle::Flow => m.source.as_ref(),
        Node::Sequence(s) if s.style == CollectionStyle::Flow => s.source.as_ref(),
        _ => None,
    }
}

/// Write a flow collection and its inline comment, as written when unedited.
fn write_flow(out: &mut String, node: &Node, comment: Option<&str>, column: usize) {
    let Some(source) = flow_source(node) else {
        out.push_str(&flow_text(node));
        out.push_str(comment.unwrap_or(""));
        out.push('\n');
        return;
    };

    if let Some(props) = props_of(node) {
        out.push_str(props);
        out.push(' ');
    }
    out.push_str(&source.first);
    for line in &source.tail {
        out.push('\n');
        if !line.text.is_empty() {
            pad(out, column + line.offset);
            out.push_str(&line.text);
        }
    }
    out.push_str(comment.unwrap_or(""));
    out.push('\n');
}

fn flow_text(node: &Node) -> String {
    let (props, body) = match node {
        Node::Scalar(s) => {
            let mut text = s.raw.clone();
            for line in &s.tail {
                if !line.text.is_empty() {
                    text.push(' ');
                    text.push_str(&line.text);
                }
            }
            (s.props.as_deref(), text)
        }
        Node::Mapping(m) => {
            let entries: Vec<String> = m
                .entries
                .iter()
                .map(|e| {
                    if e.value.is_null() && props_of(&e.value).is_none() {
                        e.key.raw.clone()
                    } else {
                        format!("{}: {}", e.key.raw, flow_text(&e.value))
                    }
                })
                .collect();
            let body = if entries.is_empty() {
                "{}".to_string()
            } else {
                format!("{{{}}}", entries.join(", "))
            };
            (m.props.as_deref(), body)
        }
        Node::Sequence(s) => {
            let items: Vec<String> = s.items.iter().map(|i| flow_text(&i.value)).collect();
            (s.props.as_deref(), format!("[{}]", items.join(", ")))
        }
    };

    match props {
        Some(props) if !matches!(node, Node::Scalar(_)) => format!("{} {}", props, body),
        Some(props) if !body.is_empty() => format!("{} {}", props, body),
        Some(props) => props.to_string(),
        None => body,
    }
}
