//! Line-oriented parser producing the format-preserving tree.
//!
//! Syntax is validated by `serde_yml` first, so this parser only has to build
//! structure for text already known to be YAML. Constructs the tree cannot
//! represent faithfully are rejected rather than silently reshaped.

use serde::Deserialize;

use super::node::{
    CollectionStyle, Entry, FlowSource, Item, Mapping, Node, Root, Scalar, ScalarStyle, Sequence,
    Stream, TailLine, Trivia,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Line {
    raw: String,
    number: usize,
}

impl Line {
    fn indent(&self) -> usize {
        self.raw.len() - self.raw.trim_start_matches(' ').len()
    }

    fn text(&self) -> &str {
        self.raw[self.indent()..].trim_end()
    }

    fn is_blank(&self) -> bool {
        self.raw.trim().is_empty()
    }

    fn is_comment(&self) -> bool {
        self.text().starts_with('#')
    }

    fn is_trivia(&self) -> bool {
        self.is_blank() || self.is_comment()
    }
}

struct PendingTrivia {
    column: usize,
    text: Option<String>,
}

/// Parse a YAML stream. Malformed input fails as a whole.
pub fn parse_stream(text: &str) -> Result<Stream> {
    validate(text)?;

    let mut lines: Vec<Line> = text
        .split('\n')
        .enumerate()
        .map(|(i, raw)| Line {
            raw: raw.strip_suffix('\r').unwrap_or(raw).to_string(),
            number: i + 1,
        })
        .collect();
    // `split` yields one empty piece after a trailing newline.
    if lines.last().is_some_and(|l| l.raw.is_empty()) {
        lines.pop();
    }

    let mut stream = Stream::default();
    let (raw_docs, tail) = split_documents(lines);
    for raw in raw_docs {
        stream.docs.push(parse_document(raw)?);
    }
    stream.tail = tail;
    if stream.docs.is_empty() {
        stream.docs.push(Root::default());
    }
    Ok(stream)
}

fn validate(text: &str) -> Result<()> {
    for document in serde_yml::Deserializer::from_str(text) {
        if let Err(e) = serde_yml::Value::deserialize(document) {
            let location = e.location();
            return Err(Error::yaml_parse(
                e.to_string(),
                location.as_ref().map(|l| l.line()),
                location.as_ref().map(|l| l.column()),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Document splitting
// ============================================================================

#[derive(Default)]
struct RawDocument {
    head: Vec<String>,
    body: Vec<Line>,
    end: Option<String>,
}

impl RawDocument {
    fn has_content(&self) -> bool {
        self.body.iter().any(|l| !l.is_trivia())
    }
}

fn is_marker(raw: &str, marker: &str) -> bool {
    raw.strip_prefix(marker)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t']))
}

fn split_documents(lines: Vec<Line>) -> (Vec<RawDocument>, Vec<String>) {
    let mut docs: Vec<RawDocument> = vec![RawDocument::default()];

    for line in lines {
        let Some(current) = docs.last_mut() else {
            break;
        };
        if is_marker(&line.raw, "---") {
            if current.has_content() || current.end.is_some() || current.head.iter().any(|h| is_marker(h, "---")) {
                docs.push(RawDocument {
                    head: vec![line.raw],
                    ..RawDocument::default()
                });
            } else {
                let prelude: Vec<String> = current.body.drain(..).map(|l| l.raw).collect();
                current.head.extend(prelude);
                current.head.push(line.raw);
            }
        } else if is_marker(&line.raw, "...") {
            current.end = Some(line.raw);
            docs.push(RawDocument::default());
        } else if line.raw.starts_with('%') && !current.has_content() {
            let prelude: Vec<String> = current.body.drain(..).map(|l| l.raw).collect();
            current.head.extend(prelude);
            current.head.push(line.raw);
        } else {
            current.body.push(line);
        }
    }

    let mut tail = Vec::new();
    if docs.len() > 1 {
        let last_is_empty = docs
            .last()
            .is_some_and(|d| d.head.is_empty() && !d.has_content() && d.end.is_none());
        if last_is_empty {
            if let Some(last) = docs.pop() {
                tail = last.body.into_iter().map(|l| l.raw).collect();
            }
        }
    }
    (docs, tail)
}

fn parse_document(raw: RawDocument) -> Result<Root> {
    for head in &raw.head {
        if let Some(rest) = head.strip_prefix("---") {
            let rest = rest.trim();
            if !rest.is_empty() && !rest.starts_with('#') {
                return Err(Error::yaml_parse(
                    "content on a document start line is not supported",
                    None,
                    None,
                ));
            }
        }
    }

    let mut parser = Parser::new(raw.body);
    let node = parser.parse_root()?;
    Ok(Root {
        head: raw.head,
        node,
        trailing: parser.take_pending(0),
        end: raw.end,
    })
}

// ============================================================================
// Block parser
// ============================================================================

struct Parser {
    lines: Vec<Line>,
    pos: usize,
    pending: Vec<PendingTrivia>,
}

impl Parser {
    fn new(lines: Vec<Line>) -> Self {
        Self {
            lines,
            pos: 0,
            pending: Vec::new(),
        }
    }

    fn parse_root(&mut self) -> Result<Option<Node>> {
        self.collect_trivia();
        let Some(line) = self.peek() else {
            return Ok(None);
        };
        let column = line.indent();
        let mut node = self.parse_collection_at(column, 0)?;
        node.set_indent(column);

        self.collect_trivia();
        if let Some(line) = self.peek() {
            return Err(unsupported(line, "unexpected content after document root"));
        }
        Ok(Some(node))
    }

    fn peek(&self) -> Option<&Line> {
        self.lines.get(self.pos)
    }

    fn collect_trivia(&mut self) {
        while let Some(line) = self.lines.get(self.pos) {
            if line.is_blank() {
                self.pending.push(PendingTrivia {
                    column: 0,
                    text: None,
                });
            } else if line.is_comment() {
                self.pending.push(PendingTrivia {
                    column: line.indent(),
                    text: Some(line.text().to_string()),
                });
            } else {
                break;
            }
            self.pos += 1;
        }
    }

    fn take_pending(&mut self, column: usize) -> Vec<Trivia> {
        self.pending
            .drain(..)
            .map(|p| match p.text {
                None => Trivia::Blank,
                Some(text) => Trivia::Comment {
                    offset: p.column as isize - column as isize,
                    text,
                },
            })
            .collect()
    }

    /// Parse whatever starts on the current line at `column`.
    fn parse_collection_at(&mut self, column: usize, owner: usize) -> Result<Node> {
        let Some(line) = self.peek() else {
            return Ok(Node::null());
        };
        let text = line.text();
        if is_dash(text) {
            return self.parse_sequence(column).map(Node::Sequence);
        }
        if text.starts_with("? ") || text == "?" {
            return Err(unsupported(line, "complex mapping keys are not supported"));
        }
        if split_key(text).is_some() {
            return self.parse_mapping(column).map(Node::Mapping);
        }

        let text = text.to_string();
        self.pos += 1;
        let (node, _comment) = self.parse_value(owner, &text, false)?;
        Ok(node)
    }

    fn parse_mapping(&mut self, column: usize) -> Result<Mapping> {
        let mut mapping = Mapping {
            style: CollectionStyle::Block,
            props: None,
            indent: 0,
            entries: Vec::new(),
            source: None,
        };

        loop {
            self.collect_trivia();
            let Some(line) = self.peek() else {
                break;
            };
            let indent = line.indent();
            if indent < column || (indent == column && is_dash(line.text())) {
                break;
            }
            if indent > column {
                return Err(unsupported(line, "unexpected indentation"));
            }

            let text = line.text().to_string();
            let line_ref = line.clone();
            let Some((key, rest)) = split_key(&text) else {
                return Err(unsupported(&line_ref, "expected a mapping key"));
            };
            let key = parse_key(key, &line_ref)?;
            let leading = self.take_pending(column);
            self.pos += 1;

            let (value, comment) = self.parse_value(column, rest, true)?;
            mapping.entries.push(Entry {
                leading,
                key,
                comment,
                value,
            });
        }

        Ok(mapping)
    }

    fn parse_sequence(&mut self, column: usize) -> Result<Sequence> {
        let mut sequence = Sequence {
            style: CollectionStyle::Block,
            props: None,
            indent: 0,
            items: Vec::new(),
            source: None,
        };

        loop {
            self.collect_trivia();
            let Some(line) = self.peek() else {
                break;
            };
            let indent = line.indent();
            if indent < column || !is_dash(line.text()) {
                if indent > column {
                    return Err(unsupported(line, "unexpected indentation"));
                }
                break;
            }
            if indent > column {
                return Err(unsupported(line, "unexpected indentation"));
            }

            let after_dash = line.text()[1..].to_string();
            let number = line.number;
            let leading = self.take_pending(column);
            let content = after_dash.trim_start();
            let spaces = after_dash.len() - content.len();

            if content.is_empty() || content.starts_with('#') {
                self.pos += 1;
                let (value, comment) = self.parse_value(column, &after_dash, false)?;
                sequence.items.push(Item {
                    leading,
                    comment,
                    value,
                });
                continue;
            }

            let inner = column + 1 + spaces;
            if is_dash(content) || split_key(content).is_some() {
                // Re-read the remainder of this line as if it started at `inner`.
                self.lines[self.pos] = Line {
                    raw: format!("{}{}", " ".repeat(inner), content),
                    number,
                };
                let mut value = self.parse_collection_at(inner, column)?;
                value.set_indent(inner - column);
                sequence.items.push(Item {
                    leading,
                    comment: None,
                    value,
                });
                continue;
            }

            self.pos += 1;
            let (value, comment) = self.parse_value(column, &after_dash, false)?;
            sequence.items.push(Item {
                leading,
                comment,
                value,
            });
        }

        Ok(sequence)
    }

    /// Parse the value that follows `key:` or `-` on a line owned by `owner`.
    ///
    /// `rest` is the unconsumed text of that line. Returns the value and its inline comment.
    fn parse_value(
        &mut self,
        owner: usize,
        rest: &str,
        same_column_sequence: bool,
    ) -> Result<(Node, Option<String>)> {
        let line_number = self.pos;
        let (props, rest) = split_props(rest);
        let trimmed = rest.trim_start();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            let comment = (!trimmed.is_empty()).then(|| rest.to_string());
            let node = self.parse_nested(owner, same_column_sequence, props)?;
            return Ok((node, comment));
        }

        let first = trimmed.chars().next().unwrap_or(' ');
        let (mut node, comment) = match first {
            '|' | '>' => self.parse_block_scalar(owner, trimmed)?,
            '[' | '{' => self.parse_flow(owner, trimmed, line_number)?,
            '"' | '\'' => self.parse_quoted(owner, trimmed, line_number)?,
            _ => self.parse_plain(owner, trimmed),
        };

        if let Some(props) = props {
            match &mut node {
                Node::Scalar(s) => s.props = Some(props),
                Node::Mapping(m) => m.props = Some(props),
                Node::Sequence(s) => s.props = Some(props),
            }
        }
        Ok((node, comment))
    }

    /// Value that continues on the following lines, or null.
    fn parse_nested(
        &mut self,
        owner: usize,
        same_column_sequence: bool,
        props: Option<String>,
    ) -> Result<Node> {
        self.collect_trivia();
        let next = self.peek().map(|l| (l.indent(), is_dash(l.text())));

        let mut node = match next {
            Some((indent, _)) if indent > owner => {
                let mut node = self.parse_collection_at(indent, owner)?;
                node.set_indent(indent - owner);
                node
            }
            Some((indent, true)) if indent == owner && same_column_sequence => {
                Node::Sequence(self.parse_sequence(owner)?)
            }
            _ => Node::null(),
        };

        match &mut node {
            Node::Scalar(s) => s.props = props,
            Node::Mapping(m) => m.props = props,
            Node::Sequence(s) => s.props = props,
        }
        Ok(node)
    }

    fn parse_plain(&mut self, owner: usize, text: &str) -> (Node, Option<String>) {
        let (value, comment) = split_comment(text);
        let mut value_parts = vec![value.to_string()];
        let mut tail = Vec::new();

        if comment.is_none() {
            // Blank lines belong to the scalar only when it continues after them.
            let mut blanks = 0;
            while let Some(line) = self.lines.get(self.pos + blanks) {
                if line.is_blank() {
                    blanks += 1;
                    continue;
                }
                if line.is_comment() || line.indent() <= owner {
                    break;
                }
                let offset = line.indent() - owner;
                let part = split_comment(line.text()).0.to_string();
                for _ in 0..blanks {
                    tail.push(TailLine {
                        offset: 0,
                        text: String::new(),
                    });
                    value_parts.push(String::new());
                }
                tail.push(TailLine {
                    offset,
                    text: part.clone(),
                });
                value_parts.push(part);
                self.pos += blanks + 1;
                blanks = 0;
            }
        }

        let parts: Vec<&str> = value_parts.iter().map(String::as_str).collect();
        let scalar = Scalar::new(
            ScalarStyle::Plain,
            value.to_string(),
            tail,
            fold_lines(&parts),
        );
        (Node::Scalar(scalar), comment.map(str::to_string))
    }

    fn parse_quoted(
        &mut self,
        owner: usize,
        text: &str,
        line_index: usize,
    ) -> Result<(Node, Option<String>)> {
        let quote = text.chars().next().unwrap_or('"');
        let style = if quote == '"' {
            ScalarStyle::DoubleQuoted
        } else {
            ScalarStyle::SingleQuoted
        };

        let mut raw_lines = vec![text.to_string()];
        let mut tail = Vec::new();
        let mut close = find_closing_quote(text, quote, 1);

        while close.is_none() {
            let Some(line) = self.peek() else {
                let line = &self.lines[line_index.saturating_sub(1).min(self.lines.len() - 1)];
                return Err(unsupported(line, "unterminated quoted scalar"));
            };
            let text = line.text().to_string();
            tail.push(TailLine {
                offset: line.indent().saturating_sub(owner),
                text: text.clone(),
            });
            close = find_closing_quote(&text, quote, 0);
            raw_lines.push(text);
            self.pos += 1;
        }

        let end = close.unwrap_or(0);
        let last = raw_lines.last().cloned().unwrap_or_default();
        let after = &last[end + 1..];
        let comment = trailing_comment(after).map_err(|_| {
            let line = &self.lines[self.pos.saturating_sub(1)];
            unsupported(line, "unexpected text after quoted scalar")
        })?;

        // Strip the trailing comment from the stored source text.
        let raw = if tail.is_empty() {
            text[..end + 1].to_string()
        } else {
            if let Some(last_tail) = tail.last_mut() {
                last_tail.text.truncate(end + 1);
            }
            text.to_string()
        };

        let mut source: Vec<&str> = vec![raw.as_str()];
        source.extend(tail.iter().map(|t| t.text.as_str()));
        let value = decode_quoted(&source, quote);

        Ok((
            Node::Scalar(Scalar::new(style, raw.clone(), tail, value)),
            comment,
        ))
    }

    fn parse_block_scalar(&mut self, owner: usize, text: &str) -> Result<(Node, Option<String>)> {
        let (header, comment) = split_comment(text);
        let style = if header.starts_with('|') {
            ScalarStyle::Literal
        } else {
            ScalarStyle::Folded
        };
        let indicator = header
            .chars()
            .find(|c| c.is_ascii_digit())
            .and_then(|c| c.to_digit(10))
            .map(|d| d as usize);
        let chomping = if header.contains('-') {
            '-'
        } else if header.contains('+') {
            '+'
        } else {
            ' '
        };

        let mut last_content = None;
        let mut cursor = self.pos;
        while let Some(line) = self.lines.get(cursor) {
            if line.is_blank() {
                cursor += 1;
                continue;
            }
            if line.indent() <= owner {
                break;
            }
            last_content = Some(cursor);
            cursor += 1;
        }

        let mut tail = Vec::new();
        let mut body = Vec::new();
        if let Some(last) = last_content {
            let body_indent = match indicator {
                Some(d) => owner + d,
                None => self.lines[self.pos..=last]
                    .iter()
                    .find(|l| !l.is_blank())
                    .map(Line::indent)
                    .unwrap_or(owner + 2),
            };
            for line in &self.lines[self.pos..=last] {
                let content = if line.is_blank() {
                    String::new()
                } else {
                    let start = line.indent().min(body_indent);
                    line.raw[start..].trim_end().to_string()
                };
                body.push(content.clone());
                tail.push(TailLine {
                    offset: body_indent - owner,
                    text: content,
                });
            }
            self.pos = last + 1;
        }

        let value = decode_block(&body, style, chomping);
        let scalar = Scalar::new(style, header.to_string(), tail, value);
        Ok((Node::Scalar(scalar), comment.map(str::to_string)))
    }

    fn parse_flow(
        &mut self,
        owner: usize,
        text: &str,
        line_index: usize,
    ) -> Result<(Node, Option<String>)> {
        let mut joined = text.to_string();
        let mut tail = Vec::new();
        let mut end = flow_end(&joined);

        while end.is_none() {
            let Some(line) = self.peek() else {
                let line = &self.lines[line_index.saturating_sub(1).min(self.lines.len() - 1)];
                return Err(unsupported(line, "unterminated flow collection"));
            };
            if line.is_blank() {
                tail.push(TailLine {
                    offset: 0,
                    text: String::new(),
                });
                self.pos += 1;
                continue;
            }
            if line.is_comment() {
                return Err(unsupported(
                    line,
                    "comments inside multi-line flow collections are not supported",
                ));
            }
            if line.indent() <= owner && !starts_flow_close(line.text()) {
                return Err(unsupported(line, "flow collection continues at a lower indentation"));
            }
            tail.push(TailLine {
                offset: line.indent().saturating_sub(owner),
                text: line.text().to_string(),
            });
            joined.push(' ');
            joined.push_str(line.text());
            self.pos += 1;
            end = flow_end(&joined);
        }

        let end = end.unwrap_or(joined.len() - 1);
        let (source, after) = joined.split_at(end + 1);
        let comment = trailing_comment(after).map_err(|_| {
            let line = &self.lines[self.pos.saturating_sub(1)];
            unsupported(line, "comments inside multi-line flow collections are not supported")
        })?;

        // The closing bracket sits on the last line read; drop what follows it.
        let cut = after.len();
        let first = match tail.last_mut() {
            Some(last) => {
                let keep = last.text.len() - cut;
                last.text.truncate(keep);
                text.to_string()
            }
            None => text[..text.len() - cut].to_string(),
        };

        let mut flow = FlowParser::new(source);
        let mut node = flow.parse_node()?;
        let written = Some(FlowSource { first, tail });
        match &mut node {
            Node::Mapping(m) => m.source = written,
            Node::Sequence(s) => s.source = written,
            Node::Scalar(_) => {}
        }
        Ok((node, comment))
    }
}

fn starts_flow_close(text: &str) -> bool {
    text.starts_with(']') || text.starts_with('}')
}

fn unsupported(line: &Line, problem: &str) -> Error {
    Error::yaml_parse(
        format!("{} at line {}", problem, line.number),
        Some(line.number),
        None,
    )
}

// ============================================================================
// Lexical helpers
// ============================================================================

fn is_dash(text: &str) -> bool {
    text == "-" || text.starts_with("- ") || text.starts_with("-\t")
}

/// Split `key: rest` when `text` starts with a mapping key.
pub(crate) fn split_key(text: &str) -> Option<(&str, &str)> {
    let first = text.chars().next()?;
    if first == '"' || first == '\'' {
        let close = find_closing_quote(text, first, 1)?;
        let after = &text[close + 1..];
        let trimmed = after.trim_start();
        let rest = trimmed.strip_prefix(':')?;
        if !(rest.is_empty() || rest.starts_with([' ', '\t'])) {
            return None;
        }
        return Some((&text[..close + 1], rest));
    }
    if "[{#&!*|>%@`".contains(first) || is_dash(text) {
        return None;
    }

    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'#' && i > 0 && (bytes[i - 1] == b' ' || bytes[i - 1] == b'\t') {
            return None;
        }
        if b == b':' {
            let next = bytes.get(i + 1);
            if next.is_none() || next == Some(&b' ') || next == Some(&b'\t') {
                let key = text[..i].trim_end();
                if key.is_empty() {
                    return None;
                }
                return Some((key, &text[i + 1..]));
            }
        }
    }
    None
}

fn parse_key(raw: &str, line: &Line) -> Result<Scalar> {
    let first = raw.chars().next().unwrap_or(' ');
    let (style, value) = match first {
        '"' => (ScalarStyle::DoubleQuoted, decode_quoted(&[raw], '"')),
        '\'' => (ScalarStyle::SingleQuoted, decode_quoted(&[raw], '\'')),
        '?' => return Err(unsupported(line, "complex mapping keys are not supported")),
        _ => (ScalarStyle::Plain, raw.to_string()),
    };
    Ok(Scalar::new(style, raw.to_string(), Vec::new(), value))
}

/// Leading anchor (`&a`) and tag (`!t`) tokens.
fn split_props(rest: &str) -> (Option<String>, &str) {
    let mut props: Vec<&str> = Vec::new();
    let mut remaining = rest;
    loop {
        let trimmed = remaining.trim_start();
        if !(trimmed.starts_with('&') || trimmed.starts_with('!')) {
            break;
        }
        let end = trimmed.find([' ', '\t']).unwrap_or(trimmed.len());
        props.push(&trimmed[..end]);
        remaining = &trimmed[end..];
    }
    if props.is_empty() {
        (None, rest)
    } else {
        (Some(props.join(" ")), remaining)
    }
}

/// Split plain text at an inline comment. The comment keeps its leading whitespace.
fn split_comment(text: &str) -> (&str, Option<&str>) {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'#' && i > 0 && (bytes[i - 1] == b' ' || bytes[i - 1] == b'\t') {
            let value = text[..i].trim_end();
            return (value, Some(&text[value.len()..]));
        }
    }
    (text.trim_end(), None)
}

/// Remaining text after a closed scalar or flow node: empty or a comment.
fn trailing_comment(after: &str) -> std::result::Result<Option<String>, ()> {
    let trimmed = after.trim_start();
    if trimmed.is_empty() {
        Ok(None)
    } else if trimmed.starts_with('#') && trimmed.len() < after.len() {
        Ok(Some(after.to_string()))
    } else {
        Err(())
    }
}

fn find_closing_quote(text: &str, quote: char, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let q = quote as u8;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if q == b'"' && b == b'\\' {
            i += 2;
            continue;
        }
        if b == q {
            if q == b'\'' && bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Index of the bracket closing the flow collection that opens `text`.
fn flow_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let opens_quote = i == 0 || matches!(bytes[i - 1], b'[' | b'{' | b',' | b':' | b' ');
        match bytes[i] {
            b'"' | b'\'' if opens_quote => {
                let close = find_closing_quote(text, bytes[i] as char, i + 1)?;
                i = close;
            }
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn fold_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    let mut pending_newlines = 0;
    for (i, line) in lines.iter().enumerate() {
        let line = if i == 0 { line.trim_end() } else { line.trim() };
        if line.is_empty() && i > 0 {
            pending_newlines += 1;
            continue;
        }
        if i > 0 {
            if pending_newlines > 0 {
                out.push_str(&"\n".repeat(pending_newlines));
            } else {
                out.push(' ');
            }
        }
        pending_newlines = 0;
        out.push_str(line);
    }
    out
}

fn decode_quoted(source: &[&str], quote: char) -> String {
    let folded = fold_lines(source);
    let inner = folded
        .strip_prefix(quote)
        .and_then(|s| s.strip_suffix(quote))
        .unwrap_or(&folded);

    if quote == '\'' {
        return inner.replace("''", "'");
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some(' ') => out.push(' '),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(c);
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn decode_block(body: &[String], style: ScalarStyle, chomping: char) -> String {
    let mut content = if style == ScalarStyle::Literal {
        body.join("\n")
    } else {
        let mut out = String::new();
        let mut previous_blank = true;
        for line in body {
            if line.is_empty() {
                out.push('\n');
                previous_blank = true;
                continue;
            }
            if !previous_blank && !line.starts_with(' ') {
                out.push(' ');
            } else if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(line);
            previous_blank = false;
        }
        out
    };

    let trimmed_len = content.trim_end_matches('\n').len();
    content.truncate(trimmed_len);
    match chomping {
        '-' => content,
        _ if content.is_empty() => content,
        _ => content + "\n",
    }
}

// ============================================================================
// Flow collections
// ============================================================================

struct FlowParser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> FlowParser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn error(&self, problem: &str) -> Error {
        Error::yaml_parse(
            format!("{} in flow collection `{}`", problem, self.text),
            None,
            None,
        )
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.text[self.pos..].chars().next() {
            if c == ' ' || c == '\t' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected `{}`", c)))
        }
    }

    fn parse_props(&mut self) -> Option<String> {
        let mut props = Vec::new();
        loop {
            self.skip_ws();
            let rest = &self.text[self.pos..];
            if !(rest.starts_with('&') || rest.starts_with('!')) {
                break;
            }
            let end = rest
                .find([' ', '\t', ',', ']', '}'])
                .unwrap_or(rest.len());
            props.push(rest[..end].to_string());
            self.pos += end;
        }
        (!props.is_empty()).then(|| props.join(" "))
    }

    fn parse_node(&mut self) -> Result<Node> {
        let props = self.parse_props();
        self.skip_ws();

        let mut node = match self.peek() {
            Some('[') => self.parse_sequence()?,
            Some('{') => self.parse_mapping()?,
            _ => Node::Scalar(self.parse_scalar(false)?),
        };
        match &mut node {
            Node::Scalar(s) => s.props = props,
            Node::Mapping(m) => m.props = props,
            Node::Sequence(s) => s.props = props,
        }
        Ok(node)
    }

    fn parse_sequence(&mut self) -> Result<Node> {
        self.expect('[')?;
        let mut sequence = Sequence {
            style: CollectionStyle::Flow,
            props: None,
            indent: 2,
            items: Vec::new(),
            source: None,
        };
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.pos += 1;
                break;
            }
            let value = self.parse_node()?;
            self.skip_ws();
            if self.peek() == Some(':') {
                return Err(self.error("single-pair mappings inside flow sequences are not supported"));
            }
            sequence.items.push(Item::new(value));
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {}
                _ => return Err(self.error("expected `,` or `]`")),
            }
        }
        Ok(Node::Sequence(sequence))
    }

    fn parse_mapping(&mut self) -> Result<Node> {
        self.expect('{')?;
        let mut mapping = Mapping {
            style: CollectionStyle::Flow,
            props: None,
            indent: 2,
            entries: Vec::new(),
            source: None,
        };
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                break;
            }
            let key = self.parse_scalar(true)?;
            self.skip_ws();
            let value = if self.peek() == Some(':') {
                self.pos += 1;
                self.skip_ws();
                match self.peek() {
                    Some(',') | Some('}') => Node::null(),
                    _ => self.parse_node()?,
                }
            } else {
                Node::null()
            };
            mapping.entries.push(Entry {
                leading: Vec::new(),
                key,
                comment: None,
                value,
            });
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                _ => return Err(self.error("expected `,` or `}`")),
            }
        }
        Ok(Node::Mapping(mapping))
    }

    fn parse_scalar(&mut self, is_key: bool) -> Result<Scalar> {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        match rest.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let close = find_closing_quote(rest, q, 1)
                    .ok_or_else(|| self.error("unterminated quoted scalar"))?;
                let raw = &rest[..close + 1];
                self.pos += close + 1;
                let style = if q == '"' {
                    ScalarStyle::DoubleQuoted
                } else {
                    ScalarStyle::SingleQuoted
                };
                Ok(Scalar::new(
                    style,
                    raw.to_string(),
                    Vec::new(),
                    decode_quoted(&[raw], q),
                ))
            }
            _ => {
                let bytes = rest.as_bytes();
                let mut end = bytes.len();
                for (i, &b) in bytes.iter().enumerate() {
                    let next = bytes.get(i + 1).copied();
                    let ends_here = match b {
                        b',' | b']' | b'}' | b'[' | b'{' => true,
                        b':' => {
                            is_key
                                || matches!(next, None | Some(b' ') | Some(b',') | Some(b']') | Some(b'}'))
                        }
                        b'#' => i > 0 && bytes[i - 1] == b' ',
                        _ => false,
                    };
                    if ends_here {
                        end = i;
                        break;
                    }
                }
                let raw = rest[..end].trim();
                self.pos += end;
                Ok(Scalar::new(
                    ScalarStyle::Plain,
                    raw.to_string(),
                    Vec::new(),
                    raw.to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(text: &str) -> Node {
        parse_stream(text).unwrap().docs[0].node.clone().unwrap()
    }

    #[test]
    fn split_key_handles_urls_and_comments() {
        assert_eq!(split_key("key: value"), Some(("key", " value")));
        assert_eq!(split_key("key:"), Some(("key", "")));
        assert_eq!(split_key("url: http://x.test"), Some(("url", " http://x.test")));
        assert_eq!(split_key("http://x.test"), None);
        assert_eq!(split_key("value # not: a key"), None);
        assert_eq!(split_key("\"quoted key\": 1"), Some(("\"quoted key\"", " 1")));
        assert_eq!(split_key("- item"), None);
    }

    #[test]
    fn parses_nested_structure() {
        let node = root("on:\n  github:\n    push: {}\ntasks:\n  - key: a\n    run: echo hi\n");
        let mapping = node.as_mapping().unwrap();
        assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["on", "tasks"]);

        let tasks = mapping.get("tasks").unwrap().as_sequence().unwrap();
        assert_eq!(tasks.len(), 1);
        let task = tasks.get(0).unwrap().as_mapping().unwrap();
        assert_eq!(task.get("run").and_then(Node::as_str), Some("echo hi"));
    }

    #[test]
    fn zero_indented_sequences_belong_to_their_key() {
        let node = root("tasks:\n- key: a\n- key: b\nbase:\n  image: x\n");
        let mapping = node.as_mapping().unwrap();
        assert_eq!(mapping.get("tasks").unwrap().as_sequence().unwrap().len(), 2);
        assert!(mapping.contains_key("base"));
    }

    #[test]
    fn decodes_scalar_styles() {
        let node = root(
            "a: 'it''s'\nb: \"tab\\there\"\nc: plain # note\nd: |\n  one\n  two\ne: >-\n  folded\n  text\n",
        );
        let m = node.as_mapping().unwrap();
        assert_eq!(m.get("a").and_then(Node::as_str), Some("it's"));
        assert_eq!(m.get("b").and_then(Node::as_str), Some("tab\there"));
        assert_eq!(m.get("c").and_then(Node::as_str), Some("plain"));
        assert_eq!(m.get("d").and_then(Node::as_str), Some("one\ntwo\n"));
        assert_eq!(m.get("e").and_then(Node::as_str), Some("folded text"));
    }

    #[test]
    fn plain_scalars_continue_across_blank_lines() {
        let text = "a: one\n  two\n\n  three\nb: 1\n";
        let stream = parse_stream(text).unwrap();
        let node = stream.docs[0].node.as_ref().unwrap();
        let m = node.as_mapping().unwrap();
        assert_eq!(m.get("a").and_then(Node::as_str), Some("one two\nthree"));
        assert_eq!(m.get("b").and_then(Node::as_str), Some("1"));
        assert_eq!(super::super::emit::emit_stream(&stream), text);
    }

    #[test]
    fn blank_lines_after_a_plain_scalar_stay_trivia() {
        let node = root("a: one\n  two\n\nb: 1\n");
        let m = node.as_mapping().unwrap();
        assert_eq!(m.get("a").and_then(Node::as_str), Some("one two"));
        assert_eq!(m.entries()[1].leading, vec![Trivia::Blank]);
    }

    #[test]
    fn parses_flow_collections() {
        let node = root("a: [x, \"y\", {k: v}]\nb: {}\n");
        let m = node.as_mapping().unwrap();
        let a = m.get("a").unwrap().as_sequence().unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(a.get(1).and_then(Node::as_str), Some("y"));
        assert!(m.get("b").unwrap().as_mapping().unwrap().is_empty());
    }

    #[test]
    fn comments_attach_to_following_entry() {
        let node = root("# head\n\nfoo: 1\n  # indented\nbar: 2\n");
        let m = node.as_mapping().unwrap();
        assert_eq!(
            m.entries()[0].leading,
            vec![
                Trivia::Comment {
                    offset: 0,
                    text: "# head".into()
                },
                Trivia::Blank
            ]
        );
        assert_eq!(
            m.entries()[1].leading,
            vec![Trivia::Comment {
                offset: 2,
                text: "# indented".into()
            }]
        );
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let err = parse_stream("tasks: [unclosed\n").unwrap_err();
        assert_eq!(err.code.as_str(), "yaml.parse_failed");
    }

    #[test]
    fn multi_document_streams_keep_every_document() {
        let stream = parse_stream("a: 1\n---\nb: 2\n").unwrap();
        assert_eq!(stream.docs.len(), 2);
        assert_eq!(stream.docs[1].head, vec!["---".to_string()]);
    }
}
