//! Path expressions: `$`, `.field`, `."quoted.field"`, `[n]` and `[*]`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Field(String),
    Index(usize),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    steps: Vec<Step>,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(expr: &str) -> Result<Self> {
        let invalid = |problem: &str| Error::yaml_path_invalid(expr, problem);

        let rest = expr
            .strip_prefix('$')
            .ok_or_else(|| invalid("paths must start with `$`"))?;
        let chars: Vec<char> = rest.chars().collect();
        let mut steps = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    let field = match chars.get(i) {
                        Some(&q @ ('"' | '\'')) => {
                            let close = chars[i + 1..]
                                .iter()
                                .position(|&c| c == q)
                                .ok_or_else(|| invalid("unterminated quoted field"))?;
                            let field: String = chars[i + 1..i + 1 + close].iter().collect();
                            i += close + 2;
                            field
                        }
                        _ => {
                            let start = i;
                            while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                                i += 1;
                            }
                            chars[start..i].iter().collect()
                        }
                    };
                    if field.is_empty() {
                        return Err(invalid("empty field name"));
                    }
                    steps.push(Step::Field(field));
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|&c| c == ']')
                        .ok_or_else(|| invalid("unterminated `[`"))?;
                    let inner: String = chars[i + 1..i + close].iter().collect();
                    let step = match inner.trim() {
                        "*" => Step::Wildcard,
                        n => n
                            .parse::<usize>()
                            .map(Step::Index)
                            .map_err(|_| invalid("index must be a number or `*`"))?,
                    };
                    steps.push(step);
                    i += close + 1;
                }
                c => return Err(invalid(&format!("unexpected `{}`", c))),
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut steps = self.steps.clone();
        steps.push(Step::Field(name.into()));
        Self { steps }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut steps = self.steps.clone();
        steps.push(Step::Index(index));
        Self { steps }
    }

    pub fn has_wildcard(&self) -> bool {
        self.steps.contains(&Step::Wildcard)
    }

    /// Parent path and final step, or `None` for `$`.
    pub fn split_last(&self) -> Option<(Path, &Step)> {
        let (last, parent) = self.steps.split_last()?;
        Some((
            Path {
                steps: parent.to_vec(),
            },
            last,
        ))
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for step in &self.steps {
            match step {
                Step::Field(name) if name.contains(['.', '[', ']']) => write!(f, ".\"{}\"", name)?,
                Step::Field(name) => write!(f, ".{}", name)?,
                Step::Index(i) => write!(f, "[{}]", i)?,
                Step::Wildcard => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_step_kinds() {
        let path = Path::parse("$.tasks[*].with[0].\"a.b\"").unwrap();
        assert_eq!(
            path.steps(),
            &[
                Step::Field("tasks".into()),
                Step::Wildcard,
                Step::Field("with".into()),
                Step::Index(0),
                Step::Field("a.b".into()),
            ]
        );
        assert_eq!(path.to_string(), "$.tasks[*].with[0].\"a.b\"");
    }

    #[test]
    fn root_only() {
        assert!(Path::parse("$").unwrap().steps().is_empty());
        assert_eq!(Path::root().to_string(), "$");
    }

    #[test]
    fn rejects_malformed_paths() {
        for expr in ["tasks", "$.", "$[x]", "$.a[", "$..a", "$a"] {
            let err = Path::parse(expr).unwrap_err();
            assert_eq!(err.code.as_str(), "yaml.path_invalid", "{}", expr);
        }
    }

    #[test]
    fn builders_extend_paths() {
        let path = Path::parse("$.tasks").unwrap().index(2).field("call");
        assert_eq!(path.to_string(), "$.tasks[2].call");
        let (parent, last) = path.split_last().unwrap();
        assert_eq!(parent.to_string(), "$.tasks[2]");
        assert_eq!(last, &Step::Field("call".into()));
    }
}
