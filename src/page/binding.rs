//! Parameter and expansion bindings
//!
//! Bindings are written as `prefix:expression`:
//!
//! - `literal:text` the text itself (default for parameters)
//! - `prop:a.b.{index}` a path into the page property store; a `{name}`
//!   segment is replaced by the value of the top-level property `name`
//!   (default for `${...}` expansions)
//! - `block:name` the name of a block, for components that render blocks
//! - `param:name` the enclosing component's own parameter `name`

use std::fmt;

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    UnknownPrefix { prefix: String },
    EmptyPath { expression: String },
    NotAssignable { expression: String },
    NotAContainer { expression: String, segment: String },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPrefix { prefix } => write!(f, "Unknown binding prefix '{}'", prefix),
            Self::EmptyPath { expression } => {
                write!(f, "Property expression '{}' is empty", expression)
            }
            Self::NotAssignable { expression } => {
                write!(f, "Binding '{}' is read-only", expression)
            }
            Self::NotAContainer {
                expression,
                segment,
            } => write!(
                f,
                "Cannot navigate to '{}' in '{}': the value there is not an object or array",
                segment, expression
            ),
        }
    }
}

impl std::error::Error for BindingError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    /// `{name}`: use the value of top-level property `name` as the key
    Indirect(String),
}

/// Parsed `prop:` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    expression: String,
    segments: Vec<Segment>,
}

impl PropertyPath {
    pub fn parse(expression: &str) -> Result<Self, BindingError> {
        let segments: Vec<Segment> = expression
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => Segment::Indirect(name.to_string()),
                None => Segment::Key(s.to_string()),
            })
            .collect();

        if segments.is_empty() {
            return Err(BindingError::EmptyPath {
                expression: expression.to_string(),
            });
        }
        Ok(Self {
            expression: expression.to_string(),
            segments,
        })
    }

    fn keys(&self, root: &Value) -> Vec<String> {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Key(key) => key.clone(),
                Segment::Indirect(name) => root.get(name).map(display_value).unwrap_or_default(),
            })
            .collect()
    }

    /// Read the value at this path; missing steps read as null
    pub fn get(&self, root: &Value) -> Result<Value, BindingError> {
        let mut current = root;
        for key in self.keys(root) {
            let next = match current {
                Value::Object(map) => map.get(&key),
                Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Ok(Value::Null),
            }
        }
        Ok(current.clone())
    }

    /// Write a value at this path, creating intermediate objects as needed
    pub fn set(&self, root: &mut Value, value: Value) -> Result<(), BindingError> {
        let keys = self.keys(root);
        let Some((last, parents)) = keys.split_last() else {
            return Err(BindingError::EmptyPath {
                expression: self.expression.clone(),
            });
        };

        let mut current = root;
        for key in parents {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            current = match current {
                Value::Object(map) => map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new())),
                Value::Array(items) => match key.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                    Some(item) => item,
                    None => return Err(self.not_a_container(key)),
                },
                _ => return Err(self.not_a_container(key)),
            };
        }

        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        match current {
            Value::Object(map) => {
                map.insert(last.clone(), value);
                Ok(())
            }
            Value::Array(items) => match last.parse::<usize>() {
                Ok(index) if index < items.len() => {
                    items[index] = value;
                    Ok(())
                }
                Ok(index) if index == items.len() => {
                    items.push(value);
                    Ok(())
                }
                _ => Err(self.not_a_container(last)),
            },
            _ => Err(self.not_a_container(last)),
        }
    }

    fn not_a_container(&self, segment: &str) -> BindingError {
        BindingError::NotAContainer {
            expression: self.expression.clone(),
            segment: segment.to_string(),
        }
    }
}

/// A parsed binding expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Literal(String),
    Property(PropertyPath),
    Block(String),
    Parameter(String),
}

impl Binding {
    /// Parse `expression`, using `default_prefix` when it has none
    ///
    /// Only known prefixes are split off, so a literal such as
    /// `http://example.com` stays whole.
    pub fn parse(expression: &str, default_prefix: &str) -> Result<Self, BindingError> {
        let (prefix, body) = match expression.split_once(':') {
            Some((prefix, body)) if is_prefix(prefix) => (prefix, body),
            _ => (default_prefix, expression),
        };

        match prefix.to_ascii_lowercase().as_str() {
            "literal" => Ok(Self::Literal(body.to_string())),
            "prop" => Ok(Self::Property(PropertyPath::parse(body)?)),
            "block" => Ok(Self::Block(body.trim().to_string())),
            "param" => Ok(Self::Parameter(body.trim().to_string())),
            other => Err(BindingError::UnknownPrefix {
                prefix: other.to_string(),
            }),
        }
    }
}

fn is_prefix(prefix: &str) -> bool {
    ["literal", "prop", "block", "param"]
        .iter()
        .any(|known| known.eq_ignore_ascii_case(prefix))
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => write!(f, "literal:{}", text),
            Self::Property(path) => write!(f, "prop:{}", path.expression),
            Self::Block(name) => write!(f, "block:{}", name),
            Self::Parameter(name) => write!(f, "param:{}", name),
        }
    }
}

/// Text form of a value as written into markup
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Truthiness used by conditional components
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}
