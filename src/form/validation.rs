//! Field validation: the per-form tracker and the built-in validators

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use regex::Regex;

use super::FormError;

/// Input values and errors of one form, keyed by control name
///
/// After a failed submission the tracker keeps what the user typed so the
/// fields can redisplay it next to the error messages.
#[derive(Debug, Clone, Default)]
pub struct ValidationTracker {
    inputs: HashMap<String, String>,
    field_errors: HashMap<String, String>,
    /// Every error in the order recorded, including form-level ones
    errors: Vec<String>,
}

impl ValidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_input(&mut self, control_name: &str, value: &str) {
        self.inputs
            .insert(control_name.to_string(), value.to_string());
    }

    pub fn input(&self, control_name: &str) -> Option<&str> {
        self.inputs.get(control_name).map(String::as_str)
    }

    /// Record an error for a field; only the first error per field is kept
    pub fn record_field_error(&mut self, control_name: &str, message: &str) {
        if self.field_errors.contains_key(control_name) {
            return;
        }
        self.field_errors
            .insert(control_name.to_string(), message.to_string());
        self.errors.push(message.to_string());
    }

    /// Record an error not tied to one field
    pub fn record_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn field_error(&self, control_name: &str) -> Option<&str> {
        self.field_errors.get(control_name).map(String::as_str)
    }

    pub fn in_error(&self, control_name: &str) -> bool {
        self.field_errors.contains_key(control_name)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.field_errors.clear();
        self.errors.clear();
    }
}

/// Shared handle to the tracker of the form currently rendering or submitting
#[derive(Debug, Clone, Default)]
pub struct TrackerHandle(Rc<RefCell<ValidationTracker>>);

impl TrackerHandle {
    pub fn new(tracker: ValidationTracker) -> Self {
        Self(Rc::new(RefCell::new(tracker)))
    }

    pub fn borrow(&self) -> Ref<'_, ValidationTracker> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ValidationTracker> {
        self.0.borrow_mut()
    }

    /// Take the tracker back out, leaving an empty one behind
    pub fn take(&self) -> ValidationTracker {
        self.0.take()
    }
}

/// A constraint on a field's submitted text
#[derive(Debug, Clone)]
pub enum Validator {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Regexp(Regex),
}

impl Validator {
    /// Parse a comma separated list such as `required,minlength=3`
    pub fn parse_list(definition: &str) -> Result<Vec<Self>, FormError> {
        definition
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn parse(definition: &str) -> Result<Self, FormError> {
        let invalid = |reason: String| FormError::InvalidValidator {
            definition: definition.to_string(),
            reason,
        };
        let (name, constraint) = match definition.split_once('=') {
            Some((name, constraint)) => (name.trim(), Some(constraint.trim())),
            None => (definition.trim(), None),
        };

        let length = |constraint: Option<&str>| -> Result<usize, FormError> {
            constraint
                .ok_or_else(|| invalid("a length is required".to_string()))?
                .parse()
                .map_err(|_| invalid("the length must be a whole number".to_string()))
        };

        match name.to_ascii_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "minlength" => Ok(Self::MinLength(length(constraint)?)),
            "maxlength" => Ok(Self::MaxLength(length(constraint)?)),
            "regexp" => {
                let pattern = constraint.ok_or_else(|| invalid("a pattern is required".to_string()))?;
                let anchored = format!("^(?:{})$", pattern);
                Regex::new(&anchored)
                    .map(Self::Regexp)
                    .map_err(|e| invalid(e.to_string()))
            }
            other => Err(invalid(format!("unknown validator '{}'", other))),
        }
    }

    /// Check submitted text; the error is the message shown to the user
    ///
    /// Only `required` looks at blank input, the other validators accept it.
    pub fn check(&self, label: &str, value: &str) -> Result<(), String> {
        let blank = value.trim().is_empty();
        let length = value.chars().count();
        match self {
            Self::Required if blank => Err(format!("You must provide a value for {}.", label)),
            Self::MinLength(min) if !blank && length < *min => Err(format!(
                "You must provide at least {} characters for {}.",
                min, label
            )),
            Self::MaxLength(max) if !blank && length > *max => Err(format!(
                "You may provide at most {} characters for {}.",
                max, label
            )),
            Self::Regexp(pattern) if !blank && !pattern.is_match(value) => {
                Err(format!("{} does not match the required pattern.", label))
            }
            _ => Ok(()),
        }
    }

    /// HTML attribute for the browser-side equivalent of this check
    pub fn client_attribute(&self) -> (&'static str, String) {
        match self {
            Self::Required => ("required", "required".to_string()),
            Self::MinLength(min) => ("minlength", min.to_string()),
            Self::MaxLength(max) => ("maxlength", max.to_string()),
            Self::Regexp(pattern) => {
                let source = pattern.as_str();
                let inner = source
                    .strip_prefix("^(?:")
                    .and_then(|s| s.strip_suffix(")$"))
                    .unwrap_or(source);
                ("pattern", inner.to_string())
            }
        }
    }
}

impl fmt::Display for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, value) = self.client_attribute();
        match self {
            Self::Required => f.write_str(name),
            Self::Regexp(_) => write!(f, "regexp={}", value),
            _ => write!(f, "{}={}", name, value),
        }
    }
}
