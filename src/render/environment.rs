//! Typed, stack-based registry of per-render services ("environmentals")
//!
//! A component pushes a value before its body renders and pops it after; every
//! component rendered in between can peek at it. Nothing here is shared across
//! requests: one `Environment` is created per in-flight request and dropped
//! with it.
//!
//! ```text
//! Form.begin_render    push FormSupport(form)
//!   TextField          peek FormSupport -> form
//!   FormFragment       push FormSupport(fragment wrapping form)
//!     TextField        peek FormSupport -> fragment
//!   FormFragment       pop
//! Form.after_render    pop
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Misuse of the environment. Always a programming error in a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    /// A required environmental was not pushed by any enclosing component
    Missing {
        type_name: &'static str,
        available: Vec<&'static str>,
    },
    /// `pop` with nothing pushed for that type
    EmptyStack { type_name: &'static str },
    /// A render or submission pass finished with values still pushed
    Unbalanced { outstanding: Vec<(&'static str, usize)> },
}

impl fmt::Display for EnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing {
                type_name,
                available,
            } => {
                write!(
                    f,
                    "No object of type {} is available from the Environment",
                    type_name
                )?;
                if available.is_empty() {
                    write!(f, " (the Environment is empty)")
                } else {
                    write!(f, ". Available types are {}.", available.join(", "))
                }
            }
            Self::EmptyStack { type_name } => write!(
                f,
                "No object of type {} has been pushed to the Environment, so none can be popped",
                type_name
            ),
            Self::Unbalanced { outstanding } => {
                let listed: Vec<String> = outstanding
                    .iter()
                    .map(|(name, depth)| format!("{} ({})", name, depth))
                    .collect();
                write!(
                    f,
                    "Environment still holds values after the pass completed: {}",
                    listed.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for EnvironmentError {}

struct TypedStack {
    type_name: &'static str,
    values: Vec<Box<dyn Any>>,
}

/// Request-scoped registry keyed by Rust type
#[derive(Default)]
pub struct Environment {
    stacks: HashMap<TypeId, TypedStack>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<(&str, usize)> = self
            .stacks
            .values()
            .map(|s| (s.type_name, s.values.len()))
            .collect();
        types.sort_unstable();
        f.debug_struct("Environment").field("stacks", &types).finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `value` the current provider for `T`
    pub fn push<T: Any>(&mut self, value: T) {
        let type_name = std::any::type_name::<T>();
        tracing::trace!("Environment push {}", type_name);
        self.stacks
            .entry(TypeId::of::<T>())
            .or_insert_with(|| TypedStack {
                type_name,
                values: Vec::new(),
            })
            .values
            .push(Box::new(value));
    }

    /// Current provider for `T`, if any
    pub fn peek<T: Any>(&self) -> Option<&T> {
        self.stacks
            .get(&TypeId::of::<T>())
            .and_then(|stack| stack.values.last())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Current provider for `T`; absence is an error naming what is available
    pub fn peek_required<T: Any>(&self) -> Result<&T, EnvironmentError> {
        self.peek::<T>().ok_or_else(|| EnvironmentError::Missing {
            type_name: std::any::type_name::<T>(),
            available: self.available_types(),
        })
    }

    /// Remove and return the most recently pushed `T`
    pub fn pop<T: Any>(&mut self) -> Result<T, EnvironmentError> {
        let type_name = std::any::type_name::<T>();
        let value = self
            .stacks
            .get_mut(&TypeId::of::<T>())
            .and_then(|stack| stack.values.pop())
            .ok_or(EnvironmentError::EmptyStack { type_name })?;

        tracing::trace!("Environment pop {}", type_name);

        // Keyed by TypeId, so the downcast cannot fail
        value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| EnvironmentError::EmptyStack { type_name })
    }

    /// Number of values currently pushed for `T`
    pub fn depth<T: Any>(&self) -> usize {
        self.stacks
            .get(&TypeId::of::<T>())
            .map(|stack| stack.values.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.values().all(|stack| stack.values.is_empty())
    }

    /// Fail if any type still has values pushed
    pub fn ensure_balanced(&self) -> Result<(), EnvironmentError> {
        let mut outstanding: Vec<(&'static str, usize)> = self
            .stacks
            .values()
            .filter(|stack| !stack.values.is_empty())
            .map(|stack| (stack.type_name, stack.values.len()))
            .collect();

        if outstanding.is_empty() {
            return Ok(());
        }
        outstanding.sort_unstable();
        Err(EnvironmentError::Unbalanced { outstanding })
    }

    /// Drop everything (end of request)
    pub fn clear(&mut self) {
        self.stacks.clear();
    }

    fn available_types(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .stacks
            .values()
            .filter(|stack| !stack.values.is_empty())
            .map(|stack| stack.type_name)
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Support(&'static str);

    #[derive(Debug, PartialEq)]
    struct Tracker(u32);

    #[test]
    fn test_push_peek_pop_is_lifo() {
        let mut env = Environment::new();
        env.push(Support("outer"));
        env.push(Support("inner"));

        assert_eq!(env.peek::<Support>(), Some(&Support("inner")));
        assert_eq!(env.pop::<Support>().unwrap(), Support("inner"));
        assert_eq!(env.peek::<Support>(), Some(&Support("outer")));
        assert_eq!(env.pop::<Support>().unwrap(), Support("outer"));
        assert!(env.is_empty());
    }

    #[test]
    fn test_types_are_independent() {
        let mut env = Environment::new();
        env.push(Support("form"));
        env.push(Tracker(3));

        assert_eq!(env.depth::<Support>(), 1);
        assert_eq!(env.depth::<Tracker>(), 1);
        assert_eq!(env.pop::<Tracker>().unwrap(), Tracker(3));
        assert_eq!(env.peek::<Support>(), Some(&Support("form")));
    }

    #[test]
    fn test_peek_required_names_missing_and_available() {
        let mut env = Environment::new();
        env.push(Tracker(1));

        let err = env.peek_required::<Support>().unwrap_err();
        match &err {
            EnvironmentError::Missing {
                type_name,
                available,
            } => {
                assert!(type_name.ends_with("Support"));
                assert_eq!(available.len(), 1);
                assert!(available[0].ends_with("Tracker"));
            }
            other => panic!("Expected Missing, got {:?}", other),
        }
        assert!(err.to_string().contains("Available types are"));
    }

    #[test]
    fn test_peek_optional_absent_is_none() {
        let env = Environment::new();
        assert!(env.peek::<Support>().is_none());
    }

    #[test]
    fn test_pop_empty_is_error() {
        let mut env = Environment::new();
        let err = env.pop::<Support>().unwrap_err();
        assert!(matches!(err, EnvironmentError::EmptyStack { .. }));

        env.push(Support("x"));
        env.pop::<Support>().unwrap();
        assert!(matches!(
            env.pop::<Support>(),
            Err(EnvironmentError::EmptyStack { .. })
        ));
    }

    #[test]
    fn test_balance_check() {
        let mut env = Environment::new();
        assert!(env.ensure_balanced().is_ok());

        env.push(Support("a"));
        env.push(Support("b"));
        match env.ensure_balanced() {
            Err(EnvironmentError::Unbalanced { outstanding }) => {
                assert_eq!(outstanding.len(), 1);
                assert_eq!(outstanding[0].1, 2);
            }
            other => panic!("Expected Unbalanced, got {:?}", other),
        }

        env.clear();
        assert!(env.ensure_balanced().is_ok());
    }
}
