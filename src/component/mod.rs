//! Component model
//!
//! A component is a plain struct implementing `Component`. Every lifecycle
//! callback has a no-op default, so a component only implements the stages
//! it cares about.
//!
//! ```text
//! setup_render     Halt: skip to cleanup_render
//! begin_render     Halt: skip the content; Render(block): the block instead
//!   template, or body when the component has no template
//! after_render     Halt: back to begin_render
//! cleanup_render   Halt: back to setup_render
//! ```

mod scope;

use serde_json::Value;

use crate::form::{FormAction, FormError};
use crate::link::Link;

pub use scope::{context_values, ActionContext, EventScope, RenderScope};

/// What a render callback wants to happen next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Meaning depends on the stage: skip ahead (setup, begin) or go
    /// around again (after, cleanup)
    Halt,
    /// From `begin_render`: render the named block instead of the body
    Render(String),
}

/// An event travelling up the component tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentEvent {
    pub name: String,
    /// Id of the child the event arrived through; empty at the origin
    pub source: String,
    pub context: Vec<String>,
}

impl ComponentEvent {
    pub fn new(name: &str, context: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            source: String::new(),
            context,
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// `onNameFromSource` style matching, case-insensitive
    pub fn is_from(&self, name: &str, source: &str) -> bool {
        self.is(name) && self.source.eq_ignore_ascii_case(source)
    }

    pub fn context_value(&self, index: usize) -> Option<&str> {
        self.context.get(index).map(String::as_str)
    }

    pub fn context_as<T: std::str::FromStr>(&self, index: usize) -> Option<T> {
        self.context_value(index)?.parse().ok()
    }
}

/// Value returned by an event handler that ends bubbling
#[derive(Debug, Clone, PartialEq)]
pub enum EventResult {
    /// Activation context, answered to `passivate`
    Context(Vec<String>),
    /// Render the active page as the response to this request
    RenderPage,
    /// Redirect to a page, optionally with an explicit activation context
    Page {
        name: String,
        context: Option<Vec<String>>,
    },
    Link(Link),
    Text(String),
    Json(Value),
    /// Partial render of a block of the handling component (XHR)
    Block(String),
}

impl EventResult {
    pub fn page(name: &str) -> Self {
        Self::Page {
            name: name.to_string(),
            context: None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Context(values) => format!("context {:?}", values),
            Self::RenderPage => "render page".to_string(),
            Self::Page { name, .. } => format!("page {}", name),
            Self::Link(link) => format!("link {}", link.to_uri()),
            Self::Text(_) => "text".to_string(),
            Self::Json(_) => "json".to_string(),
            Self::Block(name) => format!("block {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    NotHandled,
    /// Handled, keep bubbling
    Handled,
    /// Handled, stop bubbling with a result
    Abort(EventResult),
}

/// Summary of one event trigger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTrigger {
    pub handled: bool,
    pub result: Option<EventResult>,
    /// Complete id of the component that aborted
    pub handled_by: Option<String>,
}

impl EventTrigger {
    pub fn is_aborted(&self) -> bool {
        self.result.is_some()
    }
}

/// Components that render a form control
pub trait Field {
    fn client_id(&self) -> Option<&str>;
    fn control_name(&self) -> Option<&str>;
}

pub trait Component: Send {
    /// Parameter names bound as formal parameters; anything else given in a
    /// template is informal
    fn formal_parameters(&self) -> &'static [&'static str] {
        &[]
    }

    fn setup_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        Ok(Flow::Continue)
    }

    fn begin_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        Ok(Flow::Continue)
    }

    fn after_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        Ok(Flow::Continue)
    }

    fn cleanup_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        Ok(Flow::Continue)
    }

    fn on_event(
        &mut self,
        _event: &ComponentEvent,
        _scope: &mut EventScope<'_>,
    ) -> anyhow::Result<EventOutcome> {
        Ok(EventOutcome::NotHandled)
    }

    /// Replay a form action recorded during render
    fn execute_action(&mut self, action: &FormAction, scope: &mut EventScope<'_>) -> anyhow::Result<()> {
        Err(FormError::UnsupportedAction {
            complete_id: scope.resources()?.complete_id.clone(),
            action: action.kind().to_string(),
        }
        .into())
    }

    /// The page is going back to the pool; drop per-request state
    fn page_detached(&mut self) {}

    fn as_field(&self) -> Option<&dyn Field> {
        None
    }
}
