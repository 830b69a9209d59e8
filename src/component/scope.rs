//! What a component sees while one of its callbacks runs
//!
//! The component itself is out of its page slot at that point, so a scope
//! can hand out the page mutably: parameters, events, links and the
//! request-scoped environment are all reached through it.

use std::rc::Rc;

use serde_json::Value;

use super::{Component, ComponentEvent, EventTrigger};
use crate::form::{FormAction, FormSupport, TrackerHandle};
use crate::link::{self, Link};
use crate::markup::MarkupWriter;
use crate::page::{display_value, is_truthy, ComponentResources, ElementId, Page, PageError};
use crate::render::{Environment, RenderCommand, RenderContext, RenderQueue, RenderSupport};
use crate::request::RequestGlobals;

/// Scope of a render callback
pub struct RenderScope<'a> {
    pub element: ElementId,
    pub page: &'a mut Page,
    pub writer: &'a mut MarkupWriter,
    pub environment: &'a mut Environment,
    pub request: &'a RequestGlobals,
    pub support: &'a mut RenderSupport,
}

/// Scope of an event handler or a replayed form action
pub struct EventScope<'a> {
    pub element: ElementId,
    pub page: &'a mut Page,
    pub environment: &'a mut Environment,
    pub request: &'a RequestGlobals,
}

/// Scope of a deferred form callback
pub struct ActionContext<'a> {
    pub page: &'a mut Page,
    pub environment: &'a mut Environment,
    pub request: &'a RequestGlobals,
}

impl<'a> RenderScope<'a> {
    pub(crate) fn new(element: ElementId, cx: &'a mut RenderContext<'_>) -> Self {
        Self {
            element,
            page: &mut *cx.page,
            writer: &mut *cx.writer,
            environment: &mut *cx.environment,
            request: cx.request,
            support: &mut *cx.support,
        }
    }

    pub fn resources(&self) -> Result<&ComponentResources, PageError> {
        self.page.resources(self.element)
    }

    pub fn complete_id(&self) -> Result<String, PageError> {
        Ok(self.resources()?.complete_id.clone())
    }

    pub fn parameter(&self, name: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.page.parameter(self.element, name)?)
    }

    /// Parameter as display text; unbound and null read as `None`
    pub fn parameter_string(&self, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .parameter(name)?
            .filter(|v| !v.is_null())
            .map(|v| display_value(&v)))
    }

    pub fn parameter_flag(&self, name: &str, default: bool) -> anyhow::Result<bool> {
        Ok(self
            .parameter(name)?
            .map(|v| is_truthy(&v))
            .unwrap_or(default))
    }

    /// Parameter as a list of context values
    pub fn parameter_context(&self, name: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .parameter(name)?
            .map(|v| context_values(&v))
            .unwrap_or_default())
    }

    pub fn set_parameter(&mut self, name: &str, value: Value) -> anyhow::Result<()> {
        Ok(self.page.set_parameter(self.element, name, value)?)
    }

    pub fn informal_attributes(&self) -> anyhow::Result<Vec<(String, String)>> {
        Ok(self.page.informal_attributes(self.element)?)
    }

    /// Unique id for a client-side element in this document
    pub fn allocate_client_id(&mut self, base: &str) -> String {
        self.support.client_ids.allocate(base)
    }

    pub fn form_support(&self) -> Option<Rc<dyn FormSupport>> {
        self.environment.peek::<Rc<dyn FormSupport>>().cloned()
    }

    pub fn require_form_support(&self) -> anyhow::Result<Rc<dyn FormSupport>> {
        Ok(self
            .environment
            .peek_required::<Rc<dyn FormSupport>>()?
            .clone())
    }

    pub fn tracker(&self) -> Option<TrackerHandle> {
        self.environment.peek::<TrackerHandle>().cloned()
    }

    /// Record an action for replay when the enclosing form is submitted
    pub fn store(&self, action: FormAction) -> anyhow::Result<()> {
        let support = self.require_form_support()?;
        support.store(&self.complete_id()?, action)?;
        Ok(())
    }

    /// Record an action replayed only when the form is cancelled
    pub fn store_cancel(&self, action: FormAction) -> anyhow::Result<()> {
        let support = self.require_form_support()?;
        support.store_cancel(&self.complete_id()?, action)?;
        Ok(())
    }

    /// Record an action and also apply it to `component` right away
    pub fn store_and_execute(&mut self, component: &mut dyn Component, action: FormAction) -> anyhow::Result<()> {
        let support = self.require_form_support()?;
        let complete_id = self.complete_id()?;
        let mut scope = self.event_scope();
        support.store_and_execute(component, &complete_id, action, &mut scope)
    }

    pub fn heartbeat_begin(&mut self) {
        self.support.heartbeat.begin();
    }

    /// End the current heartbeat and run what was deferred inside it
    pub fn heartbeat_end(&mut self) -> anyhow::Result<()> {
        let deferred = self.support.heartbeat.end()?;
        self.run_commands(deferred)
    }

    /// Run `command` when the current heartbeat ends (now, outside one)
    pub fn defer(&mut self, command: impl RenderCommand + 'static) -> anyhow::Result<()> {
        match self.support.heartbeat.defer(Box::new(command)) {
            Some(now) => self.run_commands(vec![now]),
            None => Ok(()),
        }
    }

    fn run_commands(&mut self, commands: Vec<Box<dyn RenderCommand>>) -> anyhow::Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        let mut queue = RenderQueue::new();
        for command in commands.into_iter().rev() {
            queue.push_boxed(command);
        }
        let mut cx = self.render_context();
        queue.run(&mut cx)?;
        Ok(())
    }

    /// Trigger an event from this component on its container
    pub fn bubble(&mut self, name: &str, context: Vec<String>) -> anyhow::Result<EventTrigger> {
        self.page.bubble_event(
            self.element,
            ComponentEvent::new(name, context),
            self.environment,
            self.request,
        )
    }

    /// Link triggering `event` on this component
    pub fn event_link(&mut self, event: &str, context: Vec<String>, for_form: bool) -> anyhow::Result<Link> {
        link::component_event_link(
            self.page,
            self.environment,
            self.request,
            self.element,
            event,
            context,
            for_form,
        )
    }

    pub fn page_link(&mut self, page_name: &str, context: Option<Vec<String>>) -> anyhow::Result<Link> {
        link::page_render_link(self.page, self.environment, self.request, page_name, context)
    }

    pub fn event_scope(&mut self) -> EventScope<'_> {
        EventScope {
            element: self.element,
            page: &mut *self.page,
            environment: &mut *self.environment,
            request: self.request,
        }
    }

    pub fn action_context(&mut self) -> ActionContext<'_> {
        ActionContext {
            page: &mut *self.page,
            environment: &mut *self.environment,
            request: self.request,
        }
    }

    pub fn render_context(&mut self) -> RenderContext<'_> {
        RenderContext {
            page: &mut *self.page,
            writer: &mut *self.writer,
            environment: &mut *self.environment,
            request: self.request,
            support: &mut *self.support,
        }
    }
}

impl EventScope<'_> {
    pub fn resources(&self) -> Result<&ComponentResources, PageError> {
        self.page.resources(self.element)
    }

    pub fn complete_id(&self) -> Result<String, PageError> {
        Ok(self.resources()?.complete_id.clone())
    }

    pub fn parameter(&self, name: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.page.parameter(self.element, name)?)
    }

    pub fn parameter_string(&self, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .parameter(name)?
            .filter(|v| !v.is_null())
            .map(|v| display_value(&v)))
    }

    pub fn parameter_flag(&self, name: &str, default: bool) -> anyhow::Result<bool> {
        Ok(self
            .parameter(name)?
            .map(|v| is_truthy(&v))
            .unwrap_or(default))
    }

    pub fn set_parameter(&mut self, name: &str, value: Value) -> anyhow::Result<()> {
        Ok(self.page.set_parameter(self.element, name, value)?)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.page.property(name)
    }

    pub fn set_property(&mut self, name: &str, value: Value) {
        self.page.set_property(name, value);
    }

    /// Raw request parameter (query string or form body)
    pub fn request_parameter(&self, name: &str) -> Option<&str> {
        self.request.request.parameter(name)
    }

    pub fn form_support(&self) -> Option<Rc<dyn FormSupport>> {
        self.environment.peek::<Rc<dyn FormSupport>>().cloned()
    }

    pub fn require_form_support(&self) -> anyhow::Result<Rc<dyn FormSupport>> {
        Ok(self
            .environment
            .peek_required::<Rc<dyn FormSupport>>()?
            .clone())
    }

    pub fn tracker(&self) -> Option<TrackerHandle> {
        self.environment.peek::<TrackerHandle>().cloned()
    }

    /// Trigger an event from this component on its container
    pub fn bubble(&mut self, name: &str, context: Vec<String>) -> anyhow::Result<EventTrigger> {
        self.page.bubble_event(
            self.element,
            ComponentEvent::new(name, context),
            self.environment,
            self.request,
        )
    }

    pub fn event_link(&mut self, event: &str, context: Vec<String>) -> anyhow::Result<Link> {
        link::component_event_link(
            self.page,
            self.environment,
            self.request,
            self.element,
            event,
            context,
            false,
        )
    }

    pub fn page_link(&mut self, page_name: &str, context: Option<Vec<String>>) -> anyhow::Result<Link> {
        link::page_render_link(self.page, self.environment, self.request, page_name, context)
    }

    pub fn action_context(&mut self) -> ActionContext<'_> {
        ActionContext {
            page: &mut *self.page,
            environment: &mut *self.environment,
            request: self.request,
        }
    }
}

impl ActionContext<'_> {
    /// Trigger an event on `element`, bubbling up from there
    pub fn trigger(&mut self, element: ElementId, name: &str, context: Vec<String>) -> anyhow::Result<EventTrigger> {
        self.page.trigger_event(
            element,
            ComponentEvent::new(name, context),
            self.environment,
            self.request,
        )
    }
}

/// Context values from a parameter: arrays give one value per item, null
/// gives none, anything else a single value
pub fn context_values(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(display_value).collect(),
        other => vec![display_value(other)],
    }
}
