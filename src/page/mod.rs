//! Page instances
//!
//! A `Page` owns one component tree, stored as an arena of element slots
//! addressed by `ElementId`. The tree is assembled once by the `PageLoader`
//! and never restructured afterwards; rendering only decides which parts to
//! skip. While a component callback runs, that component is taken out of its
//! slot so the callback can borrow the rest of the page mutably.

pub mod binding;
pub mod element;
pub mod loader;
pub mod pool;
pub mod template;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::component::{
    ActionContext, Component, ComponentEvent, EventOutcome, EventResult, EventScope, EventTrigger,
};
use crate::form::FormAction;
use crate::render::Environment;
use crate::request::RequestGlobals;

pub use binding::{display_value, is_truthy, Binding, BindingError};
pub use element::PageElement;
pub use loader::{
    ComponentDefinition, ComponentRegistry, PageDefinition, PageLoader, PageRegistry,
};
pub use pool::{PagePool, PoolSettings, RequestPageCache};
pub use template::{Embedded, Template, TemplateNode};

/// Index of a component element within its page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub(crate) usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Page assembly and page access failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    UnknownPage { name: String },
    UnknownComponentType { page: String, component_type: String },
    UnknownComponent { page: String, nested_id: String },
    DuplicateId { container: String, id: String },
    DuplicateBlock { container: String, id: String },
    InvalidId { id: String },
    InvalidBinding {
        complete_id: String,
        expression: String,
        message: String,
    },
    RecursiveTemplate { component_type: String },
    UnknownBlock { complete_id: String, block: String },
    ComponentBusy { complete_id: String },
    AlreadyRendering { complete_id: String },
    PoolExhausted { page: String, limit: usize },
    InvalidElement { element: ElementId },
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPage { name } => write!(f, "Page '{}' is not defined", name),
            Self::UnknownComponentType {
                page,
                component_type,
            } => write!(
                f,
                "Page '{}' uses unknown component type '{}'",
                page, component_type
            ),
            Self::UnknownComponent { page, nested_id } => write!(
                f,
                "Page '{}' does not contain a component with id '{}'",
                page, nested_id
            ),
            Self::DuplicateId { container, id } => write!(
                f,
                "Component id '{}' is already used within {}",
                id, container
            ),
            Self::DuplicateBlock { container, id } => {
                write!(f, "Block '{}' is defined twice within {}", id, container)
            }
            Self::InvalidId { id } => write!(
                f,
                "Component id '{}' may only contain letters, digits and underscores",
                id
            ),
            Self::InvalidBinding {
                complete_id,
                expression,
                message,
            } => write!(
                f,
                "Invalid binding '{}' in {}: {}",
                expression, complete_id, message
            ),
            Self::RecursiveTemplate { component_type } => write!(
                f,
                "Template of component '{}' contains itself",
                component_type
            ),
            Self::UnknownBlock { complete_id, block } => write!(
                f,
                "Component {} has no block named '{}' (neither in its container nor its own template)",
                complete_id, block
            ),
            Self::ComponentBusy { complete_id } => write!(
                f,
                "Component {} is already executing a callback",
                complete_id
            ),
            Self::AlreadyRendering { complete_id } => write!(
                f,
                "Component {} is already rendering and cannot be rendered again inside itself",
                complete_id
            ),
            Self::PoolExhausted { page, limit } => write!(
                f,
                "All {} instances of page '{}' are in use",
                limit, page
            ),
            Self::InvalidElement { element } => {
                write!(f, "Element {} does not belong to this page", element)
            }
        }
    }
}

impl std::error::Error for PageError {}

/// Identity and parameters of one component instance
#[derive(Debug, Clone)]
pub struct ComponentResources {
    /// Id within the container ("" for the page root)
    pub id: String,
    /// Dotted path of ids from the page root ("" for the page root)
    pub nested_id: String,
    /// `Page` or `Page:nested.id`
    pub complete_id: String,
    pub component_type: String,
    pub container: Option<ElementId>,
    /// Formal parameters keyed by lower-cased name
    pub parameters: HashMap<String, Binding>,
    /// Everything else, rendered as element attributes by components that
    /// support informal parameters
    pub informal_parameters: Vec<(String, Binding)>,
}

/// Observer of pool checkout and release
pub trait PageLifecycleListener: Send {
    fn attached(&mut self, _page: &str) {}
    fn detached(&mut self, _page: &str) {}
}

struct ElementSlot {
    resources: ComponentResources,
    component: Option<Box<dyn Component>>,
    template: Option<Arc<[PageElement]>>,
    body: Arc<[PageElement]>,
    blocks: HashMap<String, Arc<[PageElement]>>,
    children: HashMap<String, ElementId>,
    rendering: bool,
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// One instance of a page's component tree
pub struct Page {
    instance_id: u64,
    name: String,
    locale: String,
    root: ElementId,
    elements: Vec<ElementSlot>,
    properties: Value,
    initial_properties: Value,
    dirty_count: usize,
    attached: bool,
    listeners: Vec<Box<dyn PageLifecycleListener>>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("name", &self.name)
            .field("locale", &self.locale)
            .field("instance_id", &self.instance_id)
            .field("elements", &self.elements.len())
            .field("dirty_count", &self.dirty_count)
            .field("attached", &self.attached)
            .finish()
    }
}

impl Page {
    /// Create a page holding only its root component
    pub fn new(name: &str, locale: &str, root_component: Box<dyn Component>) -> Self {
        let root = ElementSlot {
            resources: ComponentResources {
                id: String::new(),
                nested_id: String::new(),
                complete_id: name.to_string(),
                component_type: name.to_string(),
                container: None,
                parameters: HashMap::new(),
                informal_parameters: Vec::new(),
            },
            component: Some(root_component),
            template: None,
            body: Arc::from(Vec::new()),
            blocks: HashMap::new(),
            children: HashMap::new(),
            rendering: false,
        };

        Self {
            instance_id: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            locale: locale.to_string(),
            root: ElementId(0),
            elements: vec![root],
            properties: Value::Object(Default::default()),
            initial_properties: Value::Object(Default::default()),
            dirty_count: 0,
            attached: false,
            listeners: Vec::new(),
        }
    }

    /// Process-unique number distinguishing pooled instances
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Assembly (used by the loader)
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn add_element(
        &mut self,
        resources: ComponentResources,
        component: Box<dyn Component>,
    ) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(ElementSlot {
            resources,
            component: Some(component),
            template: None,
            body: Arc::from(Vec::new()),
            blocks: HashMap::new(),
            children: HashMap::new(),
            rendering: false,
        });
        id
    }

    pub(crate) fn add_child(&mut self, container: ElementId, id: &str, child: ElementId) -> Result<(), PageError> {
        let slot = self.slot_mut(container)?;
        let key = id.to_ascii_lowercase();
        if slot.children.contains_key(&key) {
            return Err(PageError::DuplicateId {
                container: slot.resources.complete_id.clone(),
                id: id.to_string(),
            });
        }
        slot.children.insert(key, child);
        Ok(())
    }

    pub(crate) fn add_block(
        &mut self,
        owner: ElementId,
        id: &str,
        content: Vec<PageElement>,
    ) -> Result<(), PageError> {
        let slot = self.slot_mut(owner)?;
        let key = id.to_ascii_lowercase();
        if slot.blocks.contains_key(&key) {
            return Err(PageError::DuplicateBlock {
                container: slot.resources.complete_id.clone(),
                id: id.to_string(),
            });
        }
        slot.blocks.insert(key, Arc::from(content));
        Ok(())
    }

    pub(crate) fn set_template(&mut self, element: ElementId, content: Vec<PageElement>) -> Result<(), PageError> {
        self.slot_mut(element)?.template = Some(Arc::from(content));
        Ok(())
    }

    pub(crate) fn set_body(&mut self, element: ElementId, content: Vec<PageElement>) -> Result<(), PageError> {
        self.slot_mut(element)?.body = Arc::from(content);
        Ok(())
    }

    pub(crate) fn set_initial_properties(&mut self, properties: Value) {
        self.properties = properties.clone();
        self.initial_properties = properties;
    }

    fn slot(&self, element: ElementId) -> Result<&ElementSlot, PageError> {
        self.elements
            .get(element.0)
            .ok_or(PageError::InvalidElement { element })
    }

    fn slot_mut(&mut self, element: ElementId) -> Result<&mut ElementSlot, PageError> {
        self.elements
            .get_mut(element.0)
            .ok_or(PageError::InvalidElement { element })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Structure
    // ─────────────────────────────────────────────────────────────────────

    pub fn resources(&self, element: ElementId) -> Result<&ComponentResources, PageError> {
        Ok(&self.slot(element)?.resources)
    }

    /// Content a component renders in place of its `<t:body/>`
    pub fn body(&self, element: ElementId) -> Result<Arc<[PageElement]>, PageError> {
        Ok(self.slot(element)?.body.clone())
    }

    /// The component's own template, when its type has one
    pub fn template(&self, element: ElementId) -> Result<Option<Arc<[PageElement]>>, PageError> {
        Ok(self.slot(element)?.template.clone())
    }

    /// Look a block up for `element`: first among the blocks of its
    /// container (where its parameters were written), then its own
    pub fn resolve_block(&self, element: ElementId, name: &str) -> Result<Arc<[PageElement]>, PageError> {
        let key = name.to_ascii_lowercase();
        let slot = self.slot(element)?;

        if let Some(container) = slot.resources.container {
            if let Some(block) = self.slot(container)?.blocks.get(&key) {
                return Ok(block.clone());
            }
        }
        slot.blocks
            .get(&key)
            .cloned()
            .ok_or_else(|| PageError::UnknownBlock {
                complete_id: slot.resources.complete_id.clone(),
                block: name.to_string(),
            })
    }

    /// Child of `container` with the given id (case-insensitive)
    pub fn find_child(&self, container: ElementId, id: &str) -> Option<ElementId> {
        self.slot(container)
            .ok()?
            .children
            .get(&id.to_ascii_lowercase())
            .copied()
    }

    /// Resolve a dotted nested id; the empty id is the root
    pub fn find_element(&self, nested_id: &str) -> Option<ElementId> {
        if nested_id.is_empty() {
            return Some(self.root);
        }
        nested_id
            .split('.')
            .try_fold(self.root, |current, id| self.find_child(current, id))
    }

    /// Resolve `Page` or `Page:nested.id` against this instance
    pub fn find_by_complete_id(&self, complete_id: &str) -> Option<ElementId> {
        let (page, nested) = complete_id.split_once(':').unwrap_or((complete_id, ""));
        if !page.eq_ignore_ascii_case(&self.name) {
            return None;
        }
        self.find_element(nested)
    }

    /// Find an element by nested id, failing with a descriptive error
    pub fn require_element(&self, nested_id: &str) -> Result<ElementId, PageError> {
        self.find_element(nested_id)
            .ok_or_else(|| PageError::UnknownComponent {
                page: self.name.clone(),
                nested_id: nested_id.to_string(),
            })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Properties and bindings
    // ─────────────────────────────────────────────────────────────────────

    /// Page property store, an object that bindings read and write
    pub fn properties(&self) -> &Value {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: &str, value: Value) {
        if !self.properties.is_object() {
            self.properties = Value::Object(Default::default());
        }
        if let Value::Object(map) = &mut self.properties {
            map.insert(name.to_string(), value);
        }
    }

    /// Evaluate a binding written in the template of `owner`
    pub fn evaluate(&self, binding: &Binding, owner: ElementId) -> Result<Value, BindingError> {
        match binding {
            Binding::Literal(text) => Ok(Value::String(text.clone())),
            Binding::Block(name) => Ok(Value::String(name.clone())),
            Binding::Property(path) => path.get(&self.properties),
            Binding::Parameter(name) => match self.parameter_binding(owner, name) {
                Some((inner, container)) => self.evaluate(inner, container),
                None => Ok(Value::Null),
            },
        }
    }

    /// Write through a binding written in the template of `owner`
    pub fn assign(&mut self, binding: &Binding, owner: ElementId, value: Value) -> Result<(), BindingError> {
        match binding {
            Binding::Property(path) => path.set(&mut self.properties, value),
            Binding::Parameter(name) => match self.parameter_binding(owner, name) {
                Some((inner, container)) => {
                    let inner = inner.clone();
                    self.assign(&inner, container, value)
                }
                None => Ok(()),
            },
            other => Err(BindingError::NotAssignable {
                expression: other.to_string(),
            }),
        }
    }

    /// The binding of a formal parameter plus the element it must be
    /// evaluated against (the container, where it was written)
    fn parameter_binding(&self, element: ElementId, name: &str) -> Option<(&Binding, ElementId)> {
        let resources = &self.slot(element).ok()?.resources;
        let binding = resources.parameters.get(&name.to_ascii_lowercase())?;
        Some((binding, resources.container.unwrap_or(element)))
    }

    pub fn is_bound(&self, element: ElementId, name: &str) -> bool {
        self.parameter_binding(element, name).is_some()
    }

    /// Current value of a formal parameter; `None` when unbound
    pub fn parameter(&self, element: ElementId, name: &str) -> Result<Option<Value>, BindingError> {
        match self.parameter_binding(element, name) {
            Some((binding, container)) => self.evaluate(binding, container).map(Some),
            None => Ok(None),
        }
    }

    /// Write a formal parameter; writes to unbound parameters are dropped
    pub fn set_parameter(&mut self, element: ElementId, name: &str, value: Value) -> Result<(), BindingError> {
        match self.parameter_binding(element, name) {
            Some((binding, container)) => {
                let binding = binding.clone();
                self.assign(&binding, container, value)
            }
            None => Ok(()),
        }
    }

    /// Informal parameters evaluated to attribute strings
    pub fn informal_attributes(&self, element: ElementId) -> Result<Vec<(String, String)>, BindingError> {
        let Ok(slot) = self.slot(element) else {
            return Ok(Vec::new());
        };
        let container = slot.resources.container.unwrap_or(element);
        slot.resources
            .informal_parameters
            .iter()
            .map(|(name, binding)| {
                self.evaluate(binding, container)
                    .map(|value| (name.clone(), display_value(&value)))
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Component access
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn take_component(&mut self, element: ElementId) -> Result<Box<dyn Component>, PageError> {
        let slot = self.slot_mut(element)?;
        slot.component.take().ok_or_else(|| PageError::ComponentBusy {
            complete_id: slot.resources.complete_id.clone(),
        })
    }

    pub(crate) fn restore_component(&mut self, element: ElementId, component: Box<dyn Component>) {
        if let Some(slot) = self.elements.get_mut(element.0) {
            slot.component = Some(component);
        }
    }

    /// Borrow a component that is not currently executing a callback
    pub fn component(&self, element: ElementId) -> Result<&dyn Component, PageError> {
        let slot = self.slot(element)?;
        slot.component
            .as_deref()
            .ok_or_else(|| PageError::ComponentBusy {
                complete_id: slot.resources.complete_id.clone(),
            })
    }

    pub fn is_busy(&self, element: ElementId) -> bool {
        self.slot(element)
            .map(|slot| slot.component.is_none())
            .unwrap_or(false)
    }

    /// Mark a component as rendering; returns its complete id
    pub(crate) fn begin_rendering(&mut self, element: ElementId) -> Result<String, PageError> {
        let slot = self.slot_mut(element)?;
        if slot.rendering {
            return Err(PageError::AlreadyRendering {
                complete_id: slot.resources.complete_id.clone(),
            });
        }
        slot.rendering = true;
        let complete_id = slot.resources.complete_id.clone();
        self.increment_dirty_count();
        Ok(complete_id)
    }

    pub(crate) fn end_rendering(&mut self, element: ElementId) {
        if let Some(slot) = self.elements.get_mut(element.0) {
            slot.rendering = false;
        }
        self.decrement_dirty_count();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Dirty tracking and lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Note that the page holds request state that must not be pooled
    pub fn increment_dirty_count(&mut self) {
        self.dirty_count += 1;
    }

    pub fn decrement_dirty_count(&mut self) {
        if self.dirty_count == 0 {
            tracing::warn!(page = %self.name, "Dirty count decremented below zero");
            return;
        }
        self.dirty_count -= 1;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_count > 0
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty_count
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn add_listener(&mut self, listener: Box<dyn PageLifecycleListener>) {
        self.listeners.push(listener);
    }

    /// Called when the page is checked out for a request
    pub fn attach(&mut self) {
        self.attached = true;
        for listener in &mut self.listeners {
            listener.attached(&self.name);
        }
    }

    /// Reset per-request state before the page goes back to the pool
    pub fn detach(&mut self) {
        for slot in &mut self.elements {
            slot.rendering = false;
            if let Some(component) = slot.component.as_mut() {
                component.page_detached();
            }
        }
        self.properties = self.initial_properties.clone();
        self.attached = false;
        for listener in &mut self.listeners {
            listener.detached(&self.name);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events and form actions
    // ─────────────────────────────────────────────────────────────────────

    /// Trigger an event on `target`, bubbling up through its containers
    ///
    /// Bubbling stops at the first handler that aborts with a result. While
    /// bubbling, `source` is the id of the child the event came through.
    pub fn trigger_event(
        &mut self,
        target: ElementId,
        event: ComponentEvent,
        environment: &mut Environment,
        request: &RequestGlobals,
    ) -> anyhow::Result<EventTrigger> {
        self.dispatch_event(Some(target), event, true, environment, request)
    }

    /// Trigger an event from `from` on its container, with `from` as source
    pub fn bubble_event(
        &mut self,
        from: ElementId,
        mut event: ComponentEvent,
        environment: &mut Environment,
        request: &RequestGlobals,
    ) -> anyhow::Result<EventTrigger> {
        let resources = self.resources(from)?;
        event.source = resources.id.clone();
        let container = resources.container;
        self.dispatch_event(container, event, false, environment, request)
    }

    fn dispatch_event(
        &mut self,
        start: Option<ElementId>,
        mut event: ComponentEvent,
        start_is_target: bool,
        environment: &mut Environment,
        request: &RequestGlobals,
    ) -> anyhow::Result<EventTrigger> {
        let mut trigger = EventTrigger::default();
        let mut current = start;
        let mut is_target = start_is_target;

        while let Some(element) = current {
            let (id, container, complete_id) = {
                let resources = self.resources(element)?;
                (
                    resources.id.clone(),
                    resources.container,
                    resources.complete_id.clone(),
                )
            };

            if self.is_busy(element) && !is_target {
                // A container whose own callback raised this event
                tracing::trace!(component = %complete_id, event = %event.name, "Skipping busy container");
            } else {
                let mut component = self.take_component(element)?;
                let outcome = {
                    let mut scope = EventScope {
                        element,
                        page: &mut *self,
                        environment: &mut *environment,
                        request,
                    };
                    component.on_event(&event, &mut scope)
                };
                self.restore_component(element, component);

                match outcome? {
                    EventOutcome::NotHandled => {}
                    EventOutcome::Handled => trigger.handled = true,
                    EventOutcome::Abort(result) => {
                        tracing::debug!(
                            component = %complete_id,
                            event = %event.name,
                            "Event aborted with {}",
                            result.describe()
                        );
                        trigger.handled = true;
                        trigger.result = Some(result);
                        trigger.handled_by = Some(complete_id);
                        return Ok(trigger);
                    }
                }
            }

            event.source = id;
            current = container;
            is_target = false;
        }

        Ok(trigger)
    }

    /// Replay one recorded form action on a component
    pub fn execute_action(
        &mut self,
        element: ElementId,
        action: &FormAction,
        environment: &mut Environment,
        request: &RequestGlobals,
    ) -> anyhow::Result<()> {
        let mut component = self.take_component(element)?;
        let result = {
            let mut scope = EventScope {
                element,
                page: &mut *self,
                environment,
                request,
            };
            component.execute_action(action, &mut scope)
        };
        self.restore_component(element, component);
        result
    }

    /// Ask the page for its activation context through the passivate event
    pub fn collect_activation_context(
        &mut self,
        environment: &mut Environment,
        request: &RequestGlobals,
    ) -> anyhow::Result<Vec<String>> {
        let root = self.root;
        let trigger = self.trigger_event(
            root,
            ComponentEvent::new("passivate", Vec::new()),
            environment,
            request,
        )?;
        Ok(match trigger.result {
            Some(EventResult::Context(values)) => values,
            _ => Vec::new(),
        })
    }

    /// Bundle the page with request state for deferred form callbacks
    pub fn action_context<'a>(
        &'a mut self,
        environment: &'a mut Environment,
        request: &'a RequestGlobals,
    ) -> ActionContext<'a> {
        ActionContext {
            page: self,
            environment,
            request,
        }
    }
}
