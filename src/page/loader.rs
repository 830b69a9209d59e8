//! Page assembly
//!
//! Turns a `PageDefinition` plus the registered component types into a
//! `Page`: every component in a template becomes an element slot, every run
//! of static markup becomes `PageElement`s.
//!
//! Ownership rules:
//! - a component's body belongs to the template it was written in, so
//!   components inside a body are children of that template's owner
//! - components inside a component type's own template are children of the
//!   component instance
//! - blocks are registered on the owner of the template declaring them

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use super::{
    Binding, ComponentResources, ElementId, Page, PageElement, PageError, Template, TemplateNode,
};
use crate::component::Component;
use crate::ids::IdAllocator;

pub type ComponentFactory = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>;

/// A page type: its root component and template
#[derive(Clone)]
pub struct PageDefinition {
    pub name: String,
    pub factory: ComponentFactory,
    pub template: Template,
    /// Property store contents at checkout, restored on every detach
    pub properties: Value,
}

impl fmt::Debug for PageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PageDefinition {
    pub fn new<C, F>(name: &str, factory: F, template: Template) -> Self
    where
        C: Component + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Component>),
            template,
            properties: Value::Object(Default::default()),
        }
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }
}

/// A component type usable from templates
#[derive(Clone)]
pub struct ComponentDefinition {
    pub name: String,
    pub factory: ComponentFactory,
    pub template: Option<Template>,
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .field("has_template", &self.template.is_some())
            .finish()
    }
}

impl ComponentDefinition {
    pub fn new<C, F>(name: &str, factory: F) -> Self
    where
        C: Component + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Component>),
            template: None,
        }
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }
}

/// Known component types, looked up case-insensitively
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    types: HashMap<String, Arc<ComponentDefinition>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ComponentDefinition) {
        tracing::trace!("Registered component type {}", definition.name);
        self.types
            .insert(definition.name.to_ascii_lowercase(), Arc::new(definition));
    }

    pub fn get(&self, component_type: &str) -> Option<Arc<ComponentDefinition>> {
        self.types.get(&component_type.to_ascii_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Known pages, looked up case-insensitively
#[derive(Debug, Clone, Default)]
pub struct PageRegistry {
    pages: BTreeMap<String, Arc<PageDefinition>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: PageDefinition) {
        self.pages
            .insert(definition.name.to_ascii_lowercase(), Arc::new(definition));
    }

    pub fn get(&self, name: &str) -> Option<Arc<PageDefinition>> {
        self.pages.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Name as registered, for any capitalization of it
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.pages
            .get(&name.to_ascii_lowercase())
            .map(|definition| definition.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pages.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        self.pages.values().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Creates fresh page instances from definitions
#[derive(Debug, Clone)]
pub struct PageLoader {
    pages: Arc<PageRegistry>,
    components: Arc<ComponentRegistry>,
}

impl PageLoader {
    pub fn new(pages: Arc<PageRegistry>, components: Arc<ComponentRegistry>) -> Self {
        Self { pages, components }
    }

    pub fn pages(&self) -> &Arc<PageRegistry> {
        &self.pages
    }

    /// Build a new instance of the named page
    pub fn load(&self, name: &str, locale: &str) -> Result<Page, PageError> {
        let started = Instant::now();
        let definition = self.pages.get(name).ok_or_else(|| PageError::UnknownPage {
            name: name.to_string(),
        })?;

        let mut page = Page::new(&definition.name, locale, (definition.factory)());
        page.set_initial_properties(definition.properties.clone());

        let root = page.root();
        let mut assembly = Assembly {
            components: &self.components,
            page,
            stack: vec![definition.name.clone()],
        };
        let mut ids = IdAllocator::new();
        reserve_explicit_ids(definition.template.nodes(), &mut ids)?;
        let content = assembly.assemble(root, definition.template.nodes(), &mut ids)?;
        assembly.page.set_template(root, content)?;

        let page = assembly.page;
        tracing::debug!(
            page = %page.name(),
            locale,
            components = page.element_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded page instance"
        );
        Ok(page)
    }
}

struct Assembly<'a> {
    components: &'a ComponentRegistry,
    page: Page,
    /// Component types whose templates are being assembled, outermost first
    stack: Vec<String>,
}

impl Assembly<'_> {
    fn assemble(
        &mut self,
        owner: ElementId,
        nodes: &[TemplateNode],
        ids: &mut IdAllocator,
    ) -> Result<Vec<PageElement>, PageError> {
        let mut out = Vec::new();
        for node in nodes {
            match node {
                TemplateNode::Text(text) => out.push(PageElement::Text(Arc::from(text.as_str()))),
                TemplateNode::Expansion(expression) => {
                    let binding = self.binding(owner, expression, "prop")?;
                    out.push(PageElement::Expansion { binding, owner });
                }
                TemplateNode::Element {
                    name,
                    attributes,
                    children,
                } => {
                    out.push(PageElement::StartElement {
                        name: Arc::from(name.as_str()),
                        attributes: Arc::from(attributes.clone()),
                    });
                    out.extend(self.assemble(owner, children, ids)?);
                    out.push(PageElement::EndElement);
                }
                TemplateNode::Component(embedded) => {
                    let element = self.component(owner, embedded, ids)?;
                    out.push(PageElement::Component(element));
                }
                TemplateNode::Block { id, children } => {
                    let content = self.assemble(owner, children, ids)?;
                    self.page.add_block(owner, id, content)?;
                }
                TemplateNode::Body => out.push(PageElement::Body(owner)),
            }
        }
        Ok(out)
    }

    fn component(
        &mut self,
        owner: ElementId,
        embedded: &super::Embedded,
        ids: &mut IdAllocator,
    ) -> Result<ElementId, PageError> {
        let definition = self.components.get(&embedded.component_type).ok_or_else(|| {
            PageError::UnknownComponentType {
                page: self.page.name().to_string(),
                component_type: embedded.component_type.clone(),
            }
        })?;

        let id = match &embedded.id {
            Some(id) => id.clone(),
            None => ids.allocate(&definition.name.to_ascii_lowercase()),
        };
        let owner_nested = self.page.resources(owner)?.nested_id.clone();
        let nested_id = if owner_nested.is_empty() {
            id.clone()
        } else {
            format!("{}.{}", owner_nested, id)
        };
        let complete_id = format!("{}:{}", self.page.name(), nested_id);

        let component = (definition.factory)();
        let formal = component.formal_parameters();
        let mut parameters = HashMap::new();
        let mut informal_parameters = Vec::new();
        for (name, expression) in &embedded.parameters {
            let binding = Binding::parse(expression, "literal").map_err(|e| {
                PageError::InvalidBinding {
                    complete_id: complete_id.clone(),
                    expression: expression.clone(),
                    message: e.to_string(),
                }
            })?;
            if formal.iter().any(|f| f.eq_ignore_ascii_case(name)) {
                parameters.insert(name.to_ascii_lowercase(), binding);
            } else {
                informal_parameters.push((name.clone(), binding));
            }
        }

        let element = self.page.add_element(
            ComponentResources {
                id: id.clone(),
                nested_id,
                complete_id,
                component_type: definition.name.clone(),
                container: Some(owner),
                parameters,
                informal_parameters,
            },
            component,
        );
        self.page.add_child(owner, &id, element)?;

        let body = self.assemble(owner, &embedded.body, ids)?;
        self.page.set_body(element, body)?;

        if let Some(template) = &definition.template {
            if self
                .stack
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&definition.name))
            {
                return Err(PageError::RecursiveTemplate {
                    component_type: definition.name.clone(),
                });
            }
            self.stack.push(definition.name.clone());
            let mut own_ids = IdAllocator::new();
            reserve_explicit_ids(template.nodes(), &mut own_ids)?;
            let content = self.assemble(element, template.nodes(), &mut own_ids)?;
            self.stack.pop();
            self.page.set_template(element, content)?;
        }

        Ok(element)
    }

    fn binding(&self, owner: ElementId, expression: &str, default_prefix: &str) -> Result<Binding, PageError> {
        Binding::parse(expression, default_prefix).map_err(|e| PageError::InvalidBinding {
            complete_id: self
                .page
                .resources(owner)
                .map(|r| r.complete_id.clone())
                .unwrap_or_default(),
            expression: expression.to_string(),
            message: e.to_string(),
        })
    }
}

/// Reserve the explicit ids of one template before any anonymous id is
/// allocated, so `loop` written by hand wins over a generated `loop`
fn reserve_explicit_ids(nodes: &[TemplateNode], ids: &mut IdAllocator) -> Result<(), PageError> {
    for node in nodes {
        match node {
            TemplateNode::Component(embedded) => {
                if let Some(id) = &embedded.id {
                    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                        return Err(PageError::InvalidId { id: id.clone() });
                    }
                    ids.reserve(&id.to_ascii_lowercase());
                }
                reserve_explicit_ids(&embedded.body, ids)?;
            }
            TemplateNode::Element { children, .. } | TemplateNode::Block { children, .. } => {
                reserve_explicit_ids(children, ids)?;
            }
            _ => {}
        }
    }
    Ok(())
}
