//! Template model
//!
//! Templates are built in code with a small fluent builder:
//!
//! ```ignore
//! Template::new()
//!     .element("ul", &[], Template::new()
//!         .embed(Embedded::of("Loop").id("rows").param("source", "prop:entries")
//!             .body(Template::new().element("li", &[], Template::new().expansion("value")))))
//! ```

/// One node of a template
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Text(String),
    /// `${expression}`; bare expressions are `prop:` bindings
    Expansion(String),
    Element {
        name: String,
        attributes: Vec<(String, String)>,
        children: Vec<TemplateNode>,
    },
    Component(Embedded),
    Block {
        id: String,
        children: Vec<TemplateNode>,
    },
    /// Where a component template renders the body of its instance
    Body,
}

/// A component instance embedded in a template
#[derive(Debug, Clone, PartialEq)]
pub struct Embedded {
    pub id: Option<String>,
    pub component_type: String,
    pub parameters: Vec<(String, String)>,
    pub body: Vec<TemplateNode>,
}

impl Embedded {
    pub fn of(component_type: &str) -> Self {
        Self {
            id: None,
            component_type: component_type.to_string(),
            parameters: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn param(mut self, name: &str, expression: &str) -> Self {
        self.parameters.push((name.to_string(), expression.to_string()));
        self
    }

    pub fn body(mut self, body: Template) -> Self {
        self.body = body.nodes;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    nodes: Vec<TemplateNode>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: &str) -> Self {
        self.nodes.push(TemplateNode::Text(text.to_string()));
        self
    }

    pub fn expansion(mut self, expression: &str) -> Self {
        self.nodes.push(TemplateNode::Expansion(expression.to_string()));
        self
    }

    pub fn element(mut self, name: &str, attributes: &[(&str, &str)], content: Template) -> Self {
        self.nodes.push(TemplateNode::Element {
            name: name.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            children: content.nodes,
        });
        self
    }

    pub fn embed(mut self, component: Embedded) -> Self {
        self.nodes.push(TemplateNode::Component(component));
        self
    }

    pub fn block(mut self, id: &str, content: Template) -> Self {
        self.nodes.push(TemplateNode::Block {
            id: id.to_string(),
            children: content.nodes,
        });
        self
    }

    pub fn body(mut self) -> Self {
        self.nodes.push(TemplateNode::Body);
        self
    }

    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
