//! Markup output: a small DOM plus the writer that builds it
//!
//! Render commands never produce strings directly. They open and close
//! elements on a `MarkupWriter`, which records them in a `Document` arena.
//! Keeping a tree (instead of streaming text) lets a component come back to
//! an element it wrote earlier and set an attribute once the value is known,
//! e.g. a hidden field whose value is the action log of everything rendered
//! inside it.

use std::fmt;

/// Elements rendered without a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];

/// Node identifier (index into the document arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum Node {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
        children: Vec<NodeId>,
    },
    Text(String),
    Raw(String),
}

/// Errors raised by misuse of the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    /// `end()` called with no open element
    NoOpenElement,
    /// Attribute targeted a node that is not an element
    NotAnElement,
}

impl fmt::Display for MarkupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOpenElement => write!(f, "End of element requested with no element open"),
            Self::NotAnElement => write!(f, "Attributes can only be set on element nodes"),
        }
    }
}

impl std::error::Error for MarkupError {}

/// Output document: an arena of nodes with top-level roots
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl Document {
    fn add(&mut self, parent: Option<NodeId>, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        match parent {
            Some(parent) => {
                if let Node::Element { children, .. } = &mut self.nodes[parent.0] {
                    children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        id
    }

    /// Attribute value of an element, if set
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.nodes.get(node.0)? {
            Node::Element { attributes, .. } => attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Serialize the whole document
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            self.write_node(*root, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0] {
            Node::Text(text) => escape_into(text, false, out),
            Node::Raw(raw) => out.push_str(raw),
            Node::Element {
                name,
                attributes,
                children,
            } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');

                if VOID_ELEMENTS.contains(&name.as_str()) && children.is_empty() {
                    return;
                }

                for child in children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// Builds a `Document` one element at a time
#[derive(Debug, Default)]
pub struct MarkupWriter {
    document: Document,
    open: Vec<NodeId>,
}

impl MarkupWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new element beneath the current one; it becomes current
    pub fn element<K, V>(&mut self, name: &str, attributes: impl IntoIterator<Item = (K, V)>) -> NodeId
    where
        K: Into<String>,
        V: Into<String>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let id = self.document.add(
            self.open.last().copied(),
            Node::Element {
                name: name.to_string(),
                attributes,
                children: Vec::new(),
            },
        );
        self.open.push(id);
        id
    }

    /// Close the current element
    pub fn end(&mut self) -> Result<NodeId, MarkupError> {
        self.open.pop().ok_or(MarkupError::NoOpenElement)
    }

    /// Write escaped text into the current element
    pub fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.document
            .add(self.open.last().copied(), Node::Text(text.to_string()));
    }

    /// Write markup verbatim
    pub fn write_raw(&mut self, markup: &str) {
        self.document
            .add(self.open.last().copied(), Node::Raw(markup.to_string()));
    }

    /// Set (or overwrite) an attribute on a previously written element
    pub fn attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), MarkupError> {
        match self.document.nodes.get_mut(node.0) {
            Some(Node::Element { attributes, .. }) => {
                match attributes.iter_mut().find(|(n, _)| n == name) {
                    Some((_, existing)) => *existing = value.to_string(),
                    None => attributes.push((name.to_string(), value.to_string())),
                }
                Ok(())
            }
            _ => Err(MarkupError::NotAnElement),
        }
    }

    /// The element new content is written into, if any
    pub fn current_element(&self) -> Option<NodeId> {
        self.open.last().copied()
    }

    /// Number of elements still open
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Serialize everything written so far
    pub fn to_markup(&self) -> String {
        self.document.to_markup()
    }

    pub fn into_document(self) -> Document {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_ATTRS: [(&str, &str); 0] = [];

    #[test]
    fn test_nested_elements_and_text() {
        let mut writer = MarkupWriter::new();
        writer.element("div", [("class", "box")]);
        writer.element("p", NO_ATTRS);
        writer.write("a < b & c");
        writer.end().unwrap();
        writer.end().unwrap();

        assert_eq!(
            writer.to_markup(),
            "<div class=\"box\"><p>a &lt; b &amp; c</p></div>"
        );
    }

    #[test]
    fn test_void_elements_have_no_end_tag() {
        let mut writer = MarkupWriter::new();
        writer.element("input", [("type", "text"), ("value", "say \"hi\"")]);
        writer.end().unwrap();
        assert_eq!(
            writer.to_markup(),
            "<input type=\"text\" value=\"say &quot;hi&quot;\">"
        );
    }

    #[test]
    fn test_late_attribute_update() {
        let mut writer = MarkupWriter::new();
        writer.element("form", NO_ATTRS);
        let hidden = writer.element("input", [("type", "hidden")]);
        writer.end().unwrap();
        writer.write("body");
        writer.attribute(hidden, "value", "later").unwrap();
        writer.end().unwrap();

        assert_eq!(
            writer.to_markup(),
            "<form><input type=\"hidden\" value=\"later\">body</form>"
        );
        assert_eq!(writer.document().attribute(hidden, "value"), Some("later"));
    }

    #[test]
    fn test_end_without_open_element() {
        let mut writer = MarkupWriter::new();
        assert_eq!(writer.end(), Err(MarkupError::NoOpenElement));
    }

    #[test]
    fn test_raw_is_not_escaped() {
        let mut writer = MarkupWriter::new();
        writer.write_raw("<!DOCTYPE html>");
        assert_eq!(writer.to_markup(), "<!DOCTYPE html>");
    }
}
