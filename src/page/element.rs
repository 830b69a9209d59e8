//! Immutable render nodes built once per page load

use std::sync::Arc;

use super::{display_value, Binding, ElementId};
use crate::render::{lifecycle, RenderCommand, RenderContext, RenderQueue};

#[derive(Debug, Clone)]
pub enum PageElement {
    Text(Arc<str>),
    StartElement {
        name: Arc<str>,
        attributes: Arc<[(String, String)]>,
    },
    EndElement,
    /// `${...}` in a template, evaluated against the template's owner
    Expansion { binding: Binding, owner: ElementId },
    Component(ElementId),
    /// `<t:body/>` inside the template of the given component
    Body(ElementId),
}

/// Push a run of elements so that they execute in document order
pub fn push_all(queue: &mut RenderQueue, elements: &[PageElement]) {
    for element in elements.iter().rev() {
        queue.push(element.clone());
    }
}

impl RenderCommand for PageElement {
    fn render(self: Box<Self>, cx: &mut RenderContext<'_>, queue: &mut RenderQueue) -> anyhow::Result<()> {
        match *self {
            PageElement::Text(text) => cx.writer.write(&text),
            PageElement::StartElement { name, attributes } => {
                cx.writer.element(
                    &name,
                    attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                );
            }
            PageElement::EndElement => {
                cx.writer.end()?;
            }
            PageElement::Expansion { binding, owner } => {
                let value = cx.page.evaluate(&binding, owner)?;
                cx.writer.write(&display_value(&value));
            }
            PageElement::Component(element) => lifecycle::start_component(element, cx, queue)?,
            PageElement::Body(owner) => {
                let body = cx.page.body(owner)?;
                push_all(queue, &body);
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match self {
            PageElement::Text(_) => "Text".to_string(),
            PageElement::StartElement { name, .. } => format!("StartElement[{}]", name),
            PageElement::EndElement => "EndElement".to_string(),
            PageElement::Expansion { binding, .. } => format!("Expansion[{}]", binding),
            PageElement::Component(element) => format!("Component[{}]", element),
            PageElement::Body(owner) => format!("Body[{}]", owner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::RenderHarness;
    use serde_json::json;

    #[test]
    fn test_static_elements_render_in_order() {
        let mut harness = RenderHarness::new();
        let mut queue = RenderQueue::new();
        let elements = vec![
            PageElement::StartElement {
                name: Arc::from("p"),
                attributes: Arc::from(vec![("class".to_string(), "note".to_string())]),
            },
            PageElement::Text(Arc::from("Hello")),
            PageElement::EndElement,
        ];
        push_all(&mut queue, &elements);

        harness.run(&mut queue).unwrap();
        assert_eq!(harness.writer.to_markup(), "<p class=\"note\">Hello</p>");
    }

    #[test]
    fn test_expansion_reads_page_property() {
        let mut harness = RenderHarness::new();
        harness.page.set_property("greeting", json!("Hi <there>"));
        let root = harness.page.root();

        let mut queue = RenderQueue::new();
        queue.push(PageElement::Expansion {
            binding: Binding::parse("greeting", "prop").unwrap(),
            owner: root,
        });

        harness.run(&mut queue).unwrap();
        assert_eq!(harness.writer.to_markup(), "Hi &lt;there&gt;");
    }

    #[test]
    fn test_unbalanced_end_element_fails() {
        let mut harness = RenderHarness::new();
        let mut queue = RenderQueue::new();
        queue.push(PageElement::EndElement);

        let err = harness.run(&mut queue).unwrap_err();
        assert_eq!(err.command, "EndElement");
    }
}
