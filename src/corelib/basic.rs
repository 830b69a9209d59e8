//! Components that only write markup: `Any`, `Output`, `Delegate`

use serde_json::Value;

use crate::component::{Component, Flow, RenderScope};
use crate::page::display_value;

/// An arbitrary element carrying the informal parameters as attributes
#[derive(Debug, Default)]
pub struct Any;

impl Component for Any {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["element"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let element = scope
            .parameter_string("element")?
            .unwrap_or_else(|| "div".to_string());
        let attributes = scope.informal_attributes()?;
        scope.writer.element(&element, attributes);
        Ok(Flow::Continue)
    }

    fn after_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        scope.writer.end()?;
        Ok(Flow::Continue)
    }
}

/// Writes a value as escaped text, optionally inside an element
#[derive(Debug, Default)]
pub struct Output;

impl Component for Output {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["value", "element", "raw"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let text = display_value(&scope.parameter("value")?.unwrap_or(Value::Null));
        let element = scope.parameter_string("element")?;
        let raw = scope.parameter_flag("raw", false)?;

        if let Some(element) = &element {
            let attributes = scope.informal_attributes()?;
            scope.writer.element(element, attributes);
        }
        if raw {
            scope.writer.write_raw(&text);
        } else {
            scope.writer.write(&text);
        }
        if element.is_some() {
            scope.writer.end()?;
        }
        Ok(Flow::Halt)
    }
}

/// Renders whatever block its `to` parameter names
#[derive(Debug, Default)]
pub struct Delegate;

impl Component for Delegate {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["to"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        match scope.parameter_string("to")? {
            Some(block) if !block.is_empty() => Ok(Flow::Render(block)),
            _ => Ok(Flow::Halt),
        }
    }
}
