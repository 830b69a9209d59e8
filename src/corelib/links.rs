//! Link components: `ActionLink`, `EventLink`, `PageLink`

use crate::component::{Component, Flow, RenderScope};
use crate::link::Link;

fn open_anchor(scope: &mut RenderScope<'_>, link: &Link) -> anyhow::Result<()> {
    let anchor = scope.parameter_string("anchor")?;
    let href = match anchor {
        Some(anchor) => link.clone().with_anchor(&anchor).to_uri(),
        None => link.to_uri(),
    };

    let mut attributes = vec![("href".to_string(), href)];
    attributes.extend(scope.informal_attributes()?);
    scope.writer.element("a", attributes);
    Ok(())
}

/// Triggers the `action` event on itself, bubbling to its container
#[derive(Debug, Default)]
pub struct ActionLink;

impl Component for ActionLink {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["context", "anchor"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let context = scope.parameter_context("context")?;
        let link = scope.event_link("action", context, false)?;
        open_anchor(scope, &link)?;
        Ok(Flow::Continue)
    }

    fn after_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        scope.writer.end()?;
        Ok(Flow::Continue)
    }
}

/// Triggers a named event on itself
#[derive(Debug, Default)]
pub struct EventLink;

impl Component for EventLink {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["event", "context", "anchor"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let event = match scope.parameter_string("event")? {
            Some(event) if !event.is_empty() => event,
            _ => scope.resources()?.id.clone(),
        };
        let context = scope.parameter_context("context")?;
        let link = scope.event_link(&event, context, false)?;
        open_anchor(scope, &link)?;
        Ok(Flow::Continue)
    }

    fn after_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        scope.writer.end()?;
        Ok(Flow::Continue)
    }
}

/// Renders another page; with no `context` the target page's own
/// activation context is used when it is the current page
#[derive(Debug, Default)]
pub struct PageLink;

impl Component for PageLink {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["page", "context", "anchor"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let page = scope
            .parameter_string("page")?
            .ok_or_else(|| anyhow::anyhow!("PageLink {} requires a 'page' parameter", scope.element))?;
        let context = if scope.page.is_bound(scope.element, "context") {
            Some(scope.parameter_context("context")?)
        } else {
            None
        };

        let link = scope.page_link(&page, context)?;
        open_anchor(scope, &link)?;
        Ok(Flow::Continue)
    }

    fn after_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        scope.writer.end()?;
        Ok(Flow::Continue)
    }
}
