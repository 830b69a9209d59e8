//! Render pipeline
//!
//! A page render pushes the root component onto a fresh `RenderQueue` and
//! drains it. Everything a command needs travels in one `RenderContext`:
//! the page being rendered, the markup writer, the request-scoped
//! `Environment` and the request itself.

pub mod environment;
pub mod heartbeat;
pub mod lifecycle;
pub mod queue;

use std::time::Instant;

use crate::ids::IdAllocator;
use crate::markup::MarkupWriter;
use crate::page::{ElementId, Page, PageElement};
use crate::request::RequestGlobals;

pub use environment::{Environment, EnvironmentError};
pub use heartbeat::{Heartbeat, HeartbeatError};
pub use lifecycle::{Phase, PhaseCommand};
pub use queue::{command, RenderCommand, RenderQueue, RenderQueueError};

/// Per-render services that are not environmentals
#[derive(Debug, Default)]
pub struct RenderSupport {
    pub heartbeat: Heartbeat,
    /// Client-side element ids, unique across the whole document
    pub client_ids: IdAllocator,
}

/// Everything a render command can touch
pub struct RenderContext<'a> {
    pub page: &'a mut Page,
    pub writer: &'a mut MarkupWriter,
    pub environment: &'a mut Environment,
    pub request: &'a RequestGlobals,
    pub support: &'a mut RenderSupport,
}

/// Render a whole page, starting at its root component
pub fn render_page(
    page: &mut Page,
    environment: &mut Environment,
    request: &RequestGlobals,
) -> anyhow::Result<String> {
    let root = page.root();
    let name = page.name().to_string();
    render_elements(page, environment, request, &name, vec![PageElement::Component(root)])
}

/// Render one block, as used by partial (XHR) responses
///
/// The block is looked up on `owner` the same way a component substituting
/// a block for its body would.
pub fn render_block(
    page: &mut Page,
    owner: ElementId,
    block: &str,
    environment: &mut Environment,
    request: &RequestGlobals,
) -> anyhow::Result<String> {
    let content = page.resolve_block(owner, block)?;
    let label = format!("{} block {}", page.name(), block);
    render_elements(page, environment, request, &label, content.to_vec())
}

fn render_elements(
    page: &mut Page,
    environment: &mut Environment,
    request: &RequestGlobals,
    label: &str,
    elements: Vec<PageElement>,
) -> anyhow::Result<String> {
    let started = Instant::now();
    let mut writer = MarkupWriter::new();
    let mut support = RenderSupport::default();
    let mut queue = RenderQueue::new();

    for element in elements.into_iter().rev() {
        queue.push(element);
    }

    {
        let mut cx = RenderContext {
            page,
            writer: &mut writer,
            environment: &mut *environment,
            request,
            support: &mut support,
        };
        queue.run(&mut cx)?;
    }

    environment.ensure_balanced()?;
    if support.heartbeat.depth() != 0 {
        anyhow::bail!(
            "Render of {} finished with {} heartbeat(s) still open",
            label,
            support.heartbeat.depth()
        );
    }

    tracing::debug!(
        commands = queue.executed(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Rendered {}",
        label
    );

    Ok(writer.to_markup())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal context for exercising render commands in isolation

    use super::*;
    use crate::component::Component;
    use crate::request::Request;

    pub(crate) struct Blank;

    impl Component for Blank {}

    pub(crate) struct RenderHarness {
        pub writer: MarkupWriter,
        pub page: Page,
        pub environment: Environment,
        pub globals: RequestGlobals,
        pub support: RenderSupport,
    }

    impl RenderHarness {
        pub fn new() -> Self {
            Self {
                writer: MarkupWriter::new(),
                page: Page::new("Test", "en", Box::new(Blank)),
                environment: Environment::new(),
                globals: RequestGlobals::for_tests(Request::get("/test")),
                support: RenderSupport::default(),
            }
        }

        pub fn run(&mut self, queue: &mut RenderQueue) -> Result<(), RenderQueueError> {
            let mut cx = RenderContext {
                page: &mut self.page,
                writer: &mut self.writer,
                environment: &mut self.environment,
                request: &self.globals,
                support: &mut self.support,
            };
            queue.run(&mut cx)
        }
    }
}
