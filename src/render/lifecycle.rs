//! Component lifecycle driver
//!
//! Each stage of a component's render is a separate `PhaseCommand` on the
//! queue. `Begin` pushes `After` before the content, so the LIFO order runs
//! the whole content (body, template or block) before `After` executes.

use super::{RenderCommand, RenderContext, RenderQueue};
use crate::component::{Component, Flow, RenderScope};
use crate::page::element::push_all;
use crate::page::ElementId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Begin,
    After,
    Cleanup,
    /// Bookkeeping once cleanup has let the component go
    Finish,
}

#[derive(Debug, Clone, Copy)]
pub struct PhaseCommand {
    pub element: ElementId,
    pub phase: Phase,
}

impl PhaseCommand {
    fn next(&self, phase: Phase) -> Self {
        Self {
            element: self.element,
            phase,
        }
    }
}

/// Start rendering a component element
pub(crate) fn start_component(
    element: ElementId,
    cx: &mut RenderContext<'_>,
    queue: &mut RenderQueue,
) -> anyhow::Result<()> {
    let complete_id = cx.page.begin_rendering(element)?;
    queue.start_component(complete_id);
    queue.push(PhaseCommand {
        element,
        phase: Phase::Setup,
    });
    Ok(())
}

/// Run one callback with the component taken out of its slot
fn invoke<F>(element: ElementId, cx: &mut RenderContext<'_>, callback: F) -> anyhow::Result<Flow>
where
    F: FnOnce(&mut dyn Component, &mut RenderScope<'_>) -> anyhow::Result<Flow>,
{
    let mut component = cx.page.take_component(element)?;
    let result = {
        let mut scope = RenderScope::new(element, cx);
        callback(component.as_mut(), &mut scope)
    };
    cx.page.restore_component(element, component);
    result
}

impl RenderCommand for PhaseCommand {
    fn render(self: Box<Self>, cx: &mut RenderContext<'_>, queue: &mut RenderQueue) -> anyhow::Result<()> {
        let element = self.element;
        match self.phase {
            Phase::Setup => match invoke(element, cx, |c, s| c.setup_render(s))? {
                Flow::Halt => queue.push(self.next(Phase::Cleanup)),
                _ => queue.push(self.next(Phase::Begin)),
            },
            Phase::Begin => {
                let flow = invoke(element, cx, |c, s| c.begin_render(s))?;
                queue.push(self.next(Phase::After));
                match flow {
                    Flow::Continue => {
                        let content = match cx.page.template(element)? {
                            Some(template) => template,
                            None => cx.page.body(element)?,
                        };
                        push_all(queue, &content);
                    }
                    Flow::Halt => {}
                    Flow::Render(block) => {
                        let content = cx.page.resolve_block(element, &block)?;
                        push_all(queue, &content);
                    }
                }
            }
            Phase::After => match invoke(element, cx, |c, s| c.after_render(s))? {
                Flow::Halt => queue.push(self.next(Phase::Begin)),
                _ => queue.push(self.next(Phase::Cleanup)),
            },
            Phase::Cleanup => match invoke(element, cx, |c, s| c.cleanup_render(s))? {
                Flow::Halt => queue.push(self.next(Phase::Setup)),
                _ => queue.push(self.next(Phase::Finish)),
            },
            Phase::Finish => {
                cx.page.end_rendering(element);
                queue.end_component();
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{:?}[{}]", self.phase, self.element)
    }
}

#[cfg(test)]
mod tests;
