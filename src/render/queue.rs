//! LIFO render queue
//!
//! Rendering a page never recurses on the call stack. Each unit of work is a
//! `RenderCommand`; executing one may push more. Because the queue is LIFO,
//! a command that wants "children, then my closing tag" pushes the closing
//! command first and the children after it.
//!
//! The queue also tracks which components are active so a failure deep in the
//! tree is reported with the component path that led to it.

use std::fmt;

use super::RenderContext;

/// A unit of rendering work, executed exactly once
pub trait RenderCommand {
    /// Execute, possibly pushing further commands
    fn render(self: Box<Self>, cx: &mut RenderContext<'_>, queue: &mut RenderQueue)
        -> anyhow::Result<()>;

    /// Short description used in error reports and trace logs
    fn describe(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("RenderCommand")
            .to_string()
    }
}

impl<F> RenderCommand for F
where
    F: FnOnce(&mut RenderContext<'_>, &mut RenderQueue) -> anyhow::Result<()>,
{
    fn render(
        self: Box<Self>,
        cx: &mut RenderContext<'_>,
        queue: &mut RenderQueue,
    ) -> anyhow::Result<()> {
        (*self)(cx, queue)
    }

    fn describe(&self) -> String {
        "closure".to_string()
    }
}

/// Pin a closure to the render command signature so its argument types are
/// inferred
pub fn command<F>(f: F) -> F
where
    F: FnOnce(&mut RenderContext<'_>, &mut RenderQueue) -> anyhow::Result<()>,
{
    f
}

/// Failure while draining the queue, with the active component path
#[derive(Debug)]
pub struct RenderQueueError {
    /// Description of the command that failed
    pub command: String,
    /// Complete ids of the components active at failure time, outermost first
    pub active_components: Vec<String>,
    /// Underlying failure
    pub cause: anyhow::Error,
}

impl fmt::Display for RenderQueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Render queue error in {}: {}", self.command, self.cause)?;
        if !self.active_components.is_empty() {
            write!(f, " [active: {}]", self.active_components.join(" > "))?;
        }
        Ok(())
    }
}

impl std::error::Error for RenderQueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// Single-threaded work stack of render commands
#[derive(Default)]
pub struct RenderQueue {
    commands: Vec<Box<dyn RenderCommand>>,
    active_components: Vec<String>,
    executed: usize,
}

impl fmt::Debug for RenderQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderQueue")
            .field("pending", &self.commands.len())
            .field("active_components", &self.active_components)
            .finish()
    }
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a command on top of the stack; it runs next
    pub fn push(&mut self, command: impl RenderCommand + 'static) {
        self.commands.push(Box::new(command));
    }

    /// Push an already boxed command
    pub fn push_boxed(&mut self, command: Box<dyn RenderCommand>) {
        self.commands.push(command);
    }

    /// Record that a component has started rendering
    pub fn start_component(&mut self, complete_id: impl Into<String>) {
        self.active_components.push(complete_id.into());
    }

    /// Record that the most recently started component has finished
    pub fn end_component(&mut self) {
        if self.active_components.pop().is_none() {
            tracing::warn!("end_component called with no active component");
        }
    }

    /// Components currently rendering, outermost first
    pub fn active_components(&self) -> &[String] {
        &self.active_components
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of commands executed so far
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Pop and execute commands until the stack is empty
    ///
    /// The first failure stops the run. It is wrapped once, here, with the
    /// active component ids. A `RenderQueueError` coming out of a nested
    /// queue keeps its cause and command, with this queue's active ids put
    /// in front of the nested path.
    pub fn run(&mut self, cx: &mut RenderContext<'_>) -> Result<(), RenderQueueError> {
        while let Some(command) = self.commands.pop() {
            let description = command.describe();
            tracing::trace!(
                depth = self.active_components.len(),
                "Executing {}",
                description
            );
            self.executed += 1;

            if let Err(error) = command.render(cx, self) {
                let error = match error.downcast::<RenderQueueError>() {
                    Ok(mut nested) => {
                        let mut path = self.active_components.clone();
                        path.append(&mut nested.active_components);
                        nested.active_components = path;
                        nested
                    }
                    Err(cause) => RenderQueueError {
                        command: description,
                        active_components: self.active_components.clone(),
                        cause,
                    },
                };

                tracing::error!(
                    "Render queue error in {} (active components: {:?}): {}",
                    error.command,
                    error.active_components,
                    error.cause
                );

                self.commands.clear();
                return Err(error);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::RenderHarness;
    use anyhow::anyhow;

    #[test]
    fn test_lifo_order_allows_wrapping() {
        let mut harness = RenderHarness::new();
        let mut queue = RenderQueue::new();

        queue.push(command(|cx, queue| {
            cx.writer.write("<open>");
            // Closing command first, children after: children run first
            queue.push(command(|cx, _| {
                cx.writer.write("<close>");
                Ok(())
            }));
            queue.push(command(|cx, _| {
                cx.writer.write("child");
                Ok(())
            }));
            Ok(())
        }));

        harness.run(&mut queue).unwrap();
        assert_eq!(harness.writer.to_markup(), "&lt;open&gt;child&lt;close&gt;");
        assert_eq!(queue.executed(), 3);
    }

    #[test]
    fn test_failure_reports_active_components() {
        let mut harness = RenderHarness::new();
        let mut queue = RenderQueue::new();

        queue.push(command(|_, queue| {
            queue.start_component("foo");
            queue.start_component("bar");
            queue.end_component();
            queue.start_component("baz");
            Err(anyhow!("Oops."))
        }));

        let err = harness.run(&mut queue).unwrap_err();
        assert_eq!(err.active_components, vec!["foo", "baz"]);
        assert_eq!(err.command, "closure");
        assert_eq!(err.cause.to_string(), "Oops.");
        assert!(err.to_string().contains("Render queue error in closure: Oops."));
    }

    #[test]
    fn test_failure_across_commands_keeps_component_path() {
        let mut harness = RenderHarness::new();
        let mut queue = RenderQueue::new();

        // foo contains bar contains baz; bar's own work finished before baz fails
        queue.push(command(|_, queue| {
            queue.start_component("foo");
            queue.push(command(|_, queue| {
                queue.start_component("baz");
                Err(anyhow!("baz failed"))
            }));
            queue.push(command(|_, queue| {
                queue.start_component("bar");
                queue.end_component();
                Ok(())
            }));
            Ok(())
        }));

        let err = harness.run(&mut queue).unwrap_err();
        assert_eq!(err.active_components, vec!["foo", "baz"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_nested_queue_error_extends_component_path() {
        let mut harness = RenderHarness::new();
        let mut queue = RenderQueue::new();

        queue.push(command(|cx, queue| {
            queue.start_component("outer");
            let mut nested = RenderQueue::new();
            nested.start_component("inner");
            nested.push(command(|_, _| Err(anyhow!("deep failure"))));
            nested.run(cx)?;
            Ok(())
        }));

        let err = harness.run(&mut queue).unwrap_err();
        assert_eq!(err.active_components, vec!["outer", "inner"]);
        assert_eq!(err.cause.to_string(), "deep failure");
        // Wrapped once: the cause is the original failure, not another queue error
        assert!(err.cause.downcast_ref::<RenderQueueError>().is_none());
    }
}
