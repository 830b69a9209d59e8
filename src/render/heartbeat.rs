//! Deferred-execution boundary
//!
//! A heartbeat groups work that must wait until a logical unit finishes: one
//! loop iteration, one form. Commands deferred inside a heartbeat are handed
//! back, in registration order, when that heartbeat ends. Heartbeats nest.

use std::fmt;

use super::queue::RenderCommand;

/// `end()` without a matching `begin()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatError;

impl fmt::Display for HeartbeatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Heartbeat ended without a matching begin")
    }
}

impl std::error::Error for HeartbeatError {}

#[derive(Default)]
pub struct Heartbeat {
    stack: Vec<Vec<Box<dyn RenderCommand>>>,
}

impl fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heartbeat")
            .field("depth", &self.stack.len())
            .finish()
    }
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.stack.push(Vec::new());
    }

    /// Queue a command to run when the current heartbeat ends
    ///
    /// Outside any heartbeat the command is returned to the caller to run
    /// immediately.
    pub fn defer(&mut self, command: Box<dyn RenderCommand>) -> Option<Box<dyn RenderCommand>> {
        match self.stack.last_mut() {
            Some(current) => {
                current.push(command);
                None
            }
            None => Some(command),
        }
    }

    /// End the current heartbeat, returning its deferred commands in order
    pub fn end(&mut self) -> Result<Vec<Box<dyn RenderCommand>>, HeartbeatError> {
        self.stack.pop().ok_or(HeartbeatError)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
