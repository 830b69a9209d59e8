//! Flow control: `If` and `Loop`

use serde_json::{json, Value};

use crate::component::{Component, EventScope, Flow, RenderScope};
use crate::form::{FormAction, FormError};
use crate::page::is_truthy;

/// Renders its body when `test` holds, otherwise the `else` block if given
#[derive(Debug, Default)]
pub struct If;

impl Component for If {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["test", "negate", "else"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let test = scope.parameter("test")?.map(|v| is_truthy(&v)).unwrap_or(false);
        let negate = scope.parameter_flag("negate", false)?;

        if test != negate {
            return Ok(Flow::Continue);
        }
        match scope.parameter_string("else")? {
            Some(block) if !block.is_empty() => Ok(Flow::Render(block)),
            _ => Ok(Flow::Halt),
        }
    }
}

/// Renders its body once per item of `source`
///
/// Each row sets `value` and `index` before the body renders. Inside a form
/// every row is also recorded as a `SetupIteration` action, so a submission
/// replays the fields of each row against the same item.
///
/// Every row renders inside its own heartbeat, so commands deferred by the
/// row (a `Label` waiting for its field) run before the next row starts.
#[derive(Debug, Default)]
pub struct Loop {
    rows: Vec<Value>,
    index: usize,
    in_row: bool,
}

impl Component for Loop {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["source", "value", "index", "formstate", "empty"]
    }

    fn setup_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        self.rows = match scope.parameter("source")? {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
            Some(other) => vec![other],
        };
        self.index = 0;
        Ok(Flow::Continue)
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let Some(row) = self.rows.get(self.index).cloned() else {
            return match scope.parameter_string("empty")? {
                Some(block) if !block.is_empty() => Ok(Flow::Render(block)),
                _ => Ok(Flow::Halt),
            };
        };

        let index = self.index;
        let record = scope
            .parameter_string("formstate")?
            .map_or(true, |state| !state.eq_ignore_ascii_case("none"));
        if record && scope.form_support().is_some() {
            scope.store_and_execute(&mut *self, FormAction::SetupIteration { index, value: row })?;
        } else {
            scope.set_parameter("index", json!(index))?;
            scope.set_parameter("value", row)?;
        }
        scope.heartbeat_begin();
        self.in_row = true;
        Ok(Flow::Continue)
    }

    fn after_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        if std::mem::take(&mut self.in_row) {
            scope.heartbeat_end()?;
        }
        self.index += 1;
        if self.index < self.rows.len() {
            Ok(Flow::Halt)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn cleanup_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        self.rows.clear();
        self.index = 0;
        self.in_row = false;
        Ok(Flow::Continue)
    }

    fn execute_action(&mut self, action: &FormAction, scope: &mut EventScope<'_>) -> anyhow::Result<()> {
        match action {
            FormAction::SetupIteration { index, value } => {
                scope.set_parameter("index", json!(index))?;
                scope.set_parameter("value", value.clone())
            }
            other => Err(FormError::UnsupportedAction {
                complete_id: scope.complete_id()?,
                action: other.kind().to_string(),
            }
            .into()),
        }
    }

    fn page_detached(&mut self) {
        self.rows.clear();
        self.index = 0;
        self.in_row = false;
    }
}
