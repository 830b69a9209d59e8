//! Form controls: `TextField`, `Submit`, `Label`

use serde_json::Value;

use super::default_label;
use crate::component::{context_values, ActionContext, Component, EventScope, Field, Flow, RenderScope};
use crate::form::{FormAction, FormError, TrackerHandle, Validator, CANCEL_PARAMETER};
use crate::markup::NodeId;
use crate::page::{display_value, ElementId};
use crate::render::{command, RenderContext, RenderQueue};

fn unsupported(scope: &EventScope<'_>, action: &FormAction) -> anyhow::Error {
    match scope.complete_id() {
        Ok(complete_id) => FormError::UnsupportedAction {
            complete_id,
            action: action.kind().to_string(),
        }
        .into(),
        Err(e) => e.into(),
    }
}

/// Single line text input bound to `value`
///
/// On submit the posted text is checked against `validate`; valid input is
/// written back through the binding, invalid input is kept in the
/// validation tracker and shown again when the form re-renders.
#[derive(Debug, Default)]
pub struct TextField {
    client_id: Option<String>,
    control_name: Option<String>,
}

impl Component for TextField {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["value", "validate", "label", "type", "disabled"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let support = scope.require_form_support()?;
        let id = scope.resources()?.id.clone();
        let control_name = support.allocate_control_name(&id);
        let client_id = scope.allocate_client_id(&id);
        let validators = Validator::parse_list(&scope.parameter_string("validate")?.unwrap_or_default())?;

        let (input, error) = match scope.tracker() {
            Some(tracker) => {
                let tracker = tracker.borrow();
                (
                    tracker.input(&control_name).map(str::to_string),
                    tracker.field_error(&control_name).map(str::to_string),
                )
            }
            None => (None, None),
        };
        let value = match input {
            Some(input) => input,
            None => display_value(&scope.parameter("value")?.unwrap_or(Value::Null)),
        };

        let input_type = scope
            .parameter_string("type")?
            .unwrap_or_else(|| "text".to_string());
        let mut attributes = vec![
            ("type".to_string(), input_type),
            ("name".to_string(), control_name.clone()),
            ("id".to_string(), client_id.clone()),
            ("value".to_string(), value),
        ];
        if scope.parameter_flag("disabled", false)? {
            attributes.push(("disabled".to_string(), "disabled".to_string()));
        }
        if support.is_client_validation_enabled() {
            for validator in &validators {
                let (name, value) = validator.client_attribute();
                attributes.push((name.to_string(), value));
            }
        }
        if error.is_some() {
            attributes.push(("class".to_string(), "t-error".to_string()));
        }
        attributes.extend(scope.informal_attributes()?);

        scope.writer.element("input", attributes);
        scope.writer.end()?;
        if let Some(message) = error {
            scope
                .writer
                .element("span", [("class", "t-error-message")]);
            scope.writer.write(&message);
            scope.writer.end()?;
        }

        // Disabled fields post nothing, so there is nothing to process
        if !scope.parameter_flag("disabled", false)? {
            scope.store(FormAction::ProcessSubmission {
                control_name: control_name.clone(),
            })?;
        }
        self.control_name = Some(control_name);
        self.client_id = Some(client_id);
        Ok(Flow::Halt)
    }

    fn execute_action(&mut self, action: &FormAction, scope: &mut EventScope<'_>) -> anyhow::Result<()> {
        let FormAction::ProcessSubmission { control_name } = action else {
            return Err(unsupported(scope, action));
        };

        let submitted = scope
            .request_parameter(control_name)
            .unwrap_or_default()
            .to_string();
        let id = scope.resources()?.id.clone();
        let label = scope
            .parameter_string("label")?
            .unwrap_or_else(|| default_label(&id));
        let validators = Validator::parse_list(&scope.parameter_string("validate")?.unwrap_or_default())?;

        let tracker = scope.tracker();
        if let Some(tracker) = &tracker {
            tracker.borrow_mut().record_input(control_name, &submitted);
        }

        for validator in &validators {
            if let Err(message) = validator.check(&label, &submitted) {
                tracing::debug!(field = %control_name, "Validation failed: {}", message);
                if let Some(tracker) = &tracker {
                    tracker.borrow_mut().record_field_error(control_name, &message);
                }
                return Ok(());
            }
        }

        scope.set_parameter("value", Value::String(submitted))
    }

    fn page_detached(&mut self) {
        self.client_id = None;
        self.control_name = None;
    }

    fn as_field(&self) -> Option<&dyn Field> {
        Some(self)
    }
}

impl Field for TextField {
    fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    fn control_name(&self) -> Option<&str> {
        self.control_name.as_deref()
    }
}

/// Submit button; triggers `selected` (or `event`) once the form's fields
/// have all been processed
///
/// With `mode="cancel"` the button submits the form as a cancel submission:
/// fields are not processed and only cancel actions replay.
#[derive(Debug, Default)]
pub struct Submit;

impl Submit {
    fn is_cancel(mode: Option<String>) -> bool {
        mode.is_some_and(|m| m.eq_ignore_ascii_case("cancel"))
    }
}

impl Component for Submit {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["event", "context", "mode", "value", "defer"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let support = scope.require_form_support()?;
        let id = scope.resources()?.id.clone();
        let cancel = Self::is_cancel(scope.parameter_string("mode")?);
        let control_name = if cancel {
            CANCEL_PARAMETER.to_string()
        } else {
            support.allocate_control_name(&id)
        };
        let client_id = scope.allocate_client_id(&id);
        let label = scope
            .parameter_string("value")?
            .unwrap_or_else(|| default_label(&id));

        let mut attributes = vec![
            ("type".to_string(), "submit".to_string()),
            ("name".to_string(), control_name.clone()),
            ("id".to_string(), client_id),
            ("value".to_string(), label),
        ];
        attributes.extend(scope.informal_attributes()?);
        scope.writer.element("input", attributes);
        scope.writer.end()?;

        let action = FormAction::ProcessSubmission { control_name };
        if cancel {
            scope.store_cancel(action)?;
        } else {
            scope.store(action)?;
        }
        Ok(Flow::Halt)
    }

    fn execute_action(&mut self, action: &FormAction, scope: &mut EventScope<'_>) -> anyhow::Result<()> {
        let FormAction::ProcessSubmission { control_name } = action else {
            return Err(unsupported(scope, action));
        };
        // Only the button that was clicked is part of the submission
        if scope.request_parameter(control_name).is_none() {
            return Ok(());
        }

        let event = scope
            .parameter_string("event")?
            .unwrap_or_else(|| "selected".to_string());
        let context = scope
            .parameter("context")?
            .map(|v| context_values(&v))
            .unwrap_or_default();

        if !scope.parameter_flag("defer", true)? {
            scope.bubble(&event, context)?;
            return Ok(());
        }

        let element = scope.element;
        scope
            .require_form_support()?
            .defer(Box::new(move |cx: &mut ActionContext<'_>| {
                let trigger = cx.trigger(element, &event, context)?;
                if let Some(result) = trigger.result {
                    tracing::debug!("Ignoring {} returned from deferred {} event", result.describe(), event);
                }
                Ok(())
            }));
        Ok(())
    }
}

/// `<label>` for a field in the same container
///
/// The field renders after its label, so the `for` attribute is filled in
/// when the enclosing form's heartbeat ends.
#[derive(Debug, Default)]
pub struct Label;

impl Component for Label {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["for"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let field_id = scope
            .parameter_string("for")?
            .ok_or_else(|| anyhow::anyhow!("Label {} requires a 'for' parameter", scope.element))?;
        let container = scope.resources()?.container.unwrap_or(scope.element);
        let field = scope.page.find_child(container, &field_id).ok_or_else(|| {
            anyhow::anyhow!("Label 'for' names {}, which is not a component here", field_id)
        })?;

        let text = scope
            .page
            .parameter(field, "label")?
            .filter(|v| !v.is_null())
            .map(|v| display_value(&v))
            .unwrap_or_else(|| default_label(&field_id));

        let attributes = scope.informal_attributes()?;
        let node = scope.writer.element("label", attributes);
        scope.writer.write(&text);
        scope.writer.end()?;

        let tracker = scope.tracker();
        scope.defer(command(move |cx: &mut RenderContext<'_>, _queue: &mut RenderQueue| {
            link_label(cx, field, node, tracker.as_ref())
        }))?;
        Ok(Flow::Halt)
    }
}

fn link_label(
    cx: &mut RenderContext<'_>,
    field: ElementId,
    node: NodeId,
    tracker: Option<&TrackerHandle>,
) -> anyhow::Result<()> {
    let Some(field) = cx.page.component(field)?.as_field() else {
        tracing::warn!("Label target {} is not a form field", field);
        return Ok(());
    };
    match field.client_id() {
        Some(client_id) => cx.writer.attribute(node, "for", client_id)?,
        None => tracing::warn!("Label target has not rendered; no 'for' attribute written"),
    }
    if let (Some(tracker), Some(control_name)) = (tracker, field.control_name()) {
        if tracker.borrow().in_error(control_name) {
            cx.writer.attribute(node, "class", "t-error")?;
        }
    }
    Ok(())
}
