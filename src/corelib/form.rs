//! `Form` and `FormFragment`

use std::rc::Rc;

use crate::component::{
    Component, ComponentEvent, EventOutcome, EventResult, EventScope, Flow, RenderScope,
};
use crate::form::{
    decode_actions, replay, FormAction, FormError, FormSupport, FormSupportImpl, FragmentFormSupport,
    TrackerHandle, ValidationTracker, CANCEL_PARAMETER, FORM_DATA_PARAMETER, FORM_ID_PARAMETER,
};
use crate::markup::NodeId;

fn hidden<'a>(name: &'a str, value: &'a str) -> [(&'a str, &'a str); 3] {
    [("type", "hidden"), ("name", name), ("value", value)]
}

/// An HTML form whose submission is a component event on the form itself
///
/// Events bubbled to the container, in order:
///
/// ```text
/// render   prepareForRender, prepare
/// submit   prepareForSubmit, prepare
///          (stored actions replay, deferred actions run)
///          canceled                       cancel submissions stop here
///          validate
///          failure | success, then submit
/// ```
///
/// A failed validation renders the page again in the same request so the
/// fields can show the tracker's input and errors.
#[derive(Debug, Default)]
pub struct Form {
    tracker: ValidationTracker,
    form_node: Option<NodeId>,
}

impl Form {
    fn bubble_render(scope: &mut RenderScope<'_>, name: &str, context: &[String]) -> anyhow::Result<()> {
        let trigger = scope.bubble(name, context.to_vec())?;
        if let Some(result) = trigger.result {
            tracing::warn!(
                event = name,
                "Ignoring {} returned while the form renders",
                result.describe()
            );
        }
        Ok(())
    }

    /// Bubble an event during submission; an aborting handler's result ends
    /// the submission
    fn bubble_submit(
        scope: &mut EventScope<'_>,
        name: &str,
        context: &[String],
    ) -> anyhow::Result<Option<EventResult>> {
        Ok(scope.bubble(name, context.to_vec())?.result)
    }

    fn process_submission(&mut self, event: &ComponentEvent, scope: &mut EventScope<'_>) -> anyhow::Result<EventOutcome> {
        let context = &event.context;
        for name in ["prepareForSubmit", "prepare"] {
            if let Some(result) = Self::bubble_submit(scope, name, context)? {
                return Ok(EventOutcome::Abort(result));
            }
        }

        let complete_id = scope.complete_id()?;
        let id = scope.resources()?.id.clone();
        let client_validation = scope.request.services.client_validation;
        let support = Rc::new(FormSupportImpl::for_submit(&id, &complete_id, client_validation));
        let cancel = scope.request_parameter(CANCEL_PARAMETER).is_some();

        scope.environment.push(support.clone() as Rc<dyn FormSupport>);
        scope
            .environment
            .push(TrackerHandle::new(std::mem::take(&mut self.tracker)));

        let replayed = Self::replay_submission(scope, &support, &complete_id, cancel);
        let validated = match (&replayed, cancel) {
            (Ok(_), false) => Self::bubble_submit(scope, "validate", context),
            _ => Ok(None),
        };

        scope.environment.pop::<Rc<dyn FormSupport>>()?;
        self.tracker = scope.environment.pop::<TrackerHandle>()?.take();

        let replayed = replayed?;
        tracing::debug!(form = %complete_id, replayed, cancel, "Processed form submission");

        if cancel {
            return Ok(match Self::bubble_submit(scope, "canceled", context)? {
                Some(result) => EventOutcome::Abort(result),
                None => EventOutcome::Handled,
            });
        }
        if let Some(result) = validated? {
            return Ok(EventOutcome::Abort(result));
        }

        if self.tracker.has_errors() {
            for name in ["failure", "submit"] {
                if let Some(result) = Self::bubble_submit(scope, name, context)? {
                    return Ok(EventOutcome::Abort(result));
                }
            }
            return Ok(EventOutcome::Abort(EventResult::RenderPage));
        }

        for name in ["success", "submit"] {
            if let Some(result) = Self::bubble_submit(scope, name, context)? {
                return Ok(EventOutcome::Abort(result));
            }
        }
        Ok(EventOutcome::Handled)
    }

    fn replay_submission(
        scope: &mut EventScope<'_>,
        support: &Rc<FormSupportImpl>,
        complete_id: &str,
        cancel: bool,
    ) -> anyhow::Result<usize> {
        let data = scope
            .request_parameter(FORM_DATA_PARAMETER)
            .ok_or_else(|| FormError::MissingFormData {
                form: complete_id.to_string(),
            })?
            .to_string();
        let entries = decode_actions(&scope.request.services.client_data, &data)?;

        let replayed = replay(&entries, cancel, scope.page, scope.environment, scope.request)?;
        support.execute_deferred(&mut scope.action_context())?;
        Ok(replayed)
    }
}

impl Component for Form {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["context", "clientvalidation"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let context = scope.parameter_context("context")?;
        Self::bubble_render(scope, "prepareForRender", &context)?;
        Self::bubble_render(scope, "prepare", &context)?;

        let resources = scope.resources()?;
        let id = resources.id.clone();
        let complete_id = resources.complete_id.clone();
        let client_id = scope.allocate_client_id(&id);
        let link = scope.event_link("action", context, true)?;

        let mut attributes = vec![
            ("method".to_string(), "post".to_string()),
            ("action".to_string(), link.to_redirect_uri()),
            ("id".to_string(), client_id.clone()),
        ];
        attributes.extend(scope.informal_attributes()?);
        self.form_node = Some(scope.writer.element("form", attributes));

        // Link parameters travel as hidden fields; the action URL has none
        let mut reserved: Vec<&str> = vec![FORM_DATA_PARAMETER, FORM_ID_PARAMETER];
        scope.writer.element("div", [("class", "t-invisible")]);
        for (name, value) in &link.parameters {
            scope.writer.element("input", hidden(name, value));
            scope.writer.end()?;
            reserved.push(name);
        }
        scope.writer.element("input", hidden(FORM_ID_PARAMETER, &id));
        scope.writer.end()?;
        scope.writer.end()?;

        let client_validation =
            scope.parameter_flag("clientvalidation", scope.request.services.client_validation)?;
        let support: Rc<dyn FormSupport> = Rc::new(FormSupportImpl::for_render(
            &client_id,
            &complete_id,
            client_validation,
            &reserved,
        ));
        scope.environment.push(support);
        scope
            .environment
            .push(TrackerHandle::new(std::mem::take(&mut self.tracker)));
        scope.heartbeat_begin();
        Ok(Flow::Continue)
    }

    fn after_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        scope.heartbeat_end()?;

        let support = scope.environment.pop::<Rc<dyn FormSupport>>()?;
        support.execute_deferred(&mut scope.action_context())?;
        self.tracker = scope.environment.pop::<TrackerHandle>()?.take();

        let data = scope
            .request
            .services
            .client_data
            .encode(&support.recorded_actions())?;
        scope.writer.element("div", [("class", "t-invisible")]);
        scope
            .writer
            .element("input", hidden(FORM_DATA_PARAMETER, &data));
        scope.writer.end()?;
        scope.writer.end()?;

        if let (Some(node), Some(encoding)) = (self.form_node, support.encoding_type()) {
            scope.writer.attribute(node, "enctype", &encoding)?;
        }
        scope.writer.end()?;
        Ok(Flow::Continue)
    }

    fn cleanup_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        self.tracker.clear();
        self.form_node = None;
        Ok(Flow::Continue)
    }

    fn on_event(&mut self, event: &ComponentEvent, scope: &mut EventScope<'_>) -> anyhow::Result<EventOutcome> {
        // Only the submission itself, never an action bubbling up from a child
        if event.is("action") && event.source.is_empty() {
            return self.process_submission(event, scope);
        }
        Ok(EventOutcome::NotHandled)
    }

    fn page_detached(&mut self) {
        self.tracker.clear();
        self.form_node = None;
    }
}

/// Part of a form whose fields are processed only when the fragment's hidden
/// field comes back with the submission
///
/// Client-side script removes the hidden field together with a fragment it
/// hides, which turns the fragment's fields off for that submission.
#[derive(Debug, Default)]
pub struct FormFragment {
    control_name: Option<String>,
}

impl Component for FormFragment {
    fn formal_parameters(&self) -> &'static [&'static str] {
        &["visible", "element"]
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let outer = scope.require_form_support()?;
        let id = scope.resources()?.id.clone();
        let control_name = outer.allocate_control_name(&id);
        let client_id = scope.allocate_client_id(&id);
        let element = scope
            .parameter_string("element")?
            .unwrap_or_else(|| "div".to_string());

        let mut attributes = vec![("id".to_string(), client_id)];
        if !scope.parameter_flag("visible", true)? {
            attributes.push(("hidden".to_string(), "hidden".to_string()));
        }
        attributes.extend(scope.informal_attributes()?);
        scope.writer.element(&element, attributes);

        scope.store(FormAction::ProcessSubmission {
            control_name: control_name.clone(),
        })?;
        let fragment: Rc<dyn FormSupport> = Rc::new(FragmentFormSupport::new(outer));
        scope.environment.push(fragment);
        self.control_name = Some(control_name);
        Ok(Flow::Continue)
    }

    fn after_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        let fragment = scope.environment.pop::<Rc<dyn FormSupport>>()?;
        let data = scope
            .request
            .services
            .client_data
            .encode(&fragment.recorded_actions())?;

        if let Some(control_name) = &self.control_name {
            scope.writer.element("input", hidden(control_name, &data));
            scope.writer.end()?;
        }
        scope.writer.end()?;
        Ok(Flow::Continue)
    }

    fn cleanup_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        self.control_name = None;
        Ok(Flow::Continue)
    }

    fn execute_action(&mut self, action: &FormAction, scope: &mut EventScope<'_>) -> anyhow::Result<()> {
        let FormAction::ProcessSubmission { control_name } = action else {
            return Err(FormError::UnsupportedAction {
                complete_id: scope.complete_id()?,
                action: action.kind().to_string(),
            }
            .into());
        };

        let data = match scope.request_parameter(control_name) {
            Some(data) if !data.is_empty() => data.to_string(),
            _ => {
                tracing::debug!(fragment = %control_name, "Fragment not submitted; skipping its fields");
                return Ok(());
            }
        };
        let entries = decode_actions(&scope.request.services.client_data, &data)?;
        replay(&entries, false, scope.page, scope.environment, scope.request)?;
        Ok(())
    }

    fn page_detached(&mut self) {
        self.control_name = None;
    }
}
