//! Component event requests: regular (post/redirect/get) and XHR

use std::sync::Arc;

use serde_json::json;

use super::{activate_page, process_result, redirect_to_page, DispatchError, Dispatcher, RequestContext, Response};
use crate::component::{ComponentEvent, EventResult, EventTrigger};
use crate::link::{self, ComponentEventRequestParameters, RequestDecoder};
use crate::render::{render_block, render_page};

/// What came out of activating the page and triggering the event
enum Dispatched {
    /// Activation aborted; the event never fired
    Activation(EventResult),
    Triggered(EventTrigger),
}

/// Activate the active page, then trigger the event on the nested
/// component of the containing page
fn trigger(cx: &mut RequestContext<'_>, parameters: &ComponentEventRequestParameters) -> anyhow::Result<Dispatched> {
    let active = cx.pages.get(&parameters.active_page_name)?;
    if let Some(result) = activate_page(
        active,
        &parameters.page_activation_context,
        &mut cx.environment,
        cx.globals,
    )? {
        return Ok(Dispatched::Activation(result));
    }

    let page = cx.pages.get(&parameters.containing_page_name)?;
    let element = page.require_element(&parameters.nested_component_id)?;
    tracing::debug!(
        page = %parameters.containing_page_name,
        component = %parameters.nested_component_id,
        event = %parameters.event_type,
        "Triggering component event"
    );
    let trigger = page.trigger_event(
        element,
        ComponentEvent::new(&parameters.event_type, parameters.event_context.clone()),
        &mut cx.environment,
        cx.globals,
    )?;
    if !trigger.handled {
        tracing::debug!(
            event = %parameters.event_type,
            "No handler for event on {}",
            parameters.nested_component_id
        );
    }
    Ok(Dispatched::Triggered(trigger))
}

/// Component events from regular browser requests
///
/// A handler's result decides the response; with none, the browser is
/// redirected to the active page so a reload does not repeat the action.
pub struct ComponentEventDispatcher {
    decoder: Arc<RequestDecoder>,
}

impl ComponentEventDispatcher {
    pub fn new(decoder: Arc<RequestDecoder>) -> Self {
        Self { decoder }
    }
}

impl Dispatcher for ComponentEventDispatcher {
    fn name(&self) -> &'static str {
        "component-event"
    }

    fn dispatch(&self, cx: &mut RequestContext<'_>) -> anyhow::Result<Option<Response>> {
        if cx.globals.request.xhr {
            return Ok(None);
        }
        let Some(parameters) = self
            .decoder
            .decode_component_event(&cx.globals.request, &cx.globals.services.pages)?
        else {
            return Ok(None);
        };

        let active_page = parameters.active_page_name.clone();
        let response = match trigger(cx, &parameters)? {
            Dispatched::Activation(result) => process_result(cx, &active_page, result)?,
            Dispatched::Triggered(EventTrigger {
                result: Some(result), ..
            }) => process_result(cx, &active_page, result)?,
            Dispatched::Triggered(_) => redirect_to_page(cx, &active_page, None)?,
        };
        Ok(Some(response))
    }
}

/// Component events from client-side script, answered with JSON
///
/// ```text
/// no result        {}
/// Block(name)      {"content": <markup of the block>}
/// RenderPage       {"content": <markup of the active page>}
/// Page / Link      {"redirectURL": <uri>}
/// Text             {"content": <text>}
/// Json(value)      value
/// ```
pub struct ComponentActionDispatcher {
    decoder: Arc<RequestDecoder>,
}

impl ComponentActionDispatcher {
    pub fn new(decoder: Arc<RequestDecoder>) -> Self {
        Self { decoder }
    }

    fn respond(
        cx: &mut RequestContext<'_>,
        parameters: &ComponentEventRequestParameters,
        result: EventResult,
        handled_by: Option<&str>,
    ) -> anyhow::Result<Response> {
        let body = match result {
            EventResult::Block(block) => {
                let page = cx.pages.get(&parameters.containing_page_name)?;
                let owner = handled_by
                    .and_then(|complete_id| page.find_by_complete_id(complete_id))
                    .unwrap_or(page.root());
                let markup = render_block(page, owner, &block, &mut cx.environment, cx.globals)?;
                json!({ "content": markup })
            }
            EventResult::RenderPage => {
                let page = cx.pages.get(&parameters.active_page_name)?;
                json!({ "content": render_page(page, &mut cx.environment, cx.globals)? })
            }
            EventResult::Page { name, context } => {
                let page = cx.pages.get(&name)?;
                let link = link::page_render_link(page, &mut cx.environment, cx.globals, &name, context)?;
                json!({ "redirectURL": link.to_location() })
            }
            EventResult::Link(link) => json!({ "redirectURL": link.to_location() }),
            EventResult::Text(text) => json!({ "content": text }),
            EventResult::Json(value) => value,
            other @ EventResult::Context(_) => {
                return Err(DispatchError::UnsupportedResult {
                    result: other.describe(),
                    request: "XHR",
                }
                .into())
            }
        };
        Ok(Response::json(&body))
    }
}

impl Dispatcher for ComponentActionDispatcher {
    fn name(&self) -> &'static str {
        "component-action"
    }

    fn dispatch(&self, cx: &mut RequestContext<'_>) -> anyhow::Result<Option<Response>> {
        if !cx.globals.request.xhr {
            return Ok(None);
        }
        let Some(parameters) = self
            .decoder
            .decode_component_event(&cx.globals.request, &cx.globals.services.pages)?
        else {
            return Ok(None);
        };

        let response = match trigger(cx, &parameters)? {
            Dispatched::Activation(result) => Self::respond(cx, &parameters, result, None)?,
            Dispatched::Triggered(EventTrigger {
                result: Some(result),
                handled_by,
                ..
            }) => Self::respond(cx, &parameters, result, handled_by.as_deref())?,
            Dispatched::Triggered(_) => Response::json(&json!({})),
        };
        Ok(Some(response))
    }
}
