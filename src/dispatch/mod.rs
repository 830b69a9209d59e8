//! Request dispatch
//!
//! Every request runs through a `RequestPipeline`: an ordered list of
//! dispatchers, each of which either recognizes the request and answers it
//! or declines so the next one can try.
//!
//! ```text
//! Request → RequestPipeline → [ComponentEvent, ComponentAction, PageRender] → Response
//! ```
//!
//! Declining is not an error. Only when every dispatcher declines does the
//! request end as a 404, outside this module.

mod event;
mod page_render;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::component::{ComponentEvent, EventResult};
use crate::link::{self, RequestDecoder};
use crate::page::{Page, RequestPageCache};
use crate::render::{render_page, Environment};
use crate::request::RequestGlobals;

pub use event::{ComponentActionDispatcher, ComponentEventDispatcher};
pub use page_render::PageRenderDispatcher;

/// A handler returned something the current request cannot answer with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    UnsupportedResult { result: String, request: &'static str },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedResult { result, request } => write!(
                f,
                "An event handler returned {}, which is not a valid response to a {} request",
                result, request
            ),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Framework-level response, turned into an HTTP response by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    /// Redirect target
    pub location: Option<String>,
}

impl Response {
    pub fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body,
            location: None,
        }
    }

    pub fn text(body: String) -> Self {
        Self {
            status: 200,
            content_type: Some("text/plain; charset=utf-8".to_string()),
            body,
            location: None,
        }
    }

    pub fn json(value: &Value) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: value.to_string(),
            location: None,
        }
    }

    /// `302 Found`; the browser follows it with a GET
    pub fn redirect(location: String) -> Self {
        Self {
            status: 302,
            content_type: None,
            body: String::new(),
            location: Some(location),
        }
    }

    pub fn is_redirect(&self) -> bool {
        self.location.is_some()
    }
}

/// State of one in-flight request as the dispatchers see it
pub struct RequestContext<'a> {
    pub globals: &'a RequestGlobals,
    /// Pages this request has checked out of the pool
    pub pages: RequestPageCache<'a>,
    pub environment: Environment,
}

impl<'a> RequestContext<'a> {
    pub fn new(globals: &'a RequestGlobals, pages: RequestPageCache<'a>) -> Self {
        Self {
            globals,
            pages,
            environment: Environment::new(),
        }
    }
}

/// Trait for request dispatchers
///
/// `Ok(None)` means "not mine": the pipeline moves on to the next
/// dispatcher. Errors end the request.
pub trait Dispatcher: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &'static str;

    fn dispatch(&self, cx: &mut RequestContext<'_>) -> anyhow::Result<Option<Response>>;
}

/// Dispatchers tried in registration order
pub struct RequestPipeline {
    dispatchers: Vec<Arc<dyn Dispatcher>>,
}

impl RequestPipeline {
    /// Create an empty pipeline; it declines everything
    pub fn new() -> Self {
        Self {
            dispatchers: Vec::new(),
        }
    }

    /// Event requests first (regular, then XHR), page renders last
    pub fn standard(index_page_name: &str) -> Result<Self, regex::Error> {
        let decoder = Arc::new(RequestDecoder::new(index_page_name)?);
        let mut pipeline = Self::new();
        pipeline.register(ComponentEventDispatcher::new(decoder.clone()));
        pipeline.register(ComponentActionDispatcher::new(decoder.clone()));
        pipeline.register(PageRenderDispatcher::new(decoder));
        Ok(pipeline)
    }

    pub fn register(&mut self, dispatcher: impl Dispatcher + 'static) {
        self.dispatchers.push(Arc::new(dispatcher));
    }

    /// Offer the request to each dispatcher until one answers
    pub fn dispatch(&self, cx: &mut RequestContext<'_>) -> anyhow::Result<Option<Response>> {
        for dispatcher in &self.dispatchers {
            if let Some(response) = dispatcher.dispatch(cx)? {
                tracing::debug!(
                    dispatcher = dispatcher.name(),
                    path = %cx.globals.request.path,
                    status = response.status,
                    "Request dispatched"
                );
                return Ok(Some(response));
            }
        }
        tracing::debug!(path = %cx.globals.request.path, "No dispatcher matched");
        Ok(None)
    }

    pub fn dispatcher_names(&self) -> Vec<&'static str> {
        self.dispatchers.iter().map(|d| d.name()).collect()
    }
}

impl Default for RequestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Trigger `activate` on the page root with the activation context
///
/// A handler that aborts supplies the response instead of the page, for
/// instance a redirect when the context names nothing.
pub(crate) fn activate_page(
    page: &mut Page,
    context: &[String],
    environment: &mut Environment,
    request: &RequestGlobals,
) -> anyhow::Result<Option<EventResult>> {
    let root = page.root();
    let trigger = page.trigger_event(
        root,
        ComponentEvent::new("activate", context.to_vec()),
        environment,
        request,
    )?;
    if let Some(result) = &trigger.result {
        tracing::debug!(page = %page.name(), "Activation answered with {}", result.describe());
    }
    Ok(trigger.result)
}

/// Turn an event result into the response to a regular request
pub(crate) fn process_result(
    cx: &mut RequestContext<'_>,
    active_page: &str,
    result: EventResult,
) -> anyhow::Result<Response> {
    match result {
        EventResult::RenderPage => {
            let page = cx.pages.get(active_page)?;
            let markup = render_page(page, &mut cx.environment, cx.globals)?;
            Ok(Response::html(markup))
        }
        EventResult::Page { name, context } => redirect_to_page(cx, &name, context),
        EventResult::Link(link) => Ok(Response::redirect(link.to_location())),
        EventResult::Text(text) => Ok(Response::text(text)),
        EventResult::Json(value) => Ok(Response::json(&value)),
        other @ (EventResult::Context(_) | EventResult::Block(_)) => Err(DispatchError::UnsupportedResult {
            result: other.describe(),
            request: "page",
        }
        .into()),
    }
}

/// Redirect to a page render; without an explicit context the target page
/// passivates to supply one
pub(crate) fn redirect_to_page(
    cx: &mut RequestContext<'_>,
    page_name: &str,
    context: Option<Vec<String>>,
) -> anyhow::Result<Response> {
    let page = cx.pages.get(page_name)?;
    let link = link::page_render_link(page, &mut cx.environment, cx.globals, page_name, context)?;
    Ok(Response::redirect(link.to_location()))
}

#[cfg(test)]
mod tests;
