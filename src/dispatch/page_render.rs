//! Page render requests

use std::sync::Arc;

use super::{activate_page, process_result, Dispatcher, RequestContext, Response};
use crate::link::RequestDecoder;
use crate::render::render_page;

/// Renders a page after activating it with the context from the path
pub struct PageRenderDispatcher {
    decoder: Arc<RequestDecoder>,
}

impl PageRenderDispatcher {
    pub fn new(decoder: Arc<RequestDecoder>) -> Self {
        Self { decoder }
    }
}

impl Dispatcher for PageRenderDispatcher {
    fn name(&self) -> &'static str {
        "page-render"
    }

    fn dispatch(&self, cx: &mut RequestContext<'_>) -> anyhow::Result<Option<Response>> {
        let Some(parameters) = self
            .decoder
            .decode_page_render(&cx.globals.request, &cx.globals.services.pages)?
        else {
            return Ok(None);
        };
        let name = parameters.logical_page_name;

        let page = cx.pages.get(&name)?;
        if let Some(result) = activate_page(
            page,
            &parameters.activation_context,
            &mut cx.environment,
            cx.globals,
        )? {
            return process_result(cx, &name, result).map(Some);
        }

        let page = cx.pages.get(&name)?;
        let markup = render_page(page, &mut cx.environment, cx.globals)?;
        Ok(Some(Response::html(markup)))
    }
}
