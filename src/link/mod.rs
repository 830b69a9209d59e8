//! Links: generating URLs for page renders and component events, and
//! decoding them again when the request comes back

mod encoder;
mod factory;
pub mod url_encoder;

use std::fmt;

use url::form_urlencoded;

pub use encoder::{
    decode_context, ComponentEventRequestParameters, ComponentInvocation, PageRenderRequestParameters,
    RequestDecoder, ACTIVATION_CONTEXT_PARAMETER, CONTAINING_PAGE_PARAMETER,
};
pub use factory::{LinkCreationListener, LinkSettings, LinkSource, RequestPathOptimizer, RequestUidListener};

use crate::page::{ElementId, Page};
use crate::render::Environment;
use crate::request::RequestGlobals;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    UnknownPage { name: String },
    InvalidEncoding { value: String, reason: String },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPage { name } => write!(f, "Unknown page '{}'", name),
            Self::InvalidEncoding { value, reason } => {
                write!(f, "Invalid context value '{}': {}", value, reason)
            }
        }
    }
}

impl std::error::Error for LinkError {}

/// A generated URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Absolute path including the context path
    pub base_path: String,
    /// Shorter path relative to the current request, when one exists
    pub optimized_path: Option<String>,
    pub parameters: Vec<(String, String)>,
    pub anchor: Option<String>,
    /// Target of a form; the parameters travel as hidden fields
    pub for_form: bool,
}

impl Link {
    pub fn new(base_path: &str) -> Self {
        Self {
            base_path: base_path.to_string(),
            optimized_path: None,
            parameters: Vec::new(),
            anchor: None,
            for_form: false,
        }
    }

    /// Set a query parameter, replacing an earlier value
    pub fn add_parameter(&mut self, name: &str, value: &str) {
        match self.parameters.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.parameters.push((name.to_string(), value.to_string())),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn remove_parameter(&mut self, name: &str) {
        self.parameters.retain(|(n, _)| n != name);
    }

    pub fn with_anchor(mut self, anchor: &str) -> Self {
        self.anchor = Some(anchor.to_string());
        self
    }

    fn query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.parameters {
            serializer.append_pair(name, value);
        }
        serializer.finish()
    }

    fn append_anchor(&self, mut uri: String) -> String {
        if let Some(anchor) = &self.anchor {
            uri.push('#');
            uri.push_str(anchor);
        }
        uri
    }

    /// URI for an `href`: the optimized path when there is one
    pub fn to_uri(&self) -> String {
        let mut uri = self
            .optimized_path
            .clone()
            .unwrap_or_else(|| self.base_path.clone());
        if !self.parameters.is_empty() {
            uri.push('?');
            uri.push_str(&self.query());
        }
        self.append_anchor(uri)
    }

    /// URI for a redirect or a form action; parameters are not included
    pub fn to_redirect_uri(&self) -> String {
        self.append_anchor(self.base_path.clone())
    }

    /// Absolute path with query and anchor, for a `Location` header
    pub fn to_location(&self) -> String {
        let mut uri = self.base_path.clone();
        if !self.parameters.is_empty() {
            uri.push('?');
            uri.push_str(&self.query());
        }
        self.append_anchor(uri)
    }

    /// Fully qualified URI, e.g. `http://host:8080`
    pub fn to_absolute_uri(&self, origin: &str) -> String {
        let mut uri = format!("{}{}", origin.trim_end_matches('/'), self.base_path);
        if !self.parameters.is_empty() {
            uri.push('?');
            uri.push_str(&self.query());
        }
        uri
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Link triggering `event` on `element`, carrying the page's activation context
pub fn component_event_link(
    page: &mut Page,
    environment: &mut Environment,
    request: &RequestGlobals,
    element: ElementId,
    event: &str,
    context: Vec<String>,
    for_form: bool,
) -> anyhow::Result<Link> {
    let page_activation_context = page.collect_activation_context(environment, request)?;
    let nested_component_id = page.resources(element)?.nested_id.clone();

    let parameters = ComponentEventRequestParameters {
        active_page_name: page.name().to_string(),
        containing_page_name: page.name().to_string(),
        nested_component_id,
        event_type: event.to_string(),
        page_activation_context,
        event_context: context,
    };
    Ok(request
        .services
        .links
        .create_component_event_link(&request.request, parameters, for_form)?)
}

/// Link rendering `page_name`
///
/// Without an explicit context, the current page passivates to supply one
/// when it is the target; any other page is linked with no context.
pub fn page_render_link(
    page: &mut Page,
    environment: &mut Environment,
    request: &RequestGlobals,
    page_name: &str,
    context: Option<Vec<String>>,
) -> anyhow::Result<Link> {
    let activation_context = match context {
        Some(values) => values,
        None if page.name().eq_ignore_ascii_case(page_name) => {
            page.collect_activation_context(environment, request)?
        }
        None => Vec::new(),
    };

    let parameters = PageRenderRequestParameters {
        logical_page_name: page_name.to_string(),
        activation_context,
    };
    Ok(request
        .services
        .links
        .create_page_render_link(&request.request, parameters)?)
}
