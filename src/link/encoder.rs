//! Request paths to and from their decoded parameters
//!
//! ```text
//! page render       /{page}[/{context}]*
//! component event   /{page}[.{nested.id}][:{event}][/{context}]*   ?t:ac=..&t:cp=..
//! ```

use regex::Regex;

use super::{url_encoder, LinkError};
use crate::page::PageRegistry;
use crate::request::Request;

/// Query parameter carrying the page activation context of an event link
pub const ACTIVATION_CONTEXT_PARAMETER: &str = "t:ac";
/// Query parameter naming the containing page when it differs from the active one
pub const CONTAINING_PAGE_PARAMETER: &str = "t:cp";

const DEFAULT_EVENT: &str = "action";

const EVENT_PATH_PATTERN: &str = r"^/((?:\w+/)*\w+)(?:\.(\w+(?:\.\w+)*))?(?::(\w+))?(?:/(.*))?$";

/// Decoded form of a component event request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentEventRequestParameters {
    /// Page that renders the response
    pub active_page_name: String,
    /// Page containing the component; usually the active page
    pub containing_page_name: String,
    pub nested_component_id: String,
    pub event_type: String,
    pub page_activation_context: Vec<String>,
    pub event_context: Vec<String>,
}

/// Decoded form of a page render request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRenderRequestParameters {
    pub logical_page_name: String,
    pub activation_context: Vec<String>,
}

/// Everything needed to build one outbound URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentInvocation {
    PageRender(PageRenderRequestParameters),
    ComponentEvent(ComponentEventRequestParameters),
}

impl ComponentInvocation {
    /// Path below the context path, starting with `/`
    pub fn build_path(&self, index_page_name: &str) -> String {
        match self {
            Self::PageRender(parameters) => page_render_path(parameters, index_page_name),
            Self::ComponentEvent(parameters) => component_event_path(parameters),
        }
    }

    /// Query parameters the path cannot carry
    pub fn query_parameters(&self) -> Vec<(String, String)> {
        let Self::ComponentEvent(parameters) = self else {
            return Vec::new();
        };

        let mut query = Vec::new();
        if !parameters.page_activation_context.is_empty() {
            query.push((
                ACTIVATION_CONTEXT_PARAMETER.to_string(),
                join_context(&parameters.page_activation_context),
            ));
        }
        if !parameters
            .containing_page_name
            .eq_ignore_ascii_case(&parameters.active_page_name)
        {
            query.push((
                CONTAINING_PAGE_PARAMETER.to_string(),
                parameters.containing_page_name.to_ascii_lowercase(),
            ));
        }
        query
    }
}

fn page_render_path(parameters: &PageRenderRequestParameters, index_page_name: &str) -> String {
    let mut name = parameters.logical_page_name.to_ascii_lowercase();
    let index = index_page_name.to_ascii_lowercase();

    // A trailing index page name is implied, unless context follows it and
    // would otherwise be mistaken for part of the page name
    if parameters.activation_context.is_empty() {
        if name == index {
            name.clear();
        } else if let Some(folder) = name.strip_suffix(&format!("/{}", index)) {
            name = folder.to_string();
        }
    }

    let mut path = format!("/{}", name);
    for value in &parameters.activation_context {
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(&url_encoder::encode(value));
    }
    path
}

fn component_event_path(parameters: &ComponentEventRequestParameters) -> String {
    let mut path = format!("/{}", parameters.active_page_name.to_ascii_lowercase());
    let has_nested = !parameters.nested_component_id.is_empty();

    if has_nested {
        path.push('.');
        path.push_str(&parameters.nested_component_id.to_ascii_lowercase());
    }
    if !(has_nested && parameters.event_type.eq_ignore_ascii_case(DEFAULT_EVENT)) {
        path.push(':');
        path.push_str(&parameters.event_type);
    }
    for value in &parameters.event_context {
        path.push('/');
        path.push_str(&url_encoder::encode(value));
    }
    path
}

fn join_context(values: &[String]) -> String {
    values
        .iter()
        .map(|v| url_encoder::encode(v))
        .collect::<Vec<_>>()
        .join("/")
}

/// Split a `/`-joined context and decode each value
pub fn decode_context(joined: &str) -> Result<Vec<String>, LinkError> {
    if joined.is_empty() {
        return Ok(Vec::new());
    }
    joined.split('/').map(url_encoder::decode).collect()
}

/// Parses inbound request paths
#[derive(Debug, Clone)]
pub struct RequestDecoder {
    event_path: Regex,
    index_page_name: String,
}

impl RequestDecoder {
    pub fn new(index_page_name: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            event_path: Regex::new(EVENT_PATH_PATTERN)?,
            index_page_name: index_page_name.to_string(),
        })
    }

    /// Decode a component event request; `None` when the path is not one
    pub fn decode_component_event(
        &self,
        request: &Request,
        pages: &PageRegistry,
    ) -> Result<Option<ComponentEventRequestParameters>, LinkError> {
        let Some(captures) = self.event_path.captures(&request.path) else {
            return Ok(None);
        };

        let nested_id = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        let event_type = captures.get(3).map(|m| m.as_str());
        // Without either, this is a page render request
        if nested_id.is_empty() && event_type.is_none() {
            return Ok(None);
        }

        let page = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let Some(active_page_name) = pages.canonical_name(page) else {
            tracing::debug!(path = %request.path, page, "Not an event request: unknown page");
            return Ok(None);
        };

        let containing_page_name = match request.parameter(CONTAINING_PAGE_PARAMETER) {
            Some(name) => match pages.canonical_name(name) {
                Some(canonical) => canonical.to_string(),
                None => {
                    return Err(LinkError::UnknownPage {
                        name: name.to_string(),
                    })
                }
            },
            None => active_page_name.to_string(),
        };

        let event_context = decode_context(captures.get(4).map(|m| m.as_str()).unwrap_or_default())?;
        let page_activation_context = match request.parameter(ACTIVATION_CONTEXT_PARAMETER) {
            Some(joined) => decode_context(joined)?,
            None => Vec::new(),
        };

        Ok(Some(ComponentEventRequestParameters {
            active_page_name: active_page_name.to_string(),
            containing_page_name,
            nested_component_id: nested_id.to_string(),
            event_type: event_type.unwrap_or(DEFAULT_EVENT).to_string(),
            page_activation_context,
            event_context,
        }))
    }

    /// Decode a page render request by finding the longest path prefix that
    /// names a page; what follows is activation context
    pub fn decode_page_render(
        &self,
        request: &Request,
        pages: &PageRegistry,
    ) -> Result<Option<PageRenderRequestParameters>, LinkError> {
        let path = request.path.trim_start_matches('/');

        if path.is_empty() {
            return Ok(pages
                .canonical_name(&self.index_page_name)
                .map(|name| PageRenderRequestParameters {
                    logical_page_name: name.to_string(),
                    activation_context: Vec::new(),
                }));
        }

        let mut end = path.len();
        loop {
            let candidate = &path[..end];
            let found = pages.canonical_name(candidate).or_else(|| {
                pages.canonical_name(&format!("{}/{}", candidate, self.index_page_name))
            });

            if let Some(name) = found {
                let rest = path[end..].trim_start_matches('/');
                return Ok(Some(PageRenderRequestParameters {
                    logical_page_name: name.to_string(),
                    activation_context: decode_context(rest)?,
                }));
            }

            match candidate.rfind('/') {
                Some(slash) => end = slash,
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::page::{PageDefinition, Template};
    use pretty_assertions::assert_eq;

    struct Plain;
    impl Component for Plain {}

    fn registry(names: &[&str]) -> PageRegistry {
        let mut pages = PageRegistry::new();
        for name in names {
            pages.register(PageDefinition::new(name, || Plain, Template::new()));
        }
        pages
    }

    fn decoder() -> RequestDecoder {
        RequestDecoder::new("Index").unwrap()
    }

    fn event(page: &str, nested: &str, event: &str, context: &[&str]) -> ComponentEventRequestParameters {
        ComponentEventRequestParameters {
            active_page_name: page.to_string(),
            containing_page_name: page.to_string(),
            nested_component_id: nested.to_string(),
            event_type: event.to_string(),
            page_activation_context: Vec::new(),
            event_context: context.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_nested_page_with_dotted_nested_id() {
        let pages = registry(&["foo/Bar"]);
        let request = Request::get("/foo/Bar.fred/fee/fie");

        let decoded = decoder()
            .decode_component_event(&request, &pages)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, event("foo/Bar", "fred", "action", &["fee", "fie"]));
    }

    #[test]
    fn test_page_level_event_and_explicit_event_names() {
        let pages = registry(&["Index"]);

        let page_event = decoder()
            .decode_component_event(&Request::get("/index:refresh"), &pages)
            .unwrap()
            .unwrap();
        assert_eq!(page_event, event("Index", "", "refresh", &[]));

        let nested_event = decoder()
            .decode_component_event(&Request::get("/index.grid.rows:select/4"), &pages)
            .unwrap()
            .unwrap();
        assert_eq!(nested_event, event("Index", "grid.rows", "select", &["4"]));
    }

    #[test]
    fn test_plain_page_paths_are_not_events() {
        let pages = registry(&["Index", "Entry"]);
        let d = decoder();
        assert_eq!(d.decode_component_event(&Request::get("/entry/3"), &pages).unwrap(), None);
        assert_eq!(d.decode_component_event(&Request::get("/entry/a:b:c"), &pages).unwrap(), None);
        assert_eq!(d.decode_component_event(&Request::get("/missing.x"), &pages).unwrap(), None);
    }

    #[test]
    fn test_event_link_round_trip_with_dots_and_colons() {
        let pages = registry(&["foo/Bar"]);
        let cases = [
            event("foo/Bar", "fred", "action", &["1.2.3", "a:b:c"]),
            event("foo/Bar", "", "action", &["1.2.3"]),
            event("foo/Bar", "barney.fred", "select", &["a:b:c", "", "x/y"]),
        ];

        for original in cases {
            let path = ComponentInvocation::ComponentEvent(original.clone()).build_path("Index");
            let decoded = decoder()
                .decode_component_event(&Request::get(&path), &pages)
                .unwrap()
                .unwrap_or_else(|| panic!("{} did not decode", path));
            assert_eq!(decoded, original, "path {}", path);
        }
    }

    #[test]
    fn test_event_path_shapes() {
        let nested_action = event("foo/Bar", "fred", "action", &["1.2.3"]);
        assert_eq!(
            ComponentInvocation::ComponentEvent(nested_action).build_path("Index"),
            "/foo/bar.fred/1.2.3"
        );

        let page_action = event("Index", "", "action", &[]);
        assert_eq!(
            ComponentInvocation::ComponentEvent(page_action).build_path("Index"),
            "/index:action"
        );
    }

    #[test]
    fn test_activation_and_containing_page_parameters() {
        let pages = registry(&["Index", "Entry"]);
        let mut original = event("Entry", "delete", "action", &["7"]);
        original.containing_page_name = "Index".to_string();
        original.page_activation_context = vec!["3".to_string(), "a b".to_string()];

        let invocation = ComponentInvocation::ComponentEvent(original.clone());
        let query = invocation.query_parameters();
        assert_eq!(
            query,
            vec![
                ("t:ac".to_string(), "3/a$0020b".to_string()),
                ("t:cp".to_string(), "index".to_string()),
            ]
        );

        let mut request = Request::get(&invocation.build_path("Index"));
        request.parameters = query;
        let decoded = decoder()
            .decode_component_event(&request, &pages)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_page_render_shortens_path_until_page_found() {
        let pages = registry(&["Index", "foo/Bar", "admin/Index"]);
        let d = decoder();

        let decoded = d
            .decode_page_render(&Request::get("/foo/bar/fee/fie"), &pages)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.logical_page_name, "foo/Bar");
        assert_eq!(decoded.activation_context, vec!["fee", "fie"]);

        let root = d.decode_page_render(&Request::get("/"), &pages).unwrap().unwrap();
        assert_eq!(root.logical_page_name, "Index");

        let folder = d.decode_page_render(&Request::get("/admin"), &pages).unwrap().unwrap();
        assert_eq!(folder.logical_page_name, "admin/Index");

        assert_eq!(d.decode_page_render(&Request::get("/nothing/here"), &pages).unwrap(), None);
    }

    #[test]
    fn test_page_render_paths_omit_index() {
        let path = |name: &str, context: &[&str]| {
            ComponentInvocation::PageRender(PageRenderRequestParameters {
                logical_page_name: name.to_string(),
                activation_context: context.iter().map(|s| s.to_string()).collect(),
            })
            .build_path("Index")
        };

        assert_eq!(path("Index", &[]), "/");
        assert_eq!(path("Index", &["3"]), "/index/3");
        assert_eq!(path("admin/Index", &[]), "/admin");
        assert_eq!(path("foo/Bar", &["1.2.3", "a/b"]), "/foo/bar/1.2.3/a$002fb");
    }

    #[test]
    fn test_page_render_round_trip() {
        let pages = registry(&["Index", "Entry"]);
        let original = PageRenderRequestParameters {
            logical_page_name: "Entry".to_string(),
            activation_context: vec!["1.2.3".to_string(), "a:b:c".to_string()],
        };
        let path = ComponentInvocation::PageRender(original.clone()).build_path("Index");
        let decoded = decoder()
            .decode_page_render(&Request::get(&path), &pages)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, original);
    }
}
