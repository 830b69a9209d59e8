//! Link creation: path building, relative-path optimization and listeners

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ComponentEventRequestParameters, ComponentInvocation, Link, LinkError, PageRenderRequestParameters};
use crate::page::PageRegistry;
use crate::request::Request;

/// Query parameter added to links generated during an XHR request
pub const UID_PARAMETER: &str = "t:uid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Prefix of every application path, e.g. `/app`; empty at the root
    pub context_path: String,
    pub index_page_name: String,
    /// Never shorten links into relative paths
    pub force_absolute_uris: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            context_path: String::new(),
            index_page_name: "Index".to_string(),
            force_absolute_uris: false,
        }
    }
}

/// Observes links as they are created and may add parameters to them
pub trait LinkCreationListener: Send + Sync {
    fn created_page_render_link(&self, _link: &mut Link, _request: &Request) {}

    fn created_component_event_link(&self, _link: &mut Link, _request: &Request) {}
}

/// Tags links generated by an XHR request with that request's uid
#[derive(Debug, Default)]
pub struct RequestUidListener;

impl RequestUidListener {
    fn tag(link: &mut Link, request: &Request) {
        if request.xhr {
            link.add_parameter(UID_PARAMETER, &request.uid);
        }
    }
}

impl LinkCreationListener for RequestUidListener {
    fn created_page_render_link(&self, link: &mut Link, request: &Request) {
        Self::tag(link, request);
    }

    fn created_component_event_link(&self, link: &mut Link, request: &Request) {
        Self::tag(link, request);
    }
}

/// Rewrites absolute paths relative to the current request when shorter
#[derive(Debug, Clone)]
pub struct RequestPathOptimizer {
    context_path: String,
    force_absolute: bool,
}

impl RequestPathOptimizer {
    pub fn new(context_path: &str, force_absolute: bool) -> Self {
        Self {
            context_path: context_path.to_string(),
            force_absolute,
        }
    }

    /// Relative form of `absolute`, or `None` when it would not be shorter
    pub fn optimize(&self, request: &Request, absolute: &str) -> Option<String> {
        // Script-issued requests resolve relative paths against the page URL,
        // not the request URL
        if self.force_absolute || request.xhr {
            return None;
        }

        let current = format!("{}{}", self.context_path, request.path);
        let mut directories: Vec<&str> = current.trim_start_matches('/').split('/').collect();
        directories.pop();
        let target: Vec<&str> = absolute.trim_start_matches('/').split('/').collect();

        let shared = directories
            .iter()
            .zip(target.iter().take(target.len().saturating_sub(1)))
            .take_while(|(a, b)| a == b)
            .count();

        let mut relative = "../".repeat(directories.len() - shared);
        relative.push_str(&target[shared..].join("/"));

        if relative.is_empty() {
            relative.push_str("./");
        } else if relative.split('/').next().is_some_and(|first| first.contains(':')) {
            // A colon in the first segment would read as a URL scheme
            relative.insert_str(0, "./");
        }

        (relative.len() < absolute.len()).then_some(relative)
    }
}

/// Creates links; shared by every request
pub struct LinkSource {
    settings: LinkSettings,
    pages: Arc<PageRegistry>,
    optimizer: RequestPathOptimizer,
    listeners: Vec<Box<dyn LinkCreationListener>>,
}

impl fmt::Debug for LinkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSource")
            .field("settings", &self.settings)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl LinkSource {
    pub fn new(settings: LinkSettings, pages: Arc<PageRegistry>) -> Self {
        let optimizer = RequestPathOptimizer::new(&settings.context_path, settings.force_absolute_uris);
        Self {
            settings,
            pages,
            optimizer,
            listeners: vec![Box::new(RequestUidListener)],
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn LinkCreationListener>) {
        self.listeners.push(listener);
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    fn canonical(&self, name: &str) -> Result<String, LinkError> {
        self.pages
            .canonical_name(name)
            .map(str::to_string)
            .ok_or_else(|| LinkError::UnknownPage {
                name: name.to_string(),
            })
    }

    fn build(&self, request: &Request, invocation: &ComponentInvocation) -> Link {
        let path = invocation.build_path(&self.settings.index_page_name);
        let base_path = format!("{}{}", self.settings.context_path, path);

        let mut link = Link::new(&base_path);
        link.optimized_path = self.optimizer.optimize(request, &base_path);
        for (name, value) in invocation.query_parameters() {
            link.add_parameter(&name, &value);
        }
        link
    }

    pub fn create_page_render_link(
        &self,
        request: &Request,
        mut parameters: PageRenderRequestParameters,
    ) -> Result<Link, LinkError> {
        parameters.logical_page_name = self.canonical(&parameters.logical_page_name)?;

        let mut link = self.build(request, &ComponentInvocation::PageRender(parameters));
        for listener in &self.listeners {
            listener.created_page_render_link(&mut link, request);
        }
        Ok(link)
    }

    pub fn create_component_event_link(
        &self,
        request: &Request,
        mut parameters: ComponentEventRequestParameters,
        for_form: bool,
    ) -> Result<Link, LinkError> {
        parameters.active_page_name = self.canonical(&parameters.active_page_name)?;
        parameters.containing_page_name = self.canonical(&parameters.containing_page_name)?;

        let mut link = self.build(request, &ComponentInvocation::ComponentEvent(parameters));
        link.for_form = for_form;
        for listener in &self.listeners {
            listener.created_component_event_link(&mut link, request);
        }
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::page::{PageDefinition, Template};

    struct Plain;
    impl Component for Plain {}

    fn source(settings: LinkSettings) -> LinkSource {
        let mut pages = PageRegistry::new();
        for name in ["Index", "Entry", "admin/Users"] {
            pages.register(PageDefinition::new(name, || Plain, Template::new()));
        }
        LinkSource::new(settings, Arc::new(pages))
    }

    fn render(name: &str, context: &[&str]) -> PageRenderRequestParameters {
        PageRenderRequestParameters {
            logical_page_name: name.to_string(),
            activation_context: context.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn event(nested: &str, context: &[&str]) -> ComponentEventRequestParameters {
        ComponentEventRequestParameters {
            active_page_name: "index".to_string(),
            containing_page_name: "index".to_string(),
            nested_component_id: nested.to_string(),
            event_type: "action".to_string(),
            page_activation_context: vec!["2".to_string()],
            event_context: context.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_optimizer_shortens_within_folder() {
        let optimizer = RequestPathOptimizer::new("/app", false);
        let request = Request::get("/admin/users/3");

        assert_eq!(optimizer.optimize(&request, "/app/admin/users/4"), Some("4".to_string()));
        assert_eq!(optimizer.optimize(&request, "/app/entry"), None);
    }

    #[test]
    fn test_optimizer_guards_colon_and_xhr() {
        let optimizer = RequestPathOptimizer::new("/application/area", false);
        let request = Request::get("/admin/users");

        assert_eq!(
            optimizer.optimize(&request, "/application/area/admin/index:refresh"),
            Some("./index:refresh".to_string())
        );
        assert_eq!(
            optimizer.optimize(&request.clone().with_xhr(true), "/application/area/admin/other"),
            None
        );
        assert_eq!(
            RequestPathOptimizer::new("/application/area", true).optimize(&request, "/application/area/admin/other"),
            None
        );
    }

    #[test]
    fn test_page_render_link_canonicalizes_and_optimizes() {
        let links = source(LinkSettings {
            context_path: "/app".to_string(),
            ..LinkSettings::default()
        });
        let request = Request::get("/admin/users");

        let link = links
            .create_page_render_link(&request, render("ADMIN/USERS", &["7"]))
            .unwrap();
        assert_eq!(link.base_path, "/app/admin/users/7");
        assert_eq!(link.to_uri(), "users/7");

        let missing = links.create_page_render_link(&request, render("Nope", &[]));
        assert_eq!(
            missing,
            Err(LinkError::UnknownPage {
                name: "Nope".to_string()
            })
        );
    }

    #[test]
    fn test_event_link_parameters_and_form_flag() {
        let links = source(LinkSettings::default());
        let request = Request::get("/");

        let link = links
            .create_component_event_link(&request, event("delete", &["5"]), true)
            .unwrap();
        assert_eq!(link.base_path, "/index.delete/5");
        assert_eq!(link.parameter("t:ac"), Some("2"));
        assert!(link.parameter("t:cp").is_none());
        assert!(link.for_form);
    }

    #[test]
    fn test_xhr_links_carry_request_uid() {
        let links = source(LinkSettings::default());
        let request = Request::get("/entry/3").with_xhr(true);

        let link = links
            .create_component_event_link(&request, event("delete", &[]), false)
            .unwrap();
        assert_eq!(link.parameter(UID_PARAMETER), Some(request.uid.as_str()));
        assert_eq!(link.optimized_path, None);

        let plain = links
            .create_page_render_link(&Request::get("/entry/3"), render("Index", &[]))
            .unwrap();
        assert!(plain.parameter(UID_PARAMETER).is_none());
    }

    #[test]
    fn test_custom_listener_sees_links() {
        struct Tagger;
        impl LinkCreationListener for Tagger {
            fn created_page_render_link(&self, link: &mut Link, _request: &Request) {
                link.add_parameter("lang", "en");
            }
        }

        let mut links = source(LinkSettings::default());
        links.add_listener(Box::new(Tagger));
        let link = links
            .create_page_render_link(&Request::get("/"), render("Entry", &[]))
            .unwrap();
        assert_eq!(link.to_uri(), "entry?lang=en");
    }
}
