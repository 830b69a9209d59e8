//! Request model and per-request globals
//!
//! The HTTP layer reduces an incoming request to a `Request`: method, path
//! inside the application (context path already removed), the decoded query
//! and form parameters, and whether it is an XHR request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::form::ClientDataEncoder;
use crate::link::LinkSource;
use crate::page::PageRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path inside the application, always starting with `/`
    pub path: String,
    /// Query and form-body parameters in arrival order
    pub parameters: Vec<(String, String)>,
    /// Out-of-band request made by client-side script
    pub xhr: bool,
    /// Correlates log lines and XHR follow-up links
    pub uid: String,
    pub locale: String,
}

/// Unique id for correlating a request across log lines
pub fn generate_uid() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let count = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", Utc::now().timestamp_millis(), count)
}

impl Request {
    pub fn new(method: Method, path: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Self {
            method,
            path,
            parameters: Vec::new(),
            xhr: false,
            uid: generate_uid(),
            locale: "en".to_string(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: &str, parameters: Vec<(String, String)>) -> Self {
        Self {
            parameters,
            ..Self::new(Method::Post, path)
        }
    }

    /// Decode `a=1&b=2` style data and append the pairs
    pub fn with_urlencoded(mut self, data: &[u8]) -> Self {
        self.parameters.extend(
            url::form_urlencoded::parse(data).map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
        self
    }

    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_xhr(mut self, xhr: bool) -> Self {
        self.xhr = xhr;
        self
    }

    pub fn with_locale(mut self, locale: &str) -> Self {
        self.locale = locale.to_string();
        self
    }

    /// First value of a parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameter(name).is_some()
    }
}

/// Application-wide services shared by every request
#[derive(Debug)]
pub struct Services {
    pub links: LinkSource,
    pub client_data: ClientDataEncoder,
    pub pages: Arc<PageRegistry>,
    /// Whether field components emit client-side validation attributes
    pub client_validation: bool,
}

/// One request plus the services it runs against
#[derive(Debug, Clone)]
pub struct RequestGlobals {
    pub request: Request,
    pub services: Arc<Services>,
}

impl RequestGlobals {
    pub fn new(request: Request, services: Arc<Services>) -> Self {
        Self { request, services }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(request: Request) -> Self {
        Self::with_pages(request, Arc::new(PageRegistry::new()))
    }

    #[cfg(test)]
    pub(crate) fn with_pages(request: Request, pages: Arc<PageRegistry>) -> Self {
        use crate::link::LinkSettings;

        let services = Services {
            links: LinkSource::new(LinkSettings::default(), pages.clone()),
            client_data: ClientDataEncoder::new(Some("test-passphrase"), 512),
            pages,
            client_validation: true,
        };
        Self::new(request, Arc::new(services))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_normalized_and_parameters_decoded() {
        let request = Request::get("index").with_urlencoded(b"t%3Aac=1%2F2&name=Ada+L");
        assert_eq!(request.path, "/index");
        assert_eq!(request.parameter("t:ac"), Some("1/2"));
        assert_eq!(request.parameter("name"), Some("Ada L"));
        assert!(request.parameter("missing").is_none());
    }

    #[test]
    fn test_uids_are_unique() {
        assert_ne!(generate_uid(), generate_uid());
    }
}
