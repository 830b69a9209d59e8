//! HTTP server - adapts axum requests to the request pipeline
//!
//! Every path under the context path goes to one catch-all handler. The
//! handler reduces the HTTP request to a `Request`, runs it through the
//! `Application` on the blocking pool, and turns the `Response` back into
//! HTTP.

mod error;

pub use error::ServerError;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method as HttpMethod, StatusCode, Uri},
    response::IntoResponse,
    routing::any,
    Router,
};
use tokio::net::TcpListener;

use crate::app::Application;
use crate::config::Config;
use crate::dispatch::Response;
use crate::request::{Method, Request};

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared state for the HTTP handlers
#[derive(Clone)]
struct ServerState {
    app: Arc<Application>,
    context_path: String,
}

/// Start the HTTP server and run until `shutdown_rx` fires
pub async fn start_server(
    config: Config,
    app: Arc<Application>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    let bind_addr = config.bind_addr;

    // Periodic pool cleanup; stopped once the server has shut down
    let cleanup_app = app.clone();
    let interval = config.pool.cleanup_interval();
    let cleanup = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = cleanup_app.pool().cleanup();
            if evicted > 0 {
                tracing::debug!(evicted, "Page pool cleanup");
            }
        }
    });

    let state = ServerState {
        app,
        context_path: config.context_path.clone(),
    };

    let router = Router::new()
        .route("/", any(page_handler))
        .route("/*path", any(page_handler))
        .with_state(state);

    tracing::info!("Starting server on {}", bind_addr);

    let listener = TcpListener::bind(bind_addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        "Serving pages at http://{}{}/",
        bind_addr,
        config.context_path
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_rx.await.ok();
        })
        .await
        .context("Server error")?;

    cleanup.abort();
    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Catch-all handler feeding the request pipeline
async fn page_handler(
    State(state): State<ServerState>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<axum::response::Response, ServerError> {
    let start = Instant::now();

    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ServerError::BadRequest(format!("Failed to read request body: {}", e)))?;

    let request = build_request(
        &state.context_path,
        &method,
        &uri,
        &headers,
        &body_bytes,
        state.app.default_locale(),
    )?;
    let uid = request.uid.clone();
    tracing::debug!(uid = %uid, xhr = request.xhr, "{} {}", method, uri);

    let app = state.app.clone();
    let response = tokio::task::spawn_blocking(move || app.handle(request))
        .await
        .map_err(|e| ServerError::Internal(format!("Request task failed: {}", e)))??;

    tracing::info!(
        uid = %uid,
        status = response.status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "{} {}",
        method,
        uri.path()
    );

    Ok(into_http(response))
}

/// `X-Requested-With: XMLHttpRequest` marks script-issued requests
fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
}

fn is_form_body(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// Reduce an HTTP request to the pipeline's view of it
///
/// The context path is removed from the path; query parameters come first,
/// then form body parameters.
fn build_request(
    context_path: &str,
    method: &HttpMethod,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
    locale: &str,
) -> Result<Request, ServerError> {
    let method = if method == HttpMethod::GET || method == HttpMethod::HEAD {
        Method::Get
    } else if method == HttpMethod::POST {
        Method::Post
    } else {
        return Err(ServerError::BadRequest(format!(
            "Method {} is not supported",
            method
        )));
    };

    let path = match uri.path().strip_prefix(context_path) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => {
            return Err(ServerError::NotFound(format!(
                "{} is outside of {}",
                uri.path(),
                context_path
            )))
        }
    };

    let mut request = Request::new(method, path)
        .with_xhr(is_xhr(headers))
        .with_locale(locale);
    if let Some(query) = uri.query() {
        request = request.with_urlencoded(query.as_bytes());
    }
    if method == Method::Post && is_form_body(headers) {
        request = request.with_urlencoded(body);
    }
    Ok(request)
}

fn into_http(response: Response) -> axum::response::Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = axum::http::Response::builder().status(status);
    if let Some(content_type) = &response.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type.as_str());
    }
    if let Some(location) = &response.location {
        builder = builder.header(header::LOCATION, location.as_str());
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| {
            ServerError::Internal(format!("Failed to build response: {}", e)).into_response()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_build_request_strips_context_path() {
        let uri: Uri = "/app/index.form?t%3Aac=3".parse().unwrap();
        let request = build_request(
            "/app",
            &HttpMethod::POST,
            &uri,
            &headers(&[("content-type", "application/x-www-form-urlencoded")]),
            b"name=Ada+L&t%3Aformdata=abc",
            "fr",
        )
        .unwrap();

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/index.form");
        assert_eq!(request.locale, "fr");
        assert!(!request.xhr);
        assert_eq!(
            request.parameters,
            vec![
                ("t:ac".to_string(), "3".to_string()),
                ("name".to_string(), "Ada L".to_string()),
                ("t:formdata".to_string(), "abc".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_request_root_and_outside_paths() {
        let root: Uri = "/app".parse().unwrap();
        let request = build_request("/app", &HttpMethod::GET, &root, &HeaderMap::new(), b"", "en").unwrap();
        assert_eq!(request.path, "/");

        let outside: Uri = "/application".parse().unwrap();
        let error = build_request("/app", &HttpMethod::GET, &outside, &HeaderMap::new(), b"", "en").unwrap_err();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);

        let no_context: Uri = "/".parse().unwrap();
        let request = build_request("", &HttpMethod::GET, &no_context, &HeaderMap::new(), b"", "en").unwrap();
        assert_eq!(request.path, "/");
    }

    #[test]
    fn test_build_request_xhr_and_ignored_body() {
        let uri: Uri = "/index.more".parse().unwrap();
        let request = build_request(
            "",
            &HttpMethod::GET,
            &uri,
            &headers(&[("x-requested-with", "XMLHttpRequest")]),
            b"ignored=1",
            "en",
        )
        .unwrap();
        assert!(request.xhr);
        assert!(request.parameters.is_empty());

        let error = build_request("", &HttpMethod::DELETE, &uri, &HeaderMap::new(), b"", "en").unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_into_http_redirect() {
        let response = into_http(Response::redirect("/app/index".to_string()));
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/app/index"
        );
    }

    #[tokio::test]
    async fn test_page_handler_runs_pipeline() {
        let (pages, components) = crate::demo::registry();
        let app = Arc::new(Application::new(&Config::default(), pages, components).unwrap());
        let state = ServerState {
            app,
            context_path: String::new(),
        };

        let response = page_handler(
            State(state.clone()),
            HttpMethod::GET,
            "/".parse().unwrap(),
            HeaderMap::new(),
            Body::empty(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );

        let missing = page_handler(
            State(state),
            HttpMethod::GET,
            "/nowhere".parse().unwrap(),
            HeaderMap::new(),
            Body::empty(),
        )
        .await;
        assert_eq!(missing.err().map(|e| e.status()), Some(StatusCode::NOT_FOUND));
    }
}
