use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::app::Application;
use crate::component::{Component, ComponentEvent, EventOutcome, EventResult, EventScope};
use crate::config::Config;
use crate::corelib;
use crate::page::{ComponentRegistry, Embedded, PageDefinition, PageRegistry, Template};
use crate::request::Request;

/// Page properties are reset between requests, so counters live outside
type Counter = Arc<Mutex<u32>>;

struct HomePage {
    counter: Counter,
}

impl Component for HomePage {
    fn on_event(&mut self, event: &ComponentEvent, scope: &mut EventScope<'_>) -> anyhow::Result<EventOutcome> {
        if event.is("activate") {
            let count = *self.counter.lock().unwrap();
            scope.set_property("count", json!(count));
            return Ok(EventOutcome::Handled);
        }
        if event.is_from("action", "bump") {
            *self.counter.lock().unwrap() += 1;
            return Ok(EventOutcome::Handled);
        }
        if event.is_from("go", "go") {
            return Ok(EventOutcome::Abort(EventResult::page("Other")));
        }
        if event.is_from("partial", "partial") {
            return Ok(EventOutcome::Abort(EventResult::Block("status".to_string())));
        }
        if event.is_from("stats", "stats") {
            let count = *self.counter.lock().unwrap();
            return Ok(EventOutcome::Abort(EventResult::Json(json!({ "count": count }))));
        }
        Ok(EventOutcome::NotHandled)
    }
}

/// Needs one context value; without it, sends the browser home
struct GuardedPage;

impl Component for GuardedPage {
    fn on_event(&mut self, event: &ComponentEvent, scope: &mut EventScope<'_>) -> anyhow::Result<EventOutcome> {
        if event.is("activate") {
            return Ok(match event.context_value(0) {
                Some(item) => {
                    scope.set_property("item", json!(item));
                    EventOutcome::Handled
                }
                None => EventOutcome::Abort(EventResult::page("Index")),
            });
        }
        Ok(EventOutcome::NotHandled)
    }
}

struct Plain;
impl Component for Plain {}

fn application(counter: &Counter) -> Application {
    let mut components = ComponentRegistry::new();
    corelib::register(&mut components);

    let home = Template::new()
        .text("Home ")
        .embed(Embedded::of("ActionLink").id("bump").body(Template::new().text("+1")))
        .embed(Embedded::of("EventLink").id("go").body(Template::new().text("Go")))
        .embed(Embedded::of("EventLink").id("partial").body(Template::new().text("Status")))
        .embed(Embedded::of("EventLink").id("stats").body(Template::new().text("Stats")))
        .block("status", Template::new().text("Count: ").expansion("count"));

    let shared = counter.clone();
    let mut pages = PageRegistry::new();
    pages.register(PageDefinition::new(
        "Index",
        move || HomePage {
            counter: shared.clone(),
        },
        home,
    ));
    pages.register(PageDefinition::new(
        "Guarded",
        || GuardedPage,
        Template::new().text("Item ").expansion("item"),
    ));
    pages.register(PageDefinition::new("Other", || Plain, Template::new().text("Other page")));

    Application::new(&Config::default(), pages, components).unwrap()
}

fn counter() -> Counter {
    Arc::new(Mutex::new(0))
}

#[test]
fn test_standard_pipeline_order() {
    let app = application(&counter());
    assert_eq!(
        app.dispatcher_names(),
        vec!["component-event", "component-action", "page-render"]
    );
}

#[test]
fn test_page_render() {
    let app = application(&counter());

    let response = app.handle(Request::get("/")).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type.as_deref(), Some("text/html; charset=utf-8"));
    assert!(response.body.starts_with("Home <a href="), "got: {}", response.body);

    let other = app.handle(Request::get("/other")).unwrap();
    assert_eq!(other.body, "Other page");
}

#[test]
fn test_unmatched_paths_are_not_found() {
    let app = application(&counter());

    let error = app.handle(Request::get("/nowhere")).unwrap_err();
    assert_eq!(error.status(), StatusCode::NOT_FOUND);

    let error = app.handle(Request::get("/index.missing")).unwrap_err();
    assert_eq!(error.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_event_without_result_redirects_to_active_page() {
    let counter = counter();
    let app = application(&counter);

    let response = app.handle(Request::post("/index.bump", Vec::new())).unwrap();
    assert_eq!(response.status, 302);
    assert_eq!(response.location.as_deref(), Some("/"));
    assert_eq!(*counter.lock().unwrap(), 1);

    // The follow-up GET sees the new state
    let response = app.handle(Request::get("/")).unwrap();
    assert_eq!(response.status, 200);
}

#[test]
fn test_page_result_redirects() {
    let app = application(&counter());

    let response = app.handle(Request::get("/index.go:go")).unwrap();
    assert!(response.is_redirect());
    assert_eq!(response.location.as_deref(), Some("/other"));
}

#[test]
fn test_activation_abort_replaces_render() {
    let app = application(&counter());

    let response = app.handle(Request::get("/guarded")).unwrap();
    assert_eq!(response.status, 302);
    assert_eq!(response.location.as_deref(), Some("/"));

    let response = app.handle(Request::get("/guarded/5")).unwrap();
    assert_eq!(response.body, "Item 5");
}

#[test]
fn test_xhr_results_are_json() {
    let counter = counter();
    let app = application(&counter);

    let block = app
        .handle(Request::get("/index.partial:partial").with_xhr(true))
        .unwrap();
    assert_eq!(block.content_type.as_deref(), Some("application/json"));
    let body: Value = serde_json::from_str(&block.body).unwrap();
    assert_eq!(body, json!({ "content": "Count: 0" }));

    let stats = app.handle(Request::get("/index.stats:stats").with_xhr(true)).unwrap();
    assert_eq!(serde_json::from_str::<Value>(&stats.body).unwrap(), json!({ "count": 0 }));

    // No result: an empty object, and no redirect
    let bumped = app.handle(Request::get("/index.bump").with_xhr(true)).unwrap();
    assert_eq!(bumped.status, 200);
    assert_eq!(bumped.body, "{}");
    assert_eq!(*counter.lock().unwrap(), 1);

    // Links built for an XHR request carry its uid
    let request = Request::get("/index.go:go").with_xhr(true);
    let uid = request.uid.clone();
    let redirect = app.handle(request).unwrap();
    let body: Value = serde_json::from_str(&redirect.body).unwrap();
    assert_eq!(body, json!({ "redirectURL": format!("/other?t%3Auid={}", uid) }));
}

#[test]
fn test_block_result_needs_xhr() {
    let app = application(&counter());

    let error = app.handle(Request::get("/index.partial:partial")).unwrap_err();
    assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error.message().contains("block status"), "got: {}", error.message());
}

#[test]
fn test_pages_return_to_pool() {
    let app = application(&counter());

    app.handle(Request::get("/")).unwrap();
    app.handle(Request::post("/index.bump", Vec::new())).unwrap();
    let _ = app.handle(Request::get("/index.partial:partial"));

    let stats = app.pool().stats("Index", "en");
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.idle, 1);
}
