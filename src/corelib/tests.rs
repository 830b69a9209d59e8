use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::component::{Component, ComponentEvent, EventOutcome, EventResult, EventScope};
use crate::page::{Embedded, Page, PageDefinition, PageLoader, PageRegistry, Template};
use crate::render::{render_page, Environment};
use crate::request::{Request, RequestGlobals};

type Log = Arc<Mutex<Vec<String>>>;

struct Plain;
impl Component for Plain {}

/// Page class that logs every event reaching it and leaves on `success`
struct SignupPage {
    log: Log,
}

impl Component for SignupPage {
    fn on_event(&mut self, event: &ComponentEvent, _scope: &mut EventScope<'_>) -> anyhow::Result<EventOutcome> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", event.name, event.source));
        if event.is("success") {
            return Ok(EventOutcome::Abort(EventResult::page("Done")));
        }
        Ok(EventOutcome::NotHandled)
    }
}

/// Page class with a one-value activation context
struct LinksPage;

impl Component for LinksPage {
    fn on_event(&mut self, event: &ComponentEvent, _scope: &mut EventScope<'_>) -> anyhow::Result<EventOutcome> {
        if event.is("passivate") {
            return Ok(EventOutcome::Abort(EventResult::Context(vec!["7".to_string()])));
        }
        Ok(EventOutcome::NotHandled)
    }
}

fn loader(definitions: Vec<PageDefinition>) -> PageLoader {
    let mut components = ComponentRegistry::new();
    register(&mut components);
    let mut pages = PageRegistry::new();
    for definition in definitions {
        pages.register(definition);
    }
    PageLoader::new(Arc::new(pages), Arc::new(components))
}

fn globals(loader: &PageLoader, request: Request) -> RequestGlobals {
    RequestGlobals::with_pages(request, loader.pages().clone())
}

fn render(loader: &PageLoader, page: &mut Page, request: Request) -> String {
    let globals = globals(loader, request);
    let mut environment = Environment::new();
    render_page(page, &mut environment, &globals).unwrap()
}

/// Value of the hidden field `name` in rendered markup
fn hidden_value(markup: &str, name: &str) -> String {
    let marker = format!("name=\"{}\" value=\"", name);
    let start = markup.find(&marker).unwrap() + marker.len();
    let end = markup[start..].find('"').unwrap() + start;
    markup[start..end].to_string()
}

/// Submit `form` on `page` with the given parameters
fn submit(loader: &PageLoader, page: &mut Page, path: &str, parameters: &[(&str, &str)]) -> Option<EventResult> {
    let parameters = parameters
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let globals = globals(loader, Request::post(path, parameters));
    let mut environment = Environment::new();
    let form = page.require_element("form").unwrap();

    let trigger = page
        .trigger_event(form, ComponentEvent::new("action", Vec::new()), &mut environment, &globals)
        .unwrap();
    assert!(environment.ensure_balanced().is_ok());
    trigger.result
}

fn signup(log: &Log) -> PageLoader {
    let shared = log.clone();
    let template = Template::new().embed(
        Embedded::of("Form").id("form").body(
            Template::new()
                .embed(Embedded::of("Label").param("for", "name"))
                .embed(
                    Embedded::of("TextField")
                        .id("name")
                        .param("value", "prop:name")
                        .param("validate", "required,minlength=3"),
                )
                .embed(Embedded::of("Submit").id("save"))
                .embed(Embedded::of("Submit").id("cancel").param("mode", "cancel")),
        ),
    );
    loader(vec![
        PageDefinition::new("Signup", move || SignupPage { log: shared.clone() }, template)
            .with_properties(json!({"name": "Ada"})),
        PageDefinition::new("Done", || Plain, Template::new()),
    ])
}

#[test]
fn test_default_label() {
    assert_eq!(default_label("firstName"), "First Name");
    assert_eq!(default_label("first_name"), "First Name");
    assert_eq!(default_label("save"), "Save");
}

#[test]
fn test_flow_components_render() {
    let template = Template::new()
        .embed(
            Embedded::of("Any")
                .param("element", "ul")
                .param("class", "list")
                .body(
                    Template::new().embed(
                        Embedded::of("Loop")
                            .param("source", "prop:items")
                            .param("value", "prop:item")
                            .body(Template::new().element("li", &[], Template::new().expansion("item"))),
                    ),
                ),
        )
        .embed(
            Embedded::of("If")
                .param("test", "prop:hidden")
                .param("else", "block:fallback")
                .body(Template::new().text("shown")),
        )
        .embed(
            Embedded::of("Loop")
                .param("source", "prop:none")
                .param("empty", "block:nothing"),
        )
        .embed(Embedded::of("Output").param("value", "prop:title").param("element", "h1"))
        .embed(Embedded::of("Delegate").param("to", "block:extra"))
        .block("fallback", Template::new().text("fallback"))
        .block("nothing", Template::new().text("(none)"))
        .block("extra", Template::new().text("[extra]"));
    let loader = loader(vec![PageDefinition::new("Show", || Plain, template).with_properties(
        json!({"items": ["a", "b"], "hidden": false, "none": [], "title": "Hi & bye"}),
    )]);

    let mut page = loader.load("Show", "en").unwrap();
    let markup = render(&loader, &mut page, Request::get("/show"));
    assert_eq!(
        markup,
        "<ul class=\"list\"><li>a</li><li>b</li></ul>fallback(none)<h1>Hi &amp; bye</h1>[extra]"
    );
    assert!(!page.is_dirty());
}

#[test]
fn test_links_carry_activation_context() {
    let template = Template::new()
        .embed(
            Embedded::of("ActionLink")
                .id("del")
                .param("context", "literal:x")
                .body(Template::new().text("Delete")),
        )
        .embed(Embedded::of("EventLink").id("refresh").body(Template::new().text("Refresh")))
        .embed(Embedded::of("PageLink").param("page", "Links").body(Template::new().text("Self")))
        .embed(Embedded::of("PageLink").param("page", "other").body(Template::new().text("Other")));
    let loader = loader(vec![
        PageDefinition::new("Links", || LinksPage, template),
        PageDefinition::new("Other", || Plain, Template::new()),
    ]);

    let mut page = loader.load("Links", "en").unwrap();
    let markup = render(&loader, &mut page, Request::get("/links"));
    assert_eq!(
        markup,
        "<a href=\"links.del/x?t%3Aac=7\">Delete</a>\
         <a href=\"/links.refresh:refresh?t%3Aac=7\">Refresh</a>\
         <a href=\"links/7\">Self</a>\
         <a href=\"other\">Other</a>"
    );
}

#[test]
fn test_form_render_records_fields() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let loader = signup(&log);
    let mut page = loader.load("Signup", "en").unwrap();

    let markup = render(&loader, &mut page, Request::get("/signup"));
    assert!(markup.starts_with(
        "<form method=\"post\" action=\"/signup.form\" id=\"form\">\
         <div class=\"t-invisible\"><input type=\"hidden\" name=\"t:formid\" value=\"form\"></div>\
         <label for=\"name\">Name</label>\
         <input type=\"text\" name=\"name\" id=\"name\" value=\"Ada\" required=\"required\" minlength=\"3\">\
         <input type=\"submit\" name=\"save\" id=\"save\" value=\"Save\">\
         <input type=\"submit\" name=\"t:cancel\" id=\"cancel\" value=\"Cancel\">"
    ));
    assert!(markup.ends_with("\"></div></form>"));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["prepareForRender:form", "prepare:form", "passivate:"]
    );

    let request = globals(&loader, Request::get("/signup"));
    let actions = decode_actions_from(&request, &hidden_value(&markup, "t:formdata"));
    assert_eq!(
        actions,
        vec![
            ("Signup:name".to_string(), false),
            ("Signup:save".to_string(), false),
            ("Signup:cancel".to_string(), true),
        ]
    );
}

fn decode_actions_from(globals: &RequestGlobals, data: &str) -> Vec<(String, bool)> {
    crate::form::decode_actions(&globals.services.client_data, data)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.complete_id, entry.cancel))
        .collect()
}

#[test]
fn test_successful_submission_updates_properties() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let loader = signup(&log);
    let mut page = loader.load("Signup", "en").unwrap();
    let markup = render(&loader, &mut page, Request::get("/signup"));
    let data = hidden_value(&markup, "t:formdata");
    log.lock().unwrap().clear();

    let result = submit(
        &loader,
        &mut page,
        "/signup.form",
        &[("t:formid", "form"), ("t:formdata", data.as_str()), ("name", "Grace"), ("save", "Save")],
    );

    assert_eq!(result, Some(EventResult::page("Done")));
    assert_eq!(page.property("name"), Some(&json!("Grace")));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "prepareForSubmit:form",
            "prepare:form",
            "selected:save",
            "validate:form",
            "success:form",
        ]
    );
}

#[test]
fn test_failed_validation_renders_errors() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let loader = signup(&log);
    let mut page = loader.load("Signup", "en").unwrap();
    let markup = render(&loader, &mut page, Request::get("/signup"));
    let data = hidden_value(&markup, "t:formdata");
    log.lock().unwrap().clear();

    let result = submit(
        &loader,
        &mut page,
        "/signup.form",
        &[("t:formid", "form"), ("t:formdata", data.as_str()), ("name", "Al"), ("save", "Save")],
    );

    assert_eq!(result, Some(EventResult::RenderPage));
    assert_eq!(page.property("name"), Some(&json!("Ada")));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "prepareForSubmit:form",
            "prepare:form",
            "selected:save",
            "validate:form",
            "failure:form",
            "submit:form",
        ]
    );

    let markup = render(&loader, &mut page, Request::post("/signup.form", Vec::new()));
    assert!(markup.contains("<label for=\"name\" class=\"t-error\">Name</label>"));
    assert!(markup.contains(
        "<input type=\"text\" name=\"name\" id=\"name\" value=\"Al\" required=\"required\" minlength=\"3\" class=\"t-error\">\
         <span class=\"t-error-message\">You must provide at least 3 characters for Name.</span>"
    ));
}

#[test]
fn test_cancel_skips_fields_and_validation() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let loader = signup(&log);
    let mut page = loader.load("Signup", "en").unwrap();
    let markup = render(&loader, &mut page, Request::get("/signup"));
    let data = hidden_value(&markup, "t:formdata");
    log.lock().unwrap().clear();

    let result = submit(
        &loader,
        &mut page,
        "/signup.form",
        &[("t:formid", "form"), ("t:formdata", data.as_str()), ("name", "Zed"), ("t:cancel", "Cancel")],
    );

    assert_eq!(result, None);
    assert_eq!(page.property("name"), Some(&json!("Ada")));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "prepareForSubmit:form",
            "prepare:form",
            "selected:cancel",
            "canceled:form",
        ]
    );
}

#[test]
fn test_missing_form_data_is_an_error() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let loader = signup(&log);
    let mut page = loader.load("Signup", "en").unwrap();

    let request = globals(&loader, Request::post("/signup.form", Vec::new()));
    let mut environment = Environment::new();
    let form = page.require_element("form").unwrap();
    let err = page
        .trigger_event(form, ComponentEvent::new("action", Vec::new()), &mut environment, &request)
        .unwrap_err();
    assert!(err.to_string().contains("t:formdata"));
    assert!(environment.ensure_balanced().is_ok());
}

#[test]
fn test_loop_rows_replay_against_their_items() {
    let template = Template::new().embed(
        Embedded::of("Form").id("form").body(
            Template::new()
                .embed(
                    Embedded::of("Loop")
                        .id("rows")
                        .param("source", "prop:entries")
                        .param("index", "prop:index")
                        .body(
                            Template::new().embed(
                                Embedded::of("TextField")
                                    .id("message")
                                    .param("value", "prop:entries.{index}.message"),
                            ),
                        ),
                )
                .embed(Embedded::of("Submit").id("save")),
        ),
    );
    let loader = loader(vec![PageDefinition::new("EditAll", || Plain, template)
        .with_properties(json!({"entries": [{"message": "one"}, {"message": "two"}]}))]);

    let mut page = loader.load("EditAll", "en").unwrap();
    let markup = render(&loader, &mut page, Request::get("/editall"));
    assert!(markup.contains("name=\"message\" id=\"message\" value=\"one\""));
    assert!(markup.contains("name=\"message_0\" id=\"message_0\" value=\"two\""));
    let data = hidden_value(&markup, "t:formdata");

    let result = submit(
        &loader,
        &mut page,
        "/editall.form",
        &[("t:formdata", data.as_str()), ("message", "uno"), ("message_0", "dos"), ("save", "Save")],
    );

    assert_eq!(result, None);
    assert_eq!(
        page.property("entries"),
        Some(&json!([{"message": "uno"}, {"message": "dos"}]))
    );
}

#[test]
fn test_labels_in_loop_rows_point_at_their_own_field() {
    let template = Template::new().embed(
        Embedded::of("Form").id("form").body(
            Template::new().embed(
                Embedded::of("Loop")
                    .param("source", "prop:rows")
                    .param("value", "prop:row")
                    .body(
                        Template::new()
                            .embed(Embedded::of("Label").param("for", "name"))
                            .embed(Embedded::of("TextField").id("name").param("value", "prop:row")),
                    ),
            ),
        ),
    );
    let loader = loader(vec![
        PageDefinition::new("Rows", || Plain, template).with_properties(json!({"rows": ["a", "b"]}))
    ]);

    let mut page = loader.load("Rows", "en").unwrap();
    let markup = render(&loader, &mut page, Request::get("/rows"));
    assert!(
        markup.contains(
            "<label for=\"name\">Name</label>\
             <input type=\"text\" name=\"name\" id=\"name\" value=\"a\">\
             <label for=\"name_0\">Name</label>\
             <input type=\"text\" name=\"name_0\" id=\"name_0\" value=\"b\">"
        ),
        "got: {}",
        markup
    );
}

#[test]
fn test_fragment_fields_only_process_when_submitted() {
    let template = Template::new().embed(
        Embedded::of("Form").id("form").body(
            Template::new()
                .embed(
                    Embedded::of("FormFragment").id("extra").body(
                        Template::new().embed(Embedded::of("TextField").id("street").param("value", "prop:street")),
                    ),
                )
                .embed(Embedded::of("Submit").id("save")),
        ),
    );
    let loader = loader(vec![PageDefinition::new("Address", || Plain, template)]);

    let mut page = loader.load("Address", "en").unwrap();
    let markup = render(&loader, &mut page, Request::get("/address"));
    assert!(markup.contains("<div id=\"extra\"><input type=\"text\" name=\"street\" id=\"street\" value=\"\">"));
    let data = hidden_value(&markup, "t:formdata");
    let fragment = hidden_value(&markup, "extra");

    submit(
        &loader,
        &mut page,
        "/address.form",
        &[("t:formdata", data.as_str()), ("street", "Elm"), ("save", "Save")],
    );
    assert_eq!(page.property("street"), None);

    submit(
        &loader,
        &mut page,
        "/address.form",
        &[("t:formdata", data.as_str()), ("extra", fragment.as_str()), ("street", "Elm"), ("save", "Save")],
    );
    assert_eq!(page.property("street"), Some(&json!("Elm")));
}
