use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use crate::component::{Component, Flow, RenderScope};
use crate::page::{
    ComponentDefinition, ComponentRegistry, Embedded, Page, PageDefinition, PageElement, PageLoader, PageRegistry,
    Template,
};
use crate::render::{command, render_page, Environment, RenderQueueError};
use crate::request::{Request, RequestGlobals};

type Log = Arc<Mutex<Vec<String>>>;

/// Records every stage it goes through, by complete id
struct Tracer {
    log: Log,
}

impl Tracer {
    fn record(&self, stage: &str, scope: &RenderScope<'_>) -> anyhow::Result<Flow> {
        let id = scope.page.resources(scope.element)?.complete_id.clone();
        self.log.lock().unwrap().push(format!("{} {}", stage, id));
        Ok(Flow::Continue)
    }
}

impl Component for Tracer {
    fn setup_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        self.record("setup", scope)
    }

    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        self.record("begin", scope)
    }

    fn after_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        self.record("after", scope)
    }

    fn cleanup_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        self.record("cleanup", scope)
    }
}

/// Halts in setup, so nothing but cleanup follows
struct Skipper;

impl Component for Skipper {
    fn setup_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        Ok(Flow::Halt)
    }
}

/// Renders its body once more for each remaining repeat
struct Repeater {
    remaining: u32,
}

impl Component for Repeater {
    fn after_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(Flow::Halt);
        }
        Ok(Flow::Continue)
    }
}

/// Starts over from setup once
struct Restarter {
    restarted: bool,
}

impl Component for Restarter {
    fn cleanup_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        if self.restarted {
            return Ok(Flow::Continue);
        }
        self.restarted = true;
        Ok(Flow::Halt)
    }
}

struct Swap;

impl Component for Swap {
    fn begin_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        Ok(Flow::Render("alt".to_string()))
    }
}

/// Tries to render itself from inside its own render
struct Reentrant;

impl Component for Reentrant {
    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        scope.defer(PageElement::Component(scope.element))?;
        Ok(Flow::Continue)
    }
}

struct Failing;

impl Component for Failing {
    fn begin_render(&mut self, _scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        anyhow::bail!("boom")
    }
}

/// Pushes an environmental and never pops it
struct Leaky;

impl Component for Leaky {
    fn setup_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        scope.environment.push(42u32);
        Ok(Flow::Continue)
    }
}

/// Writes around a heartbeat; deferred output lands when it ends
struct Beat;

impl Component for Beat {
    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        scope.heartbeat_begin();
        scope.defer(command(|cx, _| {
            cx.writer.write("[deferred]");
            Ok(())
        }))?;
        scope.writer.write("[inside]");
        scope.heartbeat_end()?;
        scope.writer.write("[after]");
        Ok(Flow::Halt)
    }
}

/// Defers a command that fails when its heartbeat ends
struct FailingBeat;

impl Component for FailingBeat {
    fn begin_render(&mut self, scope: &mut RenderScope<'_>) -> anyhow::Result<Flow> {
        scope.heartbeat_begin();
        scope.defer(command(|_, _| anyhow::bail!("deferred boom")))?;
        scope.heartbeat_end()?;
        Ok(Flow::Continue)
    }
}

fn loader(log: &Log, template: Template) -> PageLoader {
    let shared = log.clone();
    let mut components = ComponentRegistry::new();
    components.register(ComponentDefinition::new("Tracer", move || Tracer { log: shared.clone() }));
    components.register(ComponentDefinition::new("Skipper", || Skipper));
    components.register(ComponentDefinition::new("Repeater", || Repeater { remaining: 2 }));
    components.register(ComponentDefinition::new("Restarter", || Restarter { restarted: false }));
    components.register(ComponentDefinition::new("Swap", || Swap));
    components.register(ComponentDefinition::new("Reentrant", || Reentrant));
    components.register(ComponentDefinition::new("Failing", || Failing));
    components.register(ComponentDefinition::new("Leaky", || Leaky));
    components.register(ComponentDefinition::new("Beat", || Beat));
    components.register(ComponentDefinition::new("FailingBeat", || FailingBeat));

    let root_log = log.clone();
    let mut pages = PageRegistry::new();
    pages.register(PageDefinition::new(
        "Test",
        move || Tracer {
            log: root_log.clone(),
        },
        template,
    ));
    PageLoader::new(Arc::new(pages), Arc::new(components))
}

fn load(log: &Log, template: Template) -> Page {
    loader(log, template).load("Test", "en").unwrap()
}

fn render(page: &mut Page) -> anyhow::Result<String> {
    let globals = RequestGlobals::for_tests(Request::get("/test"));
    let mut environment = Environment::new();
    render_page(page, &mut environment, &globals)
}

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_stage_order_nests_children() {
    let log = log();
    let mut page = load(
        &log,
        Template::new()
            .text("a")
            .embed(Embedded::of("Tracer").id("child").body(Template::new().text("b")))
            .text("c"),
    );

    assert_eq!(render(&mut page).unwrap(), "abc");
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "setup Test",
            "begin Test",
            "setup Test:child",
            "begin Test:child",
            "after Test:child",
            "cleanup Test:child",
            "after Test",
            "cleanup Test",
        ]
    );
    assert!(!page.is_dirty());
}

#[test]
fn test_setup_halt_skips_to_cleanup() {
    let log = log();
    let mut page = load(
        &log,
        Template::new()
            .embed(Embedded::of("Skipper").body(Template::new().text("hidden")))
            .text("shown"),
    );

    assert_eq!(render(&mut page).unwrap(), "shown");
}

#[test]
fn test_after_halt_renders_again() {
    let log = log();
    let mut page = load(
        &log,
        Template::new().embed(Embedded::of("Repeater").body(Template::new().text("x"))),
    );

    assert_eq!(render(&mut page).unwrap(), "xxx");
}

#[test]
fn test_cleanup_halt_restarts_from_setup() {
    let log = log();
    let mut page = load(
        &log,
        Template::new().embed(Embedded::of("Restarter").body(Template::new().text("y"))),
    );

    assert_eq!(render(&mut page).unwrap(), "yy");
}

#[test]
fn test_begin_can_substitute_a_block() {
    let log = log();
    let mut page = load(
        &log,
        Template::new()
            .embed(Embedded::of("Swap").body(Template::new().text("body")))
            .block("alt", Template::new().text("from block")),
    );

    assert_eq!(render(&mut page).unwrap(), "from block");
}

#[test]
fn test_component_cannot_render_inside_itself() {
    let log = log();
    let mut page = load(&log, Template::new().embed(Embedded::of("Reentrant").id("again")));

    let error = render(&mut page).unwrap_err();
    assert!(
        format!("{:#}", error).contains("Component Test:again is already rendering"),
        "got: {:#}",
        error
    );
}

#[test]
fn test_failure_reports_active_components() {
    let log = log();
    let mut page = load(&log, Template::new().embed(Embedded::of("Failing").id("boom")));

    let error = render(&mut page).unwrap_err();
    let queue_error = error.downcast_ref::<RenderQueueError>().unwrap();
    assert_eq!(queue_error.active_components, vec!["Test", "Test:boom"]);
    assert_eq!(queue_error.cause.to_string(), "boom");
}

#[test]
fn test_unbalanced_environment_fails_render() {
    let log = log();
    let mut page = load(&log, Template::new().embed(Embedded::of("Leaky")));

    let error = render(&mut page).unwrap_err();
    assert!(error.to_string().contains("Environment still holds values"), "got: {}", error);
}

#[test]
fn test_deferred_commands_run_when_heartbeat_ends() {
    let log = log();
    let mut page = load(&log, Template::new().embed(Embedded::of("Beat")));

    assert_eq!(render(&mut page).unwrap(), "[inside][deferred][after]");
}

#[test]
fn test_deferred_failure_reports_active_components() {
    let log = log();
    let mut page = load(&log, Template::new().embed(Embedded::of("FailingBeat").id("beat")));

    let error = render(&mut page).unwrap_err();
    let queue_error = error.downcast_ref::<RenderQueueError>().unwrap();
    assert_eq!(queue_error.active_components, vec!["Test", "Test:beat"]);
    assert_eq!(queue_error.cause.to_string(), "deferred boom");
}
