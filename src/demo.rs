// Demo application: a small guest book
//
// Pages:
// - Index: lists entries, signs new ones through a form, deletes with an
//   action link; `stats` and `refresh` answer XHR requests
// - Entry: one entry, addressed by activation context (`/entry/3`)
// - EditAll: every message in one form, one text field per loop row
//
// Entries live in a `Guestbook` shared by all page instances. Page
// properties are reset whenever a page goes back to the pool, so each
// request loads what it shows on `activate`.
//
// Run with: cargo run (serves the demo by default)

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::component::{Component, ComponentEvent, EventOutcome, EventResult, EventScope};
use crate::corelib;
use crate::page::{
    ComponentDefinition, ComponentRegistry, Embedded, PageDefinition, PageRegistry, Template,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: u64,
    pub author: String,
    pub message: String,
}

/// Entries in signing order
#[derive(Debug, Default)]
pub struct Guestbook {
    entries: Vec<Entry>,
    next_id: u64,
}

impl Guestbook {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// A book with a couple of entries to look at
    pub fn seeded() -> Self {
        let mut book = Self::new();
        book.sign("Ada", "Lovely little framework.");
        book.sign("Grace", "Found a moth in the render queue.");
        book
    }

    pub fn sign(&mut self, author: &str, message: &str) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            author: author.to_string(),
            message: message.to_string(),
        });
        id
    }

    pub fn get(&self, id: u64) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn delete(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn update_message(&mut self, id: u64, message: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.message = message.to_string();
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedGuestbook(Arc<Mutex<Guestbook>>);

impl SharedGuestbook {
    pub fn new(book: Guestbook) -> Self {
        Self(Arc::new(Mutex::new(book)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Guestbook> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_value(&self) -> Value {
        json!(self.lock().entries())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pages
// ─────────────────────────────────────────────────────────────────────────────

struct IndexPage {
    book: SharedGuestbook,
}

impl Component for IndexPage {
    fn on_event(&mut self, event: &ComponentEvent, scope: &mut EventScope<'_>) -> anyhow::Result<EventOutcome> {
        if event.is("activate") {
            let entries = self.book.entries_value();
            let count = entries.as_array().map_or(0, Vec::len);
            scope.set_property("entries", entries);
            scope.set_property("count", json!(count));
            return Ok(EventOutcome::Handled);
        }

        if event.is_from("success", "sign") {
            let author = scope.property("author").and_then(Value::as_str).unwrap_or_default().to_string();
            let message = scope.property("message").and_then(Value::as_str).unwrap_or_default().to_string();
            let id = self.book.lock().sign(&author, &message);
            tracing::info!(id, author = %author, "Guest book signed");
            return Ok(EventOutcome::Handled);
        }

        if event.is_from("action", "delete") {
            let Some(id) = event.context_as::<u64>(0) else {
                anyhow::bail!("Delete needs an entry id, got {:?}", event.context);
            };
            if self.book.lock().delete(id) {
                tracing::info!(id, "Guest book entry deleted");
            }
            return Ok(EventOutcome::Handled);
        }

        if event.is_from("stats", "stats") {
            let count = self.book.lock().entries().len();
            return Ok(EventOutcome::Abort(EventResult::Json(json!({ "entries": count }))));
        }

        if event.is_from("refresh", "refresh") {
            return Ok(EventOutcome::Abort(EventResult::Block("summary".to_string())));
        }

        Ok(EventOutcome::NotHandled)
    }
}

struct EntryPage {
    book: SharedGuestbook,
}

impl Component for EntryPage {
    fn on_event(&mut self, event: &ComponentEvent, scope: &mut EventScope<'_>) -> anyhow::Result<EventOutcome> {
        if event.is("activate") {
            let entry = event
                .context_as::<u64>(0)
                .and_then(|id| self.book.lock().get(id).cloned());
            return Ok(match entry {
                Some(entry) => {
                    scope.set_property("entry", json!(entry));
                    EventOutcome::Handled
                }
                // Nothing to show; send the visitor back to the list
                None => EventOutcome::Abort(EventResult::page("Index")),
            });
        }

        if event.is("passivate") {
            if let Some(id) = scope.property("entry").and_then(|e| e.get("id")).and_then(Value::as_u64) {
                return Ok(EventOutcome::Abort(EventResult::Context(vec![id.to_string()])));
            }
        }

        Ok(EventOutcome::NotHandled)
    }
}

struct EditAllPage {
    book: SharedGuestbook,
}

impl Component for EditAllPage {
    fn on_event(&mut self, event: &ComponentEvent, scope: &mut EventScope<'_>) -> anyhow::Result<EventOutcome> {
        // Rows must exist before the form replays into them
        if event.is("activate") {
            scope.set_property("entries", self.book.entries_value());
            return Ok(EventOutcome::Handled);
        }

        if event.is_from("success", "edit") {
            let rows = scope.property("entries").and_then(Value::as_array).cloned().unwrap_or_default();
            let mut book = self.book.lock();
            for row in rows {
                let (Some(id), Some(message)) = (row.get("id").and_then(Value::as_u64), row.get("message").and_then(Value::as_str)) else {
                    continue;
                };
                book.update_message(id, message);
            }
            return Ok(EventOutcome::Abort(EventResult::page("Index")));
        }

        Ok(EventOutcome::NotHandled)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Templates
// ─────────────────────────────────────────────────────────────────────────────

/// Page chrome shared by every demo page
fn layout_template() -> Template {
    Template::new().element(
        "html",
        &[],
        Template::new()
            .element("head", &[], Template::new().element("title", &[], Template::new().text("Guest book")))
            .element(
                "body",
                &[],
                Template::new()
                    .element("h1", &[], Template::new().text("Guest book"))
                    .body(),
            ),
    )
}

fn layout(content: Template) -> Template {
    Template::new().embed(Embedded::of("Layout").body(content))
}

fn index_template() -> Template {
    let row = Template::new().element(
        "li",
        &[],
        Template::new()
            .embed(Embedded::of("Output").param("value", "prop:entry.author").param("element", "strong"))
            .text(": ")
            .embed(Embedded::of("Output").param("value", "prop:entry.message"))
            .text(" ")
            .embed(
                Embedded::of("PageLink")
                    .param("page", "literal:Entry")
                    .param("context", "prop:entry.id")
                    .body(Template::new().text("view")),
            )
            .text(" ")
            .embed(
                Embedded::of("ActionLink")
                    .id("delete")
                    .param("context", "prop:entry.id")
                    .body(Template::new().text("delete")),
            ),
    );

    let sign = Embedded::of("Form").id("sign").body(
        Template::new()
            .embed(Embedded::of("Label").param("for", "author"))
            .embed(
                Embedded::of("TextField")
                    .id("author")
                    .param("value", "prop:author")
                    .param("validate", "required,maxlength=40"),
            )
            .embed(Embedded::of("Label").param("for", "message"))
            .embed(
                Embedded::of("TextField")
                    .id("message")
                    .param("value", "prop:message")
                    .param("validate", "required,maxlength=200"),
            )
            .embed(Embedded::of("Submit").id("post").param("value", "literal:Sign")),
    );

    layout(
        Template::new()
            .embed(
                Embedded::of("If")
                    .param("test", "prop:count")
                    .param("else", "block:empty")
                    .body(Template::new().element(
                        "ul",
                        &[],
                        Template::new().embed(
                            Embedded::of("Loop")
                                .param("source", "prop:entries")
                                .param("value", "prop:entry")
                                .body(row),
                        ),
                    )),
            )
            .embed(sign)
            .embed(Embedded::of("PageLink").param("page", "literal:EditAll").body(Template::new().text("Edit all")))
            .embed(Embedded::of("EventLink").id("stats").body(Template::new().text("Stats")))
            .embed(Embedded::of("EventLink").id("refresh").body(Template::new().text("Refresh")))
            .block("empty", Template::new().element("p", &[], Template::new().text("No entries yet.")))
            .block("summary", Template::new().text("Entries: ").expansion("count")),
    )
}

fn entry_template() -> Template {
    layout(
        Template::new()
            .embed(Embedded::of("Output").param("value", "prop:entry.author").param("element", "h2"))
            .embed(Embedded::of("Output").param("value", "prop:entry.message").param("element", "p"))
            .embed(
                Embedded::of("PageLink")
                    .param("page", "literal:Index")
                    .body(Template::new().text("Back")),
            ),
    )
}

fn edit_all_template() -> Template {
    layout(
        Template::new().embed(
            Embedded::of("Form").id("edit").body(
                Template::new()
                    .embed(
                        Embedded::of("Loop")
                            .id("rows")
                            .param("source", "prop:entries")
                            .param("index", "prop:index")
                            .body(
                                Template::new().element(
                                    "p",
                                    &[],
                                    Template::new()
                                        .embed(Embedded::of("Output").param("value", "prop:entries.{index}.author"))
                                        .text(" ")
                                        .embed(
                                            Embedded::of("TextField")
                                                .id("message")
                                                .param("value", "prop:entries.{index}.message")
                                                .param("validate", "required"),
                                        ),
                                ),
                            ),
                    )
                    .embed(Embedded::of("Submit").id("save")),
            ),
        ),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

/// Layout has no behavior of its own; its template wraps the page body
struct Layout;

impl Component for Layout {}

/// Pages and components of the demo, backed by `book`
pub fn registry_with(book: SharedGuestbook) -> (PageRegistry, ComponentRegistry) {
    let mut components = ComponentRegistry::new();
    corelib::register(&mut components);
    components.register(ComponentDefinition::new("Layout", || Layout).with_template(layout_template()));

    let mut pages = PageRegistry::new();
    let index_book = book.clone();
    pages.register(
        PageDefinition::new("Index", move || IndexPage { book: index_book.clone() }, index_template())
            .with_properties(json!({"author": "", "message": ""})),
    );
    let entry_book = book.clone();
    pages.register(PageDefinition::new(
        "Entry",
        move || EntryPage { book: entry_book.clone() },
        entry_template(),
    ));
    pages.register(PageDefinition::new(
        "EditAll",
        move || EditAllPage { book: book.clone() },
        edit_all_template(),
    ));

    (pages, components)
}

/// The demo as served by `trellis serve`
pub fn registry() -> (PageRegistry, ComponentRegistry) {
    registry_with(SharedGuestbook::new(Guestbook::seeded()))
}
