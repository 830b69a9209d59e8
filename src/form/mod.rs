//! Form support: the action log recorded while a form renders and replayed
//! when it is submitted
//!
//! ```text
//! render   Form pushes FormSupportImpl::for_render
//!          fields store FormAction entries under their complete id
//!          Form writes the encoded log into the hidden t:formdata field
//!
//! submit   Form pushes FormSupportImpl::for_submit
//!          Form decodes t:formdata and replays every entry, in order, on
//!          the component the complete id names
//!          deferred callbacks run once the whole log has been replayed
//! ```
//!
//! Replaying the same sequence the render produced is what lets a field
//! inside a loop see the right row: the loop's `SetupIteration` entries are
//! interleaved with the field's own entries.

pub mod client_data;
pub mod validation;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::{ActionContext, Component, EventScope};
use crate::ids::IdAllocator;
use crate::page::Page;
use crate::render::Environment;
use crate::request::RequestGlobals;

pub use client_data::{ClientDataEncoder, ClientDataError};
pub use validation::{TrackerHandle, ValidationTracker, Validator};

/// Hidden field carrying the encoded action log
pub const FORM_DATA_PARAMETER: &str = "t:formdata";
/// Hidden field naming the form component that rendered the form
pub const FORM_ID_PARAMETER: &str = "t:formid";
/// Present when the form was submitted through a cancel button
pub const CANCEL_PARAMETER: &str = "t:cancel";

/// Callback run after the stored actions of a submission have replayed
pub type DeferredAction = Box<dyn FnOnce(&mut ActionContext<'_>) -> anyhow::Result<()>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// Component has no way to replay the action it was given
    UnsupportedAction { complete_id: String, action: String },
    /// The action log names a component the page no longer has
    UnknownComponent { complete_id: String },
    NotSerializable { complete_id: String, reason: String },
    /// Submission without the hidden action log field
    MissingFormData { form: String },
    ClientData(ClientDataError),
    InvalidValidator { definition: String, reason: String },
    /// Two components asked for different form encodings
    EncodingConflict { existing: String, requested: String },
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedAction {
                complete_id,
                action,
            } => write!(f, "Component {} cannot replay form action '{}'", complete_id, action),
            Self::UnknownComponent { complete_id } => write!(
                f,
                "Form data names component {} which does not exist; the page structure changed between render and submit",
                complete_id
            ),
            Self::NotSerializable {
                complete_id,
                reason,
            } => write!(
                f,
                "Form action stored by {} could not be serialized: {}",
                complete_id, reason
            ),
            Self::MissingFormData { form } => write!(
                f,
                "Submission of form {} is missing the {} field",
                form, FORM_DATA_PARAMETER
            ),
            Self::ClientData(e) => write!(f, "{}", e),
            Self::InvalidValidator { definition, reason } => {
                write!(f, "Invalid validator '{}': {}", definition, reason)
            }
            Self::EncodingConflict {
                existing,
                requested,
            } => write!(
                f,
                "Form encoding is already {}; a component requested {}",
                existing, requested
            ),
        }
    }
}

impl std::error::Error for FormError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ClientData(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClientDataError> for FormError {
    fn from(e: ClientDataError) -> Self {
        Self::ClientData(e)
    }
}

/// One replayable step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormAction {
    /// Read the named request parameter and apply it
    ProcessSubmission { control_name: String },
    /// Put back state the component had at render time
    RestoreState { value: Value },
    /// Select one row of a loop
    SetupIteration { index: usize, value: Value },
    Custom { name: String, payload: Value },
}

impl FormAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProcessSubmission { .. } => "process_submission",
            Self::RestoreState { .. } => "restore_state",
            Self::SetupIteration { .. } => "setup_iteration",
            Self::Custom { .. } => "custom",
        }
    }
}

/// An action together with the component that stored it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAction {
    pub complete_id: String,
    /// Replayed only on cancel submissions
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancel: bool,
    pub action: FormAction,
}

/// What components inside a form talk to
pub trait FormSupport {
    /// Record an action to replay on submit
    fn store(&self, complete_id: &str, action: FormAction) -> Result<(), FormError>;

    /// Record an action replayed only when the form is cancelled
    fn store_cancel(&self, complete_id: &str, action: FormAction) -> Result<(), FormError>;

    /// Record an action and apply it to `component` right away, so the
    /// render sees the same state the submission will
    fn store_and_execute(
        &self,
        component: &mut dyn Component,
        complete_id: &str,
        action: FormAction,
        scope: &mut EventScope<'_>,
    ) -> anyhow::Result<()> {
        self.store(complete_id, action.clone())?;
        component.execute_action(&action, scope)
    }

    /// Run `action` once every stored action has been replayed
    fn defer(&self, action: DeferredAction);

    /// Run deferred actions in the order they were deferred
    fn execute_deferred(&self, cx: &mut ActionContext<'_>) -> anyhow::Result<()>;

    /// Unique request parameter name for a control, derived from its id
    fn allocate_control_name(&self, id: &str) -> String;

    /// Client-side id of the form element
    fn client_id(&self) -> &str;

    /// Complete id of the form component
    fn form_component_id(&self) -> &str;

    fn is_client_validation_enabled(&self) -> bool;

    /// Require an encoding type such as `multipart/form-data`
    fn set_encoding_type(&self, encoding_type: &str) -> Result<(), FormError>;

    fn encoding_type(&self) -> Option<String>;

    /// Whether the form is being submitted rather than rendered
    fn is_submission(&self) -> bool;

    /// Serialized entries recorded so far
    fn recorded_actions(&self) -> Vec<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Render,
    Submit,
}

/// The form's own `FormSupport`
pub struct FormSupportImpl {
    mode: Mode,
    client_id: String,
    form_component_id: String,
    client_validation: bool,
    /// Entries serialized as they are stored, so later mutation of the
    /// component cannot change what was recorded
    log: RefCell<Vec<Value>>,
    deferred: RefCell<VecDeque<DeferredAction>>,
    control_names: RefCell<IdAllocator>,
    encoding_type: RefCell<Option<String>>,
}

impl fmt::Debug for FormSupportImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormSupportImpl")
            .field("mode", &self.mode)
            .field("client_id", &self.client_id)
            .field("form_component_id", &self.form_component_id)
            .field("recorded", &self.log.borrow().len())
            .field("deferred", &self.deferred.borrow().len())
            .finish()
    }
}

impl FormSupportImpl {
    fn new(mode: Mode, client_id: &str, form_component_id: &str, client_validation: bool, reserved: &[&str]) -> Self {
        let mut control_names = IdAllocator::new();
        for name in reserved {
            control_names.reserve(name);
        }
        Self {
            mode,
            client_id: client_id.to_string(),
            form_component_id: form_component_id.to_string(),
            client_validation,
            log: RefCell::new(Vec::new()),
            deferred: RefCell::new(VecDeque::new()),
            control_names: RefCell::new(control_names),
            encoding_type: RefCell::new(None),
        }
    }

    /// Support for a form render; `reserved` are names of the form's own
    /// hidden fields
    pub fn for_render(client_id: &str, form_component_id: &str, client_validation: bool, reserved: &[&str]) -> Self {
        Self::new(Mode::Render, client_id, form_component_id, client_validation, reserved)
    }

    /// Support for a submission; nothing is recorded
    pub fn for_submit(client_id: &str, form_component_id: &str, client_validation: bool) -> Self {
        Self::new(Mode::Submit, client_id, form_component_id, client_validation, &[])
    }

    fn record(&self, complete_id: &str, cancel: bool, action: FormAction) -> Result<(), FormError> {
        if self.mode == Mode::Submit {
            tracing::trace!(component = complete_id, action = action.kind(), "Ignoring store during submit");
            return Ok(());
        }

        let entry = StoredAction {
            complete_id: complete_id.to_string(),
            cancel,
            action,
        };
        let value = serde_json::to_value(&entry).map_err(|e| FormError::NotSerializable {
            complete_id: complete_id.to_string(),
            reason: e.to_string(),
        })?;
        self.log.borrow_mut().push(value);
        Ok(())
    }
}

impl FormSupport for FormSupportImpl {
    fn store(&self, complete_id: &str, action: FormAction) -> Result<(), FormError> {
        self.record(complete_id, false, action)
    }

    fn store_cancel(&self, complete_id: &str, action: FormAction) -> Result<(), FormError> {
        self.record(complete_id, true, action)
    }

    fn defer(&self, action: DeferredAction) {
        self.deferred.borrow_mut().push_back(action);
    }

    fn execute_deferred(&self, cx: &mut ActionContext<'_>) -> anyhow::Result<()> {
        loop {
            // Deferred actions may defer further actions
            let next = self.deferred.borrow_mut().pop_front();
            match next {
                Some(action) => action(cx)?,
                None => return Ok(()),
            }
        }
    }

    fn allocate_control_name(&self, id: &str) -> String {
        self.control_names.borrow_mut().allocate(id)
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn form_component_id(&self) -> &str {
        &self.form_component_id
    }

    fn is_client_validation_enabled(&self) -> bool {
        self.client_validation
    }

    fn set_encoding_type(&self, encoding_type: &str) -> Result<(), FormError> {
        let mut current = self.encoding_type.borrow_mut();
        match current.as_deref() {
            Some(existing) if existing != encoding_type => Err(FormError::EncodingConflict {
                existing: existing.to_string(),
                requested: encoding_type.to_string(),
            }),
            _ => {
                *current = Some(encoding_type.to_string());
                Ok(())
            }
        }
    }

    fn encoding_type(&self) -> Option<String> {
        self.encoding_type.borrow().clone()
    }

    fn is_submission(&self) -> bool {
        self.mode == Mode::Submit
    }

    fn recorded_actions(&self) -> Vec<Value> {
        self.log.borrow().clone()
    }
}

/// Support pushed by a form fragment: actions go to a local log the
/// fragment writes into its own hidden field, everything else is the
/// enclosing form's
pub struct FragmentFormSupport {
    outer: Rc<dyn FormSupport>,
    log: RefCell<Vec<Value>>,
}

impl FragmentFormSupport {
    pub fn new(outer: Rc<dyn FormSupport>) -> Self {
        Self {
            outer,
            log: RefCell::new(Vec::new()),
        }
    }
}

impl FormSupport for FragmentFormSupport {
    fn store(&self, complete_id: &str, action: FormAction) -> Result<(), FormError> {
        if self.outer.is_submission() {
            return Ok(());
        }
        let entry = StoredAction {
            complete_id: complete_id.to_string(),
            cancel: false,
            action,
        };
        let value = serde_json::to_value(&entry).map_err(|e| FormError::NotSerializable {
            complete_id: complete_id.to_string(),
            reason: e.to_string(),
        })?;
        self.log.borrow_mut().push(value);
        Ok(())
    }

    fn store_cancel(&self, complete_id: &str, action: FormAction) -> Result<(), FormError> {
        self.outer.store_cancel(complete_id, action)
    }

    fn defer(&self, action: DeferredAction) {
        self.outer.defer(action);
    }

    fn execute_deferred(&self, cx: &mut ActionContext<'_>) -> anyhow::Result<()> {
        self.outer.execute_deferred(cx)
    }

    fn allocate_control_name(&self, id: &str) -> String {
        self.outer.allocate_control_name(id)
    }

    fn client_id(&self) -> &str {
        self.outer.client_id()
    }

    fn form_component_id(&self) -> &str {
        self.outer.form_component_id()
    }

    fn is_client_validation_enabled(&self) -> bool {
        self.outer.is_client_validation_enabled()
    }

    fn set_encoding_type(&self, encoding_type: &str) -> Result<(), FormError> {
        self.outer.set_encoding_type(encoding_type)
    }

    fn encoding_type(&self) -> Option<String> {
        self.outer.encoding_type()
    }

    fn is_submission(&self) -> bool {
        self.outer.is_submission()
    }

    fn recorded_actions(&self) -> Vec<Value> {
        self.log.borrow().clone()
    }
}

/// Decode an action log sent back by the client
pub fn decode_actions(encoder: &ClientDataEncoder, data: &str) -> Result<Vec<StoredAction>, FormError> {
    Ok(encoder.decode(data)?)
}

/// Replay stored actions on the components they name
///
/// A cancel submission replays only the cancel entries, any other
/// submission only the regular ones. Returns how many entries ran.
pub fn replay(
    entries: &[StoredAction],
    cancel: bool,
    page: &mut Page,
    environment: &mut Environment,
    request: &RequestGlobals,
) -> anyhow::Result<usize> {
    let mut executed = 0;
    for entry in entries.iter().filter(|e| e.cancel == cancel) {
        let element = page
            .find_by_complete_id(&entry.complete_id)
            .ok_or_else(|| FormError::UnknownComponent {
                complete_id: entry.complete_id.clone(),
            })?;
        tracing::trace!(component = %entry.complete_id, action = entry.action.kind(), "Replaying form action");
        page.execute_action(element, &entry.action, environment, request)?;
        executed += 1;
    }
    Ok(executed)
}
