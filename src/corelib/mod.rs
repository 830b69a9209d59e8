//! Built-in components
//!
//! | Type          | Formal parameters                               |
//! |---------------|-------------------------------------------------|
//! | `Any`         | `element`                                       |
//! | `Output`      | `value`, `element`, `raw`                       |
//! | `Delegate`    | `to`                                            |
//! | `If`          | `test`, `negate`, `else`                        |
//! | `Loop`        | `source`, `value`, `index`, `formstate`, `empty`|
//! | `Form`        | `context`, `clientValidation`                   |
//! | `FormFragment`| `visible`, `element`                            |
//! | `TextField`   | `value`, `validate`, `label`, `type`, `disabled`|
//! | `Submit`      | `event`, `context`, `mode`, `value`, `defer`    |
//! | `Label`       | `for`                                           |
//! | `ActionLink`  | `context`, `anchor`                             |
//! | `EventLink`   | `event`, `context`, `anchor`                    |
//! | `PageLink`    | `page`, `context`, `anchor`                     |

mod basic;
mod control;
mod field;
mod form;
mod links;

pub use basic::{Any, Delegate, Output};
pub use control::{If, Loop};
pub use field::{Label, Submit, TextField};
pub use form::{Form, FormFragment};
pub use links::{ActionLink, EventLink, PageLink};

use crate::page::{ComponentDefinition, ComponentRegistry};

/// Register every built-in component type
pub fn register(registry: &mut ComponentRegistry) {
    registry.register(ComponentDefinition::new("Any", || Any));
    registry.register(ComponentDefinition::new("Output", || Output));
    registry.register(ComponentDefinition::new("Delegate", || Delegate));
    registry.register(ComponentDefinition::new("If", || If));
    registry.register(ComponentDefinition::new("Loop", Loop::default));
    registry.register(ComponentDefinition::new("Form", Form::default));
    registry.register(ComponentDefinition::new("FormFragment", FormFragment::default));
    registry.register(ComponentDefinition::new("TextField", TextField::default));
    registry.register(ComponentDefinition::new("Submit", || Submit));
    registry.register(ComponentDefinition::new("Label", || Label));
    registry.register(ComponentDefinition::new("ActionLink", || ActionLink));
    registry.register(ComponentDefinition::new("EventLink", || EventLink));
    registry.register(ComponentDefinition::new("PageLink", || PageLink));
}

/// `firstName` and `first_name` both read as `First Name`
pub(crate) fn default_label(id: &str) -> String {
    let mut label = String::with_capacity(id.len() + 4);
    let mut previous: Option<char> = None;
    for c in id.chars() {
        if c == '_' || c == '-' {
            if !label.ends_with(' ') && !label.is_empty() {
                label.push(' ');
            }
            previous = Some(' ');
            continue;
        }
        let word_start = match previous {
            None | Some(' ') => true,
            Some(p) => c.is_uppercase() && p.is_lowercase(),
        };
        if word_start {
            if previous.is_some_and(|p| p != ' ') {
                label.push(' ');
            }
            label.extend(c.to_uppercase());
        } else {
            label.push(c);
        }
        previous = Some(c);
    }
    label
}

#[cfg(test)]
mod tests;
