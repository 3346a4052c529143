//! Action payload tagging.

use serde_json::Value as JsonValue;

use crate::knowledge::Action;

/// Field added to actions returned as a direct answer to a query.
pub const AUTO_TRIGGER_FIELD: &str = "autoTrigger";

/// Return a copy of `action` tagged with `autoTrigger: true`.
///
/// The cached action is only borrowed; the returned map shares no storage
/// with it.
pub fn augment(action: Option<&Action>) -> Option<Action> {
    let mut tagged = action?.clone();
    tagged.insert(AUTO_TRIGGER_FIELD.to_string(), JsonValue::Bool(true));
    Some(tagged)
}
