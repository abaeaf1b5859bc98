//! Shape predicates used at the store boundary.

use crate::update::Update;
use crate::value::Value;

/// True iff `value` is a plain keyed record.
///
/// Null, scalars, lists and opaque host objects are all rejected; only
/// [`Value::Record`] qualifies.
#[must_use]
pub const fn is_plain_record(value: &Value) -> bool {
    value.is_record()
}

/// True iff the update must be invoked to produce its patch.
#[must_use]
pub const fn is_callable(update: &Update) -> bool {
    matches!(update, Update::With(_))
}
