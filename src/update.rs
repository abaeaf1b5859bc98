//! Update requests accepted by [`Store::set_state`](crate::Store::set_state).

use std::fmt;

use crate::record::Record;
use crate::value::Value;

type Producer = Box<dyn FnOnce(&Record) -> Value>;

/// A requested mutation: either a patch or a function of the current state.
///
/// The patch is carried as a [`Value`] rather than a [`Record`] so that
/// before-hooks get to see (and repair) a malformed request before the store
/// rejects it.
pub enum Update {
    /// Key/value pairs to write.
    Patch(Value),
    /// Called once with the current snapshot; returns the patch.
    With(Producer),
}

impl Update {
    /// Wraps a closure computing the patch from the current state.
    pub fn with<F, R>(f: F) -> Self
    where
        F: FnOnce(&Record) -> R + 'static,
        R: Into<Value>,
    {
        Self::With(Box::new(move |state| f(state).into()))
    }

    /// Turns the request into a candidate patch, calling the producer if any.
    pub(crate) fn resolve(self, current: &Record) -> Value {
        match self {
            Self::Patch(value) => value,
            Self::With(produce) => produce(current),
        }
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patch(value) => f.debug_tuple("Patch").field(value).finish(),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

impl From<Record> for Update {
    fn from(record: Record) -> Self {
        Self::Patch(Value::record(record))
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Self::Patch(value)
    }
}
