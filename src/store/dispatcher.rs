//! Notification dispatch.
//!
//! One dispatch delivers one batch: every listener registered under any of
//! the changed keys is invoked at most once, with the value of the first
//! changed key (in detection order) it is registered under. A listener that
//! watches both `a` and `b` sees only `a`'s value when both change together.

use std::cell::RefCell;

use tracing::trace;

use super::batch::BatchStrategy;
use super::registry::Registry;
use crate::value::Value;

/// Invokes the listeners for `keys` inside one batch scope.
///
/// `lookup` reads a key's current value at the moment its listener is
/// called. The registry is never borrowed while a listener runs, so
/// listeners may subscribe, unsubscribe or update the store.
///
/// Returns the number of listener invocations.
pub(crate) fn dispatch(
    batching: &dyn BatchStrategy,
    registry: &RefCell<Registry>,
    keys: &[String],
    lookup: &dyn Fn(&str) -> Value,
    generation: u64,
) -> usize {
    let mut invoked = 0usize;
    batching.run_batched(&mut || {
        for key in keys {
            let listeners = registry.borrow().subscribers_for(key);
            for listener in listeners {
                let fresh = registry.borrow_mut().stamp(listener.id(), generation);
                if !fresh {
                    continue;
                }
                let value = lookup(key);
                listener.call(&value);
                invoked += 1;
            }
        }
    });
    trace!(keys = keys.len(), invoked, generation, "dispatched batch");
    invoked
}
