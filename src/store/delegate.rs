//! Before/after update hooks and the guarded chain that runs them.
//!
//! Hooks exist at two scopes: on the store instance and on the store's
//! [`StoreContext`](crate::StoreContext). For every `set_state` the instance
//! hook runs first, then the context hook. A hook may itself call
//! `set_state`; the nested update is applied and dispatched normally but
//! fires no hooks of its own.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::StoreResult;
use crate::record::Record;
use crate::store::Store;
use crate::value::Value;

/// Hook invoked with the pending update. Returning `Some` replaces it.
pub type BeforeUpdate = Rc<dyn Fn(&Store, &Value) -> StoreResult<Option<Value>>>;

/// Hook invoked with the keys that actually changed and their new values.
pub type AfterUpdate = Rc<dyn Fn(&Store, &Record) -> StoreResult<()>>;

/// An optional pair of update hooks.
///
/// # Example
/// ```rust
/// use rekv::{record, Delegate, Store, Value};
///
/// let store = Store::new(record! { "count" => 0 }).unwrap();
/// store.set_delegate(Delegate::new().before_update(|_store, pending| {
///     // Clamp negative counts before they reach the state.
///     let count = pending.as_record().and_then(|r| r.get("count")).and_then(Value::as_int);
///     Ok(count.filter(|c| *c < 0).map(|_| record! { "count" => 0 }.into()))
/// }));
///
/// store.set_state(record! { "count" => -4 }).unwrap();
/// assert_eq!(store.get("count"), Some(Value::Int(0)));
/// ```
#[derive(Clone, Default)]
pub struct Delegate {
    before_update: Option<BeforeUpdate>,
    after_update: Option<AfterUpdate>,
}

impl Delegate {
    /// Creates a delegate with no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the before-update hook.
    #[must_use]
    pub fn before_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Store, &Value) -> StoreResult<Option<Value>> + 'static,
    {
        self.before_update = Some(Rc::new(hook));
        self
    }

    /// Sets the after-update hook.
    #[must_use]
    pub fn after_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Store, &Record) -> StoreResult<()> + 'static,
    {
        self.after_update = Some(Rc::new(hook));
        self
    }

    /// True if neither hook is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.before_update.is_none() && self.after_update.is_none()
    }

    pub(crate) fn before_hook(&self) -> Option<BeforeUpdate> {
        self.before_update.clone()
    }

    pub(crate) fn after_hook(&self) -> Option<AfterUpdate> {
        self.after_update.clone()
    }
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate")
            .field("before_update", &self.before_update.is_some())
            .field("after_update", &self.after_update.is_some())
            .finish()
    }
}

/// Holds a store's re-entrancy flag for the duration of one hook round.
///
/// Released on drop, so an erroring or panicking hook never leaves the store
/// locked out of future hook rounds.
struct HookGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> HookGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            return None;
        }
        Some(Self { flag })
    }
}

impl Drop for HookGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Runs the before-hooks over `pending`, threading replacements through.
pub(crate) fn run_before(store: &Store, pending: Value) -> StoreResult<Value> {
    let Some(_guard) = HookGuard::acquire(store.hook_flag()) else {
        debug!(store_id = %store.id(), "nested update: before-update hooks suppressed");
        return Ok(pending);
    };

    let mut pending = pending;
    // Looked up one at a time: the instance hook may swap the context hook.
    if let Some(hook) = store.instance_delegate().before_hook() {
        if let Some(replacement) = hook(store, &pending)? {
            pending = replacement;
        }
    }
    if let Some(hook) = store.context().delegate().before_hook() {
        if let Some(replacement) = hook(store, &pending)? {
            pending = replacement;
        }
    }
    Ok(pending)
}

/// Runs the after-hooks with the applied delta.
pub(crate) fn run_after(store: &Store, applied: &Record) -> StoreResult<()> {
    let Some(_guard) = HookGuard::acquire(store.hook_flag()) else {
        debug!(store_id = %store.id(), "nested update: after-update hooks suppressed");
        return Ok(());
    };

    if let Some(hook) = store.instance_delegate().after_hook() {
        hook(store, applied)?;
    }
    if let Some(hook) = store.context().delegate().after_hook() {
        hook(store, applied)?;
    }
    Ok(())
}
