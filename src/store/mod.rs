//! The observable store.
//!
//! A [`Store`] owns one [`Record`] of state and a registry of per-key
//! listeners. All mutation goes through [`Store::set_state`], which runs the
//! following protocol:
//!
//! 1. Resolve the request: a patch is used as is, a producer is called with
//!    the current snapshot.
//! 2. Run the before-update hooks (instance, then context). Each may replace
//!    the pending patch.
//! 3. Reject the patch unless it is a plain record. Nothing is applied.
//! 4. Diff: a key changed if its new value is not strictly equal to the
//!    current one, or if it is new.
//! 5. If anything changed, swap in a new state record (earlier snapshots stay
//!    untouched) and notify listeners of the changed keys in one batch.
//! 6. Run the after-update hooks with the changed keys only. They run even
//!    when nothing changed.
//!
//! # Invariants
//!
//! 1. When `set_state` returns, every listener registered for a changed key
//!    when dispatch began has been invoked exactly once for that update.
//! 2. The generation advances exactly once per update that changed a key,
//!    and never for an update that changed nothing.
//! 3. A snapshot returned by [`Store::current_state`] never changes.
//! 4. Hooks never nest: an update started from inside a hook is applied and
//!    dispatched without running hooks.
//!
//! # Threading
//!
//! Stores are `Rc`-based and stay on the thread that created them. Listeners
//! and hooks run synchronously on that thread, inside the caller's
//! `set_state`.

/// Batch scopes for dispatch.
pub mod batch;
/// Update hooks.
pub mod delegate;
pub(crate) mod dispatcher;
/// Named effects.
pub mod effects;
/// Listener registry.
pub mod registry;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::context::StoreContext;
use crate::error::{StoreError, StoreResult};
use crate::record::Record;
use crate::update::Update;
use crate::validation::is_callable;
use crate::value::Value;

use self::delegate::Delegate;
use self::effects::Effects;
use self::registry::{Listener, Registry};

/// Largest generation before the counter wraps to zero (`2^53 - 1`).
pub const DEFAULT_GENERATION_LIMIT: u64 = (1 << 53) - 1;

/// Smallest usable generation limit; smaller configured values are clamped.
pub const MIN_GENERATION_LIMIT: u64 = 2;

/// Unique identifier for a store, used to correlate log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(Uuid);

impl StoreId {
    /// Create a new random store id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Optional label included in log events.
    pub name: Option<String>,
    /// The generation counter wraps to zero on reaching this value.
    /// Values below [`MIN_GENERATION_LIMIT`] are raised to it.
    pub generation_limit: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: None,
            generation_limit: DEFAULT_GENERATION_LIMIT,
        }
    }
}

struct StoreInner {
    id: StoreId,
    config: StoreConfig,
    context: StoreContext,
    state: RefCell<Rc<Record>>,
    registry: RefCell<Registry>,
    generation: Cell<u64>,
    delegate: RefCell<Delegate>,
    in_delegate: Cell<bool>,
    effects: Effects,
}

/// A key-granular observable store.
///
/// Cloning a `Store` creates a new handle to the **same** store.
///
/// # Example
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use rekv::{record, Listener, Store, Value};
///
/// let store = Store::new(record! { "count" => 0 }).unwrap();
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&seen);
/// let listener = Listener::new(move |v| sink.borrow_mut().push(v.clone()));
/// store.subscribe("count", &listener);
///
/// store.update(|s| {
///     let count = s.get("count").and_then(Value::as_int).unwrap_or(0);
///     record! { "count" => count + 1 }
/// }).unwrap();
///
/// assert_eq!(*seen.borrow(), vec![Value::Int(1)]);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

/// A non-owning handle to a [`Store`].
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    /// The store, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl fmt::Debug for WeakStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStore")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Store {
    /// Creates a store attached to the thread's global context.
    ///
    /// Fails with [`StoreError::InvalidInit`] unless `initial` is a record.
    pub fn new(initial: impl Into<Value>) -> StoreResult<Self> {
        Self::builder(initial).build()
    }

    /// Creates a store from a JSON object.
    pub fn from_json(initial: serde_json::Value) -> StoreResult<Self> {
        Self::new(Value::from(initial))
    }

    /// Starts building a store with non-default configuration.
    pub fn builder(initial: impl Into<Value>) -> StoreBuilder {
        StoreBuilder::new(initial.into())
    }

    fn from_parts(
        state: Rc<Record>,
        config: StoreConfig,
        context: StoreContext,
        delegate: Delegate,
        effects: Effects,
    ) -> Self {
        let store = Self {
            inner: Rc::new(StoreInner {
                id: StoreId::new(),
                config,
                context,
                state: RefCell::new(state),
                registry: RefCell::new(Registry::default()),
                generation: Cell::new(0),
                delegate: RefCell::new(delegate),
                in_delegate: Cell::new(false),
                effects,
            }),
        };
        debug!(
            store_id = %store.id(),
            name = store.name().unwrap_or(""),
            keys = store.inner.state.borrow().len(),
            "store created"
        );
        store
    }

    /// Unique id of this store.
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    /// Label from [`StoreConfig::name`].
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.config.name.as_deref()
    }

    /// The context this store shares hooks and batching with.
    #[must_use]
    pub fn context(&self) -> &StoreContext {
        &self.inner.context
    }

    /// Non-owning handle, for listeners that need to reach the store.
    #[must_use]
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// True if both handles refer to the same store.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Snapshot of the whole state.
    ///
    /// The snapshot is shared, not copied, and later updates never modify
    /// it; they install a new record instead.
    #[must_use]
    pub fn current_state(&self) -> Rc<Record> {
        Rc::clone(&self.inner.state.borrow())
    }

    /// Current value of one key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.borrow().get(key).cloned()
    }

    /// Registers `listener` for changes to `key`. Registering twice is a no-op.
    pub fn subscribe(&self, key: &str, listener: &Listener) {
        let added = self.inner.registry.borrow_mut().subscribe(key, listener);
        trace!(store_id = %self.id(), key, added, "subscribe");
    }

    /// Unregisters `listener` from `key`. Unknown listeners are ignored.
    pub fn unsubscribe(&self, key: &str, listener: &Listener) {
        let removed = self.inner.registry.borrow_mut().unsubscribe(key, listener);
        trace!(store_id = %self.id(), key, removed, "unsubscribe");
    }

    /// Number of listeners registered for `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.registry.borrow().subscriber_count(key)
    }

    /// True if `listener` is registered for `key`.
    #[must_use]
    pub fn is_subscribed(&self, key: &str, listener: &Listener) -> bool {
        self.inner.registry.borrow().is_subscribed(key, listener)
    }

    /// Replaces this store's own delegate.
    pub fn set_delegate(&self, delegate: Delegate) {
        *self.inner.delegate.borrow_mut() = delegate;
    }

    /// Removes this store's own hooks. Context hooks are unaffected.
    pub fn clear_delegate(&self) {
        self.set_delegate(Delegate::default());
    }

    /// Applies an update. See the [module docs](self) for the protocol.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidUpdate`] if the patch, after before-hooks ran,
    ///   is not a record. State and listeners are untouched.
    /// - Any error returned by a hook, unchanged.
    pub fn set_state(&self, update: impl Into<Update>) -> StoreResult<()> {
        let update = update.into();
        trace!(store_id = %self.id(), producer = is_callable(&update), "set_state");
        let candidate = update.resolve(&self.current_state());

        let pending = delegate::run_before(self, candidate)?;
        let pending = pending.into_record().map_err(|rejected| {
            debug!(store_id = %self.id(), found = rejected.type_name(), "update rejected");
            StoreError::InvalidUpdate {
                found: rejected.type_name(),
            }
        })?;

        let changed = self.apply(&pending);
        delegate::run_after(self, &changed)
    }

    /// Applies the patch returned by `f`, called with the current state.
    pub fn update<F, R>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&Record) -> R + 'static,
        R: Into<Value>,
    {
        self.set_state(Update::with(f))
    }

    /// Notifies the listeners of `keys` with their current values without
    /// touching the state. Keys without listeners are skipped.
    pub fn force_update<K: AsRef<str>>(&self, keys: &[K]) {
        if !self.inner.registry.borrow().has_subscribers(keys) {
            return;
        }
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        let generation = self.next_generation();
        let invoked = self.dispatch(&keys, generation);
        debug!(store_id = %self.id(), keys = keys.len(), invoked, generation, "forced update");
    }

    /// Runs a named effect registered at build time.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownEffect`] if no effect has that name; otherwise
    /// whatever the effect returns.
    pub fn run_effect(&self, name: &str, args: &[Value]) -> StoreResult<Value> {
        let effect = self
            .inner
            .effects
            .get(name)
            .ok_or_else(|| StoreError::UnknownEffect {
                name: name.to_string(),
            })?;
        trace!(store_id = %self.id(), effect = name, args = args.len(), "running effect");
        effect(self, args)
    }

    /// Names of the registered effects, sorted.
    #[must_use]
    pub fn effect_names(&self) -> Vec<&str> {
        self.inner.effects.names()
    }

    pub(crate) fn hook_flag(&self) -> &Cell<bool> {
        &self.inner.in_delegate
    }

    pub(crate) fn instance_delegate(&self) -> Delegate {
        self.inner.delegate.borrow().clone()
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.inner.generation.get()
    }

    /// Writes the changed entries of `pending` and dispatches them.
    /// Returns the applied delta.
    fn apply(&self, pending: &Record) -> Record {
        let changed: Record = {
            let state = self.inner.state.borrow();
            pending
                .iter()
                .filter(|&(key, value)| state.get(key).map_or(true, |current| !current.strict_eq(value)))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        };
        if changed.is_empty() {
            trace!(store_id = %self.id(), requested = pending.len(), "no keys changed");
            return changed;
        }

        let next = self.inner.state.borrow().merged(&changed);
        *self.inner.state.borrow_mut() = Rc::new(next);

        let keys: Vec<String> = changed.keys().cloned().collect();
        let generation = self.next_generation();
        let invoked = self.dispatch(&keys, generation);
        debug!(
            store_id = %self.id(),
            changed = keys.len(),
            invoked,
            generation,
            "state updated"
        );
        changed
    }

    fn dispatch(&self, keys: &[String], generation: u64) -> usize {
        let batching = self.inner.context.batching();
        let lookup = |key: &str| self.get(key).unwrap_or_default();
        dispatcher::dispatch(&*batching, &self.inner.registry, keys, &lookup, generation)
    }

    /// Advances the generation, wrapping at the configured limit.
    ///
    /// On wrap every listener tag is cleared, so a tag left over from the
    /// previous cycle can never match a reused generation.
    fn next_generation(&self) -> u64 {
        let limit = self.inner.config.generation_limit.max(MIN_GENERATION_LIMIT);
        let next = self.inner.generation.get().saturating_add(1);
        let next = if next >= limit {
            self.inner.registry.borrow_mut().clear_stamps();
            trace!(store_id = %self.id(), limit, "generation wrapped");
            0
        } else {
            next
        };
        self.inner.generation.set(next);
        next
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("state", &*self.inner.state.borrow())
            .field("generation", &self.inner.generation.get())
            .field("effects", &self.inner.effects)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Store`].
///
/// # Example
/// ```rust
/// use rekv::{record, Store, StoreConfig, StoreContext, Value};
///
/// let store = Store::builder(record! { "foo" => "bar" })
///     .config(StoreConfig { name: Some("settings".into()), ..StoreConfig::default() })
///     .context(StoreContext::new())
///     .effect("append", |store, args| {
///         let suffix = args.first().and_then(Value::as_str).unwrap_or("+");
///         let foo = store.get("foo").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
///         store.set_state(record! { "foo" => format!("{foo}{suffix}") })?;
///         Ok(Value::Null)
///     })
///     .build()
///     .unwrap();
///
/// store.run_effect("append", &[]).unwrap();
/// assert_eq!(store.get("foo"), Some(Value::from("bar+")));
/// ```
#[must_use]
pub struct StoreBuilder {
    initial: Value,
    config: StoreConfig,
    context: Option<StoreContext>,
    delegate: Delegate,
    effects: Effects,
}

impl StoreBuilder {
    fn new(initial: Value) -> Self {
        Self {
            initial,
            config: StoreConfig::default(),
            context: None,
            delegate: Delegate::default(),
            effects: Effects::default(),
        }
    }

    /// Set the store configuration (default: [`StoreConfig::default`]).
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach to `context` instead of the thread's global context.
    pub fn context(mut self, context: StoreContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the instance-level delegate.
    pub fn delegate(mut self, delegate: Delegate) -> Self {
        self.delegate = delegate;
        self
    }

    /// Register a named effect. A later registration under the same name wins.
    pub fn effect<F>(mut self, name: impl Into<String>, effect: F) -> Self
    where
        F: Fn(&Store, &[Value]) -> StoreResult<Value> + 'static,
    {
        self.effects.register(name.into(), effect);
        self
    }

    /// Build the store.
    ///
    /// Returns [`StoreError::InvalidInit`] if the initial state is not a record.
    pub fn build(self) -> StoreResult<Store> {
        let state = self
            .initial
            .into_record()
            .map_err(|rejected| StoreError::InvalidInit {
                found: rejected.type_name(),
            })?;
        let context = self.context.unwrap_or_else(StoreContext::global);
        Ok(Store::from_parts(
            state,
            self.config,
            context,
            self.delegate,
            self.effects,
        ))
    }
}

impl fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("initial", &self.initial)
            .field("config", &self.config)
            .field("delegate", &self.delegate)
            .field("effects", &self.effects)
            .finish_non_exhaustive()
    }
}

thread_local! {
    static DEFAULT_STORE: Store = Store::from_parts(
        Rc::new(Record::new()),
        StoreConfig {
            name: Some("default".to_string()),
            ..StoreConfig::default()
        },
        StoreContext::global(),
        Delegate::default(),
        Effects::default(),
    );
}

/// The thread's shared default store, created empty on first use.
#[must_use]
pub fn default_store() -> Store {
    DEFAULT_STORE.with(Clone::clone)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn isolated(initial: Record) -> Store {
        Store::builder(initial)
            .context(StoreContext::new())
            .build()
            .unwrap()
    }

    fn recorder() -> (Listener, Rc<RefCell<Vec<Value>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (Listener::new(move |v| sink.borrow_mut().push(v.clone())), seen)
    }

    #[test]
    fn test_generation_unchanged_when_nothing_changes() {
        let store = isolated(record! { "a" => 1 });
        let (listener, seen) = recorder();
        store.subscribe("a", &listener);

        store.set_state(record! { "a" => 1 }).unwrap();
        assert_eq!(store.generation(), 0);
        assert!(seen.borrow().is_empty());

        store.set_state(record! { "a" => 2 }).unwrap();
        assert_eq!(store.generation(), 1);
        assert_eq!(*seen.borrow(), vec![Value::Int(2)]);
    }

    #[test]
    fn test_generation_advances_without_subscribers() {
        let store = isolated(Record::new());
        store.set_state(record! { "x" => true }).unwrap();
        store.set_state(record! { "x" => false }).unwrap();
        assert_eq!(store.generation(), 2);
    }

    fn with_limit(generation_limit: u64) -> Store {
        Store::builder(Record::new())
            .context(StoreContext::new())
            .config(StoreConfig {
                generation_limit,
                ..StoreConfig::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_generation_wraps_at_limit() {
        let store = with_limit(3);
        let (listener, seen) = recorder();
        store.subscribe("n", &listener);
        for n in 1..=5 {
            store.set_state(record! { "n" => n }).unwrap();
        }
        // 1, 2, wrap to 0, 1, 2
        assert_eq!(store.generation(), 2);
        assert_eq!(seen.borrow().len(), 5);
    }

    #[test]
    fn test_idle_listener_notified_after_wrap() {
        let store = with_limit(3);
        let (on_a, seen_a) = recorder();
        let (on_b, seen_b) = recorder();
        store.subscribe("a", &on_a);
        store.subscribe("b", &on_b);

        // a gets generation 1, b runs 2 and 0, then a lands on 1 again.
        store.set_state(record! { "a" => 1 }).unwrap();
        store.set_state(record! { "b" => 1 }).unwrap();
        store.set_state(record! { "b" => 2 }).unwrap();
        store.set_state(record! { "a" => 2 }).unwrap();

        assert_eq!(store.generation(), 1);
        assert_eq!(*seen_a.borrow(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(*seen_b.borrow(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_tiny_generation_limit_is_clamped() {
        for limit in [0, 1] {
            let store = with_limit(limit);
            let (listener, seen) = recorder();
            store.subscribe("a", &listener);
            for n in 1..=3 {
                store.set_state(record! { "a" => n }).unwrap();
            }
            assert_eq!(*seen.borrow(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
            assert!(store.generation() < MIN_GENERATION_LIMIT);
        }
    }

    #[test]
    fn test_multi_key_dedup_survives_wrap() {
        let store = with_limit(2);
        let (listener, seen) = recorder();
        store.subscribe("a", &listener);
        store.subscribe("b", &listener);
        for n in 1..=4 {
            store.set_state(record! { "a" => n, "b" => n }).unwrap();
        }
        assert_eq!(seen.borrow().len(), 4);
    }

    #[test]
    fn test_force_update_notifies_current_values() {
        let store = isolated(record! { "a" => 1, "b" => 2 });
        let (listener, seen) = recorder();
        store.subscribe("b", &listener);

        store.force_update(&["a", "b"]);
        assert_eq!(*seen.borrow(), vec![Value::Int(2)]);
        assert_eq!(store.generation(), 1);
        assert_eq!(store.get("b"), Some(Value::Int(2)));
    }

    #[test]
    fn test_force_update_without_listeners_is_noop() {
        let store = isolated(record! { "a" => 1 });
        store.force_update(&["a"]);
        store.force_update::<&str>(&[]);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_new_key_with_null_counts_as_change() {
        let store = isolated(Record::new());
        let (listener, seen) = recorder();
        store.subscribe("k", &listener);
        store.set_state(record! { "k" => Value::Null }).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::Null]);
        assert!(store.current_state().contains_key("k"));
    }

    #[test]
    fn test_default_store_is_shared() {
        let a = default_store();
        let b = default_store();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.name(), Some("default"));
    }

    #[test]
    fn test_weak_store_upgrade() {
        let store = isolated(Record::new());
        let weak = store.downgrade();
        assert!(weak.upgrade().is_some_and(|s| s.ptr_eq(&store)));
        drop(store);
        assert!(weak.upgrade().is_none());
    }
}
