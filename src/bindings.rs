//! View adapters.
//!
//! Two ways for a host view to follow a store:
//!
//! - [`Store::watch`] for views with a scoped lifetime: the returned
//!   [`Watch`] registers on creation, hands the watched keys to a callback on
//!   every change, and unregisters when dropped.
//! - [`Store::attach`] for long-lived view objects that own a [`Lifecycle`]:
//!   the store registers a re-render callback and wraps the lifecycle's
//!   teardown hook so that teardown unregisters it before running the
//!   original hook.
//!
//! Both adapters hold the store weakly; a dropped store simply stops
//! notifying them.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::record::Record;
use crate::store::registry::Listener;
use crate::store::{Store, WeakStore};
use crate::value::Value;

/// A lifecycle-scoped subscription to a set of keys.
///
/// Created by [`Store::watch`]. Dropping it unsubscribes.
pub struct Watch {
    store: WeakStore,
    keys: Vec<String>,
    listener: Listener,
    value: Rc<RefCell<Rc<Record>>>,
}

impl Watch {
    /// The watched keys as of the last change (or of creation).
    #[must_use]
    pub fn value(&self) -> Rc<Record> {
        Rc::clone(&self.value.borrow())
    }

    /// Keys this handle follows.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            for key in &self.keys {
                store.unsubscribe(key, &self.listener);
            }
        }
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("keys", &self.keys)
            .field("value", &*self.value.borrow())
            .finish_non_exhaustive()
    }
}

/// Teardown slot of a long-lived view object.
///
/// The hook runs once, on [`teardown`](Self::teardown) or on drop, whichever
/// comes first.
#[derive(Default)]
pub struct Lifecycle {
    teardown: Option<Box<dyn FnOnce()>>,
}

impl Lifecycle {
    /// A lifecycle with no teardown hook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the teardown hook, replacing any previous one.
    pub fn on_teardown(&mut self, hook: impl FnOnce() + 'static) {
        self.teardown = Some(Box::new(hook));
    }

    /// True if a hook is set and has not run yet.
    #[must_use]
    pub fn has_teardown(&self) -> bool {
        self.teardown.is_some()
    }

    /// Runs the teardown hook, if it has not run yet.
    pub fn teardown(&mut self) {
        if let Some(hook) = self.teardown.take() {
            hook();
        }
    }

    /// Makes `first` run ahead of the current hook.
    fn wrap_teardown(&mut self, first: impl FnOnce() + 'static) {
        let original = self.teardown.take();
        self.teardown = Some(Box::new(move || {
            first();
            if let Some(original) = original {
                original();
            }
        }));
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("has_teardown", &self.has_teardown())
            .finish()
    }
}

/// Live read access to the keys a view was attached with.
#[derive(Debug, Clone)]
pub struct LiveView {
    store: WeakStore,
    keys: Vec<String>,
}

impl LiveView {
    /// Current value of `key`, or `None` if the key was not attached or the
    /// store is gone.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.keys.iter().any(|k| k == key) {
            return None;
        }
        self.store.upgrade()?.get(key)
    }

    /// Keys this handle follows.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

fn owned_keys<K: AsRef<str>>(keys: &[K]) -> Vec<String> {
    keys.iter().map(|k| k.as_ref().to_string()).collect()
}

impl Store {
    /// Follows `keys` until the returned [`Watch`] is dropped.
    ///
    /// On every batch that changes any of the keys, `on_change` is called
    /// once with a fresh record of just those keys.
    pub fn watch<K, F>(&self, keys: &[K], on_change: F) -> Watch
    where
        K: AsRef<str>,
        F: Fn(&Record) + 'static,
    {
        let keys = owned_keys(keys);
        let value = Rc::new(RefCell::new(Rc::new(self.current_state().pick(&keys))));

        let listener = {
            let store = self.downgrade();
            let keys = keys.clone();
            let value = Rc::clone(&value);
            Listener::new(move |_| {
                let Some(store) = store.upgrade() else {
                    return;
                };
                let picked = Rc::new(store.current_state().pick(&keys));
                *value.borrow_mut() = Rc::clone(&picked);
                on_change(&picked);
            })
        };
        for key in &keys {
            self.subscribe(key, &listener);
        }

        Watch {
            store: self.downgrade(),
            keys,
            listener,
            value,
        }
    }

    /// Registers `force_update` for `keys` and ties its removal to
    /// `lifecycle`'s teardown. The existing teardown hook still runs, after
    /// the unsubscription.
    pub fn attach<K, F>(&self, lifecycle: &mut Lifecycle, keys: &[K], force_update: F) -> LiveView
    where
        K: AsRef<str>,
        F: Fn() + 'static,
    {
        let keys = owned_keys(keys);
        let listener = Listener::new(move |_| force_update());
        for key in &keys {
            self.subscribe(key, &listener);
        }

        let store = self.downgrade();
        let registered = keys.clone();
        lifecycle.wrap_teardown(move || {
            if let Some(store) = store.upgrade() {
                for key in &registered {
                    store.unsubscribe(key, &listener);
                }
            }
        });

        LiveView {
            store: self.downgrade(),
            keys,
        }
    }
}
