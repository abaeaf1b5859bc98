//! Per-key subscriber lists and the generation side table.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// A subscriber callback with reference identity.
///
/// Clones share identity: subscribing a clone is the same as subscribing the
/// original, and either one can be used to unsubscribe.
#[derive(Clone)]
pub struct Listener {
    callback: Rc<dyn Fn(&Value)>,
}

impl Listener {
    /// Wraps `callback`. Each call creates a distinct listener.
    pub fn new(callback: impl Fn(&Value) + 'static) -> Self {
        Self {
            callback: Rc::new(callback),
        }
    }

    /// Identity of the underlying allocation.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        ListenerId(Rc::as_ptr(&self.callback).cast::<()>() as usize)
    }

    /// True if both handles are the same listener.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    pub(crate) fn call(&self, value: &Value) {
        (self.callback)(value);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener").field(&self.id()).finish()
    }
}

/// Opaque identity of a [`Listener`].
///
/// Only meaningful while the listener is alive; the registry keeps a strong
/// reference to every listener it tracks, so ids it holds are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

/// Side-table entry for one listener.
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    /// Number of keys the listener is registered under.
    keys: usize,
    /// Last generation the listener was invoked for.
    notified: Option<u64>,
}

/// Key → ordered listeners, plus the dedup side table.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    by_key: HashMap<String, Vec<Listener>>,
    slots: HashMap<ListenerId, Slot>,
}

impl Registry {
    /// Appends `listener` under `key` unless it is already there.
    pub fn subscribe(&mut self, key: &str, listener: &Listener) -> bool {
        let list = self.by_key.entry(key.to_string()).or_default();
        if list.iter().any(|l| l.ptr_eq(listener)) {
            return false;
        }
        list.push(listener.clone());
        self.slots.entry(listener.id()).or_default().keys += 1;
        true
    }

    /// Removes `listener` from `key`. Remaining listeners keep their order.
    pub fn unsubscribe(&mut self, key: &str, listener: &Listener) -> bool {
        let Some(list) = self.by_key.get_mut(key) else {
            return false;
        };
        let Some(index) = list.iter().position(|l| l.ptr_eq(listener)) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            self.by_key.remove(key);
        }

        let id = listener.id();
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.keys = slot.keys.saturating_sub(1);
            if slot.keys == 0 {
                self.slots.remove(&id);
            }
        }
        true
    }

    /// Snapshot of the listeners for `key`, in subscription order.
    pub fn subscribers_for(&self, key: &str) -> Vec<Listener> {
        self.by_key.get(key).cloned().unwrap_or_default()
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.by_key.get(key).map_or(0, Vec::len)
    }

    pub fn is_subscribed(&self, key: &str, listener: &Listener) -> bool {
        self.by_key
            .get(key)
            .is_some_and(|list| list.iter().any(|l| l.ptr_eq(listener)))
    }

    pub fn has_subscribers<K: AsRef<str>>(&self, keys: &[K]) -> bool {
        keys.iter().any(|key| self.by_key.contains_key(key.as_ref()))
    }

    /// Marks `id` as notified for `generation`.
    ///
    /// Returns false if it already was, or if the listener has been
    /// unsubscribed from every key since the batch started.
    pub fn stamp(&mut self, id: ListenerId, generation: u64) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        if slot.notified == Some(generation) {
            return false;
        }
        slot.notified = Some(generation);
        true
    }

    /// Forgets every notification tag. Called when generations start over.
    pub fn clear_stamps(&mut self) {
        for slot in self.slots.values_mut() {
            slot.notified = None;
        }
    }

    #[cfg(test)]
    pub fn tracked_listeners(&self) -> usize {
        self.slots.len()
    }
}
