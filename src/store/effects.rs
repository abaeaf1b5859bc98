//! Named effects bound to a store.
//!
//! An effect is a function registered at build time and later invoked by
//! name with the store and a list of arguments. Effects usually read the
//! current state and call `set_state`.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::StoreResult;
use crate::store::Store;
use crate::value::Value;

/// An effect body.
pub type Effect = Rc<dyn Fn(&Store, &[Value]) -> StoreResult<Value>>;

#[derive(Clone, Default)]
pub(crate) struct Effects {
    table: HashMap<String, Effect>,
}

impl Effects {
    pub fn register<F>(&mut self, name: String, effect: F)
    where
        F: Fn(&Store, &[Value]) -> StoreResult<Value> + 'static,
    {
        self.table.insert(name, Rc::new(effect));
    }

    pub fn get(&self, name: &str) -> Option<Effect> {
        self.table.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Effects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
