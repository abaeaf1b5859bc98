//! # rekv - key-granular observable state
//!
//! rekv keeps application state in a single keyed record and lets views
//! subscribe to individual keys. An update touches only the keys whose values
//! actually changed, and each subscriber hears about an update at most once,
//! however many of its keys changed.
//!
//! ## Core Concepts
//!
//! - **Store**: owns the state record and the subscriber registry
//! - **Listener**: a callback registered under one or more keys
//! - **Delegate**: before/after hooks that can audit or rewrite updates,
//!   per store and per [`StoreContext`]
//! - **Batch strategy**: the scope a host integration wraps around each round
//!   of notifications
//!
//! ## Usage
//!
//! ```rust
//! use rekv::{record, Listener, Store, Value};
//!
//! let store = Store::new(record! { "count" => 0, "user" => "ada" }).unwrap();
//!
//! let listener = Listener::new(|v| println!("count is now {v}"));
//! store.subscribe("count", &listener);
//!
//! store.set_state(record! { "count" => 1 }).unwrap();
//! assert_eq!(store.get("count"), Some(Value::Int(1)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![forbid(unsafe_code)]

#[macro_use]
pub mod record;

pub mod bindings;
pub mod context;
pub mod error;
pub mod store;
pub mod update;
pub mod validation;
pub mod value;

// Re-export primary types at crate root for convenience
pub use bindings::{Lifecycle, LiveView, Watch};
pub use context::StoreContext;
pub use error::{StoreError, StoreResult};
pub use record::Record;
pub use store::batch::{BatchStrategy, Immediate, LoadedStrategy};
pub use store::delegate::{AfterUpdate, BeforeUpdate, Delegate};
pub use store::effects::Effect;
pub use store::registry::{Listener, ListenerId};
pub use store::{default_store, Store, StoreBuilder, StoreConfig, StoreId, WeakStore, DEFAULT_GENERATION_LIMIT, MIN_GENERATION_LIMIT};
pub use update::Update;
pub use value::Value;
