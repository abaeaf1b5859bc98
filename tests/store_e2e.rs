use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rekv::{record, Listener, Record, Store, StoreConfig, StoreContext, StoreError, Update, Value};

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

fn count_of(state: &Record) -> i64 {
    state.get("count").and_then(Value::as_int).unwrap_or(0)
}

#[test]
fn counter_increments_notify_in_order() {
    let store = isolated(record! { "count" => 0 });
    let (listener, seen) = recorder();
    store.subscribe("count", &listener);

    for _ in 0..10 {
        store.update(|s| record! { "count" => count_of(s) + 1 }).unwrap();
    }

    let expected: Vec<Value> = (1..=10).map(Value::Int).collect();
    assert_eq!(*seen.borrow(), expected);
    assert_eq!(store.current_state().get("count"), Some(&Value::Int(10)));
}

#[test]
fn subscribing_twice_notifies_once() {
    let store = isolated(record! { "a" => 0 });
    let (listener, seen) = recorder();
    store.subscribe("a", &listener);
    store.subscribe("a", &listener);
    store.subscribe("a", &listener.clone());

    store.set_state(record! { "a" => 1 }).unwrap();
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn unsubscribing_unknown_listener_is_harmless() {
    let store = isolated(record! { "a" => 0 });
    let (kept, seen) = recorder();
    let (stranger, _) = recorder();
    store.subscribe("a", &kept);

    store.unsubscribe("a", &stranger);
    store.unsubscribe("never-subscribed", &stranger);
    store.unsubscribe("a", &kept);
    store.unsubscribe("a", &kept);
    store.subscribe("a", &kept);

    store.set_state(record! { "a" => 1 }).unwrap();
    assert_eq!(*seen.borrow(), vec![Value::Int(1)]);
}

#[test]
fn unchanged_values_do_not_notify() {
    let nested = Value::record(record! { "x" => 1 });
    let store = isolated(record! { "a" => 1, "obj" => nested.clone() });
    let (listener, seen) = recorder();
    store.subscribe("a", &listener);
    store.subscribe("obj", &listener);

    store.set_state(record! { "a" => 1, "obj" => nested }).unwrap();
    assert!(seen.borrow().is_empty());

    // Same contents, different identity: counts as a change.
    store.set_state(record! { "obj" => record! { "x" => 1 } }).unwrap();
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn multi_key_listener_runs_once_with_first_changed_key() {
    let store = isolated(record! { "a" => 0, "b" => 0 });
    let (listener, seen) = recorder();
    store.subscribe("a", &listener);
    store.subscribe("b", &listener);

    store.set_state(record! { "a" => 1, "b" => 2 }).unwrap();
    assert_eq!(*seen.borrow(), vec![Value::Int(1)]);

    store.set_state(record! { "b" => 3, "a" => 4 }).unwrap();
    assert_eq!(*seen.borrow(), vec![Value::Int(1), Value::Int(3)]);
}

#[test]
fn snapshots_are_stable() {
    let store = isolated(record! { "a" => 1 });
    let before = store.current_state();

    store.set_state(record! { "a" => 2, "b" => 3 }).unwrap();

    assert_eq!(before.get("a"), Some(&Value::Int(1)));
    assert!(!before.contains_key("b"));
    let after = store.current_state();
    assert_eq!(after.get("a"), Some(&Value::Int(2)));
    assert_eq!(after.keys().collect::<Vec<_>>(), ["a", "b"]);
}

#[test]
fn invalid_initial_state_is_rejected() {
    for initial in [Value::Null, Value::Int(3), Value::list(vec![]), Value::opaque(())] {
        let err = Store::new(initial).unwrap_err();
        assert!(err.is_invalid_init());
    }
    assert!(matches!(
        Store::from_json(serde_json::json!(null)),
        Err(StoreError::InvalidInit { found: "null" })
    ));
}

#[test]
fn invalid_update_leaves_store_untouched() {
    let store = isolated(record! { "a" => 1 });
    let (listener, seen) = recorder();
    store.subscribe("a", &listener);
    let before = store.current_state();

    let err = store.set_state(Value::Null).unwrap_err();
    assert!(err.is_invalid_update());
    let err = store.update(|_| Value::list(vec![Value::Int(2)])).unwrap_err();
    assert!(matches!(err, StoreError::InvalidUpdate { found: "list" }));

    assert!(Rc::ptr_eq(&before, &store.current_state()));
    assert!(seen.borrow().is_empty());
}

#[test]
fn json_round_trip_of_state() {
    let store = Store::builder(Value::from(serde_json::json!({"name": "ada", "tags": ["x"]})))
        .context(StoreContext::new())
        .build()
        .unwrap();
    store.set_state(record! { "age" => 36 }).unwrap();

    let json = serde_json::to_value(&*store.current_state()).unwrap();
    assert_eq!(json, serde_json::json!({"name": "ada", "tags": ["x"], "age": 36}));
}

#[test]
fn listener_can_update_the_store() {
    let store = isolated(record! { "celsius" => 0, "fahrenheit" => 32 });
    let weak = store.downgrade();
    let converter = Listener::new(move |v| {
        let Some(store) = weak.upgrade() else { return };
        let c = v.as_int().unwrap_or(0);
        store.set_state(record! { "fahrenheit" => c * 9 / 5 + 32 }).unwrap();
    });
    store.subscribe("celsius", &converter);
    let (listener, seen) = recorder();
    store.subscribe("fahrenheit", &listener);

    store.set_state(record! { "celsius" => 100 }).unwrap();
    assert_eq!(store.get("fahrenheit"), Some(Value::Int(212)));
    assert_eq!(*seen.borrow(), vec![Value::Int(212)]);
}

#[test]
fn listener_added_during_dispatch_waits_for_next_update() {
    let store = isolated(record! { "a" => 0 });
    let late_calls = Rc::new(Cell::new(0));

    let late = {
        let counter = Rc::clone(&late_calls);
        Listener::new(move |_| counter.set(counter.get() + 1))
    };
    let adder = {
        let weak = store.downgrade();
        let late = late.clone();
        Listener::new(move |_| {
            if let Some(store) = weak.upgrade() {
                store.subscribe("a", &late);
            }
        })
    };
    store.subscribe("a", &adder);

    store.set_state(record! { "a" => 1 }).unwrap();
    assert_eq!(late_calls.get(), 0);
    store.set_state(record! { "a" => 2 }).unwrap();
    assert_eq!(late_calls.get(), 1);
}

#[test]
fn effects_bound_to_store() {
    let store = Store::builder(record! { "test" => "test", "foo" => "bar" })
        .context(StoreContext::new())
        .effect("change_foo", |store, _| {
            let foo = store.get("foo").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
            store.set_state(record! { "foo" => format!("{foo}+") })?;
            Ok(Value::Null)
        })
        .effect("add", |store, args| {
            let by = args.first().and_then(Value::as_int).unwrap_or(1);
            let next = store.get("n").and_then(|v| v.as_int()).unwrap_or(0) + by;
            store.set_state(record! { "n" => next })?;
            Ok(Value::Int(next))
        })
        .build()
        .unwrap();

    store.run_effect("change_foo", &[]).unwrap();
    assert_eq!(store.get("foo"), Some(Value::from("bar+")));
    assert_eq!(store.get("test"), Some(Value::from("test")));

    assert_eq!(store.run_effect("add", &[Value::Int(5)]).unwrap(), Value::Int(5));
    assert_eq!(store.effect_names(), vec!["add", "change_foo"]);

    let err = store.run_effect("missing", &[]).unwrap_err();
    assert!(matches!(err, StoreError::UnknownEffect { ref name } if name == "missing"));
}

#[test]
fn explicit_update_variants() {
    let store = isolated(Record::new());
    store.set_state(Update::from(record! { "a" => 1 })).unwrap();
    store
        .set_state(Update::with(|s: &Record| record! { "b" => s.len() as i64 }))
        .unwrap();
    assert_eq!(store.get("b"), Some(Value::Int(1)));
}

#[test]
fn every_change_notifies_across_generation_wraps() {
    for generation_limit in [1, 3] {
        let store = Store::builder(record! { "a" => 0, "b" => 0 })
            .context(StoreContext::new())
            .config(StoreConfig {
                generation_limit,
                ..StoreConfig::default()
            })
            .build()
            .unwrap();
        let (on_a, seen_a) = recorder();
        let (on_b, seen_b) = recorder();
        store.subscribe("a", &on_a);
        store.subscribe("b", &on_b);

        store.set_state(record! { "a" => 1 }).unwrap();
        store.set_state(record! { "b" => 1 }).unwrap();
        store.set_state(record! { "b" => 2 }).unwrap();
        store.set_state(record! { "a" => 2 }).unwrap();
        store.set_state(record! { "a" => 3 }).unwrap();

        assert_eq!(*seen_a.borrow(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(*seen_b.borrow(), vec![Value::Int(1), Value::Int(2)]);
    }
}
