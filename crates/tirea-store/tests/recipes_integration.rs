//! Integration tests for producers, property helpers and history.

use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;
use tirea_store::{
    historize, mutate, path, produce, remove_prop, set_prop, HistorizeOptions, StateStore,
    StateStoreExt, Store, StoreError, Value,
};

fn state(store: &impl StateStore) -> Value {
    store.get().unwrap().unwrap()
}

fn counter(store: &impl StateStore) -> (Rc<Cell<usize>>, tirea_store::Subscription) {
    let count = Rc::new(Cell::new(0));
    let sink = count.clone();
    let sub = store.subscribe(move |_, _| sink.set(sink.get() + 1)).unwrap();
    (count, sub)
}

// ============================================================================
// produce
// ============================================================================

#[test]
fn test_produce_shares_untouched_branches() {
    let base = Value::from(json!({
        "a": {"b": 0},
        "sibling": {"deep": {"list": [1, 2, 3]}}
    }));
    let next = produce(&base, |draft| draft.child("a").unwrap().set("b", 1)).unwrap();

    assert_eq!(next.get_path(&path!("a", "b")).unwrap(), json!(1));
    assert!(!Value::same(&next, &base));
    assert!(!Value::same(&next.get("a").unwrap(), &base.get("a").unwrap()));
    assert!(Value::same(&next.get("sibling").unwrap(), &base.get("sibling").unwrap()));
}

#[test]
fn test_produce_from_frozen_store_state() {
    let store = Store::new(json!({"todos": [{"done": false}, {"done": false}]}));
    let current = state(&store);
    let next = produce(&current, |draft| {
        draft.child_at("todos.0").unwrap().set("done", true)
    })
    .unwrap();
    store.set(next).unwrap();

    let todos = state(&store).get("todos").unwrap();
    assert!(todos.is_array());
    assert_eq!(todos, json!([{"done": true}, {"done": false}]));
    assert!(Value::same(
        &todos.get_path(&path!(1usize)).unwrap(),
        &current.get_path(&path!("todos", 1usize)).unwrap()
    ));
}

#[test]
fn test_produce_misuse() {
    let base = Value::from(json!({"a": 1}));
    assert!(matches!(produce(&base, |draft| draft.clone()), Err(StoreError::DraftReturned)));
    assert!(matches!(
        produce(&Value::from(42), |_| {}),
        Err(StoreError::NotDraftable { found: "number", .. })
    ));
    assert!(matches!(
        produce(&Value::from("s"), |_| {}),
        Err(StoreError::NotDraftable { found: "string", .. })
    ));
}

// ============================================================================
// mutate / set_prop / remove_prop
// ============================================================================

#[test]
fn test_mutate_through_scope() {
    let store = Store::new(json!({"cart": {"items": []}, "user": {"id": 1}}));
    let user_before = state(&store).get("user").unwrap();
    let cart = store.scope("cart");
    let (calls, _sub) = counter(&store);

    mutate(&cart, |draft| draft.child("items").unwrap().push("apple")).unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(state(&cart), json!({"items": ["apple"]}));
    assert!(Value::same(&state(&store).get("user").unwrap(), &user_before));
}

#[test]
fn test_mutate_without_changes_does_not_emit() {
    let store = Store::new(json!({"a": {"b": 1}}));
    let (calls, _sub) = counter(&store);
    mutate(&store, |draft| {
        let _ = draft.child("a").unwrap().get("b");
    })
    .unwrap();
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_mutate_absent_scope_is_not_draftable() {
    let store = Store::new(json!({}));
    let err = mutate(&store.scope("missing"), |_| {}).unwrap_err();
    assert!(matches!(err, StoreError::NotDraftable { context: "mutate", found: "undefined" }));
}

#[test]
fn test_prop_helpers() {
    let store = Store::new(json!({"profile": {"name": "Ann", "tmp": true}}));
    let (calls, _sub) = counter(&store);

    set_prop(&store, "profile.name", "Bea").unwrap();
    remove_prop(&store, "profile.tmp").unwrap();
    set_prop(&store.scope("profile"), "address.city", "Paris").unwrap();

    assert_eq!(calls.get(), 3);
    assert_eq!(
        state(&store),
        json!({"profile": {"name": "Bea", "address": {"city": "Paris"}}})
    );
}

#[test]
fn test_prop_helpers_reject_primitive_owner() {
    let store = Store::new(json!({"count": 1}));
    let err = set_prop(&store, "count.value", 2).unwrap_err();
    assert!(matches!(err, StoreError::InvalidScopeTarget { found: "number", .. }));
}

// ============================================================================
// History
// ============================================================================

#[test]
fn test_history_bounds() {
    let store = Store::new(json!({"step": 0}));
    let history = historize(&store, HistorizeOptions::new(2).unwrap()).unwrap();

    history.push_state(json!({"step": 1})).unwrap();
    assert_eq!(history.len(), 2);
    history.push_state(json!({"step": 2})).unwrap();
    assert_eq!(history.len(), 2);

    history.back().unwrap();
    let oldest = history.state().unwrap().unwrap();
    assert_eq!(oldest, json!({"step": 1}));
    history.back().unwrap();
    assert!(Value::same(&history.state().unwrap().unwrap(), &oldest));
}

#[test]
fn test_history_branch_discard() {
    let store = Store::new(json!("start"));
    let history = historize(&store, HistorizeOptions::default()).unwrap();
    history.push_state("A").unwrap();
    history.push_state("B").unwrap();
    history.back().unwrap();
    assert_eq!(history.forward_len(), 1);
    let back_before = history.back_len();

    history.push_state("C").unwrap();
    assert_eq!(history.forward_len(), 0);
    assert_eq!(history.back_len(), back_before + 1);

    history.forward().unwrap();
    assert_eq!(state(&store), json!("C"));
}

#[test]
fn test_history_records_mutations() {
    let store = Store::new(json!({"todos": []}));
    let history = historize(&store, HistorizeOptions::default()).unwrap();

    mutate(&store, |draft| draft.child("todos").unwrap().push("a")).unwrap();
    set_prop(&store, "filter", "all").unwrap();
    assert_eq!(history.len(), 3);

    history.undo().unwrap();
    history.undo().unwrap();
    assert_eq!(state(&store), json!({"todos": []}));
    history.redo().unwrap();
    assert_eq!(state(&store), json!({"todos": ["a"]}));
}

#[test]
fn test_history_from_config() {
    let store = Store::new(3);
    let options = HistorizeOptions::from_config(&json!({"maxSize": 3, "initHistory": [1, 2]})).unwrap();
    let history = historize(&store, options).unwrap();
    assert_eq!((history.len(), history.back_len()), (3, 2));
    history.go(-2).unwrap();
    assert_eq!(state(&store), json!(1));

    let err = HistorizeOptions::from_config(&json!({"maxSize": 0})).unwrap_err();
    assert!(matches!(err, StoreError::InvalidOptions { .. }));
}

#[test]
fn test_history_after_store_destroy() {
    let store = Store::new(1);
    let history = historize(&store, HistorizeOptions::default()).unwrap();
    store.set(2).unwrap();
    store.destroy();

    assert!(matches!(history.back(), Err(StoreError::DestroyedStoreAccess { .. })));
    assert_eq!(history.back_len(), 1);
    history.destroy().unwrap();
    assert!(matches!(history.go(0), Err(StoreError::HistoryDestroyed { .. })));
}
