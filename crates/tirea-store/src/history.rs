//! Bounded undo/redo history layered on the store contract.
//!
//! [`historize`] subscribes to a store like any other consumer. Every change
//! that the history did not cause itself drops the forward branch and appends
//! the new state; navigation replays a recorded snapshot through `set` while
//! a guard keeps that write from being recorded again.

use crate::emitter::Subscription;
use crate::error::{StoreError, StoreResult};
use crate::store::{StateStore, StateStoreExt};
use crate::Value;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::debug;

/// Default number of retained steps, the current state included.
pub const DEFAULT_MAX_SIZE: usize = 100;

/// History configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorizeOptions {
    /// Number of retained steps, the current state included. Must be at least 1.
    pub max_size: usize,
    /// Snapshots recorded before the store's current state.
    pub init_history: Vec<Option<Value>>,
}

impl Default for HistorizeOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            init_history: Vec::new(),
        }
    }
}

impl HistorizeOptions {
    /// Options keeping at most `max_size` steps.
    pub fn new(max_size: usize) -> StoreResult<Self> {
        validate_max_size(max_size)?;
        Ok(Self {
            max_size,
            ..Self::default()
        })
    }

    pub fn with_init_history(mut self, init_history: impl IntoIterator<Item = Value>) -> Self {
        self.init_history = init_history.into_iter().map(Some).collect();
        self
    }

    /// Read options from a configuration document.
    ///
    /// Accepts `maxSize`/`max_size` (integer, at least 1) and
    /// `initHistory`/`init_history` (array). `null` yields the defaults.
    pub fn from_config(config: &serde_json::Value) -> StoreResult<Self> {
        let map = match config {
            serde_json::Value::Null => return Ok(Self::default()),
            serde_json::Value::Object(map) => map,
            _ => return Err(StoreError::invalid_options("historize: options must be an object")),
        };
        let mut options = Self::default();

        if let Some(raw) = map.get("maxSize").or_else(|| map.get("max_size")) {
            let max_size = raw
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n >= 1)
                .ok_or_else(|| {
                    StoreError::invalid_options("historize: maxSize must be a number greater than 0")
                })?;
            options.max_size = max_size;
        }

        if let Some(raw) = map.get("initHistory").or_else(|| map.get("init_history")) {
            let items = raw
                .as_array()
                .ok_or_else(|| StoreError::invalid_options("historize: initHistory must be an array"))?;
            options.init_history = items.iter().cloned().map(|v| Some(Value::from(v))).collect();
        }

        Ok(options)
    }
}

fn validate_max_size(max_size: usize) -> StoreResult<()> {
    if max_size == 0 {
        return Err(StoreError::invalid_options(
            "historize: maxSize must be a number greater than 0",
        ));
    }
    Ok(())
}

struct HistoryInner {
    store: Rc<dyn StateStore>,
    stack: RefCell<Vec<Option<Value>>>,
    cursor: Cell<usize>,
    navigating: Cell<bool>,
    destroyed: Cell<bool>,
    max_size: usize,
    subscription: RefCell<Option<Subscription>>,
}

impl HistoryInner {
    fn record(&self, state: Option<Value>) {
        if self.navigating.get() || self.destroyed.get() {
            return;
        }
        let mut stack = self.stack.borrow_mut();
        stack.truncate(self.cursor.get() + 1);
        stack.push(state);
        if stack.len() > self.max_size {
            let evicted = stack.len() - self.max_size;
            stack.drain(..evicted);
            debug!(evicted, max_size = self.max_size, "history trimmed");
        }
        self.cursor.set(stack.len() - 1);
    }
}

/// Undo/redo handle over a store.
///
/// Dropping the handle stops recording.
pub struct History {
    inner: Rc<HistoryInner>,
}

/// Start recording the changes of `store`.
///
/// The stack starts as `init_history` followed by a deep copy of the current
/// state, keeping only the last `max_size` entries.
pub fn historize<S>(store: &S, options: HistorizeOptions) -> StoreResult<History>
where
    S: StateStore + ?Sized,
{
    validate_max_size(options.max_size)?;
    let current = store.get()?;

    let mut stack = options.init_history;
    stack.push(current.as_ref().map(Value::deep_copy));
    if stack.len() > options.max_size {
        stack.drain(..stack.len() - options.max_size);
    }

    let inner = Rc::new(HistoryInner {
        store: store.handle(),
        cursor: Cell::new(stack.len() - 1),
        stack: RefCell::new(stack),
        navigating: Cell::new(false),
        destroyed: Cell::new(false),
        max_size: options.max_size,
        subscription: RefCell::new(None),
    });

    let weak: Weak<HistoryInner> = Rc::downgrade(&inner);
    let subscription = store.subscribe(move |new, _old| {
        if let Some(inner) = weak.upgrade() {
            inner.record(new.cloned());
        }
    })?;
    inner.subscription.replace(Some(subscription));

    Ok(History { inner })
}

impl History {
    fn ensure_alive(&self, operation: &'static str) -> StoreResult<()> {
        if self.inner.destroyed.get() {
            return Err(StoreError::history_destroyed(operation));
        }
        Ok(())
    }

    /// Move `relative` steps through the history, clamped to its bounds.
    pub fn go(&self, relative: isize) -> StoreResult<()> {
        self.ensure_alive("go")?;
        let inner = &self.inner;
        let previous = inner.cursor.get();
        let target = {
            let stack = inner.stack.borrow();
            let last = stack.len().saturating_sub(1);
            let target = previous.saturating_add_signed(relative).min(last);
            if target == previous {
                return Ok(());
            }
            inner.cursor.set(target);
            stack[target].clone()
        };

        debug!(from = previous, to = inner.cursor.get(), "history navigation");
        inner.navigating.set(true);
        let result = inner.store.replace(target);
        inner.navigating.set(false);
        if result.is_err() {
            inner.cursor.set(previous);
        }
        result
    }

    pub fn back(&self) -> StoreResult<()> {
        self.ensure_alive("back")?;
        self.go(-1)
    }

    /// Alias of [`History::back`].
    pub fn undo(&self) -> StoreResult<()> {
        self.ensure_alive("undo")?;
        self.go(-1)
    }

    pub fn forward(&self) -> StoreResult<()> {
        self.ensure_alive("forward")?;
        self.go(1)
    }

    /// Alias of [`History::forward`].
    pub fn redo(&self) -> StoreResult<()> {
        self.ensure_alive("redo")?;
        self.go(1)
    }

    /// Set the store state, recording it as a new step.
    pub fn push_state(&self, state: impl Into<Value>) -> StoreResult<()> {
        self.ensure_alive("push_state")?;
        self.inner.store.set(state)
    }

    /// The store's current state.
    pub fn state(&self) -> StoreResult<Option<Value>> {
        self.ensure_alive("state")?;
        self.inner.store.get()
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.inner.stack.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Steps available to [`History::back`].
    pub fn back_len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.inner.cursor.get()
    }

    /// Steps available to [`History::forward`].
    pub fn forward_len(&self) -> usize {
        let len = self.len();
        if len == 0 {
            return 0;
        }
        len - 1 - self.inner.cursor.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Stop recording and drop every snapshot. The store is left untouched.
    pub fn destroy(&self) -> StoreResult<()> {
        self.ensure_alive("destroy")?;
        let inner = &self.inner;
        inner.destroyed.set(true);
        if let Some(subscription) = inner.subscription.borrow_mut().take() {
            subscription.unsubscribe();
        }
        inner.stack.borrow_mut().clear();
        inner.cursor.set(0);
        debug!("history destroyed");
        Ok(())
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("len", &self.len())
            .field("cursor", &self.inner.cursor.get())
            .field("max_size", &self.inner.max_size)
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use serde_json::json;

    fn state(history: &History) -> serde_json::Value {
        history.state().unwrap().unwrap().to_json()
    }

    #[test]
    fn test_records_store_changes() {
        let store = Store::new(json!({"name": "John"}));
        let history = historize(&store, HistorizeOptions::default()).unwrap();
        assert_eq!((history.len(), history.back_len(), history.forward_len()), (1, 0, 0));

        store.set(json!({"name": "Jane"})).unwrap();
        assert_eq!(state(&history), json!({"name": "Jane"}));
        assert_eq!((history.len(), history.back_len(), history.forward_len()), (2, 1, 0));
    }

    #[test]
    fn test_navigation() {
        let store = Store::new("john");
        let history = historize(&store, HistorizeOptions::default()).unwrap();
        history.push_state("jane").unwrap();
        history.push_state("jack").unwrap();

        history.back().unwrap();
        assert_eq!(state(&history), json!("jane"));
        history.undo().unwrap();
        assert_eq!(state(&history), json!("john"));
        history.undo().unwrap();
        assert_eq!(state(&history), json!("john"));
        assert_eq!((history.back_len(), history.forward_len()), (0, 2));

        history.forward().unwrap();
        history.redo().unwrap();
        assert_eq!(state(&history), json!("jack"));
        history.go(-2).unwrap();
        assert_eq!(state(&history), json!("john"));
        history.go(10).unwrap();
        assert_eq!(state(&history), json!("jack"));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_navigation_is_not_recorded() {
        let store = Store::new(1);
        let history = historize(&store, HistorizeOptions::default()).unwrap();
        store.set(2).unwrap();
        history.back().unwrap();
        history.forward().unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_bounded_size() {
        let store = Store::new(0);
        let history = historize(&store, HistorizeOptions::new(2).unwrap()).unwrap();
        history.push_state(1).unwrap();
        history.push_state(2).unwrap();
        assert_eq!(history.len(), 2);
        history.back().unwrap();
        assert_eq!(state(&history), json!(1));
        history.back().unwrap();
        assert_eq!(state(&history), json!(1));
    }

    #[test]
    fn test_branch_discard() {
        let store = Store::new("init");
        let history = historize(&store, HistorizeOptions::default()).unwrap();
        history.push_state("a").unwrap();
        history.push_state("b").unwrap();
        history.back().unwrap();
        assert_eq!((history.back_len(), history.forward_len()), (1, 1));
        history.push_state("c").unwrap();
        assert_eq!((history.back_len(), history.forward_len()), (2, 0));
        history.back().unwrap();
        assert_eq!(state(&history), json!("a"));
    }

    #[test]
    fn test_init_history_is_truncated() {
        let store = Store::new(3);
        let options = HistorizeOptions::new(3)
            .unwrap()
            .with_init_history([Value::from(0), Value::from(1), Value::from(2)]);
        let history = historize(&store, options).unwrap();
        assert_eq!((history.len(), history.back_len()), (3, 2));
        history.go(-5).unwrap();
        assert_eq!(state(&history), json!(1));
    }

    #[test]
    fn test_initial_entry_is_a_copy() {
        let store = Store::with_options(json!({"n": 1}), crate::StoreOptions::default().no_freeze(true));
        let history = historize(&store, HistorizeOptions::default()).unwrap();
        store.get().unwrap().unwrap().insert("n", 2).unwrap();
        store.set(json!({"n": 3})).unwrap();
        history.back().unwrap();
        assert_eq!(state(&history), json!({"n": 1}));
    }

    #[test]
    fn test_options_validation() {
        assert!(HistorizeOptions::new(0).is_err());
        assert!(historize(&Store::new(1), HistorizeOptions { max_size: 0, init_history: vec![] }).is_err());

        let options = HistorizeOptions::from_config(&json!({"maxSize": 5, "initHistory": [1, 2]})).unwrap();
        assert_eq!(options.max_size, 5);
        assert_eq!(options.init_history.len(), 2);
        assert_eq!(HistorizeOptions::from_config(&json!(null)).unwrap(), HistorizeOptions::default());
        assert_eq!(HistorizeOptions::from_config(&json!({"max_size": 1})).unwrap().max_size, 1);

        for bad in [
            json!({"maxSize": 0}),
            json!({"maxSize": "10"}),
            json!({"maxSize": -1}),
            json!({"initHistory": {}}),
            json!([1]),
        ] {
            let err = HistorizeOptions::from_config(&bad).unwrap_err();
            assert!(matches!(err, StoreError::InvalidOptions { .. }), "{bad}");
        }
    }

    #[test]
    fn test_destroy() {
        let store = Store::new(1);
        let history = historize(&store, HistorizeOptions::default()).unwrap();
        store.set(2).unwrap();
        history.destroy().unwrap();

        assert_eq!((history.len(), history.back_len(), history.forward_len()), (0, 0, 0));
        assert!(matches!(history.back(), Err(StoreError::HistoryDestroyed { operation: "back" })));
        assert!(matches!(history.state(), Err(StoreError::HistoryDestroyed { .. })));
        assert!(matches!(history.push_state(3), Err(StoreError::HistoryDestroyed { .. })));
        assert!(matches!(history.destroy(), Err(StoreError::HistoryDestroyed { .. })));

        store.set(3).unwrap();
        assert_eq!(store.get().unwrap().unwrap(), json!(3));
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let store = Store::new(1);
        {
            let _history = historize(&store, HistorizeOptions::default()).unwrap();
            assert_eq!(store.subscriber_count(), 1);
        }
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_historize_scope() {
        let store = Store::new(json!({"form": {"name": "a"}, "other": 0}));
        let form = store.scope("form");
        let history = historize(&form, HistorizeOptions::default()).unwrap();
        form.scope("name").set("b").unwrap();
        store.scope("other").set(1).unwrap();
        assert_eq!(history.len(), 2);
        history.undo().unwrap();
        assert_eq!(store.get().unwrap().unwrap(), json!({"form": {"name": "a"}, "other": 1}));
    }
}
