//! Root store: state cell, change emitter and destroy lifecycle.
//!
//! # Contract
//!
//! [`StateStore`] is the interface every store exposes, root or scoped:
//!
//! - `get` returns the current snapshot,
//! - `replace_with` computes and installs the next snapshot,
//! - `subscribe_with` registers a `(new, old)` change listener,
//! - `is_destroyed` reports whether the owning root was destroyed.
//!
//! [`StateStoreExt`] layers the ergonomic `set`/`update`/`subscribe` helpers
//! on top of it. Only the root [`Store`] has a `destroy` method.
//!
//! # Invariants
//!
//! 1. The state is `None` or, unless `no_freeze` is set, deep-frozen.
//! 2. Setting the current state again is a no-op: no emission. With
//!    `no_strict_equal` it is an error for non-primitive values.
//! 3. Listeners run synchronously, in registration order, before `set`
//!    returns. No borrow is held while they run, so they may re-enter the
//!    store.
//! 4. After `destroy`, `get`/`set`/`subscribe` fail forever.

use crate::emitter::{ChangeEmitter, EqualityCheck, Listener, Subscription};
use crate::error::{StoreError, StoreResult};
use crate::freeze::deep_freeze;
use crate::path::Path;
use crate::scope::ScopeStore;
use crate::Value;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Computes the next state from the current one.
pub type Updater<'a> = Box<dyn FnOnce(Option<&Value>) -> StoreResult<Option<Value>> + 'a>;

/// The store contract shared by root and scoped stores.
pub trait StateStore {
    /// Current state; `None` when absent.
    fn get(&self) -> StoreResult<Option<Value>>;

    /// Install the value computed by `updater` from the current state.
    fn replace_with(&self, updater: Updater<'_>) -> StoreResult<()>;

    /// Register a change listener.
    fn subscribe_with(&self, listener: Listener, options: SubscribeOptions) -> StoreResult<Subscription>;

    /// Whether the owning root store has been destroyed.
    fn is_destroyed(&self) -> bool;

    /// Shared handle to this store, used as the parent of derived scopes.
    fn handle(&self) -> Rc<dyn StateStore>;

    /// Location of this store below its root store.
    fn path(&self) -> Path {
        Path::root()
    }

    /// Scope store addressing a dotted path below this store.
    fn scope(&self, path: &str) -> ScopeStore {
        ScopeStore::from_path(self.handle(), self.path(), &Path::parse(path))
    }

    /// Scope store addressing an already parsed path.
    ///
    /// An empty path addresses the property `""`, like `scope("")`.
    fn scope_at(&self, path: &Path) -> ScopeStore {
        ScopeStore::from_path(self.handle(), self.path(), path)
    }
}

/// Convenience methods available on every [`StateStore`].
pub trait StateStoreExt: StateStore {
    /// Set the state to `next`.
    fn set(&self, next: impl Into<Value>) -> StoreResult<()> {
        let next = next.into();
        self.replace_with(Box::new(move |_| Ok(Some(next))))
    }

    /// Set the state to whatever `f` computes from the current state.
    fn update<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        self.replace_with(Box::new(move |current| Ok(Some(f(current)))))
    }

    /// Set the state to a possibly absent value.
    fn replace(&self, next: Option<Value>) -> StoreResult<()> {
        self.replace_with(Box::new(move |_| Ok(next)))
    }

    /// Register a change listener with default options.
    fn subscribe<F>(&self, listener: F) -> StoreResult<Subscription>
    where
        F: Fn(Option<&Value>, Option<&Value>) + 'static,
    {
        self.subscribe_with(Rc::new(listener), SubscribeOptions::default())
    }

    /// Register a change listener with explicit options.
    fn subscribe_with_options<F>(&self, listener: F, options: SubscribeOptions) -> StoreResult<Subscription>
    where
        F: Fn(Option<&Value>, Option<&Value>) + 'static,
    {
        self.subscribe_with(Rc::new(listener), options)
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

/// Store behavior switches.
///
/// Defaults are the strict settings: freeze every snapshot, ignore
/// self-assignment, warn about unusual initial values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Do not deep-freeze snapshots.
    pub no_freeze: bool,
    /// Reject setting a non-primitive state to itself instead of ignoring it.
    pub no_strict_equal: bool,
    /// Silence the warning about non-plain initial values.
    pub no_warn: bool,
}

impl StoreOptions {
    pub fn no_freeze(mut self, no_freeze: bool) -> Self {
        self.no_freeze = no_freeze;
        self
    }

    pub fn no_strict_equal(mut self, no_strict_equal: bool) -> Self {
        self.no_strict_equal = no_strict_equal;
        self
    }

    pub fn no_warn(mut self, no_warn: bool) -> Self {
        self.no_warn = no_warn;
        self
    }
}

/// Options for [`StateStore::subscribe_with`].
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Suppresses the listener when it returns `true` for `(new, old)`.
    pub equality_check: Option<EqualityCheck>,
    /// Call the listener once with `(current, current)` before registering it.
    pub init_call: bool,
}

impl SubscribeOptions {
    pub fn init_call(mut self, init_call: bool) -> Self {
        self.init_call = init_call;
        self
    }

    pub fn equality_check<F>(mut self, check: F) -> Self
    where
        F: Fn(Option<&Value>, Option<&Value>) -> bool + 'static,
    {
        self.equality_check = Some(Rc::new(check));
        self
    }
}

impl std::fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("equality_check", &self.equality_check.is_some())
            .field("init_call", &self.init_call)
            .finish()
    }
}

struct StoreInner {
    state: RefCell<Option<Value>>,
    emitter: ChangeEmitter,
    destroyed: Cell<bool>,
    options: StoreOptions,
}

/// Root store owning a state snapshot.
///
/// Cloning a `Store` creates a new handle to the **same** store.
///
/// # Examples
///
/// ```
/// use tirea_store::{StateStore, StateStoreExt, Store};
/// use serde_json::json;
///
/// let store = Store::new(json!({"count": 0}));
/// store.update(|s| {
///     let next = s.unwrap().shallow_copy();
///     next.insert("count", 1).unwrap();
///     next
/// }).unwrap();
/// assert_eq!(store.get().unwrap().unwrap(), json!({"count": 1}));
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// Create a store with default options.
    pub fn new(initial: impl Into<Value>) -> Self {
        Self::with_options(initial, StoreOptions::default())
    }

    /// Create a store from a literal initial value.
    ///
    /// Containers are shallow-copied so the caller's top-level node is never
    /// aliased by the store.
    pub fn with_options(initial: impl Into<Value>, options: StoreOptions) -> Self {
        let store = Self::empty(options);
        let initial = initial.into();
        store.install_initial(initial.shallow_copy());
        store
    }

    /// Create a store whose initial value is computed by `init`.
    ///
    /// `init` runs once, immediately, with a handle to the store under
    /// construction; it may read and write through it (the state is `None`
    /// until `init` returns) or keep clones of the handle around.
    pub fn with_initializer<F>(options: StoreOptions, init: F) -> StoreResult<Self>
    where
        F: FnOnce(&Store) -> StoreResult<Value>,
    {
        let store = Self::empty(options);
        let initial = init(&store)?;
        store.install_initial(initial);
        Ok(store)
    }

    /// Create a store and apply `extensions` to it in order.
    pub fn with_extensions(
        initial: impl Into<Value>,
        options: StoreOptions,
        extensions: &[&dyn StoreExtension],
    ) -> StoreResult<Self> {
        let store = Self::with_options(initial, options);
        apply_extensions(&store, extensions)?;
        Ok(store)
    }

    fn empty(options: StoreOptions) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(None),
                emitter: ChangeEmitter::new(),
                destroyed: Cell::new(false),
                options,
            }),
        }
    }

    fn install_initial(&self, initial: Value) {
        if initial.is_bytes() && !self.inner.options.no_warn {
            warn!(
                "store is intended for plain objects, arrays and primitives; other types may not work as expected (set no_warn to silence)"
            );
        }
        let initial = self.prepare(initial);
        *self.inner.state.borrow_mut() = Some(initial);
    }

    fn prepare(&self, value: Value) -> Value {
        if self.inner.options.no_freeze {
            value
        } else {
            deep_freeze(value)
        }
    }

    fn ensure_alive(&self, operation: &'static str) -> StoreResult<()> {
        if self.inner.destroyed.get() {
            return Err(StoreError::destroyed(operation));
        }
        Ok(())
    }

    /// Discard the store.
    ///
    /// Unbinds every listener and releases the state. Any later
    /// `get`/`set`/`subscribe` on the store or on a scope derived from it
    /// fails. Calling `destroy` again does nothing.
    pub fn destroy(&self) {
        if self.inner.destroyed.get() {
            return;
        }
        self.inner.emitter.clear();
        self.inner.state.replace(None);
        self.inner.destroyed.set(true);
        debug!("store destroyed");
    }

    /// The options the store was created with.
    pub fn options(&self) -> StoreOptions {
        self.inner.options
    }

    /// Number of listeners registered directly on this store.
    pub fn subscriber_count(&self) -> usize {
        self.inner.emitter.len()
    }
}

impl StateStore for Store {
    fn get(&self) -> StoreResult<Option<Value>> {
        self.ensure_alive("read from")?;
        Ok(self.inner.state.borrow().clone())
    }

    fn replace_with(&self, updater: Updater<'_>) -> StoreResult<()> {
        self.ensure_alive("set")?;
        let old = self.inner.state.borrow().clone();
        let next = updater(old.as_ref())?;

        if Value::same_opt(next.as_ref(), old.as_ref()) {
            if self.inner.options.no_strict_equal && next.as_ref().is_some_and(|v| !v.is_primitive()) {
                return Err(StoreError::SelfAssignmentViolation);
            }
            return Ok(());
        }

        let next = next.map(|v| self.prepare(v));
        self.inner.state.replace(next.clone());
        trace!(listeners = self.inner.emitter.len(), "store state replaced");
        self.inner.emitter.emit(next.as_ref(), old.as_ref());
        Ok(())
    }

    fn subscribe_with(&self, listener: Listener, options: SubscribeOptions) -> StoreResult<Subscription> {
        self.ensure_alive("subscribe to")?;
        if options.init_call {
            let state = self.inner.state.borrow().clone();
            listener(state.as_ref(), state.as_ref());
        }
        Ok(self.inner.emitter.subscribe(listener, options.equality_check))
    }

    fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    fn handle(&self) -> Rc<dyn StateStore> {
        Rc::new(self.clone())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.inner.state.borrow())
            .field("destroyed", &self.inner.destroyed.get())
            .field("listeners", &self.inner.emitter.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Behavior attached to a store after construction.
///
/// Extensions are always passed explicitly, either to
/// [`Store::with_extensions`] or to [`apply_extensions`].
pub trait StoreExtension {
    fn extend(&self, store: &Store) -> StoreResult<()>;
}

impl<F> StoreExtension for F
where
    F: Fn(&Store) -> StoreResult<()>,
{
    fn extend(&self, store: &Store) -> StoreResult<()> {
        self(store)
    }
}

/// Apply `extensions` to `store` in order, stopping at the first failure.
pub fn apply_extensions(store: &Store, extensions: &[&dyn StoreExtension]) -> StoreResult<()> {
    for (index, extension) in extensions.iter().enumerate() {
        extension.extend(store)?;
        debug!(index, "store extension applied");
    }
    Ok(())
}

/// Extension logging every state change at `debug` level.
#[derive(Debug, Clone)]
pub struct TraceChanges {
    label: String,
}

impl TraceChanges {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl StoreExtension for TraceChanges {
    fn extend(&self, store: &Store) -> StoreResult<()> {
        let label = self.label.clone();
        store
            .subscribe(move |new, old| {
                let new = describe(new);
                let old = describe(old);
                debug!(store = %label, %new, %old, "store changed");
            })?
            .detach();
        Ok(())
    }
}

fn describe(state: Option<&Value>) -> String {
    state.map_or_else(|| "undefined".to_owned(), |v| v.to_string())
}
