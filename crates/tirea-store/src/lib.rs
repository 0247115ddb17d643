//! Reactive state container with immutable snapshots, path scopes and history.
//!
//! `tirea-store` keeps application state in a [`Store`]: a single frozen
//! snapshot plus an ordered list of change listeners. Every write replaces the
//! snapshot and notifies listeners synchronously with `(new, old)`.
//!
//! # Core Concepts
//!
//! - **Value**: JSON-like state tree with reference identity; containers are
//!   shared and can be frozen
//! - **Store**: root owner of the state, its listeners and its lifecycle
//! - **ScopeStore**: stateless view addressing a dotted path below a store
//! - **Draft**: copy-on-write builder used by [`produce`] and [`mutate`]
//! - **History**: bounded undo/redo log over any store
//!
//! # Quick Start
//!
//! ```
//! use tirea_store::{StateStore, StateStoreExt, Store};
//! use serde_json::json;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let store = Store::new(json!({
//!     "mum": {"name": "Jane", "age": 43},
//!     "dad": {"name": "John", "age": 41}
//! }));
//! let mum = store.scope("mum");
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let _sub = {
//!     let seen = seen.clone();
//!     mum.subscribe(move |new, _old| seen.borrow_mut().push(new.cloned())).unwrap()
//! };
//!
//! mum.scope("age").set(44).unwrap();
//!
//! let state = store.get().unwrap().unwrap();
//! assert_eq!(state.get("mum").unwrap(), json!({"name": "Jane", "age": 44}));
//! assert_eq!(seen.borrow().len(), 1);
//! ```
//!
//! # Immutability
//!
//! Snapshots are deep-frozen before they are published. Writing into a frozen
//! container fails with [`StoreError::FrozenValue`]; build the next state with
//! [`produce`] or by constructing new values instead.
//!
//! ```
//! use tirea_store::{produce, StateStore, StateStoreExt, Store};
//! use serde_json::json;
//!
//! let store = Store::new(json!({"todos": []}));
//! let state = store.get().unwrap().unwrap();
//! assert!(state.insert("todos", 1).is_err());
//!
//! let next = produce(&state, |draft| draft.child("todos").unwrap().push("write docs")).unwrap();
//! store.set(next).unwrap();
//! ```

mod draft;
mod emitter;
mod error;
mod freeze;
mod history;
mod path;
mod scope;
mod store;
mod value;

// Value model
pub use error::{value_type_name, StoreError, StoreResult};
pub use freeze::{deep_freeze, is_deep_frozen};
pub use path::{Path, Seg};
pub use value::{Map, Node, Value, MAX_INDEX_GAP};

// Stores
pub use emitter::{ChangeEmitter, EqualityCheck, Listener, Subscription};
pub use scope::ScopeStore;
pub use store::{
    apply_extensions, StateStore, StateStoreExt, Store, StoreExtension, StoreOptions, SubscribeOptions,
    TraceChanges, Updater,
};

// Mutation helpers
pub use draft::{mutate, produce, remove_prop, set_prop, Draft, RecipeOutcome, RecipeOutput};
pub use history::{historize, HistorizeOptions, History, DEFAULT_MAX_SIZE};
