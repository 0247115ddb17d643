//! Copy-on-write drafts and producers.
//!
//! A [`Draft`] is a mutable builder mirroring an object or array. Reading a
//! container property through [`Draft::child`] wraps it in a child draft on
//! first touch (memoized), so edits can go arbitrarily deep while untouched
//! branches keep pointing at the original values. Writes mark the draft and
//! all of its ancestors modified.
//!
//! [`produce`] runs a recipe against a root draft and materializes the
//! result: modified drafts become new shallow copies, everything else is
//! reused by reference. A recipe that modifies nothing yields the exact base
//! value.
//!
//! ```
//! use tirea_store::{produce, Value};
//! use serde_json::json;
//!
//! let base = Value::from(json!({"user": {"name": "Jane"}, "tags": ["a"]}));
//! let next = produce(&base, |draft| {
//!     draft.child("user").unwrap().set("name", "John")
//! }).unwrap();
//!
//! assert_eq!(next.get("user").unwrap(), json!({"name": "John"}));
//! assert!(Value::same(&next.get("tags").unwrap(), &base.get("tags").unwrap()));
//! ```

use crate::error::{StoreError, StoreResult};
use crate::path::{Path, Seg};
use crate::scope::splice;
use crate::store::{StateStore, StateStoreExt};
use crate::value::{put_index, Map};
use crate::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

#[derive(Clone)]
enum Slot {
    Value(Value),
    Draft(Draft),
}

impl Slot {
    fn materialize(&self) -> Value {
        match self {
            Slot::Value(v) => v.clone(),
            Slot::Draft(d) => d.current(),
        }
    }
}

enum Working {
    Object(BTreeMap<String, Slot>),
    Array(Vec<Slot>),
}

impl Working {
    fn slot(&self, seg: &Seg) -> Option<&Slot> {
        match self {
            Working::Object(map) => map.get(&seg.to_key_string()),
            Working::Array(items) => seg.as_index().and_then(|i| items.get(i)),
        }
    }

    fn slot_mut(&mut self, seg: &Seg) -> Option<&mut Slot> {
        match self {
            Working::Object(map) => map.get_mut(&seg.to_key_string()),
            Working::Array(items) => seg.as_index().and_then(|i| items.get_mut(i)),
        }
    }
}

struct DraftNode {
    base: Value,
    working: RefCell<Working>,
    modified: Cell<bool>,
    parent: Option<Weak<DraftNode>>,
    path: Path,
}

impl DraftNode {
    fn mark_modified(&self) {
        if self.modified.replace(true) {
            return;
        }
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.mark_modified();
        }
    }
}

/// Mutable copy-on-write view of an object or array.
///
/// Cloning a `Draft` creates a new handle to the **same** draft.
#[derive(Clone)]
pub struct Draft {
    node: Rc<DraftNode>,
}

impl Draft {
    fn new(base: &Value, parent: Option<&Rc<DraftNode>>, path: Path) -> Option<Draft> {
        let working = match base {
            Value::Object(node) => Working::Object(
                node.read()
                    .iter()
                    .map(|(k, v)| (k.clone(), Slot::Value(v.clone())))
                    .collect(),
            ),
            Value::Array(node) => Working::Array(node.read().iter().cloned().map(Slot::Value).collect()),
            _ => return None,
        };
        Some(Draft {
            node: Rc::new(DraftNode {
                base: base.clone(),
                working: RefCell::new(working),
                modified: Cell::new(false),
                parent: parent.map(Rc::downgrade),
                path,
            }),
        })
    }

    /// Root draft over `base`; `None` unless `base` is an object or array.
    pub fn root(base: &Value) -> Option<Draft> {
        Draft::new(base, None, Path::root())
    }

    /// Current value of a property, with pending edits applied.
    pub fn get(&self, key: impl Into<Seg>) -> Option<Value> {
        let slot = self.node.working.borrow().slot(&key.into()).cloned();
        slot.map(|s| s.materialize())
    }

    /// Draft of a container property, created on first access.
    ///
    /// Returns `None` if the property is missing or not an object or array.
    pub fn child(&self, key: impl Into<Seg>) -> Option<Draft> {
        let seg = key.into();
        let mut working = self.node.working.borrow_mut();
        let slot = working.slot_mut(&seg)?;
        match slot {
            Slot::Draft(draft) => Some(draft.clone()),
            Slot::Value(value) => {
                let draft = Draft::new(value, Some(&self.node), self.node.path.with_segment(seg))?;
                *slot = Slot::Draft(draft.clone());
                Some(draft)
            }
        }
    }

    /// Draft at a dotted path below this one.
    pub fn child_at(&self, path: &str) -> Option<Draft> {
        Path::parse(path)
            .into_iter()
            .try_fold(self.clone(), |draft, seg| draft.child(seg))
    }

    /// Set a property. Array drafts accept indices only and pad with `null`,
    /// up to [`MAX_INDEX_GAP`](crate::MAX_INDEX_GAP) slots.
    pub fn set(&self, key: impl Into<Seg>, value: impl Into<Value>) -> StoreResult<()> {
        let seg = key.into();
        let slot = Slot::Value(value.into());
        match &mut *self.node.working.borrow_mut() {
            Working::Object(map) => {
                map.insert(seg.to_key_string(), slot);
            }
            Working::Array(items) => {
                let index = seg.as_index().ok_or_else(|| self.invalid_target(&seg))?;
                let len = items.len();
                if !put_index(items, index, slot, Slot::Value(Value::Null)) {
                    return Err(StoreError::index_out_of_range(self.node.path.clone(), index, len));
                }
            }
        }
        self.node.mark_modified();
        Ok(())
    }

    /// Delete a property, or splice an element out of an array.
    ///
    /// Returns the removed value, if there was one.
    pub fn remove(&self, key: impl Into<Seg>) -> StoreResult<Option<Value>> {
        let seg = key.into();
        let removed = match &mut *self.node.working.borrow_mut() {
            Working::Object(map) => map.remove(&seg.to_key_string()),
            Working::Array(items) => match seg.as_index() {
                Some(i) if i < items.len() => Some(items.remove(i)),
                _ => None,
            },
        };
        self.node.mark_modified();
        Ok(removed.map(|s| s.materialize()))
    }

    /// Append to an array draft.
    pub fn push(&self, value: impl Into<Value>) -> StoreResult<()> {
        match &mut *self.node.working.borrow_mut() {
            Working::Array(items) => items.push(Slot::Value(value.into())),
            Working::Object(_) => return Err(self.invalid_target(&Seg::from("push"))),
        }
        self.node.mark_modified();
        Ok(())
    }

    pub fn len(&self) -> usize {
        match &*self.node.working.borrow() {
            Working::Object(map) => map.len(),
            Working::Array(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Property names, or indices for an array draft.
    pub fn keys(&self) -> Vec<String> {
        match &*self.node.working.borrow() {
            Working::Object(map) => map.keys().cloned().collect(),
            Working::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(&*self.node.working.borrow(), Working::Array(_))
    }

    /// Whether this draft or any draft below it was written to.
    pub fn is_modified(&self) -> bool {
        self.node.modified.get()
    }

    /// The value this draft was created from.
    pub fn original(&self) -> Value {
        self.node.base.clone()
    }

    /// Materialize the draft without consuming it.
    ///
    /// Unmodified drafts return their original value by reference.
    pub fn current(&self) -> Value {
        if !self.node.modified.get() {
            return self.node.base.clone();
        }
        match &*self.node.working.borrow() {
            Working::Object(map) => Value::from(
                map.iter()
                    .map(|(k, slot)| (k.clone(), slot.materialize()))
                    .collect::<Map>(),
            ),
            Working::Array(items) => Value::from(items.iter().map(Slot::materialize).collect::<Vec<_>>()),
        }
    }

    fn invalid_target(&self, seg: &Seg) -> StoreError {
        StoreError::invalid_scope_target(self.node.path.clone(), seg.to_key_string(), &self.node.base)
    }
}

impl std::fmt::Debug for Draft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Draft")
            .field("path", &self.node.path)
            .field("modified", &self.node.modified.get())
            .field("original", &self.node.base)
            .finish()
    }
}

/// What a recipe asked [`produce`] to do.
#[derive(Debug)]
pub enum RecipeOutcome {
    /// Use the (possibly edited) draft.
    Keep,
    /// Use this value instead of the draft.
    Replace(Value),
    /// The recipe handed a draft back, which is a programming error.
    Draft,
}

/// Types a recipe may return.
///
/// `()` keeps the edited draft, a value replaces it, `Option<Value>` does
/// either, a `StoreResult` propagates its error.
pub trait RecipeOutput {
    fn into_outcome(self) -> StoreResult<RecipeOutcome>;
}

impl RecipeOutput for () {
    fn into_outcome(self) -> StoreResult<RecipeOutcome> {
        Ok(RecipeOutcome::Keep)
    }
}

impl RecipeOutput for Value {
    fn into_outcome(self) -> StoreResult<RecipeOutcome> {
        Ok(RecipeOutcome::Replace(self))
    }
}

impl RecipeOutput for serde_json::Value {
    fn into_outcome(self) -> StoreResult<RecipeOutcome> {
        Ok(RecipeOutcome::Replace(Value::from(self)))
    }
}

impl RecipeOutput for Option<Value> {
    fn into_outcome(self) -> StoreResult<RecipeOutcome> {
        Ok(self.map_or(RecipeOutcome::Keep, RecipeOutcome::Replace))
    }
}

impl RecipeOutput for Draft {
    fn into_outcome(self) -> StoreResult<RecipeOutcome> {
        Ok(RecipeOutcome::Draft)
    }
}

impl<T: RecipeOutput> RecipeOutput for StoreResult<T> {
    fn into_outcome(self) -> StoreResult<RecipeOutcome> {
        self?.into_outcome()
    }
}

/// Apply `recipe` to a draft of `base` and return the resulting value.
///
/// Fails with [`StoreError::NotDraftable`] unless `base` is an object or an
/// array, and with [`StoreError::DraftReturned`] if the recipe returns a
/// draft. If the recipe returns nothing and modifies nothing, the result is
/// `base` itself.
pub fn produce<F, R>(base: &Value, recipe: F) -> StoreResult<Value>
where
    F: FnOnce(&Draft) -> R,
    R: RecipeOutput,
{
    let draft = Draft::root(base).ok_or_else(|| StoreError::not_draftable("produce", Some(base)))?;
    match recipe(&draft).into_outcome()? {
        RecipeOutcome::Draft => Err(StoreError::DraftReturned),
        RecipeOutcome::Replace(value) => Ok(value),
        RecipeOutcome::Keep => Ok(draft.current()),
    }
}

/// Run `recipe` against the store's state and set the result.
///
/// The store is left alone (no emission) when the recipe changes nothing.
pub fn mutate<S, F, R>(store: &S, recipe: F) -> StoreResult<()>
where
    S: StateStore + ?Sized,
    F: FnOnce(&Draft) -> R,
    R: RecipeOutput,
{
    let base = match store.get()? {
        Some(state) if state.is_container() => state,
        other => return Err(StoreError::not_draftable("mutate", other.as_ref())),
    };
    let next = produce(&base, recipe)?;
    if !Value::same(&next, &base) {
        store.set(next)?;
    }
    Ok(())
}

/// Set the property at a dotted path, e.g. `set_prop(&store, "pet.name", "Rex")`.
///
/// Missing owners are created as objects.
pub fn set_prop<S>(store: &S, path: &str, value: impl Into<Value>) -> StoreResult<()>
where
    S: StateStore + ?Sized,
{
    write_prop(store, path, Some(value.into()))
}

/// Remove the property at a dotted path, e.g. `remove_prop(&store, "pet.name")`.
///
/// Removing below a missing owner does nothing.
pub fn remove_prop<S>(store: &S, path: &str) -> StoreResult<()>
where
    S: StateStore + ?Sized,
{
    write_prop(store, path, None)
}

fn write_prop<S>(store: &S, path: &str, next: Option<Value>) -> StoreResult<()>
where
    S: StateStore + ?Sized,
{
    let path = Path::parse(path);
    let (owner_path, key) = match path.split_last() {
        Some((owner_path, key)) => (owner_path, key.clone()),
        None => (Path::root(), Seg::Key(String::new())),
    };
    if owner_path.is_empty() {
        write_key(store, &key, next)
    } else {
        write_key(&store.scope_at(&owner_path), &key, next)
    }
}

fn write_key<O>(owner: &O, key: &Seg, next: Option<Value>) -> StoreResult<()>
where
    O: StateStore + ?Sized,
{
    let current = owner.get()?;
    if current.is_none() && next.is_none() {
        return Ok(());
    }
    let updated = splice(current.as_ref(), key, next, &owner.path())?;
    owner.set(updated)
}
