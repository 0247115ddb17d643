//! Path-scoped views over a store.
//!
//! A scope for `a.b.c` is three single-property scopes stacked on each other:
//! `a` over the root, `b` over `a`, `c` over `b`. Each level
//!
//! - reads `parent.get()?[key]`,
//! - writes by splicing the new sub-value into a shallow copy of the parent's
//!   value and handing that to `parent`, so a write at any depth ends in a
//!   single `set` on the root,
//! - filters the parent's change notifications down to its own sub-value.
//!
//! Scopes hold no state; they stop working once the root is destroyed.

use crate::emitter::{Listener, Subscription};
use crate::error::{StoreError, StoreResult};
use crate::path::{Path, Seg};
use crate::store::{StateStore, SubscribeOptions, Updater};
use crate::value::put_index;
use crate::Value;
use std::rc::Rc;

/// A derived store addressing one property path of its parent.
#[derive(Clone)]
pub struct ScopeStore {
    parent: Rc<dyn StateStore>,
    key: Seg,
    path: Path,
}

impl ScopeStore {
    /// Stack one single-property scope per segment of `path` on `parent`.
    ///
    /// `base` is the parent's own path from the root. An empty `path`
    /// addresses the property `""`.
    pub(crate) fn from_path(parent: Rc<dyn StateStore>, base: Path, path: &Path) -> ScopeStore {
        let mut segments = path.iter().cloned();
        let first = segments.next().unwrap_or_else(|| Seg::Key(String::new()));
        let scope = ScopeStore::single(parent, &base, first);
        segments.fold(scope, |scope, seg| {
            ScopeStore::single(scope.handle(), &scope.path, seg)
        })
    }

    fn single(parent: Rc<dyn StateStore>, base: &Path, key: Seg) -> ScopeStore {
        ScopeStore {
            path: base.with_segment(key.clone()),
            parent,
            key,
        }
    }

    /// The property this scope addresses in its parent.
    pub fn key(&self) -> &Seg {
        &self.key
    }

    fn parent_path(&self) -> Path {
        self.path
            .split_last()
            .map(|(owner, _)| owner)
            .unwrap_or_default()
    }
}

/// Extract the sub-value at `key`.
fn project(value: Option<&Value>, key: &Seg) -> Option<Value> {
    value.and_then(|v| v.get_seg(key))
}

/// Rebuild `parent` with `next` spliced in at `key`, preserving its shape.
///
/// Arrays stay arrays, objects stay objects, an absent or `null` parent
/// becomes a fresh object. Array writes past the end pad with `null`, up to
/// [`MAX_INDEX_GAP`](crate::MAX_INDEX_GAP) slots. `None` removes an object property and clears an
/// array slot to `null`.
pub(crate) fn splice(parent: Option<&Value>, key: &Seg, next: Option<Value>, path: &Path) -> StoreResult<Value> {
    match parent {
        Some(current @ Value::Array(node)) => {
            let index = key.as_index().ok_or_else(|| {
                StoreError::invalid_scope_target(path.clone(), key.to_key_string(), current)
            })?;
            let mut items = node.read().clone();
            match next {
                Some(value) => {
                    let len = items.len();
                    if !put_index(&mut items, index, value, Value::Null) {
                        return Err(StoreError::index_out_of_range(path.clone(), index, len));
                    }
                }
                None => {
                    if let Some(slot) = items.get_mut(index) {
                        *slot = Value::Null;
                    }
                }
            }
            Ok(Value::from(items))
        }
        Some(Value::Object(node)) => {
            let mut map = node.read().clone();
            match next {
                Some(value) => {
                    map.insert(key.to_key_string(), value);
                }
                None => {
                    map.remove(&key.to_key_string());
                }
            }
            Ok(Value::from(map))
        }
        None | Some(Value::Null) => Ok(match next {
            Some(value) => Value::object([(key.to_key_string(), value)]),
            None => Value::empty_object(),
        }),
        Some(other) => Err(StoreError::invalid_scope_target(
            path.clone(),
            key.to_key_string(),
            other,
        )),
    }
}

impl StateStore for ScopeStore {
    fn get(&self) -> StoreResult<Option<Value>> {
        Ok(project(self.parent.get()?.as_ref(), &self.key))
    }

    fn replace_with(&self, updater: Updater<'_>) -> StoreResult<()> {
        let key = self.key.clone();
        let parent_path = self.parent_path();
        self.parent.replace_with(Box::new(move |parent_value: Option<&Value>| {
            let current = project(parent_value, &key);
            let next = updater(current.as_ref())?;
            splice(parent_value, &key, next, &parent_path).map(Some)
        }))
    }

    fn subscribe_with(&self, listener: Listener, options: SubscribeOptions) -> StoreResult<Subscription> {
        if options.init_call {
            let current = self.get()?;
            listener(current.as_ref(), current.as_ref());
        }
        let key = self.key.clone();
        let equality_check = options.equality_check;
        let filtered: Listener = Rc::new(move |new: Option<&Value>, old: Option<&Value>| {
            let new = project(new, &key);
            let old = project(old, &key);
            let unchanged = match &equality_check {
                Some(check) => check(new.as_ref(), old.as_ref()),
                None => Value::same_opt(new.as_ref(), old.as_ref()),
            };
            if !unchanged {
                listener(new.as_ref(), old.as_ref());
            }
        });
        self.parent.subscribe_with(filtered, SubscribeOptions::default())
    }

    fn is_destroyed(&self) -> bool {
        self.parent.is_destroyed()
    }

    fn handle(&self) -> Rc<dyn StateStore> {
        Rc::new(self.clone())
    }

    fn path(&self) -> Path {
        self.path.clone()
    }
}

impl std::fmt::Debug for ScopeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeStore")
            .field("path", &self.path)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
