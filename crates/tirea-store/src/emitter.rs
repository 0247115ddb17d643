//! Ordered multi-subscriber change notification.
//!
//! Listeners receive `(new, old)` pairs synchronously, in registration order.
//! Registration hands out a [`Subscription`] guard that removes the listener
//! when dropped or explicitly unsubscribed.

use crate::Value;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Change listener: `(new_state, old_state)`.
pub type Listener = Rc<dyn Fn(Option<&Value>, Option<&Value>)>;

/// Equality predicate: returning `true` suppresses the listener for that pair.
pub type EqualityCheck = Rc<dyn Fn(Option<&Value>, Option<&Value>) -> bool>;

#[derive(Clone)]
struct Entry {
    id: u64,
    listener: Listener,
    equality_check: Option<EqualityCheck>,
    removed: Rc<Cell<bool>>,
}

#[derive(Default)]
struct EmitterInner {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Entry>>,
}

impl EmitterInner {
    fn remove(&self, id: u64) {
        self.entries.borrow_mut().retain(|e| {
            if e.id == id {
                e.removed.set(true);
            }
            e.id != id
        });
    }
}

/// Ordered list of change listeners.
#[derive(Default)]
pub struct ChangeEmitter {
    inner: Rc<EmitterInner>,
}

impl ChangeEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, optionally gated by an equality check.
    pub fn subscribe(&self, listener: Listener, equality_check: Option<EqualityCheck>) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let removed = Rc::new(Cell::new(false));
        self.inner.entries.borrow_mut().push(Entry {
            id,
            listener,
            equality_check,
            removed: removed.clone(),
        });
        Subscription {
            emitter: Rc::downgrade(&self.inner),
            id,
            removed,
            active: true,
        }
    }

    /// Notify every listener of a change.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe,
    /// unsubscribe or trigger nested emissions. A listener removed while the
    /// emission is in flight is not called for the rest of it.
    pub fn emit(&self, new_state: Option<&Value>, old_state: Option<&Value>) {
        let entries = self.inner.entries.borrow().clone();
        for entry in entries {
            if entry.removed.get() {
                continue;
            }
            if let Some(check) = &entry.equality_check {
                if check(new_state, old_state) {
                    continue;
                }
            }
            (entry.listener)(new_state, old_state);
        }
    }

    /// Remove every listener at once.
    pub fn clear(&self) {
        for entry in self.inner.entries.borrow_mut().drain(..) {
            entry.removed.set(true);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ChangeEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeEmitter")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Registration guard for a listener.
///
/// Dropping the guard unsubscribes. Use [`Subscription::detach`] to keep the
/// listener for as long as the emitter lives.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
#[derive(Debug)]
pub struct Subscription {
    emitter: Weak<EmitterInner>,
    id: u64,
    removed: Rc<Cell<bool>>,
    active: bool,
}

impl Subscription {
    /// Remove the listener. Future emissions will not reach it.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the listener registered without holding the guard.
    pub fn detach(mut self) {
        self.active = false;
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.active && !self.removed.get() && self.emitter.strong_count() > 0
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.active) {
            if let Some(inner) = self.emitter.upgrade() {
                inner.remove(self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
