//! Shared, freezable state values.
//!
//! `Value` is the document type held by every store. Containers (arrays and
//! objects) live behind `Rc` nodes so that snapshots share structure: cloning
//! a `Value` is cheap and two clones of the same container are *identical*
//! in the sense of [`Value::same`]. A container node carries a `frozen` bit
//! set by [`deep_freeze`](crate::deep_freeze); frozen nodes reject every
//! mutation with [`StoreError::FrozenValue`].
//!
//! Binary buffers ([`Value::Bytes`]) are views that can never be frozen and
//! stay writable even inside frozen containers.

use crate::error::{StoreError, StoreResult};
use crate::path::{Path, Seg};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;
use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Property map of an object value.
pub type Map = BTreeMap<String, Value>;

/// A container node: its children plus the frozen bit.
pub struct Node<T> {
    items: RefCell<T>,
    frozen: Cell<bool>,
}

impl<T> Node<T> {
    fn new(items: T) -> Rc<Self> {
        Rc::new(Self {
            items: RefCell::new(items),
            frozen: Cell::new(false),
        })
    }

    /// Borrow the node's children.
    #[inline]
    pub fn read(&self) -> Ref<'_, T> {
        self.items.borrow()
    }

    /// Whether the node has been frozen.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("frozen", &self.frozen.get())
            .field("items", &*self.items.borrow())
            .finish()
    }
}

/// A state value: a primitive, a shared container or a binary buffer.
#[derive(Clone)]
pub enum Value {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Any JSON number.
    Number(Number),
    /// A string.
    String(String),
    /// An ordered list of values.
    Array(Rc<Node<Vec<Value>>>),
    /// A property map.
    Object(Rc<Node<Map>>),
    /// A binary buffer view; never frozen.
    Bytes(Rc<RefCell<Vec<u8>>>),
}

impl Value {
    /// Create an array value.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Node::new(items.into_iter().collect()))
    }

    /// Create an object value.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Node::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Create an empty object value.
    pub fn empty_object() -> Self {
        Value::Object(Node::new(Map::new()))
    }

    /// Create a binary buffer value.
    pub fn bytes(data: Vec<u8>) -> Self {
        Value::Bytes(Rc::new(RefCell::new(data)))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    #[inline]
    pub fn is_bytes(&self) -> bool {
        matches!(self, Value::Bytes(_))
    }

    /// Objects and arrays: the values drafts and deep-freeze descend into.
    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// Address of the shared container node, if any.
    pub(crate) fn node_addr(&self) -> Option<*const ()> {
        match self {
            Value::Array(node) => Some(Rc::as_ptr(node).cast::<()>()),
            Value::Object(node) => Some(Rc::as_ptr(node).cast::<()>()),
            _ => None,
        }
    }

    /// Values compared by value rather than by identity.
    #[inline]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Number of children of a container, or bytes of a buffer; 0 otherwise.
    pub fn len(&self) -> usize {
        match self {
            Value::Array(node) => node.read().len(),
            Value::Object(node) => node.read().len(),
            Value::Bytes(buf) => buf.borrow().len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a property by its dotted-segment spelling.
    #[inline]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_seg(&Seg::parse(key))
    }

    /// Look up a single segment. Anything but a matching container yields `None`.
    pub fn get_seg(&self, seg: &Seg) -> Option<Value> {
        match self {
            Value::Object(node) => node.read().get(&seg.to_key_string()).cloned(),
            Value::Array(node) => seg.as_index().and_then(|i| node.read().get(i).cloned()),
            _ => None,
        }
    }

    /// Walk a full path, stopping at the first missing hop.
    pub fn get_path(&self, path: &Path) -> Option<Value> {
        path.iter()
            .try_fold(self.clone(), |current, seg| current.get_seg(seg))
    }

    /// Property names of an object or indices of an array.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Object(node) => node.read().keys().cloned().collect(),
            Value::Array(node) => (0..node.read().len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// Set a property of an object in place.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> StoreResult<Option<Value>> {
        let key = key.into();
        match self {
            Value::Object(node) => {
                self.ensure_writable()?;
                Ok(node.items.borrow_mut().insert(key, value.into()))
            }
            Value::Array(_) => match Seg::parse(&key).as_index() {
                Some(i) => self.set_index(i, value).map(|_| None),
                None => Err(StoreError::invalid_scope_target(Path::root(), key, self)),
            },
            _ => Err(StoreError::invalid_scope_target(Path::root(), key, self)),
        }
    }

    /// Delete a property of an object, or splice an element out of an array.
    pub fn remove(&self, key: &str) -> StoreResult<Option<Value>> {
        match self {
            Value::Object(node) => {
                self.ensure_writable()?;
                Ok(node.items.borrow_mut().remove(key))
            }
            Value::Array(node) => {
                self.ensure_writable()?;
                let mut items = node.items.borrow_mut();
                match Seg::parse(key).as_index() {
                    Some(i) if i < items.len() => Ok(Some(items.remove(i))),
                    _ => Ok(None),
                }
            }
            _ => Err(StoreError::invalid_scope_target(Path::root(), key, self)),
        }
    }

    /// Append an element to an array in place.
    pub fn push(&self, value: impl Into<Value>) -> StoreResult<()> {
        match self {
            Value::Array(node) => {
                self.ensure_writable()?;
                node.items.borrow_mut().push(value.into());
                Ok(())
            }
            _ => Err(StoreError::invalid_scope_target(Path::root(), "push", self)),
        }
    }

    /// Replace an array element in place, padding with `Null` past the end.
    ///
    /// Fails with [`StoreError::IndexOutOfRange`] beyond [`MAX_INDEX_GAP`].
    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> StoreResult<()> {
        match self {
            Value::Array(node) => {
                self.ensure_writable()?;
                let mut items = node.items.borrow_mut();
                if !put_index(&mut items, index, value.into(), Value::Null) {
                    return Err(StoreError::index_out_of_range(Path::root(), index, items.len()));
                }
                Ok(())
            }
            _ => Err(StoreError::invalid_scope_target(
                Path::root(),
                index.to_string(),
                self,
            )),
        }
    }

    /// Run `f` against the contents of a binary buffer.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> Option<R> {
        match self {
            Value::Bytes(buf) => Some(f(&mut buf.borrow_mut())),
            _ => None,
        }
    }

    /// Whether this value is immutable.
    ///
    /// Primitives always are, buffers never are, containers are once frozen.
    pub fn is_frozen(&self) -> bool {
        match self {
            Value::Array(node) => node.is_frozen(),
            Value::Object(node) => node.is_frozen(),
            Value::Bytes(_) => false,
            _ => true,
        }
    }

    /// Set the frozen bit of a container. Returns `false` if nothing changed.
    pub(crate) fn freeze_shallow(&self) -> bool {
        let frozen = match self {
            Value::Array(node) => &node.frozen,
            Value::Object(node) => &node.frozen,
            _ => return false,
        };
        !frozen.replace(true)
    }

    /// Snapshot of the direct children of a container.
    pub(crate) fn children(&self) -> Vec<Value> {
        match self {
            Value::Array(node) => node.read().clone(),
            Value::Object(node) => node.read().values().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.is_frozen() {
            return Err(StoreError::frozen(self));
        }
        Ok(())
    }

    /// Reference identity.
    ///
    /// Containers and buffers are identical only if they are the same node;
    /// primitives are identical when equal.
    pub fn same(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
            (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
            (Value::Bytes(x), Value::Bytes(y)) => Rc::ptr_eq(x, y),
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            _ => false,
        }
    }

    /// [`Value::same`] over possibly absent values.
    pub fn same_opt(a: Option<&Value>, b: Option<&Value>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => Value::same(a, b),
            _ => false,
        }
    }

    /// Fresh, unfrozen container sharing this one's children.
    pub fn shallow_copy(&self) -> Value {
        match self {
            Value::Array(node) => Value::Array(Node::new(node.read().clone())),
            Value::Object(node) => Value::Object(Node::new(node.read().clone())),
            other => other.clone(),
        }
    }

    /// Fully independent copy: every container and buffer is fresh.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Array(node) => Value::array(node.read().iter().map(Value::deep_copy)),
            Value::Object(node) => Value::Object(Node::new(
                node.read()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            )),
            Value::Bytes(buf) => Value::bytes(buf.borrow().clone()),
            other => other.clone(),
        }
    }

    /// Convert into a `serde_json::Value`. Buffers become arrays of numbers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(node) => {
                serde_json::Value::Array(node.read().iter().map(Value::to_json).collect())
            }
            Value::Object(node) => serde_json::Value::Object(
                node.read()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Bytes(buf) => serde_json::Value::Array(
                buf.borrow().iter().map(|b| serde_json::Value::from(*b)).collect(),
            ),
        }
    }

    /// Parse a JSON document.
    pub fn from_json_str(s: &str) -> StoreResult<Value> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize into a JSON document.
    pub fn to_json_string(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Most `null` slots a single array write may insert before its index.
pub const MAX_INDEX_GAP: usize = 10_000;

/// Write `value` at `index`, padding with `fill` if the vector is too short.
///
/// Returns `false`, leaving `items` untouched, when the index lies more than
/// [`MAX_INDEX_GAP`] slots past the end.
pub(crate) fn put_index<T: Clone>(items: &mut Vec<T>, index: usize, value: T, fill: T) -> bool {
    if index < items.len() {
        items[index] = value;
        return true;
    }
    if index - items.len() > MAX_INDEX_GAP {
        return false;
    }
    items.resize(index, fill);
    items.push(value);
    true
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y) || *x.read() == *y.read(),
            (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y) || *x.read() == *y.read(),
            (Value::Bytes(x), Value::Bytes(y)) => Rc::ptr_eq(x, y) || *x.borrow() == *y.borrow(),
            _ => Value::same(self, other),
        }
    }
}

impl PartialEq<serde_json::Value> for Value {
    fn eq(&self, other: &serde_json::Value) -> bool {
        self.to_json() == *other
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Value::Bytes(buf) = self {
            return f.debug_tuple("Bytes").field(&*buf.borrow()).finish();
        }
        write!(f, "{}", self.to_json())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(Number::from(n))
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u8, u32, u64, usize);

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Node::new(items))
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(Node::new(map))
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(node) => serializer.collect_seq(node.read().iter()),
            Value::Object(node) => serializer.collect_map(node.read().iter()),
            Value::Bytes(buf) => serializer.collect_seq(buf.borrow().iter()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clone_is_identical() {
        let v = Value::from(json!({"a": {"b": 1}}));
        let c = v.clone();
        assert!(Value::same(&v, &c));
        assert!(!Value::same(&v, &v.shallow_copy()));
        assert_eq!(v, v.shallow_copy());
    }

    #[test]
    fn test_primitives_identical_by_value() {
        assert!(Value::same(&Value::from(1), &Value::from(1)));
        assert!(Value::same(&Value::from("x"), &Value::from("x")));
        assert!(!Value::same(&Value::from(1), &Value::from("1")));
        assert!(Value::same_opt(None, None));
        assert!(!Value::same_opt(Some(&Value::Null), None));
    }

    #[test]
    fn test_shallow_copy_shares_children() {
        let v = Value::from(json!({"a": {"b": 1}, "c": 2}));
        let copy = v.shallow_copy();
        assert!(Value::same(&v.get("a").unwrap(), &copy.get("a").unwrap()));

        let deep = v.deep_copy();
        assert!(!Value::same(&v.get("a").unwrap(), &deep.get("a").unwrap()));
        assert_eq!(v, deep);
    }

    #[test]
    fn test_get_resolves_keys_and_indices() {
        let v = Value::from(json!({"list": [10, 20], "1": "one"}));
        assert_eq!(v.get("1").unwrap(), json!("one"));
        assert_eq!(v.get("list").unwrap().get("1").unwrap(), json!(20));
        assert!(v.get("list").unwrap().get("name").is_none());
        assert!(v.get_path(&Path::parse("list.5")).is_none());
        assert!(Value::from(3).get("a").is_none());
    }

    #[test]
    fn test_in_place_mutation() {
        let v = Value::empty_object();
        v.insert("a", 1).unwrap();
        assert_eq!(v, json!({"a": 1}));
        assert_eq!(v.remove("a").unwrap(), Some(Value::from(1)));

        let list = Value::array(Vec::new());
        list.push("x").unwrap();
        list.set_index(3, "y").unwrap();
        assert_eq!(list, json!(["x", null, null, "y"]));
        list.remove("0").unwrap();
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_set_index_rejects_distant_index() {
        let list = Value::from(json!([1]));
        let err = list.set_index(100_000_000_000, 2).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IndexOutOfRange { index: 100_000_000_000, len: 1, .. }
        ));
        assert!(list.insert("100000000000", 2).is_err());
        assert_eq!(list, json!([1]));

        list.set_index(1 + MAX_INDEX_GAP, "edge").unwrap();
        assert_eq!(list.len(), MAX_INDEX_GAP + 2);
        assert!(list.get(&(MAX_INDEX_GAP).to_string()).unwrap().is_null());
    }

    #[test]
    fn test_insert_on_primitive_fails() {
        let err = Value::from("text").insert("a", 1).unwrap_err();
        assert!(matches!(err, StoreError::InvalidScopeTarget { .. }));
    }

    #[test]
    fn test_frozen_node_rejects_writes() {
        let v = Value::from(json!({"a": 1}));
        assert!(v.freeze_shallow());
        assert!(!v.freeze_shallow());
        let err = v.insert("b", 2).unwrap_err();
        assert!(matches!(err, StoreError::FrozenValue { found: "object" }));
        assert!(v.shallow_copy().insert("b", 2).is_ok());
    }

    #[test]
    fn test_bytes_never_frozen() {
        let buf = Value::bytes(vec![1, 2, 3]);
        assert!(!buf.is_frozen());
        assert!(!buf.freeze_shallow());
        buf.with_bytes_mut(|b| b[0] = 9);
        assert_eq!(buf.to_json(), json!([9, 2, 3]));
    }

    #[test]
    fn test_serde_roundtrip_through_json_text() {
        let v = Value::from(json!({"name": "Jane", "tags": ["a", "b"], "age": 43}));
        let text = v.to_json_string().unwrap();
        let parsed = Value::from_json_str(&text).unwrap();
        assert_eq!(parsed, v);
        assert!(Value::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_nan_becomes_null() {
        assert!(Value::from(f64::NAN).is_null());
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
    }
}
