//! Reactive Cells
//!
//! A [`Reactive`] cell wraps one plain object or array and routes every
//! read, write and delete through an accessor layer that maintains a
//! per-channel subscriber graph.
//!
//! # Channels
//!
//! Each key of a cell is a channel, plus one whole-object channel. Reads of
//! a key subscribe the running effect to that key; iteration (`keys`,
//! `entries`, `len` on objects) subscribes it to the whole-object channel.
//!
//! Writes on objects publish the written key and the whole-object channel.
//! Writes on arrays publish every channel of the array at once: index and
//! length changes are entangled (a push moves both), so arrays are notified
//! as one unit.
//!
//! Whatever channels a publish reaches, subscribers rerun in the order they
//! subscribed. Channels left without subscribers after a publish are
//! dropped.
//!
//! # Nested cells
//!
//! A plain object or array stored in a slot is wrapped the first time the
//! slot is read, and the slot is replaced with the wrapped form. Later reads
//! return the same cell, so nested cells are created exactly once and live
//! as long as their parent holds them.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::context::{untrack, ReactiveContext};
use super::runtime::Runtime;
use super::subscriber::SubscriberSet;
use super::value::{Key, Value};
use crate::error::{ReactiveError, Result};

/// Largest length an array cell accepts. Index writes and length writes
/// beyond it are ignored with a warning.
pub const MAX_ARRAY_LEN: usize = u32::MAX as usize;

/// Unique identifier for a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A subscription channel on a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Key(Key),
    /// The whole-object sentinel.
    Whole,
}

#[derive(Clone)]
enum Container {
    Object(IndexMap<String, Value>),
    Array(Vec<Value>),
}

/// Which channels a mutation publishes.
enum Publish {
    /// One key plus the whole-object channel.
    Key(String),
    /// Every channel of the cell.
    All,
}

struct CellInner {
    id: CellId,
    data: RefCell<Container>,
    channels: RefCell<IndexMap<Channel, Rc<SubscriberSet>>>,
}

/// A reactive object or array.
///
/// Cloning a `Reactive` clones the handle; both handles address the same
/// cell.
///
/// # Example
///
/// ```rust,ignore
/// let state = Reactive::wrap(json!({ "count": 0 }))?;
///
/// Effect::with_options(
///     { let state = state.clone(); move |_| println!("{:?}", state.get("count")) },
///     EffectOptions::sync(),
/// );
///
/// state.set("count", 1); // prints Some(Int(1))
/// ```
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<CellInner>,
}

impl Reactive {
    fn from_container(data: Container) -> Self {
        Self {
            inner: Rc::new(CellInner {
                id: CellId::next(),
                data: RefCell::new(data),
                channels: RefCell::new(IndexMap::new()),
            }),
        }
    }

    pub(crate) fn from_fields(fields: IndexMap<String, Value>) -> Self {
        Self::from_container(Container::Object(fields))
    }

    /// Create an empty reactive object.
    pub fn object() -> Self {
        Self::from_container(Container::Object(IndexMap::new()))
    }

    /// Create an empty reactive array.
    pub fn array() -> Self {
        Self::from_container(Container::Array(Vec::new()))
    }

    /// Wrap a plain object or array.
    ///
    /// Wrapping a value that already is a cell returns that same cell.
    /// Primitives and host handles cannot be wrapped.
    pub fn wrap(value: impl Into<Value>) -> Result<Self> {
        match value.into() {
            Value::Object(map) => Ok(Self::from_container(Container::Object(map))),
            Value::Array(items) => Ok(Self::from_container(Container::Array(items))),
            Value::Reactive(cell) => Ok(cell),
            other => Err(ReactiveError::NotWrappable { kind: other.kind() }),
        }
    }

    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Whether both handles address the same cell.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_array(&self) -> bool {
        matches!(*self.inner.data.borrow(), Container::Array(_))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read a key, subscribing the running effect to it.
    ///
    /// Object or array values are wrapped on first read and returned as
    /// [`Value::Reactive`]. Missing keys return `None` but are still
    /// subscribed, so a later write that creates the key reruns the reader.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let (channel, value) = {
            let mut data = self.inner.data.borrow_mut();
            match &mut *data {
                Container::Array(items) => match key.for_array() {
                    Some(Key::Index(i)) => (
                        Channel::Key(Key::Index(i)),
                        items.get_mut(i).map(wrap_slot),
                    ),
                    Some(Key::Length) => (Channel::Key(Key::Length), Some(Value::from(items.len()))),
                    _ => return None,
                },
                Container::Object(map) => {
                    let name = key.for_object();
                    let value = map.get_mut(&name).map(wrap_slot);
                    (Channel::Key(Key::Field(name)), value)
                }
            }
        };

        self.collect(channel);
        value
    }

    /// Read a key without subscribing anyone.
    pub fn get_untracked(&self, key: impl Into<Key>) -> Option<Value> {
        untrack(|| self.get(key))
    }

    /// Whether a key is present. Subscribes to that key.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let (channel, present) = match &*self.inner.data.borrow() {
            Container::Array(items) => match key.for_array() {
                Some(Key::Index(i)) => (Channel::Key(Key::Index(i)), i < items.len()),
                Some(Key::Length) => (Channel::Key(Key::Length), true),
                _ => return false,
            },
            Container::Object(map) => {
                let name = key.for_object();
                let present = map.contains_key(&name);
                (Channel::Key(Key::Field(name)), present)
            }
        };

        self.collect(channel);
        present
    }

    /// Number of elements (arrays) or fields (objects).
    pub fn len(&self) -> usize {
        let (channel, len) = match &*self.inner.data.borrow() {
            Container::Array(items) => (Channel::Key(Key::Length), items.len()),
            Container::Object(map) => (Channel::Whole, map.len()),
        };

        self.collect(channel);
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The keys of the cell, in order. Subscribes to the whole cell.
    pub fn keys(&self) -> Vec<Key> {
        let keys = match &*self.inner.data.borrow() {
            Container::Array(items) => (0..items.len()).map(Key::Index).collect(),
            Container::Object(map) => map.keys().cloned().map(Key::Field).collect(),
        };

        self.collect(Channel::Whole);
        keys
    }

    /// Every key with its value. Subscribes to the whole cell and each key.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(key.clone()).unwrap_or_default();
                (key, value)
            })
            .collect()
    }

    /// Every value, in key order.
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write a key and publish to its subscribers.
    ///
    /// Writing past the end of an array fills the gap with `Null`; writing
    /// `Length` truncates or extends. Named fields on arrays, negative or
    /// non-integer lengths, and anything past [`MAX_ARRAY_LEN`] are rejected
    /// with a warning.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        let publish = {
            let mut data = self.inner.data.borrow_mut();
            match &mut *data {
                Container::Array(items) => match key.clone().for_array() {
                    Some(Key::Index(i)) => match i.checked_add(1).filter(|len| *len <= MAX_ARRAY_LEN) {
                        Some(len) => {
                            if len > items.len() {
                                items.resize(len, Value::Null);
                            }
                            items[i] = value;
                            Publish::All
                        }
                        None => {
                            tracing::warn!(cell = self.id().raw(), index = i, "ignoring write past the maximum array length");
                            return;
                        }
                    },
                    Some(Key::Length) => match value
                        .as_i64()
                        .and_then(|n| usize::try_from(n).ok())
                        .filter(|len| *len <= MAX_ARRAY_LEN)
                    {
                        Some(len) => {
                            items.resize(len, Value::Null);
                            Publish::All
                        }
                        None => {
                            tracing::warn!(cell = self.id().raw(), kind = value.kind(), "ignoring invalid array length");
                            return;
                        }
                    },
                    _ => {
                        tracing::warn!(cell = self.id().raw(), %key, "ignoring write of a named field on an array");
                        return;
                    }
                },
                Container::Object(map) => {
                    let name = key.for_object();
                    map.insert(name.clone(), value);
                    Publish::Key(name)
                }
            }
        };

        self.publish(publish);
    }

    /// Remove a key and publish to its subscribers.
    ///
    /// On arrays the slot becomes a `Null` hole and the length is kept. On
    /// objects the key's subscriber set is discarded once no subscriber is
    /// left in it, like any other emptied channel.
    pub fn delete(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();

        let (removed, publish) = {
            let mut data = self.inner.data.borrow_mut();
            match &mut *data {
                Container::Array(items) => match key.for_array() {
                    Some(Key::Index(i)) if i < items.len() => {
                        (Some(std::mem::take(&mut items[i])), Publish::All)
                    }
                    _ => (None, Publish::All),
                },
                Container::Object(map) => {
                    let name = key.for_object();
                    (map.shift_remove(&name), Publish::Key(name))
                }
            }
        };

        self.publish(publish);
        removed
    }

    /// Append to an array. Publishes once.
    pub fn push(&self, value: impl Into<Value>) {
        let value = value.into();
        if self.with_items(|items| items.push(value)).is_some() {
            self.publish(Publish::All);
        }
    }

    /// Remove the last element of an array. Publishes once if an element was
    /// removed.
    pub fn pop(&self) -> Option<Value> {
        let popped = self.with_items(Vec::pop).flatten();
        if popped.is_some() {
            self.publish(Publish::All);
        }
        popped
    }

    /// Insert into an array at `index`, clamped to the length. Publishes once.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let inserted = self.with_items(|items| {
            let index = index.min(items.len());
            items.insert(index, value);
        });
        if inserted.is_some() {
            self.publish(Publish::All);
        }
    }

    /// Remove the element at `index` from an array, shifting the rest.
    /// Publishes once if an element was removed.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let removed = self
            .with_items(|items| (index < items.len()).then(|| items.remove(index)))
            .flatten();
        if removed.is_some() {
            self.publish(Publish::All);
        }
        removed
    }

    /// Remove every element or field. Publishes once.
    pub fn clear(&self) {
        match &mut *self.inner.data.borrow_mut() {
            Container::Array(items) => items.clear(),
            Container::Object(map) => map.clear(),
        }
        self.publish(Publish::All);
    }

    /// Truncate or extend an array to `len`, filling with `Null`. Publishes
    /// once.
    pub fn set_len(&self, len: usize) {
        if len > MAX_ARRAY_LEN {
            tracing::warn!(cell = self.id().raw(), len, "ignoring array length past the maximum");
            return;
        }
        if self.with_items(|items| items.resize(len, Value::Null)).is_some() {
            self.publish(Publish::All);
        }
    }

    fn with_items<T>(&self, f: impl FnOnce(&mut Vec<Value>) -> T) -> Option<T> {
        match &mut *self.inner.data.borrow_mut() {
            Container::Array(items) => Some(f(items)),
            Container::Object(_) => {
                tracing::warn!(cell = self.id().raw(), "array operation on an object cell ignored");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Subscriber bookkeeping
    // ------------------------------------------------------------------

    fn channel(&self, channel: Channel) -> Rc<SubscriberSet> {
        self.inner
            .channels
            .borrow_mut()
            .entry(channel)
            .or_insert_with(|| Rc::new(SubscriberSet::new()))
            .clone()
    }

    fn collect(&self, channel: Channel) {
        if ReactiveContext::is_active() {
            let set = self.channel(channel);
            ReactiveContext::track(&set);
        }
    }

    fn publish(&self, publish: Publish) {
        let sets: Vec<Rc<SubscriberSet>> = {
            let channels = self.inner.channels.borrow();
            match &publish {
                Publish::All => channels.values().cloned().collect(),
                Publish::Key(name) => [Channel::Key(Key::Field(name.clone())), Channel::Whole]
                    .iter()
                    .filter_map(|channel| channels.get(channel).cloned())
                    .collect(),
            }
        };

        let notified = Runtime::publish(sets.iter());
        self.prune_channels();
        tracing::trace!(cell = self.id().raw(), notified, "published");
    }

    /// Drop channels nobody subscribes to any more: keys that were deleted
    /// or truncated away, and keys whose readers have all stopped.
    fn prune_channels(&self) {
        let mut channels = self.inner.channels.borrow_mut();
        let before = channels.len();
        channels.retain(|_, set| !set.is_empty());
        if channels.len() < before {
            tracing::trace!(cell = self.id().raw(), pruned = before - channels.len(), "pruned empty channels");
        }
    }

    /// Number of subscribers on a key's channel.
    pub fn subscriber_count(&self, key: impl Into<Key>) -> usize {
        let channel = match (&*self.inner.data.borrow(), key.into()) {
            (Container::Array(_), key) => match key.for_array() {
                Some(key) => Channel::Key(key),
                None => return 0,
            },
            (Container::Object(_), key) => Channel::Key(Key::Field(key.for_object())),
        };

        self.inner
            .channels
            .borrow()
            .get(&channel)
            .map_or(0, |set| set.len())
    }

    /// Number of subscribers on the whole-object channel.
    pub fn whole_subscriber_count(&self) -> usize {
        self.inner
            .channels
            .borrow()
            .get(&Channel::Whole)
            .map_or(0, |set| set.len())
    }

    /// Number of channels that currently have a subscriber set.
    pub fn channel_count(&self) -> usize {
        self.inner.channels.borrow().len()
    }

    /// Total subscriptions across every channel.
    pub fn total_subscriptions(&self) -> usize {
        self.inner.channels.borrow().values().map(|set| set.len()).sum()
    }

    // ------------------------------------------------------------------
    // Plain copies
    // ------------------------------------------------------------------

    /// Untracked deep copy into plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        self.json_guarded(&mut HashSet::new())
    }

    pub(crate) fn json_guarded(&self, visiting: &mut HashSet<CellId>) -> serde_json::Value {
        if !visiting.insert(self.id()) {
            return serde_json::Value::Null;
        }

        // Copy the slots out first: nested cells borrow their own data.
        let data = self.inner.data.borrow().clone();
        let json = match data {
            Container::Array(items) => serde_json::Value::Array(
                items.iter().map(|v| v.json_guarded(visiting)).collect(),
            ),
            Container::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.json_guarded(visiting)))
                    .collect(),
            ),
        };

        visiting.remove(&self.id());
        json
    }
}

/// Wrap a plain container slot in place and return what the read yields.
fn wrap_slot(slot: &mut Value) -> Value {
    let container = match std::mem::take(slot) {
        Value::Object(map) => Container::Object(map),
        Value::Array(items) => Container::Array(items),
        other => {
            *slot = other;
            return slot.clone();
        }
    };

    let cell = Reactive::from_container(container);
    tracing::trace!(cell = cell.id().raw(), "wrapped nested value");
    *slot = Value::Reactive(cell.clone());
    Value::Reactive(cell)
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, len) = match &*self.inner.data.borrow() {
            Container::Array(items) => ("array", items.len()),
            Container::Object(map) => ("object", map.len()),
        };
        f.debug_struct("Reactive")
            .field("id", &self.inner.id)
            .field("kind", &kind)
            .field("len", &len)
            .field("channels", &self.channel_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
