//! Boxed Values
//!
//! A [`Ref`] is a one-field reactive cell, `{ value }`. It exists so a
//! single primitive can be tracked on its own: reading `get()` inside an
//! effect subscribes to the box, and `set()` reruns exactly the effects that
//! read it.
//!
//! Storing an object or array in a box behaves like storing it in any cell:
//! the first read wraps it, and nested reads track nested keys.

use std::fmt;

use indexmap::IndexMap;

use super::cell::{CellId, Reactive};
use super::value::Value;

/// The name of the single field of a boxed cell.
const VALUE_KEY: &str = "value";

/// A reactive box holding one [`Value`].
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
/// count.set(count.get_untracked().as_i64().unwrap_or(0) + 1);
/// assert_eq!(count.get(), Value::Int(1));
/// ```
#[derive(Clone)]
pub struct Ref {
    cell: Reactive,
}

impl Ref {
    /// Create a box with the given initial value.
    pub fn new(value: impl Into<Value>) -> Self {
        let mut fields = IndexMap::with_capacity(1);
        fields.insert(VALUE_KEY.to_owned(), value.into());
        Self {
            cell: Reactive::from_fields(fields),
        }
    }

    /// Get the current value, subscribing the running effect.
    pub fn get(&self) -> Value {
        self.cell.get(VALUE_KEY).unwrap_or_default()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> Value {
        self.cell.get_untracked(VALUE_KEY).unwrap_or_default()
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: impl Into<Value>) {
        self.cell.set(VALUE_KEY, value);
    }

    /// Compute a new value from the current one, without tracking the read.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.get_untracked());
        self.set(next);
    }

    /// The backing one-field cell.
    pub fn cell(&self) -> &Reactive {
        &self.cell
    }

    pub fn id(&self) -> CellId {
        self.cell.id()
    }

    pub fn ptr_eq(&self, other: &Ref) -> bool {
        self.cell.ptr_eq(&other.cell)
    }

    /// Number of effects currently subscribed to the box.
    pub fn subscriber_count(&self) -> usize {
        self.cell.subscriber_count(VALUE_KEY)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
